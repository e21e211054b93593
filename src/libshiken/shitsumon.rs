//! Quiz sessions: answer checking, question sequencing, scoring and retries.

use crate::libshiken::kotoba::{QuizMode, VocabItem, VocabUnit};
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const FEEDBACK_DELAY: Duration = Duration::from_millis(1500);

/// Lowercases, trims and collapses internal whitespace runs to one space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Fisher-Yates over a copy; `items` is left untouched.
pub fn shuffled<T: Clone, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut copy = items.to_vec();
    copy.shuffle(rng);
    copy
}

/// Exact match on the normalized strings, falling back to the alternate when the mode allows one.
pub fn evaluate(mode: QuizMode, item: &VocabItem, candidate: &str) -> bool {
    let candidate = normalize(candidate);
    if candidate == normalize(mode.expected(item)) {
        return true;
    }
    match mode.alternate(item) {
        Some(alt) => candidate == normalize(alt),
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unknown,
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingAnswer,
    ShowingFeedback,
    Finished,
}

#[derive(Debug, Error, PartialEq)]
pub enum SubmitError {
    #[error("answer is empty")]
    Empty,
    #[error("not waiting for an answer")]
    NotAwaiting,
}

/// Handle for the delayed move past a feedback screen.
///
/// Only the session generation and question that issued it will accept it; anything else
/// (a retried or abandoned session, a second delivery of the same ticket) is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    index: usize,
    due: Instant,
}

impl Ticket {
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.due
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.due.saturating_duration_since(now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Next,
    Finished,
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizResult<'a> {
    pub score: usize,
    pub total: usize,
    pub percentage: u32,
    pub perfect: bool,
    pub missed: &'a [VocabItem],
}

pub fn percentage(score: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (100.0 * score as f64 / total as f64).round() as u32
}

#[derive(Debug, Clone)]
pub struct QuizSession {
    mode: QuizMode,
    pool: Vec<VocabItem>,
    current: usize,
    score: usize,
    missed: Vec<VocabItem>,
    pending_answer: String,
    last_outcome: Outcome,
    phase: Phase,
    generation: u64,
    feedback_delay: Duration,
}

impl QuizSession {
    pub fn new<R: Rng + ?Sized>(
        mode: QuizMode,
        items: &[VocabItem],
        generation: u64,
        feedback_delay: Duration,
        rng: &mut R,
    ) -> Self {
        let pool = shuffled(items, rng);
        let phase = if pool.is_empty() {
            Phase::Finished
        } else {
            Phase::AwaitingAnswer
        };
        debug!(
            "[Quiz] Session {} started: {:?}, {} questions.",
            generation,
            mode,
            pool.len()
        );

        QuizSession {
            mode,
            pool,
            current: 0,
            score: 0,
            missed: Vec::new(),
            pending_answer: String::new(),
            last_outcome: Outcome::Unknown,
            phase,
            generation,
            feedback_delay,
        }
    }

    pub fn mode(&self) -> QuizMode {
        self.mode
    }
    pub fn phase(&self) -> Phase {
        self.phase
    }
    pub fn pool(&self) -> &[VocabItem] {
        &self.pool
    }
    pub fn len(&self) -> usize {
        self.pool.len()
    }
    pub fn current_index(&self) -> usize {
        self.current
    }
    pub fn score(&self) -> usize {
        self.score
    }
    pub fn missed(&self) -> &[VocabItem] {
        &self.missed
    }
    pub fn last_outcome(&self) -> Outcome {
        self.last_outcome
    }
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_item(&self) -> Option<&VocabItem> {
        match self.phase {
            Phase::Finished => None,
            _ => self.pool.get(self.current),
        }
    }

    pub fn prompt(&self) -> Option<&str> {
        self.current_item().map(|item| self.mode.prompt(item))
    }

    /// The expected answer and applicable alternate, only once feedback is showing.
    pub fn revealed_answer(&self) -> Option<(&str, Option<&str>)> {
        if self.phase != Phase::ShowingFeedback {
            return None;
        }
        self.current_item()
            .map(|item| (self.mode.expected(item), self.mode.alternate(item)))
    }

    /// `(question number, total)`, one-based.
    pub fn progress(&self) -> (usize, usize) {
        if self.pool.is_empty() {
            return (0, 0);
        }
        (self.current + 1, self.pool.len())
    }

    pub fn progress_fraction(&self) -> f32 {
        let (n, total) = self.progress();
        if total == 0 {
            0.0
        } else {
            n as f32 / total as f32
        }
    }

    pub fn pending_answer(&self) -> &str {
        &self.pending_answer
    }

    /// Input box binding. Edits are only meaningful while awaiting an answer.
    pub fn pending_answer_mut(&mut self) -> &mut String {
        &mut self.pending_answer
    }

    pub fn can_submit(&self) -> bool {
        self.phase == Phase::AwaitingAnswer && !self.pending_answer.trim().is_empty()
    }

    pub fn submit(&mut self, candidate: &str) -> Result<Ticket, SubmitError> {
        if self.phase != Phase::AwaitingAnswer {
            return Err(SubmitError::NotAwaiting);
        }
        if candidate.trim().is_empty() {
            return Err(SubmitError::Empty);
        }
        self.pending_answer = candidate.to_string();
        self.submit_pending()
    }

    pub fn submit_pending(&mut self) -> Result<Ticket, SubmitError> {
        if self.phase != Phase::AwaitingAnswer {
            return Err(SubmitError::NotAwaiting);
        }
        if self.pending_answer.trim().is_empty() {
            return Err(SubmitError::Empty);
        }
        let item = &self.pool[self.current];
        let correct = evaluate(self.mode, item, &self.pending_answer);
        if correct {
            self.score += 1;
            self.last_outcome = Outcome::Correct;
        } else {
            self.missed.push(item.clone());
            self.last_outcome = Outcome::Incorrect;
        }
        debug!(
            "[Quiz] Q{} {:?} -> {:?} ({:?})",
            self.current + 1,
            self.mode.prompt(item),
            self.pending_answer,
            self.last_outcome
        );
        self.phase = Phase::ShowingFeedback;

        Ok(Ticket {
            generation: self.generation,
            index: self.current,
            due: Instant::now() + self.feedback_delay,
        })
    }

    /// Applies a scheduled advance. Stale or repeated tickets change nothing.
    pub fn advance(&mut self, ticket: Ticket) -> Advance {
        if ticket.generation != self.generation
            || ticket.index != self.current
            || self.phase != Phase::ShowingFeedback
        {
            debug!("[Quiz] Ignoring stale ticket {:?}", ticket);
            return Advance::Ignored;
        }
        if self.current + 1 < self.pool.len() {
            self.current += 1;
            self.pending_answer.clear();
            self.last_outcome = Outcome::Unknown;
            self.phase = Phase::AwaitingAnswer;
            Advance::Next
        } else {
            self.phase = Phase::Finished;
            info!(
                "[Quiz] Finished: {}/{} ({}%)",
                self.score,
                self.pool.len(),
                percentage(self.score, self.pool.len())
            );
            Advance::Finished
        }
    }

    pub fn result(&self) -> Option<QuizResult<'_>> {
        if self.phase != Phase::Finished {
            return None;
        }
        let total = self.pool.len();
        Some(QuizResult {
            score: self.score,
            total,
            percentage: percentage(self.score, total),
            perfect: total > 0 && self.score == total,
            missed: &self.missed,
        })
    }
}

/// A quiz over one unit. No session means the mode has not been chosen yet.
#[derive(Debug)]
pub struct Quiz {
    unit: VocabUnit,
    session: Option<QuizSession>,
    generation: u64,
    feedback_delay: Duration,
}

impl Quiz {
    pub fn new(unit: VocabUnit, feedback_delay: Duration) -> Self {
        Quiz {
            unit,
            session: None,
            generation: 0,
            feedback_delay,
        }
    }

    pub fn unit(&self) -> &VocabUnit {
        &self.unit
    }
    pub fn session(&self) -> Option<&QuizSession> {
        self.session.as_ref()
    }
    pub fn session_mut(&mut self) -> Option<&mut QuizSession> {
        self.session.as_mut()
    }

    fn start<R: Rng + ?Sized>(&mut self, mode: QuizMode, items: &[VocabItem], rng: &mut R) {
        self.generation += 1;
        self.session = Some(QuizSession::new(
            mode,
            items,
            self.generation,
            self.feedback_delay,
            rng,
        ));
    }

    pub fn choose_mode<R: Rng + ?Sized>(&mut self, mode: QuizMode, rng: &mut R) {
        let items = self.unit.items.clone();
        self.start(mode, &items, rng);
    }

    fn finished_mode(&self) -> Option<QuizMode> {
        self.session
            .as_ref()
            .filter(|s| s.phase() == Phase::Finished)
            .map(|s| s.mode())
    }

    /// Fresh shuffle of the whole unit. Only from a finished session.
    pub fn retry<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        match self.finished_mode() {
            Some(mode) => {
                self.choose_mode(mode, rng);
                true
            }
            None => false,
        }
    }

    /// New session over the items just missed. Only from a finished session with misses.
    pub fn retry_wrong<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        let Some(mode) = self.finished_mode() else {
            return false;
        };
        let missed = match &self.session {
            Some(session) if !session.missed().is_empty() => session.missed().to_vec(),
            _ => return false,
        };
        debug!("[Quiz] Retrying {} missed items.", missed.len());
        self.start(mode, &missed, rng);
        true
    }

    /// Back to mode selection from a finished session.
    pub fn change_mode(&mut self) -> bool {
        if self.finished_mode().is_none() {
            return false;
        }
        self.discard();
        true
    }

    /// Applies a ticket to the live session, if it is still the one that issued it.
    pub fn advance(&mut self, ticket: Ticket) -> Advance {
        match self.session.as_mut() {
            Some(session) => session.advance(ticket),
            None => Advance::Ignored,
        }
    }

    fn discard(&mut self) {
        if self.session.take().is_some() {
            // Outstanding tickets carry the old generation and will be ignored.
            self.generation += 1;
        }
    }

    /// Leaves the quiz from any state.
    pub fn back(mut self) -> VocabUnit {
        self.discard();
        self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libshiken::kotoba::Language;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn item(foreign: &str, alt: Option<&str>, native: &str) -> VocabItem {
        VocabItem::new(foreign, alt, native).unwrap()
    }

    fn animals() -> VocabUnit {
        VocabUnit::new(
            "animals.xlsx",
            Language::Japanese,
            vec![item("猫", None, "con mèo"), item("犬", None, "con chó")],
        )
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn answer(session: &mut QuizSession, text: &str) -> Advance {
        let ticket = session.submit(text).unwrap();
        session.advance(ticket)
    }

    fn answer_correctly(session: &mut QuizSession) -> Advance {
        let expected = session
            .current_item()
            .map(|i| session.mode().expected(i).to_string())
            .unwrap();
        answer(session, &expected)
    }

    #[test]
    fn normalize_collapses_case_and_whitespace() {
        assert_eq!(normalize("  Con   Mèo "), "con mèo");
        assert_eq!(normalize("\tcon\n chó"), "con chó");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for s in ["  Hello   World ", "ÀBC  déf", "猫", "", " a\t\tb\nC "] {
            assert_eq!(normalize(&normalize(s)), normalize(s));
        }
    }

    #[test]
    fn shuffle_is_a_permutation_and_leaves_input_alone() {
        let original: Vec<u32> = (0..50).collect();
        let before = original.clone();
        let mut out = shuffled(&original, &mut rng());

        assert_eq!(original, before);
        assert_eq!(out.len(), original.len());
        out.sort();
        assert_eq!(out, original);

        let empty: Vec<u32> = Vec::new();
        assert!(shuffled(&empty, &mut rng()).is_empty());
    }

    #[test]
    fn evaluate_ignores_case_and_spacing_only() {
        let it = item("猫", None, "con mèo");
        let mode = QuizMode::ForeignToNative;
        assert!(evaluate(mode, &it, "con mèo"));
        assert!(evaluate(mode, &it, "Con Mèo "));
        assert!(evaluate(mode, &it, "  CON    MÈO"));
        assert!(!evaluate(mode, &it, "con meo"));
        assert!(!evaluate(mode, &it, "conmèo"));
    }

    #[test]
    fn alternate_only_counts_native_to_foreign() {
        let it = item("食べる", Some("たべる"), "ăn");
        assert!(evaluate(QuizMode::NativeToForeign, &it, "たべる"));
        assert!(evaluate(QuizMode::NativeToForeign, &it, "食べる"));
        assert!(!evaluate(QuizMode::ForeignToNative, &it, "たべる"));
        assert!(evaluate(QuizMode::ForeignToNative, &it, "Ăn"));
    }

    #[test]
    fn cat_and_dog_scenario() {
        let mut quiz = Quiz::new(animals(), Duration::ZERO);
        quiz.choose_mode(QuizMode::ForeignToNative, &mut rng());
        let session = quiz.session_mut().unwrap();

        while session.phase() == Phase::AwaitingAnswer {
            let reply = if session.prompt() == Some("猫") {
                "Con Mèo "
            } else {
                "con cho"
            };
            answer(session, reply);
        }

        let result = session.result().unwrap();
        assert_eq!(result.score, 1);
        assert_eq!(result.total, 2);
        assert_eq!(result.percentage, 50);
        assert!(!result.perfect);
        assert_eq!(result.missed, &[item("犬", None, "con chó")]);
    }

    #[test]
    fn empty_submission_changes_nothing() {
        let mut session = QuizSession::new(
            QuizMode::ForeignToNative,
            &animals().items,
            1,
            Duration::ZERO,
            &mut rng(),
        );
        for blank in ["", "   ", "\t\n"] {
            assert_eq!(session.submit(blank), Err(SubmitError::Empty));
        }
        *session.pending_answer_mut() = "  ".to_string();
        assert!(!session.can_submit());
        assert_eq!(session.submit_pending(), Err(SubmitError::Empty));

        assert_eq!(session.current_index(), 0);
        assert_eq!(session.score(), 0);
        assert_eq!(session.last_outcome(), Outcome::Unknown);
        assert_eq!(session.phase(), Phase::AwaitingAnswer);
    }

    #[test]
    fn feedback_blocks_double_submit_and_reveals_answer() {
        let mut session = QuizSession::new(
            QuizMode::ForeignToNative,
            &animals().items,
            1,
            Duration::from_secs(60),
            &mut rng(),
        );
        assert_eq!(session.revealed_answer(), None);
        let expected = session.current_item().unwrap().native.clone();

        let ticket = session.submit("wrong").unwrap();
        assert!(!ticket.is_due(Instant::now()));
        assert_eq!(session.last_outcome(), Outcome::Incorrect);
        assert_eq!(session.revealed_answer(), Some((expected.as_str(), None)));
        assert_eq!(session.submit("again"), Err(SubmitError::NotAwaiting));
        assert_eq!(session.missed().len(), 1);

        assert_eq!(session.advance(ticket), Advance::Next);
        assert_eq!(session.advance(ticket), Advance::Ignored);
        assert_eq!(session.current_index(), 1);
        assert_eq!(session.pending_answer(), "");
        assert_eq!(session.last_outcome(), Outcome::Unknown);
    }

    #[test]
    fn all_correct_is_perfect() {
        let unit = VocabUnit::new(
            "colors.csv",
            Language::English,
            vec![
                item("red", None, "đỏ"),
                item("blue", None, "xanh dương"),
                item("green", None, "xanh lá"),
            ],
        );
        let mut session = QuizSession::new(
            QuizMode::NativeToForeign,
            &unit.items,
            1,
            Duration::ZERO,
            &mut rng(),
        );
        assert_eq!(session.progress(), (1, 3));
        assert_eq!(answer_correctly(&mut session), Advance::Next);
        assert_eq!(answer_correctly(&mut session), Advance::Next);
        assert_eq!(session.progress(), (3, 3));
        assert_eq!(answer_correctly(&mut session), Advance::Finished);

        let result = session.result().unwrap();
        assert_eq!(result.score, 3);
        assert_eq!(result.percentage, 100);
        assert!(result.perfect);
        assert!(result.missed.is_empty());
        assert_eq!(session.prompt(), None);
    }

    #[test]
    fn score_plus_missed_equals_answered() {
        let items: Vec<VocabItem> = (0..10)
            .map(|n| item(&format!("w{n}"), None, &format!("t{n}")))
            .collect();
        let mut session =
            QuizSession::new(QuizMode::ForeignToNative, &items, 1, Duration::ZERO, &mut rng());
        let mut answered = 0;
        while session.phase() == Phase::AwaitingAnswer {
            if answered % 3 == 0 {
                answer(&mut session, "nope");
            } else {
                answer_correctly(&mut session);
            }
            answered += 1;
            assert_eq!(session.score() + session.missed().len(), answered);
        }
        assert_eq!(session.score(), 6);
        assert_eq!(session.missed().len(), 4);
    }

    #[test]
    fn retry_wrong_uses_only_missed_items() {
        let items: Vec<VocabItem> = ["a", "b", "c", "d"]
            .iter()
            .map(|w| item(w, None, &w.to_uppercase()))
            .collect();
        let unit = VocabUnit::new("letters.csv", Language::English, items);
        let mut quiz = Quiz::new(unit, Duration::ZERO);
        let mut r = rng();

        assert!(!quiz.retry_wrong(&mut r));
        quiz.choose_mode(QuizMode::ForeignToNative, &mut r);
        assert!(!quiz.retry(&mut r));

        let session = quiz.session_mut().unwrap();
        while session.phase() == Phase::AwaitingAnswer {
            let prompt = session.prompt().unwrap().to_string();
            if prompt == "a" || prompt == "b" {
                answer(session, "?");
            } else {
                answer_correctly(session);
            }
        }

        assert!(quiz.retry_wrong(&mut r));
        let session = quiz.session().unwrap();
        assert_eq!(session.phase(), Phase::AwaitingAnswer);
        assert_eq!(session.score(), 0);
        assert!(session.missed().is_empty());
        let mut pool: Vec<&str> = session.pool().iter().map(|i| i.foreign.as_str()).collect();
        pool.sort();
        assert_eq!(pool, vec!["a", "b"]);
    }

    #[test]
    fn retry_reshuffles_the_whole_unit() {
        let mut quiz = Quiz::new(animals(), Duration::ZERO);
        let mut r = rng();
        quiz.choose_mode(QuizMode::NativeToForeign, &mut r);
        let session = quiz.session_mut().unwrap();
        answer_correctly(session);
        answer_correctly(session);
        assert!(!quiz.retry_wrong(&mut r));

        assert!(quiz.retry(&mut r));
        let session = quiz.session().unwrap();
        assert_eq!(session.mode(), QuizMode::NativeToForeign);
        assert_eq!(session.len(), 2);
        assert_eq!(session.score(), 0);
    }

    #[test]
    fn tickets_from_old_sessions_are_ignored() {
        let mut quiz = Quiz::new(animals(), Duration::ZERO);
        let mut r = rng();
        quiz.choose_mode(QuizMode::ForeignToNative, &mut r);
        let session = quiz.session_mut().unwrap();
        let first = session.submit("x").unwrap();
        assert_eq!(session.advance(first), Advance::Next);
        let last = session.submit("y").unwrap();
        assert_eq!(quiz.advance(last), Advance::Finished);

        assert!(quiz.change_mode());
        assert!(quiz.session().is_none());
        assert_eq!(quiz.advance(last), Advance::Ignored);

        quiz.choose_mode(QuizMode::ForeignToNative, &mut r);
        let session = quiz.session_mut().unwrap();
        let pending = session.submit("z").unwrap();
        assert!(!quiz.retry(&mut r));
        assert_eq!(quiz.advance(last), Advance::Ignored);
        assert_eq!(quiz.advance(pending), Advance::Next);
    }

    #[test]
    fn empty_pool_finishes_with_zero() {
        let mut session =
            QuizSession::new(QuizMode::ForeignToNative, &[], 1, Duration::ZERO, &mut rng());
        assert_eq!(session.phase(), Phase::Finished);
        assert_eq!(session.submit("anything"), Err(SubmitError::NotAwaiting));
        assert_eq!(session.progress_fraction(), 0.0);

        let result = session.result().unwrap();
        assert_eq!(result.score, 0);
        assert_eq!(result.percentage, 0);
        assert!(!result.perfect);
    }

    #[test]
    fn percentage_rounds() {
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 2), 50);
        assert_eq!(percentage(0, 0), 0);
    }
}
