use tangoshiken_lib::libshiken::kotoba::{Language, QuizMode, VocabUnit};
use tangoshiken_lib::libshiken::shitsumon::{Outcome, Phase, Quiz, QuizSession, SubmitError};
use crate::{Choice, Error, QuizConfig};
use colored::Colorize;
use log::{debug, info, warn};
use std::io::{self, Write};
use std::thread;
use std::time::Instant;
use text_io::read;

const QUIT: &str = ":q";

fn prompt_line(label: &str) -> Result<String, Error> {
    print!("{} ", label.cyan());
    io::stdout().flush()?;
    let line: String = read!("{}\n");
    Ok(line.trim_end_matches('\r').to_string())
}

pub fn cli_loop(config: &QuizConfig) -> Result<(), Error> {
    let unit = match &config.unit {
        Some(wanted) => config.find_unit(wanted)?,
        None => match pick_unit(&config.units)? {
            Some(unit) => unit,
            None => return Ok(()),
        },
    };
    println!(
        "{}",
        format!(
            "==========> {} ({} words) <==========",
            unit.name,
            unit.items.len()
        )
        .cyan()
    );

    let language = unit.language;
    let mut quiz = Quiz::new(unit, config.feedback_delay);
    let mut rng = rand::rng();
    let mut preset = config.mode;

    loop {
        let mode = match preset.take() {
            Some(mode) => mode,
            None => match pick_mode(language)? {
                Some(mode) => mode,
                None => break,
            },
        };
        quiz.choose_mode(mode, &mut rng);

        'session: loop {
            let Some(session) = quiz.session_mut() else {
                break;
            };
            if !ask_all(session)? {
                println!("{}", "Leaving the quiz.".cyan());
                quiz.back();
                return Ok(());
            }
            print_result(session);

            loop {
                let has_missed = !session.missed().is_empty();
                let menu = if has_missed {
                    format!(
                        "[r] retry, [w] retry the {} missed, [m] change mode, [q] back:",
                        session.missed().len()
                    )
                } else {
                    "[r] retry, [m] change mode, [q] back:".to_string()
                };
                let choice = Choice::from_str(has_missed, &prompt_line(&menu)?);
                debug!("choice: {:?}", choice);
                match choice {
                    Choice::Retry => {
                        quiz.retry(&mut rng);
                        continue 'session;
                    }
                    Choice::RetryWrong => {
                        quiz.retry_wrong(&mut rng);
                        continue 'session;
                    }
                    Choice::ChangeMode => {
                        quiz.change_mode();
                        break 'session;
                    }
                    Choice::Back => {
                        quiz.back();
                        return Ok(());
                    }
                    Choice::DontKnow => continue,
                }
            }
        }
    }

    quiz.back();
    Ok(())
}

fn pick_unit(units: &[VocabUnit]) -> Result<Option<VocabUnit>, Error> {
    for (i, unit) in units.iter().enumerate() {
        println!(
            "{}. {} {}",
            format!("{}", i + 1).bold(),
            unit.name,
            format!("({} words)", unit.items.len()).dimmed()
        );
    }
    loop {
        let input = prompt_line(&format!("Unit (1-{}, q to quit):", units.len()))?;
        if input.trim() == "q" {
            return Ok(None);
        }
        match input.trim().parse::<usize>() {
            Ok(num) if (1..=units.len()).contains(&num) => return Ok(Some(units[num - 1].clone())),
            _ => println!(
                "{}",
                format!("There are only {} units available!", units.len()).bright_red()
            ),
        }
    }
}

fn pick_mode(language: Language) -> Result<Option<QuizMode>, Error> {
    let modes = [QuizMode::ForeignToNative, QuizMode::NativeToForeign];
    for (i, mode) in modes.iter().enumerate() {
        println!("{}. {}", format!("{}", i + 1).bold(), mode.describe(language));
    }
    loop {
        match prompt_line("Mode (1-2, q to go back):")?.trim() {
            "1" => return Ok(Some(modes[0])),
            "2" => return Ok(Some(modes[1])),
            "q" => return Ok(None),
            _ => println!("{}", "Pick 1 or 2.".bright_red()),
        }
    }
}

/// Runs every question of the session. `false` if the user walked away midway.
fn ask_all(session: &mut QuizSession) -> Result<bool, Error> {
    while session.phase() == Phase::AwaitingAnswer {
        let (idx, total) = session.progress();
        let leading = format!("{}/{}. ", idx, total);
        println!(
            "{}{} {}",
            leading.cyan(),
            format!(" {} ", session.prompt().unwrap_or_default())
                .black()
                .bold()
                .on_white(),
            format!("(score: {})", session.score()).dimmed()
        );

        let answer = prompt_line(&format!("Answer ({} to go back):", QUIT))?;
        if answer.trim() == QUIT {
            return Ok(false);
        }
        let ticket = match session.submit(&answer) {
            Ok(ticket) => ticket,
            Err(SubmitError::Empty) => {
                println!("{}", "Type an answer first.".yellow());
                continue;
            }
            Err(err) => {
                warn!("[Quiz] Submit refused: {}", err);
                break;
            }
        };

        match session.last_outcome() {
            Outcome::Correct => println!(
                "{}",
                format!("Correct!: {} -> {}", session.score() - 1, session.score()).bright_green()
            ),
            _ => {
                println!("{}", "Incorrect!".bright_red());
                if let Some((expected, alternate)) = session.revealed_answer() {
                    let mut line = format!("The correct answer was {}", expected.bold());
                    if let Some(alt) = alternate {
                        line.push_str(&format!(" or {}", alt.bold()));
                    }
                    println!("{}", line.green());
                }
            }
        }

        thread::sleep(ticket.remaining(Instant::now()));
        session.advance(ticket);
    }
    Ok(true)
}

fn print_result(session: &QuizSession) {
    let Some(result) = session.result() else {
        return;
    };
    info!(
        "[Quiz] Result {}/{} ({}%)",
        result.score, result.total, result.percentage
    );
    let title = if result.perfect {
        "🎉 Perfect!".bright_yellow().bold()
    } else {
        "Result".cyan().bold()
    };
    println!("==========> {} <==========", title);
    println!(
        "{} {}",
        format!("{}/{}", result.score, result.total).bold(),
        format!("({}%)", result.percentage).dimmed()
    );

    if !result.missed.is_empty() {
        println!("{}", "Words to review:".yellow());
        let mode = session.mode();
        for item in result.missed {
            println!(
                "  {} {} {}",
                mode.prompt(item),
                "→".dimmed(),
                mode.expected(item).green()
            );
        }
    }
}
