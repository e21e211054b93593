use tangoshiken_lib::libshiken::kotoba::{Language, QuizMode, VocabUnit};
use tangoshiken_lib::libshiken::shitsumon::{Outcome, Phase, Quiz, QuizSession, Ticket};
use crate::{Error, QuizConfig};
use eframe::egui;
use eframe::egui::{Color32, FontData, RichText, ScrollArea, Ui};
use eframe::epaint::text::{FontInsert, InsertFontFamily};
use log::{debug, info};
use std::time::{Duration, Instant};

enum Screen {
    Units,
    Quiz(Quiz),
}

#[derive(Debug)]
enum Action {
    Open(usize),
    Mode(QuizMode),
    Submit,
    Retry,
    RetryWrong,
    ChangeMode,
    Back,
}

struct GuiState {
    workspace_name: String,
    units: Vec<VocabUnit>,
    feedback_delay: Duration,
    preset_mode: Option<QuizMode>,
    screen: Screen,
    ticket: Option<Ticket>,
}

impl GuiState {
    fn new(
        ctx: &eframe::CreationContext,
        config: &QuizConfig,
        preset: Option<usize>,
        font: Option<Vec<u8>>,
    ) -> Self {
        if let Some(bytes) = font {
            add_font(ctx, bytes);
        }
        Self::from_config(config, preset)
    }

    fn from_config(config: &QuizConfig, preset: Option<usize>) -> Self {
        let mut state = Self {
            workspace_name: config.workspace.name.clone(),
            units: config.units.clone(),
            feedback_delay: config.feedback_delay,
            preset_mode: config.mode,
            screen: Screen::Units,
            ticket: None,
        };
        if let Some(idx) = preset {
            state.apply(Action::Open(idx));
        }
        state
    }

    /// Moves past the feedback screen once the ticket comes due.
    fn tick(&mut self, ctx: &egui::Context) {
        let (Screen::Quiz(quiz), Some(ticket)) = (&mut self.screen, self.ticket) else {
            return;
        };
        let now = Instant::now();
        if ticket.is_due(now) {
            quiz.advance(ticket);
            self.ticket = None;
        } else {
            ctx.request_repaint_after(ticket.remaining(now));
        }
    }

    fn apply(&mut self, action: Action) {
        debug!("[GUI] {:?}", action);
        let mut rng = rand::rng();
        match action {
            Action::Open(idx) => {
                if let Some(unit) = self.units.get(idx) {
                    let mut quiz = Quiz::new(unit.clone(), self.feedback_delay);
                    if let Some(mode) = self.preset_mode.take() {
                        quiz.choose_mode(mode, &mut rng);
                    }
                    self.screen = Screen::Quiz(quiz);
                    self.ticket = None;
                }
            }
            Action::Back => {
                if let Screen::Quiz(quiz) = std::mem::replace(&mut self.screen, Screen::Units) {
                    quiz.back();
                }
                self.ticket = None;
            }
            action => {
                let Screen::Quiz(quiz) = &mut self.screen else {
                    return;
                };
                match action {
                    Action::Mode(mode) => quiz.choose_mode(mode, &mut rng),
                    Action::Submit => {
                        if let Some(session) = quiz.session_mut() {
                            match session.submit_pending() {
                                Ok(ticket) => self.ticket = Some(ticket),
                                Err(err) => debug!("[GUI] Submit refused: {}", err),
                            }
                        }
                    }
                    Action::Retry => {
                        quiz.retry(&mut rng);
                    }
                    Action::RetryWrong => {
                        quiz.retry_wrong(&mut rng);
                    }
                    Action::ChangeMode => {
                        quiz.change_mode();
                    }
                    Action::Open(_) | Action::Back => {}
                }
            }
        }
    }
}

fn add_font(ctx: &eframe::CreationContext, bytes: Vec<u8>) {
    ctx.egui_ctx.add_font(FontInsert::new(
        "User Font",
        FontData::from_owned(bytes),
        vec![InsertFontFamily {
            family: egui::FontFamily::Proportional,
            priority: egui::epaint::text::FontPriority::Highest,
        }],
    ));
}

fn draw_units(ui: &mut Ui, workspace_name: &str, units: &[VocabUnit]) -> Option<Action> {
    let mut action = None;
    ui.heading(format!("{} ({} units)", workspace_name, units.len()));
    ui.separator();
    ScrollArea::vertical().show(ui, |ui| {
        for (idx, unit) in units.iter().enumerate() {
            ui.horizontal(|ui| {
                ui.label(RichText::new(&unit.name).size(18.0));
                ui.label(RichText::new(format!("{} words", unit.items.len())).weak());
                if ui.button("Start").clicked() {
                    action = Some(Action::Open(idx));
                }
            });
        }
    });
    action
}

fn draw_modes(ui: &mut Ui, unit: &VocabUnit) -> Option<Action> {
    let mut action = None;
    ui.label(format!("{} words", unit.items.len()));
    ui.add_space(12.0);
    for mode in [QuizMode::ForeignToNative, QuizMode::NativeToForeign] {
        let button = egui::Button::new(RichText::new(mode.describe(unit.language)).size(20.0));
        if ui.add(button).clicked() {
            action = Some(Action::Mode(mode));
        }
    }
    action
}

fn draw_question(ui: &mut Ui, session: &mut QuizSession) -> Option<Action> {
    let mut action = None;
    let (idx, total) = session.progress();
    ui.horizontal(|ui| {
        ui.label(format!("Question {}/{}", idx, total));
        ui.label(format!("Score: {}", session.score()));
    });
    ui.add(egui::ProgressBar::new(session.progress_fraction()));
    ui.add_space(20.0);

    if let Some(prompt) = session.prompt() {
        ui.label(RichText::new(prompt).size(40.0));
    }
    ui.add_space(12.0);

    let awaiting = session.phase() == Phase::AwaitingAnswer;
    let response = ui.add_enabled(
        awaiting,
        egui::TextEdit::singleline(session.pending_answer_mut()).hint_text("Type your answer..."),
    );
    let entered = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
    if awaiting {
        response.request_focus();
    }

    let label = match session.last_outcome() {
        Outcome::Unknown => "Check",
        Outcome::Correct => "✓ Correct",
        Outcome::Incorrect => "✗ Wrong",
    };
    let clicked = ui
        .add_enabled(session.can_submit(), egui::Button::new(label))
        .clicked();
    if (entered || clicked) && session.can_submit() {
        action = Some(Action::Submit);
    }

    match session.last_outcome() {
        Outcome::Correct => {
            ui.colored_label(Color32::GREEN, "Correct!");
        }
        Outcome::Incorrect => {
            if let Some((expected, alternate)) = session.revealed_answer() {
                let mut text = format!("Correct answer: {}", expected);
                if let Some(alt) = alternate {
                    text.push_str(&format!(" or {}", alt));
                }
                ui.colored_label(Color32::LIGHT_RED, text);
            }
        }
        Outcome::Unknown => {}
    }
    action
}

fn draw_result(ui: &mut Ui, session: &QuizSession) -> Option<Action> {
    let mut action = None;
    let Some(result) = session.result() else {
        return None;
    };
    ui.heading(if result.perfect { "🎉 Perfect!" } else { "Result" });
    ui.label(RichText::new(format!("{}/{}", result.score, result.total)).size(40.0));
    ui.label(format!("{}%", result.percentage));
    ui.add_space(12.0);

    ui.horizontal(|ui| {
        if ui.button("Retry").clicked() {
            action = Some(Action::Retry);
        }
        if !result.missed.is_empty()
            && ui
                .button(format!("Retry missed ({})", result.missed.len()))
                .clicked()
        {
            action = Some(Action::RetryWrong);
        }
        if ui.button("Change mode").clicked() {
            action = Some(Action::ChangeMode);
        }
    });

    if !result.missed.is_empty() {
        ui.add_space(12.0);
        ui.label(RichText::new("Words to review:").strong());
        let mode = session.mode();
        ScrollArea::vertical().show(ui, |ui| {
            for item in result.missed {
                ui.horizontal(|ui| {
                    ui.label(mode.prompt(item));
                    ui.label("→");
                    ui.colored_label(Color32::GREEN, mode.expected(item));
                });
            }
        });
    }
    action
}

fn draw_quiz(ui: &mut Ui, quiz: &mut Quiz) -> Option<Action> {
    let mut action = None;
    let unit_name = quiz.unit().name.clone();
    let language: Language = quiz.unit().language;
    ui.horizontal(|ui| {
        if ui.button("← Back").clicked() {
            action = Some(Action::Back);
        }
        ui.heading(unit_name.as_str());
        ui.label(RichText::new(language.name()).weak());
    });
    ui.separator();

    let inner = match quiz.session_mut() {
        None => draw_modes(ui, quiz.unit()),
        Some(session) if session.phase() == Phase::Finished => draw_result(ui, session),
        Some(session) => draw_question(ui, session),
    };
    action.or(inner)
}

impl eframe::App for GuiState {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.tick(ctx);

        let mut action = None;
        egui::CentralPanel::default().show(ctx, |ui| {
            action = match &mut self.screen {
                Screen::Units => draw_units(ui, &self.workspace_name, &self.units),
                Screen::Quiz(quiz) => draw_quiz(ui, quiz),
            };
        });
        if let Some(action) = action {
            self.apply(action);
            ctx.request_repaint();
        }
    }
}

/// Index of the unit named by `--unit`, with the same error the terminal gives.
fn preset_unit(config: &QuizConfig) -> Result<Option<usize>, Error> {
    let Some(wanted) = &config.unit else {
        return Ok(None);
    };
    let unit = config.find_unit(wanted)?;
    Ok(config
        .units
        .iter()
        .position(|u| u.file_name == unit.file_name))
}

pub fn init_gui(config: &QuizConfig) -> Result<(), Error> {
    let preset = preset_unit(config)?;
    let font = match &config.font {
        Some(path) => Some(std::fs::read(path)?),
        None => None,
    };
    info!("[GUI] Opening window for {}", config.workspace.name);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([480.0, 420.0])
            .with_min_inner_size([320.0, 260.0]),
        ..Default::default()
    };
    eframe::run_native(
        "単語試験",
        native_options,
        Box::new(|cc| Ok(Box::new(GuiState::new(cc, config, preset, font)))),
    )
    .map_err(|err| Error::Gui(err.to_string()))?;

    Ok(())
}
