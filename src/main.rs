use cfg_if::cfg_if;
use clap::Parser;
use colored::Colorize;
use env_logger::Env;
use log::{debug, warn};
use rusqlite::Connection;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "cli")]
mod cli;
#[cfg(feature = "gui")]
mod gui;

use tangoshiken_lib::libshiken::db::{self, DbError, UnitStore, Workspace};
use tangoshiken_lib::libshiken::kotoba::{Language, QuizMode, VocabUnit};
use tangoshiken_lib::libshiken::shitsumon::FEEDBACK_DELAY;

#[derive(Debug, PartialEq)]
enum Choice {
    Retry,
    RetryWrong,
    ChangeMode,
    Back,
    DontKnow,
}

#[derive(Parser, Debug)]
#[command(name = "単語試験 (Tangoshiken)")]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "vocab.db")]
    db: PathBuf,
    #[arg(short, long, default_value = "default")]
    user: String,
    /// Workspace to study. Defaults to the user's first workspace.
    #[arg(short = 'L', long, value_enum)]
    language: Option<Language>,
    /// File name (or name) of the unit to open.
    #[arg(long)]
    unit: Option<String>,
    #[arg(short, long, value_enum)]
    mode: Option<QuizMode>,
    /// How long feedback stays up before the next question. Defaults to 1500.
    #[arg(long)]
    feedback_delay_ms: Option<u64>,
    #[arg(short, long, default_value = "error")]
    log_level: String,
    /// Use the terminal even when the window front end is available.
    #[arg(long)]
    cli: bool,
    /// Extra font for CJK glyphs in the window.
    #[arg(long, value_name = "FILE")]
    font: Option<PathBuf>,
}

impl Choice {
    fn from_str(has_missed: bool, input: &str) -> Choice {
        match input.trim() {
            "r" => Choice::Retry,
            "w" if has_missed => Choice::RetryWrong,
            "w" => {
                println!("{}", "Nothing to review, everything was correct!".yellow());
                Choice::DontKnow
            }
            "m" => Choice::ChangeMode,
            "q" => Choice::Back,
            _ => Choice::DontKnow,
        }
    }
}

#[derive(Debug, Error)]
enum Error {
    #[error("no workspaces!")]
    NoWorkspace,
    #[error("no units in workspace {0}")]
    NoUnits(String),
    #[error("unit {0} not found")]
    UnknownUnit(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("cannot read input or font")]
    Io(#[from] io::Error),
    #[error("cannot start window: {0}")]
    Gui(String),
}

/// Everything a front end needs, resolved up front and passed down.
#[derive(Debug)]
struct QuizConfig {
    workspace: Workspace,
    units: Vec<VocabUnit>,
    unit: Option<String>,
    mode: Option<QuizMode>,
    feedback_delay: Duration,
    font: Option<PathBuf>,
}

impl QuizConfig {
    fn find_unit(&self, wanted: &str) -> Result<VocabUnit, Error> {
        self.units
            .iter()
            .find(|u| u.file_name == wanted || u.name == wanted)
            .cloned()
            .ok_or_else(|| Error::UnknownUnit(wanted.to_string()))
    }
}

fn main() -> Result<(), Error> {
    //INIT START
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&args.log_level)).init();

    let conn = db::create_or_open(&args.db)?;
    debug!("[DB] Database Connection Successful!");

    let config = match load(&conn, &args) {
        Ok(config) => config,
        Err(err) => {
            match &err {
                Error::NoWorkspace => println!(
                    "{}",
                    "No workspace found. Create one and import a spreadsheet with nyuushutsuryokusha first!"
                        .yellow()
                ),
                Error::NoUnits(name) => println!(
                    "{}",
                    format!("Workspace {} has no units yet. Import a spreadsheet first!", name).yellow()
                ),
                _ => {}
            }
            return finish(conn, Err(err));
        }
    };
    debug!(
        "[Setup] Workspace {} with {} units",
        config.workspace.id,
        config.units.len()
    );
    // INIT DONE

    db::close_db(conn)?;
    run(&args, &config)
}

fn load(conn: &Connection, args: &Args) -> Result<QuizConfig, Error> {
    let workspace = match args.language {
        Some(language) => Workspace::get_for_language(conn, &args.user, language)?,
        None => Workspace::get_all_for(conn, &args.user)?.into_iter().next(),
    };
    let workspace = workspace.ok_or_else(|| {
        warn!("[Setup] No workspace for {}", args.user);
        Error::NoWorkspace
    })?;

    let units = UnitStore::get_all(conn, &workspace.id)?;
    if units.is_empty() {
        warn!("[Setup] Workspace {} is empty", workspace.id);
        return Err(Error::NoUnits(workspace.name));
    }

    Ok(QuizConfig {
        workspace,
        units,
        unit: args.unit.clone(),
        mode: args.mode,
        feedback_delay: args
            .feedback_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(FEEDBACK_DELAY),
        font: args.font.clone(),
    })
}

cfg_if! {
    if #[cfg(all(feature = "gui", feature = "cli"))] {
        fn run(args: &Args, config: &QuizConfig) -> Result<(), Error> {
            if args.cli {
                cli::cli_loop(config)
            } else {
                gui::init_gui(config)
            }
        }
    } else if #[cfg(feature = "gui")] {
        fn run(_args: &Args, config: &QuizConfig) -> Result<(), Error> {
            gui::init_gui(config)
        }
    } else if #[cfg(feature = "cli")] {
        fn run(_args: &Args, config: &QuizConfig) -> Result<(), Error> {
            cli::cli_loop(config)
        }
    } else {
        compile_error!("enable the `gui` or `cli` feature");
    }
}

fn finish(conn: Connection, to_error: Result<(), Error>) -> Result<(), Error> {
    db::close_db(conn)?;
    to_error
}
