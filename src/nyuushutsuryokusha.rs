use colored::Colorize;
use env_logger::Env;
use log::{error, info, warn};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rusqlite::Connection;
use thiserror::Error;
use tangoshiken_lib::libshiken::db;
use tangoshiken_lib::libshiken::db::{DbError, UnitStore, Workspace};
use tangoshiken_lib::libshiken::kotoba::Language;
use tangoshiken_lib::libshiken::yomikomi::{parse_source, SUPPORTED_EXTENSIONS};

#[derive(Parser, Debug)]
#[command(name = "入出力者 (Nyūshutsuryokusha)")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "info")]
    log_level: String,
    #[arg(short, long, value_name = "FILE", default_value = "vocab.db")]
    db: PathBuf,
    #[arg(short, long, default_value = "default")]
    user: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a workspace for a language.
    Create {
        #[arg(value_enum)]
        language: Language,
    },
    /// List workspaces and their units.
    List,
    /// Delete a workspace together with all of its units.
    Drop {
        #[arg(value_enum)]
        language: Language,
    },
    /// Import spreadsheets into a workspace, replacing units with the same file name.
    Import {
        #[arg(value_enum)]
        language: Language,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Write a unit's words out as JSON.
    Export {
        #[arg(value_enum)]
        language: Language,
        unit: String,
        out: Option<PathBuf>,
    },
    /// Remove a unit from a workspace.
    Remove {
        #[arg(value_enum)]
        language: Language,
        unit: String,
    },
}

#[derive(Debug, Error)]
enum ToolError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("no {0} workspace, create it first")]
    NoWorkspace(Language),
    #[error("cannot write export: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode export: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&args.log_level)).init();

    info!(
        "{}",
        format!("Database at {:?} for user {}", args.db, args.user).cyan()
    );
    let db = match db::create_or_open(&args.db) {
        Ok(d) => d,
        Err(e) => {
            error!("{}{}", "Unable to open Database: ".red(), e);
            std::process::exit(1);
        }
    };

    let outcome = run(&db, &args.user, args.command);
    if let Err(e) = db::close_db(db) {
        error!("{}{}", "Unable to close Database: ".red(), e);
    }
    if let Err(e) = outcome {
        error!("{}", format!("{}!", e).red());
        std::process::exit(1);
    }
}

fn workspace(db: &Connection, user: &str, language: Language) -> Result<Workspace, ToolError> {
    Workspace::get_for_language(db, user, language)?.ok_or(ToolError::NoWorkspace(language))
}

fn run(db: &Connection, user: &str, command: Commands) -> Result<(), ToolError> {
    match command {
        Commands::Create { language } => {
            let ws = Workspace::create(db, user, language)?;
            info!("{}", format!("Created workspace {} ({})", ws.name, ws.id).green());
        }
        Commands::List => {
            let workspaces = Workspace::get_all_for(db, user)?;
            info!(
                "{}",
                format!(
                    "{} ({}/{} workspaces)",
                    user,
                    workspaces.len(),
                    db::MAX_WORKSPACES
                )
                .blue()
            );
            for ws in workspaces {
                let units = UnitStore::get_all(db, &ws.id)?;
                info!(
                    "{}",
                    format!("├ {} [{}] ({} Units)", ws.name, ws.language, units.len()).blue()
                );
                for unit in units {
                    info!(
                        "{} {}",
                        "│".blue(),
                        format!("├ {} ({} words) <{}>", unit.name, unit.items.len(), unit.file_name)
                            .green()
                    );
                }
            }
        }
        Commands::Drop { language } => {
            let ws = workspace(db, user, language)?;
            Workspace::delete(db, user, &ws.id)?;
            info!("{}", format!("Deleted workspace {}", ws.name).yellow());
        }
        Commands::Import { language, files } => {
            let ws = workspace(db, user, language)?;
            info!(
                "{}",
                format!("Importing {} files into {}...", files.len(), ws.name).blue()
            );
            let mut imported = 0;
            for file in files {
                match parse_source(&file, language) {
                    Ok(unit) => {
                        UnitStore::save(db, &ws.id, &unit)?;
                        imported += 1;
                        info!(
                            "{}",
                            format!("├ Unit: {} ({} words)", unit.name, unit.items.len()).green()
                        );
                    }
                    Err(err) => {
                        error!(
                            "{}",
                            format!("├ ✘ {:?}: {}", file, err).red().strikethrough()
                        );
                    }
                }
            }
            if imported == 0 {
                warn!(
                    "{}",
                    format!("Nothing imported. Supported: {}", SUPPORTED_EXTENSIONS.join(", "))
                        .yellow()
                );
            }
        }
        Commands::Export {
            language,
            unit,
            out,
        } => {
            let ws = workspace(db, user, language)?;
            let unit = UnitStore::get_one(db, &ws.id, &unit)?;
            let json = serde_json::to_string_pretty(&unit.items)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    info!(
                        "{}",
                        format!("Exported {} words to {:?}", unit.items.len(), path).green()
                    );
                }
                None => println!("{}", json),
            }
        }
        Commands::Remove { language, unit } => {
            let ws = workspace(db, user, language)?;
            UnitStore::delete(db, &ws.id, &unit)?;
            info!("{}", format!("Removed {} from {}", unit, ws.name).yellow());
        }
    }
    Ok(())
}
