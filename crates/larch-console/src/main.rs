use std::path::PathBuf;
use std::process;

use clap::Parser;
use larch_core::api::{Database, DatabaseOptions, SyncMode};

mod commands;
mod display;
mod executor;

use commands::Command;
use display::OutputMode;
use executor::CommandResult;

/// Exit code when the requested key does not exist.
const EXIT_NOT_FOUND: i32 = 2;

/// Larch Console: get, set, delete and list keys in a larch database file.
#[derive(Parser, Debug)]
#[command(name = "larch-console", version)]
struct Cli {
    /// Database file (created if it does not exist).
    database: PathBuf,

    /// Output results as machine-parseable JSON.
    #[arg(short, long)]
    json: bool,

    /// Skip fsync on commit.
    #[arg(long)]
    no_sync: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn options(&self) -> DatabaseOptions {
        let sync_mode = if self.no_sync {
            SyncMode::None
        } else {
            SyncMode::Full
        };
        DatabaseOptions::new().sync_mode(sync_mode)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    process::exit(run(cli));
}

/// Open the database, execute the command, and render the outcome.
///
/// Returns exit code: 0 = success, 1 = error, 2 = key not found.
fn run(cli: Cli) -> i32 {
    let mode = OutputMode::from_flag(cli.json);
    let options = cli.options();

    let db = match Database::open_with_options(&cli.database, options) {
        Ok(db) => db,
        Err(e) => {
            display::render_error(&e, mode);
            return 1;
        }
    };

    let code = match executor::execute(&db, cli.command) {
        Ok(result) => {
            display::render(&result, mode);
            exit_code(&result)
        }
        Err(e) => {
            display::render_error(&e, mode);
            1
        }
    };
    db.close();
    code
}

fn exit_code(result: &CommandResult) -> i32 {
    match result {
        CommandResult::NotFound(_) => EXIT_NOT_FOUND,
        _ => 0,
    }
}
