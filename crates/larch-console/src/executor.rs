use larch_core::api::{Database, KeyValuePair};
use larch_core::error::Error;
use tracing::debug;

use crate::commands::Command;

/// Structured result from executing a command.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Mutation committed (SET, DELETE).
    Ok(String),
    /// Value returned (GET).
    Value { key: Vec<u8>, value: Vec<u8> },
    /// Key absent (GET, DELETE).
    NotFound(Vec<u8>),
    /// Every pair in key order (LIST).
    Pairs(Vec<KeyValuePair>),
}

/// Execute a parsed command. Mutations are committed before returning; a
/// missing key is reported as [`CommandResult::NotFound`] rather than an error.
pub fn execute(db: &Database, cmd: Command) -> Result<CommandResult, Error> {
    debug!(?cmd, "executing command");
    match run(db, cmd) {
        Err(Error::KeyNotFound(key)) => Ok(CommandResult::NotFound(key)),
        other => other,
    }
}

fn run(db: &Database, cmd: Command) -> Result<CommandResult, Error> {
    match cmd {
        Command::Get { key } => {
            let value = db.get(&key)?;
            Ok(CommandResult::Value {
                key: key.into_bytes(),
                value,
            })
        }
        Command::Set { key, value } => {
            db.set(&key, &value)?;
            db.commit()?;
            Ok(CommandResult::Ok(format!("set {key}")))
        }
        Command::Delete { key } => {
            db.delete(&key)?;
            db.commit()?;
            Ok(CommandResult::Ok(format!("deleted {key}")))
        }
        Command::List => Ok(CommandResult::Pairs(db.list_all()?)),
    }
}
