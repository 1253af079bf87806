use clap::Subcommand;

/// A single operation against the database file.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the value stored under KEY.
    Get { key: String },
    /// Store VALUE under KEY and commit.
    Set { key: String, value: String },
    /// Remove KEY and commit.
    Delete { key: String },
    /// Print every key-value pair in key order.
    List,
}
