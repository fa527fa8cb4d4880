use std::fmt::{self, Display};

/// Transaction isolation level requested by the caller.
///
/// Drivers map the levels their backend knows and reject the others with
/// [`UnsupportedIsolation`](crate::UnsupportedIsolation).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// Whatever the backend uses when nothing is specified.
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    WriteCommitted,
    RepeatableRead,
    Snapshot,
    Serializable,
    Linearizable,
}

impl Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IsolationLevel::Default => "Default",
            IsolationLevel::ReadUncommitted => "Read Uncommitted",
            IsolationLevel::ReadCommitted => "Read Committed",
            IsolationLevel::WriteCommitted => "Write Committed",
            IsolationLevel::RepeatableRead => "Repeatable Read",
            IsolationLevel::Snapshot => "Snapshot",
            IsolationLevel::Serializable => "Serializable",
            IsolationLevel::Linearizable => "Linearizable",
        })
    }
}

/// Options of [`Connection::begin_tx`](crate::Connection::begin_tx).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: IsolationLevel,
    pub read_only: bool,
}

impl TxOptions {
    pub const fn new(isolation: IsolationLevel, read_only: bool) -> Self {
        Self {
            isolation,
            read_only,
        }
    }
}
