use crate::{Error, IsolationLevel};
use std::fmt::{self, Display};

/// The connection is unusable: the caller must discard it and may retry the whole operation on a
/// fresh connection.
///
/// Drivers return it when the connection is already known to be closed, when a ping fails, or
/// when an operation failed before anything was sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadConnection;

impl Display for BadConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("driver: bad connection")
    }
}

impl std::error::Error for BadConnection {}

pub fn is_bad_connection(error: &Error) -> bool {
    error.is::<BadConnection>()
}

/// The requested isolation level has no equivalent in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedIsolation(pub IsolationLevel);

impl Display for UnsupportedIsolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported isolation: {}", self.0)
    }
}

impl std::error::Error for UnsupportedIsolation {}

/// Entry point kept for interface completeness only, it always fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotImplemented(pub &'static str);

impl Display for NotImplemented {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} deprecated and not implemented", self.0)
    }
}

impl std::error::Error for NotImplemented {}
