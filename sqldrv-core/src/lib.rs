mod connection;
mod connector;
mod context;
mod driver;
mod error;
mod options;
mod rows;
mod statement;
mod transaction;
mod util;
mod value;

pub use ::anyhow::Context as ErrorContext;
pub use connection::*;
pub use connector::*;
pub use context::*;
pub use driver::*;
pub use error::*;
pub use options::*;
pub use rows::*;
pub use statement::*;
pub use transaction::*;
pub use util::truncate_str;
pub use value::*;
pub mod stream {
    pub use ::futures::stream::*;
}
pub use ::futures::future;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
