mod backend;
mod client;
mod config;
mod connection;
mod connector;
mod driver;
mod formats;
mod rows;
mod session;
mod statement;
mod transaction;
mod value_holder;
mod wire;

pub use backend::*;
pub use client::*;
pub use config::*;
pub use connection::*;
pub use connector::*;
pub use driver::*;
pub use formats::*;
pub use rows::*;
pub use session::*;
pub use statement::*;
pub use transaction::*;
pub(crate) use value_holder::*;
