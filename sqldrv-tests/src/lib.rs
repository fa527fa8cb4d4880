mod errors;
mod prepared;
mod session;
mod transaction;
mod types;

use crate::{
    errors::errors,
    prepared::{multiple_statements, prepared},
    session::session,
    transaction::{transaction_options, transaction_rollback},
    types::types,
};
use log::LevelFilter;
use sqldrv::{Connection, Connector, Context};
use std::env;

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

/// Run the whole suite, every scenario on a fresh connection from `connector`.
pub async fn execute_tests<K: Connector>(connector: &K) {
    let ctx = Context::background();
    macro_rules! run {
        ($($scenario:ident),+ $(,)?) => {
            $(
                let mut connection = connector
                    .connect(&ctx)
                    .await
                    .expect(concat!("Could not connect for ", stringify!($scenario)));
                $scenario(&mut connection).await;
                connection
                    .close()
                    .expect(concat!("Could not close the connection of ", stringify!($scenario)));
            )+
        };
    }
    run!(
        prepared,
        multiple_statements,
        transaction_options,
        transaction_rollback,
        errors,
        types,
        session,
    );
}

#[macro_export]
macro_rules! silent_logs {
    ($($code:tt)+) => {{
        let level = log::max_level();
        log::set_max_level(log::LevelFilter::Off);
        $($code)+
        log::set_max_level(level);
    }};
}
