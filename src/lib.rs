pub use sqldrv_core::*;
#[cfg(feature = "postgres")]
pub use sqldrv_postgres as postgres;
