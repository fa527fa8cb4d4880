use sqldrv_core::{
    Error, Result, Row, RowNames, Value,
    stream::{self, StreamExt},
};
use sqldrv_postgres::{
    BackendTransaction, BackendTxOptions, Pool, PoolConnection, ResultFormats, ResultStream,
    StatementDescription,
};
use std::{
    fmt::{self, Display},
    sync::{Arc, Mutex},
    time::Duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    RetrySafe,
    Fatal,
}

#[derive(Debug)]
pub struct FakeError {
    pub retry_safe: bool,
}

impl Display for FakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fake backend failure (retry safe: {})", self.retry_safe)
    }
}

impl std::error::Error for FakeError {}

impl Failure {
    fn error(self) -> Error {
        FakeError {
            retry_safe: self == Failure::RetrySafe,
        }
        .into()
    }
}

#[derive(Default)]
pub struct FakeState {
    pub closed: bool,
    pub acquire_failure: bool,
    pub exec_failure: Option<Failure>,
    pub query_failure: Option<Failure>,
    pub row_failure: bool,
    pub ping_failure: bool,
    pub query_delay: Option<Duration>,
    pub deallocate_delay: Option<Duration>,
    pub rows_affected: u64,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Every backend call, in order.
    pub calls: Vec<String>,
    pub last_args: Vec<Value>,
    pub prepared: Vec<String>,
    pub formats: Option<Arc<ResultFormats>>,
    pub released: usize,
}

/// Deterministic in-memory backend.
#[derive(Clone, Default)]
pub struct FakePool(pub Arc<Mutex<FakeState>>);

impl FakePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        f(&mut self.0.lock().unwrap())
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }
}

impl Pool for FakePool {
    type Connection = FakeConnection;

    async fn acquire(&self) -> Result<FakeConnection> {
        self.with(|s| {
            if s.acquire_failure {
                return Err(Failure::Fatal.error());
            }
            s.calls.push("acquire".into());
            Ok(())
        })?;
        Ok(FakeConnection {
            pool: self.clone(),
        })
    }
}

pub struct FakeConnection {
    pool: FakePool,
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.pool.with(|s| s.released += 1);
    }
}

impl PoolConnection for FakeConnection {
    type Transaction<'c> = FakeTransaction<'c>;

    fn is_closed(&self) -> bool {
        self.pool.with(|s| s.closed)
    }

    async fn prepare(&self, name: &str, sql: &str) -> Result<StatementDescription> {
        self.pool.with(|s| {
            s.calls.push(format!("prepare {} {}", name, sql));
            s.prepared.push(name.to_string());
            Ok(StatementDescription {
                name: name.to_string(),
                sql: sql.to_string(),
                param_oids: vec![23; sql.matches('$').count()],
                columns: s.columns.iter().cloned().collect(),
            })
        })
    }

    async fn exec(&self, sql: &str, args: &[Value]) -> Result<u64> {
        self.pool.with(|s| {
            s.calls.push(format!("exec {}", sql));
            s.last_args = args.to_vec();
            match s.exec_failure {
                Some(failure) => Err(failure.error()),
                None => Ok(s.rows_affected),
            }
        })
    }

    async fn query(
        &self,
        sql: &str,
        formats: &Arc<ResultFormats>,
        args: &[Value],
    ) -> Result<ResultStream> {
        let delay = self.pool.with(|s| {
            s.calls.push(format!("query {}", sql));
            s.last_args = args.to_vec();
            s.formats = Some(formats.clone());
            s.query_delay
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.pool.with(|s| {
            if let Some(failure) = s.query_failure {
                return Err(failure.error());
            }
            let columns: RowNames = s.columns.iter().cloned().collect();
            let rows: Vec<Result<Row>> = if s.row_failure {
                vec![Err(Failure::Fatal.error())]
            } else {
                s.rows.iter().cloned().map(Ok).collect()
            };
            let pool = self.pool.clone();
            let rows = stream::iter(rows)
                .map(move |row| {
                    pool.with(|s| s.calls.push("fetch".into()));
                    row
                })
                .boxed();
            Ok(ResultStream { columns, rows })
        })
    }

    async fn ping(&self) -> Result<()> {
        self.pool.with(|s| {
            s.calls.push("ping".into());
            if s.ping_failure {
                return Err(Failure::Fatal.error());
            }
            Ok(())
        })
    }

    async fn begin(&self, options: &BackendTxOptions) -> Result<FakeTransaction<'_>> {
        self.pool.with(|s| s.calls.push(options.begin_sql()));
        Ok(FakeTransaction { conn: self })
    }

    async fn deallocate(&self, name: &str) -> Result<()> {
        let delay = self.pool.with(|s| {
            s.calls.push(format!("deallocate {}", name));
            s.deallocate_delay
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn safe_to_retry(error: &Error) -> bool {
        error
            .downcast_ref::<FakeError>()
            .is_some_and(|e| e.retry_safe)
    }
}

pub struct FakeTransaction<'c> {
    conn: &'c FakeConnection,
}

impl BackendTransaction for FakeTransaction<'_> {
    async fn commit(self) -> Result<()> {
        self.conn.pool.with(|s| s.calls.push("commit".into()));
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.conn.pool.with(|s| s.calls.push("rollback".into()));
        Ok(())
    }
}
