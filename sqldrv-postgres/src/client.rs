use crate::{
    BackendTransaction, BackendTxOptions, Pool, PoolConnection, PostgresConfig, ResultFormats,
    ResultStream, SslMode, SslOptions, StatementDescription, ValueHolder, decode_row,
};
use async_stream::try_stream;
use bb8::{PooledConnection, RunError};
use bb8_postgres::PostgresConnectionManager;
use openssl::ssl::{SslConnector, SslFiletype, SslMethod, SslVerifyMode};
use postgres_openssl::MakeTlsConnector;
use sqldrv_core::{
    Error, ErrorContext, Result, Row, RowNames, Value,
    stream::{BoxStream, StreamExt, TryStreamExt},
};
use std::{
    collections::HashMap,
    fmt::{self, Display},
    ops::Deref,
    pin::pin,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU8, Ordering},
    },
};
use tokio::runtime::Handle;
use tokio_postgres::{
    Client, NoTls, SimpleQueryMessage, Statement, config::SslMode as ClientSslMode,
};

/// Pool of `tokio_postgres` clients, with or without TLS.
pub enum PgPool {
    Plain(bb8::Pool<PostgresConnectionManager<NoTls>>),
    Tls(bb8::Pool<PostgresConnectionManager<MakeTlsConnector>>),
}

impl PgPool {
    /// Build a pool from a connection string and check it by acquiring one connection.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let PostgresConfig {
            mut client,
            pool: options,
            ssl,
        } = PostgresConfig::parse(dsn)?;
        macro_rules! build {
            ($tls:expr) => {
                bb8::Pool::builder()
                    .max_size(options.max_size)
                    .min_idle(options.min_idle)
                    .connection_timeout(options.connection_timeout)
                    .build(PostgresConnectionManager::new(client, $tls))
                    .await
            };
        }
        let pool = match ssl.mode {
            SslMode::Disable => PgPool::Plain(build!(NoTls).context("connect to pool failed")?),
            _ => {
                client.ssl_mode(match ssl.mode {
                    SslMode::Prefer => ClientSslMode::Prefer,
                    _ => ClientSslMode::Require,
                });
                PgPool::Tls(build!(tls_connector(&ssl)?).context("connect to pool failed")?)
            }
        };
        drop(pool.acquire().await.context("connect to pool failed")?);
        log::debug!("Connected to the Postgres pool");
        Ok(pool)
    }
}

fn tls_connector(ssl: &SslOptions) -> Result<MakeTlsConnector> {
    let mut builder = SslConnector::builder(SslMethod::tls())?;
    if let Some(path) = ssl.root_cert.as_deref()
        && path.exists()
    {
        builder.set_ca_file(path)?;
    }
    if let Some(path) = ssl.cert.as_deref()
        && path.exists()
    {
        builder.set_certificate_chain_file(path)?;
    }
    if let Some(path) = ssl.key.as_deref()
        && path.exists()
    {
        builder.set_private_key_file(path, SslFiletype::PEM)?;
    }
    match ssl.mode {
        SslMode::Prefer | SslMode::Require => builder.set_verify(SslVerifyMode::NONE),
        _ => builder.set_verify(SslVerifyMode::PEER),
    }
    let mut connector = MakeTlsConnector::new(builder.build());
    if ssl.mode == SslMode::VerifyCa {
        connector.set_callback(|config, _host| {
            config.set_verify_hostname(false);
            Ok(())
        });
    }
    Ok(connector)
}

fn pool_error<E: std::error::Error + Send + Sync + 'static>(error: RunError<E>) -> Error {
    match error {
        RunError::User(e) => Error::new(e),
        RunError::TimedOut => Error::msg("Timed out while acquiring a connection from the pool"),
    }
}

impl Pool for PgPool {
    type Connection = PgClient;

    async fn acquire(&self) -> Result<PgClient> {
        let pooled = match self {
            PgPool::Plain(pool) => Pooled::Plain(pool.get_owned().await.map_err(pool_error)?),
            PgPool::Tls(pool) => Pooled::Tls(pool.get_owned().await.map_err(pool_error)?),
        };
        log::debug!("Acquired a pooled Postgres connection");
        Ok(PgClient::new(pooled))
    }
}

enum Pooled {
    Plain(PooledConnection<'static, PostgresConnectionManager<NoTls>>),
    Tls(PooledConnection<'static, PostgresConnectionManager<MakeTlsConnector>>),
}

impl Deref for Pooled {
    type Target = Client;

    fn deref(&self) -> &Client {
        match self {
            Pooled::Plain(v) => v,
            Pooled::Tls(v) => v,
        }
    }
}

/// Failure raised before the request was written to the server.
#[derive(Debug)]
enum NotSent {
    Closed,
    Prepare(tokio_postgres::Error),
}

impl Display for NotSent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotSent::Closed => f.write_str("connection closed"),
            NotSent::Prepare(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for NotSent {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NotSent::Closed => None,
            NotSent::Prepare(e) => Some(e),
        }
    }
}

const TX_IDLE: u8 = 0;
const TX_ACTIVE: u8 = 1;
/// A transaction block is open on the server but no handle will end it.
const TX_ABANDONED: u8 = 2;

/// A pooled client, given back to the pool on drop.
///
/// A transaction left open is rolled back before the next statement, or before the client returns
/// to the pool.
pub struct PgClient {
    pooled: Option<Pooled>,
    statements: Mutex<HashMap<String, Statement>>,
    transaction: AtomicU8,
}

impl PgClient {
    fn new(pooled: Pooled) -> Self {
        Self {
            pooled: Some(pooled),
            statements: Default::default(),
            transaction: AtomicU8::new(TX_IDLE),
        }
    }

    pub fn client(&self) -> &Client {
        match &self.pooled {
            Some(pooled) => pooled,
            None => unreachable!("the pooled connection is only taken when dropping"),
        }
    }

    /// Whether a transaction block is open on this connection.
    pub fn in_transaction(&self) -> bool {
        self.transaction.load(Ordering::Acquire) != TX_IDLE
    }

    fn lookup(&self, name: &str) -> Option<Statement> {
        self.statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Roll back a transaction whose handle was dropped, then check the connection is still open.
    async fn settle(&self) -> Result<()> {
        if self.transaction.load(Ordering::Acquire) == TX_ABANDONED {
            log::warn!("Rolling back a transaction that was neither committed nor rolled back");
            self.client().batch_execute("ROLLBACK").await?;
            self.transaction.store(TX_IDLE, Ordering::Release);
        }
        if self.client().is_closed() {
            return Err(NotSent::Closed.into());
        }
        Ok(())
    }

    async fn statement(&self, sql: &str) -> Result<Statement> {
        if let Some(statement) = self.lookup(sql) {
            return Ok(statement);
        }
        self.client().prepare(sql).await.map_err(|e| {
            if e.is_closed() {
                NotSent::Prepare(e).into()
            } else {
                e.into()
            }
        })
    }
}

impl Drop for PgClient {
    fn drop(&mut self) {
        if self.transaction.load(Ordering::Acquire) != TX_IDLE
            && let Some(pooled) = self.pooled.take()
        {
            match Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = pooled.batch_execute("ROLLBACK").await {
                            log::error!("While rolling back before releasing the connection: {:#}", e);
                        }
                        log::debug!("Released a pooled Postgres connection");
                    });
                    return;
                }
                Err(..) => log::warn!(
                    "No runtime to roll back the open transaction, releasing the connection as it is"
                ),
            }
        }
        log::debug!("Released a pooled Postgres connection");
    }
}

impl PoolConnection for PgClient {
    type Transaction<'c> = PgTransaction<'c>;

    fn is_closed(&self) -> bool {
        self.client().is_closed()
    }

    async fn prepare(&self, name: &str, sql: &str) -> Result<StatementDescription> {
        self.settle().await?;
        let statement = self.client().prepare(sql).await?;
        let description = StatementDescription {
            name: name.to_string(),
            sql: sql.to_string(),
            param_oids: statement.params().iter().map(|t| t.oid()).collect(),
            columns: statement
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        };
        self.statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), statement);
        log::debug!("Prepared `{}`", name);
        Ok(description)
    }

    async fn exec(&self, sql: &str, args: &[Value]) -> Result<u64> {
        self.settle().await?;
        if args.is_empty() && self.lookup(sql).is_none() {
            // Simple protocol, the text may hold several statements
            let messages = self.client().simple_query(sql).await?;
            return Ok(messages
                .iter()
                .filter_map(|m| match m {
                    SimpleQueryMessage::CommandComplete(rows) => Some(*rows),
                    _ => None,
                })
                .last()
                .unwrap_or(0));
        }
        let statement = self.statement(sql).await?;
        Ok(self
            .client()
            .execute_raw(&statement, args.iter().cloned().map(ValueHolder))
            .await?)
    }

    async fn query(
        &self,
        sql: &str,
        formats: &Arc<ResultFormats>,
        args: &[Value],
    ) -> Result<ResultStream> {
        self.settle().await?;
        let statement = self.statement(sql).await?;
        let columns: RowNames = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let stream = self
            .client()
            .query_raw(&statement, args.iter().cloned().map(ValueHolder))
            .await?;
        let formats = formats.clone();
        let rows: BoxStream<'static, Result<Row>> = try_stream! {
            let mut stream = pin!(stream);
            while let Some(row) = stream.try_next().await? {
                yield decode_row(&row, &formats)?;
            }
        }
        .boxed();
        Ok(ResultStream { columns, rows })
    }

    async fn ping(&self) -> Result<()> {
        self.settle().await?;
        Ok(self.client().batch_execute(";").await?)
    }

    async fn begin(&self, options: &BackendTxOptions) -> Result<PgTransaction<'_>> {
        self.settle().await?;
        // Dropped before BEGIN completes, the guard marks the block for rollback
        let mut transaction = PgTransaction {
            client: self,
            open: false,
        };
        self.transaction.store(TX_ACTIVE, Ordering::Release);
        self.client().batch_execute(&options.begin_sql()).await?;
        transaction.open = true;
        Ok(transaction)
    }

    async fn deallocate(&self, name: &str) -> Result<()> {
        let removed = self
            .statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        match removed {
            Some(..) => {
                log::debug!("Deallocated `{}`", name);
                Ok(())
            }
            None => Err(Error::msg(format!(
                "prepared statement \"{}\" does not exist",
                name
            ))),
        }
    }

    fn safe_to_retry(error: &Error) -> bool {
        error.is::<NotSent>()
    }
}

pub struct PgTransaction<'c> {
    client: &'c PgClient,
    open: bool,
}

impl PgTransaction<'_> {
    async fn finish(mut self, sql: &str) -> Result<()> {
        self.open = false;
        self.client.client().batch_execute(sql).await?;
        self.client.transaction.store(TX_IDLE, Ordering::Release);
        Ok(())
    }
}

impl BackendTransaction for PgTransaction<'_> {
    async fn commit(self) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PgTransaction<'_> {
    fn drop(&mut self) {
        if self.open {
            log::warn!("Dropping a Postgres transaction that was neither committed nor rolled back");
        }
        let _ = self.client.transaction.compare_exchange(
            TX_ACTIVE,
            TX_ABANDONED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}
