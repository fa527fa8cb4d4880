use sqldrv_core::{Error, ErrorContext, Result};
use std::{env, path::PathBuf, str::FromStr, thread, time::Duration};
use url::Url;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    #[default]
    Disable,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl FromStr for SslMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        Ok(match value {
            "disable" => SslMode::Disable,
            "prefer" => SslMode::Prefer,
            "require" => SslMode::Require,
            "verify-ca" => SslMode::VerifyCa,
            "verify-full" => SslMode::VerifyFull,
            _ => return Err(Error::msg(format!("Unknown sslmode `{}`", value))),
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SslOptions {
    pub mode: SslMode,
    pub root_cert: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_size: u32,
    pub min_idle: Option<u32>,
    pub connection_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        let cpus = thread::available_parallelism().map_or(1, |v| v.get());
        Self {
            max_size: u32::try_from(cpus).unwrap_or(u32::MAX).max(4),
            min_idle: None,
            connection_timeout: Duration::from_secs(30),
        }
    }
}

/// Connection string split into the part understood by `tokio_postgres` and the keys consumed by
/// the pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub client: tokio_postgres::Config,
    pub pool: PoolOptions,
    pub ssl: SslOptions,
}

const OWN_KEYS: [&str; 7] = [
    "pool_max_conns",
    "pool_min_conns",
    "pool_connect_timeout",
    "sslmode",
    "sslrootcert",
    "sslcert",
    "sslkey",
];

impl PostgresConfig {
    pub fn parse(dsn: &str) -> Result<Self> {
        Self::parse_inner(dsn).context("While parsing the connection string")
    }

    fn parse_inner(dsn: &str) -> Result<Self> {
        let dsn = dsn.trim();
        let (rest, own) = if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
            split_url(dsn)?
        } else {
            split_key_value(dsn)
        };
        let take = |key: &str| {
            own.iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        let take_or_env = |key: &str, env_var: &str| take(key).or_else(|| env::var(env_var).ok());

        let mut pool = PoolOptions::default();
        if let Some(value) = take("pool_max_conns") {
            pool.max_size = value
                .parse()
                .with_context(|| format!("Invalid pool_max_conns `{}`", value))?;
            if pool.max_size == 0 {
                return Err(Error::msg("pool_max_conns must be greater than 0"));
            }
        }
        if let Some(value) = take("pool_min_conns") {
            pool.min_idle = Some(
                value
                    .parse()
                    .with_context(|| format!("Invalid pool_min_conns `{}`", value))?,
            );
        }
        if let Some(value) = take("pool_connect_timeout") {
            pool.connection_timeout = Duration::from_secs(
                value
                    .parse()
                    .with_context(|| format!("Invalid pool_connect_timeout `{}`", value))?,
            );
        }
        let ssl = SslOptions {
            mode: take_or_env("sslmode", "PGSSLMODE")
                .as_deref()
                .map(SslMode::from_str)
                .transpose()?
                .unwrap_or_default(),
            root_cert: take_or_env("sslrootcert", "PGSSLROOTCERT").map(PathBuf::from),
            cert: take_or_env("sslcert", "PGSSLCERT").map(PathBuf::from),
            key: take_or_env("sslkey", "PGSSLKEY").map(PathBuf::from),
        };
        let client = tokio_postgres::Config::from_str(&rest)?;
        Ok(Self { client, pool, ssl })
    }
}

fn split_url(dsn: &str) -> Result<(String, Vec<(String, String)>)> {
    let mut url = Url::parse(dsn)?;
    let (own, rest): (Vec<(String, String)>, Vec<(String, String)>) = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .partition(|(k, _)| OWN_KEYS.contains(&k.as_str()));
    if rest.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(rest.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    Ok((url.into(), own))
}

fn split_key_value(dsn: &str) -> (String, Vec<(String, String)>) {
    let mut own = Vec::new();
    let mut rest = Vec::new();
    for token in dsn.split_whitespace() {
        match token.split_once('=') {
            Some((k, v)) if OWN_KEYS.contains(&k.trim()) => {
                own.push((k.trim().to_string(), v.trim_matches('\'').to_string()))
            }
            _ => rest.push(token),
        }
    }
    (rest.join(" "), own)
}
