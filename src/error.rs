use thiserror::Error;

/// Errors surfaced by one scheduling cycle. Variants line up with the error
/// kinds enumerated for the orchestrator: config problems and allocation
/// bugs are fatal, transport failures are fatal for the cycle only, health
/// skips and delivery failures are non-fatal.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("health check failed, skipping cycle: {0}")]
    HealthSkip(String),

    #[error("allocation algorithm produced an invalid result: {0}")]
    AllocationBug(String),

    #[error("failed to deliver report email: {0}")]
    Delivery(String),
}

/// Failures found while validating `conf/scheduler.yml` against the engine's
/// current pool tree.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("section [{0}] is required")]
    MissingSection(&'static str),

    #[error("option [{option}] is required in section [{section}]")]
    MissingOption {
        section: &'static str,
        option: &'static str,
    },

    #[error("option [{section}.{option}: {value}] is not allowed")]
    EmptyOption {
        section: &'static str,
        option: &'static str,
        value: String,
    },

    #[error(
        "option [{section}.{option}: {value}] is not allowed, it must be valued in (0, 1.0]"
    )]
    OutOfRange {
        section: &'static str,
        option: &'static str,
        value: f64,
    },

    #[error("pool [{0}] is not allowed, it must be one of the engine's configured pools")]
    UnknownPool(String),

    #[error(
        "pool [{pool}] bounds invalid: expected 0 < min_mem({min_mem}) <= current({current}) <= max_mem({max_mem})"
    )]
    PoolBounds {
        pool: String,
        min_mem: f64,
        current: f64,
        max_mem: f64,
    },
}

/// HTTP-transport level failures talking to the cluster manager.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed with status {status}: {body}")]
    BadStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
