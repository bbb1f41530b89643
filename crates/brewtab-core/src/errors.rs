/// Core error type shared by the bot and its adapters.
///
/// Adapter crates map their transport-specific failures (HTTP, JWT, Slack
/// `ok: false` envelopes) into this type so interaction handlers can treat
/// every failure the same way: log it and surface a short notice to the user.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
