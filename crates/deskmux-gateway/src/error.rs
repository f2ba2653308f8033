use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP server error: {0}")]
    Http(#[from] std::io::Error),

    #[error("invalid bind address {0:?}: {1}")]
    InvalidBind(String, std::net::AddrParseError),
}
