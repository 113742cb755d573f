use thiserror::Error;

/// Fatal, load-time errors. The process refuses to enter the poll loop on any
/// of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown device '{device}' in action '{description}'")]
    UnknownDevice { device: String, description: String },

    #[error("cannot resolve address '{address}' for device '{device}'")]
    BadAddress { device: String, address: String },

    #[error("action '{description}' has no offset")]
    MissingOffset { description: String },

    #[error("abort action '{description}' must not have an offset")]
    UnexpectedOffset { description: String },

    #[error("action '{description}' offset {offset}s is outside the slot range [{min}s, {max}s]")]
    OffsetOutOfRange {
        description: String,
        offset: f64,
        min: f64,
        max: f64,
    },

    #[error("'{name}' must be positive (got {value}s)")]
    NonPositiveInterval { name: &'static str, value: f64 },
}

/// Transient, poll-time errors from the competition source. The loop treats a
/// failed poll as "no match this tick" and keeps going.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("competition source unavailable: {0}")]
    Unavailable(String),

    #[error("competition source returned a malformed response: {0}")]
    Malformed(String),
}

/// Transient, dispatch-time errors from the device transport. Logged, never
/// retried; the action stays marked as attempted.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to send to {addr}: {source}")]
    Send {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode message '{message}': {reason}")]
    Encode { message: String, reason: String },
}
