use std::fmt;

/// Main error type for the job execution platform
#[derive(Debug)]
pub enum Error {
    /// Configuration errors
    Config(String),

    /// Transport errors: HTTP, AMQP, CQL
    Transport(String),

    /// Authentication/Authorization errors (token acquisition, 401s)
    Unauthorized(String),

    /// Not found errors
    NotFound(String),

    /// The sandbox pool has no available box
    SandboxBusy,

    /// An `isolate` subprocess invocation failed or timed out
    Execution(String),

    /// Serialization/deserialization errors
    Serialization(serde_json::Error),

    /// IO errors
    Io(std::io::Error),

    /// Generic errors with description
    Other(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Transport(msg) => write!(f, "Transport error: {}", msg),
            Error::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::SandboxBusy => write!(f, "No sandbox available"),
            Error::Execution(msg) => write!(f, "Execution error: {}", msg),
            Error::Serialization(e) => write!(f, "Serialization error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Serialization(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Config(error.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Error::Config(error.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Transport(error.to_string())
    }
}

impl From<lapin::Error> for Error {
    fn from(error: lapin::Error) -> Self {
        Error::Transport(format!("amqp: {}", error))
    }
}

impl From<scylla::transport::errors::QueryError> for Error {
    fn from(error: scylla::transport::errors::QueryError) -> Self {
        Error::Transport(format!("cql: {}", error))
    }
}

impl From<scylla::transport::errors::NewSessionError> for Error {
    fn from(error: scylla::transport::errors::NewSessionError) -> Self {
        Error::Transport(format!("cql session: {}", error))
    }
}

impl From<uuid::Error> for Error {
    fn from(error: uuid::Error) -> Self {
        Error::Other(format!("invalid UUID: {}", error))
    }
}

impl From<ulid::DecodeError> for Error {
    fn from(error: ulid::DecodeError) -> Self {
        Error::Other(format!("invalid ULID: {}", error))
    }
}

// Common error constructors, following the same builder style throughout
// the jobs subsystem.
impl Error {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Error::Config(msg.into())
    }

    pub fn transport<T: Into<String>>(msg: T) -> Self {
        Error::Transport(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        Error::Unauthorized(msg.into())
    }

    pub fn execution<T: Into<String>>(msg: T) -> Self {
        Error::Execution(msg.into())
    }

    pub fn other<T: Into<String>>(msg: T) -> Self {
        Error::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_variant() {
        assert_eq!(Error::SandboxBusy.to_string(), "No sandbox available");
        assert_eq!(
            Error::execution("isolate exit status 2").to_string(),
            "Execution error: isolate exit status 2"
        );
    }
}
