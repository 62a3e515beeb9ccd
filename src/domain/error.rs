//! Domain error types.

/// Top-level error type for tickwise.
#[derive(Debug, thiserror::Error)]
pub enum TickwiseError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("malformed tick: {reason}")]
    MalformedTick { reason: String },

    #[error("persistence write failed for {strategy} after {attempts} attempts: {reason}")]
    PersistenceWrite {
        strategy: String,
        attempts: u32,
        reason: String,
    },

    #[error("order rejected for {strategy}: {reason}")]
    OrderRejected { strategy: String, reason: String },

    #[error("recovery mismatch for {strategy}: {reason}")]
    RecoveryMismatch { strategy: String, reason: String },

    #[error("no strategies available to run")]
    NoStrategies,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&TickwiseError> for std::process::ExitCode {
    fn from(err: &TickwiseError) -> Self {
        let code: u8 = match err {
            TickwiseError::Io(_) | TickwiseError::MalformedTick { .. } => 1,
            TickwiseError::ConfigParse { .. }
            | TickwiseError::ConfigMissing { .. }
            | TickwiseError::ConfigInvalid { .. } => 2,
            TickwiseError::Database { .. }
            | TickwiseError::DatabaseQuery { .. }
            | TickwiseError::PersistenceWrite { .. } => 3,
            TickwiseError::RecoveryMismatch { .. } | TickwiseError::OrderRejected { .. } => 4,
            TickwiseError::NoStrategies => 5,
        };
        std::process::ExitCode::from(code)
    }
}
