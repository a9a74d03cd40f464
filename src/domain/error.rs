//! Domain error types.

/// Top-level error type for ashback.
#[derive(Debug, thiserror::Error)]
pub enum AshbackError {
    #[error("data error: {reason}")]
    Data { reason: String },

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

    #[error("unknown selector: {0}")]
    UnknownSelector(String),

    #[error("unknown exit rule: {0}")]
    UnknownExitRule(String),

    #[error("no data for {code}")]
    NoData { code: String },

    #[error("insufficient data for {code}: have {bars} bars, need {minimum}")]
    InsufficientData {
        code: String,
        bars: usize,
        minimum: usize,
    },

    /// A core ledger invariant was broken. Aborts the run instead of
    /// silently clamping.
    #[error("accounting violation: {reason}")]
    AccountingViolation { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&AshbackError> for std::process::ExitCode {
    fn from(err: &AshbackError) -> Self {
        let code: u8 = match err {
            AshbackError::Io(_) => 1,
            AshbackError::ConfigParse { .. }
            | AshbackError::ConfigMissing { .. }
            | AshbackError::ConfigInvalid { .. }
            | AshbackError::UnknownSelector(_)
            | AshbackError::UnknownExitRule(_) => 2,
            AshbackError::Data { .. } => 3,
            AshbackError::NoData { .. } | AshbackError::InsufficientData { .. } => 4,
            AshbackError::AccountingViolation { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
