//! Error types for tiera

use thiserror::Error;

/// Load-time and query-time errors.
///
/// Everything except `MissingScope`, `DatasourceRuntime` and `Cancelled` is
/// raised while registering datasources or loading policies and blocks
/// activation of the affected policy graph.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error in datasource '{datasource}': {message}")]
    Configuration { datasource: String, message: String },

    #[error("invalid option '{option}' for datasource '{datasource}': {reason}")]
    Validation {
        datasource: String,
        option: String,
        reason: String,
    },

    #[error("unknown datasource: {0}")]
    UnknownDatasource(String),

    #[error("datasource already registered: {0}")]
    DuplicateDatasource(String),

    #[error("unknown policy: {0}")]
    UnknownPolicy(String),

    #[error("policy already defined: {0}")]
    DuplicatePolicy(String),

    #[error("invalid policy '{policy}': {message}")]
    InvalidPolicy { policy: String, message: String },

    #[error("scope variable '{0}' is not set")]
    MissingScope(String),

    #[error("stage '{stage}' of policy '{policy}' ({datasource}) failed: {source}")]
    DatasourceRuntime {
        policy: String,
        stage: String,
        datasource: String,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Datasource(#[from] DatasourceError),

    #[error("resolution cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn configuration(datasource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            datasource: datasource.into(),
            message: message.into(),
        }
    }

    pub fn invalid_policy(policy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            policy: policy.into(),
            message: message.into(),
        }
    }

    pub fn validation(
        datasource: impl Into<String>,
        option: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            datasource: datasource.into(),
            option: option.into(),
            reason: reason.into(),
        }
    }

    /// True for errors confined to one stage of one query. The cascade
    /// logs these and moves on to the next stage.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MissingScope(_)
                | Self::Configuration { .. }
                | Self::Datasource(_)
                | Self::DatasourceRuntime { .. }
        )
    }
}

/// Failure of a datasource backend during one lookup.
#[derive(Error, Debug)]
pub enum DatasourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("{0}")]
    Invalid(String),
}

impl DatasourceError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
