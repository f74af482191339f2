use thiserror::Error;

/// Stable, wire-safe error codes. Case-sensitive strings on the IPC wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AppErrorCode {
    InvalidArgument,
    NotFound,
    Exists,
    InvalidState,
    Unsupported,
    Interrupted,
    InternalError,
    Unknown,
}

impl AppErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppErrorCode::InvalidArgument => "invalidArgument",
            AppErrorCode::NotFound => "notFound",
            AppErrorCode::Exists => "exists",
            AppErrorCode::InvalidState => "invalidState",
            AppErrorCode::Unsupported => "unsupported",
            AppErrorCode::Interrupted => "interrupted",
            AppErrorCode::InternalError => "internalError",
            AppErrorCode::Unknown => "unknown",
        }
    }
}

/// The structured error propagated through the Message error slot and
/// re-raised as a typed error on the client side. Mirrors `OmniAgentError`'s
/// shape but keyed to the spec's fixed error taxonomy instead of one
/// variant per external crate.
#[derive(Error, Debug, Clone, serde::Serialize, serde::Deserialize)]
#[error("{code:?}: {message}")]
pub struct AppError {
    pub code: AppErrorCode,
    pub message: String,
}

impl AppError {
    pub fn new(code: AppErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(AppErrorCode::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(AppErrorCode::NotFound, message)
    }

    pub fn exists(message: impl Into<String>) -> Self {
        Self::new(AppErrorCode::Exists, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(AppErrorCode::InvalidState, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(AppErrorCode::Unsupported, message)
    }

    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::new(AppErrorCode::Interrupted, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AppErrorCode::InternalError, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(AppErrorCode::Unknown, message)
    }

    pub fn volume_in_use(name: &str) -> Self {
        Self::invalid_state(format!("volume {name} is in use"))
    }

    pub fn plugin_not_found(name: &str) -> Self {
        Self::not_found(format!("plugin {name} not found"))
    }

    pub fn plugin_not_loaded(name: &str) -> Self {
        Self::invalid_state(format!("plugin {name} not loaded"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::invalid_argument(err.to_string())
    }
}

/// Catch-all conversion used by the IPC server when a handler fails with a
/// non-structured error (spec.md §4.3 step 3, §7 propagation policy).
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::unknown(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
