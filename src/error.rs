//! Root error taxonomy.
//!
//! Every fallible operation in this crate returns a `Result<_, DgError>` (or
//! a narrower module-local error that converts into one via `#[from]`). The
//! boundary between this crate and a caller converts `DgError` into the
//! stable `DG_*` JSON error envelope described in the external interface
//! contract; see [`DgError::code`].

use crate::{chain, engine, namespace, signer, validate};

/// Stable error code surfaced at the external boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DgCode {
    SchemaInvalid,
    InputInvalid,
    Unauthorized,
    IntegrityFail,
    SignatureInvalid,
    InternalError,
}

impl DgCode {
    /// The wire string, e.g. `"DG_SCHEMA_INVALID"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DgCode::SchemaInvalid => "DG_SCHEMA_INVALID",
            DgCode::InputInvalid => "DG_INPUT_INVALID",
            DgCode::Unauthorized => "DG_UNAUTHORIZED",
            DgCode::IntegrityFail => "DG_INTEGRITY_FAIL",
            DgCode::SignatureInvalid => "DG_SIGNATURE_INVALID",
            DgCode::InternalError => "DG_INTERNAL_ERROR",
        }
    }
}

/// Root error type for the crate's public API.
#[derive(Debug, thiserror::Error)]
pub enum DgError {
    #[error(transparent)]
    Validation(#[from] validate::ValidationError),
    #[error(transparent)]
    Chain(#[from] chain::ChainError),
    #[error(transparent)]
    Namespace(#[from] namespace::NamespaceError),
    #[error(transparent)]
    Signature(#[from] signer::SignatureError),
    #[error(transparent)]
    Engine(#[from] engine::EngineError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl DgError {
    /// Map to the stable external code.
    pub fn code(&self) -> DgCode {
        match self {
            DgError::Validation(_) => DgCode::InputInvalid,
            DgError::Chain(e) => e.code(),
            DgError::Namespace(e) => e.code(),
            DgError::Signature(_) => DgCode::SignatureInvalid,
            DgError::Engine(e) => e.code(),
            DgError::Internal(_) => DgCode::InternalError,
        }
    }
}

/// The `{code, message, details?, request_id?}` error envelope.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorEnvelope {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl From<&DgError> for ErrorEnvelope {
    fn from(e: &DgError) -> Self {
        ErrorEnvelope {
            code: e.code().as_str(),
            message: e.to_string(),
            details: None,
            request_id: None,
        }
    }
}
