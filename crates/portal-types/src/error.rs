//! Shared error types for the Portal bridge.

use crate::remote::{RemoteError, RemoteErrorKind};
use thiserror::Error;

/// Top-level error type for bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// No finder could produce the module. Host fallback depends on this
    /// variant passing through unchanged.
    #[error("No module named '{name}': {reason}")]
    ModuleNotFound {
        /// Dotted module name.
        name: String,
        /// Why it could not be found.
        reason: String,
    },

    /// `from module import name` found neither an attribute nor a submodule.
    #[error("cannot import name '{name}' from '{module}'")]
    CannotImportName {
        /// The requested name.
        name: String,
        /// The module it was requested from.
        module: String,
    },

    /// The remote service lacks a capability the request needs.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A strict remote lookup did not find the path.
    #[error("Remote lookup of '{path}' failed: {source}")]
    Lookup {
        /// Dotted path that was looked up.
        path: String,
        /// The remote failure.
        source: RemoteError,
    },

    /// An unexpected failure while importing, wrapped with context.
    #[error("Import of '{path}' failed: {message}")]
    Import {
        /// Dotted path being imported.
        path: String,
        /// Underlying cause.
        message: String,
    },

    /// A module or class has no such attribute.
    #[error("Attribute error on '{path}': {message}")]
    Attribute {
        /// Dotted path of the owner.
        path: String,
        /// Detail.
        message: String,
    },

    /// A forwarded operation failed remotely; the kind is preserved.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The remote connection is closed.
    #[error("Remote connection is closed")]
    ConnectionClosed,

    /// Invalid input from the embedding application.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl BridgeError {
    /// "No such attribute" on `path`.
    pub fn no_attribute(path: &str, name: &str) -> Self {
        Self::Attribute {
            path: path.to_string(),
            message: format!("'{path}' has no attribute '{name}'"),
        }
    }

    /// Whether this is the host's "no such module" protocol error.
    pub fn is_module_not_found(&self) -> bool {
        matches!(self, Self::ModuleNotFound { .. })
    }

    /// Whether this is an attribute-style miss (local or forwarded).
    pub fn is_attribute_error(&self) -> bool {
        match self {
            Self::Attribute { .. } => true,
            Self::Remote(e) => e.kind == RemoteErrorKind::Attribute,
            _ => false,
        }
    }

    /// The remote error kind, when this wraps one.
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Self::Remote(e) | Self::Lookup { source: e, .. } => Some(e.kind),
            _ => None,
        }
    }
}

/// Alias for Result with BridgeError.
pub type BridgeResult<T> = Result<T, BridgeError>;
