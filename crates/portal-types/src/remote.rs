//! The remote side as the bridge sees it.
//!
//! A [`RemoteConnection`] hands out an entry object; every other remote object
//! is reached from there as a [`RemoteHandle`]. Handles expose a small fixed
//! operation set; the bridge never needs to know the concrete remote type.

use crate::value::Object;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Identifier of an object on the remote side, stable for its lifetime.
pub type ObjectId = u64;

/// Shared reference to a remote object.
pub type RemoteRef = Arc<dyn RemoteHandle>;

/// Keyword arguments, in call order.
pub type Kwargs = Vec<(String, Object)>;

/// Root capability a service exposes for multi-segment imports:
/// `import_module(dotted_path: str) -> module`.
pub const IMPORT_MODULE: &str = "import_module";

/// Result alias for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// A remote type as advertised by the other side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeInfo {
    /// Simple name, possibly decorated (e.g. `Outer.Inner`).
    pub name: String,
    /// Defining module, if the remote side reports one.
    pub module: Option<String>,
}

impl TypeInfo {
    /// Type info for `module.name`.
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: Some(module.into()),
        }
    }

    /// Type info with no module.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: None,
        }
    }

    /// `module.name`, or just `name` when no module is known.
    pub fn qualified_name(&self) -> String {
        match self.module.as_deref() {
            Some(m) if !m.is_empty() => format!("{m}.{}", self.name),
            _ => self.name.clone(),
        }
    }
}

/// Category of a remote failure. Forwarding preserves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The attribute does not exist.
    Attribute,
    /// The remote security policy refused the access.
    AccessDenied,
    /// Wrong type for the operation (not callable, not indexable, ...).
    Type,
    /// Missing mapping key.
    Key,
    /// Sequence index out of range.
    Index,
    /// Bad argument value.
    Value,
    /// The remote side could not import a module.
    Import,
    /// The connection is closed or broken.
    Connection,
    /// Anything else raised remotely.
    Internal,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Attribute => "AttributeError",
            Self::AccessDenied => "AccessDenied",
            Self::Type => "TypeError",
            Self::Key => "KeyError",
            Self::Index => "IndexError",
            Self::Value => "ValueError",
            Self::Import => "ImportError",
            Self::Connection => "ConnectionError",
            Self::Internal => "RemoteError",
        };
        f.write_str(name)
    }
}

/// A failure reported by, or while talking to, the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// Failure category.
    pub kind: RemoteErrorKind,
    /// Human-readable detail, with any context prepended.
    pub message: String,
}

impl RemoteError {
    /// Create an error of the given kind.
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Missing attribute.
    pub fn attribute(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Attribute, message)
    }

    /// Refused by remote policy.
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::AccessDenied, message)
    }

    /// Wrong type.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Type, message)
    }

    /// Remote import failure.
    pub fn import(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Import, message)
    }

    /// Connection closed or broken.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Connection, message)
    }

    /// Prefix `context` to the message, keeping the kind.
    pub fn with_context(self, context: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{context}: {}", self.message),
        }
    }

    /// Whether this means "the thing you asked for is not there" (as opposed
    /// to an unexpected failure). A policy refusal is not a miss.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self.kind,
            RemoteErrorKind::Attribute | RemoteErrorKind::Import | RemoteErrorKind::Key
        )
    }
}

/// An object living in the other process.
///
/// Every method may block on the connection. Implementations must report a
/// closed connection as [`RemoteErrorKind::Connection`].
pub trait RemoteHandle: Send + Sync {
    /// Remote identity of the object.
    fn object_id(&self) -> ObjectId;

    /// The object's runtime type as advertised remotely.
    fn type_of(&self) -> RemoteResult<TypeInfo>;

    /// If the object is itself a class, its own name and module.
    fn class_info(&self) -> RemoteResult<Option<TypeInfo>>;

    /// Whether reading `name` would succeed.
    fn has_attr(&self, name: &str) -> RemoteResult<bool>;

    /// Read an attribute.
    fn get_attr(&self, name: &str) -> RemoteResult<Object>;

    /// Write an attribute.
    fn set_attr(&self, name: &str, value: Object) -> RemoteResult<()>;

    /// Call the object.
    fn call(&self, args: Vec<Object>, kwargs: Kwargs) -> RemoteResult<Object>;

    /// `self[key]`.
    fn get_item(&self, key: Object) -> RemoteResult<Object>;

    /// `self[key] = value`.
    fn set_item(&self, key: Object, value: Object) -> RemoteResult<()>;

    /// Number of items.
    fn len(&self) -> RemoteResult<usize>;

    /// Whether `len()` is zero.
    fn is_empty(&self) -> RemoteResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Iterate the object, materialising every item.
    fn iter(&self) -> RemoteResult<Vec<Object>>;

    /// Remote equality against `other`.
    fn equals(&self, other: &Object) -> RemoteResult<bool>;

    /// Remote hash.
    fn hash_value(&self) -> RemoteResult<u64>;

    /// Remote truthiness.
    fn truthy(&self) -> RemoteResult<bool>;

    /// Remote `str()`.
    fn to_str(&self) -> RemoteResult<String>;

    /// Remote `repr()`.
    fn repr(&self) -> RemoteResult<String>;
}

/// A live connection to the remote process.
pub trait RemoteConnection: Send + Sync {
    /// The service entry object. Top-level names are attributes of it.
    fn root(&self) -> RemoteResult<RemoteRef>;

    /// Whether the connection has been closed.
    fn is_closed(&self) -> bool;
}
