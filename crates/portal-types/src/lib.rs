//! Core types and traits for the Portal remote object bridge.
//!
//! This crate defines the data that crosses the bridge ([`value::Value`],
//! [`value::Object`]), the contract a remote connection must honour
//! ([`remote::RemoteHandle`], [`remote::RemoteConnection`]), the shared
//! error taxonomy, and the bridge configuration. It contains no business logic.

pub mod config;
pub mod error;
pub mod remote;
pub mod value;

pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use remote::{
    Kwargs, ObjectId, RemoteConnection, RemoteError, RemoteErrorKind, RemoteHandle, RemoteRef,
    RemoteResult, TypeInfo, IMPORT_MODULE,
};
pub use value::{Object, Value};
