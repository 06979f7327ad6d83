//! Core of the Portal bridge.
//!
//! Resolves imports and attribute accesses against objects living behind a
//! [`portal_types::RemoteConnection`] and hands back local stand-ins.
//!
//! ## Architecture
//!
//! - **ImportSystem**: Module table and finder chain the bridge plugs into
//! - **Bridge**: Forced/discovered root tracking, hook install and uninstall
//! - **RemoteFinder**: Decides per dotted name whether and how strictly to resolve
//! - **ProxyGenerator**: Fabricates and caches stand-in classes and modules
//! - **ProxyInstance**: Forwards every operation to its remote handle
//! - **TypeMapper**: Type membership for raw remote handles

pub mod bridge;
pub mod config;
pub mod eligibility;
pub mod generator;
pub mod hook;
pub mod host;
pub mod proxy;
pub mod type_map;

pub use bridge::{Bridge, BridgeGuard};
pub use config::load_config;
pub use eligibility::{Eligibility, RootState};
pub use generator::ProxyGenerator;
pub use hook::RemoteFinder;
pub use host::{AttributeResolver, Finder, ImportSystem, Loader, LocalModules, Module, ModuleSpec};
pub use proxy::{Entity, ProxyClass, ProxyInstance};
pub use type_map::{ProxyTypeId, TypeIdentity, TypeMapper};
