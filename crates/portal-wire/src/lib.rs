//! Portal wire: the remote side of a bridge, served in-process.
//!
//! Provides an object graph that speaks the [`portal_types::RemoteConnection`]
//! contract without a network hop.
//!
//! ## Architecture
//!
//! - **ObjectSpace**: Owns the served graph and acts as the connection
//! - **Handle**: A reference to one served object, enforcing the access policy
//! - **ClassBuilder / ModuleBuilder**: Declare classes and modules natively
//! - **bundled**: A sample namespace used by the CLI and the test suites

pub mod bundled;
pub mod class;
pub mod space;

pub use bundled::{sample_space, sample_space_with, SAMPLE_ROOTS};
pub use class::{native, ClassBuilder, Invocation, ModuleBuilder, NativeFn};
pub use space::{Handle, ObjectSpace, SpaceOptions, IMPORT_MODULE};
