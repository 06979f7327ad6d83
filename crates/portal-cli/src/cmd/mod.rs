//! Command implementations by domain.

pub mod inspect;
pub mod session;
pub mod system;
