//! Security module for TaskTier: filesystem confinement to the project root.
//!
//! Every path a tool touches goes through [`resolve_in_root`] first.

pub mod path;

pub use path::{relative_to, resolve_in_root, PathValidationError};
