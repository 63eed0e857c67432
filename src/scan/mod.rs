//! Script discovery and classification.
//!
//! - **Discovery**: find entry-point scripts under the examples directory
//! - **Classification**: tag each script with the resources it depends on

pub mod classify;
pub mod discovery;

pub use classify::*;
pub use discovery::*;
