//! CLI command implementations.

pub mod demo;
pub mod preview;
pub mod room;
pub mod validate;
