//! CLI command implementations.

pub mod common;
pub mod hash;
pub mod inspect;
pub mod render;
pub mod validate;
