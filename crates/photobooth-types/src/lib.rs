//! Shared domain types for the photobooth workspace.

pub mod color;
pub mod config;
pub mod frame;
pub mod lifecycle;
pub mod photo;

mod errors;

pub use errors::{PhotoboothError, Result};
