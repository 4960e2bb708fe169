//! Command implementations for the tap CLI

pub mod discover;
pub mod sync;
