//! CLI command implementations.

pub mod collection;
pub mod demo;
mod output;
