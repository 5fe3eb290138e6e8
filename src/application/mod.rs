//! Application services layer scaffolding.

pub mod error;
pub mod preview;
pub mod provider;
pub mod rdfa;
pub mod renderer;
