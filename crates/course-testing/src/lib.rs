//! Testing utilities for the course explorer.
//!
//! This crate provides:
//! - A headless terminal for rendering widgets and asserting on the buffer
//! - Input simulation for keyboard and mouse events
//! - Deterministic concept graphs, course trees and progress snapshots
//! - Property-based generators (feature `proptest-support`)

pub mod fixtures;
pub mod input;
pub mod terminal;

#[cfg(feature = "proptest-support")]
pub mod generators;

// Re-exports
pub use fixtures::Fixtures;
pub use input::InputSequence;
pub use terminal::TestTerminal;
