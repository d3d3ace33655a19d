//! Core types for Calliope.

pub mod generation;
pub mod grounding;
pub mod message;

pub use generation::*;
pub use grounding::*;
pub use message::*;
