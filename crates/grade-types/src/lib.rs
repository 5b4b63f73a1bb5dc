//! Core types and traits for the exam grading job client.
//!
//! Job snapshots align with the grading backend's JSON for wire compatibility.

mod job;
mod traits;

pub use job::*;
pub use traits::*;
