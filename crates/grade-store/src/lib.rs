//! In-memory implementation of the job record store.

mod memory;

pub use grade_types::{JobStore, JobStoreError};
pub use memory::InMemoryJobStore;
