//! Container backend abstractions.
//!
//! Backends perform single attempts against a store. The in-memory backend
//! is used for tests and local development.

mod memory;
mod traits;

pub use memory::{Fault, MemoryContainer, QueryFilter};
pub use traits::*;
