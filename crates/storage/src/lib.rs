pub mod memory;

pub use memory::{MemoryRecord, MemoryStore};
