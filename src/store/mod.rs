pub mod memory;

pub use memory::{InMemoryCourierDirectory, InMemoryOrderRepository};
