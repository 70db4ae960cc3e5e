//! Provider implementations of the [`QueueClient`](crate::client::QueueClient) trait.

pub mod memory;

pub use memory::InMemoryQueueClient;
