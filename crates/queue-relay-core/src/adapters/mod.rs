//! # Infrastructure Adapters
//!
//! In-process implementations of the queue client and failure log ports.

pub mod filesystem_failure_log;
pub mod memory_failure_log;
pub mod memory_queue;

pub use filesystem_failure_log::FilesystemFailureLogStorage;
pub use memory_failure_log::InMemoryFailureLogStorage;
pub use memory_queue::{InMemoryConsumer, InMemoryProducer, InMemoryQueueContext, PublishedMessage};
