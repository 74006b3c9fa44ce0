pub mod catalog;
pub mod deletion;
pub mod memory;
pub mod query;
pub mod registration;
pub mod store;
pub mod writer;

pub use catalog::PartitionCatalog;
pub use deletion::{DeletionOrchestrator, DeletionReport};
pub use memory::MemoryRowStore;
pub use query::RowQueryService;
pub use registration::RegistrationCache;
pub use store::RowStore;
pub use writer::{RowWriter, WriteSummary};
