//! fleetd Catalog
//!
//! Provides the catalog abstraction used by the orchestrator:
//! - `Catalog` trait for the transactional member/workload store
//! - `MemoryCatalog` for testing and embedding

pub mod backend;
pub mod memory;

pub use backend::Catalog;
pub use memory::MemoryCatalog;
