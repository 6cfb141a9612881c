//! Repository Module
//!
//! Data access layer for the dispatcher's control tables.
//! Each repository handles database operations for a specific table.

pub mod acl;
pub mod assets;
pub mod lookups;
pub mod pipelines;
pub mod scripts;

// Re-export for convenience
pub use acl as acl_repository;
pub use assets as asset_repository;
pub use lookups as lookup_repository;
pub use pipelines as pipeline_repository;
pub use scripts as script_repository;
