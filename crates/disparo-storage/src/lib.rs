//! Disparo Storage - Persistence for campaigns and recovery flows
//!
//! This crate provides the data model, the repository traits the
//! scheduling core works against, and their PostgreSQL and in-memory
//! implementations.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;
