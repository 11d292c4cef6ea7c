//! In-memory storage engine for docvault.
//!
//! This crate keeps every collection in process memory and persists the whole store as a single
//! JSON snapshot file.
//!
//! # Features
//!
//! - **Models** ([`model`]) - Per-schema collections with id bookkeeping, hooks and population
//! - **Documents** ([`document`]) - Live records bound to their model
//! - **Cursors** ([`cursor`]) - Ordered, immutable views with chainable reads and bulk writes
//! - **Database** ([`database`]) - The model registry and snapshot persistence
//!
//! # Quick Start
//!
//! ```ignore
//! use docvault_core::{schema::{Definition, Schema}, types::TypeName};
//! use docvault_memory::Database;
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::builder().path("db.json").version(1).build();
//!
//!     let mut schema = Schema::new();
//!     schema.path("name", Definition::Type(TypeName::String))?;
//!     schema.path("age", Definition::Type(TypeName::Number))?;
//!     let users = db.model("User", schema).await;
//!
//!     users.insert(doc! { "name": "Alice", "age": 30 }).await?;
//!     let adults = users.find(doc! { "age": { "$gte": 18 } }).await?;
//!     assert_eq!(adults.len(), 1);
//!
//!     db.save().await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docvault_memory;

pub mod cursor;
pub mod database;
pub mod document;
pub mod model;

pub use cursor::{Cursor, FindOptions};
pub use database::{Database, DatabaseBuilder, DatabaseOptions};
pub use document::Document;
pub use model::Model;
