//! Schema, type system and expression compilers for the docvault document store.
//!
//! This crate is the engine-independent core of docvault and provides:
//!
//! - **Values** ([`value`]) - Dotted path access, loose equality, ordering and JSON conversion over BSON
//! - **Records** ([`record`]) - The document view compiled callables operate on
//! - **Field types** ([`types`]) - The polymorphic per-path type system with its operator registries
//! - **Schemas** ([`schema`]) - Field declarations compiled into getter/setter/import/export pipelines
//! - **Queries** ([`query`]) - Query expression trees, the `Filter` builder and the predicate compiler
//! - **Updates** ([`update`]) - Update expression parsing and the mutator compiler
//! - **Sorting** ([`sort`]) - Sort expressions and the comparator compiler
//! - **Population** ([`populate`]) - Reference population descriptors
//! - **Hooks** ([`hook`]) - Asynchronous `save`/`remove` lifecycle hooks
//! - **Serialization gate** ([`gate`]) - FIFO critical sections across suspension points
//! - **Collections** ([`collection`]) - The collection interface static methods run against
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docvault_core::{schema::{Definition, Schema}, types::TypeName};
//! use bson::doc;
//!
//! let mut schema = Schema::new();
//! schema.path("title", Definition::Type(TypeName::String))?;
//! schema.path("views", Definition::Type(TypeName::Number))?;
//!
//! let predicate = schema.compile_query(doc! { "views": { "$gt": 10 } })?;
//! assert!(predicate(&doc! { "title": "Hello", "views": 12 }));
//! ```

#[allow(unused_extern_crates)]
extern crate self as docvault_core;

pub mod collection;
pub mod error;
pub mod gate;
pub mod hook;
pub mod populate;
pub mod query;
pub mod record;
pub mod schema;
pub mod sort;
pub mod types;
pub mod update;
pub mod value;
