//! An embedded, schema-typed document store with a MongoDB-style query language.
//!
//! docvault keeps collections of JSON-like documents in memory. Each collection is described by
//! a [`Schema`](schema::Schema) whose typed paths cast, validate and convert values, and which
//! compiles query, update, sort and population expressions into callables. The whole store can
//! be persisted to, and restored from, a single JSON snapshot file.
//!
//! # Features
//!
//! - **Typed schemas** - String, Number, Integer, Boolean, Date, Buffer, Array, Object, Enum,
//!   CUID and Virtual paths with defaults, required checks and import/export conversions
//! - **Query language** - plain equality (`{ "name": "ann" }`), `$gt`, `$in`, `$regex`, `$and`,
//!   `$or`, `$where`, ... checked against the type of each path
//! - **Update language** - `$set`, `$inc`, `$push`, `$addToSet`, `$rename`, ...
//! - **Lifecycle hooks** - `pre`/`post` hooks around `save` and `remove`
//! - **Population** - Resolve reference paths into the documents of another model
//! - **Snapshots** - Versioned JSON persistence with upgrade/downgrade callbacks
//!
//! # Quick Start
//!
//! ```ignore
//! use docvault::prelude::*;
//! use bson::doc;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> StoreResult<()> {
//!     let db = Database::builder().path("blog.json").build();
//!
//!     let schema = Schema::from_json(&json!({
//!         "title": { "type": "String", "required": true },
//!         "views": "Number",
//!         "tags": ["String"],
//!         "created": "Date",
//!     }))?;
//!     let posts = db.model("Post", schema).await;
//!
//!     posts.insert(doc! { "title": "Hello", "tags": ["intro"], "created": bson::DateTime::now() }).await?;
//!     posts.update(doc! { "tags": "intro" }, doc! { "$inc": { "views": 1 } }).await?;
//!
//!     let popular = posts.find(doc! { "views": { "$gte": 1 } }).await?.sort("-created")?;
//!     for post in &popular {
//!         println!("{post}");
//!     }
//!
//!     db.save().await
//! }
//! ```
//!
//! # Crates
//!
//! - [`core`] - Schemas, field types and the expression compilers
//! - [`memory`] - The in-memory engine: models, documents, cursors and snapshots

pub mod prelude;

pub use docvault_core as core;
pub use docvault_memory as memory;

pub use docvault_core::{collection, error, gate, hook, populate, query, record, schema, sort, types, update, value};
