//! The collection interface seen by static methods.
//!
//! Storage engines implement [`Collection`] for their per-schema document sets. Static methods
//! registered on a [`Schema`](crate::schema::Schema) receive the collection they are called on
//! as an `Arc<dyn Collection>`, which keeps schemas independent of any particular engine.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::future::BoxFuture;

use crate::{error::StoreResult, query::Expr, schema::Schema};

/// Engine-independent view over one collection, working on plain document data.
///
/// # Example
///
/// ```ignore
/// schema.statics("published_count", |collection, _args| async move {
///     let published = collection.find_data(Filter::eq("published", true)).await?;
///     Ok(Bson::Int64(published.len() as i64))
/// })?;
/// ```
#[async_trait]
pub trait Collection: Send + Sync + Debug {
    /// Name the collection is registered under.
    fn name(&self) -> &str;

    fn schema(&self) -> &Arc<Schema>;

    /// Number of stored documents.
    async fn count_documents(&self) -> usize;

    /// Inserts `data` and returns the stored form.
    async fn insert_data(&self, data: Document) -> StoreResult<Document>;

    /// Returns the stored data for `id`, if any.
    async fn get_data(&self, id: &str) -> StoreResult<Option<Document>>;

    /// Returns the stored data of every document matching `query`, in storage order.
    async fn find_data(&self, query: Expr) -> StoreResult<Vec<Document>>;

    /// Applies an update expression to the document `id` and returns the stored result.
    async fn update_data(&self, id: &str, update: Document) -> StoreResult<Document>;

    /// Removes the document `id` and returns its last stored data.
    async fn remove_data(&self, id: &str) -> StoreResult<Document>;
}

/// Signature of static methods.
pub type StaticMethod =
    Arc<dyn Fn(Arc<dyn Collection>, Vec<Bson>) -> BoxFuture<'static, StoreResult<Bson>> + Send + Sync>;
