//! The record abstraction compiled predicates, hooks and methods operate on.
//!
//! A [`Record`] is anything that exposes a BSON document and can resolve dotted paths
//! against it. Plain [`bson::Document`]s are records; the storage engine's live document
//! type is one too, and additionally resolves virtual paths through their getters.

use bson::{Bson, Document};

use crate::value::get_path;

/// Read/write access to a document's data for compiled callables.
///
/// # Example
///
/// ```ignore
/// use docvault_core::record::Record;
/// use bson::doc;
///
/// let mut data = doc! { "title": "Hello" };
/// assert_eq!(data.get_value("title"), Some("Hello".into()));
/// data.data_mut().insert("title", "World");
/// ```
pub trait Record: Send + Sync {
    /// Returns the stored data of this record.
    fn data(&self) -> &Document;

    /// Returns the stored data of this record for in-place mutation.
    fn data_mut(&mut self) -> &mut Document;

    /// Resolves `path` against this record.
    ///
    /// The default reads the stored data; implementations with computed paths override it.
    fn get_value(&self, path: &str) -> Option<Bson> {
        get_path(self.data(), path).cloned()
    }

    /// Returns the `_id` of this record if it is a string.
    fn record_id(&self) -> Option<&str> {
        self.data().get("_id").and_then(Bson::as_str)
    }
}

impl Record for Document {
    fn data(&self) -> &Document {
        self
    }

    fn data_mut(&mut self) -> &mut Document {
        self
    }
}
