//! Ordered, immutable views over documents.
//!
//! A [`Cursor`] is what every multi-document read returns. Reads on a cursor (`find`, `sort`,
//! `slice`, ...) produce new cursors and never touch the store; the bulk writes (`update`,
//! `replace`, `remove`) go back to the model of each document.

use std::sync::Arc;

use futures::future::try_join_all;
use rand::seq::SliceRandom;

use docvault_core::{
    error::{StoreError, StoreResult},
    populate::IntoPopulate,
    query::IntoQuery,
    schema::Schema,
    sort::IntoSort,
};

use crate::document::Document;

/// Paging applied after a query matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub skip: usize,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// An ordered list of documents sharing one schema.
///
/// # Example
///
/// ```ignore
/// let titles = posts
///     .find(doc! { "published": true })
///     .await?
///     .sort("-created")?
///     .limit(10)
///     .map(|post| post.get("title"));
/// ```
#[derive(Debug, Clone)]
pub struct Cursor {
    schema: Arc<Schema>,
    documents: Vec<Document>,
}

impl Cursor {
    pub(crate) fn new(schema: Arc<Schema>, documents: Vec<Document>) -> Self {
        Self { schema, documents }
    }

    fn derive(&self, documents: Vec<Document>) -> Self {
        Self { schema: self.schema.clone(), documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Alias of [`len`](Self::len).
    pub fn count(&self) -> usize {
        self.len()
    }

    /// Alias of [`len`](Self::len).
    pub fn size(&self) -> usize {
        self.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.documents.iter()
    }

    pub fn to_vec(&self) -> Vec<Document> {
        self.documents.clone()
    }

    pub fn into_vec(self) -> Vec<Document> {
        self.documents
    }

    /// The document at `index`; negative indices count from the end.
    pub fn eq(&self, index: isize) -> Option<&Document> {
        let index = if index < 0 {
            self.len().checked_sub(index.unsigned_abs())?
        } else {
            index.unsigned_abs()
        };

        self.documents.get(index)
    }

    pub fn first(&self) -> Option<&Document> {
        self.documents.first()
    }

    pub fn last(&self) -> Option<&Document> {
        self.documents.last()
    }

    /// Documents in `start..end`. Negative bounds count from the end; a missing end means the
    /// end of the cursor.
    pub fn slice(&self, start: isize, end: Option<isize>) -> Self {
        let len = self.len();
        let resolve = |bound: isize| {
            if bound < 0 {
                len.saturating_sub(bound.unsigned_abs())
            } else {
                bound.unsigned_abs().min(len)
            }
        };

        let start = resolve(start);
        let end = end.map_or(len, resolve);
        if start >= end {
            return self.derive(Vec::new());
        }

        self.derive(self.documents[start..end].to_vec())
    }

    pub fn limit(&self, count: usize) -> Self {
        self.derive(self.documents.iter().take(count).cloned().collect())
    }

    pub fn skip(&self, count: usize) -> Self {
        self.derive(self.documents.iter().skip(count).cloned().collect())
    }

    pub fn reverse(&self) -> Self {
        self.derive(self.documents.iter().rev().cloned().collect())
    }

    /// The documents in random order.
    pub fn shuffle(&self) -> Self {
        let mut documents = self.documents.clone();
        documents.shuffle(&mut rand::thread_rng());
        self.derive(documents)
    }

    /// Alias of [`shuffle`](Self::shuffle).
    pub fn random(&self) -> Self {
        self.shuffle()
    }

    pub fn find(&self, query: impl IntoQuery) -> StoreResult<Self> {
        self.find_with(query, FindOptions::default())
    }

    /// Documents matching `query`, with `options` applied to the matches.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuery`] when the query does not compile.
    pub fn find_with(&self, query: impl IntoQuery, options: FindOptions) -> StoreResult<Self> {
        let predicate = self.schema.compile_query(query)?;

        let documents = self
            .documents
            .iter()
            .filter(|document| predicate(*document))
            .skip(options.skip)
            .take(options.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(self.derive(documents))
    }

    /// Like [`find_with`](Self::find_with), returning plain data.
    pub fn find_lean(&self, query: impl IntoQuery, options: FindOptions) -> StoreResult<Vec<bson::Document>> {
        Ok(self.find_with(query, options)?.iter().map(Document::to_object).collect())
    }

    pub fn find_one(&self, query: impl IntoQuery) -> StoreResult<Option<Document>> {
        let predicate = self.schema.compile_query(query)?;
        Ok(self.documents.iter().find(|document| predicate(*document)).cloned())
    }

    pub fn find_one_lean(&self, query: impl IntoQuery) -> StoreResult<Option<bson::Document>> {
        Ok(self.find_one(query)?.map(|document| document.to_object()))
    }

    /// A stably sorted copy.
    pub fn sort(&self, sort: impl IntoSort) -> StoreResult<Self> {
        let sort = self.schema.compile_sort(sort)?;

        let mut documents = self.documents.clone();
        documents.sort_by(|a, b| sort.compare(a, b));
        Ok(self.derive(documents))
    }

    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(&Document),
    {
        self.documents.iter().for_each(f);
    }

    /// Like [`for_each`](Self::for_each), with the index of each document.
    pub fn each<F>(&self, mut f: F)
    where
        F: FnMut(&Document, usize),
    {
        for (index, document) in self.documents.iter().enumerate() {
            f(document, index);
        }
    }

    pub fn map<T, F>(&self, f: F) -> Vec<T>
    where
        F: FnMut(&Document) -> T,
    {
        self.documents.iter().map(f).collect()
    }

    pub fn filter<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&Document) -> bool,
    {
        self.derive(self.documents.iter().filter(|document| f(document)).cloned().collect())
    }

    pub fn every<F>(&self, f: F) -> bool
    where
        F: FnMut(&Document) -> bool,
    {
        self.documents.iter().all(f)
    }

    pub fn some<F>(&self, f: F) -> bool
    where
        F: FnMut(&Document) -> bool,
    {
        self.documents.iter().any(f)
    }

    pub fn fold<T, F>(&self, init: T, f: F) -> T
    where
        F: FnMut(T, &Document) -> T,
    {
        self.documents.iter().fold(init, f)
    }

    pub fn fold_right<T, F>(&self, init: T, f: F) -> T
    where
        F: FnMut(T, &Document) -> T,
    {
        self.documents.iter().rev().fold(init, f)
    }

    /// Folds the documents left to right, starting from the first one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyReduction`] on an empty cursor.
    pub fn reduce<F>(&self, f: F) -> StoreResult<Document>
    where
        F: FnMut(Document, &Document) -> Document,
    {
        let (first, rest) = self.documents.split_first().ok_or(StoreError::EmptyReduction)?;
        Ok(rest.iter().fold(first.clone(), f))
    }

    /// Folds the documents right to left, starting from the last one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyReduction`] on an empty cursor.
    pub fn reduce_right<F>(&self, f: F) -> StoreResult<Document>
    where
        F: FnMut(Document, &Document) -> Document,
    {
        let (last, rest) = self.documents.split_last().ok_or(StoreError::EmptyReduction)?;
        Ok(rest.iter().rev().fold(last.clone(), f))
    }

    /// Applies `update` to every document, one at a time.
    pub async fn update(&self, update: bson::Document) -> StoreResult<Vec<Document>> {
        let mut updated = Vec::with_capacity(self.len());
        for document in &self.documents {
            updated.push(document.update(&update).await?);
        }
        Ok(updated)
    }

    /// Replaces every document with `data`, keeping each id.
    pub async fn replace(&self, data: bson::Document) -> StoreResult<Vec<Document>> {
        try_join_all(self.documents.iter().map(|document| document.replace(data.clone()))).await
    }

    /// Removes every document, one at a time.
    pub async fn remove(&self) -> StoreResult<Vec<Document>> {
        let mut removed = Vec::with_capacity(self.len());
        for document in &self.documents {
            removed.push(document.remove().await?);
        }
        Ok(removed)
    }

    /// A copy with the given reference paths of every document resolved.
    pub async fn populate(&self, expr: impl IntoPopulate) -> StoreResult<Self> {
        let populations = self.schema.parse_populate(expr)?;

        let mut documents = Vec::with_capacity(self.len());
        for document in &self.documents {
            documents.push(document.model().populate_with(document, &populations).await?);
        }
        Ok(self.derive(documents))
    }

    /// Index of the first document matching `query`.
    pub fn position(&self, query: impl IntoQuery) -> StoreResult<Option<usize>> {
        let predicate = self.schema.compile_query(query)?;
        Ok(self.documents.iter().position(|document| predicate(document)))
    }
}

impl IntoIterator for Cursor {
    type Item = Document;
    type IntoIter = std::vec::IntoIter<Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}

impl<'a> IntoIterator for &'a Cursor {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use bson::{Bson, doc};
    use docvault_core::{schema::Definition, types::TypeName};
    use pretty_assertions::assert_eq;

    async fn numbers() -> Cursor {
        let mut schema = Schema::new();
        schema.path("n", Definition::Type(TypeName::Number)).unwrap();
        schema.path("name", Definition::Type(TypeName::String)).unwrap();

        let db = Database::builder().build();
        let model = db.model("Number", schema).await;
        for (n, name) in [(3, "c"), (1, "a"), (2, "b"), (1, "d")] {
            model.insert(doc! { "n": n, "name": name }).await.unwrap();
        }
        model.snapshot().await.unwrap()
    }

    fn names(cursor: &Cursor) -> Vec<String> {
        cursor
            .map(|document| document.get("name").and_then(|name| name.as_str().map(str::to_string)))
            .into_iter()
            .flatten()
            .collect()
    }

    #[tokio::test]
    async fn indexing_accepts_negative_positions() {
        let cursor = numbers().await;
        assert_eq!(cursor.eq(0).and_then(|d| d.get("name")), Some("c".into()));
        assert_eq!(cursor.eq(-1).and_then(|d| d.get("name")), Some("d".into()));
        assert!(cursor.eq(4).is_none());
        assert!(cursor.eq(-5).is_none());
    }

    #[tokio::test]
    async fn slices_and_paging() {
        let cursor = numbers().await;
        assert_eq!(names(&cursor.slice(1, Some(-1))), vec!["a", "b"]);
        assert_eq!(names(&cursor.slice(-2, None)), vec!["b", "d"]);
        assert!(cursor.slice(3, Some(1)).is_empty());
        assert_eq!(names(&cursor.skip(1).limit(2)), vec!["a", "b"]);
        assert_eq!(names(&cursor.reverse()), vec!["d", "b", "a", "c"]);
        assert_eq!(cursor.shuffle().len(), 4);
    }

    #[tokio::test]
    async fn sorting_is_stable() {
        let cursor = numbers().await;
        assert_eq!(names(&cursor.sort("n").unwrap()), vec!["a", "d", "b", "c"]);
        assert_eq!(names(&cursor.sort("-n").unwrap()), vec!["c", "b", "a", "d"]);
        assert_eq!(names(&cursor.sort(doc! { "n": -1, "name": -1 }).unwrap()), vec!["c", "b", "d", "a"]);
    }

    #[tokio::test]
    async fn find_applies_paging_after_matching() {
        let cursor = numbers().await;
        let found = cursor.find_with(doc! { "n": { "$lt": 3 } }, FindOptions::new().skip(1).limit(1)).unwrap();
        assert_eq!(names(&found), vec!["b"]);

        let lean = cursor.find_lean(doc! { "name": "a" }, FindOptions::default()).unwrap();
        assert_eq!(lean.len(), 1);
        assert_eq!(lean[0].get_str("name").unwrap(), "a");

        assert!(cursor.find_one(doc! { "n": 9 }).unwrap().is_none());
        assert_eq!(cursor.position(doc! { "n": 2 }).unwrap(), Some(2));
    }

    #[tokio::test]
    async fn reductions() {
        let cursor = numbers().await;
        let total = cursor.fold(0.0, |sum, document| {
            sum + document.get("n").and_then(|n| n.as_i64()).unwrap_or_default() as f64
        });
        assert_eq!(total, 7.0);

        let joined = cursor
            .reduce(|mut acc, document| {
                let name = format!(
                    "{}{}",
                    acc.get("name").and_then(|n| n.as_str().map(str::to_string)).unwrap_or_default(),
                    document.get("name").and_then(|n| n.as_str().map(str::to_string)).unwrap_or_default()
                );
                acc.set("name", name);
                acc
            })
            .unwrap();
        assert_eq!(joined.get("name"), Some("cabd".into()));

        let empty = cursor.filter(|_| false);
        assert!(matches!(empty.reduce(|acc, _| acc), Err(StoreError::EmptyReduction)));
        assert!(matches!(empty.reduce_right(|acc, _| acc), Err(StoreError::EmptyReduction)));
        assert!(cursor.every(|document| document.get("n").is_some()));
        assert!(!cursor.some(|document| document.get("n") == Some(Bson::Int64(9))));
    }

    #[tokio::test]
    async fn bulk_writes_go_to_the_model() {
        let cursor = numbers().await;
        let model = cursor.first().unwrap().model().clone();

        let ones = cursor.find(doc! { "n": 1 }).unwrap();
        ones.update(doc! { "$inc": { "n": 10 } }).await.unwrap();
        assert_eq!(model.find(doc! { "n": 11 }).await.unwrap().len(), 2);

        // the cursor still shows the data it was built from
        assert_eq!(ones.iter().filter(|d| d.get("n") == Some(Bson::Int64(1))).count(), 2);

        let replaced = ones.replace(doc! { "n": 0, "name": "z" }).await.unwrap();
        assert_eq!(replaced.len(), 2);
        assert_eq!(model.find(doc! { "name": "z" }).await.unwrap().len(), 2);

        model.find(doc! { "name": "z" }).await.unwrap().remove().await.unwrap();
        assert_eq!(model.count().await, 2);
    }
}
