//! Models: the per-schema document collections.
//!
//! A [`Model`] owns the stored data of one collection in an insertion-ordered index keyed by
//! `_id`. The index sits behind an `Arc` that writers replace copy-on-write, so a [`Cursor`]
//! taken before a write keeps seeing the data it was built from.
//!
//! Every write is serialized through the model's [`SerializationGate`]: the id checks, the
//! `pre` hooks, validation and the commit of one write never interleave with another write
//! to the same model. `post` hooks run after the gate is released.
//!
//! Because `pre` hooks run while the gate is held, a `pre` hook must not write to its own
//! model.

use std::{
    fmt,
    future::Future,
    sync::{Arc, Weak},
};

use async_trait::async_trait;
use bson::Bson;
use indexmap::IndexMap;
use log::{debug, error, warn};
use mea::rwlock::RwLock;

use docvault_core::{
    collection::Collection,
    error::{StoreError, StoreResult},
    gate::SerializationGate,
    hook::{self, HookPhase, HookType},
    populate::{IntoPopulate, Population},
    query::{Expr, IntoQuery},
    schema::Schema,
    sort::IntoSort,
    update::IntoUpdate,
};

use crate::{
    cursor::{Cursor, FindOptions},
    database::Registry,
    document::Document,
};

type DataMap = IndexMap<String, bson::Document>;

/// A collection of documents sharing one schema.
///
/// Models are created through [`Database::model`](crate::Database::model) and always live
/// behind an `Arc`.
///
/// # Example
///
/// ```ignore
/// let posts = db.model("Post", schema).await;
///
/// let post = posts.insert(doc! { "title": "Hello" }).await?;
/// posts.update_by_id(post.id().unwrap(), doc! { "$inc": { "views": 1 } }).await?;
///
/// let popular = posts.find(doc! { "views": { "$gte": 100 } }).await?.sort("-views")?;
/// ```
pub struct Model {
    name: String,
    schema: Arc<Schema>,
    data: RwLock<Arc<DataMap>>,
    gate: SerializationGate,
    registry: Weak<Registry>,
    this: Weak<Model>,
}

impl Model {
    pub(crate) fn new(name: &str, schema: Arc<Schema>, registry: Weak<Registry>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            name: name.to_string(),
            schema,
            data: RwLock::new(Arc::new(DataMap::new())),
            gate: SerializationGate::new(),
            registry,
            this: this.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn handle(&self) -> StoreResult<Arc<Model>> {
        self.this
            .upgrade()
            .ok_or_else(|| StoreError::Persistence(format!("model `{}` has been dropped", self.name)))
    }

    /// Runs `work` while holding the gate. The gate is released even if `work` is dropped
    /// before it completes.
    async fn exclusive<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let _guard = self.gate.lock().await;
        work.await
    }

    fn materialize(&self, mut data: bson::Document) -> StoreResult<Document> {
        self.schema.apply_getters(&mut data)?;
        Ok(Document::new(self.handle()?, data))
    }

    async fn stored(&self) -> Arc<DataMap> {
        Arc::clone(&*self.data.read().await)
    }

    async fn stored_by_id(&self, id: &str) -> Option<bson::Document> {
        self.data.read().await.get(id).cloned()
    }

    /// Builds a document from `data` without storing it.
    pub fn new_document(&self, data: bson::Document) -> StoreResult<Document> {
        self.materialize(data)
    }

    pub async fn count(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn has(&self, id: &str) -> bool {
        self.data.read().await.contains_key(id)
    }

    /// Returns the document stored under `id`, if any.
    pub async fn get(&self, id: &str) -> StoreResult<Option<Document>> {
        self.stored_by_id(id).await.map(|data| self.materialize(data)).transpose()
    }

    /// Returns the document stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IdNotExist`] when nothing is stored under `id`.
    pub async fn find_by_id(&self, id: &str) -> StoreResult<Document> {
        self.get(id).await?.ok_or_else(|| StoreError::IdNotExist(id.to_string()))
    }

    /// Inserts a document.
    ///
    /// Getters run first (generating an `_id` when the schema does), then the `pre` save hooks,
    /// then the setters. Nothing is stored unless all of them succeed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::IdUndefined`] if the data has no string `_id` after getters ran
    /// - [`StoreError::IdExist`] if the id is taken
    /// - [`StoreError::Validation`] if a setter rejects the data
    /// - any error raised by a hook
    pub async fn insert(&self, data: bson::Document) -> StoreResult<Document> {
        let document = self.exclusive(self.insert_locked(data)).await?;
        self.run_post(HookType::Save, &document).await?;
        Ok(document)
    }

    async fn insert_locked(&self, mut data: bson::Document) -> StoreResult<Document> {
        self.schema.apply_getters(&mut data)?;

        let Some(id) = data.get("_id").and_then(Bson::as_str).map(str::to_string) else {
            error!("insert into `{}` without an id", self.name);
            return Err(StoreError::IdUndefined(format!("document of `{}` has no id", self.name)));
        };

        if self.has(&id).await {
            error!("insert into `{}` with taken id `{id}`", self.name);
            return Err(StoreError::IdExist(id));
        }

        let document = self.commit(&id, data).await?;
        debug!("inserted `{id}` into `{}`", self.name);
        Ok(document)
    }

    /// Runs the `pre` save hooks and the setters over `data` and stores the result under `id`.
    async fn commit(&self, id: &str, data: bson::Document) -> StoreResult<Document> {
        let mut document = Document::new(self.handle()?, data);
        hook::run_all(self.schema.hooks(HookPhase::Pre, HookType::Save), &mut document).await?;

        let mut stored = document.into_data();
        self.schema.apply_setters(&mut stored)?;

        if stored.get("_id").and_then(Bson::as_str) != Some(id) {
            error!("write to `{id}` in `{}` changed its id", self.name);
            return Err(StoreError::validation("_id", "cannot be changed"));
        }

        {
            let mut data = self.data.write().await;
            Arc::make_mut(&mut *data).insert(id.to_string(), stored.clone());
        }

        self.materialize(stored)
    }

    async fn run_post(&self, kind: HookType, document: &Document) -> StoreResult<()> {
        let hooks = self.schema.hooks(HookPhase::Post, kind);
        if hooks.is_empty() {
            return Ok(());
        }

        let mut document = document.clone();
        hook::run_all(hooks, &mut document).await
    }

    /// Inserts every record in order, stopping at the first failure.
    pub async fn insert_many(&self, data: Vec<bson::Document>) -> StoreResult<Vec<Document>> {
        let mut documents = Vec::with_capacity(data.len());
        for item in data {
            documents.push(self.insert(item).await?);
        }
        Ok(documents)
    }

    /// Replaces the document when its `_id` is stored, inserts it otherwise.
    pub async fn save(&self, data: bson::Document) -> StoreResult<Document> {
        match data.get("_id").and_then(Bson::as_str).map(str::to_string) {
            Some(id) if self.has(&id).await => self.replace_by_id(&id, data).await,
            _ => self.insert(data).await,
        }
    }

    /// Applies an update expression to the document stored under `id`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidQuery`] if the update does not compile
    /// - [`StoreError::IdNotExist`] if nothing is stored under `id`
    /// - [`StoreError::Validation`] if the result fails validation or changes `_id`
    pub async fn update_by_id(&self, id: &str, update: impl IntoUpdate + Send) -> StoreResult<Document> {
        let update = self.schema.compile_update(update)?;

        let document = self
            .exclusive(async {
                let Some(mut data) = self.stored_by_id(id).await else {
                    error!("update of missing `{id}` in `{}`", self.name);
                    return Err(StoreError::IdNotExist(id.to_string()));
                };

                update.apply(&mut data)?;
                self.schema.apply_getters(&mut data)?;
                let document = self.commit(id, data).await?;
                debug!("updated `{id}` in `{}`", self.name);
                Ok(document)
            })
            .await?;

        self.run_post(HookType::Save, &document).await?;
        Ok(document)
    }

    /// Updates every document matching `query`, one at a time in storage order.
    pub async fn update(&self, query: impl IntoQuery + Send, update: bson::Document) -> StoreResult<Vec<Document>> {
        self.find(query).await?.update(update).await
    }

    /// Replaces the data stored under `id`, keeping the id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IdNotExist`] when nothing is stored under `id`, and validation or
    /// hook errors like [`insert`](Self::insert).
    pub async fn replace_by_id(&self, id: &str, mut data: bson::Document) -> StoreResult<Document> {
        let document = self
            .exclusive(async {
                if !self.has(id).await {
                    error!("replace of missing `{id}` in `{}`", self.name);
                    return Err(StoreError::IdNotExist(id.to_string()));
                }

                data.insert("_id", id);
                self.schema.apply_getters(&mut data)?;
                let document = self.commit(id, data).await?;
                debug!("replaced `{id}` in `{}`", self.name);
                Ok(document)
            })
            .await?;

        self.run_post(HookType::Save, &document).await?;
        Ok(document)
    }

    /// Replaces every document matching `query`.
    pub async fn replace(&self, query: impl IntoQuery + Send, data: bson::Document) -> StoreResult<Vec<Document>> {
        self.find(query).await?.replace(data).await
    }

    /// Removes the document stored under `id` and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IdNotExist`] when nothing is stored under `id`; the model is left
    /// unchanged.
    pub async fn remove_by_id(&self, id: &str) -> StoreResult<Document> {
        let document = self
            .exclusive(async {
                let Some(data) = self.stored_by_id(id).await else {
                    error!("remove of missing `{id}` from `{}`", self.name);
                    return Err(StoreError::IdNotExist(id.to_string()));
                };

                let mut document = self.materialize(data)?;
                hook::run_all(self.schema.hooks(HookPhase::Pre, HookType::Remove), &mut document)
                    .await?;

                {
                    let mut data = self.data.write().await;
                    Arc::make_mut(&mut *data).shift_remove(id);
                }

                debug!("removed `{id}` from `{}`", self.name);
                Ok(document)
            })
            .await?;

        self.run_post(HookType::Remove, &document).await?;
        Ok(document)
    }

    /// Removes every document matching `query`, one at a time in storage order.
    pub async fn remove(&self, query: impl IntoQuery + Send) -> StoreResult<Vec<Document>> {
        self.find(query).await?.remove().await
    }

    /// A cursor over every stored document, in storage order.
    pub async fn snapshot(&self) -> StoreResult<Cursor> {
        let stored = self.stored().await;
        let documents = stored
            .values()
            .map(|data| self.materialize(data.clone()))
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Cursor::new(self.schema.clone(), documents))
    }

    pub async fn find(&self, query: impl IntoQuery + Send) -> StoreResult<Cursor> {
        self.find_with(query, FindOptions::default()).await
    }

    pub async fn find_with(&self, query: impl IntoQuery + Send, options: FindOptions) -> StoreResult<Cursor> {
        self.snapshot().await?.find_with(query, options)
    }

    /// Like [`find_with`](Self::find_with), returning plain data.
    pub async fn find_lean(&self, query: impl IntoQuery + Send, options: FindOptions) -> StoreResult<Vec<bson::Document>> {
        self.snapshot().await?.find_lean(query, options)
    }

    pub async fn find_one(&self, query: impl IntoQuery + Send) -> StoreResult<Option<Document>> {
        self.snapshot().await?.find_one(query)
    }

    pub async fn sort(&self, sort: impl IntoSort + Send) -> StoreResult<Cursor> {
        self.snapshot().await?.sort(sort)
    }

    pub async fn first(&self) -> StoreResult<Option<Document>> {
        Ok(self.snapshot().await?.first().cloned())
    }

    pub async fn last(&self) -> StoreResult<Option<Document>> {
        Ok(self.snapshot().await?.last().cloned())
    }

    /// Returns a copy of `document` with the given reference paths resolved.
    pub async fn populate(&self, document: &Document, expr: impl IntoPopulate) -> StoreResult<Document> {
        let populations = self.schema.parse_populate(expr)?;
        self.populate_with(document, &populations).await
    }

    pub(crate) async fn populate_with(
        &self,
        document: &Document,
        populations: &[Population],
    ) -> StoreResult<Document> {
        let mut populated = document.clone();

        for population in populations {
            let target = self.lookup(&population.model).await?;

            match populated.get(&population.path) {
                Some(Bson::Array(ids)) => {
                    let found = target.resolve_many(&ids, population).await?;
                    let value = Bson::Array(found.iter().map(|doc| Bson::Document(doc.to_object())).collect());
                    populated.set_populated(&population.path, found, value);
                }
                Some(Bson::String(id)) => match target.resolve_one(&id, population).await? {
                    Some(found) => {
                        let value = Bson::Document(found.to_object());
                        populated.set_populated(&population.path, vec![found], value);
                    }
                    None => warn!("`{id}` referenced by `{}` not found in `{}`", population.path, target.name),
                },
                _ => {}
            }
        }

        Ok(populated)
    }

    async fn lookup(&self, name: &str) -> StoreResult<Arc<Model>> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| StoreError::Persistence("database has been dropped".into()))?;

        let model = registry.read().await.get(name).cloned();
        model.ok_or_else(|| StoreError::Population(format!("model `{name}` is not registered")))
    }

    async fn resolve_one(&self, id: &str, population: &Population) -> StoreResult<Option<Document>> {
        let Some(document) = self.get(id).await? else {
            return Ok(None);
        };

        if let Some(query) = &population.matching {
            let predicate = self.schema.compile_query(query)?;
            if !predicate(&document) {
                return Ok(None);
            }
        }

        Ok(Some(document))
    }

    async fn resolve_many(&self, ids: &[Bson], population: &Population) -> StoreResult<Vec<Document>> {
        let stored = self.stored().await;

        let mut found = Vec::with_capacity(ids.len());
        for id in ids.iter().filter_map(Bson::as_str) {
            match stored.get(id) {
                Some(data) => found.push(self.materialize(data.clone())?),
                None => warn!("`{id}` referenced by `{}` not found in `{}`", population.path, self.name),
            }
        }

        if let Some(query) = &population.matching {
            let predicate = self.schema.compile_query(query)?;
            found.retain(|document| predicate(document));
        }

        if !population.sort.is_empty() {
            let sort = self.schema.compile_sort(population.sort.clone())?;
            found.sort_by(|a, b| sort.compare(a, b));
        }

        Ok(found
            .into_iter()
            .skip(population.skip)
            .take(population.limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Calls a static method registered on the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidMethod`] when no static is registered under `name`.
    pub async fn call_static(&self, name: &str, args: Vec<Bson>) -> StoreResult<Bson> {
        let method = self
            .schema
            .get_static(name)
            .cloned()
            .ok_or_else(|| StoreError::InvalidMethod(format!("`{name}` is not a static method")))?;

        let collection: Arc<dyn Collection> = self.handle()?;
        method(collection, args).await
    }

    /// Loads snapshot records through the import pipeline, bypassing hooks and setters.
    ///
    /// Nothing is stored when any record fails.
    ///
    /// # Errors
    ///
    /// - [`StoreError::IdUndefined`] if a record has no string `_id`
    /// - [`StoreError::IdExist`] if an id is already stored or repeats within `records`
    /// - any error raised by the import pipeline
    pub async fn import(&self, records: Vec<bson::Document>) -> StoreResult<usize> {
        self.exclusive(async {
            let mut data = self.data.write().await;

            let mut parsed = IndexMap::with_capacity(records.len());
            for mut record in records {
                self.schema.parse_database(&mut record)?;

                let Some(id) = record.get("_id").and_then(Bson::as_str).map(str::to_string) else {
                    error!("snapshot record of `{}` without an id", self.name);
                    return Err(StoreError::IdUndefined(format!("snapshot record of `{}` has no id", self.name)));
                };
                if data.contains_key(&id) || parsed.contains_key(&id) {
                    error!("snapshot of `{}` repeats id `{id}`", self.name);
                    return Err(StoreError::IdExist(id));
                }
                parsed.insert(id, record);
            }

            let count = parsed.len();
            Arc::make_mut(&mut *data).extend(parsed);
            debug!("imported {count} records into `{}`", self.name);
            Ok(count)
        })
        .await
    }

    /// Every stored record converted through the export pipeline, in storage order.
    pub async fn export(&self) -> StoreResult<Vec<bson::Document>> {
        let stored = self.stored().await;

        stored
            .values()
            .map(|data| {
                let mut data = data.clone();
                self.schema.export_database(&mut data)?;
                Ok(data)
            })
            .collect()
    }

    /// Drops this model from its database. Its data stays readable through existing handles.
    pub async fn destroy(&self) -> StoreResult<()> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| StoreError::Persistence("database has been dropped".into()))?;

        registry.write().await.shift_remove(&self.name);
        debug!("destroyed model `{}`", self.name);
        Ok(())
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("gate", &self.gate)
            .finish()
    }
}

#[async_trait]
impl Collection for Model {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    async fn count_documents(&self) -> usize {
        self.count().await
    }

    async fn insert_data(&self, data: bson::Document) -> StoreResult<bson::Document> {
        Ok(self.insert(data).await?.to_object())
    }

    async fn get_data(&self, id: &str) -> StoreResult<Option<bson::Document>> {
        Ok(self.get(id).await?.map(|document| document.to_object()))
    }

    async fn find_data(&self, query: Expr) -> StoreResult<Vec<bson::Document>> {
        Ok(self.find(query).await?.iter().map(Document::to_object).collect())
    }

    async fn update_data(&self, id: &str, update: bson::Document) -> StoreResult<bson::Document> {
        Ok(self.update_by_id(id, update).await?.to_object())
    }

    async fn remove_data(&self, id: &str) -> StoreResult<bson::Document> {
        Ok(self.remove_by_id(id).await?.to_object())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use bson::doc;
    use docvault_core::{
        hook,
        query::Filter,
        record::Record,
        schema::Definition,
        types::{FieldOptions, TypeName},
    };
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn people() -> Schema {
        let mut schema = Schema::new();
        schema
            .path("name", Definition::Typed(TypeName::String, FieldOptions::new().required()))
            .unwrap();
        schema.path("age", Definition::Type(TypeName::Number)).unwrap();
        schema
    }

    async fn model(schema: Schema) -> (Database, Arc<Model>) {
        let db = Database::builder().build();
        let model = db.model("Person", schema).await;
        (db, model)
    }

    #[tokio::test]
    async fn insert_assigns_ids() {
        let (_db, people) = model(people()).await;
        let person = people.insert(doc! { "name": "a", "age": 5 }).await.unwrap();

        let id = person.id().unwrap().to_string();
        assert_eq!(id.len(), 25);
        assert!(id.starts_with('c'));
        assert_eq!(people.find_by_id(&id).await.unwrap(), person);
    }

    #[tokio::test]
    async fn taken_ids_are_rejected() {
        let (_db, people) = model(people()).await;
        let person = people.insert(doc! { "name": "a" }).await.unwrap();

        let err = people
            .insert(doc! { "_id": person.id().unwrap(), "name": "b" })
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("ID_EXIST"));
        assert_eq!(people.count().await, 1);
    }

    #[tokio::test]
    async fn missing_ids_are_undefined() {
        let mut schema = people();
        schema.path("_id", Definition::Type(TypeName::String)).unwrap();
        let (_db, people) = model(schema).await;

        let err = people.insert(doc! { "name": "a" }).await.unwrap_err();
        assert_eq!(err.code(), Some("ID_UNDEFINED"));
    }

    #[tokio::test]
    async fn validation_failures_store_nothing() {
        let (_db, people) = model(people()).await;
        let err = people.insert(doc! { "age": 5 }).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation { ref path, .. } if path == "name"));
        assert_eq!(people.count().await, 0);

        let person = people.insert(doc! { "name": "a", "age": 5 }).await.unwrap();
        let id = person.id().unwrap();
        assert!(people.update_by_id(id, doc! { "$unset": { "name": true } }).await.is_err());
        assert_eq!(people.find_by_id(id).await.unwrap().get("name"), Some("a".into()));
    }

    #[tokio::test]
    async fn find_uses_field_operators() {
        let (_db, people) = model(people()).await;
        people.insert(doc! { "name": "a", "age": 5 }).await.unwrap();

        assert_eq!(people.find(doc! { "age": { "$gt": 3 } }).await.unwrap().len(), 1);
        assert!(people.find(doc! { "age": { "$gt": 10 } }).await.unwrap().is_empty());
        assert!(people.find(doc! { "age": { "$bogus": 1 } }).await.is_err());
    }

    #[tokio::test]
    async fn increment_of_missing_value() {
        let (_db, people) = model(people()).await;
        let person = people.insert(doc! { "name": "a" }).await.unwrap();

        let person = people.update_by_id(person.id().unwrap(), doc! { "$inc": { "age": 1 } }).await.unwrap();
        assert_eq!(person.get("age"), Some(Bson::Int64(1)));
    }

    #[tokio::test]
    async fn ids_cannot_be_reassigned() {
        let (_db, people) = model(people()).await;
        let person = people.insert(doc! { "name": "a" }).await.unwrap();
        let other = docvault_core::types::cuid::generate();

        let err = people
            .update_by_id(person.id().unwrap(), doc! { "_id": other })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { ref path, .. } if path == "_id"));
    }

    #[tokio::test]
    async fn remove_of_missing_id_changes_nothing() {
        let (_db, people) = model(people()).await;
        people.insert(doc! { "name": "a" }).await.unwrap();

        let err = people.remove_by_id("missing").await.unwrap_err();
        assert_eq!(err.code(), Some("ID_NOT_EXIST"));
        assert_eq!(people.count().await, 1);
    }

    #[tokio::test]
    async fn replace_keeps_the_id() {
        let (_db, people) = model(people()).await;
        let person = people.insert(doc! { "name": "a", "age": 1 }).await.unwrap();
        let id = person.id().unwrap();

        let replaced = people.replace_by_id(id, doc! { "name": "b" }).await.unwrap();
        assert_eq!(replaced.id(), Some(id));
        assert_eq!(replaced.get("age"), None);
        assert!(people.replace_by_id("missing", doc! { "name": "c" }).await.is_err());
    }

    #[tokio::test]
    async fn hooks_run_around_writes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut schema = people();

        let pre = log.clone();
        schema
            .pre("save", hook::from_fn(move |record| {
                pre.lock().unwrap().push("pre save");
                record.data_mut().insert("age", 42);
                Ok(())
            }))
            .unwrap();
        let post = log.clone();
        schema
            .post("save", hook::from_async(move |data| {
                let post = post.clone();
                async move {
                    post.lock().unwrap().push("post save");
                    Ok(data)
                }
            }))
            .unwrap();
        let removed = log.clone();
        schema
            .pre("remove", hook::from_callback(move |data, done| {
                removed.lock().unwrap().push("pre remove");
                done(Ok(data));
            }))
            .unwrap();

        let (_db, people) = model(schema).await;
        let person = people.insert(doc! { "name": "a" }).await.unwrap();
        assert_eq!(person.get("age"), Some(Bson::Int64(42)));

        person.remove().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["pre save", "post save", "pre remove"]);
        assert_eq!(people.count().await, 0);
    }

    #[tokio::test]
    async fn failing_pre_hooks_abort_the_write() {
        let mut schema = people();
        schema
            .pre("save", hook::from_callback(|_, done| done(Err(StoreError::Hook("rejected".into())))))
            .unwrap();

        let (_db, people) = model(schema).await;
        assert!(matches!(people.insert(doc! { "name": "a" }).await, Err(StoreError::Hook(_))));
        assert_eq!(people.count().await, 0);
        assert!(!people.gate.is_locked());
    }

    #[tokio::test]
    async fn dropped_writes_release_the_gate() {
        let stalled = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let mut schema = people();
        let flag = stalled.clone();
        schema
            .pre("save", hook::from_async(move |data| {
                let stall = flag.load(std::sync::atomic::Ordering::SeqCst);
                async move {
                    if stall {
                        futures::future::pending::<()>().await;
                    }
                    Ok(data)
                }
            }))
            .unwrap();

        let (_db, people) = model(schema).await;
        let mut insert = Box::pin(people.insert(doc! { "name": "a" }));
        assert!(futures::poll!(&mut insert).is_pending());
        assert!(people.gate.is_locked());

        drop(insert);
        assert!(!people.gate.is_locked());

        stalled.store(false, std::sync::atomic::Ordering::SeqCst);
        people.insert(doc! { "name": "b" }).await.unwrap();
        assert_eq!(people.count().await, 1);
    }

    #[tokio::test]
    async fn panicking_hooks_release_the_gate() {
        let mut schema = people();
        schema
            .pre("save", hook::from_fn(|record| {
                if record.get_value("name") == Some(Bson::from("boom")) {
                    panic!("hook failed");
                }
                Ok(())
            }))
            .unwrap();

        let (_db, people) = model(schema).await;
        let insert = std::panic::AssertUnwindSafe(people.insert(doc! { "name": "boom" }));
        assert!(futures::FutureExt::catch_unwind(insert).await.is_err());
        assert!(!people.gate.is_locked());

        people.insert(doc! { "name": "a" }).await.unwrap();
        assert_eq!(people.count().await, 1);
    }

    #[tokio::test]
    async fn import_rejects_repeated_ids() {
        let (_db, people) = model(people()).await;
        let stored = people.insert(doc! { "name": "a" }).await.unwrap();
        let id = stored.id().unwrap().to_string();

        let err = people.import(vec![doc! { "_id": id.as_str(), "name": "b" }]).await.unwrap_err();
        assert!(matches!(err, StoreError::IdExist(ref taken) if *taken == id));
        assert_eq!(people.find_by_id(&id).await.unwrap().get("name"), Some("a".into()));

        let err = people
            .import(vec![doc! { "_id": "x", "name": "b" }, doc! { "_id": "x", "name": "c" }])
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("ID_EXIST"));
        assert_eq!(people.count().await, 1);

        assert_eq!(people.import(vec![doc! { "_id": "y", "name": "d" }]).await.unwrap(), 1);
        assert_eq!(people.count().await, 2);
    }

    #[tokio::test]
    async fn concurrent_inserts_are_serialized() {
        let (_db, people) = model(people()).await;

        let inserts = (0..20).map(|n| {
            let people = people.clone();
            async move { people.insert(doc! { "name": format!("p{n}") }).await }
        });
        let inserted = futures::future::try_join_all(inserts).await.unwrap();

        assert_eq!(inserted.len(), 20);
        assert_eq!(people.count().await, 20);
        assert!(!people.gate.is_locked());
    }

    #[tokio::test]
    async fn cursors_keep_their_snapshot() {
        let (_db, people) = model(people()).await;
        people.insert(doc! { "name": "a" }).await.unwrap();

        let before = people.snapshot().await.unwrap();
        people.insert(doc! { "name": "b" }).await.unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(people.snapshot().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn statics_receive_the_collection() {
        let mut schema = people();
        schema
            .statics("adults", |collection, _| async move {
                let adults = collection.find_data(Filter::gte("age", 18)).await?;
                Ok::<_, StoreError>(Bson::Int64(adults.len() as i64))
            })
            .unwrap();

        let (_db, people) = model(schema).await;
        people
            .insert_many(vec![doc! { "name": "a", "age": 30 }, doc! { "name": "b", "age": 3 }])
            .await
            .unwrap();

        assert_eq!(people.call_static("adults", vec![]).await.unwrap(), Bson::Int64(1));
        assert!(matches!(people.call_static("minors", vec![]).await, Err(StoreError::InvalidMethod(_))));
    }

    #[tokio::test]
    async fn populate_resolves_references_by_model_name() {
        let db = Database::builder().build();

        let mut posts = Schema::new();
        posts.path("title", Definition::Type(TypeName::String)).unwrap();
        posts
            .path("author", Definition::Typed(TypeName::Cuid, FieldOptions::new().reference("User")))
            .unwrap();
        posts
            .path(
                "tags",
                Definition::Array(vec![Definition::Typed(TypeName::Cuid, FieldOptions::new().reference("Tag"))]),
            )
            .unwrap();
        // declared before the models it references
        let posts = db.model("Post", posts).await;

        let users = db.model("User", people()).await;
        let mut tag_schema = Schema::new();
        tag_schema.path("name", Definition::Type(TypeName::String)).unwrap();
        let tags = db.model("Tag", tag_schema).await;

        let author = users.insert(doc! { "name": "ann" }).await.unwrap();
        let rust = tags.insert(doc! { "name": "rust" }).await.unwrap();
        let db_tag = tags.insert(doc! { "name": "db" }).await.unwrap();

        let post = posts
            .insert(doc! {
                "title": "hello",
                "author": author.id().unwrap(),
                "tags": [db_tag.id().unwrap(), rust.id().unwrap(), docvault_core::types::cuid::generate()],
            })
            .await
            .unwrap();

        let populated = post.populate("author tags").await.unwrap();
        assert_eq!(populated.get("author.name"), Some("ann".into()));
        let names = populated.populated("tags").unwrap().iter().map(|tag| tag.get("name")).collect::<Vec<_>>();
        assert_eq!(names, vec![Some("db".into()), Some("rust".into())]);

        let sorted = post
            .populate(
                docvault_core::populate::PopulateDescriptor::new("tags")
                    .sort("name")
                    .unwrap()
                    .limit(1),
            )
            .await
            .unwrap();
        assert_eq!(sorted.populated("tags").unwrap()[0].get("name"), Some("db".into()));
        assert_eq!(sorted.populated("tags").unwrap().len(), 1);

        // saving a populated document stores ids again
        let saved = populated.save().await.unwrap();
        assert_eq!(saved.get("author"), author.get("_id"));
        assert_eq!(saved.get("tags").and_then(|tags| tags.as_array().map(Vec::len)), Some(2));
    }
}
