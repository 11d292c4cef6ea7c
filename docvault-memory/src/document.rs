//! Live documents.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use bson::Bson;
use docvault_core::{
    error::{StoreError, StoreResult},
    populate::IntoPopulate,
    record::Record,
    update::IntoUpdate,
    value::{self, get_path, set_path},
};

use crate::model::Model;

/// A record bound to the model it was read from or written to.
///
/// The data is a private copy: changing it does not touch the store until the document is
/// saved. Virtual paths are computed on first access and cached for the lifetime of this
/// instance.
///
/// # Example
///
/// ```ignore
/// let mut post = posts.find_by_id(&id).await?;
/// post.set("title", "Renamed");
/// let post = post.save().await?;
///
/// let post = post.populate("author").await?;
/// println!("{}", post.populated("author").unwrap()[0]);
/// ```
pub struct Document {
    model: Arc<Model>,
    data: bson::Document,
    virtuals: Mutex<HashMap<String, Option<Bson>>>,
    populated: HashMap<String, Vec<Document>>,
}

impl Document {
    pub(crate) fn new(model: Arc<Model>, data: bson::Document) -> Self {
        Self { model, data, virtuals: Mutex::default(), populated: HashMap::new() }
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn id(&self) -> Option<&str> {
        self.record_id()
    }

    pub fn get(&self, path: &str) -> Option<Bson> {
        self.get_value(path)
    }

    pub fn set(&mut self, path: &str, value: impl Into<Bson>) {
        set_path(&mut self.data, path, value.into());
    }

    pub fn into_data(self) -> bson::Document {
        self.data
    }

    fn require_id(&self) -> StoreResult<String> {
        self.id()
            .map(str::to_string)
            .ok_or_else(|| StoreError::IdUndefined(format!("document of `{}` has no id", self.model.name())))
    }

    /// Inserts or replaces this document in its model.
    pub async fn save(&self) -> StoreResult<Document> {
        self.model.save(self.depopulated()).await
    }

    pub async fn update(&self, update: impl IntoUpdate + Send) -> StoreResult<Document> {
        self.model.update_by_id(&self.require_id()?, update).await
    }

    pub async fn replace(&self, data: bson::Document) -> StoreResult<Document> {
        self.model.replace_by_id(&self.require_id()?, data).await
    }

    pub async fn remove(&self) -> StoreResult<Document> {
        self.model.remove_by_id(&self.require_id()?).await
    }

    /// Returns a copy of this document with the given reference paths resolved.
    pub async fn populate(&self, expr: impl IntoPopulate) -> StoreResult<Document> {
        self.model.populate(self, expr).await
    }

    /// Documents resolved for `path` by [`populate`](Self::populate).
    pub fn populated(&self, path: &str) -> Option<&[Document]> {
        self.populated.get(path).map(Vec::as_slice)
    }

    pub(crate) fn set_populated(&mut self, path: &str, documents: Vec<Document>, value: Bson) {
        set_path(&mut self.data, path, value);
        self.populated.insert(path.to_string(), documents);
    }

    /// The stored data with populated paths turned back into ids.
    fn depopulated(&self) -> bson::Document {
        let mut data = self.data.clone();

        for (path, documents) in &self.populated {
            let ids = documents.iter().filter_map(|document| document.id()).map(Bson::from);

            let value = match get_path(&data, path) {
                Some(Bson::Array(_)) => Bson::Array(ids.collect()),
                _ => match ids.into_iter().next() {
                    Some(id) => id,
                    None => continue,
                },
            };
            set_path(&mut data, path, value);
        }

        data
    }

    /// A plain copy of the stored data.
    ///
    /// Virtual paths are not included; read them with [`get`](Self::get). Lean finds return
    /// this form.
    pub fn to_object(&self) -> bson::Document {
        self.data.clone()
    }

    /// The exported form of this document as JSON.
    pub fn to_json(&self) -> StoreResult<serde_json::Value> {
        let mut data = self.data.clone();
        self.model.schema().export_database(&mut data)?;
        Ok(value::to_json(&Bson::Document(data)))
    }

    /// Calls an instance method registered on the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidMethod`] when no method is registered under `name`.
    pub fn call(&self, name: &str, args: Vec<Bson>) -> StoreResult<Bson> {
        let method = self
            .model
            .schema()
            .get_method(name)
            .ok_or_else(|| StoreError::InvalidMethod(format!("`{name}` is not a method")))?;

        method(self, args)
    }

    fn cached(&self, path: &str) -> Option<Option<Bson>> {
        self.virtuals.lock().unwrap_or_else(|err| err.into_inner()).get(path).cloned()
    }
}

impl Record for Document {
    fn data(&self) -> &bson::Document {
        &self.data
    }

    fn data_mut(&mut self) -> &mut bson::Document {
        &mut self.data
    }

    fn get_value(&self, path: &str) -> Option<Bson> {
        let Some(getter) = self.model.schema().field(path).and_then(|field| field.accessor()) else {
            return get_path(&self.data, path).cloned();
        };

        if let Some(value) = self.cached(path) {
            return value;
        }

        // computed without holding the cache lock; getters may read other virtual paths
        let value = getter(self);
        self.virtuals
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .insert(path.to_string(), value.clone());
        value
    }
}

impl Clone for Document {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            data: self.data.clone(),
            virtuals: Mutex::default(),
            populated: self.populated.clone(),
        }
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.model, &other.model) && self.data == other.data
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("model", &self.model.name())
            .field("data", &self.data)
            .finish()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            Ok(json) => write!(f, "{json}"),
            Err(_) => write!(f, "{}", self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use bson::doc;
    use docvault_core::{
        schema::{Definition, Schema},
        types::TypeName,
    };
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn virtual_paths_are_computed_once_per_instance() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let mut schema = Schema::new();
        schema.path("first", Definition::Type(TypeName::String)).unwrap();
        schema.virtual_path("greeting", |record| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            let first = record.get_value("first")?;
            Some(format!("hello {}", first.as_str()?).into())
        });
        schema.virtual_path("shout", |record| {
            let greeting = record.get_value("greeting")?;
            Some(greeting.as_str()?.to_uppercase().into())
        });

        let db = Database::builder().build();
        let people = db.model("Person", schema).await;
        let person = people.insert(doc! { "first": "ann" }).await.unwrap();

        assert_eq!(person.get("shout"), Some(Bson::from("HELLO ANN")));
        assert_eq!(person.get("greeting"), Some(Bson::from("hello ann")));
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        assert!(person.to_object().get("greeting").is_none());

        let copy = person.clone();
        copy.get("greeting");
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn plain_objects_hold_stored_fields_only() {
        let mut schema = Schema::new();
        schema.path("first", Definition::Type(TypeName::String)).unwrap();
        schema.virtual_path("initial", |record| {
            let first = record.get_value("first")?;
            Some(first.as_str()?.chars().next()?.to_string().into())
        });

        let db = Database::builder().build();
        let people = db.model("Person", schema).await;
        let person = people.insert(doc! { "first": "ann" }).await.unwrap();
        assert_eq!(person.get("initial"), Some(Bson::from("a")));

        let id = person.id().unwrap();
        assert_eq!(person.to_object(), doc! { "_id": id, "first": "ann" });

        let lean = people.find_lean(doc! {}, Default::default()).await.unwrap();
        assert_eq!(lean, vec![person.to_object()]);

        let saved = person.save().await.unwrap();
        assert_eq!(saved.to_object(), doc! { "_id": id, "first": "ann" });
    }

    #[tokio::test]
    async fn methods_run_against_the_document() {
        let mut schema = Schema::new();
        schema.path("name", Definition::Type(TypeName::String)).unwrap();
        schema
            .method("shout", |record, args| {
                let name = record.get_value("name").unwrap_or(Bson::Null);
                let suffix = args.first().and_then(Bson::as_str).unwrap_or("!");
                Ok(format!("{}{suffix}", name.as_str().unwrap_or_default()).into())
            })
            .unwrap();

        let db = Database::builder().build();
        let users = db.model("User", schema).await;
        let user = users.insert(doc! { "name": "ann" }).await.unwrap();

        assert_eq!(user.call("shout", vec!["?".into()]).unwrap(), Bson::from("ann?"));
        assert!(matches!(user.call("whisper", vec![]), Err(StoreError::InvalidMethod(_))));
    }

    #[tokio::test]
    async fn save_writes_local_changes() {
        let mut schema = Schema::new();
        schema.path("name", Definition::Type(TypeName::String)).unwrap();

        let db = Database::builder().build();
        let users = db.model("User", schema).await;
        let mut user = users.insert(doc! { "name": "ann" }).await.unwrap();

        user.set("name", "bob");
        assert_eq!(users.find_by_id(user.id().unwrap()).await.unwrap().get("name"), Some("ann".into()));

        user.save().await.unwrap();
        assert_eq!(users.find_by_id(user.id().unwrap()).await.unwrap().get("name"), Some("bob".into()));
        assert_eq!(users.count().await, 1);
    }

    #[tokio::test]
    async fn json_uses_the_exported_form() {
        let mut schema = Schema::new();
        schema.path("at", Definition::Type(TypeName::Date)).unwrap();

        let db = Database::builder().build();
        let events = db.model("Event", schema).await;
        let event = events.insert(doc! { "at": bson::DateTime::from_millis(0) }).await.unwrap();

        let json = event.to_json().unwrap();
        assert_eq!(json["at"], serde_json::json!("1970-01-01T00:00:00.000Z"));
        assert!(event.to_string().contains("1970-01-01T00:00:00.000Z"));
    }
}
