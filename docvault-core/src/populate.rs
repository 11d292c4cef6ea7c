//! Population expressions.
//!
//! A population replaces the id(s) stored in a reference field with the referenced records of
//! another collection. Expressions name the paths to resolve:
//!
//! ```ignore
//! model.find_by_id(&id).await?.populate("author tags").await?;
//!
//! let comments = PopulateDescriptor::new("comments")
//!     .matching(doc! { "hidden": false })
//!     .sort("-created")?
//!     .limit(10);
//! post.populate(comments).await?;
//! ```
//!
//! When an entry names no model, it is taken from the path's `ref` option, or from the element
//! type's `ref` option for array paths.

use bson::{Bson, Document};

use crate::{
    error::{StoreError, StoreResult},
    schema::Schema,
    sort::{IntoSort, SortKey},
};

/// An unresolved population entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopulateDescriptor {
    pub path: String,
    pub model: Option<String>,
    /// Query the referenced records must also match.
    pub matching: Option<Document>,
    pub sort: Vec<SortKey>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl PopulateDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Self::default() }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn matching(mut self, query: Document) -> Self {
        self.matching = Some(query);
        self
    }

    pub fn sort(mut self, sort: impl IntoSort) -> StoreResult<Self> {
        self.sort = sort.into_sort()?;
        Ok(self)
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn from_document(doc: &Document) -> StoreResult<Self> {
        let mut descriptor = PopulateDescriptor::default();

        for (key, value) in doc {
            match (key.as_str(), value) {
                ("path", Bson::String(path)) => descriptor.path = path.clone(),
                ("model", Bson::String(model)) => descriptor.model = Some(model.clone()),
                ("match", Bson::Document(query)) => descriptor.matching = Some(query.clone()),
                ("sort", Bson::String(sort)) => descriptor.sort = sort.as_str().into_sort()?,
                ("sort", Bson::Document(sort)) => descriptor.sort = sort.into_sort()?,
                ("skip", count) => descriptor.skip = count_of(key, count)?,
                ("limit", count) => descriptor.limit = Some(count_of(key, count)?),
                _ => {
                    return Err(StoreError::Population(format!("invalid option `{key}`")));
                }
            }
        }

        Ok(descriptor)
    }
}

fn count_of(key: &str, value: &Bson) -> StoreResult<usize> {
    let count = match value {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        Bson::Double(n) if n.fract() == 0.0 => *n as i64,
        _ => -1,
    };

    usize::try_from(count)
        .map_err(|_| StoreError::Population(format!("`{key}` must be a non-negative integer")))
}

/// A population entry with its model resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    pub path: String,
    pub model: String,
    pub matching: Option<Document>,
    pub sort: Vec<SortKey>,
    pub skip: usize,
    pub limit: Option<usize>,
}

/// Conversion into population descriptors.
pub trait IntoPopulate {
    fn into_populate(self) -> StoreResult<Vec<PopulateDescriptor>>;
}

impl IntoPopulate for &str {
    fn into_populate(self) -> StoreResult<Vec<PopulateDescriptor>> {
        Ok(self.split_whitespace().map(PopulateDescriptor::new).collect())
    }
}

impl IntoPopulate for String {
    fn into_populate(self) -> StoreResult<Vec<PopulateDescriptor>> {
        self.as_str().into_populate()
    }
}

impl IntoPopulate for PopulateDescriptor {
    fn into_populate(self) -> StoreResult<Vec<PopulateDescriptor>> {
        Ok(vec![self])
    }
}

impl IntoPopulate for Vec<PopulateDescriptor> {
    fn into_populate(self) -> StoreResult<Vec<PopulateDescriptor>> {
        Ok(self)
    }
}

impl IntoPopulate for Document {
    fn into_populate(self) -> StoreResult<Vec<PopulateDescriptor>> {
        Ok(vec![PopulateDescriptor::from_document(&self)?])
    }
}

impl IntoPopulate for Bson {
    fn into_populate(self) -> StoreResult<Vec<PopulateDescriptor>> {
        match self {
            Bson::String(expr) => expr.into_populate(),
            Bson::Document(doc) => doc.into_populate(),
            Bson::Array(items) => items
                .iter()
                .map(|item| match item {
                    Bson::String(path) => Ok(PopulateDescriptor::new(path.as_str())),
                    Bson::Document(doc) => PopulateDescriptor::from_document(doc),
                    other => Err(StoreError::Population(format!("invalid entry {other}"))),
                })
                .collect(),
            other => Err(StoreError::Population(format!("invalid expression {other}"))),
        }
    }
}

/// Resolves the model of every descriptor against `schema`.
///
/// # Errors
///
/// Returns [`StoreError::Population`] when a descriptor has an empty path, or no model and no
/// reference to take one from.
pub fn resolve_populate(
    schema: &Schema,
    descriptors: Vec<PopulateDescriptor>,
) -> StoreResult<Vec<Population>> {
    descriptors
        .into_iter()
        .map(|descriptor| {
            if descriptor.path.is_empty() {
                return Err(StoreError::Population("path is required".into()));
            }

            let model = match descriptor.model {
                Some(model) => model,
                None => schema
                    .field(&descriptor.path)
                    .and_then(|field| match field.child() {
                        Some(child) => child.options().reference.clone(),
                        None => field.options().reference.clone(),
                    })
                    .ok_or_else(|| StoreError::Population("model is required".into()))?,
            };

            Ok(Population {
                path: descriptor.path,
                model,
                matching: descriptor.matching,
                sort: descriptor.sort,
                skip: descriptor.skip,
                limit: descriptor.limit,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schema::Definition,
        types::{FieldOptions, TypeName},
    };
    use bson::{bson, doc};
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        let mut schema = Schema::new();
        schema
            .path("author", Definition::Typed(TypeName::Cuid, FieldOptions::new().reference("User")))
            .unwrap();
        schema
            .path(
                "tags",
                Definition::Array(vec![Definition::Typed(
                    TypeName::Cuid,
                    FieldOptions::new().reference("Tag"),
                )]),
            )
            .unwrap();
        schema.path("title", Definition::Type(TypeName::String)).unwrap();
        schema
    }

    #[test]
    fn models_come_from_references() {
        let populations = schema().parse_populate("author  tags").unwrap();
        let models = populations.iter().map(|p| (p.path.as_str(), p.model.as_str())).collect::<Vec<_>>();
        assert_eq!(models, vec![("author", "User"), ("tags", "Tag")]);
    }

    #[test]
    fn explicit_models_win() {
        let populations = schema().parse_populate(bson!([{ "path": "title", "model": "Post" }])).unwrap();
        assert_eq!(populations[0].model, "Post");
    }

    #[test]
    fn descriptor_documents_carry_options() {
        let populations = schema()
            .parse_populate(doc! { "path": "tags", "match": { "hidden": false }, "sort": "-name", "skip": 1, "limit": 2 })
            .unwrap();
        assert_eq!(
            populations,
            vec![Population {
                path: "tags".into(),
                model: "Tag".into(),
                matching: Some(doc! { "hidden": false }),
                sort: vec![SortKey::desc("name")],
                skip: 1,
                limit: Some(2),
            }]
        );
    }

    #[test]
    fn missing_path_or_model_is_an_error() {
        let schema = schema();
        assert!(matches!(
            schema.parse_populate(doc! { "model": "User" }),
            Err(StoreError::Population(ref message)) if message == "path is required"
        ));
        assert!(matches!(
            schema.parse_populate("title"),
            Err(StoreError::Population(ref message)) if message == "model is required"
        ));
        assert!(schema.parse_populate("undeclared").is_err());
        assert!(schema.parse_populate(doc! { "path": "tags", "limit": -1 }).is_err());
    }
}
