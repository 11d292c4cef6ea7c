//! Update expressions and their compilation into mutators.
//!
//! An update document lowers to an ordered list of [`Mutation`]s:
//!
//! ```ignore
//! doc! {
//!     "title": "Renamed",                    // plain value: set the path
//!     "meta": { "lang": "en" },              // nested document: set `meta.lang`
//!     "$inc": { "views": 1, "likes": 2 },    // inline operator: one mutation per field
//!     "tags": { "$push": "new" },            // operator applied to the enclosing path
//! }
//! ```
//!
//! Mutations run in declaration order against the same document, each one seeing the effects
//! of those before it.

use std::sync::Arc;

use bson::{Bson, Document};

use crate::{
    error::{StoreError, StoreResult},
    schema::Schema,
    types::{FieldType, UpdateOperator},
    value::{get_path, remove_path, set_path},
};

/// What a mutation does to its path.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Unconditionally store the value.
    Set(Bson),
    /// Apply a named operator through the path's field type.
    Operator(UpdateOperator, Bson),
}

/// One step of an update.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub path: String,
    pub action: Action,
}

impl Mutation {
    pub fn set(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self { path: path.into(), action: Action::Set(value.into()) }
    }

    pub fn operator(path: impl Into<String>, op: UpdateOperator, arg: impl Into<Bson>) -> Self {
        Self { path: path.into(), action: Action::Operator(op, arg.into()) }
    }
}

/// Parses an update document into mutations.
///
/// # Errors
///
/// Returns [`StoreError::InvalidQuery`] for unknown operators, and for inline operators whose
/// value is not a document of `field: argument` pairs.
pub fn parse_update(update: &Document) -> StoreResult<Vec<Mutation>> {
    let mut mutations = Vec::with_capacity(update.len());
    parse_into(update, None, &mut mutations)?;
    Ok(mutations)
}

fn parse_into(update: &Document, prefix: Option<&str>, out: &mut Vec<Mutation>) -> StoreResult<()> {
    for (key, value) in update {
        if key.starts_with('$') {
            let op = key.parse::<UpdateOperator>()?;

            match (prefix, value) {
                (Some(path), _) => out.push(Mutation::operator(path, op, value.clone())),
                (None, Bson::Document(fields)) => out.extend(
                    fields
                        .iter()
                        .map(|(field, arg)| Mutation::operator(field.as_str(), op, arg.clone())),
                ),
                (None, _) => {
                    return Err(StoreError::InvalidQuery(format!(
                        "`{op}` expects a document of fields"
                    )));
                }
            }

            continue;
        }

        let path = prefix.map_or_else(|| key.clone(), |prefix| format!("{prefix}.{key}"));

        match value {
            Bson::Document(inner) => parse_into(inner, Some(&path), out)?,
            other => out.push(Mutation::set(path, other.clone())),
        }
    }

    Ok(())
}

/// Conversion into update mutations.
pub trait IntoUpdate {
    fn into_update(self) -> StoreResult<Vec<Mutation>>;
}

impl IntoUpdate for Document {
    fn into_update(self) -> StoreResult<Vec<Mutation>> {
        parse_update(&self)
    }
}

impl IntoUpdate for &Document {
    fn into_update(self) -> StoreResult<Vec<Mutation>> {
        parse_update(self)
    }
}

impl IntoUpdate for Vec<Mutation> {
    fn into_update(self) -> StoreResult<Vec<Mutation>> {
        Ok(self)
    }
}

struct Step {
    mutation: Mutation,
    field: Arc<dyn FieldType>,
}

/// A compiled update, applied with [`CompiledUpdate::apply`].
pub struct CompiledUpdate {
    steps: Vec<Step>,
}

impl CompiledUpdate {
    /// Resolves every mutation against `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuery`] when a path's type does not support the operator.
    pub fn compile(schema: &Schema, mutations: Vec<Mutation>) -> StoreResult<Self> {
        let steps = mutations
            .into_iter()
            .map(|mutation| {
                let field = schema.field_or_mixed(&mutation.path);

                if let Action::Operator(op, _) = &mutation.action
                    && !field.update_operators().contains(op)
                {
                    return Err(StoreError::InvalidQuery(format!(
                        "`{op}` is not supported by `{}` ({})",
                        mutation.path,
                        field.kind()
                    )));
                }

                Ok(Step { mutation, field })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        log::trace!("compiled update with {} steps", steps.len());
        Ok(Self { steps })
    }

    pub fn mutations(&self) -> impl Iterator<Item = &Mutation> {
        self.steps.iter().map(|step| &step.mutation)
    }

    /// Runs every mutation against `data` in order.
    pub fn apply(&self, data: &mut Document) -> StoreResult<()> {
        for Step { mutation, field } in &self.steps {
            let path = mutation.path.as_str();

            match &mutation.action {
                Action::Set(value) => set_path(data, path, value.clone()),
                Action::Operator(op, arg) => {
                    let current = get_path(data, path).cloned();

                    match field.update(*op, current, arg, data)? {
                        Some(value) => set_path(data, path, value),
                        None => {
                            remove_path(data, path);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.mutations()).finish()
    }
}
