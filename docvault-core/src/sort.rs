//! Sort specifications and their compilation into comparators.
//!
//! A sort is either a space-separated string with optional `+`/`-` prefixes, or a document
//! mapping paths to directions:
//!
//! ```ignore
//! "-age name"
//! doc! { "age": -1, "name": "asc" }
//! doc! { "meta": { "size": "desc" } }   // nested documents sort on `meta.size`
//! ```
//!
//! Keys are compared in declaration order; the first one that differs decides.

use std::{cmp::Ordering, sync::Arc};

use bson::{Bson, Document};

use crate::{
    error::{StoreError, StoreResult},
    record::Record,
    schema::Schema,
    types::FieldType,
    value::Numeric,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    fn from_bson(value: &Bson) -> Option<Self> {
        if let Some(n) = Numeric::from_bson(value) {
            let n = n.as_f64();
            return if n > 0.0 {
                Some(Direction::Ascending)
            } else if n < 0.0 {
                Some(Direction::Descending)
            } else {
                None
            };
        }

        match value.as_str()?.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(Direction::Ascending),
            "desc" | "descending" => Some(Direction::Descending),
            _ => None,
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub path: String,
    pub direction: Direction,
}

impl SortKey {
    pub fn asc(path: impl Into<String>) -> Self {
        Self { path: path.into(), direction: Direction::Ascending }
    }

    pub fn desc(path: impl Into<String>) -> Self {
        Self { path: path.into(), direction: Direction::Descending }
    }
}

/// Parses a `"-age +name title"` style specification.
pub fn parse_sort_str(spec: &str) -> Vec<SortKey> {
    spec.split_whitespace()
        .filter_map(|token| {
            if let Some(path) = token.strip_prefix('-') {
                (!path.is_empty()).then(|| SortKey::desc(path))
            } else if let Some(path) = token.strip_prefix('+') {
                (!path.is_empty()).then(|| SortKey::asc(path))
            } else {
                Some(SortKey::asc(token))
            }
        })
        .collect()
}

/// Parses a sort document.
///
/// # Errors
///
/// Returns [`StoreError::InvalidQuery`] for directions other than a signed number, `asc`,
/// `ascending`, `desc` or `descending`.
pub fn parse_sort_doc(spec: &Document) -> StoreResult<Vec<SortKey>> {
    let mut keys = Vec::with_capacity(spec.len());
    parse_sort_into(spec, "", &mut keys)?;
    Ok(keys)
}

fn parse_sort_into(spec: &Document, prefix: &str, keys: &mut Vec<SortKey>) -> StoreResult<()> {
    for (key, value) in spec {
        let path = format!("{prefix}{key}");

        match value {
            Bson::Document(inner) => parse_sort_into(inner, &format!("{path}."), keys)?,
            other => {
                let direction = Direction::from_bson(other).ok_or_else(|| {
                    StoreError::InvalidQuery(format!("Invalid sort direction for `{path}`: {other}"))
                })?;
                keys.push(SortKey { path, direction });
            }
        }
    }

    Ok(())
}

/// Conversion into sort keys.
pub trait IntoSort {
    fn into_sort(self) -> StoreResult<Vec<SortKey>>;
}

impl IntoSort for &str {
    fn into_sort(self) -> StoreResult<Vec<SortKey>> {
        Ok(parse_sort_str(self))
    }
}

impl IntoSort for String {
    fn into_sort(self) -> StoreResult<Vec<SortKey>> {
        Ok(parse_sort_str(&self))
    }
}

impl IntoSort for Document {
    fn into_sort(self) -> StoreResult<Vec<SortKey>> {
        parse_sort_doc(&self)
    }
}

impl IntoSort for &Document {
    fn into_sort(self) -> StoreResult<Vec<SortKey>> {
        parse_sort_doc(self)
    }
}

impl IntoSort for Vec<SortKey> {
    fn into_sort(self) -> StoreResult<Vec<SortKey>> {
        Ok(self)
    }
}

/// A compiled sort.
#[derive(Debug, Clone)]
pub struct CompiledSort {
    keys: Vec<(SortKey, Arc<dyn FieldType>)>,
}

impl CompiledSort {
    pub fn compile(schema: &Schema, keys: Vec<SortKey>) -> Self {
        let keys = keys
            .into_iter()
            .map(|key| {
                let field = schema.field_or_mixed(&key.path);
                (key, field)
            })
            .collect();

        Self { keys }
    }

    pub fn keys(&self) -> impl Iterator<Item = &SortKey> {
        self.keys.iter().map(|(key, _)| key)
    }

    pub fn compare(&self, a: &dyn Record, b: &dyn Record) -> Ordering {
        for (key, field) in &self.keys {
            let ordering = field.compare(a.get_value(&key.path).as_ref(), b.get_value(&key.path).as_ref());
            let ordering = match key.direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    }
}
