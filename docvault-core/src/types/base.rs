//! Generic field behaviour shared by every variant, and the `Mixed` type that uses it as-is.

use std::cmp::Ordering;

use bson::{Bson, Document};

use super::{FieldOptions, FieldType, QueryOperator, TypeName, UpdateOperator};
use crate::{
    error::{StoreError, StoreResult},
    value::{is_absent, is_truthy, loose_eq, partial_compare, present, set_path},
};

/// Query operators every type supports.
pub const QUERY_OPERATORS: &[QueryOperator] = &[
    QueryOperator::Exists,
    QueryOperator::Ne,
    QueryOperator::Lt,
    QueryOperator::Lte,
    QueryOperator::Gt,
    QueryOperator::Gte,
    QueryOperator::In,
    QueryOperator::Nin,
];

/// Update operators every type supports.
pub const UPDATE_OPERATORS: &[UpdateOperator] =
    &[UpdateOperator::Set, UpdateOperator::Unset, UpdateOperator::Rename];

pub fn cast(options: &FieldOptions, value: Option<Bson>) -> Option<Bson> {
    match present(value) {
        None => options.default.as_ref().map(|producer| producer()),
        value => value,
    }
}

pub fn validate(path: &str, options: &FieldOptions, value: Option<Bson>) -> StoreResult<Option<Bson>> {
    let value = present(value);

    if options.required && value.is_none() {
        return Err(StoreError::validation(path, "is required!"));
    }

    Ok(value)
}

pub fn matches(value: Option<&Bson>, query: &Bson) -> bool {
    match value {
        Some(value) if !is_absent(Some(value)) => loose_eq(value, query),
        _ => is_absent(Some(query)),
    }
}

/// Treats a non-array operator argument as a one-element list.
pub fn argument_list(arg: &Bson) -> &[Bson] {
    match arg {
        Bson::Array(items) => items,
        other => std::slice::from_ref(other),
    }
}

pub fn query<T: FieldType + ?Sized>(
    field: &T,
    op: QueryOperator,
    value: Option<&Bson>,
    arg: &Bson,
) -> bool {
    match op {
        QueryOperator::Exists => !is_absent(value) == is_truthy(arg),
        QueryOperator::Ne => !field.matches(value, arg),
        QueryOperator::Lt => partial_compare(value, arg) == Some(Ordering::Less),
        QueryOperator::Lte => matches!(partial_compare(value, arg), Some(Ordering::Less | Ordering::Equal)),
        QueryOperator::Gt => partial_compare(value, arg) == Some(Ordering::Greater),
        QueryOperator::Gte => {
            matches!(partial_compare(value, arg), Some(Ordering::Greater | Ordering::Equal))
        }
        QueryOperator::In => argument_list(arg).iter().any(|item| field.matches(value, item)),
        QueryOperator::Nin => !argument_list(arg).iter().any(|item| field.matches(value, item)),
        _ => false,
    }
}

pub fn update(
    path: &str,
    op: UpdateOperator,
    value: Option<Bson>,
    arg: &Bson,
    data: &mut Document,
) -> StoreResult<Option<Bson>> {
    match op {
        UpdateOperator::Set => Ok(present(Some(arg.clone()))),
        UpdateOperator::Unset => Ok(if is_truthy(arg) { None } else { value }),
        UpdateOperator::Rename => {
            let target = arg.as_str().ok_or_else(|| {
                StoreError::InvalidQuery(format!("`$rename` of `{path}` needs a target path"))
            })?;

            if let Some(value) = present(value) {
                set_path(data, target, value);
            }

            Ok(None)
        }
        other => Err(unsupported_update(path, other)),
    }
}

pub fn unsupported_update(path: &str, op: UpdateOperator) -> StoreError {
    StoreError::InvalidQuery(format!("`{op}` is not supported by `{path}`"))
}

/// Renders a value for error messages without JSON quoting of strings.
pub fn display(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Untyped field. Used for undeclared paths and for `Mixed` declarations.
#[derive(Debug)]
pub struct MixedType {
    path: String,
    options: FieldOptions,
}

impl MixedType {
    pub fn new(path: impl Into<String>, options: FieldOptions) -> Self {
        Self { path: path.into(), options }
    }
}

impl FieldType for MixedType {
    fn path(&self) -> &str {
        &self.path
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn kind(&self) -> TypeName {
        TypeName::Mixed
    }
}
