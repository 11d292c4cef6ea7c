use bson::{Bson, Document};
use regex::RegexBuilder;

use super::{
    FieldOptions, FieldType, QueryOperator, TypeName,
    base::{self, display},
};
use crate::{
    error::{StoreError, StoreResult},
    value::{Numeric, to_json},
};

const QUERY_OPERATORS: &[QueryOperator] = &[
    QueryOperator::Exists,
    QueryOperator::Ne,
    QueryOperator::Lt,
    QueryOperator::Lte,
    QueryOperator::Gt,
    QueryOperator::Gte,
    QueryOperator::In,
    QueryOperator::Nin,
    QueryOperator::Length,
    QueryOperator::Regex,
];

/// UTF-8 text field.
///
/// Reads coerce scalars to their textual form; writes reject anything but a string.
/// Supports `$length` and `$regex` on top of the generic operators. A `$regex` argument
/// is either a pattern string or `{ pattern, options }` where options may contain
/// `i`, `m`, `s` and `x`.
#[derive(Debug)]
pub struct StringType {
    path: String,
    options: FieldOptions,
}

impl StringType {
    pub fn new(path: impl Into<String>, options: FieldOptions) -> Self {
        Self { path: path.into(), options }
    }
}

/// Textual form of a scalar, used when casting into a string field.
pub(crate) fn stringify(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::Double(n) if n.fract() == 0.0 && n.is_finite() => format!("{n:.0}"),
        Bson::Double(n) => n.to_string(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Boolean(flag) => flag.to_string(),
        Bson::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        Bson::DateTime(_) | Bson::Document(_) | Bson::Binary(_) => match to_json(value) {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        },
        other => other.to_string(),
    }
}

/// Compiles a `$regex` argument.
pub fn compile_pattern(arg: &Bson) -> StoreResult<regex::Regex> {
    let (pattern, flags) = match arg {
        Bson::String(pattern) => (pattern.as_str(), ""),
        Bson::Document(spec) => (
            spec.get_str("pattern")
                .map_err(|_| StoreError::InvalidQuery("`$regex` needs a `pattern`".into()))?,
            spec.get_str("options").unwrap_or(""),
        ),
        other => {
            return Err(StoreError::InvalidQuery(format!(
                "`$regex` expects a pattern, got `{}`",
                display(other)
            )));
        }
    };

    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'))
        .build()
        .map_err(|err| StoreError::InvalidQuery(err.to_string()))
}

impl FieldType for StringType {
    fn path(&self) -> &str {
        &self.path
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn kind(&self) -> TypeName {
        TypeName::String
    }

    fn cast(&self, value: Option<Bson>, _data: &Document) -> StoreResult<Option<Bson>> {
        Ok(base::cast(&self.options, value).map(|value| match value {
            Bson::String(_) => value,
            other => Bson::String(stringify(&other)),
        }))
    }

    fn validate(&self, value: Option<Bson>, _data: &mut Document) -> StoreResult<Option<Bson>> {
        match base::validate(&self.path, &self.options, value)? {
            Some(Bson::String(s)) => Ok(Some(Bson::String(s))),
            Some(other) => Err(StoreError::validation(
                &self.path,
                format!("must be a string, got `{}`", display(&other)),
            )),
            None => Ok(None),
        }
    }

    fn query_operators(&self) -> &'static [QueryOperator] {
        QUERY_OPERATORS
    }

    fn query(&self, op: QueryOperator, value: Option<&Bson>, arg: &Bson) -> bool {
        match op {
            QueryOperator::Length => {
                let length = value.and_then(Bson::as_str).map_or(0, |s| s.chars().count());
                Numeric::from_bson(arg).is_some_and(|expected| expected.equals(Numeric::Int(length as i64)))
            }
            QueryOperator::Regex => match (value.and_then(Bson::as_str), compile_pattern(arg)) {
                (Some(text), Ok(pattern)) => pattern.is_match(text),
                _ => false,
            },
            _ => base::query(self, op, value, arg),
        }
    }
}
