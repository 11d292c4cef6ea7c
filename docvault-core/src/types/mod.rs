//! The polymorphic field type system.
//!
//! Every declared schema path owns one [`FieldType`]. A field type knows how to:
//!
//! - **cast** a stored value when a document is read (filling defaults)
//! - **validate** a value before it is written (enforcing `required` and the type's shape)
//! - **compare** two values for sorting
//! - **parse** and **serialize** values across the snapshot boundary
//! - **match** plain equality clauses and evaluate its named query operators
//! - apply its named update operators
//!
//! Operator names form closed registries ([`QueryOperator`], [`UpdateOperator`]); each type
//! advertises the subset it supports, and the query/update compilers reject anything else
//! before a single document is touched.
//!
//! The builtin variants are constructed through [`construct`], keyed by [`TypeName`].

use std::{cmp::Ordering, fmt, str::FromStr, sync::Arc};

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::{
    error::{StoreError, StoreResult},
    record::Record,
    value::compare_optional,
};

pub mod array;
pub mod base;
pub mod boolean;
pub mod buffer;
pub mod cuid;
pub mod date;
pub mod enumeration;
pub mod number;
pub mod object;
pub mod string;
pub mod virtual_field;

pub use array::ArrayType;
pub use base::MixedType;
pub use boolean::BooleanType;
pub use buffer::BufferType;
pub use cuid::{CuidType, IdSource};
pub use date::DateType;
pub use enumeration::EnumType;
pub use number::NumberType;
pub use object::ObjectType;
pub use string::StringType;
pub use virtual_field::VirtualType;

/// Producer for a field's default value. Invoked once per document that lacks the field.
pub type DefaultFn = Arc<dyn Fn() -> Bson + Send + Sync>;

/// Computes a virtual path from the record it is read on.
pub type VirtualGetter = Arc<dyn Fn(&dyn Record) -> Option<Bson> + Send + Sync>;

/// Receives the value written to a virtual path, along with the data being validated.
pub type VirtualSetter = Arc<dyn Fn(&mut Document, Bson) + Send + Sync>;

/// Names of the builtin field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeName {
    Mixed,
    String,
    Number,
    Integer,
    Boolean,
    Date,
    Buffer,
    Array,
    Object,
    Enum,
    Cuid,
    Virtual,
}

impl TypeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeName::Mixed => "Mixed",
            TypeName::String => "String",
            TypeName::Number => "Number",
            TypeName::Integer => "Integer",
            TypeName::Boolean => "Boolean",
            TypeName::Date => "Date",
            TypeName::Buffer => "Buffer",
            TypeName::Array => "Array",
            TypeName::Object => "Object",
            TypeName::Enum => "Enum",
            TypeName::Cuid => "CUID",
            TypeName::Virtual => "Virtual",
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeName {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.to_ascii_lowercase().as_str() {
            "mixed" => TypeName::Mixed,
            "string" => TypeName::String,
            "number" => TypeName::Number,
            "integer" => TypeName::Integer,
            "boolean" => TypeName::Boolean,
            "date" => TypeName::Date,
            "buffer" => TypeName::Buffer,
            "array" => TypeName::Array,
            "object" => TypeName::Object,
            "enum" => TypeName::Enum,
            "cuid" => TypeName::Cuid,
            "virtual" => TypeName::Virtual,
            _ => return Err(StoreError::InvalidSchema(format!("Unknown type `{s}`"))),
        };

        Ok(kind)
    }
}

/// Text encoding used by byte sequence fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Hex,
    Base64,
    Utf8,
    Latin1,
}

impl FromStr for Encoding {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(Encoding::Hex),
            "base64" => Ok(Encoding::Base64),
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "latin1" | "binary" => Ok(Encoding::Latin1),
            _ => Err(StoreError::InvalidSchema(format!("Unknown encoding `{s}`"))),
        }
    }
}

/// Options shared by every field type.
///
/// # Example
///
/// ```ignore
/// use docvault_core::types::FieldOptions;
///
/// let options = FieldOptions::new()
///     .required()
///     .default_value("draft");
/// ```
#[derive(Clone, Default)]
pub struct FieldOptions {
    /// Reject absent values on write.
    pub required: bool,
    /// Producer for the value used when a document lacks the field.
    pub default: Option<DefaultFn>,
    /// Element type of array fields.
    pub child: Option<Arc<dyn FieldType>>,
    /// Encoding of byte sequence fields.
    pub encoding: Option<Encoding>,
    /// Allowed values of enum fields.
    pub elements: Vec<Bson>,
    /// Name of the collection a reference field points at.
    pub reference: Option<String>,
}

impl FieldOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Uses a fixed default; every document receives its own copy.
    pub fn default_value(mut self, value: impl Into<Bson>) -> Self {
        let value = value.into();
        self.default = Some(Arc::new(move || value.clone()));
        self
    }

    /// Uses a producer closure as the default.
    pub fn default_with<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> Bson + Send + Sync + 'static,
    {
        self.default = Some(Arc::new(producer));
        self
    }

    pub fn child(mut self, child: Arc<dyn FieldType>) -> Self {
        self.child = Some(child);
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    pub fn elements<I, V>(mut self, elements: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.elements = elements.into_iter().map(Into::into).collect();
        self
    }

    pub fn reference(mut self, model: impl Into<String>) -> Self {
        self.reference = Some(model.into());
        self
    }

    /// Fills in `default` only when the caller did not supply one.
    pub(crate) fn with_fallback_default<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> Bson + Send + Sync + 'static,
    {
        if self.default.is_none() {
            self.default = Some(Arc::new(producer));
        }
        self
    }
}

impl fmt::Debug for FieldOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldOptions")
            .field("required", &self.required)
            .field("default", &self.default.as_ref().map(|_| "<producer>"))
            .field("child", &self.child.as_ref().map(|child| child.kind()))
            .field("encoding", &self.encoding)
            .field("elements", &self.elements)
            .field("reference", &self.reference)
            .finish()
    }
}

/// Named query operators. Parsed from the key after the `$` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryOperator {
    /// `exist` / `exists`
    Exists,
    Ne,
    Lt,
    /// `lte` / `max`
    Lte,
    Gt,
    /// `gte` / `min`
    Gte,
    In,
    Nin,
    /// `size` / `length`
    Length,
    All,
    Day,
    Month,
    Year,
    Regex,
}

impl FromStr for QueryOperator {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim_start_matches('$') {
            "exist" | "exists" => QueryOperator::Exists,
            "ne" => QueryOperator::Ne,
            "lt" => QueryOperator::Lt,
            "lte" | "max" => QueryOperator::Lte,
            "gt" => QueryOperator::Gt,
            "gte" | "min" => QueryOperator::Gte,
            "in" => QueryOperator::In,
            "nin" => QueryOperator::Nin,
            "size" | "length" => QueryOperator::Length,
            "all" => QueryOperator::All,
            "day" => QueryOperator::Day,
            "month" => QueryOperator::Month,
            "year" => QueryOperator::Year,
            "regex" => QueryOperator::Regex,
            other => return Err(StoreError::InvalidQuery(format!("Unknown query operator `${other}`"))),
        };

        Ok(op)
    }
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryOperator::Exists => "exists",
            QueryOperator::Ne => "ne",
            QueryOperator::Lt => "lt",
            QueryOperator::Lte => "lte",
            QueryOperator::Gt => "gt",
            QueryOperator::Gte => "gte",
            QueryOperator::In => "in",
            QueryOperator::Nin => "nin",
            QueryOperator::Length => "length",
            QueryOperator::All => "all",
            QueryOperator::Day => "day",
            QueryOperator::Month => "month",
            QueryOperator::Year => "year",
            QueryOperator::Regex => "regex",
        };
        write!(f, "${name}")
    }
}

/// Named update operators. Parsed from the key after the `$` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOperator {
    Set,
    Unset,
    Rename,
    Inc,
    Dec,
    Mul,
    Div,
    Mod,
    Max,
    Min,
    /// `push` / `append`
    Push,
    /// `unshift` / `prepend`
    Unshift,
    Pull,
    Shift,
    Pop,
    AddToSet,
}

impl FromStr for UpdateOperator {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim_start_matches('$') {
            "set" => UpdateOperator::Set,
            "unset" => UpdateOperator::Unset,
            "rename" => UpdateOperator::Rename,
            "inc" => UpdateOperator::Inc,
            "dec" => UpdateOperator::Dec,
            "mul" => UpdateOperator::Mul,
            "div" => UpdateOperator::Div,
            "mod" => UpdateOperator::Mod,
            "max" => UpdateOperator::Max,
            "min" => UpdateOperator::Min,
            "push" | "append" => UpdateOperator::Push,
            "unshift" | "prepend" => UpdateOperator::Unshift,
            "pull" => UpdateOperator::Pull,
            "shift" => UpdateOperator::Shift,
            "pop" => UpdateOperator::Pop,
            "addToSet" => UpdateOperator::AddToSet,
            other => return Err(StoreError::InvalidQuery(format!("Unknown update operator `${other}`"))),
        };

        Ok(op)
    }
}

impl fmt::Display for UpdateOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateOperator::Set => "set",
            UpdateOperator::Unset => "unset",
            UpdateOperator::Rename => "rename",
            UpdateOperator::Inc => "inc",
            UpdateOperator::Dec => "dec",
            UpdateOperator::Mul => "mul",
            UpdateOperator::Div => "div",
            UpdateOperator::Mod => "mod",
            UpdateOperator::Max => "max",
            UpdateOperator::Min => "min",
            UpdateOperator::Push => "push",
            UpdateOperator::Unshift => "unshift",
            UpdateOperator::Pull => "pull",
            UpdateOperator::Shift => "shift",
            UpdateOperator::Pop => "pop",
            UpdateOperator::AddToSet => "addToSet",
        };
        write!(f, "${name}")
    }
}

/// Type descriptor for one schema path.
///
/// All methods but [`path`](FieldType::path), [`options`](FieldType::options) and
/// [`kind`](FieldType::kind) have defaults delegating to the helpers in [`base`], so a
/// variant only overrides what differs from the generic behaviour.
///
/// `None` stands for "no value": a missing field, or a result that deletes the field.
pub trait FieldType: Send + Sync + fmt::Debug {
    /// Dotted path this type is registered under.
    fn path(&self) -> &str;

    fn options(&self) -> &FieldOptions;

    fn kind(&self) -> TypeName;

    /// Converts a stored value for reading, invoking the default producer when absent.
    fn cast(&self, value: Option<Bson>, _data: &Document) -> StoreResult<Option<Bson>> {
        Ok(base::cast(self.options(), value))
    }

    /// Checks a value before it is written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] naming [`path`](FieldType::path) on violation.
    fn validate(&self, value: Option<Bson>, _data: &mut Document) -> StoreResult<Option<Bson>> {
        base::validate(self.path(), self.options(), value)
    }

    fn compare(&self, a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
        compare_optional(a, b)
    }

    /// Restores a runtime value from its snapshot representation.
    fn parse(&self, raw: Option<Bson>) -> StoreResult<Option<Bson>> {
        Ok(raw)
    }

    /// Converts a runtime value into its snapshot representation.
    fn serialize(&self, value: Option<Bson>) -> Option<Bson> {
        value
    }

    /// Equality used by plain (operator-free) query clauses.
    fn matches(&self, value: Option<&Bson>, query: &Bson) -> bool {
        base::matches(value, query)
    }

    /// Query operators this type accepts.
    fn query_operators(&self) -> &'static [QueryOperator] {
        base::QUERY_OPERATORS
    }

    fn query(&self, op: QueryOperator, value: Option<&Bson>, arg: &Bson) -> bool {
        base::query(self, op, value, arg)
    }

    /// Update operators this type accepts.
    fn update_operators(&self) -> &'static [UpdateOperator] {
        base::UPDATE_OPERATORS
    }

    /// Applies `op` and returns the new value, or `None` to delete the field.
    fn update(
        &self,
        op: UpdateOperator,
        value: Option<Bson>,
        arg: &Bson,
        data: &mut Document,
    ) -> StoreResult<Option<Bson>> {
        base::update(self.path(), op, value, arg, data)
    }

    /// Element type of array fields.
    fn child(&self) -> Option<&Arc<dyn FieldType>> {
        None
    }

    /// Getter of virtual fields. Paths with an accessor are never stored.
    fn accessor(&self) -> Option<VirtualGetter> {
        None
    }
}

/// Builds a builtin field type registered under `path`.
pub fn construct(kind: TypeName, path: &str, options: FieldOptions) -> Arc<dyn FieldType> {
    match kind {
        TypeName::Mixed => Arc::new(MixedType::new(path, options)),
        TypeName::String => Arc::new(StringType::new(path, options)),
        TypeName::Number => Arc::new(NumberType::new(path, options)),
        TypeName::Integer => Arc::new(NumberType::integer(path, options)),
        TypeName::Boolean => Arc::new(BooleanType::new(path, options)),
        TypeName::Date => Arc::new(DateType::new(path, options)),
        TypeName::Buffer => Arc::new(BufferType::new(path, options)),
        TypeName::Array => Arc::new(ArrayType::new(path, options)),
        TypeName::Object => Arc::new(ObjectType::new(path, options)),
        TypeName::Enum => Arc::new(EnumType::new(path, options)),
        TypeName::Cuid => Arc::new(CuidType::new(path, options)),
        TypeName::Virtual => Arc::new(VirtualType::new(path)),
    }
}
