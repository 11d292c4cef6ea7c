//! Error types and result types for document store operations.
//!
//! Every fallible operation in docvault returns a [`StoreResult<T>`]. The variants of
//! [`StoreError`] fall into four families:
//!
//! - **Validation** - a field value failed its type's `required`/shape/membership checks
//! - **Population** - a populate expression named no resolvable path or model
//! - **Store errors** - id bookkeeping failures, which carry a discrete [`StoreError::code`]
//! - **Usage errors** - invalid schema, hook, method or query declarations, raised at registration

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Code carried by [`StoreError::IdExist`].
pub const ID_EXIST: &str = "ID_EXIST";
/// Code carried by [`StoreError::IdNotExist`].
pub const ID_NOT_EXIST: &str = "ID_NOT_EXIST";
/// Code carried by [`StoreError::IdUndefined`].
pub const ID_UNDEFINED: &str = "ID_UNDEFINED";

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A field value failed validation. The first field is the offending path.
    #[error("`{path}` {message}")]
    Validation {
        /// Dotted path of the field that failed.
        path: String,
        /// Human readable reason.
        message: String,
    },
    /// A populate expression could not be resolved.
    #[error("Population error: {0}")]
    Population(String),
    /// A document with the given id already exists in the collection.
    #[error("ID `{0}` has been used")]
    IdExist(String),
    /// The requested id does not exist in the collection.
    #[error("ID `{0}` does not exist")]
    IdNotExist(String),
    /// The operation requires an id and none was available.
    #[error("ID is not defined: {0}")]
    IdUndefined(String),
    /// A schema path declaration could not be interpreted.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    /// A hook was registered against something other than `save` or `remove`.
    #[error("Invalid hook: {0}")]
    InvalidHook(String),
    /// A method or static was registered without a name, or called but never registered.
    #[error("Invalid method: {0}")]
    InvalidMethod(String),
    /// A query, update or sort expression could not be compiled.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// `reduce` was called on an empty cursor without an initial value.
    #[error("Reduce of empty cursor with no initial value")]
    EmptyReduction,
    /// A hook rejected or failed to complete.
    #[error("Hook error: {0}")]
    Hook(String),
    /// Serialization/deserialization error when converting between BSON and JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Snapshot file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Snapshot persistence is misconfigured or the database handle is gone.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl StoreError {
    /// Builds a [`StoreError::Validation`] for `path`.
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Validation { path: path.into(), message: message.into() }
    }

    /// Returns the discrete store code for id bookkeeping errors.
    ///
    /// # Example
    ///
    /// ```ignore
    /// match model.remove_by_id("missing").await {
    ///     Err(err) => assert_eq!(err.code(), Some("ID_NOT_EXIST")),
    ///     Ok(_) => unreachable!(),
    /// }
    /// ```
    pub fn code(&self) -> Option<&'static str> {
        match self {
            StoreError::IdExist(_) => Some(ID_EXIST),
            StoreError::IdNotExist(_) => Some(ID_NOT_EXIST),
            StoreError::IdUndefined(_) => Some(ID_UNDEFINED),
            _ => None,
        }
    }
}

/// A specialized `Result` type for document store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<BsonError> for StoreError {
    fn from(err: BsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for StoreError {
    fn from(err: SerdeJsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
