//! Convenient re-exports of commonly used types from docvault.
//!
//! ```ignore
//! use docvault::prelude::*;
//! ```

pub use docvault_core::{
    collection::Collection,
    error::{StoreError, StoreResult},
    hook::{self, Hook, HookPhase, HookType},
    populate::{IntoPopulate, PopulateDescriptor},
    query::{Expr, Filter, IntoQuery},
    record::Record,
    schema::{Definition, Schema, Stage},
    sort::{Direction, IntoSort, SortKey},
    types::{Encoding, FieldOptions, FieldType, QueryOperator, TypeName, UpdateOperator},
    update::{IntoUpdate, Mutation},
};
pub use docvault_memory::{Cursor, Database, DatabaseBuilder, DatabaseOptions, Document, FindOptions, Model};
