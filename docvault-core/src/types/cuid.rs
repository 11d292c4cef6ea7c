//! Collision-resistant identifiers and the field type that generates them.

use std::{
    sync::{
        LazyLock,
        atomic::{AtomicU64, Ordering as AtomicOrdering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use bson::{Bson, Document};
use rand::Rng;

use super::{
    FieldOptions, FieldType, TypeName,
    base::{self, display},
};
use crate::error::{StoreError, StoreResult};

const BASE: u64 = 36;
const BLOCK: usize = 4;
/// Total length of a generated id.
pub const ID_LENGTH: usize = 25;

static SOURCE: LazyLock<IdSource> = LazyLock::new(IdSource::new);

fn base36(mut value: u64, width: usize) -> String {
    let mut digits = vec![b'0'; width];
    for slot in digits.iter_mut().rev() {
        *slot = char::from_digit((value % BASE) as u32, BASE as u32)
            .map_or(b'0', |digit| digit as u8);
        value /= BASE;
    }
    String::from_utf8_lossy(&digits).into_owned()
}

/// Generator of 25-character ids: `c`, an 8-digit base36 timestamp, a 4-digit counter,
/// a 4-digit host fingerprint and 8 random digits.
///
/// Ids from one source are unique even within the same millisecond, as long as fewer than
/// 36^4 are drawn in it.
#[derive(Debug)]
pub struct IdSource {
    counter: AtomicU64,
    fingerprint: String,
}

impl IdSource {
    pub fn new() -> Self {
        let pid = u64::from(std::process::id());
        let host = std::env::var("HOSTNAME").unwrap_or_default();
        let host = host.bytes().fold(host.len() as u64 + BASE, |acc, byte| acc + u64::from(byte));

        Self {
            counter: AtomicU64::new(rand::thread_rng().gen_range(0..BASE.pow(BLOCK as u32))),
            fingerprint: format!("{}{}", base36(pid, 2), base36(host, 2)),
        }
    }

    /// Draws the next id.
    pub fn next_id(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64);
        let count = self.counter.fetch_add(1, AtomicOrdering::Relaxed);
        let mut rng = rand::thread_rng();
        let block = BASE.pow(BLOCK as u32);

        format!(
            "c{}{}{}{}{}",
            base36(millis, 8),
            base36(count, BLOCK),
            self.fingerprint,
            base36(rng.gen_range(0..block), BLOCK),
            base36(rng.gen_range(0..block), BLOCK),
        )
    }
}

impl Default for IdSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Draws an id from the process-wide source.
pub fn generate() -> String {
    SOURCE.next_id()
}

/// Whether `id` has the shape of a generated id.
pub fn is_cuid(id: &str) -> bool {
    id.starts_with('c') && id.len() == ID_LENGTH
}

/// String id field. Generates an id when the field is required and no value is present.
#[derive(Debug)]
pub struct CuidType {
    path: String,
    options: FieldOptions,
}

impl CuidType {
    pub fn new(path: impl Into<String>, options: FieldOptions) -> Self {
        Self { path: path.into(), options }
    }
}

impl FieldType for CuidType {
    fn path(&self) -> &str {
        &self.path
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn kind(&self) -> TypeName {
        TypeName::Cuid
    }

    fn cast(&self, value: Option<Bson>, _data: &Document) -> StoreResult<Option<Bson>> {
        match base::cast(&self.options, value) {
            None if self.options.required => Ok(Some(Bson::String(generate()))),
            value => Ok(value),
        }
    }

    fn validate(&self, value: Option<Bson>, _data: &mut Document) -> StoreResult<Option<Bson>> {
        match base::validate(&self.path, &self.options, value)? {
            Some(Bson::String(id)) if is_cuid(&id) => Ok(Some(Bson::String(id))),
            Some(other) => Err(StoreError::validation(
                &self.path,
                format!("`{}` is not a valid CUID", display(&other)),
            )),
            None => Ok(None),
        }
    }
}
