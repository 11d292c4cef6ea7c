use std::sync::{Arc, RwLock};

use bson::{Bson, Document};

use super::{FieldOptions, FieldType, TypeName, VirtualGetter, VirtualSetter};
use crate::{error::StoreResult, record::Record, value::present};

/// Computed path that is never stored.
///
/// Reading the path on a live document evaluates the getter once per document and caches
/// the result. Writing it calls the setter with the data being validated; the value itself
/// is dropped.
///
/// # Example
///
/// ```ignore
/// use docvault_core::schema::Schema;
///
/// let schema = Schema::new();
/// schema
///     .virtual_path("full_name", |record| {
///         let first = record.get_value("first")?;
///         let last = record.get_value("last")?;
///         Some(format!("{} {}", first.as_str()?, last.as_str()?).into())
///     })
///     .set(|data, value| {
///         if let Some((first, last)) = value.as_str().and_then(|v| v.split_once(' ')) {
///             data.insert("first", first);
///             data.insert("last", last);
///         }
///     });
/// ```
pub struct VirtualType {
    path: String,
    options: FieldOptions,
    getter: RwLock<VirtualGetter>,
    setter: RwLock<Option<VirtualSetter>>,
}

impl VirtualType {
    pub fn new(path: impl Into<String>) -> Self {
        let getter: VirtualGetter = Arc::new(|_: &dyn Record| None);

        Self {
            path: path.into(),
            options: FieldOptions::new(),
            getter: RwLock::new(getter),
            setter: RwLock::new(None),
        }
    }

    /// Replaces the getter.
    pub fn get<F>(&self, getter: F) -> &Self
    where
        F: Fn(&dyn Record) -> Option<Bson> + Send + Sync + 'static,
    {
        let getter: VirtualGetter = Arc::new(getter);
        *self.getter.write().unwrap_or_else(|err| err.into_inner()) = getter;
        self
    }

    /// Replaces the setter.
    pub fn set<F>(&self, setter: F) -> &Self
    where
        F: Fn(&mut Document, Bson) + Send + Sync + 'static,
    {
        let setter: VirtualSetter = Arc::new(setter);
        *self.setter.write().unwrap_or_else(|err| err.into_inner()) = Some(setter);
        self
    }
}

impl std::fmt::Debug for VirtualType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualType").field("path", &self.path).finish_non_exhaustive()
    }
}

impl FieldType for VirtualType {
    fn path(&self) -> &str {
        &self.path
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn kind(&self) -> TypeName {
        TypeName::Virtual
    }

    fn cast(&self, _value: Option<Bson>, _data: &Document) -> StoreResult<Option<Bson>> {
        Ok(None)
    }

    fn validate(&self, value: Option<Bson>, data: &mut Document) -> StoreResult<Option<Bson>> {
        let setter = self.setter.read().unwrap_or_else(|err| err.into_inner()).clone();

        if let (Some(setter), Some(value)) = (setter, present(value)) {
            setter(data, value);
        }

        Ok(None)
    }

    fn parse(&self, _raw: Option<Bson>) -> StoreResult<Option<Bson>> {
        Ok(None)
    }

    fn serialize(&self, _value: Option<Bson>) -> Option<Bson> {
        None
    }

    fn accessor(&self) -> Option<VirtualGetter> {
        Some(self.getter.read().unwrap_or_else(|err| err.into_inner()).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn getter_reads_the_record() {
        let field = VirtualType::new("upper");
        field.get(|record| {
            record
                .get_value("name")
                .and_then(|name| name.as_str().map(str::to_uppercase))
                .map(Bson::String)
        });

        let data = doc! { "name": "ann" };
        let getter = field.accessor().unwrap();
        assert_eq!(getter(&data), Some(Bson::from("ANN")));
        assert_eq!(field.cast(Some(Bson::from("x")), &data).unwrap(), None);
    }

    #[test]
    fn setter_writes_other_paths() {
        let field = VirtualType::new("full");
        field.set(|data, value| {
            data.insert("copy", value);
        });

        let mut data = doc! {};
        assert_eq!(field.validate(Some(Bson::from("a b")), &mut data).unwrap(), None);
        assert_eq!(data, doc! { "copy": "a b" });

        assert_eq!(field.validate(None, &mut data).unwrap(), None);
        assert_eq!(field.serialize(Some(Bson::from("a"))), None);
    }

    #[test]
    fn default_getter_yields_nothing() {
        let field = VirtualType::new("nothing");
        let data = doc! {};
        assert_eq!(field.accessor().unwrap()(&data), None);
    }
}
