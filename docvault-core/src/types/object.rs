use bson::{Bson, Document};

use super::{FieldOptions, FieldType, TypeName};

/// Marker for a nested sub-document.
///
/// The sub-paths are registered as fields of their own; this type only makes sure the
/// parent exists (an empty document by default) before they are read.
#[derive(Debug)]
pub struct ObjectType {
    path: String,
    options: FieldOptions,
}

impl ObjectType {
    pub fn new(path: impl Into<String>, options: FieldOptions) -> Self {
        let options = options.with_fallback_default(|| Bson::Document(Document::new()));
        Self { path: path.into(), options }
    }
}

impl FieldType for ObjectType {
    fn path(&self) -> &str {
        &self.path
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn kind(&self) -> TypeName {
        TypeName::Object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn defaults_to_a_fresh_document() {
        let field = ObjectType::new("meta", FieldOptions::new());
        let data = doc! {};
        assert_eq!(field.cast(None, &data).unwrap(), Some(Bson::Document(doc! {})));
        assert_eq!(
            field.cast(Some(Bson::Document(doc! { "a": 1 })), &data).unwrap(),
            Some(Bson::Document(doc! { "a": 1 }))
        );
    }
}
