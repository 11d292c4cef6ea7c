use bson::{Bson, Document};

use super::{
    FieldOptions, FieldType, TypeName,
    base::{self, display},
};
use crate::{
    error::{StoreError, StoreResult},
    value::contains,
};

/// Field restricted to a fixed list of `elements`.
#[derive(Debug)]
pub struct EnumType {
    path: String,
    options: FieldOptions,
}

impl EnumType {
    pub fn new(path: impl Into<String>, options: FieldOptions) -> Self {
        Self { path: path.into(), options }
    }

    pub fn elements(&self) -> &[Bson] {
        &self.options.elements
    }
}

impl FieldType for EnumType {
    fn path(&self) -> &str {
        &self.path
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn kind(&self) -> TypeName {
        TypeName::Enum
    }

    fn validate(&self, value: Option<Bson>, _data: &mut Document) -> StoreResult<Option<Bson>> {
        match base::validate(&self.path, &self.options, value)? {
            Some(value) if contains(self.elements(), &value) => Ok(Some(value)),
            Some(_) => {
                let allowed = self.elements().iter().map(display).collect::<Vec<_>>().join(", ");
                Err(StoreError::validation(&self.path, format!("must be one of {allowed}")))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn status() -> EnumType {
        EnumType::new("status", FieldOptions::new().elements(["draft", "published"]))
    }

    #[test]
    fn accepts_members_only() {
        let mut data = doc! {};
        assert_eq!(
            status().validate(Some(Bson::from("draft")), &mut data).unwrap(),
            Some(Bson::from("draft"))
        );

        let err = status().validate(Some(Bson::from("deleted")), &mut data).unwrap_err();
        assert_eq!(err.to_string(), "`status` must be one of draft, published");
    }

    #[test]
    fn absent_follows_required() {
        let mut data = doc! {};
        assert_eq!(status().validate(None, &mut data).unwrap(), None);

        let required = EnumType::new("status", FieldOptions::new().required().elements(["a"]));
        assert!(required.validate(None, &mut data).is_err());
    }
}
