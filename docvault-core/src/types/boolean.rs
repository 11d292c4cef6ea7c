use bson::{Bson, Document};

use super::{
    FieldOptions, FieldType, TypeName,
    base::{self, display},
};
use crate::{
    error::{StoreError, StoreResult},
    value::{is_truthy, present},
};

/// Boolean field. Snapshots store it as `0`/`1`.
#[derive(Debug)]
pub struct BooleanType {
    path: String,
    options: FieldOptions,
}

impl BooleanType {
    pub fn new(path: impl Into<String>, options: FieldOptions) -> Self {
        Self { path: path.into(), options }
    }
}

impl FieldType for BooleanType {
    fn path(&self) -> &str {
        &self.path
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn kind(&self) -> TypeName {
        TypeName::Boolean
    }

    fn cast(&self, value: Option<Bson>, _data: &Document) -> StoreResult<Option<Bson>> {
        Ok(base::cast(&self.options, value).map(|value| match value {
            Bson::String(s) if s == "false" || s == "0" => Bson::Boolean(false),
            other => Bson::Boolean(is_truthy(&other)),
        }))
    }

    fn validate(&self, value: Option<Bson>, _data: &mut Document) -> StoreResult<Option<Bson>> {
        match base::validate(&self.path, &self.options, value)? {
            Some(Bson::Boolean(flag)) => Ok(Some(Bson::Boolean(flag))),
            Some(other) => Err(StoreError::validation(
                &self.path,
                format!("must be a boolean, got `{}`", display(&other)),
            )),
            None => Ok(None),
        }
    }

    fn parse(&self, raw: Option<Bson>) -> StoreResult<Option<Bson>> {
        Ok(present(raw).map(|raw| Bson::Boolean(is_truthy(&raw))))
    }

    fn serialize(&self, value: Option<Bson>) -> Option<Bson> {
        present(value).map(|value| match value {
            Bson::Boolean(flag) => Bson::Int32(i32::from(flag)),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn field() -> BooleanType {
        BooleanType::new("published", FieldOptions::new())
    }

    #[test]
    fn cast_understands_false_strings() {
        let data = doc! {};
        assert_eq!(field().cast(Some(Bson::from("false")), &data).unwrap(), Some(Bson::Boolean(false)));
        assert_eq!(field().cast(Some(Bson::from("0")), &data).unwrap(), Some(Bson::Boolean(false)));
        assert_eq!(field().cast(Some(Bson::from("yes")), &data).unwrap(), Some(Bson::Boolean(true)));
        assert_eq!(field().cast(Some(Bson::Int32(0)), &data).unwrap(), Some(Bson::Boolean(false)));
    }

    #[test]
    fn snapshot_form_is_numeric() {
        let raw = field().serialize(Some(Bson::Boolean(true)));
        assert_eq!(raw, Some(Bson::Int32(1)));
        assert_eq!(field().parse(raw).unwrap(), Some(Bson::Boolean(true)));
        assert_eq!(field().parse(Some(Bson::Int64(0))).unwrap(), Some(Bson::Boolean(false)));
    }

    #[test]
    fn validate_allows_absent_and_rejects_numbers() {
        let mut data = doc! {};
        assert_eq!(field().validate(None, &mut data).unwrap(), None);
        assert!(field().validate(Some(Bson::Int32(1)), &mut data).is_err());
    }
}
