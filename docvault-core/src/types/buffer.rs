use std::{cmp::Ordering, fmt::Write};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bson::{Binary, Bson, Document, spec::BinarySubtype};

use super::{
    Encoding, FieldOptions, FieldType, TypeName,
    base::{self, display},
};
use crate::{
    error::{StoreError, StoreResult},
    value::{Numeric, present},
};

pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

pub fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 || !text.is_ascii() {
        return None;
    }

    (0..text.len())
        .step_by(2)
        .map(|at| u8::from_str_radix(&text[at..at + 2], 16).ok())
        .collect()
}

/// Encodes bytes to text.
pub fn encode(bytes: &[u8], encoding: Encoding) -> String {
    match encoding {
        Encoding::Hex => encode_hex(bytes),
        Encoding::Base64 => STANDARD.encode(bytes),
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Encoding::Latin1 => bytes.iter().map(|byte| char::from(*byte)).collect(),
    }
}

/// Decodes text to bytes. `None` when the text is not valid for the encoding.
pub fn decode(text: &str, encoding: Encoding) -> Option<Vec<u8>> {
    match encoding {
        Encoding::Hex => decode_hex(text),
        Encoding::Base64 => STANDARD.decode(text).ok(),
        Encoding::Utf8 => Some(text.as_bytes().to_vec()),
        // code points above U+00FF keep their low byte
        Encoding::Latin1 => Some(text.chars().map(|c| (u32::from(c) & 0xff) as u8).collect()),
    }
}

pub fn binary(bytes: Vec<u8>) -> Bson {
    Bson::Binary(Binary { subtype: BinarySubtype::Generic, bytes })
}

/// Byte sequence field holding generic `Bson::Binary` values.
///
/// Reads accept binary values, strings decoded with the configured [`Encoding`]
/// (hex unless stated otherwise) and arrays of byte values. Snapshots hold the
/// encoded string. Absent values sort after present ones.
#[derive(Debug)]
pub struct BufferType {
    path: String,
    options: FieldOptions,
    encoding: Encoding,
}

impl BufferType {
    pub fn new(path: impl Into<String>, options: FieldOptions) -> Self {
        let encoding = options.encoding.unwrap_or_default();
        Self { path: path.into(), options, encoding }
    }

    fn decode_text(&self, text: &str) -> StoreResult<Bson> {
        decode(text, self.encoding).map(binary).ok_or_else(|| {
            StoreError::validation(
                &self.path,
                format!("cannot be interpreted as {:?} bytes: `{text}`", self.encoding),
            )
        })
    }
}

impl FieldType for BufferType {
    fn path(&self) -> &str {
        &self.path
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn kind(&self) -> TypeName {
        TypeName::Buffer
    }

    fn cast(&self, value: Option<Bson>, _data: &Document) -> StoreResult<Option<Bson>> {
        let Some(value) = base::cast(&self.options, value) else {
            return Ok(None);
        };

        match value {
            Bson::Binary(_) => Ok(Some(value)),
            Bson::String(text) => self.decode_text(&text).map(Some),
            Bson::Array(items) => Ok(Some(binary(
                items
                    .iter()
                    .map(|item| {
                        Numeric::from_bson(item).map_or(0, |n| (n.as_f64() as i64 & 0xff) as u8)
                    })
                    .collect(),
            ))),
            other => Err(StoreError::validation(
                &self.path,
                format!("cannot be interpreted as a buffer: `{}`", display(&other)),
            )),
        }
    }

    fn validate(&self, value: Option<Bson>, _data: &mut Document) -> StoreResult<Option<Bson>> {
        match base::validate(&self.path, &self.options, value)? {
            Some(Bson::Binary(bytes)) => Ok(Some(Bson::Binary(bytes))),
            Some(other) => Err(StoreError::validation(
                &self.path,
                format!("is not a valid buffer: `{}`", display(&other)),
            )),
            None => Ok(None),
        }
    }

    fn compare(&self, a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
        match (a, b) {
            (Some(Bson::Binary(a)), Some(Bson::Binary(b))) => a.bytes.cmp(&b.bytes),
            (Some(Bson::Binary(_)), _) => Ordering::Less,
            (_, Some(Bson::Binary(_))) => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }

    fn parse(&self, raw: Option<Bson>) -> StoreResult<Option<Bson>> {
        match present(raw) {
            Some(Bson::String(text)) => self.decode_text(&text).map(Some),
            other => Ok(other),
        }
    }

    fn serialize(&self, value: Option<Bson>) -> Option<Bson> {
        present(value).map(|value| match value {
            Bson::Binary(binary) => Bson::String(encode(&binary.bytes, self.encoding)),
            other => other,
        })
    }

    fn matches(&self, value: Option<&Bson>, query: &Bson) -> bool {
        match (value, query) {
            (Some(Bson::Binary(value)), Bson::Binary(query)) => value.bytes == query.bytes,
            (Some(Bson::Binary(value)), Bson::String(text)) => {
                decode(text, self.encoding).is_some_and(|bytes| bytes == value.bytes)
            }
            _ => base::matches(value, query),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{bson, doc};

    fn field(encoding: Encoding) -> BufferType {
        BufferType::new("payload", FieldOptions::new().encoding(encoding))
    }

    #[test]
    fn hex_is_the_default_encoding() {
        let field = BufferType::new("payload", FieldOptions::new());
        let data = doc! {};
        assert_eq!(field.cast(Some(Bson::from("00ff10")), &data).unwrap(), Some(binary(vec![0, 255, 16])));
        assert_eq!(field.serialize(Some(binary(vec![171, 205]))), Some(Bson::from("abcd")));
    }

    #[test]
    fn cast_accepts_byte_arrays() {
        let data = doc! {};
        assert_eq!(
            field(Encoding::Hex).cast(Some(bson!([1, 2, 256])), &data).unwrap(),
            Some(binary(vec![1, 2, 0]))
        );
        assert!(field(Encoding::Hex).cast(Some(Bson::Boolean(true)), &data).is_err());
        assert!(field(Encoding::Hex).cast(Some(Bson::from("zz")), &data).is_err());
    }

    #[test]
    fn encodings_round_trip() {
        let bytes = b"hello world".to_vec();
        for encoding in [Encoding::Hex, Encoding::Base64, Encoding::Utf8, Encoding::Latin1] {
            let field = field(encoding);
            let raw = field.serialize(Some(binary(bytes.clone())));
            assert_eq!(field.parse(raw).unwrap(), Some(binary(bytes.clone())), "{encoding:?}");
        }
    }

    #[test]
    fn absent_sorts_last() {
        let field = field(Encoding::Hex);
        let small = binary(vec![1]);
        let large = binary(vec![1, 0]);
        assert_eq!(field.compare(Some(&small), Some(&large)), Ordering::Less);
        assert_eq!(field.compare(Some(&small), None), Ordering::Less);
        assert_eq!(field.compare(None, Some(&small)), Ordering::Greater);
    }

    #[test]
    fn matches_compares_bytes() {
        let field = field(Encoding::Hex);
        let value = binary(vec![0xab]);
        assert!(field.matches(Some(&value), &binary(vec![0xab])));
        assert!(field.matches(Some(&value), &Bson::from("ab")));
        assert!(!field.matches(Some(&value), &binary(vec![0xac])));
    }
}
