//! Value helpers shared by field types, compilers and the storage engine.
//!
//! Documents are plain [`bson::Document`]s addressed by dotted paths. Nothing in this
//! module knows about schemas; it only provides the generic path, equality, ordering and
//! JSON conversion rules every field type falls back on.

use std::cmp::Ordering;

use bson::{Bson, Document};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

/// Reads the value stored at `path`, walking nested documents and numeric array indices.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Writes `value` at `path`, creating (or replacing non-document) intermediate levels.
pub fn set_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }

            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

/// Removes and returns the value at `path`. Missing intermediate levels are a no-op.
pub fn remove_path(doc: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => doc.remove(path),
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Bson::Document(inner)) => remove_path(inner, rest),
            _ => None,
        },
    }
}

/// `true` for a missing value or an explicit null.
pub fn is_absent(value: Option<&Bson>) -> bool {
    matches!(value, None | Some(Bson::Null) | Some(Bson::Undefined))
}

/// Collapses an explicit null into `None`.
pub fn present(value: Option<Bson>) -> Option<Bson> {
    match value {
        Some(Bson::Null) | Some(Bson::Undefined) | None => None,
        other => other,
    }
}

/// Loose truthiness used by flag-style operator arguments (`$unset: true`, `$shift: 1`).
pub fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => false,
        Bson::Boolean(flag) => *flag,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0 && !n.is_nan(),
        Bson::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// A numeric value with integers kept exact until an operation forces floating point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    /// Extracts a number from any of the BSON numeric variants.
    pub fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::Int32(n) => Some(Numeric::Int(i64::from(*n))),
            Bson::Int64(n) => Some(Numeric::Int(*n)),
            Bson::Double(n) => Some(Numeric::Float(*n)),
            _ => None,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(n) => n as f64,
            Numeric::Float(n) => n,
        }
    }

    /// Numeric equality across the integer/float split.
    pub fn equals(self, other: Self) -> bool {
        self.partial_cmp(&other) == Some(Ordering::Equal)
    }

    /// Total order by exact value, with NaN below every number.
    pub fn total_cmp(self, other: Self) -> Ordering {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => a.cmp(&b),
            (Numeric::Float(a), Numeric::Float(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            },
            (Numeric::Int(a), Numeric::Float(b)) => cmp_int_float(a, b),
            (Numeric::Float(a), Numeric::Int(b)) => cmp_int_float(b, a).reverse(),
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Numeric::Int(n) => n == 0,
            Numeric::Float(n) => n == 0.0 || n.is_nan(),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Numeric::Int(n) => n.checked_neg().map_or(Numeric::Float(-(n as f64)), Numeric::Int),
            Numeric::Float(n) => Numeric::Float(-n),
        }
    }

    pub fn add(self, other: Self) -> Self {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => {
                a.checked_add(b).map_or(Numeric::Float(a as f64 + b as f64), Numeric::Int)
            }
            (a, b) => Numeric::Float(a.as_f64() + b.as_f64()),
        }
    }

    pub fn sub(self, other: Self) -> Self {
        self.add(other.negate())
    }

    pub fn mul(self, other: Self) -> Self {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => {
                a.checked_mul(b).map_or(Numeric::Float(a as f64 * b as f64), Numeric::Int)
            }
            (a, b) => Numeric::Float(a.as_f64() * b.as_f64()),
        }
    }

    /// Division stays integral only when it is exact.
    pub fn div(self, other: Self) -> Self {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) if b != 0 && a.checked_rem(b) == Some(0) => {
                Numeric::Int(a / b)
            }
            (a, b) => Numeric::Float(a.as_f64() / b.as_f64()),
        }
    }

    pub fn rem(self, other: Self) -> Self {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) if b != 0 => {
                a.checked_rem(b).map_or(Numeric::Int(0), Numeric::Int)
            }
            (a, b) => Numeric::Float(a.as_f64() % b.as_f64()),
        }
    }

    pub fn into_bson(self) -> Bson {
        match self {
            Numeric::Int(n) => Bson::Int64(n),
            Numeric::Float(n) => Bson::Double(n),
        }
    }
}

fn cmp_int_float(int: i64, float: f64) -> Ordering {
    // 2^63, the first float past i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if float.is_nan() || float < -LIMIT {
        return Ordering::Greater;
    }
    if float >= LIMIT {
        return Ordering::Less;
    }

    let whole = float.floor();
    int.cmp(&(whole as i64)).then(if float > whole { Ordering::Less } else { Ordering::Equal })
}

impl PartialOrd for Numeric {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => a.partial_cmp(b),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

/// Equality with numeric variants compared by value and containers compared recursively.
pub fn loose_eq(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Array(left), Bson::Array(right)) => {
            left.len() == right.len() && left.iter().zip(right).all(|(l, r)| loose_eq(l, r))
        }
        (Bson::Document(left), Bson::Document(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .all(|(key, value)| right.get(key).is_some_and(|other| loose_eq(value, other)))
        }
        _ => match (Numeric::from_bson(a), Numeric::from_bson(b)) {
            (Some(left), Some(right)) => left.partial_cmp(&right) == Some(Ordering::Equal),
            _ => a == b,
        },
    }
}

/// Membership test under [`loose_eq`].
pub fn contains(items: &[Bson], needle: &Bson) -> bool {
    items.iter().any(|item| loose_eq(item, needle))
}

fn rank(value: &Bson) -> u8 {
    match value {
        Bson::Null | Bson::Undefined => 0,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => 1,
        Bson::String(_) => 2,
        Bson::Document(_) => 3,
        Bson::Array(_) => 4,
        Bson::Binary(_) => 5,
        Bson::Boolean(_) => 6,
        Bson::DateTime(_) => 7,
        _ => 8,
    }
}

/// Total order over BSON values: by type rank first, then by the natural order of the type.
pub fn compare(a: &Bson, b: &Bson) -> Ordering {
    let by_rank = rank(a).cmp(&rank(b));
    if by_rank != Ordering::Equal {
        return by_rank;
    }

    match (a, b) {
        (Bson::String(left), Bson::String(right)) => left.cmp(right),
        (Bson::Boolean(left), Bson::Boolean(right)) => left.cmp(right),
        (Bson::DateTime(left), Bson::DateTime(right)) => left.cmp(right),
        (Bson::Binary(left), Bson::Binary(right)) => left.bytes.cmp(&right.bytes),
        (Bson::Array(left), Bson::Array(right)) => compare_sequences(left, right),
        (Bson::Document(left), Bson::Document(right)) => {
            for ((lk, lv), (rk, rv)) in left.iter().zip(right.iter()) {
                let ordering = lk.cmp(rk).then_with(|| compare(lv, rv));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            left.len().cmp(&right.len())
        }
        _ => match (Numeric::from_bson(a), Numeric::from_bson(b)) {
            (Some(left), Some(right)) => left.total_cmp(right),
            _ => Ordering::Equal,
        },
    }
}

fn compare_sequences(left: &[Bson], right: &[Bson]) -> Ordering {
    for (l, r) in left.iter().zip(right) {
        let ordering = compare(l, r);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.len().cmp(&right.len())
}

/// [`compare`] lifted over optional values; absent values sort first and tie with each other.
pub fn compare_optional(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (is_absent(a), is_absent(b)) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => match (a, b) {
            (Some(a), Some(b)) => compare(a, b),
            _ => Ordering::Equal,
        },
    }
}

/// Ordering used by range operators; only values of the same kind are comparable.
pub fn partial_compare(a: Option<&Bson>, b: &Bson) -> Option<Ordering> {
    let a = a.filter(|value| rank(value) != 0)?;
    if rank(b) == 0 || rank(a) != rank(b) {
        return None;
    }

    Some(compare(a, b))
}

/// Converts a BSON value into plain JSON for snapshot files.
pub fn to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(flag) => Value::Bool(*flag),
        Bson::Int32(n) => Value::Number(Number::from(*n)),
        Bson::Int64(n) => Value::Number(Number::from(*n)),
        Bson::Double(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
        Bson::String(s) => Value::String(s.clone()),
        Bson::Array(items) => Value::Array(items.iter().map(to_json).collect()),
        Bson::Document(doc) => Value::Object(
            doc.iter()
                .map(|(key, value)| (key.clone(), to_json(value)))
                .collect::<Map<_, _>>(),
        ),
        Bson::DateTime(at) => DateTime::<Utc>::from_timestamp_millis(at.timestamp_millis())
            .map_or(Value::Null, |at| {
                Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
            }),
        Bson::Binary(binary) => Value::String(crate::types::buffer::encode_hex(&binary.bytes)),
        other => Value::String(other.to_string()),
    }
}

/// Converts plain JSON into BSON. Integral numbers become `Int64`, everything else `Double`.
pub fn from_json(value: Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(flag) => Bson::Boolean(flag),
        Value::Number(n) => match n.as_i64() {
            Some(int) => Bson::Int64(int),
            None => Bson::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Bson::String(s),
        Value::Array(items) => Bson::Array(items.into_iter().map(from_json).collect()),
        Value::Object(map) => Bson::Document(
            map.into_iter()
                .map(|(key, value)| (key, from_json(value)))
                .collect::<Document>(),
        ),
    }
}

/// Converts a JSON object into a document, rejecting any other JSON shape.
pub fn document_from_json(value: Value) -> Option<Document> {
    match from_json(value) {
        Bson::Document(doc) => Some(doc),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;

    #[test]
    fn paths_create_and_remove_nested_levels() {
        let mut data = doc! { "name": "a" };
        set_path(&mut data, "meta.author.name", Bson::from("b"));
        assert_eq!(data, doc! { "name": "a", "meta": { "author": { "name": "b" } } });
        assert_eq!(get_path(&data, "meta.author.name"), Some(&Bson::from("b")));

        assert_eq!(remove_path(&mut data, "meta.author.name"), Some(Bson::from("b")));
        assert_eq!(remove_path(&mut data, "missing.path"), None);
        assert_eq!(data, doc! { "name": "a", "meta": { "author": {} } });
    }

    #[test]
    fn get_path_reads_array_indices() {
        let data = doc! { "tags": ["a", "b"] };
        assert_eq!(get_path(&data, "tags.1"), Some(&Bson::from("b")));
        assert_eq!(get_path(&data, "tags.x"), None);
    }

    #[test]
    fn numbers_compare_across_variants() {
        assert!(loose_eq(&Bson::Int32(3), &Bson::Double(3.0)));
        assert!(loose_eq(&bson::bson!([1, "a"]), &bson::bson!([1_i64, "a"])));
        assert_eq!(compare(&Bson::Int64(2), &Bson::Double(1.5)), Ordering::Greater);
    }

    #[test]
    fn absent_sorts_before_present() {
        assert_eq!(compare_optional(None, Some(&Bson::Int32(0))), Ordering::Less);
        assert_eq!(compare_optional(Some(&Bson::Null), None), Ordering::Equal);
        assert_eq!(compare_optional(Some(&Bson::from("a")), None), Ordering::Greater);
    }

    #[test]
    fn numbers_are_totally_ordered() {
        let mut values = vec![
            Bson::Double(2.5),
            Bson::Double(f64::NAN),
            Bson::Int64(i64::MAX),
            Bson::Int32(2),
            Bson::Double(f64::INFINITY),
            Bson::Int64(-3),
        ];
        values.sort_by(compare);

        assert!(matches!(values[0], Bson::Double(n) if n.is_nan()));
        assert_eq!(
            values[1..],
            [Bson::Int64(-3), Bson::Int32(2), Bson::Double(2.5), Bson::Int64(i64::MAX), Bson::Double(f64::INFINITY)]
        );
        assert_eq!(compare(&Bson::Int64(i64::MAX), &Bson::Double(9_223_372_036_854_775_808.0)), Ordering::Less);
        assert_eq!(compare(&Bson::Int32(2), &Bson::Double(2.0)), Ordering::Equal);
    }

    #[test]
    fn range_comparison_requires_matching_kinds() {
        assert_eq!(partial_compare(Some(&Bson::from("a")), &Bson::Int32(1)), None);
        assert_eq!(partial_compare(None, &Bson::Int32(1)), None);
        assert_eq!(partial_compare(Some(&Bson::Int32(2)), &Bson::Int32(1)), Some(Ordering::Greater));
    }

    #[test]
    fn integer_arithmetic_stays_exact() {
        assert_eq!(Numeric::Int(7).div(Numeric::Int(2)), Numeric::Float(3.5));
        assert_eq!(Numeric::Int(8).div(Numeric::Int(2)), Numeric::Int(4));
        assert_eq!(Numeric::Int(7).rem(Numeric::Int(4)), Numeric::Int(3));
        assert_eq!(Numeric::Int(1).sub(Numeric::Int(3)), Numeric::Int(-2));
    }

    #[test]
    fn json_conversion_keeps_structure() {
        let value = doc! { "a": 1_i64, "b": [true, "x"], "c": { "d": 1.5 } };
        let json = to_json(&Bson::Document(value.clone()));
        assert_eq!(document_from_json(json), Some(value));
    }
}
