use std::{cmp::Ordering, sync::Arc};

use bson::{Bson, Document};

use super::{
    FieldOptions, FieldType, MixedType, QueryOperator, TypeName, UpdateOperator,
    base::{self, argument_list, display},
};
use crate::{
    error::{StoreError, StoreResult},
    value::{Numeric, compare_optional, contains, is_truthy, present},
};

const QUERY_OPERATORS: &[QueryOperator] = &[
    QueryOperator::Exists,
    QueryOperator::Ne,
    QueryOperator::Lt,
    QueryOperator::Lte,
    QueryOperator::Gt,
    QueryOperator::Gte,
    QueryOperator::In,
    QueryOperator::Nin,
    QueryOperator::Length,
    QueryOperator::All,
];

const UPDATE_OPERATORS: &[UpdateOperator] = &[
    UpdateOperator::Set,
    UpdateOperator::Unset,
    UpdateOperator::Rename,
    UpdateOperator::Push,
    UpdateOperator::Unshift,
    UpdateOperator::Pull,
    UpdateOperator::Shift,
    UpdateOperator::Pop,
    UpdateOperator::AddToSet,
];

/// Homogeneous list field.
///
/// The element type (`child`, `Mixed` unless declared) is applied to every element on cast,
/// validate, parse and serialize. Defaults to an empty list.
///
/// Membership operators (`$in`, `$nin`, `$all`) test the stored list against the whole
/// argument list rather than comparing the list itself:
///
/// ```ignore
/// // { tags: ["a", "b"] }
/// doc! { "tags": { "$in": ["b", "z"] } }   // matches
/// doc! { "tags": { "$all": ["a", "z"] } }  // does not match
/// ```
#[derive(Debug)]
pub struct ArrayType {
    path: String,
    options: FieldOptions,
    child: Arc<dyn FieldType>,
}

impl ArrayType {
    pub fn new(path: impl Into<String>, options: FieldOptions) -> Self {
        let path = path.into();
        let options = options.with_fallback_default(|| Bson::Array(Vec::new()));
        let child = options
            .child
            .clone()
            .unwrap_or_else(|| Arc::new(MixedType::new(path.clone(), FieldOptions::new())));

        Self { path, options, child }
    }

    fn each<F>(&self, items: Vec<Bson>, mut f: F) -> StoreResult<Vec<Bson>>
    where
        F: FnMut(&dyn FieldType, Bson) -> StoreResult<Option<Bson>>,
    {
        items
            .into_iter()
            .map(|item| f(self.child.as_ref(), item).map(|item| item.unwrap_or(Bson::Null)))
            .collect()
    }
}

fn list(value: Option<Bson>) -> Option<Vec<Bson>> {
    match present(value) {
        Some(Bson::Array(items)) => Some(items),
        Some(other) => Some(vec![other]),
        None => None,
    }
}

/// Number of elements a `$shift`/`$pop` argument asks to remove. `None` leaves the list alone.
fn removal_count(arg: &Bson) -> Option<i64> {
    match arg {
        Bson::Boolean(true) => Some(1),
        other if !is_truthy(other) => None,
        other => Numeric::from_bson(other).map(|n| n.as_f64() as i64),
    }
}

fn clamp(index: i64, len: usize) -> usize {
    index.clamp(0, len as i64) as usize
}

impl FieldType for ArrayType {
    fn path(&self) -> &str {
        &self.path
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn kind(&self) -> TypeName {
        TypeName::Array
    }

    fn child(&self) -> Option<&Arc<dyn FieldType>> {
        Some(&self.child)
    }

    fn cast(&self, value: Option<Bson>, data: &Document) -> StoreResult<Option<Bson>> {
        let Some(items) = list(base::cast(&self.options, value)) else {
            return Ok(None);
        };

        self.each(items, |child, item| child.cast(Some(item), data))
            .map(|items| Some(Bson::Array(items)))
    }

    fn validate(&self, value: Option<Bson>, data: &mut Document) -> StoreResult<Option<Bson>> {
        match base::validate(&self.path, &self.options, value)? {
            Some(Bson::Array(items)) => self
                .each(items, |child, item| child.validate(Some(item), data))
                .map(|items| Some(Bson::Array(items))),
            Some(other) => Err(StoreError::validation(
                &self.path,
                format!("`{}` is not an array!", display(&other)),
            )),
            None => Ok(None),
        }
    }

    fn compare(&self, a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
        match (a, b) {
            (Some(Bson::Array(a)), Some(Bson::Array(b))) => a
                .iter()
                .zip(b)
                .map(|(a, b)| self.child.compare(Some(a), Some(b)))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (a, b) => compare_optional(a, b),
        }
    }

    fn parse(&self, raw: Option<Bson>) -> StoreResult<Option<Bson>> {
        match present(raw) {
            Some(Bson::Array(items)) => self
                .each(items, |child, item| child.parse(Some(item)))
                .map(|items| Some(Bson::Array(items))),
            other => Ok(other),
        }
    }

    fn serialize(&self, value: Option<Bson>) -> Option<Bson> {
        match present(value) {
            Some(Bson::Array(items)) => Some(Bson::Array(
                items
                    .into_iter()
                    .map(|item| self.child.serialize(Some(item)).unwrap_or(Bson::Null))
                    .collect(),
            )),
            other => other,
        }
    }

    fn matches(&self, value: Option<&Bson>, query: &Bson) -> bool {
        match (value, query) {
            (Some(Bson::Array(items)), Bson::Array(expected)) => {
                items.len() == expected.len()
                    && items
                        .iter()
                        .zip(expected)
                        .all(|(item, expected)| self.child.matches(Some(item), expected))
            }
            _ => base::matches(value, query),
        }
    }

    fn query_operators(&self) -> &'static [QueryOperator] {
        QUERY_OPERATORS
    }

    fn query(&self, op: QueryOperator, value: Option<&Bson>, arg: &Bson) -> bool {
        let items = match value {
            Some(Bson::Array(items)) => Some(items.as_slice()),
            _ => None,
        };

        match op {
            QueryOperator::Length => {
                let length = items.map_or(0, <[Bson]>::len);
                Numeric::from_bson(arg)
                    .is_some_and(|expected| expected.equals(Numeric::Int(length as i64)))
            }
            QueryOperator::In => items
                .is_some_and(|items| argument_list(arg).iter().any(|query| contains(items, query))),
            QueryOperator::Nin => items
                .is_none_or(|items| !argument_list(arg).iter().any(|query| contains(items, query))),
            QueryOperator::All => items
                .is_some_and(|items| argument_list(arg).iter().all(|query| contains(items, query))),
            _ => base::query(self, op, value, arg),
        }
    }

    fn update_operators(&self) -> &'static [UpdateOperator] {
        UPDATE_OPERATORS
    }

    fn update(
        &self,
        op: UpdateOperator,
        value: Option<Bson>,
        arg: &Bson,
        data: &mut Document,
    ) -> StoreResult<Option<Bson>> {
        let current = match present(value.clone()) {
            Some(Bson::Array(items)) => Some(items),
            _ => None,
        };

        let updated = match op {
            UpdateOperator::Push => {
                let mut items = current.unwrap_or_default();
                items.extend(argument_list(arg).iter().cloned());
                Some(items)
            }
            UpdateOperator::Unshift => {
                let mut items = argument_list(arg).to_vec();
                items.extend(current.unwrap_or_default());
                Some(items)
            }
            UpdateOperator::Pull => current.map(|items| {
                let removed = argument_list(arg);
                items.into_iter().filter(|item| !contains(removed, item)).collect()
            }),
            UpdateOperator::Shift => match (current, removal_count(arg)) {
                (Some(items), Some(count)) => {
                    let len = items.len();
                    let range = if count > 0 {
                        clamp(count, len)..len
                    } else {
                        0..clamp(len as i64 + count, len)
                    };
                    Some(items[range].to_vec())
                }
                (current, _) => current,
            },
            UpdateOperator::Pop => match (current, removal_count(arg)) {
                (Some(items), Some(count)) => {
                    let len = items.len();
                    let range = if count > 0 {
                        0..clamp(len as i64 - count, len)
                    } else {
                        clamp(-count, len)..len
                    };
                    Some(items[range].to_vec())
                }
                (current, _) => current,
            },
            UpdateOperator::AddToSet => {
                let mut items = current.unwrap_or_default();
                for item in argument_list(arg) {
                    if !contains(&items, item) {
                        items.push(item.clone());
                    }
                }
                Some(items)
            }
            _ => return base::update(&self.path, op, value, arg, data),
        };

        Ok(updated.map(Bson::Array))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NumberType, StringType};
    use bson::{bson, doc};
    use pretty_assertions::assert_eq;

    fn tags() -> ArrayType {
        ArrayType::new("tags", FieldOptions::new())
    }

    fn apply(op: UpdateOperator, value: Bson, arg: Bson) -> Option<Bson> {
        let mut data = doc! {};
        tags().update(op, Some(value), &arg, &mut data).unwrap()
    }

    #[test]
    fn cast_applies_child_and_wraps_scalars() {
        let child: Arc<dyn FieldType> = Arc::new(NumberType::new("scores", FieldOptions::new()));
        let field = ArrayType::new("scores", FieldOptions::new().child(child));
        let data = doc! {};
        assert_eq!(field.cast(Some(bson!(["1", 2])), &data).unwrap(), Some(bson!([1_i64, 2_i64])));
        assert_eq!(field.cast(Some(Bson::from("3")), &data).unwrap(), Some(bson!([3_i64])));
        assert_eq!(field.cast(None, &data).unwrap(), Some(bson!([])));
    }

    #[test]
    fn validate_checks_each_element() {
        let child: Arc<dyn FieldType> = Arc::new(StringType::new("tags", FieldOptions::new()));
        let field = ArrayType::new("tags", FieldOptions::new().child(child));
        let mut data = doc! {};
        assert!(field.validate(Some(bson!(["a", 1])), &mut data).is_err());
        assert!(field.validate(Some(Bson::from("a")), &mut data).is_err());
        assert_eq!(field.validate(Some(bson!(["a"])), &mut data).unwrap(), Some(bson!(["a"])));
    }

    #[test]
    fn compare_by_elements_then_length() {
        let field = tags();
        assert_eq!(field.compare(Some(&bson!([1, 2])), Some(&bson!([1, 3]))), Ordering::Less);
        assert_eq!(field.compare(Some(&bson!([1, 2])), Some(&bson!([1]))), Ordering::Greater);
        assert_eq!(field.compare(None, Some(&bson!([]))), Ordering::Less);
        assert_eq!(field.compare(None, None), Ordering::Equal);
    }

    #[test]
    fn mixed_shapes_sort_consistently() {
        let field = tags();
        let mut values = vec![
            Some(bson!([2])),
            Some(Bson::from("x")),
            None,
            Some(Bson::Double(f64::NAN)),
            Some(bson!([1])),
            Some(Bson::Int32(3)),
        ];
        values.sort_by(|a, b| field.compare(a.as_ref(), b.as_ref()));

        assert_eq!(values[0], None);
        assert!(matches!(values[1], Some(Bson::Double(n)) if n.is_nan()));
        assert_eq!(values[2..], [Some(Bson::Int32(3)), Some(Bson::from("x")), Some(bson!([1])), Some(bson!([2]))]);
        assert_eq!(field.compare(Some(&bson!([1])), Some(&Bson::Int32(9))), Ordering::Greater);
    }

    #[test]
    fn membership_operators_use_the_whole_list() {
        let field = tags();
        let value = bson!(["a", "b"]);
        assert!(field.query(QueryOperator::In, Some(&value), &bson!(["b", "z"])));
        assert!(!field.query(QueryOperator::In, None, &bson!(["b"])));
        assert!(field.query(QueryOperator::Nin, Some(&value), &bson!(["z"])));
        assert!(field.query(QueryOperator::Nin, None, &bson!(["a"])));
        assert!(field.query(QueryOperator::All, Some(&value), &bson!(["a", "b"])));
        assert!(!field.query(QueryOperator::All, Some(&value), &bson!(["a", "z"])));
        assert!(field.query(QueryOperator::Length, Some(&value), &Bson::Int32(2)));
        assert!(field.matches(Some(&value), &bson!(["a", "b"])));
        assert!(!field.matches(Some(&value), &bson!(["a"])));
    }

    #[test]
    fn push_and_unshift_concatenate_lists() {
        assert_eq!(apply(UpdateOperator::Push, bson!([1]), bson!([2, 3])), Some(bson!([1, 2, 3])));
        assert_eq!(apply(UpdateOperator::Push, bson!([1]), Bson::Int32(2)), Some(bson!([1, 2])));
        assert_eq!(apply(UpdateOperator::Unshift, bson!([3]), bson!([1, 2])), Some(bson!([1, 2, 3])));

        let mut data = doc! {};
        assert_eq!(
            tags().update(UpdateOperator::Push, None, &Bson::from("a"), &mut data).unwrap(),
            Some(bson!(["a"]))
        );
    }

    #[test]
    fn pull_removes_values() {
        assert_eq!(apply(UpdateOperator::Pull, bson!([1, 2, 1, 3]), Bson::Int32(1)), Some(bson!([2, 3])));
        assert_eq!(apply(UpdateOperator::Pull, bson!([1, 2, 3]), bson!([1, 3])), Some(bson!([2])));
    }

    #[test]
    fn shift_and_pop_accept_flags_and_counts() {
        let value = bson!([1, 2, 3, 4]);
        assert_eq!(apply(UpdateOperator::Shift, value.clone(), Bson::Boolean(true)), Some(bson!([2, 3, 4])));
        assert_eq!(apply(UpdateOperator::Shift, value.clone(), Bson::Int32(2)), Some(bson!([3, 4])));
        assert_eq!(apply(UpdateOperator::Shift, value.clone(), Bson::Int32(-1)), Some(bson!([1, 2, 3])));
        assert_eq!(apply(UpdateOperator::Shift, value.clone(), Bson::Boolean(false)), Some(value.clone()));
        assert_eq!(apply(UpdateOperator::Pop, value.clone(), Bson::Boolean(true)), Some(bson!([1, 2, 3])));
        assert_eq!(apply(UpdateOperator::Pop, value.clone(), Bson::Int32(3)), Some(bson!([1])));
        assert_eq!(apply(UpdateOperator::Pop, value.clone(), Bson::Int32(-1)), Some(bson!([2, 3, 4])));
        assert_eq!(apply(UpdateOperator::Pop, value, Bson::Int32(10)), Some(bson!([])));
    }

    #[test]
    fn add_to_set_is_idempotent() {
        assert_eq!(apply(UpdateOperator::AddToSet, bson!([1, 2]), Bson::Int32(2)), Some(bson!([1, 2])));
        assert_eq!(apply(UpdateOperator::AddToSet, bson!([1]), bson!([1, 2, 2])), Some(bson!([1, 2])));
    }
}
