use std::cmp::Ordering;

use bson::{Bson, DateTime as BsonDateTime, Document};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use super::{
    FieldOptions, FieldType, QueryOperator, TypeName, UpdateOperator,
    base::{self, display},
};
use crate::{
    error::{StoreError, StoreResult},
    value::{Numeric, present},
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
    QueryOperator::Day,
    QueryOperator::Month,
    QueryOperator::Year,
];

const UPDATE_OPERATORS: &[UpdateOperator] = &[
    UpdateOperator::Set,
    UpdateOperator::Unset,
    UpdateOperator::Rename,
    UpdateOperator::Inc,
    UpdateOperator::Dec,
];

/// Parses RFC 3339 timestamps, naive `YYYY-MM-DDTHH:MM:SS[.fff]` (taken as UTC) and bare dates.
pub fn parse_date(input: &str) -> Option<BsonDateTime> {
    let input = input.trim();

    let millis = DateTime::parse_from_rfc3339(input)
        .map(|at| at.timestamp_millis())
        .or_else(|_| {
            NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|at| at.and_utc().timestamp_millis())
        })
        .or_else(|_| {
            NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S%.f")
                .map(|at| at.and_utc().timestamp_millis())
        })
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|at| at.and_utc().timestamp_millis())
        })?;

    Some(BsonDateTime::from_millis(millis))
}

/// ISO 8601 form with millisecond precision, as written to snapshots.
pub fn format_date(at: BsonDateTime) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(at.timestamp_millis())
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn to_date(value: &Bson) -> Option<BsonDateTime> {
    match value {
        Bson::DateTime(at) => Some(*at),
        Bson::String(s) => parse_date(s),
        other => Numeric::from_bson(other)
            .filter(|millis| millis.as_f64().is_finite())
            .map(|millis| BsonDateTime::from_millis(millis.as_f64() as i64)),
    }
}

fn calendar(value: Option<&Bson>) -> Option<DateTime<Utc>> {
    match value {
        Some(Bson::DateTime(at)) => DateTime::<Utc>::from_timestamp_millis(at.timestamp_millis()),
        _ => None,
    }
}

/// Timestamp field holding `Bson::DateTime` values.
///
/// Calendar operators (`$day`, `$month`, `$year`) read the UTC calendar; `$month` is
/// zero-based. `$inc`/`$dec` shift by milliseconds and leave absent values absent.
#[derive(Debug)]
pub struct DateType {
    path: String,
    options: FieldOptions,
}

impl DateType {
    pub fn new(path: impl Into<String>, options: FieldOptions) -> Self {
        Self { path: path.into(), options }
    }
}

impl FieldType for DateType {
    fn path(&self) -> &str {
        &self.path
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn kind(&self) -> TypeName {
        TypeName::Date
    }

    fn cast(&self, value: Option<Bson>, _data: &Document) -> StoreResult<Option<Bson>> {
        // unparseable input is kept as-is so validation can report it
        Ok(base::cast(&self.options, value)
            .map(|value| to_date(&value).map_or(value, Bson::DateTime)))
    }

    fn validate(&self, value: Option<Bson>, _data: &mut Document) -> StoreResult<Option<Bson>> {
        match base::validate(&self.path, &self.options, value)? {
            Some(Bson::DateTime(at)) => Ok(Some(Bson::DateTime(at))),
            Some(other) => Err(StoreError::validation(
                &self.path,
                format!("is not a valid date: `{}`", display(&other)),
            )),
            None => Ok(None),
        }
    }

    fn compare(&self, a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
        let a = a.and_then(Bson::as_datetime).map(|at| at.timestamp_millis());
        let b = b.and_then(Bson::as_datetime).map(|at| at.timestamp_millis());
        a.cmp(&b)
    }

    fn parse(&self, raw: Option<Bson>) -> StoreResult<Option<Bson>> {
        let Some(raw) = present(raw) else {
            return Ok(None);
        };

        to_date(&raw).map(|at| Some(Bson::DateTime(at))).ok_or_else(|| {
            StoreError::validation(
                &self.path,
                format!("cannot be interpreted as a date: `{}`", display(&raw)),
            )
        })
    }

    fn serialize(&self, value: Option<Bson>) -> Option<Bson> {
        present(value).map(|value| match value {
            Bson::DateTime(at) => format_date(at).map_or(Bson::DateTime(at), Bson::String),
            other => other,
        })
    }

    fn matches(&self, value: Option<&Bson>, query: &Bson) -> bool {
        match (value.and_then(Bson::as_datetime), to_date(query)) {
            (Some(at), Some(expected)) => at.timestamp_millis() == expected.timestamp_millis(),
            _ => base::matches(value, query),
        }
    }

    fn query_operators(&self) -> &'static [QueryOperator] {
        QUERY_OPERATORS
    }

    fn query(&self, op: QueryOperator, value: Option<&Bson>, arg: &Bson) -> bool {
        let expected = || Numeric::from_bson(arg);
        let component = |extract: fn(&DateTime<Utc>) -> i64| {
            calendar(value)
                .zip(expected())
                .is_some_and(|(at, expected)| expected.equals(Numeric::Int(extract(&at))))
        };

        match op {
            QueryOperator::Day => component(|at: &DateTime<Utc>| i64::from(at.day())),
            QueryOperator::Month => component(|at: &DateTime<Utc>| i64::from(at.month0())),
            QueryOperator::Year => component(|at: &DateTime<Utc>| i64::from(at.year())),
            QueryOperator::Lt | QueryOperator::Lte | QueryOperator::Gt | QueryOperator::Gte => {
                match to_date(arg) {
                    Some(at) => base::query(self, op, value, &Bson::DateTime(at)),
                    None => false,
                }
            }
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
        let sign = match op {
            UpdateOperator::Inc => 1,
            UpdateOperator::Dec => -1,
            _ => return base::update(&self.path, op, value, arg, data),
        };

        let millis = Numeric::from_bson(arg)
            .map(|n| n.as_f64().trunc())
            .filter(|n| (i64::MIN as f64..i64::MAX as f64).contains(n))
            .ok_or_else(|| {
                StoreError::InvalidQuery(format!(
                    "`{op}` on `{}` expects milliseconds, got `{}`",
                    self.path,
                    display(arg)
                ))
            })?;

        let Some(at) = value.as_ref().and_then(Bson::as_datetime) else {
            return Ok(None);
        };

        (millis as i64)
            .checked_mul(sign)
            .and_then(|delta| at.timestamp_millis().checked_add(delta))
            .filter(|shifted| DateTime::<Utc>::from_timestamp_millis(*shifted).is_some())
            .map(|shifted| Some(Bson::DateTime(BsonDateTime::from_millis(shifted))))
            .ok_or_else(|| {
                StoreError::InvalidQuery(format!(
                    "`{op}` by `{}` moves `{}` out of the date range",
                    display(arg),
                    self.path
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn field() -> DateType {
        DateType::new("created", FieldOptions::new())
    }

    fn at(input: &str) -> Bson {
        Bson::DateTime(parse_date(input).unwrap())
    }

    #[test]
    fn cast_accepts_strings_and_millis() {
        let data = doc! {};
        assert_eq!(
            field().cast(Some(Bson::from("2020-01-02T03:04:05.006Z")), &data).unwrap(),
            Some(at("2020-01-02T03:04:05.006Z"))
        );
        assert_eq!(
            field().cast(Some(Bson::Int64(0)), &data).unwrap(),
            Some(Bson::DateTime(BsonDateTime::from_millis(0)))
        );
        assert_eq!(field().cast(Some(Bson::from("2020-01-02")), &data).unwrap(), Some(at("2020-01-02T00:00:00Z")));
    }

    #[test]
    fn invalid_dates_fail_validation() {
        let data = doc! {};
        let mut scratch = doc! {};
        let cast = field().cast(Some(Bson::from("not a date")), &data).unwrap();
        assert!(field().validate(cast, &mut scratch).is_err());
    }

    #[test]
    fn serialize_round_trips_through_iso_strings() {
        let value = at("2021-06-30T12:00:00.123Z");
        let raw = field().serialize(Some(value.clone()));
        assert_eq!(raw, Some(Bson::from("2021-06-30T12:00:00.123Z")));
        assert_eq!(field().parse(raw).unwrap(), Some(value));
    }

    #[test]
    fn calendar_operators_use_zero_based_month() {
        let value = at("2021-06-30T12:00:00Z");
        assert!(field().query(QueryOperator::Day, Some(&value), &Bson::Int32(30)));
        assert!(field().query(QueryOperator::Month, Some(&value), &Bson::Int32(5)));
        assert!(field().query(QueryOperator::Year, Some(&value), &Bson::Int32(2021)));
        assert!(!field().query(QueryOperator::Year, None, &Bson::Int32(2021)));
    }

    #[test]
    fn compare_puts_absent_first() {
        let early = at("2020-01-01");
        let late = at("2021-01-01");
        assert_eq!(field().compare(Some(&early), Some(&late)), Ordering::Less);
        assert_eq!(field().compare(None, Some(&early)), Ordering::Less);
        assert_eq!(field().compare(None, None), Ordering::Equal);
    }

    #[test]
    fn inc_shifts_by_milliseconds() {
        let mut data = doc! {};
        let shifted = field()
            .update(UpdateOperator::Inc, Some(at("2020-01-01T00:00:00Z")), &Bson::Int64(1000), &mut data)
            .unwrap();
        assert_eq!(shifted, Some(at("2020-01-01T00:00:01Z")));
        assert_eq!(field().update(UpdateOperator::Dec, None, &Bson::Int64(1), &mut data).unwrap(), None);
    }

    #[test]
    fn shifts_past_the_date_range_fail() {
        let mut data = doc! {};
        let start = Some(Bson::DateTime(BsonDateTime::from_millis(1000)));

        for (op, arg) in [
            (UpdateOperator::Inc, Bson::Double(9.3e18)),
            (UpdateOperator::Inc, Bson::Int64(i64::MAX)),
            (UpdateOperator::Dec, Bson::Int64(i64::MIN)),
            (UpdateOperator::Inc, Bson::Int64(9_000_000_000_000_000)),
            (UpdateOperator::Dec, Bson::Double(f64::NAN)),
        ] {
            let err = field().update(op, start.clone(), &arg, &mut data).unwrap_err();
            assert!(matches!(err, StoreError::InvalidQuery(ref message) if message.contains("created")));
        }

        let shifted = field().update(UpdateOperator::Dec, start, &Bson::Double(1000.9), &mut data).unwrap();
        assert_eq!(shifted, Some(Bson::DateTime(BsonDateTime::from_millis(0))));
    }
}
