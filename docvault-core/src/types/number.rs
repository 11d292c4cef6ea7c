use bson::{Bson, Document};

use super::{
    FieldOptions, FieldType, TypeName, UpdateOperator,
    base::{self, display},
};
use crate::{
    error::{StoreError, StoreResult},
    value::{Numeric, present},
};

const UPDATE_OPERATORS: &[UpdateOperator] = &[
    UpdateOperator::Set,
    UpdateOperator::Unset,
    UpdateOperator::Rename,
    UpdateOperator::Inc,
    UpdateOperator::Dec,
    UpdateOperator::Mul,
    UpdateOperator::Div,
    UpdateOperator::Mod,
    UpdateOperator::Max,
    UpdateOperator::Min,
];

/// Numeric field, optionally restricted to integers.
///
/// Integers are stored as `Int64` and floats as `Double`. Arithmetic update operators
/// treat an absent (or zero) current value as a neutral base:
///
/// | operator | absent/zero base | otherwise |
/// |----------|------------------|-----------|
/// | `$inc`   | `arg`            | `v + arg` |
/// | `$dec`   | `-arg`           | `v - arg` |
/// | `$mul`, `$div`, `$mod` | `0` | `v op arg` |
#[derive(Debug)]
pub struct NumberType {
    path: String,
    options: FieldOptions,
    integer: bool,
}

impl NumberType {
    pub fn new(path: impl Into<String>, options: FieldOptions) -> Self {
        Self { path: path.into(), options, integer: false }
    }

    /// A number field that truncates on read and rejects fractions on write.
    pub fn integer(path: impl Into<String>, options: FieldOptions) -> Self {
        Self { path: path.into(), options, integer: true }
    }

    fn argument(&self, op: UpdateOperator, arg: &Bson) -> StoreResult<Numeric> {
        Numeric::from_bson(arg).ok_or_else(|| {
            StoreError::InvalidQuery(format!(
                "`{op}` on `{}` expects a number, got `{}`",
                self.path,
                display(arg)
            ))
        })
    }
}

/// Numeric coercion applied when reading a value into a number field.
fn coerce(value: Bson) -> Bson {
    match value {
        Bson::Int32(n) => Bson::Int64(i64::from(n)),
        Bson::Int64(_) | Bson::Double(_) => value,
        Bson::Boolean(flag) => Bson::Int64(i64::from(flag)),
        Bson::DateTime(at) => Bson::Int64(at.timestamp_millis()),
        Bson::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Bson::Int64(0)
            } else if let Ok(int) = trimmed.parse::<i64>() {
                Bson::Int64(int)
            } else {
                Bson::Double(trimmed.parse::<f64>().unwrap_or(f64::NAN))
            }
        }
        _ => Bson::Double(f64::NAN),
    }
}

/// Parses the leading integer of a string the way a base-10 integer parser would.
fn leading_integer(s: &str) -> Option<i64> {
    let trimmed = s.trim_start();
    let sign_len = usize::from(trimmed.starts_with(['-', '+']));
    let digits = trimmed[sign_len..]
        .chars()
        .take_while(char::is_ascii_digit)
        .count();

    if digits == 0 {
        return None;
    }

    trimmed[..sign_len + digits].parse().ok()
}

fn truncate(value: Bson) -> Bson {
    match value {
        Bson::String(s) => leading_integer(&s).map_or(Bson::Double(f64::NAN), Bson::Int64),
        other => match coerce(other) {
            Bson::Double(n) if n.is_finite() => Bson::Int64(n.trunc() as i64),
            coerced => coerced,
        },
    }
}

impl FieldType for NumberType {
    fn path(&self) -> &str {
        &self.path
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn kind(&self) -> TypeName {
        if self.integer { TypeName::Integer } else { TypeName::Number }
    }

    fn cast(&self, value: Option<Bson>, _data: &Document) -> StoreResult<Option<Bson>> {
        let value = base::cast(&self.options, value);

        Ok(if self.integer { value.map(truncate) } else { value.map(coerce) })
    }

    fn validate(&self, value: Option<Bson>, _data: &mut Document) -> StoreResult<Option<Bson>> {
        let Some(value) = base::validate(&self.path, &self.options, value)? else {
            return Ok(None);
        };

        match Numeric::from_bson(&value) {
            Some(Numeric::Float(n)) if n.is_nan() => {
                Err(StoreError::validation(&self.path, "must be a number, got `NaN`"))
            }
            Some(Numeric::Float(n)) if self.integer && n.fract() != 0.0 => Err(
                StoreError::validation(&self.path, format!("must be an integer, got `{n}`")),
            ),
            Some(Numeric::Float(n)) if self.integer => Ok(Some(Bson::Int64(n as i64))),
            Some(number) => Ok(Some(number.into_bson())),
            None => Err(StoreError::validation(
                &self.path,
                format!("must be a number, got `{}`", display(&value)),
            )),
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
        let current = present(value.clone()).as_ref().and_then(Numeric::from_bson);
        let seed = current.filter(|number| !number.is_zero());

        let result = match op {
            UpdateOperator::Inc => {
                let update = self.argument(op, arg)?;
                seed.map_or(update, |number| number.add(update))
            }
            UpdateOperator::Dec => {
                let update = self.argument(op, arg)?;
                seed.map_or(update.negate(), |number| number.sub(update))
            }
            UpdateOperator::Mul => {
                let update = self.argument(op, arg)?;
                seed.map_or(Numeric::Int(0), |number| number.mul(update))
            }
            UpdateOperator::Div => {
                let update = self.argument(op, arg)?;
                seed.map_or(Numeric::Int(0), |number| number.div(update))
            }
            UpdateOperator::Mod => {
                let update = self.argument(op, arg)?;
                seed.map_or(Numeric::Int(0), |number| number.rem(update))
            }
            UpdateOperator::Max => {
                let update = self.argument(op, arg)?;
                match current {
                    Some(number) if number >= update => number,
                    _ => update,
                }
            }
            UpdateOperator::Min => {
                let update = self.argument(op, arg)?;
                match current {
                    Some(number) if number <= update => number,
                    _ => update,
                }
            }
            _ => return base::update(&self.path, op, value, arg, data),
        };

        Ok(Some(result.into_bson()))
    }
}
