//! Live arguments of a method invocation.
//!
//! Adapters pass their parameters by name in an [`Arguments`] list. Each value
//! is an [`ArgValue`], which knows its culture-invariant string form for route
//! segments, query values and headers.

use crate::error::SerializationError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde::Serialize;

/// Format for dates and for date-times at midnight.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format for date-times with a nonzero time of day.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A single argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// No value. Omitted from queries and headers, rejected for required placeholders.
    Null,
    /// A boolean, rendered as `true`/`false`.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer.
    UInt(u64),
    /// A floating point number.
    Float(f64),
    /// Text, used as-is.
    Text(String),
    /// A calendar date.
    Date(NaiveDate),
    /// A date and time without an offset.
    DateTime(NaiveDateTime),
    /// A structured value, typically a body.
    Json(serde_json::Value),
}

impl ArgValue {
    /// Returns `true` if the value is absent.
    pub fn is_null(&self) -> bool {
        matches!(self, ArgValue::Null | ArgValue::Json(serde_json::Value::Null))
    }

    /// The string form used in paths, queries and headers.
    ///
    /// Returns `None` for null values.
    ///
    /// # Examples
    ///
    /// ```
    /// use restbind::ArgValue;
    /// use chrono::NaiveDate;
    ///
    /// let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    /// assert_eq!(ArgValue::from(day).to_param_string().unwrap(), "2024-03-01");
    ///
    /// let noon = day.and_hms_opt(12, 30, 0).unwrap();
    /// assert_eq!(ArgValue::from(noon).to_param_string().unwrap(), "2024-03-01T12:30:00");
    ///
    /// let midnight = day.and_hms_opt(0, 0, 0).unwrap();
    /// assert_eq!(ArgValue::from(midnight).to_param_string().unwrap(), "2024-03-01");
    /// ```
    pub fn to_param_string(&self) -> Option<String> {
        match self {
            ArgValue::Null => None,
            ArgValue::Bool(value) => Some(value.to_string()),
            ArgValue::Int(value) => Some(value.to_string()),
            ArgValue::UInt(value) => Some(value.to_string()),
            ArgValue::Float(value) => Some(value.to_string()),
            ArgValue::Text(value) => Some(value.clone()),
            ArgValue::Date(value) => Some(value.format(DATE_FORMAT).to_string()),
            ArgValue::DateTime(value) => {
                if value.time() == NaiveTime::MIN {
                    Some(value.format(DATE_FORMAT).to_string())
                } else {
                    Some(value.format(DATE_TIME_FORMAT).to_string())
                }
            }
            ArgValue::Json(serde_json::Value::Null) => None,
            ArgValue::Json(serde_json::Value::String(value)) => Some(value.clone()),
            ArgValue::Json(value) => Some(value.to_string()),
        }
    }

    /// The structured form used when the value is bound to the body.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ArgValue::Null => serde_json::Value::Null,
            ArgValue::Bool(value) => serde_json::Value::Bool(*value),
            ArgValue::Int(value) => serde_json::Value::from(*value),
            ArgValue::UInt(value) => serde_json::Value::from(*value),
            ArgValue::Float(value) => serde_json::Value::from(*value),
            ArgValue::Json(value) => value.clone(),
            other => other
                .to_param_string()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

macro_rules! arg_from {
    ($variant:ident as $target:ty: $($source:ty),+) => {
        $(
            impl From<$source> for ArgValue {
                fn from(value: $source) -> Self {
                    ArgValue::$variant(<$target>::from(value))
                }
            }
        )+
    };
}

arg_from!(Int as i64: i8, i16, i32, i64);
arg_from!(UInt as u64: u8, u16, u32, u64);
arg_from!(Float as f64: f32, f64);

impl From<usize> for ArgValue {
    fn from(value: usize) -> Self {
        ArgValue::UInt(value as u64)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Text(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Text(value)
    }
}

impl From<&String> for ArgValue {
    fn from(value: &String) -> Self {
        ArgValue::Text(value.clone())
    }
}

impl From<uuid::Uuid> for ArgValue {
    fn from(value: uuid::Uuid) -> Self {
        ArgValue::Text(value.to_string())
    }
}

impl From<NaiveDate> for ArgValue {
    fn from(value: NaiveDate) -> Self {
        ArgValue::Date(value)
    }
}

impl From<NaiveDateTime> for ArgValue {
    fn from(value: NaiveDateTime) -> Self {
        ArgValue::DateTime(value)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for ArgValue {
    fn from(value: DateTime<Tz>) -> Self {
        ArgValue::DateTime(value.naive_utc())
    }
}

impl From<serde_json::Value> for ArgValue {
    fn from(value: serde_json::Value) -> Self {
        ArgValue::Json(value)
    }
}

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ArgValue::Null)
    }
}

/// The named arguments of one invocation.
///
/// Names are matched case-sensitively against the method's parameter bindings.
/// Setting the same name twice keeps the last value.
///
/// # Examples
///
/// ```
/// use restbind::Arguments;
///
/// let args = Arguments::new()
///     .arg("articleId", "1234")
///     .arg("id", 5678);
///
/// assert_eq!(args.len(), 2);
/// assert_eq!(args.get("id").and_then(|v| v.to_param_string()).unwrap(), "5678");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Vec<(String, ArgValue)>,
}

impl Arguments {
    /// Creates an empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Adds or replaces an argument holding any serializable value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented as JSON.
    pub fn json<T: Serialize + ?Sized>(
        mut self,
        name: impl Into<String>,
        value: &T,
    ) -> Result<Self, SerializationError> {
        let value =
            serde_json::to_value(value).map_err(|e| SerializationError::Serialize(e.to_string()))?;
        self.set(name, ArgValue::Json(value));
        Ok(self)
    }

    /// Adds or replaces an argument in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ArgValue>) {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    /// Returns the value of an argument.
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    /// Iterates over argument names in the order they were first set.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    /// The number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
