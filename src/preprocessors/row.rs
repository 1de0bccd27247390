use serde_json::{Map, Value};

/// One untrusted row object from a tile payload, keyed by the provider's
/// field names. Values may be strings, numbers, `null`, or missing entirely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    fields: Map<String, Value>,
}

impl RawRow {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Returns `None` for objects that are not JSON maps.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Raw value for `key`; JSON `null` is reported as absent.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|value| !value.is_null())
    }

    /// Trimmed textual rendering of a scalar field, `None` when blank.
    pub fn text(&self, key: &str) -> Option<String> {
        let rendered = match self.value(key)? {
            Value::String(text) => text.trim().to_owned(),
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            _ => return None,
        };
        if rendered.is_empty() {
            None
        } else {
            Some(rendered)
        }
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        match self.value(key)? {
            Value::Number(number) => number.as_f64(),
            _ => self.text(key)?.parse::<f64>().ok(),
        }
    }

    /// Integer coercion that tolerates fractional input by truncating (`"12.7"` -> 12).
    pub fn lenient_int(&self, key: &str) -> Option<i64> {
        let value = self.float(key)?;
        if value.is_finite() && value.abs() < i64::MAX as f64 {
            Some(value.trunc() as i64)
        } else {
            None
        }
    }

    /// Integer coercion that only accepts integral text (`"12"` but not `"12.0"`).
    pub fn strict_int(&self, key: &str) -> Option<i64> {
        match self.value(key)? {
            Value::Number(number) => number.as_i64(),
            _ => self.text(key)?.parse::<i64>().ok(),
        }
    }

    /// Numeric identifier coercion used for registry ids. JSON numbers with
    /// a zero fraction are accepted; text must be integral.
    pub fn identifier(&self, key: &str) -> Option<i64> {
        match self.value(key)? {
            Value::Number(number) => number.as_i64().or_else(|| {
                number
                    .as_f64()
                    .filter(|value| value.is_finite() && value.fract() == 0.0)
                    .filter(|value| value.abs() < i64::MAX as f64)
                    .map(|value| value as i64)
            }),
            Value::String(text) => text.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// A field is filled when it renders to non-blank text and is not a
    /// numeric zero or `false`.
    pub fn is_filled(&self, key: &str) -> bool {
        match self.value(key) {
            Some(Value::Number(number)) => number.as_f64() != Some(0.0),
            Some(Value::Bool(flag)) => *flag,
            Some(_) => self.text(key).is_some(),
            None => false,
        }
    }

    /// First key (in order) that is filled.
    pub fn first_filled<'a>(&self, keys: &[&'a str]) -> Option<&'a str> {
        keys.iter().copied().find(|key| self.is_filled(key))
    }
}

impl From<Map<String, Value>> for RawRow {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}
