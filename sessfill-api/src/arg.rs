use serde::{Deserialize, Serialize};

pub type Args = Vec<Arg>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
#[serde(rename_all = "lowercase")]
pub enum Arg {
    Int(i64),
    String(String),
    Bool(bool),
    Float(f64),
    Timestamp(i64),
    Interval(String),
    Column(String),
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::String(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::String(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl Arg {
    pub fn is_scalar(&self) -> bool {
        use Arg as T;
        matches!(
            self,
            T::Int(_) | T::String(_) | T::Bool(_) | T::Float(_) | T::Timestamp(_) | T::Interval(_)
        )
    }

    pub fn is_column(&self) -> bool {
        use Arg as T;
        matches!(self, T::Column(_))
    }
}

/// A parameter list entry. Entries carrying a `name` key become named
/// arguments; the rest keep their positional order.
#[derive(Debug, Clone, Deserialize)]
struct ParameterEntry {
    name: Option<String>,
    #[serde(flatten)]
    arg: Arg,
}

/// Splits a JSON parameter string into positional and named arguments.
pub fn parse_parameters(raw: &str) -> anyhow::Result<(Option<Args>, Vec<(String, Arg)>)> {
    let entries: Vec<ParameterEntry> = serde_json::from_str(raw)?;
    let mut positional = Vec::new();
    let mut named = Vec::new();
    for entry in entries {
        match entry.name {
            Some(name) => named.push((name, entry.arg)),
            None => positional.push(entry.arg),
        }
    }
    let positional = if positional.is_empty() {
        None
    } else {
        Some(positional)
    };
    Ok((positional, named))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArgType {
    Int,
    String,
    Bool,
    Float,
    Timestamp,
    Interval,
    Column,
}
