//! Conversión tipada de valores de opciones.
//!
//! Las opciones de los steps llegan como JSON genérico; `parse` las convierte
//! al tipo declarado por la opción. Los valores enumerados se resuelven sin
//! distinguir mayúsculas ni separadores (`drop-if-exists` == `DropIfExists`).

use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

/// Tipo destino de una opción.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    PositiveInteger,
    Boolean,
    Text,
    TextList,
    /// Número de milisegundos o texto con sufijo (`ms`, `s`, `m`, `h`).
    Duration,
    Object,
    /// Lista JSON sin conversión de sus elementos.
    Array,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Integer(i64),
    Boolean(bool),
    Text(String),
    TextList(Vec<String>),
    Duration(Duration),
    Object(Map<String, Value>),
    Array(Vec<Value>),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("expected {expected}, got `{found}`")]
pub struct CoerceError {
    pub expected: String,
    pub found: String,
}

impl CoerceError {
    pub fn new(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self { expected: expected.into(),
               found: found.into() }
    }

    fn of(expected: &str, raw: &Value) -> Self { Self::new(expected, describe(raw)) }
}

fn describe(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Enumeración cerrada con nombres externos estables.
pub trait NamedEnum: Sized + Copy + 'static {
    const ALL: &'static [Self];

    fn name(&self) -> &'static str;

    fn aliases(&self) -> &'static [&'static str] { &[] }

    fn names() -> Vec<&'static str> { Self::ALL.iter().map(|v| v.name()).collect() }
}

/// Forma canónica de un nombre: minúsculas y sin separadores.
pub fn normalize_name(raw: &str) -> String {
    raw.chars()
       .filter(|c| !matches!(c, '-' | '_' | ' ' | '.'))
       .flat_map(char::to_lowercase)
       .collect()
}

pub fn parse_name<E: NamedEnum>(raw: &str) -> Result<E, CoerceError> {
    let wanted = normalize_name(raw);
    E::ALL.iter()
          .copied()
          .find(|v| normalize_name(v.name()) == wanted || v.aliases().iter().any(|a| normalize_name(a) == wanted))
          .ok_or_else(|| CoerceError::new(format!("one of {}", E::names().join(", ")), raw))
}

/// Convierte `raw` al tipo indicado.
pub fn parse(raw: &Value, kind: ValueKind) -> Result<OptionValue, CoerceError> {
    match kind {
        ValueKind::Integer => parse_integer(raw).map(OptionValue::Integer),
        ValueKind::PositiveInteger => {
            let n = parse_integer(raw)?;
            if n <= 0 {
                return Err(CoerceError::of("a positive integer", raw));
            }
            Ok(OptionValue::Integer(n))
        }
        ValueKind::Boolean => parse_bool(raw).map(OptionValue::Boolean),
        ValueKind::Text => parse_text(raw).map(OptionValue::Text),
        ValueKind::TextList => match raw {
            Value::Array(items) => items.iter().map(parse_text).collect::<Result<Vec<_>, _>>().map(OptionValue::TextList),
            Value::String(s) => Ok(OptionValue::TextList(s.split(',')
                                                          .map(str::trim)
                                                          .filter(|s| !s.is_empty())
                                                          .map(String::from)
                                                          .collect())),
            other => Err(CoerceError::of("a list of names", other)),
        },
        ValueKind::Duration => parse_duration(raw).map(OptionValue::Duration),
        ValueKind::Object => match raw {
            Value::Object(map) => Ok(OptionValue::Object(map.clone())),
            other => Err(CoerceError::of("an object", other)),
        },
        ValueKind::Array => match raw {
            Value::Array(items) => Ok(OptionValue::Array(items.clone())),
            other => Err(CoerceError::of("a list", other)),
        },
    }
}

fn parse_integer(raw: &Value) -> Result<i64, CoerceError> {
    match raw {
        Value::Number(n) => n.as_i64().ok_or_else(|| CoerceError::of("an integer", raw)),
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| CoerceError::of("an integer", raw)),
        other => Err(CoerceError::of("an integer", other)),
    }
}

fn parse_bool(raw: &Value) -> Result<bool, CoerceError> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(true),
        Value::Number(n) if n.as_i64() == Some(0) => Ok(false),
        Value::String(s) => match normalize_name(s).as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(CoerceError::of("a boolean", raw)),
        },
        other => Err(CoerceError::of("a boolean", other)),
    }
}

fn parse_text(raw: &Value) -> Result<String, CoerceError> {
    match raw {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(CoerceError::of("a text", other)),
    }
}

fn parse_duration(raw: &Value) -> Result<Duration, CoerceError> {
    match raw {
        Value::Number(n) => n.as_u64().map(Duration::from_millis).ok_or_else(|| CoerceError::of("a duration", raw)),
        Value::String(s) => {
            let s = s.trim();
            let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
            let (digits, unit) = s.split_at(split);
            let amount: u64 = digits.parse().map_err(|_| CoerceError::of("a duration", raw))?;
            match unit.trim() {
                "" | "ms" => Ok(Duration::from_millis(amount)),
                "s" => Ok(Duration::from_secs(amount)),
                "m" => Ok(Duration::from_secs(amount * 60)),
                "h" => Ok(Duration::from_secs(amount * 3600)),
                _ => Err(CoerceError::of("a duration (ms, s, m, h)", raw)),
            }
        }
        other => Err(CoerceError::of("a duration", other)),
    }
}

impl OptionValue {
    pub fn into_i64(self) -> Result<i64, CoerceError> {
        match self {
            OptionValue::Integer(n) => Ok(n),
            other => Err(other.mismatch("an integer")),
        }
    }

    pub fn into_usize(self) -> Result<usize, CoerceError> {
        let n = self.into_i64()?;
        usize::try_from(n).map_err(|_| CoerceError::new("a non negative integer", n.to_string()))
    }

    pub fn into_bool(self) -> Result<bool, CoerceError> {
        match self {
            OptionValue::Boolean(b) => Ok(b),
            other => Err(other.mismatch("a boolean")),
        }
    }

    pub fn into_text(self) -> Result<String, CoerceError> {
        match self {
            OptionValue::Text(s) => Ok(s),
            other => Err(other.mismatch("a text")),
        }
    }

    pub fn into_list(self) -> Result<Vec<String>, CoerceError> {
        match self {
            OptionValue::TextList(l) => Ok(l),
            OptionValue::Text(s) => Ok(vec![s]),
            other => Err(other.mismatch("a list of names")),
        }
    }

    pub fn into_duration(self) -> Result<Duration, CoerceError> {
        match self {
            OptionValue::Duration(d) => Ok(d),
            other => Err(other.mismatch("a duration")),
        }
    }

    pub fn into_object(self) -> Result<Map<String, Value>, CoerceError> {
        match self {
            OptionValue::Object(m) => Ok(m),
            other => Err(other.mismatch("an object")),
        }
    }

    pub fn into_array(self) -> Result<Vec<Value>, CoerceError> {
        match self {
            OptionValue::Array(items) => Ok(items),
            other => Err(other.mismatch("a list")),
        }
    }

    /// Resuelve un valor textual como variante de `E`.
    pub fn into_enum<E: NamedEnum>(self) -> Result<E, CoerceError> {
        let text = self.into_text()?;
        parse_name(&text)
    }

    pub fn into_enum_list<E: NamedEnum>(self) -> Result<Vec<E>, CoerceError> {
        self.into_list()?.iter().map(|s| parse_name(s)).collect()
    }

    fn mismatch(&self, expected: &str) -> CoerceError { CoerceError::new(expected, format!("{self:?}")) }
}

/// Declara una enumeración cerrada con nombre externo (y alias opcionales)
/// por variante.
///
/// ```ignore
/// named_enum! {
///     pub enum SourceOperation {
///         None => "none",
///         Drop => "drop" | "move",
///     }
/// }
/// ```
#[macro_export]
macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $key:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name { $($(#[$vmeta])* $variant),+ }

        impl $crate::coerce::NamedEnum for $name {
            const ALL: &'static [Self] = &[$($name::$variant),+];

            fn name(&self) -> &'static str {
                match self { $($name::$variant => $key),+ }
            }

            fn aliases(&self) -> &'static [&'static str] {
                match self { $($name::$variant => &[$($alias),*]),+ }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($crate::coerce::NamedEnum::name(self))
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::coerce::CoerceError;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> { $crate::coerce::parse_name(s) }
        }
    };
}
