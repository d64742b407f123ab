//! Resultado de la ejecución de un recurso runtime y su proyección en columnas.

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use super::{ExecutionMode, ResultColumn};
use crate::coerce::NamedEnum;
use crate::errors::{ConnectorError, ConnectorErrorKind};
use crate::resource::{ResourceRef, Row};

pub const STOPPED_EARLY: &str = "Stopped early";

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Runtime ejecutado (o la entrada, si nunca se ejecutó).
    pub runtime: ResourceRef,
    pub mode: ExecutionMode,
    pub count: u64,
    /// Recurso donde se persistieron las filas del resultado.
    pub result: Option<ResourceRef>,
    pub error: Option<ConnectorError>,
    /// Recurso con el detalle del error.
    pub error_resource: Option<ResourceRef>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ExecutionResult {
    pub fn new(runtime: ResourceRef, mode: ExecutionMode) -> Self {
        Self { runtime,
               mode,
               count: 0,
               result: None,
               error: None,
               error_resource: None,
               started_at: None,
               ended_at: None }
    }

    /// Elemento omitido porque un elemento anterior falló.
    pub fn stopped_early(input: ResourceRef, mode: ExecutionMode) -> Self {
        let mut result = Self::new(input, mode);
        result.error = Some(ConnectorError::new(ConnectorErrorKind::Other, STOPPED_EARLY));
        result
    }

    pub fn is_success(&self) -> bool { self.error.is_none() }

    /// `true` si se intentó ejecutar.
    pub fn was_attempted(&self) -> bool { self.started_at.is_some() }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn latency(&self) -> Option<TimeDelta> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Fila con los valores de `columns`, en ese orden.
    pub fn project(&self, columns: &[ResultColumn], message_width: usize) -> Row {
        columns.iter().map(|column| self.value_of(*column, columns, message_width)).collect()
    }

    fn value_of(&self, column: ResultColumn, columns: &[ResultColumn], message_width: usize) -> Value {
        let uri = |resource: &Option<ResourceRef>| resource.as_ref().map(|r| Value::from(r.uri())).unwrap_or(Value::Null);
        let time = |at: Option<DateTime<Utc>>| at.map(|t| Value::from(t.to_rfc3339())).unwrap_or(Value::Null);
        match column {
            ResultColumn::RuntimeDataUri => Value::from(self.runtime.uri()),
            ResultColumn::RuntimeExecutable => Value::from(self.runtime.address()),
            ResultColumn::RuntimeConnection => Value::from(self.runtime.connection_name()),
            ResultColumn::DataUri => match (&self.result, &self.error_resource) {
                (Some(result), _) => Value::from(result.uri()),
                (None, Some(error)) => Value::from(error.uri()),
                (None, None) => Value::Null,
            },
            ResultColumn::ResultDataUri => uri(&self.result),
            ResultColumn::ExitCode => Value::from(self.exit_code()),
            ResultColumn::ErrorMessage => match &self.error {
                None => Value::Null,
                Some(error) => {
                    let see = if columns.contains(&ResultColumn::DataUri) || columns.contains(&ResultColumn::ErrorDataUri) {
                        None
                    } else {
                        self.error_resource.as_ref().map(|r| r.uri())
                    };
                    Value::from(truncate_message(&error_text(error), message_width, see.as_deref()))
                }
            },
            ResultColumn::Count => Value::from(self.count),
            ResultColumn::Latency => self.latency().map(|d| Value::from(iso_duration(d))).unwrap_or(Value::Null),
            ResultColumn::LatencyMillis => self.latency().map(|d| Value::from(d.num_milliseconds())).unwrap_or(Value::Null),
            ResultColumn::StartTime => time(self.started_at),
            ResultColumn::EndTime => time(self.ended_at),
            ResultColumn::ExecutionMode => Value::from(self.mode.name()),
            ResultColumn::ErrorDataUri => uri(&self.error_resource),
        }
    }
}

fn error_text(error: &ConnectorError) -> String {
    if error.message.trim().is_empty() {
        format!("{:?} error", error.kind)
    } else {
        error.message.clone()
    }
}

/// Mensaje en una línea, recortado a `width` caracteres con `..`. Con `see`
/// se agrega `. See <uri>` dentro del mismo ancho; si no cabe se omite.
pub fn truncate_message(message: &str, width: usize, see: Option<&str>) -> String {
    let suffix = see.map(|uri| format!(". See {uri}"))
                    .filter(|suffix| suffix.chars().count() + 2 <= width)
                    .unwrap_or_default();
    let budget = width.saturating_sub(suffix.chars().count());
    let line = message.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join(" ");
    let mut text = if line.chars().count() > budget {
        let mut cut: String = line.chars().take(budget.saturating_sub(2)).collect();
        cut.push_str("..");
        cut
    } else {
        line
    };
    text.push_str(&suffix);
    text
}

/// Duración ISO-8601 (`PT1H2M3.004S`).
pub fn iso_duration(duration: TimeDelta) -> String {
    let millis = duration.num_milliseconds().max(0);
    let hours = millis / 3_600_000;
    let minutes = (millis / 60_000) % 60;
    let seconds = (millis / 1_000) % 60;
    let fraction = millis % 1_000;
    let mut out = String::from("PT");
    if hours > 0 {
        out.push_str(&format!("{hours}H"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}M"));
    }
    if fraction > 0 {
        let fraction = format!("{fraction:03}");
        out.push_str(&format!("{seconds}.{}S", fraction.trim_end_matches('0')));
    } else if seconds > 0 || (hours == 0 && minutes == 0) {
        out.push_str(&format!("{seconds}S"));
    }
    out
}
