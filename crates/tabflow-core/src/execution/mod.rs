//! Ejecución de recursos runtime.
//!
//! Cada elemento se ejecuta de forma aislada: un fallo se registra como una
//! fila del recurso de resultados (con un recurso de detalle del error) y sólo
//! se propaga con `strictExecution` o ante un defecto en entorno de
//! desarrollo.

mod engine;
mod options;
mod result;

pub use engine::{error_detail_lines, ExecutionEngine};
pub use options::{ExecutionOptions, ExecutionOptionsBuilder, DEFAULT_ERROR_TEMPLATE, DEFAULT_RESULT_TEMPLATE};
pub use result::{iso_duration, truncate_message, ExecutionResult, STOPPED_EARLY};

use crate::named_enum;
use crate::resource::{Column, DataResource, DataType, TabularKind};

named_enum! {
    pub enum ExecutionMode {
        /// Sólo cuenta las filas del resultado.
        Load => "load" | "count",
        /// Recorre (y opcionalmente persiste) las filas del resultado.
        Transfer => "transfer" | "loop",
    }
}

impl ExecutionMode {
    /// Los comandos producen un registro que vale la pena recorrer.
    pub fn infer(resource: &DataResource) -> Self {
        if resource.kind() == TabularKind::Command {
            ExecutionMode::Transfer
        } else {
            ExecutionMode::Load
        }
    }
}

named_enum! {
    /// Columnas del recurso de resultados.
    pub enum ResultColumn {
        RuntimeDataUri => "runtime_data_uri",
        RuntimeExecutable => "runtime_executable",
        RuntimeConnection => "runtime_connection",
        /// Resultado persistido o, si falló, el detalle del error.
        DataUri => "data_uri",
        ResultDataUri => "result_data_uri",
        ExitCode => "exit_code",
        ErrorMessage => "error_message",
        Count => "count",
        Latency => "latency",
        LatencyMillis => "latency_millis",
        StartTime => "start_time",
        EndTime => "end_time",
        ExecutionMode => "execution_mode",
        ErrorDataUri => "error_data_uri",
    }
}

impl ResultColumn {
    pub fn defaults(mode: ExecutionMode) -> Vec<ResultColumn> {
        match mode {
            ExecutionMode::Load => vec![ResultColumn::RuntimeDataUri,
                                        ResultColumn::ExitCode,
                                        ResultColumn::Count,
                                        ResultColumn::Latency,
                                        ResultColumn::ErrorMessage],
            ExecutionMode::Transfer => vec![ResultColumn::RuntimeDataUri,
                                            ResultColumn::DataUri,
                                            ResultColumn::ExitCode,
                                            ResultColumn::Count,
                                            ResultColumn::Latency,
                                            ResultColumn::ErrorMessage],
        }
    }

    pub fn column(&self, message_width: usize) -> Column {
        let name = crate::coerce::NamedEnum::name(self);
        match self {
            ResultColumn::ExitCode | ResultColumn::Count | ResultColumn::LatencyMillis => Column::new(name, DataType::Integer),
            ResultColumn::StartTime | ResultColumn::EndTime => Column::new(name, DataType::Timestamp),
            ResultColumn::ErrorMessage => Column::new(name, DataType::Varchar).with_precision(message_width as u32),
            _ => Column::new(name, DataType::Varchar),
        }
    }
}
