//! Constantes y valores por defecto del motor.

/// Filas leídas del origen por ida y vuelta.
pub const DEFAULT_FETCH_SIZE: usize = 10_000;

/// Filas por llamada de escritura contra el destino.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

pub const DEFAULT_TARGET_WORKER_COUNT: usize = 1;

/// Lotes entre commits; por defecto un único commit al cerrar.
pub const DEFAULT_COMMIT_FREQUENCY: usize = usize::MAX;

/// Ancho de la columna `error_message` del resultado de ejecución.
pub const DEFAULT_ERROR_MESSAGE_WIDTH: usize = 200;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
