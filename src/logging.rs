//! Inicialización del logger.
//!
//! El filtro se toma de `TABFLOW_LOG` y, si no está definido, de `RUST_LOG`;
//! sin ninguno de los dos se registra desde `info`.

use std::env;

use once_cell::sync::Lazy;

pub const ENV_LOG: &str = "TABFLOW_LOG";

static LOGGER: Lazy<()> = Lazy::new(|| {
    let filter = env::var(ENV_LOG).or_else(|_| env::var("RUST_LOG"))
                                  .unwrap_or_else(|_| "info".to_string());
    let _ = env_logger::Builder::new().parse_filters(&filter)
                                      .format_timestamp_millis()
                                      .try_init();
});

/// Idempotente: sólo la primera llamada instala el logger.
pub fn init() { Lazy::force(&LOGGER); }

/// Logger para tests: nivel debug, salida capturada por el harness.
pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true)
                                 .filter_level(log::LevelFilter::Debug)
                                 .try_init();
}
