//! Configuración del motor desde variables de entorno.
//! Carga `.env` una sola vez y cae a los valores por defecto cuando una
//! variable falta o no se puede interpretar.

use std::env;
use std::str::FromStr;

use dotenvy::dotenv;
use log::warn;
use once_cell::sync::Lazy;
use tabflow_core::constants::{DEFAULT_BATCH_SIZE, DEFAULT_ERROR_MESSAGE_WIDTH, DEFAULT_FETCH_SIZE, DEFAULT_TARGET_WORKER_COUNT};
use tabflow_steps::EngineDefaults;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // sin .env no pasa nada
});

pub const ENV_ENVIRONMENT: &str = "TABFLOW_ENV";
pub const ENV_STRICT: &str = "TABFLOW_STRICT";
pub const ENV_FETCH_SIZE: &str = "TABFLOW_FETCH_SIZE";
pub const ENV_BATCH_SIZE: &str = "TABFLOW_BATCH_SIZE";
pub const ENV_WORKER_COUNT: &str = "TABFLOW_WORKER_COUNT";
pub const ENV_ERROR_MESSAGE_WIDTH: &str = "TABFLOW_ERROR_MESSAGE_WIDTH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// `dev`/`development` hace que los defectos de ejecución detengan el pipeline.
    pub dev_env: bool,
    pub strict: bool,
    pub fetch_size: usize,
    pub batch_size: usize,
    pub target_worker_count: usize,
    pub error_message_width: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { dev_env: false,
               strict: false,
               fetch_size: DEFAULT_FETCH_SIZE,
               batch_size: DEFAULT_BATCH_SIZE,
               target_worker_count: DEFAULT_TARGET_WORKER_COUNT,
               error_message_width: DEFAULT_ERROR_MESSAGE_WIDTH }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero leyendo de `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
        where F: Fn(&str) -> Option<String>
    {
        let defaults = Self::default();
        let dev_env = lookup(ENV_ENVIRONMENT).map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "dev" | "development"))
                                             .unwrap_or(false);
        Self { dev_env,
               strict: parsed(&lookup, ENV_STRICT, defaults.strict),
               fetch_size: positive(&lookup, ENV_FETCH_SIZE, defaults.fetch_size),
               batch_size: positive(&lookup, ENV_BATCH_SIZE, defaults.batch_size),
               target_worker_count: positive(&lookup, ENV_WORKER_COUNT, defaults.target_worker_count),
               error_message_width: parsed(&lookup, ENV_ERROR_MESSAGE_WIDTH, defaults.error_message_width).max(10) }
    }

    pub fn to_defaults(&self) -> EngineDefaults {
        EngineDefaults { fetch_size: self.fetch_size,
                         batch_size: self.batch_size,
                         target_worker_count: self.target_worker_count,
                         error_message_width: self.error_message_width,
                         strict: self.strict,
                         dev_env: self.dev_env }
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> T
    where F: Fn(&str) -> Option<String>,
          T: FromStr
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                                           warn!("{key}={raw} is not valid, using the default");
                                           default
                                       }),
        None => default,
    }
}

fn positive<F>(lookup: &F, key: &str, default: usize) -> usize
    where F: Fn(&str) -> Option<String>
{
    match parsed(lookup, key, default) {
        0 => default,
        n => n,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> EngineConfig {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(config(&[]), EngineConfig::default());
    }

    #[test]
    fn variables_override_defaults() {
        let c = config(&[(ENV_ENVIRONMENT, "Development"), (ENV_STRICT, "true"), (ENV_BATCH_SIZE, "250"), (ENV_ERROR_MESSAGE_WIDTH, "4")]);
        assert!(c.dev_env);
        assert!(c.strict);
        assert_eq!(c.batch_size, 250);
        assert_eq!(c.error_message_width, 10);
        let defaults = c.to_defaults();
        assert_eq!(defaults.batch_size, 250);
        assert!(defaults.dev_env);
    }

    #[test]
    fn invalid_values_fall_back() {
        let c = config(&[(ENV_ENVIRONMENT, "prod"), (ENV_FETCH_SIZE, "lots"), (ENV_WORKER_COUNT, "0")]);
        assert!(!c.dev_env);
        assert_eq!(c.fetch_size, DEFAULT_FETCH_SIZE);
        assert_eq!(c.target_worker_count, DEFAULT_TARGET_WORKER_COUNT);
    }
}
