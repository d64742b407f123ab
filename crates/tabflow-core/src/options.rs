//! Opciones nombradas de los steps.
//!
//! Cada step declara sus opciones como una enumeración cerrada (`step_options!`)
//! que asocia la clave externa con el tipo esperado. `apply_options` valida las
//! claves, convierte cada valor con [`coerce::parse`](crate::coerce::parse) y lo
//! entrega al setter del step, que hace un `match` exhaustivo sobre la enum.

use serde_json::{Map, Value};

use crate::coerce::{parse, parse_name, CoerceError, NamedEnum, OptionValue, ValueKind};
use crate::errors::{FlowError, Result};

pub trait StepOption: NamedEnum {
    /// Nombre de la operación a la que pertenecen las opciones.
    const STEP: &'static str;

    fn kind(&self) -> ValueKind;
}

/// Declara la enumeración de opciones de un step.
#[macro_export]
macro_rules! step_options {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident for $step:literal {
            $($(#[$vmeta:meta])* $variant:ident => $key:literal : $kind:ident),+ $(,)?
        }
    ) => {
        $crate::named_enum! {
            $(#[$meta])*
            $vis enum $name { $($(#[$vmeta])* $variant => $key),+ }
        }

        impl $crate::options::StepOption for $name {
            const STEP: &'static str = $step;

            fn kind(&self) -> $crate::coerce::ValueKind {
                match self { $($name::$variant => $crate::coerce::ValueKind::$kind),+ }
            }
        }
    };
}

/// Resuelve una clave de opción o falla listando las claves válidas.
pub fn resolve_key<O: StepOption>(key: &str) -> Result<O> {
    parse_name::<O>(key).map_err(|_| FlowError::UnknownOption { step: O::STEP.to_string(),
                                                                option: key.to_string(),
                                                                valid: O::names().into_iter().map(String::from).collect() })
}

/// Aplica cada entrada de `args` a través de `set`.
///
/// Los errores de conversión se reportan como `FlowError::InvalidOption` con
/// la clave tal como la escribió el usuario.
pub fn apply_options<O, F>(args: &Map<String, Value>, mut set: F) -> Result<()>
    where O: StepOption,
          F: FnMut(O, OptionValue) -> std::result::Result<(), CoerceError>
{
    for (key, raw) in args {
        let option = resolve_key::<O>(key)?;
        let value = parse(raw, option.kind()).map_err(|e| FlowError::invalid_option(O::STEP, key, e.to_string()))?;
        set(option, value).map_err(|e| FlowError::invalid_option(O::STEP, key, e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    crate::step_options! {
        enum DemoOption for "demo" {
            FetchSize => "fetchSize": PositiveInteger,
            Strict => "strict": Boolean,
        }
    }

    #[derive(Default)]
    struct Demo {
        fetch_size: usize,
        strict: bool,
    }

    fn configure(args: serde_json::Value) -> Result<Demo> {
        let mut demo = Demo::default();
        let map = args.as_object().cloned().unwrap_or_default();
        apply_options::<DemoOption, _>(&map, |option, value| {
            match option {
                DemoOption::FetchSize => demo.fetch_size = value.into_usize()?,
                DemoOption::Strict => demo.strict = value.into_bool()?,
            }
            Ok(())
        })?;
        Ok(demo)
    }

    #[test]
    fn keys_are_separator_insensitive() {
        let demo = configure(json!({"fetch-size": 50, "STRICT": "true"})).expect("valid options");
        assert_eq!(demo.fetch_size, 50);
        assert!(demo.strict);
    }

    #[test]
    fn unknown_keys_list_valid_names() {
        let err = configure(json!({"fetch": 1})).err().expect("unknown key");
        match err {
            FlowError::UnknownOption { step, option, valid } => {
                assert_eq!(step, "demo");
                assert_eq!(option, "fetch");
                assert_eq!(valid, vec!["fetchSize".to_string(), "strict".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn bad_values_are_invalid_options() {
        let err = configure(json!({"fetchSize": -3})).err().expect("negative size");
        assert!(matches!(err, FlowError::InvalidOption { ref option, .. } if option == "fetchSize"));
        assert!(err.is_config());
    }
}
