//! Correspondencia de columnas entre origen y destino.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::errors::{FlowError, Result};
use crate::named_enum;
use crate::resource::{Row, Schema};

named_enum! {
    pub enum MappingMethod {
        Name => "name" | "by-name",
        Position => "position" | "by-position",
    }
}

const STRICT_HINT: &str = "set the mappingStrict option to false to skip unmatched columns";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnMapping {
    /// Por nombre, sin distinguir mayúsculas. Estricto: toda columna del
    /// origen debe existir en el destino.
    ByName { strict: bool },
    /// Por posición. Estricto: el origen no puede tener más columnas que el
    /// destino.
    ByPosition { strict: bool },
    /// Nombre de origen -> nombre de destino.
    Names(IndexMap<String, String>),
    /// Posición de origen -> posición de destino, empezando en 1.
    Positions(IndexMap<usize, usize>),
}

impl Default for ColumnMapping {
    fn default() -> Self { ColumnMapping::ByName { strict: true } }
}

impl ColumnMapping {
    /// Arma la correspondencia a partir de las opciones `mappingMethod`,
    /// `mappingStrict` y `mappingColumns`.
    pub fn from_options(method: MappingMethod, strict: bool, columns: Option<&Map<String, Value>>) -> Result<Self> {
        let columns = match columns {
            Some(columns) if !columns.is_empty() => columns,
            _ => {
                return Ok(match method {
                              MappingMethod::Name => ColumnMapping::ByName { strict },
                              MappingMethod::Position => ColumnMapping::ByPosition { strict },
                          })
            }
        };
        match method {
            MappingMethod::Name => {
                let mut names = IndexMap::new();
                for (source, target) in columns {
                    let target = target.as_str()
                                       .ok_or_else(|| FlowError::InvalidMapping(format!("target of column `{source}` must be a column name, got {target}")))?;
                    names.insert(source.clone(), target.to_string());
                }
                Ok(ColumnMapping::Names(names))
            }
            MappingMethod::Position => {
                let mut positions = IndexMap::new();
                for (source, target) in columns {
                    let from = source.trim()
                                     .parse::<usize>()
                                     .ok()
                                     .filter(|p| *p > 0)
                                     .ok_or_else(|| FlowError::InvalidMapping(format!("`{source}` is not a column position (positions start at 1)")))?;
                    let to = position_of(target).ok_or_else(|| {
                                                    FlowError::InvalidMapping(format!("target of position {from} must be a column position, got {target}"))
                                                })?;
                    positions.insert(from, to);
                }
                Ok(ColumnMapping::Positions(positions))
            }
        }
    }

    /// Resuelve la correspondencia contra los esquemas concretos.
    pub fn resolve(&self, source: &Schema, target: &Schema) -> Result<ResolvedMapping> {
        let mut pairs = Vec::new();
        match self {
            ColumnMapping::ByName { strict } => {
                for (i, column) in source.columns().iter().enumerate() {
                    match target.index_of(&column.name) {
                        Some(j) => pairs.push((i, j)),
                        None if *strict => {
                            return Err(FlowError::InvalidMapping(format!("source column `{}` has no column with the same name in the target ({}); {STRICT_HINT}",
                                                                         column.name,
                                                                         target.names().join(", "))))
                        }
                        None => {}
                    }
                }
            }
            ColumnMapping::ByPosition { strict } => {
                if *strict && source.len() > target.len() {
                    return Err(FlowError::InvalidMapping(format!("the source has {} columns but the target only {}; {STRICT_HINT}",
                                                                 source.len(),
                                                                 target.len())));
                }
                pairs.extend((0..source.len().min(target.len())).map(|i| (i, i)));
            }
            ColumnMapping::Names(names) => {
                for (from, to) in names {
                    let i = source.index_of(from)
                                  .ok_or_else(|| FlowError::InvalidMapping(format!("column `{from}` does not exist in the source")))?;
                    let j = target.index_of(to)
                                  .ok_or_else(|| FlowError::InvalidMapping(format!("column `{to}` does not exist in the target")))?;
                    pairs.push((i, j));
                }
            }
            ColumnMapping::Positions(positions) => {
                for (&from, &to) in positions {
                    if from > source.len() {
                        return Err(FlowError::InvalidMapping(format!("position {from} is out of the source columns (1..={})", source.len())));
                    }
                    if to > target.len() {
                        return Err(FlowError::InvalidMapping(format!("position {to} is out of the target columns (1..={})", target.len())));
                    }
                    pairs.push((from - 1, to - 1));
                }
            }
        }
        if pairs.is_empty() && !source.is_empty() {
            return Err(FlowError::InvalidMapping("no source column is mapped to the target".to_string()));
        }
        let mut seen = vec![false; target.len()];
        for &(_, j) in &pairs {
            if std::mem::replace(&mut seen[j], true) {
                return Err(FlowError::InvalidMapping(format!("target column `{}` is mapped more than once", target.columns()[j].name)));
            }
        }
        Ok(ResolvedMapping { pairs,
                             target_width: target.len() })
    }
}

fn position_of(value: &Value) -> Option<usize> {
    let n = match value {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    }?;
    (n > 0).then_some(n)
}

/// Correspondencia resuelta: pares (índice de origen, índice de destino).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMapping {
    pairs: Vec<(usize, usize)>,
    target_width: usize,
}

impl ResolvedMapping {
    pub fn pairs(&self) -> &[(usize, usize)] { &self.pairs }

    /// Fila con la forma del destino; las columnas sin origen quedan en null.
    pub fn apply(&self, row: &Row) -> Row {
        let mut out = vec![Value::Null; self.target_width];
        for &(from, to) in &self.pairs {
            out[to] = row.get(from).cloned().unwrap_or(Value::Null);
        }
        out
    }
}
