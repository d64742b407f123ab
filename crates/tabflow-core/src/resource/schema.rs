use serde::{Deserialize, Serialize};

use crate::named_enum;

named_enum! {
    /// Tipo lógico de una columna.
    pub enum DataType {
        Integer => "integer",
        Numeric => "numeric",
        Boolean => "boolean",
        Varchar => "varchar" | "text",
        Timestamp => "timestamp",
        Json => "json",
    }
}

impl DataType {
    fn is_numeric(&self) -> bool { matches!(self, DataType::Integer | DataType::Numeric) }

    /// Dos tipos son compatibles si son iguales o ambos numéricos.
    pub fn is_compatible_with(&self, other: &DataType) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(with = "data_type_name")]
    pub data_type: DataType,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub nullable: bool,
    pub primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self { name: name.into(),
               data_type,
               precision: None,
               scale: None,
               nullable: true,
               primary_key: false }
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marca la columna como parte de la clave primaria (implica no nula).
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }
}

/// Esquema ordenado de un recurso.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new() -> Self { Self::default() }

    pub fn from_columns(columns: Vec<Column>) -> Self { Self { columns } }

    /// Añade o reemplaza (por nombre) una columna.
    pub fn push(&mut self, column: Column) {
        match self.index_of(&column.name) {
            Some(i) => self.columns[i] = column,
            None => self.columns.push(column),
        }
    }

    pub fn with_column(mut self, name: &str, data_type: DataType) -> Self {
        self.push(Column::new(name, data_type));
        self
    }

    pub fn columns(&self) -> &[Column] { &self.columns }

    pub fn len(&self) -> usize { self.columns.len() }

    pub fn is_empty(&self) -> bool { self.columns.is_empty() }

    pub fn column(&self, name: &str) -> Option<&Column> { self.index_of(name).map(|i| &self.columns[i]) }

    /// Posición de una columna, sin distinguir mayúsculas.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> Vec<&str> { self.columns.iter().map(|c| c.name.as_str()).collect() }

    pub fn primary_key_indexes(&self) -> Vec<usize> {
        self.columns.iter().enumerate().filter(|(_, c)| c.primary_key).map(|(i, _)| i).collect()
    }

    /// Compatibilidad estructural requerida por una copia: misma cantidad de
    /// columnas, mismos nombres en el mismo orden y tipos compatibles.
    pub fn check_structure(&self, target: &Schema) -> std::result::Result<(), String> {
        if self.len() != target.len() {
            return Err(format!("the source has {} columns but the target has {}", self.len(), target.len()));
        }
        for (source, target) in self.columns.iter().zip(target.columns.iter()) {
            if !source.name.eq_ignore_ascii_case(&target.name) {
                return Err(format!("column `{}` does not match target column `{}`", source.name, target.name));
            }
            if !source.data_type.is_compatible_with(&target.data_type) {
                return Err(format!("column `{}` has type {} but the target has {}",
                                   source.name, source.data_type, target.data_type));
            }
        }
        Ok(())
    }
}

mod data_type_name {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::DataType;
    use crate::coerce::NamedEnum;

    pub fn serialize<S: Serializer>(value: &DataType, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.name())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DataType, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
