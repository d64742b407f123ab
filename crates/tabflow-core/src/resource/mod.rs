//! Recursos de datos: handle, esquema, atributos y filas.

mod attribute;
mod handle;
mod schema;

pub use attribute::{AttributeKey, ResourceAttribute};
pub use handle::{DataResource, ResourceRef, TabularKind};
pub use schema::{Column, DataType, Schema};

use serde_json::Value;

use crate::connector::InsertOptions;
use crate::errors::ConnectorError;

/// Una fila: valores en el orden del esquema.
pub type Row = Vec<Value>;

/// Reemplaza el contenido de `target` por `rows` con el esquema dado.
///
/// Si el recurso existe se elimina y se vuelve a crear.
pub fn materialize(target: &ResourceRef, schema: Schema, rows: Vec<Row>) -> Result<(), ConnectorError> {
    if target.exists()? {
        target.connector().drop_resources(std::slice::from_ref(target))?;
    }
    target.set_schema(schema);
    target.connector().create(target)?;
    let mut stream = target.insert(InsertOptions::default())?;
    for row in rows {
        stream.insert(row)?;
    }
    stream.close()?;
    Ok(())
}
