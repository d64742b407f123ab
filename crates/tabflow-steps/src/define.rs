//! Supplier raíz con recursos explícitos.
//!
//! Sin `columns` sólo referencia las URIs indicadas. Con `columns` (y
//! opcionalmente `rows`) define un único recurso en línea: al iniciar lo
//! reemplaza con ese esquema y esas filas.

use std::collections::VecDeque;

use log::info;
use serde_json::{Map, Value};
use tabflow_core::resource::materialize;
use tabflow_core::{apply_options, step_options, Column, CoerceError, DataType, FlowError, PipelineContext, ProcessingMode, ResourceRef, Result,
                   RootSupplier, Row, Schema};

use crate::missing_option;

step_options! {
    pub enum DefineOption for "define" {
        DataUris => "dataUri": TextList,
        /// Objeto `columna -> tipo`, en orden.
        Columns => "columns": Object,
        PrimaryKey => "primaryKey": TextList,
        /// Lista de filas; cada fila es una lista de valores.
        Rows => "rows": Array,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Definition {
    schema: Schema,
    rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefineConfig {
    uris: Vec<String>,
    definition: Option<Definition>,
}

impl DefineConfig {
    /// Referencias a recursos existentes (o por crear más adelante).
    pub fn uris<S: Into<String>>(uris: impl IntoIterator<Item = S>) -> Self {
        Self { uris: uris.into_iter().map(Into::into).collect(),
               definition: None }
    }

    /// Recurso en línea.
    pub fn inline(uri: impl Into<String>, schema: Schema, rows: Vec<Row>) -> Result<Self> {
        check_rows(&schema, &rows)?;
        Ok(Self { uris: vec![uri.into()],
                  definition: Some(Definition { schema, rows }) })
    }

    pub fn from_args(args: &Map<String, Value>) -> Result<Self> {
        let mut uris = Vec::new();
        let mut columns: Option<Map<String, Value>> = None;
        let mut primary_key: Vec<String> = Vec::new();
        let mut rows: Option<Vec<Value>> = None;
        apply_options::<DefineOption, _>(args, |option, value| {
            match option {
                DefineOption::DataUris => uris = value.into_list()?,
                DefineOption::Columns => columns = Some(value.into_object()?),
                DefineOption::PrimaryKey => primary_key = value.into_list()?,
                DefineOption::Rows => rows = Some(value.into_array()?),
            }
            Ok(())
        })?;
        if uris.is_empty() {
            return Err(missing_option("define", "dataUri"));
        }
        let columns = match columns {
            Some(columns) => columns,
            None if rows.is_some() || !primary_key.is_empty() => return Err(missing_option("define", "columns")),
            None => return Ok(Self::uris(uris)),
        };
        if uris.len() != 1 {
            return Err(FlowError::invalid_option("define", "dataUri", "an inline definition takes exactly one data uri"));
        }
        let mut schema = Schema::new();
        for (name, kind) in &columns {
            let data_type = kind.as_str()
                                .ok_or_else(|| CoerceError::new("a type name", kind.to_string()))
                                .and_then(str::parse::<DataType>)
                                .map_err(|e| FlowError::invalid_option("define", "columns", e.to_string()))?;
            let mut column = Column::new(name.as_str(), data_type);
            if primary_key.iter().any(|k| k.eq_ignore_ascii_case(name)) {
                column = column.primary_key();
            }
            schema.push(column);
        }
        if let Some(missing) = primary_key.iter().find(|k| schema.index_of(k).is_none()) {
            return Err(FlowError::invalid_option("define", "primaryKey", format!("unknown column `{missing}`")));
        }
        let rows = rows.unwrap_or_default()
                       .into_iter()
                       .map(|row| match row {
                           Value::Array(values) => Ok(values),
                           other => Err(FlowError::invalid_option("define", "rows", format!("expected a list of values, got `{other}`"))),
                       })
                       .collect::<Result<Vec<Row>>>()?;
        let uri = uris.remove(0);
        Self::inline(uri, schema, rows)
    }
}

fn check_rows(schema: &Schema, rows: &[Row]) -> Result<()> {
    match rows.iter().position(|row| row.len() != schema.len()) {
        Some(i) => Err(FlowError::invalid_option("define",
                                                 "rows",
                                                 format!("row {} has {} values but there are {} columns", i + 1, rows[i].len(), schema.len()))),
        None => Ok(()),
    }
}

pub struct DefineSupplier {
    name: String,
    config: DefineConfig,
    queue: VecDeque<ResourceRef>,
}

impl DefineSupplier {
    pub fn new(name: impl Into<String>, config: DefineConfig) -> Self {
        Self { name: name.into(),
               config,
               queue: VecDeque::new() }
    }
}

impl RootSupplier for DefineSupplier {
    fn name(&self) -> &str { &self.name }

    fn mode(&self) -> ProcessingMode { ProcessingMode::Batch }

    fn on_start(&mut self, ctx: &PipelineContext) -> Result<()> {
        self.queue.clear();
        for uri in &self.config.uris {
            let resource = ctx.registry().resolve(uri)?;
            if let Some(definition) = &self.config.definition {
                materialize(&resource, definition.schema.clone(), definition.rows.clone())?;
                info!("define `{}`: {} with {} rows", self.name, resource.uri(), definition.rows.len());
            }
            self.queue.push_back(resource);
        }
        Ok(())
    }

    fn next(&mut self, _ctx: &PipelineContext) -> Result<Option<ResourceRef>> { Ok(self.queue.pop_front()) }

    fn reset(&mut self) -> Result<()> {
        self.queue.clear();
        Ok(())
    }
}
