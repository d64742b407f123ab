//! Comparación de datos entre cada entrada y un recurso de referencia.
//!
//! Los registros se emparejan por las columnas guía (`driverColumns`, si no
//! la clave primaria de la entrada) o, sin ninguna, por posición. El reporte
//! se materializa en el recurso dado por `reportUri` y es lo que el step
//! emite; con `fail` un reporte con cambios suma 1 al estado de salida.

use std::collections::HashMap;

use log::{debug, info};
use serde_json::{Map, Value};
use tabflow_core::constants::DEFAULT_FETCH_SIZE;
use tabflow_core::resource::materialize;
use tabflow_core::{apply_options, named_enum, step_options, Column, ConnectorError, DataType, FlowError, MapStep, NamedEnum, PipelineContext, ResourceRef,
                   Result, Row, Schema, TargetTemplate};

use crate::missing_option;

pub const DEFAULT_DIFF_REPORT: &str = "diff_${input_logical_name}";
pub const DIFF_STATUS_COLUMN: &str = "diff_status";

step_options! {
    pub enum DiffOption for "diff" {
        /// Recurso contra el que se compara cada entrada (plantilla).
        TargetUri => "targetUri": Text,
        ReportUri => "reportUri": Text,
        ReportType => "reportType": Text,
        ReportDensity => "reportDensity": Text,
        DriverColumns => "driverColumns": TextList,
        Fail => "fail": Boolean,
        MaxChangeCount => "maxChangeCount": PositiveInteger,
    }
}

named_enum! {
    pub enum DiffReportType {
        /// Un registro por fila comparada, con su estado.
        Unified => "unified",
        /// Una única fila con los totales.
        Summary => "summary",
    }
}

named_enum! {
    pub enum ReportDensity {
        /// Todos los registros, también los que no cambian.
        Dense => "dense",
        /// Sólo los cambios.
        Sparse => "sparse",
    }
}

named_enum! {
    pub enum DiffStatus {
        Unchanged => "unchanged",
        /// Sólo en el destino.
        Added => "added",
        /// Sólo en la entrada.
        Deleted => "deleted",
        /// Misma clave, otros valores: se reportan ambas filas.
        Changed => "changed",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffConfig {
    target: TargetTemplate,
    report: TargetTemplate,
    report_type: DiffReportType,
    density: ReportDensity,
    driver_columns: Vec<String>,
    fail: bool,
    max_changes: Option<usize>,
}

impl DiffConfig {
    pub fn new(target: &str) -> Result<Self> {
        Ok(Self { target: TargetTemplate::parse(target)?,
                  report: TargetTemplate::parse(DEFAULT_DIFF_REPORT)?,
                  report_type: DiffReportType::Unified,
                  density: ReportDensity::Dense,
                  driver_columns: Vec::new(),
                  fail: true,
                  max_changes: None })
    }

    pub fn report(mut self, uri: &str) -> Result<Self> {
        self.report = TargetTemplate::parse(uri)?;
        Ok(self)
    }

    pub fn report_type(mut self, report_type: DiffReportType) -> Self {
        self.report_type = report_type;
        self
    }

    pub fn density(mut self, density: ReportDensity) -> Self {
        self.density = density;
        self
    }

    pub fn driver_columns(mut self, columns: Vec<String>) -> Self {
        self.driver_columns = columns;
        self
    }

    pub fn fail(mut self, fail: bool) -> Self {
        self.fail = fail;
        self
    }

    pub fn max_changes(mut self, max: usize) -> Self {
        self.max_changes = Some(max);
        self
    }

    pub fn from_args(args: &Map<String, Value>) -> Result<Self> {
        let mut target: Option<String> = None;
        let mut report: Option<String> = None;
        let mut report_type = DiffReportType::Unified;
        let mut density = ReportDensity::Dense;
        let mut driver_columns = Vec::new();
        let mut fail = true;
        let mut max_changes = None;
        apply_options::<DiffOption, _>(args, |option, value| {
            match option {
                DiffOption::TargetUri => target = Some(value.into_text()?),
                DiffOption::ReportUri => report = Some(value.into_text()?),
                DiffOption::ReportType => report_type = value.into_enum()?,
                DiffOption::ReportDensity => density = value.into_enum()?,
                DiffOption::DriverColumns => driver_columns = value.into_list()?,
                DiffOption::Fail => fail = value.into_bool()?,
                DiffOption::MaxChangeCount => max_changes = Some(value.into_usize()?),
            }
            Ok(())
        })?;
        let target = target.ok_or_else(|| missing_option("diff", "targetUri"))?;
        let mut config = Self::new(&target)?.report_type(report_type)
                                            .density(density)
                                            .driver_columns(driver_columns)
                                            .fail(fail);
        if let Some(report) = report {
            config = config.report(&report)?;
        }
        config.max_changes = max_changes;
        Ok(config)
    }
}

/// Resultado de comparar dos conjuntos de filas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOutcome {
    pub records: Vec<(DiffStatus, Row)>,
    pub record_count: u64,
    /// Un cambio por fila agregada, eliminada o modificada.
    pub change_count: u64,
}

impl DiffOutcome {
    pub fn are_equal(&self) -> bool { self.change_count == 0 }

    fn same(&mut self, row: &Row) { self.records.push((DiffStatus::Unchanged, row.clone())); }

    fn only(&mut self, status: DiffStatus, row: &Row) {
        self.change_count += 1;
        self.records.push((status, row.clone()));
    }

    fn changed(&mut self, from: &Row, to: &Row) {
        self.change_count += 1;
        self.records.push((DiffStatus::Changed, from.clone()));
        self.records.push((DiffStatus::Changed, to.clone()));
    }
}

/// Compara `source` con `target`. Con `keys` vacío se compara por posición.
///
/// El reporte sigue el orden de `source`; las filas que sólo están en
/// `target` van al final, en su orden.
pub fn diff_rows(source: &[Row], target: &[Row], keys: &[usize]) -> DiffOutcome {
    let mut outcome = DiffOutcome { record_count: source.len().max(target.len()) as u64,
                                    ..DiffOutcome::default() };
    if keys.is_empty() {
        for i in 0..source.len().max(target.len()) {
            match (source.get(i), target.get(i)) {
                (Some(s), Some(t)) if s == t => outcome.same(s),
                (Some(s), Some(t)) => outcome.changed(s, t),
                (Some(s), None) => outcome.only(DiffStatus::Deleted, s),
                (None, Some(t)) => outcome.only(DiffStatus::Added, t),
                (None, None) => {}
            }
        }
        return outcome;
    }

    let key_of = |row: &Row| Value::Array(keys.iter().map(|&k| row.get(k).cloned().unwrap_or(Value::Null)).collect()).to_string();
    let mut by_key: HashMap<String, usize> = HashMap::with_capacity(target.len());
    for (i, row) in target.iter().enumerate() {
        by_key.entry(key_of(row)).or_insert(i);
    }
    let mut matched = vec![false; target.len()];
    for row in source {
        match by_key.get(&key_of(row)) {
            Some(&i) if !matched[i] => {
                matched[i] = true;
                if row == &target[i] {
                    outcome.same(row);
                } else {
                    outcome.changed(row, &target[i]);
                }
            }
            _ => outcome.only(DiffStatus::Deleted, row),
        }
    }
    for (row, seen) in target.iter().zip(matched) {
        if !seen {
            outcome.only(DiffStatus::Added, row);
        }
    }
    outcome
}

fn read_all(resource: &ResourceRef) -> std::result::Result<Vec<Row>, ConnectorError> {
    let mut stream = resource.select(DEFAULT_FETCH_SIZE)?;
    let mut rows = Vec::new();
    while let Some(chunk) = stream.next_chunk()? {
        rows.extend(chunk);
    }
    Ok(rows)
}

pub struct DiffStep {
    name: String,
    config: DiffConfig,
}

impl DiffStep {
    pub fn new(name: impl Into<String>, config: DiffConfig) -> Self {
        Self { name: name.into(),
               config }
    }

    /// Posiciones de las columnas guía en `schema`.
    fn driver_positions(&self, input: &ResourceRef, schema: &Schema) -> Result<Vec<usize>> {
        if self.config.driver_columns.is_empty() {
            return Ok(schema.primary_key_indexes());
        }
        self.config
            .driver_columns
            .iter()
            .map(|name| {
                schema.index_of(name).ok_or_else(|| {
                                         FlowError::invalid_option("diff",
                                                                   "driverColumns",
                                                                   format!("`{name}` is not a column of {} (columns: {})",
                                                                           input.uri(),
                                                                           schema.names().join(", ")))
                                     })
            })
            .collect()
    }

    pub fn compare(&self, input: &ResourceRef, target: &ResourceRef) -> Result<DiffOutcome> {
        let schema = input.schema();
        let source_rows = read_all(input)?;
        let target_rows = if target.exists()? {
            let target_width = target.schema().len();
            if target_width != schema.len() {
                return Err(FlowError::InvalidMapping(format!("{} has {} columns but {} has {target_width}; they cannot be compared",
                                                             input.uri(),
                                                             schema.len(),
                                                             target.uri())));
            }
            read_all(target)?
        } else {
            debug!("diff `{}`: {} does not exist, compared as empty", self.name, target.uri());
            Vec::new()
        };
        if schema.is_empty() {
            return Err(FlowError::InvalidMapping(format!("{} has no columns to compare", input.uri())));
        }
        let keys = self.driver_positions(input, &schema)?;
        let outcome = diff_rows(&source_rows, &target_rows, &keys);
        if let Some(max) = self.config.max_changes {
            if outcome.change_count > max as u64 {
                return Err(ConnectorError::constraint(format!("{} changes between {} and {} exceed the maximum of {max}",
                                                              outcome.change_count,
                                                              input.uri(),
                                                              target.uri())).into());
            }
        }
        Ok(outcome)
    }

    fn write_report(&self, input: &ResourceRef, target: &ResourceRef, outcome: DiffOutcome, ctx: &PipelineContext) -> Result<ResourceRef> {
        let report = self.config.report.resolve(input, ctx.registry())?;
        match self.config.report_type {
            DiffReportType::Summary => {
                let schema = Schema::new().with_column("from", DataType::Varchar)
                                          .with_column("to", DataType::Varchar)
                                          .with_column("equals", DataType::Boolean)
                                          .with_column("record_count", DataType::Integer)
                                          .with_column("change_count", DataType::Integer);
                let row = vec![Value::from(input.uri()),
                               Value::from(target.uri()),
                               Value::from(outcome.are_equal()),
                               Value::from(outcome.record_count),
                               Value::from(outcome.change_count)];
                materialize(&report, schema, vec![row])?;
            }
            DiffReportType::Unified => {
                let mut columns = vec![Column::new(DIFF_STATUS_COLUMN, DataType::Varchar)];
                columns.extend(input.schema().columns().iter().map(|c| Column::new(c.name.clone(), c.data_type)));
                let rows = outcome.records
                                  .into_iter()
                                  .filter(|(status, _)| self.config.density == ReportDensity::Dense || *status != DiffStatus::Unchanged)
                                  .map(|(status, row)| {
                                      let mut out = Vec::with_capacity(row.len() + 1);
                                      out.push(Value::from(status.name()));
                                      out.extend(row);
                                      out
                                  })
                                  .collect();
                materialize(&report, Schema::from_columns(columns), rows)?;
            }
        }
        Ok(report)
    }
}

impl MapStep for DiffStep {
    fn name(&self) -> &str { &self.name }

    fn apply(&mut self, input: ResourceRef, ctx: &PipelineContext) -> Result<Option<ResourceRef>> {
        let target = self.config.target.resolve(&input, ctx.registry())?;
        let outcome = self.compare(&input, &target)?;
        info!("diff {} -> {}: {} records, {} changes",
              input.uri(),
              target.uri(),
              outcome.record_count,
              outcome.change_count);
        if !outcome.are_equal() && self.config.fail {
            ctx.add_exit_status(1);
        }
        Ok(Some(self.write_report(&input, &target, outcome, ctx)?))
    }
}
