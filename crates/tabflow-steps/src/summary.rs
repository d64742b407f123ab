//! Estadísticas de un conjunto de recursos: total, y suma/promedio/mínimo/
//! máximo del número de filas y del tamaño.
//!
//! El combinador es asociativo y conmutativo, así que `SummaryStep` calcula
//! las estadísticas parciales de los elementos en paralelo con rayon.

use log::info;
use rayon::prelude::*;
use serde_json::{Map, Value};
use tabflow_core::resource::materialize;
use tabflow_core::{apply_options, step_options, DataType, PipelineContext, ProcessingMode, ReducerStep, Reduction, ResourceRef, Result, Row, Schema,
                   TargetTemplate};

use crate::list::concat_target;

pub const DEFAULT_SUMMARY_TARGET: &str = "data_resource_summary";

step_options! {
    pub enum SummaryOption for "summary" {
        TargetUri => "targetUri": Text,
        ProcessingType => "processingType": Text,
    }
}

/// Agregado de un atributo numérico.
///
/// Un valor nulo cuenta como 0 para suma, mínimo y máximo, pero no para
/// `present`, que es el divisor del promedio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Aggregate {
    pub present: u64,
    pub sum: u64,
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl Aggregate {
    pub fn of(value: Option<u64>) -> Self {
        let v = value.unwrap_or(0);
        Self { present: u64::from(value.is_some()),
               sum: v,
               min: Some(v),
               max: Some(v) }
    }

    pub fn combine(self, other: Self) -> Self {
        Self { present: self.present.saturating_add(other.present),
               sum: self.sum.saturating_add(other.sum),
               min: option_with(self.min, other.min, u64::min),
               max: option_with(self.max, other.max, u64::max) }
    }

    pub fn average(&self) -> Option<f64> {
        if self.present == 0 {
            None
        } else {
            Some(self.sum as f64 / self.present as f64)
        }
    }
}

fn option_with(a: Option<u64>, b: Option<u64>, f: fn(u64, u64) -> u64) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (a, None) => a,
        (None, b) => b,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub total: u64,
    pub count: Aggregate,
    pub size: Aggregate,
}

impl Statistics {
    pub fn of(resource: &ResourceRef) -> Result<Self> {
        Ok(Self { total: 1,
                  count: Aggregate::of(Some(resource.count()?)),
                  size: Aggregate::of(resource.size()?) })
    }

    pub fn combine(self, other: Self) -> Self {
        Self { total: self.total.saturating_add(other.total),
               count: self.count.combine(other.count),
               size: self.size.combine(other.size) }
    }

    pub fn schema() -> Schema {
        let mut schema = Schema::new().with_column("total", DataType::Integer);
        for attribute in ["count", "size"] {
            schema = schema.with_column(&format!("sum_{attribute}"), DataType::Integer)
                           .with_column(&format!("avg_{attribute}"), DataType::Numeric)
                           .with_column(&format!("min_{attribute}"), DataType::Integer)
                           .with_column(&format!("max_{attribute}"), DataType::Integer);
        }
        schema
    }

    pub fn row(&self) -> Row {
        let opt = |v: Option<u64>| v.map(Value::from).unwrap_or(Value::Null);
        let mut row = vec![Value::from(self.total)];
        for aggregate in [&self.count, &self.size] {
            row.push(Value::from(aggregate.sum));
            row.push(aggregate.average().map(Value::from).unwrap_or(Value::Null));
            row.push(opt(aggregate.min));
            row.push(opt(aggregate.max));
        }
        row
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryConfig {
    target: TargetTemplate,
    mode: Option<ProcessingMode>,
}

impl SummaryConfig {
    pub fn new() -> Result<Self> {
        Ok(Self { target: concat_target(DEFAULT_SUMMARY_TARGET, "summary")?,
                  mode: None })
    }

    pub fn target(mut self, uri: &str) -> Result<Self> {
        self.target = concat_target(uri, "summary")?;
        Ok(self)
    }

    pub fn mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn from_args(args: &Map<String, Value>) -> Result<Self> {
        let mut target: Option<String> = None;
        let mut mode = None;
        apply_options::<SummaryOption, _>(args, |option, value| {
            match option {
                SummaryOption::TargetUri => target = Some(value.into_text()?),
                SummaryOption::ProcessingType => mode = Some(value.into_enum()?),
            }
            Ok(())
        })?;
        let mut config = Self::new()?;
        if let Some(target) = target {
            config = config.target(&target)?;
        }
        config.mode = mode;
        Ok(config)
    }
}

pub struct SummaryReduction {
    name: String,
    config: SummaryConfig,
}

impl SummaryReduction {
    pub fn new(name: impl Into<String>, config: SummaryConfig) -> Self {
        Self { name: name.into(),
               config }
    }

    /// Estadísticas de `elements`, calculadas en paralelo.
    pub fn summarize(&self, elements: &[ResourceRef]) -> Result<Statistics> {
        let partials = elements.par_iter().map(Statistics::of).collect::<Result<Vec<Statistics>>>()?;
        Ok(partials.into_par_iter().reduce(|| self.identity(), |a, b| self.combine(a, b)))
    }
}

impl Reduction for SummaryReduction {
    type Acc = Statistics;

    fn name(&self) -> &str { &self.name }

    fn mode(&self) -> Option<ProcessingMode> { self.config.mode }

    fn identity(&self) -> Statistics { Statistics::default() }

    fn accumulate(&self, acc: &mut Statistics, element: &ResourceRef) -> Result<()> {
        *acc = acc.combine(Statistics::of(element)?);
        Ok(())
    }

    fn combine(&self, left: Statistics, right: Statistics) -> Statistics { left.combine(right) }

    fn finish(&self, acc: Statistics, ctx: &PipelineContext) -> Result<Vec<ResourceRef>> {
        let target = ctx.registry().resolve(self.config.target.as_str())?;
        info!("summary `{}`: {} data resources into {}", self.name, acc.total, target.uri());
        materialize(&target, Statistics::schema(), vec![acc.row()])?;
        Ok(vec![target])
    }
}

/// Reductor que guarda las entradas y las resume en paralelo al vaciarse.
pub struct SummaryStep {
    reduction: SummaryReduction,
    pending: Vec<ResourceRef>,
}

impl SummaryStep {
    pub fn new(name: impl Into<String>, config: SummaryConfig) -> Self {
        Self { reduction: SummaryReduction::new(name, config),
               pending: Vec::new() }
    }
}

impl ReducerStep for SummaryStep {
    fn name(&self) -> &str { self.reduction.name() }

    fn mode(&self) -> Option<ProcessingMode> { self.reduction.mode() }

    fn accept(&mut self, input: ResourceRef, _ctx: &PipelineContext) -> Result<()> {
        self.pending.push(input);
        Ok(())
    }

    fn flush(&mut self, ctx: &PipelineContext) -> Result<Vec<ResourceRef>> {
        let pending = std::mem::take(&mut self.pending);
        let statistics = self.reduction.summarize(&pending)?;
        self.reduction.finish(statistics, ctx)
    }

    fn reset(&mut self) -> Result<()> {
        self.pending = Vec::new();
        Ok(())
    }
}
