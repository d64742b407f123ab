//! Supplier raíz por selectores `patron@conexion`.
//!
//! En batch lista una sola vez al inicio. En stream cada `poll` vuelve a
//! listar y encola sólo los recursos que todavía no se entregaron.

use std::collections::{HashSet, VecDeque};

use log::{debug, info};
use serde_json::{Map, Value};
use tabflow_core::{apply_options, step_options, FlowError, PipelineContext, ProcessingMode, ResourceRef, Result, RootSupplier};

use crate::missing_option;

step_options! {
    pub enum SelectOption for "select" {
        DataSelectors => "dataSelectors": TextList,
        /// Un selector sin coincidencias es un error.
        StrictSelection => "strictSelection": Boolean,
        ProcessingType => "processingType": Text,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectConfig {
    selectors: Vec<String>,
    strict: Option<bool>,
    mode: ProcessingMode,
}

impl SelectConfig {
    pub fn new<S: Into<String>>(selectors: impl IntoIterator<Item = S>) -> Self {
        Self { selectors: selectors.into_iter().map(Into::into).collect(),
               strict: None,
               mode: ProcessingMode::Batch }
    }

    /// `None` hereda la rigurosidad del pipeline.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    pub fn mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn from_args(args: &Map<String, Value>) -> Result<Self> {
        let mut config = SelectConfig::new(Vec::<String>::new());
        apply_options::<SelectOption, _>(args, |option, value| {
            match option {
                SelectOption::DataSelectors => config.selectors = value.into_list()?,
                SelectOption::StrictSelection => config.strict = Some(value.into_bool()?),
                SelectOption::ProcessingType => config.mode = value.into_enum()?,
            }
            Ok(())
        })?;
        if config.selectors.is_empty() {
            return Err(missing_option("select", "dataSelectors"));
        }
        Ok(config)
    }

    pub fn selectors(&self) -> &[String] { &self.selectors }
}

pub struct SelectSupplier {
    name: String,
    config: SelectConfig,
    queue: VecDeque<ResourceRef>,
    seen: HashSet<String>,
}

impl SelectSupplier {
    pub fn new(name: impl Into<String>, config: SelectConfig) -> Self {
        Self { name: name.into(),
               config,
               queue: VecDeque::new(),
               seen: HashSet::new() }
    }

    /// Encola los recursos nuevos; devuelve cuántos se agregaron.
    fn refill(&mut self, ctx: &PipelineContext, check_strict: bool) -> Result<usize> {
        let strict = self.config.strict.unwrap_or(ctx.is_strict());
        let mut added = 0;
        for selector in &self.config.selectors {
            let found = ctx.registry().select(selector)?;
            if found.is_empty() && strict && check_strict {
                return Err(FlowError::Config(format!("selector `{selector}` matched no data resource")));
            }
            for resource in found {
                if self.seen.insert(resource.uri()) {
                    self.queue.push_back(resource);
                    added += 1;
                }
            }
        }
        Ok(added)
    }
}

impl RootSupplier for SelectSupplier {
    fn name(&self) -> &str { &self.name }

    fn mode(&self) -> ProcessingMode { self.config.mode }

    fn on_start(&mut self, ctx: &PipelineContext) -> Result<()> {
        self.queue.clear();
        self.seen.clear();
        let added = self.refill(ctx, true)?;
        info!("select `{}`: {added} data resources for {}", self.name, self.config.selectors.join(", "));
        Ok(())
    }

    fn next(&mut self, _ctx: &PipelineContext) -> Result<Option<ResourceRef>> { Ok(self.queue.pop_front()) }

    fn poll(&mut self, ctx: &PipelineContext) -> Result<bool> {
        let added = self.refill(ctx, false)?;
        if added > 0 {
            debug!("select `{}`: {added} new data resources", self.name);
        }
        Ok(true)
    }

    fn reset(&mut self) -> Result<()> {
        self.queue.clear();
        self.seen.clear();
        Ok(())
    }
}
