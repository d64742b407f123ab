use super::{ExecutionMode, ResultColumn};
use crate::constants::DEFAULT_ERROR_MESSAGE_WIDTH;
use crate::errors::{FlowError, Result};
use crate::template::TargetTemplate;

pub const DEFAULT_RESULT_TEMPLATE: &str = "${input_logical_name}_result";
pub const DEFAULT_ERROR_TEMPLATE: &str = "${input_logical_name}_error";

/// Configuración inmutable del motor de ejecución.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    mode: Option<ExecutionMode>,
    result_columns: Vec<ResultColumn>,
    target: Option<TargetTemplate>,
    result_template: TargetTemplate,
    error_template: TargetTemplate,
    stop_early: bool,
    strict_input: bool,
    strict_execution: bool,
    fail_on_error: bool,
    result_persistence: Option<bool>,
    error_message_width: usize,
}

impl ExecutionOptions {
    pub fn builder() -> ExecutionOptionsBuilder { ExecutionOptionsBuilder::default() }

    pub fn mode(&self) -> Option<ExecutionMode> { self.mode }

    /// Columnas configuradas o, si no hay, las del modo.
    pub fn columns_for(&self, mode: ExecutionMode) -> Vec<ResultColumn> {
        if self.result_columns.is_empty() {
            ResultColumn::defaults(mode)
        } else {
            self.result_columns.clone()
        }
    }

    /// Nombre del recurso de resultados, si se configuró.
    pub fn target(&self) -> Option<&TargetTemplate> { self.target.as_ref() }

    pub fn result_template(&self) -> &TargetTemplate { &self.result_template }

    pub fn error_template(&self) -> &TargetTemplate { &self.error_template }

    pub fn stop_early(&self) -> bool { self.stop_early }

    pub fn strict_input(&self) -> bool { self.strict_input }

    pub fn strict_execution(&self) -> bool { self.strict_execution }

    pub fn fail_on_error(&self) -> bool { self.fail_on_error }

    /// Persistencia efectiva para un elemento en `mode`.
    pub fn persistence_for(&self, mode: ExecutionMode) -> Result<bool> {
        match (self.result_persistence, mode) {
            (Some(true), ExecutionMode::Load) => {
                Err(FlowError::Config("result persistence requires the transfer execution mode".to_string()))
            }
            (Some(persist), _) => Ok(persist),
            (None, ExecutionMode::Load) => Ok(false),
            (None, ExecutionMode::Transfer) => Ok(true),
        }
    }

    pub fn error_message_width(&self) -> usize { self.error_message_width }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionOptionsBuilder {
    mode: Option<ExecutionMode>,
    result_columns: Vec<ResultColumn>,
    target: Option<String>,
    result_template: Option<String>,
    error_template: Option<String>,
    stop_early: Option<bool>,
    strict_input: bool,
    strict_execution: bool,
    fail_on_error: Option<bool>,
    result_persistence: Option<bool>,
    error_message_width: Option<usize>,
}

impl ExecutionOptionsBuilder {
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn result_columns(mut self, columns: Vec<ResultColumn>) -> Self {
        self.result_columns = columns;
        self
    }

    pub fn target(mut self, template: impl Into<String>) -> Self {
        self.target = Some(template.into());
        self
    }

    pub fn result_template(mut self, template: impl Into<String>) -> Self {
        self.result_template = Some(template.into());
        self
    }

    pub fn error_template(mut self, template: impl Into<String>) -> Self {
        self.error_template = Some(template.into());
        self
    }

    pub fn stop_early(mut self, stop_early: bool) -> Self {
        self.stop_early = Some(stop_early);
        self
    }

    pub fn strict_input(mut self, strict: bool) -> Self {
        self.strict_input = strict;
        self
    }

    pub fn strict_execution(mut self, strict: bool) -> Self {
        self.strict_execution = strict;
        self
    }

    pub fn fail_on_error(mut self, fail: bool) -> Self {
        self.fail_on_error = Some(fail);
        self
    }

    pub fn result_persistence(mut self, persist: bool) -> Self {
        self.result_persistence = Some(persist);
        self
    }

    pub fn error_message_width(mut self, width: usize) -> Self {
        self.error_message_width = Some(width);
        self
    }

    pub fn build(self) -> Result<ExecutionOptions> {
        if self.mode == Some(ExecutionMode::Load) && self.result_persistence == Some(true) {
            return Err(FlowError::invalid_option("execute",
                                                 "resultPersistence",
                                                 "results are only persisted in the transfer execution mode"));
        }
        let width = self.error_message_width.unwrap_or(DEFAULT_ERROR_MESSAGE_WIDTH);
        if width < 10 {
            return Err(FlowError::invalid_option("execute", "errorMessageWidth", "must be at least 10"));
        }
        let mut columns = Vec::with_capacity(self.result_columns.len());
        for column in self.result_columns {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        Ok(ExecutionOptions { mode: self.mode,
                              result_columns: columns,
                              target: self.target.as_deref().map(TargetTemplate::parse).transpose()?,
                              result_template: TargetTemplate::parse(self.result_template.as_deref().unwrap_or(DEFAULT_RESULT_TEMPLATE))?,
                              error_template: TargetTemplate::parse(self.error_template.as_deref().unwrap_or(DEFAULT_ERROR_TEMPLATE))?,
                              stop_early: self.stop_early.unwrap_or(true),
                              strict_input: self.strict_input,
                              strict_execution: self.strict_execution,
                              fail_on_error: self.fail_on_error.unwrap_or(true),
                              result_persistence: self.result_persistence,
                              error_message_width: width })
    }
}
