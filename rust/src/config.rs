//! Configuration for the scheduling engine.

use pyo3::prelude::*;

/// Engine configuration carried by each `Project`.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    #[pyo3(get, set)]
    pub verbosity: u8,
    /// Explore the most-delayed successor first during critical path search.
    #[pyo3(get, set)]
    pub prioritize_delayed: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            prioritize_delayed: true,
        }
    }
}

#[pymethods]
impl EngineConfig {
    #[new]
    #[pyo3(signature = (verbosity=None, prioritize_delayed=None))]
    fn new(verbosity: Option<u8>, prioritize_delayed: Option<bool>) -> Self {
        let defaults = Self::default();
        Self {
            verbosity: verbosity.unwrap_or(defaults.verbosity),
            prioritize_delayed: prioritize_delayed.unwrap_or(defaults.prioritize_delayed),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "EngineConfig(verbosity={}, prioritize_delayed={})",
            self.verbosity, self.prioritize_delayed
        )
    }
}
