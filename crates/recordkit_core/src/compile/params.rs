//! Positional parameter accumulation for one compilation pass.

use crate::value::Value;

/// Ordered values matching the placeholders emitted so far.
///
/// Created fresh for every compilation; never shared between passes.
#[derive(Debug, Default)]
pub struct ParameterCollector {
    values: Vec<Value>,
}

impl ParameterCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one value and returns its 1-based position.
    pub fn push(&mut self, value: Value) -> usize {
        self.values.push(value);
        self.values.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}
