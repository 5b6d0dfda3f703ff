//! Renderer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for a [`Renderer`](crate::Renderer).
///
/// Every field has a default, so partial JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Delay between a render pass and the effects it scheduled.
    pub effect_delay_ms: u64,

    /// Upper bound on chained re-renders within one pass, and on effect
    /// flush rounds.
    pub max_update_rounds: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            effect_delay_ms: 100,
            max_update_rounds: 100,
        }
    }
}

impl RendererConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn effect_delay(&self) -> Duration {
        Duration::from_millis(self.effect_delay_ms)
    }

    pub fn with_effect_delay(mut self, delay: Duration) -> Self {
        self.effect_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_update_rounds(mut self, rounds: usize) -> Self {
        self.max_update_rounds = rounds;
        self
    }
}
