//! Renderer options.

use crate::error::SetupError;
use crate::json::{JsonEncoder, SerdeJsonEncoder};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_TIMEOUT_SECS: f64 = 20.0;

/// Options for one renderer generation.
///
/// Can be deserialized from JSON (`{"size": 4, "timeout": 2.5}`); unknown keys
/// are rejected. The JSON encoder is a capability and is only set in code.
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererOptions {
    /// Maximum number of live execution contexts (default: 10)
    pub size: usize,
    /// Seconds to wait for a free context before giving up (default: 20)
    #[serde(rename = "timeout")]
    pub timeout_secs: f64,
    /// Reject structured props carrying prototype-pollution keys (default: off)
    pub sanitize_props: bool,
    #[serde(skip, default = "default_encoder")]
    pub json_encoder: Arc<dyn JsonEncoder>,
}

fn default_encoder() -> Arc<dyn JsonEncoder> {
    Arc::new(SerdeJsonEncoder)
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            sanitize_props: false,
            json_encoder: default_encoder(),
        }
    }
}

impl fmt::Debug for RendererOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererOptions")
            .field("size", &self.size)
            .field("timeout_secs", &self.timeout_secs)
            .field("sanitize_props", &self.sanitize_props)
            .finish_non_exhaustive()
    }
}

impl RendererOptions {
    /// Parse options from a JSON object. Does not validate ranges.
    pub fn from_json(json: &str) -> Result<Self, SetupError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_sanitize_props(mut self, enabled: bool) -> Self {
        self.sanitize_props = enabled;
        self
    }

    pub fn with_json_encoder(mut self, encoder: impl JsonEncoder + 'static) -> Self {
        self.json_encoder = Arc::new(encoder);
        self
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        if self.size == 0 || self.size > Semaphore::MAX_PERMITS {
            return Err(SetupError::InvalidSize(self.size));
        }
        // Rejects NaN, negatives and anything past Duration's range.
        match Duration::try_from_secs_f64(self.timeout_secs) {
            Ok(timeout) if !timeout.is_zero() => Ok(()),
            _ => Err(SetupError::InvalidTimeout(self.timeout_secs)),
        }
    }

    /// Checkout deadline. Only meaningful after [`validate`](Self::validate)
    /// has accepted the options.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}
