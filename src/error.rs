//! Error types surfaced by setup and render.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A script raised while rendering a specific component/props pair.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Encountered error \"{message}\" when prerendering {component} with {props}")]
pub struct PrerenderError {
    pub component: String,
    /// Props exactly as they were handed to the script.
    pub props: String,
    /// Engine message, verbatim.
    pub message: String,
}

/// Errors from [`Renderer::render`](crate::Renderer::render).
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Renderer is not configured: call setup() before render()")]
    NotConfigured,

    #[error("Timed out after {0:?} waiting for a render context")]
    PoolTimeout(Duration),

    #[error("Render pool was shut down")]
    PoolShutdown,

    #[error("Bundle failed to compile: {0}")]
    Compilation(String),

    #[error(transparent)]
    Prerender(#[from] PrerenderError),

    #[error("Script engine failure: {0}")]
    Engine(String),

    #[error("Failed to encode props for {component}: {source}")]
    PropsEncoding {
        component: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Rejected props for {component}: {reason}")]
    UnsafeProps { component: String, reason: String },
}

impl RenderError {
    /// Conditions a caller may reasonably retry (busy pool, generation swap).
    pub fn is_retryable(&self) -> bool {
        matches!(self, RenderError::PoolTimeout(_) | RenderError::PoolShutdown)
    }
}

/// Errors from [`Renderer::setup`](crate::Renderer::setup).
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Pool size must be at least 1 and within the semaphore permit limit, got {0}")]
    InvalidSize(usize),

    #[error("Timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),

    #[error("Invalid renderer options: {0}")]
    Options(#[from] serde_json::Error),

    #[error("Failed to load source '{}': {reason}", path.display())]
    Source { path: PathBuf, reason: String },
}

/// Errors from [`ContextPool::checkout`](crate::ContextPool::checkout).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Timed out after {0:?} waiting for a context")]
    Timeout(Duration),

    #[error("Pool is shut down")]
    Shutdown,

    #[error("Bundle failed to compile: {0}")]
    Compilation(String),

    #[error("Failed to start a context: {0}")]
    Engine(String),
}

impl From<PoolError> for RenderError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Timeout(timeout) => RenderError::PoolTimeout(timeout),
            PoolError::Shutdown => RenderError::PoolShutdown,
            PoolError::Compilation(msg) => RenderError::Compilation(msg),
            PoolError::Engine(msg) => RenderError::Engine(msg),
        }
    }
}
