//! The render service: setup, render, shutdown.

use crate::bundle::{BundleBuilder, Source, REACT_GLOBAL};
use crate::config::RendererOptions;
use crate::engine::{Engine, EngineError};
use crate::error::{PrerenderError, RenderError, SetupError};
use crate::json::Props;
use crate::pool::{ContextPool, PoolStatus};
use crate::runtime::V8Engine;
use crate::sanitize::sanitize_props;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, info};

/// Rendered markup, safe to embed without further escaping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markup(String);

impl Markup {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Markup {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Markup> for String {
    fn from(markup: Markup) -> Self {
        markup.0
    }
}

/// Expression that renders `component` with `props` to a markup string.
pub fn build_expression(component: &str, props: &str) -> String {
    format!(
        "(function () {{ return {r}.renderToString({r}.createElement({component}, {props})); }})()",
        r = REACT_GLOBAL
    )
}

/// Everything one `setup` call produced.
struct Generation<E: Engine> {
    id: u64,
    pool: Arc<ContextPool<E>>,
    options: RendererOptions,
}

impl<E: Engine> Generation<E> {
    fn serialize_props(&self, component: &str, props: Props) -> Result<String, RenderError> {
        match props {
            Props::Raw(text) => Ok(text),
            Props::Value(value) => {
                if self.options.sanitize_props {
                    sanitize_props(&value).map_err(|e| RenderError::UnsafeProps {
                        component: component.to_string(),
                        reason: e.to_string(),
                    })?;
                }
                self.options
                    .json_encoder
                    .encode(&value)
                    .map_err(|e| RenderError::PropsEncoding {
                        component: component.to_string(),
                        source: e.into(),
                    })
            }
        }
    }
}

/// Server-side renderer backed by a pool of script contexts.
///
/// Call [`setup`](Self::setup) before rendering; call it again to hot-reload
/// the bundle. Each setup starts a new generation; renders already holding a
/// context from the previous one finish against it.
pub struct Renderer<E: Engine = V8Engine> {
    engine: Arc<E>,
    current: RwLock<Option<Arc<Generation<E>>>>,
    generations: AtomicU64,
}

impl Renderer<V8Engine> {
    /// Renderer on V8 with default engine options.
    pub fn new() -> Self {
        Self::with_engine(V8Engine::default())
    }
}

impl Default for Renderer<V8Engine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Engine> Renderer<E> {
    pub fn with_engine(engine: E) -> Self {
        Self {
            engine: Arc::new(engine),
            current: RwLock::new(None),
            generations: AtomicU64::new(0),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Load sources, build a new bundle and pool, and retire the previous pool.
    ///
    /// Returns the new generation id. On error the current configuration is
    /// left untouched.
    pub fn setup(
        &self,
        react: impl Into<Source>,
        components: impl Into<Source>,
        options: RendererOptions,
    ) -> Result<u64, SetupError> {
        options.validate()?;
        let react_source = react.into().load()?;
        let components_source = components.into().load()?;

        let id = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let bundle = BundleBuilder::new(id).build(&react_source, &components_source);
        let bundle_bytes = bundle.source().len();
        let pool = Arc::new(ContextPool::new(self.engine.clone(), bundle, options.size));

        info!(
            generation = id,
            size = options.size,
            timeout_secs = options.timeout_secs,
            bundle_bytes,
            "renderer configured"
        );

        let generation = Arc::new(Generation { id, pool, options });
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(generation);

        if let Some(previous) = previous {
            previous.pool.shutdown();
            info!(generation = previous.id, "retired previous generation");
        }

        Ok(id)
    }

    /// Render `component` with `props` to markup.
    ///
    /// String props are passed to the script verbatim; structured props go
    /// through the configured JSON encoder.
    pub async fn render(&self, component: &str, props: impl Into<Props>) -> Result<Markup, RenderError> {
        let generation = self.current().ok_or(RenderError::NotConfigured)?;
        let props = generation.serialize_props(component, props.into())?;
        let expression = build_expression(component, &props);

        let started = Instant::now();
        let mut context = generation.pool.checkout(generation.options.timeout()).await?;

        let outcome = tokio::task::spawn_blocking(move || {
            let outcome = context.evaluate(&expression);
            if matches!(outcome, Err(EngineError::Runtime(_))) {
                context.discard();
            }
            outcome
        })
        .await
        .map_err(|e| RenderError::Engine(format!("render task failed: {}", e)))?;

        debug!(
            generation = generation.id,
            component,
            ok = outcome.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "render finished"
        );

        match outcome {
            Ok(html) => Ok(Markup(html)),
            Err(EngineError::Program(message)) => Err(PrerenderError {
                component: component.to_string(),
                props,
                message,
            }
            .into()),
            Err(EngineError::Runtime(message)) => Err(RenderError::Engine(message)),
        }
    }

    /// Retire the current generation. Later renders fail with
    /// [`RenderError::NotConfigured`] until the next setup.
    pub fn shutdown(&self) {
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            previous.pool.shutdown();
            info!(generation = previous.id, "renderer shut down");
        }
    }

    pub fn generation(&self) -> Option<u64> {
        self.current().map(|g| g.id)
    }

    pub fn status(&self) -> Option<PoolStatus> {
        self.current().map(|g| g.pool.status())
    }

    fn current(&self) -> Option<Arc<Generation<E>>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
