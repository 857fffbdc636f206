//! # React Prerender
//!
//! Server-side rendering of React components on a pool of V8 contexts.
//!
//! Every context compiles one *bundle* (host shims, the React library and the
//! application's components) once, then serves many renders. Contexts are
//! created lazily up to the pool size, checked out exclusively for one render
//! and returned on every path. Calling [`Renderer::setup`] again builds a new
//! bundle and pool (a new *generation*) and retires the old one without
//! interrupting renders that are still running on it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use react_prerender::{Renderer, RendererOptions, Source};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let renderer = Renderer::new();
//!     renderer.setup(
//!         Source::file("./dist/react.js"),
//!         Source::file("./dist/components.js"),
//!         RendererOptions::default().with_size(4),
//!     )?;
//!
//!     let html = renderer.render("Hello", json!({ "name": "World" })).await?;
//!     println!("{}", html);
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! [`RenderError`] keeps every failure kind apart: a busy pool
//! ([`RenderError::PoolTimeout`]) can be retried, a broken bundle
//! ([`RenderError::Compilation`]) cannot, and a script exception
//! ([`RenderError::Prerender`]) names the component and props that raised it.

mod bundle;
mod config;
mod engine;
mod error;
mod json;
mod ops;
mod pool;
mod renderer;
mod runtime;
mod sanitize;

#[cfg(test)]
mod testing;

pub use bundle::{Bundle, BundleBuilder, Source};
pub use config::{RendererOptions, DEFAULT_POOL_SIZE, DEFAULT_TIMEOUT_SECS};
pub use engine::{Engine, EngineError, ScriptContext};
pub use error::{PoolError, PrerenderError, RenderError, SetupError};
pub use json::{JsonEncoder, Props, SerdeJsonEncoder};
pub use ops::{ConsoleOutput, CONSOLE_TARGET};
pub use pool::{ContextPool, PoolStatus, PooledContext};
pub use renderer::{build_expression, Markup, Renderer};
pub use runtime::{EngineOptions, V8Context, V8Engine};
pub use sanitize::{sanitize_props, UnsafeProps};
