//! Bundle composition: host shims + React + components.

use crate::error::SetupError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Aliases for the global object and a console that swallows calls the host
/// does not provide. Headless engines have neither `window` nor `self`.
const HOST_SHIMS: &str = r#"var global = global || this;
var self = self || this;
var window = window || this;

var console = global.console || {};
['error', 'log', 'info', 'warn'].forEach(function (fn) {
  if (!(fn in console)) {
    console[fn] = function () {};
  }
});
"#;

/// Global name the render expression resolves `createElement` and
/// `renderToString` through.
pub const REACT_GLOBAL: &str = "React";

/// Where a piece of bundle source comes from. Loaded on every setup.
#[derive(Clone)]
pub enum Source {
    Inline(Arc<str>),
    File(PathBuf),
    Provider(Arc<dyn Fn() -> String + Send + Sync>),
}

impl Source {
    pub fn inline(text: impl Into<Arc<str>>) -> Self {
        Source::Inline(text.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Source::File(path.into())
    }

    pub fn from_fn(provider: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Source::Provider(Arc::new(provider))
    }

    /// Produce the source text.
    ///
    /// Files must exist, be regular files and carry a `.js`, `.mjs` or `.cjs`
    /// extension.
    pub fn load(&self) -> Result<String, SetupError> {
        match self {
            Source::Inline(text) => Ok(text.to_string()),
            Source::Provider(provider) => Ok(provider()),
            Source::File(path) => read_script(path),
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Inline(text) => write!(f, "Source::Inline({} bytes)", text.len()),
            Source::File(path) => write!(f, "Source::File({})", path.display()),
            Source::Provider(_) => f.write_str("Source::Provider"),
        }
    }
}

impl From<&str> for Source {
    fn from(text: &str) -> Self {
        Source::inline(text)
    }
}

impl From<String> for Source {
    fn from(text: String) -> Self {
        Source::inline(text)
    }
}

fn read_script(path: &Path) -> Result<String, SetupError> {
    let fail = |reason: String| SetupError::Source {
        path: path.to_path_buf(),
        reason,
    };

    let canonical = path.canonicalize().map_err(|e| fail(e.to_string()))?;
    if !canonical.is_file() {
        return Err(fail("not a regular file".into()));
    }
    if !is_extension_allowed(&canonical) {
        return Err(fail("only .js, .mjs and .cjs files are allowed".into()));
    }

    std::fs::read_to_string(&canonical).map_err(|e| fail(e.to_string()))
}

fn is_extension_allowed(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("js") | Some("mjs") | Some("cjs")
    )
}

/// Immutable script text every context of one generation compiles.
#[derive(Debug, Clone)]
pub struct Bundle {
    generation: u64,
    source: Arc<str>,
}

impl Bundle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Builds the bundle for one generation. Never fails; broken source only
/// shows up when a context compiles it.
#[derive(Debug, Clone, Copy)]
pub struct BundleBuilder {
    generation: u64,
}

impl BundleBuilder {
    pub fn new(generation: u64) -> Self {
        Self { generation }
    }

    pub fn build(&self, react_source: &str, components_source: &str) -> Bundle {
        let mut text = String::with_capacity(
            HOST_SHIMS.len() + react_source.len() + components_source.len() + 64,
        );
        text.push_str(HOST_SHIMS);
        text.push('\n');
        text.push_str(react_source);
        text.push_str(";\n");
        text.push_str(&format!("{REACT_GLOBAL} = global.{REACT_GLOBAL};\n"));
        text.push_str(components_source);
        text.push_str(";\n");

        Bundle {
            generation: self.generation,
            source: text.into(),
        }
    }
}
