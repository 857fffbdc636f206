//! Deterministic in-process engine for exercising pool and renderer logic
//! without starting V8.
//!
//! Expressions containing `Broken` raise a program error, `Crash` a runtime
//! error, and `Slow` sleep for [`SLOW_RENDER`] before answering. Anything else
//! is echoed back wrapped in `<rendered>` tags. Bundles containing
//! [`SLOW_COMPILE_MARKER`] take [`SLOW_COMPILE`] to build.

use crate::bundle::Bundle;
use crate::engine::{Engine, EngineError, ScriptContext};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const BROKEN_BUNDLE_MARKER: &str = "@@syntax-error@@";
pub(crate) const SLOW_RENDER: Duration = Duration::from_millis(150);
pub(crate) const SLOW_COMPILE_MARKER: &str = "@@slow-compile@@";
pub(crate) const SLOW_COMPILE: Duration = Duration::from_millis(200);

#[derive(Default)]
pub(crate) struct FakeEngine {
    compiled: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeEngine {
    pub(crate) fn compiled(&self) -> usize {
        self.compiled.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Engine for FakeEngine {
    type Context = FakeContext;

    fn compile(&self, bundle: &Bundle) -> Result<FakeContext, EngineError> {
        self.compiled.fetch_add(1, Ordering::SeqCst);
        if bundle.source().contains(SLOW_COMPILE_MARKER) {
            std::thread::sleep(SLOW_COMPILE);
        }
        if bundle.source().contains(BROKEN_BUNDLE_MARKER) {
            return Err(EngineError::Program(
                "SyntaxError: Unexpected token '@'".into(),
            ));
        }
        Ok(FakeContext {
            in_flight: self.in_flight.clone(),
            max_in_flight: self.max_in_flight.clone(),
        })
    }
}

pub(crate) struct FakeContext {
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptContext for FakeContext {
    fn evaluate(&mut self, expression: &str) -> Result<String, EngineError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if expression.contains("Slow") {
            std::thread::sleep(SLOW_RENDER);
        }

        let result = if expression.contains("Broken") {
            Err(EngineError::Program("Error: Broken component".into()))
        } else if expression.contains("Crash") {
            Err(EngineError::Runtime("context thread has exited".into()))
        } else {
            Ok(format!("<rendered>{expression}</rendered>"))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
