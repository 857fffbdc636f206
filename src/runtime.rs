//! V8 execution contexts.
//!
//! `JsRuntime` is not `Send`, so each context lives on its own OS thread
//! together with a current-thread tokio runtime that drives its event loop.
//! The [`V8Context`] handle the pool moves around only holds the request
//! channel; dropping it closes the channel and the thread exits.

use crate::bundle::Bundle;
use crate::engine::{Engine, EngineError, ScriptContext};
use crate::ops::{prerender_host, ConsoleOutput};
use deno_core::error::{AnyError, JsError};
use deno_core::{v8, JsRuntime, PollEventLoopOptions, RuntimeOptions};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Options applied to every isolate the engine creates.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Maximum heap size in bytes (default: 64MB, None = unlimited)
    pub max_heap_size: Option<usize>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_heap_size: Some(64 * 1024 * 1024), // 64MB default
        }
    }
}

/// [`Engine`] backed by deno_core.
#[derive(Debug, Default)]
pub struct V8Engine {
    options: EngineOptions,
    spawned: AtomicU64,
}

impl V8Engine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            spawned: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }
}

impl Engine for V8Engine {
    type Context = V8Context;

    fn compile(&self, bundle: &Bundle) -> Result<V8Context, EngineError> {
        let id = self.spawned.fetch_add(1, Ordering::Relaxed);
        let generation = bundle.generation();
        let source = bundle.source().to_owned();
        let max_heap_size = self.options.max_heap_size;

        let (requests, inbox) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        thread::Builder::new()
            .name(format!("prerender-g{}-{}", generation, id))
            .spawn(move || run_context(source, generation, max_heap_size, ready_tx, inbox))
            .map_err(|e| EngineError::Runtime(format!("Failed to spawn context thread: {}", e)))?;

        ready_rx
            .recv()
            .map_err(|_| EngineError::Runtime("Context thread exited during startup".into()))??;

        debug!(generation, context = id, "execution context ready");
        Ok(V8Context { requests })
    }
}

struct Evaluation {
    expression: String,
    reply: SyncSender<Result<String, EngineError>>,
}

/// Handle to one isolate running on its own thread.
pub struct V8Context {
    requests: mpsc::Sender<Evaluation>,
}

impl ScriptContext for V8Context {
    fn evaluate(&mut self, expression: &str) -> Result<String, EngineError> {
        let (reply, response) = mpsc::sync_channel(1);
        self.requests
            .send(Evaluation {
                expression: expression.to_string(),
                reply,
            })
            .map_err(|_| thread_gone())?;
        response.recv().map_err(|_| thread_gone())?
    }
}

fn thread_gone() -> EngineError {
    EngineError::Runtime("Context thread has exited".into())
}

fn heap_exhausted() -> EngineError {
    EngineError::Runtime("Context terminated: heap limit reached".into())
}

/// Body of a context thread: load the bundle, then serve evaluations until
/// the handle is dropped.
fn run_context(
    source: String,
    generation: u64,
    max_heap_size: Option<usize>,
    ready: SyncSender<Result<(), EngineError>>,
    inbox: Receiver<Evaluation>,
) {
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            let _ = ready.send(Err(EngineError::Runtime(format!(
                "Failed to build event loop: {}",
                e
            ))));
            return;
        }
    };

    let exhausted = Arc::new(AtomicBool::new(false));
    let (mut runtime, loaded) = rt.block_on(async {
        let mut runtime = create_runtime(max_heap_size, exhausted.clone());
        let loaded = runtime
            .execute_script("<bundle>", source)
            .map(|_| ())
            .map_err(classify);
        (runtime, loaded)
    });
    drain_console(&mut runtime, generation);

    let started = loaded.is_ok();
    if ready.send(loaded).is_err() || !started {
        return;
    }

    while let Ok(Evaluation { expression, reply }) = inbox.recv() {
        let result = if exhausted.load(Ordering::SeqCst) {
            Err(heap_exhausted())
        } else {
            let result = rt.block_on(evaluate(&mut runtime, expression));
            if exhausted.load(Ordering::SeqCst) {
                Err(heap_exhausted())
            } else {
                result
            }
        };
        drain_console(&mut runtime, generation);
        let _ = reply.send(result);
    }

    debug!(generation, "execution context stopped");
}

fn create_runtime(max_heap_size: Option<usize>, exhausted: Arc<AtomicBool>) -> JsRuntime {
    let create_params = max_heap_size
        .map(|max_bytes| v8::Isolate::create_params().heap_limits(0, max_bytes));

    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![prerender_host::init_ops_and_esm()],
        create_params,
        ..Default::default()
    });

    // Terminate rather than let V8 abort the process; the pool replaces the
    // context once it reports the runtime error.
    if max_heap_size.is_some() {
        let handle = runtime.v8_isolate().thread_safe_handle();
        runtime.add_near_heap_limit_callback(move |current, initial| {
            warn!(
                current_mb = current / (1024 * 1024),
                initial_mb = initial / (1024 * 1024),
                "near heap limit, terminating context"
            );
            exhausted.store(true, Ordering::SeqCst);
            handle.terminate_execution();
            current * 2
        });
    }

    runtime.op_state().borrow_mut().put(ConsoleOutput::default());
    runtime
}

async fn evaluate(runtime: &mut JsRuntime, expression: String) -> Result<String, EngineError> {
    let value = runtime
        .execute_script("<render>", expression)
        .map_err(classify)?;

    // Settle any promises the render queued.
    runtime
        .run_event_loop(PollEventLoopOptions::default())
        .await
        .map_err(classify)?;

    let scope = &mut runtime.handle_scope();
    let local = v8::Local::new(scope, &value);

    if let Ok(promise) = v8::Local::<v8::Promise>::try_from(local) {
        match promise.state() {
            v8::PromiseState::Fulfilled => {
                let result = promise.result(scope);
                markup_string(scope, result)
            }
            v8::PromiseState::Rejected => {
                let exception = promise.result(scope);
                let reason = exception.to_rust_string_lossy(scope);
                Err(EngineError::Program(format!("Uncaught (in promise) {}", reason)))
            }
            v8::PromiseState::Pending => Err(EngineError::Program(
                "Render returned an unresolved promise".into(),
            )),
        }
    } else {
        markup_string(scope, local)
    }
}

fn markup_string<'s>(
    scope: &mut v8::HandleScope<'s>,
    value: v8::Local<'s, v8::Value>,
) -> Result<String, EngineError> {
    if value.is_string() {
        Ok(value.to_rust_string_lossy(scope))
    } else {
        Err(EngineError::Program("Render did not return a string".into()))
    }
}

/// Script exceptions become program errors; anything else is the host's fault.
fn classify(err: AnyError) -> EngineError {
    match err.downcast_ref::<JsError>() {
        Some(js) => EngineError::Program(js.exception_message.clone()),
        None => EngineError::Runtime(err.to_string()),
    }
}

fn drain_console(runtime: &mut JsRuntime, generation: u64) {
    let output = std::mem::take(
        runtime
            .op_state()
            .borrow_mut()
            .borrow_mut::<ConsoleOutput>(),
    );
    if !output.is_empty() {
        output.emit(generation);
    }
}
