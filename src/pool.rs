//! Bounded pool of lazily compiled execution contexts.
//!
//! A tokio semaphore with `size` permits bounds how many contexts are checked
//! out. Holding a permit entitles the holder to either an idle context or to
//! build a new one, so `idle + checked_out + unbuilt == size` always holds.
//! The slot mutex is only held for bookkeeping, never while compiling or
//! evaluating.

use crate::bundle::Bundle;
use crate::engine::{Engine, EngineError, ScriptContext};
use crate::error::PoolError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, warn};

/// Snapshot of the pool's slot accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub size: usize,
    pub idle: usize,
    pub checked_out: usize,
    pub unbuilt: usize,
}

struct Slots<C> {
    idle: Vec<C>,
    /// Contexts that exist or are being compiled.
    built: usize,
    shut_down: bool,
    /// Set once the bundle is known not to compile.
    broken: Option<String>,
}

/// Pool of execution contexts compiled from one bundle.
pub struct ContextPool<E: Engine> {
    engine: Arc<E>,
    bundle: Bundle,
    size: usize,
    slots: Mutex<Slots<E::Context>>,
    permits: Arc<Semaphore>,
}

impl<E: Engine> ContextPool<E> {
    /// Create an empty pool. Contexts are compiled on demand.
    pub fn new(engine: Arc<E>, bundle: Bundle, size: usize) -> Self {
        Self {
            engine,
            bundle,
            size,
            slots: Mutex::new(Slots {
                idle: Vec::new(),
                built: 0,
                shut_down: false,
                broken: None,
            }),
            permits: Arc::new(Semaphore::new(size)),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn generation(&self) -> u64 {
        self.bundle.generation()
    }

    pub fn status(&self) -> PoolStatus {
        let slots = self.lock_slots();
        PoolStatus {
            size: self.size,
            idle: slots.idle.len(),
            checked_out: slots.built - slots.idle.len(),
            unbuilt: self.size - slots.built,
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock_slots().shut_down
    }

    /// Borrow a context exclusively, waiting at most `timeout` for one.
    ///
    /// The context goes back to the pool when the returned guard is dropped.
    pub async fn checkout(self: &Arc<Self>, timeout: Duration) -> Result<PooledContext<E>, PoolError> {
        self.check_usable()?;

        let permit = match tokio::time::timeout(timeout, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PoolError::Shutdown),
            Err(_) => {
                warn!(
                    generation = self.generation(),
                    timeout_ms = timeout.as_millis() as u64,
                    "timed out waiting for a render context"
                );
                return Err(PoolError::Timeout(timeout));
            }
        };

        {
            let mut slots = self.lock_slots();
            if slots.shut_down {
                return Err(PoolError::Shutdown);
            }
            if let Some(msg) = &slots.broken {
                return Err(PoolError::Compilation(msg.clone()));
            }
            if let Some(context) = slots.idle.pop() {
                return Ok(PooledContext::new(context, self.clone(), permit));
            }
            slots.built += 1;
        }

        let reservation = Reservation { pool: &**self, armed: true };
        let context = self.compile().await?;
        reservation.keep();

        Ok(PooledContext::new(context, self.clone(), permit))
    }

    /// Stop handing out contexts and destroy the idle ones.
    ///
    /// Contexts currently checked out are destroyed when they come back.
    pub fn shutdown(&self) {
        self.permits.close();
        let drained = {
            let mut slots = self.lock_slots();
            slots.shut_down = true;
            let drained = std::mem::take(&mut slots.idle);
            slots.built -= drained.len();
            drained
        };
        debug!(
            generation = self.generation(),
            destroyed = drained.len(),
            "context pool shut down"
        );
    }

    async fn compile(&self) -> Result<E::Context, PoolError> {
        let generation = self.generation();
        debug!(generation, "compiling execution context");

        let engine = self.engine.clone();
        let bundle = self.bundle.clone();
        let compiled = tokio::task::spawn_blocking(move || engine.compile(&bundle))
            .await
            .map_err(|e| PoolError::Engine(format!("context compilation panicked: {}", e)))?;

        match compiled {
            Ok(context) => Ok(context),
            Err(EngineError::Program(msg)) => {
                error!(generation, error = %msg, "bundle failed to compile");
                self.lock_slots().broken = Some(msg.clone());
                Err(PoolError::Compilation(msg))
            }
            Err(EngineError::Runtime(msg)) => {
                error!(generation, error = %msg, "failed to start execution context");
                Err(PoolError::Engine(msg))
            }
        }
    }

    fn check_usable(&self) -> Result<(), PoolError> {
        let slots = self.lock_slots();
        if slots.shut_down {
            return Err(PoolError::Shutdown);
        }
        match &slots.broken {
            Some(msg) => Err(PoolError::Compilation(msg.clone())),
            None => Ok(()),
        }
    }

    fn release(&self, context: E::Context) {
        let mut slots = self.lock_slots();
        if slots.shut_down {
            slots.built -= 1;
            drop(slots);
            drop(context);
            return;
        }
        slots.idle.push(context);
    }

    fn forget(&self) {
        self.lock_slots().built -= 1;
    }

    fn lock_slots(&self) -> MutexGuard<'_, Slots<E::Context>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Gives a slot back if the build it was reserved for does not finish,
/// including when the checkout future is dropped mid-compile.
struct Reservation<'a, E: Engine> {
    pool: &'a ContextPool<E>,
    armed: bool,
}

impl<E: Engine> Reservation<'_, E> {
    fn keep(mut self) {
        self.armed = false;
    }
}

impl<E: Engine> Drop for Reservation<'_, E> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.forget();
        }
    }
}

/// Exclusive hold on one context. Returns it to the pool when dropped.
pub struct PooledContext<E: Engine> {
    context: Option<E::Context>,
    pool: Arc<ContextPool<E>>,
    _permit: OwnedSemaphorePermit,
}

impl<E: Engine> PooledContext<E> {
    fn new(context: E::Context, pool: Arc<ContextPool<E>>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            context: Some(context),
            pool,
            _permit: permit,
        }
    }

    pub fn generation(&self) -> u64 {
        self.pool.generation()
    }

    pub fn evaluate(&mut self, expression: &str) -> Result<String, EngineError> {
        match self.context.as_mut() {
            Some(context) => context.evaluate(expression),
            None => Err(EngineError::Runtime("context already released".into())),
        }
    }

    /// Destroy the context instead of returning it; its slot is rebuilt on a
    /// later checkout.
    pub fn discard(mut self) {
        if let Some(context) = self.context.take() {
            self.pool.forget();
            drop(context);
            debug!(generation = self.generation(), "discarded execution context");
        }
    }
}

impl<E: Engine> Drop for PooledContext<E> {
    fn drop(&mut self) {
        // Runs before `_permit` is released, so the woken waiter finds the
        // context on the idle stack.
        if let Some(context) = self.context.take() {
            self.pool.release(context);
        }
    }
}
