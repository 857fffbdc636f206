//! Host ops available to rendered scripts.
//!
//! Components and their libraries occasionally log, generate ids or
//! base64-encode. A bare V8 isolate offers none of that, so every context
//! loads this extension before the bundle.

use deno_core::error::AnyError;
use deno_core::{op2, OpState};
use tracing::{debug, error, warn};

/// Target under which script console output is logged.
pub const CONSOLE_TARGET: &str = "react_prerender::console";

// ============================================================================
// Console
// ============================================================================

/// Console output captured since the last drain.
#[derive(Debug, Default, Clone)]
pub struct ConsoleOutput {
    pub logs: Vec<String>,
    pub warns: Vec<String>,
    pub errors: Vec<String>,
}

impl ConsoleOutput {
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty() && self.warns.is_empty() && self.errors.is_empty()
    }

    /// Forward captured lines to the log.
    pub fn emit(self, generation: u64) {
        for line in self.logs {
            debug!(target: CONSOLE_TARGET, generation, "{}", line);
        }
        for line in self.warns {
            warn!(target: CONSOLE_TARGET, generation, "{}", line);
        }
        for line in self.errors {
            error!(target: CONSOLE_TARGET, generation, "{}", line);
        }
    }
}

#[op2(fast)]
fn op_console_log(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.logs.push(msg.to_string());
    }
}

#[op2(fast)]
fn op_console_warn(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.warns.push(msg.to_string());
    }
}

#[op2(fast)]
fn op_console_error(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.errors.push(msg.to_string());
    }
}

// ============================================================================
// Crypto / encoding
// ============================================================================

#[op2]
#[string]
fn op_crypto_random_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[op2(fast)]
fn op_crypto_get_random_values(#[buffer] buf: &mut [u8]) {
    use rand::RngCore;
    rand::thread_rng().fill_bytes(buf);
}

#[op2]
#[string]
fn op_btoa(#[string] data: &str) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data.as_bytes())
}

#[op2]
#[string]
fn op_atob(#[string] data: &str) -> Result<String, AnyError> {
    decode_base64(data)
}

fn decode_base64(data: &str) -> Result<String, AnyError> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| anyhow::anyhow!("Invalid base64: {}", e))?;
    String::from_utf8(bytes).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in decoded data: {}", e))
}

deno_core::extension!(
    prerender_host,
    ops = [
        op_console_log,
        op_console_warn,
        op_console_error,
        op_crypto_random_uuid,
        op_crypto_get_random_values,
        op_btoa,
        op_atob,
    ],
    esm_entry_point = "ext:prerender_host/bootstrap.js",
    esm = ["ext:prerender_host/bootstrap.js" = "src/bootstrap.js"],
);
