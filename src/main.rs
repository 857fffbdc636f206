//! React Prerender CLI
//!
//! Single-shot mode:
//!   react-prerender <react.js> <components.js> <Component> [props-json]
//!
//! Server mode (persistent process, reads from stdin):
//!   react-prerender --server <react.js> <components.js> [options-json]
//!
//! Protocol (server mode):
//!   Request (stdin):
//!     Hello
//!     {"name":"World"}
//!
//!   Response (stdout):
//!     Status:Ok
//!     Length:18
//!
//!     <div>Hi World</div>
//!
//!   Error response:
//!     Status:Error
//!     Length:42
//!
//!     Encountered error "..." when prerendering Hello with {...}
//!
//! Sending `!reload` as the component line re-reads both source files and
//! starts a new generation.

use anyhow::{anyhow, Result};
use react_prerender::{Renderer, RendererOptions, Source};
use std::io::{BufRead, Write};
use tracing::info;

fn print_usage() {
    eprintln!("React Prerender - pooled server-side rendering of React components");
    eprintln!();
    eprintln!("Single-shot mode:");
    eprintln!("  react-prerender <react.js> <components.js> <Component> [props-json]");
    eprintln!();
    eprintln!("Server mode (persistent process):");
    eprintln!("  react-prerender --server <react.js> <components.js> [options-json]");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  react-prerender ./react.js ./components.js Hello '{{\"name\":\"World\"}}'");
    eprintln!("  react-prerender --server ./react.js ./components.js '{{\"size\":4,\"timeout\":5}}'");
}

fn init_tracing() {
    // Logs go to stderr; stdout carries rendered markup.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Props arrive as text and are handed to the script verbatim; parse only to
/// reject malformed input before it reaches a context.
fn check_props(props_json: &str) -> Result<String> {
    if props_json.is_empty() {
        return Ok("{}".to_string());
    }
    serde_json::from_str::<serde_json::Value>(props_json)
        .map_err(|e| anyhow!("Invalid props JSON: {}", e))?;
    Ok(props_json.to_string())
}

async fn run_single_shot(
    react_path: &str,
    components_path: &str,
    component: &str,
    props_json: Option<&str>,
) -> Result<()> {
    let props = check_props(props_json.unwrap_or_default())?;

    let renderer = Renderer::new();
    renderer.setup(
        Source::file(react_path),
        Source::file(components_path),
        RendererOptions::default().with_size(1),
    )?;

    let html = renderer.render(component, props).await?;
    println!("{}", html);

    renderer.shutdown();
    Ok(())
}

async fn run_server(react_path: &str, components_path: &str, options_json: Option<&str>) -> Result<()> {
    let options = match options_json {
        Some(json) => RendererOptions::from_json(json)?,
        None => RendererOptions::default(),
    };

    let renderer = Renderer::new();
    renderer.setup(
        Source::file(react_path),
        Source::file(components_path),
        options.clone(),
    )?;

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut reader = stdin.lock();

    info!("server ready, reading from stdin");

    loop {
        let mut component_line = String::new();
        let mut props_line = String::new();

        // Component (line 1)
        let bytes_read = reader.read_line(&mut component_line)?;
        if bytes_read == 0 {
            // EOF - stdin closed, exit gracefully
            break;
        }
        let component = component_line.trim();

        if component == "!reload" {
            match renderer.setup(
                Source::file(react_path),
                Source::file(components_path),
                options.clone(),
            ) {
                Ok(generation) => write_response(&mut stdout, true, &format!("generation {}", generation))?,
                Err(e) => write_response(&mut stdout, false, &e.to_string())?,
            }
            continue;
        }

        // Props JSON (line 2)
        reader.read_line(&mut props_line)?;
        let props = match check_props(props_line.trim()) {
            Ok(props) => props,
            Err(e) => {
                write_response(&mut stdout, false, &e.to_string())?;
                continue;
            }
        };

        match renderer.render(component, props).await {
            Ok(html) => write_response(&mut stdout, true, html.as_str())?,
            Err(e) => write_response(&mut stdout, false, &e.to_string())?,
        }
    }

    info!("server shutting down");
    renderer.shutdown();
    Ok(())
}

/// Write response in length-prefixed protocol
fn write_response(stdout: &mut std::io::Stdout, ok: bool, body: &str) -> Result<()> {
    let status = if ok { "Ok" } else { "Error" };

    writeln!(stdout, "Status:{}", status)?;
    writeln!(stdout, "Length:{}", body.len())?;
    writeln!(stdout)?; // Empty line separator
    write!(stdout, "{}", body)?;
    stdout.flush()?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Err(anyhow!("Missing required arguments"));
    }

    // Check for server mode
    if args[1] == "--server" {
        if args.len() < 4 {
            print_usage();
            return Err(anyhow!("Server mode requires react and components paths"));
        }
        return run_server(&args[2], &args[3], args.get(4).map(|s| s.as_str())).await;
    }

    // Single-shot mode
    if args.len() < 4 {
        print_usage();
        return Err(anyhow!("Missing required arguments"));
    }

    run_single_shot(&args[1], &args[2], &args[3], args.get(4).map(|s| s.as_str())).await
}
