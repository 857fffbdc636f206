//! Renders against real V8 isolates with a small React stand-in.

use react_prerender::{
    EngineOptions, RenderError, Renderer, RendererOptions, SetupError, Source, V8Engine,
};
use serde_json::json;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

/// Enough of React for string rendering: elements, function components,
/// text escaping. Exposed as a global the way UMD builds do.
const MINI_REACT: &str = r#"
(function (root) {
  function escape(text) {
    return String(text).replace(/&/g, '&amp;').replace(/</g, '&lt;').replace(/>/g, '&gt;');
  }
  function render(node) {
    if (node === null || node === undefined || node === false) return '';
    if (typeof node === 'string' || typeof node === 'number') return escape(node);
    if (Array.isArray(node)) return node.map(render).join('');
    if (typeof node.type === 'function') {
      var props = Object.assign({}, node.props, { children: node.children });
      return render(node.type(props));
    }
    return '<' + node.type + '>' + node.children.map(render).join('') + '</' + node.type + '>';
  }
  root.React = {
    createElement: function (type, props) {
      return { type: type, props: props || {}, children: Array.prototype.slice.call(arguments, 2) };
    },
    renderToString: render
  };
})(this);
"#;

const COMPONENTS: &str = r#"
function Hello(props) {
  return React.createElement('div', null, 'Hi ' + props.name);
}
function Echo(props) {
  return React.createElement('p', null, props.text);
}
function Broken(props) {
  throw new Error('kaboom ' + props.id);
}
function Noisy(props) {
  console.log('rendering', props);
  console.warn('deprecated prop');
  console.info('info');
  console.error('oops');
  return React.createElement('span', null, 'ok');
}
function Host() {
  var same = (window === global) && (self === global);
  var id = crypto.randomUUID();
  var bytes = crypto.getRandomValues(new Uint8Array(8));
  return React.createElement('i', null, [same, id.length, bytes.length, btoa('hi'), atob('aGk=')].join(','));
}
"#;

fn renderer(options: RendererOptions) -> Renderer {
    let renderer = Renderer::new();
    renderer.setup(MINI_REACT, COMPONENTS, options).unwrap();
    renderer
}

#[tokio::test]
async fn test_renders_hello_world() {
    let renderer = renderer(RendererOptions::default().with_size(1));
    let html = renderer.render("Hello", json!({"name": "World"})).await.unwrap();
    assert_eq!(html.as_str(), "<div>Hi World</div>");
}

#[tokio::test]
async fn test_raw_props_are_not_reencoded() {
    let renderer = renderer(RendererOptions::default().with_size(1));
    let html = renderer
        .render("Echo", r#"{"text":"say \"hi\""}"#)
        .await
        .unwrap();
    assert_eq!(html.as_str(), r#"<p>say "hi"</p>"#);
}

#[tokio::test]
async fn test_script_error_becomes_prerender_error() {
    let renderer = renderer(RendererOptions::default().with_size(1));
    renderer.render("Hello", json!({"name": "a"})).await.unwrap();
    let before = renderer.status().unwrap();

    let err = renderer.render("Broken", json!({"id": 42})).await.unwrap_err();
    let RenderError::Prerender(prerender) = &err else {
        panic!("expected prerender error, got {err:?}");
    };
    assert_eq!(prerender.component, "Broken");
    assert_eq!(prerender.props, r#"{"id":42}"#);
    assert!(prerender.message.contains("kaboom 42"));
    assert!(err
        .to_string()
        .starts_with("Encountered error \"Uncaught Error: kaboom 42"));

    // Same context, still usable.
    assert_eq!(renderer.status().unwrap(), before);
    let html = renderer.render("Hello", json!({"name": "b"})).await.unwrap();
    assert_eq!(html.as_str(), "<div>Hi b</div>");
}

#[tokio::test]
async fn test_unknown_component_is_a_script_error() {
    let renderer = renderer(RendererOptions::default().with_size(1));
    let err = renderer.render("Missing", "{}").await.unwrap_err();
    match err {
        RenderError::Prerender(e) => assert!(e.message.contains("Missing")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_syntax_error_fails_compilation() {
    let renderer = Renderer::new();
    renderer
        .setup(MINI_REACT, "function Oops( {", RendererOptions::default().with_size(1))
        .unwrap();

    let err = renderer.render("Hello", "{}").await.unwrap_err();
    assert!(matches!(err, RenderError::Compilation(ref msg) if msg.contains("SyntaxError")));
}

#[tokio::test]
async fn test_console_and_host_globals() {
    let renderer = renderer(RendererOptions::default().with_size(1));

    let html = renderer.render("Noisy", json!({"a": 1})).await.unwrap();
    assert_eq!(html.as_str(), "<span>ok</span>");

    let html = renderer.render("Host", "{}").await.unwrap();
    assert_eq!(html.as_str(), "<i>true,36,8,aGk=,hi</i>");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_renders_share_bounded_pool() {
    let renderer = std::sync::Arc::new(renderer(RendererOptions::default().with_size(2)));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let renderer = renderer.clone();
            tokio::spawn(async move { renderer.render("Hello", json!({"name": i})).await })
        })
        .collect();

    for (i, result) in futures::future::join_all(tasks).await.into_iter().enumerate() {
        assert_eq!(result.unwrap().unwrap().as_str(), format!("<div>Hi {}</div>", i));
    }

    let status = renderer.status().unwrap();
    assert_eq!(status.checked_out, 0);
    assert!(status.idle <= 2);
}

#[tokio::test]
async fn test_hot_reload_from_files() {
    let dir = tempdir().unwrap();
    let react = dir.path().join("react.js");
    let components = dir.path().join("components.js");
    fs::write(&react, MINI_REACT).unwrap();
    fs::write(
        &components,
        "function Hello(p) { return React.createElement('b', null, 'v1 ' + p.name); }",
    )
    .unwrap();

    let renderer = Renderer::new();
    let first = renderer
        .setup(Source::file(&react), Source::file(&components), RendererOptions::default())
        .unwrap();
    let html = renderer.render("Hello", json!({"name": "x"})).await.unwrap();
    assert_eq!(html.as_str(), "<b>v1 x</b>");

    fs::write(
        &components,
        "function Hello(p) { return React.createElement('b', null, 'v2 ' + p.name); }",
    )
    .unwrap();
    let second = renderer
        .setup(Source::file(&react), Source::file(&components), RendererOptions::default())
        .unwrap();
    assert!(second > first);

    let html = renderer.render("Hello", json!({"name": "x"})).await.unwrap();
    assert_eq!(html.as_str(), "<b>v2 x</b>");
}

#[tokio::test]
async fn test_setup_rejects_missing_file() {
    let renderer = Renderer::new();
    let err = renderer
        .setup(
            MINI_REACT,
            Source::file("/definitely/not/here.js"),
            RendererOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, SetupError::Source { .. }));
    assert!(matches!(
        renderer.render("Hello", "{}").await,
        Err(RenderError::NotConfigured)
    ));
}

#[tokio::test]
async fn test_custom_engine_options() {
    let renderer = Renderer::with_engine(V8Engine::new(EngineOptions {
        max_heap_size: None,
    }));
    renderer
        .setup(
            MINI_REACT,
            COMPONENTS,
            RendererOptions::default()
                .with_size(1)
                .with_timeout(Duration::from_secs(5)),
        )
        .unwrap();
    let html = renderer.render("Hello", json!({"name": "heap"})).await.unwrap();
    assert_eq!(html.as_str(), "<div>Hi heap</div>");
}
