use boa_engine::{Context, Source};
use printbridge::interceptor::{script, InterceptorOptions, MessageTransport};

const FAKE_DOM: &str = r#"
var sink = [];
var originalCalls = 0;
var observers = [];

function makeFrame(text) {
  var win = {
    document: {
      documentElement: { outerHTML: '<html><body>' + text + '</body></html>' },
      activeElement: null,
      querySelectorAll: function () { return []; }
    },
    print: function () { originalCalls++; }
  };
  var frame = {
    tagName: 'IFRAME',
    contentWindow: win,
    listeners: 0,
    addEventListener: function () { this.listeners++; }
  };
  return frame;
}

var iframe = makeFrame('frame');
var window = {
  ipc: { postMessage: function (m) { sink.push(m); } },
  document: {
    documentElement: { outerHTML: '<html><body><p>Receipt</p></body></html>' },
    activeElement: null,
    querySelectorAll: function () { return [iframe]; }
  },
  print: function () { originalCalls++; },
  console: { warn: function () {} },
  MutationObserver: function (callback) {
    observers.push(callback);
    this.observe = function () {};
  }
};
window.parent = window;
iframe.contentWindow.parent = window;

function last() { return JSON.parse(sink[sink.length - 1]); }
"#;

fn context_with(script_text: &str) -> Context {
    let mut ctx = Context::default();
    ctx.eval(Source::from_bytes(FAKE_DOM.as_bytes()))
        .expect("fake DOM evaluates");
    ctx.eval(Source::from_bytes(script_text.as_bytes()))
        .expect("interceptor evaluates");
    ctx
}

fn eval_bool(ctx: &mut Context, code: &str) -> bool {
    let value = ctx
        .eval(Source::from_bytes(code.as_bytes()))
        .unwrap_or_else(|e| panic!("{} threw: {}", code, e));
    value
        .as_boolean()
        .unwrap_or_else(|| panic!("{} is not a boolean", code))
}

fn eval_number(ctx: &mut Context, code: &str) -> f64 {
    let value = ctx
        .eval(Source::from_bytes(code.as_bytes()))
        .unwrap_or_else(|e| panic!("{} threw: {}", code, e));
    value
        .as_number()
        .unwrap_or_else(|| panic!("{} is not a number", code))
}

fn default_script() -> String {
    script(&InterceptorOptions::default())
}

#[test]
fn print_posts_document_markup_once_even_when_installed_twice() {
    let code = default_script();
    let mut ctx = context_with(&code);
    ctx.eval(Source::from_bytes(code.as_bytes())).unwrap();

    ctx.eval(Source::from_bytes("window.print();".as_bytes())).unwrap();

    assert_eq!(eval_number(&mut ctx, "sink.length"), 1.0);
    assert_eq!(eval_number(&mut ctx, "originalCalls"), 0.0);
    assert!(eval_bool(&mut ctx, "last().type === 'print'"));
    assert!(eval_bool(&mut ctx, "last().html.indexOf('<p>Receipt</p>') >= 0"));
    assert_eq!(eval_number(&mut ctx, "iframe.listeners"), 1.0);
}

#[test]
fn existing_frames_are_hooked() {
    let mut ctx = context_with(&default_script());

    ctx.eval(Source::from_bytes("iframe.contentWindow.print();".as_bytes()))
        .unwrap();

    assert_eq!(eval_number(&mut ctx, "sink.length"), 1.0);
    assert!(eval_bool(&mut ctx, "last().html.indexOf('frame') >= 0"));
    assert_eq!(eval_number(&mut ctx, "originalCalls"), 0.0);
}

#[test]
fn focused_frame_is_captured_from_top_level_print() {
    let mut ctx = context_with(&default_script());

    ctx.eval(Source::from_bytes(
        "window.document.activeElement = iframe; window.print();".as_bytes(),
    ))
    .unwrap();

    assert!(eval_bool(&mut ctx, "last().html.indexOf('frame') >= 0"));
    assert!(eval_bool(&mut ctx, "last().html.indexOf('Receipt') < 0"));
}

#[test]
fn frames_added_later_are_hooked() {
    let mut ctx = context_with(&default_script());
    assert_eq!(eval_number(&mut ctx, "observers.length"), 1.0);

    ctx.eval(Source::from_bytes(
        r#"
        var late = makeFrame('late');
        late.contentWindow.parent = window;
        observers[0]([{ addedNodes: [late] }]);
        late.contentWindow.print();
        "#
        .as_bytes(),
    ))
    .unwrap();

    assert_eq!(eval_number(&mut ctx, "sink.length"), 1.0);
    assert!(eval_bool(&mut ctx, "last().html.indexOf('late') >= 0"));
}

#[test]
fn unreadable_document_posts_null_markup() {
    let mut ctx = context_with(&default_script());

    ctx.eval(Source::from_bytes(
        r#"
        Object.defineProperty(window.document, 'documentElement', {
          get: function () { throw new Error('SecurityError'); }
        });
        window.print();
        "#
        .as_bytes(),
    ))
    .unwrap();

    assert_eq!(eval_number(&mut ctx, "sink.length"), 1.0);
    assert!(eval_bool(&mut ctx, "last().html === null"));
}

#[test]
fn missing_channel_falls_back_to_original_print() {
    let mut ctx = context_with(&default_script());

    ctx.eval(Source::from_bytes("delete window.ipc; window.print();".as_bytes()))
        .unwrap();

    assert_eq!(eval_number(&mut ctx, "sink.length"), 0.0);
    assert_eq!(eval_number(&mut ctx, "originalCalls"), 1.0);
}

#[test]
fn legacy_handler_forwards_markup() {
    let mut ctx = context_with(&default_script());

    ctx.eval(Source::from_bytes(
        "window.flutter_inappwebview.callHandler('printHandler', '<p>Legacy</p>');".as_bytes(),
    ))
    .unwrap();
    assert!(eval_bool(&mut ctx, "last().html === '<p>Legacy</p>'"));

    ctx.eval(Source::from_bytes(
        "window.flutter_inappwebview.callHandler('printHandler', '   ');".as_bytes(),
    ))
    .unwrap();
    assert!(eval_bool(&mut ctx, "last().html === null"));

    ctx.eval(Source::from_bytes(
        "window.flutter_inappwebview.callHandler('otherHandler', 'x');".as_bytes(),
    ))
    .unwrap();
    assert_eq!(eval_number(&mut ctx, "sink.length"), 2.0);
}

#[test]
fn webkit_transport_uses_named_handler() {
    let code = script(&InterceptorOptions {
        transport: MessageTransport::WebKit {
            handler: "printbridge".into(),
        },
        legacy_handler: false,
    });
    let mut ctx = context_with(&code);

    ctx.eval(Source::from_bytes(
        r#"
        var posted = [];
        window.webkit = { messageHandlers: { printbridge: { postMessage: function (m) { posted.push(m); } } } };
        window.print();
        "#
        .as_bytes(),
    ))
    .unwrap();

    assert_eq!(eval_number(&mut ctx, "posted.length"), 1.0);
    assert_eq!(eval_number(&mut ctx, "sink.length"), 0.0);
    assert!(eval_bool(&mut ctx, "window.flutter_inappwebview === undefined"));
}

#[test]
fn unreadable_focused_frame_posts_null_markup() {
    let mut ctx = context_with(&default_script());

    ctx.eval(Source::from_bytes(
        r#"
        var foreign = { tagName: 'IFRAME', contentWindow: {}, addEventListener: function () {} };
        Object.defineProperty(foreign.contentWindow, 'document', {
          get: function () { throw new Error('SecurityError'); }
        });
        window.document.activeElement = foreign;
        window.print();
        "#
        .as_bytes(),
    ))
    .unwrap();

    assert_eq!(eval_number(&mut ctx, "sink.length"), 1.0);
    assert!(eval_bool(&mut ctx, "last().html === null"));
}

#[test]
fn detached_focused_frame_posts_null_markup() {
    let mut ctx = context_with(&default_script());

    ctx.eval(Source::from_bytes(
        r#"
        window.document.activeElement = { tagName: 'IFRAME', contentWindow: null };
        window.print();
        "#
        .as_bytes(),
    ))
    .unwrap();

    assert!(eval_bool(&mut ctx, "last().html === null"));
}

#[test]
fn nested_focused_frames_capture_the_innermost() {
    let mut ctx = context_with(&default_script());

    ctx.eval(Source::from_bytes(
        r#"
        var middle = makeFrame('middle');
        var inner = makeFrame('inner');
        middle.contentWindow.document.activeElement = inner;
        window.document.activeElement = middle;
        window.print();
        "#
        .as_bytes(),
    ))
    .unwrap();

    assert!(eval_bool(&mut ctx, "last().html.indexOf('inner') >= 0"));
    assert!(eval_bool(&mut ctx, "last().html.indexOf('middle') < 0"));
}

#[test]
fn rescanned_frame_gets_one_load_listener() {
    let mut ctx = context_with(&default_script());

    ctx.eval(Source::from_bytes(
        r#"
        observers[0]([{ addedNodes: [iframe] }]);
        observers[0]([{ addedNodes: [iframe] }]);
        "#
        .as_bytes(),
    ))
    .unwrap();

    assert_eq!(eval_number(&mut ctx, "iframe.listeners"), 1.0);
}
