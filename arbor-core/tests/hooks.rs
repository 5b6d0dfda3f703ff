//! Integration Tests for Hooks and Effects
//!
//! These tests verify that state persists across passes, that setters only
//! re-render on change, and that effects run deferred, gated by their
//! dependencies, with cleanups paired to runs and unmounts.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use arbor_core::{
    component, deps, host, Child, Cleanup, Error, HookContext, MemoryDocument, Props, Renderer,
    RendererConfig, StateSetter, TargetNode,
};

thread_local! {
    static LOG: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    static RENDERS: Cell<usize> = const { Cell::new(0) };
    static SETTERS: RefCell<Vec<StateSetter<i64>>> = const { RefCell::new(Vec::new()) };
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn log(entry: impl Into<String>) {
    LOG.with(|log| log.borrow_mut().push(entry.into()));
}

fn take_log() -> Vec<String> {
    LOG.with(|log| std::mem::take(&mut *log.borrow_mut()))
}

fn renders() -> usize {
    RENDERS.with(Cell::get)
}

fn count_render() {
    RENDERS.with(|r| r.set(r.get() + 1));
}

fn last_setter() -> StateSetter<i64> {
    SETTERS.with(|s| s.borrow().last().cloned().expect("a setter was recorded"))
}

fn setup() -> (MemoryDocument, TargetNode, Renderer) {
    setup_with(RendererConfig::default())
}

fn setup_with(config: RendererConfig) -> (MemoryDocument, TargetNode, Renderer) {
    init_tracing();
    let doc = MemoryDocument::new();
    let root = doc.create_root("main");
    let renderer = Renderer::with_config(Rc::new(doc.clone()), config);
    (doc, root, renderer)
}

fn counter(cx: &mut HookContext<'_>, _props: &Props) -> Child {
    count_render();
    let (count, set_count) = cx.use_state(0_i64);
    SETTERS.with(|s| s.borrow_mut().push(set_count.clone()));
    host(
        "button",
        Props::new().on("onClick", move |_| set_count.update(|c| c + 1)),
        vec![count.into()],
    )
    .into()
}

fn once(cx: &mut HookContext<'_>, _props: &Props) -> Child {
    cx.use_effect(deps![], || {
        log("mount");
        Some(Cleanup::new(|| log("unmount")))
    });
    Child::empty()
}

fn watcher(cx: &mut HookContext<'_>, props: &Props) -> Child {
    let key = props.int("key").unwrap_or(0);
    cx.use_effect(deps![key], move || {
        log(format!("run {key}"));
        Some(Cleanup::new(move || log(format!("cleanup {key}"))))
    });
    host("span", Props::new(), vec![key.into()]).into()
}

fn every_pass(cx: &mut HookContext<'_>, _props: &Props) -> Child {
    cx.use_effect(None, || {
        log("effect");
        None
    });
    Child::empty()
}

fn conditional(cx: &mut HookContext<'_>, props: &Props) -> Child {
    if props.bool("extra").unwrap_or(false) {
        cx.use_state(1_i64);
    }
    let (value, _) = cx.use_state(0_i64);
    value.into()
}

fn climber(cx: &mut HookContext<'_>, props: &Props) -> Child {
    count_render();
    let limit = props.int("limit").unwrap_or(3);
    let (value, set_value) = cx.use_state(0_i64);
    if value < limit {
        let _ = set_value.set(value + 1);
    }
    value.into()
}

fn loader(cx: &mut HookContext<'_>, _props: &Props) -> Child {
    let (status, set_status) = cx.use_state(String::from("loading"));
    cx.use_effect(deps![], move || {
        let _ = set_status.set(String::from("ready"));
        None
    });
    status.into()
}

fn badge(cx: &mut HookContext<'_>, _props: &Props) -> Child {
    let (count, set_count) = cx.use_state(0_i64);
    SETTERS.with(|s| s.borrow_mut().push(set_count));
    cx.use_effect(deps![], || {
        log("badge run");
        Some(Cleanup::new(|| log("badge clean")))
    });
    host("b", Props::new(), vec![count.into()]).into()
}

fn label(cx: &mut HookContext<'_>, _props: &Props) -> Child {
    let (count, _) = cx.use_state(0_i64);
    cx.use_effect(deps![], || {
        log("label run");
        None
    });
    host("i", Props::new(), vec![count.into()]).into()
}

/// Test that state persists across passes and setters are stable.
#[test]
fn state_persists_across_passes() {
    let (doc, root, renderer) = setup();
    renderer.render(component(counter, Props::new(), vec![]), root).unwrap();
    let button = doc.find_by_tag(root, "button")[0];

    doc.fire(button, "click").unwrap();
    doc.fire(button, "click").unwrap();

    assert_eq!(doc.text_content(root), "2");
    assert_eq!(renders(), 3);

    // every pass handed out a setter for the same slot
    let setters = SETTERS.with(|s| s.borrow().clone());
    assert_eq!(setters.len(), 3);
    assert!(setters.windows(2).all(|pair| pair[0] == pair[1]));
}

/// Test that setting an equal value does not re-render.
#[test]
fn equal_value_is_a_no_op() {
    let (doc, root, renderer) = setup();
    renderer.render(component(counter, Props::new(), vec![]), root).unwrap();
    let button = doc.find_by_tag(root, "button")[0];
    doc.fire(button, "click").unwrap();
    assert_eq!(renders(), 2);

    last_setter().set(1).unwrap();
    assert_eq!(renders(), 2);

    last_setter().set(7).unwrap();
    assert_eq!(renders(), 3);
    assert_eq!(doc.text_content(root), "7");
}

/// Test that an effect with empty dependencies runs once after mount and
/// cleans up once at unmount.
#[test]
fn effect_runs_once_after_mount() {
    let (_doc, root, renderer) = setup();
    let app = || host("div", Props::new(), vec![component(once, Props::new(), vec![]).into()]);
    renderer.render(app(), root).unwrap();

    // deferred: nothing has run yet
    assert!(take_log().is_empty());
    assert_eq!(renderer.flush_effects().unwrap(), 1);
    assert_eq!(take_log(), ["mount"]);

    renderer.update_root(app()).unwrap();
    renderer.update_root(app()).unwrap();
    assert_eq!(renderer.flush_effects().unwrap(), 0);
    assert!(take_log().is_empty());

    renderer.unmount_root().unwrap();
    assert_eq!(take_log(), ["unmount"]);
}

/// Test that dependencies gate re-runs and cleanups precede them.
#[test]
fn dependencies_gate_reruns() {
    let (_doc, root, renderer) = setup();
    let app = |key: i64| component(watcher, Props::new().with("key", key), vec![]);

    renderer.render(app(1), root).unwrap();
    renderer.flush_effects().unwrap();
    assert_eq!(take_log(), ["run 1"]);

    renderer.update_root(app(1)).unwrap();
    assert_eq!(renderer.flush_effects().unwrap(), 0);
    assert!(take_log().is_empty());

    renderer.update_root(app(2)).unwrap();
    renderer.flush_effects().unwrap();
    assert_eq!(take_log(), ["cleanup 1", "run 2"]);

    renderer.unmount_root().unwrap();
    assert_eq!(take_log(), ["cleanup 2"]);
}

/// Test that superseded effect runs are skipped.
#[test]
fn stale_effect_tasks_are_skipped() {
    let (_doc, root, renderer) = setup();
    let app = || component(every_pass, Props::new(), vec![]);

    renderer.render(app(), root).unwrap();
    renderer.update_root(app()).unwrap();
    renderer.update_root(app()).unwrap();
    assert_eq!(renderer.pending_effects(), 3);

    assert_eq!(renderer.flush_effects().unwrap(), 1);
    assert_eq!(take_log(), ["effect"]);
}

/// Test that effects of an instance unmounted before they ran never run.
#[test]
fn unmounted_instances_run_no_effects() {
    let (_doc, root, renderer) = setup();
    renderer.render(component(once, Props::new(), vec![]), root).unwrap();
    renderer.unmount_root().unwrap();

    assert_eq!(renderer.flush_effects().unwrap(), 0);
    assert!(take_log().is_empty());
}

/// Test that cleanups run for components nested below host elements.
#[test]
fn nested_component_cleanups_run() {
    let (doc, root, renderer) = setup();
    let nested = host(
        "section",
        Props::new(),
        vec![host("div", Props::new(), vec![component(once, Props::new(), vec![]).into()]).into()],
    );
    renderer.render(nested, root).unwrap();
    renderer.flush_effects().unwrap();
    assert_eq!(take_log(), ["mount"]);

    renderer.update_root(host("section", Props::new(), vec![])).unwrap();
    assert_eq!(take_log(), ["unmount"]);
    assert_eq!(doc.to_html(root), "<main><section></section></main>");
}

/// Test that a changed hook count is reported as a hook-order violation.
#[test]
fn hook_order_violation_is_reported() {
    let (_doc, root, renderer) = setup();
    renderer.render(component(conditional, Props::new(), vec![]), root).unwrap();

    let err = renderer
        .update_root(component(conditional, Props::new().with("extra", true), vec![]))
        .unwrap_err();
    assert!(matches!(err, Error::HookOrder { .. }));
}

/// Test that setters called during render re-render after the pass.
#[test]
fn setter_during_render_is_deferred() {
    let (doc, root, renderer) = setup();
    renderer.render(component(climber, Props::new(), vec![]), root).unwrap();

    assert_eq!(doc.text_content(root), "3");
    assert_eq!(renders(), 4);
}

/// Test that runaway updates are cut off.
#[test]
fn runaway_updates_are_reported() {
    let config = RendererConfig::default().with_max_update_rounds(5);
    let (_doc, root, renderer) = setup_with(config);

    let err = renderer
        .render(component(climber, Props::new().with("limit", i64::MAX), vec![]), root)
        .unwrap_err();
    assert!(matches!(err, Error::UpdateLoop(5)));
}

/// Test that a setter called from an effect re-renders.
#[test]
fn effect_can_update_state() {
    let (doc, root, renderer) = setup();
    renderer.render(component(loader, Props::new(), vec![]), root).unwrap();
    assert_eq!(doc.text_content(root), "loading");

    renderer.flush_effects().unwrap();
    assert_eq!(doc.text_content(root), "ready");
}

/// Test that setters of unmounted instances do nothing.
#[test]
fn stale_setter_is_inert() {
    let (doc, root, renderer) = setup();
    renderer.render(component(counter, Props::new(), vec![]), root).unwrap();
    let setter = last_setter();
    assert!(setter.is_live());

    renderer.unmount_root().unwrap();
    assert!(!setter.is_live());
    setter.set(9).unwrap();
    assert_eq!(setter.get(), None);
    assert_eq!(doc.text_content(root), "");
}

/// Test that hooks outside a render pass return inert defaults.
#[test]
fn hooks_without_instance_are_inert() {
    let mut cx = HookContext::inert();
    let (value, setter) = cx.use_state(11_i64);
    assert_eq!(value, 11);
    assert!(setter.set(12).is_ok());
    assert!(!setter.is_live());
}

/// Test that effects wait for the configured delay on the tokio clock.
#[tokio::test(start_paused = true)]
async fn settle_waits_for_effect_delay() {
    let (_doc, root, renderer) = setup();
    renderer.render(component(once, Props::new(), vec![]), root).unwrap();
    assert_eq!(renderer.pending_effects(), 1);

    // not due yet
    assert_eq!(renderer.run_due(Instant::now()).unwrap(), 0);
    assert!(take_log().is_empty());

    let start = Instant::now();
    renderer.settle().await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert_eq!(take_log(), ["mount"]);
    assert_eq!(renderer.pending_effects(), 0);
}

/// Test that a different component in the same position replaces the old
/// instance: its cleanups run and the new one starts from fresh state.
#[test]
fn different_component_starts_fresh() {
    let (doc, root, renderer) = setup();
    renderer.render(component(badge, Props::new(), vec![]), root).unwrap();
    renderer.flush_effects().unwrap();
    let old_setter = last_setter();
    old_setter.set(5).unwrap();
    assert_eq!(doc.to_html(root), "<main><b>5</b></main>");
    assert_eq!(take_log(), ["badge run"]);

    renderer.update_root(component(label, Props::new(), vec![])).unwrap();
    assert_eq!(take_log(), ["badge clean"]);
    assert!(!old_setter.is_live());
    assert_eq!(doc.to_html(root), "<main><i>0</i></main>");

    assert_eq!(renderer.flush_effects().unwrap(), 1);
    assert_eq!(take_log(), ["label run"]);
}
