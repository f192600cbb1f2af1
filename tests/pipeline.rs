//! End-to-end: component tree, layout, mount against recording hosts.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use tessera::engine::{Component, ComponentRef, Event, handler_fn};
use tessera::error::RenderError;
use tessera::layout::{LayoutState, OutputUnitType, calculate_id};
use tessera::mount::MountState;
use tessera::testing::{HostOp, RecordingFactory, TestLeaf};
use tessera::tree::ComponentTree;
use tessera::types::{Rect, SizeSpec};
use tessera::RenderConfig;

fn child(key: &str) -> ComponentRef {
    Component::leaf("Text", TestLeaf::labeled(key, 100.0, 20.0)).key(key).build()
}

fn content_id(layout: &LayoutState, key: &str) -> u64 {
    layout
        .outputs()
        .iter()
        .find(|unit| unit.unit_type() == OutputUnitType::Content && unit.global_key().ends_with(key))
        .map(|unit| unit.id())
        .unwrap()
}

fn lay_out(tree: &ComponentTree, root: ComponentRef) -> Arc<LayoutState> {
    tree.set_root_and_size_spec(root, SizeSpec::exactly(100.0), SizeSpec::unspecified())
        .unwrap()
        .unwrap()
}

fn setup(config: RenderConfig) -> (ComponentTree, RecordingFactory, MountState) {
    let tree = ComponentTree::new(config);
    let factory = RecordingFactory::new();
    let mount = tree.create_mount_state(factory.root(), Box::new(factory.clone()));
    (tree, factory, mount)
}

#[test]
fn test_swapped_children_move_without_remount() {
    let (tree, factory, mut mount) = setup(RenderConfig::default());

    let first = lay_out(&tree, Component::column(vec![child("a"), child("b")]).build());
    let stats = mount.mount(first.clone(), None).unwrap();
    assert_eq!(stats.mounted, 2);
    let contents = first
        .outputs()
        .iter()
        .filter(|unit| unit.unit_type() == OutputUnitType::Content)
        .count();
    assert_eq!(contents, 2);
    factory.clear_log();

    let swapped = lay_out(&tree, Component::column(vec![child("b"), child("a")]).build());
    let stats = mount.mount(swapped.clone(), None).unwrap();

    assert_eq!(factory.moves().len(), 2);
    assert!(
        factory
            .log()
            .lock()
            .iter()
            .all(|op| matches!(op, HostOp::Move { .. }))
    );
    assert_eq!(stats.mounted, 0);
    assert_eq!(stats.unmounted, 0);
    assert_eq!(stats.moved, 2);
    assert_eq!(content_id(&first, "a"), content_id(&swapped, "a"));
    assert_eq!(content_id(&first, "b"), content_id(&swapped, "b"));
}

#[test]
fn test_output_id_bit_layout() {
    let id = calculate_id(5, 2, OutputUnitType::Content, 3).unwrap();
    assert_eq!(id, (5 << 26) | (2 << 18) | (1 << 16) | 3);
    assert!(matches!(
        calculate_id(5, 256, OutputUnitType::Content, 0),
        Err(RenderError::LevelOverflow { .. })
    ));
}

#[test]
fn test_mounting_same_layout_twice_is_noop() {
    let (tree, factory, mut mount) = setup(RenderConfig::default());
    let layout = lay_out(&tree, Component::column(vec![child("a"), child("b")]).build());
    mount.mount(layout.clone(), None).unwrap();
    let ops = factory.log().lock().len();

    let stats = mount.mount(layout, None).unwrap();
    assert!(stats.is_noop());
    assert_eq!(factory.log().lock().len(), ops);
}

#[test]
fn test_incremental_scroll_matches_full_scan() {
    let (tree, factory, mut scrolled) = setup(RenderConfig::default());
    let rows: Vec<ComponentRef> = (0..20).map(|i| child(&format!("row{i}"))).collect();
    let layout = lay_out(&tree, Component::column(rows).build());

    scrolled.mount(layout.clone(), Some(Rect::new(0, 0, 100, 50))).unwrap();
    for top in (7..300).step_by(7) {
        let rect = Rect::new(0, top, 100, top + 50);
        scrolled.set_visible_rect(rect).unwrap();

        let mut fresh = tree.create_mount_state(factory.root(), Box::new(factory.clone()));
        fresh.mount(layout.clone(), Some(rect)).unwrap();

        let expected: BTreeSet<u64> = fresh.mounted_ids().into_iter().collect();
        let actual: BTreeSet<u64> = scrolled.mounted_ids().into_iter().collect();
        assert_eq!(actual, expected, "visible rect {rect:?}");
    }
}

#[test]
fn test_releasing_twice_is_an_error() {
    let (tree, _factory, mut mount) = setup(RenderConfig::default());
    let layout = lay_out(&tree, Component::column(vec![child("a"), child("b")]).build());
    mount.mount(layout.clone(), Some(Rect::new(0, 0, 100, 40))).unwrap();

    let id = content_id(&layout, "b");
    mount.release_reference(id).unwrap();
    assert!(!mount.is_mounted(id));
    let err = mount.release_reference(id).unwrap_err();
    assert!(matches!(err, RenderError::DoubleRelease { id: released } if released == id));
}

#[test]
fn test_partial_visibility_reports_ratios() {
    let (tree, _factory, mut mount) = setup(RenderConfig::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let tile = Component::leaf("Tile", TestLeaf::fixed(100.0, 100.0))
        .visible_ratios(0.0, 0.5)
        .on_visibility_changed(handler_fn(move |_, event| {
            sink.lock().push(event.clone());
            Ok(true)
        }))
        .build();
    let layout = lay_out(&tree, Component::column(vec![tile]).build());

    mount.mount(layout, Some(Rect::new(0, 40, 100, 100))).unwrap();

    let events = seen.lock();
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::VisibilityChanged {
            visible_rect,
            width_ratio,
            height_ratio,
        } => {
            assert_eq!(visible_rect.height(), 60);
            assert!((width_ratio - 1.0).abs() < 1e-6);
            assert!((height_ratio - 0.6).abs() < 1e-6);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn test_state_update_rebinds_only_changed_output() {
    let (tree, _factory, mut mount) = setup(RenderConfig::default());
    let first = lay_out(&tree, Component::column(vec![child("a"), child("b")]).build());
    mount.mount(first, None).unwrap();

    let changed = Component::leaf("Text", TestLeaf::labeled("changed", 100.0, 20.0))
        .key("b")
        .build();
    let second = lay_out(&tree, Component::column(vec![child("a"), changed]).build());
    let stats = mount.mount(second, None).unwrap();
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.mounted, 0);
}
