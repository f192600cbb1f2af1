//! Mount state - reconciles live content with a layout.
//!
//! # Architecture
//!
//! ```text
//!   LayoutState (vN) ──mount()──▶ MountState ──▶ HostContainer ops
//!                                   │
//!        ┌──────────────────────────┼────────────────────────────┐
//!        ▼                          ▼                            ▼
//!   IncrementalMount          TransitionManager           VisibilityState
//!   (which ids are wanted)    (before/after capture)      WorkingRangeContainer
//! ```
//!
//! A mount pass runs in two phases over the items of the previous layout
//! and the outputs of the next one:
//!
//! 1. Unmount or move, children before hosts: items whose id left the
//!    layout, or whose host or content type changed, are unmounted. Items
//!    whose output position changed are moved inside their host. A keyed
//!    item with a disappear animation is kept, together with everything
//!    mounted inside it, until the animation finishes.
//! 2. Mount, update or release in output order: outputs acquired by the
//!    incremental extension are mounted or updated, mounted items it no
//!    longer wants are unmounted.
//!
//! Updates are skipped when the collect pass proved the output unchanged
//! ([`UpdateState::Updated`]); `Unknown` falls back to an equivalence check.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::ThreadId;

use crate::animation::{AnimationTarget, TargetLookup, TransitionManager};
use crate::config::RenderConfig;
use crate::engine::{ErrorScope, Event, EventHandlersController, TouchAction};
use crate::error::{CallbackError, CallbackPhase, RenderError, RenderResult};
use crate::layout::{LayoutState, ROOT_HOST_ID, RenderUnit, UnitContent, UpdateState};
use crate::types::{OutputFlags, Rect};

use super::{
    ContentFactory, ContentPools, DrawableState, IncrementalMountExtension, MountContent, MountItem,
    ReferenceChange, VisibilityState, WorkingRangeContainer,
};

// =============================================================================
// Stats
// =============================================================================

/// Work done by one mount pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MountStats {
    pub mounted: usize,
    pub unmounted: usize,
    pub moved: usize,
    pub updated: usize,
    /// Items kept as they were because their output did not change.
    pub skipped: usize,
    /// Content served from a pool instead of the factory.
    pub recycled: usize,
}

impl MountStats {
    /// Whether the pass touched any content.
    pub fn is_noop(&self) -> bool {
        self.mounted == 0 && self.unmounted == 0 && self.moved == 0 && self.updated == 0
    }
}

// =============================================================================
// MountState
// =============================================================================

pub struct MountState {
    ui_thread: ThreadId,
    config: RenderConfig,
    factory: Box<dyn ContentFactory>,
    events: Arc<EventHandlersController>,
    pools: ContentPools,
    items: HashMap<u64, MountItem>,
    /// Items kept mounted while they animate out.
    disappearing: HashMap<u64, MountItem>,
    layout: Option<Arc<LayoutState>>,
    visible_rect: Option<Rect>,
    incremental: IncrementalMountExtension,
    visibility: VisibilityState,
    working_ranges: WorkingRangeContainer,
    transitions: TransitionManager,
    scopes: HashMap<String, ErrorScope>,
    host_states: HashMap<u64, DrawableState>,
    clock_ms: u64,
    last_stats: MountStats,
}

/// Outcome of checking a mounted item against its next output.
enum Reconcile {
    Keep,
    Move(usize),
    Remove,
}

impl MountState {
    /// Mount state rooted in `root`, which must be a host.
    ///
    /// The calling thread becomes the UI thread.
    pub fn new(
        root: Box<dyn MountContent>,
        factory: Box<dyn ContentFactory>,
        events: Arc<EventHandlersController>,
        config: RenderConfig,
    ) -> Self {
        let unit = RenderUnit::new(
            crate::layout::OutputUnitType::Host,
            UnitContent::Host,
            Rect::EMPTY,
            ROOT_HOST_ID,
            "",
        );
        let mut root_item = MountItem::new(unit, root, 0, (0, 0));
        root_item.bound = true;

        let mut items = HashMap::new();
        items.insert(ROOT_HOST_ID, root_item);

        Self {
            ui_thread: std::thread::current().id(),
            pools: ContentPools::new(config.content_pool_size),
            config,
            factory,
            events,
            items,
            disappearing: HashMap::new(),
            layout: None,
            visible_rect: None,
            incremental: IncrementalMountExtension::new(),
            visibility: VisibilityState::new(),
            working_ranges: WorkingRangeContainer::new(),
            transitions: TransitionManager::new(),
            scopes: HashMap::new(),
            host_states: HashMap::new(),
            clock_ms: 0,
            last_stats: MountStats::default(),
        }
    }

    /// Make the calling thread the UI thread.
    pub fn bind_ui_thread(&mut self) {
        self.ui_thread = std::thread::current().id();
    }

    fn check_thread(&self, operation: &'static str) -> RenderResult<()> {
        if std::thread::current().id() != self.ui_thread {
            return Err(RenderError::NotOnUiThread { operation });
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn layout(&self) -> Option<&Arc<LayoutState>> {
        self.layout.as_ref()
    }

    pub fn visible_rect(&self) -> Option<Rect> {
        self.visible_rect
    }

    pub fn item(&self, id: u64) -> Option<&MountItem> {
        self.items.get(&id)
    }

    pub fn root(&self) -> Option<&MountItem> {
        self.items.get(&ROOT_HOST_ID)
    }

    pub fn is_mounted(&self, id: u64) -> bool {
        self.items.contains_key(&id)
    }

    /// Mounted items including the root host.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Ids of mounted items in output order.
    pub fn mounted_ids(&self) -> Vec<u64> {
        let mut items: Vec<(usize, u64)> = self.items.values().map(|i| (i.index, i.id())).collect();
        items.sort_unstable();
        items.into_iter().map(|(_, id)| id).collect()
    }

    /// Items animating out, not counting content mounted inside them.
    pub fn disappearing_count(&self) -> usize {
        self.disappearing
            .values()
            .filter(|item| !self.disappearing.contains_key(&item.host_id()))
            .count()
    }

    pub fn last_stats(&self) -> MountStats {
        self.last_stats
    }

    pub fn pools(&self) -> &ContentPools {
        &self.pools
    }

    pub fn incremental(&self) -> &IncrementalMountExtension {
        &self.incremental
    }

    pub fn visibility(&self) -> &VisibilityState {
        &self.visibility
    }

    pub fn working_ranges(&self) -> &WorkingRangeContainer {
        &self.working_ranges
    }

    pub fn transitions(&self) -> &TransitionManager {
        &self.transitions
    }

    // =========================================================================
    // Mount
    // =========================================================================

    /// Reconcile mounted content with `layout` for the given visible rect.
    ///
    /// Without a rect, or with incremental mount disabled, every output is
    /// mounted. Mounting the same `Arc` that is already mounted with the
    /// same rect does nothing.
    pub fn mount(&mut self, layout: Arc<LayoutState>, visible_rect: Option<Rect>) -> RenderResult<MountStats> {
        self.check_thread("mount")?;

        if let Some(current) = &self.layout {
            if Arc::ptr_eq(current, &layout) {
                if self.visible_rect == visible_rect {
                    self.last_stats = MountStats::default();
                    return Ok(self.last_stats);
                }
                if let Some(rect) = visible_rect {
                    return self.set_visible_rect(rect);
                }
            }
        }

        self.events
            .commit(layout.version(), layout.owners().iter().cloned());
        self.scopes = layout
            .owners()
            .iter()
            .map(|(key, info)| (key.clone(), info.error_scope.clone()))
            .collect();

        let previous = self.layout.take();
        let stats = self.mount_layout(previous.as_deref(), &layout, visible_rect)?;
        self.layout = Some(layout);
        self.visible_rect = visible_rect;
        self.last_stats = stats;
        log::debug!(
            "mount v{}: +{} -{} ~{} moved {} skipped {}",
            self.layout.as_ref().map_or(0, |l| l.version()),
            stats.mounted,
            stats.unmounted,
            stats.updated,
            stats.moved,
            stats.skipped
        );
        Ok(stats)
    }

    fn mount_layout(
        &mut self,
        previous: Option<&LayoutState>,
        layout: &LayoutState,
        visible_rect: Option<Rect>,
    ) -> RenderResult<MountStats> {
        let mut stats = MountStats::default();
        let recycled_before = self.pools.recycled_count();

        let animating = layout.has_transitions() || previous.is_some_and(LayoutState::has_transitions);
        if animating {
            self.transitions
                .on_new_transition_context(previous.map(LayoutState::transitions).unwrap_or_default(), layout.transitions());
            self.capture_before()?;
        }

        self.unmount_or_move(layout, animating, &mut stats)?;

        let rect = visible_rect.filter(|_| self.config.incremental_mount);
        match rect {
            Some(rect) => {
                self.incremental.update(layout, rect)?;
            }
            None => {
                self.incremental.acquire_all(layout);
            }
        }

        let previous_version = previous.map(LayoutState::version);
        for (index, unit) in layout.outputs().iter().enumerate() {
            let id = unit.id();
            let acquired = self.incremental.is_acquired(id);
            match (acquired, self.items.contains_key(&id)) {
                (true, true) => self.update_item(layout, index, previous_version, &mut stats)?,
                (true, false) => self.mount_output(layout, index, &mut stats)?,
                (false, true) => stats.unmounted += self.unmount_item(id)?,
                (false, false) => {}
            }
        }

        let rect = visible_rect.unwrap_or_else(|| full_rect(layout));
        self.notify_nested_hosts(rect);

        if animating {
            self.capture_after(layout)?;
            let mut targets = Targets {
                items: &mut self.items,
                disappearing: &mut self.disappearing,
            };
            self.transitions.activate_bindings(&mut targets, self.clock_ms)?;
        }

        self.process_visibility(layout, rect)?;
        self.check_working_ranges(layout, rect);

        stats.recycled = self.pools.recycled_count() - recycled_before;
        Ok(stats)
    }

    fn capture_before(&mut self) -> RenderResult<()> {
        let mut keyed: Vec<(&MountItem, u64)> = self
            .items
            .values()
            .filter(|item| item.unit.transition_id().is_some())
            .map(|item| (item, item.id()))
            .collect();
        keyed.sort_by_key(|(_, id)| *id);
        for (item, id) in keyed {
            if let Some(transition_id) = item.unit.transition_id() {
                self.transitions.on_pre_mount_item(transition_id, id, item)?;
            }
        }
        Ok(())
    }

    fn capture_after(&mut self, layout: &LayoutState) -> RenderResult<()> {
        for record in layout.transitions() {
            if let Some(item) = self.items.get(&record.output_id) {
                self.transitions
                    .on_post_mount_item(&record.id, record.output_id, item)?;
            }
        }
        Ok(())
    }

    /// Phase 1: drop items that cannot stay, move the ones that changed position.
    fn unmount_or_move(&mut self, layout: &LayoutState, animating: bool, stats: &mut MountStats) -> RenderResult<()> {
        let mut previous: Vec<(usize, u64)> = self
            .items
            .values()
            .filter(|item| item.id() != ROOT_HOST_ID)
            .map(|item| (item.index, item.id()))
            .collect();
        // Children come after their hosts in output order.
        previous.sort_unstable_by(|a, b| b.cmp(a));

        let disappearing: HashSet<u64> = if animating {
            previous
                .iter()
                .map(|&(_, id)| id)
                .filter(|&id| layout.index_of(id).is_none() && self.animates_out(id))
                .collect()
        } else {
            HashSet::new()
        };

        for (old_index, id) in previous {
            let Some(item) = self.items.get(&id) else {
                continue;
            };
            let decision = match layout.index_of(id) {
                Some(new_index) => {
                    let next = &layout.outputs()[new_index];
                    if next.host_id() != item.host_id()
                        || next.content().content_type() != item.unit.content().content_type()
                    {
                        Reconcile::Remove
                    } else if new_index != old_index {
                        Reconcile::Move(new_index)
                    } else {
                        Reconcile::Keep
                    }
                }
                None => Reconcile::Remove,
            };

            match decision {
                Reconcile::Keep => {}
                Reconcile::Move(new_index) => {
                    let host_id = item.host_id();
                    if let Some(host) = self.items.get_mut(&host_id).and_then(MountItem::as_host) {
                        host.move_item(id, old_index, new_index);
                    }
                    if let Some(item) = self.items.get_mut(&id) {
                        item.index = new_index;
                    }
                    stats.moved += 1;
                }
                Reconcile::Remove => {
                    if disappearing.contains(&id) {
                        self.start_disappearing(id)?;
                    } else if layout.index_of(id).is_some() || !self.inside_any(id, &disappearing) {
                        stats.unmounted += self.unmount_item(id)?;
                    }
                    self.incremental.forget(id);
                }
            }
        }
        Ok(())
    }

    fn animates_out(&self, id: u64) -> bool {
        self.items
            .get(&id)
            .and_then(|item| item.unit.transition_id())
            .is_some_and(|tid| self.transitions.should_animate_disappear(tid))
    }

    /// Whether `id` is mounted somewhere below one of `hosts`.
    fn inside_any(&self, id: u64, hosts: &HashSet<u64>) -> bool {
        let mut current = id;
        while let Some(item) = self.items.get(&current) {
            let host_id = item.host_id();
            if host_id == current {
                return false;
            }
            if hosts.contains(&host_id) {
                return true;
            }
            current = host_id;
        }
        false
    }

    fn start_disappearing(&mut self, id: u64) -> RenderResult<()> {
        let Some(item) = self.items.remove(&id) else {
            return Ok(());
        };
        if let Some(transition_id) = item.unit.transition_id() {
            self.transitions.record_disappearing(transition_id, id)?;
        }
        if let Some(host) = self.items.get_mut(&item.host_id()).and_then(MountItem::as_host) {
            host.start_disappearing(item.index);
        }
        log::trace!("output {id:#x} animating out");
        self.disappearing.insert(id, item);
        self.keep_children_for_disappearing(id);
        Ok(())
    }

    /// Move everything mounted inside a disappearing host along with it.
    /// The children stay mounted in their host until it finishes.
    fn keep_children_for_disappearing(&mut self, host_id: u64) {
        let children: Vec<u64> = self
            .items
            .values()
            .filter(|item| item.host_id() == host_id && item.id() != host_id)
            .map(MountItem::id)
            .collect();
        for child in children {
            if let Some(item) = self.items.remove(&child) {
                self.disappearing.insert(child, item);
                self.keep_children_for_disappearing(child);
            }
        }
    }

    /// Whether mounted content must be rebound for `next`.
    fn should_update(item: &MountItem, next: &RenderUnit, previous_version: Option<u64>) -> bool {
        if Some(item.unit.layout_version()) != previous_version {
            return !item.unit.is_equivalent_to(next);
        }
        match next.update_state() {
            UpdateState::Updated => false,
            UpdateState::Dirty => true,
            UpdateState::Unknown => !item.unit.is_equivalent_to(next),
        }
    }

    fn update_item(
        &mut self,
        layout: &LayoutState,
        index: usize,
        previous_version: Option<u64>,
        stats: &mut MountStats,
    ) -> RenderResult<()> {
        let next = &layout.outputs()[index];
        let id = next.id();
        let host_origin = self.host_origin(next.host_id());
        let Some(item) = self.items.get_mut(&id) else {
            return Ok(());
        };
        if item.unit.layout_version() == layout.version() && id != ROOT_HOST_ID {
            // Mounted earlier in this pass as the host of another output.
            return Ok(());
        }

        let rebind = id != ROOT_HOST_ID && Self::should_update(item, next, previous_version);
        if rebind {
            item.unbind();
        }
        item.unit = next.clone();
        item.index = index;
        item.host_origin = host_origin;
        item.apply_bounds(next.bounds());

        if rebind {
            let result = item.bind();
            let key = item.unit.global_key().to_string();
            stats.updated += 1;
            if let Err(error) = result {
                self.route_mount_error(&key, error)?;
            }
        } else {
            item.apply_view_attributes();
            if id != ROOT_HOST_ID {
                stats.skipped += 1;
            }
        }
        Ok(())
    }

    fn host_origin(&self, host_id: u64) -> (i32, i32) {
        self.items
            .get(&host_id)
            .filter(|_| host_id != ROOT_HOST_ID)
            .map_or((0, 0), |host| (host.bounds().left, host.bounds().top))
    }

    /// Mount the output at `index`, acquiring its host first if needed.
    fn mount_output(&mut self, layout: &LayoutState, index: usize, stats: &mut MountStats) -> RenderResult<()> {
        let unit = &layout.outputs()[index];
        let id = unit.id();
        let host_id = unit.host_id();

        if !self.items.contains_key(&host_id) {
            let Some(host_index) = layout.index_of(host_id).filter(|_| host_id != id) else {
                return Err(RenderError::MissingHost { id, host_id });
            };
            self.incremental.acquire(host_id);
            self.mount_output(layout, host_index, stats)?;
        }

        let content = self.acquire_content(unit);
        let host_origin = self.host_origin(host_id);
        let mut item = MountItem::new(unit.clone(), content, index, host_origin);

        let Some(host) = self.items.get_mut(&host_id).and_then(MountItem::as_host) else {
            return Err(RenderError::MissingHost { id, host_id });
        };
        host.mount(index, id);

        item.apply_bounds(unit.bounds());
        let result = item.bind();
        if unit.flags().contains(OutputFlags::DUPLICATE_PARENT_STATE) {
            if let Some(&state) = self.host_states.get(&host_id) {
                item.content_mut().set_drawable_state(state);
            }
        }
        self.items.insert(id, item);
        stats.mounted += 1;
        log::trace!("mounted {:#x} ({}) at {index}", id, unit.content().content_type());

        if let Err(error) = result {
            self.route_mount_error(unit.global_key(), error)?;
        }
        Ok(())
    }

    fn acquire_content(&mut self, unit: &RenderUnit) -> Box<dyn MountContent> {
        let content_type = unit.content().content_type();
        if let UnitContent::Leaf(leaf) = unit.content() {
            if let Some(size) = leaf.pool_size() {
                self.pools.set_capacity(content_type.clone(), size);
            }
        }
        if let Some(content) = self.pools.acquire(&content_type) {
            return content;
        }
        match unit.content() {
            UnitContent::Host => self.factory.create_host(),
            UnitContent::Leaf(leaf) => leaf.create_content(),
            UnitContent::Drawable(spec) => self.factory.create_drawable(spec),
        }
    }

    /// Unmount `id` and everything mounted inside it. Returns how many items
    /// were unmounted.
    fn unmount_item(&mut self, id: u64) -> RenderResult<usize> {
        if id == ROOT_HOST_ID {
            return Ok(0);
        }
        let mut count = 0;
        let children: Vec<u64> = self
            .items
            .values()
            .filter(|item| item.host_id() == id && item.id() != id)
            .map(MountItem::id)
            .collect();
        for child in children {
            if self.incremental.is_acquired(child) {
                self.incremental.release(child)?;
            }
            count += self.unmount_item(child)?;
        }
        let inner_disappearing: Vec<u64> = self
            .disappearing
            .values()
            .filter(|item| item.host_id() == id)
            .map(MountItem::id)
            .collect();
        for child in inner_disappearing {
            self.finish_disappearing(child);
        }

        let Some(mut item) = self.items.remove(&id) else {
            return Ok(count);
        };
        if let Some(host) = self.items.get_mut(&item.host_id()).and_then(MountItem::as_host) {
            host.unmount(item.index);
        }
        item.unbind();
        self.transitions.forget_item(id);
        self.host_states.remove(&id);
        self.recycle(item);
        log::trace!("unmounted {id:#x}");
        Ok(count + 1)
    }

    fn recycle(&mut self, mut item: MountItem) {
        item.reset_animated_properties();
        let recyclable = match item.unit.content() {
            UnitContent::Leaf(leaf) => leaf.is_recyclable(),
            UnitContent::Host | UnitContent::Drawable(_) => true,
        };
        let content_type = item.unit.content().content_type();
        if !recyclable || !self.pools.release(content_type.clone(), item.content) {
            log::trace!("dropped {content_type} content of {:#x}", item.unit.id());
        }
    }

    fn route_mount_error(&self, global_key: &str, error: CallbackError) -> RenderResult<()> {
        let scope = self.scopes.get(global_key).cloned().unwrap_or_default();
        let name = self
            .events
            .owner(global_key)
            .map_or_else(|| global_key.to_string(), |c| c.name().to_string());
        scope.route(&name, CallbackPhase::Mount, error)
    }

    // =========================================================================
    // Visible rect
    // =========================================================================

    /// Apply a new visible rect to the mounted layout.
    ///
    /// Only outputs whose reference changed are touched. Content hosting its
    /// own render tree is told about its new visible part.
    pub fn set_visible_rect(&mut self, rect: Rect) -> RenderResult<MountStats> {
        self.check_thread("set_visible_rect")?;
        let Some(layout) = self.layout.clone() else {
            self.visible_rect = Some(rect);
            return Ok(MountStats::default());
        };
        self.visible_rect = Some(rect);
        let mut stats = MountStats::default();
        let recycled_before = self.pools.recycled_count();

        if self.config.incremental_mount {
            let mut changes = self.incremental.update(&layout, rect)?;
            // Releases first so hosts never see two children on one position.
            changes.sort_by_key(|change| match *change {
                ReferenceChange::Released(id) => (0, layout.index_of(id).unwrap_or(0)),
                ReferenceChange::Acquired(id) => (1, layout.index_of(id).unwrap_or(0)),
            });
            for change in changes {
                match change {
                    ReferenceChange::Released(id) => {
                        if self.items.contains_key(&id) {
                            stats.unmounted += self.unmount_item(id)?;
                        }
                    }
                    ReferenceChange::Acquired(id) => {
                        if !self.items.contains_key(&id) {
                            if let Some(index) = layout.index_of(id) {
                                self.mount_output(&layout, index, &mut stats)?;
                            }
                        }
                    }
                }
            }
        }

        self.notify_nested_hosts(rect);
        self.process_visibility(&layout, rect)?;
        self.check_working_ranges(&layout, rect);
        stats.recycled = self.pools.recycled_count() - recycled_before;
        self.last_stats = stats;
        Ok(stats)
    }

    /// Tell content hosting its own render tree which part of it is visible.
    fn notify_nested_hosts(&mut self, rect: Rect) {
        for item in self.items.values_mut() {
            if item.unit.hosts_nested_tree() {
                let bounds = item.bounds();
                let visible = bounds
                    .intersect(&rect)
                    .map(|r| r.offset(-bounds.left, -bounds.top));
                item.content_mut().notify_visible_bounds_changed(visible);
            }
        }
    }

    /// Drop a reference taken by incremental mount and unmount the output.
    ///
    /// Releasing twice is an error; releasing an output that was never
    /// acquired does nothing.
    pub fn release_reference(&mut self, id: u64) -> RenderResult<()> {
        self.check_thread("release_reference")?;
        if self.incremental.release(id)? && self.items.contains_key(&id) {
            self.unmount_item(id)?;
        }
        Ok(())
    }

    fn process_visibility(&mut self, layout: &LayoutState, rect: Rect) -> RenderResult<()> {
        if !self.config.process_visibility {
            return Ok(());
        }
        for pending in self.visibility.process(layout.visibility_outputs(), rect) {
            self.events.dispatch(&pending.handler, &pending.event)?;
        }
        Ok(())
    }

    fn check_working_ranges(&mut self, layout: &LayoutState, rect: Rect) {
        if layout.working_ranges().is_empty() {
            return;
        }
        let mut visible = layout
            .outputs()
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, unit)| unit.bounds().intersects(&rect))
            .map(|(index, _)| index);
        let Some(first) = visible.next() else {
            return;
        };
        let last = visible.last().unwrap_or(first);
        self.working_ranges.check(layout.working_ranges(), first, last);
    }

    // =========================================================================
    // Animations
    // =========================================================================

    /// Step running transitions to `now_ms` and unmount items whose
    /// disappear animation finished. Returns how many were unmounted.
    pub fn advance_animations(&mut self, now_ms: u64) -> RenderResult<usize> {
        self.check_thread("advance_animations")?;
        self.clock_ms = now_ms;
        let mut targets = Targets {
            items: &mut self.items,
            disappearing: &mut self.disappearing,
        };
        let finished = self.transitions.advance(&mut targets, now_ms);
        let count = finished.len();
        for id in finished {
            self.finish_disappearing(id);
        }
        Ok(count)
    }

    pub fn is_animating(&self) -> bool {
        self.transitions.is_running()
    }

    fn finish_disappearing(&mut self, id: u64) {
        let children: Vec<u64> = self
            .disappearing
            .values()
            .filter(|item| item.host_id() == id && item.id() != id)
            .map(MountItem::id)
            .collect();
        for child in children {
            self.finish_disappearing(child);
        }

        let Some(mut item) = self.disappearing.remove(&id) else {
            return;
        };
        let host_id = item.host_id();
        if let Some(host) = self.items.get_mut(&host_id).and_then(MountItem::as_host) {
            host.finish_disappearing(id);
        } else if let Some(host) = self.disappearing.get_mut(&host_id).and_then(MountItem::as_host) {
            host.unmount(item.index);
        }
        item.unbind();
        self.transitions.forget_item(id);
        self.recycle(item);
        log::trace!("output {id:#x} finished disappearing");
    }

    // =========================================================================
    // Drawable state and events
    // =========================================================================

    /// Set the drawable state of a host and of children that mirror it.
    pub fn set_host_drawable_state(&mut self, host_id: u64, state: DrawableState) -> RenderResult<()> {
        self.check_thread("set_host_drawable_state")?;
        self.host_states.insert(host_id, state);
        if let Some(host) = self.items.get_mut(&host_id) {
            host.content_mut().set_drawable_state(state);
        }
        for item in self.items.values_mut() {
            if item.host_id() == host_id
                && item.id() != host_id
                && item.unit.flags().contains(OutputFlags::DUPLICATE_PARENT_STATE)
            {
                item.content_mut().set_drawable_state(state);
            }
        }
        Ok(())
    }

    /// Deliver `event` to the handler the mounted output declares for it.
    ///
    /// Returns whether a handler consumed the event.
    pub fn dispatch_event(&self, id: u64, event: &Event) -> RenderResult<bool> {
        self.check_thread("dispatch_event")?;
        let handler = self
            .items
            .get(&id)
            .and_then(|item| item.unit.node_info())
            .and_then(|info| info.handler(event.slot()).cloned());
        match handler {
            Some(handler) => self.events.dispatch(&handler, event),
            None => Ok(false),
        }
    }

    pub fn dispatch_click(&self, id: u64) -> RenderResult<bool> {
        self.dispatch_event(id, &Event::Click)
    }

    pub fn dispatch_long_click(&self, id: u64) -> RenderResult<bool> {
        self.dispatch_event(id, &Event::LongClick)
    }

    pub fn dispatch_touch(&self, id: u64, x: f32, y: f32, action: TouchAction) -> RenderResult<bool> {
        self.dispatch_event(id, &Event::Touch { x, y, action })
    }

    pub fn dispatch_focus_changed(&self, id: u64, has_focus: bool) -> RenderResult<bool> {
        self.dispatch_event(id, &Event::FocusChanged { has_focus })
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Unmount everything but the root and forget the layout.
    pub fn unmount_all(&mut self) -> RenderResult<()> {
        self.check_thread("unmount_all")?;
        let ids: Vec<u64> = self
            .items
            .values()
            .filter(|item| item.host_id() == ROOT_HOST_ID && item.id() != ROOT_HOST_ID)
            .map(MountItem::id)
            .collect();
        for id in ids {
            self.unmount_item(id)?;
        }
        let disappearing: Vec<u64> = self.disappearing.keys().copied().collect();
        for id in disappearing {
            self.finish_disappearing(id);
        }
        for pending in self.visibility.clear() {
            self.events.dispatch(&pending.handler, &pending.event)?;
        }
        self.working_ranges.clear();
        self.incremental.clear();
        self.transitions.clear();
        self.layout = None;
        self.visible_rect = None;
        Ok(())
    }
}

impl std::fmt::Debug for MountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountState")
            .field("layout", &self.layout.as_ref().map(|l| l.version()))
            .field("items", &self.items.len())
            .field("disappearing", &self.disappearing.len())
            .field("visible_rect", &self.visible_rect)
            .field("pools", &self.pools)
            .finish()
    }
}

fn full_rect(layout: &LayoutState) -> Rect {
    let size = layout.size();
    Rect::from_xywh(0, 0, size.width.round() as i32, size.height.round() as i32)
}

/// Mounted and disappearing items as animation targets.
struct Targets<'a> {
    items: &'a mut HashMap<u64, MountItem>,
    disappearing: &'a mut HashMap<u64, MountItem>,
}

impl TargetLookup for Targets<'_> {
    fn target(&mut self, item_id: u64) -> Option<&mut dyn AnimationTarget> {
        if let Some(item) = self.items.get_mut(&item_id) {
            return Some(item);
        }
        self.disappearing
            .get_mut(&item_id)
            .map(|item| item as &mut dyn AnimationTarget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{AnimatedProperty, Easing, Transition, TransitionKeyType};
    use crate::engine::{Component, ComponentRef, ErrorDisposition, handler_fn};
    use crate::layout::{LayoutOutcome, OutputUnitType, calculate_layout};
    use crate::resolve::{ResolveEnv, resolve};
    use crate::testing::{HostOp, RecordingFactory, RecordingHost, TestLeaf, TestView};
    use crate::types::{Rgba, SizeSpec};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn lay_out(version: u64, root: ComponentRef, previous: Option<&LayoutState>) -> Arc<LayoutState> {
        let env = ResolveEnv::detached(version);
        let tree = resolve(env.clone(), root).unwrap().into_tree().unwrap();
        match calculate_layout(&env, &tree, SizeSpec::exactly(100.0), SizeSpec::unspecified(), previous, false)
            .unwrap()
        {
            LayoutOutcome::Complete(state) => Arc::new(state),
            LayoutOutcome::Cancelled => panic!("cancelled"),
        }
    }

    fn row(key: &str) -> ComponentRef {
        Component::leaf("Text", TestLeaf::labeled(key, 100.0, 10.0)).key(key).build()
    }

    fn mount_state(factory: &RecordingFactory, config: RenderConfig) -> MountState {
        MountState::new(
            factory.root(),
            Box::new(factory.clone()),
            Arc::new(EventHandlersController::new()),
            config,
        )
    }

    #[test]
    fn test_first_mount_mounts_every_output() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        let layout = lay_out(1, Component::column(vec![row("a"), row("b")]).build(), None);

        let stats = state.mount(layout.clone(), None).unwrap();
        assert_eq!(stats.mounted, 2);
        assert_eq!(state.item_count(), 3);
        assert_eq!(state.mounted_ids(), layout.outputs().iter().map(|u| u.id()).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_layout_twice_is_noop() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        let layout = lay_out(1, Component::column(vec![row("a")]).build(), None);
        state.mount(layout.clone(), None).unwrap();
        let ops = factory.log().lock().len();

        let stats = state.mount(layout, None).unwrap();
        assert!(stats.is_noop());
        assert_eq!(factory.log().lock().len(), ops);
    }

    #[test]
    fn test_removed_output_is_unmounted_and_pooled() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        let first = lay_out(1, Component::column(vec![row("a"), row("b")]).build(), None);
        state.mount(first.clone(), None).unwrap();

        let second = lay_out(2, Component::column(vec![row("a")]).build(), Some(&first));
        let stats = state.mount(second, None).unwrap();
        assert_eq!(stats.unmounted, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(state.pools().len(&crate::mount::ContentType::new("test.leaf")), 1);

        let third = lay_out(3, Component::column(vec![row("a"), row("c")]).build(), None);
        let stats = state.mount(third, None).unwrap();
        assert_eq!(stats.recycled, 1);
    }

    #[test]
    fn test_changed_props_rebind() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        let first = lay_out(1, Component::column(vec![row("a")]).build(), None);
        state.mount(first.clone(), None).unwrap();

        let changed = Component::leaf("Text", TestLeaf::labeled("other", 100.0, 10.0)).key("a").build();
        let second = lay_out(2, Component::column(vec![changed]).build(), Some(&first));
        let stats = state.mount(second, None).unwrap();
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.mounted, 0);
    }

    #[test]
    fn test_incremental_mount_follows_rect() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        let rows: Vec<ComponentRef> = (0..10).map(|i| row(&format!("r{i}"))).collect();
        let layout = lay_out(1, Component::column(rows).build(), None);

        let stats = state.mount(layout.clone(), Some(Rect::new(0, 0, 100, 25))).unwrap();
        assert_eq!(stats.mounted, 3);

        let stats = state.set_visible_rect(Rect::new(0, 50, 100, 75)).unwrap();
        assert_eq!(stats.unmounted, 3);
        assert_eq!(stats.mounted, 3);
        assert!(state.is_mounted(layout.outputs()[6].id()));
        assert!(!state.is_mounted(layout.outputs()[1].id()));
    }

    #[test]
    fn test_release_reference_twice_fails() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        let layout = lay_out(1, Component::column(vec![row("a")]).build(), None);
        state.mount(layout.clone(), None).unwrap();

        let id = layout.outputs()[1].id();
        state.release_reference(id).unwrap();
        assert!(!state.is_mounted(id));
        assert!(matches!(state.release_reference(id), Err(RenderError::DoubleRelease { .. })));
        state.release_reference(0xdead).unwrap();
    }

    #[test]
    fn test_click_reaches_handler() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        let clicks = Arc::new(AtomicUsize::new(0));
        let seen = clicks.clone();
        let button = Component::leaf("Button", TestLeaf::fixed(20.0, 20.0))
            .on_click(handler_fn(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }))
            .build();
        let layout = lay_out(1, Component::column(vec![button]).build(), None);
        state.mount(layout.clone(), None).unwrap();

        let host = layout
            .outputs()
            .iter()
            .find(|u| u.unit_type() == OutputUnitType::Host && u.id() != ROOT_HOST_ID)
            .unwrap();
        assert!(state.dispatch_click(host.id()).unwrap());
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
        assert!(!state.dispatch_long_click(host.id()).unwrap());
    }

    #[test]
    fn test_drawable_state_reaches_duplicating_children() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        let card = Component::leaf("Card", TestLeaf::fixed(50.0, 50.0))
            .wrap_in_view()
            .duplicate_parent_state()
            .background(Rgba::RED)
            .build();
        let layout = lay_out(1, Component::column(vec![card]).build(), None);
        state.mount(layout.clone(), None).unwrap();

        let host = layout
            .outputs()
            .iter()
            .find(|u| u.unit_type() == OutputUnitType::Host && u.id() != ROOT_HOST_ID)
            .unwrap()
            .id();
        state.set_host_drawable_state(host, DrawableState::PRESSED).unwrap();

        let content = layout
            .outputs()
            .iter()
            .find(|u| u.unit_type() == OutputUnitType::Content)
            .unwrap()
            .id();
        let view = state.item(content).unwrap().content_as::<TestView>().unwrap();
        assert_eq!(view.drawable_state, DrawableState::PRESSED);
    }

    #[test]
    fn test_mount_error_is_routed_to_scope() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        let handled = Arc::new(AtomicUsize::new(0));
        let count = handled.clone();
        let handler = move |_: &str, phase: CallbackPhase, _: &CallbackError| {
            assert_eq!(phase, CallbackPhase::Mount);
            count.fetch_add(1, Ordering::SeqCst);
            ErrorDisposition::Handled
        };
        let root = Component::column(vec![
            Component::leaf("Image", TestLeaf::failing_mount(10.0, 10.0)).build(),
        ])
        .error_handler(Arc::new(handler))
        .build();
        let layout = lay_out(1, root, None);
        state.mount(layout, None).unwrap();
        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unhandled_mount_error_is_returned() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        let root = Component::column(vec![
            Component::leaf("Image", TestLeaf::failing_mount(10.0, 10.0)).build(),
        ])
        .build();
        let err = state.mount(lay_out(1, root, None), None).unwrap_err();
        assert!(matches!(err, RenderError::Callback { phase: CallbackPhase::Mount, .. }));
    }

    #[test]
    fn test_other_thread_is_rejected() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        state.ui_thread = std::thread::spawn(|| std::thread::current().id()).join().unwrap();
        assert!(matches!(state.dispatch_click(1), Err(RenderError::NotOnUiThread { .. })));

        state.bind_ui_thread();
        assert!(!state.dispatch_click(1).unwrap());
    }

    #[test]
    fn test_unmount_all_keeps_root() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        let layout = lay_out(1, Component::column(vec![row("a"), row("b")]).build(), None);
        state.mount(layout, None).unwrap();
        state.unmount_all().unwrap();
        assert_eq!(state.item_count(), 1);
        assert!(state.root().is_some());
        let unmounts = factory
            .log()
            .lock()
            .iter()
            .filter(|op| matches!(op, HostOp::Unmount { .. }))
            .count();
        assert_eq!(unmounts, 2);
    }

    #[test]
    fn test_new_layout_with_same_version_is_mounted() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        let first = lay_out(1, Component::column(vec![row("a")]).build(), None);
        state.mount(first.clone(), None).unwrap();

        let second = lay_out(1, Component::column(vec![row("a"), row("b")]).build(), Some(&first));
        let stats = state.mount(second.clone(), None).unwrap();
        assert_eq!(stats.mounted, 1);
        assert_eq!(state.mounted_ids().len(), second.output_count());
    }

    fn nested_host_bounds(state: &MountState, layout: &LayoutState) -> Option<Rect> {
        let host = layout.outputs().iter().find(|u| u.hosts_nested_tree()).unwrap();
        let item = state.item(host.id()).unwrap();
        item.content_as::<RecordingHost>().unwrap().view().visible_bounds
    }

    #[test]
    fn test_mount_reports_visible_bounds_to_nested_hosts() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        let embed = || {
            Component::leaf("Embed", TestLeaf::fixed(100.0, 50.0))
                .key("embed")
                .hosts_nested_tree()
                .build()
        };
        let first = lay_out(1, Component::column(vec![embed()]).build(), None);
        state.mount(first.clone(), Some(Rect::new(0, 0, 100, 30))).unwrap();
        assert_eq!(nested_host_bounds(&state, &first), Some(Rect::new(0, 0, 100, 30)));

        let second = lay_out(2, Component::column(vec![row("top"), embed()]).build(), Some(&first));
        state.mount(second.clone(), Some(Rect::new(0, 0, 100, 30))).unwrap();
        assert_eq!(nested_host_bounds(&state, &second), Some(Rect::new(0, 0, 100, 20)));
    }

    fn spacer() -> ComponentRef {
        Component::leaf("Spacer", TestLeaf::fixed(100.0, 50.0)).key("spacer").build()
    }

    fn card(transition: Transition) -> ComponentRef {
        Component::leaf("Card", TestLeaf::fixed(100.0, 50.0))
            .key("card")
            .transition_key("card", TransitionKeyType::Global)
            .transition(transition.duration_ms(100).easing(Easing::Linear))
            .build()
    }

    fn keyed_host(layout: &LayoutState) -> u64 {
        layout
            .outputs()
            .iter()
            .find(|u| u.transition_id().is_some())
            .unwrap()
            .id()
    }

    #[test]
    fn test_moved_card_animates_from_old_position() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        let animation = || card(Transition::animate([AnimatedProperty::Y]));
        let first = lay_out(1, Component::column(vec![spacer(), animation()]).build(), None);
        state.mount(first.clone(), None).unwrap();
        let host = keyed_host(&first);
        assert_eq!(state.item(host).unwrap().bounds().top, 50);

        let second = lay_out(2, Component::column(vec![animation()]).build(), Some(&first));
        assert_eq!(keyed_host(&second), host);
        state.mount(second, None).unwrap();
        assert_eq!(state.item(host).unwrap().property(AnimatedProperty::Y), 50.0);
        assert!(state.is_animating());

        state.advance_animations(50).unwrap();
        assert_eq!(state.item(host).unwrap().property(AnimatedProperty::Y), 25.0);
        state.advance_animations(100).unwrap();
        assert_eq!(state.item(host).unwrap().property(AnimatedProperty::Y), 0.0);
        assert!(!state.is_animating());
    }

    fn fade_out() -> Transition {
        Transition::animate([AnimatedProperty::Alpha]).disappear_to(0.0)
    }

    #[test]
    fn test_removed_card_stays_mounted_until_faded_out() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        let first = lay_out(1, Component::column(vec![spacer(), card(fade_out())]).build(), None);
        state.mount(first.clone(), None).unwrap();
        let host = keyed_host(&first);

        let second = lay_out(2, Component::column(vec![spacer()]).build(), Some(&first));
        let stats = state.mount(second, None).unwrap();
        assert_eq!(stats.unmounted, 0);
        assert_eq!(state.disappearing_count(), 1);
        assert!(!state.is_mounted(host));
        let card_host = state.disappearing[&host].content_as::<RecordingHost>().unwrap();
        assert_eq!(card_host.children().len(), 1);

        assert_eq!(state.advance_animations(50).unwrap(), 0);
        assert_eq!(state.disappearing[&host].property(AnimatedProperty::Alpha), 0.5);
        assert_eq!(state.disappearing_count(), 1);

        assert_eq!(state.advance_animations(100).unwrap(), 1);
        assert_eq!(state.disappearing_count(), 0);
        assert!(
            factory
                .log()
                .lock()
                .contains(&HostOp::FinishDisappearing { id: host })
        );
    }

    #[test]
    fn test_recycled_host_does_not_keep_faded_alpha() {
        let factory = RecordingFactory::new();
        let mut state = mount_state(&factory, RenderConfig::default());
        let first = lay_out(1, Component::column(vec![spacer(), card(fade_out())]).build(), None);
        state.mount(first.clone(), None).unwrap();
        let second = lay_out(2, Component::column(vec![spacer()]).build(), Some(&first));
        state.mount(second.clone(), None).unwrap();
        state.advance_animations(100).unwrap();

        let other = Component::leaf("Other", TestLeaf::fixed(100.0, 50.0))
            .key("other")
            .wrap_in_view()
            .build();
        let third = lay_out(3, Component::column(vec![spacer(), other]).build(), Some(&second));
        let stats = state.mount(third.clone(), None).unwrap();
        assert_eq!(stats.recycled, 2);

        let host = third
            .outputs()
            .iter()
            .find(|u| u.is_host() && u.id() != ROOT_HOST_ID)
            .unwrap();
        assert_eq!(state.item(host.id()).unwrap().property(AnimatedProperty::Alpha), 1.0);
    }
}
