//! Incremental mount - viewport driven acquire/release of outputs.
//!
//! An output is wanted when it intersects the visible rect, or when it is
//! always mounted (the root host and hosts of nested render trees). With
//! the outputs sorted by top and by bottom edge, two cursors describe the
//! wanted set for a rect:
//!
//! ```text
//! tops:    [ top < rect.bottom ........ | top >= rect.bottom ... ]
//!                                       ^ tops_index
//! bottoms: [ bottom <= rect.top ... | bottom > rect.top ........ ]
//!                                   ^ bottoms_index
//! ```
//!
//! A vertical scroll only moves the cursors; the outputs they pass over are
//! the only ones whose state can change. A horizontal change, a new layout
//! or a missing previous rect falls back to a full scan.

use std::collections::HashMap;

use crate::error::{RenderError, RenderResult};
use crate::layout::{LayoutState, ROOT_HOST_ID, RenderUnit};
use crate::types::Rect;

/// Mount reference of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceState {
    Acquired,
    Released,
}

impl ReferenceState {
    fn name(self) -> &'static str {
        match self {
            Self::Acquired => "acquired",
            Self::Released => "released",
        }
    }
}

/// A reference transition mount has to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceChange {
    Acquired(u64),
    Released(u64),
}

/// Cursor state over one layout.
#[derive(Debug, Default)]
pub struct IncrementalMountExtension {
    references: HashMap<u64, ReferenceState>,
    tops_index: usize,
    bottoms_index: usize,
    previous_rect: Option<Rect>,
    layout_version: Option<u64>,
}

/// Outputs mounted regardless of the rect.
pub fn is_always_mounted(unit: &RenderUnit) -> bool {
    unit.id() == ROOT_HOST_ID || unit.hosts_nested_tree()
}

fn intersects_horizontally(bounds: Rect, rect: Rect) -> bool {
    bounds.left < rect.right && rect.left < bounds.right
}

fn is_wanted(unit: &RenderUnit, rect: Rect) -> bool {
    let b = unit.bounds();
    is_always_mounted(unit)
        || (b.top < rect.bottom && b.bottom > rect.top && intersects_horizontally(b, rect))
}

impl IncrementalMountExtension {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_acquired(&self, id: u64) -> bool {
        self.references.get(&id) == Some(&ReferenceState::Acquired)
    }

    pub fn reference_state(&self, id: u64) -> Option<ReferenceState> {
        self.references.get(&id).copied()
    }

    pub fn acquired_count(&self) -> usize {
        self.references
            .values()
            .filter(|&&state| state == ReferenceState::Acquired)
            .count()
    }

    pub fn previous_rect(&self) -> Option<Rect> {
        self.previous_rect
    }

    /// Cursor positions, tops first.
    pub fn cursors(&self) -> (usize, usize) {
        (self.tops_index, self.bottoms_index)
    }

    /// Take a reference. Returns whether the output was not acquired yet.
    pub fn acquire(&mut self, id: u64) -> bool {
        self.references.insert(id, ReferenceState::Acquired) != Some(ReferenceState::Acquired)
    }

    /// Drop a reference.
    ///
    /// Releasing twice is an invariant violation. Releasing an output that
    /// was never acquired does nothing.
    pub fn release(&mut self, id: u64) -> RenderResult<bool> {
        match self.references.get(&id).copied() {
            Some(ReferenceState::Acquired) => {
                self.references.insert(id, ReferenceState::Released);
                Ok(true)
            }
            Some(ReferenceState::Released) => Err(RenderError::DoubleRelease { id }),
            None => {
                log::debug!("release of output {id:#x} that was never acquired");
                Ok(false)
            }
        }
    }

    /// Forget an output that left the layout.
    pub fn forget(&mut self, id: u64) {
        self.references.remove(&id);
    }

    /// Whether the cursors cannot be carried over to `rect`.
    pub fn needs_full_scan(&self, layout: &LayoutState, rect: Rect) -> bool {
        match self.previous_rect {
            None => true,
            Some(previous) => {
                self.layout_version != Some(layout.version())
                    || previous.left != rect.left
                    || previous.right != rect.right
            }
        }
    }

    /// Bring references in line with `rect`, scanning as little as possible.
    pub fn update(&mut self, layout: &LayoutState, rect: Rect) -> RenderResult<Vec<ReferenceChange>> {
        if self.needs_full_scan(layout, rect) {
            self.init_incremental_mount(layout, rect)
        } else {
            self.scroll(layout, rect)
        }
    }

    /// Full scan: every output is checked against `rect`.
    pub fn init_incremental_mount(
        &mut self,
        layout: &LayoutState,
        rect: Rect,
    ) -> RenderResult<Vec<ReferenceChange>> {
        let mut changes = Vec::new();
        for unit in layout.outputs() {
            let id = unit.id();
            if is_wanted(unit, rect) {
                if self.acquire(id) {
                    changes.push(ReferenceChange::Acquired(id));
                }
            } else if self.is_acquired(id) && self.release(id)? {
                changes.push(ReferenceChange::Released(id));
            }
        }

        let outputs = layout.outputs();
        self.tops_index = layout
            .tops()
            .partition_point(|&i| outputs[i].bounds().top < rect.bottom);
        self.bottoms_index = layout
            .bottoms()
            .partition_point(|&i| outputs[i].bounds().bottom <= rect.top);
        self.previous_rect = Some(rect);
        self.layout_version = Some(layout.version());
        log::trace!(
            "incremental mount init: {} changes, cursors ({}, {})",
            changes.len(),
            self.tops_index,
            self.bottoms_index
        );
        Ok(changes)
    }

    /// Vertical scroll: move the cursors and touch only what they pass.
    fn scroll(&mut self, layout: &LayoutState, rect: Rect) -> RenderResult<Vec<ReferenceChange>> {
        let outputs = layout.outputs();
        let tops = layout.tops();
        let bottoms = layout.bottoms();
        let mut changes = Vec::new();

        // Bottom edge: outputs entering or leaving below.
        while self.tops_index < tops.len() && outputs[tops[self.tops_index]].bounds().top < rect.bottom {
            let unit = &outputs[tops[self.tops_index]];
            self.tops_index += 1;
            if is_wanted(unit, rect) && self.acquire(unit.id()) {
                changes.push(ReferenceChange::Acquired(unit.id()));
            }
        }
        while self.tops_index > 0 && outputs[tops[self.tops_index - 1]].bounds().top >= rect.bottom {
            self.tops_index -= 1;
            let unit = &outputs[tops[self.tops_index]];
            if !is_wanted(unit, rect) && self.is_acquired(unit.id()) && self.release(unit.id())? {
                changes.push(ReferenceChange::Released(unit.id()));
            }
        }

        // Top edge: outputs leaving or entering above.
        while self.bottoms_index < bottoms.len()
            && outputs[bottoms[self.bottoms_index]].bounds().bottom <= rect.top
        {
            let unit = &outputs[bottoms[self.bottoms_index]];
            self.bottoms_index += 1;
            if !is_wanted(unit, rect) && self.is_acquired(unit.id()) && self.release(unit.id())? {
                changes.push(ReferenceChange::Released(unit.id()));
            }
        }
        while self.bottoms_index > 0
            && outputs[bottoms[self.bottoms_index - 1]].bounds().bottom > rect.top
        {
            self.bottoms_index -= 1;
            let unit = &outputs[bottoms[self.bottoms_index]];
            if is_wanted(unit, rect) && self.acquire(unit.id()) {
                changes.push(ReferenceChange::Acquired(unit.id()));
            }
        }

        self.previous_rect = Some(rect);
        Ok(changes)
    }

    /// Acquire everything, for mounting without a visible rect.
    pub fn acquire_all(&mut self, layout: &LayoutState) -> Vec<ReferenceChange> {
        let changes = layout
            .outputs()
            .iter()
            .filter_map(|unit| self.acquire(unit.id()).then_some(ReferenceChange::Acquired(unit.id())))
            .collect();
        self.previous_rect = None;
        self.layout_version = Some(layout.version());
        changes
    }

    pub fn clear(&mut self) {
        self.references.clear();
        self.previous_rect = None;
        self.layout_version = None;
        self.tops_index = 0;
        self.bottoms_index = 0;
    }
}

impl ReferenceChange {
    pub fn id(&self) -> u64 {
        match *self {
            Self::Acquired(id) | Self::Released(id) => id,
        }
    }
}

impl std::fmt::Display for ReferenceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Component, ComponentRef};
    use crate::layout::{LayoutOutcome, calculate_layout};
    use crate::resolve::{ResolveEnv, resolve};
    use crate::testing::TestLeaf;
    use crate::types::SizeSpec;
    use std::collections::HashSet;

    /// Column of `count` rows, 10 px each.
    fn list(count: usize) -> LayoutState {
        let rows: Vec<ComponentRef> = (0..count)
            .map(|i| {
                Component::leaf("Row", TestLeaf::fixed(100.0, 10.0))
                    .key(format!("row{i}"))
                    .build()
            })
            .collect();
        let env = ResolveEnv::detached(1);
        let tree = resolve(env.clone(), Component::column(rows).build())
            .unwrap()
            .into_tree()
            .unwrap();
        match calculate_layout(&env, &tree, SizeSpec::exactly(100.0), SizeSpec::unspecified(), None, false)
            .unwrap()
        {
            LayoutOutcome::Complete(state) => state,
            LayoutOutcome::Cancelled => panic!("cancelled"),
        }
    }

    fn acquired(ext: &IncrementalMountExtension, layout: &LayoutState) -> HashSet<u64> {
        layout
            .outputs()
            .iter()
            .map(|u| u.id())
            .filter(|&id| ext.is_acquired(id))
            .collect()
    }

    #[test]
    fn test_init_acquires_intersecting_and_root() {
        let layout = list(10);
        let mut ext = IncrementalMountExtension::new();
        ext.init_incremental_mount(&layout, Rect::new(0, 0, 100, 25)).unwrap();
        // root host plus rows 0..=2
        assert_eq!(ext.acquired_count(), 4);
        assert!(ext.is_acquired(ROOT_HOST_ID));
    }

    #[test]
    fn test_scroll_matches_full_scan() {
        let layout = list(30);
        let mut stepped = IncrementalMountExtension::new();
        stepped.init_incremental_mount(&layout, Rect::new(0, 0, 100, 50)).unwrap();

        let offsets = [5, 17, 40, 120, 80, 81, 250, 0, 33];
        for &top in &offsets {
            let rect = Rect::new(0, top, 100, top + 50);
            stepped.update(&layout, rect).unwrap();

            let mut fresh = IncrementalMountExtension::new();
            fresh.init_incremental_mount(&layout, rect).unwrap();
            assert_eq!(acquired(&stepped, &layout), acquired(&fresh, &layout), "top {top}");
            assert_eq!(stepped.cursors(), fresh.cursors(), "top {top}");
        }
    }

    #[test]
    fn test_horizontal_change_forces_full_scan() {
        let layout = list(5);
        let mut ext = IncrementalMountExtension::new();
        ext.init_incremental_mount(&layout, Rect::new(0, 0, 100, 20)).unwrap();
        assert!(!ext.needs_full_scan(&layout, Rect::new(0, 10, 100, 30)));
        assert!(ext.needs_full_scan(&layout, Rect::new(5, 10, 105, 30)));
    }

    #[test]
    fn test_release_rules() {
        let mut ext = IncrementalMountExtension::new();
        assert!(!ext.release(7).unwrap());
        assert!(ext.acquire(7));
        assert!(!ext.acquire(7));
        assert!(ext.release(7).unwrap());
        assert!(matches!(ext.release(7), Err(RenderError::DoubleRelease { id: 7 })));
    }

    #[test]
    fn test_scroll_reports_only_changes() {
        let layout = list(10);
        let mut ext = IncrementalMountExtension::new();
        ext.init_incremental_mount(&layout, Rect::new(0, 0, 100, 20)).unwrap();
        let changes = ext.update(&layout, Rect::new(0, 10, 100, 30)).unwrap();
        // row0 leaves, row2 enters
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().any(|c| matches!(c, ReferenceChange::Acquired(_))));
        assert!(changes.iter().any(|c| matches!(c, ReferenceChange::Released(_))));
    }
}
