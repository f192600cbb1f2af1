//! Layout result tree.
//!
//! One [`ResultNode`] per laid out [`LayoutNode`], holding solver geometry
//! relative to the parent and the measurement bookkeeping the next pass
//! needs. Nested trees are grafted in below their holder once resolved.

use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::engine::StateRef;
use crate::resolve::LayoutNode;
use crate::types::{Edges, Rect, Size, SizeSpec};

/// A measurement taken for a leaf under one spec pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasureRecord {
    pub width_spec: SizeSpec,
    pub height_spec: SizeSpec,
    pub size: Size,
}

/// A nested tree laid out for its holder under one spec pair.
pub(crate) struct NestedResult {
    pub width_spec: SizeSpec,
    pub height_spec: SizeSpec,
    pub tree: LayoutResultTree,
}

/// Geometry and measurement data of one node.
pub struct ResultNode {
    pub node: Arc<LayoutNode>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Position relative to the parent's border box.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub padding: Edges,
    pub border: Edges,
    /// Specs of the last measurement in this pass.
    pub last_width_spec: Option<SizeSpec>,
    pub last_height_spec: Option<SizeSpec>,
    pub last_measured: Option<Size>,
    pub measurements: SmallVec<[MeasureRecord; 2]>,
    pub(crate) nested: Option<NestedResult>,
}

impl ResultNode {
    pub(crate) fn new(node: Arc<LayoutNode>, parent: Option<usize>) -> Self {
        Self {
            node,
            parent,
            children: Vec::new(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            padding: Edges::ZERO,
            border: Edges::ZERO,
            last_width_spec: None,
            last_height_spec: None,
            last_measured: None,
            measurements: SmallVec::new(),
            nested: None,
        }
    }

    /// Cached size when the last measurement used the same specs.
    pub fn cached_measurement(&self, width: SizeSpec, height: SizeSpec) -> Option<Size> {
        match (self.last_width_spec, self.last_height_spec, self.last_measured) {
            (Some(w), Some(h), Some(size)) if w == width && h == height => Some(size),
            _ => None,
        }
    }

    pub(crate) fn record_measurement(&mut self, width: SizeSpec, height: SizeSpec, size: Size) {
        self.last_width_spec = Some(width);
        self.last_height_spec = Some(height);
        self.last_measured = Some(size);
        if !self
            .measurements
            .iter()
            .any(|m| m.width_spec == width && m.height_spec == height)
        {
            self.measurements.push(MeasureRecord {
                width_spec: width,
                height_spec: height,
                size,
            });
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// Arena of result nodes for one layout pass.
pub struct LayoutResultTree {
    pub(crate) nodes: Vec<ResultNode>,
    pub(crate) root: Option<usize>,
    pub(crate) width_spec: SizeSpec,
    pub(crate) height_spec: SizeSpec,
    pub(crate) states: HashMap<String, StateRef>,
}

impl LayoutResultTree {
    pub(crate) fn new(width_spec: SizeSpec, height_spec: SizeSpec) -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            width_spec,
            height_spec,
            states: HashMap::new(),
        }
    }

    pub fn root(&self) -> Option<usize> {
        self.root
    }

    pub fn node(&self, index: usize) -> &ResultNode {
        &self.nodes[index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Size of the root, zero for an empty tree.
    pub fn root_size(&self) -> Size {
        self.root.map_or(Size::ZERO, |root| self.nodes[root].size())
    }

    /// Pixel bounds of a node in root coordinates.
    pub fn absolute_bounds(&self, index: usize) -> Rect {
        let mut x = 0.0;
        let mut y = 0.0;
        let mut current = Some(index);
        while let Some(i) = current {
            x += self.nodes[i].x;
            y += self.nodes[i].y;
            current = self.nodes[i].parent;
        }
        let node = &self.nodes[index];
        pixel_rect(x, y, node.width, node.height)
    }

    /// Append `nested` below `holder`.
    pub(crate) fn graft(&mut self, holder: usize, nested: LayoutResultTree) {
        let offset = self.nodes.len();
        let nested_root = nested.root;
        for mut node in nested.nodes {
            node.parent = match node.parent {
                Some(parent) => Some(parent + offset),
                None => Some(holder),
            };
            for child in &mut node.children {
                *child += offset;
            }
            self.nodes.push(node);
        }
        if let Some(root) = nested_root {
            let root = root + offset;
            // The nested root fills the holder.
            self.nodes[root].x = 0.0;
            self.nodes[root].y = 0.0;
            self.nodes[holder].children.push(root);
        }
        self.states.extend(nested.states);
    }
}

/// Round edges independently so adjacent outputs never overlap or gap.
pub(crate) fn pixel_rect(x: f32, y: f32, width: f32, height: f32) -> Rect {
    Rect::new(
        x.round() as i32,
        y.round() as i32,
        (x + width).round() as i32,
        (y + height).round() as i32,
    )
}

impl std::fmt::Debug for LayoutResultTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutResultTree")
            .field("nodes", &self.nodes.len())
            .field("root", &self.root)
            .field("size", &self.root_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_rect_rounds_edges() {
        assert_eq!(pixel_rect(0.4, 0.6, 10.2, 10.0), Rect::new(0, 1, 11, 11));
    }

    #[test]
    fn test_measurement_cache_requires_same_specs() {
        use crate::resolve::{LayoutNode, NodeComponent, NodeContent};
        use crate::engine::{Component, ErrorScope};
        use crate::testing::TestLeaf;

        let component = Component::leaf("Text", TestLeaf::fixed(1.0, 1.0)).build();
        let chain = smallvec::smallvec![NodeComponent {
            component,
            global_key: "1".into(),
            scope: ErrorScope::root(),
        }];
        let node = Arc::new(LayoutNode::new(chain, NodeContent::Container));
        let mut result = ResultNode::new(node, None);

        let w = SizeSpec::at_most(100.0);
        let h = SizeSpec::unspecified();
        result.record_measurement(w, h, Size::new(5.0, 5.0));
        result.record_measurement(w, h, Size::new(5.0, 5.0));

        assert_eq!(result.cached_measurement(w, h), Some(Size::new(5.0, 5.0)));
        assert_eq!(result.cached_measurement(SizeSpec::exactly(100.0), h), None);
        assert_eq!(result.measurements.len(), 1);
    }
}
