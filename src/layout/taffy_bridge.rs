//! Taffy Bridge - Integration with the Taffy layout engine
//!
//! Converts [`NodeStyle`] to Taffy styles, mirrors a result arena into a
//! `TaffyTree` (one solver node per layout node) and maps between
//! [`SizeSpec`]s and Taffy's available space.
//!
//! Taffy is treated as a black box: it calls back into the layout engine
//! for every leaf and nested tree holder through its measure function.

use taffy::{
    AlignContent as TaffyAlignContent, AlignItems as TaffyAlignItems,
    AlignSelf as TaffyAlignSelf, AvailableSpace, Dimension as TaffyDimension, Display,
    FlexDirection as TaffyFlexDirection, FlexWrap as TaffyFlexWrap,
    JustifyContent as TaffyJustifyContent, LengthPercentage, LengthPercentageAuto, NodeId,
    Position as TaffyPosition, Rect, Size, Style, TaffyTree,
};

use crate::resolve::{NodeContent, NodeStyle};
use crate::types::{
    AlignContent, AlignItems, AlignSelf, Dimension, Edges, FlexDirection, FlexWrap,
    JustifyContent, PositionType, SizeMode, SizeSpec,
};

use super::LayoutResultTree;

// =============================================================================
// DIMENSION CONVERSION
// =============================================================================

/// Convert our Dimension to Taffy's Dimension.
fn to_taffy_dimension(dim: Dimension) -> TaffyDimension {
    match dim {
        Dimension::Auto => TaffyDimension::Auto,
        Dimension::Px(n) => TaffyDimension::Length(n),
        Dimension::Percent(p) => TaffyDimension::Percent(p / 100.0),
    }
}

fn to_taffy_inset(value: Option<f32>) -> LengthPercentageAuto {
    match value {
        Some(v) => LengthPercentageAuto::Length(v),
        None => LengthPercentageAuto::Auto,
    }
}

fn to_taffy_margin(edges: Edges) -> Rect<LengthPercentageAuto> {
    Rect {
        left: LengthPercentageAuto::Length(edges.left),
        right: LengthPercentageAuto::Length(edges.right),
        top: LengthPercentageAuto::Length(edges.top),
        bottom: LengthPercentageAuto::Length(edges.bottom),
    }
}

fn to_taffy_edges(edges: Edges) -> Rect<LengthPercentage> {
    Rect {
        left: LengthPercentage::Length(edges.left),
        right: LengthPercentage::Length(edges.right),
        top: LengthPercentage::Length(edges.top),
        bottom: LengthPercentage::Length(edges.bottom),
    }
}

/// Solver edge widths back to ours.
pub(crate) fn from_taffy_edges(rect: Rect<f32>) -> Edges {
    Edges::new(rect.left, rect.top, rect.right, rect.bottom)
}

// =============================================================================
// ENUM CONVERSIONS
// =============================================================================

fn to_taffy_flex_direction(dir: FlexDirection) -> TaffyFlexDirection {
    match dir {
        FlexDirection::Column => TaffyFlexDirection::Column,
        FlexDirection::Row => TaffyFlexDirection::Row,
        FlexDirection::ColumnReverse => TaffyFlexDirection::ColumnReverse,
        FlexDirection::RowReverse => TaffyFlexDirection::RowReverse,
    }
}

fn to_taffy_flex_wrap(wrap: FlexWrap) -> TaffyFlexWrap {
    match wrap {
        FlexWrap::NoWrap => TaffyFlexWrap::NoWrap,
        FlexWrap::Wrap => TaffyFlexWrap::Wrap,
        FlexWrap::WrapReverse => TaffyFlexWrap::WrapReverse,
    }
}

fn to_taffy_justify_content(justify: JustifyContent) -> Option<TaffyJustifyContent> {
    Some(match justify {
        JustifyContent::FlexStart => TaffyJustifyContent::FlexStart,
        JustifyContent::Center => TaffyJustifyContent::Center,
        JustifyContent::FlexEnd => TaffyJustifyContent::FlexEnd,
        JustifyContent::SpaceBetween => TaffyJustifyContent::SpaceBetween,
        JustifyContent::SpaceAround => TaffyJustifyContent::SpaceAround,
        JustifyContent::SpaceEvenly => TaffyJustifyContent::SpaceEvenly,
    })
}

fn to_taffy_align_items(align: AlignItems) -> Option<TaffyAlignItems> {
    Some(match align {
        AlignItems::Stretch => TaffyAlignItems::Stretch,
        AlignItems::FlexStart => TaffyAlignItems::FlexStart,
        AlignItems::Center => TaffyAlignItems::Center,
        AlignItems::FlexEnd => TaffyAlignItems::FlexEnd,
        AlignItems::Baseline => TaffyAlignItems::Baseline,
    })
}

fn to_taffy_align_content(align: AlignContent) -> Option<TaffyAlignContent> {
    Some(match align {
        AlignContent::Stretch => TaffyAlignContent::Stretch,
        AlignContent::FlexStart => TaffyAlignContent::FlexStart,
        AlignContent::Center => TaffyAlignContent::Center,
        AlignContent::FlexEnd => TaffyAlignContent::FlexEnd,
        AlignContent::SpaceBetween => TaffyAlignContent::SpaceBetween,
        AlignContent::SpaceAround => TaffyAlignContent::SpaceAround,
    })
}

fn to_taffy_align_self(align: AlignSelf) -> Option<TaffyAlignSelf> {
    match align {
        AlignSelf::Auto => None, // inherit from parent
        AlignSelf::Stretch => Some(TaffyAlignSelf::Stretch),
        AlignSelf::FlexStart => Some(TaffyAlignSelf::FlexStart),
        AlignSelf::Center => Some(TaffyAlignSelf::Center),
        AlignSelf::FlexEnd => Some(TaffyAlignSelf::FlexEnd),
        AlignSelf::Baseline => Some(TaffyAlignSelf::Baseline),
    }
}

fn to_taffy_position(position: PositionType) -> TaffyPosition {
    match position {
        PositionType::Relative => TaffyPosition::Relative,
        PositionType::Absolute => TaffyPosition::Absolute,
    }
}

// =============================================================================
// STYLE BUILDING
// =============================================================================

/// Build a Taffy Style from a node style.
pub(crate) fn build_style(node: &NodeStyle) -> Style {
    let [left, top, right, bottom] = node.inset;
    Style {
        display: Display::Flex,
        position: to_taffy_position(node.position),
        inset: Rect {
            left: to_taffy_inset(left),
            right: to_taffy_inset(right),
            top: to_taffy_inset(top),
            bottom: to_taffy_inset(bottom),
        },

        // Flex container properties
        flex_direction: to_taffy_flex_direction(node.flex_direction),
        flex_wrap: to_taffy_flex_wrap(node.flex_wrap),
        justify_content: to_taffy_justify_content(node.justify_content),
        align_items: to_taffy_align_items(node.align_items),
        align_content: to_taffy_align_content(node.align_content),

        // Flex item properties
        flex_grow: node.flex_grow,
        flex_shrink: node.flex_shrink,
        flex_basis: to_taffy_dimension(node.flex_basis),
        align_self: to_taffy_align_self(node.align_self),

        // Dimensions
        size: Size {
            width: to_taffy_dimension(node.width),
            height: to_taffy_dimension(node.height),
        },
        min_size: Size {
            width: to_taffy_dimension(node.min_width),
            height: to_taffy_dimension(node.min_height),
        },
        max_size: Size {
            width: to_taffy_dimension(node.max_width),
            height: to_taffy_dimension(node.max_height),
        },

        margin: to_taffy_margin(node.margin),
        padding: to_taffy_edges(node.padding),
        border: to_taffy_edges(node.border),
        gap: Size {
            width: LengthPercentage::Length(node.gap),
            height: LengthPercentage::Length(node.gap),
        },

        ..Default::default()
    }
}

/// Root style: an exact spec pins the root's size.
fn build_root_style(node: &NodeStyle, width: SizeSpec, height: SizeSpec) -> Style {
    let mut style = build_style(node);
    if width.mode == SizeMode::Exactly {
        style.size.width = TaffyDimension::Length(width.size);
    }
    if height.mode == SizeMode::Exactly {
        style.size.height = TaffyDimension::Length(height.size);
    }
    style
}

// =============================================================================
// SIZE SPECS
// =============================================================================

/// Available space for one axis of a root spec.
pub(crate) fn to_available_space(spec: SizeSpec) -> AvailableSpace {
    match spec.mode {
        SizeMode::Exactly | SizeMode::AtMost => AvailableSpace::Definite(spec.size),
        SizeMode::Unspecified => AvailableSpace::MaxContent,
    }
}

/// Spec for one axis of a measure callback.
pub(crate) fn to_size_spec(known: Option<f32>, available: AvailableSpace) -> SizeSpec {
    match (known, available) {
        (Some(size), _) => SizeSpec::exactly(size),
        (None, AvailableSpace::Definite(size)) => SizeSpec::at_most(size),
        (None, AvailableSpace::MinContent | AvailableSpace::MaxContent) => SizeSpec::unspecified(),
    }
}

// =============================================================================
// TREE MIRROR
// =============================================================================

/// Mirror a result arena into a solver tree.
///
/// Leaves and nested tree holders carry their arena index as measure
/// context. Returns the tree and the solver node of every arena entry.
pub(crate) fn build_solver_tree(
    results: &LayoutResultTree,
    width: SizeSpec,
    height: SizeSpec,
) -> Result<(TaffyTree<usize>, Vec<NodeId>), taffy::TaffyError> {
    let mut tree: TaffyTree<usize> = TaffyTree::with_capacity(results.len());
    let mut solver_nodes = Vec::with_capacity(results.len());

    for (index, result) in results.nodes.iter().enumerate() {
        let style = if Some(index) == results.root {
            build_root_style(&result.node.style, width, height)
        } else {
            build_style(&result.node.style)
        };
        let solver_node = match result.node.content {
            NodeContent::Container => tree.new_leaf(style)?,
            NodeContent::Leaf(_) | NodeContent::NestedTreeHolder(_) => {
                tree.new_leaf_with_context(style, index)?
            }
        };
        solver_nodes.push(solver_node);
    }

    for (index, result) in results.nodes.iter().enumerate() {
        for &child in &result.children {
            tree.add_child(solver_nodes[index], solver_nodes[child])?;
        }
    }

    Ok((tree, solver_nodes))
}
