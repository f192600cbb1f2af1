//! Time-travel debugging.
//!
//! With `time_travel` on, every committed layout leaves a [`DebugSnapshot`]
//! in a bounded [`DebugHistory`]. A snapshot keeps the root component and the
//! frozen component states, so the tree can lay out any recorded revision
//! again; the serializable part (tree description, states, debug props) can
//! be exported as JSON.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::engine::{ComponentRef, StateRef};
use crate::resolve::{NodeId, ResolvedTree};
use crate::types::SizeSpec;

/// One committed revision of a tree.
#[derive(Clone, Serialize)]
pub struct DebugSnapshot {
    pub revision: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Indented node outline, one line per node.
    pub root_description: String,
    /// Debug rendering of every state, by global key.
    pub frozen_state: BTreeMap<String, String>,
    /// Debug props declared by components, by global key.
    pub props: BTreeMap<String, BTreeMap<String, String>>,
    pub width: SizeSpec,
    pub height: SizeSpec,
    #[serde(skip)]
    pub(crate) root: ComponentRef,
    #[serde(skip)]
    pub(crate) states: HashMap<String, StateRef>,
}

impl DebugSnapshot {
    pub(crate) fn capture(tree: &ResolvedTree, width: SizeSpec, height: SizeSpec) -> Self {
        let mut root_description = String::new();
        if let Some(root) = tree.root() {
            describe(tree, root, 0, &mut root_description);
        }

        let frozen_state = tree
            .states()
            .iter()
            .map(|(key, state)| (key.clone(), format!("{:?}", state)))
            .collect();

        let mut props = BTreeMap::new();
        for id in tree.preorder() {
            for entry in &tree.node(id).components {
                let declared = entry.component.debug_props();
                if !declared.is_empty() {
                    props.insert(entry.global_key.clone(), declared.clone());
                }
            }
        }

        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            revision: tree.version(),
            timestamp_ms,
            root_description,
            frozen_state,
            props,
            width,
            height,
            root: tree.root_component().clone(),
            states: tree.states().clone(),
        }
    }

    /// Unique key of the snapshot: revision followed by timestamp.
    pub fn key(&self) -> String {
        format!("{}{}", self.revision, self.timestamp_ms)
    }

    pub fn root(&self) -> &ComponentRef {
        &self.root
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Debug for DebugSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugSnapshot")
            .field("revision", &self.revision)
            .field("timestamp_ms", &self.timestamp_ms)
            .field("states", &self.frozen_state.len())
            .finish()
    }
}

fn describe(tree: &ResolvedTree, id: NodeId, depth: usize, out: &mut String) {
    let node = tree.node(id);
    let names: Vec<&str> = node.components.iter().rev().map(|c| c.component.name()).collect();
    let _ = writeln!(
        out,
        "{:indent$}{} [{}] {}",
        "",
        names.join(" > "),
        node.content.name(),
        node.global_key(),
        indent = depth * 2
    );
    for child in &node.children {
        describe(tree, *child, depth + 1, out);
    }
}

/// Bounded history of snapshots, oldest first.
#[derive(Debug, Default)]
pub struct DebugHistory {
    capacity: usize,
    snapshots: VecDeque<DebugSnapshot>,
}

impl DebugHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            snapshots: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, snapshot: DebugSnapshot) {
        if self.capacity == 0 {
            return;
        }
        while self.snapshots.len() >= self.capacity {
            self.snapshots.pop_front();
        }
        log::trace!("recorded snapshot {}", snapshot.key());
        self.snapshots.push_back(snapshot);
    }

    pub fn get(&self, revision: u64) -> Option<&DebugSnapshot> {
        self.snapshots.iter().find(|s| s.revision == revision)
    }

    pub fn latest(&self) -> Option<&DebugSnapshot> {
        self.snapshots.back()
    }

    pub fn revisions(&self) -> Vec<u64> {
        self.snapshots.iter().map(|s| s.revision).collect()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Component;
    use crate::resolve::{ResolveEnv, resolve};
    use crate::testing::TestLeaf;
    use std::sync::Arc;

    fn snapshot(version: u64) -> DebugSnapshot {
        let root = Component::column(vec![
            Component::leaf("Text", TestLeaf::fixed(10.0, 10.0))
                .key("title")
                .debug_prop("text", "hello")
                .initial_state(Arc::new(|| Arc::new(7u32) as StateRef))
                .build(),
        ])
        .build();
        let tree = resolve(ResolveEnv::detached(version), root)
            .unwrap()
            .into_tree()
            .unwrap();
        DebugSnapshot::capture(&tree, SizeSpec::exactly(100.0), SizeSpec::unspecified())
    }

    #[test]
    fn test_snapshot_describes_tree() {
        let snap = snapshot(3);
        assert_eq!(snap.revision, 3);
        assert_eq!(snap.root_description.lines().count(), 2);
        assert!(snap.root_description.lines().nth(1).unwrap().starts_with("  Text"));
        assert_eq!(snap.frozen_state.values().next().map(String::as_str), Some("7"));
        assert!(snap.key().starts_with('3'));
    }

    #[test]
    fn test_json_export_skips_live_values() {
        let json = snapshot(1).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["revision"], 1);
        assert!(value.get("root").is_none());
        let props = value["props"].as_object().unwrap();
        assert_eq!(props.values().next().unwrap()["text"], "hello");
    }

    #[test]
    fn test_history_drops_oldest() {
        let mut history = DebugHistory::new(2);
        for version in 1..=3 {
            history.record(snapshot(version));
        }
        assert_eq!(history.revisions(), vec![2, 3]);
        assert!(history.get(1).is_none());
        assert_eq!(history.latest().unwrap().revision, 3);
    }
}
