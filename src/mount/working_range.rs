//! Working ranges - callbacks when a component's output position enters or
//! leaves a window around the visible outputs.
//!
//! A [`WorkingRange`] decides, from the first and last visible output
//! positions, whether a registered position is in range. The container
//! remembers which registrations are in range and calls `on_enter` /
//! `on_exit` only on transitions.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::layout::WorkingRangeRecord;

/// Decides whether an output position is inside the range.
pub trait WorkingRange: Send + Sync {
    fn should_enter(&self, position: usize, first_visible: usize, last_visible: usize) -> bool;

    fn should_exit(&self, position: usize, first_visible: usize, last_visible: usize) -> bool {
        !self.should_enter(position, first_visible, last_visible)
    }
}

/// In range when within `offset` positions of the visible window.
#[derive(Debug, Clone, Copy)]
pub struct BoundaryWorkingRange {
    pub offset: usize,
}

impl BoundaryWorkingRange {
    pub fn new(offset: usize) -> Self {
        Self { offset }
    }
}

impl WorkingRange for BoundaryWorkingRange {
    fn should_enter(&self, position: usize, first_visible: usize, last_visible: usize) -> bool {
        position + self.offset >= first_visible && position <= last_visible + self.offset
    }
}

/// Callback for range transitions, called with the owner's global key.
pub type WorkingRangeCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// A named working range declared by a component.
#[derive(Clone)]
pub struct WorkingRangeSpec {
    pub name: String,
    pub range: Arc<dyn WorkingRange>,
    pub on_enter: WorkingRangeCallback,
    pub on_exit: WorkingRangeCallback,
}

impl WorkingRangeSpec {
    pub fn new(
        name: impl Into<String>,
        range: impl WorkingRange + 'static,
        on_enter: impl Fn(&str) + Send + Sync + 'static,
        on_exit: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            range: Arc::new(range),
            on_enter: Arc::new(on_enter),
            on_exit: Arc::new(on_exit),
        }
    }
}

impl fmt::Debug for WorkingRangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkingRangeSpec")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registrations currently in range, by (global key, range name).
#[derive(Debug, Default)]
pub struct WorkingRangeContainer {
    in_range: HashSet<(String, String)>,
}

impl WorkingRangeContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_range(&self, global_key: &str, name: &str) -> bool {
        self.in_range
            .contains(&(global_key.to_string(), name.to_string()))
    }

    /// Re-evaluate `records` against the visible output window.
    ///
    /// Registrations that disappeared from `records` while in range exit.
    pub fn check(&mut self, records: &[WorkingRangeRecord], first_visible: usize, last_visible: usize) {
        let mut current = HashSet::with_capacity(records.len());
        for record in records {
            let id = (record.global_key.clone(), record.spec.name.clone());
            let was_in = self.in_range.contains(&id);
            let range = &record.spec.range;
            if !was_in && range.should_enter(record.position, first_visible, last_visible) {
                log::trace!("{} entered working range {}", record.global_key, record.spec.name);
                (record.spec.on_enter)(&record.global_key);
                self.in_range.insert(id.clone());
            } else if was_in && range.should_exit(record.position, first_visible, last_visible) {
                log::trace!("{} exited working range {}", record.global_key, record.spec.name);
                (record.spec.on_exit)(&record.global_key);
                self.in_range.remove(&id);
            }
            current.insert(id);
        }

        let stale: Vec<(String, String)> = self.in_range.difference(&current).cloned().collect();
        for id in stale {
            self.in_range.remove(&id);
        }
    }

    pub fn clear(&mut self) {
        self.in_range.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, WorkingRangeSpec) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let enter = log.clone();
        let exit = log.clone();
        let spec = WorkingRangeSpec::new(
            "prefetch",
            BoundaryWorkingRange::new(2),
            move |key: &str| enter.lock().push(format!("enter {key}")),
            move |key: &str| exit.lock().push(format!("exit {key}")),
        );
        (log, spec)
    }

    #[test]
    fn test_boundary_range() {
        let range = BoundaryWorkingRange::new(2);
        assert!(range.should_enter(5, 3, 4));
        assert!(range.should_enter(1, 3, 4));
        assert!(!range.should_enter(7, 3, 4));
        assert!(!range.should_enter(0, 3, 4));
    }

    #[test]
    fn test_enter_and_exit_fire_on_transitions() {
        let (log, spec) = recorder();
        let records = vec![WorkingRangeRecord {
            spec,
            global_key: "1,img".into(),
            position: 10,
        }];
        let mut container = WorkingRangeContainer::new();

        container.check(&records, 0, 5);
        assert!(log.lock().is_empty());

        container.check(&records, 6, 9);
        container.check(&records, 7, 9);
        assert_eq!(*log.lock(), vec!["enter 1,img".to_string()]);
        assert!(container.is_in_range("1,img", "prefetch"));

        container.check(&records, 20, 25);
        assert_eq!(log.lock().len(), 2);
        assert!(!container.is_in_range("1,img", "prefetch"));
    }
}
