//! Measured result cache.
//!
//! Some components are measured during resolve (a render callback asking how
//! big a child would be). Those measurements are recorded here so layout
//! reuses them instead of calling user measure code again.
//!
//! Entries are keyed by component identity (the `Arc` allocation) plus the
//! size spec pair. A cache is frozen once the computation that owns it
//! commits; the next computation's cache delegates reads to it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::engine::ComponentRef;
use crate::types::{Size, SizeSpec};

type CacheKey = (usize, SizeSpec, SizeSpec);

struct CachedMeasurement {
    // Holding the component keeps its address from being reused.
    _component: ComponentRef,
    size: Size,
}

fn component_address(component: &ComponentRef) -> usize {
    Arc::as_ptr(component) as *const () as usize
}

/// Write-once measurement cache with a read delegate.
#[derive(Default)]
pub struct MeasuredResultCache {
    entries: RwLock<HashMap<CacheKey, CachedMeasurement>>,
    delegate: RwLock<Option<Arc<MeasuredResultCache>>>,
    frozen: AtomicBool,
}

impl MeasuredResultCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A fresh cache reading through to `delegate` on misses.
    pub fn with_delegate(delegate: Arc<MeasuredResultCache>) -> Arc<Self> {
        Arc::new(Self {
            delegate: RwLock::new(Some(delegate)),
            ..Self::default()
        })
    }

    /// Look up a measurement here, then in the delegate.
    pub fn get(&self, component: &ComponentRef, width: SizeSpec, height: SizeSpec) -> Option<Size> {
        let key = (component_address(component), width, height);
        if let Some(entry) = self.entries.read().get(&key) {
            return Some(entry.size);
        }
        let delegate = self.delegate.read().clone();
        delegate.and_then(|d| d.get(component, width, height))
    }

    /// Record a measurement. Ignored (returns `false`) once frozen.
    pub fn record(
        &self,
        component: &ComponentRef,
        width: SizeSpec,
        height: SizeSpec,
        size: Size,
    ) -> bool {
        if self.is_frozen() {
            log::trace!("measured cache frozen, dropping entry for {}", component.name());
            return false;
        }
        self.entries.write().insert(
            (component_address(component), width, height),
            CachedMeasurement {
                _component: component.clone(),
                size,
            },
        );
        true
    }

    /// Make the cache read-only and cut its own delegate chain.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
        self.delegate.write().take();
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Entries held directly by this cache.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Component;
    use crate::testing::TestLeaf;

    #[test]
    fn test_record_and_read_through_delegate() {
        let text = Component::leaf("Text", TestLeaf::fixed(10.0, 4.0)).build();
        let spec = SizeSpec::at_most(100.0);

        let committed = MeasuredResultCache::new();
        assert!(committed.record(&text, spec, spec, Size::new(10.0, 4.0)));
        committed.freeze();

        let next = MeasuredResultCache::with_delegate(committed.clone());
        assert_eq!(next.get(&text, spec, spec), Some(Size::new(10.0, 4.0)));
        assert_eq!(next.get(&text, SizeSpec::exactly(5.0), spec), None);
        assert!(next.is_empty());
    }

    #[test]
    fn test_frozen_cache_ignores_writes() {
        let text = Component::leaf("Text", TestLeaf::fixed(1.0, 1.0)).build();
        let cache = MeasuredResultCache::new();
        cache.freeze();

        assert!(!cache.record(&text, SizeSpec::unspecified(), SizeSpec::unspecified(), Size::ZERO));
        assert_eq!(cache.get(&text, SizeSpec::unspecified(), SizeSpec::unspecified()), None);
    }

    #[test]
    fn test_identity_not_equality() {
        let a = Component::leaf("Text", TestLeaf::fixed(1.0, 1.0)).build();
        let b = Component::leaf("Text", TestLeaf::fixed(1.0, 1.0)).build();
        let cache = MeasuredResultCache::new();
        let spec = SizeSpec::unspecified();
        cache.record(&a, spec, spec, Size::new(1.0, 1.0));
        assert!(cache.get(&b, spec, spec).is_none());
    }
}
