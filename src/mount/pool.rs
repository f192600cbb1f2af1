//! Content pools - bounded per content type recycling.
//!
//! Released content goes back to the pool of its [`ContentType`] unless the
//! pool is full or the content is not recyclable, in which case it is
//! dropped. Pools are owned by one `MountState`; nothing is global.

use std::collections::{HashMap, VecDeque};

use super::{ContentType, MountContent};

/// Recycled content keyed by content type.
pub struct ContentPools {
    pools: HashMap<ContentType, VecDeque<Box<dyn MountContent>>>,
    /// Per-type capacity overrides.
    capacities: HashMap<ContentType, usize>,
    default_capacity: usize,
    recycled: usize,
}

impl ContentPools {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            pools: HashMap::new(),
            capacities: HashMap::new(),
            default_capacity,
            recycled: 0,
        }
    }

    /// Override the capacity of one content type's pool.
    pub fn set_capacity(&mut self, content_type: ContentType, capacity: usize) {
        self.capacities.insert(content_type, capacity);
    }

    pub fn capacity(&self, content_type: &ContentType) -> usize {
        self.capacities
            .get(content_type)
            .copied()
            .unwrap_or(self.default_capacity)
    }

    /// Take a pooled instance, most recently released first.
    pub fn acquire(&mut self, content_type: &ContentType) -> Option<Box<dyn MountContent>> {
        let content = self.pools.get_mut(content_type)?.pop_back()?;
        self.recycled += 1;
        log::trace!("recycled {content_type} content");
        Some(content)
    }

    /// Offer released content back. Returns whether it was kept.
    pub fn release(&mut self, content_type: ContentType, content: Box<dyn MountContent>) -> bool {
        let capacity = self.capacity(&content_type);
        let pool = self.pools.entry(content_type).or_default();
        if pool.len() >= capacity {
            return false;
        }
        pool.push_back(content);
        true
    }

    /// Pooled instances of one type.
    pub fn len(&self, content_type: &ContentType) -> usize {
        self.pools.get(content_type).map_or(0, VecDeque::len)
    }

    /// Number of acquisitions served from a pool.
    pub fn recycled_count(&self) -> usize {
        self.recycled
    }

    pub fn clear(&mut self) {
        self.pools.clear();
    }
}

impl std::fmt::Debug for ContentPools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sizes: HashMap<&str, usize> = self
            .pools
            .iter()
            .map(|(ty, pool)| (ty.name(), pool.len()))
            .collect();
        f.debug_struct("ContentPools")
            .field("pools", &sizes)
            .field("default_capacity", &self.default_capacity)
            .finish()
    }
}
