//! Process-local store of monitoring regions: an ordered, name-keyed
//! mapping plus a LIFO stack of currently-open regions.
//!
//! The ordered mapping is a `BTreeMap<String, RegionId>` rather than a
//! hash map — a process registers at most a few hundred regions in
//! practice, so a balanced tree needs no hashing. Regions themselves live
//! in an arena
//! (`Vec<MonitoringRegion>`) and are addressed by index, sidestepping the
//! cyclic references a pointer-based open-region stack would create
//!.

use crate::filter::RegionFilter;
use crate::region::{MonitoringRegion, RegionId};
use std::collections::BTreeMap;

/// The distinguished region created at init and aliased by any
/// case-insensitive spelling of "Global".
pub const GLOBAL_REGION_NAME: &str = "Global";

/// Process-local region store: name lookup, arena, and the open-region
/// stack. Callers serialise access through a single mutex
/// (`crate::flush` holds it as the "regions mutex").
pub struct RegionStore {
    by_name: BTreeMap<String, RegionId>,
    arena: Vec<MonitoringRegion>,
    open: Vec<RegionId>,
    filter: RegionFilter,
    anonymous_counter: u64,
    global: RegionId,
}

impl RegionStore {
    /// A fresh store with the global region already registered, filtered
    /// by `filter`.
    pub fn new(filter: RegionFilter) -> Self {
        let mut store = Self {
            by_name: BTreeMap::new(),
            arena: Vec::new(),
            open: Vec::new(),
            filter,
            anonymous_counter: 0,
            global: RegionId(0),
        };
        store.global = store.register(GLOBAL_REGION_NAME).expect("global region always registers");
        store
    }

    /// The distinguished global region's handle.
    pub fn global(&self) -> RegionId {
        self.global
    }

    /// The innermost currently-open region, if any.
    pub fn last_open(&self) -> Option<RegionId> {
        self.open.last().copied()
    }

    /// Every currently-open region, outermost first.
    pub fn open_regions(&self) -> &[RegionId] {
        &self.open
    }

    /// Register a region by name, or generate an anonymous name if `name`
    /// is empty. Returns the existing handle if already registered
    /// (case-sensitive, except the global alias). Always succeeds; a
    /// region excluded by the region-select filter still registers, just
    /// `enabled = false`.
    pub fn register(&mut self, name: &str) -> Option<RegionId> {
        let canonical = if name.eq_ignore_ascii_case(GLOBAL_REGION_NAME) {
            GLOBAL_REGION_NAME.to_string()
        } else if name.is_empty() {
            self.anonymous_counter += 1;
            format!("region_{}", self.anonymous_counter)
        } else {
            name.to_string()
        };

        if let Some(&id) = self.by_name.get(&canonical) {
            return Some(id);
        }

        let enabled = self.filter.is_enabled(&canonical);
        let region = MonitoringRegion::new(canonical.clone(), enabled, false);
        let id = RegionId(self.arena.len());
        self.arena.push(region);
        self.by_name.insert(canonical, id);
        Some(id)
    }

    /// Look up an already-registered region by name.
    pub fn find(&self, name: &str) -> Option<RegionId> {
        let canonical = if name.eq_ignore_ascii_case(GLOBAL_REGION_NAME) {
            GLOBAL_REGION_NAME
        } else {
            name
        };
        self.by_name.get(canonical).copied()
    }

    /// Immutable access to a region.
    pub fn region(&self, id: RegionId) -> &MonitoringRegion {
        &self.arena[id.0]
    }

    /// Mutable access to a region.
    pub fn region_mut(&mut self, id: RegionId) -> &mut MonitoringRegion {
        &mut self.arena[id.0]
    }

    /// Every registered region, in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MonitoringRegion)> {
        self.by_name
            .iter()
            .map(move |(name, id)| (name.as_str(), &self.arena[id.0]))
    }

    /// Push `id` onto the open-region stack. Caller must have already
    /// called `mark_started` on the region.
    pub fn push_open(&mut self, id: RegionId) {
        self.open.push(id);
    }

    /// Remove `id` from the open-region stack, wherever it sits. Stopping
    /// a region in the middle of the stack is permitted and produces
    /// non-nested timings — documented behaviour, not corrected here
    ///.
    pub fn remove_open(&mut self, id: RegionId) {
        if let Some(pos) = self.open.iter().position(|open_id| *open_id == id) {
            self.open.remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_region_is_registered_on_construction() {
        let store = RegionStore::new(RegionFilter::AllowAll);
        assert_eq!(store.region(store.global()).name(), GLOBAL_REGION_NAME);
    }

    #[test]
    fn global_alias_registers_to_the_same_handle() {
        let mut store = RegionStore::new(RegionFilter::AllowAll);
        let a = store.register("Global").unwrap();
        let b = store.register("GLOBAL").unwrap();
        let c = store.register("global").unwrap();
        assert_eq!(a, store.global());
        assert_eq!(b, store.global());
        assert_eq!(c, store.global());
    }

    #[test]
    fn registering_the_same_name_twice_returns_the_same_handle() {
        let mut store = RegionStore::new(RegionFilter::AllowAll);
        let a = store.register("Compute").unwrap();
        let b = store.register("Compute").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn anonymous_regions_get_monotonic_synthetic_names() {
        let mut store = RegionStore::new(RegionFilter::AllowAll);
        let a = store.register("").unwrap();
        let b = store.register("").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.region(a).name(), "region_1");
        assert_eq!(store.region(b).name(), "region_2");
    }

    #[test]
    fn excluded_region_registers_disabled() {
        let mut store = RegionStore::new(RegionFilter::parse("exclude:Private"));
        let id = store.register("Private").unwrap();
        assert!(!store.region(id).is_enabled());
    }

    #[test]
    fn open_stack_is_lifo() {
        let mut store = RegionStore::new(RegionFilter::AllowAll);
        let a = store.register("A").unwrap();
        let b = store.register("B").unwrap();
        store.push_open(a);
        store.push_open(b);
        assert_eq!(store.last_open(), Some(b));
        store.remove_open(b);
        assert_eq!(store.last_open(), Some(a));
    }

    #[test]
    fn remove_open_from_the_middle_is_allowed() {
        let mut store = RegionStore::new(RegionFilter::AllowAll);
        let a = store.register("A").unwrap();
        let b = store.register("B").unwrap();
        let c = store.register("C").unwrap();
        store.push_open(a);
        store.push_open(b);
        store.push_open(c);
        store.remove_open(b);
        assert_eq!(store.open_regions(), &[a, c]);
    }
}
