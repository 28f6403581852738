//! In-process simulated hypervisor.
//!
//! Models the grant tables of any number of domains inside one process.
//! Shared pages are real page-aligned memory, so a page mapped through the
//! map side aliases the granting side's local mapping exactly as it would on
//! a real host. Backing memory stays alive while it is granted or mapped.
//!
//! Beyond the real platform's behaviour it offers fault injection and
//! accounting, which the leak tests depend on.

use crate::error::{GrantError, GrantResult};
use crate::grant::{DomainId, GrantRef, PAGE_SIZE};
use crate::logging::{Logger, log_debug, log_trace};
use crate::platform::{GrantMap, GrantShare, MappedGrant, Platform, SharedRegion};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

/// Page-aligned, zeroed backing memory of one share call.
struct Region {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl Region {
    fn allocate(num_pages: usize) -> GrantResult<Arc<Self>> {
        let size = num_pages
            .checked_mul(PAGE_SIZE)
            .ok_or(GrantError::OutOfMemory)?;
        let layout = Layout::from_size_align(size, PAGE_SIZE).map_err(|_| GrantError::OutOfMemory)?;
        // SAFETY: `layout` has a non-zero size; callers reject empty shares.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(GrantError::OutOfMemory)?;
        Ok(Arc::new(Self { ptr, layout }))
    }

    fn page(&self, index: usize) -> NonNull<u8> {
        // SAFETY: callers only pass indices of pages inside the region.
        unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(index * PAGE_SIZE)) }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: allocated in `Region::allocate` with the same layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// SAFETY: the region is plain memory; synchronising access to its contents is
// the job of whoever shares it, as with real shared pages.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

struct GrantEntry {
    grantee: DomainId,
    region: Arc<Region>,
    page_index: usize,
    writable: bool,
}

struct ShareEntry {
    refs: Vec<GrantRef>,
    _region: Arc<Region>,
}

struct MapEntry {
    _region: Arc<Region>,
    count: usize,
}

#[derive(Default)]
struct Faults {
    share_budget: Option<usize>,
    unshare_budget: Option<usize>,
    map_budget: Option<usize>,
    open_share: bool,
    open_map: bool,
}

impl Faults {
    /// Consumes one call from `budget`; `false` once it is exhausted.
    fn spend(budget: &mut Option<usize>) -> bool {
        match budget {
            None => true,
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
        }
    }
}

#[derive(Default)]
struct Counters {
    share_calls: usize,
    map_calls: usize,
    share_opens: usize,
    share_closes: usize,
    map_opens: usize,
    map_closes: usize,
}

#[derive(Default)]
struct SimState {
    /// Keyed by (granting domain, reference).
    grants: DashMap<(DomainId, GrantRef), GrantEntry>,
    /// Keyed by (granting domain, local address).
    shares: DashMap<(DomainId, usize), ShareEntry>,
    /// Keyed by (mapping domain, local address).
    mappings: DashMap<(DomainId, usize), MapEntry>,
    next_refs: DashMap<DomainId, u32>,
    faults: Mutex<Faults>,
    counters: Mutex<Counters>,
}

/// Snapshot of the simulator's bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimStats {
    pub outstanding_grants: usize,
    pub active_mappings: usize,
    pub share_calls: usize,
    pub map_calls: usize,
    pub share_opens: usize,
    pub share_closes: usize,
    pub map_opens: usize,
    pub map_closes: usize,
}

/// Shared grant-table state of every simulated domain.
#[derive(Clone, Default)]
pub struct SimHypervisor {
    state: Arc<SimState>,
}

impl SimHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform view of the domain `id`.
    pub fn domain(&self, id: DomainId) -> SimPlatform {
        SimPlatform {
            id,
            state: self.state.clone(),
        }
    }

    pub fn stats(&self) -> SimStats {
        let counters = self.state.counters.lock();
        SimStats {
            outstanding_grants: self.state.grants.len(),
            active_mappings: self.state.mappings.iter().map(|m| m.count).sum(),
            share_calls: counters.share_calls,
            map_calls: counters.map_calls,
            share_opens: counters.share_opens,
            share_closes: counters.share_closes,
            map_opens: counters.map_opens,
            map_closes: counters.map_closes,
        }
    }

    /// Let `n` more share calls succeed; every later one fails.
    pub fn fail_share_after(&self, n: usize) {
        self.state.faults.lock().share_budget = Some(n);
    }

    /// Let `n` more unshare calls succeed; every later one fails and leaves
    /// the pages shared.
    pub fn fail_unshare_after(&self, n: usize) {
        self.state.faults.lock().unshare_budget = Some(n);
    }

    /// Let `n` more map calls succeed; every later one fails.
    pub fn fail_map_after(&self, n: usize) {
        self.state.faults.lock().map_budget = Some(n);
    }

    pub fn fail_open_share(&self) {
        self.state.faults.lock().open_share = true;
    }

    pub fn fail_open_map(&self) {
        self.state.faults.lock().open_map = true;
    }

    pub fn clear_faults(&self) {
        *self.state.faults.lock() = Faults::default();
    }

    /// Overwrite bytes of a granted page behind everyone's back.
    pub fn poke(
        &self,
        granter: DomainId,
        reference: GrantRef,
        offset: usize,
        bytes: &[u8],
    ) -> GrantResult<()> {
        if offset + bytes.len() > PAGE_SIZE {
            return Err(GrantError::invalid("poke past the end of the page"));
        }
        let entry = self
            .state
            .grants
            .get(&(granter, reference))
            .ok_or_else(|| {
                GrantError::platform("poke", format!("no grant {} from {}", reference, granter))
            })?;
        let page = entry.region.page(entry.page_index);
        // SAFETY: `offset + len` stays inside the page, which stays alive while
        // the grant entry is borrowed.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), page.as_ptr().add(offset), bytes.len());
        }
        Ok(())
    }
}

/// One domain's view of the simulated hypervisor.
#[derive(Clone)]
pub struct SimPlatform {
    id: DomainId,
    state: Arc<SimState>,
}

impl SimPlatform {
    pub fn domain_id(&self) -> DomainId {
        self.id
    }
}

impl Platform for SimPlatform {
    type Share = SimShareHandle;
    type Map = SimMapHandle;

    fn open_share_side(&self, logger: &Logger) -> GrantResult<SimShareHandle> {
        if self.state.faults.lock().open_share {
            return Err(GrantError::platform("open share side", "device unavailable"));
        }
        self.state.counters.lock().share_opens += 1;
        log_debug!(logger, "{}: opened share side", self.id);
        Ok(SimShareHandle {
            domain: self.id,
            state: self.state.clone(),
            logger: logger.clone(),
        })
    }

    fn open_map_side(&self, logger: &Logger) -> GrantResult<SimMapHandle> {
        if self.state.faults.lock().open_map {
            return Err(GrantError::platform("open map side", "device unavailable"));
        }
        self.state.counters.lock().map_opens += 1;
        log_debug!(logger, "{}: opened map side", self.id);
        Ok(SimMapHandle {
            domain: self.id,
            state: self.state.clone(),
            logger: logger.clone(),
        })
    }
}

pub struct SimShareHandle {
    domain: DomainId,
    state: Arc<SimState>,
    logger: Logger,
}

impl GrantShare for SimShareHandle {
    fn share_pages(
        &mut self,
        domain: DomainId,
        count: usize,
        writable: bool,
    ) -> GrantResult<SharedRegion> {
        if count == 0 {
            return Err(GrantError::invalid("cannot share zero pages"));
        }
        self.state.counters.lock().share_calls += 1;
        if !Faults::spend(&mut self.state.faults.lock().share_budget) {
            return Err(GrantError::platform("share pages", "grant table exhausted"));
        }
        let count_u32 = u32::try_from(count)
            .map_err(|_| GrantError::invalid(format!("cannot share {} pages", count)))?;

        let region = Region::allocate(count)?;
        let first = {
            let mut next = self.state.next_refs.entry(self.domain).or_insert(1);
            let first = *next;
            let after = first
                .checked_add(count_u32)
                .ok_or_else(|| GrantError::platform("share pages", "grant references exhausted"))?;
            *next = after;
            first
        };

        let refs: Vec<GrantRef> = (0..count_u32).map(|i| GrantRef(first + i)).collect();
        for (page_index, reference) in refs.iter().enumerate() {
            self.state.grants.insert(
                (self.domain, *reference),
                GrantEntry {
                    grantee: domain,
                    region: region.clone(),
                    page_index,
                    writable,
                },
            );
        }

        let address = region.ptr;
        self.state.shares.insert(
            (self.domain, address.as_ptr() as usize),
            ShareEntry {
                refs: refs.clone(),
                _region: region,
            },
        );
        log_trace!(
            &self.logger,
            "{}: shared {} page(s) with {} starting at ref {}",
            self.domain,
            count,
            domain,
            first
        );

        Ok(SharedRegion { address, refs })
    }

    fn unshare(&mut self, address: NonNull<u8>, count: usize) -> GrantResult<()> {
        if !Faults::spend(&mut self.state.faults.lock().unshare_budget) {
            return Err(GrantError::platform("unshare", "grant still in use"));
        }
        let key = (self.domain, address.as_ptr() as usize);
        let (_, share) = self
            .state
            .shares
            .remove(&key)
            .ok_or_else(|| {
                GrantError::platform("unshare", format!("{:p} is not shared", address))
            })?;
        if share.refs.len() != count {
            let shared = share.refs.len();
            self.state.shares.insert(key, share);
            return Err(GrantError::platform(
                "unshare",
                format!("{:p} spans {} page(s), not {}", address, shared, count),
            ));
        }

        for reference in &share.refs {
            self.state.grants.remove(&(self.domain, *reference));
        }
        log_trace!(&self.logger, "{}: unshared {} page(s) at {:p}", self.domain, count, address);
        Ok(())
    }
}

impl Drop for SimShareHandle {
    fn drop(&mut self) {
        self.state.counters.lock().share_closes += 1;
        log_debug!(&self.logger, "{}: closed share side", self.domain);
    }
}

pub struct SimMapHandle {
    domain: DomainId,
    state: Arc<SimState>,
    logger: Logger,
}

impl SimMapHandle {
    fn map_one(
        &self,
        granter: DomainId,
        reference: GrantRef,
        writable: bool,
    ) -> GrantResult<MappedGrant> {
        let entry = self.state.grants.get(&(granter, reference)).ok_or_else(|| {
            GrantError::platform("map grant", format!("no grant {} from {}", reference, granter))
        })?;
        // Mapping one's own grants is not possible on a real host; the
        // simulator allows it so a single domain can inspect what it shared.
        if entry.grantee != self.domain && granter != self.domain {
            return Err(GrantError::platform(
                "map grant",
                format!("grant {} from {} is not offered to {}", reference, granter, self.domain),
            ));
        }
        if writable && !entry.writable {
            return Err(GrantError::platform(
                "map grant",
                format!("grant {} from {} is read-only", reference, granter),
            ));
        }

        let address = entry.region.page(entry.page_index);
        let region = entry.region.clone();
        drop(entry);

        self.state
            .mappings
            .entry((self.domain, address.as_ptr() as usize))
            .or_insert(MapEntry {
                _region: region,
                count: 0,
            })
            .count += 1;
        Ok(MappedGrant { reference, address })
    }

    fn unmap_one(&self, grant: &MappedGrant) -> GrantResult<()> {
        let key = (self.domain, grant.address.as_ptr() as usize);
        let remove = {
            let mut entry = self.state.mappings.get_mut(&key).ok_or_else(|| {
                GrantError::platform("unmap", format!("{:p} is not mapped", grant.address))
            })?;
            entry.count -= 1;
            entry.count == 0
        };
        if remove {
            self.state.mappings.remove(&key);
        }
        Ok(())
    }
}

impl GrantMap for SimMapHandle {
    fn map_grant_refs(
        &mut self,
        domain: DomainId,
        refs: &[GrantRef],
        writable: bool,
    ) -> GrantResult<Vec<MappedGrant>> {
        if refs.is_empty() {
            return Err(GrantError::invalid("cannot map zero references"));
        }
        self.state.counters.lock().map_calls += 1;
        if !Faults::spend(&mut self.state.faults.lock().map_budget) {
            return Err(GrantError::platform("map grant", "mapping table exhausted"));
        }

        let mut mapped = Vec::with_capacity(refs.len());
        for reference in refs {
            match self.map_one(domain, *reference, writable) {
                Ok(grant) => mapped.push(grant),
                Err(e) => {
                    // A batch either maps completely or not at all.
                    for grant in &mapped {
                        let _ = self.unmap_one(grant);
                    }
                    return Err(e);
                }
            }
        }
        log_trace!(
            &self.logger,
            "{}: mapped {} page(s) granted by {}",
            self.domain,
            refs.len(),
            domain
        );
        Ok(mapped)
    }

    fn unmap(&mut self, grants: &[MappedGrant]) -> GrantResult<()> {
        let mut result = Ok(());
        for grant in grants {
            if let Err(e) = self.unmap_one(grant) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

impl Drop for SimMapHandle {
    fn drop(&mut self) {
        self.state.counters.lock().map_closes += 1;
        log_debug!(&self.logger, "{}: closed map side", self.domain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::default_logger;

    fn read_byte(address: NonNull<u8>) -> u8 {
        unsafe { address.as_ptr().read() }
    }

    #[test]
    fn test_share_and_unshare() -> anyhow::Result<()> {
        let hv = SimHypervisor::new();
        let logger = default_logger();
        let mut share = hv.domain(DomainId(1)).open_share_side(&logger)?;

        let region = share.share_pages(DomainId(2), 3, true)?;
        assert_eq!(region.refs, vec![GrantRef(1), GrantRef(2), GrantRef(3)]);
        assert_eq!(region.address.as_ptr() as usize % PAGE_SIZE, 0);
        assert_eq!(hv.stats().outstanding_grants, 3);

        let next = share.share_pages(DomainId(2), 1, false)?;
        assert_eq!(next.refs, vec![GrantRef(4)]);

        share.unshare(region.address, 3)?;
        share.unshare(next.address, 1)?;
        assert_eq!(hv.stats().outstanding_grants, 0);
        Ok(())
    }

    #[test]
    fn test_unshare_rejects_wrong_count() -> anyhow::Result<()> {
        let hv = SimHypervisor::new();
        let logger = default_logger();
        let mut share = hv.domain(DomainId(1)).open_share_side(&logger)?;

        let region = share.share_pages(DomainId(2), 2, true)?;
        assert!(share.unshare(region.address, 1).is_err());
        assert_eq!(hv.stats().outstanding_grants, 2);
        share.unshare(region.address, 2)?;
        assert!(share.unshare(region.address, 2).is_err());
        Ok(())
    }

    #[test]
    fn test_mapping_aliases_shared_memory() -> anyhow::Result<()> {
        let hv = SimHypervisor::new();
        let logger = default_logger();
        let mut share = hv.domain(DomainId(1)).open_share_side(&logger)?;
        let mut map = hv.domain(DomainId(2)).open_map_side(&logger)?;

        let region = share.share_pages(DomainId(2), 2, true)?;
        unsafe { region.page_address(1).as_ptr().write(0xAB) };

        let mapped = map.map_grant_refs(DomainId(1), &region.refs, true)?;
        assert_eq!(mapped.len(), 2);
        assert_eq!(read_byte(mapped[1].address), 0xAB);
        assert_eq!(hv.stats().active_mappings, 2);

        map.unmap(&mapped)?;
        assert_eq!(hv.stats().active_mappings, 0);
        share.unshare(region.address, 2)?;
        Ok(())
    }

    #[test]
    fn test_mapping_checks_access() -> anyhow::Result<()> {
        let hv = SimHypervisor::new();
        let logger = default_logger();
        let mut share = hv.domain(DomainId(1)).open_share_side(&logger)?;
        let mut stranger = hv.domain(DomainId(3)).open_map_side(&logger)?;
        let mut grantee = hv.domain(DomainId(2)).open_map_side(&logger)?;

        let region = share.share_pages(DomainId(2), 2, false)?;
        assert!(stranger.map_grant_refs(DomainId(1), &region.refs, false).is_err());
        assert!(grantee.map_grant_refs(DomainId(1), &region.refs, true).is_err());
        assert!(grantee.map_grant_refs(DomainId(1), &[GrantRef(99)], false).is_err());
        assert_eq!(hv.stats().active_mappings, 0);
        Ok(())
    }

    #[test]
    fn test_mapping_outlives_unshare() -> anyhow::Result<()> {
        let hv = SimHypervisor::new();
        let logger = default_logger();
        let mut share = hv.domain(DomainId(1)).open_share_side(&logger)?;
        let mut map = hv.domain(DomainId(2)).open_map_side(&logger)?;

        let region = share.share_pages(DomainId(2), 1, true)?;
        unsafe { region.address.as_ptr().write(7) };
        let mapped = map.map_grant_refs(DomainId(1), &region.refs, false)?;
        share.unshare(region.address, 1)?;

        assert_eq!(read_byte(mapped[0].address), 7);
        map.unmap(&mapped)?;
        Ok(())
    }

    #[test]
    fn test_fault_injection() -> anyhow::Result<()> {
        let hv = SimHypervisor::new();
        let logger = default_logger();
        let mut share = hv.domain(DomainId(1)).open_share_side(&logger)?;

        hv.fail_share_after(1);
        let region = share.share_pages(DomainId(2), 1, true)?;
        assert!(matches!(
            share.share_pages(DomainId(2), 1, true),
            Err(GrantError::PlatformFailure { .. })
        ));
        hv.clear_faults();

        hv.fail_unshare_after(0);
        assert!(share.unshare(region.address, 1).is_err());
        assert_eq!(hv.stats().outstanding_grants, 1);
        hv.clear_faults();
        share.unshare(region.address, 1)?;

        hv.fail_open_map();
        assert!(hv.domain(DomainId(1)).open_map_side(&logger).is_err());
        Ok(())
    }

    #[test]
    fn test_handle_close_is_counted() -> anyhow::Result<()> {
        let hv = SimHypervisor::new();
        let logger = default_logger();
        {
            let _share = hv.domain(DomainId(1)).open_share_side(&logger)?;
            let _map = hv.domain(DomainId(1)).open_map_side(&logger)?;
        }
        let stats = hv.stats();
        assert_eq!((stats.share_opens, stats.share_closes), (1, 1));
        assert_eq!((stats.map_opens, stats.map_closes), (1, 1));
        Ok(())
    }

    #[test]
    fn test_poke() -> anyhow::Result<()> {
        let hv = SimHypervisor::new();
        let logger = default_logger();
        let mut share = hv.domain(DomainId(1)).open_share_side(&logger)?;
        let region = share.share_pages(DomainId(2), 1, true)?;

        hv.poke(DomainId(1), region.refs[0], 4, &[1, 2])?;
        assert_eq!(read_byte(unsafe { NonNull::new_unchecked(region.address.as_ptr().add(5)) }), 2);
        assert!(hv.poke(DomainId(1), region.refs[0], PAGE_SIZE - 1, &[1, 2]).is_err());
        Ok(())
    }
}
