//! Page Share Primitive.
//!
//! The host platform can only grant or map one page per reference. These
//! traits are the whole surface this crate consumes from it:
//!
//! - **GrantShare**: offers freshly allocated pages to another domain and
//!   reclaims them (the share side)
//! - **GrantMap**: maps pages another domain offered to us (the map side)
//! - **Platform**: opens both sides for one local domain
//!
//! Handles are closed by dropping them. [`sim`] is an in-process
//! implementation used by the tests and the demo binary.

pub mod sim;

use crate::error::GrantResult;
use crate::grant::{DomainId, GrantRef, PAGE_SIZE};
use crate::logging::Logger;
use std::ptr::NonNull;

pub use sim::{SimHypervisor, SimPlatform, SimStats};

/// Pages shared by one `share_pages` call: a contiguous local mapping and one
/// reference per page, in page order.
#[derive(Debug)]
pub struct SharedRegion {
    pub address: NonNull<u8>,
    pub refs: Vec<GrantRef>,
}

impl SharedRegion {
    pub fn num_pages(&self) -> usize {
        self.refs.len()
    }

    /// Local mapping of the `index`-th page.
    pub fn page_address(&self, index: usize) -> NonNull<u8> {
        debug_assert!(index < self.refs.len());
        // SAFETY: the region spans `refs.len()` pages starting at `address`.
        unsafe { NonNull::new_unchecked(self.address.as_ptr().add(index * PAGE_SIZE)) }
    }
}

/// One page mapped from a foreign grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedGrant {
    pub reference: GrantRef,
    pub address: NonNull<u8>,
}

/// Share side of the platform.
pub trait GrantShare {
    /// Allocate `count` zeroed pages, grant each of them to `domain` and map
    /// them contiguously into the local address space.
    fn share_pages(
        &mut self,
        domain: DomainId,
        count: usize,
        writable: bool,
    ) -> GrantResult<SharedRegion>;

    /// End the grants of `count` pages previously shared at `address` and drop
    /// the local mapping.
    fn unshare(&mut self, address: NonNull<u8>, count: usize) -> GrantResult<()>;
}

/// Map side of the platform.
pub trait GrantMap {
    /// Map every reference in `refs` offered by `domain`, in order.
    fn map_grant_refs(
        &mut self,
        domain: DomainId,
        refs: &[GrantRef],
        writable: bool,
    ) -> GrantResult<Vec<MappedGrant>>;

    fn unmap(&mut self, grants: &[MappedGrant]) -> GrantResult<()>;
}

/// Host platform of one local domain.
pub trait Platform {
    type Share: GrantShare;
    type Map: GrantMap;

    fn open_share_side(&self, logger: &Logger) -> GrantResult<Self::Share>;

    fn open_map_side(&self, logger: &Logger) -> GrantResult<Self::Map>;
}
