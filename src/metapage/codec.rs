//! Encoding a reference list into a metapage tree and resolving it again.
//!
//! The tree is never held as a pointer graph: every edge is a grant
//! reference that has to be mapped before it can be followed. Construction
//! and traversal both work level by level, leaves first for `encode` and
//! root first for `decode`, keeping one reference list per level.

use crate::error::{GrantError, GrantResult};
use crate::grant::{DomainId, GrantRef, PAGE_SIZE};
use crate::logging::{Logger, log_debug, log_error, log_warn};
use crate::metapage::{Metapage, REFS_PER_METAPAGE, RefKind, write_metapage};
use crate::platform::{GrantMap, GrantShare, MappedGrant};
use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;

/// Upper bound on tree height accepted by `decode`. A 32-bit reference space
/// never needs more than four levels.
pub const MAX_TREE_HEIGHT: usize = 8;

/// Upper bound on the entries of one decoded level.
pub const MAX_LEVEL_REFS: usize = u32::MAX as usize;

/// A metapage shared by `encode`, with its local mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedMetapage {
    pub reference: GrantRef,
    pub address: NonNull<u8>,
}

/// Every metapage shared for one encoded list, by level. Level 0 holds the
/// leaves; the last level holds only the root.
#[derive(Debug, Default)]
pub struct MetapageTree {
    levels: Vec<Vec<SharedMetapage>>,
}

impl MetapageTree {
    pub fn root(&self) -> GrantRef {
        self.levels
            .last()
            .and_then(|level| level.first())
            .map(|m| m.reference)
            .unwrap_or(GrantRef(0))
    }

    pub fn height(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, depth: usize) -> &[SharedMetapage] {
        self.levels.get(depth).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn metapage_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn metapages(&self) -> impl Iterator<Item = &SharedMetapage> {
        self.levels.iter().flatten()
    }

    /// Local mapping of every metapage, keyed by reference.
    pub fn local_pages(&self) -> HashMap<GrantRef, NonNull<u8>> {
        self.metapages().map(|m| (m.reference, m.address)).collect()
    }
}

/// Result of walking a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedTree {
    /// Leaf entries, in original order.
    pub data_refs: Vec<GrantRef>,
    /// Every metapage visited, root first, level by level.
    pub metapage_refs: Vec<GrantRef>,
}

/// Where `decode` gets metapage contents from.
pub trait PageSource {
    /// Make the page named by `reference` readable locally.
    fn map_metapage(&mut self, reference: GrantRef) -> GrantResult<NonNull<u8>>;

    fn unmap_metapage(&mut self, reference: GrantRef, address: NonNull<u8>) -> GrantResult<()>;
}

/// Metapages offered by another domain, mapped through the map side.
pub struct RemoteMetapages<'a, M: GrantMap> {
    map: &'a mut M,
    domain: DomainId,
}

impl<'a, M: GrantMap> RemoteMetapages<'a, M> {
    pub fn new(map: &'a mut M, domain: DomainId) -> Self {
        Self { map, domain }
    }
}

impl<M: GrantMap> PageSource for RemoteMetapages<'_, M> {
    fn map_metapage(&mut self, reference: GrantRef) -> GrantResult<NonNull<u8>> {
        let mapped = self.map.map_grant_refs(self.domain, &[reference], false)?;
        mapped
            .first()
            .map(|grant| grant.address)
            .ok_or_else(|| GrantError::platform("map grant", "no mapping returned"))
    }

    fn unmap_metapage(&mut self, reference: GrantRef, address: NonNull<u8>) -> GrantResult<()> {
        self.map.unmap(&[MappedGrant { reference, address }])
    }
}

/// Metapages this domain shared itself, read through its own mappings.
pub struct LocalMetapages<'a> {
    pages: &'a HashMap<GrantRef, NonNull<u8>>,
}

impl<'a> LocalMetapages<'a> {
    pub fn new(pages: &'a HashMap<GrantRef, NonNull<u8>>) -> Self {
        Self { pages }
    }
}

impl PageSource for LocalMetapages<'_> {
    fn map_metapage(&mut self, reference: GrantRef) -> GrantResult<NonNull<u8>> {
        self.pages.get(&reference).copied().ok_or_else(|| {
            GrantError::format(format!(
                "reference {} is not a metapage of this buffer",
                reference
            ))
        })
    }

    fn unmap_metapage(&mut self, _reference: GrantRef, _address: NonNull<u8>) -> GrantResult<()> {
        Ok(())
    }
}

/// Encode `refs` into a tree of metapages shared read-only with `domain`.
///
/// Entries of the leaves are of kind `leaf_kind`; every level above holds
/// metarefs. The root is always a metapage, even for a single reference. On
/// failure every metapage shared so far is unshared before returning.
pub fn encode<S: GrantShare>(
    share: &mut S,
    logger: &Logger,
    refs: &[GrantRef],
    leaf_kind: RefKind,
    domain: DomainId,
) -> GrantResult<MetapageTree> {
    if refs.is_empty() {
        log_error!(logger, "Refusing to encode an empty reference list");
        return Err(GrantError::invalid("cannot encode an empty reference list"));
    }

    let mut tree = MetapageTree::default();
    match build_levels(share, logger, refs, leaf_kind, domain, &mut tree) {
        Ok(()) => {
            log_debug!(
                logger,
                "Encoded {} reference(s) for {} into {} metapage(s), height {}, root {}",
                refs.len(),
                domain,
                tree.metapage_count(),
                tree.height(),
                tree.root()
            );
            Ok(tree)
        }
        Err(e) => {
            log_error!(
                logger,
                "Could not build metapage tree for {} reference(s): {}",
                refs.len(),
                e
            );
            let _ = release_metapages(share, logger, tree.metapages());
            Err(e)
        }
    }
}

fn build_levels<S: GrantShare>(
    share: &mut S,
    logger: &Logger,
    refs: &[GrantRef],
    leaf_kind: RefKind,
    domain: DomainId,
    tree: &mut MetapageTree,
) -> GrantResult<()> {
    let mut kind = leaf_kind;
    let mut entries = Vec::new();
    entries.try_reserve_exact(refs.len())?;
    entries.extend_from_slice(refs);

    loop {
        let mut level = Vec::new();
        level.try_reserve_exact(entries.len().div_ceil(REFS_PER_METAPAGE))?;
        tree.levels.try_reserve(1)?;
        tree.levels.push(level);
        let depth = tree.levels.len() - 1;

        for chunk in entries.chunks(REFS_PER_METAPAGE) {
            let metapage = share_metapage(share, logger, domain, kind, chunk)?;
            tree.levels[depth].push(metapage);
        }

        if tree.levels[depth].len() == 1 {
            return Ok(());
        }
        entries.clear();
        entries.extend(tree.levels[depth].iter().map(|m| m.reference));
        kind = RefKind::Metarefs;
    }
}

fn share_metapage<S: GrantShare>(
    share: &mut S,
    logger: &Logger,
    domain: DomainId,
    kind: RefKind,
    refs: &[GrantRef],
) -> GrantResult<SharedMetapage> {
    let region = share.share_pages(domain, 1, false)?;
    let metapage = match region.refs.first() {
        Some(reference) => SharedMetapage {
            reference: *reference,
            address: region.address,
        },
        None => return Err(GrantError::platform("share pages", "no reference returned")),
    };

    // SAFETY: the region is one freshly shared page, mapped locally and
    // referenced by nothing else yet.
    let page = unsafe { &mut *(metapage.address.as_ptr() as *mut [u8; PAGE_SIZE]) };
    if let Err(e) = write_metapage(page, kind, refs) {
        if let Err(unshare) = share.unshare(metapage.address, 1) {
            log_warn!(logger, "Could not unshare metapage {}: {}", metapage.reference, unshare);
        }
        return Err(e);
    }
    Ok(metapage)
}

/// Unshare every metapage in `metapages`, attempting all of them. Returns the
/// first failure.
pub(crate) fn release_metapages<'a, S: GrantShare>(
    share: &mut S,
    logger: &Logger,
    metapages: impl IntoIterator<Item = &'a SharedMetapage>,
) -> GrantResult<()> {
    let mut result = Ok(());
    for metapage in metapages {
        if let Err(e) = share.unshare(metapage.address, 1) {
            log_warn!(logger, "Could not unshare metapage {}: {}", metapage.reference, e);
            if result.is_ok() {
                result = Err(e);
            }
        }
    }
    result
}

/// Resolve the tree rooted at `root` back into the list it was encoded from.
///
/// Each metapage is unmapped as soon as it has been read, including when
/// it turns out to be malformed. A metapage is visited at most once, so a
/// tree that reuses one of its own metapages is rejected before it is
/// mapped a second time.
pub fn decode<P: PageSource>(
    source: &mut P,
    logger: &Logger,
    root: GrantRef,
) -> GrantResult<DecodedTree> {
    let mut level = vec![root];
    let mut metapage_refs = Vec::new();
    let mut visited = HashSet::new();

    for depth in 1..=MAX_TREE_HEIGHT {
        let mut level_kind = None;
        let mut next: Vec<GrantRef> = Vec::new();

        for reference in &level {
            if !visited.insert(*reference) {
                log_error!(logger, "Metapage {} appears twice under root {}", reference, root);
                return Err(GrantError::format(format!(
                    "metapage {} is referenced more than once",
                    reference
                )));
            }
            let (kind, entries) = read_metapage(source, *reference).map_err(|e| {
                log_error!(
                    logger,
                    "Could not read metapage {} at depth {}: {}",
                    reference,
                    depth,
                    e
                );
                e
            })?;
            metapage_refs.try_reserve(1)?;
            metapage_refs.push(*reference);

            if entries.is_empty() {
                log_error!(logger, "Metapage {} holds no references", reference);
                return Err(GrantError::format(format!("metapage {} is empty", reference)));
            }
            match level_kind {
                None => level_kind = Some(kind),
                Some(expected) if expected != kind => {
                    log_error!(
                        logger,
                        "Metapage tree mixes leaves and internal nodes at depth {}",
                        depth
                    );
                    return Err(GrantError::format(format!(
                        "metapage {} is {:?} but its level is {:?}",
                        reference, kind, expected
                    )));
                }
                Some(_) => {}
            }
            match next.len().checked_add(entries.len()) {
                Some(total) if total <= MAX_LEVEL_REFS => {}
                _ => {
                    log_error!(logger, "Metapage tree level at depth {} is too wide", depth + 1);
                    return Err(GrantError::format(format!(
                        "more than {} references below depth {}",
                        MAX_LEVEL_REFS, depth
                    )));
                }
            }
            next.try_reserve(entries.len())?;
            next.extend(entries);
        }

        if level_kind == Some(RefKind::Normal) {
            log_debug!(
                logger,
                "Decoded root {} into {} reference(s) via {} metapage(s), height {}",
                root,
                next.len(),
                metapage_refs.len(),
                depth
            );
            return Ok(DecodedTree {
                data_refs: next,
                metapage_refs,
            });
        }
        level = next;
    }

    log_error!(
        logger,
        "Metapage tree under root {} is deeper than {}",
        root,
        MAX_TREE_HEIGHT
    );
    Err(GrantError::format(format!(
        "tree deeper than {} levels",
        MAX_TREE_HEIGHT
    )))
}

fn read_metapage<P: PageSource>(
    source: &mut P,
    reference: GrantRef,
) -> GrantResult<(RefKind, Vec<GrantRef>)> {
    let address = source.map_metapage(reference)?;
    let parsed = {
        // SAFETY: the source keeps the page mapped until `unmap_metapage`.
        let page = unsafe { &*(address.as_ptr() as *const [u8; PAGE_SIZE]) };
        Metapage::parse(page).map(|metapage| (metapage.kind(), metapage.refs()))
    };
    let unmapped = source.unmap_metapage(reference, address);
    let parsed = parsed?;
    unmapped?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::default_logger;
    use crate::logging::testing::capture;
    use log::Level;
    use crate::platform::{Platform, SimHypervisor};
    use crate::platform::sim::{SimMapHandle, SimShareHandle};

    const GRANTER: DomainId = DomainId(1);
    const GRANTEE: DomainId = DomainId(2);

    struct Fixture {
        hv: SimHypervisor,
        logger: Logger,
        share: SimShareHandle,
        map: SimMapHandle,
    }

    fn fixture() -> anyhow::Result<Fixture> {
        let hv = SimHypervisor::new();
        let logger = default_logger();
        let share = hv.domain(GRANTER).open_share_side(&logger)?;
        let map = hv.domain(GRANTEE).open_map_side(&logger)?;
        Ok(Fixture {
            hv,
            logger,
            share,
            map,
        })
    }

    fn refs(n: u32) -> Vec<GrantRef> {
        (0..n).map(|i| GrantRef(100_000 + i)).collect()
    }

    fn read(address: NonNull<u8>) -> (RefKind, Vec<GrantRef>) {
        let page = unsafe { &*(address.as_ptr() as *const [u8; PAGE_SIZE]) };
        let metapage = Metapage::parse(page).unwrap();
        (metapage.kind(), metapage.refs())
    }

    #[test]
    fn test_single_reference_is_wrapped() -> anyhow::Result<()> {
        let mut f = fixture()?;
        let list = refs(1);
        let tree = encode(&mut f.share, &f.logger, &list, RefKind::Normal, GRANTEE)?;

        assert_eq!(tree.height(), 1);
        assert_eq!(tree.metapage_count(), 1);
        assert_ne!(tree.root(), list[0]);
        assert_eq!(read(tree.level(0)[0].address), (RefKind::Normal, list));
        Ok(())
    }

    #[test]
    fn test_full_page_is_one_leaf() -> anyhow::Result<()> {
        let mut f = fixture()?;
        let list = refs(REFS_PER_METAPAGE as u32);
        let tree = encode(&mut f.share, &f.logger, &list, RefKind::Normal, GRANTEE)?;

        assert_eq!(tree.height(), 1);
        assert_eq!(tree.level(0).len(), 1);
        assert_eq!(f.hv.stats().outstanding_grants, 1);
        Ok(())
    }

    #[test]
    fn test_overflow_adds_a_level() -> anyhow::Result<()> {
        let mut f = fixture()?;
        let list = refs(REFS_PER_METAPAGE as u32 + 1);
        let tree = encode(&mut f.share, &f.logger, &list, RefKind::Normal, GRANTEE)?;

        assert_eq!(tree.height(), 2);
        let leaves = tree.level(0);
        assert_eq!(leaves.len(), 2);
        assert_eq!(read(leaves[0].address).1.len(), REFS_PER_METAPAGE);
        assert_eq!(read(leaves[1].address).1, vec![list[REFS_PER_METAPAGE]]);

        let root = tree.level(1);
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].reference, tree.root());
        assert_eq!(
            read(root[0].address),
            (
                RefKind::Metarefs,
                vec![leaves[0].reference, leaves[1].reference]
            )
        );
        Ok(())
    }

    #[test]
    fn test_three_levels() -> anyhow::Result<()> {
        let mut f = fixture()?;
        let n = (REFS_PER_METAPAGE * REFS_PER_METAPAGE + 1) as u32;
        let list = refs(n);
        let tree = encode(&mut f.share, &f.logger, &list, RefKind::Normal, GRANTEE)?;

        assert_eq!(tree.height(), 3);
        assert_eq!(tree.level(0).len(), REFS_PER_METAPAGE + 1);
        assert_eq!(tree.level(1).len(), 2);
        assert_eq!(tree.level(2).len(), 1);

        let decoded = decode(
            &mut RemoteMetapages::new(&mut f.map, GRANTER),
            &f.logger,
            tree.root(),
        )?;
        assert_eq!(decoded.data_refs, list);
        assert_eq!(decoded.metapage_refs.len(), tree.metapage_count());
        assert_eq!(f.hv.stats().active_mappings, 0);
        Ok(())
    }

    #[test]
    fn test_round_trip_sizes() -> anyhow::Result<()> {
        let mut f = fixture()?;
        let cap = REFS_PER_METAPAGE as u32;
        for n in [1, 2, cap - 1, cap, cap + 1, 2 * cap, 3 * cap + 7] {
            let list = refs(n);
            let tree = encode(&mut f.share, &f.logger, &list, RefKind::Normal, GRANTEE)?;
            let decoded = decode(
                &mut RemoteMetapages::new(&mut f.map, GRANTER),
                &f.logger,
                tree.root(),
            )?;
            assert_eq!(decoded.data_refs, list, "round trip of {} refs", n);
        }
        Ok(())
    }

    #[test]
    fn test_local_decode_visits_every_metapage() -> anyhow::Result<()> {
        let mut f = fixture()?;
        let list = refs(2 * REFS_PER_METAPAGE as u32 + 1);
        let tree = encode(&mut f.share, &f.logger, &list, RefKind::Normal, GRANTEE)?;

        let pages = tree.local_pages();
        let decoded = decode(&mut LocalMetapages::new(&pages), &f.logger, tree.root())?;
        assert_eq!(decoded.data_refs, list);
        assert_eq!(decoded.metapage_refs[0], tree.root());

        let mut visited = decoded.metapage_refs.clone();
        visited.sort();
        let mut shared: Vec<GrantRef> = tree.metapages().map(|m| m.reference).collect();
        shared.sort();
        assert_eq!(visited, shared);
        Ok(())
    }

    #[test]
    fn test_empty_list_is_rejected() -> anyhow::Result<()> {
        let mut f = fixture()?;
        let result = encode(&mut f.share, &f.logger, &[], RefKind::Normal, GRANTEE);
        assert!(matches!(result, Err(GrantError::InvalidArgument(_))));
        assert_eq!(f.hv.stats().share_calls, 0);
        Ok(())
    }

    #[test]
    fn test_failed_encode_unshares_partial_tree() -> anyhow::Result<()> {
        let mut f = fixture()?;
        let list = refs(3 * REFS_PER_METAPAGE as u32);

        // Three leaves and a root are needed; fail at each of them in turn.
        for successes in 0..4 {
            f.hv.clear_faults();
            let before = f.hv.stats().outstanding_grants;
            f.hv.fail_share_after(successes);

            let result = encode(&mut f.share, &f.logger, &list, RefKind::Normal, GRANTEE);
            assert!(matches!(result, Err(GrantError::PlatformFailure { .. })));
            assert_eq!(f.hv.stats().outstanding_grants, before);
        }
        Ok(())
    }

    #[test]
    fn test_refused_unwind_is_logged() -> anyhow::Result<()> {
        let mut f = fixture()?;
        let (capture, logger) = capture();
        f.hv.fail_unshare_after(0);

        let overfull = refs(REFS_PER_METAPAGE as u32 + 1);
        let result = share_metapage(&mut f.share, &logger, GRANTEE, RefKind::Normal, &overfull);
        assert!(matches!(result, Err(GrantError::InvalidArgument(_))));
        assert_eq!(capture.messages(Level::Warn).len(), 1);
        assert_eq!(f.hv.stats().outstanding_grants, 1);
        Ok(())
    }

    #[test]
    fn test_corrupt_root_stops_traversal() -> anyhow::Result<()> {
        let mut f = fixture()?;
        let list = refs(REFS_PER_METAPAGE as u32 + 1);
        let tree = encode(&mut f.share, &f.logger, &list, RefKind::Normal, GRANTEE)?;
        f.hv.poke(GRANTER, tree.root(), 4, &[0, 0, 0, 0])?;

        let maps_before = f.hv.stats().map_calls;
        let result = decode(
            &mut RemoteMetapages::new(&mut f.map, GRANTER),
            &f.logger,
            tree.root(),
        );
        assert!(matches!(result, Err(GrantError::FormatError(_))));
        assert_eq!(f.hv.stats().map_calls, maps_before + 1);
        assert_eq!(f.hv.stats().active_mappings, 0);
        Ok(())
    }

    #[test]
    fn test_corrupt_leaf_is_unmapped() -> anyhow::Result<()> {
        let mut f = fixture()?;
        let list = refs(REFS_PER_METAPAGE as u32 + 1);
        let tree = encode(&mut f.share, &f.logger, &list, RefKind::Normal, GRANTEE)?;
        f.hv.poke(GRANTER, tree.level(0)[1].reference, 0, &[9])?;

        let result = decode(
            &mut RemoteMetapages::new(&mut f.map, GRANTER),
            &f.logger,
            tree.root(),
        );
        assert!(matches!(result, Err(GrantError::FormatError(_))));
        assert_eq!(f.hv.stats().active_mappings, 0);
        Ok(())
    }

    #[test]
    fn test_data_page_is_not_a_root() -> anyhow::Result<()> {
        let mut f = fixture()?;
        let data = f.share.share_pages(GRANTEE, 1, true)?;
        unsafe { data.address.as_ptr().write_bytes(0x5A, PAGE_SIZE) };

        let result = decode(
            &mut RemoteMetapages::new(&mut f.map, GRANTER),
            &f.logger,
            data.refs[0],
        );
        assert!(matches!(result, Err(GrantError::FormatError(_))));
        Ok(())
    }

    #[test]
    fn test_self_referencing_tree_is_bounded() -> anyhow::Result<()> {
        let mut f = fixture()?;
        let tree = encode(&mut f.share, &f.logger, &refs(1), RefKind::Normal, GRANTEE)?;
        let root = tree.root();

        // Turn the root into an internal node pointing at itself.
        f.hv.poke(GRANTER, root, 8, &1u32.to_le_bytes())?;
        f.hv.poke(GRANTER, root, 16, &root.0.to_le_bytes())?;

        let maps_before = f.hv.stats().map_calls;
        let result = decode(
            &mut RemoteMetapages::new(&mut f.map, GRANTER),
            &f.logger,
            root,
        );
        assert!(matches!(result, Err(GrantError::FormatError(_))));
        assert_eq!(f.hv.stats().map_calls, maps_before + 1);
        Ok(())
    }

    #[test]
    fn test_wide_self_referencing_root_is_mapped_once() -> anyhow::Result<()> {
        let mut f = fixture()?;
        let tree = encode(&mut f.share, &f.logger, &refs(1), RefKind::Normal, GRANTEE)?;
        let root = tree.root();

        // A full internal node whose every entry is the root again.
        let entries: Vec<u8> = std::iter::repeat(root.0.to_le_bytes())
            .take(REFS_PER_METAPAGE)
            .flatten()
            .collect();
        f.hv.poke(GRANTER, root, 8, &1u32.to_le_bytes())?;
        f.hv.poke(GRANTER, root, 12, &(REFS_PER_METAPAGE as u32).to_le_bytes())?;
        f.hv.poke(GRANTER, root, 16, &entries)?;

        let maps_before = f.hv.stats().map_calls;
        let result = decode(
            &mut RemoteMetapages::new(&mut f.map, GRANTER),
            &f.logger,
            root,
        );
        assert!(matches!(result, Err(GrantError::FormatError(_))));
        assert_eq!(f.hv.stats().map_calls, maps_before + 1);
        assert_eq!(f.hv.stats().active_mappings, 0);
        Ok(())
    }

    #[test]
    fn test_chain_deeper_than_limit_is_rejected() -> anyhow::Result<()> {
        let mut f = fixture()?;
        let pages = (0..=MAX_TREE_HEIGHT)
            .map(|_| f.share.share_pages(GRANTEE, 1, false))
            .collect::<GrantResult<Vec<_>>>()?;

        // Each metapage names the next one; only the last holds data.
        for (i, region) in pages.iter().enumerate() {
            let page = unsafe { &mut *(region.address.as_ptr() as *mut [u8; PAGE_SIZE]) };
            match pages.get(i + 1) {
                Some(child) => write_metapage(page, RefKind::Metarefs, &child.refs)?,
                None => write_metapage(page, RefKind::Normal, &[GrantRef(7)])?,
            }
        }

        let maps_before = f.hv.stats().map_calls;
        let result = decode(
            &mut RemoteMetapages::new(&mut f.map, GRANTER),
            &f.logger,
            pages[0].refs[0],
        );
        assert!(matches!(result, Err(GrantError::FormatError(_))));
        assert_eq!(f.hv.stats().map_calls, maps_before + MAX_TREE_HEIGHT);
        Ok(())
    }

    #[test]
    fn test_local_decode_rejects_foreign_reference() -> anyhow::Result<()> {
        let f = fixture()?;
        let pages = HashMap::new();
        let result = decode(&mut LocalMetapages::new(&pages), &f.logger, GrantRef(1));
        assert!(matches!(result, Err(GrantError::FormatError(_))));
        Ok(())
    }
}
