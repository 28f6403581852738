use crate::error::{GrantError, GrantResult};
use crate::grant::{DomainId, GrantRef};
use crate::logging::{Logger, default_logger, log_debug, log_error, log_warn};
use crate::metapage::codec::release_metapages;
use crate::metapage::{DecodedTree, MetapageTree, RefKind, RemoteMetapages, decode, encode};
use crate::platform::Platform;
use std::collections::{HashMap, HashSet};

/// Bookkeeping for one buffer handed out by `allocate_shared_buffer`.
pub(crate) struct BufferRecord {
    pub(crate) domain: DomainId,
    pub(crate) num_pages: usize,
    pub(crate) data_refs: Vec<GrantRef>,
    pub(crate) tree: MetapageTree,
    /// Metapages of `tree` already unshared by an earlier, failed release.
    pub(crate) released_metapages: HashSet<GrantRef>,
}

/// Owns the platform handles and the logger every operation reports to.
///
/// The handles are not synchronised; callers sharing an instance between
/// threads must serialise access themselves, which `&mut self` on every
/// operation already enforces within safe code.
pub struct Instance<P: Platform> {
    pub(crate) logger: Logger,
    owns_logger: bool,
    pub(crate) share: P::Share,
    pub(crate) map: P::Map,
    /// Outstanding shared buffers, keyed by local address.
    pub(crate) buffers: HashMap<usize, BufferRecord>,
}

impl<P: Platform> Instance<P> {
    /// Open the share and map sides of `platform`.
    ///
    /// With no `logger`, a default one is built and owned by the instance.
    /// If the map side cannot be opened, the share side is closed again
    /// before the error is returned.
    pub fn create(platform: &P, logger: Option<Logger>) -> GrantResult<Self> {
        let (logger, owns_logger) = match logger {
            Some(logger) => (logger, false),
            None => (default_logger(), true),
        };

        let share = platform.open_share_side(&logger).map_err(|e| {
            log_error!(&logger, "Could not open the grant sharing interface: {}", e);
            e
        })?;

        let map = platform.open_map_side(&logger).map_err(|e| {
            log_error!(&logger, "Could not open the grant mapping interface: {}", e);
            e
        })?;

        log_debug!(&logger, "Created grant instance");
        Ok(Self {
            logger,
            owns_logger,
            share,
            map,
            buffers: HashMap::new(),
        })
    }

    /// Close both platform handles and release the owned logger.
    ///
    /// Buffers still outstanding stay shared; the other side keeps its
    /// mappings until it unmaps them.
    pub fn destroy(self) {
        let Instance {
            logger,
            owns_logger,
            share,
            map,
            buffers,
        } = self;

        if !buffers.is_empty() {
            log_warn!(
                &logger,
                "Destroying grant instance with {} shared buffer(s) outstanding",
                buffers.len()
            );
        }
        drop(share);
        drop(map);
        log_debug!(&logger, "Destroyed grant instance");

        if owns_logger {
            logger.flush();
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Number of shared buffers allocated and not yet released.
    pub fn outstanding_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Encode `refs` into a metapage tree shared with `domain`.
    ///
    /// The caller owns the returned tree and reclaims it with
    /// [`Instance::release_tree`].
    pub fn encode(
        &mut self,
        refs: &[GrantRef],
        leaf_kind: RefKind,
        domain: DomainId,
    ) -> GrantResult<MetapageTree> {
        encode(&mut self.share, &self.logger, refs, leaf_kind, domain)
    }

    /// Unshare every metapage of `tree`.
    pub fn release_tree(&mut self, tree: MetapageTree) -> GrantResult<()> {
        release_metapages(&mut self.share, &self.logger, tree.metapages())
    }

    /// Resolve a root reference offered by `domain` into the data references
    /// it describes.
    pub fn decode(&mut self, domain: DomainId, root: GrantRef) -> GrantResult<DecodedTree> {
        if root.0 == 0 {
            log_error!(&self.logger, "Refusing to decode the null reference");
            return Err(GrantError::invalid("root reference is null"));
        }
        decode(&mut RemoteMetapages::new(&mut self.map, domain), &self.logger, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::testing::capture;
    use crate::platform::SimHypervisor;
    use log::Level;

    const LOCAL: DomainId = DomainId(1);
    const PEER: DomainId = DomainId(2);

    #[test]
    fn test_create_and_destroy() -> anyhow::Result<()> {
        let hv = SimHypervisor::new();
        let instance = Instance::create(&hv.domain(LOCAL), None)?;
        assert_eq!(instance.outstanding_buffers(), 0);
        instance.destroy();

        let stats = hv.stats();
        assert_eq!((stats.share_opens, stats.share_closes), (1, 1));
        assert_eq!((stats.map_opens, stats.map_closes), (1, 1));
        Ok(())
    }

    #[test]
    fn test_create_uses_supplied_logger() -> anyhow::Result<()> {
        let hv = SimHypervisor::new();
        let (capture, logger) = capture();
        let instance = Instance::create(&hv.domain(LOCAL), Some(logger))?;
        instance.destroy();

        assert!(capture
            .messages(Level::Debug)
            .iter()
            .any(|m| m == "Created grant instance"));
        Ok(())
    }

    #[test]
    fn test_share_side_failure() {
        let hv = SimHypervisor::new();
        hv.fail_open_share();
        let (capture, logger) = capture();

        let result = Instance::create(&hv.domain(LOCAL), Some(logger));
        assert!(matches!(result, Err(GrantError::PlatformFailure { .. })));
        assert_eq!(capture.messages(Level::Error).len(), 1);

        let stats = hv.stats();
        assert_eq!(stats.share_opens + stats.share_closes, 0);
        assert_eq!(stats.map_opens + stats.map_closes, 0);
    }

    #[test]
    fn test_map_side_failure_closes_share_side() {
        let hv = SimHypervisor::new();
        hv.fail_open_map();

        let result = Instance::create(&hv.domain(LOCAL), None);
        assert!(result.is_err());

        let stats = hv.stats();
        assert_eq!((stats.share_opens, stats.share_closes), (1, 1));
        assert_eq!((stats.map_opens, stats.map_closes), (0, 0));
    }

    #[test]
    fn test_destroy_warns_about_outstanding_buffers() -> anyhow::Result<()> {
        let hv = SimHypervisor::new();
        let (capture, logger) = capture();
        let mut instance = Instance::create(&hv.domain(LOCAL), Some(logger))?;
        let _buffer = instance.allocate_shared_buffer(100, PEER, true)?;
        instance.destroy();

        assert_eq!(capture.messages(Level::Warn).len(), 1);
        Ok(())
    }

    #[test]
    fn test_encode_decode_across_instances() -> anyhow::Result<()> {
        let hv = SimHypervisor::new();
        let mut granter = Instance::create(&hv.domain(LOCAL), None)?;
        let mut receiver = Instance::create(&hv.domain(PEER), None)?;

        let refs: Vec<GrantRef> = (1..=5000).map(GrantRef).collect();
        let tree = granter.encode(&refs, RefKind::Normal, PEER)?;
        let decoded = receiver.decode(LOCAL, tree.root())?;
        assert_eq!(decoded.data_refs, refs);

        granter.release_tree(tree)?;
        assert_eq!(hv.stats().outstanding_grants, 0);
        Ok(())
    }

    #[test]
    fn test_decode_rejects_null_root() -> anyhow::Result<()> {
        let hv = SimHypervisor::new();
        let mut instance = Instance::create(&hv.domain(PEER), None)?;
        assert!(matches!(
            instance.decode(LOCAL, GrantRef(0)),
            Err(GrantError::InvalidArgument(_))
        ));
        Ok(())
    }
}
