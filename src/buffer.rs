//! Multi-page shared buffers.
//!
//! The granting side allocates a buffer and gets back one root reference to
//! hand to the receiving domain out of band. The receiving side maps the
//! buffer from that root reference alone.

use crate::error::{GrantError, GrantResult, ReleaseError};
use crate::grant::{DomainId, GrantRef, PAGE_SIZE, pages_for};
use crate::instance::{BufferRecord, Instance};
use crate::logging::{Logger, log_debug, log_error, log_warn};
use crate::metapage::{LocalMetapages, RefKind, decode, encode};
use crate::platform::{GrantMap, GrantShare, MappedGrant, Platform};
use std::collections::HashSet;
use std::ptr::NonNull;

/// A buffer this domain shares with another one.
///
/// Valid until passed to [`Instance::release_shared_buffer`]. Dropping it
/// without releasing leaves the pages shared.
#[derive(Debug)]
pub struct SharedBuffer {
    address: NonNull<u8>,
    len: usize,
    num_pages: usize,
    root: GrantRef,
    domain: DomainId,
}

// SAFETY: the buffer owns its local mapping exclusively, like a `Vec<u8>`.
// Concurrent writes by the peer domain are outside what Rust can order.
unsafe impl Send for SharedBuffer {}
unsafe impl Sync for SharedBuffer {}

impl SharedBuffer {
    /// The reference to transmit to the receiving domain.
    pub fn root(&self) -> GrantRef {
        self.root
    }

    pub fn domain(&self) -> DomainId {
        self.domain
    }

    pub fn address(&self) -> NonNull<u8> {
        self.address
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping covers `num_pages` pages and stays mapped until
        // the buffer is consumed by release.
        unsafe { std::slice::from_raw_parts(self.address.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above; `&mut self` rules out other local borrows.
        unsafe { std::slice::from_raw_parts_mut(self.address.as_ptr(), self.len) }
    }
}

/// A buffer shared by another domain and mapped here page by page.
#[derive(Debug)]
pub struct RemoteBuffer {
    domain: DomainId,
    root: GrantRef,
    writable: bool,
    pages: Vec<MappedGrant>,
}

impl RemoteBuffer {
    pub fn root(&self) -> GrantRef {
        self.root
    }

    /// The domain that shared the buffer.
    pub fn domain(&self) -> DomainId {
        self.domain
    }

    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn len(&self) -> usize {
        self.pages.len() * PAGE_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Data page references, in buffer order.
    pub fn refs(&self) -> Vec<GrantRef> {
        self.pages.iter().map(|page| page.reference).collect()
    }

    pub fn page(&self, index: usize) -> Option<&[u8; PAGE_SIZE]> {
        // SAFETY: mapped pages stay valid until the buffer is unmapped.
        self.pages
            .get(index)
            .map(|page| unsafe { &*(page.address.as_ptr() as *const [u8; PAGE_SIZE]) })
    }

    /// Copy `buf.len()` bytes starting at `offset` out of the buffer.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> GrantResult<()> {
        self.check_range(offset, buf.len())?;
        let mut done = 0;
        while done < buf.len() {
            let position = offset + done;
            let (index, within) = (position / PAGE_SIZE, position % PAGE_SIZE);
            let n = (PAGE_SIZE - within).min(buf.len() - done);
            // SAFETY: `check_range` keeps `index` and `within + n` in bounds.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.pages[index].address.as_ptr().add(within),
                    buf[done..].as_mut_ptr(),
                    n,
                );
            }
            done += n;
        }
        Ok(())
    }

    /// Copy `data` into the buffer starting at `offset`.
    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> GrantResult<()> {
        if !self.writable {
            return Err(GrantError::invalid("buffer was mapped read-only"));
        }
        self.check_range(offset, data.len())?;
        let mut done = 0;
        while done < data.len() {
            let position = offset + done;
            let (index, within) = (position / PAGE_SIZE, position % PAGE_SIZE);
            let n = (PAGE_SIZE - within).min(data.len() - done);
            // SAFETY: `check_range` keeps `index` and `within + n` in bounds.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    data[done..].as_ptr(),
                    self.pages[index].address.as_ptr().add(within),
                    n,
                );
            }
            done += n;
        }
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len()];
        for (chunk, index) in out.chunks_exact_mut(PAGE_SIZE).zip(0..) {
            if let Some(page) = self.page(index) {
                chunk.copy_from_slice(page);
            }
        }
        out
    }

    fn check_range(&self, offset: usize, len: usize) -> GrantResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len() => Ok(()),
            _ => Err(GrantError::invalid(format!(
                "range {}+{} is outside a {}-byte buffer",
                offset,
                len,
                self.len()
            ))),
        }
    }
}

impl<P: Platform> Instance<P> {
    /// Share `byte_size` bytes (rounded up to whole pages) with `domain`.
    ///
    /// The data pages are described by a metapage tree whose root reference
    /// is returned in the buffer. Nothing stays shared if this fails.
    pub fn allocate_shared_buffer(
        &mut self,
        byte_size: usize,
        domain: DomainId,
        writable: bool,
    ) -> GrantResult<SharedBuffer> {
        if byte_size == 0 {
            log_error!(&self.logger, "Refusing to allocate an empty shared buffer");
            return Err(GrantError::invalid("buffer size must be greater than 0"));
        }
        let num_pages = pages_for(byte_size);
        if u32::try_from(num_pages).is_err() {
            log_error!(&self.logger, "Buffer of {} bytes needs too many pages", byte_size);
            return Err(GrantError::invalid(format!(
                "{} pages cannot be referenced",
                num_pages
            )));
        }

        let region = self
            .share
            .share_pages(domain, num_pages, writable)
            .map_err(|e| {
                log_error!(
                    &self.logger,
                    "Could not share {} page(s) with {}: {}",
                    num_pages,
                    domain,
                    e
                );
                e
            })?;

        if region.num_pages() != num_pages {
            log_error!(
                &self.logger,
                "Platform returned {} reference(s) for {} page(s)",
                region.num_pages(),
                num_pages
            );
            self.unshare_quietly(region.address, num_pages);
            return Err(GrantError::platform("share pages", "reference count mismatch"));
        }

        let encoded = encode(
            &mut self.share,
            &self.logger,
            &region.refs,
            RefKind::Normal,
            domain,
        );
        let tree = match encoded {
            Ok(tree) => tree,
            Err(e) => {
                log_error!(&self.logger, "Could not create a metapage for the references: {}", e);
                self.unshare_quietly(region.address, num_pages);
                return Err(e);
            }
        };

        let buffer = SharedBuffer {
            address: region.address,
            len: byte_size,
            num_pages,
            root: tree.root(),
            domain,
        };
        log_debug!(
            &self.logger,
            "Shared {} page(s) with {} under root {}",
            num_pages,
            domain,
            buffer.root
        );
        self.buffers.insert(
            region.address.as_ptr() as usize,
            BufferRecord {
                domain,
                num_pages,
                data_refs: region.refs,
                tree,
                released_metapages: HashSet::new(),
            },
        );
        Ok(buffer)
    }

    /// Stop sharing `buffer`: unshare every metapage of its tree, then its
    /// data pages.
    ///
    /// The tree is resolved again to find the pages. If it no longer
    /// matches what was shared, everything recorded at allocation is still
    /// reclaimed and the mismatch is reported. If the platform refuses an
    /// unshare, the data pages stay shared and the error hands the buffer
    /// back; releasing it again retries only what is left.
    pub fn release_shared_buffer(&mut self, buffer: SharedBuffer) -> Result<(), ReleaseError> {
        let key = buffer.address.as_ptr() as usize;
        let num_pages = pages_for(buffer.len);
        let Some(record) = self.buffers.get_mut(&key) else {
            log_error!(
                &self.logger,
                "{:p} is not a buffer shared by this instance",
                buffer.address
            );
            return Err(ReleaseError::retained(
                buffer,
                GrantError::invalid("unknown shared buffer"),
            ));
        };
        if record.num_pages != num_pages {
            log_error!(
                &self.logger,
                "Release of {} page(s) at {:p}, but {} were shared",
                num_pages,
                buffer.address,
                record.num_pages
            );
            return Err(ReleaseError::retained(
                buffer,
                GrantError::invalid("buffer size does not match the share"),
            ));
        }

        // Released metapages are no longer mapped, so only a first attempt
        // can walk the tree.
        let checked = if record.released_metapages.is_empty() {
            verify_tree(&self.logger, record)
        } else {
            Ok(())
        };

        let mut failure = None;
        for metapage in record.tree.metapages() {
            if record.released_metapages.contains(&metapage.reference) {
                continue;
            }
            match self.share.unshare(metapage.address, 1) {
                Ok(()) => {
                    record.released_metapages.insert(metapage.reference);
                }
                Err(e) => {
                    log_warn!(
                        &self.logger,
                        "Could not unshare metapage {}: {}",
                        metapage.reference,
                        e
                    );
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            log_error!(
                &self.logger,
                "Buffer under root {} is still shared; {} of {} metapage(s) released",
                record.tree.root(),
                record.released_metapages.len(),
                record.tree.metapage_count()
            );
            return Err(ReleaseError::retained(buffer, e));
        }

        if let Err(e) = self.share.unshare(buffer.address, num_pages) {
            log_error!(&self.logger, "Could not unshare {} data page(s): {}", num_pages, e);
            return Err(ReleaseError::retained(buffer, e));
        }

        if let Some(record) = self.buffers.remove(&key) {
            log_debug!(
                &self.logger,
                "Released {} page(s) and {} metapage(s) shared with {}",
                num_pages,
                record.tree.metapage_count(),
                record.domain
            );
        }
        checked.map_err(ReleaseError::released)
    }

    /// Map the buffer `domain` shared under `root`.
    pub fn map_shared_buffer(
        &mut self,
        domain: DomainId,
        root: GrantRef,
        writable: bool,
    ) -> GrantResult<RemoteBuffer> {
        let decoded = self.decode(domain, root)?;
        let pages = self
            .map
            .map_grant_refs(domain, &decoded.data_refs, writable)
            .map_err(|e| {
                log_error!(
                    &self.logger,
                    "Could not map {} page(s) from {}: {}",
                    decoded.data_refs.len(),
                    domain,
                    e
                );
                e
            })?;
        log_debug!(
            &self.logger,
            "Mapped {} page(s) from {} under root {}",
            pages.len(),
            domain,
            root
        );

        Ok(RemoteBuffer {
            domain,
            root,
            writable,
            pages,
        })
    }

    pub fn unmap_shared_buffer(&mut self, buffer: RemoteBuffer) -> GrantResult<()> {
        self.map.unmap(&buffer.pages).map_err(|e| {
            log_error!(
                &self.logger,
                "Could not unmap buffer under root {}: {}",
                buffer.root,
                e
            );
            e
        })
    }

    fn unshare_quietly(&mut self, address: NonNull<u8>, num_pages: usize) {
        if let Err(e) = self.share.unshare(address, num_pages) {
            log_warn!(
                &self.logger,
                "Could not unshare {} page(s) at {:p}: {}",
                num_pages,
                address,
                e
            );
        }
    }
}

/// Resolve a buffer's tree through its local metapage mappings and compare
/// it with what was recorded at allocation.
fn verify_tree(logger: &Logger, record: &BufferRecord) -> GrantResult<()> {
    let pages = record.tree.local_pages();
    let checked = decode(&mut LocalMetapages::new(&pages), logger, record.tree.root())
        .and_then(|decoded| {
            if decoded.data_refs != record.data_refs {
                return Err(GrantError::format("metapage tree does not match the shared pages"));
            }
            if decoded.metapage_refs.len() != record.tree.metapage_count() {
                return Err(GrantError::format("metapage tree does not match its metapages"));
            }
            Ok(())
        });
    if let Err(e) = &checked {
        log_warn!(
            logger,
            "Releasing buffer under root {} from its record: {}",
            record.tree.root(),
            e
        );
    }
    checked
}
