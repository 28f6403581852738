//! Metapage layout.
//!
//! A metapage is one page describing a list of grant references. Layout,
//! little-endian, no padding:
//!
//! ```text
//! offset  field        type
//! 0       api_version  u32
//! 4       magic        u32   "BIGG"
//! 8       ref_kind     u32   0 = data page refs, 1 = refs to child metapages
//! 12      num_refs     u32
//! 16      refs[]       u32 each, num_refs of them
//! ```
//!
//! Capacity past `num_refs` is undefined and ignored by the reader.

pub mod codec;

use crate::error::{GrantError, GrantResult};
use crate::grant::{GrantRef, PAGE_SIZE};
use byteorder::{ByteOrder, LittleEndian};

pub const METAPAGE_MAGIC: u32 = 0x4249_4747;
pub const METAPAGE_API_VERSION: u32 = 0;

// Header structure (16 bytes)
pub const METAPAGE_HEADER_SIZE: usize = 16;
const API_VERSION_OFFSET: usize = 0;
const MAGIC_OFFSET: usize = 4;
const REF_KIND_OFFSET: usize = 8;
const NUM_REFS_OFFSET: usize = 12;

const REF_SIZE: usize = 4;

/// Number of references a single metapage can hold.
pub const REFS_PER_METAPAGE: usize = (PAGE_SIZE - METAPAGE_HEADER_SIZE) / REF_SIZE;

pub use codec::{
    DecodedTree, LocalMetapages, MAX_LEVEL_REFS, MAX_TREE_HEIGHT, MetapageTree, PageSource,
    RemoteMetapages, SharedMetapage, decode, encode,
};

/// What the entries of a metapage point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RefKind {
    /// Leaf: entries are the caller's data pages.
    Normal = 0,
    /// Internal node: entries are child metapages.
    Metarefs = 1,
}

impl TryFrom<u32> for RefKind {
    type Error = GrantError;

    fn try_from(value: u32) -> GrantResult<Self> {
        match value {
            0 => Ok(RefKind::Normal),
            1 => Ok(RefKind::Metarefs),
            other => Err(GrantError::format(format!("unknown ref kind {}", other))),
        }
    }
}

/// Stamp `page` as a metapage of `kind` holding `refs`.
pub fn write_metapage(
    page: &mut [u8; PAGE_SIZE],
    kind: RefKind,
    refs: &[GrantRef],
) -> GrantResult<()> {
    if refs.len() > REFS_PER_METAPAGE {
        return Err(GrantError::invalid(format!(
            "{} references do not fit in one metapage (capacity {})",
            refs.len(),
            REFS_PER_METAPAGE
        )));
    }

    LittleEndian::write_u32(&mut page[API_VERSION_OFFSET..], METAPAGE_API_VERSION);
    LittleEndian::write_u32(&mut page[MAGIC_OFFSET..], METAPAGE_MAGIC);
    LittleEndian::write_u32(&mut page[REF_KIND_OFFSET..], kind as u32);
    LittleEndian::write_u32(&mut page[NUM_REFS_OFFSET..], refs.len() as u32);

    let body = &mut page[METAPAGE_HEADER_SIZE..];
    for (slot, reference) in body.chunks_exact_mut(REF_SIZE).zip(refs) {
        LittleEndian::write_u32(slot, reference.0);
    }
    Ok(())
}

/// Validated read-only view of a metapage.
#[derive(Debug, Clone, Copy)]
pub struct Metapage<'a> {
    data: &'a [u8; PAGE_SIZE],
}

impl<'a> Metapage<'a> {
    /// Check the header of `data` and wrap it.
    pub fn parse(data: &'a [u8; PAGE_SIZE]) -> GrantResult<Self> {
        let magic = LittleEndian::read_u32(&data[MAGIC_OFFSET..]);
        if magic != METAPAGE_MAGIC {
            return Err(GrantError::format(format!(
                "bad magic {:#010x} (expected {:#010x})",
                magic, METAPAGE_MAGIC
            )));
        }

        let version = LittleEndian::read_u32(&data[API_VERSION_OFFSET..]);
        if version != METAPAGE_API_VERSION {
            return Err(GrantError::format(format!(
                "unsupported api version {} (expected {})",
                version, METAPAGE_API_VERSION
            )));
        }

        let page = Self { data };
        RefKind::try_from(LittleEndian::read_u32(&data[REF_KIND_OFFSET..]))?;
        let num_refs = page.num_refs();
        if num_refs > REFS_PER_METAPAGE {
            return Err(GrantError::format(format!(
                "num_refs {} exceeds capacity {}",
                num_refs, REFS_PER_METAPAGE
            )));
        }
        Ok(page)
    }

    pub fn kind(&self) -> RefKind {
        match LittleEndian::read_u32(&self.data[REF_KIND_OFFSET..]) {
            0 => RefKind::Normal,
            _ => RefKind::Metarefs,
        }
    }

    pub fn num_refs(&self) -> usize {
        LittleEndian::read_u32(&self.data[NUM_REFS_OFFSET..]) as usize
    }

    pub fn refs(&self) -> Vec<GrantRef> {
        let end = METAPAGE_HEADER_SIZE + self.num_refs() * REF_SIZE;
        let mut raw = vec![0u32; self.num_refs()];
        LittleEndian::read_u32_into(&self.data[METAPAGE_HEADER_SIZE..end], &mut raw);
        raw.into_iter().map(GrantRef).collect()
    }
}
