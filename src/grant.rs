//! Basic identifiers shared by every layer: grant references, domain ids and
//! page geometry.

use std::fmt;

pub const PAGE_SHIFT: usize = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Platform-assigned handle naming one shared page.
///
/// Unique per (granting domain, page) while the page is shared; meaningless
/// once the page has been unshared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GrantRef(pub u32);

impl fmt::Display for GrantRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an isolated execution domain (virtual machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DomainId(pub u16);

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dom{}", self.0)
    }
}

/// Number of pages needed to hold `byte_size` bytes.
pub fn pages_for(byte_size: usize) -> usize {
    byte_size.div_ceil(PAGE_SIZE)
}
