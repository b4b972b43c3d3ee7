//! One guest physical page seen from the host.
//!
//! Paging structures are written through this type instead of casting raw
//! host pointers to `[u64; 512]`: slots are addressed with a [`TableIndex`],
//! so an out-of-range write cannot be expressed.

use bytemuck::{Pod, Zeroable};

use crate::addr::{ENTRIES_PER_TABLE, TableIndex};
use crate::entry::PageTableEntry;

/// A 4KB page laid out as 512 eight-byte entries (native byte order).
#[derive(Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(transparent)]
pub struct PhysPage([PageTableEntry; ENTRIES_PER_TABLE]);

impl PhysPage {
    pub const fn new() -> Self {
        Self([PageTableEntry::empty(); ENTRIES_PER_TABLE])
    }

    pub fn entry(&self, index: TableIndex) -> PageTableEntry {
        self.0[index.as_usize()]
    }

    pub fn set_entry(&mut self, index: TableIndex, entry: PageTableEntry) {
        self.0[index.as_usize()] = entry;
    }

    /// Raw slot lookup for callers holding an unchecked number.
    pub fn get(&self, slot: usize) -> Option<PageTableEntry> {
        self.0.get(slot).copied()
    }

    pub fn zero(&mut self) {
        for entry in &mut self.0 {
            *entry = PageTableEntry::empty();
        }
    }

    pub fn is_zeroed(&self) -> bool {
        self.0.iter().all(|entry| entry.is_unused())
    }

    /// Slots holding a non-zero entry, in slot order.
    pub fn used_entries(&self) -> impl Iterator<Item = (usize, PageTableEntry)> + '_ {
        self.0
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, entry)| !entry.is_unused())
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::bytes_of_mut(self)
    }
}

impl Default for PhysPage {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for PhysPage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.used_entries()).finish()
    }
}
