//! Typed guest addresses and 4-level index decomposition.
//!
//! A page-aligned guest virtual address breaks down as:
//!
//! ```text
//! [sign extension:16][PML4:9][PDPT:9][PD:9][PT:9][offset:12]
//! ```

use core::fmt;

use gvm_utils::{PAGE_SHIFT, is_page_aligned, split_address};

use crate::error::PagingError;

/// Entries per paging structure (512 for 4KB tables with 8-byte entries)
pub const ENTRIES_PER_TABLE: usize = 512;

const INDEX_MASK: u64 = 0x1ff;
const PT_SHIFT: u32 = PAGE_SHIFT;
const PD_SHIFT: u32 = PAGE_SHIFT + 9;
const PDPT_SHIFT: u32 = PAGE_SHIFT + 18;
const PML4_SHIFT: u32 = PAGE_SHIFT + 27;

/// Guest virtual address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Gva(pub u64);

/// Guest physical address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Gpa(pub u64);

/// Host-visible address of a guest page, as handed out by the memory provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct HostAddr(pub u64);

/// Physical page frame number (GPA >> 12).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Pfn(pub u64);

macro_rules! impl_hex {
    ($($ty:ty),*) => {
        $(
            impl fmt::LowerHex for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::LowerHex::fmt(&self.0, f)
                }
            }
        )*
    };
}

impl_hex!(Gva, Gpa, HostAddr, Pfn);

impl Gva {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn is_page_aligned(self) -> bool {
        is_page_aligned(self.0)
    }

    /// Page-aligned base and byte offset within the page.
    pub const fn split(self) -> (Gva, u64) {
        let (page, offset) = split_address(self.0);
        (Gva(page), offset)
    }

    pub const fn indices(self) -> TableIndices {
        TableIndices::of(self)
    }
}

impl Gpa {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn is_page_aligned(self) -> bool {
        is_page_aligned(self.0)
    }

    /// Page frame number of this GPA.
    ///
    /// Only page-aligned GPAs have an exact frame number; anything else is
    /// rejected instead of being floor-divided.
    pub fn pfn(self) -> Result<Pfn, PagingError> {
        if !self.is_page_aligned() {
            log::error!("[PAGING] GPA {:#x} is not page aligned", self);
            return Err(PagingError::InvalidArgument);
        }
        Ok(Pfn(self.0 >> PAGE_SHIFT))
    }

    pub const fn from_pfn(pfn: Pfn) -> Self {
        Self(pfn.0 << PAGE_SHIFT)
    }
}

/// A slot number inside one paging structure, always in `0..512`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    pub const fn new(index: u16) -> Option<Self> {
        if (index as usize) < ENTRIES_PER_TABLE {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Take the low 9 bits of `raw`.
    const fn masked(raw: u64) -> Self {
        Self((raw & INDEX_MASK) as u16)
    }

    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    pub const fn as_u64(self) -> u64 {
        self.0 as u64
    }
}

impl fmt::Display for TableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Extract PML4 index (bits 39-47)
pub const fn pml4_index(gva: Gva) -> TableIndex {
    TableIndex::masked(gva.0 >> PML4_SHIFT)
}

/// Extract PDPT index (bits 30-38)
pub const fn pdpt_index(gva: Gva) -> TableIndex {
    TableIndex::masked(gva.0 >> PDPT_SHIFT)
}

/// Extract PD index (bits 21-29)
pub const fn pd_index(gva: Gva) -> TableIndex {
    TableIndex::masked(gva.0 >> PD_SHIFT)
}

/// Extract PT index (bits 12-20)
pub const fn pt_index(gva: Gva) -> TableIndex {
    TableIndex::masked(gva.0 >> PT_SHIFT)
}

/// The four table slots a virtual page goes through, top level first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TableIndices {
    pub pml4: TableIndex,
    pub pdpt: TableIndex,
    pub pd: TableIndex,
    pub pt: TableIndex,
}

impl TableIndices {
    pub const fn of(gva: Gva) -> Self {
        Self {
            pml4: pml4_index(gva),
            pdpt: pdpt_index(gva),
            pd: pd_index(gva),
            pt: pt_index(gva),
        }
    }

    /// Rebuild the page-aligned address these indices describe.
    ///
    /// Bit 47 is sign-extended, so every canonical page-aligned address
    /// survives a decompose/compose round trip.
    pub fn compose(&self) -> Gva {
        let raw = (self.pml4.as_u64() << PML4_SHIFT)
            | (self.pdpt.as_u64() << PDPT_SHIFT)
            | (self.pd.as_u64() << PD_SHIFT)
            | (self.pt.as_u64() << PT_SHIFT);
        Gva(x86_64::VirtAddr::new_truncate(raw).as_u64())
    }
}
