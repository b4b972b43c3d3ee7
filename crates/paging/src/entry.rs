use core::fmt;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::addr::{Gpa, Pfn};
use crate::error::PagingError;

// x86_64 Page Table Entry layout, shared by PML4E, PDPTE, PDE and PTE.

bitflags! {
    /// x86_64 Page Table Entry flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PageTableFlags: u64 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER_ACCESSIBLE = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const NO_CACHE = 1 << 4;
        const ACCESSED = 1 << 5;
        const DIRTY = 1 << 6;
        const HUGE_PAGE = 1 << 7;
        const GLOBAL = 1 << 8;
        const NO_EXECUTE = 1 << 63;
    }
}

/// Page frame number position inside an entry
pub const PFN_SHIFT: u32 = 12;
/// Width of the page frame number field (bits 12..=51)
pub const PFN_BITS: u32 = 40;
/// Bits 12..=51 of an entry
const ADDRESS_MASK: u64 = 0x000f_ffff_ffff_f000;

/// One hardware-format paging entry.
#[derive(Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(transparent)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Encode `pfn` and `flags` into an entry.
    ///
    /// Frame numbers wider than the 40-bit field are rejected rather than
    /// truncated.
    pub fn encode(pfn: Pfn, flags: PageTableFlags) -> Result<Self, PagingError> {
        if pfn.0 >> PFN_BITS != 0 {
            log::error!("[PAGING] PFN {:#x} does not fit in {} bits", pfn, PFN_BITS);
            return Err(PagingError::EncodingOverflow);
        }
        Ok(Self((pfn.0 << PFN_SHIFT) | flags.bits()))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_unused(self) -> bool {
        self.0 == 0
    }

    pub fn flags(self) -> PageTableFlags {
        PageTableFlags::from_bits_truncate(self.0)
    }

    pub const fn pfn(self) -> Pfn {
        Pfn((self.0 & ADDRESS_MASK) >> PFN_SHIFT)
    }

    pub const fn address(self) -> Gpa {
        Gpa(self.0 & ADDRESS_MASK)
    }

    pub fn is_present(self) -> bool {
        self.flags().contains(PageTableFlags::PRESENT)
    }

    pub fn is_writable(self) -> bool {
        self.flags().contains(PageTableFlags::WRITABLE)
    }

    pub fn is_user(self) -> bool {
        self.flags().contains(PageTableFlags::USER_ACCESSIBLE)
    }

    pub fn is_executable(self) -> bool {
        !self.flags().contains(PageTableFlags::NO_EXECUTE)
    }
}

impl fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageTableEntry")
            .field("pfn", &format_args!("{:#x}", self.pfn()))
            .field("flags", &self.flags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let entry = PageTableEntry::encode(
            Pfn(0x401),
            PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE,
        )
        .unwrap();
        assert_eq!(entry.raw(), 0x0040_1007);
        assert_eq!(entry.pfn(), Pfn(0x401));
        assert_eq!(entry.address(), Gpa(0x401000));
        assert!(entry.is_present());
        assert!(entry.is_writable());
        assert!(entry.is_user());
        assert!(entry.is_executable());
    }

    #[test]
    fn test_encode_no_execute() {
        let entry =
            PageTableEntry::encode(Pfn(1), PageTableFlags::PRESENT | PageTableFlags::NO_EXECUTE)
                .unwrap();
        assert_eq!(entry.raw(), 0x8000_0000_0000_1001);
        assert!(!entry.is_executable());
        assert!(!entry.is_writable());
        assert!(!entry.is_user());
    }

    #[test]
    fn test_encode_widest_pfn() {
        let max = Pfn((1 << PFN_BITS) - 1);
        let entry = PageTableEntry::encode(max, PageTableFlags::PRESENT).unwrap();
        assert_eq!(entry.pfn(), max);
        assert_eq!(entry.raw(), 0x000f_ffff_ffff_f001);
    }

    #[test]
    fn test_encode_overflow() {
        assert_eq!(
            PageTableEntry::encode(Pfn(1 << PFN_BITS), PageTableFlags::PRESENT),
            Err(PagingError::EncodingOverflow)
        );
        assert_eq!(
            PageTableEntry::encode(Pfn(u64::MAX), PageTableFlags::PRESENT),
            Err(PagingError::EncodingOverflow)
        );
    }

    #[test]
    fn test_empty_entry() {
        let entry = PageTableEntry::empty();
        assert!(entry.is_unused());
        assert!(!entry.is_present());
        assert_eq!(entry.pfn(), Pfn(0));
    }
}
