//! Page arithmetic shared by the paging and vCPU crates.
//!
//! Guest addresses are plain `u64` here; the paging crate wraps them in
//! typed newtypes once they cross its API.

/// Page size: 4KB
pub const PAGE_SIZE: u64 = 0x1000;
/// Page shift (log2 of page size)
pub const PAGE_SHIFT: u32 = 12;
/// Mask selecting the page-aligned part of an address
pub const PAGE_MASK: u64 = !(PAGE_SIZE - 1);

/// Whether `addr` sits on a 4KB boundary.
#[inline]
pub const fn is_page_aligned(addr: u64) -> bool {
    addr & (PAGE_SIZE - 1) == 0
}

/// Round `size` up to the next page boundary.
///
/// Already aligned values come back unchanged. Returns `None` when the
/// rounded value does not fit in 64 bits.
#[inline]
pub const fn align_to_page(size: u64) -> Option<u64> {
    if is_page_aligned(size) {
        return Some(size);
    }
    match size.checked_add(PAGE_SIZE) {
        Some(bumped) => Some(bumped & PAGE_MASK),
        None => None,
    }
}

/// Split an address into its page-aligned base and the offset inside that page.
#[inline]
pub const fn split_address(addr: u64) -> (u64, u64) {
    (addr & PAGE_MASK, addr & !PAGE_MASK)
}
