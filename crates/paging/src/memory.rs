//! Heap-backed guest memory for host builds and tests.
//!
//! Pages live in boxed [`PhysPage`]s; host addresses are synthetic handles
//! that only mean something to this provider.

use alloc::boxed::Box;

use gvm_utils::{HashMap, PAGE_SIZE};

use crate::access::AccessSpec;
use crate::addr::{Gpa, HostAddr};
use crate::error::ProviderError;
use crate::page::PhysPage;
use crate::traits::{GuestMemoryProvider, MappedPage};

/// First synthetic host address handed out
const HOST_BASE: u64 = 0x0000_7F00_0000_0000;

struct Backing {
    access: AccessSpec,
    page: Box<PhysPage>,
}

/// Sparse in-memory guest physical space with a fixed page budget.
pub struct SparseGuestMemory {
    pages: HashMap<HostAddr, Backing>,
    by_gpa: HashMap<Gpa, HostAddr>,
    capacity: usize,
    next_host: u64,
    map_calls: usize,
}

impl SparseGuestMemory {
    /// Memory that can back at most `capacity_pages` pages.
    pub fn new(capacity_pages: usize) -> Self {
        Self {
            pages: HashMap::new(),
            by_gpa: HashMap::new(),
            capacity: capacity_pages,
            next_host: HOST_BASE,
            map_calls: 0,
        }
    }

    /// Number of `map_page` calls, failed ones included.
    pub fn map_calls(&self) -> usize {
        self.map_calls
    }

    pub fn mapped_pages(&self) -> usize {
        self.by_gpa.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Protection a page was mapped with.
    pub fn access_of(&self, gpa: Gpa) -> Option<AccessSpec> {
        let host = self.by_gpa.get(&gpa)?;
        self.pages.get(host).map(|b| b.access)
    }

    /// Page backing `gpa`, looked up by guest address.
    pub fn page_at(&self, gpa: Gpa) -> Option<&PhysPage> {
        let host = self.by_gpa.get(&gpa)?;
        self.pages.get(host).map(|b| &*b.page)
    }

    /// Mapped GPAs in ascending order.
    pub fn mapped_gpas(&self) -> impl Iterator<Item = Gpa> + '_ {
        let mut gpas: alloc::vec::Vec<Gpa> = self.by_gpa.keys().copied().collect();
        gpas.sort_unstable();
        gpas.into_iter()
    }
}

impl GuestMemoryProvider for SparseGuestMemory {
    fn map_page(&mut self, hint: Gpa, access: AccessSpec) -> Result<MappedPage, ProviderError> {
        self.map_calls += 1;

        if !hint.is_page_aligned() {
            return Err(ProviderError::Misaligned);
        }
        if self.by_gpa.contains_key(&hint) {
            return Err(ProviderError::AlreadyMapped);
        }
        if self.by_gpa.len() >= self.capacity {
            log::warn!(
                "[MEM] Out of guest memory ({} pages) mapping GPA {:#x}",
                self.capacity,
                hint
            );
            return Err(ProviderError::Exhausted);
        }

        let host = HostAddr(self.next_host);
        self.next_host += PAGE_SIZE;
        self.pages.insert(
            host,
            Backing {
                access,
                page: Box::new(PhysPage::new()),
            },
        );
        self.by_gpa.insert(hint, host);
        log::trace!("[MEM] GPA {:#x} -> host {:#x} ({})", hint, host, access);

        Ok(MappedPage { host, gpa: hint })
    }

    fn page(&self, host: HostAddr) -> Option<&PhysPage> {
        self.pages.get(&host).map(|b| &*b.page)
    }

    fn page_mut(&mut self, host: HostAddr) -> Option<&mut PhysPage> {
        self.pages.get_mut(&host).map(|b| &mut *b.page)
    }

    fn host_for(&self, gpa: Gpa) -> Option<HostAddr> {
        self.by_gpa.get(&gpa).copied()
    }
}

impl core::fmt::Debug for SparseGuestMemory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SparseGuestMemory")
            .field("mapped", &self.by_gpa.len())
            .field("capacity", &self.capacity)
            .field("map_calls", &self.map_calls)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_page_zeroed_and_tracked() {
        let mut memory = SparseGuestMemory::new(2);
        let page = memory.map_page(Gpa(0x5000), AccessSpec::READ_WRITE).unwrap();

        assert_eq!(page.gpa, Gpa(0x5000));
        assert_eq!(memory.host_for(Gpa(0x5000)), Some(page.host));
        assert!(memory.page(page.host).unwrap().is_zeroed());
        assert_eq!(memory.access_of(Gpa(0x5000)), Some(AccessSpec::READ_WRITE));
        assert_eq!(memory.map_calls(), 1);
    }

    #[test]
    fn test_map_page_rejections() {
        let mut memory = SparseGuestMemory::new(1);

        assert_eq!(
            memory.map_page(Gpa(0x5001), AccessSpec::READ_ONLY),
            Err(ProviderError::Misaligned)
        );
        memory.map_page(Gpa(0x5000), AccessSpec::READ_ONLY).unwrap();
        assert_eq!(
            memory.map_page(Gpa(0x5000), AccessSpec::READ_ONLY),
            Err(ProviderError::AlreadyMapped)
        );
        assert_eq!(
            memory.map_page(Gpa(0x6000), AccessSpec::READ_ONLY),
            Err(ProviderError::Exhausted)
        );
        assert_eq!(memory.map_calls(), 4);
        assert_eq!(memory.mapped_pages(), 1);
    }

    #[test]
    fn test_distinct_host_addresses() {
        let mut memory = SparseGuestMemory::new(4);
        let a = memory.map_page(Gpa(0x1000), AccessSpec::READ_ONLY).unwrap();
        let b = memory.map_page(Gpa(0x9000), AccessSpec::READ_ONLY).unwrap();
        assert_ne!(a.host, b.host);

        memory.page_mut(a.host).unwrap().as_bytes_mut()[0] = 0xaa;
        assert!(memory.page(b.host).unwrap().is_zeroed());
        assert_eq!(
            memory.mapped_gpas().collect::<alloc::vec::Vec<_>>(),
            [Gpa(0x1000), Gpa(0x9000)]
        );
    }
}
