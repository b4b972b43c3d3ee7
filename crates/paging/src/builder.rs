//! Guest virtual address space construction.
//!
//! For every requested page the builder walks PML4 -> PDPT -> PD -> PT,
//! materializes missing structures through the [`Ledger`], and links each
//! level to the next. Intermediate entries are always present, writable and
//! executable; only the PTE narrows access to what the page asked for.

use crate::access::AccessSpec;
use crate::addr::{Gpa, Gva, HostAddr, TableIndex};
use crate::config::BuilderConfig;
use crate::entry::{PageTableEntry, PageTableFlags};
use crate::error::PagingError;
use crate::ledger::{Ledger, TranslationPath};
use crate::traits::{GpaPolicy, GuestMemoryProvider, MappedPage};

/// One guest virtual page and the access it should get.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageRequest {
    pub gva: Gva,
    pub access: AccessSpec,
}

impl PageRequest {
    pub const fn new(gva: Gva, access: AccessSpec) -> Self {
        Self { gva, access }
    }

    /// Build a request from a raw address and an access string such as `"rw"`.
    pub fn parse(gva: u64, access: &str) -> Result<Self, PagingError> {
        Ok(Self::new(Gva(gva), access.parse()?))
    }
}

/// Flags for PML4E/PDPTE/PDE entries.
pub fn table_flags(user: bool) -> PageTableFlags {
    let mut flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE;
    flags.set(PageTableFlags::USER_ACCESSIBLE, user);
    flags
}

/// Flags for the PTE of a page requested with `access`.
pub fn leaf_flags(access: AccessSpec, user: bool) -> PageTableFlags {
    let mut flags = PageTableFlags::PRESENT;
    flags.set(PageTableFlags::WRITABLE, access.is_writable());
    flags.set(PageTableFlags::USER_ACCESSIBLE, user);
    flags.set(PageTableFlags::NO_EXECUTE, !access.is_executable());
    flags
}

/// Builds 4-level address spaces on top of a guest memory provider.
#[derive(Clone, Copy, Debug, Default)]
pub struct AddressSpaceBuilder {
    config: BuilderConfig,
}

impl AddressSpaceBuilder {
    pub const fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Build an address space backing `requests` and return the PML4's GPA,
    /// the value to load into the guest's CR3.
    ///
    /// The PML4 is allocated even when `requests` is empty. On error, pages
    /// already obtained from `memory` stay allocated and unreachable; the
    /// caller must discard the partition's address space.
    pub fn build<M, P>(
        &self,
        memory: &mut M,
        policy: &mut P,
        requests: &[PageRequest],
    ) -> Result<Gpa, PagingError>
    where
        M: GuestMemoryProvider + ?Sized,
        P: GpaPolicy + ?Sized,
    {
        let mut ledger = Ledger::new();
        self.build_with_ledger(&mut ledger, memory, policy, requests)
    }

    /// Same as [`build`](Self::build), recording allocations in a caller-owned
    /// ledger so they can be inspected afterwards. The ledger must be empty.
    pub fn build_with_ledger<M, P>(
        &self,
        ledger: &mut Ledger,
        memory: &mut M,
        policy: &mut P,
        requests: &[PageRequest],
    ) -> Result<Gpa, PagingError>
    where
        M: GuestMemoryProvider + ?Sized,
        P: GpaPolicy + ?Sized,
    {
        if !ledger.is_empty() {
            log::error!("[PAGING] Ledger already holds {} structures", ledger.len());
            return Err(PagingError::InvalidArgument);
        }

        // Validate everything before touching the provider
        if let Some(bad) = requests.iter().find(|r| !r.gva.is_page_aligned()) {
            log::error!("[PAGING] GVA {:#x} is not page aligned", bad.gva);
            return Err(PagingError::InvalidArgument);
        }

        let hint = policy.next_candidate();
        let pml4 = memory
            .map_page(hint, self.config.table_access)
            .map_err(|err| {
                log::error!("[PAGING] Backing PML4 at GPA {:#x} failed: {}", hint, err);
                PagingError::AllocationExhausted(err)
            })?;
        log::trace!("[PAGING] PML4 at GPA {:#x}", pml4.gpa);

        for request in requests {
            self.map_request(ledger, pml4, memory, policy, request)?;
        }

        let pages = ledger.len() + 1;
        log::debug!(
            "[PAGING] Address space for {} pages requires {} pages total ({} KiB)",
            requests.len(),
            pages,
            pages * 4
        );
        Ok(pml4.gpa)
    }

    fn map_request<M, P>(
        &self,
        ledger: &mut Ledger,
        pml4: MappedPage,
        memory: &mut M,
        policy: &mut P,
        request: &PageRequest,
    ) -> Result<(), PagingError>
    where
        M: GuestMemoryProvider + ?Sized,
        P: GpaPolicy + ?Sized,
    {
        let indices = request.gva.indices();
        let table_access = self.config.table_access;
        let [pdpt_path, pd_path, pt_path, page_path] = TranslationPath::prefixes(&indices);

        let access = request.access;
        let pdpt = ledger.ensure_allocated(pdpt_path, access, table_access, memory, policy)?;
        let pd = ledger.ensure_allocated(pd_path, access, table_access, memory, policy)?;
        let pt = ledger.ensure_allocated(pt_path, access, table_access, memory, policy)?;
        let page = ledger.ensure_allocated(page_path, access, table_access, memory, policy)?;

        let user = self.config.is_user_address(request.gva);
        let upper = table_flags(user);

        link(memory, pml4.host, indices.pml4, pdpt.gpa, upper)?;
        link(memory, pdpt.host, indices.pdpt, pd.gpa, upper)?;
        link(memory, pd.host, indices.pd, pt.gpa, upper)?;
        link(memory, pt.host, indices.pt, page.gpa, leaf_flags(request.access, user))?;

        #[cfg(feature = "verbose")]
        {
            log::trace!("[PAGING] {:#x} ({}) user={}", request.gva, request.access, user);
            log::trace!("  PML4[{}] -> PDPT {:#x}", indices.pml4, pdpt.gpa);
            log::trace!("  PDPT[{}] -> PD   {:#x}", indices.pdpt, pd.gpa);
            log::trace!("  PD[{}]   -> PT   {:#x}", indices.pd, pt.gpa);
            log::trace!("  PT[{}]   -> page {:#x}", indices.pt, page.gpa);
        }

        Ok(())
    }
}

/// Point slot `index` of the table at `table` to the page at `target`.
fn link<M>(
    memory: &mut M,
    table: HostAddr,
    index: TableIndex,
    target: Gpa,
    flags: PageTableFlags,
) -> Result<(), PagingError>
where
    M: GuestMemoryProvider + ?Sized,
{
    let entry = PageTableEntry::encode(target.pfn()?, flags)?;
    let page = memory.page_mut(table).ok_or_else(|| {
        log::error!("[PAGING] Provider has no host page at {:#x}", table);
        PagingError::HostPageUnavailable
    })?;
    page.set_entry(index, entry);
    Ok(())
}

/// Build with the default configuration.
pub fn build_address_space<M, P>(
    memory: &mut M,
    policy: &mut P,
    requests: &[PageRequest],
) -> Result<Gpa, PagingError>
where
    M: GuestMemoryProvider + ?Sized,
    P: GpaPolicy + ?Sized,
{
    AddressSpaceBuilder::default().build(memory, policy, requests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::memory::SparseGuestMemory;
    use crate::policy::BumpPolicy;

    const BASE: Gpa = Gpa(0x10_0000);

    fn table_entry(memory: &SparseGuestMemory, table: Gpa, slot: usize) -> PageTableEntry {
        memory.page_at(table).unwrap().get(slot).unwrap()
    }

    #[test]
    fn test_flags() {
        assert_eq!(
            table_flags(true),
            PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE
        );
        assert_eq!(
            table_flags(false),
            PageTableFlags::PRESENT | PageTableFlags::WRITABLE
        );
        assert_eq!(
            leaf_flags(AccessSpec::READ_ONLY, false),
            PageTableFlags::PRESENT | PageTableFlags::NO_EXECUTE
        );
        assert_eq!(
            leaf_flags(AccessSpec::RWX, true),
            PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE
        );
    }

    #[test]
    fn test_empty_request_list() {
        let mut memory = SparseGuestMemory::new(8);
        let mut policy = BumpPolicy::new(BASE);

        let root = build_address_space(&mut memory, &mut policy, &[]).unwrap();

        assert_eq!(root, BASE);
        assert_eq!(memory.map_calls(), 1);
        assert!(memory.page_at(root).unwrap().is_zeroed());
    }

    #[test]
    fn test_two_pages_share_ancestors() {
        let mut memory = SparseGuestMemory::new(16);
        let mut policy = BumpPolicy::new(BASE);
        let requests = [
            PageRequest::parse(0x401000, "rwx").unwrap(),
            PageRequest::parse(0x402000, "r").unwrap(),
        ];
        let mut ledger = Ledger::new();

        let root = AddressSpaceBuilder::default()
            .build_with_ledger(&mut ledger, &mut memory, &mut policy, &requests)
            .unwrap();

        assert_eq!(root, BASE);
        assert_eq!(memory.map_calls(), 6);
        assert_eq!(ledger.len(), 5);
        for depth in 1..=3 {
            assert_eq!(ledger.len_at_depth(depth), 1);
        }
        assert_eq!(ledger.len_at_depth(4), 2);

        let pt_gpa = {
            let pml4e = table_entry(&memory, root, 0);
            let pdpte = table_entry(&memory, pml4e.address(), 0);
            let pde = table_entry(&memory, pdpte.address(), 2);
            pde.address()
        };

        let first = table_entry(&memory, pt_gpa, 1);
        let second = table_entry(&memory, pt_gpa, 2);
        let [.., first_path] = TranslationPath::prefixes(&Gva(0x401000).indices());
        let [.., second_path] = TranslationPath::prefixes(&Gva(0x402000).indices());
        let first_page = ledger.get(first_path).unwrap();
        let second_page = ledger.get(second_path).unwrap();

        assert_eq!(first.address(), first_page.gpa);
        assert!(first.is_writable() && first.is_executable() && first.is_user());
        assert_eq!(second.address(), second_page.gpa);
        assert!(!second.is_writable() && !second.is_executable() && second.is_user());
    }

    #[test]
    fn test_misaligned_request_touches_nothing() {
        let mut memory = SparseGuestMemory::new(8);
        let mut policy = BumpPolicy::new(BASE);
        let requests = [PageRequest::parse(0x401001, "r").unwrap()];

        let err = build_address_space(&mut memory, &mut policy, &requests).unwrap_err();

        assert_eq!(err, PagingError::InvalidArgument);
        assert_eq!(memory.map_calls(), 0);
    }

    #[test]
    fn test_reused_ledger_rejected() {
        let mut memory = SparseGuestMemory::new(16);
        let mut policy = BumpPolicy::new(BASE);
        let requests = [PageRequest::parse(0x401000, "r").unwrap()];
        let builder = AddressSpaceBuilder::default();
        let mut ledger = Ledger::new();

        builder
            .build_with_ledger(&mut ledger, &mut memory, &mut policy, &requests)
            .unwrap();
        let calls = memory.map_calls();

        assert_eq!(
            builder.build_with_ledger(&mut ledger, &mut memory, &mut policy, &requests),
            Err(PagingError::InvalidArgument)
        );
        assert_eq!(memory.map_calls(), calls);
    }

    #[test]
    fn test_exhaustion_mid_build() {
        // Room for the PML4, PDPT and PD only
        let mut memory = SparseGuestMemory::new(3);
        let mut policy = BumpPolicy::new(BASE);
        let requests = [PageRequest::parse(0x401000, "rw").unwrap()];

        let err = build_address_space(&mut memory, &mut policy, &requests).unwrap_err();

        assert_eq!(err, PagingError::AllocationExhausted(ProviderError::Exhausted));
        assert_eq!(memory.mapped_pages(), 3);
    }

    #[test]
    fn test_root_allocation_failure() {
        let mut memory = SparseGuestMemory::new(0);
        let mut policy = BumpPolicy::new(BASE);

        let err = build_address_space(&mut memory, &mut policy, &[]).unwrap_err();

        assert_eq!(err, PagingError::AllocationExhausted(ProviderError::Exhausted));
        assert_eq!(memory.map_calls(), 1);
    }

    #[test]
    fn test_pfn_overflow() {
        // GPA beyond the 52-bit physical address width
        let mut memory = SparseGuestMemory::new(8);
        let mut policy = BumpPolicy::new(Gpa(1 << 52));
        let requests = [PageRequest::parse(0x401000, "rw").unwrap()];

        let err = build_address_space(&mut memory, &mut policy, &requests).unwrap_err();

        assert_eq!(err, PagingError::EncodingOverflow);
    }

    #[test]
    fn test_duplicate_request_last_wins() {
        let mut memory = SparseGuestMemory::new(16);
        let mut policy = BumpPolicy::new(BASE);
        let requests = [
            PageRequest::parse(0x401000, "rwx").unwrap(),
            PageRequest::parse(0x401000, "r").unwrap(),
        ];

        let root = build_address_space(&mut memory, &mut policy, &requests).unwrap();
        assert_eq!(memory.map_calls(), 5);

        let pml4e = table_entry(&memory, root, 0);
        let pdpte = table_entry(&memory, pml4e.address(), 0);
        let pde = table_entry(&memory, pdpte.address(), 2);
        let pte = table_entry(&memory, pde.address(), 1);
        assert!(!pte.is_writable());
        assert!(!pte.is_executable());
        // The leaf page keeps the protection of its first request
        assert_eq!(memory.access_of(pte.address()), Some(AccessSpec::RWX));
    }

    #[test]
    fn test_table_access_override() {
        let mut memory = SparseGuestMemory::new(16);
        let mut policy = BumpPolicy::new(BASE);
        let config = BuilderConfig::new().with_table_access(AccessSpec::READ_WRITE);
        let builder = AddressSpaceBuilder::new(config);

        let root = builder
            .build(&mut memory, &mut policy, &[PageRequest::parse(0x401000, "rx").unwrap()])
            .unwrap();

        assert_eq!(memory.access_of(root), Some(AccessSpec::READ_WRITE));
        let pdpt = table_entry(&memory, root, 0).address();
        assert_eq!(memory.access_of(pdpt), Some(AccessSpec::READ_WRITE));
    }
}
