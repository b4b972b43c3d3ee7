//! Memo of the paging structures already materialized during one build.
//!
//! Keys are translation paths of depth 1 to 4:
//! - `Pml4(255)` - the PDPT behind PML4E 255
//! - `Pdpt(255, 485)` - the PD behind PML4E 255 / PDPTE 485
//! - `Pd(255, 485, 337)` - the PT behind PML4E 255 / PDPTE 485 / PDE 337
//! - `Page(255, 485, 337, 353)` - the data page behind that PTE
//!
//! Each depth has its own map keyed by the packed indices, so every
//! virtual page sharing an ancestor reuses that ancestor's page.

use gvm_utils::HashMap;

use crate::access::AccessSpec;
use crate::addr::{Gpa, HostAddr, TableIndex, TableIndices};
use crate::error::PagingError;
use crate::traits::{GpaPolicy, GuestMemoryProvider, MappedPage};

/// Path from the PML4 down to one paging structure (or a leaf page).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TranslationPath {
    Pml4(TableIndex),
    Pdpt(TableIndex, TableIndex),
    Pd(TableIndex, TableIndex, TableIndex),
    Page(TableIndex, TableIndex, TableIndex, TableIndex),
}

impl TranslationPath {
    /// The four prefixes of a virtual page's walk, shortest first.
    pub const fn prefixes(indices: &TableIndices) -> [TranslationPath; 4] {
        let TableIndices { pml4, pdpt, pd, pt } = *indices;
        [
            TranslationPath::Pml4(pml4),
            TranslationPath::Pdpt(pml4, pdpt),
            TranslationPath::Pd(pml4, pdpt, pd),
            TranslationPath::Page(pml4, pdpt, pd, pt),
        ]
    }

    /// Number of indices in the path (1..=4).
    pub const fn depth(&self) -> usize {
        match self {
            TranslationPath::Pml4(..) => 1,
            TranslationPath::Pdpt(..) => 2,
            TranslationPath::Pd(..) => 3,
            TranslationPath::Page(..) => 4,
        }
    }

    pub const fn is_leaf(&self) -> bool {
        matches!(self, TranslationPath::Page(..))
    }

    /// 9 bits per index, top level in the high bits.
    const fn packed(&self) -> u64 {
        match *self {
            TranslationPath::Pml4(a) => a.as_u64(),
            TranslationPath::Pdpt(a, b) => (a.as_u64() << 9) | b.as_u64(),
            TranslationPath::Pd(a, b, c) => (a.as_u64() << 18) | (b.as_u64() << 9) | c.as_u64(),
            TranslationPath::Page(a, b, c, d) => {
                (a.as_u64() << 27) | (b.as_u64() << 18) | (c.as_u64() << 9) | d.as_u64()
            }
        }
    }
}

/// A page materialized for one translation path. Never freed by the builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AllocatedStructure {
    pub host: HostAddr,
    pub gpa: Gpa,
}

impl From<MappedPage> for AllocatedStructure {
    fn from(page: MappedPage) -> Self {
        Self {
            host: page.host,
            gpa: page.gpa,
        }
    }
}

/// Allocation memo for one address-space build.
///
/// Owned by the caller and handed to the builder; a ledger is only valid for
/// the partition it was filled against.
#[derive(Debug, Default)]
pub struct Ledger {
    levels: [HashMap<u64, AllocatedStructure>; 4],
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: TranslationPath) -> Option<AllocatedStructure> {
        self.levels[path.depth() - 1].get(&path.packed()).copied()
    }

    /// Return the page for `path`, asking `memory` for one on first use.
    ///
    /// Intermediate structures are backed with `table_access`; leaf pages with
    /// `leaf_access`. A path is allocated at most once per ledger.
    pub fn ensure_allocated<M, P>(
        &mut self,
        path: TranslationPath,
        leaf_access: AccessSpec,
        table_access: AccessSpec,
        memory: &mut M,
        policy: &mut P,
    ) -> Result<AllocatedStructure, PagingError>
    where
        M: GuestMemoryProvider + ?Sized,
        P: GpaPolicy + ?Sized,
    {
        let level = &mut self.levels[path.depth() - 1];
        let key = path.packed();
        if let Some(existing) = level.get(&key) {
            return Ok(*existing);
        }

        let access = if path.is_leaf() {
            leaf_access
        } else {
            table_access
        };
        let hint = policy.next_candidate();
        let page = memory.map_page(hint, access).map_err(|err| {
            log::error!("[PAGING] Backing {:?} at GPA {:#x} failed: {}", path, hint, err);
            PagingError::AllocationExhausted(err)
        })?;

        let structure = AllocatedStructure::from(page);
        level.insert(key, structure);
        Ok(structure)
    }

    /// Total structures and leaf pages recorded.
    pub fn len(&self) -> usize {
        self.levels.iter().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(HashMap::is_empty)
    }

    /// Entries recorded at one depth (1 = PDPTs, 4 = leaf pages).
    pub fn len_at_depth(&self, depth: usize) -> usize {
        match depth {
            1..=4 => self.levels[depth - 1].len(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SparseGuestMemory;
    use crate::policy::BumpPolicy;

    fn idx(i: u16) -> TableIndex {
        TableIndex::new(i).unwrap()
    }

    #[test]
    fn test_paths_of_distinct_depth_do_not_collide() {
        // Pml4(0) and Pdpt(0, 0) pack to the same integer
        let mut memory = SparseGuestMemory::new(16);
        let mut policy = BumpPolicy::new(Gpa(0x10_0000));
        let mut ledger = Ledger::new();

        let a = ledger
            .ensure_allocated(
                TranslationPath::Pml4(idx(0)),
                AccessSpec::READ_ONLY,
                AccessSpec::RWX,
                &mut memory,
                &mut policy,
            )
            .unwrap();
        let b = ledger
            .ensure_allocated(
                TranslationPath::Pdpt(idx(0), idx(0)),
                AccessSpec::READ_ONLY,
                AccessSpec::RWX,
                &mut memory,
                &mut policy,
            )
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(ledger.len(), 2);
        assert_eq!(memory.map_calls(), 2);
    }

    #[test]
    fn test_ensure_allocated_is_idempotent() {
        let mut memory = SparseGuestMemory::new(16);
        let mut policy = BumpPolicy::new(Gpa(0x10_0000));
        let mut ledger = Ledger::new();
        let path = TranslationPath::Pd(idx(1), idx(2), idx(3));

        let (leaf, table) = (AccessSpec::READ_ONLY, AccessSpec::RWX);

        let first = ledger
            .ensure_allocated(path, leaf, table, &mut memory, &mut policy)
            .unwrap();
        let second = ledger
            .ensure_allocated(path, leaf, table, &mut memory, &mut policy)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(memory.map_calls(), 1);
        assert_eq!(ledger.get(path), Some(first));
        assert_eq!(ledger.len_at_depth(3), 1);
        assert_eq!(ledger.len_at_depth(4), 0);
    }

    #[test]
    fn test_leaf_and_table_access() {
        let mut memory = SparseGuestMemory::new(16);
        let mut policy = BumpPolicy::new(Gpa(0x10_0000));
        let mut ledger = Ledger::new();

        let table = ledger
            .ensure_allocated(
                TranslationPath::Pml4(idx(0)),
                AccessSpec::READ_ONLY,
                AccessSpec::RWX,
                &mut memory,
                &mut policy,
            )
            .unwrap();
        let leaf = ledger
            .ensure_allocated(
                TranslationPath::Page(idx(0), idx(0), idx(2), idx(1)),
                AccessSpec::READ_ONLY,
                AccessSpec::RWX,
                &mut memory,
                &mut policy,
            )
            .unwrap();

        assert_eq!(memory.access_of(table.gpa), Some(AccessSpec::RWX));
        assert_eq!(memory.access_of(leaf.gpa), Some(AccessSpec::READ_ONLY));
    }

    #[test]
    fn test_provider_failure_is_kept() {
        let mut memory = SparseGuestMemory::new(0);
        let mut policy = BumpPolicy::new(Gpa(0x10_0000));
        let mut ledger = Ledger::new();

        let err = ledger
            .ensure_allocated(
                TranslationPath::Pml4(idx(0)),
                AccessSpec::READ_ONLY,
                AccessSpec::RWX,
                &mut memory,
                &mut policy,
            )
            .unwrap_err();
        assert_eq!(
            err,
            PagingError::AllocationExhausted(crate::error::ProviderError::Exhausted)
        );
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_prefixes() {
        let indices = crate::addr::Gva(0x401000).indices();
        let paths = TranslationPath::prefixes(&indices);
        assert_eq!(paths.map(|p| p.depth()), [1, 2, 3, 4]);
        assert_eq!(paths[3], TranslationPath::Page(idx(0), idx(0), idx(2), idx(1)));
        assert!(paths[3].is_leaf());
        assert!(!paths[2].is_leaf());
    }
}
