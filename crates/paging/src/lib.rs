//! Guest virtual address space construction for 4-level x86_64 paging.
//!
//! Given a list of guest virtual pages and the access each should get, the
//! [`AddressSpaceBuilder`] backs every page and every PML4 -> PDPT -> PD -> PT
//! structure on the way to it with guest physical memory obtained from a
//! [`GuestMemoryProvider`], sharing structures between pages that have a
//! common ancestor. The result is the GPA of the PML4, ready for CR3.
//!
//! ```text
//! [unused:16][PML4:9][PDPT:9][PD:9][PT:9][offset:12]
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod access;
pub mod addr;
pub mod builder;
pub mod config;
pub mod entry;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod page;
pub mod policy;
pub mod traits;
pub mod walk;

pub use access::AccessSpec;
pub use addr::{ENTRIES_PER_TABLE, Gpa, Gva, HostAddr, Pfn, TableIndex, TableIndices};
pub use builder::{AddressSpaceBuilder, PageRequest, build_address_space};
pub use config::{BuilderConfig, USER_ADDRESS_LIMIT};
pub use entry::{PageTableEntry, PageTableFlags};
pub use error::{PagingError, ProviderError};
pub use ledger::{AllocatedStructure, Ledger, TranslationPath};
pub use page::PhysPage;
pub use traits::{GpaPolicy, GuestMemoryProvider, MappedPage};
