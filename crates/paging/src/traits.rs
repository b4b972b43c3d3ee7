//! Seams between the builder and whatever owns the partition's memory.

use crate::access::AccessSpec;
use crate::addr::{Gpa, HostAddr};
use crate::error::ProviderError;
use crate::page::PhysPage;

/// A freshly backed guest page: where the host sees it and where the guest does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MappedPage {
    pub host: HostAddr,
    pub gpa: Gpa,
}

/// Backs guest physical pages with host memory.
///
/// Implementations own the pages for the lifetime of the partition; callers
/// only hold on to the returned addresses, never to the pages themselves.
pub trait GuestMemoryProvider {
    /// Back one 4KB page at `hint` with zeroed host memory.
    ///
    /// The page must not already be mapped. `access` is the protection the
    /// guest gets on the page.
    fn map_page(&mut self, hint: Gpa, access: AccessSpec) -> Result<MappedPage, ProviderError>;

    /// Host view of a page previously returned by [`map_page`](Self::map_page).
    fn page(&self, host: HostAddr) -> Option<&PhysPage>;

    /// Mutable host view of a page previously returned by [`map_page`](Self::map_page).
    fn page_mut(&mut self, host: HostAddr) -> Option<&mut PhysPage>;

    /// Reverse lookup: host address backing `gpa`, if it is mapped.
    fn host_for(&self, gpa: Gpa) -> Option<HostAddr>;
}

/// Chooses the guest physical address of each new page.
pub trait GpaPolicy {
    /// Next GPA to hand to [`GuestMemoryProvider::map_page`].
    fn next_candidate(&mut self) -> Gpa;
}

impl<T: GuestMemoryProvider + ?Sized> GuestMemoryProvider for &mut T {
    fn map_page(&mut self, hint: Gpa, access: AccessSpec) -> Result<MappedPage, ProviderError> {
        (**self).map_page(hint, access)
    }

    fn page(&self, host: HostAddr) -> Option<&PhysPage> {
        (**self).page(host)
    }

    fn page_mut(&mut self, host: HostAddr) -> Option<&mut PhysPage> {
        (**self).page_mut(host)
    }

    fn host_for(&self, gpa: Gpa) -> Option<HostAddr> {
        (**self).host_for(gpa)
    }
}

impl<T: GpaPolicy + ?Sized> GpaPolicy for &mut T {
    fn next_candidate(&mut self) -> Gpa {
        (**self).next_candidate()
    }
}
