use crate::access::AccessSpec;
use crate::addr::Gva;

/// Highest user-mode address on x64 Windows guests.
pub const USER_ADDRESS_LIMIT: Gva = Gva(0x0000_7FFF_FFFF_0000);

/// Knobs for [`AddressSpaceBuilder`](crate::builder::AddressSpaceBuilder).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Pages at or below this address are marked user-accessible on every level.
    pub user_address_limit: Gva,
    /// Backing protection requested for PML4/PDPT/PD/PT pages.
    pub table_access: AccessSpec,
}

impl BuilderConfig {
    pub const fn new() -> Self {
        Self {
            user_address_limit: USER_ADDRESS_LIMIT,
            table_access: AccessSpec::RWX,
        }
    }

    #[must_use]
    pub const fn with_user_address_limit(mut self, gva: Gva) -> Self {
        self.user_address_limit = gva;
        self
    }

    #[must_use]
    pub const fn with_table_access(mut self, access: AccessSpec) -> Self {
        self.table_access = access;
        self
    }

    pub const fn is_user_address(&self, gva: Gva) -> bool {
        gva.0 <= self.user_address_limit.0
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self::new()
    }
}
