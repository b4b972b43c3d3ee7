//! Access rights requested for a guest page.
//!
//! Specs are written as short strings: `"r"`, `"rw"`, `"rx"`, `"rwx"`.
//! Read access is implied by every spec.

use core::fmt;
use core::str::FromStr;

use bitflags::bitflags;

use crate::error::PagingError;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct AccessSpec: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

impl AccessSpec {
    pub const READ_ONLY: AccessSpec = AccessSpec::READ;
    pub const READ_WRITE: AccessSpec = AccessSpec::READ.union(AccessSpec::WRITE);
    pub const READ_EXECUTE: AccessSpec = AccessSpec::READ.union(AccessSpec::EXECUTE);
    pub const RWX: AccessSpec = AccessSpec::READ
        .union(AccessSpec::WRITE)
        .union(AccessSpec::EXECUTE);

    pub fn is_writable(self) -> bool {
        self.contains(AccessSpec::WRITE)
    }

    pub fn is_executable(self) -> bool {
        self.contains(AccessSpec::EXECUTE)
    }
}

impl Default for AccessSpec {
    fn default() -> Self {
        Self::READ_ONLY
    }
}

impl FromStr for AccessSpec {
    type Err = PagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut spec = AccessSpec::READ;
        for c in s.chars() {
            match c {
                'r' => {}
                'w' => spec |= AccessSpec::WRITE,
                'x' => spec |= AccessSpec::EXECUTE,
                _ => {
                    log::error!("[PAGING] Bad access spec {:?}", s);
                    return Err(PagingError::InvalidArgument);
                }
            }
        }
        Ok(spec)
    }
}

impl fmt::Display for AccessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("r")?;
        if self.is_writable() {
            f.write_str("w")?;
        }
        if self.is_executable() {
            f.write_str("x")?;
        }
        Ok(())
    }
}
