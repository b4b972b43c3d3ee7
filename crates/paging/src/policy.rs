use gvm_utils::PAGE_SIZE;

use crate::addr::Gpa;
use crate::traits::GpaPolicy;

/// Hands out consecutive guest physical pages starting at a base address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BumpPolicy {
    next: Gpa,
}

impl BumpPolicy {
    pub const fn new(base: Gpa) -> Self {
        Self { next: base }
    }

    /// GPA the next call will return.
    pub const fn peek(&self) -> Gpa {
        self.next
    }
}

impl GpaPolicy for BumpPolicy {
    fn next_candidate(&mut self) -> Gpa {
        let gpa = self.next;
        self.next = Gpa(gpa.0.saturating_add(PAGE_SIZE));
        gpa
    }
}
