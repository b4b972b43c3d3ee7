use gvm_error::define_vmm_error;

define_vmm_error! {
    /// Status returned by a guest memory provider when a page request fails.
    pub enum ProviderError(0x02) {
        /// No guest physical space left
        Exhausted = 0x01 => "Guest physical space exhausted",
        /// Requested GPA is not on a page boundary
        Misaligned = 0x02 => "Guest physical address not page aligned",
        /// Requested GPA is already backed
        AlreadyMapped = 0x03 => "Guest physical page already mapped",
    }
}

define_vmm_error! {
    /// Address space construction errors. None of them are recoverable: the
    /// caller must throw the partition's address space away and start over.
    pub enum PagingError(0x01) {
        /// Misaligned address, malformed access spec or reused ledger
        InvalidArgument = 0x01 => "Invalid argument",
        /// The provider refused a page; its status is kept as-is
        AllocationExhausted(ProviderError) = 0x02 => "Paging structure allocation failed",
        /// Frame number does not fit the entry's address field
        EncodingOverflow = 0x03 => "Page frame number exceeds entry width",
        /// The provider lost track of a page it handed out
        HostPageUnavailable = 0x04 => "Host view of guest page unavailable",
    }
}

impl From<ProviderError> for PagingError {
    fn from(err: ProviderError) -> Self {
        Self::AllocationExhausted(err)
    }
}
