//! Initial register state for a guest that starts directly in 64-bit user mode.

use gvm_paging::walk::translate;
use gvm_paging::{
    AddressSpaceBuilder, GpaPolicy, GuestMemoryProvider, Gva, PageRequest, PageTableFlags,
    PagingError,
};
use gvm_vcpu::segment::{CODE64_USER_SELECTOR, DATA64_USER_SELECTOR, SegmentRegister};
use gvm_vcpu::{describe_cr0, describe_cr4};
use x86_64::registers::control::{Cr0Flags, Cr4Flags};
use x86_64::registers::model_specific::EferFlags;

/// RFLAGS with only the always-one bit 1 set
pub const RFLAGS_RESERVED: u64 = 0x2;

/// Where the guest starts executing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuestEntry {
    pub rip: Gva,
    pub rsp: Gva,
}

impl GuestEntry {
    pub const fn new(rip: Gva, rsp: Gva) -> Self {
        Self { rip, rsp }
    }
}

/// Registers to load into the virtual processor before the first run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VpInitialState {
    pub cr0: u64,
    pub cr3: u64,
    pub cr4: u64,
    pub efer: u64,
    pub cs: SegmentRegister,
    pub ss: SegmentRegister,
    pub ds: SegmentRegister,
    pub es: SegmentRegister,
    pub rip: u64,
    pub rsp: u64,
    pub rflags: u64,
}

/// Control register values for paged long mode with SSE enabled.
pub fn long_mode_control_registers() -> (Cr0Flags, Cr4Flags, EferFlags) {
    let cr0 = Cr0Flags::PROTECTED_MODE_ENABLE
        | Cr0Flags::MONITOR_COPROCESSOR
        | Cr0Flags::EXTENSION_TYPE
        | Cr0Flags::NUMERIC_ERROR
        | Cr0Flags::WRITE_PROTECT
        | Cr0Flags::PAGING;
    let cr4 = Cr4Flags::PHYSICAL_ADDRESS_EXTENSION
        | Cr4Flags::OSFXSR
        | Cr4Flags::OSXMMEXCPT_ENABLE;
    let efer = EferFlags::LONG_MODE_ENABLE
        | EferFlags::LONG_MODE_ACTIVE
        | EferFlags::NO_EXECUTE_ENABLE;
    (cr0, cr4, efer)
}

/// Builds a guest's page tables and the register state that runs on them.
#[derive(Clone, Copy, Debug, Default)]
pub struct GuestSetup {
    builder: AddressSpaceBuilder,
}

impl GuestSetup {
    pub const fn new(builder: AddressSpaceBuilder) -> Self {
        Self { builder }
    }

    /// Back `requests` in `memory` and return the vCPU state that enters the
    /// guest at `entry`.
    ///
    /// The entry point must be inside an executable page of `requests`.
    pub fn prepare<M, P>(
        &self,
        memory: &mut M,
        policy: &mut P,
        requests: &[PageRequest],
        entry: GuestEntry,
    ) -> Result<VpInitialState, PagingError>
    where
        M: GuestMemoryProvider + ?Sized,
        P: GpaPolicy + ?Sized,
    {
        let root = self.builder.build(memory, policy, requests)?;

        let code = translate(&*memory, root, entry.rip)?.ok_or_else(|| {
            log::error!("[VMM] Entry point {:#x} is not mapped", entry.rip);
            PagingError::InvalidArgument
        })?;
        if code.effective.contains(PageTableFlags::NO_EXECUTE) {
            log::error!("[VMM] Entry point {:#x} is not executable", entry.rip);
            return Err(PagingError::InvalidArgument);
        }

        let (cr0, cr4, efer) = long_mode_control_registers();
        let data = SegmentRegister::data64_user(0, DATA64_USER_SELECTOR);
        let state = VpInitialState {
            cr0: cr0.bits(),
            cr3: root.as_u64(),
            cr4: cr4.bits(),
            efer: efer.bits(),
            cs: SegmentRegister::code64_user(CODE64_USER_SELECTOR),
            ss: data,
            ds: data,
            es: data,
            rip: entry.rip.as_u64(),
            rsp: entry.rsp.as_u64(),
            rflags: RFLAGS_RESERVED,
        };

        log::debug!("[VMM] {}", describe_cr0(state.cr0));
        log::debug!("[VMM] {}", describe_cr4(state.cr4));
        log::debug!(
            "[VMM] CR3={:#x} RIP={:#x} RSP={:#x}",
            state.cr3,
            state.rip,
            state.rsp
        );
        Ok(state)
    }
}
