//! VM-exit context decoding for diagnostics.
//!
//! Only reads exit data for display; handling exits is up to the run loop.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::segment::SegmentRegister;

/// Why a virtual processor stopped running, using the platform's codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExitReason {
    None,
    MemoryAccess,
    IoPortAccess,
    UnrecoverableException,
    InvalidVpRegisterValue,
    UnsupportedFeature,
    InterruptWindow,
    Halt,
    ApicEoi,
    MsrAccess,
    Cpuid,
    Exception,
    Rdtsc,
    Canceled,
    Unknown(u32),
}

impl ExitReason {
    pub const fn from_code(code: u32) -> Self {
        match code {
            0x0 => Self::None,
            0x1 => Self::MemoryAccess,
            0x2 => Self::IoPortAccess,
            0x4 => Self::UnrecoverableException,
            0x5 => Self::InvalidVpRegisterValue,
            0x6 => Self::UnsupportedFeature,
            0x7 => Self::InterruptWindow,
            0x8 => Self::Halt,
            0x9 => Self::ApicEoi,
            0x1000 => Self::MsrAccess,
            0x1001 => Self::Cpuid,
            0x1002 => Self::Exception,
            0x1003 => Self::Rdtsc,
            0x2001 => Self::Canceled,
            other => Self::Unknown(other),
        }
    }

    pub const fn code(self) -> u32 {
        match self {
            Self::None => 0x0,
            Self::MemoryAccess => 0x1,
            Self::IoPortAccess => 0x2,
            Self::UnrecoverableException => 0x4,
            Self::InvalidVpRegisterValue => 0x5,
            Self::UnsupportedFeature => 0x6,
            Self::InterruptWindow => 0x7,
            Self::Halt => 0x8,
            Self::ApicEoi => 0x9,
            Self::MsrAccess => 0x1000,
            Self::Cpuid => 0x1001,
            Self::Exception => 0x1002,
            Self::Rdtsc => 0x1003,
            Self::Canceled => 0x2001,
            Self::Unknown(code) => code,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::MemoryAccess => "MemoryAccess",
            Self::IoPortAccess => "IoPortAccess",
            Self::UnrecoverableException => "UnrecoverableException",
            Self::InvalidVpRegisterValue => "InvalidVpRegisterValue",
            Self::UnsupportedFeature => "UnsupportedFeature",
            Self::InterruptWindow => "InterruptWindow",
            Self::Halt => "Halt",
            Self::ApicEoi => "ApicEoi",
            Self::MsrAccess => "MsrAccess",
            Self::Cpuid => "Cpuid",
            Self::Exception => "Exception",
            Self::Rdtsc => "Rdtsc",
            Self::Canceled => "Canceled",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#x})", self.name(), self.code())
    }
}

/// Processor state captured with every exit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VpContext {
    pub instruction_length: u8,
    pub cr8: u8,
    pub cs: SegmentRegister,
    pub rip: u64,
    pub rflags: u64,
}

/// Guest access that touched unmapped or protected memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryAccessContext {
    pub instruction_byte_count: u8,
    /// 0 = read, 1 = write, 2 = execute
    pub access_type: u8,
    pub gpa_unmapped: bool,
    pub gva_valid: bool,
    pub gpa: u64,
    pub gva: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuidAccessContext {
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rbx: u64,
    pub default_result_rax: u64,
    pub default_result_rcx: u64,
    pub default_result_rdx: u64,
    pub default_result_rbx: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExceptionContext {
    pub instruction_byte_count: u8,
    pub error_code_valid: bool,
    pub software_exception: bool,
    pub exception_type: u8,
    pub error_code: u32,
    pub exception_parameter: u64,
}

/// Reason-specific part of an exit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitDetail {
    MemoryAccess(MemoryAccessContext),
    Cpuid(CpuidAccessContext),
    Exception(ExceptionContext),
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExitContext {
    pub reason: ExitReason,
    pub vp: VpContext,
    pub detail: ExitDetail,
}

impl ExitContext {
    /// Context with no reason-specific detail.
    pub const fn new(reason: ExitReason, vp: VpContext) -> Self {
        Self {
            reason,
            vp,
            detail: ExitDetail::None,
        }
    }

    pub const fn with_detail(mut self, detail: ExitDetail) -> Self {
        self.detail = detail;
        self
    }
}

fn line(out: &mut Vec<String>, name: &str, value: impl Into<u64>) {
    let value: u64 = value.into();
    out.push(format!("{name}: {value:#x}"));
}

/// Render an exit as `Field: value` lines, common fields first.
pub fn describe_exit(exit: &ExitContext) -> Vec<String> {
    let mut out = Vec::new();
    out.push(format!("ExitReason: {}", exit.reason));

    let vp = &exit.vp;
    line(&mut out, "VpContext.InstructionLength", vp.instruction_length);
    line(&mut out, "VpContext.Cr8", vp.cr8);
    line(&mut out, "VpContext.Cs", vp.cs.selector);
    line(&mut out, "VpContext.Rip", vp.rip);
    line(&mut out, "VpContext.Rflags", vp.rflags);

    match exit.detail {
        ExitDetail::MemoryAccess(m) => {
            line(&mut out, "MemoryAccess.InstructionByteCount", m.instruction_byte_count);
            line(&mut out, "MemoryAccess.AccessInfo.AccessType", m.access_type);
            line(&mut out, "MemoryAccess.AccessInfo.GpaUnmapped", m.gpa_unmapped);
            line(&mut out, "MemoryAccess.AccessInfo.GvaValid", m.gva_valid);
            line(&mut out, "MemoryAccess.Gpa", m.gpa);
            line(&mut out, "MemoryAccess.Gva", m.gva);
        }
        ExitDetail::Cpuid(c) => {
            line(&mut out, "CpuidAccess.Rax", c.rax);
            line(&mut out, "CpuidAccess.Rcx", c.rcx);
            line(&mut out, "CpuidAccess.Rdx", c.rdx);
            line(&mut out, "CpuidAccess.Rbx", c.rbx);
            line(&mut out, "CpuidAccess.DefaultResultRax", c.default_result_rax);
            line(&mut out, "CpuidAccess.DefaultResultRcx", c.default_result_rcx);
            line(&mut out, "CpuidAccess.DefaultResultRdx", c.default_result_rdx);
            line(&mut out, "CpuidAccess.DefaultResultRbx", c.default_result_rbx);
        }
        ExitDetail::Exception(e) => {
            line(&mut out, "VpException.InstructionByteCount", e.instruction_byte_count);
            line(&mut out, "VpException.ExceptionInfo.ErrorCodeValid", e.error_code_valid);
            line(&mut out, "VpException.ExceptionInfo.SoftwareException", e.software_exception);
            line(&mut out, "VpException.ExceptionType", e.exception_type);
            line(&mut out, "VpException.ErrorCode", e.error_code);
            line(&mut out, "VpException.ExceptionParameter", e.exception_parameter);
        }
        ExitDetail::None => {}
    }
    out
}

/// Log [`describe_exit`] at info level and hand the lines back.
pub fn dump_exit_context(exit: &ExitContext) -> Vec<String> {
    let lines = describe_exit(exit);
    for l in &lines {
        log::info!("{}", l);
    }
    lines
}
