//! Virtual processor register helpers.
//!
//! Segment register values for the platform's packed layout, CR0/CR4
//! decoders and VM-exit context dumps used when a guest stops unexpectedly.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod control;
pub mod exit;
pub mod segment;

pub use control::{describe_cr0, describe_cr4};
pub use exit::{
    CpuidAccessContext, ExceptionContext, ExitContext, ExitDetail, ExitReason,
    MemoryAccessContext, VpContext, describe_exit, dump_exit_context,
};
pub use segment::{SegmentAttributes, SegmentFlags, SegmentRegister, dump_segment};
