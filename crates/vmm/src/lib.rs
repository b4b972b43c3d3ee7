//! Guest preparation: address space plus the vCPU state that runs on it.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(feature = "std")]
pub mod logger;
pub mod setup;

pub use setup::{GuestEntry, GuestSetup, VpInitialState, long_mode_control_registers};
