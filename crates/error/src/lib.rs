//! Error handling infrastructure for the guest VM crates.
//!
//! Provides the `define_vmm_error!` macro so every subsystem reports failures
//! the same way: a `Copy` enum, a 16-bit code (`subsystem << 8 | variant`) and
//! a fixed description.
//!
//! ## Usage
//!
//! ### Simple errors (no inner data)
//! ```ignore
//! define_vmm_error! {
//!     pub enum ProviderError(0x02) {
//!         Exhausted = 0x01 => "Guest physical space exhausted",
//!         Misaligned = 0x02 => "Guest physical address not page aligned",
//!     }
//! }
//! ```
//!
//! ### Nested errors (with inner error type)
//! ```ignore
//! define_vmm_error! {
//!     pub enum PagingError(0x01) {
//!         InvalidArgument = 0x01 => "Invalid argument",
//!         AllocationExhausted(ProviderError) = 0x02 => "Page allocation failed",
//!     }
//! }
//! ```
//!
//! Nested variants keep the inner error untouched: it shows up in `Display`
//! and is returned by `Error::source`.

#![no_std]

/// Define a coded error enum.
///
/// Supports both simple variants and nested variants wrapping another error
/// generated by this macro (the inner type must be `Copy` and implement
/// `core::error::Error`).
#[macro_export]
macro_rules! define_vmm_error {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident($subsystem:literal) {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $(($inner:ty))? = $code:literal => $desc:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant $(($inner))?,
            )*
        }

        impl $name {
            /// Subsystem identifier for this error type.
            pub const SUBSYSTEM: u8 = $subsystem;

            /// Numeric error code: subsystem in the high byte, variant in the low byte.
            pub const fn code(&self) -> u16 {
                match self {
                    $(
                        $crate::define_vmm_error!(@pattern $variant $(($inner))? _unused) => {
                            (($subsystem as u16) << 8) | $code
                        }
                    )*
                }
            }

            /// Short description for logging.
            pub const fn name(&self) -> &'static str {
                match self {
                    $(
                        $crate::define_vmm_error!(@pattern $variant $(($inner))? _unused) => {
                            $desc
                        }
                    )*
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match self {
                    $(
                        $crate::define_vmm_error!(@pattern $variant $(($inner))? inner) => {
                            $crate::define_vmm_error!(@display_body self f $desc $(($inner))? inner)
                        }
                    )*
                }
            }
        }

        impl core::error::Error for $name {
            fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
                match self {
                    $(
                        $crate::define_vmm_error!(@pattern $variant $(($inner))? inner) => {
                            $crate::define_vmm_error!(@source $(($inner))? inner)
                        }
                    )*
                }
            }
        }
    };

    (@pattern $variant:ident ($inner:ty) $bind:ident) => { Self::$variant($bind) };
    (@pattern $variant:ident $bind:ident) => { Self::$variant };

    (@display_body $self:ident $f:ident $desc:literal ($inner:ty) $bind:ident) => {
        write!($f, "E{:04X}: {} ({})", $self.code(), $desc, $bind)
    };
    (@display_body $self:ident $f:ident $desc:literal $bind:ident) => {
        write!($f, "E{:04X}: {}", $self.code(), $desc)
    };

    (@source ($inner:ty) $bind:ident) => { Some($bind) };
    (@source $bind:ident) => { None };
}

#[cfg(test)]
mod tests {
    extern crate std;

    use core::error::Error;
    use std::format;

    define_vmm_error! {
        /// Provider-side failures
        pub enum BackingError(0x7E) {
            /// No room left
            Exhausted = 0x01 => "Guest physical space exhausted",
            Misaligned = 0x02 => "Guest physical address not page aligned",
        }
    }

    define_vmm_error! {
        pub enum BuildError(0x7F) {
            InvalidArgument = 0x01 => "Invalid argument",
            Allocation(BackingError) = 0x02 => "Page allocation failed",
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(BackingError::Exhausted.code(), 0x7E01);
        assert_eq!(BackingError::Misaligned.code(), 0x7E02);
        assert_eq!(BuildError::InvalidArgument.code(), 0x7F01);
        assert_eq!(BuildError::Allocation(BackingError::Misaligned).code(), 0x7F02);
    }

    #[test]
    fn test_error_names() {
        assert_eq!(BackingError::Exhausted.name(), "Guest physical space exhausted");
        assert_eq!(
            BuildError::Allocation(BackingError::Exhausted).name(),
            "Page allocation failed"
        );
    }

    #[test]
    fn test_display_format() {
        assert_eq!(
            format!("{}", BuildError::InvalidArgument),
            "E7F01: Invalid argument"
        );
        assert_eq!(
            format!("{}", BuildError::Allocation(BackingError::Exhausted)),
            "E7F02: Page allocation failed (E7E01: Guest physical space exhausted)"
        );
    }

    #[test]
    fn test_source_chain() {
        let err = BuildError::Allocation(BackingError::Misaligned);
        let source = err.source().map(|s| format!("{s}"));
        assert_eq!(
            source.as_deref(),
            Some("E7E02: Guest physical address not page aligned")
        );
        assert!(BuildError::InvalidArgument.source().is_none());
    }

    #[test]
    fn test_subsystem() {
        assert_eq!(BackingError::SUBSYSTEM, 0x7E);
        assert_eq!(BuildError::SUBSYSTEM, 0x7F);
        assert_eq!(BuildError::InvalidArgument.code() >> 8, u16::from(BuildError::SUBSYSTEM));
    }
}
