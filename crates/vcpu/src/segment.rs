//! Segment register values in the hypervisor platform's register layout.
//!
//! The platform packs the descriptor access rights into 16 bits:
//!
//! ```text
//! [G:1][D/B:1][L:1][AVL:1][reserved:4][P:1][DPL:2][S:1][type:4]
//!   15    14    13    12      11-8       7   6-5    4    3-0
//! ```

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use bitflags::bitflags;

/// Default selector for the flat 32-bit ring 0 code segment
pub const CODE32_RING0_SELECTOR: u16 = 0x1337;
/// Default selector for the 64-bit user code segment
pub const CODE64_USER_SELECTOR: u16 = 0x33;
/// Default selector for the 64-bit user data segment
pub const DATA64_USER_SELECTOR: u16 = 0x2b;

/// Execute/read, accessed
pub const TYPE_CODE_EXEC_READ: u8 = 0b1011;
/// Read/write, accessed
pub const TYPE_DATA_READ_WRITE: u8 = 0b0011;

const TYPE_MASK: u16 = 0xf;
const DPL_SHIFT: u16 = 5;
const DPL_MASK: u16 = 0b11;

bitflags! {
    /// Single-bit fields of the packed segment attributes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SegmentFlags: u16 {
        /// Code or data segment (S), as opposed to a system descriptor
        const NON_SYSTEM = 1 << 4;
        const PRESENT = 1 << 7;
        /// Available for software use (AVL)
        const AVAILABLE = 1 << 12;
        /// 64-bit code segment (L)
        const LONG = 1 << 13;
        /// Default operand size (D/B)
        const DEFAULT = 1 << 14;
        const GRANULARITY = 1 << 15;
    }
}

/// Packed segment access rights.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SegmentAttributes(pub u16);

impl SegmentAttributes {
    pub const fn new(segment_type: u8, dpl: u8, flags: SegmentFlags) -> Self {
        Self(
            (segment_type as u16 & TYPE_MASK)
                | ((dpl as u16 & DPL_MASK) << DPL_SHIFT)
                | flags.bits(),
        )
    }

    pub const fn segment_type(self) -> u8 {
        (self.0 & TYPE_MASK) as u8
    }

    pub const fn dpl(self) -> u8 {
        ((self.0 >> DPL_SHIFT) & DPL_MASK) as u8
    }

    pub const fn flags(self) -> SegmentFlags {
        SegmentFlags::from_bits_truncate(self.0)
    }

    fn bit(self, flag: SegmentFlags) -> u16 {
        u16::from(self.flags().contains(flag))
    }
}

/// A segment register as loaded into a virtual processor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SegmentRegister {
    pub base: u64,
    pub limit: u32,
    pub selector: u16,
    pub attributes: SegmentAttributes,
}

impl SegmentRegister {
    /// Flat 4GiB ring 0 code segment for 32-bit protected mode.
    pub const fn code32_ring0(selector: u16) -> Self {
        Self {
            base: 0,
            limit: 0xffff_ffff,
            selector,
            attributes: SegmentAttributes::new(
                TYPE_CODE_EXEC_READ,
                0,
                SegmentFlags::NON_SYSTEM
                    .union(SegmentFlags::PRESENT)
                    .union(SegmentFlags::DEFAULT)
                    .union(SegmentFlags::GRANULARITY),
            ),
        }
    }

    /// Ring 3 code segment for long mode.
    pub const fn code64_user(selector: u16) -> Self {
        Self {
            base: 0,
            limit: 0xffff_ffff,
            selector,
            attributes: SegmentAttributes::new(
                TYPE_CODE_EXEC_READ,
                3,
                SegmentFlags::NON_SYSTEM
                    .union(SegmentFlags::PRESENT)
                    .union(SegmentFlags::LONG)
                    .union(SegmentFlags::GRANULARITY),
            ),
        }
    }

    /// Ring 3 data segment for long mode.
    pub const fn data64_user(base: u64, selector: u16) -> Self {
        Self {
            base,
            limit: 0xffff_ffff,
            selector,
            attributes: SegmentAttributes::new(
                TYPE_DATA_READ_WRITE,
                3,
                SegmentFlags::NON_SYSTEM
                    .union(SegmentFlags::PRESENT)
                    .union(SegmentFlags::LONG)
                    .union(SegmentFlags::GRANULARITY),
            ),
        }
    }

    /// One line per field, values in hex.
    pub fn describe(&self) -> Vec<String> {
        let a = self.attributes;
        let fields: [(&str, u64); 11] = [
            ("Base", self.base),
            ("Limit", u64::from(self.limit)),
            ("Selector", u64::from(self.selector)),
            ("SegmentType", u64::from(a.segment_type())),
            ("NonSystemSegment", u64::from(a.bit(SegmentFlags::NON_SYSTEM))),
            ("DescriptorPrivilegeLevel", u64::from(a.dpl())),
            ("Present", u64::from(a.bit(SegmentFlags::PRESENT))),
            ("AVL", u64::from(a.bit(SegmentFlags::AVAILABLE))),
            ("Long", u64::from(a.bit(SegmentFlags::LONG))),
            ("Default", u64::from(a.bit(SegmentFlags::DEFAULT))),
            ("Granularity", u64::from(a.bit(SegmentFlags::GRANULARITY))),
        ];
        fields
            .iter()
            .map(|(name, value)| format!("{name:>24}: {value:#x}"))
            .collect()
    }
}

/// Log every field of `segment` at info level.
pub fn dump_segment(segment: &SegmentRegister) -> Vec<String> {
    let lines = segment.describe();
    for line in &lines {
        log::info!("{}", line);
    }
    lines
}
