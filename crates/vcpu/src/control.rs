//! Human-readable CR0/CR4 values for register dumps.

use alloc::format;
use alloc::string::String;

/// Architecturally defined CR0 bits, ascending.
const CR0_BITS: &[(u32, &str)] = &[
    (0, "PE"),
    (1, "MP"),
    (2, "EM"),
    (3, "TS"),
    (4, "ET"),
    (5, "NE"),
    (16, "WP"),
    (18, "AM"),
    (29, "NW"),
    (30, "CD"),
    (31, "PG"),
];

/// CR4 bits known to the decoder, ascending.
const CR4_BITS: &[(u32, &str)] = &[
    (0, "VME"),
    (1, "PVI"),
    (2, "TSD"),
    (3, "DE"),
    (4, "PSE"),
    (5, "PAE"),
    (6, "MCE"),
    (7, "PGE"),
    (8, "PCE"),
    (9, "OSFXSR"),
    (10, "OSXMMEXCPT"),
    (11, "UMIP"),
    (12, "LA57"),
    (13, "VMXE"),
    (14, "SMXE"),
    (16, "FSGSBASE"),
    (17, "PCIDE"),
    (18, "OSXSAVE"),
    (20, "SMEP"),
    (21, "SMAP"),
    (22, "PKE"),
];

fn describe(register: &str, bits: &[(u32, &str)], value: u64) -> String {
    let mut out = String::new();
    for &(bit, name) in bits {
        if (value >> bit) & 1 != 0 {
            out.push_str(&format!("{register}.{name} "));
        }
    }
    out.push_str(&format!("({value:08x})"));
    out
}

/// e.g. `CR0.PE CR0.PG (80000001)`. Unknown set bits only show in the raw value.
pub fn describe_cr0(value: u64) -> String {
    describe("CR0", CR0_BITS, value)
}

pub fn describe_cr4(value: u64) -> String {
    describe("CR4", CR4_BITS, value)
}
