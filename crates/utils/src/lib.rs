#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod addr;

// Re-export spin once-cell for no_std global init
pub use spin::Once;

// Re-export hashbrown collections so no_std crates share one map type
pub use hashbrown::{HashMap, HashSet};

pub use addr::{PAGE_MASK, PAGE_SHIFT, PAGE_SIZE, align_to_page, is_page_aligned, split_address};

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_once_initializes_once() {
        let once: Once<u64> = Once::new();
        assert_eq!(*once.call_once(|| 0x1000), 0x1000);
        assert_eq!(*once.call_once(|| 0x2000), 0x1000);
    }

    #[test]
    fn test_hashmap_basic() {
        let mut map = HashMap::new();
        map.insert(0x401000_u64, "text");
        map.insert(0x402000_u64, "data");
        assert_eq!(map.get(&0x401000), Some(&"text"));
        assert_eq!(map.get(&0x403000), None);
    }
}
