use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;

use crate::bgp_warn;

/// A byte-level mutation applied to one field's octet representation.
pub type Strategy = Box<dyn Fn(&mut Vec<u8>) + Send + Sync>;

/// Named strategies, looked up at build time. The built-ins are always
/// present; collaborators may register more under new names.
pub struct StrategyRegistry {
    entries: BTreeMap<String, Strategy>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            entries: BTreeMap::new(),
        };
        registry.register("bitflip", Box::new(bitflip));
        registry.register("increment", Box::new(increment));
        registry
    }

    pub fn register(&mut self, name: &str, strategy: Strategy) {
        self.entries.insert(name.to_string(), strategy);
    }

    /// Apply the named strategy. Unknown names leave the bytes untouched.
    pub fn apply(&self, name: &str, bytes: &mut Vec<u8>) -> bool {
        match self.entries.get(name) {
            Some(strategy) => {
                strategy(bytes);
                true
            }
            None => {
                bgp_warn!(strategy = name, "unknown fuzz strategy");
                false
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("entries", &self.names())
            .finish()
    }
}

/// Flip exactly one bit at a pseudo-random position.
pub fn bitflip(bytes: &mut Vec<u8>) {
    if bytes.is_empty() {
        return;
    }
    let bit = rand::rng().random_range(0..bytes.len() * 8);
    bytes[bit / 8] ^= 1 << (bit % 8);
}

/// Add one to the big-endian unsigned interpretation, modulo field width.
pub fn increment(bytes: &mut Vec<u8>) {
    for byte in bytes.iter_mut().rev() {
        let (value, carry) = byte.overflowing_add(1);
        *byte = value;
        if !carry {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitflip_changes_one_bit() {
        let original = vec![0x00u8, 0xff, 0x55];
        for _ in 0..64 {
            let mut mutated = original.clone();
            bitflip(&mut mutated);
            let distance: u32 = original
                .iter()
                .zip(mutated.iter())
                .map(|(a, b)| (a ^ b).count_ones())
                .sum();
            assert_eq!(distance, 1);
        }
    }

    #[test]
    fn bitflip_empty_is_noop() {
        let mut bytes = Vec::new();
        bitflip(&mut bytes);
        assert!(bytes.is_empty());
    }

    #[test]
    fn increment_simple() {
        let mut bytes = vec![0x00, 0x41];
        increment(&mut bytes);
        assert_eq!(bytes, vec![0x00, 0x42]);
    }

    #[test]
    fn increment_carries() {
        let mut bytes = vec![0x00, 0xff];
        increment(&mut bytes);
        assert_eq!(bytes, vec![0x01, 0x00]);
    }

    #[test]
    fn increment_wraps() {
        let mut bytes = vec![0xff, 0xff];
        increment(&mut bytes);
        assert_eq!(bytes, vec![0x00, 0x00]);
    }

    #[test]
    fn unknown_strategy_is_noop() {
        let registry = StrategyRegistry::new();
        let mut bytes = vec![1, 2, 3];
        assert!(!registry.apply("shuffle", &mut bytes));
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn registered_strategy_applies() {
        let mut registry = StrategyRegistry::new();
        registry.register("zero", Box::new(|bytes| bytes.fill(0)));
        let mut bytes = vec![1, 2, 3];
        assert!(registry.apply("zero", &mut bytes));
        assert_eq!(bytes, vec![0, 0, 0]);
    }
}
