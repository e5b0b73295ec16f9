//! Exclusive-ownership bookkeeping.

use std::collections::BTreeSet;

use common::{Error, Result};

/// Tracks which (controller key, index) pairs are taken.
///
/// A claim yields a [`Slot`] that gives the pair back when dropped. The
/// lock is only held to test and mark the pair, so backends open and close
/// their devices without it.
pub struct AccessRegistry {
    taken: spin::Mutex<BTreeSet<(String, u32)>>,
}

impl AccessRegistry {
    pub const fn new() -> Self {
        Self {
            taken: spin::Mutex::new(BTreeSet::new()),
        }
    }

    /// Reserve `(key, index)`, failing with [`Error::AccessViolation`] while
    /// another slot for it is alive.
    pub fn claim(&'static self, key: &str, index: u32) -> Result<Slot> {
        let entry = (key.to_owned(), index);
        if !self.taken.lock().insert(entry.clone()) {
            return Err(Error::AccessViolation);
        }
        Ok(Slot {
            registry: self,
            entry,
        })
    }

    pub fn is_claimed(&self, key: &str, index: u32) -> bool {
        self.taken.lock().contains(&(key.to_owned(), index))
    }
}

impl Default for AccessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A reserved pair. Keep it as the last field of the owning handle so the
/// pair is only released once the backend has been torn down.
#[must_use]
pub struct Slot {
    registry: &'static AccessRegistry,
    entry: (String, u32),
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.registry.taken.lock().remove(&self.entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> &'static AccessRegistry {
        Box::leak(Box::new(AccessRegistry::new()))
    }

    #[test]
    fn second_claim_fails_until_released() {
        let registry = registry();
        let first = registry.claim("chip", 4).unwrap();
        assert!(matches!(registry.claim("chip", 4), Err(Error::AccessViolation)));
        assert!(registry.is_claimed("chip", 4));

        drop(first);
        assert!(!registry.is_claimed("chip", 4));
        assert!(registry.claim("chip", 4).is_ok());
    }

    #[test]
    fn slots_are_per_key_and_index() {
        let registry = registry();
        let _a = registry.claim("chip0", 1).unwrap();
        let _b = registry.claim("chip0", 2).unwrap();
        let _c = registry.claim("chip1", 1).unwrap();
        assert!(!registry.is_claimed("chip1", 2));
    }

    /// Stands in for a backend handle whose teardown observes the registry.
    struct Handle {
        registry: &'static AccessRegistry,
        claimed_during_teardown: &'static spin::Mutex<Option<bool>>,
    }

    impl Drop for Handle {
        fn drop(&mut self) {
            *self.claimed_during_teardown.lock() = Some(self.registry.is_claimed("chip", 3));
        }
    }

    struct Owner {
        _handle: Handle,
        _slot: Slot,
    }

    #[test]
    fn slot_outlives_backend_teardown() {
        let registry = registry();
        let seen: &'static spin::Mutex<Option<bool>> = Box::leak(Box::new(spin::Mutex::new(None)));

        let owner = Owner {
            _handle: Handle {
                registry,
                claimed_during_teardown: seen,
            },
            _slot: registry.claim("chip", 3).unwrap(),
        };
        drop(owner);

        assert_eq!(*seen.lock(), Some(true));
        assert!(!registry.is_claimed("chip", 3));
    }
}
