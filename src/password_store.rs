use std::sync::{Mutex, OnceLock};

use zeroize::Zeroize;

/// Process-scoped, single-slot secret storage for a decode session.
///
/// Re-expresses the archive format's process-wide password as an explicit
/// session object: a host embedding that genuinely needs a single global
/// instance can reach for [`PasswordStore::global`], but the type itself
/// carries no hidden global state and can be constructed freely for
/// multi-tenant use.
///
/// `set` zeroes any previously stored secret before replacing it; `clear`
/// zeroes the stored secret and leaves the slot empty. A password of zero
/// length is equivalent to `clear`.
#[derive(Default)]
pub struct PasswordStore {
    slot: Mutex<Option<Vec<u8>>>,
}

impl PasswordStore {
    /// Creates a new, empty password store.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Returns the process-wide singleton store.
    ///
    /// Only use this when the embedding genuinely cannot thread a
    /// `&PasswordStore` through to every call site; prefer an explicit
    /// instance otherwise.
    pub fn global() -> &'static PasswordStore {
        static GLOBAL: OnceLock<PasswordStore> = OnceLock::new();
        GLOBAL.get_or_init(PasswordStore::new)
    }

    /// Sets the stored secret to `bytes`, zeroing whatever was there
    /// before. An empty slice clears the slot.
    pub fn set(&self, bytes: &[u8]) {
        let mut slot = self.slot.lock().expect("password store mutex poisoned");
        Self::zero_and_replace(
            &mut slot,
            if bytes.is_empty() {
                None
            } else {
                Some(bytes.to_vec())
            },
        );
    }

    /// Returns `true` if a non-empty secret is currently stored.
    pub fn has(&self) -> bool {
        self.slot.lock().expect("password store mutex poisoned").is_some()
    }

    /// Clears the stored secret, zeroing it first.
    pub fn clear(&self) {
        let mut slot = self.slot.lock().expect("password store mutex poisoned");
        Self::zero_and_replace(&mut slot, None);
    }

    /// Swaps `new` into `slot`, zeroing whatever secret occupied it before.
    /// Returns the zeroed remnant still alive (not yet dropped/freed) so a
    /// caller that needs to confirm the backing bytes were actually
    /// overwritten, rather than just the slot being emptied, can inspect it.
    fn zero_and_replace(slot: &mut Option<Vec<u8>>, new: Option<Vec<u8>>) -> Option<Vec<u8>> {
        let old = std::mem::replace(slot, new);
        old.map(|mut old| {
            old.zeroize();
            old
        })
    }

    /// Runs `f` with the currently stored secret (or an empty slice if
    /// none is set).
    pub fn with<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let slot = self.slot.lock().expect("password store mutex poisoned");
        match slot.as_deref() {
            Some(bytes) => f(bytes),
            None => f(&[]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_has_then_clear() {
        let store = PasswordStore::new();
        assert!(!store.has());
        store.set(b"hunter2");
        assert!(store.has());
        store.with(|p| assert_eq!(p, b"hunter2"));
        store.clear();
        assert!(!store.has());
        store.with(|p| assert_eq!(p, b""));
    }

    #[test]
    fn clear_zeroes_the_backing_memory_before_freeing_it() {
        let store = PasswordStore::new();
        store.set(b"hunter2");

        let mut slot = store.slot.lock().unwrap();
        let len = slot.as_ref().unwrap().len();
        let ptr = slot.as_ref().unwrap().as_ptr();
        let remnant = PasswordStore::zero_and_replace(&mut slot, None)
            .expect("slot held a secret before clear");
        drop(slot);

        // Same allocation, not a fresh (already-zeroed) one: `zeroize`
        // overwrites in place rather than reallocating.
        assert_eq!(remnant.as_ptr(), ptr);
        // `len`, not `remnant.len()`: the `Zeroize` impl for `Vec<u8>` may
        // truncate the logical length as part of clearing; the allocation
        // backing the original bytes is still live and owned by `remnant`,
        // so reading it directly is sound.
        let backing = unsafe { std::slice::from_raw_parts(remnant.as_ptr(), len) };
        assert!(backing.iter().all(|&b| b == 0));
    }

    #[test]
    fn set_empty_is_clear() {
        let store = PasswordStore::new();
        store.set(b"x");
        assert!(store.has());
        store.set(b"");
        assert!(!store.has());
    }

    #[test]
    fn set_over_existing_replaces() {
        let store = PasswordStore::new();
        store.set(b"first");
        store.set(b"second");
        store.with(|p| assert_eq!(p, b"second"));
    }
}
