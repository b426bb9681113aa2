//! Short-string interning.
//!
//! All strings up to `MAX_SHORT_LEN` bytes are deduplicated in a
//! process-wide table keyed by content hash, so equality on them is a
//! pointer comparison. The table is part of the GC root set by
//! definition (pinned); long strings bypass it entirely and die with
//! their last reference count.

use ahash::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};

use crate::limits;
use crate::value::LuaStr;

pub struct StringInterner {
    map: HashMap<u64, Vec<LuaStr>, RandomState>,
    hashbuilder: RandomState,
    short_limit: usize,
    /// Estimated bytes held by interned strings.
    pub(crate) bytes: usize,
}

impl StringInterner {
    pub fn new() -> Self {
        StringInterner {
            map: HashMap::with_capacity_and_hasher(256, RandomState::new()),
            hashbuilder: RandomState::new(),
            short_limit: limits::MAX_SHORT_LEN,
            bytes: 0,
        }
    }

    pub fn intern(&mut self, bytes: &[u8]) -> LuaStr {
        let hash = self.hash_bytes(bytes);
        if bytes.len() > self.short_limit {
            return LuaStr::from_bytes_hashed(bytes.to_vec().into_boxed_slice(), hash);
        }
        if let Some(bucket) = self.map.get(&hash)
            && let Some(existing) = bucket.iter().find(|s| s.as_bytes() == bytes)
        {
            return existing.clone();
        }
        let s = LuaStr::from_bytes_hashed(bytes.to_vec().into_boxed_slice(), hash);
        self.bytes += bytes.len() + 24;
        self.map.entry(hash).or_default().push(s.clone());
        s
    }

    pub fn intern_str(&mut self, s: &str) -> LuaStr {
        self.intern(s.as_bytes())
    }

    /// Wrap an already-built byte vector, interning it when short.
    pub fn take(&mut self, bytes: Vec<u8>) -> LuaStr {
        if bytes.len() <= self.short_limit {
            return self.intern(&bytes);
        }
        self.fresh(bytes)
    }

    /// Wrap a byte vector without interning (concatenation results).
    /// The hash still comes from the shared builder, so equality and
    /// table lookup work against interned strings.
    pub fn fresh(&mut self, bytes: Vec<u8>) -> LuaStr {
        let hash = self.hash_bytes(&bytes);
        LuaStr::from_bytes_hashed(bytes.into_boxed_slice(), hash)
    }

    #[inline]
    fn hash_bytes(&self, bytes: &[u8]) -> u64 {
        let mut hasher = self.hashbuilder.build_hasher();
        bytes.hash(&mut hasher);
        hasher.finish()
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        StringInterner::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn short_strings_share_storage() {
        let mut interner = StringInterner::new();
        let a = interner.intern(b"hello");
        let b = interner.intern(b"hello");
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn long_strings_compare_by_content() {
        let mut interner = StringInterner::new();
        let long = vec![b'x'; 100];
        let a = interner.intern(&long);
        let b = interner.intern(&long);
        assert!(!a.ptr_eq(&b));
        assert_eq!(a, b);
    }
}
