//! Lua tables: one keyspace backed by a dense array part plus a hash part.
//!
//! Integer keys `1..=n` prefer the array part; everything else lands in
//! the hash part. Keys normalize before storage: a float with an exact
//! integer value becomes that integer, so `t[2]` and `t[2.0]` are the
//! same slot. `nil` and NaN are rejected as keys on write and read as
//! `nil`.

use ahash::RandomState;
use std::collections::HashMap;

use crate::gc::{GcRef, TableId};
use crate::value::{LuaStr, LuaValue};

/// A normalized table key. Constructing one from a value fails for the
/// two forbidden keys (`nil` and NaN).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum LuaKey {
    Integer(i64),
    /// Bits of a non-integral, non-NaN float.
    Float(u64),
    Boolean(bool),
    String(LuaStr),
    Object(GcRef),
}

/// Why a value cannot be a table key.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum KeyError {
    Nil,
    NaN,
}

impl LuaKey {
    pub fn from_value(v: &LuaValue) -> Result<LuaKey, KeyError> {
        match v {
            LuaValue::Nil => Err(KeyError::Nil),
            LuaValue::Boolean(b) => Ok(LuaKey::Boolean(*b)),
            LuaValue::Integer(i) => Ok(LuaKey::Integer(*i)),
            LuaValue::Float(f) => {
                if f.is_nan() {
                    return Err(KeyError::NaN);
                }
                // Normalize integral floats so 2.0 and 2 share a slot.
                if f.fract() == 0.0 && *f >= -(2f64.powi(63)) && *f < 2f64.powi(63) {
                    Ok(LuaKey::Integer(*f as i64))
                } else {
                    Ok(LuaKey::Float(f.to_bits()))
                }
            }
            LuaValue::String(s) => Ok(LuaKey::String(s.clone())),
            LuaValue::Table(t) => Ok(LuaKey::Object(GcRef::Table(*t))),
            LuaValue::Function(f) => Ok(LuaKey::Object(GcRef::Function(*f))),
            LuaValue::Thread(t) => Ok(LuaKey::Object(GcRef::Thread(*t))),
            LuaValue::Userdata(u) => Ok(LuaKey::Object(GcRef::Userdata(*u))),
        }
    }

    pub fn to_value(&self) -> LuaValue {
        match self {
            LuaKey::Integer(i) => LuaValue::Integer(*i),
            LuaKey::Float(bits) => LuaValue::Float(f64::from_bits(*bits)),
            LuaKey::Boolean(b) => LuaValue::Boolean(*b),
            LuaKey::String(s) => LuaValue::String(s.clone()),
            LuaKey::Object(GcRef::Table(t)) => LuaValue::Table(*t),
            LuaKey::Object(GcRef::Function(f)) => LuaValue::Function(*f),
            LuaKey::Object(GcRef::Thread(t)) => LuaValue::Thread(*t),
            LuaKey::Object(GcRef::Userdata(u)) => LuaValue::Userdata(*u),
            LuaKey::Object(GcRef::Box(_)) => LuaValue::Nil,
        }
    }
}

pub struct LuaTable {
    /// Values for keys `1..=array.len()`; `Nil` entries are holes.
    array: Vec<LuaValue>,
    hash: HashMap<LuaKey, LuaValue, RandomState>,
    meta: Option<TableId>,
}

impl LuaTable {
    pub fn new() -> Self {
        LuaTable {
            array: Vec::new(),
            hash: HashMap::with_hasher(RandomState::new()),
            meta: None,
        }
    }

    pub fn with_capacity(narr: usize, nhash: usize) -> Self {
        LuaTable {
            array: Vec::with_capacity(narr),
            hash: HashMap::with_capacity_and_hasher(nhash, RandomState::new()),
            meta: None,
        }
    }

    #[inline(always)]
    pub fn metatable(&self) -> Option<TableId> {
        self.meta
    }

    pub fn set_metatable(&mut self, meta: Option<TableId>) {
        self.meta = meta;
    }

    /// Raw read; absent keys (and the forbidden keys) read as `nil`.
    pub fn raw_get_value(&self, key: &LuaValue) -> LuaValue {
        match LuaKey::from_value(key) {
            Ok(k) => self.raw_get(&k),
            Err(_) => LuaValue::Nil,
        }
    }

    pub fn raw_get(&self, key: &LuaKey) -> LuaValue {
        if let LuaKey::Integer(i) = key
            && *i >= 1
            && (*i as usize) <= self.array.len()
        {
            return self.array[(*i - 1) as usize].clone();
        }
        self.hash.get(key).cloned().unwrap_or(LuaValue::Nil)
    }

    pub fn raw_get_int(&self, i: i64) -> LuaValue {
        if i >= 1 && (i as usize) <= self.array.len() {
            return self.array[(i - 1) as usize].clone();
        }
        self.hash
            .get(&LuaKey::Integer(i))
            .cloned()
            .unwrap_or(LuaValue::Nil)
    }

    /// Raw write. Writing `nil` removes the key.
    pub fn raw_set(&mut self, key: LuaKey, value: LuaValue) {
        if let LuaKey::Integer(i) = key {
            return self.raw_set_int(i, value);
        }
        if value.is_nil() {
            self.hash.remove(&key);
        } else {
            self.hash.insert(key, value);
        }
    }

    pub fn raw_set_int(&mut self, i: i64, value: LuaValue) {
        let len = self.array.len() as i64;
        if i >= 1 && i <= len {
            self.array[(i - 1) as usize] = value;
            return;
        }
        if i == len + 1 && !value.is_nil() {
            self.array.push(value);
            // Pull any hash-resident successors into the array part.
            let mut next = len + 2;
            while let Some(v) = self.hash.remove(&LuaKey::Integer(next)) {
                self.array.push(v);
                next += 1;
            }
            return;
        }
        if value.is_nil() {
            self.hash.remove(&LuaKey::Integer(i));
        } else {
            self.hash.insert(LuaKey::Integer(i), value);
        }
    }

    /// A border for the `#` operator: an `n` such that `t[n]` is
    /// non-nil and `t[n+1]` is nil (0 when `t[1]` is nil).
    pub fn raw_len(&self) -> i64 {
        let alen = self.array.len();
        if alen > 0 && !self.array[alen - 1].is_nil() {
            // Array part is full to its end; the border may continue in
            // the hash part.
            let mut n = alen as i64;
            while self.hash.contains_key(&LuaKey::Integer(n + 1)) {
                n += 1;
            }
            return n;
        }
        if alen == 0 {
            if self.hash.contains_key(&LuaKey::Integer(1)) {
                let mut n = 1i64;
                while self.hash.contains_key(&LuaKey::Integer(n + 1)) {
                    n += 1;
                }
                return n;
            }
            return 0;
        }
        // Binary search for a border inside the array part.
        let mut lo = 0usize; // t[lo] non-nil (or lo == 0)
        let mut hi = alen; // t[hi] nil
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.array[mid - 1].is_nil() {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        lo as i64
    }

    /// Total number of non-nil entries (not the `#` border).
    pub fn entry_count(&self) -> usize {
        self.array.iter().filter(|v| !v.is_nil()).count() + self.hash.len()
    }

    /// Stateless iteration protocol backing `next`. `None` as input key
    /// starts from the beginning; returns `None` when exhausted.
    ///
    /// Order: array part by index, then the hash part in its internal
    /// order (stable as long as the table is not mutated).
    pub fn next_entry(&self, key: Option<&LuaKey>) -> Option<(LuaValue, LuaValue)> {
        let start_hash;
        match key {
            None => {
                // First non-hole array slot, if any.
                for (idx, v) in self.array.iter().enumerate() {
                    if !v.is_nil() {
                        return Some((LuaValue::Integer(idx as i64 + 1), v.clone()));
                    }
                }
                start_hash = None;
            }
            Some(LuaKey::Integer(i))
                if *i >= 1 && (*i as usize) <= self.array.len() =>
            {
                for idx in (*i as usize)..self.array.len() {
                    if !self.array[idx].is_nil() {
                        return Some((
                            LuaValue::Integer(idx as i64 + 1),
                            self.array[idx].clone(),
                        ));
                    }
                }
                start_hash = None;
            }
            Some(k) => start_hash = Some(k),
        }
        match start_hash {
            None => self
                .hash
                .iter()
                .next()
                .map(|(k, v)| (k.to_value(), v.clone())),
            Some(k) => {
                let mut iter = self.hash.iter();
                for (hk, _) in iter.by_ref() {
                    if hk == k {
                        break;
                    }
                }
                iter.next().map(|(k, v)| (k.to_value(), v.clone()))
            }
        }
    }

    /// All live entries, for the collector and `table`-library helpers.
    pub fn iter_entries(&self) -> impl Iterator<Item = (LuaValue, LuaValue)> + '_ {
        self.array
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nil())
            .map(|(i, v)| (LuaValue::Integer(i as i64 + 1), v.clone()))
            .chain(self.hash.iter().map(|(k, v)| (k.to_value(), v.clone())))
    }

    /// Drop entries failing the predicate over `(key, value)`; used by
    /// weak-table clearing after a major collection.
    pub fn retain_entries<F>(&mut self, mut keep: F)
    where
        F: FnMut(&LuaValue, &LuaValue) -> bool,
    {
        for (idx, slot) in self.array.iter_mut().enumerate() {
            if !slot.is_nil() && !keep(&LuaValue::Integer(idx as i64 + 1), slot) {
                *slot = LuaValue::Nil;
            }
        }
        self.hash.retain(|k, v| keep(&k.to_value(), v));
    }

    /// Array-part insertion for `table.insert(t, pos, v)`.
    pub fn insert_at(&mut self, pos: i64, value: LuaValue) {
        let len = self.raw_len();
        let mut i = len;
        while i >= pos {
            let v = self.raw_get_int(i);
            self.raw_set_int(i + 1, v);
            i -= 1;
        }
        self.raw_set_int(pos, value);
    }

    /// Array-part removal for `table.remove(t, pos)`.
    pub fn remove_at(&mut self, pos: i64) -> LuaValue {
        let len = self.raw_len();
        let removed = self.raw_get_int(pos);
        let mut i = pos;
        while i < len {
            let v = self.raw_get_int(i + 1);
            self.raw_set_int(i, v);
            i += 1;
        }
        if len > 0 {
            self.raw_set_int(len, LuaValue::Nil);
        }
        removed
    }
}

impl Default for LuaTable {
    fn default() -> Self {
        LuaTable::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn array_and_hash_are_one_keyspace() {
        let mut t = LuaTable::new();
        t.raw_set_int(3, LuaValue::Integer(30));
        assert_eq!(t.raw_len(), 0);
        t.raw_set_int(1, LuaValue::Integer(10));
        t.raw_set_int(2, LuaValue::Integer(20));
        // Key 3 migrates out of the hash part once 1..2 fill in.
        assert_eq!(t.raw_len(), 3);
        assert_eq!(t.raw_get_int(3).as_integer(), Some(30));
    }

    #[test]
    fn float_keys_normalize() {
        let mut t = LuaTable::new();
        t.raw_set(LuaKey::from_value(&LuaValue::Float(2.0)).unwrap(), LuaValue::Integer(1));
        assert_eq!(t.raw_get_int(2).as_integer(), Some(1));
    }

    #[test]
    fn nil_write_removes() {
        let mut t = LuaTable::new();
        let k = LuaKey::from_value(&LuaValue::Boolean(true)).unwrap();
        t.raw_set(k.clone(), LuaValue::Integer(1));
        t.raw_set(k.clone(), LuaValue::Nil);
        assert!(t.raw_get(&k).is_nil());
        assert_eq!(t.entry_count(), 0);
    }

    #[test]
    fn forbidden_keys() {
        assert_eq!(LuaKey::from_value(&LuaValue::Nil), Err(KeyError::Nil));
        assert_eq!(
            LuaKey::from_value(&LuaValue::Float(f64::NAN)),
            Err(KeyError::NaN)
        );
    }

    #[test]
    fn next_walks_everything() {
        let mut t = LuaTable::new();
        t.raw_set_int(1, LuaValue::Integer(10));
        t.raw_set_int(2, LuaValue::Integer(20));
        t.raw_set(
            LuaKey::Boolean(true),
            LuaValue::Integer(30),
        );
        let mut seen = 0;
        let mut key = None;
        while let Some((k, _)) = t.next_entry(key.as_ref()) {
            seen += 1;
            key = Some(LuaKey::from_value(&k).unwrap());
        }
        assert_eq!(seen, 3);
    }
}
