//! Process-global interned strings.
//!
//! Every identifier, ABI string and crate name in the compiler is an [`IStr`]:
//! a reference-counted, hash-consed immutable string. Interning the same text
//! twice yields the same allocation, so equality is a pointer comparison.
//!
//! The intern table is cleared between crates in a batch compile (see
//! [`IStr::reset_interner`]); outstanding handles stay valid because they keep
//! their own reference.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

static INTERNER: Lazy<Mutex<FxHashMap<Arc<str>, ()>>> =
    Lazy::new(|| Mutex::new(FxHashMap::default()));

/// An interned string handle.
///
/// `==` compares the backing pointers; two `IStr`s are equal iff their text is
/// equal, because all handles are minted through the same table. Ordering and
/// hashing go through the text so interned strings can key sorted maps.
#[derive(Clone)]
pub struct IStr(Arc<str>);

impl IStr {
    pub fn new(text: &str) -> IStr {
        let mut table = INTERNER.lock().unwrap();
        if let Some((existing, ())) = table.get_key_value(text) {
            return IStr(existing.clone());
        }
        let entry: Arc<str> = Arc::from(text);
        table.insert(entry.clone(), ());
        IStr(entry)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drops the table's own references. Live handles are unaffected, but
    /// strings interned afterwards no longer unify with them. Only call
    /// between whole-crate compiles.
    pub fn reset_interner() {
        INTERNER.lock().unwrap().clear();
    }
}

impl Default for IStr {
    fn default() -> IStr {
        IStr::new("")
    }
}

impl PartialEq for IStr {
    fn eq(&self, other: &IStr) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}
impl Eq for IStr {}

impl PartialOrd for IStr {
    fn partial_cmp(&self, other: &IStr) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for IStr {
    fn cmp(&self, other: &IStr) -> Ordering {
        if Arc::ptr_eq(&self.0, &other.0) {
            Ordering::Equal
        } else {
            self.0.cmp(&other.0)
        }
    }
}

impl Hash for IStr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Deref for IStr {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for IStr {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for IStr {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IStr {
    fn from(s: &str) -> IStr {
        IStr::new(s)
    }
}

impl From<&String> for IStr {
    fn from(s: &String) -> IStr {
        IStr::new(s)
    }
}

impl From<String> for IStr {
    fn from(s: String) -> IStr {
        IStr::new(&s)
    }
}

impl PartialEq<str> for IStr {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for IStr {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl fmt::Display for IStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for IStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_unifies() {
        let a = IStr::new("foo");
        let b = IStr::new("foo");
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(a, b);
        assert_ne!(a, IStr::new("bar"));
    }

    #[test]
    fn ordering_is_textual() {
        let mut v = vec![IStr::new("b"), IStr::new("a"), IStr::new("c")];
        v.sort();
        assert_eq!(v, vec![IStr::new("a"), IStr::new("b"), IStr::new("c")]);
    }

    #[test]
    fn str_lookup() {
        let a = IStr::new("lookup");
        let mut map = std::collections::BTreeMap::new();
        map.insert(a, 1u32);
        assert_eq!(map.get("lookup"), Some(&1));
    }
}
