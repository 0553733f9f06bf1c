//! Dictionaries backing categorical columns, and the process-wide string
//! cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

static NEXT_DICTIONARY_ID: AtomicU64 = AtomicU64::new(0);

/// Maps strings to u32 codes.
///
/// Dictionaries are append-only. A code, once handed out, always refers to
/// the same string.
#[derive(Debug)]
pub struct CategoricalDictionary {
    id: u64,
    global: bool,
    inner: RwLock<DictionaryInner>,
}

#[derive(Debug, Default)]
struct DictionaryInner {
    values: Vec<String>,
    lookup: HashMap<String, u32>,
}

impl CategoricalDictionary {
    fn new(global: bool) -> Self {
        CategoricalDictionary {
            id: NEXT_DICTIONARY_ID.fetch_add(1, Ordering::Relaxed),
            global,
            inner: RwLock::new(DictionaryInner::default()),
        }
    }

    /// Create a dictionary owned by a single column.
    pub fn new_local() -> Arc<Self> {
        Arc::new(Self::new(false))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether this dictionary was handed out by an active string cache.
    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn len(&self) -> usize {
        self.inner.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_or_insert(&self, value: &str) -> u32 {
        if let Some(code) = self.inner.read().lookup.get(value) {
            return *code;
        }

        let mut inner = self.inner.write();
        // Checked again, another writer may have inserted between locks.
        if let Some(code) = inner.lookup.get(value) {
            return *code;
        }
        let code = inner.values.len() as u32;
        inner.values.push(value.to_string());
        inner.lookup.insert(value.to_string(), code);
        code
    }

    pub fn code_of(&self, value: &str) -> Option<u32> {
        self.inner.read().lookup.get(value).copied()
    }

    pub fn value(&self, code: u32) -> Option<String> {
        self.inner.read().values.get(code as usize).cloned()
    }

    /// Resolve many codes while holding the lock once.
    pub fn values_for(&self, codes: impl IntoIterator<Item = u32>) -> Vec<Option<String>> {
        let inner = self.inner.read();
        codes
            .into_iter()
            .map(|code| inner.values.get(code as usize).cloned())
            .collect()
    }

    /// Check if codes from `self` and `other` can be compared directly.
    pub fn is_compatible(self: &Arc<Self>, other: &Arc<Self>) -> bool {
        Arc::ptr_eq(self, other)
    }
}

#[derive(Debug, Default)]
struct StringCacheState {
    refcount: usize,
    dictionary: Option<Arc<CategoricalDictionary>>,
}

static STRING_CACHE: LazyLock<Mutex<StringCacheState>> =
    LazyLock::new(|| Mutex::new(StringCacheState::default()));

/// Process-wide categorical dictionary.
///
/// While at least one [`StringCacheGuard`] is alive, every categorical
/// column built from strings shares a single dictionary so codes are
/// comparable across tables. Once the last guard is dropped, new columns get
/// their own dictionaries again.
#[derive(Debug)]
pub struct StringCache;

impl StringCache {
    /// Enter a string cache scope. The scope ends when the guard is dropped.
    pub fn enter() -> StringCacheGuard {
        let mut state = STRING_CACHE.lock();
        state.refcount += 1;
        if state.dictionary.is_none() {
            state.dictionary = Some(Arc::new(CategoricalDictionary::new(true)));
        }
        tracing::trace!(refcount = state.refcount, "entered string cache");
        StringCacheGuard { _private: () }
    }

    pub fn is_active() -> bool {
        STRING_CACHE.lock().refcount > 0
    }

    /// Dictionary a newly built categorical column should use.
    pub fn dictionary_for_new_column() -> Arc<CategoricalDictionary> {
        let state = STRING_CACHE.lock();
        match &state.dictionary {
            Some(dict) => dict.clone(),
            None => CategoricalDictionary::new_local(),
        }
    }
}

/// Keeps the string cache active.
#[derive(Debug)]
pub struct StringCacheGuard {
    _private: (),
}

impl Drop for StringCacheGuard {
    fn drop(&mut self) {
        let mut state = STRING_CACHE.lock();
        state.refcount = state.refcount.saturating_sub(1);
        if state.refcount == 0 {
            state.dictionary = None;
        }
        tracing::trace!(refcount = state.refcount, "exited string cache");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let dict = CategoricalDictionary::new_local();
        let a = dict.get_or_insert("a");
        let b = dict.get_or_insert("b");
        assert_eq!(a, dict.get_or_insert("a"));
        assert_ne!(a, b);
        assert_eq!(Some("b".to_string()), dict.value(b));
        assert!(!dict.is_global());
    }

    #[test]
    fn lookup_after_many_inserts() {
        let dict = CategoricalDictionary::new_local();
        for idx in 0..1000 {
            assert_eq!(idx, dict.get_or_insert(&format!("v{idx}")));
        }
        assert_eq!(1000, dict.len());
        assert_eq!(Some(512), dict.code_of("v512"));
        assert_eq!(None, dict.code_of("missing"));
    }

    #[test]
    fn scoped_cache_shares_dictionary() {
        let guard = StringCache::enter();
        let nested = StringCache::enter();
        let d1 = StringCache::dictionary_for_new_column();
        drop(nested);
        let d2 = StringCache::dictionary_for_new_column();
        assert!(d1.is_compatible(&d2));
        assert!(d1.is_global());
        drop(guard);
    }
}
