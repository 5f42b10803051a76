//! # Store Boundary
//!
//! Purpose: Describe the key-value store the access layer rides on, so the
//! controller can hold remote RESP clients and in-process stores alike.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: Callers depend on `KvStore`, never on a transport.
//! 2. **Borrow-Friendly API**: Keys and values are passed as `&[u8]`.
//! 3. **Lazy Scans**: `ScanIter` pulls one cursor page at a time; dropping it
//!    abandons the scan without touching shared state.

use std::collections::VecDeque;

use crate::error::RkvResult;

/// One page of a cursor-based key scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor to resume from; 0 means the scan is complete.
    pub cursor: u64,
    /// Keys matched on this page (may be empty even when `cursor != 0`).
    pub keys: Vec<Vec<u8>>,
}

/// Operations the access layer needs from a store endpoint.
///
/// Implementations must be safe to share between threads; the controller
/// hands the same handle to every concurrent caller.
pub trait KvStore: Send + Sync {
    /// Round-trip liveness probe.
    fn ping(&self) -> RkvResult<()>;

    /// Fetches a value. `Ok(None)` when the key is missing or expired.
    fn get(&self, key: &[u8]) -> RkvResult<Option<Vec<u8>>>;

    /// Stores a value without expiration, clearing any previous TTL.
    fn set(&self, key: &[u8], value: &[u8]) -> RkvResult<()>;

    /// Stores a value that expires after `ttl_seconds`.
    fn set_ex(&self, key: &[u8], value: &[u8], ttl_seconds: u64) -> RkvResult<()>;

    /// Returns one page of keys matching the glob `pattern`, starting at `cursor`.
    ///
    /// `count` is a hint for how much work one page may do.
    fn scan_page(&self, cursor: u64, pattern: &[u8], count: usize) -> RkvResult<ScanPage>;
}

/// Lazy iterator over every key matching a pattern.
///
/// Each call to `scan` starts a fresh iteration at cursor 0.
pub struct ScanIter<'a, S: KvStore + ?Sized> {
    store: &'a S,
    pattern: Vec<u8>,
    count: usize,
    cursor: u64,
    buffered: VecDeque<Vec<u8>>,
    finished: bool,
}

impl<'a, S: KvStore + ?Sized> ScanIter<'a, S> {
    pub fn new(store: &'a S, pattern: impl Into<Vec<u8>>, count: usize) -> Self {
        ScanIter {
            store,
            pattern: pattern.into(),
            count: count.max(1),
            cursor: 0,
            buffered: VecDeque::new(),
            finished: false,
        }
    }
}

impl<'a, S: KvStore + ?Sized> Iterator for ScanIter<'a, S> {
    type Item = RkvResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(key) = self.buffered.pop_front() {
                return Some(Ok(key));
            }
            if self.finished {
                return None;
            }

            match self.store.scan_page(self.cursor, &self.pattern, self.count) {
                Ok(page) => {
                    self.cursor = page.cursor;
                    self.finished = page.cursor == 0;
                    self.buffered.extend(page.keys);
                }
                Err(err) => {
                    // A failed page ends the iteration; the error is yielded once.
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Convenience: scan `pattern` on any store.
pub fn scan<'a, S: KvStore + ?Sized>(store: &'a S, pattern: &str, count: usize) -> ScanIter<'a, S> {
    ScanIter::new(store, pattern.as_bytes().to_vec(), count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RkvError;
    use std::sync::Mutex;

    /// Serves pre-recorded pages and remembers the cursors it was asked for.
    struct PagedStore {
        pages: Vec<RkvResult<ScanPage>>,
        seen: Mutex<Vec<u64>>,
    }

    impl KvStore for PagedStore {
        fn ping(&self) -> RkvResult<()> {
            Ok(())
        }

        fn get(&self, _key: &[u8]) -> RkvResult<Option<Vec<u8>>> {
            Ok(None)
        }

        fn set(&self, _key: &[u8], _value: &[u8]) -> RkvResult<()> {
            Ok(())
        }

        fn set_ex(&self, _key: &[u8], _value: &[u8], _ttl_seconds: u64) -> RkvResult<()> {
            Ok(())
        }

        fn scan_page(&self, cursor: u64, _pattern: &[u8], _count: usize) -> RkvResult<ScanPage> {
            let mut seen = self.seen.lock().unwrap();
            let idx = seen.len();
            seen.push(cursor);
            self.pages[idx].clone()
        }
    }

    #[test]
    fn walks_pages_until_cursor_zero() {
        let store = PagedStore {
            pages: vec![
                Ok(ScanPage { cursor: 7, keys: vec![b"a".to_vec()] }),
                Ok(ScanPage { cursor: 9, keys: vec![] }),
                Ok(ScanPage { cursor: 0, keys: vec![b"b".to_vec(), b"c".to_vec()] }),
            ],
            seen: Mutex::new(Vec::new()),
        };

        let keys: Vec<Vec<u8>> = scan(&store, "*", 10).map(|k| k.unwrap()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(*store.seen.lock().unwrap(), vec![0, 7, 9]);
    }

    #[test]
    fn error_ends_iteration() {
        let store = PagedStore {
            pages: vec![
                Ok(ScanPage { cursor: 3, keys: vec![b"a".to_vec()] }),
                Err(RkvError::connection("r0", "reset")),
            ],
            seen: Mutex::new(Vec::new()),
        };

        let mut iter = scan(&store, "*", 10);
        assert_eq!(iter.next(), Some(Ok(b"a".to_vec())));
        assert!(matches!(iter.next(), Some(Err(RkvError::Connection { .. }))));
        assert_eq!(iter.next(), None);
    }
}
