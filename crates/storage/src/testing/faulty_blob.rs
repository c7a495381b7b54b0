//! Blob Store wrapper that fails selected paths

use parking_lot::Mutex;
use ranchvault_core::{BlobPath, BlobStore, BlobStream, StoreError, StoreResult};
use std::collections::{HashMap, HashSet};
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Reader that yields `remaining` bytes and then fails
struct BreakingReader {
    inner: Box<dyn Read + Send>,
    remaining: u64,
}

impl Read for BreakingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "injected mid-stream failure",
            ));
        }
        let max = buf.len().min(self.remaining as usize);
        let n = self.inner.read(&mut buf[..max])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// [`BlobStore`] wrapper with per-path failure injection
pub struct FaultyBlobStore<S> {
    inner: S,
    failing_gets: Mutex<HashSet<String>>,
    breaking_gets: Mutex<HashMap<String, u64>>,
    /// path -> remaining failures (`usize::MAX` = always)
    failing_puts: Mutex<HashMap<String, usize>>,
    put_attempts: AtomicUsize,
}

impl<S: BlobStore> FaultyBlobStore<S> {
    /// Wrap a store with no faults configured
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing_gets: Mutex::new(HashSet::new()),
            breaking_gets: Mutex::new(HashMap::new()),
            failing_puts: Mutex::new(HashMap::new()),
            put_attempts: AtomicUsize::new(0),
        }
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Every `get` of this path fails
    pub fn fail_get(&self, path: impl Into<String>) {
        self.failing_gets.lock().insert(path.into());
    }

    /// `get` of this path succeeds but the stream breaks after `after_bytes`
    pub fn break_get_after(&self, path: impl Into<String>, after_bytes: u64) {
        self.breaking_gets.lock().insert(path.into(), after_bytes);
    }

    /// The next `times` puts of this path fail with a transient error
    pub fn fail_put_times(&self, path: impl Into<String>, times: usize) {
        self.failing_puts.lock().insert(path.into(), times);
    }

    /// Every put of this path fails
    pub fn fail_put_always(&self, path: impl Into<String>) {
        self.fail_put_times(path, usize::MAX);
    }

    /// Number of `put` calls seen, failed or not
    pub fn put_attempts(&self) -> usize {
        self.put_attempts.load(Ordering::SeqCst)
    }
}

impl<S: BlobStore> BlobStore for FaultyBlobStore<S> {
    fn get(&self, path: &BlobPath) -> StoreResult<BlobStream> {
        let key = path.to_string();
        if self.failing_gets.lock().contains(&key) {
            return Err(StoreError::Backend(format!("injected get failure: {}", key)));
        }
        let stream = self.inner.get(path)?;
        match self.breaking_gets.lock().get(&key) {
            Some(&after) => Ok(BlobStream {
                len: stream.len,
                reader: Box::new(BreakingReader {
                    inner: stream.reader,
                    remaining: after,
                }),
            }),
            None => Ok(stream),
        }
    }

    fn put(&self, path: &BlobPath, reader: &mut dyn Read, len: u64) -> StoreResult<u64> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        let key = path.to_string();
        {
            let mut failing = self.failing_puts.lock();
            if let Some(remaining) = failing.get_mut(&key) {
                if *remaining > 0 {
                    if *remaining != usize::MAX {
                        *remaining -= 1;
                    }
                    return Err(StoreError::transient(format!(
                        "injected put failure: {}",
                        key
                    )));
                }
            }
        }
        self.inner.put(path, reader, len)
    }
}
