//! In-memory cache of the scored table.
//!
//! The cache holds at most one entry. A miss triggers exactly one load pass
//! through the configured [`TableSource`]; concurrent callers block on the
//! load gate and then read the freshly cached entry. Invalidation bumps a
//! generation counter so a load that was already running when the cache was
//! cleared is handed to its caller but never stored.

use crate::error::Result;
use crate::types::{CacheMetadata, DatasetTier};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use polars::prelude::DataFrame;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

// =============================================================================
// Seams
// =============================================================================

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A table produced by one load pass, with its provenance.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: DataFrame,
    pub tier: DatasetTier,
    pub source_path: PathBuf,
    pub source_modified: Option<DateTime<Utc>>,
}

/// Something that can produce the full scored table on demand.
pub trait TableSource: Send + Sync {
    fn load(&self) -> Result<LoadedTable>;
}

// =============================================================================
// Cache
// =============================================================================

#[derive(Debug)]
struct CacheEntry {
    table: DataFrame,
    metadata: CacheMetadata,
}

impl CacheEntry {
    fn new(loaded: LoadedTable, loaded_at: DateTime<Utc>) -> Self {
        let metadata = CacheMetadata {
            tier: loaded.tier,
            source_path: loaded.source_path,
            loaded_at,
            source_modified: loaded.source_modified,
            rows: loaded.table.height(),
        };
        Self {
            table: loaded.table,
            metadata,
        }
    }
}

/// Single-entry cache with single-flight loading.
pub struct CacheManager {
    source: Arc<dyn TableSource>,
    clock: Arc<dyn Clock>,
    entry: RwLock<Option<Arc<CacheEntry>>>,
    load_gate: Mutex<()>,
    generation: AtomicU64,
}

static_assertions::assert_impl_all!(CacheManager: Send, Sync);

impl CacheManager {
    pub fn new(source: Arc<dyn TableSource>) -> Self {
        Self::with_clock(source, Arc::new(SystemClock))
    }

    pub fn with_clock(source: Arc<dyn TableSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            entry: RwLock::new(None),
            load_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// The cached table, loading it first if the cache is empty.
    ///
    /// The returned frame is an independent copy; mutating it never affects
    /// the cached entry or other callers.
    ///
    /// # Errors
    ///
    /// Propagates the load error. A failed load leaves the cache empty.
    pub fn get(&self) -> Result<DataFrame> {
        if let Some(entry) = self.current() {
            return Ok(entry.table.clone());
        }

        let _gate = self.load_gate.lock();
        // Another caller may have filled the cache while we waited.
        if let Some(entry) = self.current() {
            debug!("Cache filled by a concurrent load");
            return Ok(entry.table.clone());
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let loaded = self.source.load()?;
        let entry = Arc::new(CacheEntry::new(loaded, self.clock.now()));
        let table = entry.table.clone();

        let mut slot = self.entry.write();
        if self.generation.load(Ordering::SeqCst) == generation {
            info!(
                "Cached {} rows from {} tier",
                entry.metadata.rows, entry.metadata.tier
            );
            *slot = Some(entry);
        } else {
            debug!("Cache invalidated during load; result not stored");
        }
        Ok(table)
    }

    /// Drop the cached entry. The next `get()` reloads from disk.
    pub fn invalidate(&self) {
        let mut slot = self.entry.write();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if slot.take().is_some() {
            info!("Cache invalidated");
        }
    }

    /// Provenance of the cached entry, if any.
    pub fn metadata(&self) -> Option<CacheMetadata> {
        self.current().map(|entry| entry.metadata.clone())
    }

    pub fn is_populated(&self) -> bool {
        self.entry.read().is_some()
    }

    fn current(&self) -> Option<Arc<CacheEntry>> {
        self.entry.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use chrono::TimeZone;
    use polars::prelude::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::thread;
    use std::time::Duration;

    struct CountingSource {
        loads: AtomicUsize,
        fail: AtomicBool,
        delay: Duration,
    }

    impl CountingSource {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                loads: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                delay,
            })
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl TableSource for CountingSource {
        fn load(&self) -> Result<LoadedTable> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst) as i32;
            thread::sleep(self.delay);
            if self.fail.load(Ordering::SeqCst) {
                return Err(PipelineError::SourceUnavailable { attempts: vec![] });
            }
            Ok(LoadedTable {
                table: df!("LOAD" => &[n, n]).unwrap(),
                tier: DatasetTier::Original,
                source_path: PathBuf::from("data/original.csv"),
                source_modified: None,
            })
        }
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn load_number(df: &DataFrame) -> i32 {
        df.column("LOAD").unwrap().i32().unwrap().get(0).unwrap()
    }

    #[test]
    fn test_second_get_hits_cache() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = CacheManager::new(source.clone());

        assert!(!cache.is_populated());
        cache.get().unwrap();
        cache.get().unwrap();
        assert_eq!(source.loads(), 1);
        assert!(cache.is_populated());
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = CacheManager::new(source.clone());

        assert_eq!(load_number(&cache.get().unwrap()), 0);
        cache.invalidate();
        assert!(cache.metadata().is_none());
        assert_eq!(load_number(&cache.get().unwrap()), 1);
        assert_eq!(source.loads(), 2);
    }

    #[test]
    fn test_metadata_uses_injected_clock() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let cache = CacheManager::with_clock(
            CountingSource::new(Duration::ZERO),
            Arc::new(FixedClock(at)),
        );
        cache.get().unwrap();

        let meta = cache.metadata().unwrap();
        assert_eq!(meta.loaded_at, at);
        assert_eq!(meta.rows, 2);
        assert_eq!(meta.tier, DatasetTier::Original);
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let source = CountingSource::new(Duration::ZERO);
        source.fail.store(true, Ordering::SeqCst);
        let cache = CacheManager::new(source.clone());

        assert!(cache.get().is_err());
        assert!(!cache.is_populated());

        source.fail.store(false, Ordering::SeqCst);
        assert!(cache.get().is_ok());
        assert_eq!(source.loads(), 2);
    }

    #[test]
    fn test_returned_tables_are_independent_copies() {
        let cache = CacheManager::new(CountingSource::new(Duration::ZERO));
        let mut first = cache.get().unwrap();
        first
            .with_column(Series::new("LOAD".into(), &[99i32, 99]))
            .unwrap();
        assert_eq!(load_number(&cache.get().unwrap()), 0);
    }

    #[test]
    fn test_concurrent_gets_share_one_load() {
        let source = CountingSource::new(Duration::from_millis(50));
        let cache = Arc::new(CacheManager::new(source.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || load_number(&cache.get().unwrap()))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 0);
        }
        assert_eq!(source.loads(), 1);
    }

    #[test]
    fn test_load_in_flight_during_invalidate_is_not_stored() {
        let source = CountingSource::new(Duration::from_millis(100));
        let cache = Arc::new(CacheManager::new(source.clone()));

        let loader = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get().unwrap())
        };
        thread::sleep(Duration::from_millis(30));
        cache.invalidate();

        let stale = loader.join().unwrap();
        assert_eq!(load_number(&stale), 0);
        assert!(!cache.is_populated());
        assert_eq!(load_number(&cache.get().unwrap()), 1);
    }
}
