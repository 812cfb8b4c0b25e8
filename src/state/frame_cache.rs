use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::fetcher::FetchStats;
use crate::normalizer::NormalizeReport;
use crate::types::{Frame, TableName};

/// A table as fetched and normalized, before any duplicate policy runs.
/// Dedupe is cheap and depends on the request, so it is applied per load.
#[derive(Debug, Clone)]
pub struct NormalizedTable {
    pub table: TableName,
    pub frame: Frame,
    pub fetch: FetchStats,
    pub normalize: NormalizeReport,
}

struct Entry {
    table: Arc<NormalizedTable>,
    stored_at: Instant,
}

/// Normalized tables keyed by table name, expiring after `ttl`.
/// A zero TTL disables caching. Failed fetches are never stored.
pub struct FrameCache {
    entries: DashMap<TableName, Entry>,
    ttl: Duration,
}

impl FrameCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, table: TableName) -> Option<Arc<NormalizedTable>> {
        if self.ttl.is_zero() {
            return None;
        }
        let fresh = self
            .entries
            .get(&table)
            .filter(|e| e.stored_at.elapsed() < self.ttl)
            .map(|e| Arc::clone(&e.table));
        if fresh.is_none() {
            self.entries.remove(&table);
        }
        fresh
    }

    pub fn insert(&self, table: Arc<NormalizedTable>) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.insert(
            table.table,
            Entry {
                table,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Tables currently cached and not yet expired.
    pub fn cached_tables(&self) -> Vec<TableName> {
        let mut tables: Vec<TableName> = self
            .entries
            .iter()
            .filter(|e| e.stored_at.elapsed() < self.ttl)
            .map(|e| *e.key())
            .collect();
        tables.sort();
        tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(t: TableName) -> Arc<NormalizedTable> {
        Arc::new(NormalizedTable {
            table: t,
            frame: Frame::new(),
            fetch: FetchStats::default(),
            normalize: NormalizeReport::default(),
        })
    }

    #[test]
    fn stores_and_returns_by_table() {
        let cache = FrameCache::new(Duration::from_secs(60));
        cache.insert(table(TableName::EvDailyBets));
        assert!(cache.get(TableName::EvDailyBets).is_some());
        assert!(cache.get(TableName::BettingAnalytics).is_none());
        assert_eq!(cache.cached_tables(), vec![TableName::EvDailyBets]);
    }

    #[test]
    fn zero_ttl_disables_caching() {
        let cache = FrameCache::new(Duration::ZERO);
        cache.insert(table(TableName::EvDailyBets));
        assert!(cache.get(TableName::EvDailyBets).is_none());
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache = FrameCache::new(Duration::from_millis(1));
        cache.insert(table(TableName::MatchedBettingBets));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(TableName::MatchedBettingBets).is_none());
        assert!(cache.cached_tables().is_empty());
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = FrameCache::new(Duration::from_secs(60));
        cache.insert(table(TableName::BettingAnalytics));
        cache.clear();
        assert!(cache.get(TableName::BettingAnalytics).is_none());
    }
}
