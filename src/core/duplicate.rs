// Near-duplicate search over a completed record store.
//
// Every record is one query. Projection mode checks only the narrowest
// candidate window the index offers for it; exhaustive mode checks every
// later record. Either way a pair is reported once, from the query with the
// smaller id, after an exact Hamming distance check.

use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::time::Instant;

use super::index::LshIndex;
use super::store::{RecordId, RecordStore};
use crate::config::{SearchConfig, SearchStrategy};

/// Two records within the distance limit, `first < second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DuplicatePair {
    pub distance: u32,
    pub first: RecordId,
    pub second: RecordId,
}

impl DuplicatePair {
    pub fn describe<'a>(&self, store: &'a RecordStore) -> PairLine<'a> {
        PairLine {
            distance: self.distance,
            first: store.name(self.first),
            second: store.name(self.second),
        }
    }
}

/// A pair resolved to record names, printable as a report line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PairLine<'a> {
    pub distance: u32,
    pub first: &'a str,
    pub second: &'a str,
}

impl fmt::Display for PairLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>2} -- {} {}", self.distance, self.first, self.second)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Records that were queried.
    pub queries: usize,
    /// Records never queried because the deadline had passed.
    pub skipped: usize,
    /// Sum of candidate window sizes over all queries.
    pub candidates: usize,
    /// Exact distance checks performed.
    pub verified: usize,
}

impl SearchStats {
    pub fn mean_window(&self) -> f64 {
        if self.queries == 0 {
            0.0
        } else {
            self.candidates as f64 / self.queries as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.skipped == 0
    }

    fn absorb(&mut self, other: &SearchStats) {
        self.queries += other.queries;
        self.skipped += other.skipped;
        self.candidates += other.candidates;
        self.verified += other.verified;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchReport {
    /// Ordered by query record, then by position in the query's window.
    pub pairs: Vec<DuplicatePair>,
    pub stats: SearchStats,
}

impl SearchReport {
    fn merge(mut self, other: SearchReport) -> SearchReport {
        self.pairs.extend(other.pairs);
        self.stats.absorb(&other.stats);
        self
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateFinder {
    distance_limit: u32,
    deadline: Option<Instant>,
}

impl DuplicateFinder {
    pub fn new(distance_limit: u32) -> Self {
        Self {
            distance_limit,
            deadline: None,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.distance_limit)
    }

    /// Stop starting new queries once `deadline` passes. Pairs already found
    /// are kept, so the result is sound but may be incomplete.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The pair `(i, k)` if `i < k` and their distance is within the limit.
    pub fn verify(&self, store: &RecordStore, i: RecordId, k: RecordId) -> Option<DuplicatePair> {
        if i >= k {
            return None;
        }
        let distance = store.fingerprint(i).hamming_distance(store.fingerprint(k));
        (distance <= self.distance_limit).then_some(DuplicatePair {
            distance,
            first: i,
            second: k,
        })
    }

    /// Query every record against its narrowest window in `index`.
    pub fn search(&self, store: &RecordStore, index: &LshIndex) -> SearchReport {
        debug_assert_eq!(index.record_count(), store.len());
        self.run(store.len(), |i, report| {
            let Some(window) = index.narrowest_window(i) else {
                return;
            };
            report.stats.candidates += window.len();
            for k in window.candidates().filter(|&k| k > i) {
                report.stats.verified += 1;
                report.pairs.extend(self.verify(store, i, k));
            }
        })
    }

    /// Compare every pair directly.
    pub fn search_exhaustive(&self, store: &RecordStore) -> SearchReport {
        let n = store.len();
        self.run(n, |i, report| {
            report.stats.candidates += n - 1;
            for k in i + 1..n {
                report.stats.verified += 1;
                report.pairs.extend(self.verify(store, i, k));
            }
        })
    }

    /// Runs `query` for every record id in parallel. Each worker fills its
    /// own report; reports are merged in id order.
    fn run<Q>(&self, n: usize, query: Q) -> SearchReport
    where
        Q: Fn(RecordId, &mut SearchReport) + Sync,
    {
        (0..n)
            .into_par_iter()
            .fold(SearchReport::default, |mut report, i| {
                if self.deadline.is_some_and(|d| Instant::now() >= d) {
                    report.stats.skipped += 1;
                } else {
                    report.stats.queries += 1;
                    query(i, &mut report);
                }
                report
            })
            .reduce(SearchReport::default, SearchReport::merge)
    }
}

/// Run the search `config` asks for, building the index if needed.
pub fn find_duplicates(
    store: &RecordStore,
    config: &SearchConfig,
    deadline: Option<Instant>,
) -> SearchReport {
    let mut finder = DuplicateFinder::from_config(config);
    if let Some(deadline) = deadline {
        finder = finder.with_deadline(deadline);
    }
    match config.strategy {
        SearchStrategy::Projections => {
            let index = LshIndex::build(store, config);
            finder.search(store, &index)
        }
        SearchStrategy::Exhaustive => finder.search_exhaustive(store),
    }
}
