// Random-projection index over a `RecordStore`.
//
// Each projection maps a fingerprint's 192 bits to one scalar, the sum of
// Gaussian weights at its set bits, and keeps the records sorted by that
// scalar. Fingerprints a few bits apart land close together, so a window
// around a record's value holds its near neighbours with high probability.

use rayon::prelude::*;
use std::ops::Range;

use super::hash::Fingerprint;
use super::rng::{GOLDEN_GAMMA, Xoshiro256StarStar};
use super::store::{RecordId, RecordStore};
use crate::config::SearchConfig;

pub type Weights = [f32; Fingerprint::BITS];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedRecord {
    pub record_id: RecordId,
    pub value: f32,
}

/// One ordering of every record by projected value.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    sorted: Vec<ProjectedRecord>,
    /// `sorted[position_of[id]].record_id == id`
    position_of: Vec<usize>,
}

impl Projection {
    pub fn build(store: &RecordStore, weights: &Weights) -> Self {
        let mut sorted: Vec<ProjectedRecord> = store
            .iter()
            .enumerate()
            .map(|(record_id, record)| ProjectedRecord {
                record_id,
                value: project(&record.fingerprint, weights),
            })
            .collect();
        sorted.sort_by(|a, b| {
            a.value
                .total_cmp(&b.value)
                .then(a.record_id.cmp(&b.record_id))
        });

        let mut position_of = vec![0; sorted.len()];
        for (position, entry) in sorted.iter().enumerate() {
            position_of[entry.record_id] = position;
        }

        Self {
            sorted,
            position_of,
        }
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn entries(&self) -> &[ProjectedRecord] {
        &self.sorted
    }

    pub fn position_of(&self, id: RecordId) -> usize {
        self.position_of[id]
    }

    pub fn value_of(&self, id: RecordId) -> f32 {
        self.sorted[self.position_of[id]].value
    }

    /// Positions whose value lies in `[center - radius, center + radius)`.
    pub fn window(&self, center: f32, radius: f32) -> Range<usize> {
        let lo = center - radius;
        let hi = center + radius;
        let start = self.sorted.partition_point(|e| e.value < lo);
        let end = self.sorted.partition_point(|e| e.value < hi);
        start..end
    }
}

/// Sum of `weights[bit]` over the set bits of `fingerprint`, in bit order.
pub fn project(fingerprint: &Fingerprint, weights: &Weights) -> f32 {
    let mut value = 0.0f32;
    for (w, &word) in fingerprint.words().iter().enumerate() {
        let mut bits = word;
        while bits != 0 {
            let bit = bits.trailing_zeros() as usize;
            value += weights[w * 64 + bit];
            bits &= bits - 1;
        }
    }
    value
}

/// Gaussian weights of projection `projection_id`.
///
/// Projection `p` draws from its own generator seeded with
/// `seed + p * GOLDEN_GAMMA`, so projections can be built in any order.
pub fn projection_weights(seed: u64, projection_id: usize) -> Weights {
    let stream = seed.wrapping_add((projection_id as u64).wrapping_mul(GOLDEN_GAMMA));
    let mut rng = Xoshiro256StarStar::seed_from_u64(stream);
    let mut weights = [0.0f32; Fingerprint::BITS];
    for w in weights.iter_mut() {
        *w = rng.next_normal() as f32;
    }
    weights
}

/// The narrowest window found for one query record.
#[derive(Debug, Clone)]
pub struct CandidateWindow<'a> {
    pub projection_id: usize,
    /// Position of the query record inside `entries`' projection.
    pub query_position: usize,
    pub range: Range<usize>,
    pub entries: &'a [ProjectedRecord],
}

impl CandidateWindow<'_> {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Records in the window other than the query itself.
    pub fn candidates(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.range
            .clone()
            .filter(move |&pos| pos != self.query_position)
            .map(move |pos| self.entries[pos].record_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LshIndex {
    projections: Vec<Projection>,
    radius: f32,
}

impl LshIndex {
    /// Build `config.projections` projections over the whole store, in
    /// parallel. The result depends only on the seed and the store contents.
    pub fn build(store: &RecordStore, config: &SearchConfig) -> Self {
        let projections = (0..config.projections)
            .into_par_iter()
            .map(|p| Projection::build(store, &projection_weights(config.seed, p)))
            .collect();
        Self {
            projections,
            radius: config.window_radius(),
        }
    }

    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn record_count(&self) -> usize {
        self.projections.first().map_or(0, Projection::len)
    }

    /// Across all projections, the window around `id` holding the fewest
    /// records. Ties go to the lowest projection id.
    pub fn narrowest_window(&self, id: RecordId) -> Option<CandidateWindow<'_>> {
        let mut best: Option<(usize, usize, Range<usize>)> = None;
        for (projection_id, projection) in self.projections.iter().enumerate() {
            let position = projection.position_of(id);
            let range = projection.window(projection.entries()[position].value, self.radius);
            if best.as_ref().is_none_or(|(_, _, b)| range.len() < b.len()) {
                best = Some((projection_id, position, range));
            }
        }

        best.map(|(projection_id, query_position, range)| CandidateWindow {
            projection_id,
            query_position,
            range,
            entries: self.projections[projection_id].entries(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::FingerprintRecord;

    fn random_store(n: usize, seed: u64) -> RecordStore {
        let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                let fp = Fingerprint::new([rng.next_u64(), rng.next_u64(), rng.next_u64()]);
                FingerprintRecord::new(format!("img{i}.jpg"), fp)
            })
            .collect()
    }

    fn small_config(projections: usize) -> SearchConfig {
        SearchConfig {
            projections,
            ..Default::default()
        }
    }

    #[test]
    fn test_project_sums_set_bits() {
        let mut weights = [0.0f32; Fingerprint::BITS];
        weights[0] = 1.5;
        weights[65] = -2.0;
        weights[191] = 0.25;
        weights[3] = 100.0;

        let fp = Fingerprint::new([1, 1 << 1, 1 << 63]);
        assert_eq!(project(&fp, &weights), -0.25);
        assert_eq!(project(&Fingerprint::new([0, 0, 0]), &weights), 0.0);
    }

    #[test]
    fn test_weights_are_reproducible_and_distinct() {
        assert_eq!(projection_weights(10, 0), projection_weights(10, 0));
        assert_eq!(projection_weights(10, 299), projection_weights(10, 299));
        assert_ne!(projection_weights(10, 0), projection_weights(10, 1));
        assert_ne!(projection_weights(10, 0), projection_weights(11, 0));
    }

    #[test]
    fn test_projection_is_sorted_permutation() {
        let store = random_store(500, 3);
        let index = LshIndex::build(&store, &small_config(8));
        assert_eq!(index.projections().len(), 8);
        assert_eq!(index.record_count(), 500);

        for projection in index.projections() {
            let entries = projection.entries();
            assert!(entries.windows(2).all(|w| w[0].value <= w[1].value));

            let mut ids: Vec<RecordId> = entries.iter().map(|e| e.record_id).collect();
            ids.sort_unstable();
            assert_eq!(ids, (0..500).collect::<Vec<_>>());

            for id in 0..500 {
                assert_eq!(entries[projection.position_of(id)].record_id, id);
            }
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let store = random_store(300, 9);
        let a = LshIndex::build(&store, &small_config(16));
        let b = LshIndex::build(&store, &small_config(16));
        assert_eq!(a, b);

        let other_seed = SearchConfig {
            seed: 11,
            ..small_config(16)
        };
        assert_ne!(a, LshIndex::build(&store, &other_seed));
    }

    #[test]
    fn test_window_is_half_open() {
        let store: RecordStore = (0..5)
            .map(|i| FingerprintRecord::new(format!("{i}"), Fingerprint::new([i, 0, 0])))
            .collect();
        // Word 0 holds i, so with these weights record i projects to i.
        let mut weights = [0.0f32; Fingerprint::BITS];
        weights[0] = 1.0;
        weights[1] = 2.0;
        weights[2] = 4.0;
        let projection = Projection::build(&store, &weights);

        assert_eq!(projection.window(2.0, 1.0), 1..3);
        assert_eq!(projection.window(2.0, 2.0), 0..4);
        assert_eq!(projection.window(100.0, 1.0), 5..5);
        assert_eq!(projection.value_of(4), 4.0);
    }

    #[test]
    fn test_narrowest_window_contains_query_and_identical_records() {
        let mut store = random_store(200, 5);
        let copy = *store.fingerprint(17);
        let copy_id = store.push(FingerprintRecord::new("copy.jpg", copy));

        let index = LshIndex::build(&store, &small_config(32));
        let window = index.narrowest_window(17).unwrap();
        assert!(window.range.contains(&window.query_position));
        assert_eq!(window.entries[window.query_position].record_id, 17);

        let candidates: Vec<RecordId> = window.candidates().collect();
        assert!(!candidates.contains(&17));
        assert!(candidates.contains(&copy_id));
        assert_eq!(candidates.len(), window.len() - 1);
    }

    #[test]
    fn test_narrowest_window_is_minimal() {
        let store = random_store(400, 8);
        let index = LshIndex::build(&store, &small_config(20));
        for id in [0, 99, 399] {
            let window = index.narrowest_window(id).unwrap();
            for projection in index.projections() {
                let own = projection.window(projection.value_of(id), index.radius());
                assert!(window.len() <= own.len());
            }
        }
    }

    #[test]
    fn test_empty_store() {
        let index = LshIndex::build(&RecordStore::new(), &small_config(4));
        assert_eq!(index.record_count(), 0);
        assert!(index.projections().iter().all(Projection::is_empty));
    }
}
