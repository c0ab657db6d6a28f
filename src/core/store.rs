use rayon::prelude::*;
use std::path::{Path, PathBuf};

use super::hash::{Fingerprint, FingerprintRecord};
use super::image::{PreprocessError, Preprocessor};

/// Index of a record in its [`RecordStore`].
pub type RecordId = usize;

/// Append-only list of fingerprint records. A record's id is its position
/// and never changes.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<FingerprintRecord>,
}

/// What happened to one input of [`RecordStore::extract_all`].
#[derive(Debug)]
pub struct ExtractOutcome {
    pub path: PathBuf,
    pub result: Result<Extracted, PreprocessError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extracted {
    pub record_id: RecordId,
    pub width: u32,
    pub height: u32,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: FingerprintRecord) -> RecordId {
        self.records.push(record);
        self.records.len() - 1
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&FingerprintRecord> {
        self.records.get(id)
    }

    pub fn name(&self, id: RecordId) -> &str {
        &self.records[id].name
    }

    pub fn fingerprint(&self, id: RecordId) -> &Fingerprint {
        &self.records[id].fingerprint
    }

    pub fn iter(&self) -> impl Iterator<Item = &FingerprintRecord> {
        self.records.iter()
    }

    /// Fingerprint every path in parallel and append the successes in input
    /// order, so ids follow the order of `paths` with failures left out.
    ///
    /// `on_progress` is called from worker threads once per finished path.
    pub fn extract_all<P, F>(
        &mut self,
        paths: &[PathBuf],
        preprocessor: &P,
        on_progress: F,
    ) -> Vec<ExtractOutcome>
    where
        P: Preprocessor + ?Sized,
        F: Fn(&Path) + Sync,
    {
        let fingerprinted: Vec<_> = paths
            .par_iter()
            .map(|path| {
                let result = preprocessor.preprocess(path).map(|rasters| {
                    (
                        Fingerprint::from_rasters(&rasters),
                        rasters.width,
                        rasters.height,
                    )
                });
                on_progress(path);
                result
            })
            .collect();

        paths
            .iter()
            .zip(fingerprinted)
            .map(|(path, result)| {
                let result = result.map(|(fingerprint, width, height)| {
                    let name = path.to_string_lossy().into_owned();
                    log::debug!("{} {}", fingerprint, name);
                    let record_id = self.push(FingerprintRecord::new(name, fingerprint));
                    Extracted {
                        record_id,
                        width,
                        height,
                    }
                });
                if let Err(e) = &result {
                    log::warn!("Skipping {}: {}", path.display(), e);
                }
                ExtractOutcome {
                    path: path.clone(),
                    result,
                }
            })
            .collect()
    }
}

impl FromIterator<FingerprintRecord> for RecordStore {
    fn from_iter<I: IntoIterator<Item = FingerprintRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::{COARSE_SIZE, FINE_SIZE, Rasters};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails on names containing "bad", otherwise fills both rasters with
    /// the name's length.
    struct FakePreprocessor;

    impl Preprocessor for FakePreprocessor {
        fn preprocess(&self, path: &Path) -> Result<Rasters, PreprocessError> {
            let name = path.to_string_lossy();
            if name.contains("bad") {
                return Err(PreprocessError::Empty {
                    path: name.into_owned(),
                });
            }
            let v = name.len() as u8;
            Ok(Rasters {
                width: v as u32,
                height: 1,
                fine: [[v; FINE_SIZE]; FINE_SIZE],
                coarse: [[v; COARSE_SIZE]; COARSE_SIZE],
            })
        }
    }

    #[test]
    fn test_push_assigns_dense_ids() {
        let mut store = RecordStore::new();
        assert!(store.is_empty());
        let a = store.push(FingerprintRecord::new("a", Fingerprint::new([1, 2, 3])));
        let b = store.push(FingerprintRecord::new("b", Fingerprint::new([4, 5, 6])));
        assert_eq!((a, b), (0, 1));
        assert_eq!(store.len(), 2);
        assert_eq!(store.name(1), "b");
        assert_eq!(store.fingerprint(0).words(), &[1, 2, 3]);
        assert!(store.get(2).is_none());
    }

    #[test]
    fn test_extract_all_skips_failures_and_keeps_order() {
        let paths: Vec<PathBuf> = ["one.png", "bad.png", "three.png", "also-bad.jpg", "five.png"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let progress = AtomicUsize::new(0);

        let mut store = RecordStore::new();
        let outcomes = store.extract_all(&paths, &FakePreprocessor, |_| {
            progress.fetch_add(1, Ordering::Relaxed);
        });

        assert_eq!(progress.load(Ordering::Relaxed), 5);
        assert_eq!(outcomes.len(), 5);
        assert_eq!(store.len(), 3);

        let names: Vec<&str> = store.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["one.png", "three.png", "five.png"]);

        let ids: Vec<Option<RecordId>> = outcomes
            .iter()
            .map(|o| o.result.as_ref().ok().map(|e| e.record_id))
            .collect();
        assert_eq!(ids, [Some(0), None, Some(1), None, Some(2)]);
        assert_eq!(outcomes[2].result.as_ref().unwrap().width, "three.png".len() as u32);
        assert_eq!(outcomes[1].path, PathBuf::from("bad.png"));
    }

    #[test]
    fn test_extract_appends_after_existing_records() {
        let mut store = RecordStore::new();
        store.push(FingerprintRecord::new("seed", Fingerprint::new([0, 0, 0])));
        let outcomes = store.extract_all(&[PathBuf::from("next.png")], &FakePreprocessor, |_| {});
        assert_eq!(outcomes[0].result.as_ref().unwrap().record_id, 1);
        assert_eq!(store.name(1), "next.png");
    }
}
