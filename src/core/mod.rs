// Fingerprinting and near-duplicate search engine.
//
// Pipeline: image -> fingerprint -> record store -> projection index ->
// duplicate pairs. Each stage is fully built before the next one reads it.

pub mod dct;
pub mod duplicate;
pub mod hash;
pub mod image;
pub mod index;
pub mod rng;
pub mod store;

pub use duplicate::{DuplicateFinder, DuplicatePair, SearchReport, SearchStats, find_duplicates};
pub use hash::{Fingerprint, FingerprintRecord};
pub use self::image::{PreprocessError, Preprocessor, Rasters, SrgbPreprocessor};
pub use index::LshIndex;
pub use store::{ExtractOutcome, Extracted, RecordId, RecordStore};
