pub mod config;
pub mod core;
pub mod scanner;

pub use config::{ConfigError, SearchConfig, SearchStrategy};
pub use crate::core::{
    DuplicateFinder, DuplicatePair, Fingerprint, FingerprintRecord, LshIndex, Preprocessor,
    RecordStore, SearchReport, SrgbPreprocessor, find_duplicates,
};
