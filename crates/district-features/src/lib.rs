//! Feature processing for district models.
//!
//! This crate turns raw quarterly district records into model inputs:
//!
//! - [`fields`]: column catalogs and tolerant numeric parsing
//! - [`quarter`]: `"YYYYQ"` quarter codes
//! - [`extractor`]: static vectors and per-quarter time-series rows
//! - [`scaler`]: per-feature standardization with JSON persistence
//! - [`dataset`]: indexable datasets and padded sequence collation
//!
//! # Example
//!
//! ```
//! use district_features::prelude::*;
//! use district_layers::Tensor;
//!
//! let extractor = FeatureExtractor::new();
//! let codes = vec!["3110008".to_string(), "3110009".to_string()];
//! let x = extractor.extract_batch_static(
//!     &codes,
//!     QuarterRecords::default(),
//!     &StaticContext::default(),
//!     None,
//! );
//! assert_eq!(x.shape(), &[2, NUM_STATIC_FEATURES]);
//!
//! let mut scaler = FeatureScaler::new();
//! let z = scaler.fit_transform(&x).unwrap();
//! let ds = StaticDataset::new(z, Tensor::zeros(&[2, 3])).unwrap();
//! assert_eq!(ds.len(), 2);
//! ```

#![warn(missing_docs)]

pub mod dataset;
pub mod error;
pub mod extractor;
pub mod fields;
pub mod quarter;
pub mod scaler;

pub use dataset::{
    collate_padded, Batch, Dataset, PaddedBatch, PaddedSequences, PairDataset, PairInput,
    ScoreDataset, SequenceDataset, StaticDataset,
};
pub use error::{FeatureError, FeatureResult};
pub use extractor::{FeatureExtractor, QuarterRecords, StaticContext};
pub use fields::{
    RawRecord, RecordsByQuarter, CATEGORY_CODES, NUM_CATEGORIES, NUM_STATIC_FEATURES,
    NUM_TIMESERIES_FEATURES, OUTPUT_STEPS, SALES_TIME_RANGE,
};
pub use scaler::FeatureScaler;

/// Common imports.
pub mod prelude {
    pub use crate::dataset::{Batch, Dataset, PaddedSequences, PairInput};
    pub use crate::dataset::{PairDataset, ScoreDataset, SequenceDataset, StaticDataset};
    pub use crate::error::{FeatureError, FeatureResult};
    pub use crate::extractor::{FeatureExtractor, QuarterRecords, StaticContext};
    pub use crate::fields::{RawRecord, RecordsByQuarter};
    pub use crate::fields::{NUM_STATIC_FEATURES, NUM_TIMESERIES_FEATURES, OUTPUT_STEPS};
    pub use crate::scaler::FeatureScaler;
}
