//! `reclink-linkage`: two-source record linkage engine.
//!
//! Pure engine crate: receives pre-loaded record stores and a ground truth,
//! returns candidate pairs, classifications and quality measures. The CSV
//! loader is the only IO-facing module and works on in-memory text.

pub mod blocking;
pub mod classify;
pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod keys;
pub mod loader;
pub mod model;
pub mod selection;
pub mod similarity;
pub mod trainable;

pub use config::LinkageConfig;
pub use engine::run;
pub use error::LinkageError;
pub use keys::BlockingKey;
pub use model::{GroundTruth, LinkageInput, LinkageResult, Record, RecordStore};
pub use similarity::{Comparator, SimilarityConfig};
pub use trainable::PairModel;
