//! `aurum-resolve` — Entity resolution and golden-record engine.
//!
//! Pure engine crate: receives pre-loaded records for one tenant and one
//! entity type, decides which describe the same real-world entity, and
//! fuses duplicate clusters into golden records with a full conflict log.
//! No persistence or network dependencies; all outputs are new immutable
//! values.

pub mod blocking;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod quality;
pub mod scorer;
pub mod similarity;

pub use config::ResolveConfig;
pub use engine::{load_csv_records, remerge, run, run_with, CancelToken, RunOptions};
pub use error::ResolveError;
pub use model::{
    EntityRecord, FieldValue, GoldenRecord, MatchDecision, MatchResult, ResolutionOutcome,
};
