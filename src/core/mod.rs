//! Core data types and I/O operations.

pub mod loaders;
pub mod transforms;
pub mod writers;

pub use loaders::{LapRecord, LapTable, LoaderError, TrackData};
pub use writers::{write_assignments_csv, write_profiles_csv, write_similarity_csv, WriteError};
