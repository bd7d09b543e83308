mod observation;

pub use observation::{CoverageObservation, TIMESTAMP_FORMAT};
