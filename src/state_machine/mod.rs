mod batch;
mod feature;
mod state;

pub use batch::{Batch, BatchStatus};
pub use feature::{Feature, FeatureOutcome, FeatureStatus};
pub use state::{BatchMachine, Transition};
