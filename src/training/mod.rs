pub mod checkpoint;
pub mod logging;
pub mod metrics;
pub mod scheduler;
pub mod state;
pub mod trainer;

pub use checkpoint::{CheckpointMeta, Checkpointer};
pub use logging::RunLogger;
pub use metrics::ClassificationMetric;
pub use scheduler::LrSchedule;
pub use state::{BestTracker, EpochStats};
pub use trainer::{ClassifyOptimizer, TrainVal, ValidationOutcome};
