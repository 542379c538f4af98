pub mod config;
pub mod data;
pub mod model;
pub mod training;

pub use config::TrainConfig;
pub use model::FineGrainedClassifier;
pub use training::TrainVal;
