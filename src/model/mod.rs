pub mod backbone;
pub mod blocks;
pub mod classifier;
pub mod loss;

pub use backbone::Backbone;
pub use classifier::{ClassifyOutput, FineGrainedClassifier};
pub use loss::ClassifyLoss;
