pub mod cutmix;
pub mod dataloader;
pub mod dataset;
pub mod transforms;

pub use cutmix::{generate_mixed_sample, rand_bbox, should_mix, MixedBatch};
pub use dataloader::{ClassifyBatch, ClassifyDataLoader};
pub use dataset::{ClassifyDataset, FoldSplit, Sample};
pub use transforms::{resize_batch, DataAugmentation, MultiScaleSchedule};
