use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Backbone family for the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Resnet18,
    Resnet34,
    Resnet50,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Resnet18 => "resnet18",
            ModelKind::Resnet34 => "resnet34",
            ModelKind::Resnet50 => "resnet50",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Adam,
    AdamW,
    Sgd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    StepLr,
    MultiStepLr,
    CosineLr,
    ReduceLr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    CrossEntropy,
    SmoothCrossEntropy,
    Focal,
}

/// Flat training configuration. Built once at startup and passed by reference
/// into every component that needs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    // Dataset
    pub dataset_root: String,
    pub image_size: usize,
    pub batch_size: usize,
    pub n_splits: usize,
    pub val_size: f32,
    pub selected_folds: Vec<usize>,
    pub selected_labels: Option<Vec<String>>,
    pub load_split_from_file: Option<PathBuf>,

    // Augmentation
    pub augmentation_flag: bool,
    pub erase_prob: f32,
    pub gray_prob: f32,

    // CutMix
    pub cut_mix: bool,
    pub beta: f32,
    pub cutmix_prob: f32,

    // Multi-scale
    pub multi_scale: bool,
    pub val_multi_scale: bool,
    pub multi_scale_size: Vec<usize>,
    pub multi_scale_interval: usize,

    // Sparsity / L1 regularization
    pub sparsity: bool,
    pub sparsity_scale: f32,
    pub l1_regular: bool,
    pub l1_decay: f32,

    // Model
    pub model_type: ModelKind,
    pub num_classes: usize,
    pub drop_rate: f64,
    pub fine_grained_weight: f32,
    pub weight_path: Option<PathBuf>,

    // Optimization
    pub optimizer: OptimizerKind,
    pub lr: f64,
    pub weight_decay: f32,
    pub momentum: f64,
    pub loss_name: LossKind,
    pub epoch: usize,
    pub seed: Option<u64>,

    // Learning-rate schedule
    pub lr_scheduler: SchedulerKind,
    pub lr_step_size: usize,
    pub lr_gamma: f64,
    pub restart_step: usize,
    pub multi_step: Vec<usize>,
    pub plateau_patience: usize,
    pub plateau_factor: f64,

    // Checkpointing
    pub save_path: String,
    pub save_interval: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset_root: "data/train_data".to_string(),
            image_size: 416,
            batch_size: 24,
            n_splits: 5,
            val_size: 0.2,
            selected_folds: vec![0],
            selected_labels: None,
            load_split_from_file: None,
            augmentation_flag: true,
            erase_prob: 0.0,
            gray_prob: 0.3,
            cut_mix: true,
            beta: 1.0,
            cutmix_prob: 0.5,
            multi_scale: true,
            val_multi_scale: true,
            multi_scale_size: vec![256, 288, 320, 352, 384, 416],
            multi_scale_interval: 10,
            sparsity: false,
            sparsity_scale: 1e-2,
            l1_regular: false,
            l1_decay: 1e-4,
            model_type: ModelKind::Resnet34,
            num_classes: 54,
            drop_rate: 0.0,
            fine_grained_weight: 0.4,
            weight_path: None,
            optimizer: OptimizerKind::Adam,
            lr: 3e-4,
            weight_decay: 0.0,
            momentum: 0.9,
            loss_name: LossKind::SmoothCrossEntropy,
            epoch: 50,
            seed: None,
            lr_scheduler: SchedulerKind::StepLr,
            lr_step_size: 20,
            lr_gamma: 0.1,
            restart_step: 80,
            multi_step: vec![20, 35, 45],
            plateau_patience: 4,
            plateau_factor: 0.3,
            save_path: "checkpoints".to_string(),
            save_interval: 10,
        }
    }
}

impl TrainConfig {
    pub fn from_yaml(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TrainConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrips_through_yaml() {
        let config = TrainConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: TrainConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.num_classes, config.num_classes);
        assert_eq!(parsed.multi_scale_size, config.multi_scale_size);
        assert_eq!(parsed.model_type, ModelKind::Resnet34);
        assert_eq!(parsed.lr_scheduler, SchedulerKind::StepLr);
    }

    #[test]
    fn enums_use_snake_case_tags() {
        let yaml = "resnet50";
        let kind: ModelKind = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(kind, ModelKind::Resnet50);
        let kind: SchedulerKind = serde_yaml::from_str("reduce_lr").unwrap();
        assert_eq!(kind, SchedulerKind::ReduceLr);
    }
}
