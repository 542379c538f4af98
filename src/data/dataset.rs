use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One labeled image on disk.
#[derive(Debug, Clone)]
pub struct Sample {
    pub path: PathBuf,
    pub label: usize,
}

/// Train/validation index split for one fold.
#[derive(Debug, Clone)]
pub struct FoldSplit {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
}

#[derive(Serialize, Deserialize)]
struct SplitManifest {
    folds: Vec<ManifestFold>,
    seed: Option<u64>,
}

#[derive(Serialize, Deserialize)]
struct ManifestFold {
    train: Vec<String>,
    val: Vec<String>,
}

/// Image-classification dataset rooted at a directory with one subdirectory
/// per class:
///
/// train_data/
/// ├── bottle/
/// │   ├── 0001.jpg
/// │   └── ...
/// ├── cardboard/
/// └── ...
#[derive(Debug, Clone)]
pub struct ClassifyDataset {
    samples: Vec<Sample>,
    class_names: Vec<String>,
}

impl ClassifyDataset {
    pub fn new(root: &Path, selected_labels: Option<&[String]>) -> Result<Self> {
        if !root.exists() {
            return Err(anyhow!("dataset root not found: {}", root.display()));
        }

        // Sorted class list gives stable label ids across runs.
        let mut class_dirs: BTreeMap<String, PathBuf> = BTreeMap::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    class_dirs.insert(name.to_string(), path);
                }
            }
        }

        if let Some(selected) = selected_labels {
            class_dirs.retain(|name, _| selected.iter().any(|s| s == name));
            if class_dirs.is_empty() {
                return Err(anyhow!("selected_labels matched no class directory"));
            }
        }

        let class_names: Vec<String> = class_dirs.keys().cloned().collect();
        let mut samples = Vec::new();
        for (label, (_, dir)) in class_dirs.iter().enumerate() {
            // Deterministic walk order keeps sample indices stable across runs.
            for entry in WalkDir::new(dir)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let is_image = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| matches!(e.to_lowercase().as_str(), "jpg" | "jpeg" | "png" | "bmp"))
                    .unwrap_or(false);
                if is_image {
                    samples.push(Sample {
                        path: path.to_path_buf(),
                        label,
                    });
                }
            }
        }

        if samples.is_empty() {
            return Err(anyhow!("no image samples found under {}", root.display()));
        }

        log::info!(
            "Loaded {} samples across {} classes from {}",
            samples.len(),
            class_names.len(),
            root.display()
        );

        Ok(Self {
            samples,
            class_names,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn sample(&self, idx: usize) -> Result<&Sample> {
        self.samples
            .get(idx)
            .ok_or_else(|| anyhow!("index {} out of bounds ({} samples)", idx, self.samples.len()))
    }

    /// Cross-validation splits. With `n_splits == 1` a single seeded holdout of
    /// `val_size` is produced; otherwise `n_splits` K-fold partitions where
    /// fold i validates on partition i and trains on the rest.
    pub fn fold_splits(&self, n_splits: usize, val_size: f32, seed: Option<u64>) -> Vec<FoldSplit> {
        let mut indices: Vec<usize> = (0..self.samples.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed.unwrap_or(42));
        indices.shuffle(&mut rng);

        if n_splits <= 1 {
            let val_len = ((self.samples.len() as f32) * val_size).round() as usize;
            let val_len = val_len.clamp(1, self.samples.len().saturating_sub(1).max(1));
            let (val, train) = indices.split_at(val_len);
            return vec![FoldSplit {
                train: train.to_vec(),
                val: val.to_vec(),
            }];
        }

        let mut folds = Vec::with_capacity(n_splits);
        for fold in 0..n_splits {
            let mut train = Vec::new();
            let mut val = Vec::new();
            for (i, &idx) in indices.iter().enumerate() {
                if i % n_splits == fold {
                    val.push(idx);
                } else {
                    train.push(idx);
                }
            }
            folds.push(FoldSplit { train, val });
        }
        folds
    }

    /// Splits with an optional on-disk manifest for repeatable experiments.
    /// When the manifest exists it wins; otherwise the computed split is saved
    /// there before being returned.
    pub fn fold_splits_with_manifest(
        &self,
        n_splits: usize,
        val_size: f32,
        seed: Option<u64>,
        manifest_path: Option<&Path>,
    ) -> Result<Vec<FoldSplit>> {
        if let Some(path) = manifest_path {
            if path.exists() {
                log::info!("Loading fold split from {}", path.display());
                return self.load_manifest(path);
            }
            let splits = self.fold_splits(n_splits, val_size, seed);
            self.save_manifest(path, &splits, seed)?;
            return Ok(splits);
        }
        Ok(self.fold_splits(n_splits, val_size, seed))
    }

    fn save_manifest(&self, path: &Path, splits: &[FoldSplit], seed: Option<u64>) -> Result<()> {
        let manifest = SplitManifest {
            folds: splits
                .iter()
                .map(|s| ManifestFold {
                    train: s.train.iter().map(|&i| self.path_key(i)).collect(),
                    val: s.val.iter().map(|&i| self.path_key(i)).collect(),
                })
                .collect(),
            seed,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&manifest)?)?;
        log::info!("Saved fold split manifest to {}", path.display());
        Ok(())
    }

    fn load_manifest(&self, path: &Path) -> Result<Vec<FoldSplit>> {
        let raw = std::fs::read_to_string(path)?;
        let manifest: SplitManifest = serde_json::from_str(&raw)?;
        let by_path: BTreeMap<String, usize> = self
            .samples
            .iter()
            .enumerate()
            .map(|(i, _)| (self.path_key(i), i))
            .collect();
        let resolve = |paths: &[String]| -> Result<Vec<usize>> {
            paths
                .iter()
                .map(|p| {
                    by_path
                        .get(p)
                        .copied()
                        .ok_or_else(|| anyhow!("manifest sample not in dataset: {}", p))
                })
                .collect()
        };
        manifest
            .folds
            .iter()
            .map(|f| {
                Ok(FoldSplit {
                    train: resolve(&f.train)?,
                    val: resolve(&f.val)?,
                })
            })
            .collect()
    }

    fn path_key(&self, idx: usize) -> String {
        self.samples[idx].path.display().to_string()
    }
}
