use anyhow::{bail, Context, Result};
use burn::module::Module;
use burn::prelude::*;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Sidecar metadata written next to the best checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub best_score: f32,
}

/// Writes model checkpoints under `{save_path}/{model_name}/`.
///
/// Three kinds of file are produced: the rolling per-fold checkpoint
/// (`{model}_fold{f}.bin`, overwritten every epoch), interval snapshots
/// (`{model}_epoch{e}_fold{f}.bin`) and the shared best model
/// (`model_best.bin` with a JSON sidecar).
pub struct Checkpointer {
    dir: PathBuf,
    model_name: String,
    fold: usize,
    save_interval: usize,
}

/// An interval snapshot is due on exact multiples of the interval.
pub fn is_interval_epoch(save_interval: usize, epoch: usize) -> bool {
    save_interval > 0 && epoch > 0 && epoch % save_interval == 0
}

impl Checkpointer {
    pub fn new(
        save_path: &Path,
        model_name: &str,
        fold: usize,
        save_interval: usize,
    ) -> Result<Self> {
        let dir = save_path.join(model_name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("create checkpoint dir {}", dir.display()))?;
        Ok(Self {
            dir,
            model_name: model_name.to_string(),
            fold,
            save_interval,
        })
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}_fold{}.bin", self.model_name, self.fold))
    }

    pub fn interval_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!(
            "{}_epoch{}_fold{}.bin",
            self.model_name, epoch, self.fold
        ))
    }

    pub fn best_path(&self) -> PathBuf {
        self.dir.join("model_best.bin")
    }

    /// Rolling checkpoint, overwritten at the end of every epoch, with a
    /// sidecar recording where the run stood when it was written.
    pub fn save_latest<B: Backend, M: Module<B>>(
        &self,
        model: M,
        epoch: usize,
        best_score: f32,
    ) -> Result<()> {
        self.save(model, self.latest_path())?;
        self.write_meta(
            &self
                .dir
                .join(format!("{}_fold{}.json", self.model_name, self.fold)),
            epoch,
            best_score,
        )
    }

    /// Interval snapshot; a no-op unless the epoch lands on the interval.
    pub fn maybe_save_interval<B: Backend, M: Module<B>>(
        &self,
        model: M,
        epoch: usize,
    ) -> Result<bool> {
        if !is_interval_epoch(self.save_interval, epoch) {
            return Ok(false);
        }
        self.save(model, self.interval_path(epoch))?;
        Ok(true)
    }

    /// Best model plus its metadata sidecar.
    pub fn save_best<B: Backend, M: Module<B>>(
        &self,
        model: M,
        epoch: usize,
        best_score: f32,
    ) -> Result<()> {
        self.save(model, self.best_path())?;
        self.write_meta(&self.dir.join("model_best.json"), epoch, best_score)
    }

    fn write_meta(&self, path: &Path, epoch: usize, best_score: f32) -> Result<()> {
        let meta = CheckpointMeta { epoch, best_score };
        let json = serde_json::to_string_pretty(&meta)?;
        fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Copies the best checkpoint into a backup subdirectory so later folds
    /// cannot clobber it silently. A session that never produced a best
    /// checkpoint is a failed run, not a quiet success.
    pub fn backup_best(&self) -> Result<()> {
        let best = self.best_path();
        if !best.exists() {
            bail!("no best checkpoint to back up: {} is missing", best.display());
        }
        let backup_dir = self.dir.join("backup");
        fs::create_dir_all(&backup_dir)
            .with_context(|| format!("create backup dir {}", backup_dir.display()))?;
        fs::copy(&best, backup_dir.join("model_best.bin"))
            .with_context(|| format!("backup {}", best.display()))?;
        Ok(())
    }

    fn save<B: Backend, M: Module<B>>(&self, model: M, path: PathBuf) -> Result<()> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model
            .save_file(&path, &recorder)
            .with_context(|| format!("save checkpoint {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_epochs_are_exact_multiples() {
        let hits: Vec<usize> = (1..=25).filter(|&e| is_interval_epoch(10, e)).collect();
        assert_eq!(hits, vec![10, 20]);
    }

    #[test]
    fn zero_interval_disables_snapshots() {
        assert!((1..=50).all(|e| !is_interval_epoch(0, e)));
    }

    #[test]
    fn paths_encode_model_fold_and_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path(), "resnet34", 2, 10).unwrap();
        assert!(ckpt.latest_path().ends_with("resnet34/resnet34_fold2.bin"));
        assert!(ckpt
            .interval_path(20)
            .ends_with("resnet34/resnet34_epoch20_fold2.bin"));
        assert!(ckpt.best_path().ends_with("resnet34/model_best.bin"));
    }

    #[test]
    fn backup_without_best_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path(), "resnet18", 0, 10).unwrap();
        let err = ckpt.backup_best().unwrap_err();
        assert!(err.to_string().contains("model_best.bin"));
        assert!(!dir.path().join("resnet18/backup/model_best.bin").exists());
    }

    #[test]
    fn backup_copies_the_best_file() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path(), "resnet18", 0, 10).unwrap();
        std::fs::write(ckpt.best_path(), b"weights").unwrap();
        ckpt.backup_best().unwrap();
        let copied = std::fs::read(dir.path().join("resnet18/backup/model_best.bin")).unwrap();
        assert_eq!(copied, b"weights");
    }
}
