use crate::config::TrainConfig;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct ScalarRecord<'a> {
    tag: &'a str,
    step: usize,
    value: f32,
}

#[derive(Serialize)]
struct SeedRecord {
    seed: u64,
}

/// Per-run log directory: `{save_path}/{model}/log-{timestamp}` holding the
/// resolved config, the RNG seed and an append-only JSONL scalar stream.
pub struct RunLogger {
    dir: PathBuf,
    scalars: File,
}

impl RunLogger {
    pub fn new(config: &TrainConfig, seed: u64) -> Result<Self> {
        let stamp = chrono::Local::now().format("%Y-%m-%dT%H-%M-%S");
        let dir = Path::new(&config.save_path)
            .join(config.model_type.name())
            .join(format!("log-{stamp}"));
        Self::create(dir, config, seed)
    }

    fn create(dir: PathBuf, config: &TrainConfig, seed: u64) -> Result<Self> {
        fs::create_dir_all(&dir).with_context(|| format!("create log dir {}", dir.display()))?;

        let config_path = dir.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(config)?)
            .with_context(|| format!("write {}", config_path.display()))?;

        let seed_path = dir.join("seed.json");
        fs::write(&seed_path, serde_json::to_string(&SeedRecord { seed })?)
            .with_context(|| format!("write {}", seed_path.display()))?;

        let scalars = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("scalars.jsonl"))
            .context("open scalars.jsonl")?;

        Ok(Self { dir, scalars })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends one scalar record. Write failures are logged, not fatal;
    /// training should never die on a metrics line.
    pub fn scalar(&mut self, tag: &str, step: usize, value: f32) {
        let record = ScalarRecord { tag, step, value };
        match serde_json::to_string(&record) {
            Ok(line) => {
                if let Err(err) = writeln!(self.scalars, "{line}") {
                    log::warn!("failed to append scalar {tag}: {err}");
                }
            }
            Err(err) => log::warn!("failed to encode scalar {tag}: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> TrainConfig {
        TrainConfig {
            save_path: dir.to_string_lossy().into_owned(),
            ..TrainConfig::default()
        }
    }

    #[test]
    fn run_dir_holds_config_and_seed() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = RunLogger::new(&config_in(tmp.path()), 42).unwrap();
        assert!(logger.dir().join("config.json").exists());
        let seed = std::fs::read_to_string(logger.dir().join("seed.json")).unwrap();
        assert!(seed.contains("42"));
    }

    #[test]
    fn scalars_append_as_jsonl() {
        let tmp = tempfile::tempdir().unwrap();
        let mut logger = RunLogger::new(&config_in(tmp.path()), 7).unwrap();
        logger.scalar("TrainLossEpoch", 1, 0.5);
        logger.scalar("ValAccEpoch", 1, 0.9);
        let body = std::fs::read_to_string(logger.dir().join("scalars.jsonl")).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("TrainLossEpoch"));
        assert!(lines[1].contains("ValAccEpoch"));
    }
}
