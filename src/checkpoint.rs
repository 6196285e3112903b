//! Checkpoint file for the harvested accumulator
//!
//! The file is always a full snapshot: a pretty-printed JSON array of
//! `GameDto`. Saves go to a sibling temp file which is synced and renamed
//! over the target, so a crash mid-write leaves the previous snapshot intact.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::GameDto;

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Read the previous snapshot. A missing file is an empty accumulator.
    pub fn load(&self) -> Result<Vec<GameDto>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no checkpoint yet, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to open checkpoint {}", self.path.display()))
            }
        };

        let games: Vec<GameDto> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse checkpoint {}", self.path.display()))?;

        info!(
            path = %self.path.display(),
            records = games.len(),
            "📂 Loaded checkpoint"
        );
        Ok(games)
    }

    /// Overwrite the snapshot with the whole accumulator.
    pub fn save(&self, games: &[GameDto]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let temp_path = self.temp_path();
        let file = File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file {}", temp_path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, games).context("Failed to serialize games")?;
        writer.write_all(b"\n").context("Failed to write")?;
        let file = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .context("Failed to flush")?;
        file.sync_all().context("Failed to sync temp file")?;
        drop(file);

        // Rename is atomic on POSIX
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} -> {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        debug!(path = %self.path.display(), records = games.len(), "checkpoint written");
        Ok(())
    }
}
