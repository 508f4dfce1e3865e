//! Per-tip calibration persistence.
//!
//! Each tip is one TOML file named `<tip>.toml` in the store
//! directory, holding the three interpolation anchors and optionally
//! the controller gains tuned for that tip. Writes go through a
//! temp-file-and-rename step so a power loss mid-write never leaves a
//! half-written table behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{CalAnchor, PidCfg};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
struct AnchorToml {
    measured: f32,
    temperature_c: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct TipToml {
    anchors: Vec<AnchorToml>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pid: Option<PidCfg>,
}

/// A stored tip: anchors, plus gains when the tip has been tuned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TipRecord {
    pub anchors: [CalAnchor; 3],
    pub pid: Option<PidCfg>,
}

#[derive(Debug, Clone)]
pub struct TipStore {
    dir: PathBuf,
}

impl TipStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, tip: &str) -> eyre::Result<PathBuf> {
        if tip.is_empty()
            || !tip
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            eyre::bail!("invalid tip name {tip:?}");
        }
        Ok(self.dir.join(format!("{tip}.toml")))
    }

    /// Load a tip's record; `Ok(None)` when no table exists.
    pub fn load(&self, tip: &str) -> eyre::Result<Option<TipRecord>> {
        let path = self.path_for(tip)?;
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(eyre::eyre!("read tip table {:?}: {}", path, e)),
        };
        let parsed: TipToml =
            toml::from_str(&text).map_err(|e| eyre::eyre!("parse tip table {:?}: {}", path, e))?;
        if parsed.anchors.len() != 3 {
            eyre::bail!(
                "tip table {:?} must hold exactly 3 anchors, got {}",
                path,
                parsed.anchors.len()
            );
        }
        let a = &parsed.anchors;
        Ok(Some(TipRecord {
            anchors: [
                CalAnchor {
                    measured: a[0].measured,
                    temperature_c: a[0].temperature_c,
                },
                CalAnchor {
                    measured: a[1].measured,
                    temperature_c: a[1].temperature_c,
                },
                CalAnchor {
                    measured: a[2].measured,
                    temperature_c: a[2].temperature_c,
                },
            ],
            pid: parsed.pid,
        }))
    }

    /// Persist a tip's record, atomically replacing any previous table.
    pub fn save(&self, tip: &str, record: &TipRecord) -> eyre::Result<()> {
        let path = self.path_for(tip)?;
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| eyre::eyre!("create tip store {:?}: {}", self.dir, e))?;
        let doc = TipToml {
            anchors: record
                .anchors
                .iter()
                .map(|a| AnchorToml {
                    measured: a.measured,
                    temperature_c: a.temperature_c,
                })
                .collect(),
            pid: record.pid,
        };
        let text =
            toml::to_string_pretty(&doc).map_err(|e| eyre::eyre!("serialize tip table: {e}"))?;
        write_atomic(&path, text.as_bytes())
            .map_err(|e| eyre::eyre!("write tip table {:?}: {}", path, e))
    }

    /// Tips with a stored table, sorted by name.
    pub fn list(&self) -> eyre::Result<Vec<String>> {
        let mut tips = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(tips),
            Err(e) => return Err(eyre::eyre!("read tip store {:?}: {}", self.dir, e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| eyre::eyre!("read tip store entry: {e}"))?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "toml")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                tips.push(stem.to_string());
            }
        }
        tips.sort();
        Ok(tips)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(tmp, path)
}
