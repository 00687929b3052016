//! Static tower and troop balance tables, loaded once at startup.

use serde::Deserialize;
use std::path::Path;
use tcr_shared::{TowerSpec, TroopSpec, TOWER_NAMES};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to read spec file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse spec file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("spec file is missing tower {0}")]
    MissingTower(&'static str),
    #[error("spec file defines no troops")]
    NoTroops,
}

#[derive(Debug, Deserialize)]
struct SpecFile {
    towers: Vec<TowerSpec>,
    troops: Vec<TroopSpec>,
}

/// Read-only balance data shared by every match.
#[derive(Debug, Clone)]
pub struct SpecStore {
    towers: Vec<TowerSpec>,
    troops: Vec<TroopSpec>,
}

impl SpecStore {
    pub fn load(path: &Path) -> Result<Self, SpecError> {
        let data = std::fs::read_to_string(path).map_err(|source| SpecError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&data)
    }

    pub fn from_json(json: &str) -> Result<Self, SpecError> {
        let file: SpecFile = serde_json::from_str(json)?;
        Self::new(file.towers, file.troops)
    }

    /// Builds a store, checking that every tower a match needs is present.
    pub fn new(towers: Vec<TowerSpec>, troops: Vec<TroopSpec>) -> Result<Self, SpecError> {
        for name in TOWER_NAMES {
            if !towers.iter().any(|t| t.name == name) {
                return Err(SpecError::MissingTower(name));
            }
        }
        if troops.is_empty() {
            return Err(SpecError::NoTroops);
        }
        Ok(Self { towers, troops })
    }

    pub fn towers(&self) -> &[TowerSpec] {
        &self.towers
    }

    pub fn troops(&self) -> &[TroopSpec] {
        &self.troops
    }

    pub fn tower(&self, name: &str) -> Option<&TowerSpec> {
        self.towers.iter().find(|t| t.name == name)
    }

    pub fn troop(&self, name: &str) -> Option<&TroopSpec> {
        self.troops.iter().find(|t| t.name == name)
    }

    /// Chance that the named tower lands a critical counter-attack.
    pub fn crit_chance(&self, tower: &str) -> f64 {
        self.tower(tower).map(|t| t.crit).unwrap_or(0.0)
    }
}
