// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::ConnectionProfile;

/// Saved connection profiles, persisted as one pretty-printed JSON array.
///
/// The file is rewritten on every change while the write lock is held, and
/// memory is only updated once the write succeeded.
pub struct ProfileStore {
    path: PathBuf,
    profiles: RwLock<Vec<ConnectionProfile>>,
}

impl ProfileStore {
    /// Loads the store at `path`. A missing file is created empty; a file
    /// that does not parse is an error rather than silently reset.
    pub fn open(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let path = path.into();

        let profiles = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                EngineError::internal(format!("Failed to read {}: {}", path.display(), e))
            })?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    EngineError::internal(format!("Failed to parse {}: {}", path.display(), e))
                })?
            }
        } else {
            info!("Creating empty profile store at {:?}", path);
            write_profiles(&path, &[])?;
            Vec::new()
        };

        debug!(count = profiles.len(), "Profiles loaded");
        Ok(Self {
            path,
            profiles: RwLock::new(profiles),
        })
    }

    /// All profiles in insertion order.
    pub fn list(&self) -> Vec<ConnectionProfile> {
        self.profiles.read().clone()
    }

    pub fn get(&self, id: &str) -> EngineResult<ConnectionProfile> {
        self.profiles
            .read()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(id))
    }

    /// Inserts or replaces the profile with the same id. An update with an
    /// empty password keeps the stored one.
    pub fn save(&self, mut profile: ConnectionProfile) -> EngineResult<()> {
        if profile.id.trim().is_empty() {
            return Err(EngineError::validation("Profile id must not be empty"));
        }

        let mut profiles = self.profiles.write();
        let mut next = profiles.clone();
        match next.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => {
                if profile.password.is_empty() {
                    profile.password = std::mem::take(&mut existing.password);
                }
                *existing = profile;
            }
            None => next.push(profile),
        }

        write_profiles(&self.path, &next)?;
        *profiles = next;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> EngineResult<()> {
        let mut profiles = self.profiles.write();
        let Some(pos) = profiles.iter().position(|p| p.id == id) else {
            return Err(EngineError::not_found(id));
        };

        let mut next = profiles.clone();
        next.remove(pos);
        write_profiles(&self.path, &next)?;
        *profiles = next;
        Ok(())
    }
}

fn write_profiles(path: &Path, profiles: &[ConnectionProfile]) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            EngineError::internal(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }
    let content = serde_json::to_string_pretty(profiles)
        .map_err(|e| EngineError::internal(format!("Failed to serialize profiles: {}", e)))?;
    fs::write(path, content)
        .map_err(|e| EngineError::internal(format!("Failed to write {}: {}", path.display(), e)))
}
