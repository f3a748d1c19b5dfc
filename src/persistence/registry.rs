//! Channel Registry
//!
//! Persists which platform channel displays which stat role, so channels are
//! created once and reused across restarts.
//! - Backed by a single JSON file keyed by role key
//! - Writes go through a temporary file and an atomic rename
//! - A corrupt file is moved aside and replaced by an empty registry

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::domain::StatRole;
use crate::error::{Result, StatBotError};

/// A stat role bound to the channel that displays it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBinding {
    pub role: StatRole,
    pub channel_id: String,
    pub last_label: String,
}

/// On-disk value; older files stored only the channel id
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredBinding {
    Full {
        channel_id: String,
        #[serde(default)]
        last_label: String,
    },
    Bare(String),
}

/// File-backed mapping from stat role to channel binding
#[derive(Debug)]
pub struct ChannelRegistry {
    path: PathBuf,
    bindings: BTreeMap<StatRole, ChannelBinding>,
    dirty: bool,
}

impl ChannelRegistry {
    /// Create an empty registry that will persist to `path`
    pub fn empty<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            bindings: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load the registry from `path`; a missing file yields an empty registry
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No registry at {}, starting empty", path.display());
            return Ok(Self::empty(path));
        }

        let raw = fs::read(path)?;
        let stored: BTreeMap<String, StoredBinding> = serde_json::from_slice(&raw)
            .map_err(|e| StatBotError::CorruptRegistry(format!("{}: {}", path.display(), e)))?;

        let mut registry = Self::empty(path);
        for (key, value) in stored {
            let role: StatRole = key.parse().map_err(|_| {
                StatBotError::CorruptRegistry(format!("unknown role key '{}'", key))
            })?;
            let (channel_id, last_label) = match value {
                StoredBinding::Full {
                    channel_id,
                    last_label,
                } => (channel_id, last_label),
                StoredBinding::Bare(channel_id) => (channel_id, String::new()),
            };
            if channel_id.trim().is_empty() {
                return Err(StatBotError::CorruptRegistry(format!(
                    "empty channel id for {}",
                    role
                )));
            }
            if let Some(owner) = registry.owner_of(&channel_id) {
                return Err(StatBotError::CorruptRegistry(format!(
                    "channel {} bound to both {} and {}",
                    channel_id, owner, role
                )));
            }
            registry.bindings.insert(
                role.clone(),
                ChannelBinding {
                    role,
                    channel_id,
                    last_label,
                },
            );
        }

        info!(
            "Loaded {} channel bindings from {}",
            registry.bindings.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Startup policy: a corrupt registry is moved aside and replaced by an
    /// empty one. Channels bound in the corrupt file are orphaned.
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(registry) => Ok(registry),
            Err(StatBotError::CorruptRegistry(reason)) => {
                let aside = path.with_extension("json.corrupt");
                warn!(
                    "Channel registry is corrupt ({}); moving it to {} and starting empty. \
                     Previously created channels will not be reused.",
                    reason,
                    aside.display()
                );
                if let Err(e) = fs::rename(path, &aside) {
                    warn!("Could not move corrupt registry aside: {}", e);
                }
                Ok(Self::empty(path))
            }
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn resolve(&self, role: &StatRole) -> Option<&str> {
        self.bindings.get(role).map(|b| b.channel_id.as_str())
    }

    pub fn binding(&self, role: &StatRole) -> Option<&ChannelBinding> {
        self.bindings.get(role)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &ChannelBinding> {
        self.bindings.values()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Whether there are mutations not yet written by `persist`
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Return the bound channel, creating it through `create` if the role has
    /// no binding yet. `create` runs at most once; on failure nothing is stored.
    pub async fn ensure<F, Fut>(&mut self, role: &StatRole, create: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        if let Some(channel_id) = self.resolve(role) {
            return Ok(channel_id.to_string());
        }

        let channel_id = create().await?;
        if let Some(owner) = self.owner_of(&channel_id) {
            warn!(
                role = %role,
                channel_id = %channel_id,
                bound_to = %owner,
                "Platform returned a channel that is already bound; the new channel is left orphaned"
            );
            return Err(StatBotError::DuplicateChannel {
                channel_id,
                bound_to: owner.clone(),
            });
        }

        info!(role = %role, channel_id = %channel_id, "Bound new channel");
        self.bindings.insert(
            role.clone(),
            ChannelBinding {
                role: role.clone(),
                channel_id: channel_id.clone(),
                last_label: String::new(),
            },
        );
        self.dirty = true;
        Ok(channel_id)
    }

    /// Record the label a channel now displays
    pub fn record_label(&mut self, role: &StatRole, label: &str) -> Result<()> {
        let binding = self
            .bindings
            .get_mut(role)
            .ok_or_else(|| StatBotError::UnknownRole(role.clone()))?;
        if binding.last_label != label {
            binding.last_label = label.to_string();
            self.dirty = true;
        }
        Ok(())
    }

    /// Drop a binding whose channel no longer exists, so it gets recreated
    pub fn forget(&mut self, role: &StatRole) -> Option<ChannelBinding> {
        let removed = self.bindings.remove(role);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Write the full mapping to disk
    pub fn persist(&mut self) -> Result<()> {
        let stored: BTreeMap<String, StoredBinding> = self
            .bindings
            .values()
            .map(|b| {
                (
                    b.role.key(),
                    StoredBinding::Full {
                        channel_id: b.channel_id.clone(),
                        last_label: b.last_label.clone(),
                    },
                )
            })
            .collect();
        let json = serde_json::to_string_pretty(&stored)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        self.dirty = false;
        debug!(
            "Persisted {} channel bindings to {}",
            self.bindings.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Import the marker-file layout: empty files named `<channelId>.<statKey>`.
    ///
    /// Existing bindings win over markers. Returns the number imported.
    pub fn import_legacy_markers<P: AsRef<Path>>(&mut self, dir: P) -> Result<usize> {
        let dir = dir.as_ref();
        let mut imported = 0;

        let mut names: Vec<String> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();

        for name in names {
            let Some((channel_id, stat_key)) = name.split_once('.') else {
                warn!("Skipping marker without stat type: {}", name);
                continue;
            };
            let Some(role) = legacy_role(stat_key) else {
                warn!("Skipping marker with unknown stat type: {}", name);
                continue;
            };
            if channel_id.is_empty() || !channel_id.chars().all(|c| c.is_ascii_digit()) {
                warn!("Skipping marker with invalid channel id: {}", name);
                continue;
            }
            if self.bindings.contains_key(&role) {
                debug!("Role {} already bound, ignoring marker {}", role, name);
                continue;
            }
            if let Some(owner) = self.owner_of(channel_id) {
                warn!(
                    "Marker {} points at channel already bound to {}, skipping",
                    name, owner
                );
                continue;
            }

            self.bindings.insert(
                role.clone(),
                ChannelBinding {
                    role,
                    channel_id: channel_id.to_string(),
                    last_label: String::new(),
                },
            );
            self.dirty = true;
            imported += 1;
        }

        info!("Imported {} legacy channel markers from {}", imported, dir.display());
        Ok(imported)
    }

    fn owner_of(&self, channel_id: &str) -> Option<&StatRole> {
        self.bindings
            .values()
            .find(|b| b.channel_id == channel_id)
            .map(|b| &b.role)
    }
}

/// Marker stat types used before the structured registry existed
fn legacy_role(stat_key: &str) -> Option<StatRole> {
    match stat_key.to_lowercase().as_str() {
        "hashrate" => Some(StatRole::MiningHashrate),
        "profit" | "profitability" => Some(StatRole::MiningDailyProfit),
        "floor" | "floorprice" => Some(StatRole::FloorPrice),
        other => other.parse().ok(),
    }
}
