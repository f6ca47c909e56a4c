//! Versioned topic/template registry
//!
//! The registry is a directory of YAML files pinned by `manifest.yml`.
//! Every accessor is cached; in watch mode the cache entry is invalidated
//! when the backing file's mtime changes, so edits land without a restart.
//!
//! Loading is deliberately soft everywhere except the manifest: a missing
//! or malformed file logs a warning and yields an empty document. Only the
//! version pin is fatal, and only at construction.

pub mod model;
pub mod templates;
pub mod topics;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde::de::DeserializeOwned;

use crate::{Error, Result};
pub use model::{
    Direction, EnumsFile, Manifest, MappingEntry, MappingFile, ModuleEntry, ModulesFile, Template,
    TemplateMatch, TopicConfig, WorkpiecesFile,
};
pub use templates::{TemplateManager, normalize_key};
pub use topics::{RouteMatch, TopicResolver};

/// Change stamp for a file or directory of files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    latest: Option<SystemTime>,
    count: usize,
}

/// One cached document plus the stamp it was read at
#[derive(Debug)]
struct Cached<T> {
    value: Arc<T>,
    stamp: Stamp,
}

#[derive(Debug, Default)]
struct Cache {
    modules: Option<Cached<ModulesFile>>,
    enums: Option<Cached<EnumsFile>>,
    workpieces: Option<Cached<WorkpiecesFile>>,
    mapping: Option<Cached<MappingFile>>,
    templates: Option<Cached<BTreeMap<String, Template>>>,
    topics: Option<Cached<BTreeMap<String, TopicConfig>>>,
}

/// The versioned registry store
#[derive(Debug)]
pub struct Registry {
    root: PathBuf,
    manifest: Manifest,
    watch_mode: bool,
    cache: Mutex<Cache>,
}

impl Registry {
    /// Load the registry rooted at `root`, without hot reload
    ///
    /// # Errors
    ///
    /// Returns `Error::Registry` when the manifest is unreadable and
    /// `Error::VersionMismatch` when its version is outside the `1.*`
    /// line. All other files load lazily and softly.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        Self::load_with_watch(root, false)
    }

    /// Load the registry with mtime-based hot reload enabled
    ///
    /// # Errors
    ///
    /// Same as [`Registry::load`].
    pub fn load_watching(root: impl Into<PathBuf>) -> Result<Self> {
        Self::load_with_watch(root, true)
    }

    fn load_with_watch(root: impl Into<PathBuf>, watch_mode: bool) -> Result<Self> {
        let root = root.into();
        let manifest_path = root.join("manifest.yml");
        let raw = std::fs::read_to_string(&manifest_path).map_err(|e| {
            Error::Registry(format!(
                "cannot read manifest {}: {e}",
                manifest_path.display()
            ))
        })?;
        let manifest: Manifest = serde_yaml::from_str(&raw)?;

        if !manifest.version.starts_with("1.") {
            return Err(Error::VersionMismatch(manifest.version));
        }

        tracing::info!(
            root = %root.display(),
            version = %manifest.version,
            watch = watch_mode,
            "registry loaded"
        );

        Ok(Self {
            root,
            manifest,
            watch_mode,
            cache: Mutex::new(Cache::default()),
        })
    }

    /// Registry root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The pinned manifest
    #[must_use]
    pub const fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Declared factory modules
    #[must_use]
    pub fn modules(&self) -> Arc<ModulesFile> {
        let path = self.root.join("modules.yml");
        self.cached(
            |c| &mut c.modules,
            Stamp::of_file(&path),
            || load_yaml_soft(&path, "modules"),
        )
    }

    /// Look up an enabled module by its short id or serial
    #[must_use]
    pub fn module(&self, id_or_serial: &str) -> Option<ModuleEntry> {
        self.modules()
            .modules
            .iter()
            .find(|m| m.enabled && (m.id == id_or_serial || m.serial == id_or_serial))
            .cloned()
    }

    /// Shared enumerations
    #[must_use]
    pub fn enums(&self) -> Arc<EnumsFile> {
        let path = self.root.join("enums.yml");
        self.cached(
            |c| &mut c.enums,
            Stamp::of_file(&path),
            || load_yaml_soft(&path, "enums"),
        )
    }

    /// Workpiece NFC code table; an empty file yields `{nfc_codes: {}}`
    #[must_use]
    pub fn workpieces(&self) -> Arc<WorkpiecesFile> {
        let path = self.root.join("workpieces.yml");
        self.cached(
            |c| &mut c.workpieces,
            Stamp::of_file(&path),
            || load_yaml_soft(&path, "workpieces"),
        )
    }

    /// Topic→template mapping, declaration order preserved
    #[must_use]
    pub fn mapping(&self) -> Arc<MappingFile> {
        let path = self.root.join("mappings/topic_template.yml");
        self.cached(
            |c| &mut c.mapping,
            Stamp::of_file(&path),
            || load_yaml_soft(&path, "topic mapping"),
        )
    }

    /// Templates indexed by normalized file-stem key
    #[must_use]
    pub fn templates(&self) -> Arc<BTreeMap<String, Template>> {
        let dir = self.root.join("templates");
        self.cached(
            |c| &mut c.templates,
            Stamp::of_dir(&dir),
            || load_template_dir(&dir),
        )
    }

    /// Per-topic QoS/retain configuration keyed by concrete topic
    #[must_use]
    pub fn topics(&self) -> Arc<BTreeMap<String, TopicConfig>> {
        let dir = self.root.join("topics");
        self.cached(
            |c| &mut c.topics,
            Stamp::of_dir(&dir),
            || load_topic_dir(&dir),
        )
    }

    /// Configuration for one concrete topic, if declared
    #[must_use]
    pub fn topic_config(&self, topic: &str) -> Option<TopicConfig> {
        self.topics().get(topic).cloned()
    }

    /// Generic cache slot access: reload when stale (watch mode) or unset
    fn cached<T>(
        &self,
        slot: impl Fn(&mut Cache) -> &mut Option<Cached<T>>,
        stamp: Stamp,
        load: impl FnOnce() -> T,
    ) -> Arc<T> {
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = slot(&mut cache);
        match entry {
            Some(cached) if !(self.watch_mode && cached.stamp != stamp) => {
                Arc::clone(&cached.value)
            }
            _ => {
                let value = Arc::new(load());
                *entry = Some(Cached {
                    value: Arc::clone(&value),
                    stamp,
                });
                value
            }
        }
    }
}

impl Stamp {
    fn of_file(path: &Path) -> Self {
        let latest = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        Self {
            latest,
            count: usize::from(latest.is_some()),
        }
    }

    fn of_dir(dir: &Path) -> Self {
        let mut latest = None;
        let mut count = 0;
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                    count += 1;
                    if latest.is_none_or(|l| modified > l) {
                        latest = Some(modified);
                    }
                }
            }
        }
        Self { latest, count }
    }
}

/// Read one YAML file, warning and yielding the default on any failure
fn load_yaml_soft<T: DeserializeOwned + Default>(path: &Path, what: &str) -> T {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "missing {what} file, using empty");
            return T::default();
        }
    };
    if raw.trim().is_empty() {
        return T::default();
    }
    match serde_yaml::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "malformed {what} file, using empty");
            T::default()
        }
    }
}

/// Load every `*.yml` template; the normalized file stem is the key
fn load_template_dir(dir: &Path) -> BTreeMap<String, Template> {
    let mut templates = BTreeMap::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "missing templates directory");
            return templates;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yml") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let key = normalize_key(stem);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable template, skipping");
                continue;
            }
        };
        match serde_yaml::from_str::<Template>(&raw) {
            Ok(template) => {
                templates.insert(key, template);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed template, skipping");
            }
        }
    }
    templates
}

/// Load every per-topic config file, keyed by the topic declared inside
fn load_topic_dir(dir: &Path) -> BTreeMap<String, TopicConfig> {
    let mut topics = BTreeMap::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "missing topics directory");
            return topics;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yml") {
            continue;
        }
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable topic config, skipping");
                continue;
            }
        };
        match serde_yaml::from_str::<TopicConfig>(&raw) {
            Ok(config) => {
                topics.insert(config.topic.clone(), config);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed topic config, skipping");
            }
        }
    }
    topics
}
