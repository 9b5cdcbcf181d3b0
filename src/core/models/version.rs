use std::sync::{Arc, RwLock};

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use super::base::{Hydration, ModId, ModStatus, ModVersionString, Platform};
use crate::core::cache::{read_lock, write_lock};
use crate::core::error::{IndexError, IndexResult};
use crate::core::repository::{IndexRepository, UpdateVersionBody};

/// Game versions a mod version supports: one string for every platform, or
/// a per-platform map.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GdVersionMeta {
    All(String),
    PerPlatform(GdPlatformsMeta),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GdPlatformsMeta {
    #[serde(default)]
    pub win: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub ios: Option<String>,
    #[serde(default)]
    pub android32: Option<String>,
    #[serde(default)]
    pub android64: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GdVersion {
    pub win: Option<String>,
    pub mac: Option<String>,
    pub ios: Option<String>,
    pub android32: Option<String>,
    pub android64: Option<String>,
}

impl From<&GdVersionMeta> for GdVersion {
    fn from(meta: &GdVersionMeta) -> Self {
        match meta {
            GdVersionMeta::All(v) => Self {
                win: Some(v.clone()),
                mac: Some(v.clone()),
                ios: Some(v.clone()),
                android32: Some(v.clone()),
                android64: Some(v.clone()),
            },
            GdVersionMeta::PerPlatform(p) => Self {
                win: p.win.clone(),
                mac: p.mac.clone(),
                ios: p.ios.clone(),
                android32: p.android32.clone(),
                android64: p.android64.clone(),
            },
        }
    }
}

impl GdVersion {
    pub fn for_platform(&self, platform: Platform) -> Option<&str> {
        let v = match platform {
            Platform::Win => &self.win,
            Platform::Mac => &self.mac,
            Platform::Ios => &self.ios,
            Platform::Android32 => &self.android32,
            Platform::Android64 => &self.android64,
        };
        v.as_deref()
    }

    /// Platforms this version is published for.
    pub fn platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.for_platform(*p).is_some())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum DependencyImportance {
    Suggested,
    Recommended,
    Required,
    Unknown,
}

impl From<String> for DependencyImportance {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "suggested" => Self::Suggested,
            "recommended" => Self::Recommended,
            "required" => Self::Required,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum IncompatibilityImportance {
    Breaking,
    Conflicting,
    Superseded,
    Unknown,
}

impl From<String> for IncompatibilityImportance {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "breaking" => Self::Breaking,
            "conflicting" => Self::Conflicting,
            // the index spells it "Superseeded"
            "superseded" | "superseeded" => Self::Superseded,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DependencyMeta {
    pub mod_id: ModId,
    pub version: String,
    pub importance: DependencyImportance,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncompatibilityMeta {
    pub mod_id: ModId,
    pub version: String,
    pub importance: IncompatibilityImportance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub mod_id: ModId,
    /// Version range, e.g. `>=1.2.0`.
    pub version: String,
    pub importance: DependencyImportance,
}

impl From<&DependencyMeta> for Dependency {
    fn from(m: &DependencyMeta) -> Self {
        Self {
            mod_id: m.mod_id.clone(),
            version: m.version.clone(),
            importance: m.importance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incompatibility {
    pub mod_id: ModId,
    pub version: String,
    pub importance: IncompatibilityImportance,
}

impl From<&IncompatibilityMeta> for Incompatibility {
    fn from(m: &IncompatibilityMeta) -> Self {
        Self {
            mod_id: m.mod_id.clone(),
            version: m.version.clone(),
            importance: m.importance,
        }
    }
}

/// Version record from `/v1/mods/{id}/versions/...` or embedded in a mod.
#[derive(Debug, Clone, Deserialize)]
pub struct ModVersionMeta {
    pub name: String,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub early_load: bool,
    #[serde(default)]
    pub api: bool,
    pub geode: String,
    pub version: ModVersionString,
    #[serde(default)]
    pub download_link: String,
    #[serde(default)]
    pub hash: String,
    pub gd: GdVersionMeta,
    pub mod_id: ModId,
    #[serde(default)]
    pub dependencies: Option<Vec<DependencyMeta>>,
    #[serde(default)]
    pub incompatibilities: Option<Vec<IncompatibilityMeta>>,
    pub status: ModStatus,
}

/// Strip the leading `v` the index accepts in Geode SDK versions.
pub fn normalize_geode(geode: &str) -> String {
    geode.strip_prefix('v').unwrap_or(geode).to_string()
}

#[derive(Debug)]
struct VersionState {
    name: String,
    description: Option<String>,
    gd: GdVersion,
    geode: String,
    early_load: bool,
    api: bool,
    download_link: String,
    download_count: u64,
    hash: String,
    status: ModStatus,
    dependencies: Option<Vec<Dependency>>,
    incompatibilities: Option<Vec<Incompatibility>>,
    hydration: Hydration,
}

impl VersionState {
    fn apply(&mut self, meta: &ModVersionMeta, hydration: Hydration) {
        self.name = meta.name.clone();
        self.description = meta.description.clone();
        self.gd = GdVersion::from(&meta.gd);
        self.geode = normalize_geode(&meta.geode);
        self.early_load = meta.early_load;
        self.api = meta.api;
        self.download_link = meta.download_link.clone();
        self.download_count = meta.download_count;
        self.hash = meta.hash.clone();
        self.status = meta.status;

        if let Some(deps) = &meta.dependencies {
            self.dependencies = Some(deps.iter().map(Dependency::from).collect());
        }
        if let Some(incompat) = &meta.incompatibilities {
            self.incompatibilities = Some(incompat.iter().map(Incompatibility::from).collect());
        }

        // a full record with no lists means there are none
        if hydration == Hydration::Complete {
            self.dependencies.get_or_insert_with(Vec::new);
            self.incompatibilities.get_or_insert_with(Vec::new);
        }

        self.hydration = self.hydration.merge(hydration);
    }
}

/// A single published version of a mod.
///
/// Instances are owned by their mod's [`ModVersionManager`](super::ModVersionManager)
/// and updated in place, so every holder of the `Arc` sees fetched data.
pub struct ModVersion {
    mod_id: ModId,
    version: ModVersionString,
    repository: Arc<dyn IndexRepository>,
    state: RwLock<VersionState>,
}

impl std::fmt::Debug for ModVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModVersion")
            .field("mod_id", &self.mod_id)
            .field("version", &self.version)
            .field("state", &*read_lock(&self.state))
            .finish()
    }
}

impl ModVersion {
    pub(crate) fn new(
        meta: &ModVersionMeta,
        hydration: Hydration,
        repository: Arc<dyn IndexRepository>,
    ) -> Self {
        let mut state = VersionState {
            name: String::new(),
            description: None,
            gd: GdVersion::default(),
            geode: String::new(),
            early_load: false,
            api: false,
            download_link: String::new(),
            download_count: 0,
            hash: String::new(),
            status: meta.status,
            dependencies: None,
            incompatibilities: None,
            hydration: Hydration::Partial,
        };
        state.apply(meta, hydration);

        Self {
            mod_id: meta.mod_id.clone(),
            version: meta.version.clone(),
            repository,
            state: RwLock::new(state),
        }
    }

    /// Merge a newer payload for this version. Never clears `Complete`.
    pub(crate) fn refresh(&self, meta: &ModVersionMeta, hydration: Hydration) {
        write_lock(&self.state).apply(meta, hydration);
    }

    pub fn mod_id(&self) -> &str {
        &self.mod_id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn name(&self) -> String {
        read_lock(&self.state).name.clone()
    }

    pub fn description(&self) -> Option<String> {
        read_lock(&self.state).description.clone()
    }

    pub fn gd(&self) -> GdVersion {
        read_lock(&self.state).gd.clone()
    }

    /// Geode SDK version this build targets, without a leading `v`.
    pub fn geode(&self) -> String {
        read_lock(&self.state).geode.clone()
    }

    pub fn early_load(&self) -> bool {
        read_lock(&self.state).early_load
    }

    pub fn api(&self) -> bool {
        read_lock(&self.state).api
    }

    /// Upstream link the version was published from.
    pub fn download_link(&self) -> String {
        read_lock(&self.state).download_link.clone()
    }

    pub fn download_count(&self) -> u64 {
        read_lock(&self.state).download_count
    }

    pub fn hash(&self) -> String {
        read_lock(&self.state).hash.clone()
    }

    pub fn status(&self) -> ModStatus {
        read_lock(&self.state).status
    }

    /// `None` until known; call [`ModVersion::fetch`] first.
    pub fn dependencies(&self) -> Option<Vec<Dependency>> {
        read_lock(&self.state).dependencies.clone()
    }

    pub fn incompatibilities(&self) -> Option<Vec<Incompatibility>> {
        read_lock(&self.state).incompatibilities.clone()
    }

    pub fn hydration(&self) -> Hydration {
        read_lock(&self.state).hydration
    }

    pub fn is_partial(&self) -> bool {
        self.hydration() == Hydration::Partial
    }

    /// Resolve dependencies and incompatibilities if they are still missing.
    pub async fn fetch(self: &Arc<Self>) -> IndexResult<Arc<Self>> {
        if !self.is_partial() {
            return Ok(Arc::clone(self));
        }

        debug!("Hydrating {}@{}", self.mod_id, self.version);
        let meta = self
            .repository
            .get_mod_version(&self.mod_id, &self.version)
            .await?;
        self.refresh(&meta, Hydration::Complete);

        Ok(Arc::clone(self))
    }

    /// Change the review status. The local value only changes once the
    /// index accepted the update.
    pub async fn set_status(&self, status: ModStatus, info: Option<String>) -> IndexResult<()> {
        if self.status() == status {
            return Ok(());
        }

        let body = UpdateVersionBody { status, info };
        self.repository
            .update_mod_version(&self.mod_id, &self.version, &body)
            .await?;

        write_lock(&self.state).status = status;
        info!("{}@{} is now {}", self.mod_id, self.version, status);
        Ok(())
    }

    /// Index endpoint serving this version's package.
    pub fn download_url(&self) -> IndexResult<Url> {
        self.repository.mod_download_url(&self.mod_id, &self.version)
    }

    /// Download the package, checking it against the published hash.
    ///
    /// This counts as a download on the index.
    pub async fn download(&self) -> IndexResult<Vec<u8>> {
        let data = self
            .repository
            .get_mod_download_data(&self.mod_id, &self.version)
            .await?;

        let expected = self.hash();
        if !expected.is_empty() {
            verify_sha256(&self.mod_id, &self.version, &expected, &data)?;
        }

        debug!(
            "Downloaded {}@{} ({} bytes)",
            self.mod_id,
            self.version,
            data.len()
        );
        Ok(data)
    }
}

pub(crate) fn verify_sha256(
    mod_id: &str,
    version: &str,
    expected: &str,
    data: &[u8],
) -> IndexResult<()> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let actual = hex::encode(hasher.finalize());

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(IndexError::HashMismatch {
            mod_id: mod_id.to_string(),
            version: version.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
