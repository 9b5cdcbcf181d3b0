use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use url::Url;

use super::base::{ModId, ModVersionString};
use super::developer::{ModDeveloperManager, ModDeveloperMeta};
use super::mods::{Mod, ModManager};
use super::version::ModVersion;
use super::version_manager::{compare_versions, ModVersionManager};
use crate::core::cache::{read_lock, write_lock};
use crate::core::error::IndexResult;
use crate::core::repository::IndexRepository;

/// Mod entry from `GET /v1/me/mods`.
#[derive(Debug, Clone, Deserialize)]
pub struct SimpleModMeta {
    pub id: ModId,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default)]
    pub versions: Vec<SimpleModVersionMeta>,
    #[serde(default)]
    pub developers: Vec<ModDeveloperMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimpleModVersionMeta {
    pub name: String,
    pub version: ModVersionString,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default)]
    pub validated: bool,
}

#[derive(Debug)]
struct SimpleVersionState {
    name: String,
    download_count: u64,
    validated: bool,
}

/// Version summary carried by a [`SimpleMod`].
pub struct SimpleModVersion {
    version: ModVersionString,
    mod_versions: Arc<ModVersionManager>,
    state: RwLock<SimpleVersionState>,
}

impl SimpleModVersion {
    fn new(meta: &SimpleModVersionMeta, mod_versions: Arc<ModVersionManager>) -> Self {
        Self {
            version: meta.version.clone(),
            mod_versions,
            state: RwLock::new(SimpleVersionState {
                name: meta.name.clone(),
                download_count: meta.download_count,
                validated: meta.validated,
            }),
        }
    }

    fn refresh(&self, meta: &SimpleModVersionMeta) {
        let mut state = write_lock(&self.state);
        state.name = meta.name.clone();
        state.download_count = meta.download_count;
        state.validated = meta.validated;
    }

    pub fn mod_id(&self) -> &str {
        self.mod_versions.mod_id()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn name(&self) -> String {
        read_lock(&self.state).name.clone()
    }

    pub fn download_count(&self) -> u64 {
        read_lock(&self.state).download_count
    }

    pub fn validated(&self) -> bool {
        read_lock(&self.state).validated
    }

    /// The full version record, through the shared version cache of the mod.
    pub async fn fetch(&self) -> IndexResult<Arc<ModVersion>> {
        self.mod_versions.get(&self.version).await
    }

    pub fn download_url(&self) -> IndexResult<Url> {
        self.mod_versions.download_url(&self.version)
    }
}

/// Versions of a [`SimpleMod`]. Nothing here is fetched lazily; resolve a
/// full [`ModVersion`] through [`SimpleModVersion::fetch`].
pub struct SimpleModVersionManager {
    mod_versions: Arc<ModVersionManager>,
    collection: RwLock<HashMap<ModVersionString, Arc<SimpleModVersion>>>,
    latest: RwLock<Option<Arc<SimpleModVersion>>>,
}

impl SimpleModVersionManager {
    fn new(mod_versions: Arc<ModVersionManager>) -> Self {
        Self {
            mod_versions,
            collection: RwLock::new(HashMap::new()),
            latest: RwLock::new(None),
        }
    }

    /// Known only when the listing carried exactly one version.
    pub fn latest(&self) -> Option<Arc<SimpleModVersion>> {
        read_lock(&self.latest).clone()
    }

    pub fn get(&self, version: &str) -> Option<Arc<SimpleModVersion>> {
        read_lock(&self.collection).get(version).cloned()
    }

    /// Newest first.
    pub fn list(&self) -> Vec<Arc<SimpleModVersion>> {
        let mut versions: Vec<_> = read_lock(&self.collection).values().cloned().collect();
        versions.sort_by(|a, b| compare_versions(b.version(), a.version()));
        versions
    }

    fn load(&self, versions: &[SimpleModVersionMeta]) {
        if let [only] = versions {
            let version = self.upsert(only);
            *write_lock(&self.latest) = Some(version);
            return;
        }

        for meta in versions {
            self.upsert(meta);
        }
    }

    fn upsert(&self, meta: &SimpleModVersionMeta) -> Arc<SimpleModVersion> {
        let mut collection = write_lock(&self.collection);

        if let Some(existing) = collection.get(&meta.version) {
            existing.refresh(meta);
            return Arc::clone(existing);
        }

        let version = Arc::new(SimpleModVersion::new(
            meta,
            Arc::clone(&self.mod_versions),
        ));
        collection.insert(meta.version.clone(), Arc::clone(&version));
        version
    }
}

#[derive(Debug)]
struct SimpleModState {
    featured: bool,
    download_count: u64,
    developers: ModDeveloperManager,
}

/// Reduced mod record returned for the signed-in developer's own mods.
///
/// Shares the identifier space with [`Mod`] but is not one; call
/// [`SimpleMod::fetch`] for the full record.
pub struct SimpleMod {
    id: ModId,
    repository: Arc<dyn IndexRepository>,
    state: RwLock<SimpleModState>,
    versions: SimpleModVersionManager,
}

impl SimpleMod {
    pub(crate) fn new(
        meta: &SimpleModMeta,
        repository: Arc<dyn IndexRepository>,
        mod_versions: Arc<ModVersionManager>,
    ) -> Self {
        let versions = SimpleModVersionManager::new(mod_versions);
        versions.load(&meta.versions);

        Self {
            id: meta.id.clone(),
            repository,
            state: RwLock::new(SimpleModState {
                featured: meta.featured,
                download_count: meta.download_count,
                developers: ModDeveloperManager::new(&meta.developers),
            }),
            versions,
        }
    }

    pub(crate) fn refresh(&self, meta: &SimpleModMeta) {
        {
            let mut state = write_lock(&self.state);
            state.featured = meta.featured;
            state.download_count = meta.download_count;
            state.developers = ModDeveloperManager::new(&meta.developers);
        }
        self.versions.load(&meta.versions);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn featured(&self) -> bool {
        read_lock(&self.state).featured
    }

    pub fn download_count(&self) -> u64 {
        read_lock(&self.state).download_count
    }

    pub fn developers(&self) -> ModDeveloperManager {
        read_lock(&self.state).developers.clone()
    }

    pub fn versions(&self) -> &SimpleModVersionManager {
        &self.versions
    }

    pub fn logo_url(&self) -> IndexResult<Url> {
        self.repository.mod_logo_url(&self.id)
    }

    /// Logo PNG bytes, authenticated so unverified mods resolve too.
    pub async fn logo_data(&self) -> IndexResult<Vec<u8>> {
        self.repository.get_mod_logo_data(&self.id).await
    }

    /// The full mod record, through the mod cache.
    pub async fn fetch(&self, mods: &ModManager) -> IndexResult<Arc<Mod>> {
        mods.get(&self.id).await
    }
}
