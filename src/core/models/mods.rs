use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::base::{Hydration, ModId, Paginated};
use super::developer::{ModDeveloperManager, ModDeveloperMeta};
use super::simple::{SimpleMod, SimpleModMeta};
use super::version::ModVersionMeta;
use super::version_manager::{ModVersionManager, VersionManager};
use crate::core::cache::{read_lock, write_lock, KeyedLocks};
use crate::core::error::IndexResult;
use crate::core::repository::{GetSelfModsParams, IndexRepository, ModSearchParams, UpdateModBody};

/// Parallel lookups issued by [`ModManager::get_many`].
const LOOKUP_CONCURRENCY: usize = 4;

/// Mod record from `/v1/mods` and `/v1/mods/{id}`.
///
/// Listings leave out `about` and `changelog`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModMeta {
    pub id: ModId,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub developers: Vec<ModDeveloperMeta>,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub versions: Vec<ModVersionMeta>,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub changelog: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct ModState {
    tags: Vec<String>,
    featured: bool,
    download_count: u64,
    repository: Option<Url>,
    developers: ModDeveloperManager,
    about: Option<String>,
    changelog: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    hydration: Hydration,
}

impl ModState {
    fn new(meta: &ModMeta) -> Self {
        Self {
            tags: Vec::new(),
            featured: false,
            download_count: 0,
            repository: None,
            developers: ModDeveloperManager::default(),
            about: None,
            changelog: None,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            hydration: Hydration::Partial,
        }
    }

    fn apply(&mut self, meta: &ModMeta, hydration: Hydration) {
        self.tags = meta.tags.clone();
        self.featured = meta.featured;
        self.download_count = meta.download_count;
        self.repository = meta.repository.as_deref().and_then(parse_repository);
        self.developers = ModDeveloperManager::new(&meta.developers);
        self.created_at = meta.created_at;
        self.updated_at = meta.updated_at;

        // listings omit these, so only a full record may clear them
        if hydration == Hydration::Complete {
            self.about = meta.about.clone();
            self.changelog = meta.changelog.clone();
        } else {
            if meta.about.is_some() {
                self.about = meta.about.clone();
            }
            if meta.changelog.is_some() {
                self.changelog = meta.changelog.clone();
            }
        }

        self.hydration = self.hydration.merge(hydration);
    }
}

fn parse_repository(raw: &str) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!("Ignoring invalid repository URL {:?}: {}", raw, e);
            None
        }
    }
}

/// A mod on the index.
///
/// Owned by the [`ModManager`] and updated in place; `Partial` until a full
/// record filled in `about`, `changelog` and the version list.
pub struct Mod {
    id: ModId,
    index: Arc<dyn IndexRepository>,
    versions: Arc<ModVersionManager>,
    state: RwLock<ModState>,
}

impl std::fmt::Debug for Mod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mod")
            .field("id", &self.id)
            .field("state", &*read_lock(&self.state))
            .finish()
    }
}

impl Mod {
    pub(crate) fn new(
        meta: &ModMeta,
        hydration: Hydration,
        index: Arc<dyn IndexRepository>,
        versions: Arc<ModVersionManager>,
    ) -> Self {
        let mut state = ModState::new(meta);
        state.apply(meta, hydration);
        versions.load_listing(&meta.versions);

        Self {
            id: meta.id.clone(),
            index,
            versions,
            state: RwLock::new(state),
        }
    }

    /// Merge a newer payload. Never clears `Complete`.
    pub(crate) fn refresh(&self, meta: &ModMeta, hydration: Hydration) {
        write_lock(&self.state).apply(meta, hydration);
        self.versions.load_listing(&meta.versions);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tags(&self) -> Vec<String> {
        read_lock(&self.state).tags.clone()
    }

    pub fn featured(&self) -> bool {
        read_lock(&self.state).featured
    }

    pub fn download_count(&self) -> u64 {
        read_lock(&self.state).download_count
    }

    /// Source repository of the mod, when it links one.
    pub fn repository(&self) -> Option<Url> {
        read_lock(&self.state).repository.clone()
    }

    pub fn developers(&self) -> ModDeveloperManager {
        read_lock(&self.state).developers.clone()
    }

    pub fn about(&self) -> Option<String> {
        read_lock(&self.state).about.clone()
    }

    pub fn changelog(&self) -> Option<String> {
        read_lock(&self.state).changelog.clone()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        read_lock(&self.state).created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        read_lock(&self.state).updated_at
    }

    pub fn hydration(&self) -> Hydration {
        read_lock(&self.state).hydration
    }

    pub fn is_partial(&self) -> bool {
        self.hydration() == Hydration::Partial
    }

    pub fn versions(&self) -> &Arc<ModVersionManager> {
        &self.versions
    }

    /// Resolve the remaining information of the mod, if missing.
    pub async fn fetch(self: &Arc<Self>) -> IndexResult<Arc<Self>> {
        if !self.is_partial() {
            return Ok(Arc::clone(self));
        }

        debug!("Hydrating mod {}", self.id);
        let meta = self.index.get_mod(&self.id).await?;
        self.refresh(&meta, Hydration::Complete);

        Ok(Arc::clone(self))
    }

    /// Feature or unfeature the mod. Admin only; the local flag changes once
    /// the index accepted the update.
    pub async fn set_featured(&self, featured: bool) -> IndexResult<()> {
        if self.featured() == featured {
            return Ok(());
        }

        self.index
            .update_mod(&self.id, &UpdateModBody { featured })
            .await?;

        write_lock(&self.state).featured = featured;
        info!("Mod {} featured={}", self.id, featured);
        Ok(())
    }

    pub fn logo_url(&self) -> IndexResult<Url> {
        self.index.mod_logo_url(&self.id)
    }

    /// Logo PNG bytes, authenticated so unverified mods resolve too.
    pub async fn logo_data(&self) -> IndexResult<Vec<u8>> {
        self.index.get_mod_logo_data(&self.id).await
    }
}

/// Cache slot for one mod id.
#[derive(Clone)]
pub enum ModHandle {
    Full(Arc<Mod>),
    Simple(Arc<SimpleMod>),
}

impl ModHandle {
    pub fn id(&self) -> &str {
        match self {
            ModHandle::Full(m) => m.id(),
            ModHandle::Simple(m) => m.id(),
        }
    }

    pub fn as_full(&self) -> Option<&Arc<Mod>> {
        match self {
            ModHandle::Full(m) => Some(m),
            ModHandle::Simple(_) => None,
        }
    }
}

/// Process-wide mod cache. Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct ModManager {
    repository: Arc<dyn IndexRepository>,
    versions: VersionManager,
    collection: Arc<RwLock<HashMap<ModId, ModHandle>>>,
    inflight: Arc<KeyedLocks<ModId>>,
}

impl ModManager {
    pub fn new(repository: Arc<dyn IndexRepository>) -> Self {
        Self {
            versions: VersionManager::new(Arc::clone(&repository)),
            repository,
            collection: Arc::new(RwLock::new(HashMap::new())),
            inflight: Arc::new(KeyedLocks::default()),
        }
    }

    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    pub fn cached(&self, id: &str) -> Option<ModHandle> {
        read_lock(&self.collection).get(id).cloned()
    }

    fn cached_full(&self, id: &str) -> Option<Arc<Mod>> {
        self.cached(id).and_then(|h| h.as_full().cloned())
    }

    /// A mod by id. A cached [`Mod`] is returned as is, possibly partial;
    /// otherwise the full record is fetched. A cached [`SimpleMod`] is
    /// replaced by the full record.
    pub async fn get(&self, id: &str) -> IndexResult<Arc<Mod>> {
        if let Some(m) = self.cached_full(id) {
            return Ok(m);
        }

        let _guard = self.inflight.acquire(id.to_string()).await;
        if let Some(m) = self.cached_full(id) {
            return Ok(m);
        }

        let meta = self.repository.get_mod(id).await?;
        let m = Arc::new(Mod::new(
            &meta,
            Hydration::Complete,
            Arc::clone(&self.repository),
            self.versions.by_mod(id),
        ));
        write_lock(&self.collection).insert(id.to_string(), ModHandle::Full(Arc::clone(&m)));

        Ok(m)
    }

    /// Like [`ModManager::get`], but a cached [`SimpleMod`] is good enough.
    pub async fn get_any(&self, id: &str) -> IndexResult<ModHandle> {
        if let Some(handle) = self.cached(id) {
            return Ok(handle);
        }
        Ok(ModHandle::Full(self.get(id).await?))
    }

    /// Look up several mods, in order, with a few requests in flight.
    pub async fn get_many(&self, ids: &[&str]) -> IndexResult<Vec<Arc<Mod>>> {
        let results = stream::iter(ids.iter().copied())
            .map(|id| self.get(id))
            .buffered(LOOKUP_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        results.into_iter().collect()
    }

    /// Search the index. Every returned mod is cached or refreshed in place.
    pub async fn search(&self, params: &ModSearchParams) -> IndexResult<Paginated<Arc<Mod>>> {
        let page = self.repository.get_mods(params).await?;
        debug!("Search returned {} of {} mods", page.data.len(), page.count);

        let data = page.data.iter().map(|meta| self.upsert_summary(meta)).collect();
        Ok(Paginated {
            data,
            count: page.count,
        })
    }

    /// The signed-in developer's mods.
    ///
    /// A mod already cached as a full [`Mod`] keeps that entry; the returned
    /// [`SimpleMod`] is then not cached.
    pub async fn by_self(&self, params: &GetSelfModsParams) -> IndexResult<Vec<Arc<SimpleMod>>> {
        let mods = self.repository.get_self_mods(params).await?;
        Ok(mods.iter().map(|meta| self.upsert_simple(meta)).collect())
    }

    /// Submit a new mod from a release download link.
    pub async fn create(&self, download_link: &str) -> IndexResult<()> {
        self.repository.create_mod(download_link).await?;
        info!("Submitted new mod from {}", download_link);
        Ok(())
    }

    fn upsert_summary(&self, meta: &ModMeta) -> Arc<Mod> {
        let mut collection = write_lock(&self.collection);

        if let Some(ModHandle::Full(existing)) = collection.get(&meta.id) {
            existing.refresh(meta, Hydration::Partial);
            return Arc::clone(existing);
        }

        let m = Arc::new(Mod::new(
            meta,
            Hydration::Partial,
            Arc::clone(&self.repository),
            self.versions.by_mod(&meta.id),
        ));
        collection.insert(meta.id.clone(), ModHandle::Full(Arc::clone(&m)));
        m
    }

    fn upsert_simple(&self, meta: &SimpleModMeta) -> Arc<SimpleMod> {
        let mut collection = write_lock(&self.collection);
        let mod_versions = self.versions.by_mod(&meta.id);

        match collection.get(&meta.id) {
            Some(ModHandle::Simple(existing)) => {
                existing.refresh(meta);
                Arc::clone(existing)
            }
            Some(ModHandle::Full(_)) => Arc::new(SimpleMod::new(
                meta,
                Arc::clone(&self.repository),
                mod_versions,
            )),
            None => {
                let simple = Arc::new(SimpleMod::new(
                    meta,
                    Arc::clone(&self.repository),
                    mod_versions,
                ));
                collection.insert(meta.id.clone(), ModHandle::Simple(Arc::clone(&simple)));
                simple
            }
        }
    }
}
