use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures_util::stream::{self, StreamExt};
use tracing::debug;
use url::Url;

use super::base::{Hydration, ModId, ModVersionString};
use super::version::{ModVersion, ModVersionMeta};
use crate::core::cache::{read_lock, write_lock, KeyedLocks};
use crate::core::error::IndexResult;
use crate::core::repository::IndexRepository;

/// Parallel hydration requests issued by [`ModVersionManager::fetch_all`].
const FETCH_CONCURRENCY: usize = 4;

/// Version cache of a single mod.
pub struct ModVersionManager {
    mod_id: ModId,
    repository: Arc<dyn IndexRepository>,
    collection: RwLock<HashMap<ModVersionString, Arc<ModVersion>>>,
    /// May alias an entry of `collection`.
    latest: RwLock<Option<Arc<ModVersion>>>,
    /// `None` is the key for the latest-version lookup.
    inflight: KeyedLocks<Option<ModVersionString>>,
}

impl ModVersionManager {
    pub(crate) fn new(mod_id: ModId, repository: Arc<dyn IndexRepository>) -> Self {
        Self {
            mod_id,
            repository,
            collection: RwLock::new(HashMap::new()),
            latest: RwLock::new(None),
            inflight: KeyedLocks::default(),
        }
    }

    pub fn mod_id(&self) -> &str {
        &self.mod_id
    }

    /// The latest version, requesting it from the index if it was never
    /// resolved.
    pub async fn latest(&self) -> IndexResult<Arc<ModVersion>> {
        if let Some(latest) = self.cached_latest() {
            return Ok(latest);
        }

        let _guard = self.inflight.acquire(None).await;
        if let Some(latest) = self.cached_latest() {
            return Ok(latest);
        }

        let meta = self.repository.get_mod_latest_version(&self.mod_id).await?;
        let version = self.upsert(&meta, Hydration::Complete);
        *write_lock(&self.latest) = Some(Arc::clone(&version));

        debug!("Latest version of {} is {}", self.mod_id, version.version());
        Ok(version)
    }

    /// The latest version if it is already known.
    pub fn cached_latest(&self) -> Option<Arc<ModVersion>> {
        read_lock(&self.latest).clone()
    }

    /// A version by its version string. Cached versions are returned as they
    /// are, possibly partial; misses are fetched in full.
    pub async fn get(&self, version: &str) -> IndexResult<Arc<ModVersion>> {
        if let Some(v) = self.cached(version) {
            return Ok(v);
        }

        let _guard = self.inflight.acquire(Some(version.to_string())).await;
        if let Some(v) = self.cached(version) {
            return Ok(v);
        }

        let meta = self
            .repository
            .get_mod_version(&self.mod_id, version)
            .await?;
        Ok(self.upsert(&meta, Hydration::Complete))
    }

    pub fn cached(&self, version: &str) -> Option<Arc<ModVersion>> {
        read_lock(&self.collection).get(version).cloned()
    }

    /// Every version known to the client, newest first.
    ///
    /// Only versions seen so far are listed; fetch the mod first for the
    /// full list.
    pub fn list(&self) -> Vec<Arc<ModVersion>> {
        let mut versions: Vec<_> = read_lock(&self.collection).values().cloned().collect();
        versions.sort_by(|a, b| compare_versions(b.version(), a.version()));
        versions
    }

    /// Hydrate every known partial version.
    pub async fn fetch_all(&self) -> IndexResult<Vec<Arc<ModVersion>>> {
        let partial: Vec<_> = self.list().into_iter().filter(|v| v.is_partial()).collect();
        debug!("Hydrating {} versions of {}", partial.len(), self.mod_id);

        let results = stream::iter(partial)
            .map(|v| async move { v.fetch().await })
            .buffer_unordered(FETCH_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        for result in results {
            result?;
        }

        Ok(self.list())
    }

    /// Index endpoint serving the package of `version`.
    pub fn download_url(&self, version: &str) -> IndexResult<Url> {
        self.repository.mod_download_url(&self.mod_id, version)
    }

    /// Publish a new version from a release download link.
    pub async fn create(&self, download_link: &str) -> IndexResult<()> {
        self.repository
            .create_mod_version(&self.mod_id, download_link)
            .await
    }

    /// Merge the versions embedded in a mod payload.
    ///
    /// The index does not mark which entry is the latest, so a lone entry is
    /// the only case where it can be assumed.
    pub(crate) fn load_listing(&self, versions: &[ModVersionMeta]) {
        if let [only] = versions {
            let version = self.upsert(only, Hydration::Partial);
            *write_lock(&self.latest) = Some(version);
            return;
        }

        for meta in versions {
            self.upsert(meta, Hydration::Partial);
        }
    }

    /// Insert a version or update the cached instance in place.
    pub(crate) fn upsert(&self, meta: &ModVersionMeta, hydration: Hydration) -> Arc<ModVersion> {
        let mut collection = write_lock(&self.collection);

        if let Some(existing) = collection.get(&meta.version) {
            existing.refresh(meta, hydration);
            return Arc::clone(existing);
        }

        let version = Arc::new(ModVersion::new(
            meta,
            hydration,
            Arc::clone(&self.repository),
        ));
        collection.insert(meta.version.clone(), Arc::clone(&version));
        version
    }
}

/// Per-mod version caches.
#[derive(Clone)]
pub struct VersionManager {
    repository: Arc<dyn IndexRepository>,
    collection: Arc<RwLock<HashMap<ModId, Arc<ModVersionManager>>>>,
}

impl VersionManager {
    pub fn new(repository: Arc<dyn IndexRepository>) -> Self {
        Self {
            repository,
            collection: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The version cache of `mod_id`, created empty on first use.
    pub fn by_mod(&self, mod_id: &str) -> Arc<ModVersionManager> {
        if let Some(manager) = read_lock(&self.collection).get(mod_id) {
            return Arc::clone(manager);
        }

        let mut collection = write_lock(&self.collection);
        let manager = collection.entry(mod_id.to_string()).or_insert_with(|| {
            Arc::new(ModVersionManager::new(
                mod_id.to_string(),
                Arc::clone(&self.repository),
            ))
        });
        Arc::clone(manager)
    }
}

/// Semantic-version ordering, tolerating a leading `v`. Strings that are not
/// semantic versions sort below those that are, and among themselves by text.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_semver(a), parse_semver(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

fn parse_semver(v: &str) -> Option<semver::Version> {
    semver::Version::parse(v.strip_prefix('v').unwrap_or(v)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::repository::fake::{version_meta, FakeRepository};

    fn manager(repo: &Arc<FakeRepository>) -> ModVersionManager {
        ModVersionManager::new("geode.devtools".into(), repo.clone())
    }

    #[test]
    fn compare_orders_by_precedence() {
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("v1.0.0", "1.0.0-beta.2"), Ordering::Greater);
        assert_eq!(compare_versions("1.0.0", "nightly"), Ordering::Greater);
        assert_eq!(compare_versions("alpha", "beta"), Ordering::Less);
    }

    #[test]
    fn single_version_listing_marks_latest() {
        let repo = Arc::new(FakeRepository::default());
        let versions = manager(&repo);

        versions.load_listing(&[version_meta("geode.devtools", "1.2.0")]);
        let latest = versions.cached_latest().unwrap();
        assert_eq!(latest.version(), "1.2.0");
        assert!(Arc::ptr_eq(&latest, &versions.cached("1.2.0").unwrap()));
        assert!(latest.is_partial());
    }

    #[test]
    fn multi_version_listing_leaves_latest_unknown() {
        let repo = Arc::new(FakeRepository::default());
        let versions = manager(&repo);

        versions.load_listing(&[
            version_meta("geode.devtools", "1.0.0"),
            version_meta("geode.devtools", "1.10.0"),
            version_meta("geode.devtools", "1.2.0"),
        ]);

        assert!(versions.cached_latest().is_none());
        let listed: Vec<_> = versions.list().iter().map(|v| v.version().to_string()).collect();
        assert_eq!(listed, vec!["1.10.0", "1.2.0", "1.0.0"]);
    }

    #[tokio::test]
    async fn latest_is_requested_once_and_cached() {
        let repo = Arc::new(FakeRepository::default());
        repo.set_latest(version_meta("geode.devtools", "2.0.0"));
        let versions = manager(&repo);
        versions.load_listing(&[
            version_meta("geode.devtools", "1.0.0"),
            version_meta("geode.devtools", "2.0.0"),
        ]);
        let listed = versions.cached("2.0.0").unwrap();

        let latest = versions.latest().await.unwrap();
        assert!(Arc::ptr_eq(&latest, &listed));
        assert!(!latest.is_partial());

        let again = versions.latest().await.unwrap();
        assert!(Arc::ptr_eq(&latest, &again));
        assert_eq!(repo.calls_to("get_mod_latest_version"), 1);
    }

    #[tokio::test]
    async fn get_returns_cached_instance_even_if_partial() {
        let repo = Arc::new(FakeRepository::default());
        repo.add_version(version_meta("geode.devtools", "1.0.0"));
        let versions = manager(&repo);

        let first = versions.get("1.0.0").await.unwrap();
        assert!(!first.is_partial());
        let second = versions.get("1.0.0").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(repo.calls_to("get_mod_version"), 1);

        versions.load_listing(&[
            version_meta("geode.devtools", "0.9.0"),
            version_meta("geode.devtools", "1.0.0"),
        ]);
        let partial = versions.get("0.9.0").await.unwrap();
        assert!(partial.is_partial());
        assert_eq!(repo.calls_to("get_mod_version"), 1);
        // a listing never downgrades a hydrated version
        assert!(!versions.cached("1.0.0").unwrap().is_partial());
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_request() {
        let repo = Arc::new(FakeRepository::default().with_delay_ms(20));
        repo.add_version(version_meta("geode.devtools", "1.0.0"));
        let versions = Arc::new(manager(&repo));

        let (a, b) = tokio::join!(versions.get("1.0.0"), versions.get("1.0.0"));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(repo.calls_to("get_mod_version"), 1);
    }

    #[tokio::test]
    async fn fetch_all_hydrates_partial_versions() {
        let repo = Arc::new(FakeRepository::default());
        repo.add_version(version_meta("geode.devtools", "1.0.0"));
        repo.add_version(version_meta("geode.devtools", "1.1.0"));
        let versions = manager(&repo);
        versions.load_listing(&[
            version_meta("geode.devtools", "1.0.0"),
            version_meta("geode.devtools", "1.1.0"),
        ]);

        let all = versions.fetch_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|v| !v.is_partial()));
        assert_eq!(repo.calls_to("get_mod_version"), 2);

        versions.fetch_all().await.unwrap();
        assert_eq!(repo.calls_to("get_mod_version"), 2);
    }

    #[test]
    fn by_mod_shares_one_manager_per_mod() {
        let repo = Arc::new(FakeRepository::default());
        let versions = VersionManager::new(repo.clone());
        let a = versions.by_mod("geode.devtools");
        let b = versions.by_mod("geode.devtools");
        let c = versions.by_mod("geode.node-ids");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
