// In-memory `IndexRepository` for unit tests: serves canned payloads, counts
// calls per operation and scripts failures.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use url::Url;
use uuid::Uuid;

use super::{
    GetSelfModsParams, IndexRepository, ModSearchParams, UpdateModBody, UpdateSelfBody,
    UpdateVersionBody,
};
use crate::core::cache::{read_lock, write_lock};
use crate::core::error::{IndexError, IndexResult, AUTH_REQUIRED_MESSAGE};
use crate::core::models::{
    BeginLoginInfo, DeveloperMeta, GdVersionMeta, ModDeveloperMeta, ModMeta, ModStatus,
    ModVersionMeta, Paginated, SimpleModMeta, SimpleModVersionMeta,
};

const FAKE_BASE: &str = "https://index.test";

pub(crate) fn version_meta(mod_id: &str, version: &str) -> ModVersionMeta {
    ModVersionMeta {
        name: mod_id.to_string(),
        download_count: 0,
        description: None,
        early_load: false,
        api: false,
        geode: "4.0.0".into(),
        version: version.to_string(),
        download_link: format!("https://github.com/{}/releases/{}.geode", mod_id, version),
        hash: String::new(),
        gd: GdVersionMeta::All("2.206".into()),
        mod_id: mod_id.to_string(),
        dependencies: None,
        incompatibilities: None,
        status: ModStatus::Accepted,
    }
}

fn owner(mod_id: &str) -> ModDeveloperMeta {
    ModDeveloperMeta {
        id: 1,
        username: "fod".into(),
        display_name: format!("{} owner", mod_id),
        is_owner: true,
    }
}

/// A full mod record, `about` and `changelog` included.
pub(crate) fn mod_meta(id: &str, versions: &[&str]) -> ModMeta {
    let stamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    ModMeta {
        id: id.to_string(),
        repository: Some(format!("https://github.com/{}", id)),
        featured: false,
        developers: vec![owner(id)],
        download_count: 10,
        tags: vec!["utility".into()],
        versions: versions.iter().map(|v| version_meta(id, v)).collect(),
        about: Some(format!("About {}", id)),
        changelog: Some(format!("Changes of {}", id)),
        created_at: stamp,
        updated_at: stamp,
    }
}

pub(crate) fn simple_mod_meta(id: &str, versions: &[&str]) -> SimpleModMeta {
    SimpleModMeta {
        id: id.to_string(),
        featured: false,
        download_count: 10,
        versions: versions
            .iter()
            .map(|v| SimpleModVersionMeta {
                name: id.to_string(),
                version: v.to_string(),
                download_count: 5,
                validated: true,
            })
            .collect(),
        developers: vec![owner(id)],
    }
}

pub(crate) fn developer_meta(username: &str) -> DeveloperMeta {
    DeveloperMeta {
        id: 7,
        username: username.to_string(),
        display_name: username.to_string(),
        verified: true,
        admin: false,
    }
}

pub(crate) fn login_info() -> BeginLoginInfo {
    BeginLoginInfo {
        uuid: Uuid::new_v4(),
        interval: 1,
        uri: "https://github.com/login/device".into(),
        code: "ABCD-1234".into(),
    }
}

#[derive(Default)]
struct FakeState {
    mods: HashMap<String, ModMeta>,
    versions: HashMap<(String, String), ModVersionMeta>,
    latest: HashMap<String, ModVersionMeta>,
    listing: Vec<ModMeta>,
    self_mods: Vec<SimpleModMeta>,
    downloads: HashMap<(String, String), Vec<u8>>,
    update_failure: Option<String>,
    revoke_failure: Option<String>,
    me: Option<DeveloperMeta>,
    valid_tokens: HashSet<String>,
    login: Option<BeginLoginInfo>,
    polls: VecDeque<IndexResult<String>>,
}

#[derive(Default)]
pub(crate) struct FakeRepository {
    state: Mutex<FakeState>,
    calls: Mutex<Vec<&'static str>>,
    token: RwLock<Option<String>>,
    delay: Option<Duration>,
}

impl FakeRepository {
    /// Delay record lookups so concurrent callers overlap.
    pub(crate) fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Some(Duration::from_millis(ms));
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, op: &'static str) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(op);
    }

    pub(crate) fn calls_to(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| **c == op)
            .count()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub(crate) fn add_mod(&self, meta: ModMeta) {
        let mut state = self.state();
        for v in &meta.versions {
            state
                .versions
                .entry((meta.id.clone(), v.version.clone()))
                .or_insert_with(|| v.clone());
        }
        state.mods.insert(meta.id.clone(), meta);
    }

    pub(crate) fn add_version(&self, meta: ModVersionMeta) {
        self.state()
            .versions
            .insert((meta.mod_id.clone(), meta.version.clone()), meta);
    }

    pub(crate) fn set_latest(&self, meta: ModVersionMeta) {
        self.state().latest.insert(meta.mod_id.clone(), meta);
    }

    pub(crate) fn set_listing(&self, mods: Vec<ModMeta>) {
        self.state().listing = mods;
    }

    pub(crate) fn set_self_mods(&self, mods: Vec<SimpleModMeta>) {
        self.state().self_mods = mods;
    }

    pub(crate) fn add_download(&self, mod_id: &str, version: &str, data: Vec<u8>) {
        self.state()
            .downloads
            .insert((mod_id.to_string(), version.to_string()), data);
    }

    /// Make every update call fail with `message` until cleared.
    pub(crate) fn fail_updates(&self, message: &str) {
        self.state().update_failure = Some(message.to_string());
    }

    pub(crate) fn clear_update_failure(&self) {
        self.state().update_failure = None;
    }

    pub(crate) fn fail_revokes(&self, message: &str) {
        self.state().revoke_failure = Some(message.to_string());
    }

    /// Account returned by `get_self` for `token`.
    pub(crate) fn set_me(&self, meta: DeveloperMeta, token: &str) {
        let mut state = self.state();
        state.me = Some(meta);
        state.valid_tokens.insert(token.to_string());
    }

    /// Accept `token` without an account behind it.
    pub(crate) fn allow_token(&self, token: &str) {
        self.state().valid_tokens.insert(token.to_string());
    }

    pub(crate) fn me(&self) -> Option<DeveloperMeta> {
        self.state().me.clone()
    }

    pub(crate) fn set_login(&self, info: BeginLoginInfo) {
        self.state().login = Some(info);
    }

    /// Queue the outcome of the next poll. Unscripted polls report the
    /// challenge as not completed yet.
    pub(crate) fn script_poll(&self, result: IndexResult<String>) {
        self.state().polls.push_back(result);
    }

    fn check_update(&self) -> IndexResult<()> {
        match &self.state().update_failure {
            Some(message) => Err(IndexError::from_api(StatusCode::FORBIDDEN, message.clone())),
            None => Ok(()),
        }
    }

    fn check_token(&self) -> IndexResult<()> {
        let token = read_lock(&self.token).clone();
        let valid = token
            .map(|t| self.state().valid_tokens.contains(&t))
            .unwrap_or(false);
        if valid {
            Ok(())
        } else {
            Err(IndexError::from_api(StatusCode::UNAUTHORIZED, AUTH_REQUIRED_MESSAGE))
        }
    }

    fn revoke(&self) -> IndexResult<()> {
        write_lock(&self.token).take();
        match &self.state().revoke_failure {
            Some(message) => Err(IndexError::from_api(
                StatusCode::INTERNAL_SERVER_ERROR,
                message.clone(),
            )),
            None => Ok(()),
        }
    }
}

fn not_found(what: &str) -> IndexError {
    IndexError::from_api(StatusCode::NOT_FOUND, format!("{} not found", what))
}

#[async_trait]
impl IndexRepository for FakeRepository {
    async fn get_mods(&self, _params: &ModSearchParams) -> IndexResult<Paginated<ModMeta>> {
        self.record("get_mods");
        let data = self.state().listing.clone();
        Ok(Paginated {
            count: data.len() as u64,
            data,
        })
    }

    async fn get_mod(&self, id: &str) -> IndexResult<ModMeta> {
        self.record("get_mod");
        self.pause().await;
        self.state().mods.get(id).cloned().ok_or_else(|| not_found(id))
    }

    async fn get_mod_latest_version(&self, id: &str) -> IndexResult<ModVersionMeta> {
        self.record("get_mod_latest_version");
        self.pause().await;
        self.state().latest.get(id).cloned().ok_or_else(|| not_found(id))
    }

    async fn get_mod_version(&self, id: &str, version: &str) -> IndexResult<ModVersionMeta> {
        self.record("get_mod_version");
        self.pause().await;
        self.state()
            .versions
            .get(&(id.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| not_found(&format!("{}@{}", id, version)))
    }

    async fn create_mod(&self, _download_link: &str) -> IndexResult<()> {
        self.record("create_mod");
        self.check_update()
    }

    async fn create_mod_version(&self, _id: &str, _download_link: &str) -> IndexResult<()> {
        self.record("create_mod_version");
        self.check_update()
    }

    async fn update_mod(&self, _id: &str, _body: &UpdateModBody) -> IndexResult<()> {
        self.record("update_mod");
        self.check_update()
    }

    async fn update_mod_version(
        &self,
        _id: &str,
        _version: &str,
        _body: &UpdateVersionBody,
    ) -> IndexResult<()> {
        self.record("update_mod_version");
        self.check_update()
    }

    fn mod_logo_url(&self, id: &str) -> IndexResult<Url> {
        Ok(Url::parse(&format!("{}/v1/mods/{}/logo", FAKE_BASE, id))?)
    }

    async fn get_mod_logo_data(&self, _id: &str) -> IndexResult<Vec<u8>> {
        self.record("get_mod_logo_data");
        Ok(b"\x89PNG".to_vec())
    }

    fn mod_latest_download_url(&self, id: &str) -> IndexResult<Url> {
        Ok(Url::parse(&format!(
            "{}/v1/mods/{}/versions/latest/download",
            FAKE_BASE, id
        ))?)
    }

    fn mod_download_url(&self, id: &str, version: &str) -> IndexResult<Url> {
        Ok(Url::parse(&format!(
            "{}/v1/mods/{}/versions/{}/download",
            FAKE_BASE, id, version
        ))?)
    }

    async fn get_mod_latest_download_data(&self, id: &str) -> IndexResult<Vec<u8>> {
        self.record("get_mod_latest_download_data");
        let latest = self.state().latest.get(id).map(|v| v.version.clone());
        match latest {
            Some(version) => self.get_mod_download_data(id, &version).await,
            None => Err(not_found(id)),
        }
    }

    async fn get_mod_download_data(&self, id: &str, version: &str) -> IndexResult<Vec<u8>> {
        self.record("get_mod_download_data");
        self.state()
            .downloads
            .get(&(id.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| not_found(&format!("{}@{}", id, version)))
    }

    async fn get_self(&self) -> IndexResult<DeveloperMeta> {
        self.record("get_self");
        self.pause().await;
        self.check_token()?;
        self.state().me.clone().ok_or_else(|| not_found("developer"))
    }

    async fn update_self(&self, body: &UpdateSelfBody) -> IndexResult<()> {
        self.record("update_self");
        self.check_token()?;
        self.check_update()?;
        if let Some(me) = self.state().me.as_mut() {
            me.display_name = body.display_name.clone();
        }
        Ok(())
    }

    async fn get_self_mods(&self, _params: &GetSelfModsParams) -> IndexResult<Vec<SimpleModMeta>> {
        self.record("get_self_mods");
        Ok(self.state().self_mods.clone())
    }

    async fn begin_login_flow(&self) -> IndexResult<BeginLoginInfo> {
        self.record("begin_login_flow");
        Ok(self.state().login.clone().unwrap_or_else(login_info))
    }

    async fn poll_login(&self, _uuid: Uuid) -> IndexResult<String> {
        self.record("poll_login");
        self.pause().await;
        self.state().polls.pop_front().unwrap_or_else(|| {
            Err(IndexError::from_api(
                StatusCode::BAD_REQUEST,
                "Login not completed",
            ))
        })
    }

    fn set_token(&self, token: Option<String>) {
        *write_lock(&self.token) = token;
    }

    fn token(&self) -> Option<String> {
        read_lock(&self.token).clone()
    }

    async fn delete_token(&self) -> IndexResult<()> {
        self.record("delete_token");
        self.revoke()
    }

    async fn delete_all_tokens(&self) -> IndexResult<()> {
        self.record("delete_all_tokens");
        self.revoke()
    }
}
