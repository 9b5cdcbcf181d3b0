// ─── Remote Gateway ───
// One operation per index endpoint. Implementations map transport and API
// failures into `IndexError` and hand back decoded payloads.

#[cfg(test)]
pub(crate) mod fake;
mod live;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::core::error::{IndexError, IndexResult};
use crate::core::models::{
    BeginLoginInfo, DeveloperMeta, ModMeta, ModStatus, ModVersionMeta, Paginated, Platform,
    SimpleModMeta,
};

pub use live::IndexRepositoryLive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModSort {
    Downloads,
    RecentlyUpdated,
    RecentlyPublished,
    Name,
    NameReverse,
}

impl ModSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModSort::Downloads => "downloads",
            ModSort::RecentlyUpdated => "recently_updated",
            ModSort::RecentlyPublished => "recently_published",
            ModSort::Name => "name",
            ModSort::NameReverse => "name_reverse",
        }
    }
}

impl fmt::Display for ModSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModSort {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "downloads" => Ok(ModSort::Downloads),
            "recently_updated" => Ok(ModSort::RecentlyUpdated),
            "recently_published" => Ok(ModSort::RecentlyPublished),
            "name" => Ok(ModSort::Name),
            "name_reverse" => Ok(ModSort::NameReverse),
            other => Err(IndexError::InvalidValue {
                kind: "sort order",
                value: other.to_string(),
            }),
        }
    }
}

/// Filters for `GET /v1/mods`. Unset fields are not sent.
#[derive(Debug, Clone, Default)]
pub struct ModSearchParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub developer: Option<String>,
    /// Lists mods awaiting review; needs an admin token.
    pub pending_validation: bool,
    pub featured: Option<bool>,
    pub tags: Vec<String>,
    pub platforms: Vec<Platform>,
    pub query: Option<String>,
    pub gd: Option<String>,
    pub sort: Option<ModSort>,
}

#[derive(Debug, Clone, Default)]
pub struct GetSelfModsParams {
    pub validated: Option<bool>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UpdateModBody {
    pub featured: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UpdateVersionBody {
    pub status: ModStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UpdateSelfBody {
    pub display_name: String,
}

#[async_trait]
pub trait IndexRepository: Send + Sync {
    async fn get_mods(&self, params: &ModSearchParams) -> IndexResult<Paginated<ModMeta>>;
    async fn get_mod(&self, id: &str) -> IndexResult<ModMeta>;

    async fn get_mod_latest_version(&self, id: &str) -> IndexResult<ModVersionMeta>;
    async fn get_mod_version(&self, id: &str, version: &str) -> IndexResult<ModVersionMeta>;

    async fn create_mod(&self, download_link: &str) -> IndexResult<()>;
    async fn create_mod_version(&self, id: &str, download_link: &str) -> IndexResult<()>;

    async fn update_mod(&self, id: &str, body: &UpdateModBody) -> IndexResult<()>;
    async fn update_mod_version(
        &self,
        id: &str,
        version: &str,
        body: &UpdateVersionBody,
    ) -> IndexResult<()>;

    fn mod_logo_url(&self, id: &str) -> IndexResult<Url>;
    async fn get_mod_logo_data(&self, id: &str) -> IndexResult<Vec<u8>>;

    fn mod_latest_download_url(&self, id: &str) -> IndexResult<Url>;
    fn mod_download_url(&self, id: &str, version: &str) -> IndexResult<Url>;

    async fn get_mod_latest_download_data(&self, id: &str) -> IndexResult<Vec<u8>>;
    async fn get_mod_download_data(&self, id: &str, version: &str) -> IndexResult<Vec<u8>>;

    async fn get_self(&self) -> IndexResult<DeveloperMeta>;
    async fn update_self(&self, body: &UpdateSelfBody) -> IndexResult<()>;
    async fn get_self_mods(&self, params: &GetSelfModsParams) -> IndexResult<Vec<SimpleModMeta>>;

    async fn begin_login_flow(&self) -> IndexResult<BeginLoginInfo>;
    /// Resolves to the session token once the challenge was authorized.
    async fn poll_login(&self, uuid: Uuid) -> IndexResult<String>;

    /// Replace the bearer token. Takes effect on the next request.
    fn set_token(&self, token: Option<String>);
    fn token(&self) -> Option<String>;
    /// Revoke the current token. The local token is cleared either way.
    async fn delete_token(&self) -> IndexResult<()>;
    /// Revoke every token of the account. The local token is cleared either way.
    async fn delete_all_tokens(&self) -> IndexResult<()>;
}
