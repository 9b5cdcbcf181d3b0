use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::{
    GetSelfModsParams, IndexRepository, ModSearchParams, UpdateModBody, UpdateSelfBody,
    UpdateVersionBody,
};
use crate::core::cache::{read_lock, write_lock};
use crate::core::config::IndexConfig;
use crate::core::error::{IndexError, IndexResult};
use crate::core::http::build_http_client;
use crate::core::models::{
    BeginLoginInfo, DeveloperMeta, ModMeta, ModVersionMeta, Paginated, SimpleModMeta,
};

/// Every JSON response from the index is wrapped in this envelope.
/// A non-empty `error` means failure regardless of the HTTP status.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    error: String,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

/// `IndexRepository` backed by the live HTTP API.
#[derive(Debug)]
pub struct IndexRepositoryLive {
    client: Client,
    base_url: Url,
    token: RwLock<Option<String>>,
}

impl IndexRepositoryLive {
    pub fn new(config: &IndexConfig) -> IndexResult<Self> {
        let client = build_http_client(config)?;
        Self::with_client(client, &config.base_url)
    }

    /// Use an already configured client, e.g. one shared with other services.
    pub fn with_client(client: Client, base_url: &str) -> IndexResult<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))?;
        if base_url.cannot_be_a_base() {
            return Err(IndexError::Config(format!(
                "{} cannot be used as an index base URL",
                base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> IndexResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                IndexError::Config(format!("{} cannot be used as a base URL", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Attach the bearer token when one is set.
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, auth: bool) -> IndexResult<T> {
        debug!("GET {}", url);
        let mut request = self.client.get(url);
        if auth {
            request = self.authorized(request);
        }
        decode(request.send().await?).await
    }

    async fn get_bytes(&self, url: Url) -> IndexResult<Vec<u8>> {
        debug!("GET {} (binary)", url);
        let response = self.authorized(self.client.get(url)).send().await?;

        let status = response.status();
        let body = response.bytes().await?;
        if status != StatusCode::OK {
            return Err(failure(status, &body));
        }
        Ok(body.to_vec())
    }

    async fn send_no_content(&self, request: RequestBuilder) -> IndexResult<()> {
        expect_no_content(self.authorized(request).send().await?).await
    }

    fn take_token(&self) -> Option<String> {
        write_lock(&self.token).take()
    }
}

#[async_trait]
impl IndexRepository for IndexRepositoryLive {
    async fn get_mods(&self, params: &ModSearchParams) -> IndexResult<Paginated<ModMeta>> {
        let url = self.endpoint(&["v1", "mods"])?;
        debug!("GET {} {:?}", url, params);

        let mut request = self.client.get(url).query(&search_query(params));
        if params.pending_validation {
            request = self.authorized(request);
        }
        decode(request.send().await?).await
    }

    async fn get_mod(&self, id: &str) -> IndexResult<ModMeta> {
        let url = self.endpoint(&["v1", "mods", id])?;
        self.get_json(url, true).await
    }

    async fn get_mod_latest_version(&self, id: &str) -> IndexResult<ModVersionMeta> {
        let url = self.endpoint(&["v1", "mods", id, "versions", "latest"])?;
        self.get_json(url, false).await
    }

    async fn get_mod_version(&self, id: &str, version: &str) -> IndexResult<ModVersionMeta> {
        let url = self.endpoint(&["v1", "mods", id, "versions", version])?;
        self.get_json(url, true).await
    }

    async fn create_mod(&self, download_link: &str) -> IndexResult<()> {
        let url = self.endpoint(&["v1", "mods"])?;
        debug!("POST {}", url);
        let request = self
            .client
            .post(url)
            .json(&serde_json::json!({ "download_link": download_link }));
        self.send_no_content(request).await
    }

    async fn create_mod_version(&self, id: &str, download_link: &str) -> IndexResult<()> {
        let url = self.endpoint(&["v1", "mods", id, "versions"])?;
        debug!("POST {}", url);
        let request = self
            .client
            .post(url)
            .json(&serde_json::json!({ "download_link": download_link }));
        self.send_no_content(request).await
    }

    async fn update_mod(&self, id: &str, body: &UpdateModBody) -> IndexResult<()> {
        let url = self.endpoint(&["v1", "mods", id])?;
        debug!("PUT {}", url);
        self.send_no_content(self.client.put(url).json(body)).await
    }

    async fn update_mod_version(
        &self,
        id: &str,
        version: &str,
        body: &UpdateVersionBody,
    ) -> IndexResult<()> {
        let url = self.endpoint(&["v1", "mods", id, "versions", version])?;
        debug!("PUT {}", url);
        self.send_no_content(self.client.put(url).json(body)).await
    }

    fn mod_logo_url(&self, id: &str) -> IndexResult<Url> {
        self.endpoint(&["v1", "mods", id, "logo"])
    }

    async fn get_mod_logo_data(&self, id: &str) -> IndexResult<Vec<u8>> {
        let url = self.mod_logo_url(id)?;
        self.get_bytes(url).await
    }

    fn mod_latest_download_url(&self, id: &str) -> IndexResult<Url> {
        self.endpoint(&["v1", "mods", id, "versions", "latest", "download"])
    }

    fn mod_download_url(&self, id: &str, version: &str) -> IndexResult<Url> {
        self.endpoint(&["v1", "mods", id, "versions", version, "download"])
    }

    async fn get_mod_latest_download_data(&self, id: &str) -> IndexResult<Vec<u8>> {
        let url = self.mod_latest_download_url(id)?;
        self.get_bytes(url).await
    }

    async fn get_mod_download_data(&self, id: &str, version: &str) -> IndexResult<Vec<u8>> {
        let url = self.mod_download_url(id, version)?;
        self.get_bytes(url).await
    }

    async fn get_self(&self) -> IndexResult<DeveloperMeta> {
        let url = self.endpoint(&["v1", "me"])?;
        self.get_json(url, true).await
    }

    async fn update_self(&self, body: &UpdateSelfBody) -> IndexResult<()> {
        let url = self.endpoint(&["v1", "me"])?;
        debug!("PUT {}", url);
        self.send_no_content(self.client.put(url).json(body)).await
    }

    async fn get_self_mods(&self, params: &GetSelfModsParams) -> IndexResult<Vec<SimpleModMeta>> {
        let url = self.endpoint(&["v1", "me", "mods"])?;
        debug!("GET {}", url);

        let mut request = self.authorized(self.client.get(url));
        if let Some(validated) = params.validated {
            request = request.query(&[("validated", validated.to_string())]);
        }
        decode(request.send().await?).await
    }

    async fn begin_login_flow(&self) -> IndexResult<BeginLoginInfo> {
        let url = self.endpoint(&["v1", "login", "github"])?;
        debug!("POST {}", url);
        decode(self.client.post(url).send().await?).await
    }

    async fn poll_login(&self, uuid: Uuid) -> IndexResult<String> {
        let url = self.endpoint(&["v1", "login", "github", "poll"])?;
        debug!("POST {} for {}", url, uuid);
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "uuid": uuid }))
            .send()
            .await?;
        decode(response).await
    }

    fn set_token(&self, token: Option<String>) {
        *write_lock(&self.token) = token;
    }

    fn token(&self) -> Option<String> {
        read_lock(&self.token).clone()
    }

    async fn delete_token(&self) -> IndexResult<()> {
        let url = self.endpoint(&["v1", "me", "token"])?;
        debug!("DELETE {}", url);
        let token = self.take_token();
        revoke(self.client.delete(url), token).await
    }

    async fn delete_all_tokens(&self) -> IndexResult<()> {
        let url = self.endpoint(&["v1", "me", "tokens"])?;
        debug!("DELETE {}", url);
        let token = self.take_token();
        revoke(self.client.delete(url), token).await
    }
}

async fn revoke(request: RequestBuilder, token: Option<String>) -> IndexResult<()> {
    let request = match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    };
    expect_no_content(request.send().await?).await
}

fn search_query(params: &ModSearchParams) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();

    if let Some(page) = params.page {
        query.push(("page", page.to_string()));
    }
    if let Some(per_page) = params.per_page {
        query.push(("per_page", per_page.to_string()));
    }
    if let Some(developer) = &params.developer {
        query.push(("developer", developer.clone()));
    }
    if params.pending_validation {
        query.push(("pending_validation", "true".to_string()));
    }
    if let Some(featured) = params.featured {
        query.push(("featured", featured.to_string()));
    }
    if !params.tags.is_empty() {
        query.push(("tags", params.tags.join(",")));
    }
    if !params.platforms.is_empty() {
        let platforms: Vec<&str> = params.platforms.iter().map(|p| p.as_str()).collect();
        query.push(("platforms", platforms.join(",")));
    }
    if let Some(q) = params.query.as_deref().filter(|q| !q.is_empty()) {
        query.push(("query", q.to_string()));
    }
    if let Some(gd) = params.gd.as_deref().filter(|gd| !gd.is_empty()) {
        query.push(("gd", gd.to_string()));
    }
    if let Some(sort) = params.sort {
        query.push(("sort", sort.as_str().to_string()));
    }

    query
}

/// Decode a `200` envelope into its payload.
async fn decode<T: DeserializeOwned>(response: Response) -> IndexResult<T> {
    let status = response.status();
    let body = response.bytes().await?;

    let envelope: Envelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) if status == StatusCode::OK => return Err(IndexError::Json(e)),
        Err(_) => return Err(unexpected_status(status)),
    };

    if !envelope.error.is_empty() {
        return Err(IndexError::from_api(status, envelope.error));
    }
    if status != StatusCode::OK {
        return Err(unexpected_status(status));
    }

    match envelope.payload {
        Some(payload) => Ok(serde_json::from_value(payload)?),
        None => Err(IndexError::InvalidResponse(
            "response envelope has no payload".into(),
        )),
    }
}

async fn expect_no_content(response: Response) -> IndexResult<()> {
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(());
    }

    let body = response.bytes().await?;
    Err(failure(status, &body))
}

/// Build the error for a response that did not have the expected status.
fn failure(status: StatusCode, body: &[u8]) -> IndexError {
    match serde_json::from_slice::<Envelope>(body) {
        Ok(envelope) if !envelope.error.is_empty() => IndexError::from_api(status, envelope.error),
        _ => unexpected_status(status),
    }
}

fn unexpected_status(status: StatusCode) -> IndexError {
    IndexError::from_api(status, format!("Unexpected response status {}", status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Platform;
    use crate::core::repository::ModSort;

    #[test]
    fn empty_search_sends_no_parameters() {
        assert!(search_query(&ModSearchParams::default()).is_empty());
    }

    #[test]
    fn search_joins_lists_and_keeps_featured_value() {
        let params = ModSearchParams {
            page: Some(2),
            per_page: Some(25),
            featured: Some(false),
            tags: vec!["gameplay".into(), "offline".into()],
            platforms: vec![Platform::Win, Platform::Mac],
            query: Some("".into()),
            sort: Some(ModSort::RecentlyPublished),
            ..Default::default()
        };

        let query = search_query(&params);
        assert_eq!(
            query,
            vec![
                ("page", "2".to_string()),
                ("per_page", "25".to_string()),
                ("featured", "false".to_string()),
                ("tags", "gameplay,offline".to_string()),
                ("platforms", "win,mac".to_string()),
                ("sort", "recently_published".to_string()),
            ]
        );
    }

    #[test]
    fn endpoint_appends_segments_to_base_path() {
        let repo = IndexRepositoryLive::with_client(Client::new(), "https://example.com/api/")
            .unwrap();
        let url = repo.endpoint(&["v1", "mods", "geode.devtools"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/v1/mods/geode.devtools");
    }

    #[test]
    fn rejects_non_base_urls() {
        let result = IndexRepositoryLive::with_client(Client::new(), "mailto:index@example.com");
        assert!(matches!(result, Err(IndexError::Config(_))));
    }

    #[test]
    fn failure_prefers_envelope_message() {
        let body = br#"{"error":"Login attempt expired","payload":null}"#;
        let err = failure(StatusCode::BAD_REQUEST, body);
        assert!(matches!(err, IndexError::LoginExpired(_)));

        let err = failure(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>");
        assert!(matches!(err, IndexError::Api { status: 502, .. }));
    }
}
