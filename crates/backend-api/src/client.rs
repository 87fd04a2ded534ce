use std::time::Duration;

use reqwest::header::{CACHE_CONTROL, CONNECTION, PRAGMA};
use url::Url;

use crate::backend::{BoxFuture, SessionBackend};
use crate::error::Error;
use crate::types::*;

const DEFAULT_SAVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Reqwest-backed implementation of [`SessionBackend`].
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    save_timeout: Duration,
}

impl BackendClient {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, Error> {
        let mut base_url = Url::parse(base_url.as_ref())?;
        // Url::join drops the last path segment unless the base ends in '/'.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            api_key: None,
            save_timeout: DEFAULT_SAVE_TIMEOUT,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_save_timeout(mut self, timeout: Duration) -> Self {
        self.save_timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(Error::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, Error>
    where
        Req: serde::Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        let response = self
            .request(reqwest::Method::POST, self.url(path)?)
            .json(body)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_json_no_body_response<Req>(&self, path: &str, body: &Req) -> Result<(), Error>
    where
        Req: serde::Serialize,
    {
        let response = self
            .request(reqwest::Method::POST, self.url(path)?)
            .json(body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

impl SessionBackend for BackendClient {
    fn end_existing(&self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            self.post_json_no_body_response("session/end-existing", &serde_json::json!({}))
                .await
        })
    }

    fn fetch_credential(&self) -> BoxFuture<'_, Result<Credential, Error>> {
        Box::pin(async move {
            let response = self
                .request(reqwest::Method::GET, self.url("session/credential")?)
                .send()
                .await?;
            Ok(Self::check(response).await?.json().await?)
        })
    }

    fn start_session(
        &self,
        req: StartSessionRequest,
    ) -> BoxFuture<'_, Result<StartSessionResponse, Error>> {
        Box::pin(async move { self.post_json("session/start", &req).await })
    }

    fn heartbeat(&self, req: HeartbeatRequest) -> BoxFuture<'_, Result<HeartbeatResponse, Error>> {
        Box::pin(async move { self.post_json("session/heartbeat", &req).await })
    }

    fn session_status(&self, query: StatusQuery) -> BoxFuture<'_, Result<SessionStatus, Error>> {
        Box::pin(async move {
            let response = self
                .request(reqwest::Method::GET, self.url("session/status")?)
                .query(&query)
                .send()
                .await?;
            Ok(Self::check(response).await?.json().await?)
        })
    }

    fn end_session(&self, req: EndSessionRequest) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move { self.post_json_no_body_response("session/end", &req).await })
    }

    fn save_transcript(
        &self,
        req: SaveTranscriptRequest,
        mode: SaveMode,
    ) -> BoxFuture<'_, Result<SaveTranscriptResponse, Error>> {
        Box::pin(async move {
            let mut builder = self
                .request(reqwest::Method::POST, self.url("transcript/save")?)
                .timeout(self.save_timeout)
                .json(&req);

            if mode == SaveMode::Bypass {
                builder = builder
                    .header(CACHE_CONTROL, "no-cache, no-store")
                    .header(PRAGMA, "no-cache")
                    .header(CONNECTION, "keep-alive");
            }

            let response = builder.send().await?;
            Ok(Self::check(response).await?.json().await?)
        })
    }

    fn analyze_transcript(&self, req: AnalyzeRequest) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            self.post_json_no_body_response("transcript/analyze", &req)
                .await
        })
    }
}
