//! Transport: fetch bytes from a URL
//!
//! [`Getters`] maps URL schemes to [`Fetcher`] implementations. The default
//! set handles `http`, `https` and `file`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::credentials::{ResolvedCredentials, same_origin};
use crate::error::{RepoError, Result};

/// Fetches the content behind a URL
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str, credentials: Option<&ResolvedCredentials>) -> Result<Vec<u8>>;
}

/// Fetchers by URL scheme
#[derive(Clone)]
pub struct Getters {
    by_scheme: HashMap<String, Arc<dyn Fetcher>>,
}

impl std::fmt::Debug for Getters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<_> = self.by_scheme.keys().collect();
        schemes.sort();
        f.debug_struct("Getters").field("schemes", &schemes).finish()
    }
}

impl Getters {
    /// The default registry: `http`, `https` and `file`
    pub fn new() -> Result<Self> {
        let mut getters = Self::empty();
        let http: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new()?);
        getters.register("http", http.clone());
        getters.register("https", http);
        getters.register("file", Arc::new(FileFetcher));
        Ok(getters)
    }

    /// An empty registry
    pub fn empty() -> Self {
        Self {
            by_scheme: HashMap::new(),
        }
    }

    /// Register a fetcher for a scheme, replacing any previous one
    pub fn register(&mut self, scheme: &str, fetcher: Arc<dyn Fetcher>) {
        self.by_scheme.insert(scheme.to_ascii_lowercase(), fetcher);
    }

    /// The fetcher for a scheme
    pub fn by_scheme(&self, scheme: &str) -> Result<Arc<dyn Fetcher>> {
        self.by_scheme
            .get(&scheme.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| RepoError::UnsupportedScheme {
                scheme: scheme.to_string(),
            })
    }

    /// Fetch a URL with the fetcher registered for its scheme
    pub async fn get(
        &self,
        url: &str,
        credentials: Option<&ResolvedCredentials>,
    ) -> Result<Vec<u8>> {
        let parsed = Url::parse(url).map_err(|e| RepoError::InvalidRepositoryUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        self.by_scheme(parsed.scheme())?.get(url, credentials).await
    }
}

/// HTTP(S) fetcher with manual redirect handling.
///
/// Credentials are never sent after a redirect to another origin.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_redirects: u32,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("kinflate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client))
    }

    /// Use a preconfigured client; it must not follow redirects itself
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            max_redirects: 10,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str, credentials: Option<&ResolvedCredentials>) -> Result<Vec<u8>> {
        let mut current_url = url.to_string();
        let mut redirects = 0;

        loop {
            let mut request = self.client.get(&current_url);

            if let Some(creds) = credentials {
                if same_origin(url, &current_url) {
                    request = request.header(reqwest::header::AUTHORIZATION, creds.auth_header());
                } else {
                    tracing::warn!(
                        "cross-origin redirect from {} to {} - credentials not forwarded",
                        url,
                        current_url
                    );
                }
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_redirection() {
                redirects += 1;
                if redirects > self.max_redirects {
                    return Err(RepoError::NetworkError {
                        message: format!("too many redirects (max {})", self.max_redirects),
                    });
                }
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| RepoError::NetworkError {
                        message: "redirect without Location header".to_string(),
                    })?;
                current_url = Url::parse(&current_url)?.join(location)?.to_string();
                continue;
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(RepoError::AuthRequired { url: current_url });
            }
            if status == reqwest::StatusCode::FORBIDDEN {
                return Err(RepoError::AuthFailed {
                    message: format!("access denied to {}", current_url),
                });
            }
            if !status.is_success() {
                return Err(RepoError::HttpError {
                    status: status.as_u16(),
                    url: current_url,
                });
            }

            let bytes = response.bytes().await.map_err(|e| RepoError::NetworkError {
                message: e.to_string(),
            })?;
            return Ok(bytes.to_vec());
        }
    }
}

/// Reads `file://` URLs from the local filesystem
pub struct FileFetcher;

#[async_trait]
impl Fetcher for FileFetcher {
    async fn get(&self, url: &str, _credentials: Option<&ResolvedCredentials>) -> Result<Vec<u8>> {
        let path = Url::parse(url)?
            .to_file_path()
            .map_err(|_| RepoError::InvalidRepositoryUrl {
                url: url.to_string(),
                reason: "not a local file path".to_string(),
            })?;
        Ok(tokio::fs::read(&path).await?)
    }
}
