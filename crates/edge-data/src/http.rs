//! HTTP render pipeline against a running origin.

use async_trait::async_trait;
use reqwest::{redirect, Client, Url};

use edge_core::{Headers, PrerenderRequest, RenderedResponse};

use crate::client::{FetchError, RenderPipeline};
use crate::timeout::TimeoutConfig;

/// Renders paths by requesting them from the application's origin.
///
/// Redirects are not followed: the response for the path itself is what gets
/// prerendered.
#[derive(Debug, Clone)]
pub struct HttpPipeline {
    client: Client,
    origin: Url,
}

impl HttpPipeline {
    /// Create a pipeline for an origin such as `http://localhost:3000`.
    pub fn new(origin: &str, timeouts: TimeoutConfig) -> Result<Self, FetchError> {
        let origin = Url::parse(origin)
            .map_err(|e| FetchError::Pipeline(format!("invalid origin '{}': {}", origin, e)))?;

        let client = Client::builder()
            .user_agent(concat!("edge-prerender/", env!("CARGO_PKG_VERSION")))
            .redirect(redirect::Policy::none())
            .connect_timeout(timeouts.connect)
            .build()
            .map_err(|e| FetchError::Pipeline(e.to_string()))?;

        Ok(Self { client, origin })
    }

    /// The origin requests are resolved against.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Resolve a prerender path to a full URL on the origin.
    ///
    /// Only the path and query are taken from `path`; scheme, host and port
    /// always come from the origin.
    pub fn url_for(&self, path: &str) -> Result<Url, FetchError> {
        if !path.starts_with('/') || path.starts_with("//") {
            return Err(FetchError::Pipeline(format!(
                "invalid path '{}': must be origin-relative",
                path
            )));
        }

        let path = path.split_once('#').map_or(path, |(before, _)| before);
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };

        let mut url = self.origin.clone();
        url.set_path(path);
        url.set_query(query);
        url.set_fragment(None);
        Ok(url)
    }
}

#[async_trait]
impl RenderPipeline for HttpPipeline {
    async fn render(&self, request: &PrerenderRequest) -> Result<RenderedResponse, FetchError> {
        let url = self.url_for(request.path())?;

        let mut builder = self.client.get(url);
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let resp = builder.send().await.map_err(map_reqwest_error)?;

        let status = resp.status().as_u16();
        let headers: Headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await.map_err(map_reqwest_error)?.to_vec();

        Ok(RenderedResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_connect() {
        FetchError::Connection(e.to_string())
    } else {
        FetchError::Pipeline(e.to_string())
    }
}
