use async_trait::async_trait;
use reqwest::{Request, Response};

/// Transport used by [`HttpFetcher`](super::HttpFetcher). Swapped out in tests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
