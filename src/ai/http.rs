use crate::error::ProviderFailure;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Bearer-authenticated REST client shared by the provider adapters.
///
/// Every request carries the adapter's timeout, so a hung backend can only
/// stall a single call.
pub struct ProviderHttp {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
    provider: &'static str,
}

impl ProviderHttp {
    pub fn new(
        client: Client,
        provider: &'static str,
        api_key: String,
        base_url: String,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            provider,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Starts an authenticated POST against `path` on the provider's base URL.
    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
    }

    /// Sends a request and turns transport errors and non-success statuses
    /// into [`ProviderFailure`]s.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ProviderFailure> {
        let response = request.send().await.map_err(|e| {
            tracing::error!("Failed to send request to {}: {}", self.provider, e);
            e
        })?;

        if !response.status().is_success() {
            let failure = ProviderFailure::from_response(response).await;
            tracing::error!("{} API error: {}", self.provider, failure);
            return Err(failure);
        }

        Ok(response)
    }

    pub async fn post_json<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Resp, ProviderFailure> {
        let response = self.send(self.post(path).json(request)).await?;
        self.parse(response).await
    }

    pub async fn get_json<Resp: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Resp, ProviderFailure> {
        let response = self.send(self.get(path)).await?;
        self.parse(response).await
    }

    /// Fetches a delivery URL handed out by the provider.
    ///
    /// Output URLs point at public storage, so the bearer token is not sent.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, ProviderFailure> {
        let response = self
            .send(self.client.get(url).timeout(self.timeout))
            .await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn parse<Resp: DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<Resp, ProviderFailure> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                "Failed to parse {} response: {}\nBody: {}",
                self.provider,
                e,
                body
            );
            ProviderFailure::MalformedResponse(format!(
                "failed to parse {} response: {}",
                self.provider, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http(server: &MockServer) -> ProviderHttp {
        ProviderHttp::new(
            Client::new(),
            "test",
            "secret".to_string(),
            format!("{}/", server.uri()),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_get_json_sends_bearer_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/thing"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let value: Value = http(&server).get_json("/v1/thing").await.unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_non_success_status_is_captured() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/thing"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let err = http(&server)
            .post_json::<_, Value>("/v1/thing", &serde_json::json!({}))
            .await
            .unwrap_err();
        match err {
            ProviderFailure::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad token");
            }
            other => panic!("unexpected failure: {}", other),
        }
    }

    #[tokio::test]
    async fn test_unparseable_body_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/thing"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = http(&server)
            .get_json::<Value>("/v1/thing")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderFailure::MalformedResponse(_)));
    }
}
