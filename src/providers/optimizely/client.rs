use std::time::Duration;

use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::auth::Token;
use crate::error::{Result, WatchError};
use crate::report::TimeWindow;

use super::types::{ChangeEvent, EntityId, ExperimentDetail, PageDetail};

/// Read-only client for the Optimizely REST API (v2).
///
/// Every call returns a typed error instead of retrying: a failed fetch is the
/// caller's signal to leave that unit out of the run.
pub struct OptimizelyClient {
    client: Client,
    api_url: Url,
    token: Token,
    per_page: usize,
    max_pages: usize,
}

impl OptimizelyClient {
    pub fn new(
        base_url: &str,
        token: Token,
        request_timeout: Duration,
        per_page: usize,
        max_pages: usize,
    ) -> Result<Self> {
        if token.is_empty() {
            return Err(WatchError::Config("API token cannot be empty".to_string()));
        }

        let client = Client::builder()
            .user_agent(concat!("launchwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .map_err(|e| WatchError::Config(format!("Failed to create HTTP client: {e}")))?;

        // Url::join drops the last path segment unless the base ends with '/'
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let api_url =
            Url::parse(&base).map_err(|e| WatchError::Config(format!("Invalid base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
            per_page: per_page.max(1),
            max_pages: max_pages.max(1),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path)
            .map_err(|e| WatchError::Config(format!("Invalid endpoint URL: {e}")))
    }

    /// Fetches the change history of a project for the window, following
    /// pagination until a short page or `max_pages` is reached.
    pub async fn fetch_changes(
        &self,
        project_id: EntityId,
        window: &TimeWindow,
    ) -> Result<Vec<ChangeEvent>> {
        let mut events = Vec::new();

        for page in 1..=self.max_pages {
            let mut url = self.endpoint("changes")?;
            url.query_pairs_mut()
                .append_pair("project_id", &project_id.to_string())
                .append_pair("start_time", &window.start_iso())
                .append_pair("end_time", &window.end_iso())
                .append_pair("per_page", &self.per_page.to_string())
                .append_pair("page", &page.to_string());

            let batch: Vec<Value> = self
                .get_json(url, &format!("change history of project {project_id}"))
                .await?;
            let fetched = batch.len();
            events.extend(batch.into_iter().filter_map(|record| {
                serde_json::from_value::<ChangeEvent>(record)
                    .map_err(|e| debug!("Ignoring unreadable change record: {e}"))
                    .ok()
            }));

            if fetched < self.per_page {
                break;
            }
            if page == self.max_pages {
                warn!(
                    "Change history of project {project_id} truncated at {} pages",
                    self.max_pages
                );
            }
        }

        Ok(events)
    }

    pub async fn fetch_experiment(&self, experiment_id: EntityId) -> Result<ExperimentDetail> {
        let url = self.endpoint(&format!("experiments/{experiment_id}"))?;
        self.get_json(url, &format!("experiment {experiment_id}"))
            .await
    }

    pub async fn fetch_page(&self, page_id: EntityId) -> Result<PageDetail> {
        let url = self.endpoint(&format!("pages/{page_id}"))?;
        self.get_json(url, &format!("page {page_id}")).await
    }

    async fn get_json<T>(&self, url: Url, resource: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        debug!("GET {url}");

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(self.token.as_str())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(WatchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let parsed: Option<T> = serde_json::from_str(&body)?;
        parsed.ok_or_else(|| WatchError::EmptyResponse(resource.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mockito::Matcher;
    use tokio_test::assert_err;

    fn client_for(server: &mockito::ServerGuard, per_page: usize) -> OptimizelyClient {
        OptimizelyClient::new(
            &server.url(),
            Token::from("test-token"),
            Duration::from_secs(5),
            per_page,
            5,
        )
        .unwrap()
    }

    fn window() -> TimeWindow {
        TimeWindow::ending_at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(), 60)
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = OptimizelyClient::new(
            "https://api.optimizely.com/v2",
            Token::from("t"),
            Duration::from_secs(1),
            25,
            1,
        )
        .unwrap();

        assert_eq!(
            client.endpoint("experiments/5").unwrap().as_str(),
            "https://api.optimizely.com/v2/experiments/5"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = OptimizelyClient::new(
            "not a url",
            Token::from("t"),
            Duration::from_secs(1),
            25,
            1,
        );
        assert!(matches!(result, Err(WatchError::Config(_))));
    }

    #[test]
    fn test_empty_token_is_rejected() {
        let result = OptimizelyClient::new(
            "https://api.optimizely.com/v2/",
            Token::from("   "),
            Duration::from_secs(1),
            25,
            1,
        );
        assert!(matches!(result, Err(WatchError::Config(_))));
    }

    #[tokio::test]
    async fn test_fetch_experiment_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/experiments/77")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 77, "audience_conditions": "everyone", "page_ids": [1]}"#)
            .create_async()
            .await;

        let experiment = client_for(&server, 25).fetch_experiment(77).await.unwrap();

        mock.assert_async().await;
        assert_eq!(experiment.id, Some(77));
        assert_eq!(experiment.page_ids, vec![1]);
    }

    #[tokio::test]
    async fn test_fetch_changes_sends_window_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/changes")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("project_id".into(), "123".into()),
                Matcher::UrlEncoded("start_time".into(), "2024-03-01T11:00:00.000Z".into()),
                Matcher::UrlEncoded("end_time".into(), "2024-03-01T12:00:00.000Z".into()),
                Matcher::UrlEncoded("per_page".into(), "25".into()),
                Matcher::UrlEncoded("page".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(r#"[{"entity": {"id": 1, "name": "A"}, "changes": []}]"#)
            .create_async()
            .await;

        let events = client_for(&server, 25)
            .fetch_changes(123, &window())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_changes_follows_pages() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/changes")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_body(r#"[{"entity": {"id": 1}}, {"entity": {"id": 2}}]"#)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/changes")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(r#"[{"entity": {"id": 3}}]"#)
            .create_async()
            .await;

        let events = client_for(&server, 2)
            .fetch_changes(1, &window())
            .await
            .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_changes_skips_unreadable_records() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/changes")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"["deleted", {"entity": {"id": "snippet-1"}}, {"entity": {"id": 501}, "changes": [{"property": "status", "after": "running"}]}]"#,
            )
            .create_async()
            .await;

        let events = client_for(&server, 25)
            .fetch_changes(1, &window())
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert!(events[0].entity.as_ref().unwrap().id.is_none());
        assert_eq!(events[1].entity.as_ref().unwrap().id, Some(501));
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/pages/9")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let result = client_for(&server, 25).fetch_page(9).await;

        match result {
            Err(WatchError::Api { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "not found");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/pages/9")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let result = client_for(&server, 25).fetch_page(9).await;
        assert!(matches!(result, Err(WatchError::Json(_))));
    }

    #[tokio::test]
    async fn test_null_body_is_empty_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/experiments/5")
            .with_status(200)
            .with_body("null")
            .create_async()
            .await;

        let result = client_for(&server, 25).fetch_experiment(5).await;
        let err = assert_err!(result);
        assert!(matches!(err, WatchError::EmptyResponse(_)));
    }
}
