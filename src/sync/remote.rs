use std::time::Duration;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::Serialize;
use crate::config::settings::SyncConfig;
use crate::error::ProgressError;
use crate::progress::intent::MutationIntent;
use crate::progress::record::CompletionRecord;
use crate::sync::perf;

/// Authoritative progress storage. Every call returns the full record for
/// the plan as the server sees it after the call.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get_progress(&self, plan_id: &str) -> Result<CompletionRecord, ProgressError>;

    async fn update_reading_progress(
        &self,
        plan_id: &str,
        day: u32,
        reading_index: usize,
        completed: bool,
        chapter_count: f64,
        completed_chapters: Option<&[String]>,
    ) -> Result<CompletionRecord, ProgressError>;

    async fn update_day_progress(
        &self,
        plan_id: &str,
        day: u32,
        completed: bool,
    ) -> Result<CompletionRecord, ProgressError>;
}

/// Route an intent to the matching store call
pub async fn send_intent(
    store: &dyn ProgressStore,
    intent: &MutationIntent,
) -> Result<CompletionRecord, ProgressError> {
    match intent {
        MutationIntent::Reading(m) => {
            store
                .update_reading_progress(
                    &m.plan_id,
                    m.day,
                    m.reading_index,
                    m.completed,
                    m.chapter_count,
                    m.completed_chapters.as_deref(),
                )
                .await
        }
        MutationIntent::Day(m) => store.update_day_progress(&m.plan_id, m.day, m.completed).await,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadingBody<'a> {
    day: u32,
    reading_index: usize,
    completed: bool,
    chapter_count: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_chapters: Option<&'a [String]>,
}

#[derive(Serialize)]
struct DayBody {
    day: u32,
    completed: bool,
}

/// JSON-over-HTTP progress store.
///
/// `GET  {base}/plans/{planId}/progress`
/// `POST {base}/plans/{planId}/progress/reading`
/// `POST {base}/plans/{planId}/progress/day`
pub struct HttpProgressStore {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpProgressStore {
    pub fn new(base_url: &str, auth_token: Option<String>, timeout: Duration) -> Result<Self, ProgressError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            ProgressError::new(format!("Invalid API base URL: {}", e), "config", crate::error::ErrorKind::Config)
                .with_context(format!("url: {}", base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ProgressError::new(
                "API base URL cannot carry a path",
                "config",
                crate::error::ErrorKind::Config,
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(HttpProgressStore {
            client,
            base_url,
            auth_token,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, ProgressError> {
        Self::new(&config.api_base_url, config.auth_token.clone(), config.request_timeout())
    }

    /// `{base}/plans/{planId}/progress[/suffix]`, with the plan id escaped
    fn progress_url(&self, plan_id: &str, suffix: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["plans", plan_id, "progress"]);
            if let Some(suffix) = suffix {
                segments.push(suffix);
            }
        }
        url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch_record(
        &self,
        request: RequestBuilder,
        label: &'static str,
        plan_id: &str,
    ) -> Result<CompletionRecord, ProgressError> {
        let _timer = perf::PerfTimer::with_context(label, plan_id);

        let response = self
            .authorized(request)
            .send()
            .await
            .with_context(|| format!("Failed to reach progress store for plan '{}'", plan_id))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read progress response for plan '{}'", plan_id))?;

        if !status.is_success() {
            let mut snippet: String = text.chars().take(200).collect();
            if snippet.is_empty() {
                snippet = status.canonical_reason().unwrap_or("no body").to_string();
            }
            return Err(ProgressError::rejected(
                format!("Progress store answered {}: {}", status.as_u16(), snippet),
                label,
            )
            .with_status(status.as_u16())
            .with_context(format!("plan_id: {}", plan_id)));
        }

        serde_json::from_str::<CompletionRecord>(&text).map_err(|e| {
            ProgressError::rejected(format!("Malformed progress record: {}", e), label)
                .with_status(status.as_u16())
                .with_context(format!("plan_id: {}", plan_id))
                .with_origin("serde_json")
        })
    }
}

#[async_trait]
impl ProgressStore for HttpProgressStore {
    async fn get_progress(&self, plan_id: &str) -> Result<CompletionRecord, ProgressError> {
        let url = self.progress_url(plan_id, None);
        self.fetch_record(self.client.get(url), "get_progress", plan_id)
            .await
    }

    async fn update_reading_progress(
        &self,
        plan_id: &str,
        day: u32,
        reading_index: usize,
        completed: bool,
        chapter_count: f64,
        completed_chapters: Option<&[String]>,
    ) -> Result<CompletionRecord, ProgressError> {
        let url = self.progress_url(plan_id, Some("reading"));
        let body = ReadingBody {
            day,
            reading_index,
            completed,
            chapter_count,
            completed_chapters,
        };
        self.fetch_record(self.client.post(url).json(&body), "update_reading", plan_id)
            .await
    }

    async fn update_day_progress(
        &self,
        plan_id: &str,
        day: u32,
        completed: bool,
    ) -> Result<CompletionRecord, ProgressError> {
        let url = self.progress_url(plan_id, Some("day"));
        self.fetch_record(self.client.post(url).json(&DayBody { day, completed }), "update_day", plan_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(base: &str) -> HttpProgressStore {
        HttpProgressStore::new(base, None, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_progress_url_layout() {
        let store = store("http://localhost:8787/api");
        assert_eq!(
            store.progress_url("plan-1", None).as_str(),
            "http://localhost:8787/api/plans/plan-1/progress"
        );
        assert_eq!(
            store.progress_url("plan-1", Some("day")).as_str(),
            "http://localhost:8787/api/plans/plan-1/progress/day"
        );
    }

    #[test]
    fn test_trailing_slash_and_escaping() {
        let store = store("http://localhost:8787/api/");
        assert_eq!(
            store.progress_url("a/b c", Some("reading")).as_str(),
            "http://localhost:8787/api/plans/a%2Fb%20c/progress/reading"
        );
    }

    #[test]
    fn test_invalid_base_is_config_error() {
        let err = HttpProgressStore::new("not a url", None, Duration::from_secs(1))
            .err()
            .unwrap();
        assert_eq!(err.kind, crate::error::ErrorKind::Config);
        assert!(!err.is_offline_like());
    }

    #[test]
    fn test_reading_body_uses_wire_names() {
        let chapters = vec!["3".to_string()];
        let body = ReadingBody {
            day: 2,
            reading_index: 1,
            completed: false,
            chapter_count: 2.0,
            completed_chapters: Some(&chapters),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["readingIndex"], 1);
        assert_eq!(value["chapterCount"], 2.0);
        assert_eq!(value["completedChapters"], serde_json::json!(["3"]));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_offline_like() {
        // Port 9 (discard) on loopback is closed in test environments
        let store = store("http://127.0.0.1:9/api");
        let err = store.get_progress("plan").await.unwrap_err();
        assert!(err.is_offline_like(), "{}", err);
    }
}
