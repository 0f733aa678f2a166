//! Google Calendar API client.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::instrument;

use crate::error::CalendarError;
use crate::types::*;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

pub struct CalendarClient {
    client: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl CalendarClient {
    pub fn new(access_token: &str) -> Self {
        Self::with_base_url(access_token, CALENDAR_API_BASE)
    }

    pub fn with_base_url(access_token: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token: access_token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// List one page of events from a calendar within a time range.
    #[instrument(skip(self), level = "info")]
    pub async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> Result<EventListResponse, CalendarError> {
        let mut url = format!(
            "{}/calendars/{}/events?timeMin={}&timeMax={}&singleEvents=true&orderBy=startTime&maxResults=250",
            self.base_url,
            urlencoding::encode(calendar_id),
            urlencoding::encode(&time_min.to_rfc3339_opts(SecondsFormat::Secs, true)),
            urlencoding::encode(&time_max.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );

        if let Some(pt) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(pt)));
        }

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List every event in a time range, following page tokens.
    pub async fn list_all_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<Event>, CalendarError> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_events(calendar_id, time_min, time_max, page_token.as_deref())
                .await?;
            events.extend(
                page.items
                    .into_iter()
                    .map(|api| Event::from_api(api, calendar_id)),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(events)
    }

    /// Create a new event.
    #[instrument(skip(self, draft), fields(summary = %draft.summary), level = "info")]
    pub async fn create_event(
        &self,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> Result<Event, CalendarError> {
        if draft.end <= draft.start {
            return Err(CalendarError::InvalidEventData(format!(
                "'{}' ends before it starts",
                draft.summary
            )));
        }

        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id),
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&draft.to_api_body())
            .send()
            .await?;

        let api_event: ApiEvent = self.handle_response(response).await?;
        Ok(Event::from_api(api_event, calendar_id))
    }

    /// Delete an event.
    #[instrument(skip(self), level = "info")]
    pub async fn delete_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), CalendarError> {
        let url = format!(
            "{}/calendars/{}/events/{}",
            self.base_url,
            urlencoding::encode(calendar_id),
            urlencoding::encode(event_id),
        );

        let response = self
            .client
            .delete(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        // Delete returns 204 No Content on success
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.as_u16() == 404 || status.as_u16() == 410 {
            Err(CalendarError::EventNotFound(event_id.to_string()))
        } else if status.as_u16() == 401 {
            Err(CalendarError::TokenExpired)
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(CalendarError::ApiError(format!("{}: {}", status, text)))
        }
    }

    /// Helper to handle API responses and errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, CalendarError> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| CalendarError::ApiError(format!("JSON parse error: {}", e)))
        } else if status.as_u16() == 401 {
            Err(CalendarError::TokenExpired)
        } else if status.as_u16() == 403 {
            Err(CalendarError::AuthRequired)
        } else if status.as_u16() == 404 {
            let text = response.text().await.unwrap_or_default();
            Err(CalendarError::EventNotFound(text))
        } else if status.as_u16() == 409 {
            Err(CalendarError::Conflict)
        } else if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            Err(CalendarError::RateLimited(retry_after))
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(CalendarError::ApiError(format!("{}: {}", status, text)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn day_window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_list_events() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(header("Authorization", "Bearer test_token"))
            .and(query_param("timeMin", "2024-02-01T00:00:00Z"))
            .and(query_param("timeMax", "2024-02-02T00:00:00Z"))
            .and(query_param("singleEvents", "true"))
            .and(query_param("orderBy", "startTime"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {
                        "id": "event1",
                        "summary": "Meeting",
                        "start": {"dateTime": "2024-02-01T10:00:00Z"},
                        "end": {"dateTime": "2024-02-01T11:00:00Z"}
                    }
                ]
            })))
            .mount(&mock_server)
            .await;

        let client = CalendarClient::with_base_url("test_token", &mock_server.uri());
        let (time_min, time_max) = day_window();

        let response = client
            .list_events("primary", time_min, time_max, None)
            .await
            .unwrap();

        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].summary, Some("Meeting".to_string()));
        assert!(response.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_list_all_events_follows_pages() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("pageToken", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"id": "b", "summary": "Second", "start": {"dateTime": "2024-02-01T12:00:00Z"}}
                ]
            })))
            .with_priority(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"id": "a", "summary": "First", "start": {"dateTime": "2024-02-01T09:00:00Z"}}
                ],
                "nextPageToken": "page2"
            })))
            .with_priority(2)
            .mount(&mock_server)
            .await;

        let client = CalendarClient::with_base_url("test_token", &mock_server.uri());
        let (time_min, time_max) = day_window();

        let events = client
            .list_all_events("primary", time_min, time_max)
            .await
            .unwrap();

        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_create_event_sends_utc_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/calendars/primary/events"))
            .and(body_json(serde_json::json!({
                "summary": "Gym",
                "start": {"dateTime": "2024-02-01T18:00:00Z", "timeZone": "UTC"},
                "end": {"dateTime": "2024-02-01T18:30:00Z", "timeZone": "UTC"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "new1",
                "summary": "Gym",
                "start": {"dateTime": "2024-02-01T18:00:00Z", "timeZone": "UTC"},
                "end": {"dateTime": "2024-02-01T18:30:00Z", "timeZone": "UTC"},
                "htmlLink": "https://calendar.google.com/event?eid=new1"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = CalendarClient::with_base_url("test_token", &mock_server.uri());
        let draft = EventDraft::new(
            "Gym",
            Utc.with_ymd_and_hms(2024, 2, 1, 18, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 18, 30, 0).unwrap(),
        );

        let event = client.create_event("primary", &draft).await.unwrap();
        assert_eq!(event.id, "new1");
        assert!(event.html_link.is_some());
    }

    #[tokio::test]
    async fn test_create_event_rejects_inverted_span() {
        let client = CalendarClient::with_base_url("test_token", "http://127.0.0.1:9");
        let draft = EventDraft::new(
            "Backwards",
            Utc.with_ymd_and_hms(2024, 2, 1, 18, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 17, 0, 0).unwrap(),
        );

        let result = client.create_event("primary", &draft).await;
        assert!(matches!(result, Err(CalendarError::InvalidEventData(_))));
    }

    #[tokio::test]
    async fn test_token_expired() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let client = CalendarClient::with_base_url("expired_token", &mock_server.uri());
        let (time_min, time_max) = day_window();
        let result = client.list_events("primary", time_min, time_max, None).await;

        assert!(matches!(result, Err(CalendarError::TokenExpired)));
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "60"))
            .mount(&mock_server)
            .await;

        let client = CalendarClient::with_base_url("token", &mock_server.uri());
        let (time_min, time_max) = day_window();
        let result = client.list_events("primary", time_min, time_max, None).await;

        assert!(matches!(result, Err(CalendarError::RateLimited(60))));
    }

    #[tokio::test]
    async fn test_delete_event() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/calendars/primary/events/event123"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let client = CalendarClient::with_base_url("test_token", &mock_server.uri());
        let result = client.delete_event("primary", "event123").await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_delete_already_gone() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/calendars/primary/events/event123"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&mock_server)
            .await;

        let client = CalendarClient::with_base_url("test_token", &mock_server.uri());
        let result = client.delete_event("primary", "event123").await;

        assert!(matches!(result, Err(CalendarError::EventNotFound(id)) if id == "event123"));
    }
}
