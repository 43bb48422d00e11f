//! Google Calendar API client
//!
//! High-level client for the event operations exposed over MCP. Every call
//! obtains a fresh [`AuthorizedHandle`] from the [`CredentialManager`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::calendar::credentials::{AuthorizedHandle, CredentialManager};
use crate::calendar::types::{
    Event, EventChanges, EventDateTime, EventList, EventPatch, GoogleErrorResponse, NewEvent,
};
use crate::calendar::utils::{to_attendees, validate_time_range};
use crate::config::Config;
use crate::error::{CalendarApiError, CalendarMcpError, Result, ValidationError};

/// Google Calendar API client
pub struct CalendarClient {
    /// HTTP client
    http_client: reqwest::Client,

    /// Credential lifecycle
    credentials: Arc<CredentialManager>,

    base_url: String,
    calendar_id: String,
    scopes: Vec<String>,
}

impl CalendarClient {
    /// Create a new Calendar client
    pub fn new(credentials: Arc<CredentialManager>, config: &Config) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            credentials,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            calendar_id: config.calendar_id.clone(),
            scopes: config.scopes.clone(),
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    async fn handle(&self) -> Result<AuthorizedHandle> {
        self.credentials.acquire_handle(&self.scopes).await
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(&self.calendar_id)
        )
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/{}", self.events_url(), urlencoding::encode(event_id))
    }

    // ==================== Event Operations ====================

    /// List events overlapping `[start, end)`, expanded to single instances.
    ///
    /// `end` defaults to one day after `start`. Results are ordered by start time.
    pub async fn list_events(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>> {
        let end = end.unwrap_or(start + Duration::days(1));
        validate_time_range(start, end)?;

        let handle = self.handle().await?;
        let time_min = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = end.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();

        loop {
            let mut query: Vec<(&str, &str)> = vec![
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let response = self
                .http_client
                .get(self.events_url())
                .bearer_auth(handle.access_token())
                .query(&query)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(self.error_from_response(response, &handle, None).await);
            }

            let page: EventList = response.json().await?;
            events.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => {
                    if !seen_tokens.insert(token.clone()) {
                        warn!("Calendar API repeated page token {}, stopping pagination", token);
                        break;
                    }
                    page_token = Some(token);
                }
                _ => break,
            }
        }

        // Stable, so the API's own order breaks ties
        events.sort_by_key(|e| e.start.instant());

        debug!("Listed {} events between {} and {}", events.len(), time_min, time_max);
        Ok(events)
    }

    /// Get an event by ID
    pub async fn get_event(&self, event_id: &str) -> Result<Event> {
        let handle = self.handle().await?;
        self.fetch_event(&handle, event_id).await
    }

    async fn fetch_event(&self, handle: &AuthorizedHandle, event_id: &str) -> Result<Event> {
        let response = self
            .http_client
            .get(self.event_url(event_id))
            .bearer_auth(handle.access_token())
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(self.error_from_response(response, handle, Some(event_id)).await)
        }
    }

    /// Create an event on the configured calendar
    pub async fn create_event(&self, event: NewEvent) -> Result<Event> {
        let summary = event.summary.trim();
        if summary.is_empty() {
            return Err(ValidationError::MissingField {
                field: "summary".to_string(),
            }
            .into());
        }
        validate_time_range(event.start, event.end)?;
        let attendees = to_attendees(&event.attendees)?;

        let body = EventPatch {
            summary: Some(summary.to_string()),
            description: event.description,
            location: event.location,
            start: Some(EventDateTime::utc(event.start)),
            end: Some(EventDateTime::utc(event.end)),
            attendees: (!attendees.is_empty()).then_some(attendees),
        };

        let handle = self.handle().await?;
        let response = self
            .http_client
            .post(self.events_url())
            .bearer_auth(handle.access_token())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.error_from_response(response, &handle, None).await);
        }

        let created: Event = response.json().await?;
        debug!("Created event {}", created.id);
        Ok(created)
    }

    /// Apply a partial update; fields left as `None` keep their current values
    pub async fn update_event(&self, event_id: &str, changes: EventChanges) -> Result<Event> {
        if let Some(summary) = &changes.summary {
            if summary.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    field: "summary".to_string(),
                }
                .into());
            }
        }
        if let (Some(start), Some(end)) = (changes.start, changes.end) {
            validate_time_range(start, end)?;
        }
        let attendees = changes.attendees.as_deref().map(to_attendees).transpose()?;

        let handle = self.handle().await?;
        let existing = self.fetch_event(&handle, event_id).await?;

        let start = changes.start.or_else(|| existing.start.instant());
        let end = changes.end.or_else(|| existing.end.instant());
        if let (Some(start), Some(end)) = (start, end) {
            validate_time_range(start, end)?;
        }

        if changes.is_empty() {
            debug!("No changes supplied for event {}", event_id);
            return Ok(existing);
        }

        let body = EventPatch {
            summary: changes.summary,
            description: changes.description,
            location: changes.location,
            start: changes.start.map(EventDateTime::utc),
            end: changes.end.map(EventDateTime::utc),
            attendees,
        };

        let response = self
            .http_client
            .patch(self.event_url(event_id))
            .bearer_auth(handle.access_token())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.error_from_response(response, &handle, Some(event_id)).await);
        }

        let updated: Event = response.json().await?;
        debug!("Updated event {}", updated.id);
        Ok(updated)
    }

    /// Map a non-2xx response, expiring the rejected access token on 401
    async fn error_from_response(
        &self,
        response: reqwest::Response,
        handle: &AuthorizedHandle,
        event_id: Option<&str>,
    ) -> CalendarMcpError {
        let status = response.status();

        if let Some(event_id) = event_id {
            if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
                return CalendarApiError::EventNotFound {
                    event_id: event_id.to_string(),
                }
                .into();
            }
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            warn!("Calendar API rejected the access token, marking it expired");
            if let Err(e) = self.credentials.expire(handle.access_token()).await {
                warn!("Could not update stored credential: {}", e);
            }
        }

        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<GoogleErrorResponse>(&text) {
            Ok(parsed) if !parsed.error.message.is_empty() => parsed.error.message,
            _ => text,
        };

        CalendarApiError::RemoteService {
            code: status.as_u16(),
            message,
        }
        .into()
    }
}
