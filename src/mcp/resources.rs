//! MCP resources: read-only day listings under `calendar://events/{date}`

use std::sync::Arc;

use tracing::info;

use crate::calendar::client::CalendarClient;
use crate::calendar::dates::{day_bounds, parse_day, today_utc};
use crate::calendar::utils::format_events;
use crate::error::{McpError, Result};
use crate::mcp::registry::{self, ResourceOp, EVENTS_URI_PREFIX};
use crate::mcp::types::{ReadResourceResult, Resource, ResourceContent, ResourceTemplate};

const TEXT_PLAIN: &str = "text/plain";

pub struct ResourceHandler {
    calendar_client: Arc<CalendarClient>,
}

impl ResourceHandler {
    pub fn new(calendar_client: Arc<CalendarClient>) -> Self {
        Self { calendar_client }
    }

    /// Concrete shortcuts for the most common days
    pub fn list_resources(&self) -> Vec<Resource> {
        [("today", "Today's events"), ("tomorrow", "Tomorrow's events")]
            .into_iter()
            .map(|(day, name)| Resource {
                uri: format!("{}{}", EVENTS_URI_PREFIX, day),
                name: name.to_string(),
                description: Some(format!("Calendar events for {}", day)),
                mime_type: Some(TEXT_PLAIN.to_string()),
            })
            .collect()
    }

    pub fn list_templates(&self) -> Vec<ResourceTemplate> {
        registry::resources()
            .map(|(entry, _)| ResourceTemplate {
                uri_template: entry.name.to_string(),
                name: "Events for a day".to_string(),
                description: Some(entry.description.to_string()),
                mime_type: Some(TEXT_PLAIN.to_string()),
            })
            .collect()
    }

    pub async fn read(&self, uri: &str) -> Result<ReadResourceResult> {
        let (op, arg) = registry::find_resource(uri).ok_or_else(|| McpError::UnknownResource {
            uri: uri.to_string(),
        })?;

        info!("Resource read: {}", uri);
        let text = match op {
            ResourceOp::EventsForDate => self.events_for_date(arg).await?,
        };

        Ok(ReadResourceResult {
            contents: vec![ResourceContent {
                uri: uri.to_string(),
                mime_type: Some(TEXT_PLAIN.to_string()),
                text: Some(text),
            }],
        })
    }

    async fn events_for_date(&self, date: &str) -> Result<String> {
        let day = parse_day(&urlencoding::decode(date).unwrap_or_else(|_| date.into()), today_utc())?;
        let (start, end) = day_bounds(day);
        let events = self.calendar_client.list_events(start, Some(end)).await?;
        Ok(format_events(&events))
    }
}
