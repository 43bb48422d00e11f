//! MCP Tool definitions and handlers
//!
//! Defines the calendar tools and their implementations.

use std::sync::Arc;

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::calendar::client::CalendarClient;
use crate::calendar::dates::{parse_datetime, today_utc, DateInput};
use crate::calendar::types::{Event, EventChanges, NewEvent};
use crate::calendar::utils::{format_events, split_attendees};
use crate::error::Result;
use crate::mcp::registry::{self, ToolOp};
use crate::mcp::types::{CallToolResult, Tool};

/// Attendee list: an array of addresses or one comma-separated string
#[derive(Debug, Clone, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(untagged)]
pub enum Attendees {
    List(Vec<String>),
    Csv(String),
}

impl Attendees {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::List(list) => list
                .into_iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            Self::Csv(csv) => split_attendees(&csv),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListEventsArgs {
    /// First day or instant to list: today, tomorrow, YYYY-MM-DD or ISO-8601
    pub date_start: String,

    /// Last day to list (inclusive) or exact end instant; defaults to one day after date_start
    #[serde(default)]
    pub date_end: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateEventArgs {
    /// Event title
    pub summary: String,

    /// Start time, ISO-8601
    pub start_datetime: String,

    /// End time, ISO-8601
    pub end_datetime: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub location: Option<String>,

    /// Attendee email addresses
    #[serde(default)]
    pub attendees: Option<Attendees>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateEventArgs {
    /// ID of the event to update
    pub event_id: String,

    /// New title
    #[serde(default)]
    pub summary: Option<String>,

    /// New start time, ISO-8601
    #[serde(default)]
    pub start_datetime: Option<String>,

    /// New end time, ISO-8601
    #[serde(default)]
    pub end_datetime: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub location: Option<String>,

    /// Replacement attendee list
    #[serde(default)]
    pub attendees: Option<Attendees>,
}

impl CreateEventArgs {
    fn into_new_event(self) -> Result<NewEvent> {
        let today = today_utc();
        Ok(NewEvent {
            start: parse_datetime(&self.start_datetime, today)?,
            end: parse_datetime(&self.end_datetime, today)?,
            summary: self.summary,
            description: self.description,
            location: self.location,
            attendees: self.attendees.map(Attendees::into_vec).unwrap_or_default(),
        })
    }
}

impl UpdateEventArgs {
    fn into_changes(self) -> Result<(String, EventChanges)> {
        let today = today_utc();
        let changes = EventChanges {
            summary: self.summary,
            start: self
                .start_datetime
                .as_deref()
                .map(|s| parse_datetime(s, today))
                .transpose()?,
            end: self
                .end_datetime
                .as_deref()
                .map(|s| parse_datetime(s, today))
                .transpose()?,
            description: self.description,
            location: self.location,
            attendees: self.attendees.map(Attendees::into_vec),
        };
        Ok((self.event_id, changes))
    }
}

/// Tool handler
pub struct ToolHandler {
    calendar_client: Arc<CalendarClient>,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(calendar_client: Arc<CalendarClient>) -> Self {
        Self { calendar_client }
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        registry::tools()
            .map(|(entry, op)| tool_def(entry.name, entry.description, op.input_schema()))
            .collect()
    }

    /// Call a tool by name
    pub async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        let Some(op) = registry::find_tool(name) else {
            let err = crate::error::McpError::UnknownTool {
                name: name.to_string(),
            };
            tracing::warn!("{}", err);
            return CallToolResult::error(err.to_string());
        };

        info!("Tool call: {}", name);
        let outcome = match op {
            ToolOp::ListEvents => self.handle_list_events(args).await,
            ToolOp::CreateEvent => self.handle_create_event(args).await,
            ToolOp::UpdateEvent => self.handle_update_event(args).await,
        };

        match outcome {
            Ok(text) => CallToolResult::text(text),
            Err(e) => {
                tracing::warn!("Tool {} failed: {}", name, e);
                CallToolResult::error(e.to_string())
            }
        }
    }

    // ==================== Tool Handlers ====================

    async fn handle_list_events(&self, args: Value) -> Result<String> {
        let args: ListEventsArgs = parse_args(args)?;
        let today = today_utc();

        let start = DateInput::parse(&args.date_start, today)?.start_of();
        let end = args
            .date_end
            .as_deref()
            .map(|d| DateInput::parse(d, today).map(|d| d.end_of()))
            .transpose()?;

        let events = self.calendar_client.list_events(start, end).await?;
        Ok(format_events(&events))
    }

    async fn handle_create_event(&self, args: Value) -> Result<String> {
        let args: CreateEventArgs = parse_args(args)?;
        let event = self.calendar_client.create_event(args.into_new_event()?).await?;
        Ok(confirmation("created", &event))
    }

    async fn handle_update_event(&self, args: Value) -> Result<String> {
        let args: UpdateEventArgs = parse_args(args)?;
        let (event_id, changes) = args.into_changes()?;
        let event = self.calendar_client.update_event(&event_id, changes).await?;
        Ok(confirmation("updated", &event))
    }
}

impl ToolOp {
    /// JSON Schema of the tool's arguments
    pub fn input_schema(self) -> Value {
        match self {
            Self::ListEvents => schema_for::<ListEventsArgs>(),
            Self::CreateEvent => schema_for::<CreateEventArgs>(),
            Self::UpdateEvent => schema_for::<UpdateEventArgs>(),
        }
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    // Clients may send `null` for tools without required arguments
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| {
        crate::error::McpError::InvalidArguments {
            message: e.to_string(),
        }
        .into()
    })
}

fn confirmation(action: &str, event: &Event) -> String {
    format!(
        "Event {} successfully!\nEvent ID: {}\nLink: {}",
        action,
        event.id,
        event.html_link.as_deref().unwrap_or("No link available")
    )
}

fn schema_for<T: JsonSchema>() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
        })
        .into_generator();
    let mut schema = serde_json::to_value(generator.into_root_schema_for::<T>())
        .unwrap_or_else(|_| json!({"type": "object"}));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("title");
    }
    schema
}

fn tool_def(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}
