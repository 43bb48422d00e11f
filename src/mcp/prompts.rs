//! MCP prompts: canned requests that steer the client toward the calendar tools

use serde_json::{Map, Value};

use crate::error::{McpError, Result};
use crate::mcp::registry::{self, PromptOp};
use crate::mcp::types::{GetPromptResult, Prompt, PromptArgument, PromptMessage};

const TODAY_EVENTS_TEXT: &str = "Please show me all of my calendar events for today.";

/// `schedule_meeting` arguments with the placeholder shown when one is omitted
const MEETING_FIELDS: &[(&str, &str, &str, &str)] = &[
    ("title", "Title", "[Meeting title]", "Meeting title"),
    (
        "when",
        "Date and time",
        "[Date and time, e.g., \"tomorrow at 2pm for 1 hour\"]",
        "When the meeting happens and for how long",
    ),
    ("description", "Description", "[Optional description]", "Meeting description"),
    ("location", "Location", "[Optional location]", "Meeting location"),
    ("attendees", "Attendees", "[Optional list of emails]", "Attendee email addresses"),
];

#[derive(Debug, Default)]
pub struct PromptHandler;

impl PromptHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn list_prompts(&self) -> Vec<Prompt> {
        registry::prompts()
            .map(|(entry, op)| Prompt {
                name: entry.name.to_string(),
                description: Some(entry.description.to_string()),
                arguments: op.arguments(),
            })
            .collect()
    }

    pub fn get_prompt(&self, name: &str, arguments: &Map<String, Value>) -> Result<GetPromptResult> {
        let op = registry::find_prompt(name).ok_or_else(|| McpError::UnknownPrompt {
            name: name.to_string(),
        })?;

        let (description, text) = match op {
            PromptOp::TodayEvents => ("Today's calendar events", TODAY_EVENTS_TEXT.to_string()),
            PromptOp::ScheduleMeeting => ("Schedule a new meeting", schedule_meeting_text(arguments)),
        };

        Ok(GetPromptResult {
            description: Some(description.to_string()),
            messages: vec![PromptMessage::user(text)],
        })
    }
}

impl PromptOp {
    fn arguments(self) -> Vec<PromptArgument> {
        match self {
            Self::TodayEvents => Vec::new(),
            Self::ScheduleMeeting => MEETING_FIELDS
                .iter()
                .map(|(name, _, _, description)| PromptArgument {
                    name: name.to_string(),
                    description: Some(description.to_string()),
                    required: false,
                })
                .collect(),
        }
    }
}

fn schedule_meeting_text(arguments: &Map<String, Value>) -> String {
    let mut text = String::from(
        "I'd like to schedule a new meeting. Please help me create a calendar event with the following information:\n\n",
    );

    for (name, label, placeholder, _) in MEETING_FIELDS {
        let value = arguments
            .get(*name)
            .map(|v| match v {
                Value::String(s) => s.trim().to_string(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .filter(|v| !v.is_empty());
        text.push_str(&format!("{}: {}\n", label, value.as_deref().unwrap_or(*placeholder)));
    }

    text.push_str("\nPlease create this event in my calendar.");
    text
}
