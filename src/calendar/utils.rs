//! Calendar utility functions
//!
//! Event formatting and argument validation.

use chrono::{DateTime, Utc};

use crate::calendar::types::{Event, EventAttendee, EventDateTime};
use crate::error::{Result, ValidationError};

/// Validate an email address
pub fn validate_email(email: &str) -> bool {
    validator::validate_email(email)
}

/// Split a comma-separated attendee string into trimmed addresses
pub fn split_attendees(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Validate attendee addresses and convert them to API attendees
pub fn to_attendees(emails: &[String]) -> Result<Vec<EventAttendee>> {
    emails
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .map(|email| {
            if validate_email(email) {
                Ok(EventAttendee::new(email))
            } else {
                Err(ValidationError::InvalidEmail {
                    email: email.to_string(),
                }
                .into())
            }
        })
        .collect()
}

/// Events must end strictly after they start
pub fn validate_time_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if end <= start {
        return Err(ValidationError::InvalidTimeRange {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
        }
        .into());
    }
    Ok(())
}

/// Render an event boundary for humans
pub fn format_event_time(value: &EventDateTime) -> String {
    if let Some(dt) = value.date_time {
        return dt.with_timezone(&Utc).format("%Y-%m-%d %H:%M UTC").to_string();
    }
    match value.date {
        Some(date) => format!("{} (all day)", date.format("%Y-%m-%d")),
        None => "Unknown".to_string(),
    }
}

/// Format events into a human-readable listing
pub fn format_events(events: &[Event]) -> String {
    if events.is_empty() {
        return "No events found.".to_string();
    }

    events
        .iter()
        .map(|event| {
            let attendees: Vec<&str> = event.attendees.iter().map(|a| a.email.as_str()).collect();
            format!(
                "ID: {}\nEvent: {}\nTime: {} - {}\nLocation: {}\nDescription: {}\nAttendees: {}\n",
                event.id,
                event.summary.as_deref().unwrap_or("Untitled"),
                format_event_time(&event.start),
                format_event_time(&event.end),
                event.location.as_deref().unwrap_or("N/A"),
                event.description.as_deref().unwrap_or("N/A"),
                if attendees.is_empty() {
                    "None".to_string()
                } else {
                    attendees.join(", ")
                }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
