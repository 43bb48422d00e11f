//! Static catalog of the tools, resources and prompts the server exposes

/// Tool operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOp {
    ListEvents,
    CreateEvent,
    UpdateEvent,
}

/// Resource operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOp {
    /// `calendar://events/{date}`
    EventsForDate,
}

/// Prompt operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOp {
    TodayEvents,
    ScheduleMeeting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Tool(ToolOp),
    Resource(ResourceOp),
    Prompt(PromptOp),
}

/// One exposed capability
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    /// Tool or prompt name; URI template for resources
    pub name: &'static str,
    pub description: &'static str,
    pub kind: EntryKind,
}

/// URI scheme prefix for day listings
pub const EVENTS_URI_PREFIX: &str = "calendar://events/";

pub const EVENTS_URI_TEMPLATE: &str = "calendar://events/{date}";

pub static ENTRIES: &[Entry] = &[
    Entry {
        name: "list_events",
        description: "List calendar events between two dates. date_start and date_end accept \
                      today, tomorrow, YYYY-MM-DD or an ISO-8601 timestamp; without date_end a \
                      single day is listed.",
        kind: EntryKind::Tool(ToolOp::ListEvents),
    },
    Entry {
        name: "create_event",
        description: "Create a new calendar event. Times are ISO-8601 (UTC unless an offset is \
                      given); attendees are email addresses.",
        kind: EntryKind::Tool(ToolOp::CreateEvent),
    },
    Entry {
        name: "update_event",
        description: "Update an existing calendar event. Only the supplied fields are changed.",
        kind: EntryKind::Tool(ToolOp::UpdateEvent),
    },
    Entry {
        name: EVENTS_URI_TEMPLATE,
        description: "Events for a day: today, tomorrow or YYYY-MM-DD",
        kind: EntryKind::Resource(ResourceOp::EventsForDate),
    },
    Entry {
        name: "today_events",
        description: "Show all of today's calendar events",
        kind: EntryKind::Prompt(PromptOp::TodayEvents),
    },
    Entry {
        name: "schedule_meeting",
        description: "Collect the details needed to schedule a new meeting",
        kind: EntryKind::Prompt(PromptOp::ScheduleMeeting),
    },
];

pub fn tools() -> impl Iterator<Item = (&'static Entry, ToolOp)> {
    ENTRIES.iter().filter_map(|e| match e.kind {
        EntryKind::Tool(op) => Some((e, op)),
        _ => None,
    })
}

pub fn prompts() -> impl Iterator<Item = (&'static Entry, PromptOp)> {
    ENTRIES.iter().filter_map(|e| match e.kind {
        EntryKind::Prompt(op) => Some((e, op)),
        _ => None,
    })
}

pub fn resources() -> impl Iterator<Item = (&'static Entry, ResourceOp)> {
    ENTRIES.iter().filter_map(|e| match e.kind {
        EntryKind::Resource(op) => Some((e, op)),
        _ => None,
    })
}

pub fn find_tool(name: &str) -> Option<ToolOp> {
    tools().find(|(e, _)| e.name == name).map(|(_, op)| op)
}

pub fn find_prompt(name: &str) -> Option<PromptOp> {
    prompts().find(|(e, _)| e.name == name).map(|(_, op)| op)
}

/// Match a concrete URI against the resource templates, returning the operation and its argument
pub fn find_resource(uri: &str) -> Option<(ResourceOp, &str)> {
    let date = uri.strip_prefix(EVENTS_URI_PREFIX)?;
    (!date.is_empty() && !date.contains('/')).then_some((ResourceOp::EventsForDate, date))
}
