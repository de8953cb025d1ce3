//! Books events into an in-memory agenda.

use super::{Feature, FeatureKind};
use anyhow::{Context, bail};
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};
use gemini_live::types::{Schema, ToolDeclaration};
use gemini_live::{ToolHandler, typed_tool};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;
use uuid::Uuid;

pub const TOOL_NAME: &str = "book_calendar";
const UPCOMING_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookEventArgs {
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_date_time: String,
    pub end_date_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: Uuid,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

/// Events kept in start order.
#[derive(Debug, Default)]
pub struct Agenda {
    events: Mutex<Vec<CalendarEvent>>,
}

impl Agenda {
    pub fn book(&self, args: BookEventArgs) -> anyhow::Result<CalendarEvent> {
        let summary = args.summary.trim();
        if summary.is_empty() {
            bail!("event summary is empty");
        }
        let start = parse_date_time(&args.start_date_time).context("invalid startDateTime")?;
        let end = parse_date_time(&args.end_date_time).context("invalid endDateTime")?;
        if end <= start {
            bail!("event must end after it starts");
        }

        let event = CalendarEvent {
            id: Uuid::new_v4(),
            summary: summary.to_string(),
            description: args.description.filter(|d| !d.trim().is_empty()),
            start,
            end,
        };
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let position = events.partition_point(|e| e.start <= event.start);
        events.insert(position, event.clone());
        info!(id = %event.id, summary = %event.summary, start = %event.start, "Booked calendar event");
        Ok(event)
    }

    /// Events that have not ended before `now`, soonest first.
    pub fn upcoming(&self, now: DateTime<FixedOffset>, limit: usize) -> Vec<CalendarEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.end >= now)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Accepts RFC 3339 timestamps, or local wall-clock time without an offset.
fn parse_date_time(value: &str) -> anyhow::Result<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed);
    }
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .with_context(|| format!("'{value}' is not an ISO 8601 date and time"))?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .with_context(|| format!("'{value}' does not exist in the local time zone"))?;
    Ok(local.fixed_offset())
}

#[derive(Default)]
pub struct Calendar {
    agenda: Arc<Agenda>,
}

impl Calendar {
    pub fn agenda(&self) -> &Arc<Agenda> {
        &self.agenda
    }
}

impl Feature for Calendar {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Calendar
    }

    fn instruction(&self) -> &'static str {
        "When I want to schedule something, use the \"book_calendar\" function. \
         Ask for the start and end time if I did not say."
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(TOOL_NAME, "Books a calendar event and displays upcoming events.")
            .with_parameters(
                Schema::object()
                    .required_property("summary", Schema::string().describe("Title of the event"))
                    .property(
                        "description",
                        Schema::string().describe("Description of the event"),
                    )
                    .required_property(
                        "startDateTime",
                        Schema::string().describe("Start date and time in ISO format"),
                    )
                    .required_property(
                        "endDateTime",
                        Schema::string().describe("End date and time in ISO format"),
                    ),
            )
    }

    fn handler(&self) -> Arc<dyn ToolHandler> {
        let agenda = self.agenda.clone();
        typed_tool(move |args: BookEventArgs| {
            let agenda = agenda.clone();
            async move {
                let event = agenda.book(args)?;
                let start_of_today = Local::now()
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
                    .map(|midnight| midnight.fixed_offset())
                    .unwrap_or(event.start);
                Ok::<Value, anyhow::Error>(json!({
                    "success": true,
                    "eventId": event.id,
                    "upcoming": agenda.upcoming(start_of_today, UPCOMING_LIMIT),
                }))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(summary: &str, start: &str, end: &str) -> BookEventArgs {
        BookEventArgs {
            summary: summary.to_string(),
            description: None,
            start_date_time: start.to_string(),
            end_date_time: end.to_string(),
        }
    }

    #[test]
    fn keeps_events_in_start_order() {
        let agenda = Agenda::default();
        agenda
            .book(args("Review", "2099-03-02T15:00:00Z", "2099-03-02T16:00:00Z"))
            .unwrap();
        agenda
            .book(args("Standup", "2099-03-02T09:00:00Z", "2099-03-02T09:15:00Z"))
            .unwrap();

        let now = DateTime::parse_from_rfc3339("2099-03-01T00:00:00Z").unwrap();
        let summaries: Vec<_> = agenda
            .upcoming(now, 10)
            .into_iter()
            .map(|e| e.summary)
            .collect();
        assert_eq!(summaries, vec!["Standup", "Review"]);
    }

    #[test]
    fn upcoming_skips_finished_events_and_respects_limit() {
        let agenda = Agenda::default();
        agenda
            .book(args("Past", "2020-01-01T09:00:00Z", "2020-01-01T10:00:00Z"))
            .unwrap();
        for hour in 10..13 {
            agenda
                .book(args(
                    "Future",
                    &format!("2099-01-01T{hour}:00:00Z"),
                    &format!("2099-01-01T{hour}:30:00Z"),
                ))
                .unwrap();
        }

        let now = DateTime::parse_from_rfc3339("2050-01-01T00:00:00Z").unwrap();
        assert_eq!(agenda.upcoming(now, 2).len(), 2);
        assert_eq!(agenda.upcoming(now, 10).len(), 3);
        assert_eq!(agenda.len(), 4);
    }

    #[test]
    fn rejects_events_that_end_before_they_start() {
        let agenda = Agenda::default();
        let err = agenda
            .book(args("Backwards", "2099-01-01T10:00:00Z", "2099-01-01T09:00:00Z"))
            .unwrap_err();
        assert_eq!(err.to_string(), "event must end after it starts");
        assert!(agenda.is_empty());
    }

    #[test]
    fn accepts_local_times_without_offset() {
        let parsed = parse_date_time("2099-06-01T14:30").unwrap();
        assert_eq!(parsed.naive_local().to_string(), "2099-06-01 14:30:00");
        assert!(parse_date_time("next tuesday").is_err());
    }

    #[tokio::test]
    async fn handler_books_and_lists_upcoming_events() {
        let calendar = Calendar::default();
        let handler = calendar.handler();
        let call = gemini_live::types::FunctionCall {
            id: "1".to_string(),
            name: TOOL_NAME.to_string(),
            args: json!({
                "summary": "Dentist",
                "description": "Bring forms",
                "startDateTime": "2099-05-01T10:00:00+02:00",
                "endDateTime": "2099-05-01T11:00:00+02:00",
            })
            .as_object()
            .cloned()
            .unwrap(),
        };

        let response = handler.call(call).await.unwrap();
        assert_eq!(response["success"], true);
        assert_eq!(response["upcoming"][0]["summary"], "Dentist");
        assert_eq!(response["upcoming"][0]["description"], "Bring forms");
        assert_eq!(calendar.agenda().len(), 1);
    }

    #[tokio::test]
    async fn unparseable_date_reaches_the_model_with_its_cause() {
        let calendar = Calendar::default();
        let registry = gemini_live::ToolRegistry::new();
        registry.register(TOOL_NAME, calendar.handler());
        let batch = gemini_live::types::ToolCall {
            function_calls: vec![gemini_live::types::FunctionCall {
                id: "1".to_string(),
                name: TOOL_NAME.to_string(),
                args: json!({
                    "summary": "Dentist",
                    "startDateTime": "tomorrow",
                    "endDateTime": "2099-05-01T11:00:00Z",
                })
                .as_object()
                .cloned()
                .unwrap(),
            }],
        };

        let response = registry.dispatch(batch, None).await;
        let message = response.function_responses[0].error_message().unwrap();
        assert!(message.starts_with("invalid startDateTime: "));
        assert!(message.contains("'tomorrow' is not an ISO 8601 date and time"));
        assert!(calendar.agenda().is_empty());
    }

    #[test]
    fn declaration_matches_handler_arguments() {
        let declaration = Calendar::default().declaration();
        let schema = declaration.parameters.unwrap();
        assert!(
            schema
                .validate(&json!({
                    "summary": "Lunch",
                    "startDateTime": "2099-01-01T12:00:00Z",
                    "endDateTime": "2099-01-01T13:00:00Z",
                }))
                .is_ok()
        );
        assert!(schema.validate(&json!({ "summary": "Lunch" })).is_err());
    }
}
