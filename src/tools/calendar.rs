use crate::calendar_api::{local_midnight, CalendarClient, EventPatch, NewEvent};
use crate::errors::{ApiError, ApiResult};
use crate::models::CalendarEvent;
use crate::utils::{parse_tool_datetime, soft_failure};
use crate::views;
use chrono::{Duration, Local, Utc};
use serde_json::{json, Value};

const AGENDA_LIMIT: u32 = 50;
const WINDOW_LIMIT: u32 = 100;

fn event_entry(event: &CalendarEvent) -> Value {
    json!({
        "id": event.id,
        "title": event.summary,
        "description": event.description,
        "start_time": event.start_time.to_rfc3339(),
        "end_time": event.end_time.to_rfc3339(),
        "location": event.location,
        "attendees": event.attendees,
    })
}

fn to_value<T: serde::Serialize>(value: T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::ParseError(e.to_string()))
}

pub async fn list_calendars(client: &CalendarClient) -> ApiResult<Value> {
    let calendars = client.list_calendars().await?;
    Ok(json!({
        "total_calendars": calendars.len(),
        "calendars": calendars
            .iter()
            .map(|c| json!({
                "id": c.id,
                "name": c.summary,
                "description": c.description,
                "time_zone": c.time_zone,
                "access_role": c.access_role,
                "selected": c.selected,
            }))
            .collect::<Vec<_>>(),
    }))
}

pub async fn get_upcoming_events(
    client: &CalendarClient,
    calendar_id: &str,
    days_ahead: u32,
    max_results: u32,
) -> ApiResult<Value> {
    let now = Utc::now();
    let until = now + Duration::days(i64::from(days_ahead));
    let events = client
        .get_events(calendar_id, now, Some(until), max_results)
        .await?;

    let entries: Vec<Value> = events
        .iter()
        .map(|event| {
            let mut entry = event_entry(event);
            entry["status"] = json!(event.status);
            entry["creator"] = json!(event.creator);
            entry
        })
        .collect();
    Ok(json!({
        "calendar_id": calendar_id,
        "period": format!("Next {} days", days_ahead),
        "total_events": entries.len(),
        "events": entries,
    }))
}

#[allow(clippy::too_many_arguments)]
pub async fn create_calendar_event(
    client: &CalendarClient,
    calendar_id: &str,
    title: &str,
    description: &str,
    start_datetime: &str,
    end_datetime: &str,
    attendees: Vec<String>,
    location: &str,
) -> ApiResult<Value> {
    let event = NewEvent {
        summary: title.to_string(),
        description: description.to_string(),
        start: parse_tool_datetime(start_datetime)?,
        end: parse_tool_datetime(end_datetime)?,
        attendees,
        location: location.to_string(),
    };
    client.create_event(calendar_id, &event).await
}

pub async fn update_calendar_event(
    client: &CalendarClient,
    calendar_id: &str,
    event_id: &str,
    mut patch: EventPatch,
    start_datetime: Option<&str>,
    end_datetime: Option<&str>,
) -> ApiResult<Value> {
    if let Some(start) = start_datetime {
        patch.start = Some(parse_tool_datetime(start)?);
    }
    if let Some(end) = end_datetime {
        patch.end = Some(parse_tool_datetime(end)?);
    }
    client.update_event(calendar_id, event_id, &patch).await
}

pub async fn delete_calendar_event(
    client: &CalendarClient,
    calendar_id: &str,
    event_id: &str,
) -> ApiResult<Value> {
    client.delete_event(calendar_id, event_id).await
}

pub async fn search_calendar_events(
    client: &CalendarClient,
    calendar_id: &str,
    query: &str,
    days_back: u32,
    days_ahead: u32,
) -> ApiResult<Value> {
    let now = Utc::now();
    let from = now - Duration::days(i64::from(days_back));
    let until = now + Duration::days(i64::from(days_ahead));
    let events = client
        .get_events(calendar_id, from, Some(until), WINDOW_LIMIT)
        .await?;
    let matches = views::search_events(events, query);
    Ok(json!({
        "query": query,
        "calendar_id": calendar_id,
        "total_matches": matches.len(),
        "events": matches.iter().map(event_entry).collect::<Vec<_>>(),
    }))
}

pub async fn check_availability(
    client: &CalendarClient,
    calendar_ids: &[String],
    start_datetime: &str,
    end_datetime: &str,
) -> ApiResult<Value> {
    let start = parse_tool_datetime(start_datetime)?;
    let end = parse_tool_datetime(end_datetime)?;
    match client
        .free_busy(calendar_ids, start.with_timezone(&Utc), end.with_timezone(&Utc))
        .await
    {
        Ok(availability) => Ok(json!({
            "success": true,
            "time_period": { "start": start_datetime, "end": end_datetime },
            "availability": availability,
        })),
        Err(e) => soft_failure(e),
    }
}

pub async fn get_today_agenda(client: &CalendarClient, calendar_id: &str) -> ApiResult<Value> {
    let today = Local::now().date_naive();
    let start = local_midnight(today);
    let end = start + Duration::days(1);
    let events = client
        .get_events(
            calendar_id,
            start.with_timezone(&Utc),
            Some(end.with_timezone(&Utc)),
            AGENDA_LIMIT,
        )
        .await?;
    let agenda = views::agenda(events);
    Ok(json!({
        "date": today.format("%Y-%m-%d").to_string(),
        "calendar_id": calendar_id,
        "total_events": agenda.len(),
        "events": agenda,
    }))
}

pub async fn get_weekly_calendar_summary(
    client: &CalendarClient,
    calendar_id: &str,
) -> ApiResult<Value> {
    let today = Local::now().date_naive();
    let week_end = today + Duration::days(7);
    let events = client
        .get_events(
            calendar_id,
            local_midnight(today).with_timezone(&Utc),
            Some(local_midnight(week_end).with_timezone(&Utc)),
            WINDOW_LIMIT,
        )
        .await?;
    let mut summary = to_value(views::weekly_calendar_summary(&events))?;
    summary["period"] = json!(format!(
        "{} to {}",
        today.format("%Y-%m-%d"),
        week_end.format("%Y-%m-%d")
    ));
    Ok(summary)
}
