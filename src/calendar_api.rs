use crate::errors::{ApiError, ApiResult};
use crate::models::{BusyPeriod, CalendarAvailability, CalendarEvent, CalendarInfo};
use crate::session::Session;
use crate::utils::{read_json, soft_failure, str_or};
use crate::views::availability;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use log::{debug, info, warn};
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Fields for a new event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub summary: String,
    pub description: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub attendees: Vec<String>,
    pub location: String,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    pub attendees: Option<Vec<String>>,
    pub location: Option<String>,
}

pub struct CalendarClient {
    session: Arc<Session>,
    base_url: String,
}

impl CalendarClient {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            base_url: crate::config::CALENDAR_API_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        )
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        query: &[(&str, &str)],
    ) -> ApiResult<Value> {
        let mut request = self.session.request(method, url).await?.query(query);
        if let Some(body) = body {
            request = request.json(body);
        }
        read_json(request.send().await?).await
    }

    pub async fn list_calendars(&self) -> ApiResult<Vec<CalendarInfo>> {
        let url = format!("{}/users/me/calendarList", self.base_url);
        let listing = match self.send(Method::GET, &url, None, &[]).await {
            Ok(listing) => listing,
            Err(e) if e.is_transient() => {
                warn!("Calendar list request failed, returning no calendars: {}", e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        Ok(items(&listing).iter().map(parse_calendar_info).collect())
    }

    /// Single (expanded) events starting inside the window, ordered by start.
    pub async fn get_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: Option<DateTime<Utc>>,
        max_results: u32,
    ) -> ApiResult<Vec<CalendarEvent>> {
        let time_min = rfc3339_utc(time_min);
        let time_max = time_max.map(rfc3339_utc);
        let max = max_results.to_string();
        let mut query = vec![
            ("timeMin", time_min.as_str()),
            ("maxResults", max.as_str()),
            ("singleEvents", "true"),
            ("orderBy", "startTime"),
        ];
        if let Some(time_max) = time_max.as_deref() {
            query.push(("timeMax", time_max));
        }
        debug!("Listing events for {} from {}", calendar_id, time_min);

        let listing = match self
            .send(Method::GET, &self.events_url(calendar_id), None, &query)
            .await
        {
            Ok(listing) => listing,
            Err(e) if e.is_transient() => {
                warn!("Event list for {} failed, returning no events: {}", calendar_id, e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        items(&listing)
            .iter()
            .map(|raw| parse_event(raw, calendar_id))
            .collect()
    }

    pub async fn create_event(&self, calendar_id: &str, event: &NewEvent) -> ApiResult<Value> {
        let mut body = json!({
            "summary": event.summary,
            "description": event.description,
            "start": event_time(&event.start),
            "end": event_time(&event.end),
            "location": event.location,
        });
        if !event.attendees.is_empty() {
            body["attendees"] = attendee_list(&event.attendees);
        }

        let result = self
            .send(
                Method::POST,
                &self.events_url(calendar_id),
                Some(&body),
                &[("sendUpdates", "all")],
            )
            .await;
        match result {
            Ok(created) => {
                info!("Created event in {}", calendar_id);
                Ok(json!({
                    "success": true,
                    "event_id": created.get("id"),
                    "event_link": created.get("htmlLink"),
                    "summary": created.get("summary"),
                    "start_time": event.start.to_rfc3339(),
                    "end_time": event.end.to_rfc3339(),
                }))
            }
            Err(e) => soft_failure(e),
        }
    }

    /// Fetch the event, overlay the provided fields and write it back.
    pub async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> ApiResult<Value> {
        let url = format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(event_id)
        );
        let mut event = match self.send(Method::GET, &url, None, &[]).await {
            Ok(Value::Object(event)) => event,
            Ok(_) => {
                return Err(ApiError::MalformedResponse(format!(
                    "event {} is not an object",
                    event_id
                )))
            }
            Err(e) => return soft_failure(e),
        };
        apply_patch(&mut event, patch);

        match self
            .send(
                Method::PUT,
                &url,
                Some(&Value::Object(event)),
                &[("sendUpdates", "all")],
            )
            .await
        {
            Ok(updated) => {
                info!("Updated event {} in {}", event_id, calendar_id);
                Ok(json!({
                    "success": true,
                    "event_id": updated.get("id"),
                    "summary": updated.get("summary"),
                }))
            }
            Err(e) => soft_failure(e),
        }
    }

    pub async fn delete_event(&self, calendar_id: &str, event_id: &str) -> ApiResult<Value> {
        let url = format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(event_id)
        );
        match self
            .send(Method::DELETE, &url, None, &[("sendUpdates", "all")])
            .await
        {
            Ok(_) => {
                info!("Deleted event {} from {}", event_id, calendar_id);
                Ok(json!({
                    "success": true,
                    "message": format!("Event {} deleted successfully", event_id),
                }))
            }
            Err(e) => soft_failure(e),
        }
    }

    /// Busy intervals per calendar for the window.
    pub async fn free_busy(
        &self,
        calendar_ids: &[String],
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> ApiResult<BTreeMap<String, CalendarAvailability>> {
        let body = json!({
            "timeMin": rfc3339_utc(time_min),
            "timeMax": rfc3339_utc(time_max),
            "items": calendar_ids.iter().map(|id| json!({ "id": id })).collect::<Vec<_>>(),
        });
        let url = format!("{}/freeBusy", self.base_url);
        let result = self.send(Method::POST, &url, Some(&body), &[]).await?;
        Ok(parse_free_busy(&result))
    }
}

fn items(listing: &Value) -> &[Value] {
    listing
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn rfc3339_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn event_time(dt: &DateTime<FixedOffset>) -> Value {
    json!({ "dateTime": dt.to_rfc3339(), "timeZone": "UTC" })
}

fn attendee_list(attendees: &[String]) -> Value {
    Value::Array(attendees.iter().map(|a| json!({ "email": a })).collect())
}

fn apply_patch(event: &mut Map<String, Value>, patch: &EventPatch) {
    if let Some(summary) = &patch.summary {
        event.insert("summary".into(), json!(summary));
    }
    if let Some(description) = &patch.description {
        event.insert("description".into(), json!(description));
    }
    if let Some(start) = &patch.start {
        event.insert("start".into(), event_time(start));
    }
    if let Some(end) = &patch.end {
        event.insert("end".into(), event_time(end));
    }
    if let Some(location) = &patch.location {
        event.insert("location".into(), json!(location));
    }
    if let Some(attendees) = &patch.attendees {
        event.insert("attendees".into(), attendee_list(attendees));
    }
}

pub fn parse_calendar_info(raw: &Value) -> CalendarInfo {
    CalendarInfo {
        id: str_or(raw, "id", "").to_string(),
        summary: str_or(raw, "summary", "").to_string(),
        description: str_or(raw, "description", "").to_string(),
        time_zone: str_or(raw, "timeZone", "").to_string(),
        access_role: str_or(raw, "accessRole", "").to_string(),
        selected: raw.get("selected").and_then(Value::as_bool).unwrap_or(false),
    }
}

/// Normalize an event resource. `start` and `end` are required.
pub fn parse_event(raw: &Value, calendar_id: &str) -> ApiResult<CalendarEvent> {
    let start_time = parse_event_time(raw, "start")?;
    let end_time = parse_event_time(raw, "end")?;

    let attendees = raw
        .get("attendees")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .map(|a| str_or(a, "email", "").to_string())
                .collect()
        })
        .unwrap_or_default();
    let creator = raw
        .get("creator")
        .map(|c| str_or(c, "email", ""))
        .unwrap_or("")
        .to_string();

    Ok(CalendarEvent {
        id: str_or(raw, "id", "").to_string(),
        summary: str_or(raw, "summary", "No Title").to_string(),
        description: str_or(raw, "description", "").to_string(),
        start_time,
        end_time,
        attendees,
        location: str_or(raw, "location", "").to_string(),
        status: str_or(raw, "status", "").to_string(),
        creator,
        calendar_id: calendar_id.to_string(),
    })
}

fn parse_event_time(raw: &Value, field: &str) -> ApiResult<DateTime<FixedOffset>> {
    let malformed = |detail: &str| {
        ApiError::MalformedResponse(format!(
            "event {} {}: {}",
            str_or(raw, "id", "<unknown>"),
            field,
            detail
        ))
    };
    let slot = raw.get(field).ok_or_else(|| malformed("missing"))?;
    let value = slot
        .get("dateTime")
        .or_else(|| slot.get("date"))
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("no dateTime or date"))?;

    if value.contains('T') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(dt);
        }
        return NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
            .map_err(|e| malformed(&e.to_string()));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| malformed(&e.to_string()))?;
    Ok(local_midnight(date))
}

/// Midnight of `date` in the local timezone.
pub fn local_midnight(date: NaiveDate) -> DateTime<FixedOffset> {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.fixed_offset())
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight).fixed_offset())
}

pub fn parse_free_busy(result: &Value) -> BTreeMap<String, CalendarAvailability> {
    result
        .get("calendars")
        .and_then(Value::as_object)
        .map(|calendars| {
            calendars
                .iter()
                .map(|(id, data)| {
                    let busy = data
                        .get("busy")
                        .and_then(Value::as_array)
                        .map(|periods| {
                            periods
                                .iter()
                                .map(|p| BusyPeriod {
                                    start: p
                                        .get("start")
                                        .and_then(Value::as_str)
                                        .map(str::to_string),
                                    end: p.get("end").and_then(Value::as_str).map(str::to_string),
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    (id.clone(), availability(busy))
                })
                .collect()
        })
        .unwrap_or_default()
}
