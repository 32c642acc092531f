/// Calendar API Tests Module
///
/// Event normalization plus the calendar client and tool bodies against a
/// mock Calendar API: listing, creation, patching, deletion and free/busy.
use chrono::{Timelike, Utc};
use mcp_productivity::auth::Credential;
use mcp_productivity::calendar_api::{parse_event, parse_free_busy, CalendarClient, EventPatch};
use mcp_productivity::config::Provider;
use mcp_productivity::errors::ApiError;
use mcp_productivity::session::Session;
use mcp_productivity::tools;
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;

fn client(server: &Server) -> CalendarClient {
    let session = Session::from_credential(
        Provider::Calendar,
        Credential {
            access_token: "calendar_token".to_string(),
            refresh_token: None,
            expiry: None,
            scopes: vec![],
            client_id: "id".to_string(),
            client_secret: None,
            token_uri: "http://127.0.0.1:1/token".to_string(),
            workspace_name: None,
            workspace_id: None,
        },
    );
    CalendarClient::new(Arc::new(session)).with_base_url(server.url())
}

#[test]
fn test_parse_timed_event() {
    let raw = json!({
        "id": "evt1",
        "summary": "Planning",
        "start": { "dateTime": "2024-01-15T14:00:00-05:00" },
        "end": { "dateTime": "2024-01-15T15:30:00-05:00" },
        "attendees": [{ "email": "a@example.com" }, { "email": "b@example.com" }],
        "creator": { "email": "owner@example.com" },
        "status": "confirmed"
    });
    let event = parse_event(&raw, "primary").unwrap();

    assert_eq!(event.summary, "Planning");
    assert_eq!(event.attendees.len(), 2);
    assert_eq!(event.creator, "owner@example.com");
    assert_eq!(event.duration_hours(), 1.5);
    assert_eq!(event.start_time.offset().local_minus_utc(), -5 * 3600);
    assert_eq!(event.calendar_id, "primary");
}

#[test]
fn test_parse_all_day_event_starts_at_midnight() {
    let raw = json!({
        "id": "holiday",
        "start": { "date": "2024-12-25" },
        "end": { "date": "2024-12-26" }
    });
    let event = parse_event(&raw, "primary").unwrap();

    assert_eq!(event.summary, "No Title");
    assert_eq!(event.start_time.hour(), 0);
    assert_eq!(event.start_time.minute(), 0);
    assert_eq!(event.end_time.hour(), 0);
    assert_eq!(event.start_time.date_naive().to_string(), "2024-12-25");
}

#[test]
fn test_parse_event_without_start_is_malformed() {
    let raw = json!({ "id": "bad", "end": { "date": "2024-12-26" } });
    assert!(matches!(
        parse_event(&raw, "primary"),
        Err(ApiError::MalformedResponse(_))
    ));
}

#[test]
fn test_parse_free_busy() {
    let raw = json!({
        "calendars": {
            "primary": { "busy": [{ "start": "2024-01-15T10:00:00Z", "end": "2024-01-15T11:00:00Z" }] },
            "team@example.com": { "busy": [] }
        }
    });
    let availability = parse_free_busy(&raw);
    assert!(!availability["primary"].is_free);
    assert!(availability["team@example.com"].is_free);
    assert!(availability["team@example.com"].busy_periods.is_empty());
}

#[tokio::test]
async fn test_list_calendars() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/users/me/calendarList")
        .match_header("authorization", "Bearer calendar_token")
        .with_status(200)
        .with_body(
            json!({ "items": [
                { "id": "primary", "summary": "Me", "timeZone": "Europe/Lisbon", "accessRole": "owner", "selected": true },
                { "id": "holidays", "summary": "Holidays" }
            ]})
            .to_string(),
        )
        .create_async()
        .await;

    let report = tools::calendar::list_calendars(&client(&server)).await.unwrap();

    mock.assert_async().await;
    assert_eq!(report["total_calendars"], 2);
    assert_eq!(report["calendars"][0]["time_zone"], "Europe/Lisbon");
    assert_eq!(report["calendars"][1]["selected"], false);
}

#[tokio::test]
async fn test_upcoming_events_query_and_failure() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/calendars/primary/events")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("singleEvents".into(), "true".into()),
            Matcher::UrlEncoded("orderBy".into(), "startTime".into()),
            Matcher::UrlEncoded("maxResults".into(), "20".into()),
        ]))
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let report = tools::calendar::get_upcoming_events(&client(&server), "primary", 7, 20)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(report["total_events"], 0);
    assert_eq!(report["period"], "Next 7 days");
}

#[tokio::test]
async fn test_create_event_sends_invites() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/calendars/primary/events")
        .match_query(Matcher::UrlEncoded("sendUpdates".into(), "all".into()))
        .match_body(Matcher::PartialJson(json!({
            "summary": "Review",
            "start": { "dateTime": "2024-01-15T14:00:00+00:00" },
            "attendees": [{ "email": "a@example.com" }]
        })))
        .with_status(200)
        .with_body(json!({ "id": "new-evt", "htmlLink": "https://calendar.example/e", "summary": "Review" }).to_string())
        .create_async()
        .await;

    let report = tools::calendar::create_calendar_event(
        &client(&server),
        "primary",
        "Review",
        "Quarterly review",
        "2024-01-15T14:00:00",
        "2024-01-15T15:00:00",
        vec!["a@example.com".to_string()],
        "",
    )
    .await
    .unwrap();

    mock.assert_async().await;
    assert_eq!(report["success"], true);
    assert_eq!(report["event_id"], "new-evt");
    assert_eq!(report["event_link"], "https://calendar.example/e");
}

#[tokio::test]
async fn test_create_event_rejects_bad_datetime() {
    let server = Server::new_async().await;
    let result = tools::calendar::create_calendar_event(
        &client(&server),
        "primary",
        "Review",
        "",
        "tomorrow afternoon",
        "2024-01-15T15:00:00",
        vec![],
        "",
    )
    .await;
    assert!(matches!(result, Err(ApiError::ParseError(_))));
}

#[tokio::test]
async fn test_create_event_remote_failure_is_soft() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/calendars/primary/events")
        .match_query(Matcher::Any)
        .with_status(403)
        .with_body("insufficient permissions")
        .create_async()
        .await;

    let report = tools::calendar::create_calendar_event(
        &client(&server),
        "primary",
        "Review",
        "",
        "2024-01-15T14:00:00Z",
        "2024-01-15T15:00:00Z",
        vec![],
        "",
    )
    .await
    .unwrap();

    assert_eq!(report["success"], false);
    assert!(report["error"].as_str().unwrap().contains("403"));
}

#[tokio::test]
async fn test_update_event_keeps_unpatched_fields() {
    let mut server = Server::new_async().await;
    let get = server
        .mock("GET", "/calendars/primary/events/evt1")
        .with_status(200)
        .with_body(
            json!({
                "id": "evt1",
                "summary": "Old title",
                "location": "Room 1",
                "start": { "dateTime": "2024-01-15T09:00:00Z" },
                "end": { "dateTime": "2024-01-15T10:00:00Z" }
            })
            .to_string(),
        )
        .create_async()
        .await;
    let put = server
        .mock("PUT", "/calendars/primary/events/evt1")
        .match_query(Matcher::UrlEncoded("sendUpdates".into(), "all".into()))
        .match_body(Matcher::PartialJson(json!({
            "summary": "New title",
            "location": "Room 1",
            "start": { "dateTime": "2024-01-15T09:00:00Z" }
        })))
        .with_status(200)
        .with_body(json!({ "id": "evt1", "summary": "New title" }).to_string())
        .create_async()
        .await;

    let patch = EventPatch {
        summary: Some("New title".to_string()),
        ..EventPatch::default()
    };
    let report = tools::calendar::update_calendar_event(&client(&server), "primary", "evt1", patch, None, None)
        .await
        .unwrap();

    get.assert_async().await;
    put.assert_async().await;
    assert_eq!(report["success"], true);
    assert_eq!(report["summary"], "New title");
}

#[tokio::test]
async fn test_delete_event() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("DELETE", "/calendars/primary/events/evt1")
        .match_query(Matcher::UrlEncoded("sendUpdates".into(), "all".into()))
        .with_status(204)
        .create_async()
        .await;

    let report = tools::calendar::delete_calendar_event(&client(&server), "primary", "evt1")
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(report["success"], true);
}

#[tokio::test]
async fn test_check_availability() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/freeBusy")
        .match_body(Matcher::PartialJson(json!({
            "timeMin": "2024-01-15T09:00:00Z",
            "timeMax": "2024-01-15T17:00:00Z",
            "items": [{ "id": "primary" }, { "id": "team@example.com" }]
        })))
        .with_status(200)
        .with_body(
            json!({ "calendars": {
                "primary": { "busy": [{ "start": "2024-01-15T10:00:00Z", "end": "2024-01-15T11:00:00Z" }] },
                "team@example.com": { "busy": [] }
            }})
            .to_string(),
        )
        .create_async()
        .await;

    let ids = vec!["primary".to_string(), "team@example.com".to_string()];
    let report = tools::calendar::check_availability(
        &client(&server),
        &ids,
        "2024-01-15T09:00:00",
        "2024-01-15T17:00:00",
    )
    .await
    .unwrap();

    mock.assert_async().await;
    assert_eq!(report["success"], true);
    assert_eq!(report["availability"]["primary"]["is_free"], false);
    assert_eq!(report["availability"]["team@example.com"]["is_free"], true);
    assert_eq!(report["time_period"]["start"], "2024-01-15T09:00:00");
}

#[tokio::test]
async fn test_search_calendar_events_filters_locally() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/calendars/primary/events")
        .match_query(Matcher::UrlEncoded("maxResults".into(), "100".into()))
        .with_status(200)
        .with_body(
            json!({ "items": [
                { "id": "1", "summary": "Dentist", "start": { "dateTime": "2024-01-15T09:00:00Z" }, "end": { "dateTime": "2024-01-15T10:00:00Z" } },
                { "id": "2", "summary": "Standup", "description": "daily sync", "start": { "dateTime": "2024-01-16T09:00:00Z" }, "end": { "dateTime": "2024-01-16T09:15:00Z" } }
            ]})
            .to_string(),
        )
        .create_async()
        .await;

    let report = tools::calendar::search_calendar_events(&client(&server), "primary", "SYNC", 30, 30)
        .await
        .unwrap();

    assert_eq!(report["total_matches"], 1);
    assert_eq!(report["events"][0]["title"], "Standup");
}

#[tokio::test]
async fn test_weekly_summary_shape() {
    let mut server = Server::new_async().await;
    let start = Utc::now().to_rfc3339();
    let end = (Utc::now() + chrono::Duration::hours(2)).to_rfc3339();
    let _mock = server
        .mock("GET", "/calendars/primary/events")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({ "items": [
                { "id": "1", "summary": "Focus", "start": { "dateTime": start }, "end": { "dateTime": end } }
            ]})
            .to_string(),
        )
        .create_async()
        .await;

    let report = tools::calendar::get_weekly_calendar_summary(&client(&server), "primary")
        .await
        .unwrap();

    assert_eq!(report["total_events"], 1);
    assert_eq!(report["total_hours_scheduled"], 2.0);
    assert!(report["busiest_day"].is_string());
    assert!(report["period"].as_str().unwrap().contains(" to "));
}
