/// Drive API Tests Module
///
/// File normalization, editor collection and the Drive client against a
/// mock Drive API: listing, search escaping, activity timelines and download.
use mcp_productivity::auth::Credential;
use mcp_productivity::config::Provider;
use mcp_productivity::drive_api::{collect_editors, escape_query_literal, normalize_file, DriveClient};
use mcp_productivity::session::Session;
use mcp_productivity::tools;
use mockito::{Matcher, Mock, Server};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::tempdir;

fn client(server: &Server) -> DriveClient {
    let session = Session::from_credential(
        Provider::Drive,
        Credential {
            access_token: "drive_token".to_string(),
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
    DriveClient::new(Arc::new(session)).with_base_url(server.url())
}

fn user(email: &str) -> Value {
    json!({ "emailAddress": email, "displayName": email })
}

// Editor lookups hit the file and its revisions
async fn mock_editors(server: &mut Server, file_id: &str, owner: &str, revision_users: &[&str]) -> (Mock, Mock) {
    let file = server
        .mock("GET", format!("/files/{}", file_id).as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({
                "id": file_id,
                "name": format!("{}.txt", file_id),
                "mimeType": "text/plain",
                "size": "12",
                "createdTime": "2024-01-01T00:00:00Z",
                "owners": [user(owner)],
                "lastModifyingUser": user(owner)
            })
            .to_string(),
        )
        .create_async()
        .await;
    let revisions: Vec<Value> = revision_users
        .iter()
        .enumerate()
        .map(|(i, u)| {
            json!({
                "id": (i + 1).to_string(),
                "modifiedTime": format!("2024-01-{:02}T00:00:00Z", i + 2),
                "lastModifyingUser": user(u)
            })
        })
        .collect();
    let revs = server
        .mock("GET", format!("/files/{}/revisions", file_id).as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({ "revisions": revisions }).to_string())
        .create_async()
        .await;
    (file, revs)
}

#[test]
fn test_escape_query_literal() {
    assert_eq!(escape_query_literal("Bob's report"), "Bob\\'s report");
    assert_eq!(escape_query_literal(r"a\b"), r"a\\b");
}

#[test]
fn test_collect_editors_sorted_and_unique() {
    let file = json!({
        "owners": [user("zoe@example.com")],
        "lastModifyingUser": user("amy@example.com")
    });
    let revisions = vec![
        json!({ "lastModifyingUser": user("amy@example.com") }),
        json!({ "lastModifyingUser": user("max@example.com") }),
        json!({}),
    ];
    assert_eq!(
        collect_editors(&file, &revisions),
        vec!["amy@example.com", "max@example.com", "zoe@example.com"]
    );
}

#[test]
fn test_normalize_file_keeps_missing_fields_absent() {
    let file = normalize_file(&json!({ "id": "f1", "name": "Doc" }), vec![]);
    assert_eq!(file.id.as_deref(), Some("f1"));
    assert!(file.size.is_none());
    assert!(!file.shared);

    let serialized = serde_json::to_value(&file).unwrap();
    assert!(serialized["size"].is_null());
    assert!(serialized.get("description").is_none());
    assert!(serialized.get("type").is_some());
}

#[tokio::test]
async fn test_search_files_escapes_and_annotates() {
    let mut server = Server::new_async().await;
    let list = server
        .mock("GET", "/files")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), "name contains 'Bob\\'s' and trashed = false".into()),
            Matcher::UrlEncoded("pageSize".into(), "10".into()),
        ]))
        .match_header("authorization", "Bearer drive_token")
        .with_status(200)
        .with_body(json!({ "files": [{ "id": "f1", "name": "Bob's plan", "mimeType": "text/plain" }] }).to_string())
        .create_async()
        .await;
    let _editors = mock_editors(&mut server, "f1", "bob@example.com", &["eve@example.com"]).await;

    let report = tools::drive::search_drive_files(&client(&server), "Bob's", 10)
        .await
        .unwrap();

    list.assert_async().await;
    assert_eq!(report["success"], true);
    assert_eq!(report["query"], "Bob's");
    assert_eq!(report["total_files"], 1);
    assert_eq!(
        report["files"][0]["editors"],
        json!(["bob@example.com", "eve@example.com"])
    );
}

#[tokio::test]
async fn test_list_shared_files_query() {
    let mut server = Server::new_async().await;
    let list = server
        .mock("GET", "/files")
        .match_query(Matcher::UrlEncoded(
            "q".into(),
            "sharedWithMe = true and trashed = false".into(),
        ))
        .with_status(200)
        .with_body(r#"{"files": []}"#)
        .create_async()
        .await;

    let report = tools::drive::list_shared_drive_files(&client(&server), 100)
        .await
        .unwrap();

    list.assert_async().await;
    assert_eq!(report["total_files"], 0);
}

#[tokio::test]
async fn test_list_files_failure_is_soft() {
    let mut server = Server::new_async().await;
    let _list = server
        .mock("GET", "/files")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body("invalid credentials")
        .create_async()
        .await;

    let text = tools::respond(
        "list_drive_files",
        tools::drive::list_drive_files(&client(&server), None, 100).await,
    );
    let report: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(report["success"], false);
    assert!(report["error"].as_str().unwrap().contains("401"));
}

#[tokio::test]
async fn test_editor_lookup_failure_yields_empty_editors() {
    let mut server = Server::new_async().await;
    let _meta = server
        .mock("GET", "/files/f9")
        .match_query(Matcher::UrlEncoded(
            "fields".into(),
            "id, name, mimeType, size, createdTime, modifiedTime, owners, shared, webViewLink, description, capabilities, lastModifyingUser".into(),
        ))
        .with_status(200)
        .with_body(json!({ "id": "f9", "name": "Secret", "description": "private" }).to_string())
        .create_async()
        .await;
    let _revs = server
        .mock("GET", "/files/f9/revisions")
        .match_query(Matcher::Any)
        .with_status(403)
        .create_async()
        .await;

    let report = tools::drive::get_drive_file_metadata(&client(&server), "f9")
        .await
        .unwrap();

    assert_eq!(report["success"], true);
    assert_eq!(report["file"]["description"], "private");
    assert_eq!(report["file"]["editors"], json!([]));
}

#[tokio::test]
async fn test_file_activity_newest_first_and_truncated() {
    let mut server = Server::new_async().await;
    let _editors = mock_editors(
        &mut server,
        "f2",
        "owner@example.com",
        &["a@example.com", "b@example.com", "c@example.com"],
    )
    .await;

    let report = tools::drive::get_drive_file_activity(&client(&server), "f2", 2)
        .await
        .unwrap();

    assert_eq!(report["success"], true);
    assert_eq!(report["total_activities"], 4);
    let activities = report["activities"].as_array().unwrap();
    assert_eq!(activities.len(), 2);
    assert_eq!(activities[0]["type"], "modified");
    assert_eq!(activities[0]["user"], "c@example.com");
    assert_eq!(activities[0]["details"], "File modified (revision 3)");
    assert_eq!(activities[1]["user"], "b@example.com");
    assert_eq!(
        report["file"]["editors"],
        json!(["a@example.com", "b@example.com", "c@example.com", "owner@example.com"])
    );
}

#[tokio::test]
async fn test_recent_activity() {
    let mut server = Server::new_async().await;
    let list = server
        .mock("GET", "/files")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("orderBy".into(), "modifiedTime desc".into()),
            Matcher::UrlEncoded("q".into(), "trashed = false".into()),
        ]))
        .with_status(200)
        .with_body(
            json!({ "files": [{
                "id": "f3",
                "name": "Notes",
                "mimeType": "text/plain",
                "modifiedTime": "2024-02-01T00:00:00Z",
                "lastModifyingUser": user("amy@example.com")
            }]})
            .to_string(),
        )
        .create_async()
        .await;
    let _editors = mock_editors(&mut server, "f3", "amy@example.com", &[]).await;

    let report = tools::drive::get_recent_drive_activity(&client(&server), 5)
        .await
        .unwrap();

    list.assert_async().await;
    assert_eq!(report["total_activities"], 1);
    assert_eq!(report["activities"][0]["user"], "amy@example.com");
    assert_eq!(report["activities"][0]["file"]["name"], "Notes");
    assert_eq!(report["activities"][0]["file"]["editors"], json!(["amy@example.com"]));
}

#[tokio::test]
async fn test_download_writes_content() {
    let mut server = Server::new_async().await;
    let _meta = server
        .mock("GET", "/files/f4")
        .match_query(Matcher::Regex("fields=".into()))
        .with_status(200)
        .with_body(json!({ "id": "f4", "name": "hello.txt", "mimeType": "text/plain", "size": "11" }).to_string())
        .create_async()
        .await;
    let media = server
        .mock("GET", "/files/f4")
        .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
        .with_status(200)
        .with_body("hello drive")
        .create_async()
        .await;
    let _revs = server
        .mock("GET", "/files/f4/revisions")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"revisions": []}"#)
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let output = dir.path().join("hello.txt");
    let report = tools::drive::download_drive_file(&client(&server), "f4", output.to_str().unwrap())
        .await
        .unwrap();

    media.assert_async().await;
    assert_eq!(report["success"], true);
    assert_eq!(report["file"]["name"], "hello.txt");
    assert_eq!(report["file"]["saved_to"], output.to_str().unwrap());
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "hello drive");
}
