/// Server and Session Provider Tests Module
///
/// Covers the tool error contract, lazy per-provider sessions and the
/// debug_paths diagnostics report.
use mcp_productivity::auth::Credential;
use mcp_productivity::config::{Config, Provider};
use mcp_productivity::errors::{ApiError, AuthError};
use mcp_productivity::session::{Session, SessionProvider};
use mcp_productivity::tools::respond;
use mcp_productivity::ProductivityServer;
use mockito::{Matcher, Server};
use serde_json::{json, Value};
use tempfile::tempdir;

fn fixed_credential(token: &str) -> Credential {
    Credential {
        access_token: token.to_string(),
        refresh_token: None,
        expiry: None,
        scopes: vec![],
        client_id: "id".to_string(),
        client_secret: None,
        token_uri: "http://127.0.0.1:1/token".to_string(),
        workspace_name: None,
        workspace_id: None,
    }
}

#[test]
fn test_respond_success_is_pretty_json() {
    let text = respond("list_calendars", Ok(json!({ "total_calendars": 0, "calendars": [] })));
    assert!(text.contains('\n'));
    let parsed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["total_calendars"], 0);
}

#[test]
fn test_respond_error_never_escapes() {
    let text = respond(
        "search_emails",
        Err(ApiError::HttpError {
            status: 429,
            message: "rate limited".to_string(),
        }),
    );
    let parsed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.as_object().unwrap().len(), 1);
    assert!(parsed["error"].as_str().unwrap().contains("429"));
}

#[tokio::test]
async fn test_missing_secret_surfaces_and_is_not_cached() {
    let home = tempdir().unwrap();
    let sessions = SessionProvider::new(Config::with_home_dir(home.path()));

    let result = sessions.gmail().await;
    match result {
        Err(ApiError::Auth(AuthError::MissingSecretFile { ref provider, .. })) => {
            assert_eq!(provider, "gmail")
        }
        Err(other) => panic!("expected MissingSecretFile, got {:?}", other),
        Ok(_) => panic!("expected MissingSecretFile, got a client"),
    }
    assert!(!sessions.is_initialized(Provider::Gmail));

    let text = respond("get_unread_emails", sessions.gmail().await.map(|_| json!({})));
    let parsed: Value = serde_json::from_str(&text).unwrap();
    assert!(parsed["error"]
        .as_str()
        .unwrap()
        .contains("credentials.json"));
}

#[tokio::test]
async fn test_stored_token_opens_session_once() {
    let home = tempdir().unwrap();
    let config = Config::with_home_dir(home.path());
    let token_path = config.provider(Provider::Notion).token_path.clone();
    let credential = fixed_credential("stored_notion");
    std::fs::write(&token_path, serde_json::to_string(&credential).unwrap()).unwrap();

    let sessions = SessionProvider::new(config);
    assert!(!sessions.is_initialized(Provider::Notion));

    let first = sessions.session(Provider::Notion).await.unwrap();
    let second = sessions.session(Provider::Notion).await.unwrap();

    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert!(sessions.is_initialized(Provider::Notion));
    assert!(!sessions.is_initialized(Provider::Drive));
    assert_eq!(first.bearer_token().await.unwrap(), "stored_notion");
}

#[tokio::test]
async fn test_injected_session_uses_overridden_base_url() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/users/me/messages")
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer injected")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let home = tempdir().unwrap();
    let sessions = SessionProvider::new(Config::with_home_dir(home.path()))
        .with_session(Session::from_credential(
            Provider::Gmail,
            fixed_credential("injected"),
        ))
        .with_base_url(Provider::Gmail, server.url());

    let client = sessions.gmail().await.unwrap();
    let messages = client.get_messages("is:unread", 10).await.unwrap();

    mock.assert_async().await;
    assert!(messages.is_empty());
}

#[test]
fn test_debug_paths_report() {
    let home = tempdir().unwrap();
    std::fs::write(home.path().join("credentials.json"), "{}").unwrap();
    let server = ProductivityServer::new(Config::with_home_dir(home.path()));

    let report = server.debug_paths_report();

    assert_eq!(report["home_directory_exists"], true);
    assert_eq!(report["token_encryption"], false);
    assert_eq!(report["providers"]["gmail"]["credentials_exists"], true);
    assert_eq!(report["providers"]["gmail"]["token_exists"], false);
    assert_eq!(report["providers"]["notion"]["credentials_exists"], false);
    assert_eq!(report["providers"]["drive"]["callback_port"], 8083);
    assert_eq!(report["providers"]["calendar"]["session_initialized"], false);
    assert!(report["current_working_directory"].is_string());
}
