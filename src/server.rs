use crate::calendar_api::EventPatch;
use crate::config::{Config, Provider};
use crate::errors::ApiResult;
use crate::session::SessionProvider;
use crate::tools::{self, respond};
use crate::utils::parse_max_results;
use log::{debug, info};
use mcp_attr::server::{mcp_server, McpServer};
use mcp_attr::Result as McpResult;
use serde_json::{json, Value};
use std::sync::Arc;

const SETUP_INSTRUCTIONS: &str = r#"# Productivity MCP Server Setup

## 1. Google APIs (Gmail, Calendar, Drive)
1. Open the Google Cloud Console (https://console.cloud.google.com/)
2. Create or select a project
3. Enable the Gmail API, the Google Calendar API and the Google Drive API
4. Create an OAuth 2.0 Client ID of type "Desktop app"
5. Download the client JSON and save it as `credentials.json` in the
   server home directory, or set GOOGLE_CREDENTIALS_PATH

## 2. Notion
1. Create a public integration at https://www.notion.so/my-integrations
2. Save `{"client_id", "client_secret", "redirect_uri"}` as
   `credentials_notion.json` in the server home directory, or set
   NOTION_CREDENTIALS_PATH

## 3. Authentication
Each provider keeps its own token file and consent port:
- Gmail: port 8080 (GMAIL_CALLBACK_PORT)
- Calendar: port 8081 (CALENDAR_CALLBACK_PORT)
- Notion: port 8082 (NOTION_CALLBACK_PORT)
- Drive: port 8083 (DRIVE_CALLBACK_PORT)
Run `mcp-productivity auth` once to authorize every provider, or let the
first tool call open the consent page. Set TOKEN_ENCRYPTION_KEY to store
tokens encrypted.

## 4. Tools
Gmail: get_unread_emails, get_important_missed_emails,
get_email_summary_by_sender, search_emails, get_weekly_email_insights
Calendar: list_calendars, get_upcoming_events, create_calendar_event,
update_calendar_event, delete_calendar_event, search_calendar_events,
check_availability, get_today_agenda, get_weekly_calendar_summary
Drive: list_drive_files, search_drive_files, get_drive_file_metadata,
list_shared_drive_files, get_drive_file_activity,
get_recent_drive_activity, download_drive_file
Notion: list_notion_pages, find_notion_page, create_notion_page
Diagnostics: debug_paths
"#;

/// MCP server exposing Gmail, Calendar, Drive and Notion tools.
#[derive(Clone)]
pub struct ProductivityServer {
    sessions: Arc<SessionProvider>,
}

impl ProductivityServer {
    pub fn new(config: Config) -> Self {
        Self::with_sessions(SessionProvider::new(config))
    }

    pub fn with_sessions(sessions: SessionProvider) -> Self {
        Self {
            sessions: Arc::new(sessions),
        }
    }

    pub fn sessions(&self) -> &SessionProvider {
        &self.sessions
    }

    /// Configured paths and ports, and whether the files exist.
    pub fn debug_paths_report(&self) -> Value {
        let config = self.sessions.config();
        let providers: serde_json::Map<String, Value> = Provider::ALL
            .iter()
            .map(|&provider| {
                let pc = config.provider(provider);
                (
                    provider.to_string(),
                    json!({
                        "credentials_path": pc.secret_path.display().to_string(),
                        "credentials_exists": pc.secret_path.exists(),
                        "token_path": pc.token_path.display().to_string(),
                        "token_exists": pc.token_path.exists(),
                        "callback_port": pc.callback_port,
                        "session_initialized": self.sessions.is_initialized(provider),
                    }),
                )
            })
            .collect();

        json!({
            "home_directory": config.home_dir.display().to_string(),
            "home_directory_exists": config.home_dir.exists(),
            "current_working_directory": std::env::current_dir()
                .map(|d| d.display().to_string())
                .unwrap_or_default(),
            "token_encryption": config.encryption_key.is_some(),
            "providers": providers,
        })
    }
}

#[mcp_server]
impl McpServer for ProductivityServer {
    /// Setup instructions for the Google and Notion credentials this server needs.
    #[prompt]
    async fn setup_instructions(&self) -> McpResult<&str> {
        Ok(SETUP_INSTRUCTIONS)
    }

    /// Show configured credential and token paths, whether they exist, and the
    /// consent callback ports.
    #[tool]
    async fn debug_paths(&self) -> McpResult<String> {
        debug!("debug_paths called");
        Ok(format!("{:#}", self.debug_paths_report()))
    }

    /// Get unread emails from the Gmail inbox, most important first.
    #[tool]
    async fn get_unread_emails(
        &self,
        /// Maximum number of emails to return (default: 75). Number or string.
        max_results: Option<Value>,
    ) -> McpResult<String> {
        info!("=== START get_unread_emails MCP command ===");
        let max = parse_max_results(max_results, 75);
        let result: ApiResult<Value> = async {
            let client = self.sessions.gmail().await?;
            tools::gmail::get_unread_emails(&client, max).await
        }
        .await;
        Ok(respond("get_unread_emails", result))
    }

    /// Get important unread emails from the last N days that might have been missed.
    #[tool]
    async fn get_important_missed_emails(
        &self,
        /// Days to look back (default: 7)
        days_back: Option<Value>,
        /// Minimum importance score from 1 to 10 (default: 7)
        importance_threshold: Option<Value>,
    ) -> McpResult<String> {
        info!("=== START get_important_missed_emails MCP command ===");
        let days_back = parse_max_results(days_back, 7);
        let threshold = parse_max_results(importance_threshold, 7);
        let result: ApiResult<Value> = async {
            let client = self.sessions.gmail().await?;
            tools::gmail::get_important_missed_emails(&client, days_back, threshold).await
        }
        .await;
        Ok(respond("get_important_missed_emails", result))
    }

    /// Summarize emails from the last N days grouped by sender.
    #[tool]
    async fn get_email_summary_by_sender(
        &self,
        /// Days to look back (default: 30)
        days_back: Option<Value>,
    ) -> McpResult<String> {
        info!("=== START get_email_summary_by_sender MCP command ===");
        let days_back = parse_max_results(days_back, 30);
        let result: ApiResult<Value> = async {
            let client = self.sessions.gmail().await?;
            tools::gmail::get_email_summary_by_sender(&client, days_back).await
        }
        .await;
        Ok(respond("get_email_summary_by_sender", result))
    }

    /// Search emails using Gmail search syntax, newest first.
    #[tool]
    async fn search_emails(
        &self,
        /// Gmail search query (e.g. "from:alice@example.com is:unread")
        query: String,
        /// Maximum number of results (default: 20). Number or string.
        max_results: Option<Value>,
    ) -> McpResult<String> {
        info!("=== START search_emails MCP command ===");
        let max = parse_max_results(max_results, 20);
        let result: ApiResult<Value> = async {
            let client = self.sessions.gmail().await?;
            tools::gmail::search_emails(&client, &query, max).await
        }
        .await;
        Ok(respond("search_emails", result))
    }

    /// Weekly email overview: totals, daily breakdown and top unread important mail.
    #[tool]
    async fn get_weekly_email_insights(&self) -> McpResult<String> {
        info!("=== START get_weekly_email_insights MCP command ===");
        let result: ApiResult<Value> = async {
            let client = self.sessions.gmail().await?;
            tools::gmail::get_weekly_email_insights(&client).await
        }
        .await;
        Ok(respond("get_weekly_email_insights", result))
    }

    /// List the user's calendars.
    #[tool]
    async fn list_calendars(&self) -> McpResult<String> {
        info!("=== START list_calendars MCP command ===");
        let result: ApiResult<Value> = async {
            let client = self.sessions.calendar().await?;
            tools::calendar::list_calendars(&client).await
        }
        .await;
        Ok(respond("list_calendars", result))
    }

    /// Get upcoming events from a calendar.
    #[tool]
    async fn get_upcoming_events(
        &self,
        /// Calendar ID (default: "primary")
        calendar_id: Option<String>,
        /// Days ahead to include (default: 7)
        days_ahead: Option<Value>,
        /// Maximum number of events (default: 20)
        max_results: Option<Value>,
    ) -> McpResult<String> {
        info!("=== START get_upcoming_events MCP command ===");
        let calendar_id = calendar_id.unwrap_or_else(|| "primary".to_string());
        let days_ahead = parse_max_results(days_ahead, 7);
        let max = parse_max_results(max_results, 20);
        let result: ApiResult<Value> = async {
            let client = self.sessions.calendar().await?;
            tools::calendar::get_upcoming_events(&client, &calendar_id, days_ahead, max).await
        }
        .await;
        Ok(respond("get_upcoming_events", result))
    }

    /// Create a calendar event and send invitations to attendees.
    #[tool]
    async fn create_calendar_event(
        &self,
        /// Calendar to create the event in ("primary" for the main calendar)
        calendar_id: String,
        /// Event title
        title: String,
        /// Event description
        description: String,
        /// Start time in ISO format (e.g. "2024-01-15T14:00:00"); no offset means UTC
        start_datetime: String,
        /// End time in ISO format (e.g. "2024-01-15T15:00:00"); no offset means UTC
        end_datetime: String,
        /// Email addresses to invite
        attendees: Option<Vec<String>>,
        /// Event location
        location: Option<String>,
    ) -> McpResult<String> {
        info!("=== START create_calendar_event MCP command ===");
        let result: ApiResult<Value> = async {
            let client = self.sessions.calendar().await?;
            tools::calendar::create_calendar_event(
                &client,
                &calendar_id,
                &title,
                &description,
                &start_datetime,
                &end_datetime,
                attendees.unwrap_or_default(),
                location.as_deref().unwrap_or(""),
            )
            .await
        }
        .await;
        Ok(respond("create_calendar_event", result))
    }

    /// Update fields of an existing calendar event. Omitted fields are left unchanged.
    #[tool]
    async fn update_calendar_event(
        &self,
        /// Calendar containing the event
        calendar_id: String,
        /// Event ID
        event_id: String,
        /// New title
        title: Option<String>,
        /// New description
        description: Option<String>,
        /// New start time in ISO format
        start_datetime: Option<String>,
        /// New end time in ISO format
        end_datetime: Option<String>,
        /// Replacement attendee list
        attendees: Option<Vec<String>>,
        /// New location
        location: Option<String>,
    ) -> McpResult<String> {
        info!("=== START update_calendar_event MCP command ===");
        let patch = EventPatch {
            summary: title,
            description,
            attendees,
            location,
            ..EventPatch::default()
        };
        let result: ApiResult<Value> = async {
            let client = self.sessions.calendar().await?;
            tools::calendar::update_calendar_event(
                &client,
                &calendar_id,
                &event_id,
                patch,
                start_datetime.as_deref(),
                end_datetime.as_deref(),
            )
            .await
        }
        .await;
        Ok(respond("update_calendar_event", result))
    }

    /// Delete a calendar event and notify attendees.
    #[tool]
    async fn delete_calendar_event(
        &self,
        /// Calendar containing the event
        calendar_id: String,
        /// Event ID
        event_id: String,
    ) -> McpResult<String> {
        info!("=== START delete_calendar_event MCP command ===");
        let result: ApiResult<Value> = async {
            let client = self.sessions.calendar().await?;
            tools::calendar::delete_calendar_event(&client, &calendar_id, &event_id).await
        }
        .await;
        Ok(respond("delete_calendar_event", result))
    }

    /// Search calendar events by title, description or location.
    #[tool]
    async fn search_calendar_events(
        &self,
        /// Calendar ID (default: "primary")
        calendar_id: Option<String>,
        /// Text to look for (default: matches everything)
        query: Option<String>,
        /// Days back to search (default: 30)
        days_back: Option<Value>,
        /// Days ahead to search (default: 30)
        days_ahead: Option<Value>,
    ) -> McpResult<String> {
        info!("=== START search_calendar_events MCP command ===");
        let calendar_id = calendar_id.unwrap_or_else(|| "primary".to_string());
        let query = query.unwrap_or_default();
        let days_back = parse_max_results(days_back, 30);
        let days_ahead = parse_max_results(days_ahead, 30);
        let result: ApiResult<Value> = async {
            let client = self.sessions.calendar().await?;
            tools::calendar::search_calendar_events(
                &client,
                &calendar_id,
                &query,
                days_back,
                days_ahead,
            )
            .await
        }
        .await;
        Ok(respond("search_calendar_events", result))
    }

    /// Check free/busy status of several calendars over a time period.
    #[tool]
    async fn check_availability(
        &self,
        /// Calendar IDs to check
        calendar_ids: Vec<String>,
        /// Period start in ISO format
        start_datetime: String,
        /// Period end in ISO format
        end_datetime: String,
    ) -> McpResult<String> {
        info!("=== START check_availability MCP command ===");
        let result: ApiResult<Value> = async {
            let client = self.sessions.calendar().await?;
            tools::calendar::check_availability(
                &client,
                &calendar_ids,
                &start_datetime,
                &end_datetime,
            )
            .await
        }
        .await;
        Ok(respond("check_availability", result))
    }

    /// Today's agenda, ordered by start time.
    #[tool]
    async fn get_today_agenda(
        &self,
        /// Calendar ID (default: "primary")
        calendar_id: Option<String>,
    ) -> McpResult<String> {
        info!("=== START get_today_agenda MCP command ===");
        let calendar_id = calendar_id.unwrap_or_else(|| "primary".to_string());
        let result: ApiResult<Value> = async {
            let client = self.sessions.calendar().await?;
            tools::calendar::get_today_agenda(&client, &calendar_id).await
        }
        .await;
        Ok(respond("get_today_agenda", result))
    }

    /// Summary of the coming seven days: per-day events, scheduled hours and busiest day.
    #[tool]
    async fn get_weekly_calendar_summary(
        &self,
        /// Calendar ID (default: "primary")
        calendar_id: Option<String>,
    ) -> McpResult<String> {
        info!("=== START get_weekly_calendar_summary MCP command ===");
        let calendar_id = calendar_id.unwrap_or_else(|| "primary".to_string());
        let result: ApiResult<Value> = async {
            let client = self.sessions.calendar().await?;
            tools::calendar::get_weekly_calendar_summary(&client, &calendar_id).await
        }
        .await;
        Ok(respond("get_weekly_calendar_summary", result))
    }

    /// List non-trashed Drive files, optionally filtered by a Drive query.
    #[tool]
    async fn list_drive_files(
        &self,
        /// Drive query (e.g. "name contains 'report'")
        query: Option<String>,
        /// Maximum number of files (default: 100)
        page_size: Option<Value>,
    ) -> McpResult<String> {
        info!("=== START list_drive_files MCP command ===");
        let page_size = parse_max_results(page_size, 100);
        let result: ApiResult<Value> = async {
            let client = self.sessions.drive().await?;
            tools::drive::list_drive_files(&client, query.as_deref(), page_size).await
        }
        .await;
        Ok(respond("list_drive_files", result))
    }

    /// Search Drive files by name.
    #[tool]
    async fn search_drive_files(
        &self,
        /// Text the file name must contain
        query: String,
        /// Maximum number of files (default: 100)
        page_size: Option<Value>,
    ) -> McpResult<String> {
        info!("=== START search_drive_files MCP command ===");
        let page_size = parse_max_results(page_size, 100);
        let result: ApiResult<Value> = async {
            let client = self.sessions.drive().await?;
            tools::drive::search_drive_files(&client, &query, page_size).await
        }
        .await;
        Ok(respond("search_drive_files", result))
    }

    /// Detailed metadata for one Drive file, including its editors.
    #[tool]
    async fn get_drive_file_metadata(
        &self,
        /// Drive file ID
        file_id: String,
    ) -> McpResult<String> {
        info!("=== START get_drive_file_metadata MCP command ===");
        let result: ApiResult<Value> = async {
            let client = self.sessions.drive().await?;
            tools::drive::get_drive_file_metadata(&client, &file_id).await
        }
        .await;
        Ok(respond("get_drive_file_metadata", result))
    }

    /// List files shared with the user.
    #[tool]
    async fn list_shared_drive_files(
        &self,
        /// Maximum number of files (default: 100)
        page_size: Option<Value>,
    ) -> McpResult<String> {
        info!("=== START list_shared_drive_files MCP command ===");
        let page_size = parse_max_results(page_size, 100);
        let result: ApiResult<Value> = async {
            let client = self.sessions.drive().await?;
            tools::drive::list_shared_drive_files(&client, page_size).await
        }
        .await;
        Ok(respond("list_shared_drive_files", result))
    }

    /// Creation and revision history of a Drive file, newest first.
    #[tool]
    async fn get_drive_file_activity(
        &self,
        /// Drive file ID
        file_id: String,
        /// Maximum number of activities (default: 100)
        max_results: Option<Value>,
    ) -> McpResult<String> {
        info!("=== START get_drive_file_activity MCP command ===");
        let max = parse_max_results(max_results, 100);
        let result: ApiResult<Value> = async {
            let client = self.sessions.drive().await?;
            tools::drive::get_drive_file_activity(&client, &file_id, max).await
        }
        .await;
        Ok(respond("get_drive_file_activity", result))
    }

    /// Recently modified files across the Drive.
    #[tool]
    async fn get_recent_drive_activity(
        &self,
        /// Maximum number of activities (default: 100)
        max_results: Option<Value>,
    ) -> McpResult<String> {
        info!("=== START get_recent_drive_activity MCP command ===");
        let max = parse_max_results(max_results, 100);
        let result: ApiResult<Value> = async {
            let client = self.sessions.drive().await?;
            tools::drive::get_recent_drive_activity(&client, max).await
        }
        .await;
        Ok(respond("get_recent_drive_activity", result))
    }

    /// Download a Drive file to a local path.
    #[tool]
    async fn download_drive_file(
        &self,
        /// Drive file ID
        file_id: String,
        /// Local path to write the content to
        output_path: String,
    ) -> McpResult<String> {
        info!("=== START download_drive_file MCP command ===");
        let result: ApiResult<Value> = async {
            let client = self.sessions.drive().await?;
            tools::drive::download_drive_file(&client, &file_id, &output_path).await
        }
        .await;
        Ok(respond("download_drive_file", result))
    }

    /// List pages in the Notion workspace.
    #[tool]
    async fn list_notion_pages(
        &self,
        /// Only include pages whose parent is the workspace (default: false)
        top_level_only: Option<bool>,
        /// Maximum number of pages (default: 100)
        page_size: Option<Value>,
    ) -> McpResult<String> {
        info!("=== START list_notion_pages MCP command ===");
        let page_size = parse_max_results(page_size, 100);
        let result: ApiResult<Value> = async {
            let client = self.sessions.notion().await?;
            tools::notion::list_notion_pages(&client, top_level_only.unwrap_or(false), page_size)
                .await
        }
        .await;
        Ok(respond("list_notion_pages", result))
    }

    /// Find a Notion page by exact title (case-insensitive).
    #[tool]
    async fn find_notion_page(
        &self,
        /// Page title
        title: String,
    ) -> McpResult<String> {
        info!("=== START find_notion_page MCP command ===");
        let result: ApiResult<Value> = async {
            let client = self.sessions.notion().await?;
            tools::notion::find_notion_page(&client, &title).await
        }
        .await;
        Ok(respond("find_notion_page", result))
    }

    /// Create a Notion page, optionally under a parent page found by title.
    #[tool]
    async fn create_notion_page(
        &self,
        /// Page title (default: "New Page")
        title: Option<String>,
        /// Title of the parent page; unknown parents create the page at workspace level
        parent_page_title: Option<String>,
        /// Body text; blank lines separate paragraphs
        body_content: Option<String>,
    ) -> McpResult<String> {
        info!("=== START create_notion_page MCP command ===");
        let result: ApiResult<Value> = async {
            let client = self.sessions.notion().await?;
            tools::notion::create_notion_page(
                &client,
                title.as_deref(),
                parent_page_title.as_deref(),
                body_content.as_deref(),
            )
            .await
        }
        .await;
        Ok(respond("create_notion_page", result))
    }
}
