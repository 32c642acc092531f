use crate::errors::ApiResult;
use crate::models::{DriveActivity, DriveFile, DriveFileRef};
use crate::session::Session;
use crate::utils::read_json;
use crate::views::activity_timeline;
use log::{debug, info, warn};
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

const FILE_LIST_FIELDS: &str = concat!(
    "nextPageToken, files(id, name, mimeType, size, createdTime, modifiedTime, ",
    "owners, shared, webViewLink, lastModifyingUser)"
);
const FILE_DETAIL_FIELDS: &str = concat!(
    "id, name, mimeType, size, createdTime, modifiedTime, owners, shared, ",
    "webViewLink, description, capabilities, lastModifyingUser"
);
const RECENT_FIELDS: &str =
    "nextPageToken, files(id, name, mimeType, modifiedTime, lastModifyingUser)";
const REVISION_FIELDS: &str = "revisions(id, modifiedTime, lastModifyingUser)";

pub struct DriveClient {
    session: Arc<Session>,
    base_url: String,
}

impl DriveClient {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            base_url: crate::config::DRIVE_API_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> ApiResult<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .session
            .request(Method::GET, &url)
            .await?
            .query(query)
            .send()
            .await?;
        read_json(response).await
    }

    async fn file(&self, file_id: &str, fields: &str) -> ApiResult<Value> {
        let path = format!("files/{}", urlencoding::encode(file_id));
        self.get_json(&path, &[("fields", fields)]).await
    }

    async fn revisions(&self, file_id: &str) -> ApiResult<Vec<Value>> {
        let path = format!("files/{}/revisions", urlencoding::encode(file_id));
        let listing = self.get_json(&path, &[("fields", REVISION_FIELDS)]).await?;
        Ok(array(&listing, "revisions").to_vec())
    }

    /// Everyone who owns or has modified the file. Empty if the lookup fails.
    pub async fn file_editors(&self, file_id: &str) -> Vec<String> {
        let lookup = async {
            let file = self.file(file_id, "owners, lastModifyingUser").await?;
            let revisions = self.revisions(file_id).await?;
            Ok::<_, crate::errors::ApiError>(collect_editors(&file, &revisions))
        };
        match lookup.await {
            Ok(editors) => editors,
            Err(e) => {
                debug!("Editor lookup for {} failed: {}", file_id, e);
                Vec::new()
            }
        }
    }

    async fn list(
        &self,
        conditions: &[String],
        page_size: u32,
        fields: &str,
        order_by: Option<&str>,
    ) -> ApiResult<Vec<Value>> {
        let q = conditions.join(" and ");
        let page_size = page_size.to_string();
        let mut query = vec![("pageSize", page_size.as_str()), ("fields", fields)];
        if !q.is_empty() {
            query.push(("q", q.as_str()));
        }
        if let Some(order_by) = order_by {
            query.push(("orderBy", order_by));
        }
        debug!("Listing Drive files with q='{}'", q);
        let listing = self.get_json("files", &query).await?;
        Ok(array(&listing, "files").to_vec())
    }

    async fn annotate(&self, files: Vec<Value>) -> Vec<DriveFile> {
        let mut annotated = Vec::with_capacity(files.len());
        for raw in files {
            let editors = match raw.get("id").and_then(Value::as_str) {
                Some(id) => self.file_editors(id).await,
                None => Vec::new(),
            };
            annotated.push(normalize_file(&raw, editors));
        }
        annotated
    }

    /// Non-trashed files, optionally narrowed by a raw Drive query.
    pub async fn list_files(
        &self,
        query: Option<&str>,
        page_size: u32,
    ) -> ApiResult<Vec<DriveFile>> {
        let mut conditions = Vec::new();
        if let Some(q) = query.filter(|q| !q.trim().is_empty()) {
            conditions.push(q.to_string());
        }
        conditions.push("trashed = false".to_string());
        let files = self.list(&conditions, page_size, FILE_LIST_FIELDS, None).await?;
        Ok(self.annotate(files).await)
    }

    /// Non-trashed files whose name contains `text`.
    pub async fn search_files(&self, text: &str, page_size: u32) -> ApiResult<Vec<DriveFile>> {
        let conditions = vec![
            format!("name contains '{}'", escape_query_literal(text)),
            "trashed = false".to_string(),
        ];
        let files = self.list(&conditions, page_size, FILE_LIST_FIELDS, None).await?;
        Ok(self.annotate(files).await)
    }

    pub async fn list_shared_files(&self, page_size: u32) -> ApiResult<Vec<DriveFile>> {
        let conditions = vec![
            "sharedWithMe = true".to_string(),
            "trashed = false".to_string(),
        ];
        let files = self.list(&conditions, page_size, FILE_LIST_FIELDS, None).await?;
        Ok(self.annotate(files).await)
    }

    pub async fn get_file_metadata(&self, file_id: &str) -> ApiResult<DriveFile> {
        let raw = self.file(file_id, FILE_DETAIL_FIELDS).await?;
        let editors = self.file_editors(file_id).await;
        Ok(normalize_file(&raw, editors))
    }

    /// Creation plus one entry per revision, newest first. Returns the file,
    /// the total activity count and the truncated timeline.
    pub async fn get_file_activity(
        &self,
        file_id: &str,
        max_results: usize,
    ) -> ApiResult<(DriveFile, usize, Vec<DriveActivity>)> {
        let raw = self
            .file(
                file_id,
                "id, name, createdTime, modifiedTime, owners, lastModifyingUser",
            )
            .await?;
        let revisions = self.revisions(file_id).await?;

        let mut activities = vec![DriveActivity {
            kind: "created".to_string(),
            time: string_field(&raw, "createdTime"),
            user: array(&raw, "owners").first().and_then(|o| string_field(o, "emailAddress")),
            details: "File created".to_string(),
            file: None,
        }];
        activities.extend(revisions.iter().map(|revision| DriveActivity {
            kind: "modified".to_string(),
            time: string_field(revision, "modifiedTime"),
            user: revision
                .get("lastModifyingUser")
                .and_then(|u| string_field(u, "emailAddress")),
            details: format!(
                "File modified (revision {})",
                revision.get("id").and_then(Value::as_str).unwrap_or("unknown")
            ),
            file: None,
        }));

        let editors = collect_editors(&raw, &revisions);
        let (total, timeline) = activity_timeline(activities, max_results);
        Ok((normalize_file(&raw, editors), total, timeline))
    }

    /// Most recently modified non-trashed files as activity entries.
    pub async fn get_recent_activity(&self, max_results: u32) -> ApiResult<Vec<DriveActivity>> {
        let conditions = vec!["trashed = false".to_string()];
        let files = self
            .list(&conditions, max_results, RECENT_FIELDS, Some("modifiedTime desc"))
            .await?;
        let mut activities = Vec::with_capacity(files.len());
        for raw in files {
            let editors = match raw.get("id").and_then(Value::as_str) {
                Some(id) => self.file_editors(id).await,
                None => Vec::new(),
            };
            activities.push(DriveActivity {
                kind: "modified".to_string(),
                time: string_field(&raw, "modifiedTime"),
                user: raw
                    .get("lastModifyingUser")
                    .and_then(|u| string_field(u, "emailAddress")),
                details: "File modified".to_string(),
                file: Some(DriveFileRef {
                    id: string_field(&raw, "id"),
                    name: string_field(&raw, "name"),
                    mime_type: string_field(&raw, "mimeType"),
                    editors,
                }),
            });
        }
        Ok(activities)
    }

    /// Download file content to `output_path`.
    pub async fn download_file(&self, file_id: &str, output_path: &Path) -> ApiResult<DriveFile> {
        let raw = self
            .file(file_id, "id, name, mimeType, size, lastModifyingUser")
            .await?;
        let editors = self.file_editors(file_id).await;

        let url = format!("{}/files/{}", self.base_url, urlencoding::encode(file_id));
        let response = self
            .session
            .request(Method::GET, &url)
            .await?
            .query(&[("alt", "media")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("Download of {} failed with {}", file_id, status);
            return Err(crate::errors::ApiError::HttpError {
                status: status.as_u16(),
                message,
            });
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(output_path, &bytes).await?;
        info!(
            "Downloaded {} ({} bytes) to {}",
            file_id,
            bytes.len(),
            output_path.display()
        );

        Ok(normalize_file(&raw, editors))
    }
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Escape a literal for a Drive `q` string.
pub fn escape_query_literal(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Owners, last modifier and revision authors, deduplicated and sorted.
pub fn collect_editors(file: &Value, revisions: &[Value]) -> Vec<String> {
    let mut editors = BTreeSet::new();
    for owner in array(file, "owners") {
        if let Some(email) = string_field(owner, "emailAddress") {
            editors.insert(email);
        }
    }
    if let Some(email) = file
        .get("lastModifyingUser")
        .and_then(|u| string_field(u, "emailAddress"))
    {
        editors.insert(email);
    }
    for revision in revisions {
        if let Some(email) = revision
            .get("lastModifyingUser")
            .and_then(|u| string_field(u, "emailAddress"))
        {
            editors.insert(email);
        }
    }
    editors.into_iter().collect()
}

pub fn normalize_file(raw: &Value, editors: Vec<String>) -> DriveFile {
    DriveFile {
        id: string_field(raw, "id"),
        name: string_field(raw, "name"),
        mime_type: string_field(raw, "mimeType"),
        size: string_field(raw, "size"),
        created_time: string_field(raw, "createdTime"),
        modified_time: string_field(raw, "modifiedTime"),
        owners: array(raw, "owners")
            .iter()
            .filter_map(|o| string_field(o, "emailAddress"))
            .collect(),
        shared: raw.get("shared").and_then(Value::as_bool).unwrap_or(false),
        url: string_field(raw, "webViewLink"),
        last_modified_by: raw
            .get("lastModifyingUser")
            .and_then(|u| string_field(u, "emailAddress")),
        description: string_field(raw, "description"),
        capabilities: raw.get("capabilities").cloned(),
        editors,
    }
}
