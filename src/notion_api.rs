use crate::errors::ApiResult;
use crate::models::NotionPage;
use crate::session::Session;
use crate::utils::read_json;
use log::{debug, info, warn};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;

// Notion rejects larger search pages
const MAX_PAGE_SIZE: u32 = 100;

pub struct NotionClient {
    session: Arc<Session>,
    base_url: String,
}

impl NotionClient {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            base_url: crate::config::NOTION_API_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post(&self, path: &str, body: &Value) -> ApiResult<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .session
            .request(Method::POST, &url)
            .await?
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    /// Raw page objects from the search endpoint.
    pub async fn search_pages(&self, text: Option<&str>, page_size: u32) -> ApiResult<Vec<Value>> {
        let mut body = json!({
            "filter": { "value": "page", "property": "object" },
            "page_size": page_size.clamp(1, MAX_PAGE_SIZE),
        });
        if let Some(text) = text {
            body["query"] = json!(text);
        }
        let result = self.post("search", &body).await?;
        Ok(result
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    pub async fn list_pages(
        &self,
        top_level_only: bool,
        page_size: u32,
    ) -> ApiResult<Vec<NotionPage>> {
        let pages = self.search_pages(None, page_size).await?;
        debug!("Notion search returned {} pages", pages.len());
        Ok(pages
            .iter()
            .map(normalize_page)
            .filter(|p| !top_level_only || p.parent_type == "workspace")
            .collect())
    }

    /// Id of the first page whose title equals `title`, ignoring case.
    pub async fn find_page_by_title(&self, title: &str) -> ApiResult<Option<String>> {
        let wanted = title.to_lowercase();
        let pages = self.search_pages(Some(title), MAX_PAGE_SIZE).await?;
        Ok(pages
            .iter()
            .find(|p| extract_title(p).to_lowercase() == wanted)
            .and_then(|p| p.get("id").and_then(Value::as_str))
            .map(str::to_string))
    }

    /// Create a page under `parent_title`, or at workspace level when that
    /// page cannot be found.
    pub async fn create_page(
        &self,
        title: Option<&str>,
        parent_title: Option<&str>,
        body_content: Option<&str>,
    ) -> ApiResult<Value> {
        let title = title.filter(|t| !t.is_empty()).unwrap_or("New Page");

        let parent_id = match parent_title {
            Some(parent_title) => match self.find_page_by_title(parent_title).await {
                Ok(id) => id,
                Err(e) => {
                    warn!("Parent lookup for '{}' failed: {}", parent_title, e);
                    None
                }
            },
            None => None,
        };
        let parent = match &parent_id {
            Some(id) => json!({ "type": "page_id", "page_id": id }),
            None => json!({ "type": "workspace", "workspace": true }),
        };

        let mut body = json!({
            "parent": parent,
            "properties": {
                "title": {
                    "title": [{ "type": "text", "text": { "content": title } }]
                }
            },
        });
        let children = paragraph_blocks(body_content.unwrap_or(""));
        if !children.is_empty() {
            body["children"] = Value::Array(children);
        }

        let page = self.post("pages", &body).await?;
        info!("Created Notion page '{}'", title);

        Ok(json!({
            "success": true,
            "page_id": page.get("id"),
            "title": title,
            "url": page.get("url"),
            "parent_found": parent_title.is_none() || parent_id.is_some(),
            "parent_type": if parent_id.is_some() { "page" } else { "workspace" },
            "created_time": page.get("created_time"),
        }))
    }
}

/// Plain text of the page's title property, or "Untitled".
pub fn extract_title(page: &Value) -> String {
    page.get("properties")
        .and_then(Value::as_object)
        .and_then(|properties| {
            properties.values().find_map(|prop| {
                if prop.get("type").and_then(Value::as_str) != Some("title") {
                    return None;
                }
                let text: String = prop
                    .get("title")
                    .and_then(Value::as_array)?
                    .iter()
                    .filter_map(|t| t.get("plain_text").and_then(Value::as_str))
                    .collect();
                Some(text).filter(|t| !t.is_empty())
            })
        })
        .unwrap_or_else(|| "Untitled".to_string())
}

fn user_name(page: &Value, key: &str) -> String {
    page.get(key)
        .and_then(|u| u.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string()
}

pub fn normalize_page(page: &Value) -> NotionPage {
    let string = |key: &str| page.get(key).and_then(Value::as_str).map(str::to_string);
    NotionPage {
        id: string("id"),
        title: extract_title(page),
        url: string("url"),
        created_time: string("created_time"),
        last_edited_time: string("last_edited_time"),
        created_by: user_name(page, "created_by"),
        last_edited_by: user_name(page, "last_edited_by"),
        archived: page.get("archived").and_then(Value::as_bool).unwrap_or(false),
        parent_type: page
            .get("parent")
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
    }
}

/// One paragraph block per blank-line separated chunk of `content`.
pub fn paragraph_blocks(content: &str) -> Vec<Value> {
    content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            json!({
                "object": "block",
                "type": "paragraph",
                "paragraph": {
                    "rich_text": [{ "type": "text", "text": { "content": p } }]
                }
            })
        })
        .collect()
}
