use crate::errors::ApiResult;
use crate::notion_api::NotionClient;
use crate::utils::soft_failure;
use serde_json::{json, Value};

pub async fn list_notion_pages(
    client: &NotionClient,
    top_level_only: bool,
    page_size: u32,
) -> ApiResult<Value> {
    match client.list_pages(top_level_only, page_size).await {
        Ok(pages) => Ok(json!({
            "success": true,
            "total_pages": pages.len(),
            "pages": pages,
        })),
        Err(e) => soft_failure(e),
    }
}

pub async fn find_notion_page(client: &NotionClient, title: &str) -> ApiResult<Value> {
    match client.find_page_by_title(title).await {
        Ok(page_id) => Ok(json!({
            "success": true,
            "title": title,
            "found": page_id.is_some(),
            "page_id": page_id,
        })),
        Err(e) => soft_failure(e),
    }
}

pub async fn create_notion_page(
    client: &NotionClient,
    title: Option<&str>,
    parent_page_title: Option<&str>,
    body_content: Option<&str>,
) -> ApiResult<Value> {
    client
        .create_page(title, parent_page_title, body_content)
        .await
        .or_else(soft_failure)
}
