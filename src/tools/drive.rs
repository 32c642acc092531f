use crate::drive_api::DriveClient;
use crate::errors::ApiResult;
use crate::utils::soft_failure;
use serde_json::{json, Value};
use std::path::Path;

pub async fn list_drive_files(
    client: &DriveClient,
    query: Option<&str>,
    page_size: u32,
) -> ApiResult<Value> {
    match client.list_files(query, page_size).await {
        Ok(files) => Ok(json!({
            "success": true,
            "total_files": files.len(),
            "files": files,
        })),
        Err(e) => soft_failure(e),
    }
}

pub async fn search_drive_files(
    client: &DriveClient,
    query: &str,
    page_size: u32,
) -> ApiResult<Value> {
    match client.search_files(query, page_size).await {
        Ok(files) => Ok(json!({
            "success": true,
            "query": query,
            "total_files": files.len(),
            "files": files,
        })),
        Err(e) => soft_failure(e),
    }
}

pub async fn get_drive_file_metadata(client: &DriveClient, file_id: &str) -> ApiResult<Value> {
    match client.get_file_metadata(file_id).await {
        Ok(file) => Ok(json!({ "success": true, "file": file })),
        Err(e) => soft_failure(e),
    }
}

pub async fn list_shared_drive_files(client: &DriveClient, page_size: u32) -> ApiResult<Value> {
    match client.list_shared_files(page_size).await {
        Ok(files) => Ok(json!({
            "success": true,
            "total_files": files.len(),
            "files": files,
        })),
        Err(e) => soft_failure(e),
    }
}

pub async fn get_drive_file_activity(
    client: &DriveClient,
    file_id: &str,
    max_results: u32,
) -> ApiResult<Value> {
    match client.get_file_activity(file_id, max_results as usize).await {
        Ok((file, total, activities)) => Ok(json!({
            "success": true,
            "file": file,
            "total_activities": total,
            "activities": activities,
        })),
        Err(e) => soft_failure(e),
    }
}

pub async fn get_recent_drive_activity(client: &DriveClient, max_results: u32) -> ApiResult<Value> {
    match client.get_recent_activity(max_results).await {
        Ok(activities) => Ok(json!({
            "success": true,
            "total_activities": activities.len(),
            "activities": activities,
        })),
        Err(e) => soft_failure(e),
    }
}

pub async fn download_drive_file(
    client: &DriveClient,
    file_id: &str,
    output_path: &str,
) -> ApiResult<Value> {
    match client.download_file(file_id, Path::new(output_path)).await {
        Ok(file) => Ok(json!({
            "success": true,
            "file": {
                "id": file.id,
                "name": file.name,
                "type": file.mime_type,
                "size": file.size,
                "saved_to": output_path,
                "last_modified_by": file.last_modified_by,
                "editors": file.editors,
            },
        })),
        Err(e) => soft_failure(e),
    }
}
