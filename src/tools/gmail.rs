use super::as_score;
use crate::errors::ApiResult;
use crate::gmail_api::GmailClient;
use crate::models::EmailInsight;
use crate::views;
use chrono::Utc;
use serde_json::{json, Value};

const MISSED_SCAN_LIMIT: u32 = 50;
const WINDOW_SCAN_LIMIT: u32 = 100;

fn email_entry(insight: &EmailInsight) -> Value {
    json!({
        "subject": insight.subject,
        "sender": insight.sender,
        "date": insight.date,
        "snippet": insight.snippet,
        "importance_score": insight.importance_score,
    })
}

pub async fn get_unread_emails(client: &GmailClient, max_results: u32) -> ApiResult<Value> {
    let insights = client.fetch_insights("is:unread", max_results).await?;
    let ranked = views::rank_by_importance(insights);
    Ok(json!({
        "total_unread": ranked.len(),
        "emails": ranked.iter().map(email_entry).collect::<Vec<_>>(),
    }))
}

pub async fn get_important_missed_emails(
    client: &GmailClient,
    days_back: u32,
    importance_threshold: u32,
) -> ApiResult<Value> {
    let query = format!("is:unread newer_than:{}d", days_back);
    let insights = client.fetch_insights(&query, MISSED_SCAN_LIMIT).await?;
    let missed = views::important_missed(
        insights,
        as_score(importance_threshold),
        Utc::now().naive_utc(),
    );

    let emails: Vec<Value> = missed
        .iter()
        .map(|(insight, days_ago)| {
            let mut entry = email_entry(insight);
            entry["days_ago"] = json!(days_ago);
            entry
        })
        .collect();
    Ok(json!({
        "query_period": format!("Last {} days", days_back),
        "importance_threshold": importance_threshold,
        "count": emails.len(),
        "emails": emails,
    }))
}

pub async fn get_email_summary_by_sender(client: &GmailClient, days_back: u32) -> ApiResult<Value> {
    let query = format!("newer_than:{}d", days_back);
    let insights = client.fetch_insights(&query, WINDOW_SCAN_LIMIT).await?;
    let senders = views::summarize_by_sender(&insights);
    Ok(json!({
        "period": format!("Last {} days", days_back),
        "total_senders": senders.len(),
        "senders": senders,
    }))
}

pub async fn search_emails(
    client: &GmailClient,
    query: &str,
    max_results: u32,
) -> ApiResult<Value> {
    let insights = client.fetch_insights(query, max_results).await?;
    let emails: Vec<Value> = views::sort_by_date_desc(insights)
        .iter()
        .map(|insight| {
            let mut entry = email_entry(insight);
            entry["is_unread"] = json!(insight.is_unread);
            entry
        })
        .collect();
    Ok(json!({
        "query": query,
        "count": emails.len(),
        "emails": emails,
    }))
}

pub async fn get_weekly_email_insights(client: &GmailClient) -> ApiResult<Value> {
    let insights = client.fetch_insights("newer_than:7d", WINDOW_SCAN_LIMIT).await?;
    let weekly = views::weekly_email_insights(&insights);
    let mut report = serde_json::to_value(weekly)
        .map_err(|e| crate::errors::ApiError::ParseError(e.to_string()))?;
    report["period"] = json!("Last 7 days");
    Ok(report)
}
