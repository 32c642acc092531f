use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mcp_productivity::gmail_api::parse_message;
use mcp_productivity::models::EmailInsight;
use mcp_productivity::views::{importance_score, summarize_by_sender, weekly_email_insights};
use serde_json::json;

fn sample_insights(n: usize) -> Vec<EmailInsight> {
    let base = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap();
    (0..n)
        .map(|i| EmailInsight {
            subject: format!("Status update {}", i),
            sender: format!("sender{}@example.com", i % 12),
            date: base + chrono::Duration::hours(i as i64),
            snippet: String::new(),
            importance_score: (i % 10 + 1) as u8,
            labels: vec!["UNREAD".to_string()],
            is_unread: i % 3 != 0,
        })
        .collect()
}

fn scoring_benchmarks(c: &mut Criterion) {
    let labels = vec!["IMPORTANT".to_string(), "CATEGORY_PERSONAL".to_string()];
    c.bench_function("importance_score", |b| {
        b.iter(|| {
            importance_score(
                black_box("Re: invoice for the quarterly security review"),
                black_box("Finance <finance@company.com>"),
                black_box(&labels),
            )
        })
    });

    let message = json!({
        "id": "m1",
        "snippet": "Please review before Friday",
        "labelIds": ["UNREAD", "IMPORTANT"],
        "payload": { "headers": [
            { "name": "Subject", "value": "Deadline moved" },
            { "name": "From", "value": "pm@company.com" },
            { "name": "Date", "value": "Mon, 15 Jan 2024 10:30:00 +0000 (UTC)" }
        ]}
    });
    c.bench_function("parse_message", |b| b.iter(|| parse_message(black_box(&message))));
}

fn view_benchmarks(c: &mut Criterion) {
    let insights = sample_insights(100);
    c.bench_function("summarize_by_sender_100", |b| {
        b.iter(|| summarize_by_sender(black_box(&insights)))
    });
    c.bench_function("weekly_email_insights_100", |b| {
        b.iter(|| weekly_email_insights(black_box(&insights)))
    });
}

criterion_group!(benches, scoring_benchmarks, view_benchmarks);
criterion_main!(benches);
