//! Derived views over normalized records.
//!
//! Everything here is pure: no I/O, no clock reads except through arguments.

use crate::models::{BusyPeriod, CalendarAvailability, CalendarEvent, DriveActivity, EmailInsight};
use crate::utils::round1;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

pub const IMPORTANT_KEYWORDS: [&str; 12] = [
    "urgent", "asap", "important", "critical", "deadline", "meeting", "interview", "offer",
    "invoice", "payment", "security", "alert",
];

pub const PRIORITY_SENDER_DOMAINS: [&str; 2] = ["@company.com", "@important-client.com"];

/// Score at or above which a message counts as high importance in the
/// weekly insights.
pub const HIGH_IMPORTANCE: u8 = 8;
const TOP_UNREAD_THRESHOLD: u8 = 7;
const TOP_UNREAD_LIMIT: usize = 5;
const SAMPLE_SUBJECTS: usize = 3;

/// Heuristic 1..=10 importance of a message.
pub fn importance_score(subject: &str, sender: &str, labels: &[String]) -> u8 {
    let has = |label: &str| labels.iter().any(|l| l == label);
    let mut score: i32 = 5;

    let subject = subject.to_lowercase();
    if IMPORTANT_KEYWORDS.iter().any(|k| subject.contains(k)) {
        score += 2;
    }

    if has("IMPORTANT") {
        score += 3;
    }
    if has("CATEGORY_PERSONAL") {
        score += 1;
    }
    if has("CATEGORY_SOCIAL") {
        score -= 1;
    }
    if has("CATEGORY_PROMOTIONS") {
        score -= 2;
    }

    if PRIORITY_SENDER_DOMAINS.iter().any(|d| sender.contains(d)) {
        score += 2;
    }
    if sender.contains("noreply") || sender.contains("no-reply") {
        score -= 1;
    }

    score.clamp(1, 10) as u8
}

/// Highest score first; ties keep their input order.
pub fn rank_by_importance(mut insights: Vec<EmailInsight>) -> Vec<EmailInsight> {
    insights.sort_by(|a, b| b.importance_score.cmp(&a.importance_score));
    insights
}

/// Newest first.
pub fn sort_by_date_desc(mut insights: Vec<EmailInsight>) -> Vec<EmailInsight> {
    insights.sort_by(|a, b| b.date.cmp(&a.date));
    insights
}

/// Messages scoring at least `threshold`, ranked, with their age in whole
/// days relative to `now`.
pub fn important_missed(
    insights: Vec<EmailInsight>,
    threshold: u8,
    now: NaiveDateTime,
) -> Vec<(EmailInsight, i64)> {
    rank_by_importance(insights)
        .into_iter()
        .filter(|i| i.importance_score >= threshold)
        .map(|i| {
            let days_ago = (now - i.date).num_days();
            (i, days_ago)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SenderSummary {
    pub sender: String,
    pub total_emails: usize,
    pub unread_count: usize,
    pub avg_importance: f64,
    pub latest_date: NaiveDateTime,
    pub sample_subjects: Vec<String>,
}

/// Roll messages up per sender, highest average importance first.
pub fn summarize_by_sender(insights: &[EmailInsight]) -> Vec<SenderSummary> {
    let mut order: Vec<SenderSummary> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for insight in insights {
        let slot = *index.entry(insight.sender.as_str()).or_insert_with(|| {
            order.push(SenderSummary {
                sender: insight.sender.clone(),
                total_emails: 0,
                unread_count: 0,
                avg_importance: 0.0,
                latest_date: insight.date,
                sample_subjects: Vec::new(),
            });
            order.len() - 1
        });
        let stats = &mut order[slot];

        stats.total_emails += 1;
        if insight.is_unread {
            stats.unread_count += 1;
        }
        let n = stats.total_emails as f64;
        stats.avg_importance =
            (stats.avg_importance * (n - 1.0) + f64::from(insight.importance_score)) / n;
        if insight.date > stats.latest_date {
            stats.latest_date = insight.date;
        }
        if stats.sample_subjects.len() < SAMPLE_SUBJECTS {
            stats.sample_subjects.push(insight.subject.clone());
        }
    }

    for stats in &mut order {
        stats.avg_importance = round1(stats.avg_importance);
    }
    order.sort_by(|a, b| {
        b.avg_importance
            .partial_cmp(&a.avg_importance)
            .unwrap_or(Ordering::Equal)
    });
    order
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub total: usize,
    pub unread: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopEmail {
    pub subject: String,
    pub sender: String,
    pub importance_score: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyEmailInsights {
    pub total_emails: usize,
    pub total_unread: usize,
    pub high_importance_emails: usize,
    pub daily_breakdown: BTreeMap<String, DayCount>,
    pub top_unread_important: Vec<TopEmail>,
}

pub fn daily_breakdown(insights: &[EmailInsight]) -> BTreeMap<String, DayCount> {
    let mut days: BTreeMap<String, DayCount> = BTreeMap::new();
    for insight in insights {
        let day = days
            .entry(insight.date.format("%Y-%m-%d").to_string())
            .or_default();
        day.total += 1;
        if insight.is_unread {
            day.unread += 1;
        }
    }
    days
}

pub fn weekly_email_insights(insights: &[EmailInsight]) -> WeeklyEmailInsights {
    let total_unread = insights.iter().filter(|i| i.is_unread).count();
    let high_importance_emails = insights
        .iter()
        .filter(|i| i.importance_score >= HIGH_IMPORTANCE)
        .count();

    let top_unread_important = rank_by_importance(insights.to_vec())
        .into_iter()
        .filter(|i| i.is_unread && i.importance_score >= TOP_UNREAD_THRESHOLD)
        .take(TOP_UNREAD_LIMIT)
        .map(|i| TopEmail {
            subject: i.subject,
            sender: i.sender,
            importance_score: i.importance_score,
        })
        .collect();

    WeeklyEmailInsights {
        total_emails: insights.len(),
        total_unread,
        high_importance_emails,
        daily_breakdown: daily_breakdown(insights),
        top_unread_important,
    }
}

pub fn availability(busy_periods: Vec<BusyPeriod>) -> CalendarAvailability {
    CalendarAvailability {
        is_free: busy_periods.is_empty(),
        busy_periods,
    }
}

/// Case-insensitive substring match on summary, description or location.
pub fn search_events(events: Vec<CalendarEvent>, query: &str) -> Vec<CalendarEvent> {
    let query = query.to_lowercase();
    events
        .into_iter()
        .filter(|e| {
            e.summary.to_lowercase().contains(&query)
                || e.description.to_lowercase().contains(&query)
                || e.location.to_lowercase().contains(&query)
        })
        .collect()
}

pub fn time_range(event: &CalendarEvent) -> String {
    format!(
        "{} - {}",
        event.start_time.format("%H:%M"),
        event.end_time.format("%H:%M")
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgendaItem {
    pub time: String,
    pub title: String,
    pub location: String,
    pub description: String,
    pub attendees_count: usize,
    pub status: String,
}

/// Events ordered by start time.
pub fn agenda(mut events: Vec<CalendarEvent>) -> Vec<AgendaItem> {
    events.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    events
        .into_iter()
        .map(|e| AgendaItem {
            time: time_range(&e),
            attendees_count: e.attendees.len(),
            title: e.summary,
            location: e.location,
            description: e.description,
            status: e.status,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekEntry {
    pub time: String,
    pub title: String,
    pub duration_hours: f64,
    pub attendees_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyCalendarSummary {
    pub total_events: usize,
    pub total_hours_scheduled: f64,
    pub daily_breakdown: BTreeMap<String, Vec<WeekEntry>>,
    pub busiest_day: Option<String>,
}

/// Bucket events per day (`%Y-%m-%d (%A)` of the start time).
pub fn weekly_calendar_summary(events: &[CalendarEvent]) -> WeeklyCalendarSummary {
    let mut daily: BTreeMap<String, Vec<WeekEntry>> = BTreeMap::new();
    let mut total_hours = 0.0;

    for event in events {
        let duration = event.duration_hours();
        total_hours += duration;
        daily
            .entry(event.start_time.format("%Y-%m-%d (%A)").to_string())
            .or_default()
            .push(WeekEntry {
                time: time_range(event),
                title: event.summary.clone(),
                duration_hours: round1(duration),
                attendees_count: event.attendees.len(),
            });
    }

    // First day wins a tie
    let mut busiest: Option<(&String, usize)> = None;
    for (day, entries) in &daily {
        if busiest.map_or(true, |(_, n)| entries.len() > n) {
            busiest = Some((day, entries.len()));
        }
    }
    let busiest_day = busiest.map(|(day, _)| day.clone());

    WeeklyCalendarSummary {
        total_events: events.len(),
        total_hours_scheduled: round1(total_hours),
        daily_breakdown: daily,
        busiest_day,
    }
}

/// Newest first, truncated to `limit`. Returns the count before truncation.
pub fn activity_timeline(
    mut activities: Vec<DriveActivity>,
    limit: usize,
) -> (usize, Vec<DriveActivity>) {
    activities.sort_by(|a, b| b.time.cmp(&a.time));
    let total = activities.len();
    activities.truncate(limit);
    (total, activities)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(ls: &[&str]) -> Vec<String> {
        ls.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_label_scores() {
        assert_eq!(importance_score("hello", "a@b.org", &labels(&[])), 5);
        assert_eq!(importance_score("hello", "a@b.org", &labels(&["IMPORTANT"])), 8);
        assert_eq!(
            importance_score("hello", "a@b.org", &labels(&["CATEGORY_PROMOTIONS"])),
            3
        );
    }

    #[test]
    fn test_first_keyword_only() {
        assert_eq!(importance_score("URGENT meeting deadline", "a@b.org", &[]), 7);
    }

    #[test]
    fn test_sender_rules() {
        assert_eq!(importance_score("hi", "boss@company.com", &[]), 7);
        assert_eq!(importance_score("hi", "noreply@shop.com", &[]), 4);
    }

    #[test]
    fn test_clamped() {
        let all = labels(&["IMPORTANT", "CATEGORY_PERSONAL"]);
        assert_eq!(importance_score("urgent", "ceo@company.com", &all), 10);
        let low = labels(&["CATEGORY_SOCIAL", "CATEGORY_PROMOTIONS"]);
        assert_eq!(importance_score("x", "no-reply@x.com", &low), 1);
    }
}
