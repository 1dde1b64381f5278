//! Pure derivations over base collections. Nothing here mutates its input.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

use crate::api::models::{
    BulkMessage, BulkMessageStats, BulkStatus, Call, CallDirection, CallStatus, Conversation,
    Meeting, MeetingStatus, Review, ReviewStatus,
};

fn matches_text(needle: &str, haystacks: &[Option<&str>]) -> bool {
    if needle.trim().is_empty() {
        return true;
    }
    let needle = needle.trim().to_lowercase();
    haystacks
        .iter()
        .flatten()
        .any(|h| h.to_lowercase().contains(&needle))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationFilter {
    pub search: String,
    pub status: Option<String>,
    pub unread_only: bool,
}

impl ConversationFilter {
    pub fn is_empty(&self) -> bool {
        self.search.trim().is_empty() && self.status.is_none() && !self.unread_only
    }

    pub fn matches(&self, c: &Conversation) -> bool {
        if self.unread_only && !c.unread {
            return false;
        }
        if let Some(status) = &self.status {
            if !c.status.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(status)) {
                return false;
            }
        }
        matches_text(
            &self.search,
            &[
                Some(c.participant.name.as_str()),
                c.participant.phone.as_deref(),
                c.participant.email.as_deref(),
                c.last_message.as_deref(),
            ],
        )
    }
}

/// Inclusive date range; either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, ts: Option<DateTime<Utc>>) -> bool {
        if self.from.is_none() && self.to.is_none() {
            return true;
        }
        let Some(date) = ts.map(|t| t.date_naive()) else {
            return false;
        };
        self.from.is_none_or(|f| date >= f) && self.to.is_none_or(|t| date <= t)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkMessageFilter {
    pub search: String,
    pub status: Option<BulkStatus>,
    pub dates: DateRange,
}

impl BulkMessageFilter {
    pub fn matches(&self, b: &BulkMessage) -> bool {
        if self.status.is_some_and(|s| s != b.status) {
            return false;
        }
        // Scheduled campaigns are dated by their send date.
        let when = b.scheduled_at.or(b.created_at);
        self.dates.contains(when)
            && matches_text(&self.search, &[Some(b.title.as_str()), Some(b.body.as_str())])
    }
}

pub fn bulk_message_stats<'a, I>(items: I) -> BulkMessageStats
where
    I: IntoIterator<Item = &'a BulkMessage>,
{
    let mut stats = BulkMessageStats::default();
    for b in items {
        stats.total += 1;
        match b.status {
            BulkStatus::Pending => stats.pending += 1,
            BulkStatus::InProgress => stats.in_progress += 1,
            BulkStatus::Completed => stats.completed += 1,
            BulkStatus::Failed => stats.failed += 1,
            BulkStatus::Scheduled => stats.scheduled += 1,
            BulkStatus::Unknown => {}
        }
    }
    stats
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeetingFilter {
    pub status: Option<MeetingStatus>,
    pub dates: DateRange,
    pub search: String,
}

impl MeetingFilter {
    pub fn matches(&self, m: &Meeting) -> bool {
        self.status.is_none_or(|s| s == m.status)
            && self.dates.contains(Some(m.start))
            && matches_text(&self.search, &[Some(m.title.as_str())])
    }
}

/// Meetings bucketed by calendar day (UTC), each day sorted by start time.
pub fn group_meetings_by_date<'a, I>(meetings: I) -> BTreeMap<NaiveDate, Vec<&'a Meeting>>
where
    I: IntoIterator<Item = &'a Meeting>,
{
    let mut groups: BTreeMap<NaiveDate, Vec<&Meeting>> = BTreeMap::new();
    for m in meetings {
        groups.entry(m.date()).or_default().push(m);
    }
    for day in groups.values_mut() {
        day.sort_by_key(|m| m.start);
    }
    groups
}

/// Scheduled or rescheduled meetings that haven't ended, soonest first.
pub fn upcoming_meetings<'a, I>(meetings: I, now: DateTime<Utc>) -> Vec<&'a Meeting>
where
    I: IntoIterator<Item = &'a Meeting>,
{
    let mut out: Vec<&Meeting> = meetings
        .into_iter()
        .filter(|m| matches!(m.status, MeetingStatus::Scheduled | MeetingStatus::Rescheduled))
        .filter(|m| m.end() > now)
        .collect();
    out.sort_by_key(|m| m.start);
    out
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewFilter {
    pub status: Option<ReviewStatus>,
    pub platform: Option<String>,
    pub min_rating: Option<u8>,
}

impl ReviewFilter {
    pub fn matches(&self, r: &Review) -> bool {
        self.status.is_none_or(|s| s == r.status)
            && self
                .platform
                .as_deref()
                .is_none_or(|p| p.eq_ignore_ascii_case(&r.platform))
            && self.min_rating.is_none_or(|min| r.rating >= min)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReviewSummary {
    pub count: usize,
    pub average: f32,
    /// Index 0 holds one-star reviews.
    pub by_rating: [usize; 5],
    pub awaiting_reply: usize,
}

pub fn review_summary<'a, I>(reviews: I) -> ReviewSummary
where
    I: IntoIterator<Item = &'a Review>,
{
    let mut summary = ReviewSummary::default();
    let mut sum = 0u32;
    for r in reviews {
        summary.count += 1;
        sum += r.rating as u32;
        if (1..=5).contains(&r.rating) {
            summary.by_rating[(r.rating - 1) as usize] += 1;
        }
        if r.status == ReviewStatus::New {
            summary.awaiting_reply += 1;
        }
    }
    if summary.count > 0 {
        summary.average = sum as f32 / summary.count as f32;
    }
    summary
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallFilter {
    pub direction: Option<CallDirection>,
    pub status: Option<CallStatus>,
    pub search: String,
}

impl CallFilter {
    pub fn matches(&self, c: &Call) -> bool {
        self.direction.is_none_or(|d| d == c.direction)
            && self.status.is_none_or(|s| s == c.status)
            && matches_text(&self.search, &[Some(c.from.as_str()), Some(c.to.as_str())])
    }
}
