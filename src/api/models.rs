use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A server-owned entity cached on the client, addressed by its id.
pub trait Record: Clone {
    fn id(&self) -> &str;
}

/// A partial update for a [`Record`]. Fields left as `None` are untouched.
pub trait Patch {
    type Target: Record;

    fn id(&self) -> &str;
    fn apply_to(&self, target: &mut Self::Target);
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Whatsapp,
    Facebook,
    Instagram,
    Widget,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(alias = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// A participant as the backend sends it: a bare id, or the expanded document.
#[derive(Deserialize)]
#[serde(untagged)]
enum ParticipantRef {
    Id(String),
    Full(Participant),
}

impl From<ParticipantRef> for Participant {
    fn from(r: ParticipantRef) -> Self {
        match r {
            ParticipantRef::Id(id) => Participant { id, ..Default::default() },
            ParticipantRef::Full(p) => p,
        }
    }
}

fn optional_participant_ref<'de, D>(d: D) -> Result<Option<Participant>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<ParticipantRef>::deserialize(d)?.map(Participant::from))
}

fn participant_ref<'de, D>(d: D) -> Result<Participant, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_participant_ref(d)?.unwrap_or_default())
}

fn participant_id_ref<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_participant_ref(d)?.map(|p| p.id).filter(|id| !id.is_empty()))
}

/// Collapses the backend's id spellings so every object carries a single
/// `id`: `_id` is renamed, or dropped when `id` is already there.
pub fn canonical_ids(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if let Some(mongo) = map.remove("_id") {
                map.entry("id").or_insert(mongo);
            }
            map.values_mut().for_each(canonical_ids);
        }
        Value::Array(items) => items.iter_mut().for_each(canonical_ids),
        _ => {}
    }
}

/// Uses `key` as the object's id when it has none, and drops it otherwise.
pub fn promote_id(value: &mut Value, key: &str) {
    if let Value::Object(map) = value {
        if let Some(alt) = map.remove(key) {
            map.entry("id").or_insert(alt);
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(alias = "customer", default, deserialize_with = "participant_ref")]
    pub participant: Participant,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub unread: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for Conversation {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Conversation {
    pub fn display_name(&self) -> &str {
        if !self.participant.name.is_empty() {
            &self.participant.name
        } else if let Some(phone) = self.participant.phone.as_deref() {
            phone
        } else {
            "Unknown"
        }
    }
}

/// Payload of `conversationUpdated`: the id plus whichever fields changed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPatch {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(alias = "customer", default, deserialize_with = "optional_participant_ref")]
    pub participant: Option<Participant>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub unread: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Patch for ConversationPatch {
    type Target = Conversation;

    fn id(&self) -> &str {
        &self.id
    }

    fn apply_to(&self, target: &mut Conversation) {
        if let Some(p) = &self.participant {
            target.participant = p.clone();
        }
        if let Some(m) = &self.last_message {
            target.last_message = Some(m.clone());
        }
        if let Some(u) = self.unread {
            target.unread = u;
        }
        if let Some(s) = &self.status {
            target.status = Some(s.clone());
        }
        if let Some(ts) = self.updated_at {
            target.updated_at = Some(ts);
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Customer,
    Agent,
    Ai,
    System,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(alias = "conversation")]
    pub conversation_id: String,
    #[serde(alias = "role", default)]
    pub sender: SenderRole,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Record for Message {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BulkStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Scheduled,
    #[serde(other)]
    Unknown,
}

impl BulkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkStatus::Pending => "pending",
            BulkStatus::InProgress => "in_progress",
            BulkStatus::Completed => "completed",
            BulkStatus::Failed => "failed",
            BulkStatus::Scheduled => "scheduled",
            BulkStatus::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for BulkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BulkStatus::Pending),
            "in_progress" => Ok(BulkStatus::InProgress),
            "completed" => Ok(BulkStatus::Completed),
            "failed" => Ok(BulkStatus::Failed),
            "scheduled" => Ok(BulkStatus::Scheduled),
            other => Err(format!("unknown campaign status: {other}")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BulkMessage {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(alias = "message", default)]
    pub body: String,
    #[serde(alias = "scheduleDate", default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: BulkStatus,
    #[serde(default)]
    pub sent_count: u32,
    #[serde(default)]
    pub failed_count: u32,
    #[serde(alias = "totalRecipients", default)]
    pub total_count: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for BulkMessage {
    fn id(&self) -> &str {
        &self.id
    }
}

impl BulkMessage {
    /// Share of recipients processed so far, in percent.
    pub fn progress(&self) -> u8 {
        if self.total_count == 0 {
            return 0;
        }
        let done = (self.sent_count + self.failed_count).min(self.total_count);
        ((done as u64 * 100) / self.total_count as u64) as u8
    }
}

/// Body for creating or editing a campaign.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BulkMessageDraft {
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BulkMessageStats {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub pending: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub scheduled: u32,
    #[serde(default)]
    pub in_progress: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Scheduled,
    Completed,
    Cancelled,
    Rescheduled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(alias = "googleEventId", default)]
    pub event_id: Option<String>,
    #[serde(alias = "dateTime")]
    pub start: DateTime<Utc>,
    #[serde(alias = "duration", default = "default_meeting_minutes")]
    pub duration_minutes: u32,
    #[serde(default)]
    pub title: String,
    pub status: MeetingStatus,
    #[serde(alias = "customer", default, deserialize_with = "participant_id_ref")]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub meet_link: Option<String>,
}

fn default_meeting_minutes() -> u32 {
    30
}

impl Record for Meeting {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Meeting {
    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.start + chrono::Duration::minutes(self.duration_minutes as i64)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Queued,
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Busy,
    NoAnswer,
    Canceled,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    #[serde(alias = "_id")]
    pub id: String,
    pub direction: CallDirection,
    #[serde(alias = "fromNumber", default)]
    pub from: String,
    #[serde(alias = "toNumber", default)]
    pub to: String,
    pub status: CallStatus,
    #[serde(alias = "duration", default)]
    pub duration_secs: u32,
    #[serde(default)]
    pub recording_url: Option<String>,
    #[serde(alias = "createdAt", default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl Record for Call {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    New,
    Replied,
    Archived,
    #[serde(other)]
    Unknown,
}

impl std::str::FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(ReviewStatus::New),
            "replied" => Ok(ReviewStatus::Replied),
            "archived" => Ok(ReviewStatus::Archived),
            other => Err(format!("unknown review status: {other}")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(alias = "_id")]
    pub id: String,
    pub rating: u8,
    #[serde(alias = "comment", default)]
    pub text: String,
    #[serde(default)]
    pub platform: String,
    #[serde(alias = "authorName", default)]
    pub reviewer_name: String,
    #[serde(default)]
    pub reply_text: Option<String>,
    #[serde(default)]
    pub replied_at: Option<DateTime<Utc>>,
    pub status: ReviewStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Review {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BusinessInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub place_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrandGuideline {
    #[serde(alias = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AiTraining {
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub faqs: Vec<Faq>,
    #[serde(default)]
    pub tone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default = "default_true")]
    pub ai_auto_reply: bool,
    #[serde(default = "default_true")]
    pub email_notifications: bool,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            ai_auto_reply: true,
            email_notifications: true,
            timezone: None,
            language: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CalendarStatus {
    #[serde(alias = "isConnected", default)]
    pub connected: bool,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    #[serde(alias = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub greeting: String,
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
}

impl Record for WidgetConfig {
    fn id(&self) -> &str {
        &self.id
    }
}

/// One page of a paginated list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub total_pages: Option<u32>,
}

/// A conversation together with its message history.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conversation_accepts_backend_shape() {
        let conv: Conversation = serde_json::from_value(json!({
            "_id": "c1",
            "customer": { "_id": "u1", "name": "Ada", "phone": "+100" },
            "lastMessage": "hi",
            "unread": true,
            "status": "open",
            "platform": "whatsapp",
            "updatedAt": "2026-01-02T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(conv.id, "c1");
        assert_eq!(conv.display_name(), "Ada");
        assert_eq!(conv.platform, Platform::Whatsapp);
        assert!(conv.unread);
    }

    #[test]
    fn unknown_enum_values_do_not_fail() {
        let conv: Conversation =
            serde_json::from_value(json!({ "id": "c1", "platform": "telegram" })).unwrap();
        assert_eq!(conv.platform, Platform::Other);

        let bm: BulkMessage =
            serde_json::from_value(json!({ "id": "b1", "status": "paused" })).unwrap();
        assert_eq!(bm.status, BulkStatus::Unknown);
    }

    #[test]
    fn patch_only_touches_present_fields() {
        let mut conv: Conversation = serde_json::from_value(json!({
            "id": "c1", "lastMessage": "old", "status": "open", "unread": true
        }))
        .unwrap();
        let patch = ConversationPatch {
            id: "c1".into(),
            unread: Some(false),
            ..Default::default()
        };
        patch.apply_to(&mut conv);
        assert!(!conv.unread);
        assert_eq!(conv.last_message.as_deref(), Some("old"));
        assert_eq!(conv.status.as_deref(), Some("open"));
    }

    #[test]
    fn bulk_progress_is_clamped() {
        let bm: BulkMessage = serde_json::from_value(json!({
            "id": "b1", "status": "in_progress",
            "sentCount": 8, "failedCount": 4, "totalCount": 10
        }))
        .unwrap();
        assert_eq!(bm.progress(), 100);
    }

    #[test]
    fn call_status_uses_kebab_case() {
        let call: Call = serde_json::from_value(json!({
            "id": "k1", "direction": "inbound", "from": "+1", "to": "+2",
            "status": "in-progress", "duration": 12
        }))
        .unwrap();
        assert_eq!(call.status, CallStatus::InProgress);
        assert_eq!(call.duration_secs, 12);
    }

    #[test]
    fn participant_may_be_a_bare_id() {
        let conv: Conversation =
            serde_json::from_value(json!({ "_id": "c1", "customer": "u1" })).unwrap();
        assert_eq!(conv.participant.id, "u1");
        assert_eq!(conv.display_name(), "Unknown");

        let conv: Conversation =
            serde_json::from_value(json!({ "_id": "c2", "customer": null })).unwrap();
        assert_eq!(conv.participant, Participant::default());

        let patch: ConversationPatch =
            serde_json::from_value(json!({ "id": "c1", "customer": "u2" })).unwrap();
        assert_eq!(patch.participant.unwrap().id, "u2");
    }

    #[test]
    fn meeting_customer_may_be_expanded() {
        let base = json!({ "_id": "m1", "dateTime": "2026-03-01T09:00:00Z", "status": "scheduled" });

        let mut flat = base.clone();
        flat["customer"] = json!("u1");
        let m: Meeting = serde_json::from_value(flat).unwrap();
        assert_eq!(m.customer_id.as_deref(), Some("u1"));

        let mut expanded = base;
        expanded["customer"] = json!({ "_id": "u2", "name": "Ada" });
        let m: Meeting = serde_json::from_value(expanded).unwrap();
        assert_eq!(m.customer_id.as_deref(), Some("u2"));
    }

    #[test]
    fn canonical_ids_collapse_both_spellings() {
        let mut doc = json!({
            "conversations": [
                { "_id": "c1", "id": "c1", "customer": { "_id": "u1", "id": "u1", "name": "Ada" } },
                { "_id": "c2" }
            ]
        });
        canonical_ids(&mut doc);
        let list: Vec<Conversation> = serde_json::from_value(doc["conversations"].take()).unwrap();
        assert_eq!(list[0].id, "c1");
        assert_eq!(list[0].participant.name, "Ada");
        assert_eq!(list[1].id, "c2");
    }
}
