use reqwest::{Client as HttpClient, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::api::models::{
    AiTraining, BrandGuideline, BulkMessage, BulkMessageDraft, BulkMessageStats, BusinessInfo,
    BulkStatus, Call, CalendarEvent, CalendarStatus, Conversation, ConversationDetail, Meeting,
    Message, Page, Review, ReviewStatus, UserSettings, WidgetConfig, canonical_ids,
};
use crate::app::Settings;
use crate::error::{ApiError, ApiResult};
use crate::utils;

/// REST access to the backend. Every call carries the bearer token when one
/// is set and returns the same [`ApiResult`] shape.
#[derive(Clone)]
pub struct ApiClient {
    pub http: HttpClient,
    base: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            http: HttpClient::new(),
            base: utils::api_base(base_url),
            token,
        }
    }

    pub fn from_settings(settings: &Settings) -> ApiResult<Self> {
        let http = HttpClient::builder().timeout(settings.request_timeout()).build()?;
        Ok(Self {
            http,
            base: settings.api_base(),
            token: settings.token.clone(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    fn with_auth(&self, mut req: RequestBuilder) -> RequestBuilder {
        if let Some(t) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", t));
        }
        req
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base, path.trim_start_matches('/'));
        self.with_auth(self.http.request(method, url))
    }

    async fn send_raw(&self, req: RequestBuilder, what: &str) -> ApiResult<Value> {
        let resp = req.send().await?;
        let status = resp.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(ApiError::Unauthorized),
            StatusCode::NOT_FOUND => return Err(ApiError::NotFound(what.to_string())),
            StatusCode::NO_CONTENT => return Ok(Value::Null),
            s if !s.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                return Err(ApiError::Status { status: s.as_u16(), body });
            }
            _ => {}
        }
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        let mut json: Value = serde_json::from_str(&text)?;
        canonical_ids(&mut json);
        Ok(json)
    }

    async fn fetch<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> ApiResult<T> {
        let json = self.send_raw(req, what).await?;
        Ok(serde_json::from_value(unwrap_data(json))?)
    }

    async fn fetch_list<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        what: &str,
        key: &str,
    ) -> ApiResult<Vec<T>> {
        let json = self.send_raw(req, what).await?;
        Ok(serde_json::from_value(list_items(&json, key))?)
    }

    async fn fetch_page<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        what: &str,
        key: &str,
        page: u32,
    ) -> ApiResult<Page<T>> {
        let json = self.send_raw(req, what).await?;
        let items = serde_json::from_value(list_items(&json, key))?;
        Ok(Page {
            items,
            page,
            total_pages: total_pages(&json),
        })
    }

    async fn send_only(&self, req: RequestBuilder, what: &str) -> ApiResult<()> {
        self.send_raw(req, what).await.map(|_| ())
    }

    // Conversations

    pub async fn conversations(&self, page: u32, limit: u32) -> ApiResult<Page<Conversation>> {
        let req = self
            .request(Method::GET, "conversations")
            .query(&[("page", page), ("limit", limit)]);
        self.fetch_page(req, "conversations", "conversations", page).await
    }

    pub async fn conversation(&self, id: &str) -> ApiResult<ConversationDetail> {
        let json = self
            .send_raw(self.request(Method::GET, &format!("conversations/{id}")), "conversation")
            .await?;
        let json = unwrap_data(json);
        let conv_json = json.get("conversation").cloned().unwrap_or_else(|| json.clone());
        let conversation: Conversation = serde_json::from_value(conv_json.clone())?;
        let messages_json = json
            .get("messages")
            .or_else(|| conv_json.get("messages"))
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        let messages = serde_json::from_value(messages_json)?;
        Ok(ConversationDetail { conversation, messages })
    }

    pub async fn messages(&self, conversation_id: &str) -> ApiResult<Vec<Message>> {
        let req = self.request(Method::GET, &format!("conversations/{conversation_id}/messages"));
        self.fetch_list(req, "messages", "messages").await
    }

    pub async fn send_message(&self, conversation_id: &str, content: &str) -> ApiResult<Message> {
        let req = self.request(Method::POST, &format!("conversations/{conversation_id}/messages"));
        let json = self
            .send_raw(req.json(&json!({ "content": content })), "send message")
            .await?;
        let json = unwrap_data(json);
        let msg = json.get("message").filter(|m| m.is_object()).cloned().unwrap_or(json);
        Ok(serde_json::from_value(msg)?)
    }

    pub async fn update_conversation_status(&self, id: &str, status: &str) -> ApiResult<Conversation> {
        let req = self.request(Method::PUT, &format!("conversations/{id}/status"));
        self.fetch(req.json(&json!({ "status": status })), "conversation status")
            .await
    }

    pub async fn mark_read(&self, id: &str) -> ApiResult<()> {
        self.send_only(self.request(Method::PUT, &format!("conversations/{id}/read")), "mark read")
            .await
    }

    // Business settings

    pub async fn business_info(&self) -> ApiResult<BusinessInfo> {
        self.fetch(self.request(Method::GET, "business-info"), "business info").await
    }

    pub async fn save_business_info(&self, info: &BusinessInfo) -> ApiResult<BusinessInfo> {
        let req = self.request(Method::POST, "business-info").json(info);
        self.fetch(req, "business info").await
    }

    pub async fn brand_guidelines(&self) -> ApiResult<Vec<BrandGuideline>> {
        self.fetch_list(self.request(Method::GET, "brand-guidelines"), "brand guidelines", "guidelines")
            .await
    }

    pub async fn create_brand_guideline(&self, g: &BrandGuideline) -> ApiResult<BrandGuideline> {
        let req = self.request(Method::POST, "brand-guidelines").json(g);
        self.fetch(req, "brand guideline").await
    }

    pub async fn delete_brand_guideline(&self, id: &str) -> ApiResult<()> {
        self.send_only(self.request(Method::DELETE, &format!("brand-guidelines/{id}")), "brand guideline")
            .await
    }

    pub async fn ai_training(&self) -> ApiResult<AiTraining> {
        self.fetch(self.request(Method::GET, "ai-training"), "ai training").await
    }

    pub async fn save_ai_training(&self, training: &AiTraining) -> ApiResult<AiTraining> {
        let req = self.request(Method::POST, "ai-training").json(training);
        self.fetch(req, "ai training").await
    }

    pub async fn user_settings(&self) -> ApiResult<UserSettings> {
        self.fetch(self.request(Method::GET, "user-settings"), "user settings").await
    }

    pub async fn save_user_settings(&self, s: &UserSettings) -> ApiResult<UserSettings> {
        let req = self.request(Method::POST, "user-settings").json(s);
        self.fetch(req, "user settings").await
    }

    // Calendar and meetings

    pub async fn calendar_events(&self) -> ApiResult<Vec<CalendarEvent>> {
        self.fetch_list(self.request(Method::GET, "calendar/events"), "calendar events", "events")
            .await
    }

    pub async fn calendar_status(&self) -> ApiResult<CalendarStatus> {
        self.fetch(self.request(Method::GET, "calendar/status"), "calendar status").await
    }

    pub async fn disconnect_calendar(&self) -> ApiResult<()> {
        self.send_only(self.request(Method::DELETE, "calendar/disconnect"), "calendar").await
    }

    pub async fn meetings(&self) -> ApiResult<Vec<Meeting>> {
        self.fetch_list(self.request(Method::GET, "meetings"), "meetings", "meetings").await
    }

    // Reviews

    pub async fn reviews(&self, status: Option<ReviewStatus>) -> ApiResult<Vec<Review>> {
        let mut req = self.request(Method::GET, "reviews");
        if let Some(s) = status {
            req = req.query(&[("status", s)]);
        }
        self.fetch_list(req, "reviews", "reviews").await
    }

    pub async fn reply_to_review(&self, id: &str, reply: &str) -> ApiResult<Review> {
        let req = self.request(Method::POST, &format!("reviews/{id}/reply"));
        self.fetch(req.json(&json!({ "reply": reply })), "review reply").await
    }

    pub async fn update_review_status(&self, id: &str, status: ReviewStatus) -> ApiResult<Review> {
        let req = self.request(Method::PUT, &format!("reviews/{id}/status"));
        self.fetch(req.json(&json!({ "status": status })), "review status").await
    }

    // Calls

    pub async fn call_history(&self, page: u32, limit: u32) -> ApiResult<Page<Call>> {
        let req = self
            .request(Method::GET, "calls/history")
            .query(&[("page", page), ("limit", limit)]);
        self.fetch_page(req, "call history", "calls", page).await
    }

    pub async fn initiate_call(&self, to: &str) -> ApiResult<Call> {
        let req = self.request(Method::POST, "calls/initiate");
        self.fetch(req.json(&json!({ "to": to })), "call").await
    }

    // Bulk messages

    pub async fn bulk_messages(
        &self,
        page: u32,
        limit: u32,
        status: Option<BulkStatus>,
    ) -> ApiResult<Page<BulkMessage>> {
        let mut req = self
            .request(Method::GET, "bulk-messages")
            .query(&[("page", page), ("limit", limit)]);
        if let Some(s) = status {
            req = req.query(&[("status", s.as_str())]);
        }
        self.fetch_page(req, "bulk messages", "bulkMessages", page).await
    }

    pub async fn bulk_message(&self, id: &str) -> ApiResult<BulkMessage> {
        self.fetch(self.request(Method::GET, &format!("bulk-messages/{id}")), "bulk message")
            .await
    }

    pub async fn create_bulk_message(&self, draft: &BulkMessageDraft) -> ApiResult<BulkMessage> {
        let req = self.request(Method::POST, "bulk-messages").json(draft);
        self.fetch(req, "bulk message").await
    }

    pub async fn update_bulk_message(&self, id: &str, draft: &BulkMessageDraft) -> ApiResult<BulkMessage> {
        let req = self.request(Method::PUT, &format!("bulk-messages/{id}")).json(draft);
        self.fetch(req, "bulk message").await
    }

    pub async fn delete_bulk_message(&self, id: &str) -> ApiResult<()> {
        self.send_only(self.request(Method::DELETE, &format!("bulk-messages/{id}")), "bulk message")
            .await
    }

    pub async fn bulk_message_stats(&self) -> ApiResult<BulkMessageStats> {
        self.fetch(self.request(Method::GET, "bulk-messages/stats"), "bulk message stats").await
    }

    // Widget

    pub async fn widget_configs(&self) -> ApiResult<Vec<WidgetConfig>> {
        self.fetch_list(self.request(Method::GET, "widget-config"), "widget configs", "widgets")
            .await
    }

    pub async fn widget_config(&self, id: &str) -> ApiResult<WidgetConfig> {
        self.fetch(self.request(Method::GET, &format!("widget-config/{id}")), "widget config")
            .await
    }

    pub async fn create_widget_config(&self, cfg: &WidgetConfig) -> ApiResult<WidgetConfig> {
        let req = self.request(Method::POST, "widget-config").json(cfg);
        self.fetch(req, "widget config").await
    }

    pub async fn update_widget_config(&self, id: &str, cfg: &WidgetConfig) -> ApiResult<WidgetConfig> {
        let req = self.request(Method::PUT, &format!("widget-config/{id}")).json(cfg);
        self.fetch(req, "widget config").await
    }

    pub async fn delete_widget_config(&self, id: &str) -> ApiResult<()> {
        self.send_only(self.request(Method::DELETE, &format!("widget-config/{id}")), "widget config")
            .await
    }
}

/// Responses come either bare or wrapped as `{ "success": .., "data": .. }`.
fn unwrap_data(json: Value) -> Value {
    match json {
        Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
        other => other,
    }
}

fn list_items(json: &Value, key: &str) -> Value {
    let items = if let Some(arr) = json.as_array() {
        arr.clone()
    } else if let Some(arr) = json.get(key).and_then(|v| v.as_array()) {
        arr.clone()
    } else if let Some(data) = json.get("data") {
        return list_items(data, key);
    } else if let Some(arr) = json.get("items").and_then(|v| v.as_array()) {
        arr.clone()
    } else {
        Vec::new()
    };
    Value::Array(items)
}

fn total_pages(json: &Value) -> Option<u32> {
    json.get("totalPages")
        .or_else(|| json.get("pagination").and_then(|p| p.get("totalPages")))
        .or_else(|| json.get("data").and_then(|d| d.get("totalPages")))
        .and_then(|v| v.as_u64())
        .map(|n| n as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(&format!("{}/api/v1", server.uri()), Some("tok".into()))
    }

    #[tokio::test]
    async fn conversations_carry_bearer_and_page_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/conversations"))
            .and(header("Authorization", "Bearer tok"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "conversations": [{ "_id": "c1", "customer": { "name": "Ada" } }],
                "totalPages": 4
            })))
            .mount(&server)
            .await;

        let page = client(&server).await.conversations(2, 20).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].display_name(), "Ada");
        assert_eq!(page.total_pages, Some(4));
        assert_eq!(page.page, 2);
    }

    #[tokio::test]
    async fn rows_with_both_id_spellings_and_bare_customer_decode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/conversations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "conversations": [
                    { "_id": "c1", "id": "c1", "customer": { "_id": "u1", "id": "u1", "name": "Ada" } },
                    { "_id": "c2", "customer": "u2" }
                ],
                "totalPages": 1
            })))
            .mount(&server)
            .await;

        let page = client(&server).await.conversations(1, 20).await.unwrap();
        let ids: Vec<_> = page.items.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert_eq!(page.items[0].display_name(), "Ada");
        assert_eq!(page.items[1].participant.id, "u2");
    }

    #[tokio::test]
    async fn data_envelope_is_unwrapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/calendar/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "isConnected": true, "email": "a@b.c" }
            })))
            .mount(&server)
            .await;

        let status = client(&server).await.calendar_status().await.unwrap();
        assert!(status.connected);
    }

    #[tokio::test]
    async fn status_codes_map_to_error_kinds() {
        let server = MockServer::start().await;
        Mock::given(path("/api/v1/user-settings"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/api/v1/business-info"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(path("/api/v1/meetings"))
            .respond_with(ResponseTemplate::new(500).set_body_string(r#"{"message":"boom"}"#))
            .mount(&server)
            .await;

        let api = client(&server).await;
        assert!(matches!(api.user_settings().await, Err(ApiError::NotFound(_))));
        assert!(matches!(api.business_info().await, Err(ApiError::Unauthorized)));
        match api.meetings().await {
            Err(e @ ApiError::Status { status: 500, .. }) => {
                assert!(e.is_retryable());
                assert_eq!(e.user_message(), "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_message_posts_content_and_returns_saved_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/conversations/c1/messages"))
            .and(body_json(json!({ "content": "hello" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "message": { "_id": "m9", "conversationId": "c1", "sender": "agent", "content": "hello" }
            })))
            .mount(&server)
            .await;

        let msg = client(&server).await.send_message("c1", "hello").await.unwrap();
        assert_eq!(msg.id, "m9");
        assert_eq!(msg.content, "hello");
    }

    #[tokio::test]
    async fn conversation_detail_accepts_nested_messages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/conversations/c1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "conversation": { "_id": "c1" },
                "messages": [
                    { "_id": "m1", "conversationId": "c1", "sender": "customer", "content": "a" },
                    { "_id": "m2", "conversationId": "c1", "sender": "ai", "content": "b" }
                ]
            })))
            .mount(&server)
            .await;

        let detail = client(&server).await.conversation("c1").await.unwrap();
        assert_eq!(detail.conversation.id, "c1");
        assert_eq!(detail.messages.len(), 2);
    }

    #[tokio::test]
    async fn empty_delete_response_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/calendar/disconnect"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        client(&server).await.disconnect_calendar().await.unwrap();
    }

    #[tokio::test]
    async fn bulk_messages_filter_by_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/bulk-messages"))
            .and(query_param("status", "in_progress"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "bulkMessages": [{ "_id": "b1", "title": "Promo", "status": "in_progress" }],
                    "totalPages": 1
                }
            })))
            .mount(&server)
            .await;

        let page = client(&server)
            .await
            .bulk_messages(1, 10, Some(BulkStatus::InProgress))
            .await
            .unwrap();
        assert_eq!(page.items[0].status, BulkStatus::InProgress);
        assert_eq!(page.total_pages, Some(1));
    }
}
