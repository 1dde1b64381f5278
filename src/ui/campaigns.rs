use std::sync::{Arc, Mutex};

use crate::api::ApiClient;
use crate::api::events::{EventKind, ServerEvent};
use crate::api::models::{BulkMessage, BulkMessageDraft, BulkMessageStats, BulkStatus};
use crate::error::{ApiError, ApiResult};
use crate::lifetime::Lifetime;
use crate::sync::filter::bulk_message_stats;
use crate::sync::{BulkMessageFilter, SyncedCollection};
use crate::transport::{SocketClient, Subscription};
use crate::utils::lock;

pub const PAGE_SIZE: u32 = 10;

/// Bulk message (campaign) table with live progress.
#[derive(Debug, Default)]
pub struct CampaignBoard {
    campaigns: SyncedCollection<BulkMessage>,
    filter: BulkMessageFilter,
    /// Server-side totals, kept in step with every row change seen since.
    server_stats: Option<BulkMessageStats>,
    error: Option<String>,
}

impl CampaignBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn campaigns(&self) -> &SyncedCollection<BulkMessage> {
        &self.campaigns
    }

    pub fn campaigns_mut(&mut self) -> &mut SyncedCollection<BulkMessage> {
        &mut self.campaigns
    }

    pub fn set_filter(&mut self, filter: BulkMessageFilter) {
        self.filter = filter;
    }

    pub fn filter(&self) -> &BulkMessageFilter {
        &self.filter
    }

    pub fn visible(&self) -> Vec<&BulkMessage> {
        self.campaigns.view(|b| self.filter.matches(b))
    }

    /// Totals from the server when known, otherwise counted from the list.
    pub fn stats(&self) -> BulkMessageStats {
        self.server_stats
            .clone()
            .unwrap_or_else(|| bulk_message_stats(self.campaigns.items()))
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn handle_event(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::BulkMessageCreated(b) => {
                self.insert(b.clone());
                true
            }
            ServerEvent::BulkMessageUpdated(b) => {
                let before = self.status_of(&b.id);
                let applied = self.campaigns.apply_updated(b.clone());
                if applied {
                    self.count_change(before, Some(b.status));
                }
                applied
            }
            _ => false,
        }
    }

    fn status_of(&self, id: &str) -> Option<BulkStatus> {
        self.campaigns.get(id).map(|b| b.status)
    }

    fn insert(&mut self, campaign: BulkMessage) {
        let before = self.status_of(&campaign.id);
        let after = campaign.status;
        self.campaigns.apply_created(campaign);
        self.count_change(before, Some(after));
    }

    fn remove(&mut self, id: &str) {
        if let Some(gone) = self.campaigns.remove(id) {
            self.count_change(Some(gone.status), None);
        }
    }

    /// Moves one row between status buckets of the server totals.
    fn count_change(&mut self, before: Option<BulkStatus>, after: Option<BulkStatus>) {
        let Some(stats) = self.server_stats.as_mut() else {
            return;
        };
        if let Some(slot) = before.and_then(|s| bucket(stats, s)) {
            *slot = slot.saturating_sub(1);
        }
        if let Some(slot) = after.and_then(|s| bucket(stats, s)) {
            *slot += 1;
        }
        match (before, after) {
            (None, Some(_)) => stats.total += 1,
            (Some(_), None) => stats.total = stats.total.saturating_sub(1),
            _ => {}
        }
    }
}

fn bucket(stats: &mut BulkMessageStats, status: BulkStatus) -> Option<&mut u32> {
    match status {
        BulkStatus::Pending => Some(&mut stats.pending),
        BulkStatus::InProgress => Some(&mut stats.in_progress),
        BulkStatus::Completed => Some(&mut stats.completed),
        BulkStatus::Failed => Some(&mut stats.failed),
        BulkStatus::Scheduled => Some(&mut stats.scheduled),
        BulkStatus::Unknown => None,
    }
}

pub struct CampaignController {
    api: ApiClient,
    state: Arc<Mutex<CampaignBoard>>,
    lifetime: Lifetime,
    subscriptions: Vec<Subscription>,
}

impl CampaignController {
    pub fn mount(api: ApiClient, socket: &SocketClient) -> Self {
        let state = Arc::new(Mutex::new(CampaignBoard::new()));
        let subscriptions = [EventKind::BulkMessageCreated, EventKind::BulkMessageUpdated]
            .into_iter()
            .map(|kind| {
                let state = state.clone();
                socket.subscribe(kind, move |ev| {
                    lock(&state).handle_event(ev);
                })
            })
            .collect();
        Self {
            api,
            state,
            lifetime: Lifetime::new(),
            subscriptions,
        }
    }

    pub fn state(&self) -> Arc<Mutex<CampaignBoard>> {
        self.state.clone()
    }

    /// Loads the first page and the totals concurrently.
    pub async fn load(&self) -> ApiResult<()> {
        let list = self.lifetime.run(self.api.bulk_messages(1, PAGE_SIZE, None));
        let stats = self.lifetime.run(self.api.bulk_message_stats());
        let (list, stats) = tokio::join!(list, stats);

        match stats {
            Ok(s) => lock(&self.state).server_stats = Some(s),
            Err(e) => log::warn!("campaign stats unavailable: {}", e),
        }
        match list {
            Ok(page) => {
                let mut board = lock(&self.state);
                board.campaigns.load_page(page);
                board.error = None;
                Ok(())
            }
            Err(ApiError::Cancelled) => Err(ApiError::Cancelled),
            Err(e) => {
                lock(&self.state).error = Some(e.user_message());
                Err(e)
            }
        }
    }

    pub async fn create(&self, draft: &BulkMessageDraft) -> ApiResult<BulkMessage> {
        let created = self.lifetime.run(self.api.create_bulk_message(draft)).await?;
        lock(&self.state).insert(created.clone());
        Ok(created)
    }

    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        self.lifetime.run(self.api.delete_bulk_message(id)).await?;
        lock(&self.state).remove(id);
        Ok(())
    }

    pub fn unmount(&mut self) {
        self.lifetime.end();
        self.subscriptions.clear();
    }
}

impl Drop for CampaignController {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ReconnectPolicy;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn campaign(id: &str, status: &str, sent: u32) -> BulkMessage {
        serde_json::from_value(json!({
            "id": id, "title": id, "status": status, "sentCount": sent, "totalCount": 10
        }))
        .unwrap()
    }

    #[test]
    fn progress_events_patch_rows_in_place() {
        let mut board = CampaignBoard::new();
        board.campaigns_mut().load(vec![campaign("b2", "pending", 0), campaign("b1", "completed", 10)], None);

        board.handle_event(&ServerEvent::BulkMessageUpdated(campaign("b2", "in_progress", 4)));
        board.handle_event(&ServerEvent::BulkMessageCreated(campaign("b3", "scheduled", 0)));
        assert!(!board.handle_event(&ServerEvent::BulkMessageUpdated(campaign("gone", "failed", 0))));

        let ids: Vec<_> = board.campaigns().items().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b3", "b2", "b1"]);
        assert_eq!(board.campaigns().get("b2").unwrap().progress(), 40);
        assert_eq!(board.stats().in_progress, 1);
    }

    #[test]
    fn server_totals_follow_live_changes() {
        let mut board = CampaignBoard::new();
        board.campaigns_mut().load(vec![campaign("a", "pending", 0), campaign("b", "completed", 10)], None);
        board.server_stats = Some(BulkMessageStats {
            total: 12,
            pending: 4,
            completed: 8,
            ..Default::default()
        });

        board.handle_event(&ServerEvent::BulkMessageUpdated(campaign("a", "in_progress", 3)));
        board.handle_event(&ServerEvent::BulkMessageCreated(campaign("c", "scheduled", 0)));
        // The same create echoed back must not count twice.
        board.handle_event(&ServerEvent::BulkMessageCreated(campaign("c", "scheduled", 0)));
        board.remove("b");
        // Rows outside the loaded page can't be moved between buckets.
        board.handle_event(&ServerEvent::BulkMessageUpdated(campaign("far", "failed", 0)));

        let stats = board.stats();
        assert_eq!(stats.total, 12);
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.scheduled, 1);
        assert_eq!(stats.completed, 7);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn status_filter_is_a_view_only() {
        let mut board = CampaignBoard::new();
        board.campaigns_mut().load(vec![campaign("a", "pending", 0), campaign("b", "completed", 10)], None);
        board.set_filter(BulkMessageFilter { status: Some(BulkStatus::Completed), ..Default::default() });
        assert_eq!(board.visible().len(), 1);

        board.handle_event(&ServerEvent::BulkMessageUpdated(campaign("a", "completed", 10)));
        assert_eq!(board.visible().len(), 2);
        board.set_filter(BulkMessageFilter::default());
        let ids: Vec<_> = board.visible().iter().map(|b| b.id.clone()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn load_tolerates_missing_stats() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/bulk-messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bulkMessages": [{ "_id": "b1", "status": "failed" }],
                "totalPages": 3
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/bulk-messages/stats"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let socket = SocketClient::new("http://localhost:1", None, ReconnectPolicy::default()).unwrap();
        let controller = CampaignController::mount(ApiClient::new(&server.uri(), None), &socket);
        controller.load().await.unwrap();

        let state = controller.state();
        let board = lock(&state);
        assert_eq!(board.campaigns().len(), 1);
        assert!(board.campaigns().has_more());
        assert_eq!(board.stats().failed, 1);
    }

    #[test]
    fn unmount_detaches_listeners() {
        let socket = SocketClient::new("http://localhost:1", None, ReconnectPolicy::default()).unwrap();
        let mut controller = CampaignController::mount(ApiClient::new("http://localhost:1", None), &socket);
        assert_eq!(socket.listeners().count(EventKind::BulkMessageUpdated), 1);
        controller.unmount();
        assert_eq!(socket.listeners().count(EventKind::BulkMessageUpdated), 0);
        let fired = socket
            .listeners()
            .dispatch(&ServerEvent::BulkMessageCreated(campaign("x", "pending", 0)));
        assert_eq!(fired, 0);
        assert!(lock(&controller.state()).campaigns().is_empty());
    }
}
