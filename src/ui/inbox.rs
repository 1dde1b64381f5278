use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::api::ApiClient;
use crate::api::events::{EventKind, ServerEvent};
use crate::api::models::{Conversation, ConversationDetail, ConversationPatch, Message, Patch};
use crate::error::{ApiError, ApiResult, ApiResultExt};
use crate::lifetime::Lifetime;
use crate::sync::{ConversationFilter, DetailView, SyncedCollection, Ticket};
use crate::transport::{SocketClient, Subscription};
use crate::ui::layout::{PaneLayout, Selection};
use crate::utils::lock;

pub const PAGE_SIZE: u32 = 20;

/// State behind the unified inbox page: the conversation list, the open
/// conversation, pane layout and typing indicators.
#[derive(Debug)]
pub struct Inbox {
    conversations: SyncedCollection<Conversation>,
    filter: ConversationFilter,
    detail: DetailView<ConversationDetail>,
    selection: Selection,
    layout: PaneLayout,
    typing: HashSet<String>,
    error: Option<String>,
    detail_error: Option<String>,
}

impl Inbox {
    pub fn new(width: u32) -> Self {
        Self {
            conversations: SyncedCollection::new(),
            filter: ConversationFilter::default(),
            detail: DetailView::new(),
            selection: Selection::default(),
            layout: PaneLayout::new(width),
            typing: HashSet::new(),
            error: None,
            detail_error: None,
        }
    }

    pub fn conversations(&self) -> &SyncedCollection<Conversation> {
        &self.conversations
    }

    pub fn conversations_mut(&mut self) -> &mut SyncedCollection<Conversation> {
        &mut self.conversations
    }

    pub fn visible_conversations(&self) -> Vec<&Conversation> {
        self.conversations.view(|c| self.filter.matches(c))
    }

    pub fn filter(&self) -> &ConversationFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: ConversationFilter) {
        self.filter = filter;
    }

    pub fn detail(&self) -> Option<&ConversationDetail> {
        self.detail.detail()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selection.get()
    }

    pub fn layout(&self) -> &PaneLayout {
        &self.layout
    }

    pub fn layout_mut(&mut self) -> &mut PaneLayout {
        &mut self.layout
    }

    pub fn is_typing(&self, conversation_id: &str) -> bool {
        self.typing.contains(conversation_id)
    }

    /// Last load failure, for an error banner with a retry button.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Why the open conversation failed to load. Opening it again retries.
    pub fn detail_error(&self) -> Option<&str> {
        self.detail_error.as_deref()
    }

    pub fn is_detail_loading(&self) -> bool {
        self.detail.is_loading() && self.detail_error.is_none()
    }

    /// Opens a conversation. Returns the previously open id (if it changed)
    /// and a ticket for the detail fetch.
    pub fn select(&mut self, id: &str) -> (Option<String>, Ticket) {
        let previous = self.selection.set(id);
        self.detail_error = None;
        self.layout.on_select();
        (previous, self.detail.select(id))
    }

    pub fn back(&mut self) {
        self.layout.back();
    }

    pub fn resolve_detail(&mut self, ticket: &Ticket, detail: ConversationDetail) -> bool {
        self.detail.resolve(ticket, detail)
    }

    pub fn confirm_sent(&mut self, message: Message) -> bool {
        self.touch_preview(&message);
        self.detail.confirm_sent(message)
    }

    fn touch_preview(&mut self, message: &Message) {
        let patch = ConversationPatch {
            id: message.conversation_id.clone(),
            last_message: Some(message.content.clone()),
            updated_at: message.timestamp,
            ..Default::default()
        };
        self.conversations.apply_patch(&patch);
    }

    fn patch_open(&mut self, patch: &ConversationPatch) {
        if let Some(open) = self.detail.detail_mut() {
            if open.conversation.id == patch.id {
                patch.apply_to(&mut open.conversation);
            }
        }
    }

    /// Routes one pushed event into the page state.
    pub fn handle_event(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::NewConversation(c) => {
                self.conversations.apply_created(c.clone());
                true
            }
            ServerEvent::ConversationUpdated(patch) => {
                self.patch_open(patch);
                self.conversations.apply_patch(patch)
            }
            ServerEvent::NewMessage(m) => {
                self.typing.remove(&m.conversation_id);
                self.touch_preview(m);
                let is_open = self.selection.get() == Some(m.conversation_id.as_str());
                if !is_open {
                    let unread = ConversationPatch {
                        id: m.conversation_id.clone(),
                        unread: Some(true),
                        ..Default::default()
                    };
                    self.conversations.apply_patch(&unread);
                }
                self.detail.apply_incoming(m.clone())
            }
            ServerEvent::TypingStart(t) => self.typing.insert(t.conversation_id.clone()),
            ServerEvent::TypingStop(t) => self.typing.remove(&t.conversation_id),
            ServerEvent::BulkMessageCreated(_) | ServerEvent::BulkMessageUpdated(_) => false,
        }
    }
}

/// Listener registrations feeding a shared [`Inbox`]. Dropping it detaches
/// every listener.
pub struct InboxBinding {
    subscriptions: Vec<Subscription>,
}

impl InboxBinding {
    pub fn attach(state: &Arc<Mutex<Inbox>>, socket: &SocketClient) -> Self {
        let kinds = [
            EventKind::NewConversation,
            EventKind::ConversationUpdated,
            EventKind::NewMessage,
            EventKind::TypingStart,
            EventKind::TypingStop,
        ];
        let subscriptions = kinds
            .into_iter()
            .map(|kind| {
                let state = state.clone();
                socket.subscribe(kind, move |ev| {
                    lock(&state).handle_event(ev);
                })
            })
            .collect();
        Self { subscriptions }
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn detach(self) {
        drop(self);
    }
}

/// Drives an [`Inbox`]: fetches through the API, joins rooms on the socket,
/// and discards late results once unmounted.
pub struct InboxController {
    api: ApiClient,
    socket: Arc<SocketClient>,
    state: Arc<Mutex<Inbox>>,
    lifetime: Lifetime,
    binding: Option<InboxBinding>,
}

impl InboxController {
    pub fn mount(api: ApiClient, socket: Arc<SocketClient>, width: u32) -> Self {
        let state = Arc::new(Mutex::new(Inbox::new(width)));
        let binding = InboxBinding::attach(&state, &socket);
        Self {
            api,
            socket,
            state,
            lifetime: Lifetime::new(),
            binding: Some(binding),
        }
    }

    pub fn state(&self) -> Arc<Mutex<Inbox>> {
        self.state.clone()
    }

    pub async fn load(&self) -> ApiResult<()> {
        match self.lifetime.run(self.api.conversations(1, PAGE_SIZE)).await {
            Ok(page) => {
                let mut inbox = lock(&self.state);
                inbox.conversations.load_page(page);
                inbox.error = None;
                Ok(())
            }
            Err(ApiError::Cancelled) => Err(ApiError::Cancelled),
            Err(e) => {
                lock(&self.state).error = Some(e.user_message());
                Err(e)
            }
        }
    }

    pub async fn load_more(&self) -> ApiResult<bool> {
        let next = {
            let inbox = lock(&self.state);
            if !inbox.conversations.has_more() {
                return Ok(false);
            }
            inbox.conversations.page() + 1
        };
        let page = self.lifetime.run(self.api.conversations(next, PAGE_SIZE)).await?;
        lock(&self.state).conversations.append_page(page);
        Ok(true)
    }

    pub async fn open_conversation(&self, id: &str) -> ApiResult<()> {
        let (previous, ticket) = lock(&self.state).select(id);
        if let Some(prev) = previous {
            self.socket.leave_conversation(&prev);
        }
        self.socket.join_conversation(id);

        let detail = match self.lifetime.run(self.api.conversation(id)).await {
            Ok(detail) => detail,
            Err(ApiError::Cancelled) => return Err(ApiError::Cancelled),
            Err(e) => {
                let mut inbox = lock(&self.state);
                if inbox.detail.is_current(&ticket) {
                    inbox.detail_error = Some(e.user_message());
                }
                return Err(e);
            }
        };
        let unread = detail.conversation.unread;
        if !lock(&self.state).resolve_detail(&ticket, detail) {
            return Ok(());
        }
        if unread {
            let marked = self.lifetime.run(self.api.mark_read(id)).await.map(|_| true);
            if marked.or_fallback("mark read", false) {
                let patch = ConversationPatch {
                    id: id.to_string(),
                    unread: Some(false),
                    ..Default::default()
                };
                lock(&self.state).handle_event(&ServerEvent::ConversationUpdated(patch));
            }
        }
        Ok(())
    }

    /// Sends a reply to the open conversation. The message is shown once the
    /// backend has saved it.
    pub async fn send_message(&self, content: &str) -> ApiResult<Message> {
        let id = lock(&self.state)
            .selected()
            .map(str::to_string)
            .ok_or_else(|| ApiError::Config("no conversation selected".into()))?;
        self.socket.stop_typing(&id);
        let message = self.lifetime.run(self.api.send_message(&id, content)).await?;
        lock(&self.state).confirm_sent(message.clone());
        Ok(message)
    }

    pub async fn set_status(&self, id: &str, status: &str) -> ApiResult<()> {
        let updated = self.lifetime.run(self.api.update_conversation_status(id, status)).await?;
        let patch = ConversationPatch {
            id: updated.id.clone(),
            status: updated.status.clone(),
            ..Default::default()
        };
        lock(&self.state).handle_event(&ServerEvent::ConversationUpdated(patch));
        Ok(())
    }

    pub fn typing(&self, active: bool) {
        let Some(id) = lock(&self.state).selected().map(str::to_string) else {
            return;
        };
        if active {
            self.socket.start_typing(&id);
        } else {
            self.socket.stop_typing(&id);
        }
    }

    /// Ends in-flight fetches, leaves the open room and detaches listeners.
    pub fn unmount(&mut self) {
        self.lifetime.end();
        if let Some(id) = lock(&self.state).selected() {
            self.socket.leave_conversation(id);
        }
        self.binding.take();
    }
}

impl Drop for InboxController {
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

    fn conv(id: &str) -> Conversation {
        serde_json::from_value(json!({ "id": id, "customer": { "name": id } })).unwrap()
    }

    fn msg(id: &str, conv: &str) -> Message {
        serde_json::from_value(json!({
            "id": id, "conversationId": conv, "sender": "customer", "content": id
        }))
        .unwrap()
    }

    fn socket() -> Arc<SocketClient> {
        Arc::new(SocketClient::new("http://localhost:1", None, ReconnectPolicy::default()).unwrap())
    }

    #[test]
    fn events_route_into_list_and_open_detail() {
        let mut inbox = Inbox::new(1280);
        inbox.conversations_mut().load(vec![conv("a"), conv("b")], None);
        let (_, ticket) = inbox.select("a");
        inbox.resolve_detail(&ticket, ConversationDetail { conversation: conv("a"), messages: vec![] });

        assert!(inbox.handle_event(&ServerEvent::NewMessage(msg("m1", "a"))));
        assert!(!inbox.handle_event(&ServerEvent::NewMessage(msg("m2", "b"))));

        assert_eq!(inbox.detail().unwrap().messages.len(), 1);
        let b = inbox.conversations().get("b").unwrap();
        assert!(b.unread);
        assert_eq!(b.last_message.as_deref(), Some("m2"));
        assert!(!inbox.conversations().get("a").unwrap().unread);
        // Positions are stable.
        let ids: Vec<_> = inbox.conversations().items().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn filter_hides_but_never_drops_pushed_updates() {
        let mut inbox = Inbox::new(1280);
        inbox.conversations_mut().load(vec![conv("a"), conv("b")], None);
        inbox.set_filter(ConversationFilter { unread_only: true, ..Default::default() });
        assert!(inbox.visible_conversations().is_empty());

        inbox.handle_event(&ServerEvent::NewMessage(msg("m1", "b")));
        let visible: Vec<_> = inbox.visible_conversations().iter().map(|c| c.id.clone()).collect();
        assert_eq!(visible, vec!["b"]);

        inbox.set_filter(ConversationFilter::default());
        assert_eq!(inbox.visible_conversations().len(), 2);
    }

    #[test]
    fn status_patch_reaches_open_detail() {
        let mut inbox = Inbox::new(1280);
        inbox.conversations_mut().load(vec![conv("a")], None);
        let (_, ticket) = inbox.select("a");
        inbox.resolve_detail(&ticket, ConversationDetail { conversation: conv("a"), messages: vec![msg("m1", "a")] });

        let patch = ConversationPatch { id: "a".into(), status: Some("closed".into()), ..Default::default() };
        inbox.handle_event(&ServerEvent::ConversationUpdated(patch));
        let d = inbox.detail().unwrap();
        assert_eq!(d.conversation.status.as_deref(), Some("closed"));
        assert_eq!(d.messages.len(), 1);
    }

    #[test]
    fn detached_binding_stops_state_changes() {
        let socket = socket();
        let state = Arc::new(Mutex::new(Inbox::new(400)));
        let binding = InboxBinding::attach(&state, &socket);
        assert_eq!(binding.len(), 5);

        socket.listeners().dispatch(&ServerEvent::NewConversation(conv("x")));
        assert_eq!(lock(&state).conversations().len(), 1);

        binding.detach();
        let fired = socket.listeners().dispatch(&ServerEvent::NewConversation(conv("y")));
        assert_eq!(fired, 0);
        assert_eq!(lock(&state).conversations().len(), 1);
    }

    #[tokio::test]
    async fn open_fetches_detail_and_marks_read() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/conversations/a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "conversation": { "_id": "a", "unread": true },
                "messages": [{ "_id": "m1", "conversationId": "a", "sender": "customer", "content": "hi" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/conversations/a/read"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(&format!("{}/api/v1", server.uri()), Some("tok".into()));
        let socket = socket();
        let controller = InboxController::mount(api, socket.clone(), 400);
        {
            let state = controller.state();
            let mut inbox = lock(&state);
            let mut a = conv("a");
            a.unread = true;
            inbox.conversations_mut().load(vec![a], None);
        }

        controller.open_conversation("a").await.unwrap();

        let state = controller.state();
        let inbox = lock(&state);
        assert_eq!(inbox.detail().unwrap().messages.len(), 1);
        assert!(!inbox.conversations().get("a").unwrap().unread);
        assert!(inbox.layout().detail_visible());
        assert_eq!(socket.joined_rooms(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn failed_open_reports_error_instead_of_loading() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/conversations/a"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "Database unavailable" })))
            .mount(&server)
            .await;

        let controller = InboxController::mount(ApiClient::new(&server.uri(), None), socket(), 400);
        let err = controller.open_conversation("a").await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 500, .. }));

        let state = controller.state();
        {
            let inbox = lock(&state);
            assert_eq!(inbox.detail_error(), Some("Database unavailable"));
            assert!(!inbox.is_detail_loading());
            assert!(inbox.detail().is_none());
            assert!(inbox.error().is_none());
        }

        // Choosing another conversation clears the failure.
        lock(&state).select("b");
        assert!(lock(&state).detail_error().is_none());
        assert!(lock(&state).is_detail_loading());
    }

    #[tokio::test]
    async fn unmount_leaves_room_and_detaches() {
        let api = ApiClient::new("http://localhost:1/api/v1", None);
        let socket = socket();
        let mut controller = InboxController::mount(api, socket.clone(), 400);
        lock(&controller.state()).select("a");
        socket.join_conversation("a");

        controller.unmount();
        assert!(socket.joined_rooms().is_empty());
        assert_eq!(socket.listeners().count(EventKind::NewMessage), 0);
    }
}
