use crate::api::models::{ConversationDetail, Message, Record};

/// Full record for a detail pane that grows as child items arrive.
pub trait Detail {
    type Item: Record;

    fn parent_id(&self) -> &str;
    fn items(&self) -> &[Self::Item];
    fn push(&mut self, item: Self::Item);
    /// The parent id an incoming item belongs to.
    fn item_parent(item: &Self::Item) -> &str;
}

impl Detail for ConversationDetail {
    type Item = Message;

    fn parent_id(&self) -> &str {
        &self.conversation.id
    }

    fn items(&self) -> &[Message] {
        &self.messages
    }

    fn push(&mut self, item: Message) {
        if let Some(ts) = item.timestamp {
            self.conversation.updated_at = Some(ts);
        }
        self.conversation.last_message = Some(item.content.clone());
        self.messages.push(item);
    }

    fn item_parent(item: &Message) -> &str {
        &item.conversation_id
    }
}

/// Proof of which selection a detail fetch was started for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    id: String,
    generation: u64,
}

impl Ticket {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// The currently open record and its loaded detail.
///
/// Detail is only shown for the selection it was fetched for: changing the
/// selection clears it at once and late results for older selections are
/// discarded.
#[derive(Debug)]
pub struct DetailView<D: Detail> {
    selected: Option<String>,
    generation: u64,
    detail: Option<D>,
}

impl<D: Detail> Default for DetailView<D> {
    fn default() -> Self {
        Self {
            selected: None,
            generation: 0,
            detail: None,
        }
    }
}

impl<D: Detail> DetailView<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn detail(&self) -> Option<&D> {
        self.detail.as_ref()
    }

    pub fn detail_mut(&mut self) -> Option<&mut D> {
        self.detail.as_mut()
    }

    pub fn is_loading(&self) -> bool {
        self.selected.is_some() && self.detail.is_none()
    }

    pub fn select(&mut self, id: &str) -> Ticket {
        self.generation += 1;
        self.selected = Some(id.to_string());
        self.detail = None;
        Ticket {
            id: id.to_string(),
            generation: self.generation,
        }
    }

    pub fn clear(&mut self) {
        self.generation += 1;
        self.selected = None;
        self.detail = None;
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation && self.selected.as_deref() == Some(ticket.id.as_str())
    }

    /// Installs a fetched detail if its ticket is still current.
    pub fn resolve(&mut self, ticket: &Ticket, detail: D) -> bool {
        if !self.is_current(ticket) {
            log::debug!("discarding stale detail for {}", ticket.id);
            return false;
        }
        if detail.parent_id() != ticket.id {
            log::warn!("detail for {} returned for {}", detail.parent_id(), ticket.id);
            return false;
        }
        self.detail = Some(detail);
        true
    }

    /// A pushed item. Only appended when it belongs to the open record and
    /// isn't already shown.
    pub fn apply_incoming(&mut self, item: D::Item) -> bool {
        let Some(open) = self.selected.as_deref() else {
            return false;
        };
        if D::item_parent(&item) != open {
            return false;
        }
        let Some(detail) = self.detail.as_mut() else {
            // Still loading; the fetch will include it.
            return false;
        };
        if detail.items().iter().any(|i| i.id() == item.id()) {
            return false;
        }
        detail.push(item);
        true
    }

    /// An item the backend has confirmed as saved.
    pub fn confirm_sent(&mut self, item: D::Item) -> bool {
        self.apply_incoming(item)
    }
}
