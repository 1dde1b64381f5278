use std::collections::HashSet;

use crate::api::models::{Page, Patch, Record};

/// Ordered, id-unique base collection for a list view, newest first.
///
/// Server pushes are applied here; filters never touch it and only ever
/// produce derived views through [`SyncedCollection::view`].
#[derive(Debug, Clone)]
pub struct SyncedCollection<T: Record> {
    items: Vec<T>,
    page: u32,
    total_pages: Option<u32>,
    loaded: bool,
}

impl<T: Record> Default for SyncedCollection<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            page: 0,
            total_pages: None,
            loaded: false,
        }
    }
}

impl<T: Record> SyncedCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|i| i.id() == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|i| i.id() == id)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    pub fn has_more(&self) -> bool {
        self.total_pages.is_some_and(|total| self.page < total)
    }

    /// Replaces the base collection with a fresh fetch.
    ///
    /// Records that arrived through create events but are not part of the
    /// fetch stay in front of it, since the fetch may predate them. Ids are
    /// unique afterwards; the fetched copy of a record wins.
    pub fn load(&mut self, fetched: Vec<T>, total_pages: Option<u32>) {
        let fetched = dedup(fetched);
        let fetched_ids: HashSet<&str> = fetched.iter().map(|i| i.id()).collect();
        let mut merged: Vec<T> = if self.loaded {
            Vec::new()
        } else {
            self.items
                .iter()
                .filter(|i| !fetched_ids.contains(i.id()))
                .cloned()
                .collect()
        };
        merged.extend(fetched);
        self.items = merged;
        self.page = 1;
        self.total_pages = total_pages;
        self.loaded = true;
    }

    pub fn load_page(&mut self, page: Page<T>) {
        self.load(page.items, page.total_pages);
        self.page = page.page.max(1);
    }

    /// Appends a further page ("load more"), skipping ids already held.
    pub fn append_page(&mut self, page: Page<T>) {
        let mut seen: HashSet<String> = self.items.iter().map(|i| i.id().to_string()).collect();
        for item in page.items {
            if seen.insert(item.id().to_string()) {
                self.items.push(item);
            }
        }
        self.page = page.page;
        if page.total_pages.is_some() {
            self.total_pages = page.total_pages;
        }
    }

    /// A create event: prepend, or replace in place if the id is known.
    pub fn apply_created(&mut self, item: T) {
        match self.position(item.id()) {
            Some(idx) => {
                log::debug!("create for known id {}; replacing", item.id());
                self.items[idx] = item;
            }
            None => self.items.insert(0, item),
        }
    }

    /// An update event: replace in place. Unknown ids are dropped.
    pub fn apply_updated(&mut self, item: T) -> bool {
        match self.position(item.id()) {
            Some(idx) => {
                self.items[idx] = item;
                true
            }
            None => {
                log::debug!("update for unknown id {}; dropped", item.id());
                false
            }
        }
    }

    /// A partial update event: merge in place. Unknown ids are dropped.
    pub fn apply_patch<P>(&mut self, patch: &P) -> bool
    where
        P: Patch<Target = T>,
    {
        match self.items.iter_mut().find(|i| i.id() == patch.id()) {
            Some(item) => {
                patch.apply_to(item);
                true
            }
            None => {
                log::debug!("patch for unknown id {}; dropped", patch.id());
                false
            }
        }
    }

    /// Local removal after a confirmed delete.
    pub fn remove(&mut self, id: &str) -> Option<T> {
        let idx = self.position(id)?;
        Some(self.items.remove(idx))
    }

    /// Derived view: the records matching `keep`, in base order.
    pub fn view<F>(&self, keep: F) -> Vec<&T>
    where
        F: Fn(&T) -> bool,
    {
        self.items.iter().filter(|i| keep(i)).collect()
    }
}

fn dedup<T: Record>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|i| seen.insert(i.id().to_string()))
        .collect()
}
