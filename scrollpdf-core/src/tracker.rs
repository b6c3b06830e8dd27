use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::observe::{IntersectionObserver, ObserverOptions, VisibilityHub};
use crate::store::KeyValueStore;
use crate::tree::RenderTree;

/// Keeps the set of pages whose top marker is in view and derives the current
/// page from it.
pub struct ViewportTracker {
    hub: VisibilityHub,
    store: Arc<dyn KeyValueStore>,
    options: ObserverOptions,
    observers: Vec<IntersectionObserver>,
    visible: BTreeSet<u32>,
    document: Option<String>,
}

impl ViewportTracker {
    pub fn new(hub: VisibilityHub, store: Arc<dyn KeyValueStore>, options: ObserverOptions) -> Self {
        Self {
            hub,
            store,
            options,
            observers: Vec::new(),
            visible: BTreeSet::new(),
            document: None,
        }
    }

    /// Starts observing every top marker of `tree`. Observers from a previous
    /// document are released first.
    pub fn attach(&mut self, file_name: &str, tree: &RenderTree) {
        self.release();
        for (marker, page_number) in tree.top_markers() {
            let observer = self.hub.observer(self.options);
            observer.observe(marker, page_number);
            self.observers.push(observer);
        }
        self.document = Some(file_name.to_owned());
        debug!(
            document = file_name,
            observers = self.observers.len(),
            "attached page observers"
        );
    }

    pub fn release(&mut self) {
        for observer in self.observers.drain(..) {
            observer.disconnect();
        }
        self.visible.clear();
        self.document = None;
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Applies a single transition and persists the top page if membership
    /// changed. Returns true when it did.
    pub fn on_intersect(&mut self, page_number: u32, is_intersecting: bool) -> bool {
        let changed = self.apply(page_number, is_intersecting);
        if changed {
            self.persist_position();
        }
        changed
    }

    fn apply(&mut self, page_number: u32, is_intersecting: bool) -> bool {
        if is_intersecting {
            self.visible.insert(page_number)
        } else {
            self.visible.remove(&page_number)
        }
    }

    /// Applies every queued intersection record as one batch and persists the
    /// resulting top page if the set changed.
    pub fn process_records(&mut self) -> bool {
        let records: Vec<_> = self
            .observers
            .iter()
            .flat_map(IntersectionObserver::take_records)
            .collect();
        let mut changed = false;
        for entry in records {
            changed |= self.apply(entry.page_number, entry.is_intersecting);
        }
        if changed {
            debug!(visible = ?self.visible, "visible pages changed");
            self.persist_position();
        }
        changed
    }

    pub fn current_page(&self) -> u32 {
        self.visible.first().copied().unwrap_or(0)
    }

    pub fn visible_pages(&self) -> &BTreeSet<u32> {
        &self.visible
    }

    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    fn persist_position(&self) {
        let (Some(document), Some(top)) = (self.document.as_deref(), self.visible.first()) else {
            return;
        };
        if let Err(err) = self.store.set(document, &top.to_string()) {
            warn!(?err, document, "failed to persist reading position");
        }
    }

    /// The stored page worth offering to jump back to, if any. Page 1, values
    /// that do not parse and pages beyond `page_count` are ignored.
    pub fn resume_target(&self, page_count: usize) -> Option<u32> {
        let document = self.document.as_deref()?;
        let stored = match self.store.get(document) {
            Ok(value) => value?,
            Err(err) => {
                warn!(?err, document, "failed to read reading position");
                return None;
            }
        };
        let page = stored.trim().parse::<u32>().ok()?;
        (page > 1 && (page as usize) <= page_count).then_some(page)
    }
}
