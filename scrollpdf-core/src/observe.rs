//! Intersection observation of page top markers.
//!
//! A [`VisibilityHub`] stands in for the viewport: every time the layout or
//! scroll position changes it is asked to [`update`](VisibilityHub::update),
//! and each live [`IntersectionObserver`] receives an [`IntersectionEntry`]
//! for every target whose in/out state flipped (or, on the first pass, for
//! every target). The hub only keeps weak references, so an observer that is
//! dropped or disconnected can never deliver another record.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::layout::{PageLayout, Viewport};
use crate::tree::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverOptions {
    /// Minimum visible fraction of the target for it to count as intersecting.
    pub threshold: f32,
    /// Units added above and below the viewport before measuring.
    pub root_margin: f32,
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            root_margin: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    pub page_number: u32,
    pub is_intersecting: bool,
}

#[derive(Debug)]
struct Target {
    node: NodeId,
    page_number: u32,
    last: Option<bool>,
}

#[derive(Debug)]
struct ObserverSlot {
    options: ObserverOptions,
    targets: Vec<Target>,
    records: Vec<IntersectionEntry>,
}

impl ObserverSlot {
    fn measure(&mut self, layout: &PageLayout, viewport: &Viewport) -> usize {
        let mut queued = 0;
        for target in &mut self.targets {
            let ratio = layout
                .extent(target.page_number)
                .map(|extent| viewport.intersection_ratio(extent, self.options.root_margin))
                .unwrap_or(0.0);
            let is_intersecting = ratio > 0.0 && ratio >= self.options.threshold;
            if target.last == Some(is_intersecting) {
                continue;
            }
            target.last = Some(is_intersecting);
            self.records.push(IntersectionEntry {
                page_number: target.page_number,
                is_intersecting,
            });
            queued += 1;
        }
        queued
    }
}

#[derive(Debug, Clone, Default)]
pub struct VisibilityHub {
    observers: Arc<Mutex<Vec<Weak<Mutex<ObserverSlot>>>>>,
}

impl VisibilityHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observer(&self, options: ObserverOptions) -> IntersectionObserver {
        let slot = Arc::new(Mutex::new(ObserverSlot {
            options,
            targets: Vec::new(),
            records: Vec::new(),
        }));
        self.observers.lock().push(Arc::downgrade(&slot));
        IntersectionObserver { slot }
    }

    /// Observers that are still alive and watching at least one target.
    pub fn active_observers(&self) -> usize {
        let mut observers = self.observers.lock();
        observers.retain(|weak| weak.strong_count() > 0);
        observers
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|slot| !slot.lock().targets.is_empty())
            .count()
    }

    /// Re-measures every observed target and queues records for the ones whose
    /// state changed. Returns the number of queued records.
    pub fn update(&self, layout: &PageLayout, viewport: &Viewport) -> usize {
        let live: Vec<Arc<Mutex<ObserverSlot>>> = {
            let mut observers = self.observers.lock();
            observers.retain(|weak| weak.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        let queued = live
            .iter()
            .map(|slot| slot.lock().measure(layout, viewport))
            .sum();
        trace!(queued, offset = viewport.offset(), "visibility pass");
        queued
    }
}

#[derive(Debug)]
pub struct IntersectionObserver {
    slot: Arc<Mutex<ObserverSlot>>,
}

impl IntersectionObserver {
    pub fn observe(&self, target: NodeId, page_number: u32) {
        let mut slot = self.slot.lock();
        if slot.targets.iter().any(|existing| existing.node == target) {
            return;
        }
        slot.targets.push(Target {
            node: target,
            page_number,
            last: None,
        });
    }

    pub fn take_records(&self) -> Vec<IntersectionEntry> {
        std::mem::take(&mut self.slot.lock().records)
    }

    pub fn disconnect(&self) {
        let mut slot = self.slot.lock();
        slot.targets.clear();
        slot.records.clear();
    }
}
