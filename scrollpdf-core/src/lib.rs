use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod layout;
pub mod observe;
pub mod prefs;
pub mod search;
pub mod store;
pub mod tracker;
pub mod tree;
pub mod viewer;

pub use config::{Config, LayoutSettings};
pub use layout::{PageExtent, PageLayout, Viewport};
pub use observe::{IntersectionEntry, IntersectionObserver, ObserverOptions, VisibilityHub};
pub use prefs::{Alignment, ViewerPreferences, ZoomMode, ZoomStep};
pub use search::{Match, SearchEngine};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use tracker::ViewportTracker;
pub use tree::{Inline, Node, NodeId, NodeRole, RenderTree};
pub use viewer::{Command, Viewer, ViewerEvent};

/// The name reading positions are stored under.
pub fn file_name_for_path(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub file_name: String,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderRequest {
    pub page_index: usize,
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            page_index: 0,
            scale: 1.0,
        }
    }
}

/// One line of the rendered text layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    /// Vertical position inside the page, 0.0 (top) to 1.0 (bottom).
    pub top: f32,
}

#[derive(Debug, Clone)]
pub struct PageSurface {
    pub page_index: usize,
    /// Page size in points, already multiplied by the requested scale.
    pub size: PageSize,
    pub lines: Vec<TextLine>,
}

pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;
    fn render_page(&self, request: RenderRequest) -> Result<PageSurface>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>>;
}
