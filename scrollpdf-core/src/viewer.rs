use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::layout::{PageLayout, Viewport};
use crate::observe::VisibilityHub;
use crate::prefs::ViewerPreferences;
use crate::search::{Match, SearchEngine};
use crate::store::KeyValueStore;
use crate::tracker::ViewportTracker;
use crate::tree::RenderTree;
use crate::{
    file_name_for_path, DocumentBackend, DocumentInfo, DocumentProvider, PageSize, RenderRequest,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ScrollLines { count: isize },
    ScrollPages { count: isize },
    ScrollToTop,
    ScrollToBottom,
    GotoPage { page: u32 },
    ZoomIn,
    ZoomOut,
    ToggleAlignment,
    EditQuery { query: String },
    SubmitSearch { query: String },
    NextMatch,
    PrevMatch,
    ClearSearch,
    ResizeViewport { height: f32 },
    ResolveResume { accept: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    DocumentLoaded { file_name: String, page_count: usize },
    LoadFailed { file_name: String, reason: String },
    ResumePrompt { file_name: String, page: u32 },
    CurrentPageChanged { page: u32 },
    SearchUpdated { current: usize, total: usize },
    RedrawNeeded,
}

struct LoadedDocument {
    info: DocumentInfo,
    /// Page sizes in points at scale 1.0.
    base_sizes: Vec<PageSize>,
}

/// The viewing session: one document at a time, its render tree and layout,
/// the viewport over it, and the tracker and search engine working on them.
pub struct Viewer {
    config: Config,
    store: Arc<dyn KeyValueStore>,
    hub: VisibilityHub,
    tracker: ViewportTracker,
    search: SearchEngine,
    prefs: ViewerPreferences,
    tree: RenderTree,
    layout: PageLayout,
    viewport: Viewport,
    document: Option<LoadedDocument>,
    pending_resume: Option<u32>,
    events: Arc<Mutex<Vec<ViewerEvent>>>,
}

impl Viewer {
    pub fn new(config: Config, store: Arc<dyn KeyValueStore>, viewport_height: f32) -> Self {
        let prefs = ViewerPreferences::load(store.as_ref());
        let hub = VisibilityHub::new();
        let tracker = ViewportTracker::new(hub.clone(), Arc::clone(&store), config.observer);
        Self {
            config,
            store,
            hub,
            tracker,
            search: SearchEngine::new(),
            prefs,
            tree: RenderTree::new(),
            layout: PageLayout::default(),
            viewport: Viewport::new(viewport_height),
            document: None,
            pending_resume: None,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<ViewerEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn drain_events(&self) -> Vec<ViewerEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    fn emit(&self, event: ViewerEvent) {
        self.events.lock().push(event);
    }

    #[instrument(skip(self, provider))]
    pub async fn open_with<P: DocumentProvider + ?Sized>(
        &mut self,
        provider: &P,
        path: PathBuf,
    ) -> Result<()> {
        self.unload();
        match provider.open(&path).await {
            Ok(backend) => self.load(backend),
            Err(err) => {
                let file_name = file_name_for_path(&path);
                warn!(?err, file = %file_name, "document failed to open");
                self.emit(ViewerEvent::LoadFailed {
                    file_name,
                    reason: format!("{err:#}"),
                });
                Err(err.context(format!("failed to open {:?}", path)))
            }
        }
    }

    /// Replaces the current document with the one behind `backend`.
    pub fn load(&mut self, backend: Arc<dyn DocumentBackend>) -> Result<()> {
        self.unload();
        let info = backend.info().clone();
        let scale = self.prefs.scale;

        let surfaces = (0..info.page_count)
            .map(|page_index| backend.render_page(RenderRequest { page_index, scale }))
            .collect::<Result<Vec<_>>>();
        let surfaces = match surfaces {
            Ok(surfaces) => surfaces,
            Err(err) => {
                warn!(?err, file = %info.file_name, "document failed to render");
                self.emit(ViewerEvent::LoadFailed {
                    file_name: info.file_name.clone(),
                    reason: format!("{err:#}"),
                });
                return Err(err);
            }
        };

        let base_sizes = surfaces
            .iter()
            .map(|surface| PageSize {
                width: surface.size.width / scale,
                height: surface.size.height / scale,
            })
            .collect();
        self.tree = RenderTree::from_surfaces(&surfaces);
        self.document = Some(LoadedDocument {
            info: info.clone(),
            base_sizes,
        });
        self.relayout();
        self.viewport.scroll_to(0.0, &self.layout);

        self.tracker.attach(&info.file_name, &self.tree);
        // Read before the first visibility pass overwrites it with page 1.
        self.pending_resume = self.tracker.resume_target(info.page_count);

        info!(
            file = %info.file_name,
            pages = info.page_count,
            resume = ?self.pending_resume,
            "document loaded"
        );
        self.emit(ViewerEvent::DocumentLoaded {
            file_name: info.file_name.clone(),
            page_count: info.page_count,
        });
        if let Some(page) = self.pending_resume {
            self.emit(ViewerEvent::ResumePrompt {
                file_name: info.file_name,
                page,
            });
        }
        self.refresh_visibility();
        self.emit(ViewerEvent::RedrawNeeded);
        Ok(())
    }

    fn unload(&mut self) {
        self.tracker.release();
        self.search = SearchEngine::new();
        self.tree = RenderTree::new();
        self.layout = PageLayout::default();
        self.document = None;
        self.pending_resume = None;
        self.viewport.scroll_to(0.0, &self.layout);
    }

    fn relayout(&mut self) {
        let Some(doc) = self.document.as_ref() else {
            self.layout = PageLayout::default();
            return;
        };
        let scale = self.prefs.scale;
        let settings = &self.config.layout;
        let sizes: Vec<PageSize> = doc
            .base_sizes
            .iter()
            .map(|size| PageSize {
                width: (size.width * scale / settings.points_per_column).round(),
                height: (size.height * scale / settings.points_per_row).round(),
            })
            .collect();
        self.layout = PageLayout::new(&sizes, settings.page_gap);
    }

    /// Runs a visibility pass and feeds the records to the tracker.
    fn refresh_visibility(&mut self) -> bool {
        let before = self.tracker.current_page();
        self.hub.update(&self.layout, &self.viewport);
        let changed = self.tracker.process_records();
        let page = self.tracker.current_page();
        if page != before {
            self.emit(ViewerEvent::CurrentPageChanged { page });
        }
        changed
    }

    fn scroll_to(&mut self, offset: f32) {
        if self.viewport.scroll_to(offset, &self.layout) {
            self.refresh_visibility();
            self.emit(ViewerEvent::RedrawNeeded);
        }
    }

    fn reveal_page(&mut self, page: u32) {
        let Some(extent) = self.layout.extent(page).copied() else {
            return;
        };
        self.scroll_to(extent.top);
    }

    fn reveal_match(&mut self, found: Option<Match>) {
        if let Some(page) = found.and_then(|found| found.page) {
            self.reveal_page(page);
        }
        self.emit(ViewerEvent::SearchUpdated {
            current: self.search.current(),
            total: self.search.total(),
        });
        self.emit(ViewerEvent::RedrawNeeded);
    }

    /// Rescales the layout and keeps the viewport at the same relative
    /// position. The tree, and with it any highlights, is left alone.
    fn zoom(&mut self, zoom_in: bool) {
        if !self
            .prefs
            .zoom(self.store.as_ref(), &self.config.zoom, zoom_in)
        {
            return;
        }
        let previous_height = self.layout.total_height();
        let anchor = if previous_height > 0.0 {
            self.viewport.offset() / previous_height
        } else {
            0.0
        };
        self.relayout();
        self.viewport
            .scroll_to(anchor * self.layout.total_height(), &self.layout);
        self.refresh_visibility();
        self.emit(ViewerEvent::RedrawNeeded);
    }

    pub fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::ScrollLines { count } => {
                let delta = count as f32 * self.config.scroll_step;
                self.scroll_to(self.viewport.offset() + delta);
            }
            Command::ScrollPages { count } => {
                let delta = count as f32 * self.viewport.height();
                self.scroll_to(self.viewport.offset() + delta);
            }
            Command::ScrollToTop => self.scroll_to(0.0),
            Command::ScrollToBottom => {
                let bottom = self.viewport.max_offset(&self.layout);
                self.scroll_to(bottom);
            }
            Command::GotoPage { page } => {
                let count = self.layout.page_count() as u32;
                if count > 0 {
                    self.reveal_page(page.clamp(1, count));
                }
            }
            Command::ZoomIn => self.zoom(true),
            Command::ZoomOut => self.zoom(false),
            Command::ToggleAlignment => {
                self.prefs.toggle_align(self.store.as_ref());
                self.emit(ViewerEvent::RedrawNeeded);
            }
            Command::EditQuery { query } => {
                self.search.set_query(&mut self.tree, &query);
                self.emit(ViewerEvent::SearchUpdated {
                    current: self.search.current(),
                    total: self.search.total(),
                });
            }
            Command::SubmitSearch { query } => {
                let found = self.search.submit(&mut self.tree, &query);
                self.reveal_match(found);
            }
            Command::NextMatch => {
                let found = self.search.next_match(&mut self.tree);
                self.reveal_match(found);
            }
            Command::PrevMatch => {
                let found = self.search.prev_match(&mut self.tree);
                self.reveal_match(found);
            }
            Command::ClearSearch => {
                self.search.clear(&mut self.tree);
                self.reveal_match(None);
            }
            Command::ResizeViewport { height } => {
                if self.viewport.resize(height, &self.layout) {
                    self.refresh_visibility();
                    self.emit(ViewerEvent::RedrawNeeded);
                }
            }
            Command::ResolveResume { accept } => {
                if let Some(page) = self.pending_resume.take() {
                    if accept {
                        self.reveal_page(page);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn persist(&self) {
        self.prefs.save(self.store.as_ref());
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tree(&self) -> &RenderTree {
        &self.tree
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn search(&self) -> &SearchEngine {
        &self.search
    }

    pub fn prefs(&self) -> &ViewerPreferences {
        &self.prefs
    }

    pub fn document_info(&self) -> Option<&DocumentInfo> {
        self.document.as_ref().map(|doc| &doc.info)
    }

    pub fn page_count(&self) -> usize {
        self.document
            .as_ref()
            .map(|doc| doc.info.page_count)
            .unwrap_or(0)
    }

    pub fn current_page(&self) -> u32 {
        self.tracker.current_page()
    }

    pub fn visible_pages(&self) -> &BTreeSet<u32> {
        self.tracker.visible_pages()
    }

    pub fn pending_resume(&self) -> Option<u32> {
        self.pending_resume
    }

    pub fn active_observers(&self) -> usize {
        self.hub.active_observers()
    }

    /// `current/total` page indicator.
    pub fn page_label(&self) -> String {
        format!("{}/{}", self.current_page(), self.page_count())
    }
}
