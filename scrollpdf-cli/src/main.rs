use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event;
use crossterm::terminal;
use directories::ProjectDirs;
use scrollpdf_core::{Command, Config, FileStore, KeyValueStore, Viewer, ViewerEvent};
use scrollpdf_render::PdfiumDocumentProvider;
use scrollpdf_tty::{
    compose_frame, EventMapper, Frame, InputMode, TerminalRenderer, UiEvent,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "scrollpdf",
    version,
    about = "Continuous-scroll PDF viewer for the terminal"
)]
struct Args {
    /// Page to jump to once the document is open (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<u32>,

    /// Config file to use instead of the platform default
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// PDF file to open
    file: Option<PathBuf>,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

struct App {
    viewer: Viewer,
    provider: PdfiumDocumentProvider,
    mapper: EventMapper,
    columns: u16,
    rows: u16,
    /// Transient message shown in place of the document status.
    message: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "scrollpdf", "scrollpdf")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let config = Config::load(&config_path)?;
    let _log_guard = init_logging(&project_dirs, &config.log_level)?;
    info!(config = %config_path.display(), "starting");

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(
        project_dirs.data_local_dir().join("storage.json"),
    )?);
    let (columns, rows) = terminal::size().context("failed to query terminal size")?;
    let viewer = Viewer::new(config, store, f32::from(rows.saturating_sub(1)));
    let provider = PdfiumDocumentProvider::new()?;

    let mut app = App {
        viewer,
        provider,
        mapper: EventMapper::new(),
        columns,
        rows,
        message: None,
    };

    if let Some(path) = args.file {
        app.open(path).await;
        app.drain_viewer_events();
        if let Some(page) = args.page {
            // An explicit page wins over the remembered one.
            app.viewer.apply(Command::ResolveResume { accept: false })?;
            app.viewer.apply(Command::GotoPage { page })?;
            app.mapper.set_mode(InputMode::Normal);
            if app.viewer.document_info().is_some() {
                app.message = None;
            }
        }
    }

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;
    let mut renderer = TerminalRenderer::new(stdout);
    renderer.clear_all()?;
    let mut dirty = true;

    loop {
        dirty |= app.drain_viewer_events();
        if dirty {
            app.redraw(&mut renderer)?;
            dirty = false;
        }

        if event::poll(Duration::from_millis(100))? {
            let ev = event::read()?;
            let ui_event = app.mapper.map_event(ev);
            match app.handle_event(ui_event).await? {
                LoopAction::ContinueRedraw => dirty = true,
                LoopAction::Continue => {}
                LoopAction::Quit => break,
            }
        }
    }

    renderer.clear_all()?;
    app.viewer.persist();
    Ok(())
}

impl App {
    async fn open(&mut self, path: PathBuf) {
        self.mapper.set_mode(InputMode::Normal);
        match self.viewer.open_with(&self.provider, path).await {
            Ok(()) => self.message = None,
            Err(err) => {
                warn!(?err, "open failed");
                self.message = Some(format!("{err:#}"));
            }
        }
    }

    /// Applies viewer notifications to the UI state. Returns true when the
    /// screen needs repainting.
    fn drain_viewer_events(&mut self) -> bool {
        let mut redraw = false;
        for event in self.viewer.drain_events() {
            match event {
                ViewerEvent::ResumePrompt { page, .. } => {
                    self.mapper.set_mode(InputMode::Confirm);
                    self.message = Some(format!("Resume at page {page}? [y/n]"));
                    redraw = true;
                }
                ViewerEvent::LoadFailed { file_name, reason } => {
                    self.message = Some(format!("{file_name}: {reason}"));
                    redraw = true;
                }
                ViewerEvent::DocumentLoaded { .. }
                | ViewerEvent::CurrentPageChanged { .. }
                | ViewerEvent::SearchUpdated { .. }
                | ViewerEvent::RedrawNeeded => redraw = true,
            }
        }
        redraw
    }

    async fn handle_event(&mut self, event: UiEvent) -> Result<LoopAction> {
        match event {
            UiEvent::BeginSearch | UiEvent::BeginOpen => Ok(LoopAction::ContinueRedraw),
            UiEvent::SearchQueryChanged { query } => {
                self.viewer.apply(Command::EditQuery { query })?;
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::SearchSubmit { query } => {
                self.viewer.apply(Command::SubmitSearch { query })?;
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::SearchCancel => {
                self.viewer.apply(Command::ClearSearch)?;
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::OpenSubmit { path } => {
                self.open(PathBuf::from(path)).await;
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::OpenCancel => Ok(LoopAction::ContinueRedraw),
            UiEvent::Resize { columns, rows } => {
                self.columns = columns;
                self.rows = rows;
                self.viewer.apply(Command::ResizeViewport {
                    height: f32::from(rows.saturating_sub(1)),
                })?;
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::Command(command) => {
                if matches!(command, Command::ResolveResume { .. }) {
                    self.message = None;
                }
                self.viewer.apply(command)?;
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::Quit => Ok(LoopAction::Quit),
            UiEvent::None => {
                if self.mapper.pending_input().is_some() {
                    Ok(LoopAction::ContinueRedraw)
                } else {
                    Ok(LoopAction::Continue)
                }
            }
        }
    }

    fn redraw(&self, renderer: &mut TerminalRenderer<io::Stdout>) -> Result<()> {
        let frame = compose_frame(&self.viewer, self.columns, self.rows);
        let status = status_for(
            &frame,
            self.message.as_deref(),
            self.mapper.pending_input().as_deref(),
        );
        renderer.draw(&frame, &status)
    }
}

/// A pending message replaces the frame's status; typed input is appended.
fn status_for(frame: &Frame, message: Option<&str>, pending_input: Option<&str>) -> String {
    let mut base = message.unwrap_or(&frame.status).to_owned();
    if let Some(pending) = pending_input.filter(|s| !s.is_empty()) {
        base.push_str(" | ");
        base.push_str(pending);
    }
    base
}

fn init_logging(project_dirs: &ProjectDirs, default_level: &str) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {:?}", log_dir))?;

    let file_appender = tracing_appender::rolling::never(log_dir, "scrollpdf.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
