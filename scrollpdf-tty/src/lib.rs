use std::io::Write;

use anyhow::Result;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers},
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use scrollpdf_core::Command;

mod frame;

pub use frame::{compose_frame, status_line, truncate_segments, Frame, FrameLine, Segment, SegmentStyle};

pub struct TerminalRenderer<W: Write> {
    writer: W,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Draws the frame body followed by `status` on the last row.
    pub fn draw(&mut self, frame: &Frame, status: &str) -> Result<()> {
        self.begin_sync_update()?;
        for (row, line) in frame.lines.iter().enumerate() {
            let row = u16::try_from(row).unwrap_or(u16::MAX);
            queue!(
                self.writer,
                cursor::MoveTo(0, row),
                Clear(ClearType::CurrentLine),
                Print(" ".repeat(line.indent))
            )?;
            for segment in &line.segments {
                self.write_segment(segment)?;
            }
        }
        let status_row = u16::try_from(frame.lines.len()).unwrap_or(u16::MAX);
        queue!(
            self.writer,
            cursor::MoveTo(0, status_row),
            Clear(ClearType::CurrentLine)
        )?;
        let clipped = truncate_segments(
            vec![Segment {
                text: status.to_owned(),
                style: SegmentStyle::Plain,
            }],
            usize::from(frame.columns),
        );
        for segment in &clipped {
            queue!(self.writer, Print(&segment.text))?;
        }
        self.end_sync_update()
    }

    fn write_segment(&mut self, segment: &Segment) -> Result<()> {
        match segment.style {
            SegmentStyle::Plain => queue!(self.writer, Print(&segment.text))?,
            SegmentStyle::Match => queue!(
                self.writer,
                SetBackgroundColor(Color::Yellow),
                SetForegroundColor(Color::Black),
                Print(&segment.text),
                ResetColor
            )?,
            SegmentStyle::CurrentMatch => queue!(
                self.writer,
                SetBackgroundColor(Color::DarkYellow),
                SetForegroundColor(Color::Black),
                SetAttribute(Attribute::Bold),
                Print(&segment.text),
                SetAttribute(Attribute::Reset),
                ResetColor
            )?,
            SegmentStyle::Label => queue!(
                self.writer,
                SetForegroundColor(Color::DarkGrey),
                Print(&segment.text),
                ResetColor
            )?,
        }
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Ends the synchronized update so the terminal paints everything at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(Command),
    BeginSearch,
    SearchQueryChanged { query: String },
    SearchSubmit { query: String },
    SearchCancel,
    BeginOpen,
    OpenSubmit { path: String },
    OpenCancel,
    Resize { columns: u16, rows: u16 },
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Search,
    Open,
    /// Waiting for a yes/no answer to the resume prompt.
    Confirm,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    buffer: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.buffer.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        if let Event::Resize(columns, rows) = event {
            return UiEvent::Resize { columns, rows };
        }
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match self.mode {
            InputMode::Normal => self.map_key_normal(code, modifiers),
            InputMode::Search => self.map_key_search(code, modifiers),
            InputMode::Open => self.map_key_open(code, modifiers),
            InputMode::Confirm => self.map_key_confirm(code),
        }
    }

    fn map_key_normal(&mut self, code: KeyCode, modifiers: KeyModifiers) -> UiEvent {
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                let count = self.take_count() as isize;
                UiEvent::Command(Command::ScrollLines { count })
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                let count = self.take_count() as isize;
                UiEvent::Command(Command::ScrollLines { count: -count })
            }
            (KeyCode::Char(' '), _) | (KeyCode::PageDown, _) => {
                let count = self.take_count() as isize;
                UiEvent::Command(Command::ScrollPages { count })
            }
            (KeyCode::Char('f'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                let count = self.take_count() as isize;
                UiEvent::Command(Command::ScrollPages { count })
            }
            (KeyCode::Char('b'), KeyModifiers::NONE) | (KeyCode::PageUp, _) => {
                let count = self.take_count() as isize;
                UiEvent::Command(Command::ScrollPages { count: -count })
            }
            (KeyCode::Char('b'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                let count = self.take_count() as isize;
                UiEvent::Command(Command::ScrollPages { count: -count })
            }
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                match self.pending_count.take() {
                    Some(page) => {
                        self.reset_count();
                        UiEvent::Command(Command::GotoPage {
                            page: u32::try_from(page).unwrap_or(u32::MAX),
                        })
                    }
                    None => UiEvent::Command(Command::ScrollToTop),
                }
            }
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => match self.pending_count.take() {
                Some(page) => {
                    self.reset_count();
                    UiEvent::Command(Command::GotoPage {
                        page: u32::try_from(page).unwrap_or(u32::MAX),
                    })
                }
                None => UiEvent::Command(Command::ScrollToBottom),
            },
            (KeyCode::Char('+'), _) | (KeyCode::Char('='), _) => {
                self.reset_count();
                UiEvent::Command(Command::ZoomIn)
            }
            (KeyCode::Char('-'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ZoomOut)
            }
            (KeyCode::Char('a'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::ToggleAlignment)
            }
            (KeyCode::Char('/'), KeyModifiers::NONE) => {
                self.set_mode(InputMode::Search);
                UiEvent::BeginSearch
            }
            (KeyCode::Char('n'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::NextMatch)
            }
            (KeyCode::Char('N'), modifiers)
                if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
            {
                self.reset_count();
                UiEvent::Command(Command::PrevMatch)
            }
            (KeyCode::Esc, _) | (KeyCode::Char('c'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::ClearSearch)
            }
            (KeyCode::Char('o'), KeyModifiers::NONE) => {
                self.set_mode(InputMode::Open);
                UiEvent::BeginOpen
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_key_search(&mut self, code: KeyCode, modifiers: KeyModifiers) -> UiEvent {
        match (code, modifiers) {
            (KeyCode::Esc, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::SearchCancel
            }
            (KeyCode::Enter, _) => {
                let query = std::mem::take(&mut self.buffer);
                self.set_mode(InputMode::Normal);
                UiEvent::SearchSubmit { query }
            }
            (KeyCode::Backspace, _) => {
                self.buffer.pop();
                UiEvent::SearchQueryChanged {
                    query: self.buffer.clone(),
                }
            }
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                self.buffer.push(c);
                UiEvent::SearchQueryChanged {
                    query: self.buffer.clone(),
                }
            }
            _ => UiEvent::None,
        }
    }

    fn map_key_open(&mut self, code: KeyCode, modifiers: KeyModifiers) -> UiEvent {
        match (code, modifiers) {
            (KeyCode::Esc, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::OpenCancel
            }
            (KeyCode::Enter, _) => {
                let path = std::mem::take(&mut self.buffer);
                self.set_mode(InputMode::Normal);
                if path.trim().is_empty() {
                    UiEvent::OpenCancel
                } else {
                    UiEvent::OpenSubmit {
                        path: path.trim().to_owned(),
                    }
                }
            }
            (KeyCode::Backspace, _) => {
                self.buffer.pop();
                UiEvent::None
            }
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                self.buffer.push(c);
                UiEvent::None
            }
            _ => UiEvent::None,
        }
    }

    fn map_key_confirm(&mut self, code: KeyCode) -> UiEvent {
        let accept = match code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => true,
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => false,
            KeyCode::Char('q') => return UiEvent::Quit,
            _ => return UiEvent::None,
        };
        self.set_mode(InputMode::Normal);
        UiEvent::Command(Command::ResolveResume { accept })
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    /// What the user has typed so far, for display in the status line.
    pub fn pending_input(&self) -> Option<String> {
        match self.mode {
            InputMode::Search => Some(format!("/{}", self.buffer)),
            InputMode::Open => Some(format!("open: {}", self.buffer)),
            InputMode::Confirm => None,
            InputMode::Normal => {
                (!self.pending_digits.is_empty()).then(|| self.pending_digits.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};
    use std::io;

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    #[test]
    fn numeric_prefix_scales_line_scroll() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('1'))), UiEvent::None);
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('2'))), UiEvent::None);
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));

        match mapper.map_event(key_event(KeyCode::Char('j'))) {
            UiEvent::Command(Command::ScrollLines { count }) => assert_eq!(count, 12),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(mapper.pending_input().is_none());

        match mapper.map_event(key_event(KeyCode::Up)) {
            UiEvent::Command(Command::ScrollLines { count }) => assert_eq!(count, -1),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn prefix_is_dropped_by_other_commands() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('4')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('a'))),
            UiEvent::Command(Command::ToggleAlignment)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('b'))),
            UiEvent::Command(Command::ScrollPages { count: -1 })
        );
    }

    #[test]
    fn g_jumps_to_counted_page_or_top() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::Command(Command::ScrollToTop)
        );
        mapper.map_event(key_event(KeyCode::Char('7')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::Command(Command::GotoPage { page: 7 })
        );
        assert!(mapper.pending_input().is_none());
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('G'),
                KeyModifiers::SHIFT
            )),
            UiEvent::Command(Command::ScrollToBottom)
        );
    }

    #[test]
    fn zoom_and_search_navigation_keys() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('='))),
            UiEvent::Command(Command::ZoomIn)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('-'))),
            UiEvent::Command(Command::ZoomOut)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('n'))),
            UiEvent::Command(Command::NextMatch)
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('N'),
                KeyModifiers::SHIFT
            )),
            UiEvent::Command(Command::PrevMatch)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::Command(Command::ClearSearch)
        );
    }

    #[test]
    fn slash_enters_search_mode_and_collects_input() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('/'))),
            UiEvent::BeginSearch
        );
        assert_eq!(mapper.pending_input().as_deref(), Some("/"));

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('f'))),
            UiEvent::SearchQueryChanged { query: "f".into() }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Backspace)),
            UiEvent::SearchQueryChanged {
                query: String::new()
            }
        );
        mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('G'),
            KeyModifiers::SHIFT,
        ));
        assert_eq!(mapper.pending_input().as_deref(), Some("/G"));

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::SearchSubmit { query: "G".into() }
        );
        assert_eq!(mapper.mode(), InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn escape_cancels_search() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('/')));
        mapper.map_event(key_event(KeyCode::Char('x')));
        assert_eq!(mapper.map_event(key_event(KeyCode::Esc)), UiEvent::SearchCancel);
        assert_eq!(mapper.mode(), InputMode::Normal);
    }

    #[test]
    fn open_prompt_collects_path() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('o'))),
            UiEvent::BeginOpen
        );
        for c in "a.pdf".chars() {
            assert_eq!(mapper.map_event(key_event(KeyCode::Char(c))), UiEvent::None);
        }
        assert_eq!(mapper.pending_input().as_deref(), Some("open: a.pdf"));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::OpenSubmit {
                path: "a.pdf".into()
            }
        );

        mapper.map_event(key_event(KeyCode::Char('o')));
        assert_eq!(mapper.map_event(key_event(KeyCode::Enter)), UiEvent::OpenCancel);
    }

    #[test]
    fn confirm_mode_answers_resume_prompt() {
        let mut mapper = EventMapper::new();
        mapper.set_mode(InputMode::Confirm);
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('x'))), UiEvent::None);
        assert_eq!(mapper.mode(), InputMode::Confirm);
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('y'))),
            UiEvent::Command(Command::ResolveResume { accept: true })
        );
        assert_eq!(mapper.mode(), InputMode::Normal);

        mapper.set_mode(InputMode::Confirm);
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::Command(Command::ResolveResume { accept: false })
        );
    }

    #[test]
    fn resize_is_reported_in_every_mode() {
        let mut mapper = EventMapper::new();
        mapper.set_mode(InputMode::Search);
        assert_eq!(
            mapper.map_event(Event::Resize(120, 40)),
            UiEvent::Resize {
                columns: 120,
                rows: 40
            }
        );
        assert_eq!(mapper.mode(), InputMode::Search);
    }

    #[test]
    fn renderer_writes_rows_and_status() {
        let frame = Frame {
            columns: 20,
            lines: vec![
                FrameLine {
                    indent: 2,
                    segments: vec![
                        Segment {
                            text: "find ".into(),
                            style: SegmentStyle::Plain,
                        },
                        Segment {
                            text: "me".into(),
                            style: SegmentStyle::CurrentMatch,
                        },
                    ],
                },
                FrameLine::default(),
            ],
            status: String::new(),
        };
        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer
            .draw(&frame, "a status line that is far too long")
            .unwrap();

        let output = String::from_utf8(renderer.writer().clone()).unwrap();
        assert!(output.starts_with("\u{1b}[?2026h"));
        assert!(output.ends_with("\u{1b}[?2026l"));
        assert!(output.contains("  find "));
        assert!(output.contains("me"));
        assert!(output.contains("a status line that i"));
        assert!(!output.contains("far too long"));
    }

    #[derive(Default)]
    struct CountingWriter {
        bytes: Vec<u8>,
        flushes: Vec<usize>,
    }

    impl Write for CountingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes.push(self.bytes.len());
            Ok(())
        }
    }

    #[test]
    fn draw_flushes_once_after_the_sync_update_ends() {
        let frame = Frame {
            columns: 10,
            lines: vec![FrameLine::default()],
            status: String::new(),
        };
        let mut renderer = TerminalRenderer::new(CountingWriter::default());
        renderer.draw(&frame, "status").unwrap();

        let writer = renderer.writer();
        assert_eq!(writer.flushes, vec![writer.bytes.len()]);
        assert!(writer.bytes.ends_with(b"\x1b[?2026l"));
    }
}
