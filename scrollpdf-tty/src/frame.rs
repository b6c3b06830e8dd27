use std::collections::BTreeMap;

use scrollpdf_core::{Alignment, Inline, NodeId, PageExtent, PageLayout, RenderTree, Viewer};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStyle {
    Plain,
    Match,
    CurrentMatch,
    Label,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub style: SegmentStyle,
}

impl Segment {
    fn new(text: impl Into<String>, style: SegmentStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameLine {
    pub indent: usize,
    pub segments: Vec<Segment>,
}

impl FrameLine {
    pub fn text(&self) -> String {
        let mut text = " ".repeat(self.indent);
        for segment in &self.segments {
            text.push_str(&segment.text);
        }
        text
    }

    pub fn width(&self) -> usize {
        self.indent
            + self
                .segments
                .iter()
                .map(|segment| segment.text.width())
                .sum::<usize>()
    }
}

/// One screen worth of rows plus the status line below them.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub columns: u16,
    pub lines: Vec<FrameLine>,
    pub status: String,
}

pub fn compose_frame(viewer: &Viewer, columns: u16, rows: u16) -> Frame {
    let body_rows = usize::from(rows.saturating_sub(1));
    let width = usize::from(columns);
    let layout = viewer.layout();
    let tree = viewer.tree();
    let align = viewer.prefs().align;
    let top = viewer.viewport().offset().floor();
    let bottom = top + body_rows as f32;

    let rows_by_page: BTreeMap<u32, BTreeMap<usize, Vec<NodeId>>> = layout
        .iter()
        .filter(|extent| extent.bottom() > top && extent.top < bottom)
        .map(|extent| (extent.page_number, text_rows(tree, extent)))
        .collect();

    let lines = (0..body_rows)
        .map(|row| {
            let y = top + row as f32;
            match layout.page_at(y) {
                Some(extent) => {
                    let page_width = page_columns(extent, width);
                    let local = (y - extent.top).floor() as usize;
                    let segments = rows_by_page
                        .get(&extent.page_number)
                        .and_then(|rows| rows.get(&local))
                        .map(|leaves| leaf_segments(tree, leaves, page_width))
                        .unwrap_or_default();
                    FrameLine {
                        indent: align.offset(width, page_width),
                        segments,
                    }
                }
                None => label_line(layout, y, align, width),
            }
        })
        .collect();

    Frame {
        columns,
        lines,
        status: status_line(viewer),
    }
}

pub fn status_line(viewer: &Viewer) -> String {
    let Some(info) = viewer.document_info() else {
        return "no document (o to open)".to_owned();
    };
    let mut name = info
        .metadata
        .title
        .clone()
        .unwrap_or_else(|| info.file_name.clone());
    if let Some(author) = &info.metadata.author {
        name.push_str(&format!(" ({author})"));
    }
    let prefs = viewer.prefs();
    let mut status = format!(
        "{}  {}  {:.0}%  {}",
        name,
        viewer.page_label(),
        prefs.scale * 100.0,
        prefs.align
    );
    let search = viewer.search();
    if !search.query().is_empty() || search.total() > 0 {
        status.push_str(&format!("  /{} {}", search.query(), search.counter_label()));
    }
    status
}

fn page_columns(extent: &PageExtent, width: usize) -> usize {
    (extent.width.round().max(1.0) as usize).min(width)
}

/// Groups a page's text leaves by the row they land on.
fn text_rows(tree: &RenderTree, extent: &PageExtent) -> BTreeMap<usize, Vec<NodeId>> {
    let last_row = (extent.height.floor() as usize).saturating_sub(1);
    let mut rows: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
    for leaf in tree.text_leaves_of_page(extent.page_number) {
        let node = tree.node(leaf);
        let row = ((node.top.clamp(0.0, 1.0) * extent.height).floor() as usize).min(last_row);
        rows.entry(row).or_default().push(leaf);
    }
    rows
}

fn leaf_segments(tree: &RenderTree, leaves: &[NodeId], width: usize) -> Vec<Segment> {
    let mut segments = Vec::new();
    for (idx, leaf) in leaves.iter().enumerate() {
        if idx > 0 {
            segments.push(Segment::new(" ", SegmentStyle::Plain));
        }
        for inline in &tree.node(*leaf).content {
            let segment = match inline {
                Inline::Text(text) => Segment::new(text.as_str(), SegmentStyle::Plain),
                Inline::Mark { text, current, .. } => Segment::new(
                    text.as_str(),
                    if *current {
                        SegmentStyle::CurrentMatch
                    } else {
                        SegmentStyle::Match
                    },
                ),
            };
            segments.push(segment);
        }
    }
    truncate_segments(segments, width)
}

/// Gap rows are blank except the one right above a page, which carries its
/// `p<N>` label.
fn label_line(layout: &PageLayout, y: f32, align: Alignment, width: usize) -> FrameLine {
    let Some(next) = layout.iter().find(|extent| extent.top > y) else {
        return FrameLine::default();
    };
    if y < next.top - 1.0 {
        return FrameLine::default();
    }
    let page_width = page_columns(next, width);
    FrameLine {
        indent: align.offset(width, page_width),
        segments: truncate_segments(
            vec![Segment::new(
                format!("p{}", next.page_number),
                SegmentStyle::Label,
            )],
            page_width,
        ),
    }
}

pub fn truncate_segments(segments: Vec<Segment>, width: usize) -> Vec<Segment> {
    let mut remaining = width;
    let mut out = Vec::with_capacity(segments.len());
    for segment in segments {
        if remaining == 0 {
            break;
        }
        let segment_width = segment.text.width();
        if segment_width <= remaining {
            remaining -= segment_width;
            out.push(segment);
            continue;
        }
        let mut text = String::new();
        for ch in segment.text.chars() {
            let ch_width = ch.width().unwrap_or(0);
            if ch_width > remaining {
                break;
            }
            remaining -= ch_width;
            text.push(ch);
        }
        if !text.is_empty() {
            out.push(Segment::new(text, segment.style));
        }
        break;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use scrollpdf_core::{
        Command, Config, DocumentBackend, DocumentInfo, DocumentMetadata, LayoutSettings,
        MemoryStore, PageSize, PageSurface, RenderRequest, TextLine,
    };
    use std::path::PathBuf;
    use std::sync::Arc;

    struct StaticBackend {
        info: DocumentInfo,
        pages: Vec<Vec<&'static str>>,
    }

    impl StaticBackend {
        fn new(pages: Vec<Vec<&'static str>>) -> Self {
            Self {
                info: DocumentInfo {
                    path: PathBuf::from("/tmp/notes.pdf"),
                    file_name: "notes.pdf".into(),
                    page_count: pages.len(),
                    metadata: DocumentMetadata::default(),
                },
                pages,
            }
        }
    }

    impl DocumentBackend for StaticBackend {
        fn info(&self) -> &DocumentInfo {
            &self.info
        }

        fn render_page(&self, request: RenderRequest) -> Result<PageSurface> {
            let lines = &self.pages[request.page_index];
            Ok(PageSurface {
                page_index: request.page_index,
                size: PageSize {
                    width: 40.0 * request.scale,
                    height: 10.0 * request.scale,
                },
                lines: lines
                    .iter()
                    .enumerate()
                    .map(|(idx, text)| TextLine {
                        text: (*text).to_owned(),
                        top: idx as f32 * 0.5,
                    })
                    .collect(),
            })
        }
    }

    fn viewer(pages: Vec<Vec<&'static str>>) -> Viewer {
        viewer_with(StaticBackend::new(pages))
    }

    fn viewer_with(backend: StaticBackend) -> Viewer {
        let config = Config {
            layout: LayoutSettings {
                points_per_row: 1.0,
                points_per_column: 1.0,
                page_gap: 1.0,
            },
            ..Config::default()
        };
        let mut viewer = Viewer::new(config, Arc::new(MemoryStore::new()), 9.0);
        viewer.load(Arc::new(backend)).unwrap();
        viewer
    }

    #[test]
    fn labels_and_text_are_centered() {
        let viewer = viewer(vec![vec!["Alpha line", "beta Line"], vec!["second"]]);
        let frame = compose_frame(&viewer, 80, 10);
        assert_eq!(frame.lines.len(), 9);
        assert_eq!(frame.lines[0].text().trim(), "p1");
        assert_eq!(frame.lines[0].segments[0].style, SegmentStyle::Label);
        assert_eq!(frame.lines[1].indent, 20);
        assert_eq!(frame.lines[1].text().trim_start(), "Alpha line");
        assert_eq!(frame.lines[6].text().trim_start(), "beta Line");
        assert!(frame.lines[2].segments.is_empty());
        assert_eq!(frame.status, "notes.pdf  1/2  100%  center");
    }

    #[test]
    fn matches_are_styled() {
        let mut viewer = viewer(vec![vec!["Alpha line", "beta Line"]]);
        viewer
            .apply(Command::SubmitSearch {
                query: "line".into(),
            })
            .unwrap();
        let frame = compose_frame(&viewer, 80, 10);
        assert_eq!(viewer.viewport().offset(), 1.0);

        let first: Vec<_> = frame.lines[0]
            .segments
            .iter()
            .map(|segment| (segment.text.as_str(), segment.style))
            .collect();
        assert_eq!(
            first,
            vec![
                ("Alpha ", SegmentStyle::Plain),
                ("line", SegmentStyle::CurrentMatch)
            ]
        );
        assert_eq!(frame.lines[5].segments[1].style, SegmentStyle::Match);
        assert!(frame.status.ends_with("/line 1/2"));
    }

    #[test]
    fn alignment_moves_the_page() {
        let mut viewer = viewer(vec![vec!["text"]]);
        viewer.apply(Command::ToggleAlignment).unwrap();
        assert_eq!(compose_frame(&viewer, 80, 10).lines[1].indent, 40);
        viewer.apply(Command::ToggleAlignment).unwrap();
        assert_eq!(compose_frame(&viewer, 80, 10).lines[1].indent, 0);
    }

    #[test]
    fn truncation_respects_display_width() {
        let segments = vec![
            Segment::new("ab", SegmentStyle::Plain),
            Segment::new("日本語", SegmentStyle::Match),
        ];
        let out = truncate_segments(segments, 5);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].text, "日");
        assert_eq!(out[1].style, SegmentStyle::Match);
        assert!(truncate_segments(vec![Segment::new("x", SegmentStyle::Plain)], 0).is_empty());
    }

    #[test]
    fn narrow_terminal_clips_page_text() {
        let viewer = viewer(vec![vec!["a line that is much wider than twelve"]]);
        let frame = compose_frame(&viewer, 12, 10);
        assert_eq!(frame.lines[1].indent, 0);
        assert_eq!(frame.lines[1].width(), 12);
    }

    #[test]
    fn status_names_title_and_author() {
        let mut backend = StaticBackend::new(vec![vec!["only"]]);
        backend.info.metadata = DocumentMetadata {
            title: Some("Field Notes".into()),
            author: Some("R. Lee".into()),
        };
        let viewer = viewer_with(backend);
        assert_eq!(status_line(&viewer), "Field Notes (R. Lee)  1/1  100%  center");

        let mut backend = StaticBackend::new(vec![vec!["only"]]);
        backend.info.metadata.author = Some("R. Lee".into());
        let viewer = viewer_with(backend);
        assert_eq!(compose_frame(&viewer, 40, 5).status, "notes.pdf (R. Lee)  1/1  100%  center");
    }

    #[test]
    fn empty_viewer_has_blank_rows() {
        let viewer = Viewer::new(Config::default(), Arc::new(MemoryStore::new()), 4.0);
        let frame = compose_frame(&viewer, 20, 5);
        assert!(frame.lines.iter().all(|line| line.segments.is_empty()));
        assert_eq!(frame.status, "no document (o to open)");
    }
}
