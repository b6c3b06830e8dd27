//! Case-insensitive literal search over the render tree's text leaves.
//!
//! Matches are wrapped in [`Inline::Mark`] segments numbered in document
//! order. At most one mark carries the `current` flag, the one the cursor
//! points at.

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::tree::{Inline, NodeId, RenderTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub match_id: usize,
    /// Page of the nearest tagged ancestor; `None` for text outside any page.
    pub page: Option<u32>,
    pub node: NodeId,
}

#[derive(Debug, Default)]
pub struct SearchEngine {
    query: String,
    matches: Vec<Match>,
    cursor: usize,
    highlighted: Option<usize>,
}

impl SearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    /// 1-based index of the selected match, 0 when nothing is selected.
    pub fn current(&self) -> usize {
        self.cursor
    }

    pub fn total(&self) -> usize {
        self.matches.len()
    }

    pub fn current_match(&self) -> Option<&Match> {
        self.cursor.checked_sub(1).and_then(|idx| self.matches.get(idx))
    }

    pub fn counter_label(&self) -> String {
        format!("{}/{}", self.cursor, self.matches.len())
    }

    /// Updates the pending search text. Any edit away from the executed term
    /// drops the previous results and their highlights.
    pub fn set_query(&mut self, tree: &mut RenderTree, text: &str) {
        if text == self.query {
            return;
        }
        self.reset(tree);
        self.query = text.to_owned();
    }

    /// Rescans the tree for `term`. Returns the number of matches.
    pub fn search(&mut self, tree: &mut RenderTree, term: &str) -> usize {
        if term.is_empty() {
            return self.matches.len();
        }
        self.reset(tree);
        self.query = term.to_owned();

        let Some(pattern) = literal_pattern(term) else {
            return 0;
        };

        for leaf in tree.text_leaves() {
            let text = tree.node(leaf).text();
            let mut content = Vec::new();
            let mut last = 0;
            let mut owner: Option<Option<u32>> = None;
            for found in pattern.find_iter(&text) {
                let page = *owner.get_or_insert_with(|| tree.enclosing_page(leaf));
                if found.start() > last {
                    content.push(Inline::Text(text[last..found.start()].to_owned()));
                }
                let match_id = self.matches.len();
                content.push(Inline::Mark {
                    match_id,
                    text: found.as_str().to_owned(),
                    current: false,
                });
                self.matches.push(Match {
                    match_id,
                    page,
                    node: leaf,
                });
                last = found.end();
            }
            if content.is_empty() {
                continue;
            }
            if last < text.len() {
                content.push(Inline::Text(text[last..].to_owned()));
            }
            tree.set_content(leaf, content);
        }

        debug!(term, matches = self.matches.len(), "search finished");
        self.matches.len()
    }

    /// Runs a search and selects the first match, if any.
    pub fn submit(&mut self, tree: &mut RenderTree, term: &str) -> Option<Match> {
        if self.search(tree, term) == 0 {
            return None;
        }
        self.select_match(tree, 1)
    }

    pub fn next_match(&mut self, tree: &mut RenderTree) -> Option<Match> {
        if self.cursor >= self.matches.len() {
            return None;
        }
        self.select_match(tree, self.cursor + 1)
    }

    pub fn prev_match(&mut self, tree: &mut RenderTree) -> Option<Match> {
        if self.cursor <= 1 {
            return None;
        }
        self.select_match(tree, self.cursor - 1)
    }

    /// Points the cursor at `cursor` (1-based) and moves the current
    /// highlight there. Out-of-range cursors are ignored.
    pub fn select_match(&mut self, tree: &mut RenderTree, cursor: usize) -> Option<Match> {
        let selected = *self.matches.get(cursor.checked_sub(1)?)?;
        if let Some(previous) = self.highlighted.take() {
            if let Some(prior) = self.matches.get(previous).copied() {
                set_current_flag(tree, prior, false);
            }
        }
        set_current_flag(tree, selected, true);
        self.highlighted = Some(selected.match_id);
        self.cursor = cursor;
        Some(selected)
    }

    /// Drops every highlight and resets query, cursor and index.
    pub fn clear(&mut self, tree: &mut RenderTree) {
        self.reset(tree);
        self.query.clear();
    }

    fn reset(&mut self, tree: &mut RenderTree) {
        let restored = tree.strip_marks();
        if restored > 0 {
            debug!(restored, "cleared search highlights");
        }
        self.matches.clear();
        self.cursor = 0;
        self.highlighted = None;
    }
}

fn literal_pattern(term: &str) -> Option<Regex> {
    match RegexBuilder::new(&regex::escape(term))
        .case_insensitive(true)
        .build()
    {
        Ok(pattern) => Some(pattern),
        Err(err) => {
            warn!(?err, "search term rejected");
            None
        }
    }
}

fn set_current_flag(tree: &mut RenderTree, target: Match, value: bool) {
    let Some(node) = tree.get(target.node) else {
        return;
    };
    if node.content.is_empty() {
        return;
    }
    for inline in tree.content_mut(target.node) {
        if let Inline::Mark {
            match_id, current, ..
        } = inline
        {
            if *match_id == target.match_id {
                *current = value;
            }
        }
    }
}
