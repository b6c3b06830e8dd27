//! Vertical page layout and the scrolling viewport over it.
//!
//! Units are whatever the front end draws in (terminal rows for the tty
//! viewer); the viewer converts page sizes from points before building a
//! layout.

use crate::PageSize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageExtent {
    pub page_number: u32,
    pub top: f32,
    pub height: f32,
    pub width: f32,
}

impl PageExtent {
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn contains(&self, y: f32) -> bool {
        y >= self.top && y < self.bottom()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    extents: Vec<PageExtent>,
    gap: f32,
    total_height: f32,
}

impl PageLayout {
    /// Stacks pages top to bottom with `gap` units above every page.
    pub fn new(sizes: &[PageSize], gap: f32) -> Self {
        let gap = gap.max(0.0);
        let mut extents = Vec::with_capacity(sizes.len());
        let mut y = 0.0;
        for (idx, size) in sizes.iter().enumerate() {
            y += gap;
            let height = size.height.max(1.0);
            extents.push(PageExtent {
                page_number: idx as u32 + 1,
                top: y,
                height,
                width: size.width.max(1.0),
            });
            y += height;
        }
        Self {
            extents,
            gap,
            total_height: y,
        }
    }

    pub fn gap(&self) -> f32 {
        self.gap
    }

    pub fn page_count(&self) -> usize {
        self.extents.len()
    }

    pub fn total_height(&self) -> f32 {
        self.total_height
    }

    pub fn extent(&self, page_number: u32) -> Option<&PageExtent> {
        let index = usize::try_from(page_number).ok()?.checked_sub(1)?;
        self.extents.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageExtent> {
        self.extents.iter()
    }

    pub fn max_width(&self) -> f32 {
        self.extents
            .iter()
            .map(|extent| extent.width)
            .fold(0.0, f32::max)
    }

    /// The page whose extent covers `y`, if any (gaps belong to no page).
    pub fn page_at(&self, y: f32) -> Option<&PageExtent> {
        let idx = self.extents.partition_point(|extent| extent.top <= y);
        let candidate = self.extents.get(idx.checked_sub(1)?)?;
        candidate.contains(y).then_some(candidate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    offset: f32,
    height: f32,
}

impl Viewport {
    pub fn new(height: f32) -> Self {
        Self {
            offset: 0.0,
            height: height.max(1.0),
        }
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn max_offset(&self, layout: &PageLayout) -> f32 {
        (layout.total_height() - self.height).max(0.0)
    }

    /// Returns true when the offset actually moved.
    pub fn scroll_to(&mut self, offset: f32, layout: &PageLayout) -> bool {
        let next = if offset.is_finite() {
            offset.clamp(0.0, self.max_offset(layout))
        } else {
            0.0
        };
        if (next - self.offset).abs() > f32::EPSILON {
            self.offset = next;
            true
        } else {
            false
        }
    }

    pub fn scroll_by(&mut self, delta: f32, layout: &PageLayout) -> bool {
        self.scroll_to(self.offset + delta, layout)
    }

    /// Aligns the top of `extent` with the top of the viewport, as far as the
    /// layout allows.
    pub fn reveal(&mut self, extent: &PageExtent, layout: &PageLayout) -> bool {
        self.scroll_to(extent.top, layout)
    }

    pub fn resize(&mut self, height: f32, layout: &PageLayout) -> bool {
        let height = height.max(1.0);
        let changed = (height - self.height).abs() > f32::EPSILON;
        self.height = height;
        let offset = self.offset;
        self.scroll_to(offset, layout) || changed
    }

    /// Fraction of `extent` inside the viewport grown by `margin` on both ends.
    pub fn intersection_ratio(&self, extent: &PageExtent, margin: f32) -> f32 {
        if extent.height <= 0.0 {
            return 0.0;
        }
        let top = self.offset - margin;
        let bottom = self.offset + self.height + margin;
        let overlap = bottom.min(extent.bottom()) - top.max(extent.top);
        (overlap.max(0.0) / extent.height).min(1.0)
    }
}
