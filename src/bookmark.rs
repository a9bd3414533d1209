use crate::fonts::FontDescriptor;
use crate::pdf::{OutlineId, PdfDoc};
use crate::types::Point;

pub const MAX_BOOKMARK_LEVEL: u8 = 10;

/// One configured bookmark trigger: text drawn in a matching font becomes an
/// outline entry at the given level.
#[derive(Debug, Clone)]
pub struct BookmarkDefinition {
    /// 1 is the top level; out-of-range values are clamped.
    pub level: u8,
    pub family: String,
    pub style: String,
    pub size: f32,
    /// Whether the entry's children start expanded in the viewer.
    pub expanded: bool,
}

#[derive(Debug)]
struct Candidate {
    text: String,
    position: Point,
    definition: usize,
}

/// Collects bookmark candidates while a page is translated and folds them
/// into the outline tree when the page ends. The per-level anchors persist
/// across pages so a chapter keeps collecting sections on later pages.
#[derive(Debug)]
pub(crate) struct Bookmarks {
    definitions: Vec<BookmarkDefinition>,
    pending: Vec<Candidate>,
    last_at_level: [Option<OutlineId>; MAX_BOOKMARK_LEVEL as usize + 1],
}

impl Bookmarks {
    pub fn new(definitions: Vec<BookmarkDefinition>) -> Bookmarks {
        Bookmarks {
            definitions,
            pending: Vec::new(),
            last_at_level: [None; MAX_BOOKMARK_LEVEL as usize + 1],
        }
    }

    /// Definition index matching a drawn font, or `None`.
    pub fn match_font(&self, font: &FontDescriptor) -> Option<usize> {
        self.definitions.iter().position(|def| {
            def.family == font.family
                && def.style == font.style
                && (def.size - font.size).abs() < 0.1
        })
    }

    /// `position` is the device-space top-left of the drawn text.
    pub fn add(&mut self, text: impl Into<String>, position: Point, definition: usize) {
        self.pending.push(Candidate {
            text: text.into(),
            position,
            definition,
        });
    }

    /// Sorts this page's candidates top to bottom and attaches each to the
    /// most recent entry one level up; with no shallower entry yet, the
    /// candidate attaches to the outline root.
    pub fn page_end(&mut self, page: usize, doc: &mut PdfDoc) {
        let mut pending = std::mem::take(&mut self.pending);
        pending.sort_by(|a, b| {
            b.position
                .y
                .partial_cmp(&a.position.y)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for candidate in pending {
            let definition = &self.definitions[candidate.definition];
            let level = definition.level.clamp(1, MAX_BOOKMARK_LEVEL) as usize;
            let parent = (1..level).rev().find_map(|l| self.last_at_level[l]);
            let id = doc.add_outline(
                candidate.text,
                parent,
                page,
                candidate.position.x,
                candidate.position.y,
                definition.expanded,
            );
            self.last_at_level[level] = Some(id);
            for slot in &mut self.last_at_level[level + 1..] {
                *slot = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::Content;

    fn definitions() -> Vec<BookmarkDefinition> {
        vec![
            BookmarkDefinition {
                level: 1,
                family: "Swis721 BT".to_string(),
                style: "Bold".to_string(),
                size: 18.0,
                expanded: true,
            },
            BookmarkDefinition {
                level: 2,
                family: "Swis721 BT".to_string(),
                style: "Italic".to_string(),
                size: 14.0,
                expanded: false,
            },
        ]
    }

    fn font(style: &str, size: f32) -> FontDescriptor {
        FontDescriptor {
            family: "Swis721 BT".to_string(),
            style: style.to_string(),
            size,
            ..FontDescriptor::default()
        }
    }

    #[test]
    fn font_matching_requires_family_style_and_size() {
        let bookmarks = Bookmarks::new(definitions());
        assert_eq!(bookmarks.match_font(&font("Bold", 18.0)), Some(0));
        assert_eq!(bookmarks.match_font(&font("Italic", 14.0)), Some(1));
        assert_eq!(bookmarks.match_font(&font("Bold", 12.0)), None);
        assert_eq!(bookmarks.match_font(&FontDescriptor::default()), None);
    }

    #[test]
    fn page_candidates_nest_top_to_bottom() {
        let mut doc = PdfDoc::new();
        doc.begin_page(595.0, 842.0);
        doc.end_page(Content::new());
        let mut bookmarks = Bookmarks::new(definitions());
        // Added out of order; vertical position decides nesting order.
        bookmarks.add("Section A", Point::new(0.0, 700.0), 1);
        bookmarks.add("Chapter", Point::new(0.0, 800.0), 0);
        bookmarks.page_end(0, &mut doc);
        let pdf = String::from_utf8_lossy(&doc.finish().unwrap()).to_string();
        assert!(pdf.contains("(Chapter)"));
        assert!(pdf.contains("(Section A)"));
        // The chapter holds one expanded child.
        assert!(pdf.contains("/Count 1"));
    }

    #[test]
    fn chapter_keeps_collecting_on_later_pages() {
        let mut doc = PdfDoc::new();
        doc.begin_page(595.0, 842.0);
        doc.end_page(Content::new());
        doc.begin_page(595.0, 842.0);
        doc.end_page(Content::new());
        let mut bookmarks = Bookmarks::new(definitions());
        bookmarks.add("Chapter", Point::new(0.0, 800.0), 0);
        bookmarks.page_end(0, &mut doc);
        bookmarks.add("Later Section", Point::new(0.0, 400.0), 1);
        bookmarks.page_end(1, &mut doc);
        let pdf = String::from_utf8_lossy(&doc.finish().unwrap()).to_string();
        assert!(pdf.contains("(Later Section)"));
        assert!(pdf.contains("/Count 1"));
    }

    #[test]
    fn deep_entry_without_parent_attaches_to_root() {
        let mut doc = PdfDoc::new();
        doc.begin_page(595.0, 842.0);
        doc.end_page(Content::new());
        let mut bookmarks = Bookmarks::new(definitions());
        bookmarks.add("Orphan Section", Point::new(0.0, 500.0), 1);
        bookmarks.page_end(0, &mut doc);
        let pdf = String::from_utf8_lossy(&doc.finish().unwrap()).to_string();
        assert!(pdf.contains("(Orphan Section)"));
        assert!(pdf.contains("/Type /Outlines"));
    }
}
