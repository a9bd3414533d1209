use crate::fonts::FontDescriptor;
use crate::state::CoordSystem;
use crate::types::{Point, Rect};

/// Width oracle for line reconstruction. The translator backs this with the
/// resolved font face; the fallback approximation is for faces whose metrics
/// cannot be read.
pub(crate) trait GlyphMetrics {
    fn char_width(&self, font: &FontDescriptor, ch: char) -> f32;
}

pub(crate) fn approximate_width(font: &FontDescriptor, _ch: char) -> f32 {
    font.size * 0.6
}

/// One drawn text run in device space, with the state snapshot it was drawn
/// under. Rotated runs never become segments.
#[derive(Debug, Clone)]
pub(crate) struct TextSegment {
    pub text: String,
    /// Baseline origin, device space (y up).
    pub start: Point,
    pub escp_space: f32,
    pub escp_nospace: f32,
    pub font: FontDescriptor,
    pub coord: CoordSystem,
}

/// Horizontal extent of one character of a reconstructed line.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CharPos {
    /// Byte offset into the line text.
    pub offset: usize,
    pub x: f32,
    pub width: f32,
}

#[derive(Debug, Clone)]
pub(crate) struct Line {
    pub text: String,
    pub chars: Vec<CharPos>,
    pub baseline: f32,
    pub font: FontDescriptor,
    /// Device space, y up: `bottom` is numerically below `top`.
    pub bounds: Rect,
}

pub(crate) trait LineSink {
    fn line(&mut self, line: Line);
}

// Gap cap: a run further right than this many space widths starts a new
// logical region but still reads as one visual line; beyond the cap the
// synthesized gap is meaningless.
const MAX_SYNTHESIZED_SPACES: usize = 200;

struct PendingLine {
    text: String,
    chars: Vec<CharPos>,
    start: Point,
    right: f32,
    font: FontDescriptor,
    coord: CoordSystem,
    space_width: f32,
}

/// Rebuilds logical text lines from consecutive draw-string segments. Word
/// gaps the application painted as pen movement come back as synthesized
/// spaces so downstream pattern scans see contiguous text.
#[derive(Default)]
pub(crate) struct TextLine {
    pending: Option<PendingLine>,
}

impl TextLine {
    pub fn new() -> TextLine {
        TextLine::default()
    }

    pub fn add(
        &mut self,
        segment: TextSegment,
        metrics: &dyn GlyphMetrics,
        sink: &mut dyn LineSink,
    ) {
        let space_width =
            metrics.char_width(&segment.font, ' ') + segment.escp_space;

        let follows = match &self.pending {
            None => false,
            Some(pending) => {
                segment.coord == pending.coord
                    && (segment.start.y - pending.start.y).abs()
                        <= pending.font.size * 0.25
                    && segment.start.x >= pending.right - pending.space_width / 2.0
            }
        };
        if !follows {
            self.flush(sink);
        }

        let pending = self.pending.get_or_insert_with(|| PendingLine {
            text: String::new(),
            chars: Vec::new(),
            start: segment.start,
            right: segment.start.x,
            font: segment.font.clone(),
            coord: segment.coord,
            space_width,
        });

        // Synthesize the inter-segment gap as spaces.
        if !pending.text.is_empty() && segment.start.x > pending.right {
            let gap = segment.start.x - pending.right;
            let count =
                ((gap / pending.space_width) as usize).min(MAX_SYNTHESIZED_SPACES);
            for _ in 0..count {
                pending.chars.push(CharPos {
                    offset: pending.text.len(),
                    x: pending.right,
                    width: pending.space_width,
                });
                pending.text.push(' ');
                pending.right += pending.space_width;
            }
        }

        let mut x = segment.start.x;
        for ch in segment.text.chars() {
            let escapement = if ch == ' ' {
                segment.escp_space
            } else {
                segment.escp_nospace
            };
            let width = metrics.char_width(&segment.font, ch) + escapement;
            pending.chars.push(CharPos {
                offset: pending.text.len(),
                x,
                width,
            });
            pending.text.push(ch);
            x += width;
        }
        pending.right = pending.right.max(x);
        pending.space_width = space_width;
    }

    pub fn flush(&mut self, sink: &mut dyn LineSink) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if pending.text.is_empty() {
            return;
        }
        let size = pending.font.size;
        let bounds = Rect {
            left: pending.start.x,
            top: pending.start.y + size * 0.75,
            right: pending.right,
            bottom: pending.start.y - size * 0.25,
        };
        sink.line(Line {
            text: pending.text,
            chars: pending.chars,
            baseline: pending.start.y,
            font: pending.font,
            bounds,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f32);

    impl GlyphMetrics for Fixed {
        fn char_width(&self, _font: &FontDescriptor, _ch: char) -> f32 {
            self.0
        }
    }

    #[derive(Default)]
    struct Collect(Vec<Line>);

    impl LineSink for Collect {
        fn line(&mut self, line: Line) {
            self.0.push(line);
        }
    }

    fn segment(text: &str, x: f32, y: f32) -> TextSegment {
        TextSegment {
            text: text.to_string(),
            start: Point::new(x, y),
            escp_space: 0.0,
            escp_nospace: 0.0,
            font: FontDescriptor::default(),
            coord: CoordSystem::new(800.0, 0.0, 0.0),
        }
    }

    #[test]
    fn adjacent_segments_merge_with_synthesized_space() {
        let metrics = Fixed(10.0);
        let mut sink = Collect::default();
        let mut line = TextLine::new();
        line.add(segment("Hello", 0.0, 100.0), &metrics, &mut sink);
        // "Hello" ends at x=50; one space width gap, then "world".
        line.add(segment("world", 60.0, 100.0), &metrics, &mut sink);
        line.flush(&mut sink);
        assert_eq!(sink.0.len(), 1);
        assert_eq!(sink.0[0].text, "Hello world");
        assert_eq!(sink.0[0].chars.len(), 11);
    }

    #[test]
    fn baseline_change_starts_a_new_line() {
        let metrics = Fixed(10.0);
        let mut sink = Collect::default();
        let mut line = TextLine::new();
        line.add(segment("one", 0.0, 100.0), &metrics, &mut sink);
        line.add(segment("two", 0.0, 80.0), &metrics, &mut sink);
        line.flush(&mut sink);
        assert_eq!(sink.0.len(), 2);
        assert_eq!(sink.0[0].text, "one");
        assert_eq!(sink.0[1].text, "two");
    }

    #[test]
    fn segment_left_of_line_end_starts_a_new_line() {
        let metrics = Fixed(10.0);
        let mut sink = Collect::default();
        let mut line = TextLine::new();
        line.add(segment("right", 100.0, 100.0), &metrics, &mut sink);
        line.add(segment("left", 0.0, 100.0), &metrics, &mut sink);
        line.flush(&mut sink);
        assert_eq!(sink.0.len(), 2);
    }

    #[test]
    fn char_positions_are_monotonic() {
        let metrics = Fixed(8.0);
        let mut sink = Collect::default();
        let mut line = TextLine::new();
        line.add(segment("abc", 5.0, 50.0), &metrics, &mut sink);
        line.flush(&mut sink);
        let chars = &sink.0[0].chars;
        assert_eq!(chars[0].x, 5.0);
        assert_eq!(chars[1].x, 13.0);
        assert_eq!(chars[2].x, 21.0);
        assert_eq!(sink.0[0].bounds.right, 29.0);
    }

    #[test]
    fn huge_gap_is_capped() {
        let metrics = Fixed(10.0);
        let mut sink = Collect::default();
        let mut line = TextLine::new();
        line.add(segment("a", 0.0, 100.0), &metrics, &mut sink);
        line.add(segment("b", 100_000.0, 100.0), &metrics, &mut sink);
        line.flush(&mut sink);
        assert_eq!(sink.0.len(), 1);
        let spaces = sink.0[0].text.matches(' ').count();
        assert_eq!(spaces, 200);
    }

    #[test]
    fn empty_flush_emits_nothing() {
        let mut sink = Collect::default();
        TextLine::new().flush(&mut sink);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn escapement_widens_each_character() {
        let metrics = Fixed(10.0);
        let mut sink = Collect::default();
        let mut line = TextLine::new();
        let mut seg = segment("ab", 0.0, 10.0);
        seg.escp_nospace = 2.0;
        line.add(seg, &metrics, &mut sink);
        line.flush(&mut sink);
        assert_eq!(sink.0[0].chars[1].x, 12.0);
    }
}
