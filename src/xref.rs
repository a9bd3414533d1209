use crate::link::DocLinkSink;
use crate::textline::Line;
use crate::types::Point;
use std::collections::HashMap;

/// Character class of one pattern element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Atom {
    Lit(char),
    Digit,
    Word,
    Space,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quant {
    One,
    Plus,
    Star,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub atom: Atom,
    pub quant: Quant,
    /// Elements marked as capturing form the label group; they must be
    /// contiguous within the pattern.
    pub capture: bool,
}

impl Element {
    pub fn new(atom: Atom, quant: Quant) -> Element {
        Element {
            atom,
            quant,
            capture: false,
        }
    }

    pub fn captured(atom: Atom, quant: Quant) -> Element {
        Element {
            atom,
            quant,
            capture: true,
        }
    }
}

fn atom_matches(atom: Atom, ch: char) -> bool {
    match atom {
        Atom::Lit(lit) => ch == lit,
        Atom::Digit => ch.is_ascii_digit(),
        Atom::Word => ch.is_alphanumeric(),
        Atom::Space => ch.is_whitespace(),
        Atom::Any => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternMatch {
    /// Byte range of the whole match.
    pub start: usize,
    pub end: usize,
    /// Byte range of the captured label, when the pattern captures.
    pub group: Option<(usize, usize)>,
}

/// A deliberately narrow matcher: literal runs, a few character classes, and
/// greedy `+`/`*` with backtracking. Rule sets are small and lines short, so
/// the worst case stays harmless.
#[derive(Debug, Clone)]
pub struct Pattern {
    elements: Vec<Element>,
}

impl Pattern {
    pub fn new(elements: Vec<Element>) -> Pattern {
        Pattern { elements }
    }

    /// Convenience: a literal text run, each char one element.
    pub fn literal(text: &str) -> Vec<Element> {
        text.chars()
            .map(|ch| Element::new(Atom::Lit(ch), Quant::One))
            .collect()
    }

    pub fn find(&self, text: &str, from: usize) -> Option<PatternMatch> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let start_index = chars.iter().position(|(offset, _)| *offset >= from)?;
        for anchor in start_index..chars.len() {
            let mut capture: Option<(usize, usize)> = None;
            if let Some(end) = match_here(&self.elements, &chars, text.len(), anchor, &mut capture)
            {
                return Some(PatternMatch {
                    start: chars[anchor].0,
                    end,
                    group: capture,
                });
            }
        }
        None
    }
}

fn offset_at(chars: &[(usize, char)], text_len: usize, index: usize) -> usize {
    chars.get(index).map(|(offset, _)| *offset).unwrap_or(text_len)
}

fn match_here(
    elements: &[Element],
    chars: &[(usize, char)],
    text_len: usize,
    pos: usize,
    capture: &mut Option<(usize, usize)>,
) -> Option<usize> {
    let Some(element) = elements.first() else {
        return Some(offset_at(chars, text_len, pos));
    };
    let rest = &elements[1..];

    let record = |capture: &mut Option<(usize, usize)>, from: usize, to: usize| {
        if element.capture && to > from {
            let from_b = offset_at(chars, text_len, from);
            let to_b = offset_at(chars, text_len, to);
            match capture {
                None => *capture = Some((from_b, to_b)),
                Some((lo, hi)) => {
                    *lo = (*lo).min(from_b);
                    *hi = (*hi).max(to_b);
                }
            }
        }
    };

    match element.quant {
        Quant::One => {
            let (_, ch) = *chars.get(pos)?;
            if !atom_matches(element.atom, ch) {
                return None;
            }
            let saved = *capture;
            record(capture, pos, pos + 1);
            if let Some(end) = match_here(rest, chars, text_len, pos + 1, capture) {
                return Some(end);
            }
            *capture = saved;
            None
        }
        Quant::Plus | Quant::Star => {
            let min = if element.quant == Quant::Plus { 1 } else { 0 };
            let mut max = 0;
            while chars
                .get(pos + max)
                .is_some_and(|(_, ch)| atom_matches(element.atom, *ch))
            {
                max += 1;
            }
            // Greedy with backtracking.
            let mut count = max;
            loop {
                if count < min {
                    return None;
                }
                let saved = *capture;
                record(capture, pos, pos + count);
                if let Some(end) = match_here(rest, chars, text_len, pos + count, capture) {
                    return Some(end);
                }
                *capture = saved;
                if count == 0 {
                    return None;
                }
                count -= 1;
            }
        }
    }
}

/// One cross-reference rule: the pattern that marks a reference in running
/// text and the pattern that marks its destination. Both capture the label
/// that ties the two together.
#[derive(Debug, Clone)]
pub struct XRefRule {
    pub link: Pattern,
    pub dest: Pattern,
}

#[derive(Debug, Clone)]
struct Destination {
    page: usize,
    top_left: Point,
}

/// Two-pass cross-reference resolver: the scan pass records destinations per
/// label, the emit pass turns references into document links. Each rule keeps
/// its own destination table, so a label only satisfies references of the
/// rule whose destination pattern recorded it.
#[derive(Debug, Default)]
pub(crate) struct XRefs {
    rules: Vec<XRefRule>,
    /// One table per rule, same index as `rules`.
    destinations: Vec<HashMap<String, Destination>>,
}

impl XRefs {
    pub fn new(rules: Vec<XRefRule>) -> XRefs {
        let destinations = rules.iter().map(|_| HashMap::new()).collect();
        XRefs {
            rules,
            destinations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Scan pass: records each captured destination label. The first
    /// occurrence of a label wins within its rule.
    pub fn scan_line(&mut self, line: &Line, page: usize) {
        for (index, rule) in self.rules.iter().enumerate() {
            let mut from = 0;
            while let Some(found) = rule.dest.find(&line.text, from) {
                from = found.end.max(from + 1);
                let Some((lo, hi)) = found.group else {
                    continue;
                };
                let label = line.text[lo..hi].to_string();
                self.destinations[index].entry(label).or_insert(Destination {
                    page,
                    top_left: Point::new(line.bounds.left, line.bounds.top),
                });
            }
        }
    }

    /// Emit pass: finds references and links them to destinations the same
    /// rule recorded on other pages. When rules overlap, the match starting
    /// earliest wins; ties go to the longer match.
    pub fn resolve_line(&self, line: &Line, page: usize, sink: &mut dyn DocLinkSink) {
        let mut from = 0;
        while let Some((rule_index, best)) = self.best_match(&line.text, from) {
            from = best.end.max(from + 1);
            let Some((lo, hi)) = best.group else {
                continue;
            };
            let Some(dest) = self.destinations[rule_index].get(&line.text[lo..hi]) else {
                continue;
            };
            if dest.page == page {
                continue;
            }
            let covered: Vec<_> = line
                .chars
                .iter()
                .filter(|c| c.offset >= best.start && c.offset < best.end)
                .collect();
            let Some(first) = covered.first() else {
                continue;
            };
            let last = covered.last().unwrap();
            let rect = [
                first.x,
                line.bounds.bottom,
                last.x + last.width,
                line.bounds.top,
            ];
            sink.doc_link(rect, dest.page, dest.top_left);
        }
    }

    fn best_match(&self, text: &str, from: usize) -> Option<(usize, PatternMatch)> {
        let mut best: Option<(usize, PatternMatch)> = None;
        for (index, rule) in self.rules.iter().enumerate() {
            let Some(found) = rule.link.find(text, from) else {
                continue;
            };
            best = Some(match best {
                None => (index, found),
                Some((current_index, current)) => {
                    if found.start < current.start
                        || (found.start == current.start
                            && found.end - found.start > current.end - current.start)
                    {
                        (index, found)
                    } else {
                        (current_index, current)
                    }
                }
            });
        }
        best
    }
}
