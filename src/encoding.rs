use crate::fonts::{CjkEncoding, FontClass};
use crate::pdf::FontId;
use std::collections::HashMap;

/// WinAnsi code points that differ from Latin-1 (the 0x80..0x9f window).
const WINANSI_HIGH: [(u8, char); 27] = [
    (0x80, '\u{20ac}'),
    (0x82, '\u{201a}'),
    (0x83, '\u{0192}'),
    (0x84, '\u{201e}'),
    (0x85, '\u{2026}'),
    (0x86, '\u{2020}'),
    (0x87, '\u{2021}'),
    (0x88, '\u{02c6}'),
    (0x89, '\u{2030}'),
    (0x8a, '\u{0160}'),
    (0x8b, '\u{2039}'),
    (0x8c, '\u{0152}'),
    (0x8e, '\u{017d}'),
    (0x91, '\u{2018}'),
    (0x92, '\u{2019}'),
    (0x93, '\u{201c}'),
    (0x94, '\u{201d}'),
    (0x95, '\u{2022}'),
    (0x96, '\u{2013}'),
    (0x97, '\u{2014}'),
    (0x98, '\u{02dc}'),
    (0x99, '\u{2122}'),
    (0x9a, '\u{0161}'),
    (0x9b, '\u{203a}'),
    (0x9c, '\u{0153}'),
    (0x9e, '\u{017e}'),
    (0x9f, '\u{0178}'),
];

/// Byte for a character under WinAnsi, or `None` when it has no slot.
pub(crate) fn winansi_byte(ch: char) -> Option<u8> {
    let cp = ch as u32;
    match cp {
        0x20..=0x7e => Some(cp as u8),
        0xa0..=0xff => Some(cp as u8),
        _ => WINANSI_HIGH
            .iter()
            .find(|(_, c)| *c == ch)
            .map(|(b, _)| *b),
    }
}

pub(crate) fn winansi_char(byte: u8) -> Option<char> {
    match byte {
        0x20..=0x7e | 0xa0..=0xff => Some(byte as char),
        _ => WINANSI_HIGH
            .iter()
            .find(|(b, _)| *b == byte)
            .map(|(_, c)| *c),
    }
}

/// Unicode ranges assumed renderable when no glyph table is available to
/// consult (bitmap-class fonts). Sorted for binary search.
const BASIC_COVERAGE: [(u32, u32); 12] = [
    (0x0020, 0x007e),
    (0x00a0, 0x024f),
    (0x0370, 0x03ff),
    (0x0400, 0x04ff),
    (0x1e00, 0x1eff),
    (0x2000, 0x206f),
    (0x20a0, 0x20cf),
    (0x2100, 0x214f),
    (0x2150, 0x218f),
    (0x2190, 0x21ff),
    (0x2200, 0x22ff),
    (0x25a0, 0x25ff),
];

pub(crate) fn basic_coverage(ch: char) -> bool {
    let cp = ch as u32;
    BASIC_COVERAGE
        .binary_search_by(|(from, to)| {
            if cp < *from {
                std::cmp::Ordering::Greater
            } else if cp > *to {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .is_ok()
}

struct CidRange {
    from: u32,
    to: u32,
    cid_base: u16,
}

const fn range(from: u32, to: u32, cid_base: u16) -> CidRange {
    CidRange { from, to, cid_base }
}

// Contiguous runs of the Adobe character collections, limited to the blocks
// whose CIDs really are consecutive (kana, bopomofo, jamo, hangul, fullwidth
// forms). Han ideographs are not ordered by codepoint in any collection, so
// they are not mapped here and fall through as unrenderable.
const JAPAN1: [CidRange; 4] = [
    range(0x3000, 0x3002, 633),
    range(0x3041, 0x3093, 842),
    range(0x30a1, 0x30f6, 925),
    range(0xff01, 0xff5e, 694),
];

const CNS1: [CidRange; 2] = [
    range(0x3105, 0x3129, 414),
    range(0xff01, 0xff5e, 120),
];

const GB1: [CidRange; 2] = [
    range(0x3041, 0x3093, 356),
    range(0xff01, 0xff5e, 262),
];

const KOREA1: [CidRange; 2] = [
    range(0x3131, 0x318e, 358),
    range(0xac00, 0xd7a3, 970),
];

/// Two-byte CID for a character in one collection, or `None` when the
/// collection does not carry it.
pub(crate) fn cid_for(encoding: CjkEncoding, ch: char) -> Option<u16> {
    let table: &[CidRange] = match encoding {
        CjkEncoding::Japanese => &JAPAN1,
        CjkEncoding::ChineseCns1 => &CNS1,
        CjkEncoding::ChineseGb1 => &GB1,
        CjkEncoding::Korean => &KOREA1,
    };
    let cp = ch as u32;
    for entry in table {
        if cp >= entry.from && cp <= entry.to {
            return Some(entry.cid_base + (cp - entry.from) as u16);
        }
    }
    None
}

/// How one resolved character is addressed in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Encoding {
    WinAnsi,
    /// One of the dynamically filled 256-slot encodings; `index` selects
    /// which, `class` which font technology family it belongs to.
    User { class: FontClass, index: u8 },
    Cjk(CjkEncoding),
}

impl Encoding {
    /// Stable numeric id used to key the font cache.
    pub fn id(&self) -> u32 {
        match self {
            Encoding::WinAnsi => 0,
            Encoding::User { class, index } => {
                let base = match class {
                    FontClass::Outline => 0x100,
                    FontClass::Bitmap => 0x200,
                };
                base | *index as u32
            }
            Encoding::Cjk(enc) => {
                0x300
                    + match enc {
                        CjkEncoding::Japanese => 0,
                        CjkEncoding::ChineseCns1 => 1,
                        CjkEncoding::ChineseGb1 => 2,
                        CjkEncoding::Korean => 3,
                    }
            }
        }
    }
}

pub(crate) const USER_ENCODING_COUNT: usize = 5;
const USER_SLOTS: usize = 256;

/// Allocates characters outside WinAnsi into up to five user-defined 256-slot
/// encodings. One allocator exists per font class; slots are handed out in
/// arrival order and never reclaimed within a job.
#[derive(Debug)]
pub(crate) struct UserEncodings {
    class: FontClass,
    map: HashMap<char, (u8, u8)>,
    slots: Vec<Vec<u16>>,
}

impl UserEncodings {
    pub fn new(class: FontClass) -> UserEncodings {
        UserEncodings {
            class,
            map: HashMap::new(),
            slots: Vec::new(),
        }
    }

    /// Encoding index and slot byte for `ch`, allocating on first sight. The
    /// flag is true exactly once per distinct character, on the call that
    /// allocated it. `None` once all encodings are full.
    pub fn allocate(&mut self, ch: char) -> Option<(u8, u8, bool)> {
        if let Some((index, slot)) = self.map.get(&ch) {
            return Some((*index, *slot, false));
        }
        if let Some(last) = self.slots.last() {
            if last.len() < USER_SLOTS {
                let index = (self.slots.len() - 1) as u8;
                let slot = last.len() as u8;
                self.slots.last_mut().unwrap().push(ch as u16);
                self.map.insert(ch, (index, slot));
                return Some((index, slot, true));
            }
        }
        if self.slots.len() >= USER_ENCODING_COUNT {
            return None;
        }
        let index = self.slots.len() as u8;
        self.slots.push(vec![ch as u16]);
        self.map.insert(ch, (index, 0));
        Some((index, 0, true))
    }

    pub fn class(&self) -> FontClass {
        self.class
    }

    /// Slot tables keyed by encoding index, for the differences arrays.
    pub fn slot_tables(&self) -> impl Iterator<Item = (u8, &[u16])> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slots)| (index as u8, slots.as_slice()))
    }
}

struct CacheEntry {
    name: String,
    encoding_id: u32,
    font: FontId,
}

/// Registered-font lookup keyed by resolved font name and encoding id, with a
/// single most-recently-used slot checked before the linear scan. Text runs
/// overwhelmingly reuse the previous (font, encoding) pair.
#[derive(Default)]
pub(crate) struct FontCache {
    entries: Vec<CacheEntry>,
    last: Option<usize>,
}

impl FontCache {
    pub fn new() -> FontCache {
        FontCache::default()
    }

    pub fn get(&mut self, name: &str, encoding_id: u32) -> Option<FontId> {
        if let Some(last) = self.last {
            let entry = &self.entries[last];
            if entry.encoding_id == encoding_id && entry.name == name {
                return Some(entry.font);
            }
        }
        let index = self
            .entries
            .iter()
            .position(|e| e.encoding_id == encoding_id && e.name == name)?;
        self.last = Some(index);
        Some(self.entries[index].font)
    }

    pub fn insert(&mut self, name: impl Into<String>, encoding_id: u32, font: FontId) {
        self.entries.push(CacheEntry {
            name: name.into(),
            encoding_id,
            font,
        });
        self.last = Some(self.entries.len() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winansi_round_trip_for_printable_ascii() {
        for cp in 0x20u8..=0x7e {
            let ch = cp as char;
            assert_eq!(winansi_byte(ch), Some(cp));
            assert_eq!(winansi_char(cp), Some(ch));
        }
    }

    #[test]
    fn winansi_maps_euro_and_quotes() {
        assert_eq!(winansi_byte('\u{20ac}'), Some(0x80));
        assert_eq!(winansi_byte('\u{201c}'), Some(0x93));
        assert_eq!(winansi_char(0x97), Some('\u{2014}'));
        // Control window gaps stay unmapped.
        assert_eq!(winansi_char(0x81), None);
        assert_eq!(winansi_byte('\u{3042}'), None);
    }

    #[test]
    fn coverage_accepts_latin_and_rejects_cjk() {
        assert!(basic_coverage('A'));
        assert!(basic_coverage('\u{0416}'));
        assert!(!basic_coverage('\u{4e2d}'));
    }

    #[test]
    fn cid_lookup_uses_collection_tables() {
        // Hiragana A.
        assert_eq!(cid_for(CjkEncoding::Japanese, '\u{3042}'), Some(843));
        // Katakana A.
        assert_eq!(cid_for(CjkEncoding::Japanese, '\u{30a2}'), Some(926));
        // Hangul syllables are only in the Korean collection.
        assert_eq!(cid_for(CjkEncoding::Japanese, '\u{ac00}'), None);
        assert_eq!(cid_for(CjkEncoding::Korean, '\u{ac00}'), Some(970));
    }

    #[test]
    fn han_ideographs_are_not_mapped() {
        // Collection CIDs for ideographs do not follow codepoint order, so
        // no table claims them.
        for encoding in [
            CjkEncoding::Japanese,
            CjkEncoding::ChineseCns1,
            CjkEncoding::ChineseGb1,
            CjkEncoding::Korean,
        ] {
            assert_eq!(cid_for(encoding, '\u{4e00}'), None);
            assert_eq!(cid_for(encoding, '\u{4e2d}'), None);
        }
    }

    #[test]
    fn allocator_assigns_slots_in_arrival_order() {
        let mut user = UserEncodings::new(FontClass::Outline);
        assert_eq!(user.allocate('\u{2603}'), Some((0, 0, true)));
        assert_eq!(user.allocate('\u{2604}'), Some((0, 1, true)));
        // Repeat lookups return the original slot, no longer fresh.
        assert_eq!(user.allocate('\u{2603}'), Some((0, 0, false)));
    }

    #[test]
    fn allocator_overflows_into_next_encoding() {
        let mut user = UserEncodings::new(FontClass::Outline);
        for cp in 0..256u32 {
            let ch = char::from_u32(0x2460 + cp).unwrap();
            assert_eq!(user.allocate(ch), Some((0, cp as u8, true)));
        }
        assert_eq!(user.allocate('\u{2603}'), Some((1, 0, true)));
    }

    #[test]
    fn allocator_exhausts_after_five_encodings() {
        let mut user = UserEncodings::new(FontClass::Bitmap);
        for n in 0..(USER_ENCODING_COUNT * 256) as u32 {
            let ch = char::from_u32(0x3400 + n).unwrap();
            assert!(user.allocate(ch).is_some());
        }
        assert_eq!(user.allocate('\u{2603}'), None);
    }

    #[test]
    fn encoding_ids_are_distinct() {
        let ids = [
            Encoding::WinAnsi.id(),
            Encoding::User {
                class: FontClass::Outline,
                index: 0,
            }
            .id(),
            Encoding::User {
                class: FontClass::Bitmap,
                index: 0,
            }
            .id(),
            Encoding::Cjk(CjkEncoding::Japanese).id(),
            Encoding::Cjk(CjkEncoding::Korean).id(),
        ];
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn cache_mru_slot_survives_misses() {
        let mut cache = FontCache::new();
        cache.insert("Helvetica", 0, 3);
        cache.insert("Courier", 0, 4);
        assert_eq!(cache.get("Courier", 0), Some(4));
        assert_eq!(cache.get("Helvetica", 0), Some(3));
        assert_eq!(cache.get("Helvetica", 1), None);
        assert_eq!(cache.get("Helvetica", 0), Some(3));
    }
}
