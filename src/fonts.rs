use crate::report::Report;
use std::fs;
use std::path::{Path, PathBuf};

/// Logical font selection carried in the graphics state and snapshotted into
/// text segments. Mirrors the font attributes of the operation stream.
#[derive(Debug, Clone, PartialEq)]
pub struct FontDescriptor {
    pub family: String,
    pub style: String,
    pub size: f32,
    /// Degrees counter-clockwise; rotated text is drawn but excluded from
    /// line reconstruction.
    pub rotation: f32,
    pub shear: f32,
    pub spacing: i32,
    pub encoding: i32,
    pub flags: u32,
}

impl Default for FontDescriptor {
    fn default() -> Self {
        FontDescriptor {
            family: "Helvetica".to_string(),
            style: "Regular".to_string(),
            size: 12.0,
            rotation: 0.0,
            shear: 90.0,
            spacing: 0,
            encoding: 0,
            flags: 0,
        }
    }
}

impl FontDescriptor {
    /// Name used to key the font cache and the font file table.
    pub fn resolved_name(&self) -> String {
        if self.style.is_empty() || self.style == "Regular" {
            self.family.clone()
        } else {
            format!("{}-{}", self.family, self.style)
        }
    }

    pub fn is_rotated(&self) -> bool {
        self.rotation != 0.0
    }
}

/// Source font technology; decides which family of user-defined encodings a
/// glyph is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontClass {
    Outline,
    Bitmap,
}

/// The four CJK composite-font encodings, searched in caller-configurable
/// priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CjkEncoding {
    Japanese,
    ChineseCns1,
    ChineseGb1,
    Korean,
}

pub const DEFAULT_CJK_ORDER: [CjkEncoding; 4] = [
    CjkEncoding::Japanese,
    CjkEncoding::ChineseCns1,
    CjkEncoding::ChineseGb1,
    CjkEncoding::Korean,
];

/// A persistent record for one discovered font file, uniquely keyed by path.
/// Read-only during translation.
#[derive(Debug, Clone)]
pub struct FontFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub class: FontClass,
    pub embed: bool,
    /// Set when this entry stands in for another face; embedding a
    /// substitute would bake the wrong outlines into the document.
    pub substitute_for: Option<String>,
}

/// The font file table for one job: populated once by scanning font
/// directories, optionally overridden by user preferences.
#[derive(Debug, Default)]
pub struct Fonts {
    files: Vec<FontFile>,
    cjk_order: Vec<(CjkEncoding, bool)>,
}

impl Fonts {
    pub fn new() -> Fonts {
        Fonts {
            files: Vec::new(),
            cjk_order: DEFAULT_CJK_ORDER.iter().map(|e| (*e, true)).collect(),
        }
    }

    pub fn collect_dir(&mut self, dir: impl AsRef<Path>) {
        let dir = dir.as_ref();
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                self.collect_file(path);
            } else if path.is_dir() {
                self.collect_dir(path);
            }
        }
    }

    pub fn collect_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if self.files.iter().any(|f| f.path == path) {
            return;
        }
        let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
            return;
        };
        let ext = ext.to_ascii_lowercase();
        let class = match ext.as_str() {
            "ttf" | "otf" => FontClass::Outline,
            "pfa" | "pfb" | "afm" | "pfm" => FontClass::Bitmap,
            _ => return,
        };
        let Ok(meta) = fs::metadata(&path) else {
            return;
        };
        let name = match class {
            FontClass::Outline => outline_font_name(&path),
            FontClass::Bitmap => None,
        }
        .or_else(|| {
            path.file_stem()
                .and_then(|v| v.to_str())
                .map(|v| v.to_string())
        });
        let Some(name) = name else {
            return;
        };
        self.files.push(FontFile {
            name,
            path,
            size: meta.len(),
            class,
            embed: true,
            substitute_for: None,
        });
    }

    /// Apply a user override for one font, keyed by resolved name.
    pub fn set_embed(&mut self, name: &str, embed: bool) {
        for file in &mut self.files {
            if file.name == name {
                file.embed = embed;
            }
        }
    }

    pub fn add_substitute(&mut self, file: FontFile) {
        self.files.push(file);
    }

    pub fn find_by_name(&self, name: &str) -> Option<&FontFile> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn files(&self) -> &[FontFile] {
        &self.files
    }

    pub fn set_cjk_order(&mut self, order: &[(CjkEncoding, bool)], report: &mut Report) {
        if order.is_empty() {
            report.warning(0, "empty CJK encoding order ignored");
            return;
        }
        self.cjk_order = order.to_vec();
    }

    /// Enabled CJK encodings in priority order.
    pub fn cjk_order(&self) -> Vec<CjkEncoding> {
        self.cjk_order
            .iter()
            .filter(|(_, active)| *active)
            .map(|(enc, _)| *enc)
            .collect()
    }

    /// Class of the font a descriptor resolves to; outline when unknown.
    pub fn class_of(&self, resolved_name: &str) -> FontClass {
        self.find_by_name(resolved_name)
            .map(|f| f.class)
            .unwrap_or(FontClass::Outline)
    }
}

fn outline_font_name(path: &Path) -> Option<String> {
    use ttf_parser::name::name_id;

    let data = fs::read(path).ok()?;
    let face = ttf_parser::Face::parse(&data, 0).ok()?;
    let mut family = None;
    let mut full = None;
    let mut post = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                if family.is_none() {
                    family = Some(name);
                }
            }
            name_id::FULL_NAME => {
                if full.is_none() {
                    full = Some(name);
                }
            }
            name_id::POST_SCRIPT_NAME => {
                if post.is_none() {
                    post = Some(name);
                }
            }
            _ => {}
        }
    }
    post.or(full).or(family)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_name_folds_regular_style() {
        let mut font = FontDescriptor::default();
        assert_eq!(font.resolved_name(), "Helvetica");
        font.style = "Bold".to_string();
        assert_eq!(font.resolved_name(), "Helvetica-Bold");
    }

    #[test]
    fn cjk_order_filters_disabled_entries() {
        let mut report = Report::new();
        let mut fonts = Fonts::new();
        fonts.set_cjk_order(
            &[
                (CjkEncoding::Korean, true),
                (CjkEncoding::Japanese, false),
                (CjkEncoding::ChineseGb1, true),
            ],
            &mut report,
        );
        assert_eq!(
            fonts.cjk_order(),
            vec![CjkEncoding::Korean, CjkEncoding::ChineseGb1]
        );
    }

    #[test]
    fn default_cjk_order_matches_job_default() {
        let fonts = Fonts::new();
        assert_eq!(fonts.cjk_order(), DEFAULT_CJK_ORDER.to_vec());
    }

    #[test]
    fn class_of_unknown_font_is_outline() {
        let fonts = Fonts::new();
        assert_eq!(fonts.class_of("NoSuchFont"), FontClass::Outline);
    }

    #[test]
    fn substitute_entry_is_found_by_name() {
        let mut fonts = Fonts::new();
        fonts.add_substitute(FontFile {
            name: "Swis721 BT".to_string(),
            path: PathBuf::from("/fonts/helvetica.ttf"),
            size: 12_000,
            class: FontClass::Outline,
            embed: true,
            substitute_for: Some("Helvetica".to_string()),
        });
        let file = fonts.find_by_name("Swis721 BT").unwrap();
        assert!(file.substitute_for.is_some());
    }
}
