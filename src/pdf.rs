use crate::encoding::winansi_char;
use crate::error::PlatenError;
use crate::fonts::{CjkEncoding, FontClass};
use crate::types::{Color, Stipple};
use std::collections::HashMap;
use std::fmt::Write as _;

pub(crate) type FontId = usize;
pub(crate) type ImageId = usize;
pub(crate) type PatternId = usize;
pub(crate) type OutlineId = usize;

/// Formats a coordinate with trailing zeros trimmed.
pub(crate) fn num(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let mut out = format!("{:.3}", value);
    while out.ends_with('0') {
        out.pop();
    }
    if out.ends_with('.') {
        out.pop();
    }
    if out.is_empty() || out == "-" {
        out = "0".to_string();
    }
    out
}

fn escape_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for byte in raw.bytes() {
        match byte {
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\{:03o}", byte);
            }
        }
    }
    out
}

fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '+' || ch == '.' {
            out.push(ch);
        } else {
            out.push('#');
            let _ = write!(out, "{:02X}", (ch as u32) & 0xff);
        }
    }
    out
}

/// Buffered page content stream; appends raw PDF operators.
#[derive(Debug, Default)]
pub(crate) struct Content {
    buf: String,
}

impl Content {
    pub fn new() -> Content {
        Content::default()
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    fn op(&mut self, text: &str) {
        self.buf.push_str(text);
        self.buf.push('\n');
    }

    pub fn save(&mut self) {
        self.op("q");
    }

    pub fn restore(&mut self) {
        self.op("Q");
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        self.op(&format!("{} {} m", num(x), num(y)));
    }

    pub fn line_to(&mut self, x: f32, y: f32) {
        self.op(&format!("{} {} l", num(x), num(y)));
    }

    pub fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x3: f32, y3: f32) {
        self.op(&format!(
            "{} {} {} {} {} {} c",
            num(x1),
            num(y1),
            num(x2),
            num(y2),
            num(x3),
            num(y3)
        ));
    }

    pub fn rect(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.op(&format!(
            "{} {} {} {} re",
            num(x),
            num(y),
            num(width),
            num(height)
        ));
    }

    pub fn close_path(&mut self) {
        self.op("h");
    }

    pub fn fill(&mut self) {
        self.op("f");
    }

    pub fn stroke(&mut self) {
        self.op("S");
    }

    pub fn clip(&mut self) {
        self.op("W n");
    }

    pub fn set_line_width(&mut self, width: f32) {
        self.op(&format!("{} w", num(width)));
    }

    pub fn set_line_cap(&mut self, cap: u8) {
        self.op(&format!("{} J", cap));
    }

    pub fn set_line_join(&mut self, join: u8) {
        self.op(&format!("{} j", join));
    }

    pub fn set_miter_limit(&mut self, limit: f32) {
        self.op(&format!("{} M", num(limit)));
    }

    /// Sets both fill and stroke color.
    pub fn set_rgb(&mut self, color: Color) {
        let (r, g, b) = color.to_unit_rgb();
        self.op(&format!("{} {} {} rg", num(r), num(g), num(b)));
        self.op(&format!("{} {} {} RG", num(r), num(g), num(b)));
    }

    pub fn set_stroke_rgb(&mut self, color: Color) {
        let (r, g, b) = color.to_unit_rgb();
        self.op(&format!("{} {} {} RG", num(r), num(g), num(b)));
    }

    pub fn set_fill_pattern(&mut self, resource: &str) {
        self.op("/Pattern cs");
        self.op(&format!("/{} scn", resource));
    }

    pub fn begin_text(&mut self) {
        self.op("BT");
    }

    pub fn end_text(&mut self) {
        self.op("ET");
    }

    pub fn set_font(&mut self, resource: &str, size: f32) {
        self.op(&format!("/{} {} Tf", resource, num(size)));
    }

    pub fn text_position(&mut self, x: f32, y: f32) {
        self.op(&format!("{} {} Td", num(x), num(y)));
    }

    pub fn text_matrix(&mut self, a: f32, b: f32, c: f32, d: f32, x: f32, y: f32) {
        self.op(&format!(
            "{} {} {} {} {} {} Tm",
            num(a),
            num(b),
            num(c),
            num(d),
            num(x),
            num(y)
        ));
    }

    pub fn show_bytes(&mut self, bytes: &[u8]) {
        let mut literal = String::with_capacity(bytes.len() + 2);
        for &byte in bytes {
            match byte {
                b'(' => literal.push_str("\\("),
                b')' => literal.push_str("\\)"),
                b'\\' => literal.push_str("\\\\"),
                0x20..=0x7e => literal.push(byte as char),
                _ => {
                    let _ = write!(literal, "\\{:03o}", byte);
                }
            }
        }
        self.op(&format!("({}) Tj", literal));
    }

    pub fn show_hex(&mut self, bytes: &[u8]) {
        let mut hex = String::with_capacity(bytes.len() * 2);
        for &byte in bytes {
            let _ = write!(hex, "{:02X}", byte);
        }
        self.op(&format!("<{}> Tj", hex));
    }

    pub fn place_image(&mut self, resource: &str, x: f32, y: f32, width: f32, height: f32) {
        self.save();
        self.op(&format!(
            "{} 0 0 {} {} {} cm",
            num(width),
            num(height),
            num(x),
            num(y)
        ));
        self.op(&format!("/{} Do", resource));
        self.restore();
    }
}

/// How a registered font addresses its glyphs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FontEncodingKind {
    WinAnsi,
    /// A 256-slot user-defined encoding; slot contents come from the
    /// allocator tables handed over before `finish`.
    UserDefined { class: FontClass, index: u8 },
    /// Referenced CJK composite font, Identity-H, never embedded.
    Cid(CjkEncoding),
}

#[derive(Debug, Clone)]
pub(crate) struct FontSpec {
    pub base_name: String,
    pub encoding: FontEncodingKind,
    /// Raw font program bytes; present only when embedding is permitted.
    pub embed_data: Option<Vec<u8>>,
}

struct FontRecord {
    spec: FontSpec,
    resource: String,
}

struct ImageRecord {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
    mask: Option<Vec<u8>>,
    resource: String,
}

struct PatternRecord {
    stipple: Stipple,
    foreground: Color,
    background: Color,
    resource: String,
}

#[derive(Debug, Clone)]
pub(crate) enum Annotation {
    Uri {
        rect: [f32; 4],
        url: String,
    },
    GoTo {
        rect: [f32; 4],
        page: usize,
        x: f32,
        y: f32,
    },
}

struct OutlineNode {
    title: String,
    parent: Option<OutlineId>,
    children: Vec<OutlineId>,
    page: usize,
    x: f32,
    y: f32,
    open: bool,
}

struct PageRecord {
    width: f32,
    height: f32,
    content: String,
    annotations: Vec<Annotation>,
}

/// Accumulates one PDF document and serializes it on `finish`. Object ids are
/// assigned late so pages, fonts and outlines can reference each other freely
/// while the job is still being translated.
pub(crate) struct PdfDoc {
    pages: Vec<PageRecord>,
    current: Option<PageRecord>,
    fonts: Vec<FontRecord>,
    images: Vec<ImageRecord>,
    patterns: Vec<PatternRecord>,
    outlines: Vec<OutlineNode>,
    user_slots: HashMap<(FontClass, u8), Vec<u16>>,
    title: Option<String>,
    creator: Option<String>,
    border_width: f32,
}

impl PdfDoc {
    pub fn new() -> PdfDoc {
        PdfDoc {
            pages: Vec::new(),
            current: None,
            fonts: Vec::new(),
            images: Vec::new(),
            patterns: Vec::new(),
            outlines: Vec::new(),
            user_slots: HashMap::new(),
            title: None,
            creator: None,
            border_width: 1.0,
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    pub fn set_creator(&mut self, creator: impl Into<String>) {
        self.creator = Some(creator.into());
    }

    pub fn set_border_width(&mut self, width: f32) {
        self.border_width = width.max(0.0);
    }

    pub fn begin_page(&mut self, width: f32, height: f32) {
        self.current = Some(PageRecord {
            width,
            height,
            content: String::new(),
            annotations: Vec::new(),
        });
    }

    pub fn end_page(&mut self, content: Content) {
        if let Some(mut page) = self.current.take() {
            page.content = content.buf;
            self.pages.push(page);
        }
    }

    pub fn add_annotation(&mut self, annotation: Annotation) {
        if let Some(page) = self.current.as_mut() {
            page.annotations.push(annotation);
        }
    }

    pub fn register_font(&mut self, spec: FontSpec) -> Result<FontId, PlatenError> {
        if spec.base_name.is_empty() {
            return Err(PlatenError::Font("empty font name".to_string()));
        }
        let resource = format!("F{}", self.fonts.len());
        self.fonts.push(FontRecord { spec, resource });
        Ok(self.fonts.len() - 1)
    }

    pub fn font_resource(&self, font: FontId) -> &str {
        &self.fonts[font].resource
    }

    /// `rgba` is one RGBA quad per pixel; the alpha channel is dropped. The
    /// optional mask is 1 bit per pixel, MSB first, rows padded to a byte,
    /// set bits marking transparent pixels.
    pub fn add_image(
        &mut self,
        width: u32,
        height: u32,
        rgba: &[u8],
        mask: Option<Vec<u8>>,
    ) -> ImageId {
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        for quad in rgba.chunks_exact(4) {
            rgb.extend_from_slice(&quad[..3]);
        }
        let resource = format!("Im{}", self.images.len());
        self.images.push(ImageRecord {
            width,
            height,
            rgb,
            mask,
            resource,
        });
        self.images.len() - 1
    }

    pub fn image_resource(&self, image: ImageId) -> &str {
        &self.images[image].resource
    }

    pub fn add_pattern(&mut self, stipple: Stipple, foreground: Color, background: Color) -> PatternId {
        let resource = format!("P{}", self.patterns.len());
        self.patterns.push(PatternRecord {
            stipple,
            foreground,
            background,
            resource,
        });
        self.patterns.len() - 1
    }

    pub fn pattern_resource(&self, pattern: PatternId) -> &str {
        &self.patterns[pattern].resource
    }

    /// An out-of-range parent id is clamped to the root.
    pub fn add_outline(
        &mut self,
        title: impl Into<String>,
        parent: Option<OutlineId>,
        page: usize,
        x: f32,
        y: f32,
        open: bool,
    ) -> OutlineId {
        let parent = parent.filter(|id| *id < self.outlines.len());
        let id = self.outlines.len();
        self.outlines.push(OutlineNode {
            title: title.into(),
            parent,
            children: Vec::new(),
            page,
            x,
            y,
            open,
        });
        if let Some(parent_id) = parent {
            self.outlines[parent_id].children.push(id);
        }
        id
    }

    pub fn set_user_encoding_slots(&mut self, class: FontClass, index: u8, codepoints: Vec<u16>) {
        self.user_slots.insert((class, index), codepoints);
    }

    pub fn finish(self) -> Result<Vec<u8>, PlatenError> {
        Serializer::new(self).run()
    }
}

struct Serializer {
    doc: PdfDoc,
    objects: Vec<Option<Vec<u8>>>,
}

impl Serializer {
    fn new(doc: PdfDoc) -> Serializer {
        Serializer {
            doc,
            objects: Vec::new(),
        }
    }

    fn reserve(&mut self) -> usize {
        self.objects.push(None);
        self.objects.len()
    }

    fn set(&mut self, id: usize, body: Vec<u8>) {
        self.objects[id - 1] = Some(body);
    }

    fn add(&mut self, body: Vec<u8>) -> usize {
        self.objects.push(Some(body));
        self.objects.len()
    }

    fn add_stream(&mut self, dict_extra: &str, data: &[u8]) -> usize {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!("<< /Length {} {} >>\nstream\n", data.len(), dict_extra).as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.add(body)
    }

    fn run(mut self) -> Result<Vec<u8>, PlatenError> {
        if self.doc.current.is_some() {
            // An unterminated page would silently vanish; close it empty.
            let page = self.doc.current.take().unwrap();
            self.doc.pages.push(page);
        }

        let catalog_id = self.reserve();
        let pages_root_id = self.reserve();
        let info_id = self.reserve();
        let resources_id = self.reserve();

        // Page objects first so annotations and outlines can point at them.
        let page_ids: Vec<usize> = (0..self.doc.pages.len()).map(|_| self.reserve()).collect();

        let font_objects = self.build_fonts();
        let image_objects = self.build_images();
        let pattern_objects = self.build_patterns();

        let mut resources = String::from("<< ");
        if !font_objects.is_empty() {
            resources.push_str("/Font << ");
            for (resource, id) in &font_objects {
                let _ = write!(resources, "/{} {} 0 R ", resource, id);
            }
            resources.push_str(">> ");
        }
        if !image_objects.is_empty() {
            resources.push_str("/XObject << ");
            for (resource, id) in &image_objects {
                let _ = write!(resources, "/{} {} 0 R ", resource, id);
            }
            resources.push_str(">> ");
        }
        if !pattern_objects.is_empty() {
            resources.push_str("/Pattern << ");
            for (resource, id) in &pattern_objects {
                let _ = write!(resources, "/{} {} 0 R ", resource, id);
            }
            resources.push_str(">> ");
        }
        resources.push_str(">>");
        self.set(resources_id, resources.into_bytes());

        let pages = std::mem::take(&mut self.doc.pages);
        for (index, page) in pages.iter().enumerate() {
            let content_id = self.add_stream("", page.content.as_bytes());
            let mut annots = String::new();
            if !page.annotations.is_empty() {
                annots.push_str("/Annots [ ");
                for annotation in &page.annotations {
                    let id = self.build_annotation(annotation, &page_ids);
                    let _ = write!(annots, "{} 0 R ", id);
                }
                annots.push(']');
            }
            let body = format!(
                "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] \
                 /Resources {} 0 R /Contents {} 0 R {} >>",
                pages_root_id,
                num(page.width),
                num(page.height),
                resources_id,
                content_id,
                annots
            );
            self.set(page_ids[index], body.into_bytes());
        }

        let outline_root = self.build_outlines(&page_ids);

        let mut kids = String::new();
        for id in &page_ids {
            let _ = write!(kids, "{} 0 R ", id);
        }
        self.set(
            pages_root_id,
            format!(
                "<< /Type /Pages /Kids [ {}] /Count {} >>",
                kids,
                page_ids.len()
            )
            .into_bytes(),
        );

        let outlines_entry = match outline_root {
            Some(id) => format!("/Outlines {} 0 R /PageMode /UseOutlines ", id),
            None => String::new(),
        };
        self.set(
            catalog_id,
            format!(
                "<< /Type /Catalog /Pages {} 0 R {}>>",
                pages_root_id, outlines_entry
            )
            .into_bytes(),
        );

        let mut info = String::from("<< /Producer (platen) ");
        if let Some(title) = &self.doc.title {
            let _ = write!(info, "/Title ({}) ", escape_string(title));
        }
        if let Some(creator) = &self.doc.creator {
            let _ = write!(info, "/Creator ({}) ", escape_string(creator));
        }
        info.push_str(">>");
        self.set(info_id, info.into_bytes());

        self.assemble(catalog_id, info_id)
    }

    fn build_annotation(&mut self, annotation: &Annotation, page_ids: &[usize]) -> usize {
        let border = num(self.doc.border_width);
        let body = match annotation {
            Annotation::Uri { rect, url } => format!(
                "<< /Type /Annot /Subtype /Link /Rect [{} {} {} {}] \
                 /Border [0 0 {}] /A << /S /URI /URI ({}) >> >>",
                num(rect[0]),
                num(rect[1]),
                num(rect[2]),
                num(rect[3]),
                border,
                escape_string(url)
            ),
            Annotation::GoTo { rect, page, x, y } => {
                let target = page_ids.get(*page).copied().unwrap_or(page_ids[0]);
                format!(
                    "<< /Type /Annot /Subtype /Link /Rect [{} {} {} {}] \
                     /Border [0 0 {}] /Dest [{} 0 R /XYZ {} {} null] >>",
                    num(rect[0]),
                    num(rect[1]),
                    num(rect[2]),
                    num(rect[3]),
                    border,
                    target,
                    num(*x),
                    num(*y)
                )
            }
        };
        self.add(body.into_bytes())
    }

    fn build_fonts(&mut self) -> Vec<(String, usize)> {
        let fonts = std::mem::take(&mut self.doc.fonts);
        let mut out = Vec::with_capacity(fonts.len());
        for record in &fonts {
            let id = match &record.spec.encoding {
                FontEncodingKind::WinAnsi => self.build_simple_font(&record.spec, None),
                FontEncodingKind::UserDefined { class, index } => {
                    let slots = self
                        .doc
                        .user_slots
                        .get(&(*class, *index))
                        .cloned()
                        .unwrap_or_default();
                    self.build_simple_font(&record.spec, Some(slots))
                }
                FontEncodingKind::Cid(encoding) => self.build_cid_font(&record.spec, *encoding),
            };
            out.push((record.resource.clone(), id));
        }
        out
    }

    /// A simple 8-bit font: embedded TrueType when the program bytes are
    /// available, otherwise a base-14 reference. `slots` carries the
    /// user-defined encoding as `uniXXXX` differences.
    fn build_simple_font(&mut self, spec: &FontSpec, slots: Option<Vec<u16>>) -> usize {
        let base = sanitize_name(&spec.base_name);
        let encoding = match &slots {
            None => "/Encoding /WinAnsiEncoding".to_string(),
            Some(codepoints) => {
                let mut diffs = String::from("/Encoding << /Type /Encoding /Differences [ 0 ");
                for cp in codepoints {
                    let _ = write!(diffs, "/uni{:04X} ", cp);
                }
                diffs.push_str("] >>");
                diffs
            }
        };

        let Some(data) = spec.embed_data.clone() else {
            let base14 = base14_name(&spec.base_name);
            let body = format!(
                "<< /Type /Font /Subtype /Type1 /BaseFont /{} {} >>",
                base14, encoding
            );
            return self.add(body.into_bytes());
        };

        let metrics = face_metrics(&data);
        let file_id = self.add_stream(&format!("/Length1 {}", data.len()), &data);
        let descriptor = format!(
            "<< /Type /FontDescriptor /FontName /{} /Flags {} /FontBBox [{} {} {} {}] \
             /ItalicAngle {} /Ascent {} /Descent {} /CapHeight {} /StemV 80 \
             /FontFile2 {} 0 R >>",
            base,
            if metrics.symbolic { 4 } else { 32 },
            metrics.bbox.0,
            metrics.bbox.1,
            metrics.bbox.2,
            metrics.bbox.3,
            metrics.italic_angle,
            metrics.ascent,
            metrics.descent,
            metrics.cap_height,
            file_id
        );
        let descriptor_id = self.add(descriptor.into_bytes());

        let widths = match &slots {
            None => winansi_widths(&data),
            Some(codepoints) => slot_widths(&data, codepoints),
        };
        let (first, last) = match &slots {
            None => (32usize, 255usize),
            Some(codepoints) => (0usize, codepoints.len().saturating_sub(1)),
        };
        let mut widths_text = String::from("[ ");
        for w in &widths {
            let _ = write!(widths_text, "{} ", w);
        }
        widths_text.push(']');

        let body = format!(
            "<< /Type /Font /Subtype /TrueType /BaseFont /{} /FirstChar {} /LastChar {} \
             /Widths {} {} /FontDescriptor {} 0 R >>",
            base, first, last, widths_text, encoding, descriptor_id
        );
        self.add(body.into_bytes())
    }

    /// CJK composite fonts are referenced by well-known name, never embedded.
    fn build_cid_font(&mut self, spec: &FontSpec, encoding: CjkEncoding) -> usize {
        let (base, registry, ordering, supplement) = match encoding {
            CjkEncoding::Japanese => ("HeiseiMin-W3", "Adobe", "Japan1", 2),
            CjkEncoding::ChineseCns1 => ("MSung-Light", "Adobe", "CNS1", 0),
            CjkEncoding::ChineseGb1 => ("STSong-Light", "Adobe", "GB1", 2),
            CjkEncoding::Korean => ("HYSMyeongJo-Medium", "Adobe", "Korea1", 1),
        };
        let _ = spec;
        let descendant = format!(
            "<< /Type /Font /Subtype /CIDFontType0 /BaseFont /{} \
             /CIDSystemInfo << /Registry ({}) /Ordering ({}) /Supplement {} >> \
             /DW 1000 >>",
            base, registry, ordering, supplement
        );
        let descendant_id = self.add(descendant.into_bytes());
        let body = format!(
            "<< /Type /Font /Subtype /Type0 /BaseFont /{} /Encoding /Identity-H \
             /DescendantFonts [{} 0 R] >>",
            base, descendant_id
        );
        self.add(body.into_bytes())
    }

    fn build_images(&mut self) -> Vec<(String, usize)> {
        let images = std::mem::take(&mut self.doc.images);
        let mut out = Vec::with_capacity(images.len());
        for image in images {
            let mask_entry = match &image.mask {
                Some(bits) => {
                    let mask_id = self.add_stream(
                        &format!(
                            "/Type /XObject /Subtype /Image /Width {} /Height {} \
                             /ImageMask true /BitsPerComponent 1 /Decode [0 1]",
                            image.width, image.height
                        ),
                        bits,
                    );
                    format!("/Mask {} 0 R ", mask_id)
                }
                None => String::new(),
            };
            let id = self.add_stream(
                &format!(
                    "/Type /XObject /Subtype /Image /Width {} /Height {} \
                     /ColorSpace /DeviceRGB /BitsPerComponent 8 {}",
                    image.width, image.height, mask_entry
                ),
                &image.rgb,
            );
            out.push((image.resource, id));
        }
        out
    }

    /// One 1x1 rect per stipple bit, foreground pass then background pass,
    /// transparent halves skipped entirely.
    fn build_patterns(&mut self) -> Vec<(String, usize)> {
        let patterns = std::mem::take(&mut self.doc.patterns);
        let mut out = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let mut cell = Content::new();
            for pass in 0..2 {
                let (color, want_set) = if pass == 0 {
                    (pattern.foreground, true)
                } else {
                    (pattern.background, false)
                };
                if color.is_transparent() {
                    continue;
                }
                cell.set_rgb(color);
                for (y, row) in pattern.stipple.bits.iter().enumerate() {
                    let mut bits = *row;
                    for x in 0..8 {
                        let set = bits & 1 == 1;
                        bits >>= 1;
                        if set == want_set {
                            cell.rect(x as f32, y as f32, 1.0, 1.0);
                            cell.fill();
                        }
                    }
                }
            }
            let id = self.add_stream(
                "/Type /Pattern /PatternType 1 /PaintType 1 /TilingType 1 \
                 /BBox [0 0 8 8] /XStep 8 /YStep 8 /Resources << >>",
                cell.as_str().as_bytes(),
            );
            out.push((pattern.resource, id));
        }
        out
    }

    fn build_outlines(&mut self, page_ids: &[usize]) -> Option<usize> {
        let nodes = std::mem::take(&mut self.doc.outlines);
        if nodes.is_empty() {
            return None;
        }
        let root_id = self.reserve();
        let item_ids: Vec<usize> = nodes.iter().map(|_| self.reserve()).collect();

        let top: Vec<usize> = (0..nodes.len()).filter(|i| nodes[*i].parent.is_none()).collect();

        for (index, node) in nodes.iter().enumerate() {
            let siblings: Vec<usize> = match node.parent {
                Some(parent) => nodes[parent].children.clone(),
                None => top.clone(),
            };
            let position = siblings.iter().position(|i| *i == index).unwrap_or(0);
            let prev = position
                .checked_sub(1)
                .map(|p| format!("/Prev {} 0 R ", item_ids[siblings[p]]))
                .unwrap_or_default();
            let next = siblings
                .get(position + 1)
                .map(|n| format!("/Next {} 0 R ", item_ids[*n]))
                .unwrap_or_default();
            let parent_obj = match node.parent {
                Some(parent) => item_ids[parent],
                None => root_id,
            };
            let kids = match node.children.is_empty() {
                true => String::new(),
                false => {
                    let count = node.children.len() as i64;
                    let signed = if node.open { count } else { -count };
                    format!(
                        "/First {} 0 R /Last {} 0 R /Count {} ",
                        item_ids[node.children[0]],
                        item_ids[*node.children.last().unwrap()],
                        signed
                    )
                }
            };
            let page_obj = page_ids.get(node.page).copied().unwrap_or(page_ids[0]);
            let body = format!(
                "<< /Title ({}) /Parent {} 0 R {}{}{}\
                 /Dest [{} 0 R /XYZ {} {} null] >>",
                escape_string(&node.title),
                parent_obj,
                prev,
                next,
                kids,
                page_obj,
                num(node.x),
                num(node.y)
            );
            self.set(item_ids[index], body.into_bytes());
        }

        let root = match top.is_empty() {
            true => "<< /Type /Outlines /Count 0 >>".to_string(),
            false => format!(
                "<< /Type /Outlines /First {} 0 R /Last {} 0 R /Count {} >>",
                item_ids[top[0]],
                item_ids[*top.last().unwrap()],
                top.len()
            ),
        };
        self.set(root_id, root.into_bytes());
        Some(root_id)
    }

    fn assemble(self, catalog_id: usize, info_id: usize) -> Result<Vec<u8>, PlatenError> {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n%\xec\xf5\xf2\xe9\n");

        let mut offsets = Vec::with_capacity(self.objects.len());
        for (index, body) in self.objects.iter().enumerate() {
            offsets.push(out.len());
            let body = body.as_deref().unwrap_or(b"null");
            out.extend_from_slice(format!("{} 0 obj\n", index + 1).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref_offset = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n", self.objects.len() + 1).as_bytes());
        out.extend_from_slice(b"0000000000 65535 f \n");
        for offset in &offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
                self.objects.len() + 1,
                catalog_id,
                info_id,
                xref_offset
            )
            .as_bytes(),
        );
        Ok(out)
    }
}

struct FaceMetrics {
    ascent: i16,
    descent: i16,
    cap_height: i16,
    italic_angle: i16,
    bbox: (i16, i16, i16, i16),
    symbolic: bool,
}

fn face_metrics(data: &[u8]) -> FaceMetrics {
    let Ok(face) = ttf_parser::Face::parse(data, 0) else {
        return FaceMetrics {
            ascent: 750,
            descent: -250,
            cap_height: 700,
            italic_angle: 0,
            bbox: (0, -250, 1000, 750),
            symbolic: false,
        };
    };
    let units = face.units_per_em().max(1);
    let scale = 1000.0 / units as f32;
    let scale_i16 = |value: i16| -> i16 {
        let scaled = (value as f32 * scale).round() as i32;
        scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    };
    let ascent = scale_i16(face.ascender());
    let bbox = face.global_bounding_box();
    FaceMetrics {
        ascent,
        descent: scale_i16(face.descender()),
        cap_height: face.capital_height().map(scale_i16).unwrap_or(ascent),
        italic_angle: face
            .italic_angle()
            .map(|v| v.round() as i16)
            .unwrap_or(0),
        bbox: (
            scale_i16(bbox.x_min),
            scale_i16(bbox.y_min),
            scale_i16(bbox.x_max),
            scale_i16(bbox.y_max),
        ),
        symbolic: face.tables().cmap.map(|c| {
            let mut unicode = false;
            for sub in c.subtables {
                if sub.is_unicode() {
                    unicode = true;
                }
            }
            !unicode
        })
        .unwrap_or(false),
    }
}

fn advance_for_codepoint(face: &ttf_parser::Face<'_>, cp: u32, scale: f32) -> u16 {
    let Some(ch) = char::from_u32(cp) else {
        return 0;
    };
    let width = face
        .glyph_index(ch)
        .and_then(|id| face.glyph_hor_advance(id))
        .unwrap_or(0);
    let scaled = (width as f32 * scale).round() as i32;
    scaled.clamp(0, u16::MAX as i32) as u16
}

fn winansi_widths(data: &[u8]) -> Vec<u16> {
    let Ok(face) = ttf_parser::Face::parse(data, 0) else {
        return vec![500; 224];
    };
    let scale = 1000.0 / face.units_per_em().max(1) as f32;
    (32u16..=255)
        .map(|byte| {
            let cp = winansi_char(byte as u8).map(|c| c as u32).unwrap_or(byte as u32);
            advance_for_codepoint(&face, cp, scale)
        })
        .collect()
}

fn slot_widths(data: &[u8], codepoints: &[u16]) -> Vec<u16> {
    let Ok(face) = ttf_parser::Face::parse(data, 0) else {
        return vec![500; codepoints.len()];
    };
    let scale = 1000.0 / face.units_per_em().max(1) as f32;
    codepoints
        .iter()
        .map(|cp| advance_for_codepoint(&face, *cp as u32, scale))
        .collect()
}

fn base14_name(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.contains("times") || lower.contains("serif") {
        if lower.contains("bold") && lower.contains("italic") {
            "Times-BoldItalic"
        } else if lower.contains("bold") {
            "Times-Bold"
        } else if lower.contains("italic") || lower.contains("oblique") {
            "Times-Italic"
        } else {
            "Times-Roman"
        }
    } else if lower.contains("courier") || lower.contains("mono") {
        if lower.contains("bold") {
            "Courier-Bold"
        } else if lower.contains("italic") || lower.contains("oblique") {
            "Courier-Oblique"
        } else {
            "Courier"
        }
    } else if lower.contains("symbol") {
        "Symbol"
    } else if lower.contains("bold") {
        "Helvetica-Bold"
    } else if lower.contains("italic") || lower.contains("oblique") {
        "Helvetica-Oblique"
    } else {
        "Helvetica"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finish_lossy(doc: PdfDoc) -> String {
        let bytes = doc.finish().unwrap();
        String::from_utf8_lossy(&bytes).to_string()
    }

    #[test]
    fn num_trims_trailing_zeros() {
        assert_eq!(num(1.0), "1");
        assert_eq!(num(1.5), "1.5");
        assert_eq!(num(0.125), "0.125");
        assert_eq!(num(-2.0), "-2");
    }

    #[test]
    fn empty_document_has_page_tree_and_trailer() {
        let mut doc = PdfDoc::new();
        doc.begin_page(595.0, 842.0);
        doc.end_page(Content::new());
        let pdf = finish_lossy(doc);
        assert!(pdf.starts_with("%PDF-1.4"));
        assert!(pdf.contains("/Type /Pages"));
        assert!(pdf.contains("/Count 1"));
        assert!(pdf.contains("/MediaBox [0 0 595 842]"));
        assert!(pdf.ends_with("%%EOF\n"));
    }

    #[test]
    fn content_operators_reach_the_stream() {
        let mut doc = PdfDoc::new();
        doc.begin_page(200.0, 200.0);
        let mut content = Content::new();
        content.rect(10.0, 20.0, 30.0, 40.0);
        content.fill();
        doc.end_page(content);
        let pdf = finish_lossy(doc);
        assert!(pdf.contains("10 20 30 40 re"));
    }

    #[test]
    fn uri_annotation_serializes_action() {
        let mut doc = PdfDoc::new();
        doc.set_border_width(0.5);
        doc.begin_page(200.0, 200.0);
        doc.add_annotation(Annotation::Uri {
            rect: [10.0, 10.0, 90.0, 24.0],
            url: "http://example.com/page".to_string(),
        });
        doc.end_page(Content::new());
        let pdf = finish_lossy(doc);
        assert!(pdf.contains("/S /URI"));
        assert!(pdf.contains("(http://example.com/page)"));
        assert!(pdf.contains("/Border [0 0 0.5]"));
    }

    #[test]
    fn goto_annotation_targets_other_page() {
        let mut doc = PdfDoc::new();
        doc.begin_page(200.0, 200.0);
        doc.end_page(Content::new());
        doc.begin_page(200.0, 200.0);
        doc.add_annotation(Annotation::GoTo {
            rect: [0.0, 0.0, 50.0, 10.0],
            page: 0,
            x: 5.0,
            y: 180.0,
        });
        doc.end_page(Content::new());
        let pdf = finish_lossy(doc);
        assert!(pdf.contains("/XYZ 5 180 null"));
    }

    #[test]
    fn image_with_mask_emits_stencil_pair() {
        let mut doc = PdfDoc::new();
        doc.begin_page(100.0, 100.0);
        let rgba = vec![255u8, 0, 0, 255, 0, 255, 0, 255];
        let image = doc.add_image(2, 1, &rgba, Some(vec![0b1000_0000]));
        let mut content = Content::new();
        let resource = doc.image_resource(image).to_string();
        content.place_image(&resource, 10.0, 10.0, 2.0, 1.0);
        doc.end_page(content);
        let pdf = finish_lossy(doc);
        assert!(pdf.contains("/ImageMask true"));
        assert!(pdf.contains("/ColorSpace /DeviceRGB"));
        assert!(pdf.contains("/Im0 Do"));
    }

    #[test]
    fn pattern_cell_skips_transparent_background() {
        let mut doc = PdfDoc::new();
        doc.begin_page(100.0, 100.0);
        let mut bg = Color::WHITE;
        bg.alpha = 0;
        doc.add_pattern(
            Stipple {
                bits: [0x01, 0, 0, 0, 0, 0, 0, 0],
            },
            Color::BLACK,
            bg,
        );
        doc.end_page(Content::new());
        let pdf = finish_lossy(doc);
        assert!(pdf.contains("/PatternType 1"));
        // Foreground pixel only: exactly one cell rect.
        assert_eq!(pdf.matches("0 0 1 1 re").count(), 1);
    }

    #[test]
    fn outline_items_link_parent_and_siblings() {
        let mut doc = PdfDoc::new();
        doc.begin_page(100.0, 100.0);
        doc.end_page(Content::new());
        let first = doc.add_outline("Chapter 1", None, 0, 0.0, 90.0, false);
        doc.add_outline("Section 1.1", Some(first), 0, 0.0, 60.0, false);
        doc.add_outline("Chapter 2", None, 0, 0.0, 30.0, false);
        let pdf = finish_lossy(doc);
        assert!(pdf.contains("/Type /Outlines"));
        assert!(pdf.contains("(Chapter 1)"));
        assert!(pdf.contains("(Section 1.1)"));
        assert!(pdf.contains("/Count -1"));
        assert!(pdf.contains("/PageMode /UseOutlines"));
    }

    #[test]
    fn out_of_range_outline_parent_clamps_to_root() {
        let mut doc = PdfDoc::new();
        doc.begin_page(100.0, 100.0);
        doc.end_page(Content::new());
        let id = doc.add_outline("Orphan", Some(99), 0, 0.0, 0.0, false);
        assert_eq!(id, 0);
        let pdf = finish_lossy(doc);
        assert!(pdf.contains("(Orphan)"));
    }

    #[test]
    fn referenced_cid_font_is_not_embedded() {
        let mut doc = PdfDoc::new();
        doc.begin_page(100.0, 100.0);
        doc.register_font(FontSpec {
            base_name: "HeiseiMin-W3".to_string(),
            encoding: FontEncodingKind::Cid(CjkEncoding::Japanese),
            embed_data: None,
        })
        .unwrap();
        doc.end_page(Content::new());
        let pdf = finish_lossy(doc);
        assert!(pdf.contains("/Subtype /Type0"));
        assert!(pdf.contains("/Encoding /Identity-H"));
        assert!(pdf.contains("/Ordering (Japan1)"));
        assert!(!pdf.contains("/FontFile2"));
    }

    #[test]
    fn base14_classification() {
        assert_eq!(base14_name("Helvetica"), "Helvetica");
        assert_eq!(base14_name("Times-Bold"), "Times-Bold");
        assert_eq!(base14_name("Some Mono Face"), "Courier");
        assert_eq!(base14_name("Anything Oblique"), "Helvetica-Oblique");
    }

    #[test]
    fn escape_handles_parens_and_high_bytes() {
        assert_eq!(escape_string("a(b)c"), "a\\(b\\)c");
        assert_eq!(escape_string("\u{e9}"), "\\303\\251");
    }
}
