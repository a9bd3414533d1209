use crate::bookmark::{BookmarkDefinition, Bookmarks};
use crate::encoding::{
    basic_coverage, cid_for, winansi_byte, Encoding, FontCache, UserEncodings,
};
use crate::error::PlatenError;
use crate::fonts::{CjkEncoding, FontClass, FontDescriptor, FontFile, Fonts};
use crate::image::{self, NormalizedImage, PixelFormat};
use crate::link::{self, DocLinkSink, WebLinkSink};
use crate::ops::{DrawOp, Picture, Shape, ShapeOp};
use crate::pdf::{Annotation, Content, FontEncodingKind, FontId, FontSpec, PatternId, PdfDoc};
use crate::report::Report;
use crate::shape::{PaintMode, ShapePainter};
use crate::state::{CoordSystem, GraphicsState, StateStack};
use crate::textline::{GlyphMetrics, Line, LineSink, TextLine, TextSegment};
use crate::types::{CapMode, Color, DrawingMode, JoinMode, Point, Rect, Stipple};
use crate::xref::{XRefRule, XRefs};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

// Cubic control-point factor for quarter arcs, as used for round rect
// corners and ellipses.
const KAPPA: f32 = 0.555_555_555_555_5;

const A4_WIDTH: f32 = 595.0;
const A4_HEIGHT: f32 = 842.0;

// Pen sizes below this are the "hairline" request and render one unit wide.
const MIN_PEN_SIZE: f32 = 0.000_01;

const DEFAULT_EMBED_MAX: u64 = 250 * 1024;

/// Everything the caller decides before a job starts.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub title: String,
    pub creator: String,
    /// Directories scanned recursively for font files.
    pub font_dirs: Vec<PathBuf>,
    /// Fonts larger than this are referenced instead of embedded.
    pub embed_max_font_size: u64,
    /// Per-font embed overrides, keyed by resolved name.
    pub embed_overrides: Vec<(String, bool)>,
    /// Substitute faces standing in for unavailable families.
    pub substitute_fonts: Vec<FontFile>,
    pub cjk_order: Vec<(CjkEncoding, bool)>,
    pub link_border_width: f32,
    pub create_web_links: bool,
    pub bookmark_definitions: Vec<BookmarkDefinition>,
    pub xref_rules: Vec<XRefRule>,
}

impl Default for JobConfig {
    fn default() -> JobConfig {
        JobConfig {
            title: String::new(),
            creator: String::new(),
            font_dirs: Vec::new(),
            embed_max_font_size: DEFAULT_EMBED_MAX,
            embed_overrides: Vec::new(),
            substitute_fonts: Vec::new(),
            cjk_order: Vec::new(),
            link_border_width: 1.0,
            create_web_links: true,
            bookmark_definitions: Vec::new(),
            xref_rules: Vec::new(),
        }
    }
}

/// One recorded page handed in by the spool harness.
#[derive(Debug, Clone)]
pub struct PageInput {
    /// Paper rectangle in points, page space.
    pub paper: Rect,
    /// Printable area within the paper; drawing origin sits at its top-left.
    pub printable: Rect,
    pub picture: Picture,
}

/// Translates a recorded job into a finished document plus the diagnostics
/// collected along the way. When cross-reference rules are configured the
/// pages are replayed twice: a scan pass that only records destinations,
/// then the emitting pass.
pub fn render_document(
    config: &JobConfig,
    pages: &[PageInput],
) -> Result<(Vec<u8>, Report), PlatenError> {
    let mut report = Report::new();

    let mut fonts = Fonts::new();
    for dir in &config.font_dirs {
        fonts.collect_dir(dir);
    }
    for file in &config.substitute_fonts {
        fonts.add_substitute(file.clone());
    }
    for (name, embed) in &config.embed_overrides {
        fonts.set_embed(name, *embed);
    }
    if !config.cjk_order.is_empty() {
        fonts.set_cjk_order(&config.cjk_order, &mut report);
    }

    let mut xrefs = XRefs::new(config.xref_rules.clone());
    if !xrefs.is_empty() {
        let mut scan = Translator::new(config, &fonts, Pass::Scan);
        for (index, page) in pages.iter().enumerate() {
            scan.render_page(index, page, &mut report, &mut xrefs);
        }
    }

    let mut emit = Translator::new(config, &fonts, Pass::Emit);
    for (index, page) in pages.iter().enumerate() {
        emit.render_page(index, page, &mut report, &mut xrefs);
    }
    let pdf = emit.finish(&mut report)?;
    Ok((pdf, report))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// Replays pages without producing output; feeds the destination table.
    Scan,
    Emit,
}

impl Pass {
    fn makes_pdf(self) -> bool {
        self == Pass::Emit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Drawing,
    /// Inside clip-to-picture: paths become clip boundaries, rasters and
    /// nested clips are rejected.
    Clipping,
}

/// Glyph-advance oracle backed by the discovered font files. Face bytes and
/// unit widths are cached per (font, char) for the job.
struct FontMetrics<'a> {
    fonts: &'a Fonts,
    faces: RefCell<HashMap<String, Option<Vec<u8>>>>,
    widths: RefCell<HashMap<(String, char), Option<f32>>>,
}

impl<'a> FontMetrics<'a> {
    fn new(fonts: &'a Fonts) -> FontMetrics<'a> {
        FontMetrics {
            fonts,
            faces: RefCell::new(HashMap::new()),
            widths: RefCell::new(HashMap::new()),
        }
    }

    fn with_face<T>(&self, name: &str, f: impl FnOnce(&ttf_parser::Face<'_>) -> Option<T>) -> Option<T> {
        let mut faces = self.faces.borrow_mut();
        let data = faces.entry(name.to_string()).or_insert_with(|| {
            self.fonts
                .find_by_name(name)
                .filter(|file| file.class == FontClass::Outline)
                .and_then(|file| fs::read(&file.path).ok())
        });
        let bytes = data.as_ref()?;
        let face = ttf_parser::Face::parse(bytes, 0).ok()?;
        f(&face)
    }

    /// Advance width in em units, `None` when the face or glyph is missing.
    fn unit_width(&self, name: &str, ch: char) -> Option<f32> {
        let key = (name.to_string(), ch);
        if let Some(cached) = self.widths.borrow().get(&key) {
            return *cached;
        }
        let unit = self.with_face(name, |face| {
            let glyph = face.glyph_index(ch)?;
            let advance = face.glyph_hor_advance(glyph)? as f32;
            Some(advance / face.units_per_em().max(1) as f32)
        });
        self.widths.borrow_mut().insert(key, unit);
        unit
    }

    fn has_glyph(&self, name: &str, ch: char) -> bool {
        self.with_face(name, |face| face.glyph_index(ch)).is_some()
    }
}

impl GlyphMetrics for FontMetrics<'_> {
    fn char_width(&self, font: &FontDescriptor, ch: char) -> f32 {
        match self.unit_width(&font.resolved_name(), ch) {
            Some(unit) => unit * font.size,
            None => crate::textline::approximate_width(font, ch),
        }
    }
}

struct WebAnnot<'b> {
    doc: &'b mut PdfDoc,
}

impl WebLinkSink for WebAnnot<'_> {
    fn web_link(&mut self, rect: [f32; 4], url: &str) {
        self.doc.add_annotation(Annotation::Uri {
            rect,
            url: url.to_string(),
        });
    }
}

struct DocAnnot<'b> {
    doc: &'b mut PdfDoc,
}

impl DocLinkSink for DocAnnot<'_> {
    fn doc_link(&mut self, rect: [f32; 4], page: usize, target: Point) {
        self.doc.add_annotation(Annotation::GoTo {
            rect,
            page,
            x: target.x,
            y: target.y,
        });
    }
}

/// Receives reconstructed lines and routes them to the resolver matching the
/// active pass.
struct LineHandler<'b> {
    pass: Pass,
    page: usize,
    web_links: bool,
    doc: &'b mut PdfDoc,
    xrefs: &'b mut XRefs,
}

impl LineSink for LineHandler<'_> {
    fn line(&mut self, line: Line) {
        match self.pass {
            Pass::Scan => self.xrefs.scan_line(&line, self.page),
            Pass::Emit => {
                if self.web_links {
                    link::scan_line(&line, &mut WebAnnot { doc: self.doc });
                }
                self.xrefs.resolve_line(&line, self.page, &mut DocAnnot { doc: self.doc });
            }
        }
    }
}

struct Translator<'a> {
    config: &'a JobConfig,
    fonts: &'a Fonts,
    pass: Pass,
    doc: PdfDoc,
    metrics: FontMetrics<'a>,
    cache: FontCache,
    user_outline: UserEncodings,
    user_bitmap: UserEncodings,
    patterns: HashMap<(Stipple, Color, Color), PatternId>,
    bookmarks: Bookmarks,
    // Per-page state.
    content: Content,
    states: StateStack,
    line: TextLine,
    mode: Mode,
    page_index: usize,
    page: u32,
    saves: u32,
}

impl<'a> Translator<'a> {
    fn new(config: &'a JobConfig, fonts: &'a Fonts, pass: Pass) -> Translator<'a> {
        let mut doc = PdfDoc::new();
        doc.set_border_width(config.link_border_width);
        if !config.title.is_empty() {
            doc.set_title(config.title.clone());
        }
        if !config.creator.is_empty() {
            doc.set_creator(config.creator.clone());
        }
        Translator {
            config,
            fonts,
            pass,
            doc,
            metrics: FontMetrics::new(fonts),
            cache: FontCache::new(),
            user_outline: UserEncodings::new(FontClass::Outline),
            user_bitmap: UserEncodings::new(FontClass::Bitmap),
            patterns: HashMap::new(),
            bookmarks: Bookmarks::new(config.bookmark_definitions.clone()),
            content: Content::new(),
            states: StateStack::new(GraphicsState::new(A4_HEIGHT, 0.0, 0.0)),
            line: TextLine::new(),
            mode: Mode::Drawing,
            page_index: 0,
            page: 0,
            saves: 0,
        }
    }

    fn emit(&self) -> bool {
        self.pass.makes_pdf()
    }

    fn render_page(
        &mut self,
        index: usize,
        input: &PageInput,
        report: &mut Report,
        xrefs: &mut XRefs,
    ) {
        self.page_index = index;
        self.page = index as u32 + 1;

        let paper = if input.paper.width() < 10.0 || input.paper.height() < 10.0 {
            report.warning(self.page, "paper size invalid, falling back to A4");
            Rect::new(0.0, 0.0, A4_WIDTH, A4_HEIGHT)
        } else {
            input.paper
        };
        let printable = if input.printable.width() <= 0.0 || input.printable.height() <= 0.0 {
            paper
        } else {
            input.printable
        };

        if self.emit() {
            self.doc.begin_page(paper.width(), paper.height());
        }
        self.content = Content::new();
        self.states = StateStack::new(GraphicsState::new(
            paper.height(),
            printable.left,
            printable.top,
        ));
        // Working state above the immutable page root.
        self.states.push();
        self.mode = Mode::Drawing;
        self.saves = 0;

        for op in &input.picture.ops {
            self.apply(op, report, xrefs);
        }
        self.end_page(report, xrefs);
    }

    fn end_page(&mut self, report: &mut Report, xrefs: &mut XRefs) {
        self.flush_line(xrefs);
        if self.emit() {
            self.bookmarks.page_end(self.page_index, &mut self.doc);
        }
        while self.states.depth() > 0 {
            if self.saves > 0 {
                self.content.restore();
                self.saves -= 1;
            }
            self.states.pop(self.page, report);
        }
        if self.emit() {
            let content = std::mem::take(&mut self.content);
            self.doc.end_page(content);
        }
    }

    fn finish(mut self, _report: &mut Report) -> Result<Vec<u8>, PlatenError> {
        for user in [&self.user_outline, &self.user_bitmap] {
            let class = user.class();
            for (index, slots) in user.slot_tables() {
                self.doc.set_user_encoding_slots(class, index, slots.to_vec());
            }
        }
        self.doc.finish()
    }

    fn coord(&self) -> CoordSystem {
        self.states.current().coord
    }

    fn flush_line(&mut self, xrefs: &mut XRefs) {
        let mut handler = LineHandler {
            pass: self.pass,
            page: self.page_index,
            web_links: self.config.create_web_links,
            doc: &mut self.doc,
            xrefs,
        };
        let mut line = std::mem::take(&mut self.line);
        line.flush(&mut handler);
        self.line = line;
    }

    fn push_segment(&mut self, segment: TextSegment, xrefs: &mut XRefs) {
        let mut handler = LineHandler {
            pass: self.pass,
            page: self.page_index,
            web_links: self.config.create_web_links,
            doc: &mut self.doc,
            xrefs,
        };
        let mut line = std::mem::take(&mut self.line);
        line.add(segment, &self.metrics, &mut handler);
        self.line = line;
    }

    /// Emits fill/stroke color for the current state if it changed. Non-solid
    /// stipples become tiling patterns; Erase paints in the background color.
    fn sync_color(&mut self) {
        if !self.emit() {
            return;
        }
        let state = self.states.current();
        let stipple = state.stipple;
        let foreground = state.foreground;
        let background = state.background;
        let erase = state.drawing_mode == DrawingMode::Erase;

        if stipple.is_solid_high() || stipple.is_solid_low() {
            let mut want = if stipple.is_solid_low() {
                background
            } else {
                foreground
            };
            if erase {
                want = background;
            }
            if state.current_color != Some(want) {
                self.content.set_rgb(want);
                self.states.current_mut().current_color = Some(want);
            }
        } else {
            let key = (stipple, foreground, background);
            let id = match self.patterns.get(&key) {
                Some(id) => *id,
                None => {
                    let id = self.doc.add_pattern(stipple, foreground, background);
                    self.patterns.insert(key, id);
                    id
                }
            };
            let resource = self.doc.pattern_resource(id).to_string();
            self.content.set_fill_pattern(&resource);
            self.content.set_stroke_rgb(foreground);
            // The fill source is no longer a plain color.
            self.states.current_mut().current_color = None;
        }
    }

    fn sync_pen(&mut self) {
        let state = self.states.current();
        let width = state.coord.scale(state.pen_size);
        self.content.set_line_width(width);
    }

    fn dev(&self, point: Point) -> Point {
        let coord = self.coord();
        Point::new(coord.tx(point.x), coord.ty(point.y))
    }

    /// Device rect as (x, y, w, h) with y at the lower edge.
    fn dev_rect(&self, rect: Rect) -> (f32, f32, f32, f32) {
        let coord = self.coord();
        (
            coord.tx(rect.left),
            coord.ty(rect.bottom),
            coord.scale(rect.width()),
            coord.scale(rect.height()),
        )
    }

    fn apply(&mut self, op: &DrawOp, report: &mut Report, xrefs: &mut XRefs) {
        match op {
            DrawOp::MovePenBy(delta) => {
                let pen = self.states.current().pen;
                self.states.current_mut().pen = Point::new(pen.x + delta.x, pen.y + delta.y);
            }
            DrawOp::SetPenLocation(point) => {
                self.states.current_mut().pen = *point;
            }
            DrawOp::StrokeLine(from, to) => {
                self.states.current_mut().pen = *to;
                if self.emit() {
                    if self.mode == Mode::Clipping {
                        self.clip_stroke_path(&[*from, *to], false);
                    } else {
                        let (a, b) = (self.dev(*from), self.dev(*to));
                        self.sync_color();
                        self.sync_pen();
                        self.content.move_to(a.x, a.y);
                        self.content.line_to(b.x, b.y);
                        self.paint_path(false);
                    }
                }
            }
            DrawOp::StrokeRect(rect) => self.rect_op(*rect, false),
            DrawOp::FillRect(rect) => self.rect_op(*rect, true),
            DrawOp::StrokeRoundRect(rect, radii) => {
                self.round_rect_op(*rect, *radii, false, report);
            }
            DrawOp::FillRoundRect(rect, radii) => {
                self.round_rect_op(*rect, *radii, true, report);
            }
            DrawOp::StrokeBezier(points) => self.bezier_op(*points, false, report),
            DrawOp::FillBezier(points) => self.bezier_op(*points, true, report),
            DrawOp::StrokeArc {
                center,
                radii,
                start_theta,
                arc_theta,
            } => self.arc_op(*center, *radii, *start_theta, *arc_theta, false, report),
            DrawOp::FillArc {
                center,
                radii,
                start_theta,
                arc_theta,
            } => self.arc_op(*center, *radii, *start_theta, *arc_theta, true, report),
            DrawOp::StrokeEllipse { center, radii } => {
                self.ellipse_op(*center, *radii, false, report);
            }
            DrawOp::FillEllipse { center, radii } => {
                self.ellipse_op(*center, *radii, true, report);
            }
            DrawOp::StrokePolygon { points, closed } => {
                self.polygon_op(points, *closed, false);
            }
            DrawOp::FillPolygon { points } => self.polygon_op(points, true, true),
            DrawOp::StrokeShape(shape) => self.shape_op(shape, false, report),
            DrawOp::FillShape(shape) => self.shape_op(shape, true, report),
            DrawOp::DrawString {
                text,
                space_escapement,
                nonspace_escapement,
            } => self.draw_string(text, *space_escapement, *nonspace_escapement, report, xrefs),
            DrawOp::DrawPixels {
                src,
                dest,
                width,
                height,
                bytes_per_row,
                format,
                data,
            } => self.draw_pixels(*src, *dest, *width, *height, *bytes_per_row, *format, data, report),
            DrawOp::SetClippingRects(rects) => {
                if self.emit() {
                    if rects.is_empty() {
                        self.content.rect(0.0, 0.0, 0.0, 0.0);
                    }
                    for rect in rects {
                        let (x, y, w, h) = self.dev_rect(*rect);
                        self.content.rect(x, y, w, h);
                    }
                    self.content.clip();
                }
            }
            DrawOp::ClipToPicture {
                picture,
                origin,
                inverse,
            } => self.clip_to_picture(picture, *origin, *inverse, report, xrefs),
            DrawOp::PushState => {
                self.states.push();
                if self.emit() {
                    self.content.save();
                }
                self.saves += 1;
            }
            DrawOp::PopState => {
                if self.states.pop(self.page, report) && self.saves > 0 {
                    if self.emit() {
                        self.content.restore();
                    }
                    self.saves -= 1;
                }
            }
            DrawOp::SetOrigin(point) => self.states.set_origin(*point),
            DrawOp::SetScale(scale) => self.states.set_scale(*scale),
            DrawOp::SetDrawingMode(mode) => {
                if *mode == DrawingMode::Invert {
                    report.debug(self.page, "invert drawing mode approximated as copy");
                }
                self.states.current_mut().drawing_mode = *mode;
            }
            DrawOp::SetLineMode {
                cap,
                join,
                miter_limit,
            } => {
                let state = self.states.current_mut();
                state.cap = *cap;
                state.join = *join;
                state.miter_limit = *miter_limit;
                if self.emit() {
                    let cap_code = match cap {
                        CapMode::Butt => 0,
                        CapMode::Round => 1,
                        CapMode::Square => 2,
                    };
                    let join_code = match join {
                        JoinMode::Miter | JoinMode::Butt | JoinMode::Square => 0,
                        JoinMode::Round => 1,
                        JoinMode::Bevel => 2,
                    };
                    self.content.set_line_cap(cap_code);
                    self.content.set_line_join(join_code);
                    self.content.set_miter_limit(*miter_limit);
                }
            }
            DrawOp::SetPenSize(size) => {
                let size = if *size <= MIN_PEN_SIZE { 1.0 } else { *size };
                self.states.current_mut().pen_size = size;
            }
            DrawOp::SetForeColor(color) => self.states.current_mut().foreground = *color,
            DrawOp::SetBackColor(color) => self.states.current_mut().background = *color,
            DrawOp::SetStipplePattern(stipple) => self.states.current_mut().stipple = *stipple,
            DrawOp::SetFontFamily(family) => {
                self.states.current_mut().font.family = family.clone();
            }
            DrawOp::SetFontStyle(style) => self.states.current_mut().font.style = style.clone(),
            DrawOp::SetFontSize(size) => self.states.current_mut().font.size = *size,
            DrawOp::SetFontRotation(rotation) => {
                self.states.current_mut().font.rotation = *rotation;
            }
            DrawOp::SetFontShear(shear) => self.states.current_mut().font.shear = *shear,
            DrawOp::SetFontSpacing(spacing) => {
                self.states.current_mut().font.spacing = *spacing;
            }
            DrawOp::SetFontEncoding(encoding) => {
                self.states.current_mut().font.encoding = *encoding;
            }
            DrawOp::SetFontFlags(flags) => self.states.current_mut().font.flags = *flags,
        }
    }

    /// Terminates the current path for the active mode.
    fn paint_path(&mut self, fill: bool) {
        match self.mode {
            Mode::Drawing => {
                if fill {
                    self.content.fill();
                } else {
                    self.content.stroke();
                }
            }
            Mode::Clipping => self.content.clip(),
        }
    }

    /// Widens a stroked polyline by the pen size and clips to the band. A
    /// bare stroked path followed by `W n` would clip to its (empty)
    /// interior and suppress everything after it.
    fn clip_stroke_path(&mut self, points: &[Point], closed: bool) {
        let state = self.states.current();
        let mut painter = ShapePainter::new(state.coord, PaintMode::ClipStroke, state.pen_size);
        painter.move_to(points[0]);
        painter.line_to(&points[1..]);
        if closed {
            painter.close();
        }
        painter.paint(&mut self.content);
    }

    fn rect_op(&mut self, rect: Rect, fill: bool) {
        if !self.emit() {
            return;
        }
        if self.mode == Mode::Clipping && !fill {
            // Clip to the border band, not the interior.
            let corners = [
                Point::new(rect.left, rect.top),
                Point::new(rect.right, rect.top),
                Point::new(rect.right, rect.bottom),
                Point::new(rect.left, rect.bottom),
            ];
            self.clip_stroke_path(&corners, true);
            return;
        }
        self.sync_color();
        if !fill {
            self.sync_pen();
        }
        let (x, y, w, h) = self.dev_rect(rect);
        self.content.rect(x, y, w, h);
        self.paint_path(fill);
    }

    fn round_rect_op(&mut self, rect: Rect, radii: Point, fill: bool, report: &mut Report) {
        if !self.emit() {
            return;
        }
        let rx = radii.x.min(rect.width() / 2.0).max(0.0);
        let ry = radii.y.min(rect.height() / 2.0).max(0.0);
        if rx == 0.0 || ry == 0.0 {
            self.rect_op(rect, fill);
            return;
        }
        if self.mode == Mode::Clipping && !fill {
            report.error(self.page, "stroked round rect cannot form a clip path");
            return;
        }
        self.sync_color();
        if !fill {
            self.sync_pen();
        }
        let (l, t, r, b) = (rect.left, rect.top, rect.right, rect.bottom);
        let kx = KAPPA * rx;
        let ky = KAPPA * ry;
        let path: [(Point, Option<(Point, Point)>); 8] = [
            (Point::new(r - rx, t), None),
            (
                Point::new(r, t + ry),
                Some((Point::new(r - rx + kx, t), Point::new(r, t + ry - ky))),
            ),
            (Point::new(r, b - ry), None),
            (
                Point::new(r - rx, b),
                Some((Point::new(r, b - ry + ky), Point::new(r - rx + kx, b))),
            ),
            (Point::new(l + rx, b), None),
            (
                Point::new(l, b - ry),
                Some((Point::new(l + rx - kx, b), Point::new(l, b - ry + ky))),
            ),
            (Point::new(l, t + ry), None),
            (
                Point::new(l + rx, t),
                Some((Point::new(l, t + ry - ky), Point::new(l + rx - kx, t))),
            ),
        ];
        let start = self.dev(Point::new(l + rx, t));
        self.content.move_to(start.x, start.y);
        for (target, controls) in path {
            let end = self.dev(target);
            match controls {
                None => self.content.line_to(end.x, end.y),
                Some((c1, c2)) => {
                    let c1 = self.dev(c1);
                    let c2 = self.dev(c2);
                    self.content.curve_to(c1.x, c1.y, c2.x, c2.y, end.x, end.y);
                }
            }
        }
        self.content.close_path();
        self.paint_path(fill);
    }

    fn bezier_op(&mut self, points: [Point; 4], fill: bool, report: &mut Report) {
        if !self.emit() {
            return;
        }
        if self.mode == Mode::Clipping && !fill {
            report.error(self.page, "stroked bezier cannot form a clip path");
            return;
        }
        self.sync_color();
        if !fill {
            self.sync_pen();
        }
        let p0 = self.dev(points[0]);
        let c1 = self.dev(points[1]);
        let c2 = self.dev(points[2]);
        let p3 = self.dev(points[3]);
        self.content.move_to(p0.x, p0.y);
        self.content.curve_to(c1.x, c1.y, c2.x, c2.y, p3.x, p3.y);
        self.paint_path(fill);
    }

    /// Samples an elliptic arc as cubic segments of at most a quarter turn.
    /// Angles are degrees counter-clockwise as seen on the page.
    fn arc_segments(
        &self,
        center: Point,
        radii: Point,
        start_deg: f32,
        sweep_deg: f32,
    ) -> Vec<(Point, Point, Point, Point)> {
        let steps = (sweep_deg.abs() / 90.0).ceil().max(1.0) as usize;
        let delta = sweep_deg.to_radians() / steps as f32;
        let mut theta = start_deg.to_radians();
        let alpha = 4.0 / 3.0 * (delta / 4.0).tan();
        let point = |t: f32| {
            Point::new(center.x + radii.x * t.cos(), center.y - radii.y * t.sin())
        };
        let tangent = |t: f32| Point::new(-radii.x * t.sin(), -radii.y * t.cos());
        let mut out = Vec::with_capacity(steps);
        for _ in 0..steps {
            let next = theta + delta;
            let p0 = point(theta);
            let p3 = point(next);
            let t0 = tangent(theta);
            let t3 = tangent(next);
            let c1 = Point::new(p0.x + alpha * t0.x, p0.y + alpha * t0.y);
            let c2 = Point::new(p3.x - alpha * t3.x, p3.y - alpha * t3.y);
            out.push((p0, c1, c2, p3));
            theta = next;
        }
        out
    }

    fn arc_op(
        &mut self,
        center: Point,
        radii: Point,
        start: f32,
        sweep: f32,
        fill: bool,
        report: &mut Report,
    ) {
        if !self.emit() {
            return;
        }
        if self.mode == Mode::Clipping && !fill {
            report.error(self.page, "stroked arc cannot form a clip path");
            return;
        }
        self.sync_color();
        if !fill {
            self.sync_pen();
        }
        let segments = self.arc_segments(center, radii, start, sweep);
        let Some(first) = segments.first() else {
            return;
        };
        if fill {
            // Filled arcs are pie wedges.
            let c = self.dev(center);
            self.content.move_to(c.x, c.y);
            let start_point = self.dev(first.0);
            self.content.line_to(start_point.x, start_point.y);
        } else {
            let start_point = self.dev(first.0);
            self.content.move_to(start_point.x, start_point.y);
        }
        for (_, c1, c2, p3) in &segments {
            let c1 = self.dev(*c1);
            let c2 = self.dev(*c2);
            let p3 = self.dev(*p3);
            self.content.curve_to(c1.x, c1.y, c2.x, c2.y, p3.x, p3.y);
        }
        if fill {
            self.content.close_path();
        }
        self.paint_path(fill);
    }

    fn ellipse_op(&mut self, center: Point, radii: Point, fill: bool, report: &mut Report) {
        if !self.emit() {
            return;
        }
        if self.mode == Mode::Clipping && !fill {
            report.error(self.page, "stroked ellipse cannot form a clip path");
            return;
        }
        self.sync_color();
        if !fill {
            self.sync_pen();
        }
        let segments = self.arc_segments(center, radii, 0.0, 360.0);
        let start = self.dev(segments[0].0);
        self.content.move_to(start.x, start.y);
        for (_, c1, c2, p3) in &segments {
            let c1 = self.dev(*c1);
            let c2 = self.dev(*c2);
            let p3 = self.dev(*p3);
            self.content.curve_to(c1.x, c1.y, c2.x, c2.y, p3.x, p3.y);
        }
        self.content.close_path();
        self.paint_path(fill);
    }

    fn polygon_op(&mut self, points: &[Point], closed: bool, fill: bool) {
        if !self.emit() || points.is_empty() {
            return;
        }
        if self.mode == Mode::Clipping && !fill {
            self.clip_stroke_path(points, closed);
            return;
        }
        self.sync_color();
        if !fill {
            self.sync_pen();
        }
        let first = self.dev(points[0]);
        self.content.move_to(first.x, first.y);
        for point in &points[1..] {
            let device = self.dev(*point);
            self.content.line_to(device.x, device.y);
        }
        if closed {
            self.content.close_path();
        }
        self.paint_path(fill);
    }

    fn shape_op(&mut self, shape: &Shape, fill: bool, report: &mut Report) {
        if !self.emit() {
            return;
        }
        let state = self.states.current();
        if self.mode == Mode::Clipping {
            // The clip operator cannot carry a pen width, so stroked clip
            // shapes are flattened and widened into polygons.
            let mode = if fill {
                PaintMode::ClipFill
            } else {
                PaintMode::ClipStroke
            };
            let mut painter = ShapePainter::new(state.coord, mode, state.pen_size);
            for op in &shape.ops {
                match op {
                    ShapeOp::MoveTo(point) => painter.move_to(*point),
                    ShapeOp::LineTo(points) => painter.line_to(points),
                    ShapeOp::BezierTo(control) => painter.bezier_to(*control),
                    ShapeOp::Close => {
                        if !painter.close() {
                            report.debug(self.page, "redundant close in shape ignored");
                        }
                    }
                }
            }
            painter.paint(&mut self.content);
            return;
        }

        self.sync_color();
        if !fill {
            self.sync_pen();
        }
        let mut pen = Point::ZERO;
        let mut open = false;
        for op in &shape.ops {
            match op {
                ShapeOp::MoveTo(point) => {
                    pen = *point;
                    let device = self.dev(*point);
                    self.content.move_to(device.x, device.y);
                    open = true;
                }
                ShapeOp::LineTo(points) => {
                    if !open {
                        let device = self.dev(pen);
                        self.content.move_to(device.x, device.y);
                        open = true;
                    }
                    for point in points {
                        pen = *point;
                        let device = self.dev(*point);
                        self.content.line_to(device.x, device.y);
                    }
                }
                ShapeOp::BezierTo(control) => {
                    if !open {
                        let device = self.dev(pen);
                        self.content.move_to(device.x, device.y);
                        open = true;
                    }
                    let c1 = self.dev(control[0]);
                    let c2 = self.dev(control[1]);
                    let end = self.dev(control[2]);
                    self.content.curve_to(c1.x, c1.y, c2.x, c2.y, end.x, end.y);
                    pen = control[2];
                }
                ShapeOp::Close => self.content.close_path(),
            }
        }
        self.paint_path(fill);
    }

    fn draw_pixels(
        &mut self,
        src: Rect,
        dest: Rect,
        width: u32,
        height: u32,
        bytes_per_row: usize,
        format: u32,
        data: &[u8],
        report: &mut Report,
    ) {
        if !self.emit() {
            return;
        }
        if self.mode == Mode::Clipping {
            report.debug(self.page, "raster ignored inside clip picture");
            return;
        }
        let Some(format) = PixelFormat::from_raw(format) else {
            report.error(
                self.page,
                format!("unsupported pixel format 0x{:04x}", format),
            );
            return;
        };
        let Some(image) = image::normalize(format, data, width, height, bytes_per_row) else {
            report.error(self.page, "pixel buffer too small for declared size");
            return;
        };
        let image = crop_image(image, src);
        if image.width == 0 || image.height == 0 {
            return;
        }
        let id = self
            .doc
            .add_image(image.width, image.height, &image.rgba, image.mask);
        let resource = self.doc.image_resource(id).to_string();
        let (x, y, w, h) = self.dev_rect(dest);
        self.content.place_image(&resource, x, y, w, h);
    }

    fn clip_to_picture(
        &mut self,
        picture: &Picture,
        origin: Point,
        inverse: bool,
        report: &mut Report,
        xrefs: &mut XRefs,
    ) {
        if self.mode == Mode::Clipping {
            report.error(self.page, "nested clip-to-picture not supported");
            return;
        }
        if inverse {
            report.warning(self.page, "inverse clip-to-picture not supported");
            return;
        }
        self.states.push();
        self.states.set_origin(origin);
        self.mode = Mode::Clipping;
        for op in &picture.ops {
            self.apply(op, report, xrefs);
        }
        self.mode = Mode::Drawing;
        self.states.pop(self.page, report);
    }

    // -- text ---------------------------------------------------------------

    fn resolve(
        &mut self,
        font: &FontDescriptor,
        ch: char,
        report: &mut Report,
    ) -> Option<(Encoding, Vec<u8>)> {
        if let Some(byte) = winansi_byte(ch) {
            return Some((Encoding::WinAnsi, vec![byte]));
        }
        let name = font.resolved_name();
        let class = self.fonts.class_of(&name);
        if basic_coverage(ch) {
            let user = match class {
                FontClass::Outline => &mut self.user_outline,
                FontClass::Bitmap => &mut self.user_bitmap,
            };
            let (index, slot, fresh) = user.allocate(ch)?;
            if fresh && !self.metrics.has_glyph(&name, ch) {
                report.debug(
                    self.page,
                    format!("{} has no glyph for U+{:04X}", name, ch as u32),
                );
            }
            return Some((Encoding::User { class, index }, vec![slot]));
        }
        self.fonts.cjk_order().iter().find_map(|enc| {
            cid_for(*enc, ch).map(|cid| (Encoding::Cjk(*enc), cid.to_be_bytes().to_vec()))
        })
    }

    fn ensure_font(
        &mut self,
        font: &FontDescriptor,
        encoding: Encoding,
        report: &mut Report,
    ) -> Option<FontId> {
        let name = font.resolved_name();
        let id = encoding.id();
        if let Some(found) = self.cache.get(&name, id) {
            return Some(found);
        }

        let kind = match encoding {
            Encoding::WinAnsi => FontEncodingKind::WinAnsi,
            Encoding::User { class, index } => FontEncodingKind::UserDefined { class, index },
            Encoding::Cjk(enc) => FontEncodingKind::Cid(enc),
        };
        let embed_data = match encoding {
            Encoding::Cjk(_) => None,
            _ => self.fonts.find_by_name(&name).and_then(|file| {
                let allowed = file.embed
                    && file.substitute_for.is_none()
                    && file.class == FontClass::Outline
                    && file.size <= self.config.embed_max_font_size;
                if !allowed {
                    return None;
                }
                match fs::read(&file.path) {
                    Ok(data) => Some(data),
                    Err(err) => {
                        report.warning(
                            self.page,
                            format!("cannot read font file {}: {}", file.path.display(), err),
                        );
                        None
                    }
                }
            }),
        };

        let font_id = match self.doc.register_font(FontSpec {
            base_name: name.clone(),
            encoding: kind,
            embed_data,
        }) {
            Ok(font_id) => font_id,
            Err(err) => {
                report.warning(
                    self.page,
                    format!("font {} unavailable ({}), using fallback", name, err),
                );
                self.doc
                    .register_font(FontSpec {
                        base_name: "Helvetica".to_string(),
                        encoding: FontEncodingKind::WinAnsi,
                        embed_data: None,
                    })
                    .ok()?
            }
        };
        self.cache.insert(name, id, font_id);
        Some(font_id)
    }

    fn draw_string(
        &mut self,
        text: &str,
        escp_space: f32,
        escp_nospace: f32,
        report: &mut Report,
        xrefs: &mut XRefs,
    ) {
        if text.is_empty() {
            return;
        }
        let font = self.states.current().font.clone();
        let coord = self.coord();
        let pen_start = self.states.current().pen;
        let name = font.resolved_name();

        if self.mode == Mode::Clipping {
            self.clip_string(text, escp_space, escp_nospace, report);
            return;
        }

        // Local-space advances, one per char.
        let advances: Vec<f32> = text
            .chars()
            .map(|ch| {
                let unit = self.metrics.unit_width(&name, ch).unwrap_or(0.6);
                let escapement = if ch == ' ' { escp_space } else { escp_nospace };
                unit * font.size + escapement
            })
            .collect();
        let total: f32 = advances.iter().sum();

        if self.emit() {
            self.emit_string(text, &advances, &font, pen_start, report);
            if let Some(definition) = self.bookmarks.match_font(&font) {
                let top = Point::new(
                    coord.tx(pen_start.x),
                    coord.ty(pen_start.y) + coord.scale(font.size) * 0.75,
                );
                self.bookmarks.add(text.trim().to_string(), top, definition);
            }
        }

        if font.is_rotated() {
            // Rotated text never joins line reconstruction.
            let theta = font.rotation.to_radians();
            let pen = &mut self.states.current_mut().pen;
            pen.x += total * theta.cos();
            pen.y -= total * theta.sin();
            return;
        }

        let mut device_font = font.clone();
        device_font.size = coord.scale(font.size);
        let segment = TextSegment {
            text: text.to_string(),
            start: Point::new(coord.tx(pen_start.x), coord.ty(pen_start.y)),
            escp_space: coord.scale(escp_space),
            escp_nospace: coord.scale(escp_nospace),
            font: device_font,
            coord,
        };
        self.push_segment(segment, xrefs);

        self.states.current_mut().pen.x += total;
    }

    fn emit_string(
        &mut self,
        text: &str,
        advances: &[f32],
        font: &FontDescriptor,
        pen_start: Point,
        report: &mut Report,
    ) {
        struct Run {
            encoding: Encoding,
            bytes: Vec<u8>,
            /// Local-space advance consumed before the run starts.
            start_advance: f32,
        }

        let mut runs: Vec<Run> = Vec::new();
        let mut consumed = 0.0;
        // A skipped character still advances the pen, so the glyph after it
        // must open a new run to pick up the gap.
        let mut broke = true;
        for (index, ch) in text.chars().enumerate() {
            if let Some((encoding, bytes)) = self.resolve(font, ch, report) {
                match runs.last_mut() {
                    Some(run) if !broke && run.encoding == encoding => {
                        run.bytes.extend_from_slice(&bytes);
                    }
                    _ => runs.push(Run {
                        encoding,
                        bytes,
                        start_advance: consumed,
                    }),
                }
                broke = false;
            } else {
                broke = true;
            }
            consumed += advances[index];
        }

        let coord = self.coord();
        let dev_size = coord.scale(font.size);
        let theta = font.rotation.to_radians();
        let skew = (font.shear - 90.0).to_radians().tan();
        let transformed = font.is_rotated() || font.shear != 90.0;

        self.sync_color();
        for run in runs {
            let Some(font_id) = self.ensure_font(font, run.encoding, report) else {
                continue;
            };
            let resource = self.doc.font_resource(font_id).to_string();
            let local = Point::new(
                pen_start.x + run.start_advance * theta.cos(),
                pen_start.y - run.start_advance * theta.sin(),
            );
            let device = Point::new(coord.tx(local.x), coord.ty(local.y));
            self.content.begin_text();
            self.content.set_font(&resource, dev_size);
            if transformed {
                self.content.text_matrix(
                    theta.cos(),
                    theta.sin(),
                    skew * theta.cos() - theta.sin(),
                    skew * theta.sin() + theta.cos(),
                    device.x,
                    device.y,
                );
            } else {
                self.content.text_position(device.x, device.y);
            }
            if matches!(run.encoding, Encoding::Cjk(_)) {
                self.content.show_hex(&run.bytes);
            } else {
                self.content.show_bytes(&run.bytes);
            }
            self.content.end_text();
        }
    }

    /// Text inside a clip picture becomes glyph outlines; glyphs without an
    /// outline fall back to a nested rectangle pair so the clip always gets
    /// a shape.
    fn clip_string(&mut self, text: &str, escp_space: f32, escp_nospace: f32, report: &mut Report) {
        let font = self.states.current().font.clone();
        if font.is_rotated() {
            report.debug(self.page, "rotated text ignored in clip picture");
            return;
        }
        let coord = self.coord();
        let name = font.resolved_name();
        let dev_size = coord.scale(font.size);
        let mut pen = self.states.current().pen;

        for ch in text.chars() {
            let unit = self.metrics.unit_width(&name, ch);
            let escapement = if ch == ' ' { escp_space } else { escp_nospace };
            let advance = unit.unwrap_or(0.6) * font.size + escapement;
            if ch != ' ' && self.emit() {
                let device = Point::new(coord.tx(pen.x), coord.ty(pen.y));
                let outlined = self.metrics.with_face(&name, |face| {
                    let glyph = face.glyph_index(ch)?;
                    let scale = dev_size / face.units_per_em().max(1) as f32;
                    let mut builder = ClipGlyphBuilder {
                        content: &mut self.content,
                        scale,
                        x: device.x,
                        y: device.y,
                        cur: (device.x, device.y),
                        open: false,
                    };
                    face.outline_glyph(glyph, &mut builder)?;
                    if builder.open {
                        builder.content.close_path();
                    }
                    Some(())
                });
                if outlined.is_none() {
                    let width = coord.scale(advance);
                    let height = dev_size * 0.75;
                    let inset = dev_size * 0.1;
                    self.content.rect(
                        device.x + inset,
                        device.y + inset,
                        (width - 2.0 * inset).max(0.0),
                        (height - 2.0 * inset).max(0.0),
                    );
                    self.content.rect(
                        device.x + 2.0 * inset,
                        device.y + 2.0 * inset,
                        (width - 4.0 * inset).max(0.0),
                        (height - 4.0 * inset).max(0.0),
                    );
                }
            }
            pen.x += advance;
        }
        if self.emit() {
            self.content.clip();
        }
        self.states.current_mut().pen = pen;
    }
}

struct ClipGlyphBuilder<'b> {
    content: &'b mut Content,
    scale: f32,
    x: f32,
    y: f32,
    cur: (f32, f32),
    open: bool,
}

impl ClipGlyphBuilder<'_> {
    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.x + x * self.scale, self.y + y * self.scale)
    }
}

impl ttf_parser::OutlineBuilder for ClipGlyphBuilder<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.content.move_to(x, y);
        self.cur = (x, y);
        self.open = true;
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.content.line_to(x, y);
        self.cur = (x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        // Quadratic raised to cubic.
        let (qx, qy) = self.map(x1, y1);
        let (ex, ey) = self.map(x, y);
        let (sx, sy) = self.cur;
        let c1 = (sx + 2.0 / 3.0 * (qx - sx), sy + 2.0 / 3.0 * (qy - sy));
        let c2 = (ex + 2.0 / 3.0 * (qx - ex), ey + 2.0 / 3.0 * (qy - ey));
        self.content.curve_to(c1.0, c1.1, c2.0, c2.1, ex, ey);
        self.cur = (ex, ey);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (c1x, c1y) = self.map(x1, y1);
        let (c2x, c2y) = self.map(x2, y2);
        let (ex, ey) = self.map(x, y);
        self.content.curve_to(c1x, c1y, c2x, c2y, ex, ey);
        self.cur = (ex, ey);
    }

    fn close(&mut self) {
        self.content.close_path();
        self.open = false;
    }
}

/// Crops a normalized raster to the source rectangle. The source rect is
/// inclusive on both edges, matching the recorded operation stream.
fn crop_image(image: NormalizedImage, src: Rect) -> NormalizedImage {
    let iw = image.width as usize;
    let ih = image.height as usize;
    let x0 = src.left.max(0.0) as usize;
    let y0 = src.top.max(0.0) as usize;
    let w = ((src.integer_width() + 1).max(0) as usize).min(iw.saturating_sub(x0));
    let h = ((src.integer_height() + 1).max(0) as usize).min(ih.saturating_sub(y0));
    if x0 == 0 && y0 == 0 && w == iw && h == ih {
        return image;
    }

    let mut rgba = Vec::with_capacity(w * h * 4);
    for y in y0..y0 + h {
        let row = &image.rgba[y * iw * 4..(y * iw + iw) * 4];
        rgba.extend_from_slice(&row[x0 * 4..(x0 + w) * 4]);
    }

    let mask = image.mask.and_then(|bits| {
        let src_row = iw.div_ceil(8);
        let dst_row = w.div_ceil(8);
        let mut out = vec![0u8; dst_row * h];
        let mut any = false;
        for y in 0..h {
            for x in 0..w {
                let sx = x0 + x;
                let sy = y0 + y;
                if bits[sy * src_row + sx / 8] & (0x80 >> (sx & 7)) != 0 {
                    out[y * dst_row + x / 8] |= 0x80 >> (x & 7);
                    any = true;
                }
            }
        }
        any.then_some(out)
    });

    NormalizedImage {
        width: w as u32,
        height: h as u32,
        rgba,
        mask,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(ops: Vec<DrawOp>) -> PageInput {
        PageInput {
            paper: Rect::new(0.0, 0.0, 595.0, 842.0),
            printable: Rect::new(20.0, 20.0, 575.0, 822.0),
            picture: Picture { ops },
        }
    }

    fn render(ops: Vec<DrawOp>) -> (String, Report) {
        render_config(&JobConfig::default(), ops)
    }

    fn render_config(config: &JobConfig, ops: Vec<DrawOp>) -> (String, Report) {
        let (bytes, report) = render_document(config, &[page(ops)]).unwrap();
        (String::from_utf8_lossy(&bytes).to_string(), report)
    }

    #[test]
    fn fill_rect_lands_in_device_space() {
        let (pdf, _) = render(vec![DrawOp::FillRect(Rect::new(0.0, 0.0, 100.0, 50.0))]);
        // Origin (20, 20), page height 842: y = 842 - (20 + 50) = 772.
        assert!(pdf.contains("20 772 100 50 re"));
        assert!(pdf.contains("re\nf"));
    }

    #[test]
    fn scale_applies_to_rect_and_pen() {
        let (pdf, _) = render(vec![
            DrawOp::PushState,
            DrawOp::SetScale(2.0),
            DrawOp::SetPenSize(3.0),
            DrawOp::StrokeRect(Rect::new(0.0, 0.0, 10.0, 10.0)),
            DrawOp::PopState,
        ]);
        assert!(pdf.contains("6 w"));
        assert!(pdf.contains("20 20 re"));
    }

    #[test]
    fn hairline_pen_floors_to_one() {
        let (pdf, _) = render(vec![
            DrawOp::SetPenSize(0.0),
            DrawOp::StrokeLine(Point::new(0.0, 0.0), Point::new(10.0, 0.0)),
        ]);
        assert!(pdf.contains("1 w"));
    }

    #[test]
    fn color_is_emitted_once_per_change() {
        let (pdf, _) = render(vec![
            DrawOp::SetForeColor(Color::rgb(255, 0, 0)),
            DrawOp::FillRect(Rect::new(0.0, 0.0, 10.0, 10.0)),
            DrawOp::FillRect(Rect::new(20.0, 0.0, 30.0, 10.0)),
            DrawOp::SetForeColor(Color::rgb(0, 0, 255)),
            DrawOp::FillRect(Rect::new(40.0, 0.0, 50.0, 10.0)),
        ]);
        assert_eq!(pdf.matches("1 0 0 rg").count(), 1);
        assert_eq!(pdf.matches("0 0 1 rg").count(), 1);
    }

    #[test]
    fn stipple_fill_becomes_tiling_pattern() {
        let stipple = Stipple {
            bits: [0xaa, 0x55, 0xaa, 0x55, 0xaa, 0x55, 0xaa, 0x55],
        };
        let (pdf, _) = render(vec![
            DrawOp::SetStipplePattern(stipple),
            DrawOp::FillRect(Rect::new(0.0, 0.0, 10.0, 10.0)),
        ]);
        assert!(pdf.contains("/Pattern cs"));
        assert!(pdf.contains("/P0 scn"));
        assert!(pdf.contains("/PatternType 1"));
    }

    #[test]
    fn push_pop_emit_save_restore() {
        let (pdf, _) = render(vec![
            DrawOp::PushState,
            DrawOp::FillRect(Rect::new(0.0, 0.0, 10.0, 10.0)),
            DrawOp::PopState,
        ]);
        assert!(pdf.contains("q\n"));
        assert!(pdf.contains("Q\n"));
    }

    #[test]
    fn pop_beyond_root_is_reported_not_fatal() {
        let (_, report) = render(vec![DrawOp::PopState, DrawOp::PopState]);
        assert!(report
            .records()
            .iter()
            .any(|r| r.message.contains("underflow")));
    }

    #[test]
    fn invalid_paper_falls_back_to_a4() {
        let input = PageInput {
            paper: Rect::new(0.0, 0.0, 1.0, 1.0),
            printable: Rect::default(),
            picture: Picture::new(),
        };
        let (bytes, report) = render_document(&JobConfig::default(), &[input]).unwrap();
        let pdf = String::from_utf8_lossy(&bytes);
        assert!(pdf.contains("/MediaBox [0 0 595 842]"));
        assert!(report
            .records()
            .iter()
            .any(|r| r.message.contains("A4")));
    }

    #[test]
    fn clipping_rects_intersect_clip_path() {
        let (pdf, _) = render(vec![
            DrawOp::SetClippingRects(vec![Rect::new(0.0, 0.0, 50.0, 50.0)]),
            DrawOp::FillRect(Rect::new(0.0, 0.0, 100.0, 100.0)),
        ]);
        assert!(pdf.contains("W n"));
    }

    #[test]
    fn round_rect_uses_curves() {
        let (pdf, _) = render(vec![DrawOp::FillRoundRect(
            Rect::new(0.0, 0.0, 100.0, 50.0),
            Point::new(10.0, 10.0),
        )]);
        assert!(pdf.contains(" c\n"));
        assert!(pdf.contains("h\nf"));
    }

    #[test]
    fn ellipse_closes_and_fills() {
        let (pdf, _) = render(vec![DrawOp::FillEllipse {
            center: Point::new(100.0, 100.0),
            radii: Point::new(40.0, 20.0),
        }]);
        assert_eq!(pdf.matches(" c\n").count(), 4);
        assert!(pdf.contains("h\nf"));
    }

    #[test]
    fn filled_arc_is_a_pie_wedge() {
        let (pdf, _) = render(vec![DrawOp::FillArc {
            center: Point::new(100.0, 100.0),
            radii: Point::new(50.0, 50.0),
            start_theta: 0.0,
            arc_theta: 90.0,
        }]);
        // Wedge: move to center, edge line, one quarter-arc curve, close.
        assert!(pdf.contains(" l\n"));
        assert!(pdf.contains(" c\n"));
        assert!(pdf.contains("h\nf"));
    }

    #[test]
    fn draw_string_emits_text_object() {
        let (pdf, _) = render(vec![DrawOp::SetPenLocation(Point::new(10.0, 100.0)), DrawOp::DrawString {
            text: "Hello".to_string(),
            space_escapement: 0.0,
            nonspace_escapement: 0.0,
        }]);
        assert!(pdf.contains("BT"));
        assert!(pdf.contains("(Hello) Tj"));
        assert!(pdf.contains("/F0 12 Tf"));
        assert!(pdf.contains("/BaseFont /Helvetica"));
    }

    #[test]
    fn cjk_text_uses_composite_font() {
        let (pdf, _) = render(vec![DrawOp::DrawString {
            // Hiragana "a".
            text: "\u{3042}".to_string(),
            space_escapement: 0.0,
            nonspace_escapement: 0.0,
        }]);
        assert!(pdf.contains("/Encoding /Identity-H"));
        // CID 843.
        assert!(pdf.contains("<034B> Tj"));
    }

    #[test]
    fn unrenderable_codepoint_is_skipped_silently() {
        // A codepoint in no coverage table and no CID collection.
        let (pdf, report) = render(vec![DrawOp::DrawString {
            text: "a\u{e000}b".to_string(),
            space_escapement: 0.0,
            nonspace_escapement: 0.0,
        }]);
        assert!(pdf.contains("(ab)") || pdf.contains("(a"));
        assert_eq!(report.count_of(crate::report::ReportKind::Error), 0);
    }

    #[test]
    fn user_encoding_glyph_gets_differences_font() {
        let (pdf, _) = render(vec![DrawOp::DrawString {
            // Greek alpha: outside WinAnsi and the coverage tables.
            text: "\u{03b1}".to_string(),
            space_escapement: 0.0,
            nonspace_escapement: 0.0,
        }]);
        assert!(pdf.contains("/Differences [ 0 /uni03B1 ]"));
    }

    #[test]
    fn web_link_annotation_for_drawn_url() {
        let (pdf, _) = render(vec![
            DrawOp::SetPenLocation(Point::new(10.0, 100.0)),
            DrawOp::DrawString {
                text: "see http://example.com/x now".to_string(),
                space_escapement: 0.0,
                nonspace_escapement: 0.0,
            },
        ]);
        assert!(pdf.contains("/S /URI"));
        assert!(pdf.contains("(http://example.com/x)"));
    }

    #[test]
    fn web_links_can_be_disabled() {
        let config = JobConfig {
            create_web_links: false,
            ..JobConfig::default()
        };
        let (pdf, _) = render_config(
            &config,
            vec![DrawOp::DrawString {
                text: "http://example.com/x".to_string(),
                space_escapement: 0.0,
                nonspace_escapement: 0.0,
            }],
        );
        assert!(!pdf.contains("/S /URI"));
    }

    #[test]
    fn bookmarks_from_matching_font() {
        let config = JobConfig {
            bookmark_definitions: vec![BookmarkDefinition {
                level: 1,
                family: "Helvetica".to_string(),
                style: "Regular".to_string(),
                size: 24.0,
                expanded: false,
            }],
            ..JobConfig::default()
        };
        let (pdf, _) = render_config(
            &config,
            vec![
                DrawOp::SetFontSize(24.0),
                DrawOp::SetPenLocation(Point::new(10.0, 50.0)),
                DrawOp::DrawString {
                    text: "Heading".to_string(),
                    space_escapement: 0.0,
                    nonspace_escapement: 0.0,
                },
            ],
        );
        assert!(pdf.contains("/Type /Outlines"));
        assert!(pdf.contains("(Heading)"));
    }

    #[test]
    fn xrefs_link_across_pages() {
        use crate::xref::{Atom, Element, Pattern, Quant};
        let link = Pattern::new({
            let mut e = Pattern::literal("see ");
            e.push(Element::captured(Atom::Digit, Quant::Plus));
            e
        });
        let dest = Pattern::new({
            let mut e = Pattern::literal("Table ");
            e.push(Element::captured(Atom::Digit, Quant::Plus));
            e
        });
        let config = JobConfig {
            xref_rules: vec![XRefRule { link, dest }],
            ..JobConfig::default()
        };
        let text_op = |t: &str| DrawOp::DrawString {
            text: t.to_string(),
            space_escapement: 0.0,
            nonspace_escapement: 0.0,
        };
        // Reference appears before the destination; the scan pass makes the
        // forward reference resolvable anyway.
        let pages = [
            page(vec![DrawOp::SetPenLocation(Point::new(10.0, 100.0)), text_op("see 3")]),
            page(vec![DrawOp::SetPenLocation(Point::new(10.0, 100.0)), text_op("Table 3")]),
        ];
        let (bytes, _) = render_document(&config, &pages).unwrap();
        let pdf = String::from_utf8_lossy(&bytes);
        assert!(pdf.contains("/Dest ["));
        assert!(pdf.contains("/XYZ"));
    }

    #[test]
    fn raster_with_unknown_format_is_reported() {
        let (_, report) = render(vec![DrawOp::DrawPixels {
            src: Rect::new(0.0, 0.0, 0.0, 0.0),
            dest: Rect::new(0.0, 0.0, 1.0, 1.0),
            width: 1,
            height: 1,
            bytes_per_row: 4,
            format: 0xdead,
            data: vec![0; 4],
        }]);
        assert!(report
            .records()
            .iter()
            .any(|r| r.message.contains("unsupported pixel format")));
    }

    #[test]
    fn raster_is_placed_at_destination() {
        let (pdf, _) = render(vec![DrawOp::DrawPixels {
            src: Rect::new(0.0, 0.0, 1.0, 0.0),
            dest: Rect::new(10.0, 10.0, 30.0, 20.0),
            width: 2,
            height: 1,
            bytes_per_row: 6,
            format: 0x0003,
            data: vec![0, 0, 255, 0, 255, 0],
        }]);
        assert!(pdf.contains("/Im0 Do"));
        assert!(pdf.contains("/ColorSpace /DeviceRGB"));
    }

    #[test]
    fn clip_picture_restricts_drawing() {
        let mut clip = Picture::new();
        clip.push(DrawOp::FillRect(Rect::new(0.0, 0.0, 50.0, 50.0)));
        let (pdf, _) = render(vec![
            DrawOp::ClipToPicture {
                picture: clip,
                origin: Point::new(5.0, 5.0),
                inverse: false,
            },
            DrawOp::FillRect(Rect::new(0.0, 0.0, 100.0, 100.0)),
        ]);
        assert!(pdf.contains("W n"));
    }

    #[test]
    fn stroked_clip_line_is_widened_by_pen() {
        let mut clip = Picture::new();
        clip.push(DrawOp::SetPenSize(4.0));
        clip.push(DrawOp::StrokeLine(Point::new(0.0, 50.0), Point::new(10.0, 50.0)));
        let (pdf, _) = render(vec![
            DrawOp::ClipToPicture {
                picture: clip,
                origin: Point::ZERO,
                inverse: false,
            },
            DrawOp::FillRect(Rect::new(0.0, 0.0, 100.0, 100.0)),
        ]);
        // Line at device y = 772, pen 4: band edges at 770 and 774.
        assert!(pdf.contains("770"));
        assert!(pdf.contains("774"));
        assert!(pdf.contains("W n"));
    }

    #[test]
    fn stroked_clip_rect_keeps_the_border_band() {
        let mut clip = Picture::new();
        clip.push(DrawOp::SetPenSize(2.0));
        clip.push(DrawOp::StrokeRect(Rect::new(0.0, 0.0, 50.0, 50.0)));
        let (pdf, _) = render(vec![
            DrawOp::ClipToPicture {
                picture: clip,
                origin: Point::ZERO,
                inverse: false,
            },
            DrawOp::FillRect(Rect::new(0.0, 0.0, 100.0, 100.0)),
        ]);
        // Widened outline, not the bare `x y w h re` interior.
        assert!(!pdf.contains("re\nW n"));
        assert!(pdf.contains("W n"));
    }

    #[test]
    fn stroked_clip_ellipse_is_reported() {
        let mut clip = Picture::new();
        clip.push(DrawOp::StrokeEllipse {
            center: Point::new(50.0, 50.0),
            radii: Point::new(20.0, 10.0),
        });
        let (_, report) = render(vec![DrawOp::ClipToPicture {
            picture: clip,
            origin: Point::ZERO,
            inverse: false,
        }]);
        assert!(report
            .records()
            .iter()
            .any(|r| r.message.contains("stroked ellipse")));
    }

    #[test]
    fn inverse_clip_is_reported_and_skipped() {
        let (pdf, report) = render(vec![DrawOp::ClipToPicture {
            picture: Picture::new(),
            origin: Point::ZERO,
            inverse: true,
        }]);
        assert!(report
            .records()
            .iter()
            .any(|r| r.message.contains("inverse clip")));
        assert!(!pdf.contains("W n"));
    }

    #[test]
    fn crop_trims_rows_and_mask() {
        let image = NormalizedImage {
            width: 2,
            height: 2,
            rgba: vec![
                1, 1, 1, 255, 2, 2, 2, 255, //
                3, 3, 3, 255, 4, 4, 4, 255,
            ],
            mask: Some(vec![0b1000_0000, 0b0100_0000]),
        };
        let cropped = crop_image(image, Rect::new(1.0, 1.0, 1.0, 1.0));
        assert_eq!(cropped.width, 1);
        assert_eq!(cropped.height, 1);
        assert_eq!(cropped.rgba, vec![4, 4, 4, 255]);
        // Only the top-left and bottom-right were masked; the crop keeps the
        // bottom-right pixel.
        assert_eq!(cropped.mask, Some(vec![0b1000_0000]));
    }
}
