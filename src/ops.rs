use crate::types::{CapMode, Color, DrawingMode, JoinMode, Point, Rect, Stipple};

/// One operator of a recorded vector shape: an ordered move/line/curve/close
/// stream replayed through the path builder.
#[derive(Debug, Clone)]
pub enum ShapeOp {
    MoveTo(Point),
    LineTo(Vec<Point>),
    /// Three control points; the current point supplies the fourth.
    BezierTo([Point; 3]),
    Close,
}

#[derive(Debug, Clone, Default)]
pub struct Shape {
    pub ops: Vec<ShapeOp>,
}

impl Shape {
    pub fn new() -> Shape {
        Shape::default()
    }

    pub fn move_to(&mut self, point: Point) -> &mut Self {
        self.ops.push(ShapeOp::MoveTo(point));
        self
    }

    pub fn line_to(&mut self, point: Point) -> &mut Self {
        self.ops.push(ShapeOp::LineTo(vec![point]));
        self
    }

    pub fn bezier_to(&mut self, control: [Point; 3]) -> &mut Self {
        self.ops.push(ShapeOp::BezierTo(control));
        self
    }

    pub fn close(&mut self) -> &mut Self {
        self.ops.push(ShapeOp::Close);
        self
    }
}

/// One drawing operation of the recorded page stream. The operation set is
/// fixed; playback is an exhaustive `match` in the translator.
#[derive(Debug, Clone)]
pub enum DrawOp {
    MovePenBy(Point),
    SetPenLocation(Point),
    StrokeLine(Point, Point),
    StrokeRect(Rect),
    FillRect(Rect),
    StrokeRoundRect(Rect, Point),
    FillRoundRect(Rect, Point),
    StrokeBezier([Point; 4]),
    FillBezier([Point; 4]),
    StrokeArc {
        center: Point,
        radii: Point,
        start_theta: f32,
        arc_theta: f32,
    },
    FillArc {
        center: Point,
        radii: Point,
        start_theta: f32,
        arc_theta: f32,
    },
    StrokeEllipse {
        center: Point,
        radii: Point,
    },
    FillEllipse {
        center: Point,
        radii: Point,
    },
    StrokePolygon {
        points: Vec<Point>,
        closed: bool,
    },
    FillPolygon {
        points: Vec<Point>,
    },
    StrokeShape(Shape),
    FillShape(Shape),
    DrawString {
        text: String,
        /// Extra advance applied after each space character.
        space_escapement: f32,
        /// Extra advance applied after each non-space character.
        nonspace_escapement: f32,
    },
    DrawPixels {
        src: Rect,
        dest: Rect,
        width: u32,
        height: u32,
        bytes_per_row: usize,
        /// Raw pixel format code; unknown codes are a reported conversion
        /// failure, not a panic.
        format: u32,
        data: Vec<u8>,
    },
    SetClippingRects(Vec<Rect>),
    ClipToPicture {
        picture: Picture,
        origin: Point,
        inverse: bool,
    },
    PushState,
    PopState,
    SetOrigin(Point),
    SetScale(f32),
    SetDrawingMode(DrawingMode),
    SetLineMode {
        cap: CapMode,
        join: JoinMode,
        miter_limit: f32,
    },
    SetPenSize(f32),
    SetForeColor(Color),
    SetBackColor(Color),
    SetStipplePattern(Stipple),
    SetFontFamily(String),
    SetFontStyle(String),
    SetFontSize(f32),
    SetFontRotation(f32),
    SetFontShear(f32),
    SetFontSpacing(i32),
    SetFontEncoding(i32),
    SetFontFlags(u32),
}

/// One recorded sub-stream (the unit replayed per page or clipped region).
#[derive(Debug, Clone, Default)]
pub struct Picture {
    pub ops: Vec<DrawOp>,
}

impl Picture {
    pub fn new() -> Picture {
        Picture::default()
    }

    pub fn push(&mut self, op: DrawOp) -> &mut Self {
        self.ops.push(op);
        self
    }
}
