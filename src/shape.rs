use crate::pdf::Content;
use crate::state::CoordSystem;
use crate::types::Point;
use smallvec::SmallVec;

/// Flattens one cubic segment into line samples, start point excluded. The
/// sample count follows the control polygon length in device units, clamped
/// so degenerate and huge curves both stay bounded.
pub(crate) fn flatten_cubic(
    p0: Point,
    p1: Point,
    p2: Point,
    p3: Point,
    scale: f32,
) -> SmallVec<[Point; 32]> {
    let length = p0.distance_to(p1) + p1.distance_to(p2) + p2.distance_to(p3);
    let n = (scale * length).round().clamp(2.0, 30.0) as usize;
    let mut out = SmallVec::new();
    for i in 1..=n {
        let t = i as f32 / n as f32;
        let u = 1.0 - t;
        let x = u * u * u * p0.x
            + 3.0 * u * u * t * p1.x
            + 3.0 * u * t * t * p2.x
            + t * t * t * p3.x;
        let y = u * u * u * p0.y
            + 3.0 * u * u * t * p1.y
            + 3.0 * u * t * t * p2.y
            + t * t * t * p3.y;
        out.push(Point::new(x, y));
    }
    out
}

/// Widens a flattened polyline into a closed polygon covering the stroked
/// area: one pass offset to the left of the path, one pass back on the
/// right. Joins are approximated by the segment-end offsets, which is
/// sufficient for clip paths.
pub(crate) fn stroke_outline(points: &[Point], width: f32, closed: bool) -> Vec<Point> {
    let half = (width / 2.0).max(0.0001);
    if points.len() < 2 {
        let Some(center) = points.first() else {
            return Vec::new();
        };
        return vec![
            Point::new(center.x - half, center.y - half),
            Point::new(center.x + half, center.y - half),
            Point::new(center.x + half, center.y + half),
            Point::new(center.x - half, center.y + half),
        ];
    }

    // A closed ring is widened like an open one with the seam segment added;
    // the overlap at the seam is harmless for clip use.
    let ring: Vec<Point> = if closed && points.first() != points.last() {
        let mut r = points.to_vec();
        r.push(points[0]);
        r
    } else {
        points.to_vec()
    };

    let mut left = Vec::with_capacity(ring.len() * 2);
    let mut right = Vec::with_capacity(ring.len() * 2);
    for pair in ring.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let len = (dx * dx + dy * dy).sqrt();
        if len < f32::EPSILON {
            continue;
        }
        let nx = -dy / len * half;
        let ny = dx / len * half;
        left.push(Point::new(a.x + nx, a.y + ny));
        left.push(Point::new(b.x + nx, b.y + ny));
        right.push(Point::new(a.x - nx, a.y - ny));
        right.push(Point::new(b.x - nx, b.y - ny));
    }
    right.reverse();
    left.extend(right);
    left
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PaintMode {
    Stroke,
    Fill,
    /// Intersect the clip path instead of marking the page. Stroked paths
    /// are widened by the pen size first; PDF clips have no stroke form.
    ClipStroke,
    ClipFill,
}

/// Replays shape operators into flattened device-space subpaths and paints
/// them once. Curves are flattened so the same machinery serves drawing and
/// stroked clipping.
pub(crate) struct ShapePainter {
    coord: CoordSystem,
    mode: PaintMode,
    pen_size: f32,
    subpaths: Vec<Vec<Point>>,
    current: Vec<Point>,
    local_pen: Point,
    closed_flags: Vec<bool>,
    current_closed: bool,
    drawn: bool,
}

impl ShapePainter {
    pub fn new(coord: CoordSystem, mode: PaintMode, pen_size: f32) -> ShapePainter {
        ShapePainter {
            coord,
            mode,
            pen_size,
            subpaths: Vec::new(),
            current: Vec::new(),
            local_pen: Point::ZERO,
            closed_flags: Vec::new(),
            current_closed: false,
            drawn: false,
        }
    }

    fn device(&self, point: Point) -> Point {
        Point::new(self.coord.tx(point.x), self.coord.ty(point.y))
    }

    fn flush_subpath(&mut self) {
        if self.current.len() > 1 {
            self.subpaths.push(std::mem::take(&mut self.current));
            self.closed_flags.push(self.current_closed);
        } else {
            self.current.clear();
        }
        self.current_closed = false;
    }

    pub fn move_to(&mut self, point: Point) {
        self.flush_subpath();
        self.local_pen = point;
        let device = self.device(point);
        self.current.push(device);
    }

    pub fn line_to(&mut self, points: &[Point]) {
        if self.current.is_empty() {
            self.current.push(self.device(self.local_pen));
        }
        for point in points {
            self.local_pen = *point;
            let device = self.device(*point);
            self.current.push(device);
        }
    }

    pub fn bezier_to(&mut self, control: [Point; 3]) {
        if self.current.is_empty() {
            self.current.push(self.device(self.local_pen));
        }
        let p0 = self.device(self.local_pen);
        let p1 = self.device(control[0]);
        let p2 = self.device(control[1]);
        let p3 = self.device(control[2]);
        let samples = flatten_cubic(p0, p1, p2, p3, 1.0);
        self.current.extend(samples.into_iter());
        self.local_pen = control[2];
    }

    /// Closing an already closed subpath is ignored; the return value lets
    /// the caller record the redundant operator.
    pub fn close(&mut self) -> bool {
        if self.current_closed || self.current.len() < 2 {
            return false;
        }
        self.current_closed = true;
        let start = self.current[0];
        self.current.push(start);
        self.flush_subpath();
        true
    }

    /// Emits the collected subpaths exactly once; later calls are no-ops.
    pub fn paint(&mut self, content: &mut Content) {
        if self.drawn {
            return;
        }
        self.drawn = true;
        self.flush_subpath();
        if self.subpaths.is_empty() {
            return;
        }

        let widen = self.mode == PaintMode::ClipStroke;
        for (index, subpath) in self.subpaths.iter().enumerate() {
            let closed = self.closed_flags[index];
            if widen {
                let scaled = self.coord.scale(self.pen_size);
                let outline = stroke_outline(subpath, scaled, closed);
                emit_polygon(content, &outline, true);
            } else {
                emit_polygon(content, subpath, closed);
            }
        }
        match self.mode {
            PaintMode::Stroke => content.stroke(),
            PaintMode::Fill => content.fill(),
            PaintMode::ClipStroke | PaintMode::ClipFill => content.clip(),
        }
    }
}

fn emit_polygon(content: &mut Content, points: &[Point], close: bool) {
    let Some(first) = points.first() else {
        return;
    };
    content.move_to(first.x, first.y);
    for point in &points[1..] {
        content.line_to(point.x, point.y);
    }
    if close {
        content.close_path();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord() -> CoordSystem {
        CoordSystem::new(100.0, 0.0, 0.0)
    }

    #[test]
    fn flatten_ends_on_curve_endpoint() {
        let samples = flatten_cubic(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(20.0, 10.0),
            Point::new(30.0, 10.0),
            1.0,
        );
        let last = samples.last().unwrap();
        assert_eq!(*last, Point::new(30.0, 10.0));
        assert!(samples.len() >= 2 && samples.len() <= 30);
    }

    #[test]
    fn flatten_degenerate_curve_still_samples() {
        let p = Point::new(5.0, 5.0);
        let samples = flatten_cubic(p, p, p, p, 1.0);
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn outline_of_horizontal_segment_is_a_band() {
        let outline = stroke_outline(
            &[Point::new(0.0, 0.0), Point::new(10.0, 0.0)],
            2.0,
            false,
        );
        assert_eq!(outline.len(), 4);
        for point in &outline {
            assert!((point.y.abs() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn painter_clips_instead_of_filling() {
        let mut painter = ShapePainter::new(coord(), PaintMode::ClipFill, 1.0);
        painter.move_to(Point::new(0.0, 0.0));
        painter.line_to(&[Point::new(10.0, 0.0), Point::new(10.0, 10.0)]);
        painter.close();
        let mut content = Content::new();
        painter.paint(&mut content);
        assert!(content.as_str().contains("W n"));
        assert!(!content.as_str().contains("f\n"));
    }

    #[test]
    fn repeated_close_is_ignored() {
        let mut painter = ShapePainter::new(coord(), PaintMode::Fill, 1.0);
        painter.move_to(Point::new(0.0, 0.0));
        painter.line_to(&[Point::new(10.0, 0.0)]);
        assert!(painter.close());
        assert!(!painter.close());
    }

    #[test]
    fn paint_happens_at_most_once() {
        let mut painter = ShapePainter::new(coord(), PaintMode::Stroke, 1.0);
        painter.move_to(Point::new(0.0, 0.0));
        painter.line_to(&[Point::new(5.0, 5.0)]);
        let mut content = Content::new();
        painter.paint(&mut content);
        let once = content.as_str().len();
        painter.paint(&mut content);
        assert_eq!(content.as_str().len(), once);
    }

    #[test]
    fn stroked_clip_widens_by_pen_size() {
        let mut painter = ShapePainter::new(coord(), PaintMode::ClipStroke, 4.0);
        painter.move_to(Point::new(0.0, 50.0));
        painter.line_to(&[Point::new(10.0, 50.0)]);
        let mut content = Content::new();
        painter.paint(&mut content);
        let text = content.as_str();
        assert!(text.contains("W n"));
        // Band edges sit two units either side of the path.
        assert!(text.contains("52 m") || text.contains("52 l"));
        assert!(text.contains("48"));
    }
}
