use crate::fonts::FontDescriptor;
use crate::report::Report;
use crate::types::{CapMode, Color, DrawingMode, JoinMode, Point, Stipple};

/// Page-space to PDF-space transform: a uniform scale, an origin offset, and
/// a vertical flip (the two coordinate systems disagree on axis direction).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordSystem {
    origin: Point,
    height: f32,
    scale: f32,
}

impl CoordSystem {
    pub fn new(height: f32, origin_x: f32, origin_y: f32) -> CoordSystem {
        CoordSystem {
            origin: Point::new(origin_x, origin_y),
            height,
            scale: 1.0,
        }
    }

    pub fn tx(&self, x: f32) -> f32 {
        self.origin.x + self.scale * x
    }

    pub fn ty(&self, y: f32) -> f32 {
        self.height - (self.origin.y + self.scale * y)
    }

    pub fn scale(&self, length: f32) -> f32 {
        self.scale * length
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale
    }

    pub fn set_origin(&mut self, x: f32, y: f32) {
        self.origin = Point::new(x, y);
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }
}

#[derive(Debug, Clone)]
pub struct GraphicsState {
    pub coord: CoordSystem,
    pub foreground: Color,
    pub background: Color,
    /// Color most recently emitted to the output, tracked so unchanged
    /// colors are not re-emitted. `None` forces the next emission (initial
    /// state, or after a pattern fill replaced the fill color source).
    pub current_color: Option<Color>,
    pub stipple: Stipple,
    pub pen_size: f32,
    pub cap: CapMode,
    pub join: JoinMode,
    pub miter_limit: f32,
    pub pen: Point,
    pub drawing_mode: DrawingMode,
    pub font: FontDescriptor,
}

impl GraphicsState {
    pub fn new(height: f32, origin_x: f32, origin_y: f32) -> GraphicsState {
        GraphicsState {
            coord: CoordSystem::new(height, origin_x, origin_y),
            foreground: Color::BLACK,
            background: Color::WHITE,
            current_color: None,
            stipple: Stipple::SOLID_HIGH,
            pen_size: 1.0,
            cap: CapMode::Butt,
            join: JoinMode::Miter,
            miter_limit: 10.0,
            pen: Point::ZERO,
            drawing_mode: DrawingMode::Copy,
            font: FontDescriptor::default(),
        }
    }
}

/// Nested graphics states for one page, held in a growable arena with parent
/// indices instead of owned links. Push and pop are O(1); popped nodes stay
/// in the arena until the page ends.
#[derive(Debug)]
pub struct StateStack {
    arena: Vec<StateNode>,
    top: usize,
}

#[derive(Debug)]
struct StateNode {
    state: GraphicsState,
    parent: Option<usize>,
}

impl StateStack {
    pub fn new(root: GraphicsState) -> StateStack {
        StateStack {
            arena: vec![StateNode {
                state: root,
                parent: None,
            }],
            top: 0,
        }
    }

    pub fn current(&self) -> &GraphicsState {
        &self.arena[self.top].state
    }

    pub fn current_mut(&mut self) -> &mut GraphicsState {
        &mut self.arena[self.top].state
    }

    pub fn parent(&self) -> Option<&GraphicsState> {
        let parent = self.arena[self.top].parent?;
        Some(&self.arena[parent].state)
    }

    /// The new state inherits all fields from the current one.
    pub fn push(&mut self) {
        let state = self.current().clone();
        self.arena.push(StateNode {
            state,
            parent: Some(self.top),
        });
        self.top = self.arena.len() - 1;
    }

    /// Popping the root state is reported, not fatal.
    pub fn pop(&mut self, page: u32, report: &mut Report) -> bool {
        match self.arena[self.top].parent {
            Some(parent) => {
                self.top = parent;
                true
            }
            None => {
                report.debug(page, "state stack underflow");
                false
            }
        }
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut index = self.top;
        while let Some(parent) = self.arena[index].parent {
            depth += 1;
            index = parent;
        }
        depth
    }

    /// Composes an origin change relative to the parent frame: the offset is
    /// scaled by the parent's factor and added to the parent's origin, so
    /// nested frames (e.g. clip-to-picture with an offset) stack correctly.
    pub fn set_origin(&mut self, point: Point) {
        let (base, factor) = match self.parent() {
            Some(parent) => (parent.coord.origin(), parent.coord.scale_factor()),
            None => (Point::ZERO, 1.0),
        };
        let coord = &mut self.current_mut().coord;
        coord.set_origin(base.x + factor * point.x, base.y + factor * point.y);
    }

    /// Scale composes multiplicatively with the parent's scale.
    pub fn set_scale(&mut self, scale: f32) {
        let factor = self
            .parent()
            .map(|p| p.coord.scale_factor())
            .unwrap_or(1.0);
        self.current_mut().coord.set_scale(scale * factor);
    }
}
