#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Point {
        Point { x, y }
    }

    pub fn distance_to(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Edge-based rectangle matching the recorded operation stream. `top` is the
/// smaller y value in page space (y grows downward before the page transform).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Rect {
        Rect {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn integer_width(&self) -> i32 {
        (self.right - self.left) as i32
    }

    pub fn integer_height(&self) -> i32 {
        (self.bottom - self.top) as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(red: u8, green: u8, blue: u8) -> Color {
        Color {
            red,
            green,
            blue,
            alpha: 255,
        }
    }

    pub fn to_unit_rgb(self) -> (f32, f32, f32) {
        (
            self.red as f32 / 255.0,
            self.green as f32 / 255.0,
            self.blue as f32 / 255.0,
        )
    }

    pub fn is_transparent(self) -> bool {
        self.alpha < 128
    }
}

/// An 8x8 1-bit-per-pixel repeating fill texture. Bit 0 of each row byte is
/// the leftmost pixel; a set bit selects the foreground color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stipple {
    pub bits: [u8; 8],
}

impl Stipple {
    pub const SOLID_HIGH: Stipple = Stipple { bits: [0xff; 8] };
    pub const SOLID_LOW: Stipple = Stipple { bits: [0x00; 8] };

    pub fn is_solid_high(&self) -> bool {
        *self == Stipple::SOLID_HIGH
    }

    pub fn is_solid_low(&self) -> bool {
        *self == Stipple::SOLID_LOW
    }
}

impl Default for Stipple {
    fn default() -> Self {
        Stipple::SOLID_HIGH
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapMode {
    #[default]
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinMode {
    #[default]
    Miter,
    Round,
    Bevel,
    // No direct PDF equivalent; rendered as bevel.
    Butt,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawingMode {
    #[default]
    Copy,
    Over,
    Invert,
    Erase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_dimensions() {
        let r = Rect::new(10.0, 20.0, 110.0, 70.0);
        assert_eq!(r.width(), 100.0);
        assert_eq!(r.height(), 50.0);
        assert_eq!(r.integer_width(), 100);
    }

    #[test]
    fn stipple_solid_classification() {
        assert!(Stipple::SOLID_HIGH.is_solid_high());
        assert!(Stipple::SOLID_LOW.is_solid_low());
        let mixed = Stipple {
            bits: [0xaa, 0x55, 0xaa, 0x55, 0xaa, 0x55, 0xaa, 0x55],
        };
        assert!(!mixed.is_solid_high());
        assert!(!mixed.is_solid_low());
    }
}
