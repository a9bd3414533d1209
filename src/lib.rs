mod bookmark;
mod encoding;
mod error;
mod fonts;
mod image;
mod link;
mod ops;
mod pdf;
mod report;
mod shape;
mod state;
mod textline;
mod types;
mod writer;
mod xref;

pub use bookmark::{BookmarkDefinition, MAX_BOOKMARK_LEVEL};
pub use error::PlatenError;
pub use fonts::{
    CjkEncoding, DEFAULT_CJK_ORDER, FontClass, FontDescriptor, FontFile, Fonts,
};
pub use image::PixelFormat;
pub use ops::{DrawOp, Picture, Shape, ShapeOp};
pub use report::{Report, ReportKind, ReportRecord};
pub use types::{CapMode, Color, DrawingMode, JoinMode, Point, Rect, Stipple};
pub use writer::{JobConfig, PageInput, render_document};
pub use xref::{Atom, Element, Pattern, PatternMatch, Quant, XRefRule};
