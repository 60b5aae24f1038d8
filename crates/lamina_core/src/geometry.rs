//! Geometry shared by every stage of the view pipeline
//!
//! Two coordinate systems are in play:
//!
//! - **World**: the fixed coordinate system of the whole image space, in `f64`
//!   because layer sets routinely span hundreds of thousands of units.
//! - **Screen**: integer pixels of the viewport, origin at the top-left.
//!
//! [`ViewTransform`] maps between them for a given visible world rectangle and
//! magnification.

/// 2D point in world coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Linear interpolation towards `other`
    pub fn lerp(&self, other: Point, t: f64) -> Point {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

/// 2D size in world units
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0.0,
        height: 0.0,
    };

    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Axis-aligned rectangle in world coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        origin: Point::ZERO,
        size: Size::ZERO,
    };

    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    pub fn from_center(center: Point, size: Size) -> Self {
        Self {
            origin: Point::new(
                center.x - size.width / 2.0,
                center.y - size.height / 2.0,
            ),
            size,
        }
    }

    pub fn x(&self) -> f64 {
        self.origin.x
    }

    pub fn y(&self) -> f64 {
        self.origin.y
    }

    pub fn width(&self) -> f64 {
        self.size.width
    }

    pub fn height(&self) -> f64 {
        self.size.height
    }

    pub fn max_x(&self) -> f64 {
        self.origin.x + self.size.width
    }

    pub fn max_y(&self) -> f64 {
        self.origin.y + self.size.height
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.origin.x + self.size.width / 2.0,
            self.origin.y + self.size.height / 2.0,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.origin.x
            && point.x <= self.max_x()
            && point.y >= self.origin.y
            && point.y <= self.max_y()
    }

    /// Whether `other` lies entirely inside this rect
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.origin.x >= self.origin.x
            && other.origin.y >= self.origin.y
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }

    /// Open-interval overlap test: rects that only share an edge do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.origin.x < other.max_x()
            && other.origin.x < self.max_x()
            && self.origin.y < other.max_y()
            && other.origin.y < self.max_y()
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.origin.x.max(other.origin.x);
        let y0 = self.origin.y.max(other.origin.y);
        let x1 = self.max_x().min(other.max_x());
        let y1 = self.max_y().min(other.max_y());
        if x1 > x0 && y1 > y0 {
            Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
        } else {
            None
        }
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x0 = self.origin.x.min(other.origin.x);
        let y0 = self.origin.y.min(other.origin.y);
        let x1 = self.max_x().max(other.max_x());
        let y1 = self.max_y().max(other.max_y());
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Offset the rect by a delta
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Rect {
            origin: Point::new(self.origin.x + dx, self.origin.y + dy),
            size: self.size,
        }
    }

    /// Inset the rect by a delta (shrink from all sides)
    pub fn inset(&self, dx: f64, dy: f64) -> Self {
        Rect {
            origin: Point::new(self.origin.x + dx, self.origin.y + dy),
            size: Size::new(
                (self.size.width - 2.0 * dx).max(0.0),
                (self.size.height - 2.0 * dy).max(0.0),
            ),
        }
    }

    /// Bit patterns of the four components, used for exact hashing
    pub fn to_bits(&self) -> [u64; 4] {
        [
            self.origin.x.to_bits(),
            self.origin.y.to_bits(),
            self.size.width.to_bits(),
            self.size.height.to_bits(),
        ]
    }
}

/// Viewport size in screen pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> usize {
        (self.width as usize).saturating_mul(self.height as usize)
    }

    /// Bytes needed for an RGBA8 buffer of this size
    pub fn rgba_bytes(&self) -> usize {
        self.pixel_count().saturating_mul(4)
    }

    pub fn to_rect(self) -> ScreenRect {
        ScreenRect::new(
            0,
            0,
            i32::try_from(self.width).unwrap_or(i32::MAX),
            i32::try_from(self.height).unwrap_or(i32::MAX),
        )
    }
}

/// Fractional screen coordinates are clamped to this distance from the
/// origin before they become pixels. Edge arithmetic on the result stays
/// well inside `i32`.
pub const SCREEN_COORD_LIMIT: f64 = 536_870_912.0;

/// Rectangle in screen pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ScreenRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest pixel rect covering the fractional edges `[x0, x1) x [y0, y1)`
    pub fn from_edges(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        let snap = |v: f64| v.clamp(-SCREEN_COORD_LIMIT, SCREEN_COORD_LIMIT) as i32;
        let (x0, y0) = (snap(x0.floor()), snap(y0.floor()));
        let (x1, y1) = (snap(x1.ceil()), snap(y1.ceil()));
        ScreenRect::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn max_x(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn max_y(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Grow by `margin` pixels on every side
    pub fn inflate(&self, margin: i32) -> ScreenRect {
        ScreenRect::new(
            self.x.saturating_sub(margin),
            self.y.saturating_sub(margin),
            self.width.saturating_add(margin.saturating_mul(2)),
            self.height.saturating_add(margin.saturating_mul(2)),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, other: &ScreenRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }

    pub fn intersects(&self, other: &ScreenRect) -> bool {
        self.x < other.max_x()
            && other.x < self.max_x()
            && self.y < other.max_y()
            && other.y < self.max_y()
    }

    /// Smallest rect covering both. An empty rect contributes nothing.
    pub fn union(&self, other: &ScreenRect) -> ScreenRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.max_x().max(other.max_x());
        let y1 = self.max_y().max(other.max_y());
        ScreenRect::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }

    pub fn intersection(&self, other: &ScreenRect) -> Option<ScreenRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.max_x().min(other.max_x());
        let y1 = self.max_y().min(other.max_y());
        if x1 > x0 && y1 > y0 {
            Some(ScreenRect::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0)))
        } else {
            None
        }
    }

    /// Clip to the viewport bounds
    pub fn clip_to(&self, size: PixelSize) -> Option<ScreenRect> {
        self.intersection(&size.to_rect())
    }
}

/// World-to-screen mapping for one view: `screen = (world - origin) * scale`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub origin: Point,
    pub scale: f64,
}

impl ViewTransform {
    pub const IDENTITY: ViewTransform = ViewTransform {
        origin: Point::ZERO,
        scale: 1.0,
    };

    pub const fn new(origin: Point, scale: f64) -> Self {
        Self { origin, scale }
    }

    pub fn to_screen(&self, point: Point) -> (f64, f64) {
        (
            (point.x - self.origin.x) * self.scale,
            (point.y - self.origin.y) * self.scale,
        )
    }

    pub fn to_world(&self, x: f64, y: f64) -> Point {
        Point::new(
            x / self.scale + self.origin.x,
            y / self.scale + self.origin.y,
        )
    }

    /// Map a world rect to fractional screen coordinates `(x0, y0, x1, y1)`
    pub fn rect_to_screen(&self, rect: &Rect) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.to_screen(rect.origin);
        (
            x0,
            y0,
            x0 + rect.width() * self.scale,
            y0 + rect.height() * self.scale,
        )
    }

    /// Smallest pixel rect covering the world rect, clamped to
    /// [`SCREEN_COORD_LIMIT`]
    pub fn rect_to_screen_bounds(&self, rect: &Rect) -> ScreenRect {
        let (x0, y0, x1, y1) = self.rect_to_screen(rect);
        ScreenRect::from_edges(x0, y0, x1, y1)
    }

    pub fn screen_rect_to_world(&self, rect: &ScreenRect) -> Rect {
        let origin = self.to_world(rect.x as f64, rect.y as f64);
        Rect::new(
            origin.x,
            origin.y,
            rect.width as f64 / self.scale,
            rect.height as f64 / self.scale,
        )
    }
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
