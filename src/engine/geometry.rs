use serde::{ser::SerializeStruct, Deserialize, Serialize, Serializer};

/// Number of fixed-precision units per pixel. Anchor points land between pixels, so every
/// coordinate used in a containment test is carried in thousandths of a pixel.
pub const SUBPIXEL: i64 = 1000;

/// Largest pixel coordinate, in either direction, accepted in a box or zone. Keeps every
/// fixed-precision product well inside `i64`.
pub const MAX_PIXEL: i64 = 1 << 20;

/// Axis aligned box in whole pixel coordinates.
#[derive(Debug, PartialEq, Eq, Deserialize, Serialize, Clone, Copy)]
pub struct BoundingBox {
    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
}

impl BoundingBox {
    pub fn new(x_min: i64, y_min: i64, x_max: i64, y_max: i64) -> Result<Self, GeometryError> {
        let bbox = BoundingBox {
            x_min,
            y_min,
            x_max,
            y_max,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        for v in [self.x_min, self.y_min, self.x_max, self.y_max] {
            check_pixel(v)?;
        }
        if self.x_min < self.x_max && self.y_min < self.y_max {
            Ok(())
        } else {
            Err(GeometryError::InvalidRectangle(*self))
        }
    }

    pub fn width(&self) -> i64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> i64 {
        self.y_max - self.y_min
    }

    /// Strict containment: a point lying on an edge is outside.
    pub fn contains_point(&self, p: Point) -> bool {
        let scaled = BoundingBox {
            x_min: self.x_min * SUBPIXEL,
            y_min: self.y_min * SUBPIXEL,
            x_max: self.x_max * SUBPIXEL,
            y_max: self.y_max * SUBPIXEL,
        };
        // A point is a zero-sized box
        let point = BoundingBox {
            x_min: p.x,
            y_min: p.y,
            x_max: p.x,
            y_max: p.y,
        };
        rectangle_contains(&scaled, &point)
    }
}

fn check_pixel(v: i64) -> Result<i64, GeometryError> {
    if (-MAX_PIXEL..=MAX_PIXEL).contains(&v) {
        Ok(v)
    } else {
        Err(GeometryError::CoordinateOutOfRange(v))
    }
}

/// `true` iff `inner` lies strictly inside `outer` on all four sides. Shared edges do not count.
pub fn rectangle_contains(outer: &BoundingBox, inner: &BoundingBox) -> bool {
    outer.x_min < inner.x_min
        && inner.x_max < outer.x_max
        && outer.y_min < inner.y_min
        && inner.y_max < outer.y_max
}

/// A point in fixed-precision (1/`SUBPIXEL` pixel) coordinates.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub fn from_pixels(x: i64, y: i64) -> Self {
        Point {
            x: x * SUBPIXEL,
            y: y * SUBPIXEL,
        }
    }

    pub fn x_px(&self) -> f64 {
        self.x as f64 / SUBPIXEL as f64
    }

    pub fn y_px(&self) -> f64 {
        self.y as f64 / SUBPIXEL as f64
    }
}

// Serialized in pixels so records read the same as the detector output
impl Serialize for Point {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Point", 2)?;
        s.serialize_field("x", &self.x_px())?;
        s.serialize_field("y", &self.y_px())?;
        s.end()
    }
}

/// Simple (non self-intersecting) polygon with at least three vertices.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Polygon {
    vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(vertices: Vec<Point>) -> Result<Self, GeometryError> {
        if vertices.len() < 3 {
            return Err(GeometryError::InvalidGeometry(vertices.len()));
        }
        for v in &vertices {
            check_pixel(v.x / SUBPIXEL)?;
            check_pixel(v.y / SUBPIXEL)?;
        }
        Ok(Polygon { vertices })
    }

    /// Builds a polygon from `[x, y]` pixel pairs as written in the camera configuration.
    pub fn from_pixels(points: &[[i64; 2]]) -> Result<Self, GeometryError> {
        let vertices = points
            .iter()
            .map(|[x, y]| -> Result<Point, GeometryError> {
                Ok(Point::from_pixels(check_pixel(*x)?, check_pixel(*y)?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(vertices)
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn contains(&self, p: Point) -> bool {
        // Vertex count was checked in `new`
        matches!(polygon_contains_point(&self.vertices, p), Ok(true))
    }
}

/// Even-odd point in polygon test over an ordered vertex list. Casts a ray towards +x and
/// counts edge crossings in pure integer arithmetic, so repeated calls on the same input
/// always agree.
pub fn polygon_contains_point(vertices: &[Point], p: Point) -> Result<bool, GeometryError> {
    if vertices.len() < 3 {
        return Err(GeometryError::InvalidGeometry(vertices.len()));
    }
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let a = vertices[i];
        let b = vertices[j];
        if (a.y > p.y) != (b.y > p.y) {
            // p.x < a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y), without the division
            let dy = b.y as i128 - a.y as i128;
            let lhs = (p.x as i128 - a.x as i128) * dy;
            let rhs = (p.y as i128 - a.y as i128) * (b.x as i128 - a.x as i128);
            let crosses = if dy > 0 { lhs < rhs } else { lhs > rhs };
            if crosses {
                inside = !inside;
            }
        }
        j = i;
    }
    Ok(inside)
}

quick_error! {
    #[derive(Debug, PartialEq, Eq, Clone)]
    pub enum GeometryError {
        InvalidGeometry(vertices: usize) {
            display("Polygon needs at least 3 vertices, got {}", vertices)
        }
        CoordinateOutOfRange(value: i64) {
            display("Coordinate {} is outside of +/-{} pixels", value, MAX_PIXEL)
        }
        InvalidRectangle(rect: BoundingBox) {
            display("Rectangle ({}, {}, {}, {}) must have x_min < x_max and y_min < y_max",
                rect.x_min, rect.y_min, rect.x_max, rect.y_max)
        }
    }
}
