use tracing::debug;

use super::geometry::{BoundingBox, Point, Polygon};

/// Decides whether `point` sits inside any exclusion zone.
///
/// Rectangles are tested before polygons and the first zone containing the point wins.
/// With no zones configured nothing is ever excluded.
pub fn is_excluded(point: Point, rects: &[BoundingBox], polygons: &[Polygon]) -> bool {
    if rects.is_empty() && polygons.is_empty() {
        return false;
    }
    for rect in rects {
        if rect.contains_point(point) {
            debug!(x = point.x_px(), y = point.y_px(), zone = ?rect, "Anchor inside ignore area");
            return true;
        }
        debug!(x = point.x_px(), y = point.y_px(), zone = ?rect, "Anchor outside ignore area");
    }
    for (idx, polygon) in polygons.iter().enumerate() {
        if polygon.contains(point) {
            debug!(x = point.x_px(), y = point.y_px(), polygon = idx, "Anchor inside ignore polygon");
            return true;
        }
        debug!(x = point.x_px(), y = point.y_px(), polygon = idx, "Anchor outside ignore polygon");
    }
    false
}
