use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::geometry::{BoundingBox, GeometryError, Point, Polygon, SUBPIXEL};
use crate::config::ConfigDetectObject;

/// One object reported by the detector.
#[derive(Debug, PartialEq, Deserialize, Serialize, Clone)]
pub struct Detection {
    pub label: String,
    pub confidence: f64,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

impl Detection {
    /// Confidence as a whole percentage. Exact halves round to the even neighbour.
    pub fn confidence_pct(&self) -> i64 {
        (100.0 * self.confidence).round_ties_even() as i64
    }
}

/// Vertical position of the anchor inside a box, in thousandths of the box height measured
/// from the bottom edge. 500 is the centre, 0 the bottom edge (ground contact).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct AnchorOffset(i64);

impl AnchorOffset {
    pub const CENTER: AnchorOffset = AnchorOffset(SUBPIXEL / 2);

    pub fn from_fraction(f: f64) -> Result<Self, RuleError> {
        if !(0.0..=1.0).contains(&f) {
            return Err(RuleError::OutOfRange(
                "anchor_offset".into(),
                format!("{} is not within [0, 1]", f),
            ));
        }
        Ok(AnchorOffset((f * SUBPIXEL as f64).round() as i64))
    }

    pub fn anchor(&self, bbox: &BoundingBox) -> Point {
        Point {
            x: (bbox.x_min + bbox.x_max) * SUBPIXEL / 2,
            y: bbox.y_min * SUBPIXEL + bbox.height() * (SUBPIXEL - self.0),
        }
    }
}

impl Default for AnchorOffset {
    fn default() -> Self {
        Self::CENTER
    }
}

/// Thresholds and exclusion zones for one object type on one camera.
#[derive(Debug, PartialEq, Clone)]
pub struct DetectionRule {
    pub object_type: String,
    pub min_width: i64,
    pub min_height: i64,
    pub min_confidence: f64,
    pub ignore_rects: Vec<BoundingBox>,
    pub ignore_polygons: Vec<Polygon>,
}

impl DetectionRule {
    pub fn from_config(cfg: &ConfigDetectObject) -> Result<DetectionRule, RuleError> {
        let object_type = cfg
            .object_type
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RuleError::FieldMissing("type".into()))?;
        let min_width = cfg
            .min_width
            .ok_or_else(|| RuleError::FieldMissing(format!("{}.min_width", object_type)))?;
        let min_height = cfg
            .min_height
            .ok_or_else(|| RuleError::FieldMissing(format!("{}.min_height", object_type)))?;
        let min_confidence = cfg
            .min_confidence
            .ok_or_else(|| RuleError::FieldMissing(format!("{}.min_confidence", object_type)))?;

        if min_width < 0 || min_height < 0 {
            return Err(RuleError::OutOfRange(
                format!("{}.min_width/min_height", object_type),
                format!("{}x{} is negative", min_width, min_height),
            ));
        }
        if !(0.0..=100.0).contains(&min_confidence) {
            return Err(RuleError::OutOfRange(
                format!("{}.min_confidence", object_type),
                format!("{} is not a percentage", min_confidence),
            ));
        }

        let ignore_rects = cfg
            .ignore_areas
            .iter()
            .map(|r| r.validate().map(|_| *r))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RuleError::ZoneInvalid(object_type.clone(), e))?;
        let ignore_polygons = cfg
            .ignore_polygons
            .iter()
            .map(|p| Polygon::from_pixels(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RuleError::ZoneInvalid(object_type.clone(), e))?;

        Ok(DetectionRule {
            object_type,
            min_width,
            min_height,
            min_confidence,
            ignore_rects,
            ignore_polygons,
        })
    }

    /// Size and confidence must all be strictly above the configured minimums.
    pub fn admits(&self, detection: &Detection) -> bool {
        detection.bbox.width() > self.min_width
            && detection.bbox.height() > self.min_height
            && detection.confidence_pct() as f64 > self.min_confidence
    }
}

/// Every rule configured for a camera, keyed by object type.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct CameraRules {
    rules: HashMap<String, DetectionRule>,
    pub anchor_offset: AnchorOffset,
}

impl CameraRules {
    pub fn new(rules: Vec<DetectionRule>, anchor_offset: AnchorOffset) -> Result<Self, RuleError> {
        let mut map = HashMap::with_capacity(rules.len());
        for rule in rules {
            if map.contains_key(&rule.object_type) {
                return Err(RuleError::DuplicateType(rule.object_type));
            }
            map.insert(rule.object_type.clone(), rule);
        }
        Ok(CameraRules {
            rules: map,
            anchor_offset,
        })
    }

    pub fn get(&self, object_type: &str) -> Option<&DetectionRule> {
        self.rules.get(object_type)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A detection that passed its type, size and confidence thresholds, ready for zone testing.
#[derive(Debug, PartialEq, Clone)]
pub struct ClassifiedCandidate<'a> {
    pub detection: &'a Detection,
    pub rule: &'a DetectionRule,
    pub anchor: Point,
}

pub fn classify<'a>(
    detection: &'a Detection,
    rules: &'a CameraRules,
) -> Option<ClassifiedCandidate<'a>> {
    let rule = match rules.get(&detection.label) {
        Some(rule) => rule,
        None => {
            trace!(label = %detection.label, "Object type not configured for camera");
            return None;
        }
    };
    if !rule.admits(detection) {
        trace!(
            label = %detection.label,
            confidence = detection.confidence_pct(),
            width = detection.bbox.width(),
            height = detection.bbox.height(),
            "Below minimum size or confidence"
        );
        return None;
    }
    Some(ClassifiedCandidate {
        detection,
        rule,
        anchor: rules.anchor_offset.anchor(&detection.bbox),
    })
}

quick_error! {
    #[derive(Debug, PartialEq, Clone)]
    pub enum RuleError {
        FieldMissing(field: String) {
            display("Detection rule field was expected but missing: {}", field)
        }
        OutOfRange(field: String, error: String) {
            display("Detection rule field {} out of range: {}", field, error)
        }
        DuplicateType(object_type: String) {
            display("Object type `{}` is configured more than once", object_type)
        }
        ZoneInvalid(object_type: String, error: GeometryError) {
            display("Ignore zone for `{}` is invalid: {}", object_type, error)
            source(error)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn person_rule() -> DetectionRule {
        DetectionRule {
            object_type: "person".into(),
            min_width: 50,
            min_height: 50,
            min_confidence: 60.0,
            ignore_rects: vec![],
            ignore_polygons: vec![],
        }
    }

    fn rules() -> CameraRules {
        CameraRules::new(vec![person_rule()], AnchorOffset::default()).unwrap()
    }

    fn detection(label: &str, confidence: f64, bbox: (i64, i64, i64, i64)) -> Detection {
        Detection {
            label: label.into(),
            confidence,
            bbox: BoundingBox::new(bbox.0, bbox.1, bbox.2, bbox.3).unwrap(),
        }
    }

    #[test]
    fn test_qualifying_candidate() {
        let rules = rules();
        let det = detection("person", 0.75, (0, 0, 100, 100));
        let candidate = classify(&det, &rules).unwrap();
        assert_eq!(candidate.rule.object_type, "person");
        assert_eq!(candidate.anchor, Point::from_pixels(50, 50));
    }

    #[test]
    fn test_unconfigured_label_is_skipped() {
        let rules = rules();
        assert!(classify(&detection("dog", 0.99, (0, 0, 100, 100)), &rules).is_none());
    }

    #[test]
    fn test_thresholds_are_strict() {
        let rules = rules();
        // Low confidence
        assert!(classify(&detection("person", 0.55, (0, 0, 100, 100)), &rules).is_none());
        // Exactly 60% does not pass
        assert!(classify(&detection("person", 0.60, (0, 0, 100, 100)), &rules).is_none());
        // 0.606 rounds to 61%
        assert!(classify(&detection("person", 0.606, (0, 0, 100, 100)), &rules).is_some());
        // Width of exactly 50
        assert!(classify(&detection("person", 0.9, (0, 0, 50, 100)), &rules).is_none());
        // Height of exactly 50
        assert!(classify(&detection("person", 0.9, (0, 0, 100, 50)), &rules).is_none());
        assert!(classify(&detection("person", 0.9, (0, 0, 51, 51)), &rules).is_some());
    }

    #[test]
    fn test_confidence_ties_round_to_even() {
        assert_eq!(detection("person", 0.625, (0, 0, 100, 100)).confidence_pct(), 62);
        assert_eq!(detection("person", 0.875, (0, 0, 100, 100)).confidence_pct(), 88);
        assert_eq!(detection("person", 0.63, (0, 0, 100, 100)).confidence_pct(), 63);

        let rules = CameraRules::new(
            vec![DetectionRule {
                min_confidence: 62.0,
                ..person_rule()
            }],
            AnchorOffset::default(),
        )
        .unwrap();
        // 62.5% rounds down to 62, which does not beat the minimum
        assert!(classify(&detection("person", 0.625, (0, 0, 100, 100)), &rules).is_none());
        assert!(classify(&detection("person", 0.63, (0, 0, 100, 100)), &rules).is_some());
    }

    #[test]
    fn test_anchor_offset() {
        let bbox = BoundingBox::new(10, 100, 31, 200).unwrap();
        assert_eq!(
            AnchorOffset::CENTER.anchor(&bbox),
            Point {
                x: 20_500,
                y: 150_000
            }
        );
        // Bottom edge
        assert_eq!(
            AnchorOffset::from_fraction(0.0).unwrap().anchor(&bbox),
            Point {
                x: 20_500,
                y: 200_000
            }
        );
        // Top edge
        assert_eq!(
            AnchorOffset::from_fraction(1.0).unwrap().anchor(&bbox),
            Point {
                x: 20_500,
                y: 100_000
            }
        );
        assert_eq!(
            AnchorOffset::from_fraction(0.25).unwrap().anchor(&bbox),
            Point {
                x: 20_500,
                y: 175_000
            }
        );
        assert!(AnchorOffset::from_fraction(1.5).is_err());
        assert!(AnchorOffset::from_fraction(-0.1).is_err());
    }

    #[test]
    fn test_rule_from_config() {
        let cfg = ConfigDetectObject {
            object_type: Some("car".into()),
            min_width: Some(20),
            min_height: Some(10),
            min_confidence: Some(70.0),
            ignore_areas: vec![BoundingBox::new(0, 0, 100, 40).unwrap()],
            ignore_polygons: vec![vec![[0, 0], [10, 0], [10, 10]]],
        };
        let rule = DetectionRule::from_config(&cfg).unwrap();
        assert_eq!(rule.object_type, "car");
        assert_eq!(rule.ignore_rects.len(), 1);
        assert_eq!(rule.ignore_polygons.len(), 1);
    }

    #[test]
    fn test_rule_config_errors() {
        let base = ConfigDetectObject {
            object_type: Some("car".into()),
            min_width: Some(20),
            min_height: Some(10),
            min_confidence: Some(70.0),
            ignore_areas: vec![],
            ignore_polygons: vec![],
        };

        let missing = ConfigDetectObject {
            min_height: None,
            ..base.clone()
        };
        assert_eq!(
            DetectionRule::from_config(&missing),
            Err(RuleError::FieldMissing("car.min_height".into()))
        );

        let untyped = ConfigDetectObject {
            object_type: None,
            ..base.clone()
        };
        assert_eq!(
            DetectionRule::from_config(&untyped),
            Err(RuleError::FieldMissing("type".into()))
        );

        let bad_polygon = ConfigDetectObject {
            ignore_polygons: vec![vec![[0, 0], [10, 0]]],
            ..base.clone()
        };
        assert_eq!(
            DetectionRule::from_config(&bad_polygon),
            Err(RuleError::ZoneInvalid(
                "car".into(),
                GeometryError::InvalidGeometry(2)
            ))
        );

        let bad_rect = ConfigDetectObject {
            ignore_areas: vec![BoundingBox {
                x_min: 50,
                y_min: 0,
                x_max: 10,
                y_max: 10,
            }],
            ..base.clone()
        };
        assert!(matches!(
            DetectionRule::from_config(&bad_rect),
            Err(RuleError::ZoneInvalid(_, GeometryError::InvalidRectangle(_)))
        ));

        let huge_rect = ConfigDetectObject {
            ignore_areas: vec![BoundingBox {
                x_min: 0,
                y_min: 0,
                x_max: i64::MAX / 100,
                y_max: 10,
            }],
            ..base.clone()
        };
        assert_eq!(
            DetectionRule::from_config(&huge_rect),
            Err(RuleError::ZoneInvalid(
                "car".into(),
                GeometryError::CoordinateOutOfRange(i64::MAX / 100)
            ))
        );

        let huge_polygon = ConfigDetectObject {
            ignore_polygons: vec![vec![[0, 0], [10, 0], [10, i64::MIN]]],
            ..base.clone()
        };
        assert_eq!(
            DetectionRule::from_config(&huge_polygon),
            Err(RuleError::ZoneInvalid(
                "car".into(),
                GeometryError::CoordinateOutOfRange(i64::MIN)
            ))
        );

        let bad_confidence = ConfigDetectObject {
            min_confidence: Some(140.0),
            ..base
        };
        assert!(matches!(
            DetectionRule::from_config(&bad_confidence),
            Err(RuleError::OutOfRange(_, _))
        ));
    }

    #[test]
    fn test_duplicate_types_rejected() {
        assert_eq!(
            CameraRules::new(vec![person_rule(), person_rule()], AnchorOffset::default()),
            Err(RuleError::DuplicateType("person".into()))
        );
    }
}
