mod classifier;
mod debounce;
mod decision;
mod geometry;
mod zones;

pub use classifier::{
    classify, AnchorOffset, CameraRules, ClassifiedCandidate, Detection, DetectionRule, RuleError,
};
pub use debounce::{
    is_valid_key, CameraLocks, FileTriggerStore, MemoryTriggerStore, StoreError, TriggerStore,
};
pub use decision::{DecisionEngine, DecisionError, DecisionRecord, SuppressedReason};
pub use geometry::{
    polygon_contains_point, rectangle_contains, BoundingBox, GeometryError, Point, Polygon,
};
pub use zones::is_excluded;
