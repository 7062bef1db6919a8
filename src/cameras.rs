use std::{collections::HashMap, sync::Arc};

use tracing::{info, warn};

use crate::{
    config::ConfigCamera,
    engine::{AnchorOffset, CameraRules, DetectionRule, RuleError},
};

/// A camera whose detection rules loaded cleanly.
#[derive(Debug, PartialEq, Clone)]
pub struct Camera {
    pub id: String,
    pub name: String,
    pub trigger_url: String,
    pub homekit_acc_id: Option<String>,
    pub rules: CameraRules,
}

impl Camera {
    pub fn from_config(cfg: &ConfigCamera) -> Result<Camera, RuleError> {
        let rules = cfg
            .detect_objects
            .iter()
            .map(DetectionRule::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        let rules = CameraRules::new(rules, AnchorOffset::from_fraction(cfg.anchor_offset)?)?;
        Ok(Camera {
            id: cfg.id.clone(),
            name: cfg.name.clone(),
            trigger_url: cfg.trigger_url.clone(),
            homekit_acc_id: cfg.homekit_acc_id.clone(),
            rules,
        })
    }
}

pub enum Lookup<'a> {
    Enabled(&'a Arc<Camera>),
    Disabled { name: &'a str, error: &'a RuleError },
    Unknown,
}

/// Immutable view of every configured camera, built once at startup.
#[derive(Debug, Default)]
pub struct CameraRegistry {
    enabled: HashMap<String, Arc<Camera>>,
    disabled: HashMap<String, (String, RuleError)>,
}

impl CameraRegistry {
    /// A camera with a broken rule is kept out of service until its configuration is fixed;
    /// the other cameras are unaffected.
    pub fn from_config(cameras: &[ConfigCamera]) -> CameraRegistry {
        let mut registry = CameraRegistry::default();
        for cfg in cameras {
            match Camera::from_config(cfg) {
                Ok(camera) => {
                    info!(camera = %cfg.id, name = %cfg.name, rules = camera.rules.len(), "Camera loaded");
                    if camera.rules.is_empty() {
                        warn!(camera = %cfg.id, "Camera has no detect objects and will never trigger");
                    }
                    registry.enabled.insert(cfg.id.clone(), Arc::new(camera));
                }
                Err(e) => {
                    warn!(camera = %cfg.id, name = %cfg.name, error = %e, "Camera disabled");
                    registry
                        .disabled
                        .insert(cfg.id.clone(), (cfg.name.clone(), e));
                }
            }
        }
        registry
    }

    pub fn lookup(&self, camera_id: &str) -> Lookup<'_> {
        if let Some(camera) = self.enabled.get(camera_id) {
            Lookup::Enabled(camera)
        } else if let Some((name, error)) = self.disabled.get(camera_id) {
            Lookup::Disabled { name, error }
        } else {
            Lookup::Unknown
        }
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled.len()
    }

    pub fn disabled_count(&self) -> usize {
        self.disabled.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::ConfigDetectObject;

    fn camera(id: &str, detect_objects: Vec<ConfigDetectObject>) -> ConfigCamera {
        ConfigCamera {
            id: id.into(),
            name: format!("Camera {}", id),
            trigger_url: format!("http://nas/trigger/{}", id),
            homekit_acc_id: None,
            anchor_offset: 0.5,
            detect_objects,
        }
    }

    fn rule(object_type: &str) -> ConfigDetectObject {
        ConfigDetectObject {
            object_type: Some(object_type.into()),
            min_width: Some(10),
            min_height: Some(10),
            min_confidence: Some(50.0),
            ignore_areas: vec![],
            ignore_polygons: vec![],
        }
    }

    #[test]
    fn test_broken_camera_is_disabled_alone() {
        let broken = ConfigDetectObject {
            ignore_polygons: vec![vec![[0, 0]]],
            ..rule("car")
        };
        let registry = CameraRegistry::from_config(&[
            camera("1", vec![rule("person")]),
            camera("2", vec![rule("person"), broken]),
        ]);
        assert_eq!(registry.enabled_count(), 1);
        assert_eq!(registry.disabled_count(), 1);
        assert!(matches!(registry.lookup("1"), Lookup::Enabled(c) if c.name == "Camera 1"));
        assert!(matches!(
            registry.lookup("2"),
            Lookup::Disabled { name: "Camera 2", error: RuleError::ZoneInvalid(_, _) }
        ));
        assert!(matches!(registry.lookup("3"), Lookup::Unknown));
    }

    #[test]
    fn test_bad_anchor_offset_disables_camera() {
        let mut cfg = camera("1", vec![rule("person")]);
        cfg.anchor_offset = 2.0;
        let registry = CameraRegistry::from_config(&[cfg]);
        assert!(matches!(
            registry.lookup("1"),
            Lookup::Disabled { error: RuleError::OutOfRange(_, _), .. }
        ));
    }

    #[test]
    fn test_duplicate_object_type_disables_camera() {
        let registry =
            CameraRegistry::from_config(&[camera("1", vec![rule("person"), rule("person")])]);
        assert!(matches!(
            registry.lookup("1"),
            Lookup::Disabled { error: RuleError::DuplicateType(_), .. }
        ));
    }
}
