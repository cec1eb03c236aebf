use std::collections::HashMap;
use std::fmt;

use crate::sim::SimulatedDriver;
use crate::types::{ColorHandle, EyeIndex};
use crate::{HmdError, HmdResult};

/// `(left orientation wxyz, left position, right orientation wxyz, right position)`.
pub type RawEyePoses = ([f32; 4], [f32; 3], [f32; 4], [f32; 3]);

/// Low-level vendor driver module a backend binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverBinding {
    Oculus,
    OculusLegacy,
}

impl DriverBinding {
    pub fn module(self) -> &'static str {
        match self {
            Self::Oculus => "bridge.hmd.oculus",
            Self::OculusLegacy => "bridge.hmd.oculus_legacy",
        }
    }
}

impl fmt::Display for DriverBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.module())
    }
}

/// Vendor SDK bridge. Calls block until the driver answers.
pub trait HmdDriver: Send {
    /// Native render size of one eye in pixels.
    fn eye_size(&self, eye: EyeIndex) -> (u32, u32);

    /// Latest orientation and position of both eyes.
    fn update(&mut self) -> HmdResult<RawEyePoses>;

    /// 16 floats, see [`crate::math::relayout_row_major`].
    fn projection_left(&mut self, near: f32, far: f32) -> HmdResult<Vec<f32>>;
    fn projection_right(&mut self, near: f32, far: f32) -> HmdResult<Vec<f32>>;

    /// Hands the eye color textures to the driver for frame submission.
    fn setup(&mut self, left: ColorHandle, right: ColorHandle) -> HmdResult<bool>;

    fn frame_ready(&mut self) -> HmdResult<()>;
    fn re_center(&mut self) -> HmdResult<bool>;
}

pub type DriverConstructor = Box<dyn Fn() -> HmdResult<Box<dyn HmdDriver>> + Send + Sync>;

/// Maps driver bindings to constructors.
#[derive(Default)]
pub struct DriverRegistry {
    constructors: HashMap<DriverBinding, DriverConstructor>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the simulated driver bound to every binding.
    pub fn simulated() -> Self {
        Self::simulated_with(SimulatedDriver::default())
    }

    /// Registry whose drivers all share `driver`'s state handle.
    pub fn simulated_with(driver: SimulatedDriver) -> Self {
        let mut registry = Self::new();
        for binding in [DriverBinding::Oculus, DriverBinding::OculusLegacy] {
            let driver = driver.clone();
            registry.register(binding, move || {
                Ok(Box::new(driver.clone()) as Box<dyn HmdDriver>)
            });
        }
        registry
    }

    pub fn register<F>(&mut self, binding: DriverBinding, constructor: F)
    where
        F: Fn() -> HmdResult<Box<dyn HmdDriver>> + Send + Sync + 'static,
    {
        self.constructors.insert(binding, Box::new(constructor));
    }

    pub fn contains(&self, binding: DriverBinding) -> bool {
        self.constructors.contains_key(&binding)
    }

    pub fn construct(&self, binding: DriverBinding) -> HmdResult<Box<dyn HmdDriver>> {
        let constructor = self.constructors.get(&binding).ok_or_else(|| {
            HmdError::DriverUnavailable(format!("no driver registered for {binding}"))
        })?;
        constructor()
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("bindings", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry_reports_unavailable() {
        let registry = DriverRegistry::new();
        assert!(!registry.contains(DriverBinding::Oculus));
        match registry.construct(DriverBinding::Oculus) {
            Err(HmdError::DriverUnavailable(msg)) => assert!(msg.contains("bridge.hmd.oculus")),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_simulated_registry_covers_all_bindings() {
        let registry = DriverRegistry::simulated();
        for binding in [DriverBinding::Oculus, DriverBinding::OculusLegacy] {
            let driver = registry.construct(binding).unwrap();
            let (w, h) = driver.eye_size(EyeIndex::Left);
            assert!(w > 0 && h > 0);
        }
    }

    #[test]
    fn test_register_replaces_constructor() {
        let mut registry = DriverRegistry::simulated();
        registry.register(DriverBinding::OculusLegacy, || {
            Err(HmdError::DriverUnavailable("legacy runtime missing".to_string()))
        });
        assert!(registry.construct(DriverBinding::Oculus).is_ok());
        assert!(registry.construct(DriverBinding::OculusLegacy).is_err());
    }
}
