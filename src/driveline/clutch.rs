//! Friction clutch between engine and transmission.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClutchInfo {
    /// Torque the clutch can transmit at full engagement (N*m).
    pub torque_max: f32,
}

pub struct Clutch {
    torque_max: f32,
    position: f32, // engagement, 0 = open, 1 = locked
}

impl Clutch {
    pub fn new(info: ClutchInfo) -> Self {
        Self {
            torque_max: info.torque_max,
            position: 1.0,
        }
    }

    pub fn set_position(&mut self, value: f32) {
        self.position = value.clamp(0.0, 1.0);
    }

    #[inline]
    pub fn position(&self) -> f32 {
        self.position
    }

    /// Transmissible torque at the current engagement (N*m).
    #[inline]
    pub fn torque(&self) -> f32 {
        self.position * self.torque_max
    }

    #[inline]
    pub fn torque_max(&self) -> f32 {
        self.torque_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn position_clamps_to_unit_range() {
        let mut clutch = Clutch::new(ClutchInfo { torque_max: 300.0 });
        clutch.set_position(1.5);
        assert_relative_eq!(clutch.position(), 1.0);
        clutch.set_position(-0.2);
        assert_relative_eq!(clutch.position(), 0.0);
        clutch.set_position(0.5);
        assert_relative_eq!(clutch.torque(), 150.0);
    }
}
