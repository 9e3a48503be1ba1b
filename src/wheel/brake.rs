//! Disc brake + handbrake for one wheel.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrakeInfo {
    /// Torque at full pedal (N*m).
    pub max_torque: f32,
    /// Front/rear bias share applied to the pedal input.
    pub bias: f32,
    /// Handbrake gain; 0 on wheels without a handbrake line.
    pub handbrake: f32,
}

pub struct Brake {
    info: BrakeInfo,
    brake_factor: f32,     // pedal, 0..1
    handbrake_factor: f32, // lever, 0..1
}

impl Brake {
    pub fn new(info: BrakeInfo) -> Self {
        Self {
            info,
            brake_factor: 0.0,
            handbrake_factor: 0.0,
        }
    }

    pub fn set_brake_factor(&mut self, value: f32) {
        self.brake_factor = value.clamp(0.0, 1.0);
    }

    pub fn set_handbrake_factor(&mut self, value: f32) {
        self.handbrake_factor = value.clamp(0.0, 1.0);
    }

    #[inline]
    pub fn brake_factor(&self) -> f32 {
        self.brake_factor
    }

    /// Demanded brake torque this tick (N*m), pedal and lever combined.
    pub fn torque(&self) -> f32 {
        let pedal = self.info.bias * self.brake_factor;
        let lever = self.info.handbrake * self.handbrake_factor;
        self.info.max_torque * pedal.max(lever)
    }
}
