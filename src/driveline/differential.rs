//! Open differential with an anti-slip clutch across its outputs.

use serde::{Deserialize, Serialize};

use super::shaft::ShaftId;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DifferentialInfo {
    /// Carrier inertia (kg*m^2).
    pub inertia: f32,
    /// Final drive ratio, input revs per output rev.
    pub final_drive: f32,
    /// Torque the anti-slip clutch can move between the outputs (N*m).
    pub anti_slip_torque: f32,
    /// Shaft-link index of output A (0..wheel_count selects a wheel shaft,
    /// beyond that a differential shaft).
    pub link_a: usize,
    /// Shaft-link index of output B.
    pub link_b: usize,
}

pub struct Differential {
    final_drive: f32,
    anti_slip_torque: f32,
    pub shaft: ShaftId,
    pub side_a: ShaftId,
    pub side_b: ShaftId,
}

impl Differential {
    pub fn new(
        info: &DifferentialInfo,
        shaft: ShaftId,
        side_a: ShaftId,
        side_b: ShaftId,
    ) -> Self {
        Self {
            final_drive: info.final_drive,
            anti_slip_torque: info.anti_slip_torque,
            shaft,
            side_a,
            side_b,
        }
    }

    #[inline]
    pub fn final_drive(&self) -> f32 {
        self.final_drive
    }

    #[inline]
    pub fn anti_slip_torque(&self) -> f32 {
        self.anti_slip_torque
    }
}
