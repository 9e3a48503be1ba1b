//! Aerodynamic force contributors (body drag, wings).
//!
//! Each device is a black-box force function of the body-space airflow;
//! the vehicle sums forces and torques about the center of mass and applies
//! them as one linear + angular impulse per tick.

use nalgebra::{Point3, Vector3};
use rapier3d::prelude::{Real, Vector};
use serde::{Deserialize, Serialize};

use crate::axes;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AeroDeviceInfo {
    /// Application point in chassis space.
    pub position: [f32; 3],
    /// Drag force per (m/s)^2 of airflow.
    pub drag_coefficient: f32,
    /// Lift force per (m/s)^2 of longitudinal airflow; negative is
    /// downforce.
    pub lift_coefficient: f32,
}

pub struct AeroDevice {
    info: AeroDeviceInfo,
    drag: Vector<Real>, // last computed, body space
    lift: Vector<Real>,
}

impl AeroDevice {
    pub fn new(info: AeroDeviceInfo) -> Self {
        Self {
            info,
            drag: Vector::zeros(),
            lift: Vector::zeros(),
        }
    }

    #[inline]
    pub fn position(&self) -> Point3<Real> {
        Point3::from(Vector3::from(self.info.position))
    }

    /// Total force for the given body-space airflow (air velocity relative
    /// to the car, so it points backwards while driving forward).
    pub fn update_force(&mut self, air_velocity: Vector<Real>) -> Vector<Real> {
        self.drag = air_velocity * air_velocity.norm() * self.info.drag_coefficient;
        let v_lon = air_velocity.dot(&axes::forward());
        self.lift = axes::up() * (self.info.lift_coefficient * v_lon * v_lon);
        self.drag + self.lift
    }

    #[inline]
    pub fn drag(&self) -> Vector<Real> {
        self.drag
    }

    #[inline]
    pub fn lift(&self) -> Vector<Real> {
        self.lift
    }

    #[inline]
    pub fn drag_coefficient(&self) -> f32 {
        self.info.drag_coefficient
    }

    #[inline]
    pub fn lift_coefficient(&self) -> f32 {
        self.info.lift_coefficient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::vector;

    #[test]
    fn drag_opposes_motion() {
        let mut dev = AeroDevice::new(AeroDeviceInfo {
            position: [0.0, 0.0, 0.0],
            drag_coefficient: 0.4,
            lift_coefficient: 0.0,
        });
        // car drives toward +Z at 10 m/s, airflow is -Z
        let force = dev.update_force(vector![0.0, 0.0, -10.0]);
        assert!(force.z < 0.0);
        assert_relative_eq!(force.z, -40.0, epsilon = 1e-3);
    }

    #[test]
    fn negative_lift_coefficient_pushes_down() {
        let mut dev = AeroDevice::new(AeroDeviceInfo {
            position: [0.0, 0.4, -1.8],
            drag_coefficient: 0.05,
            lift_coefficient: -0.3,
        });
        let force = dev.update_force(vector![0.0, 0.0, -20.0]);
        assert!(force.y < 0.0);
        assert_relative_eq!(dev.lift().y, -120.0, epsilon = 1e-3);
    }
}
