//! Spring/damper suspension strut for one wheel.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use rapier3d::prelude::Real;
use serde::{Deserialize, Serialize};

use crate::axes;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuspensionInfo {
    /// Strut top hardpoint in chassis space; the hub hangs below it.
    pub attach: [f32; 3],
    /// Strut length at full droop (m).
    pub rest_length: f32,
    /// Maximum compression from full droop (m), less than rest_length.
    pub travel: f32,
    /// Spring rate (N/m).
    pub stiffness: f32,
    /// Damper rate (N*s/m).
    pub damping: f32,
    /// Full-lock steering angle for this wheel (rad); 0 for unsteered.
    pub max_steering_angle: f32,
    /// Static camber (rad).
    pub camber: f32,
}

pub struct Suspension {
    info: SuspensionInfo,
    displacement: f32,    // current compression from full droop, m
    steering_angle: f32,  // rad
    antiroll_stiffness: f32, // transient per-tick contribution, N/m
}

impl Suspension {
    pub fn new(info: SuspensionInfo) -> Self {
        Self {
            info,
            displacement: 0.0,
            steering_angle: 0.0,
            antiroll_stiffness: 0.0,
        }
    }

    #[inline]
    pub fn attach(&self) -> Point3<Real> {
        Point3::from(Vector3::from(self.info.attach))
    }

    #[inline]
    pub fn rest_length(&self) -> f32 {
        self.info.rest_length
    }

    #[inline]
    pub fn travel(&self) -> f32 {
        self.info.travel
    }

    #[inline]
    pub fn displacement(&self) -> f32 {
        self.displacement
    }

    pub fn set_displacement(&mut self, value: f32) {
        self.displacement = value.clamp(0.0, self.info.travel);
    }

    /// Base spring rate without the anti-roll contribution.
    #[inline]
    pub fn base_stiffness(&self) -> f32 {
        self.info.stiffness
    }

    /// Effective spring rate for this tick, anti-roll included.
    #[inline]
    pub fn stiffness(&self) -> f32 {
        self.info.stiffness + self.antiroll_stiffness
    }

    #[inline]
    pub fn damping(&self) -> f32 {
        self.info.damping
    }

    pub fn set_antiroll_stiffness(&mut self, value: f32) {
        self.antiroll_stiffness = value;
    }

    /// Steering input in [-1, 1], scaled by this wheel's lock angle.
    pub fn set_steering(&mut self, value: f32) {
        self.steering_angle = value.clamp(-1.0, 1.0) * self.info.max_steering_angle;
    }

    #[inline]
    pub fn steering_angle(&self) -> f32 {
        self.steering_angle
    }

    #[inline]
    pub fn max_steering_angle(&self) -> f32 {
        self.info.max_steering_angle
    }

    #[inline]
    pub fn camber(&self) -> f32 {
        self.info.camber
    }

    /// Steering rotation about the chassis up axis.
    pub fn orientation(&self) -> UnitQuaternion<Real> {
        UnitQuaternion::from_axis_angle(&axes::up_axis(), self.steering_angle)
    }

    /// Wheel hub position in chassis space at the current compression.
    pub fn hub_position(&self) -> Point3<Real> {
        self.attach() + axes::down() * (self.info.rest_length - self.displacement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn strut() -> Suspension {
        Suspension::new(SuspensionInfo {
            attach: [0.8, -0.3, 1.3],
            rest_length: 0.3,
            travel: 0.2,
            stiffness: 60_000.0,
            damping: 4_000.0,
            max_steering_angle: 0.55,
            camber: -0.02,
        })
    }

    #[test]
    fn displacement_clamps_to_travel() {
        let mut s = strut();
        s.set_displacement(1.0);
        assert_relative_eq!(s.displacement(), 0.2);
        s.set_displacement(-0.1);
        assert_relative_eq!(s.displacement(), 0.0);
    }

    #[test]
    fn hub_rises_with_compression() {
        let mut s = strut();
        assert_relative_eq!(s.hub_position().y, -0.6, epsilon = 1e-6);
        s.set_displacement(0.1);
        assert_relative_eq!(s.hub_position().y, -0.5, epsilon = 1e-6);
    }

    #[test]
    fn steering_scales_by_lock_angle() {
        let mut s = strut();
        s.set_steering(-2.0);
        assert_relative_eq!(s.steering_angle(), -0.55, epsilon = 1e-6);
        s.set_steering(0.5);
        assert_relative_eq!(s.steering_angle(), 0.275, epsilon = 1e-6);
    }

    #[test]
    fn antiroll_adds_to_stiffness() {
        let mut s = strut();
        s.set_antiroll_stiffness(5_000.0);
        assert_relative_eq!(s.stiffness(), 65_000.0);
        assert_relative_eq!(s.base_stiffness(), 60_000.0);
    }
}
