//! Slip-based tire force model.
//!
//! The solver treats this as a black box: given normal load, surface
//! friction, camber and the slip kinematics it returns longitudinal and
//! lateral force. Internally it is a normalized combined-slip model with a
//! magic-formula-style saturation curve, which keeps a single pair of shape
//! constants instead of a full Pacejka coefficient set.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TireInfo {
    /// Peak longitudinal friction coefficient at reference load.
    pub peak_mu_x: f32,
    /// Peak lateral friction coefficient at reference load.
    pub peak_mu_y: f32,
    /// Slip ratio at peak longitudinal force.
    pub ideal_slide: f32,
    /// Slip angle at peak lateral force (rad).
    pub ideal_slip: f32,
    /// Lateral force per radian of camber, per newton of load.
    pub camber_stiffness: f32,
}

pub struct Tire {
    info: TireInfo,
    slide: f32, // slip ratio, state for diagnostics and assists
    slip: f32,  // slip angle (rad)
}

/// Saturation curve normalized so the peak is 1 at x = 1; beyond the peak
/// it settles toward the sliding-friction plateau.
fn saturation(x: f32) -> f32 {
    const C: f32 = 1.35;
    let b = (core::f32::consts::PI / (2.0 * C)).tan();
    (C * (b * x).atan()).sin()
}

impl Tire {
    pub fn new(info: TireInfo) -> Self {
        Self {
            info,
            slide: 0.0,
            slip: 0.0,
        }
    }

    /// Longitudinal and lateral force at the contact patch.
    ///
    /// * `load` — normal force (N)
    /// * `friction_coeff` — surface friction scale
    /// * `camber` — wheel camber vs ground (rad)
    /// * `rot_velocity` — rim surface speed, shaft w * radius (m/s)
    /// * `lon_velocity` — contact point velocity along wheel forward (m/s)
    /// * `lat_velocity` — contact point velocity along wheel lateral (m/s)
    pub fn force(
        &mut self,
        load: f32,
        friction_coeff: f32,
        camber: f32,
        rot_velocity: f32,
        lon_velocity: f32,
        lat_velocity: f32,
    ) -> (f32, f32) {
        // slip kinematics; denominators floored so standing starts stay finite
        self.slide = (rot_velocity - lon_velocity) / lon_velocity.abs().max(2.0);
        self.slip = lat_velocity.atan2(lon_velocity.abs().max(0.5));

        if load <= 0.0 {
            return (0.0, 0.0);
        }

        let s = self.slide / self.info.ideal_slide;
        let a = self.slip / self.info.ideal_slip;
        let rho = (s * s + a * a).sqrt().max(1e-6);
        let f = saturation(rho);

        let fx = friction_coeff * self.info.peak_mu_x * load * (s / rho) * f;
        let mut fy = -friction_coeff * self.info.peak_mu_y * load * (a / rho) * f;

        // camber thrust, kept within the lateral friction budget
        let fy_max = friction_coeff * self.info.peak_mu_y * load;
        fy = (fy - self.info.camber_stiffness * camber * load).clamp(-fy_max, fy_max);

        (fx, fy)
    }

    /// Slip ratio from the last force query.
    #[inline]
    pub fn slide(&self) -> f32 {
        self.slide
    }

    /// Slip angle from the last force query (rad).
    #[inline]
    pub fn slip(&self) -> f32 {
        self.slip
    }

    #[inline]
    pub fn ideal_slide(&self) -> f32 {
        self.info.ideal_slide
    }

    #[inline]
    pub fn ideal_slip(&self) -> f32 {
        self.info.ideal_slip
    }

    /// Peak longitudinal force at the given load.
    pub fn max_fx(&self, load: f32) -> f32 {
        self.info.peak_mu_x * load
    }

    /// Peak lateral force at the given load and camber.
    pub fn max_fy(&self, load: f32, camber: f32) -> f32 {
        self.info.peak_mu_y * load + self.info.camber_stiffness * camber.abs() * load
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tire() -> Tire {
        Tire::new(TireInfo {
            peak_mu_x: 1.1,
            peak_mu_y: 1.0,
            ideal_slide: 0.12,
            ideal_slip: 0.16,
            camber_stiffness: 0.0,
        })
    }

    #[test]
    fn saturation_peaks_at_one() {
        assert_relative_eq!(saturation(1.0), 1.0, epsilon = 1e-3);
        assert!(saturation(0.5) < 1.0);
        assert!(saturation(4.0) < 1.0);
        assert!(saturation(4.0) > 0.7);
    }

    #[test]
    fn drive_slip_pushes_forward() {
        let mut tire = tire();
        // rim faster than ground: traction
        let (fx, _fy) = tire.force(4000.0, 1.0, 0.0, 12.0, 10.0, 0.0);
        assert!(fx > 0.0);
        assert!(tire.slide() > 0.0);
        // peak bounded by mu * load
        assert!(fx <= 1.1 * 4000.0 + 1.0);
    }

    #[test]
    fn lateral_force_opposes_lateral_slip() {
        let mut tire = tire();
        let (_fx, fy) = tire.force(4000.0, 1.0, 0.0, 10.0, 10.0, 2.0);
        assert!(fy < 0.0);
        let (_fx, fy) = tire.force(4000.0, 1.0, 0.0, 10.0, 10.0, -2.0);
        assert!(fy > 0.0);
    }

    #[test]
    fn peak_force_near_ideal_slide() {
        let mut tire = tire();
        let (f_ideal, _) = tire.force(4000.0, 1.0, 0.0, 10.0 * (1.0 + 0.12), 10.0, 0.0);
        let (f_half, _) = tire.force(4000.0, 1.0, 0.0, 10.0 * (1.0 + 0.06), 10.0, 0.0);
        let (f_far, _) = tire.force(4000.0, 1.0, 0.0, 10.0 * (1.0 + 0.60), 10.0, 0.0);
        assert!(f_ideal > f_half);
        assert!(f_ideal > f_far);
    }

    #[test]
    fn no_load_no_force() {
        let mut tire = tire();
        let (fx, fy) = tire.force(0.0, 1.0, 0.0, 15.0, 10.0, 3.0);
        assert_relative_eq!(fx, 0.0);
        assert_relative_eq!(fy, 0.0);
    }
}
