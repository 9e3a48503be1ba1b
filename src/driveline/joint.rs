//! Per-tick drivetrain constraint joints.
//!
//! Each joint drives a relative shaft velocity toward a target with a
//! bounded impulse, accumulating what it applied over the tick. All three
//! are rebuilt every tick (limits depend on throttle/brake/clutch state)
//! and solved by sequential relaxation in a fixed order; see
//! `Vehicle::update_dynamics`.

use super::shaft::{ShaftId, ShaftSet};

/// Drives one shaft toward a target angular velocity.
///
/// Used for tire traction (target = contact surface speed / radius),
/// braking (target = 0) and the engine demand (target = rev limit).
pub struct MotorJoint {
    pub shaft: ShaftId,
    pub target_velocity: f32,    // rad/s
    pub impulse_limit: f32,      // N*m*s, >= 0
    pub accumulated_impulse: f32,
}

impl MotorJoint {
    pub fn new(shaft: ShaftId, target_velocity: f32, impulse_limit: f32) -> Self {
        Self {
            shaft,
            target_velocity,
            impulse_limit,
            accumulated_impulse: 0.0,
        }
    }

    pub fn solve(&mut self, shafts: &mut ShaftSet) {
        let shaft = &shafts[self.shaft];
        let velocity_error = shaft.ang_velocity() - self.target_velocity;
        let impulse = -velocity_error * shaft.inertia();

        let old = self.accumulated_impulse;
        self.accumulated_impulse =
            (old + impulse).clamp(-self.impulse_limit, self.impulse_limit);
        shafts[self.shaft].apply_impulse(self.accumulated_impulse - old);
    }
}

/// Couples two shafts through a gear ratio with a torque-capacity bound:
/// perfect lock while the required impulse stays within the bound, slip
/// beyond it. Constraint: w_a - w_b * ratio = 0.
pub struct ClutchJoint {
    pub shaft_a: ShaftId,
    pub shaft_b: ShaftId,
    pub gear_ratio: f32,
    pub impulse_limit: f32,      // torque capacity * dt
    pub accumulated_impulse: f32,
    inertia_eff: f32,
}

impl ClutchJoint {
    pub fn new(
        shafts: &ShaftSet,
        shaft_a: ShaftId,
        shaft_b: ShaftId,
        gear_ratio: f32,
        impulse_limit: f32,
    ) -> Self {
        let inertia_eff = 1.0
            / (shafts[shaft_a].inv_inertia()
                + gear_ratio * gear_ratio * shafts[shaft_b].inv_inertia());
        Self {
            shaft_a,
            shaft_b,
            gear_ratio,
            impulse_limit,
            accumulated_impulse: 0.0,
            inertia_eff,
        }
    }

    pub fn solve(&mut self, shafts: &mut ShaftSet) {
        let velocity_error = shafts[self.shaft_a].ang_velocity()
            - shafts[self.shaft_b].ang_velocity() * self.gear_ratio;
        let impulse = -velocity_error * self.inertia_eff;

        let old = self.accumulated_impulse;
        self.accumulated_impulse =
            (old + impulse).clamp(-self.impulse_limit, self.impulse_limit);
        let applied = self.accumulated_impulse - old;

        shafts[self.shaft_a].apply_impulse(applied);
        shafts[self.shaft_b].apply_impulse(-applied * self.gear_ratio);
    }
}

/// Splits an input shaft between two output shafts through the final-drive
/// ratio: w_in = 0.5 * ratio * (w_a + w_b). The split stays equal; any
/// anti-slip bias is a separate [`ClutchJoint`] across the outputs.
pub struct DifferentialJoint {
    pub shaft_in: ShaftId,
    pub shaft_out_a: ShaftId,
    pub shaft_out_b: ShaftId,
    pub gear_ratio: f32,
    pub impulse_limit: f32,
    pub accumulated_impulse: f32,
    inertia_eff: f32,
}

impl DifferentialJoint {
    pub fn new(
        shafts: &ShaftSet,
        shaft_in: ShaftId,
        shaft_out_a: ShaftId,
        shaft_out_b: ShaftId,
        gear_ratio: f32,
    ) -> Self {
        let half_ratio = 0.5 * gear_ratio;
        let inertia_eff = 1.0
            / (shafts[shaft_in].inv_inertia()
                + half_ratio
                    * half_ratio
                    * (shafts[shaft_out_a].inv_inertia()
                        + shafts[shaft_out_b].inv_inertia()));
        Self {
            shaft_in,
            shaft_out_a,
            shaft_out_b,
            gear_ratio,
            impulse_limit: f32::INFINITY,
            accumulated_impulse: 0.0,
            inertia_eff,
        }
    }

    pub fn solve(&mut self, shafts: &mut ShaftSet) {
        let half_ratio = 0.5 * self.gear_ratio;
        let velocity_error = shafts[self.shaft_in].ang_velocity()
            - half_ratio
                * (shafts[self.shaft_out_a].ang_velocity()
                    + shafts[self.shaft_out_b].ang_velocity());
        let impulse = -velocity_error * self.inertia_eff;

        let old = self.accumulated_impulse;
        self.accumulated_impulse =
            (old + impulse).clamp(-self.impulse_limit, self.impulse_limit);
        let applied = self.accumulated_impulse - old;

        shafts[self.shaft_in].apply_impulse(applied);
        shafts[self.shaft_out_a].apply_impulse(-applied * half_ratio);
        shafts[self.shaft_out_b].apply_impulse(-applied * half_ratio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn three_shafts(inertia: f32) -> (ShaftSet, ShaftId, ShaftId, ShaftId) {
        let mut set = ShaftSet::with_capacity(3);
        let a = set.add(inertia);
        let b = set.add(inertia);
        let c = set.add(inertia);
        (set, a, b, c)
    }

    #[test]
    fn motor_reaches_target_within_bound() {
        let (mut shafts, a, _, _) = three_shafts(0.5);
        let mut joint = MotorJoint::new(a, 10.0, 100.0);
        joint.solve(&mut shafts);
        assert_relative_eq!(shafts[a].ang_velocity(), 10.0, epsilon = 1e-5);
        assert_relative_eq!(joint.accumulated_impulse, 5.0, epsilon = 1e-5);
    }

    #[test]
    fn motor_impulse_clamps_to_limit() {
        let (mut shafts, a, _, _) = three_shafts(2.0);
        let mut joint = MotorJoint::new(a, 10.0, 1.0);
        for _ in 0..8 {
            joint.solve(&mut shafts);
        }
        assert!(joint.accumulated_impulse.abs() <= 1.0 + 1e-6);
        assert_relative_eq!(shafts[a].ang_velocity(), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn clutch_locks_shafts_through_ratio() {
        let (mut shafts, a, b, _) = three_shafts(1.0);
        shafts[a].set_ang_velocity(100.0);
        shafts[b].set_ang_velocity(10.0);
        let mut joint = ClutchJoint::new(&shafts, a, b, 2.0, f32::INFINITY);
        for _ in 0..8 {
            joint.solve(&mut shafts);
        }
        let wa = shafts[a].ang_velocity();
        let wb = shafts[b].ang_velocity();
        assert_relative_eq!(wa, wb * 2.0, epsilon = 1e-3);
    }

    #[test]
    fn clutch_slips_at_capacity() {
        let (mut shafts, a, b, _) = three_shafts(1.0);
        shafts[a].set_ang_velocity(100.0);
        let mut joint = ClutchJoint::new(&shafts, a, b, 1.0, 0.5);
        for _ in 0..8 {
            joint.solve(&mut shafts);
        }
        assert!(joint.accumulated_impulse.abs() <= 0.5 + 1e-6);
        // still slipping: capacity was nowhere near enough to lock
        assert!(shafts[a].ang_velocity() > shafts[b].ang_velocity());
    }

    #[test]
    fn differential_splits_equally() {
        let (mut shafts, d, l, r) = three_shafts(1.0);
        shafts[d].set_ang_velocity(30.0);
        let mut joint = DifferentialJoint::new(&shafts, d, l, r, 3.0);
        for _ in 0..8 {
            joint.solve(&mut shafts);
        }
        let wl = shafts[l].ang_velocity();
        let wr = shafts[r].ang_velocity();
        assert_relative_eq!(wl, wr, epsilon = 1e-4);
        assert_relative_eq!(
            shafts[d].ang_velocity(),
            0.5 * 3.0 * (wl + wr),
            epsilon = 1e-3
        );
    }
}
