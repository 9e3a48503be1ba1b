//! Per-tick wheel/ground contact: one soft normal row plus two friction
//! rows, solved by sequential impulses against the chassis body and the
//! contacted body through the external rigid-body engine.

use nalgebra::Point3;
use rapier3d::prelude::{Real, RigidBody, RigidBodyHandle, RigidBodySet, Vector};

/// World-space velocity of a point rigidly attached to a body:
/// v(p) = v_com + w x (p - com).
#[inline]
pub fn point_velocity(body: &RigidBody, point: &Point3<Real>) -> Vector<Real> {
    let r = point - body.center_of_mass();
    body.linvel() + body.angvel().cross(&r)
}

/// One scalar velocity constraint along an axis, with impulse accumulation
/// clamped to [lower, upper]. Limits may be widened between solves; the
/// accumulated impulse is re-clamped on the next solve.
pub struct ConstraintRow {
    pub axis: Vector<Real>,
    /// Target relative velocity along `axis`.
    pub rhs: f32,
    /// Constraint softness; nonzero turns the row into a spring/damper.
    pub cfm: f32,
    pub lower_limit: f32,
    pub upper_limit: f32,
    pub accum_impulse: f32,
    jac_diag_inv: f32,
}

fn mass_term(body: &RigidBody, axis: &Vector<Real>, r: &Vector<Real>) -> f32 {
    let props = body.mass_properties();
    let lin = axis.component_mul(&props.effective_inv_mass).dot(axis);
    let rn = r.cross(axis);
    // symmetric sqrt factor: rn^T I^-1 rn = |sqrt(I^-1) rn|^2
    let ang = (props.effective_world_inv_inertia_sqrt * rn).norm_squared();
    lin + ang
}

impl ConstraintRow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bodies: &RigidBodySet,
        body_a: RigidBodyHandle,
        body_b: Option<RigidBodyHandle>,
        axis: Vector<Real>,
        r_a: Vector<Real>,
        r_b: Vector<Real>,
        rhs: f32,
        cfm: f32,
        lower_limit: f32,
        upper_limit: f32,
    ) -> Self {
        let mut k = cfm;
        if let Some(a) = bodies.get(body_a) {
            k += mass_term(a, &axis, &r_a);
        }
        if let Some(b) = body_b.and_then(|h| bodies.get(h)) {
            k += mass_term(b, &axis, &r_b);
        }
        Self {
            axis,
            rhs,
            cfm,
            lower_limit,
            upper_limit,
            accum_impulse: 0.0,
            jac_diag_inv: if k > 0.0 { 1.0 / k } else { 0.0 },
        }
    }

    /// One relaxation step. `velocity_offset` is added to the measured
    /// relative velocity (used to couple the longitudinal row to the wheel
    /// rim speed). Returns the impulse applied this step.
    pub fn solve(
        &mut self,
        bodies: &mut RigidBodySet,
        body_a: RigidBodyHandle,
        body_b: Option<RigidBodyHandle>,
        point: Point3<Real>,
        velocity_offset: f32,
    ) -> f32 {
        let vel_a = match bodies.get(body_a) {
            Some(b) => point_velocity(b, &point),
            None => return 0.0,
        };
        let vel_b = body_b
            .and_then(|h| bodies.get(h))
            .map(|b| point_velocity(b, &point))
            .unwrap_or_else(Vector::zeros);

        let relative = self.axis.dot(&(vel_a - vel_b)) + velocity_offset;
        let lambda =
            self.jac_diag_inv * (self.rhs - relative - self.cfm * self.accum_impulse);

        let old = self.accum_impulse;
        self.accum_impulse = (old + lambda).clamp(self.lower_limit, self.upper_limit);
        let applied = self.accum_impulse - old;

        let impulse = self.axis * applied;
        if let Some(a) = bodies.get_mut(body_a) {
            a.apply_impulse_at_point(impulse, point, true);
        }
        if let Some(b) = body_b.and_then(|h| bodies.get_mut(h)) {
            if b.is_dynamic() {
                b.apply_impulse_at_point(-impulse, point, true);
            }
        }
        applied
    }
}

/// Transient contact record for one grounded wheel; lives for one tick.
pub struct WheelContact {
    /// Index of the owning wheel, filled in by the vehicle.
    pub wheel: usize,
    pub body_a: RigidBodyHandle,
    pub body_b: Option<RigidBodyHandle>,
    /// Contact point, world space.
    pub position: Point3<Real>,
    /// Ground normal, world space, pointing toward the chassis.
    pub normal: Vector<Real>,
    pub friction_coeff: f32,
    /// Wheel camber vs the ground plane (rad).
    pub camber: f32,
    /// Contact-point surface velocity along wheel forward (m/s).
    pub v1: f32,
    /// Contact-point surface velocity along wheel lateral (m/s).
    pub v2: f32,
    /// Suspension response along the ground normal.
    pub response: ConstraintRow,
    /// Longitudinal friction; limits derived from driveline torque.
    pub friction1: ConstraintRow,
    /// Lateral friction; limits derived from the tire model.
    pub friction2: ConstraintRow,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::vector;
    use rapier3d::prelude::*;

    fn single_body(mass: f32) -> (RigidBodySet, ColliderSet, RigidBodyHandle) {
        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();
        let handle = bodies.insert(RigidBodyBuilder::dynamic().build());
        let volume = 2.0 * 1.0 * 4.0;
        colliders.insert_with_parent(
            ColliderBuilder::cuboid(1.0, 0.5, 2.0)
                .density(mass / volume)
                .build(),
            handle,
            &mut bodies,
        );
        (bodies, colliders, handle)
    }

    #[test]
    fn row_drives_point_velocity_to_target() {
        let (mut bodies, _colliders, handle) = single_body(100.0);
        let point = Point3::origin(); // at COM, pure linear response
        let axis = vector![0.0, 1.0, 0.0];
        let mut row = ConstraintRow::new(
            &bodies,
            handle,
            None,
            axis,
            Vector::zeros(),
            Vector::zeros(),
            2.0,
            0.0,
            f32::NEG_INFINITY,
            f32::INFINITY,
        );
        for _ in 0..8 {
            row.solve(&mut bodies, handle, None, point, 0.0);
        }
        let v = bodies[handle].linvel().y;
        assert_relative_eq!(v, 2.0, epsilon = 1e-3);
    }

    #[test]
    fn accumulated_impulse_respects_limits() {
        let (mut bodies, _colliders, handle) = single_body(100.0);
        let point = Point3::origin();
        let axis = vector![0.0, 1.0, 0.0];
        let mut row = ConstraintRow::new(
            &bodies,
            handle,
            None,
            axis,
            Vector::zeros(),
            Vector::zeros(),
            10.0,
            0.0,
            0.0,
            5.0,
        );
        for _ in 0..8 {
            row.solve(&mut bodies, handle, None, point, 0.0);
        }
        assert!(row.accum_impulse <= 5.0 + 1e-6);
        assert!(row.accum_impulse >= 0.0);
    }
}
