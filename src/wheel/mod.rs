//! Wheel: shaft + suspension + brake + tire + per-tick ground probe.

pub mod assist;
pub mod brake;
pub mod contact;
pub mod suspension;
pub mod tire;

pub use assist::{AssistDecision, AssistInput, SlipThreshold, WheelAssist};
pub use brake::{Brake, BrakeInfo};
pub use contact::{point_velocity, ConstraintRow, WheelContact};
pub use suspension::{Suspension, SuspensionInfo};
pub use tire::{Tire, TireInfo};

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use rapier3d::prelude::{
    ColliderSet, QueryFilter, QueryPipeline, Ray, Real, RigidBodyHandle, RigidBodySet,
    Vector,
};
use serde::{Deserialize, Serialize};

use crate::axes;
use crate::driveline::{ShaftId, ShaftSet};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WheelInfo {
    pub radius: f32,
    pub width: f32,
    /// Rotational inertia of wheel + attached shaft (kg*m^2).
    pub inertia: f32,
    pub suspension: SuspensionInfo,
    pub brake: BrakeInfo,
    pub tire: TireInfo,
}

/// Result of the last suspension ray probe.
#[derive(Copy, Clone, Debug)]
pub struct RayProbe {
    /// Distance from the strut attach point to the ground along -up.
    pub depth: f32,
    pub hit: bool,
    pub in_contact: bool,
    pub body: Option<RigidBodyHandle>,
    pub point: Point3<Real>,
    pub normal: Vector<Real>,
    pub friction: f32,
}

impl Default for RayProbe {
    fn default() -> Self {
        Self {
            depth: 0.0,
            hit: false,
            in_contact: false,
            body: None,
            point: Point3::origin(),
            normal: Vector3::y(),
            friction: 0.0,
        }
    }
}

pub struct Wheel {
    pub shaft: ShaftId,
    pub suspension: Suspension,
    pub brake: Brake,
    pub tire: Tire,
    radius: f32,
    width: f32,
    abs_enabled: bool,
    tcs_enabled: bool,
    abs_active: bool,
    tcs_active: bool,
    brake_scale: f32,
    drive_scale: f32,
    assist: Box<dyn WheelAssist>,
    probe: RayProbe,
}

impl Wheel {
    pub fn new(info: &WheelInfo, shaft: ShaftId) -> Self {
        Self {
            shaft,
            suspension: Suspension::new(info.suspension.clone()),
            brake: Brake::new(info.brake.clone()),
            tire: Tire::new(info.tire.clone()),
            radius: info.radius,
            width: info.width,
            abs_enabled: false,
            tcs_enabled: false,
            abs_active: false,
            tcs_active: false,
            brake_scale: 1.0,
            drive_scale: 1.0,
            assist: Box::new(SlipThreshold::default()),
            probe: RayProbe::default(),
        }
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn set_abs(&mut self, value: bool) {
        self.abs_enabled = value;
    }

    pub fn set_tcs(&mut self, value: bool) {
        self.tcs_enabled = value;
    }

    #[inline]
    pub fn abs_active(&self) -> bool {
        self.abs_active
    }

    #[inline]
    pub fn tcs_active(&self) -> bool {
        self.tcs_active
    }

    /// Driveline demand multiplier from the TCS policy, 1.0 when inactive.
    #[inline]
    pub fn drive_scale(&self) -> f32 {
        self.drive_scale
    }

    /// Brake torque after the ABS policy had its say (N*m).
    pub fn effective_brake_torque(&self) -> f32 {
        self.brake.torque() * self.brake_scale
    }

    pub fn set_assist(&mut self, assist: Box<dyn WheelAssist>) {
        self.assist = assist;
    }

    #[inline]
    pub fn probe(&self) -> &RayProbe {
        &self.probe
    }

    /// Cast the suspension ray and refresh displacement. `window` is the
    /// contact window below full droop (2 x radius during the dynamics
    /// step, the 8 m alignment probe for recovery).
    pub fn update_displacement(
        &mut self,
        chassis: RigidBodyHandle,
        bodies: &RigidBodySet,
        colliders: &ColliderSet,
        query: &QueryPipeline,
        window: f32,
    ) {
        let body = &bodies[chassis];
        let pos = *body.position();
        let origin = pos * self.suspension.attach();
        let dir = pos * axes::down();

        let contact_reach = self.suspension.rest_length() + self.radius;
        let max_dist = contact_reach + window;
        let filter = QueryFilter::default().exclude_rigid_body(chassis);

        self.probe = RayProbe {
            depth: max_dist,
            hit: false,
            in_contact: false,
            body: None,
            point: origin + dir * max_dist,
            normal: -dir,
            friction: 0.0,
        };

        let ray = Ray::new(origin, dir);
        if let Some((collider_handle, intersection)) =
            query.cast_ray_and_get_normal(bodies, colliders, &ray, max_dist, true, filter)
        {
            let toi = intersection.time_of_impact;
            let collider = &colliders[collider_handle];
            let mut normal = intersection.normal;
            if normal.dot(&dir) > 0.0 {
                normal = -normal;
            }
            self.probe = RayProbe {
                depth: toi,
                hit: true,
                in_contact: toi <= contact_reach,
                body: collider.parent(),
                point: origin + dir * toi,
                normal,
                friction: collider.friction(),
            };
        }

        let displacement = contact_reach - self.probe.depth;
        self.suspension
            .set_displacement(displacement.clamp(0.0, self.suspension.travel()));
    }

    /// Clearance before this wheel touches ground, from the last probe.
    /// Negative when the suspension is compressed.
    pub fn ground_clearance(&self) -> Option<f32> {
        if !self.probe.hit {
            return None;
        }
        Some(self.probe.depth - (self.suspension.rest_length() + self.radius))
    }

    /// Build this tick's contact record, if the wheel is grounded.
    /// Also evaluates the ABS/TCS policy from the previous tick's slip.
    pub fn update_contact(
        &mut self,
        dt: f32,
        chassis: RigidBodyHandle,
        bodies: &RigidBodySet,
        shafts: &ShaftSet,
        throttle: f32,
    ) -> Option<WheelContact> {
        self.abs_active = false;
        self.tcs_active = false;
        self.brake_scale = 1.0;
        self.drive_scale = 1.0;

        if !self.probe.in_contact {
            return None;
        }

        let body = &bodies[chassis];
        let pos = *body.position();
        let rot = pos.rotation;
        let normal = self.probe.normal;
        let point = self.probe.point;

        // wheel basis on the contact plane
        let steered = rot * (self.suspension.orientation() * axes::forward());
        let mut forward = steered - normal * normal.dot(&steered);
        if forward.norm_squared() < 1e-8 {
            return None;
        }
        forward.normalize_mut();
        let lateral = normal.cross(&forward);

        // camber vs the ground plane: static camber plus axle tilt
        let axle = rot * (self.suspension.orientation() * Vector3::x());
        let camber =
            self.suspension.camber() + axle.dot(&normal).clamp(-1.0, 1.0).asin();

        // surface velocity of the patch relative to the contacted body
        let vel_a = point_velocity(body, &point);
        let vel_b = self
            .probe
            .body
            .and_then(|h| bodies.get(h))
            .map(|b| point_velocity(b, &point))
            .unwrap_or_else(Vector::zeros);
        let relative = vel_a - vel_b;
        let v1 = relative.dot(&forward);
        let v2 = relative.dot(&lateral);

        // slip-control policies see last tick's slip state
        let decision = self.assist.evaluate(&AssistInput {
            braking: self.brake.torque() > 0.0,
            throttle,
            slide: self.tire.slide(),
            ideal_slide: self.tire.ideal_slide(),
            ground_speed: v1,
        });
        if self.abs_enabled && decision.abs_active {
            self.abs_active = true;
            self.brake_scale = decision.brake_scale;
        }
        if self.tcs_enabled && decision.tcs_active {
            self.tcs_active = true;
            self.drive_scale = decision.drive_scale;
        }

        let r_a = point - body.center_of_mass();
        let r_b = self
            .probe
            .body
            .and_then(|h| bodies.get(h))
            .map(|b| point - b.center_of_mass())
            .unwrap_or_else(Vector::zeros);

        // suspension as a soft normal row (spring/damper to ERP/CFM)
        let stiffness = self.suspension.stiffness();
        let damping = self.suspension.damping();
        let denom = dt * stiffness + damping;
        let cfm = 1.0 / (dt * denom);
        let rhs = stiffness * self.suspension.displacement() / denom;

        let response = ConstraintRow::new(
            bodies,
            chassis,
            self.probe.body,
            normal,
            r_a,
            r_b,
            rhs,
            cfm,
            0.0,
            f32::INFINITY,
        );
        let friction1 = ConstraintRow::new(
            bodies, chassis, self.probe.body, forward, r_a, r_b, 0.0, 0.0, 0.0, 0.0,
        );
        let friction2 = ConstraintRow::new(
            bodies, chassis, self.probe.body, lateral, r_a, r_b, 0.0, 0.0, 0.0, 0.0,
        );

        Some(WheelContact {
            wheel: 0,
            body_a: chassis,
            body_b: self.probe.body,
            position: point,
            normal,
            friction_coeff: self.probe.friction.max(0.1),
            camber,
            v1,
            v2,
            response,
            friction1,
            friction2,
        })
    }

    /// Collider pose in chassis space: steer + axle alignment + suspension
    /// compression. Spin is excluded; the cylinder is symmetric about its
    /// axle and the contact-patch hook relies on local +Z staying forward.
    pub fn collider_transform(&self) -> Isometry3<Real> {
        let align = UnitQuaternion::from_axis_angle(&axes::forward_axis(), -core::f32::consts::FRAC_PI_2);
        Isometry3::from_parts(
            Translation3::from(self.suspension.hub_position().coords),
            self.suspension.orientation() * align,
        )
    }

    /// Render transform in chassis space, shaft spin included.
    pub fn visual_transform(&self, shafts: &ShaftSet) -> Isometry3<Real> {
        let spin = UnitQuaternion::from_axis_angle(
            &Vector3::x_axis(),
            -shafts[self.shaft].angle(),
        );
        Isometry3::from_parts(
            Translation3::from(self.suspension.hub_position().coords),
            self.suspension.orientation() * spin,
        )
    }
}
