//! Vehicle: drivetrain + wheels + aero on top of one rapier rigid body.
//!
//! Per-tick order is fixed: aerodynamics, transmission/clutch control,
//! engine update, the 8-pass joint/contact relaxation, tachometer
//! smoothing, then wheel visual transforms. Transform prediction and
//! integration belong to the external rigid-body engine: the world runs
//! `PhysicsPipeline::step` after every vehicle ran its update.

use std::fmt::Write as _;

use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector3};
use rapier3d::prelude::{
    ColliderHandle, ColliderSet, QueryPipeline, Real, RigidBodyHandle, RigidBodySet,
    Vector,
};
use tracing::debug;

use crate::aero::AeroDevice;
use crate::axes;
use crate::driveline::{
    Clutch, ClutchJoint, Differential, DifferentialJoint, Engine, MotorJoint, ShaftId,
    ShaftSet, Transmission, RPM_TO_RAD,
};
use crate::info::{AntiRollBarInfo, ConfigError, VehicleInfo};
use crate::wheel::{Wheel, WheelContact};

/// Fixed relaxation budget. Not convergence-checked: the pass count and the
/// solve order inside a pass are part of the tuned behavior.
pub const SOLVER_ITERATIONS: usize = 8;

const GRAVITY: f32 = 9.81;
const ALIGN_PROBE_LENGTH: f32 = 8.0;

/// Optional per-tick solver telemetry receiver, injected at construction.
pub trait DiagnosticsSink: Send {
    fn record(&mut self, line: &str);
}

/// Accumulated impulse vs bound of one driveline joint, from the last
/// tick's relaxation.
#[derive(Copy, Clone, Debug)]
pub struct JointLoad {
    pub impulse: f32,
    pub limit: f32,
}

/// Section switches for [`Vehicle::describe`].
#[derive(Copy, Clone, Debug, Default)]
pub struct DescribeSections {
    pub body: bool,
    pub drivetrain: bool,
    pub wheels: bool,
    pub aero: bool,
}

impl DescribeSections {
    pub fn all() -> Self {
        Self {
            body: true,
            drivetrain: true,
            wheels: true,
            aero: true,
        }
    }
}

pub struct Vehicle {
    pub body: RigidBodyHandle,
    wheel_colliders: Vec<ColliderHandle>,

    shafts: ShaftSet,
    wheels: Vec<Wheel>,
    differentials: Vec<Differential>,
    engine: Engine,
    clutch: Clutch,
    transmission: Transmission,
    antiroll: Vec<AntiRollBarInfo>,
    aero_devices: Vec<AeroDevice>,
    com_offset: Vector<Real>,

    // per-tick structures, rebuilt in place every tick
    contacts: Vec<WheelContact>,
    motor_joints: Vec<MotorJoint>,
    diff_joints: Vec<DifferentialJoint>,
    clutch_joints: Vec<ClutchJoint>,

    // control state
    brake_value: f32,
    last_clutch: f32,
    remaining_shift_time: f32,
    shift_gear: i32,
    shifted: bool,
    autoclutch: bool,
    autoshift: bool,
    abs_active: bool,
    tcs_active: bool,

    tacho_rpm: f32,
    max_angle: f32,
    max_speed: f32,
    lon_friction_coeff: f32,
    lat_friction_coeff: f32,
    aero_force: Vector<Real>,  // body space, last tick
    aero_torque: Vector<Real>, // body space, last tick
    last_dt: f32,

    diagnostics: Option<Box<dyn DiagnosticsSink>>,
}

impl Vehicle {
    /// Build a vehicle around an existing chassis body. `wheel_colliders`
    /// are the per-wheel cylinders attached to that body, in wheel order.
    pub fn new(
        info: &VehicleInfo,
        body: RigidBodyHandle,
        wheel_colliders: Vec<ColliderHandle>,
    ) -> Result<Self, ConfigError> {
        info.validate()?;

        let wheel_count = info.wheels.len();
        let diff_count = info.differentials.len();

        let mut shafts = ShaftSet::with_capacity(wheel_count + diff_count + 1);
        let wheel_shafts: Vec<ShaftId> =
            info.wheels.iter().map(|w| shafts.add(w.inertia)).collect();
        let diff_shafts: Vec<ShaftId> = info
            .differentials
            .iter()
            .map(|d| shafts.add(d.inertia))
            .collect();
        let engine_shaft = shafts.add(info.engine.inertia);

        // shaft-link indices: wheels first, then differential carriers
        let link = |id: usize| -> ShaftId {
            if id < wheel_count {
                wheel_shafts[id]
            } else {
                diff_shafts[id - wheel_count]
            }
        };

        let wheels: Vec<Wheel> = info
            .wheels
            .iter()
            .zip(&wheel_shafts)
            .map(|(w, &shaft)| Wheel::new(w, shaft))
            .collect();

        let differentials: Vec<Differential> = info
            .differentials
            .iter()
            .zip(&diff_shafts)
            .map(|(d, &shaft)| Differential::new(d, shaft, link(d.link_a), link(d.link_b)))
            .collect();

        let transmission =
            Transmission::new(info.transmission.clone(), link(info.transmission_link));
        let engine = Engine::new(info.engine.clone(), engine_shaft);
        let clutch = Clutch::new(info.clutch.clone());
        let aero_devices = info.aero.iter().cloned().map(AeroDevice::new).collect();

        let max_angle = wheels
            .iter()
            .map(|w| w.suspension.max_steering_angle())
            .fold(0.0, f32::max);

        // closed-form friction estimate at static per-wheel load
        let fz_ref = GRAVITY * info.chassis.mass / wheel_count as f32;
        let lon_sum: f32 = wheels.iter().map(|w| w.tire.max_fx(fz_ref)).sum();
        let lat_sum: f32 = wheels.iter().map(|w| w.tire.max_fy(fz_ref, 0.0)).sum();
        let lon_friction_coeff = 0.68 * lon_sum / (fz_ref * wheel_count as f32);
        let lat_friction_coeff = 0.62 * lat_sum / (fz_ref * wheel_count as f32);

        Ok(Self {
            body,
            wheel_colliders,
            shafts,
            wheels,
            differentials,
            engine,
            clutch,
            transmission,
            antiroll: info.antiroll.clone(),
            aero_devices,
            com_offset: Vector3::from(info.chassis.com_offset),
            contacts: Vec::with_capacity(wheel_count),
            motor_joints: Vec::with_capacity(2 * wheel_count + 1),
            diff_joints: Vec::with_capacity(diff_count),
            clutch_joints: Vec::with_capacity(diff_count + 1),
            brake_value: 0.0,
            last_clutch: 1.0,
            remaining_shift_time: 0.0,
            shift_gear: 0,
            shifted: true,
            autoclutch: true,
            autoshift: false,
            abs_active: false,
            tcs_active: false,
            tacho_rpm: 0.0,
            max_angle,
            max_speed: 250.0 / 3.6,
            lon_friction_coeff,
            lat_friction_coeff,
            aero_force: Vector::zeros(),
            aero_torque: Vector::zeros(),
            last_dt: 1.0 / 60.0,
            diagnostics: None,
        })
    }

    pub fn set_diagnostics(&mut self, sink: Option<Box<dyn DiagnosticsSink>>) {
        self.diagnostics = sink;
    }

    // ------------------------------------------------------------------
    // control surface; calls clamp or no-op on invalid input
    // ------------------------------------------------------------------

    pub fn start_engine(&mut self) {
        self.engine.start(&mut self.shafts);
    }

    pub fn set_throttle(&mut self, value: f32) {
        self.engine.set_throttle(value);
    }

    pub fn set_brake(&mut self, value: f32) {
        self.brake_value = value.clamp(0.0, 1.0);
        for wheel in &mut self.wheels {
            wheel.brake.set_brake_factor(value);
        }
    }

    pub fn set_handbrake(&mut self, value: f32) {
        for wheel in &mut self.wheels {
            wheel.brake.set_handbrake_factor(value);
        }
    }

    pub fn set_clutch(&mut self, value: f32) {
        self.clutch.set_position(value);
    }

    pub fn set_steering(&mut self, value: f32) {
        for wheel in &mut self.wheels {
            wheel.suspension.set_steering(value);
        }
    }

    /// Request a gear change. Ignored while a shift is in progress or when
    /// the target is outside the configured gear range.
    pub fn request_gear(&mut self, gear: i32) {
        if self.shifted
            && gear != self.transmission.gear()
            && gear <= self.transmission.forward_gears()
            && gear >= -self.transmission.reverse_gears()
        {
            self.remaining_shift_time = self.transmission.shift_time();
            self.shift_gear = gear;
            self.shifted = false;
        }
    }

    pub fn set_autoclutch(&mut self, value: bool) {
        self.autoclutch = value;
    }

    pub fn set_autoshift(&mut self, value: bool) {
        self.autoshift = value;
    }

    pub fn set_abs(&mut self, value: bool) {
        for wheel in &mut self.wheels {
            wheel.set_abs(value);
        }
    }

    pub fn set_tcs(&mut self, value: bool) {
        for wheel in &mut self.wheels {
            wheel.set_tcs(value);
        }
    }

    // ------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------

    pub fn gear(&self) -> i32 {
        self.transmission.gear()
    }

    /// Gear a pending shift will engage; current gear when not shifting.
    pub fn target_gear(&self) -> i32 {
        if self.shifted {
            self.transmission.gear()
        } else {
            self.shift_gear
        }
    }

    pub fn is_shifting(&self) -> bool {
        !self.shifted
    }

    pub fn clutch_position(&self) -> f32 {
        self.clutch.position()
    }

    pub fn engine_rpm(&self) -> f32 {
        self.engine.rpm(&self.shafts)
    }

    pub fn engine_running(&self) -> bool {
        self.engine.combustion()
    }

    pub fn tacho_rpm(&self) -> f32 {
        self.tacho_rpm
    }

    pub fn abs_active(&self) -> bool {
        self.abs_active
    }

    pub fn tcs_active(&self) -> bool {
        self.tcs_active
    }

    pub fn max_steering_angle(&self) -> f32 {
        self.max_angle
    }

    pub fn max_speed(&self) -> f32 {
        self.max_speed
    }

    pub fn wheels(&self) -> &[Wheel] {
        &self.wheels
    }

    pub fn speed(&self, bodies: &RigidBodySet) -> f32 {
        bodies
            .get(self.body)
            .map(|b| b.linvel().norm())
            .unwrap_or(0.0)
    }

    /// Ground speed derived from the first wheel's shaft (m/s).
    pub fn ground_speed(&self) -> f32 {
        let wheel = &self.wheels[0];
        wheel.radius() * self.shafts[wheel.shaft].ang_velocity()
    }

    /// Wheel render transform in world space.
    pub fn wheel_transform(&self, index: usize, bodies: &RigidBodySet) -> Isometry3<Real> {
        let pose = bodies
            .get(self.body)
            .map(|b| *b.position())
            .unwrap_or_else(Isometry3::identity);
        pose * self.wheels[index].visual_transform(&self.shafts)
    }

    /// Distance needed to brake down to `target_speed`, from the current
    /// kinetic energy and the longitudinal friction estimate; aerodynamic
    /// drag ignored. Zero when already at or below the target.
    pub fn braking_distance(&self, bodies: &RigidBodySet, target_speed: f32) -> f32 {
        let current2 = bodies
            .get(self.body)
            .map(|b| b.linvel().norm_squared())
            .unwrap_or(0.0);
        let target2 = target_speed * target_speed;
        if target2 < current2 {
            (current2 - target2) / (2.0 * self.lon_friction_coeff * GRAVITY)
        } else {
            0.0
        }
    }

    /// Highest steady cornering speed for a turn radius, from the lateral
    /// friction estimate and the downforce contribution.
    pub fn max_velocity(&self, bodies: &RigidBodySet, radius: f32) -> f32 {
        let inv_mass = bodies
            .get(self.body)
            .map(|b| 1.0 / b.mass())
            .unwrap_or(0.0);
        let d = 1.0
            - (-radius * self.lift_coefficient() * self.lat_friction_coeff * inv_mass)
                .min(1.01);
        let limit = self.lat_friction_coeff * GRAVITY * radius / d;
        if limit > 0.0 {
            limit.sqrt()
        } else {
            1000.0
        }
    }

    pub fn lift_coefficient(&self) -> f32 {
        self.aero_devices.iter().map(|d| d.lift_coefficient()).sum()
    }

    pub fn drag_coefficient(&self) -> f32 {
        self.aero_devices.iter().map(|d| d.drag_coefficient()).sum()
    }

    /// Summed aero force from the last tick, body space.
    pub fn total_aero_force(&self) -> Vector<Real> {
        self.aero_devices
            .iter()
            .fold(Vector::zeros(), |acc, d| acc + d.drag() + d.lift())
    }

    /// Last tick's driveline joint loads: traction/engine/brake motor
    /// joints first, then differential joints, then clutch joints.
    pub fn driveline_loads(&self) -> Vec<JointLoad> {
        let motors = self.motor_joints.iter().map(|j| JointLoad {
            impulse: j.accumulated_impulse,
            limit: j.impulse_limit,
        });
        let diffs = self.diff_joints.iter().map(|j| JointLoad {
            impulse: j.accumulated_impulse,
            limit: j.impulse_limit,
        });
        let clutches = self.clutch_joints.iter().map(|j| JointLoad {
            impulse: j.accumulated_impulse,
            limit: j.impulse_limit,
        });
        motors.chain(diffs).chain(clutches).collect()
    }

    // ------------------------------------------------------------------
    // per-tick update
    // ------------------------------------------------------------------

    pub fn update(
        &mut self,
        dt: f32,
        bodies: &mut RigidBodySet,
        colliders: &mut ColliderSet,
        query: &QueryPipeline,
    ) {
        self.last_dt = dt;
        self.update_aerodynamics(dt, bodies);
        self.update_transmission(dt);
        self.engine.update(&self.shafts, dt);
        self.update_dynamics(dt, bodies, colliders, query);
        self.tacho_rpm = self.engine.rpm(&self.shafts) * 0.3 + self.tacho_rpm * 0.7;
        // chassis integration happens in the external engine's pipeline
        // step, after every vehicle ran its update
        self.update_wheel_transforms(dt, bodies, colliders);
    }

    fn update_aerodynamics(&mut self, dt: f32, bodies: &mut RigidBodySet) {
        let Some(body) = bodies.get_mut(self.body) else {
            return;
        };
        let rot = body.position().rotation;
        let air_local = -rot.inverse_transform_vector(body.linvel());

        self.aero_force = Vector::zeros();
        self.aero_torque = Vector::zeros();
        for device in &mut self.aero_devices {
            let force = device.update_force(air_local);
            let arm = device.position().coords - self.com_offset;
            self.aero_force += force;
            self.aero_torque += arm.cross(&force);
        }
        body.apply_impulse(rot * (self.aero_force * dt), true);
        body.apply_torque_impulse(rot * (self.aero_torque * dt), true);
    }

    // --------------------------------------------------------------
    // transmission & clutch control
    // --------------------------------------------------------------

    fn update_transmission(&mut self, dt: f32) {
        let clutch_rpm = self.transmission.clutch_rpm(&self.shafts);

        if self.autoshift {
            let gear = self.next_gear(clutch_rpm);
            self.request_gear(gear);
        }

        self.remaining_shift_time = (self.remaining_shift_time - dt).max(0.0);

        if !self.shifted
            && self.remaining_shift_time <= self.transmission.shift_time() * 0.5
        {
            self.transmission.shift(self.shift_gear);
            self.shifted = true;
        }

        if self.autoclutch {
            if !self.engine.combustion() {
                self.engine.start(&mut self.shafts);
            }

            let throttle = self.engine.throttle();
            let throttle = self.auto_clutch_throttle(clutch_rpm, throttle, dt);
            self.engine.set_throttle(throttle);

            let new_clutch = self.auto_clutch(self.last_clutch, dt);
            self.clutch.set_position(new_clutch);
        }
        self.last_clutch = self.clutch.position();
    }

    fn auto_clutch(&self, last_clutch: f32, dt: f32) -> f32 {
        let mut clutch_value: f32 = 1.0;

        // stall avoidance: cap engagement at the torque that would hold
        // engine speed level this tick
        let clutch_rpm = self.transmission.clutch_rpm(&self.shafts);
        if clutch_rpm < self.engine.start_rpm() {
            let w = self.engine.ang_velocity(&self.shafts);
            let w_min = self.engine.start_rpm() * RPM_TO_RAD;
            let inertia = self.shafts[self.engine.shaft].inertia();
            let torque_limit = (inertia * (w - w_min) / dt).min(self.engine.torque());
            clutch_value = (torque_limit / self.clutch.torque_max()).clamp(0.0, 1.0);
        }

        // open through the first half of a shift, ramp back in over the
        // second half
        let shift_time = self.transmission.shift_time();
        if self.remaining_shift_time > shift_time * 0.5 {
            clutch_value = 0.0;
        } else if self.remaining_shift_time > 0.0 {
            clutch_value *= 1.0 - self.remaining_shift_time / (shift_time * 0.5);
        }

        // declutch when braking
        if self.brake_value > 1e-3 {
            clutch_value = 0.0;
        }

        // rate limit engagement changes
        let engage_limit = 10.0 * dt;
        let delta = (clutch_value - last_clutch).clamp(-engage_limit, engage_limit);
        last_clutch + delta
    }

    fn auto_clutch_throttle(&mut self, clutch_rpm: f32, throttle: f32, dt: f32) -> f32 {
        let mut throttle = throttle;

        if self.engine.rpm(&self.shafts) < self.engine.start_rpm()
            && throttle < self.engine.idle_throttle()
        {
            // avoid stall
            throttle = self.engine.idle_throttle();
        }

        if self.remaining_shift_time > 0.0 {
            // rev-match the gearbox side while the clutch is open
            let current_rpm = self.engine.rpm(&self.shafts);
            if current_rpm < clutch_rpm && current_rpm < self.engine.redline() {
                self.remaining_shift_time += dt;
                throttle = 1.0;
            } else {
                throttle = 0.5 * throttle;
            }
        }

        throttle
    }

    fn next_gear(&self, clutch_rpm: f32) -> i32 {
        let gear = self.transmission.gear();

        // only decide when no shift is pending and the clutch is home
        if self.shifted && self.clutch.position() == 1.0 {
            // upshift past redline; never up from neutral or reverse
            if clutch_rpm > self.engine.redline() && gear > 0 {
                return gear + 1;
            }
            // downshift below the shift-down point; never into neutral
            if clutch_rpm < self.downshift_rpm(gear) && gear > 1 {
                return gear - 1;
            }
        }
        gear
    }

    fn downshift_rpm(&self, gear: i32) -> f32 {
        // lands at 70% of redline in the next lower gear
        if gear > 1 {
            let current_ratio = self.transmission.ratio(gear);
            let lower_ratio = self.transmission.ratio(gear - 1);
            0.7 * self.engine.redline() / lower_ratio * current_ratio
        } else {
            0.0
        }
    }

    // --------------------------------------------------------------
    // dynamics step
    // --------------------------------------------------------------

    fn update_dynamics(
        &mut self,
        dt: f32,
        bodies: &mut RigidBodySet,
        colliders: &ColliderSet,
        query: &QueryPipeline,
    ) {
        // differential joints + anti-slip clutches across their outputs
        self.diff_joints.clear();
        self.clutch_joints.clear();
        for diff in &self.differentials {
            self.diff_joints.push(DifferentialJoint::new(
                &self.shafts,
                diff.shaft,
                diff.side_a,
                diff.side_b,
                diff.final_drive(),
            ));
            self.clutch_joints.push(ClutchJoint::new(
                &self.shafts,
                diff.side_a,
                diff.side_b,
                1.0,
                diff.anti_slip_torque() * dt,
            ));
        }

        // engine to gearbox; zero capacity in neutral
        let gear_ratio = self.transmission.gear_ratio();
        let clutch_limit = if gear_ratio != 0.0 {
            self.clutch.torque() * dt
        } else {
            0.0
        };
        self.clutch_joints.push(ClutchJoint::new(
            &self.shafts,
            self.engine.shaft,
            self.transmission.shaft,
            gear_ratio,
            clutch_limit,
        ));

        // suspension displacement from ground probes
        for wheel in &mut self.wheels {
            let window = 2.0 * wheel.radius();
            wheel.update_displacement(self.body, bodies, colliders, query, window);
        }

        // anti-roll bars as transient stiffness, clamped so no corner goes
        // negative
        for bar in &self.antiroll {
            let d0 = self.wheels[bar.wheel_a].suspension.displacement();
            let d1 = self.wheels[bar.wheel_b].suspension.displacement();
            let dr = d0 - d1;
            let mut k0 = if d0 > 0.0 { bar.stiffness * dr / d0 } else { 0.0 };
            let mut k1 = if d1 > 0.0 { -bar.stiffness * dr / d1 } else { 0.0 };
            if self.wheels[bar.wheel_a].suspension.base_stiffness() + k0 < 0.0 {
                k0 = 0.0;
            }
            if self.wheels[bar.wheel_b].suspension.base_stiffness() + k1 < 0.0 {
                k1 = 0.0;
            }
            self.wheels[bar.wheel_a]
                .suspension
                .set_antiroll_stiffness(k0);
            self.wheels[bar.wheel_b]
                .suspension
                .set_antiroll_stiffness(k1);
        }

        // contact enumeration: one contact + one traction motor joint per
        // grounded wheel
        self.contacts.clear();
        self.motor_joints.clear();
        self.abs_active = false;
        self.tcs_active = false;
        let throttle = self.engine.throttle();
        for (index, wheel) in self.wheels.iter_mut().enumerate() {
            if let Some(mut contact) =
                wheel.update_contact(dt, self.body, bodies, &self.shafts, throttle)
            {
                contact.wheel = index;
                self.motor_joints.push(MotorJoint::new(
                    wheel.shaft,
                    contact.v1 / wheel.radius(),
                    0.0,
                ));
                self.abs_active |= wheel.abs_active();
                self.tcs_active |= wheel.tcs_active();
                self.contacts.push(contact);
            }
        }

        // engine demand, TCS-scaled by the worst spinning driven wheel
        let drive_scale = self
            .wheels
            .iter()
            .filter(|w| w.tcs_active())
            .map(|w| w.drive_scale())
            .fold(1.0, f32::min);
        let engine_target = if self.engine.torque() > 0.0 {
            self.engine.rpm_limit_rad()
        } else {
            0.0
        };
        self.motor_joints.push(MotorJoint::new(
            self.engine.shaft,
            engine_target,
            self.engine.torque().abs() * dt * drive_scale,
        ));

        // one braking joint per wheel with demand, ABS already applied
        for wheel in &self.wheels {
            let torque = wheel.effective_brake_torque();
            if torque > 0.0 {
                self.motor_joints
                    .push(MotorJoint::new(wheel.shaft, 0.0, torque * dt));
            }
        }

        // fixed-budget relaxation: contact/tire estimate, driveline solve,
        // then friction-row correction, 8 times over
        for _ in 0..SOLVER_ITERATIONS {
            for (i, contact) in self.contacts.iter_mut().enumerate() {
                let wheel = &mut self.wheels[contact.wheel];

                contact.response.solve(
                    bodies,
                    contact.body_a,
                    contact.body_b,
                    contact.position,
                    0.0,
                );

                let load = contact.response.accum_impulse / dt;
                let rim_speed = self.shafts[wheel.shaft].ang_velocity() * wheel.radius();
                let (fx, fy) = wheel.tire.force(
                    load,
                    contact.friction_coeff,
                    contact.camber,
                    rim_speed,
                    contact.v1,
                    contact.v2,
                );

                // widen the lateral row toward the tire's demand
                let lateral_impulse = fy * dt;
                if lateral_impulse > contact.friction2.upper_limit {
                    contact.friction2.upper_limit = lateral_impulse;
                } else if lateral_impulse < contact.friction2.lower_limit {
                    contact.friction2.lower_limit = lateral_impulse;
                }

                // tire friction torque bounds the traction joint
                let joint = &mut self.motor_joints[i];
                let impulse_limit = fx.abs() * wheel.radius() * dt;
                if impulse_limit > joint.impulse_limit {
                    joint.impulse_limit = impulse_limit;
                }
                joint.target_velocity = contact.v1 / wheel.radius();
            }

            // driveline order matters: tire demand propagates through the
            // differentials before the clutch sees it
            for joint in &mut self.motor_joints {
                joint.solve(&mut self.shafts);
            }
            for joint in &mut self.diff_joints {
                joint.solve(&mut self.shafts);
            }
            for joint in &mut self.clutch_joints {
                joint.solve(&mut self.shafts);
            }

            for (i, contact) in self.contacts.iter_mut().enumerate() {
                let wheel = &self.wheels[contact.wheel];

                // longitudinal bound follows the traction joint's torque
                let impulse_limit =
                    -self.motor_joints[i].accumulated_impulse / wheel.radius();
                if impulse_limit > contact.friction1.upper_limit {
                    contact.friction1.upper_limit = impulse_limit;
                } else if impulse_limit < contact.friction1.lower_limit {
                    contact.friction1.lower_limit = impulse_limit;
                }

                let rim_speed = self.shafts[wheel.shaft].ang_velocity() * wheel.radius();
                contact.friction1.solve(
                    bodies,
                    contact.body_a,
                    contact.body_b,
                    contact.position,
                    -rim_speed,
                );
                contact.friction2.solve(
                    bodies,
                    contact.body_a,
                    contact.body_b,
                    contact.position,
                    0.0,
                );
            }
        }

        if let Some(sink) = &mut self.diagnostics {
            for (i, contact) in self.contacts.iter().enumerate() {
                let wheel = &self.wheels[contact.wheel];
                sink.record(&format!(
                    "wheel {}: fz {:.0} slide {:.3} slip {:.3} drive {:.3} lat {:.3}",
                    contact.wheel,
                    contact.response.accum_impulse / dt,
                    wheel.tire.slide(),
                    wheel.tire.slip(),
                    self.motor_joints[i].accumulated_impulse,
                    contact.friction2.accum_impulse,
                ));
            }
        }
    }

    fn update_wheel_transforms(
        &mut self,
        dt: f32,
        bodies: &RigidBodySet,
        colliders: &mut ColliderSet,
    ) {
        if bodies.get(self.body).is_none() {
            return;
        }
        for (wheel, handle) in self.wheels.iter().zip(&self.wheel_colliders) {
            self.shafts[wheel.shaft].integrate(dt);
            if let Some(collider) = colliders.get_mut(*handle) {
                collider.set_position_wrt_parent(wheel.collider_transform());
            }
        }
    }

    // --------------------------------------------------------------
    // recovery
    // --------------------------------------------------------------

    /// Drop (or lift) the body along its down axis until the closest wheel
    /// just touches the ground, and kill all velocity. Idempotent.
    pub fn align_with_ground(
        &mut self,
        bodies: &mut RigidBodySet,
        colliders: &ColliderSet,
        query: &QueryPipeline,
    ) {
        for wheel in &mut self.wheels {
            wheel.update_displacement(
                self.body,
                bodies,
                colliders,
                query,
                ALIGN_PROBE_LENGTH,
            );
        }

        let mut min_clearance: Option<f32> = None;
        for wheel in &self.wheels {
            if let Some(clearance) = wheel.ground_clearance() {
                min_clearance = Some(match min_clearance {
                    Some(current) => current.min(clearance),
                    None => clearance,
                });
            }
        }
        let Some(clearance) = min_clearance else {
            return;
        };

        {
            let Some(body) = bodies.get_mut(self.body) else {
                return;
            };
            let mut pose = *body.position();
            let down = pose.rotation * axes::down();
            pose.translation.vector += down * clearance;
            body.set_position(pose, true);
            body.set_linvel(Vector::zeros(), true);
            body.set_angvel(Vector::zeros(), true);
        }

        for wheel in &mut self.wheels {
            wheel.update_displacement(
                self.body,
                bodies,
                colliders,
                query,
                ALIGN_PROBE_LENGTH,
            );
        }
    }

    /// Roll the body upright about its forward axis when tipped more than
    /// 45 degrees, then re-align with the ground. No-op below the
    /// threshold.
    pub fn rollover_recover(
        &mut self,
        bodies: &mut RigidBodySet,
        colliders: &ColliderSet,
        query: &QueryPipeline,
    ) {
        let recovered = {
            let Some(body) = bodies.get_mut(self.body) else {
                return;
            };
            let pose = *body.position();
            let rot = pose.rotation;
            let up_world = Vector3::y();

            let mut forward = rot * axes::forward();
            forward -= up_world * up_world.dot(&forward);
            if forward.norm_squared() < 1e-8 {
                // nose straight up or down, roll axis undefined
                return;
            }
            forward.normalize_mut();

            let mut up_car = rot * axes::up();
            up_car -= forward * forward.dot(&up_car);
            up_car.normalize_mut();

            let angle = up_car.dot(&up_world).clamp(-1.0, 1.0).acos();
            if angle.abs() < core::f32::consts::FRAC_PI_4 {
                return;
            }

            // signed so the rotation always closes the angle
            let sign = up_car.cross(&up_world).dot(&forward).signum();
            let correction = UnitQuaternion::from_axis_angle(
                &Unit::new_normalize(forward),
                angle * sign,
            );

            let com = *body.center_of_mass();
            let new_rot = correction * rot;
            let new_pos =
                com.coords + correction * (pose.translation.vector - com.coords);
            body.set_position(
                Isometry3::from_parts(Translation3::from(new_pos), new_rot),
                true,
            );
            true
        };

        if recovered {
            debug!("rollover recovery triggered");
            self.align_with_ground(bodies, colliders, query);
        }
    }

    // --------------------------------------------------------------
    // diagnostics
    // --------------------------------------------------------------

    /// Multi-section state dump for debug HUDs and logs.
    pub fn describe(&self, bodies: &RigidBodySet, sections: DescribeSections) -> String {
        let mut out = String::new();
        let dt = self.last_dt.max(1e-6);

        if sections.body {
            let _ = writeln!(out, "---Body---");
            if let Some(body) = bodies.get(self.body) {
                let v = body.linvel();
                let p = body.translation();
                let _ = writeln!(out, "Velocity: {:.3} {:.3} {:.3}", v.x, v.y, v.z);
                let _ = writeln!(out, "Position: {:.3} {:.3} {:.3}", p.x, p.y, p.z);
                let _ = writeln!(out, "Total mass: {:.1}", body.mass());
            }
            let _ = writeln!(out);
        }

        if sections.drivetrain {
            let _ = writeln!(out, "---Engine---");
            let _ = writeln!(out, "RPM: {:.0}", self.engine.rpm(&self.shafts));
            let _ = writeln!(
                out,
                "Power: {:.1} kW",
                self.engine.torque() * self.engine.ang_velocity(&self.shafts) * 1e-3
            );
            let _ = writeln!(out);

            let _ = writeln!(out, "---Transmission---");
            let _ = writeln!(out, "Gear: {}", self.transmission.gear());
            let _ = writeln!(out, "Gear Ratio: {:.2}", self.transmission.gear_ratio());
            let _ = writeln!(out, "Clutch: {:.2}", self.clutch.position());
            if let Some(joint) = self.clutch_joints.last() {
                let _ = writeln!(
                    out,
                    "Engine Load: {:.1} kW",
                    joint.accumulated_impulse / dt
                        * self.shafts[joint.shaft_a].ang_velocity()
                        * 1e-3
                );
            }
            let _ = writeln!(out);

            for joint in &self.diff_joints {
                let _ = writeln!(out, "---Differential---");
                let _ = writeln!(out, "Gear Ratio: {:.2}", joint.gear_ratio);
                let _ = writeln!(
                    out,
                    "Shaft RPM: {:.0}",
                    self.shafts[joint.shaft_in].ang_velocity()
                        * crate::driveline::RAD_TO_RPM
                );
                let _ = writeln!(
                    out,
                    "Shaft Load: {:.1} kW",
                    joint.accumulated_impulse / dt
                        * self.shafts[joint.shaft_in].ang_velocity()
                        * 1e-3
                );
                let _ = writeln!(out);
            }
        }

        if sections.wheels {
            for (i, wheel) in self.wheels.iter().enumerate() {
                let _ = writeln!(out, "---Wheel {}---", i);
                let _ = writeln!(out, "Travel: {:.3}", wheel.suspension.displacement());
                let fz = self
                    .contacts
                    .iter()
                    .find(|c| c.wheel == i)
                    .map(|c| c.response.accum_impulse / dt)
                    .unwrap_or(0.0);
                let _ = writeln!(out, "Fz: {:.2} kN", fz * 1e-3);
                let _ = writeln!(out, "Ideal Slip: {:.3}", wheel.tire.ideal_slide());
                let _ = writeln!(out, "Slip: {:.3}", wheel.tire.slide());
                let _ = writeln!(out, "Slip Angle: {:.3}", wheel.tire.slip());
                let _ = writeln!(
                    out,
                    "RPM: {:.0}",
                    self.shafts[wheel.shaft].ang_velocity()
                        * crate::driveline::RAD_TO_RPM
                );
                let _ = writeln!(out);
            }
        }

        if sections.aero {
            let _ = writeln!(out, "---Aerodynamics---");
            let f = self.aero_force;
            let t = self.aero_torque;
            let _ = writeln!(out, "Force: {:.1} {:.1} {:.1}", f.x, f.y, f.z);
            let _ = writeln!(out, "Torque: {:.1} {:.1} {:.1}", t.x, t.y, t.z);
            for device in &self.aero_devices {
                let _ = writeln!(out, "---Aerodynamic Device---");
                let d = device.drag();
                let l = device.lift();
                let _ = writeln!(out, "Drag: {:.1} {:.1} {:.1}", d.x, d.y, d.z);
                let _ = writeln!(out, "Lift: {:.1} {:.1} {:.1}", l.x, l.y, l.z);
            }
            let _ = writeln!(out);
        }

        out
    }

    /// Handles of everything this vehicle owns in the external engine.
    pub fn external_handles(&self) -> (RigidBodyHandle, &[ColliderHandle]) {
        (self.body, &self.wheel_colliders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn vehicle() -> Vehicle {
        Vehicle::new(
            &VehicleInfo::coupe(),
            RigidBodyHandle::invalid(),
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn downshift_point_tracks_gear_ratio_spread() {
        let v = vehicle();
        // 2nd gear: 70% of redline seen through the 2nd/1st ratio spread
        assert_relative_eq!(
            v.downshift_rpm(2),
            0.7 * 7000.0 * (2.19 / 3.63),
            epsilon = 1.0
        );
        // never downshifts out of 1st
        assert_relative_eq!(v.downshift_rpm(1), 0.0);
    }

    #[test]
    fn autoshift_respects_neutral_and_gear_floor() {
        let mut v = vehicle();
        // screaming driveshaft in neutral: stays in neutral
        assert_eq!(v.next_gear(9000.0), 0);
        // crawling in 1st: no downshift into neutral
        v.transmission.shift(1);
        assert_eq!(v.next_gear(100.0), 1);
        // above redline in a forward gear: up
        v.transmission.shift(3);
        assert_eq!(v.next_gear(7200.0), 4);
        // below the downshift point in 3rd: down
        assert_eq!(v.next_gear(1000.0), 2);
    }

    #[test]
    fn gear_requests_ignore_out_of_range_and_mid_shift() {
        let mut v = vehicle();
        v.request_gear(99);
        assert_eq!(v.target_gear(), 0);
        assert!(!v.is_shifting());

        v.request_gear(2);
        assert!(v.is_shifting());
        v.request_gear(3);
        assert_eq!(v.target_gear(), 2);
    }

    #[test]
    fn friction_estimate_scales_with_tire_peaks() {
        let v = vehicle();
        // coupe tires: mu_x 1.1, mu_y 1.0 at reference load
        assert_relative_eq!(v.lon_friction_coeff, 0.68 * 1.1, epsilon = 1e-3);
        assert_relative_eq!(v.lat_friction_coeff, 0.62 * 1.0, epsilon = 1e-3);
    }
}
