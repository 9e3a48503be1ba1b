//! PhysicsWorld: rapier sets, the ground, and the vehicle registry.
//!
//! The world owns everything the external rigid-body engine needs and
//! drives the per-tick order: every vehicle's update first, then one
//! `PhysicsPipeline::step` that integrates the chassis bodies. Wheel
//! cylinders get their bottom-patch solver contacts discarded through a
//! physics hook; the suspension and tire rows own that region.

use std::collections::HashMap;

use nalgebra::{Isometry3, UnitQuaternion, Vector3};
use rapier3d::prelude::*;
use tracing::info;

use crate::axes;
use crate::info::{ConfigError, VehicleInfo};
use crate::vehicle::Vehicle;

const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
const GROUP_CHASSIS: Group = Group::from_bits_truncate(0b0010);

/// The narrow per-tick capability the external engine needs from anything
/// it steps: read body state, apply impulses, done. Vehicles implement
/// this; the world does not care what else they are.
pub trait TickAction {
    fn update(
        &mut self,
        dt: f32,
        bodies: &mut RigidBodySet,
        colliders: &mut ColliderSet,
        query: &QueryPipeline,
    );
}

impl TickAction for Vehicle {
    fn update(
        &mut self,
        dt: f32,
        bodies: &mut RigidBodySet,
        colliders: &mut ColliderSet,
        query: &QueryPipeline,
    ) {
        Vehicle::update(self, dt, bodies, colliders, query);
    }
}

/// Contact filter restricting wheel-cylinder collisions to the leading
/// region of the wheel: solver contacts more than half a radius below the
/// axle are discarded, since the ground patch belongs to the suspension
/// and tire rows. Curb and wall impacts at axle height stay.
#[derive(Default)]
pub struct WheelPatchFilter {
    wheels: HashMap<ColliderHandle, f32>, // collider -> wheel radius
}

impl WheelPatchFilter {
    fn register(&mut self, handle: ColliderHandle, radius: f32) {
        self.wheels.insert(handle, radius);
    }

    fn unregister(&mut self, handle: ColliderHandle) {
        self.wheels.remove(&handle);
    }
}

impl PhysicsHooks for WheelPatchFilter {
    fn modify_solver_contacts(&self, context: &mut ContactModificationContext) {
        let (handle, radius) = if let Some(&r) = self.wheels.get(&context.collider1) {
            (context.collider1, r)
        } else if let Some(&r) = self.wheels.get(&context.collider2) {
            (context.collider2, r)
        } else {
            return;
        };
        let Some(collider) = context.colliders.get(handle) else {
            return;
        };

        // wheel collider local frame: +Z forward, +X chassis-down
        let iso = collider.position();
        context.solver_contacts.retain(|contact| {
            let local = iso.inverse_transform_point(&contact.point);
            local.x <= 0.5 * radius
        });
    }
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    pub pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub impulse_joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver,
    pub query_pipeline: QueryPipeline,
    vehicles: Vec<Vehicle>,
    patch_filter: WheelPatchFilter,
}

impl PhysicsWorld {
    /// World with a large static ground slab, top surface at y = 0.
    pub fn new() -> Self {
        let gravity = vector![0.0, -9.81, 0.0];

        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        let ground = bodies.insert(
            RigidBodyBuilder::fixed()
                .translation(vector![0.0, -1.0, 0.0])
                .build(),
        );
        colliders.insert_with_parent(
            ColliderBuilder::cuboid(500.0, 1.0, 500.0)
                .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
                .friction(1.2)
                .restitution(0.0)
                .build(),
            ground,
            &mut bodies,
        );

        Self {
            gravity,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            vehicles: Vec::new(),
            patch_filter: WheelPatchFilter::default(),
        }
    }

    /// Spawn a vehicle at a pose: chassis body, chassis collider, one
    /// clipped-contact cylinder per wheel, then the vehicle itself.
    pub fn spawn_vehicle(
        &mut self,
        config: &VehicleInfo,
        pose: Isometry3<Real>,
    ) -> Result<usize, ConfigError> {
        config.validate()?;

        let body = self.bodies.insert(
            RigidBodyBuilder::dynamic()
                .position(pose)
                .linear_damping(config.chassis.linear_damping)
                .angular_damping(config.chassis.angular_damping)
                .ccd_enabled(true)
                .build(),
        );

        let [hx, hy, hz] = config.chassis.half_extents;
        let [cx, cy, cz] = config.chassis.com_offset;
        let volume = 8.0 * hx * hy * hz;
        self.colliders.insert_with_parent(
            ColliderBuilder::cuboid(hx, hy, hz)
                .translation(vector![cx, cy, cz])
                .collision_groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_GROUND))
                .density(config.chassis.mass / volume)
                .friction(0.0) // the tire rows own ground friction
                .restitution(0.0)
                .build(),
            body,
            &mut self.bodies,
        );

        // cylinder axle along chassis X; local +Z stays forward for the
        // contact-patch hook
        let axle_align =
            UnitQuaternion::from_axis_angle(&axes::forward_axis(), -std::f32::consts::FRAC_PI_2);
        let mut wheel_colliders = Vec::with_capacity(config.wheels.len());
        for wheel in &config.wheels {
            // hub at full droop; per-tick updates track the suspension
            let hub = Vector3::from(wheel.suspension.attach)
                - Vector3::y() * wheel.suspension.rest_length;
            let handle = self.colliders.insert_with_parent(
                ColliderBuilder::cylinder(wheel.width * 0.5, wheel.radius)
                    .position(Isometry3::from_parts(hub.into(), axle_align))
                    .collision_groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_GROUND))
                    .active_hooks(ActiveHooks::MODIFY_SOLVER_CONTACTS)
                    .mass(0.0) // wheel inertia lives in the shaft model
                    .friction(0.6)
                    .restitution(0.0)
                    .build(),
                body,
                &mut self.bodies,
            );
            self.patch_filter.register(handle, wheel.radius);
            wheel_colliders.push(handle);
        }

        let vehicle = Vehicle::new(config, body, wheel_colliders)?;
        self.vehicles.push(vehicle);
        let index = self.vehicles.len() - 1;
        info!("spawned vehicle {index}");
        Ok(index)
    }

    /// Remove a vehicle and release its body and colliders.
    pub fn remove_vehicle(&mut self, index: usize) {
        if index >= self.vehicles.len() {
            return;
        }
        let vehicle = self.vehicles.remove(index);
        let (body, wheel_colliders) = vehicle.external_handles();
        for handle in wheel_colliders {
            self.patch_filter.unregister(*handle);
        }
        self.bodies.remove(
            body,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    pub fn vehicle(&self, index: usize) -> &Vehicle {
        &self.vehicles[index]
    }

    pub fn vehicle_mut(&mut self, index: usize) -> &mut Vehicle {
        &mut self.vehicles[index]
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Snap a vehicle onto the ground and zero its velocity.
    pub fn align_vehicle_with_ground(&mut self, index: usize) {
        self.query_pipeline.update(&self.colliders);
        let Some(vehicle) = self.vehicles.get_mut(index) else {
            return;
        };
        vehicle.align_with_ground(&mut self.bodies, &self.colliders, &self.query_pipeline);
    }

    /// Roll a tipped-over vehicle upright (45 degree threshold), then snap
    /// it onto the ground.
    pub fn recover_vehicle(&mut self, index: usize) {
        self.query_pipeline.update(&self.colliders);
        let Some(vehicle) = self.vehicles.get_mut(index) else {
            return;
        };
        vehicle.rollover_recover(&mut self.bodies, &self.colliders, &self.query_pipeline);
    }

    /// Advance the whole world by one fixed tick.
    pub fn step(&mut self, dt: f32) {
        self.query_pipeline.update(&self.colliders);

        for vehicle in &mut self.vehicles {
            TickAction::update(
                vehicle,
                dt,
                &mut self.bodies,
                &mut self.colliders,
                &self.query_pipeline,
            );
        }

        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &self.patch_filter,
            &(),
        );
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}
