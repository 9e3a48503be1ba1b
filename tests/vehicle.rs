//! End-to-end behavior against a real world: flat ground, one vehicle.

use approx::assert_relative_eq;
use nalgebra::{vector, Isometry3, Translation3, UnitQuaternion, Vector3};

use drivesim::{PhysicsWorld, VehicleInfo};

const DT: f32 = 1.0 / 60.0;

fn spawn_aligned(world: &mut PhysicsWorld) -> usize {
    let index = world
        .spawn_vehicle(&VehicleInfo::coupe(), Isometry3::translation(0.0, 1.5, 0.0))
        .unwrap();
    world.align_vehicle_with_ground(index);
    index
}

#[test]
fn rest_scenario_settles_at_rest_length() {
    let mut world = PhysicsWorld::new();
    let index = spawn_aligned(&mut world);

    let vehicle = world.vehicle(index);
    assert_relative_eq!(vehicle.speed(&world.bodies), 0.0, epsilon = 1e-6);
    let body = &world.bodies[vehicle.body];
    assert_relative_eq!(body.angvel().norm(), 0.0, epsilon = 1e-6);

    // closest wheel exactly at touch-down: suspension at rest length
    for wheel in vehicle.wheels() {
        assert_relative_eq!(wheel.suspension.displacement(), 0.0, epsilon = 1e-3);
    }
}

#[test]
fn ground_alignment_is_idempotent() {
    let mut world = PhysicsWorld::new();
    let index = spawn_aligned(&mut world);

    let first = *world.bodies[world.vehicle(index).body].translation();
    world.align_vehicle_with_ground(index);
    let second = *world.bodies[world.vehicle(index).body].translation();

    assert_relative_eq!((second - first).norm(), 0.0, epsilon = 1e-4);
}

#[test]
fn rollover_recovery_rights_a_rolled_vehicle() {
    let mut world = PhysicsWorld::new();
    let pose = Isometry3::from_parts(
        Translation3::new(0.0, 2.0, 0.0),
        UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2),
    );
    let index = world.spawn_vehicle(&VehicleInfo::coupe(), pose).unwrap();

    world.recover_vehicle(index);

    let rot = world.bodies[world.vehicle(index).body].position().rotation;
    let up = rot * Vector3::y();
    let deviation = up.dot(&Vector3::y()).clamp(-1.0, 1.0).acos();
    assert!(
        deviation < std::f32::consts::FRAC_PI_4,
        "deviation {deviation} not reduced below 45 degrees"
    );
}

#[test]
fn rollover_recovery_is_a_noop_when_upright() {
    let mut world = PhysicsWorld::new();
    let index = spawn_aligned(&mut world);

    let before = *world.bodies[world.vehicle(index).body].position();
    world.recover_vehicle(index);
    let after = *world.bodies[world.vehicle(index).body].position();

    assert_relative_eq!(
        (after.translation.vector - before.translation.vector).norm(),
        0.0,
        epsilon = 1e-4
    );
    assert!(before.rotation.angle_to(&after.rotation) < 1e-4);
}

#[test]
fn throttle_launch_spins_up_and_moves_forward() {
    let mut world = PhysicsWorld::new();
    let index = spawn_aligned(&mut world);

    {
        let vehicle = world.vehicle_mut(index);
        vehicle.set_autoclutch(true);
        vehicle.set_autoshift(true);
        vehicle.start_engine();
        vehicle.set_throttle(1.0);
        vehicle.request_gear(1);
    }

    let start_rpm = world.vehicle(index).engine_rpm();
    for _ in 0..300 {
        world.vehicle_mut(index).set_throttle(1.0);
        world.step(DT);
    }

    let vehicle = world.vehicle(index);
    assert!(vehicle.engine_running());
    assert!(
        vehicle.engine_rpm() > start_rpm,
        "engine rpm {} did not rise above start rpm {}",
        vehicle.engine_rpm(),
        start_rpm
    );
    assert!(
        vehicle.ground_speed().abs() > 0.5,
        "no wheel-derived ground speed after 5 s: {}",
        vehicle.ground_speed()
    );
    assert!(
        vehicle.speed(&world.bodies) > 0.5,
        "vehicle did not move: {}",
        vehicle.speed(&world.bodies)
    );
}

#[test]
fn clutch_stays_bounded_and_rate_limited() {
    let mut world = PhysicsWorld::new();
    let index = spawn_aligned(&mut world);

    {
        let vehicle = world.vehicle_mut(index);
        vehicle.set_autoclutch(true);
        vehicle.start_engine();
        vehicle.set_throttle(1.0);
        vehicle.request_gear(1);
    }

    let mut last = world.vehicle(index).clutch_position();
    for _ in 0..240 {
        world.vehicle_mut(index).set_throttle(1.0);
        world.step(DT);
        let clutch = world.vehicle(index).clutch_position();
        assert!((0.0..=1.0).contains(&clutch), "clutch out of range: {clutch}");
        assert!(
            (clutch - last).abs() <= 10.0 * DT + 1e-5,
            "clutch step too large: {} -> {}",
            last,
            clutch
        );
        last = clutch;
    }
}

#[test]
fn joint_impulses_never_exceed_their_bounds() {
    let mut world = PhysicsWorld::new();
    let index = spawn_aligned(&mut world);

    {
        let vehicle = world.vehicle_mut(index);
        vehicle.set_autoclutch(true);
        vehicle.set_autoshift(true);
        vehicle.start_engine();
        vehicle.set_throttle(1.0);
    }

    for tick in 0..180 {
        world.vehicle_mut(index).set_throttle(1.0);
        world.step(DT);
        for (i, load) in world.vehicle(index).driveline_loads().iter().enumerate() {
            assert!(
                load.impulse.abs() <= load.limit + 1e-4,
                "tick {tick} joint {i}: impulse {} over bound {}",
                load.impulse,
                load.limit
            );
        }
    }
}

#[test]
fn gear_request_is_ignored_mid_shift() {
    let mut world = PhysicsWorld::new();
    let index = spawn_aligned(&mut world);

    let vehicle = world.vehicle_mut(index);
    vehicle.request_gear(2);
    // first request is still pending: target sticks
    assert!(vehicle.is_shifting());
    assert_eq!(vehicle.target_gear(), 2);
    vehicle.request_gear(4);
    assert_eq!(vehicle.target_gear(), 2);
}

#[test]
fn autoshift_never_leaves_neutral_on_its_own() {
    let mut world = PhysicsWorld::new();
    let index = spawn_aligned(&mut world);

    {
        let vehicle = world.vehicle_mut(index);
        vehicle.set_autoclutch(true);
        vehicle.set_autoshift(true);
        vehicle.start_engine();
        vehicle.set_throttle(1.0); // rev freely in neutral
    }

    for _ in 0..240 {
        world.vehicle_mut(index).set_throttle(1.0);
        world.step(DT);
        assert_eq!(world.vehicle(index).gear(), 0);
    }
}

#[test]
fn braking_distance_is_zero_at_or_below_target_and_monotone() {
    let mut world = PhysicsWorld::new();
    let index = spawn_aligned(&mut world);
    let body = world.vehicle(index).body;

    world.bodies[body].set_linvel(vector![0.0, 0.0, 10.0], true);
    let vehicle = world.vehicle(index);
    assert_relative_eq!(vehicle.braking_distance(&world.bodies, 10.0), 0.0);
    assert_relative_eq!(vehicle.braking_distance(&world.bodies, 15.0), 0.0);

    let mut previous = 0.0;
    for speed in [5.0_f32, 10.0, 20.0, 40.0] {
        world.bodies[body].set_linvel(vector![0.0, 0.0, speed], true);
        let distance = world.vehicle(index).braking_distance(&world.bodies, 0.0);
        assert!(distance > previous, "distance not increasing at {speed} m/s");
        previous = distance;
    }
}

#[test]
fn cornering_speed_estimate_is_positive_and_grows_with_radius() {
    let mut world = PhysicsWorld::new();
    let index = spawn_aligned(&mut world);

    let vehicle = world.vehicle(index);
    let tight = vehicle.max_velocity(&world.bodies, 20.0);
    let wide = vehicle.max_velocity(&world.bodies, 80.0);
    assert!(tight > 0.0);
    assert!(wide > tight);
}
