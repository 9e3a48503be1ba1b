//! drivesim - per-tick vehicle dynamics on top of rapier3d.
//!
//! A multi-body drivetrain (engine, clutch, transmission, differentials,
//! wheel shafts) coupled to wheel/ground contact and tire friction,
//! solved jointly every tick by fixed-budget sequential-impulse
//! relaxation. The rigid-body world, broad phase and integration belong
//! to rapier; this crate reads body state, casts suspension rays and
//! applies impulses.

pub mod aero;
pub mod axes;
pub mod driveline;
pub mod info;
pub mod vehicle;
pub mod wheel;
pub mod world;

pub use aero::{AeroDevice, AeroDeviceInfo};
pub use info::{AntiRollBarInfo, ChassisInfo, ConfigError, VehicleInfo};
pub use vehicle::{DescribeSections, DiagnosticsSink, JointLoad, Vehicle, SOLVER_ITERATIONS};
pub use world::{PhysicsWorld, TickAction};
