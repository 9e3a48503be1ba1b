//! Drivetrain network: shafts, constraint joints and the subsystems that
//! own them (engine, clutch, transmission, differentials).

pub mod clutch;
pub mod differential;
pub mod engine;
pub mod joint;
pub mod shaft;
pub mod transmission;

pub use clutch::{Clutch, ClutchInfo};
pub use differential::{Differential, DifferentialInfo};
pub use engine::{Engine, EngineInfo, RAD_TO_RPM, RPM_TO_RAD};
pub use joint::{ClutchJoint, DifferentialJoint, MotorJoint};
pub use shaft::{Shaft, ShaftId, ShaftSet};
pub use transmission::{Transmission, TransmissionInfo};
