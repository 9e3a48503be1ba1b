//! Static vehicle configuration.
//!
//! Everything a `Vehicle` is built from: chassis, wheels, drivetrain,
//! anti-roll bars, aero devices, and the shaft-linkage topology expressed
//! as integer indices (0..wheel_count selects a wheel shaft, beyond that a
//! differential shaft). Validation is fail-fast: a bad link is a
//! construction error, never a runtime one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aero::AeroDeviceInfo;
use crate::driveline::{ClutchInfo, DifferentialInfo, EngineInfo, TransmissionInfo};
use crate::wheel::{BrakeInfo, SuspensionInfo, TireInfo, WheelInfo};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("vehicle needs at least one wheel")]
    NoWheels,
    #[error("transmission needs at least one forward gear")]
    NoGears,
    #[error("shaft link {link} out of range ({wheels} wheel + {diffs} differential shafts)")]
    ShaftLinkOutOfRange {
        link: usize,
        wheels: usize,
        diffs: usize,
    },
    #[error("anti-roll bar references wheel {wheel} of {wheels}")]
    AntiRollWheelOutOfRange { wheel: usize, wheels: usize },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChassisInfo {
    /// Total mass (kg).
    pub mass: f32,
    /// Collider half extents [hx, hy, hz] (m).
    pub half_extents: [f32; 3],
    /// Center-of-mass offset from the collider center, chassis space.
    pub com_offset: [f32; 3],
    pub linear_damping: f32,
    pub angular_damping: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AntiRollBarInfo {
    /// Coupling stiffness (N/m).
    pub stiffness: f32,
    pub wheel_a: usize,
    pub wheel_b: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub chassis: ChassisInfo,
    pub wheels: Vec<WheelInfo>,
    pub engine: EngineInfo,
    pub clutch: ClutchInfo,
    pub transmission: TransmissionInfo,
    /// Shaft link the transmission output connects to.
    pub transmission_link: usize,
    pub differentials: Vec<DifferentialInfo>,
    pub antiroll: Vec<AntiRollBarInfo>,
    pub aero: Vec<AeroDeviceInfo>,
}

impl VehicleInfo {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wheels.is_empty() {
            return Err(ConfigError::NoWheels);
        }
        if self.transmission.forward_ratios.is_empty() {
            return Err(ConfigError::NoGears);
        }

        let wheels = self.wheels.len();
        let diffs = self.differentials.len();
        let shafts = wheels + diffs;

        let check_link = |link: usize| {
            if link >= shafts {
                Err(ConfigError::ShaftLinkOutOfRange {
                    link,
                    wheels,
                    diffs,
                })
            } else {
                Ok(())
            }
        };

        for diff in &self.differentials {
            check_link(diff.link_a)?;
            check_link(diff.link_b)?;
        }
        check_link(self.transmission_link)?;

        for bar in &self.antiroll {
            for wheel in [bar.wheel_a, bar.wheel_b] {
                if wheel >= wheels {
                    return Err(ConfigError::AntiRollWheelOutOfRange { wheel, wheels });
                }
            }
        }
        Ok(())
    }

    /// Rear-wheel-drive coupe preset; wheel order FL, FR, RL, RR.
    pub fn coupe() -> Self {
        let suspension = |x: f32, z: f32, steering: f32| SuspensionInfo {
            attach: [x, -0.3, z],
            rest_length: 0.3,
            travel: 0.22,
            stiffness: 60_000.0,
            damping: 6_000.0,
            max_steering_angle: steering,
            camber: -0.015,
        };
        let tire = TireInfo {
            peak_mu_x: 1.1,
            peak_mu_y: 1.0,
            ideal_slide: 0.12,
            ideal_slip: 0.14,
            camber_stiffness: 0.4,
        };
        let wheel = |x: f32, z: f32, steering: f32, bias: f32, handbrake: f32| WheelInfo {
            radius: 0.31,
            width: 0.22,
            inertia: 0.7,
            suspension: suspension(x, z, steering),
            brake: BrakeInfo {
                max_torque: 2_600.0,
                bias,
                handbrake,
            },
            tire: tire.clone(),
        };

        VehicleInfo {
            chassis: ChassisInfo {
                mass: 1_350.0,
                half_extents: [0.85, 0.35, 2.1],
                com_offset: [0.0, -0.15, 0.0],
                linear_damping: 0.05,
                angular_damping: 0.5,
            },
            wheels: vec![
                wheel(-0.75, 1.25, 0.55, 0.65, 0.0),  // FL
                wheel(0.75, 1.25, 0.55, 0.65, 0.0),   // FR
                wheel(-0.75, -1.25, 0.0, 0.35, 1.0),  // RL
                wheel(0.75, -1.25, 0.0, 0.35, 1.0),   // RR
            ],
            engine: EngineInfo {
                inertia: 0.25,
                torque_curve: vec![
                    [1_000.0, 140.0],
                    [2_400.0, 180.0],
                    [4_400.0, 205.0],
                    [6_500.0, 190.0],
                    [7_500.0, 160.0],
                ],
                redline: 7_000.0,
                rpm_limit: 7_500.0,
                start_rpm: 900.0,
                stall_rpm: 350.0,
                idle_throttle: 0.02,
                friction: 0.03,
            },
            clutch: ClutchInfo { torque_max: 336.0 },
            transmission: TransmissionInfo {
                forward_ratios: vec![3.63, 2.19, 1.54, 1.21, 1.0, 0.77],
                reverse_ratios: vec![-3.44],
                shift_time: 0.2,
            },
            // rear differential feeds RL/RR; transmission drives its carrier
            transmission_link: 4,
            differentials: vec![DifferentialInfo {
                inertia: 0.1,
                final_drive: 4.1,
                anti_slip_torque: 600.0,
                link_a: 2,
                link_b: 3,
            }],
            antiroll: vec![
                AntiRollBarInfo {
                    stiffness: 18_000.0,
                    wheel_a: 0,
                    wheel_b: 1,
                },
                AntiRollBarInfo {
                    stiffness: 12_000.0,
                    wheel_a: 2,
                    wheel_b: 3,
                },
            ],
            aero: vec![
                AeroDeviceInfo {
                    position: [0.0, 0.1, 0.4],
                    drag_coefficient: 0.35,
                    lift_coefficient: -0.08,
                },
                AeroDeviceInfo {
                    position: [0.0, 0.4, -1.9],
                    drag_coefficient: 0.05,
                    lift_coefficient: -0.2,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_validates() {
        VehicleInfo::coupe().validate().unwrap();
    }

    #[test]
    fn bad_shaft_link_is_rejected() {
        let mut info = VehicleInfo::coupe();
        info.transmission_link = 9; // 4 wheels + 1 diff = 5 shafts
        assert!(matches!(
            info.validate(),
            Err(ConfigError::ShaftLinkOutOfRange { link: 9, .. })
        ));
    }

    #[test]
    fn bad_antiroll_wheel_is_rejected() {
        let mut info = VehicleInfo::coupe();
        info.antiroll[0].wheel_b = 7;
        assert!(matches!(
            info.validate(),
            Err(ConfigError::AntiRollWheelOutOfRange { wheel: 7, .. })
        ));
    }

    #[test]
    fn preset_round_trips_through_json() {
        let info = VehicleInfo::coupe();
        let json = serde_json::to_string(&info).unwrap();
        let back: VehicleInfo = serde_json::from_str(&json).unwrap();
        back.validate().unwrap();
        assert_eq!(back.wheels.len(), 4);
    }
}
