//! Torque-curve combustion engine driving one shaft.

use serde::{Deserialize, Serialize};

use super::shaft::{ShaftId, ShaftSet};

pub const RPM_TO_RAD: f32 = core::f32::consts::PI / 30.0;
pub const RAD_TO_RPM: f32 = 30.0 / core::f32::consts::PI;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineInfo {
    /// Crank + flywheel inertia (kg*m^2).
    pub inertia: f32,
    /// (rpm, N*m) samples, ascending rpm. Linearly interpolated.
    pub torque_curve: Vec<[f32; 2]>,
    /// Shift-up / peak-power point (rpm).
    pub redline: f32,
    /// Hard rev cut (rpm).
    pub rpm_limit: f32,
    /// RPM the starter spins the crank to.
    pub start_rpm: f32,
    /// Below this the engine dies (rpm).
    pub stall_rpm: f32,
    /// Throttle floor used by the autoclutch to keep the engine alive.
    pub idle_throttle: f32,
    /// Engine-braking torque per rad/s off throttle.
    pub friction: f32,
}

pub struct Engine {
    info: EngineInfo,
    pub shaft: ShaftId,
    throttle: f32,
    combustion: bool,
    torque: f32, // net crank torque this tick, N*m
}

impl Engine {
    pub fn new(info: EngineInfo, shaft: ShaftId) -> Self {
        Self {
            info,
            shaft,
            throttle: 0.0,
            combustion: false,
            torque: 0.0,
        }
    }

    /// Spin the crank up to start RPM and light combustion.
    pub fn start(&mut self, shafts: &mut ShaftSet) {
        self.combustion = true;
        let start_w = self.info.start_rpm * RPM_TO_RAD;
        if shafts[self.shaft].ang_velocity() < start_w {
            shafts[self.shaft].set_ang_velocity(start_w);
        }
    }

    pub fn set_throttle(&mut self, value: f32) {
        self.throttle = value.clamp(0.0, 1.0);
    }

    #[inline]
    pub fn throttle(&self) -> f32 {
        self.throttle
    }

    #[inline]
    pub fn combustion(&self) -> bool {
        self.combustion
    }

    #[inline]
    pub fn torque(&self) -> f32 {
        self.torque
    }

    pub fn rpm(&self, shafts: &ShaftSet) -> f32 {
        shafts[self.shaft].ang_velocity() * RAD_TO_RPM
    }

    pub fn ang_velocity(&self, shafts: &ShaftSet) -> f32 {
        shafts[self.shaft].ang_velocity()
    }

    #[inline]
    pub fn redline(&self) -> f32 {
        self.info.redline
    }

    /// Rev cut as an angular velocity (rad/s), the engine demand target.
    #[inline]
    pub fn rpm_limit_rad(&self) -> f32 {
        self.info.rpm_limit * RPM_TO_RAD
    }

    #[inline]
    pub fn start_rpm(&self) -> f32 {
        self.info.start_rpm
    }

    #[inline]
    pub fn idle_throttle(&self) -> f32 {
        self.info.idle_throttle
    }

    #[inline]
    pub fn inertia(&self) -> f32 {
        self.info.inertia
    }

    /// Internal per-tick update: stall detection and net crank torque.
    pub fn update(&mut self, shafts: &ShaftSet, _dt: f32) {
        let w = shafts[self.shaft].ang_velocity();
        let rpm = w * RAD_TO_RPM;

        if self.combustion && rpm < self.info.stall_rpm {
            self.combustion = false;
        }

        let friction = self.info.friction * w.max(0.0) * (1.0 - self.throttle);
        self.torque = if self.combustion {
            self.throttle * self.curve_torque(rpm) - friction
        } else {
            -friction
        };
    }

    fn curve_torque(&self, rpm: f32) -> f32 {
        let curve = &self.info.torque_curve;
        if curve.is_empty() {
            return 0.0;
        }
        if rpm <= curve[0][0] {
            return curve[0][1];
        }
        for pair in curve.windows(2) {
            let [r0, t0] = pair[0];
            let [r1, t1] = pair[1];
            if rpm <= r1 {
                let s = (rpm - r0) / (r1 - r0);
                return t0 + s * (t1 - t0);
            }
        }
        curve[curve.len() - 1][1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn test_info() -> EngineInfo {
        EngineInfo {
            inertia: 0.25,
            torque_curve: vec![[1000.0, 200.0], [4000.0, 320.0], [7000.0, 260.0]],
            redline: 6500.0,
            rpm_limit: 7000.0,
            start_rpm: 1000.0,
            stall_rpm: 350.0,
            idle_throttle: 0.02,
            friction: 0.02,
        }
    }

    #[test]
    fn start_spins_crank_and_lights_combustion() {
        let mut shafts = ShaftSet::with_capacity(1);
        let id = shafts.add(0.25);
        let mut engine = Engine::new(test_info(), id);
        assert!(!engine.combustion());
        engine.start(&mut shafts);
        assert!(engine.combustion());
        assert_relative_eq!(engine.rpm(&shafts), 1000.0, epsilon = 1e-2);
    }

    #[test]
    fn torque_curve_interpolates_between_samples() {
        let mut shafts = ShaftSet::with_capacity(1);
        let id = shafts.add(0.25);
        shafts[id].set_ang_velocity(2500.0 * RPM_TO_RAD);
        let mut engine = Engine::new(test_info(), id);
        engine.start(&mut shafts);
        engine.set_throttle(1.0);
        engine.update(&shafts, 1.0 / 60.0);
        // midway between the 1000 and 4000 rpm samples
        assert_relative_eq!(engine.torque(), 260.0, epsilon = 1e-3);
    }

    #[test]
    fn engine_stalls_below_stall_rpm() {
        let mut shafts = ShaftSet::with_capacity(1);
        let id = shafts.add(0.25);
        let mut engine = Engine::new(test_info(), id);
        engine.start(&mut shafts);
        shafts[id].set_ang_velocity(100.0 * RPM_TO_RAD);
        engine.update(&shafts, 1.0 / 60.0);
        assert!(!engine.combustion());
        assert!(engine.torque() <= 0.0);
    }
}
