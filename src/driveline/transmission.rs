//! Gearbox: gear table, shift timing, clutch-side RPM.

use serde::{Deserialize, Serialize};

use super::engine::RAD_TO_RPM;
use super::shaft::{ShaftId, ShaftSet};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransmissionInfo {
    /// Forward gear ratios, 1st first. All positive.
    pub forward_ratios: Vec<f32>,
    /// Reverse gear ratios (usually one). All negative.
    pub reverse_ratios: Vec<f32>,
    /// Seconds a gear change takes end to end.
    pub shift_time: f32,
}

pub struct Transmission {
    info: TransmissionInfo,
    /// The shaft the gearbox output drives: the differential carrier (or a
    /// wheel shaft on direct-drive layouts), resolved from the configured
    /// link at init. The transmission does not own a shaft of its own.
    pub shaft: ShaftId,
    gear: i32, // 0 = neutral, >0 forward, <0 reverse
}

impl Transmission {
    pub fn new(info: TransmissionInfo, shaft: ShaftId) -> Self {
        Self {
            info,
            shaft,
            gear: 0,
        }
    }

    #[inline]
    pub fn gear(&self) -> i32 {
        self.gear
    }

    #[inline]
    pub fn forward_gears(&self) -> i32 {
        self.info.forward_ratios.len() as i32
    }

    #[inline]
    pub fn reverse_gears(&self) -> i32 {
        self.info.reverse_ratios.len() as i32
    }

    #[inline]
    pub fn shift_time(&self) -> f32 {
        self.info.shift_time
    }

    /// Ratio of an arbitrary gear; neutral and out-of-range gears are 0.
    pub fn ratio(&self, gear: i32) -> f32 {
        if gear > 0 {
            self.info
                .forward_ratios
                .get((gear - 1) as usize)
                .copied()
                .unwrap_or(0.0)
        } else if gear < 0 {
            self.info
                .reverse_ratios
                .get((-gear - 1) as usize)
                .copied()
                .unwrap_or(0.0)
        } else {
            0.0
        }
    }

    /// Ratio of the engaged gear.
    #[inline]
    pub fn gear_ratio(&self) -> f32 {
        self.ratio(self.gear)
    }

    /// Engage a gear. Out-of-range values are clamped into the gear table.
    pub fn shift(&mut self, gear: i32) {
        self.gear = gear.clamp(-self.reverse_gears(), self.forward_gears());
    }

    /// RPM of the clutch plate on the gearbox side, i.e. the driveshaft
    /// speed seen through the engaged gear.
    pub fn clutch_rpm(&self, shafts: &ShaftSet) -> f32 {
        self.gear_ratio() * shafts[self.shaft].ang_velocity() * RAD_TO_RPM
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driveline::engine::RPM_TO_RAD;
    use approx::assert_relative_eq;

    fn gearbox(shafts: &mut ShaftSet) -> Transmission {
        let shaft = shafts.add(0.3);
        Transmission::new(
            TransmissionInfo {
                forward_ratios: vec![3.5, 2.2, 1.6, 1.2, 1.0],
                reverse_ratios: vec![-3.2],
                shift_time: 0.3,
            },
            shaft,
        )
    }

    #[test]
    fn neutral_has_zero_ratio() {
        let mut shafts = ShaftSet::with_capacity(1);
        let tx = gearbox(&mut shafts);
        assert_relative_eq!(tx.gear_ratio(), 0.0);
        assert_relative_eq!(tx.ratio(0), 0.0);
    }

    #[test]
    fn shift_clamps_to_gear_table() {
        let mut shafts = ShaftSet::with_capacity(1);
        let mut tx = gearbox(&mut shafts);
        tx.shift(9);
        assert_eq!(tx.gear(), 5);
        tx.shift(-4);
        assert_eq!(tx.gear(), -1);
        assert_relative_eq!(tx.gear_ratio(), -3.2);
    }

    #[test]
    fn clutch_rpm_sees_driveshaft_through_gear() {
        let mut shafts = ShaftSet::with_capacity(1);
        let mut tx = gearbox(&mut shafts);
        tx.shift(2);
        shafts[tx.shaft].set_ang_velocity(1000.0 * RPM_TO_RAD);
        assert_relative_eq!(tx.clutch_rpm(&shafts), 2200.0, epsilon = 1e-2);
    }
}
