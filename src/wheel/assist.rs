//! Per-wheel slip-control policies (ABS / TCS).
//!
//! The solver core only consumes the decision: a scale on the wheel's brake
//! torque and a scale on the driveline demand. What triggers them is a
//! pluggable strategy so gameplay code can swap in its own feel.

/// Wheel state sampled once per tick, before the relaxation passes.
#[derive(Copy, Clone, Debug)]
pub struct AssistInput {
    /// Brake torque is being demanded on this wheel.
    pub braking: bool,
    /// Driver throttle on the engine, 0..1.
    pub throttle: f32,
    /// Slip ratio from the tire's last force query.
    pub slide: f32,
    /// Slip ratio at peak longitudinal force.
    pub ideal_slide: f32,
    /// Contact-point ground speed along wheel forward (m/s).
    pub ground_speed: f32,
}

#[derive(Copy, Clone, Debug)]
pub struct AssistDecision {
    pub abs_active: bool,
    /// Multiplier on the wheel's brake torque this tick.
    pub brake_scale: f32,
    pub tcs_active: bool,
    /// Multiplier on the driveline torque demand this tick.
    pub drive_scale: f32,
}

impl AssistDecision {
    pub fn passthrough() -> Self {
        Self {
            abs_active: false,
            brake_scale: 1.0,
            tcs_active: false,
            drive_scale: 1.0,
        }
    }
}

pub trait WheelAssist: Send {
    fn evaluate(&mut self, input: &AssistInput) -> AssistDecision;
}

/// Default policy: intervene once slip passes a fraction of the tire's
/// ideal slip, scaling demand back toward the ideal point.
pub struct SlipThreshold {
    /// Trigger as a fraction of ideal slide; 0.85-1.0 typical.
    pub trigger: f32,
    /// Ground speed below which ABS releases (m/s).
    pub min_speed: f32,
}

impl Default for SlipThreshold {
    fn default() -> Self {
        Self {
            trigger: 0.9,
            min_speed: 1.0,
        }
    }
}

impl WheelAssist for SlipThreshold {
    fn evaluate(&mut self, input: &AssistInput) -> AssistDecision {
        let mut decision = AssistDecision::passthrough();
        let threshold = input.ideal_slide * self.trigger;

        // locking: wheel turning slower than the ground while braking
        if input.braking
            && input.ground_speed.abs() > self.min_speed
            && input.slide < -threshold
        {
            decision.abs_active = true;
            decision.brake_scale = (threshold / input.slide.abs()).clamp(0.0, 1.0);
        }

        // spinning up under power
        if input.throttle > 0.01 && input.slide > threshold {
            decision.tcs_active = true;
            decision.drive_scale = (threshold / input.slide).clamp(0.0, 1.0);
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(braking: bool, throttle: f32, slide: f32) -> AssistInput {
        AssistInput {
            braking,
            throttle,
            slide,
            ideal_slide: 0.12,
            ground_speed: 15.0,
        }
    }

    #[test]
    fn no_intervention_inside_ideal_slip() {
        let mut policy = SlipThreshold::default();
        let d = policy.evaluate(&input(true, 0.0, -0.05));
        assert!(!d.abs_active && !d.tcs_active);
        assert_eq!(d.brake_scale, 1.0);
    }

    #[test]
    fn abs_releases_brake_on_lockup() {
        let mut policy = SlipThreshold::default();
        let d = policy.evaluate(&input(true, 0.0, -0.5));
        assert!(d.abs_active);
        assert!(d.brake_scale < 1.0);
        assert!(d.brake_scale > 0.0);
    }

    #[test]
    fn abs_stays_quiet_near_standstill() {
        let mut policy = SlipThreshold::default();
        let mut i = input(true, 0.0, -0.5);
        i.ground_speed = 0.2;
        assert!(!policy.evaluate(&i).abs_active);
    }

    #[test]
    fn tcs_scales_back_wheelspin() {
        let mut policy = SlipThreshold::default();
        let d = policy.evaluate(&input(false, 1.0, 0.4));
        assert!(d.tcs_active);
        assert!(d.drive_scale < 1.0);
    }
}
