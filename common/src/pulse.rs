use log::{info, warn};

use crate::{
    config::ActuatorConfig,
    io::ActuatorPins,
    types::{ActuatorLine, Command},
};

#[derive(Debug, Clone, Copy)]
struct ActivePulse {
    line: ActuatorLine,
    release_at_ms: u64,
}

/// Turns commands into single timed pulses on the actuator lines.
///
/// A pulse is armed at T and released at T + width on a later tick; there is
/// no blocking sleep. While a pulse is active no other command is accepted;
/// pulses are short and commands are rare, so refusal is the whole conflict
/// policy.
#[derive(Debug)]
pub struct PulseDriver {
    config: ActuatorConfig,
    active: Option<ActivePulse>,
}

impl PulseDriver {
    pub fn new(config: ActuatorConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Arm the pulse for `command`. Returns false if an earlier pulse is
    /// still being held.
    pub fn apply<P: ActuatorPins>(&mut self, command: Command, now_ms: u64, pins: &mut P) -> bool {
        if self.active.is_some() {
            warn!("actuator busy, dropping {command:?}");
            return false;
        }

        let (line, width_ms) = match command {
            Command::SetPower(true) => (ActuatorLine::PowerSwitch, self.config.power_tap_ms),
            // Powering off simulates the long-press forced shutdown.
            Command::SetPower(false) => (ActuatorLine::PowerSwitch, self.config.power_hold_ms),
            Command::Reset => (ActuatorLine::ResetSwitch, self.config.reset_pulse_ms),
        };

        drive(pins, line, true);
        self.active = Some(ActivePulse {
            line,
            release_at_ms: now_ms + width_ms,
        });
        info!("pulsing {line:?} for {width_ms} ms");
        true
    }

    /// Release any pulse whose width has elapsed.
    pub fn tick<P: ActuatorPins>(&mut self, now_ms: u64, pins: &mut P) {
        if let Some(pulse) = self.active {
            if now_ms >= pulse.release_at_ms {
                drive(pins, pulse.line, false);
                self.active = None;
                info!("released {:?}", pulse.line);
            }
        }
    }
}

fn drive<P: ActuatorPins>(pins: &mut P, line: ActuatorLine, active: bool) {
    match line {
        ActuatorLine::PowerSwitch => pins.set_power_switch(active),
        ActuatorLine::ResetSwitch => pins.set_reset_switch(active),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordedPins {
        power: Vec<bool>,
        reset: Vec<bool>,
    }

    impl ActuatorPins for RecordedPins {
        fn set_power_switch(&mut self, active: bool) {
            self.power.push(active);
        }

        fn set_reset_switch(&mut self, active: bool) {
            self.reset.push(active);
        }
    }

    fn driver() -> PulseDriver {
        PulseDriver::new(ActuatorConfig {
            power_tap_ms: 500,
            power_hold_ms: 5_000,
            reset_pulse_ms: 400,
        })
    }

    #[test]
    fn power_on_tap_releases_after_short_width() {
        let mut driver = driver();
        let mut pins = RecordedPins::default();

        assert!(driver.apply(Command::SetPower(true), 0, &mut pins));
        assert!(driver.is_busy());
        assert_eq!(pins.power, vec![true]);

        driver.tick(499, &mut pins);
        assert!(driver.is_busy());

        driver.tick(500, &mut pins);
        assert!(!driver.is_busy());
        assert_eq!(pins.power, vec![true, false]);
        assert!(pins.reset.is_empty());
    }

    #[test]
    fn power_off_holds_for_the_long_width() {
        let mut driver = driver();
        let mut pins = RecordedPins::default();

        driver.apply(Command::SetPower(false), 0, &mut pins);
        driver.tick(4_999, &mut pins);
        assert_eq!(pins.power, vec![true]);

        driver.tick(5_000, &mut pins);
        assert_eq!(pins.power, vec![true, false]);
    }

    #[test]
    fn reset_pulses_the_reset_line() {
        let mut driver = driver();
        let mut pins = RecordedPins::default();

        driver.apply(Command::Reset, 100, &mut pins);
        driver.tick(500, &mut pins);

        assert_eq!(pins.reset, vec![true, false]);
        assert!(pins.power.is_empty());
    }

    #[test]
    fn active_pulse_refuses_new_commands() {
        let mut driver = driver();
        let mut pins = RecordedPins::default();

        assert!(driver.apply(Command::SetPower(true), 0, &mut pins));
        assert!(!driver.apply(Command::Reset, 100, &mut pins));
        assert!(pins.reset.is_empty());

        driver.tick(500, &mut pins);
        assert!(driver.apply(Command::Reset, 600, &mut pins));
    }
}
