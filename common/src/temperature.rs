use log::warn;

use crate::{config::MonitorConfig, io::TemperatureProbe, types::Temperature};

/// Issues periodic, non-blocking temperature refresh requests and holds the
/// latest reading. The caller always gets the previous reading back while a
/// conversion is pending; there is no wait for the sensor.
#[derive(Debug, Clone)]
pub struct TemperaturePoller {
    poll_interval_ms: u64,
    min_valid_c: f32,
    max_valid_c: f32,
    last_request_ms: Option<u64>,
    reading: Temperature,
}

impl TemperaturePoller {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            poll_interval_ms: config.temp_poll_ms,
            min_valid_c: config.min_valid_temp_c,
            max_valid_c: config.max_valid_temp_c,
            last_request_ms: None,
            reading: Temperature::NotReady,
        }
    }

    pub fn current(&self) -> Temperature {
        self.reading
    }

    pub fn tick<P: TemperatureProbe>(&mut self, now_ms: u64, probe: &mut P) {
        let due = match self.last_request_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.poll_interval_ms,
        };
        if !due {
            return;
        }

        self.last_request_ms = Some(now_ms);
        self.reading = match probe.read_celsius() {
            Some(celsius)
                if celsius.is_finite()
                    && (self.min_valid_c..=self.max_valid_c).contains(&celsius) =>
            {
                Temperature::Celsius(celsius)
            }
            Some(celsius) => {
                warn!("discarding implausible temperature reading {celsius:.1}");
                Temperature::NotReady
            }
            None => {
                warn!("temperature sensor did not answer");
                Temperature::NotReady
            }
        };
    }
}
