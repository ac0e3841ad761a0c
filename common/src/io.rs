//! Port traits between the control engine and the outside world. The
//! controller binary provides the real implementations (MQTT session, GPIO,
//! DHT sensor); tests provide mocks.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link is not connected")]
    NotConnected,
    #[error("connect attempt failed: {0}")]
    ConnectFailed(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Publish/subscribe messaging channel. `connect` performs a single attempt;
/// retry pacing and the hard-timeout decision live in
/// [`ConnectionManager`](crate::connection::ConnectionManager).
pub trait MessagingLink {
    fn is_connected(&mut self) -> bool;
    fn connect(&mut self) -> Result<(), LinkError>;
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> Result<(), LinkError>;
    fn subscribe(&mut self, topic: &str) -> Result<(), LinkError>;
}

/// Raw digital sample of the machine's power status line. Polarity handling
/// belongs to the debouncer, not the implementation.
pub trait StatusLine {
    fn read_raw(&mut self) -> bool;
}

/// Poll-and-return temperature primitive. `None` means the sensor did not
/// answer; range validation happens in the poller.
pub trait TemperatureProbe {
    fn read_celsius(&mut self) -> Option<f32>;
}

pub trait ActuatorPins {
    fn set_power_switch(&mut self, active: bool);
    fn set_reset_switch(&mut self, active: bool);
}

/// Monotonic milliseconds since an arbitrary epoch. `sleep_ms` is only used
/// by the blocking reconnect mode.
pub trait Clock {
    fn now_ms(&self) -> u64;
    fn sleep_ms(&self, ms: u64);
}

pub trait Platform:
    MessagingLink + StatusLine + TemperatureProbe + ActuatorPins + Clock
{
}

impl<T> Platform for T where
    T: MessagingLink + StatusLine + TemperatureProbe + ActuatorPins + Clock
{
}
