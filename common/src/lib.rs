pub mod command;
pub mod config;
pub mod connection;
pub mod debounce;
pub mod io;
pub mod monitor;
pub mod publish;
pub mod pulse;
pub mod temperature;
pub mod topics;
pub mod types;

pub use command::CommandDispatcher;
pub use config::{
    ActuatorConfig, ConnectionConfig, MonitorConfig, NetworkConfig, RuntimeConfig, TopicConfig,
};
pub use connection::{ConnectionManager, ConnectionOutcome};
pub use debounce::InputDebouncer;
pub use io::{ActuatorPins, Clock, LinkError, MessagingLink, Platform, StatusLine, TemperatureProbe};
pub use monitor::{PowerMonitor, TickOutcome};
pub use publish::{Publication, PublishScheduler};
pub use pulse::PulseDriver;
pub use temperature::TemperaturePoller;
pub use topics::*;
pub use types::{ActuatorLine, Command, PublishCategory, Temperature};
