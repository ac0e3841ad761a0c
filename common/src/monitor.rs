use log::{info, warn};

use crate::{
    command::CommandDispatcher,
    config::{RuntimeConfig, TopicConfig},
    connection::{ConnectionManager, ConnectionOutcome},
    debounce::InputDebouncer,
    io::{ActuatorPins, Clock, LinkError, MessagingLink, Platform},
    publish::{Publication, PublishScheduler},
    pulse::PulseDriver,
    temperature::TemperaturePoller,
    types::{round_whole_degrees, status_payload, Temperature},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Normal,
    /// The messaging link could not be recovered within the hard timeout.
    /// The platform must perform an unconditional device restart.
    RestartRequired,
}

/// The device state engine: owns every component of the control core and
/// advances them once per tick.
///
/// One tick services the connection (reconnect dominates), drives any active
/// actuator pulse, polls the temperature, debounces the status line, and
/// then runs the publish ladder. Inbound command messages are handed to
/// [`handle_message`](Self::handle_message) by the platform's drain loop,
/// never concurrently with a tick.
pub struct PowerMonitor {
    topics: TopicConfig,
    debouncer: InputDebouncer,
    poller: TemperaturePoller,
    scheduler: PublishScheduler,
    connection: ConnectionManager,
    dispatcher: CommandDispatcher,
    pulser: PulseDriver,
    status: Option<bool>,
    sync_pending: bool,
}

impl PowerMonitor {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            topics: config.topics.clone(),
            debouncer: InputDebouncer::new(
                config.monitor.debounce_ms,
                config.monitor.invert_status_input,
            ),
            poller: TemperaturePoller::new(&config.monitor),
            scheduler: PublishScheduler::new(&config.monitor),
            connection: ConnectionManager::new(
                config.connection.clone(),
                config.network.client_id.clone(),
                config.topics.clone(),
            ),
            dispatcher: CommandDispatcher::new(&config.topics),
            pulser: PulseDriver::new(config.actuator.clone()),
            status: None,
            sync_pending: false,
        }
    }

    /// Debounced machine status; `None` until the line has settled once.
    pub fn status(&self) -> Option<bool> {
        self.status
    }

    pub fn temperature(&self) -> Temperature {
        self.poller.current()
    }

    pub fn tick<P: Platform>(&mut self, platform: &mut P) -> TickOutcome {
        match self.connection.ensure_connected(platform) {
            ConnectionOutcome::FatalTimeout => return TickOutcome::RestartRequired,
            ConnectionOutcome::Recovered { .. } => {
                self.sync_pending = true;
                self.resync_clocks(platform.now_ms());
            }
            ConnectionOutcome::Established { .. } => {
                self.resync_clocks(platform.now_ms());
            }
            ConnectionOutcome::AlreadyConnected | ConnectionOutcome::Pending => {}
        }

        let now_ms = platform.now_ms();
        self.pulser.tick(now_ms, platform);
        self.poller.tick(now_ms, platform);

        let raw = platform.read_raw();
        if let Some(status) = self.debouncer.feed(raw, now_ms) {
            info!("machine status settled to {}", status_payload(status));
            self.status = Some(status);
        }

        let plan = self
            .scheduler
            .plan(self.status, self.poller.current(), self.sync_pending, now_ms);
        if let Some(publication) = plan {
            match self.send(&publication, platform) {
                Ok(()) => {
                    if matches!(publication, Publication::Sync { .. }) {
                        self.sync_pending = false;
                    }
                    self.scheduler.commit(&publication, now_ms);
                }
                Err(err) => warn!("publish failed, will retry: {err}"),
            }
        }

        TickOutcome::Normal
    }

    /// Validate one inbound message and arm the resulting actuator pulse, if
    /// any. Invoked by the platform for every message drained during a tick.
    pub fn handle_message<P>(&mut self, topic: &str, payload: &[u8], platform: &mut P)
    where
        P: ActuatorPins + Clock,
    {
        let Some(command) = self.dispatcher.handle(topic, payload, self.status) else {
            return;
        };
        let now_ms = platform.now_ms();
        self.pulser.apply(command, now_ms, platform);
    }

    fn send<L: MessagingLink>(
        &self,
        publication: &Publication,
        link: &mut L,
    ) -> Result<(), LinkError> {
        let (topic, payload) = match *publication {
            Publication::Status { on, .. } => (
                self.topics.power_status.as_str(),
                status_payload(on).to_string(),
            ),
            Publication::Temperature { celsius, .. } => (
                self.topics.temperature.as_str(),
                round_whole_degrees(celsius).to_string(),
            ),
            Publication::Sync { count } => {
                (self.topics.connection.as_str(), format!("Synced({count})"))
            }
        };
        info!("publishing {topic} {payload}");
        link.publish(topic, &payload, true)
    }

    // After a (re)connect the announcement publish just went out and any
    // time spent blocked says nothing about the input line: restart both
    // the throttle window and the debounce window.
    fn resync_clocks(&mut self, now_ms: u64) {
        self.scheduler.reset_interval(now_ms);
        self.debouncer.restart_window(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, MonitorConfig};
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    struct TestPlatform {
        connected: bool,
        fail_attempts: u32,
        raw_status: bool,
        celsius: Option<f32>,
        published: Vec<(String, String)>,
        power_pin: Vec<bool>,
        reset_pin: Vec<bool>,
        now: Cell<u64>,
    }

    impl TestPlatform {
        fn new() -> Self {
            Self {
                connected: true,
                fail_attempts: 0,
                raw_status: false,
                celsius: None,
                published: Vec::new(),
                power_pin: Vec::new(),
                reset_pin: Vec::new(),
                now: Cell::new(0),
            }
        }
    }

    impl MessagingLink for TestPlatform {
        fn is_connected(&mut self) -> bool {
            self.connected
        }

        fn connect(&mut self) -> Result<(), LinkError> {
            if self.fail_attempts > 0 {
                self.fail_attempts -= 1;
                return Err(LinkError::ConnectFailed("broker unreachable".into()));
            }
            self.connected = true;
            Ok(())
        }

        fn publish(&mut self, topic: &str, payload: &str, _retain: bool) -> Result<(), LinkError> {
            if !self.connected {
                return Err(LinkError::NotConnected);
            }
            self.published.push((topic.to_string(), payload.to_string()));
            Ok(())
        }

        fn subscribe(&mut self, _topic: &str) -> Result<(), LinkError> {
            Ok(())
        }
    }

    impl crate::io::StatusLine for TestPlatform {
        fn read_raw(&mut self) -> bool {
            self.raw_status
        }
    }

    impl crate::io::TemperatureProbe for TestPlatform {
        fn read_celsius(&mut self) -> Option<f32> {
            self.celsius
        }
    }

    impl ActuatorPins for TestPlatform {
        fn set_power_switch(&mut self, active: bool) {
            self.power_pin.push(active);
        }

        fn set_reset_switch(&mut self, active: bool) {
            self.reset_pin.push(active);
        }
    }

    impl Clock for TestPlatform {
        fn now_ms(&self) -> u64 {
            self.now.get()
        }

        fn sleep_ms(&self, ms: u64) {
            self.now.set(self.now.get() + ms);
        }
    }

    fn config() -> RuntimeConfig {
        RuntimeConfig {
            monitor: MonitorConfig {
                debounce_ms: 300,
                temp_poll_ms: 1_000,
                min_publish_ms: 1_000,
                periodic_publish_ms: 60_000,
                ..MonitorConfig::default()
            },
            connection: ConnectionConfig {
                retry_delay_ms: 5_000,
                hard_timeout_ms: 120_000,
                blocking_reconnect: true,
            },
            ..RuntimeConfig::default()
        }
    }

    fn tick_at(monitor: &mut PowerMonitor, platform: &mut TestPlatform, now_ms: u64) -> TickOutcome {
        platform.now.set(now_ms);
        monitor.tick(platform)
    }

    #[test]
    fn settled_status_is_published_after_the_throttle_window() {
        let mut platform = TestPlatform::new();
        platform.raw_status = true;
        let mut monitor = PowerMonitor::new(&config());

        tick_at(&mut monitor, &mut platform, 0);
        assert_eq!(
            platform.published,
            vec![("pcpower/connection".to_string(), "pcpower-controller".to_string())]
        );

        // Line settles at 300 ms, but the interval clock started at connect.
        tick_at(&mut monitor, &mut platform, 300);
        assert_eq!(monitor.status(), Some(true));
        assert_eq!(platform.published.len(), 1);

        tick_at(&mut monitor, &mut platform, 1_000);
        assert_eq!(
            platform.published[1],
            ("pcpower/pc/status".to_string(), "1".to_string())
        );
    }

    #[test]
    fn temperature_is_published_rounded() {
        let mut platform = TestPlatform::new();
        platform.raw_status = true;
        platform.celsius = Some(20.6);
        let mut monitor = PowerMonitor::new(&config());

        tick_at(&mut monitor, &mut platform, 0);
        tick_at(&mut monitor, &mut platform, 300);
        tick_at(&mut monitor, &mut platform, 1_000); // status first
        tick_at(&mut monitor, &mut platform, 2_000);

        assert_eq!(
            platform.published[2],
            ("pcpower/pc/temperature".to_string(), "21".to_string())
        );
        assert_eq!(monitor.temperature(), Temperature::Celsius(20.6));
    }

    #[test]
    fn reconnects_publish_counting_sync_announcements() {
        let mut platform = TestPlatform::new();
        platform.raw_status = false;
        let mut monitor = PowerMonitor::new(&config());

        tick_at(&mut monitor, &mut platform, 0);
        tick_at(&mut monitor, &mut platform, 300);
        tick_at(&mut monitor, &mut platform, 1_000); // status "0"
        platform.published.clear();

        // First loss: recovery succeeds on the first attempt.
        platform.connected = false;
        tick_at(&mut monitor, &mut platform, 2_000);
        assert_eq!(
            platform.published,
            vec![("pcpower/connection".to_string(), "pcpower-controller".to_string())]
        );

        tick_at(&mut monitor, &mut platform, 3_000);
        assert_eq!(
            platform.published[1],
            ("pcpower/connection".to_string(), "Synced(1)".to_string())
        );

        // Second loss needs two retries; the counter keeps climbing.
        platform.connected = false;
        platform.fail_attempts = 2;
        tick_at(&mut monitor, &mut platform, 10_000);
        let after_recovery = platform.now.get();
        tick_at(&mut monitor, &mut platform, after_recovery + 1_000);
        assert_eq!(
            platform.published.last(),
            Some(&("pcpower/connection".to_string(), "Synced(2)".to_string()))
        );
    }

    #[test]
    fn unrecoverable_link_requests_a_restart() {
        let mut platform = TestPlatform::new();
        platform.connected = false;
        platform.fail_attempts = u32::MAX;
        let mut monitor = PowerMonitor::new(&config());

        assert_eq!(
            tick_at(&mut monitor, &mut platform, 0),
            TickOutcome::RestartRequired
        );
        assert!(platform.now.get() >= 120_000);
    }

    #[test]
    fn inbound_power_command_pulses_the_power_line() {
        let mut platform = TestPlatform::new();
        platform.raw_status = true;
        let mut monitor = PowerMonitor::new(&config());

        tick_at(&mut monitor, &mut platform, 0);
        tick_at(&mut monitor, &mut platform, 300);
        assert_eq!(monitor.status(), Some(true));

        // Already on: "t" is suppressed.
        monitor.handle_message("pcpower/cmnd/pc/power", b"t", &mut platform);
        assert!(platform.power_pin.is_empty());

        // "f" arms the long-press pulse and a later tick releases it.
        monitor.handle_message("pcpower/cmnd/pc/power", b"f", &mut platform);
        assert_eq!(platform.power_pin, vec![true]);

        tick_at(&mut monitor, &mut platform, 300 + 5_000);
        assert_eq!(platform.power_pin, vec![true, false]);
    }

    #[test]
    fn reset_command_is_refused_while_off() {
        let mut platform = TestPlatform::new();
        platform.raw_status = false;
        let mut monitor = PowerMonitor::new(&config());

        tick_at(&mut monitor, &mut platform, 0);
        tick_at(&mut monitor, &mut platform, 300);
        assert_eq!(monitor.status(), Some(false));

        monitor.handle_message("pcpower/cmnd/pc/reset", b"t", &mut platform);
        assert!(platform.reset_pin.is_empty());

        platform.raw_status = true;
        tick_at(&mut monitor, &mut platform, 301);
        tick_at(&mut monitor, &mut platform, 601);
        assert_eq!(monitor.status(), Some(true));

        monitor.handle_message("pcpower/cmnd/pc/reset", b"t", &mut platform);
        assert_eq!(platform.reset_pin, vec![true]);
    }
}
