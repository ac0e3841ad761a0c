use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, OnceLock,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tracing::{info, warn};

use pcpower_common::{
    ActuatorPins, Clock, LinkError, MessagingLink, PowerMonitor, RuntimeConfig, StatusLine,
    TemperatureProbe, TickOutcome,
};

const TICK_MS: u64 = 50;
const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut runtime = load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options =
        MqttOptions::new(runtime.network.client_id.clone(), mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let connected = Arc::new(AtomicBool::new(false));
    let (inbound_tx, inbound_rx) = mpsc::channel();
    spawn_mqtt_loop(eventloop, connected.clone(), inbound_tx);

    info!("controller starting with simulated machine and sensor");

    // The engine is synchronous and the default blocking reconnect may stall
    // it for minutes, so it runs on its own thread.
    tokio::task::spawn_blocking(move || control_loop(runtime, mqtt, connected, inbound_rx))
        .await
        .context("control loop thread panicked")?
}

fn spawn_mqtt_loop(
    mut eventloop: rumqttc::EventLoop,
    connected: Arc<AtomicBool>,
    inbound_tx: mpsc::Sender<(String, Vec<u8>)>,
) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    connected.store(true, Ordering::Relaxed);
                }
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if message.payload.len() > MAX_MQTT_PAYLOAD_BYTES {
                        warn!(
                            "dropping oversized MQTT payload on topic {} ({} bytes)",
                            message.topic,
                            message.payload.len()
                        );
                        continue;
                    }
                    let _ = inbound_tx.send((message.topic, message.payload.to_vec()));
                }
                Ok(_) => {}
                Err(err) => {
                    connected.store(false, Ordering::Relaxed);
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn control_loop(
    runtime: RuntimeConfig,
    mqtt: AsyncClient,
    connected: Arc<AtomicBool>,
    inbound: mpsc::Receiver<(String, Vec<u8>)>,
) -> anyhow::Result<()> {
    let mut platform = HostPlatform::new(&runtime, mqtt, connected);
    let mut monitor = PowerMonitor::new(&runtime);

    loop {
        // Inbound commands are drained here, never concurrently with a tick.
        while let Ok((topic, payload)) = inbound.try_recv() {
            monitor.handle_message(&topic, &payload, &mut platform);
        }

        if monitor.tick(&mut platform) == TickOutcome::RestartRequired {
            anyhow::bail!("messaging link unrecoverable, restart required");
        }

        thread::sleep(Duration::from_millis(TICK_MS));
    }
}

/// Host stand-in for the board: the MQTT session is real, the machine and
/// its sensor are simulated. Releasing a power pulse toggles the simulated
/// machine, like a front-panel momentary switch; reset leaves it running.
struct HostPlatform {
    mqtt: AsyncClient,
    connected: Arc<AtomicBool>,
    invert: bool,
    machine_on: bool,
    power_line_active: bool,
}

impl HostPlatform {
    fn new(runtime: &RuntimeConfig, mqtt: AsyncClient, connected: Arc<AtomicBool>) -> Self {
        Self {
            mqtt,
            connected,
            invert: runtime.monitor.invert_status_input,
            machine_on: false,
            power_line_active: false,
        }
    }
}

impl MessagingLink for HostPlatform {
    fn is_connected(&mut self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn connect(&mut self) -> Result<(), LinkError> {
        // rumqttc reconnects inside its own event loop; an attempt here just
        // observes whether the session came back yet.
        if self.is_connected() {
            Ok(())
        } else {
            Err(LinkError::NotConnected)
        }
    }

    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> Result<(), LinkError> {
        self.mqtt
            .try_publish(topic, QoS::AtLeastOnce, retain, payload)
            .map_err(|err| LinkError::Transport(err.to_string()))
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), LinkError> {
        self.mqtt
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|err| LinkError::Transport(err.to_string()))
    }
}

impl StatusLine for HostPlatform {
    fn read_raw(&mut self) -> bool {
        self.machine_on ^ self.invert
    }
}

impl TemperatureProbe for HostPlatform {
    fn read_celsius(&mut self) -> Option<f32> {
        // Slow staircase around room temperature.
        let phase = (monotonic_ms() / 30_000) % 8;
        Some(21.0 + phase as f32 * 0.2)
    }
}

impl ActuatorPins for HostPlatform {
    fn set_power_switch(&mut self, active: bool) {
        if self.power_line_active && !active {
            self.machine_on = !self.machine_on;
            info!(
                "simulated machine is now {}",
                if self.machine_on { "on" } else { "off" }
            );
        }
        self.power_line_active = active;
    }

    fn set_reset_switch(&mut self, active: bool) {
        if !active {
            info!("simulated machine reset");
        }
    }
}

impl Clock for HostPlatform {
    fn now_ms(&self) -> u64 {
        monotonic_ms()
    }

    fn sleep_ms(&self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}

fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let Some(path) = std::env::var_os("PCPOWER_CONFIG").map(PathBuf::from) else {
        return Ok(RuntimeConfig::default());
    };
    let raw = std::fs::read(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_slice(&raw).context("failed to parse config file")
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
