use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use dht_sensor::dht11;
use embedded_svc::{
    mqtt::client::QoS,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::Ets,
    gpio::{
        AnyIOPin, AnyInputPin, AnyOutputPin, IOPin, Input, InputOutput, InputPin, Output,
        OutputPin, PinDriver, Pull,
    },
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    log::EspLogger,
    mqtt::client::{
        Details, EspMqttClient, EspMqttConnection, EventPayload, MqttClientConfiguration,
    },
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};

use pcpower_common::{
    config::NetworkConfig, ActuatorPins, Clock, LinkError, MessagingLink, PowerMonitor,
    RuntimeConfig, StatusLine, TemperatureProbe, TickOutcome,
};

const TICK_MS: u64 = 50;
const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let mut runtime = RuntimeConfig::default();
    apply_build_time_network(&mut runtime.network);
    runtime.sanitize();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let peripherals = Peripherals::take()?;

    let wifi = connect_wifi(
        peripherals.modem,
        sys_loop,
        nvs_partition,
        &runtime.network,
    )
    .context("wifi startup failed")?;

    let connected = Arc::new(AtomicBool::new(false));
    let (inbound_tx, inbound_rx) = mpsc::channel();
    let (mqtt, mqtt_conn) = create_mqtt_client(&runtime.network)?;
    spawn_mqtt_receiver(mqtt_conn, connected.clone(), inbound_tx);

    // Wiring on the lolin32 carrier board: GPIO34 taps the machine's power
    // LED, GPIO25/GPIO26 drive the optocouplers across the front-panel
    // switch headers, GPIO16 is the DHT11 data line with its pull-up.
    let status_pin = PinDriver::input(peripherals.pins.gpio34.downgrade_input())?;
    let mut power_pin = PinDriver::output(peripherals.pins.gpio25.downgrade_output())?;
    let mut reset_pin = PinDriver::output(peripherals.pins.gpio26.downgrade_output())?;
    power_pin.set_low()?;
    reset_pin.set_low()?;
    let mut dht_pin = PinDriver::input_output_od(peripherals.pins.gpio16.downgrade())?;
    dht_pin.set_pull(Pull::Up)?;
    dht_pin.set_high()?;

    let mut platform = EspPlatform {
        mqtt,
        connected,
        status_pin,
        power_pin,
        reset_pin,
        dht_pin,
        delay: Ets,
        started: Instant::now(),
    };
    let mut monitor = PowerMonitor::new(&runtime);

    // Keep the station alive for the program lifetime.
    let _wifi = wifi;

    loop {
        // Inbound commands are drained here, never concurrently with a tick.
        while let Ok((topic, payload)) = inbound_rx.try_recv() {
            monitor.handle_message(&topic, &payload, &mut platform);
        }

        if monitor.tick(&mut platform) == TickOutcome::RestartRequired {
            warn!("messaging link unrecoverable, restarting device");
            thread::sleep(Duration::from_millis(100));
            unsafe { esp_idf_svc::sys::esp_restart() };
        }

        thread::sleep(Duration::from_millis(TICK_MS));
    }
}

// Credentials are baked in at build time, NVS provisioning is out of scope
// for this controller.
fn apply_build_time_network(network: &mut NetworkConfig) {
    if let Some(ssid) = option_env!("PCPOWER_WIFI_SSID") {
        network.wifi_ssid = ssid.to_string();
    }
    if let Some(pass) = option_env!("PCPOWER_WIFI_PASS") {
        network.wifi_pass = pass.to_string();
    }
    if let Some(host) = option_env!("PCPOWER_MQTT_HOST") {
        network.mqtt_host = host.to_string();
    }
    if let Some(port) = option_env!("PCPOWER_MQTT_PORT").and_then(|raw| raw.parse::<u16>().ok()) {
        network.mqtt_port = port;
    }
    if let Some(user) = option_env!("PCPOWER_MQTT_USER") {
        network.mqtt_user = user.to_string();
    }
    if let Some(pass) = option_env!("PCPOWER_MQTT_PASS") {
        network.mqtt_pass = pass.to_string();
    }
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let mut last_err = None;
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected on attempt {attempt}");
                last_err = None;
                break;
            }
            Err(err) => {
                warn!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS} failed: {err:#}");
                last_err = Some(err);
                let _ = wifi.disconnect();
                thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
            }
        }
    }

    match last_err {
        None => Ok(esp_wifi),
        Some(err) => Err(anyhow::Error::from(err).context("all wifi connect attempts failed")),
    }
}

fn create_mqtt_client(
    network: &NetworkConfig,
) -> anyhow::Result<(EspMqttClient<'static>, EspMqttConnection)> {
    let url = format!("mqtt://{}:{}", network.mqtt_host, network.mqtt_port);

    let conf = MqttClientConfiguration {
        client_id: Some(network.client_id.as_str()),
        username: if network.mqtt_user.is_empty() {
            None
        } else {
            Some(network.mqtt_user.as_str())
        },
        password: if network.mqtt_pass.is_empty() {
            None
        } else {
            Some(network.mqtt_pass.as_str())
        },
        ..Default::default()
    };

    Ok(EspMqttClient::new(url.as_str(), &conf)?)
}

fn spawn_mqtt_receiver(
    mut conn: EspMqttConnection,
    connected: Arc<AtomicBool>,
    inbound_tx: mpsc::Sender<(String, Vec<u8>)>,
) {
    thread::Builder::new()
        .name("mqtt-rx".into())
        .stack_size(8 * 1024)
        .spawn(move || loop {
            match conn.next() {
                Ok(event) => match event.payload() {
                    EventPayload::Connected(_) => {
                        info!("mqtt connected");
                        connected.store(true, Ordering::Relaxed);
                    }
                    EventPayload::Disconnected => {
                        warn!("mqtt disconnected");
                        connected.store(false, Ordering::Relaxed);
                    }
                    EventPayload::Received {
                        topic: Some(topic),
                        data,
                        details,
                        ..
                    } => {
                        // We only process full MQTT payloads.
                        if !matches!(details, Details::Complete) {
                            continue;
                        }
                        if data.len() > MAX_MQTT_PAYLOAD_BYTES {
                            warn!(
                                "dropping oversized MQTT payload on topic {} ({} bytes)",
                                topic,
                                data.len()
                            );
                            continue;
                        }
                        let _ = inbound_tx.send((topic.to_string(), data.to_vec()));
                    }
                    _ => {}
                },
                Err(err) => {
                    connected.store(false, Ordering::Relaxed);
                    warn!("mqtt receive loop error: {err:?}");
                    thread::sleep(Duration::from_secs(2));
                }
            }
        })
        .expect("failed to spawn mqtt receiver thread");
}

struct EspPlatform {
    mqtt: EspMqttClient<'static>,
    connected: Arc<AtomicBool>,
    status_pin: PinDriver<'static, AnyInputPin, Input>,
    power_pin: PinDriver<'static, AnyOutputPin, Output>,
    reset_pin: PinDriver<'static, AnyOutputPin, Output>,
    dht_pin: PinDriver<'static, AnyIOPin, InputOutput>,
    delay: Ets,
    started: Instant,
}

impl MessagingLink for EspPlatform {
    fn is_connected(&mut self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn connect(&mut self) -> Result<(), LinkError> {
        // The ESP-IDF client reconnects on its own; an attempt here just
        // observes whether the session came back yet.
        if self.is_connected() {
            Ok(())
        } else {
            Err(LinkError::NotConnected)
        }
    }

    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> Result<(), LinkError> {
        self.mqtt
            .publish(topic, QoS::AtLeastOnce, retain, payload.as_bytes())
            .map(|_| ())
            .map_err(|err| LinkError::Transport(err.to_string()))
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), LinkError> {
        self.mqtt
            .subscribe(topic, QoS::AtMostOnce)
            .map(|_| ())
            .map_err(|err| LinkError::Transport(err.to_string()))
    }
}

impl StatusLine for EspPlatform {
    fn read_raw(&mut self) -> bool {
        self.status_pin.is_high()
    }
}

impl TemperatureProbe for EspPlatform {
    fn read_celsius(&mut self) -> Option<f32> {
        if let Err(err) = self.dht_pin.set_high() {
            warn!("failed to set DHT11 line high before read: {err:?}");
            return None;
        }

        match dht11::blocking::read(&mut self.delay, &mut self.dht_pin) {
            Ok(reading) => Some(f32::from(reading.temperature)),
            Err(err) => {
                warn!("failed to read DHT11 temperature: {err:?}");
                None
            }
        }
    }
}

impl ActuatorPins for EspPlatform {
    fn set_power_switch(&mut self, active: bool) {
        let result = if active {
            self.power_pin.set_high()
        } else {
            self.power_pin.set_low()
        };
        if let Err(err) = result {
            warn!("power switch line write failed: {err}");
        }
    }

    fn set_reset_switch(&mut self, active: bool) {
        let result = if active {
            self.reset_pin.set_high()
        } else {
            self.reset_pin.set_low()
        };
        if let Err(err) = result {
            warn!("reset switch line write failed: {err}");
        }
    }
}

impl Clock for EspPlatform {
    fn now_ms(&self) -> u64 {
        self.started
            .elapsed()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }

    fn sleep_ms(&self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}
