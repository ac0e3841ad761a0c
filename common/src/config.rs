use serde::{Deserialize, Serialize};

use crate::topics::{
    TOPIC_CMD_POWER, TOPIC_CMD_RESET, TOPIC_CONNECTION_STATUS, TOPIC_PC_STATUS,
    TOPIC_PC_TEMPERATURE,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub debounce_ms: u64,
    pub temp_poll_ms: u64,
    pub min_publish_ms: u64,
    pub periodic_publish_ms: u64,
    pub temp_threshold_c: f32,
    pub min_valid_temp_c: f32,
    pub max_valid_temp_c: f32,
    pub invert_status_input: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            temp_poll_ms: 10_000,
            min_publish_ms: 1_000,
            periodic_publish_ms: 60_000,
            temp_threshold_c: 0.5,
            min_valid_temp_c: -40.0,
            max_valid_temp_c: 85.0,
            invert_status_input: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub retry_delay_ms: u64,
    pub hard_timeout_ms: u64,
    /// Blocking recovery stalls the whole tick until the link is back or the
    /// hard timeout fires. Non-blocking keeps debounce and publishing alive
    /// during an outage.
    pub blocking_reconnect: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 5_000,
            hard_timeout_ms: 120_000,
            blocking_reconnect: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    /// Short tap on the power switch line, enough to power the machine on.
    pub power_tap_ms: u64,
    /// Long hold on the same line, the simulated long-press forcing shutdown.
    pub power_hold_ms: u64,
    pub reset_pulse_ms: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            power_tap_ms: 500,
            power_hold_ms: 5_000,
            reset_pulse_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub client_id: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            client_id: "pcpower-controller".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    pub connection: String,
    pub power_status: String,
    pub temperature: String,
    pub power_command: String,
    pub reset_command: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            connection: TOPIC_CONNECTION_STATUS.to_string(),
            power_status: TOPIC_PC_STATUS.to_string(),
            temperature: TOPIC_PC_TEMPERATURE.to_string(),
            power_command: TOPIC_CMD_POWER.to_string(),
            reset_command: TOPIC_CMD_RESET.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub monitor: MonitorConfig,
    pub connection: ConnectionConfig,
    pub actuator: ActuatorConfig,
    pub network: NetworkConfig,
    #[serde(default)]
    pub topics: TopicConfig,
}

impl MonitorConfig {
    pub fn sanitize(&mut self) {
        self.debounce_ms = self.debounce_ms.clamp(10, 10_000);
        self.temp_poll_ms = self.temp_poll_ms.clamp(500, 600_000);
        self.min_publish_ms = self.min_publish_ms.clamp(100, 60_000);
        // The periodic keepalive cannot be tighter than the global throttle.
        self.periodic_publish_ms = self
            .periodic_publish_ms
            .clamp(self.min_publish_ms, 3_600_000);
        if !self.temp_threshold_c.is_finite() {
            self.temp_threshold_c = 0.5;
        }
        self.temp_threshold_c = self.temp_threshold_c.clamp(0.1, 20.0);
        if self.min_valid_temp_c >= self.max_valid_temp_c {
            self.min_valid_temp_c = -40.0;
            self.max_valid_temp_c = 85.0;
        }
    }
}

impl ConnectionConfig {
    pub fn sanitize(&mut self) {
        self.retry_delay_ms = self.retry_delay_ms.clamp(100, 60_000);
        self.hard_timeout_ms = self.hard_timeout_ms.clamp(self.retry_delay_ms, 3_600_000);
    }
}

impl ActuatorConfig {
    pub fn sanitize(&mut self) {
        self.power_tap_ms = self.power_tap_ms.clamp(50, 2_000);
        self.power_hold_ms = self.power_hold_ms.clamp(self.power_tap_ms, 15_000);
        self.reset_pulse_ms = self.reset_pulse_ms.clamp(50, 2_000);
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.monitor.sanitize();
        self.connection.sanitize();
        self.actuator.sanitize();
        if self.network.client_id.trim().is_empty() {
            self.network.client_id = NetworkConfig::default().client_id;
        }
    }
}
