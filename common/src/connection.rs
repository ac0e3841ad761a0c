use log::{info, warn};

use crate::{
    config::{ConnectionConfig, TopicConfig},
    io::{Clock, MessagingLink},
};

/// Result of servicing the messaging link for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    AlreadyConnected,
    /// First connection since boot. Announcement and subscriptions are done;
    /// no sync announcement is owed.
    Established { attempts: u32 },
    /// The link came back after a loss. The caller owes a sync announcement
    /// on the next eligible tick.
    Recovered { attempts: u32 },
    /// Non-blocking mode only: still down, waiting for the next retry slot.
    Pending,
    /// Recovery exceeded the hard timeout. Terminal; the platform must
    /// restart the device.
    FatalTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Startup,
    Connected,
    Disconnected { since_ms: u64, lost: bool },
}

/// Keeps the messaging link alive.
///
/// Recovery is a state machine advanced once per tick. In blocking mode
/// (the default) a single call retries with the configured delay until the
/// link is back or the hard timeout fires, stalling everything else in the
/// actor; in non-blocking mode each call performs at most one attempt and
/// returns `Pending`, keeping debounce and publishing alive during the
/// outage. The restart decision is purely a function of elapsed time.
#[derive(Debug)]
pub struct ConnectionManager {
    config: ConnectionConfig,
    client_id: String,
    topics: TopicConfig,
    state: LinkState,
    attempt_count: u32,
    last_attempt_ms: Option<u64>,
    recovery_count: u32,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, client_id: String, topics: TopicConfig) -> Self {
        Self {
            config,
            client_id,
            topics,
            state: LinkState::Startup,
            attempt_count: 0,
            last_attempt_ms: None,
            recovery_count: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Number of times the link entered recovery since boot, first
    /// connection included. Diagnostic only.
    pub fn recovery_count(&self) -> u32 {
        self.recovery_count
    }

    pub fn ensure_connected<P>(&mut self, platform: &mut P) -> ConnectionOutcome
    where
        P: MessagingLink + Clock,
    {
        let now_ms = platform.now_ms();

        match self.state {
            LinkState::Connected => {
                if platform.is_connected() {
                    return ConnectionOutcome::AlreadyConnected;
                }
                self.enter_recovery(now_ms, true);
            }
            LinkState::Startup => {
                self.enter_recovery(now_ms, false);
            }
            LinkState::Disconnected { .. } => {}
        }

        self.recover(platform)
    }

    fn enter_recovery(&mut self, now_ms: u64, lost: bool) {
        self.state = LinkState::Disconnected {
            since_ms: now_ms,
            lost,
        };
        self.attempt_count = 0;
        self.last_attempt_ms = None;
        self.recovery_count = self.recovery_count.saturating_add(1);
        if lost {
            warn!(
                "messaging link lost, entering recovery #{}",
                self.recovery_count
            );
        }
    }

    fn recover<P>(&mut self, platform: &mut P) -> ConnectionOutcome
    where
        P: MessagingLink + Clock,
    {
        let LinkState::Disconnected { since_ms, lost } = self.state else {
            return ConnectionOutcome::AlreadyConnected;
        };

        loop {
            let now_ms = platform.now_ms();
            if now_ms.saturating_sub(since_ms) >= self.config.hard_timeout_ms {
                warn!(
                    "messaging link down for {} ms, giving up",
                    now_ms.saturating_sub(since_ms)
                );
                return ConnectionOutcome::FatalTimeout;
            }

            let attempt_due = match self.last_attempt_ms {
                None => true,
                Some(last) => now_ms.saturating_sub(last) >= self.config.retry_delay_ms,
            };

            if attempt_due {
                self.attempt_count = self.attempt_count.saturating_add(1);
                self.last_attempt_ms = Some(now_ms);
                info!("messaging connect attempt #{}", self.attempt_count);

                if platform.is_connected() {
                    return self.complete_recovery(platform, lost);
                }
                match platform.connect() {
                    Ok(()) => return self.complete_recovery(platform, lost),
                    Err(err) => warn!(
                        "connect attempt #{} failed: {err}, retrying in {} ms",
                        self.attempt_count, self.config.retry_delay_ms
                    ),
                }
            }

            if !self.config.blocking_reconnect {
                return ConnectionOutcome::Pending;
            }
            platform.sleep_ms(self.config.retry_delay_ms);
        }
    }

    fn complete_recovery<P>(&mut self, platform: &mut P, lost: bool) -> ConnectionOutcome
    where
        P: MessagingLink + Clock,
    {
        if let Err(err) = platform.publish(&self.topics.connection, &self.client_id, true) {
            warn!("connection announcement failed: {err}");
        }
        for topic in [&self.topics.power_command, &self.topics.reset_command] {
            if let Err(err) = platform.subscribe(topic) {
                warn!("resubscribe to {topic} failed: {err}");
            }
        }

        let attempts = self.attempt_count;
        self.state = LinkState::Connected;
        self.last_attempt_ms = None;
        info!("messaging link up after {attempts} attempt(s)");

        if lost {
            ConnectionOutcome::Recovered { attempts }
        } else {
            ConnectionOutcome::Established { attempts }
        }
    }
}
