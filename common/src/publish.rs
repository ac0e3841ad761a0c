use crate::{
    config::MonitorConfig,
    types::{PublishCategory, Temperature},
};

/// What the scheduler decided to put on the wire for this tick.
///
/// `periodic` marks publishes served from the rotation rather than an event;
/// only those advance the rotation cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Publication {
    Status { on: bool, periodic: bool },
    Temperature { celsius: f32, periodic: bool },
    Sync { count: u32 },
}

/// Decides what to publish and when, under the global minimum-interval
/// throttle.
///
/// `plan` is a pure read of the priority ladder; the owned state only moves
/// in `commit`, which the caller invokes after the publish actually
/// succeeded. A failed transport call therefore leaves the ladder ready to
/// retry the same decision on the next eligible tick.
#[derive(Debug, Clone)]
pub struct PublishScheduler {
    min_publish_ms: u64,
    periodic_ms: u64,
    temp_threshold_c: f32,
    last_published_status: Option<bool>,
    last_published_temp: Option<f32>,
    last_published_ms: Option<u64>,
    cursor: PublishCategory,
    sync_count: u32,
}

impl PublishScheduler {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            min_publish_ms: config.min_publish_ms,
            periodic_ms: config.periodic_publish_ms,
            temp_threshold_c: config.temp_threshold_c,
            last_published_status: None,
            last_published_temp: None,
            last_published_ms: None,
            cursor: PublishCategory::Status,
            sync_count: 0,
        }
    }

    /// Restart the interval clock without publishing. Used right after a
    /// reconnect, where the announcement publish has just gone out and the
    /// elapsed-time bookkeeping is stale.
    pub fn reset_interval(&mut self, now_ms: u64) {
        self.last_published_ms = Some(now_ms);
    }

    pub fn sync_count(&self) -> u32 {
        self.sync_count
    }

    /// Evaluate the priority ladder for this tick. First match wins:
    /// status change, temperature delta over threshold, pending sync
    /// announcement, then the periodic rotation.
    pub fn plan(
        &self,
        status: Option<bool>,
        temperature: Temperature,
        sync_pending: bool,
        now_ms: u64,
    ) -> Option<Publication> {
        if !self.interval_elapsed(now_ms) {
            return None;
        }

        if let Some(on) = status {
            if self.last_published_status != Some(on) {
                return Some(Publication::Status {
                    on,
                    periodic: false,
                });
            }
        }

        if let Temperature::Celsius(celsius) = temperature {
            let over_threshold = match self.last_published_temp {
                None => true,
                Some(last) => (celsius - last).abs() > self.temp_threshold_c,
            };
            if over_threshold {
                return Some(Publication::Temperature {
                    celsius,
                    periodic: false,
                });
            }
        }

        if sync_pending {
            return Some(Publication::Sync {
                count: self.sync_count.wrapping_add(1),
            });
        }

        if self.periodic_due(now_ms) {
            // Serve the first category under the cursor that has a ready
            // value; an unknown status or a not-ready sensor never reaches
            // the wire.
            let mut category = self.cursor;
            for _ in 0..PublishCategory::COUNT {
                match category {
                    PublishCategory::Status => {
                        if let Some(on) = status {
                            return Some(Publication::Status { on, periodic: true });
                        }
                    }
                    PublishCategory::Temperature => {
                        if let Temperature::Celsius(celsius) = temperature {
                            return Some(Publication::Temperature {
                                celsius,
                                periodic: true,
                            });
                        }
                    }
                }
                category = category.next();
            }
        }

        None
    }

    /// Record a publish that made it onto the wire. The next temperature
    /// comparison uses the value recorded here, not whatever the sensor says,
    /// so sub-threshold drift cannot re-trigger.
    pub fn commit(&mut self, publication: &Publication, now_ms: u64) {
        match *publication {
            Publication::Status { on, periodic } => {
                self.last_published_status = Some(on);
                if periodic {
                    self.cursor = PublishCategory::Status.next();
                }
            }
            Publication::Temperature { celsius, periodic } => {
                self.last_published_temp = Some(celsius);
                if periodic {
                    self.cursor = PublishCategory::Temperature.next();
                }
            }
            Publication::Sync { count } => {
                self.sync_count = count;
            }
        }
        self.last_published_ms = Some(now_ms);
    }

    fn interval_elapsed(&self, now_ms: u64) -> bool {
        match self.last_published_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.min_publish_ms,
        }
    }

    fn periodic_due(&self, now_ms: u64) -> bool {
        match self.last_published_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.periodic_ms,
        }
    }
}
