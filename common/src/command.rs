use log::{debug, info, warn};

use crate::{config::TopicConfig, types::Command};

/// Validates inbound remote messages and maps them to actuator commands.
///
/// Only the first payload byte is significant: `'t'`/`'f'` for the power
/// topic, `'t'` for the reset topic. Anything else is logged and dropped.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    power_topic: String,
    reset_topic: String,
}

impl CommandDispatcher {
    pub fn new(topics: &TopicConfig) -> Self {
        Self {
            power_topic: topics.power_command.clone(),
            reset_topic: topics.reset_command.clone(),
        }
    }

    pub fn handle(
        &self,
        topic: &str,
        payload: &[u8],
        current_status: Option<bool>,
    ) -> Option<Command> {
        if topic == self.power_topic {
            self.handle_power(payload, current_status)
        } else if topic == self.reset_topic {
            self.handle_reset(payload, current_status)
        } else {
            debug!("ignoring message on unhandled topic {topic}");
            None
        }
    }

    fn handle_power(&self, payload: &[u8], current_status: Option<bool>) -> Option<Command> {
        let target = match payload.first() {
            Some(b't') => true,
            Some(b'f') => false,
            _ => {
                warn!("ignoring malformed power command payload");
                return None;
            }
        };

        // Idempotent: re-requesting the current state must not pulse the
        // power switch again. With the status still unknown the command is
        // executed as requested.
        if current_status == Some(target) {
            info!("power command target matches current status, suppressed");
            return None;
        }

        Some(Command::SetPower(target))
    }

    fn handle_reset(&self, payload: &[u8], current_status: Option<bool>) -> Option<Command> {
        if payload.first() != Some(&b't') {
            warn!("ignoring malformed reset command payload");
            return None;
        }

        // Pulsing reset while the machine is off is meaningless; the command
        // is refused, not deferred.
        if current_status != Some(true) {
            info!("reset refused while machine is off");
            return None;
        }

        Some(Command::Reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dispatcher() -> CommandDispatcher {
        CommandDispatcher::new(&TopicConfig::default())
    }

    const POWER: &str = "pcpower/cmnd/pc/power";
    const RESET: &str = "pcpower/cmnd/pc/reset";

    #[test]
    fn power_on_request_while_off_issues_command() {
        let command = dispatcher().handle(POWER, b"true", Some(false));
        assert_eq!(command, Some(Command::SetPower(true)));
    }

    #[test]
    fn matching_power_request_is_suppressed() {
        assert_eq!(dispatcher().handle(POWER, b"t", Some(true)), None);
        assert_eq!(dispatcher().handle(POWER, b"f", Some(false)), None);
    }

    #[test]
    fn power_off_request_while_on_issues_command() {
        let command = dispatcher().handle(POWER, b"false", Some(true));
        assert_eq!(command, Some(Command::SetPower(false)));
    }

    #[test]
    fn power_request_with_unknown_status_is_executed() {
        assert_eq!(
            dispatcher().handle(POWER, b"t", None),
            Some(Command::SetPower(true))
        );
    }

    #[test]
    fn malformed_power_payload_is_ignored() {
        assert_eq!(dispatcher().handle(POWER, b"on", Some(false)), None);
        assert_eq!(dispatcher().handle(POWER, b"", Some(false)), None);
    }

    #[test]
    fn reset_requires_machine_on() {
        assert_eq!(dispatcher().handle(RESET, b"t", Some(true)), Some(Command::Reset));
        assert_eq!(dispatcher().handle(RESET, b"t", Some(false)), None);
        assert_eq!(dispatcher().handle(RESET, b"t", None), None);
    }

    #[test]
    fn malformed_reset_payload_is_ignored() {
        assert_eq!(dispatcher().handle(RESET, b"f", Some(true)), None);
        assert_eq!(dispatcher().handle(RESET, b"", Some(true)), None);
    }

    #[test]
    fn unrelated_topic_is_ignored() {
        assert_eq!(dispatcher().handle("pcpower/other", b"t", Some(true)), None);
    }
}
