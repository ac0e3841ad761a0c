/// Latest ambient temperature known to the controller. `NotReady` stands in
/// for a sensor that has not answered yet, failed, or returned a value
/// outside the plausible range; it never reaches the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Temperature {
    NotReady,
    Celsius(f32),
}

impl Temperature {
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Celsius(_))
    }

    pub fn rounded_degrees(self) -> Option<i32> {
        match self {
            Self::NotReady => None,
            Self::Celsius(celsius) => Some(round_whole_degrees(celsius)),
        }
    }
}

/// Round half away from zero to the nearest whole degree. Keeps payload
/// formatting integer-only.
pub fn round_whole_degrees(celsius: f32) -> i32 {
    if celsius >= 0.0 {
        (celsius + 0.5) as i32
    } else {
        (celsius - 0.5) as i32
    }
}

pub fn status_payload(on: bool) -> &'static str {
    if on {
        "1"
    } else {
        "0"
    }
}

/// Category due for the next periodic, non-event-triggered publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishCategory {
    Status,
    Temperature,
}

impl PublishCategory {
    pub const COUNT: usize = 2;

    pub fn next(self) -> Self {
        match self {
            Self::Status => Self::Temperature,
            Self::Temperature => Self::Status,
        }
    }
}

/// Validated remote command, consumed immediately, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetPower(bool),
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorLine {
    PowerSwitch,
    ResetSwitch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_whole_degrees(20.6), 21);
        assert_eq!(round_whole_degrees(20.4), 20);
        assert_eq!(round_whole_degrees(20.5), 21);
        assert_eq!(round_whole_degrees(0.4), 0);
        assert_eq!(round_whole_degrees(-0.4), 0);
        assert_eq!(round_whole_degrees(-3.6), -4);
        assert_eq!(round_whole_degrees(-20.5), -21);
    }

    #[test]
    fn sentinel_has_no_degrees() {
        assert_eq!(Temperature::NotReady.rounded_degrees(), None);
        assert_eq!(Temperature::Celsius(21.7).rounded_degrees(), Some(22));
    }

    #[test]
    fn rotation_covers_every_category_before_repeating() {
        let mut category = PublishCategory::Status;
        let mut seen = Vec::new();
        for _ in 0..PublishCategory::COUNT {
            seen.push(category);
            category = category.next();
        }
        assert_eq!(category, PublishCategory::Status);
        assert_eq!(
            seen,
            vec![PublishCategory::Status, PublishCategory::Temperature]
        );
    }
}
