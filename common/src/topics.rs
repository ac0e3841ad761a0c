pub const TOPIC_CONNECTION_STATUS: &str = "pcpower/connection";
pub const TOPIC_PC_STATUS: &str = "pcpower/pc/status";
pub const TOPIC_PC_TEMPERATURE: &str = "pcpower/pc/temperature";

pub const TOPIC_CMD_POWER: &str = "pcpower/cmnd/pc/power";
pub const TOPIC_CMD_RESET: &str = "pcpower/cmnd/pc/reset";
