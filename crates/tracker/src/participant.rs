use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantInput {
    pub device_id: String,
    pub participating: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub device_id: String,
    pub participating: bool,
    pub on_route: bool,
    /// Meters along the active route.
    pub linear_position: f64,
    /// Meters per second, negative when moving backwards.
    pub linear_speed: f64,
    pub last_known_point: GpsFix,
    /// When `linear_position` was last taken from an on-route fix on the
    /// active route. Cleared by a route switch.
    pub position_timestamp: Option<i64>,
    /// Procession-wide update counter, higher is more recent.
    pub sequence: u64,
}

impl Participant {
    /// Counts toward head, tail and the on-route total.
    pub fn is_tracked(&self) -> bool {
        self.participating && self.on_route
    }
}
