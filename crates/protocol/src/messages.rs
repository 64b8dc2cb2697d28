use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const GET_REALTIME_UPDATE: &str = "rpc.get_realtime_update";
pub const SET_ACTIVE_ROUTE: &str = "rpc.set_active_route";
pub const GET_ACTIVE_ROUTE: &str = "rpc.get_active_route";
pub const CLIENT_HEARTBEAT: &str = "client.heartbeat";

pub const SERVER_REALTIME_UPDATE: &str = "server.realtime_update";
pub const SERVER_ACTIVE_ROUTE: &str = "server.active_route";
pub const SERVER_ACK: &str = "server.ack";
pub const SERVER_ERROR: &str = "server.error";
pub const SERVER_NOTICE: &str = "server.notice";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: String,
    pub id: String,
    pub ts: i64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Raw fix reported by a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpsInfo {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub participating: bool,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealtimeUpdate {
    pub route_name: String,
    pub route_length: i64,
    pub user_total: u32,
    pub users_on_route: u32,
    pub head: Option<MovingPoint>,
    pub tail: Option<MovingPoint>,
    pub user_on_route: bool,
    pub user: Option<UserPosition>,
    /// Milliseconds to the finish for the caller.
    pub user_eta: Option<i64>,
    /// Keyed by friend-facing id.
    pub friends: BTreeMap<String, FriendMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovingPoint {
    pub position: i64,
    pub eta: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPosition {
    pub position: i64,
    /// km/h
    pub speed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendMessage {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub timestamp: i64,
    pub eta: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetActiveRoute {
    pub route_name: Option<String>,
    pub timestamp: i64,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRouteInfo {
    pub route_name: String,
    pub route_length: i64,
    pub nodes: Vec<RouteNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteNode {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerAck {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerNotice {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientHeartbeat {
    #[serde(default)]
    pub nonce: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gps_info_without_device_id_still_parses() {
        let gps: GpsInfo =
            serde_json::from_str(r#"{"latitude": 48.1, "longitude": 11.5}"#).unwrap();
        assert!(gps.device_id.is_empty());
        assert!(!gps.participating);
        assert_eq!(gps.accuracy, 0.0);
    }

    #[test]
    fn envelope_uses_type_key() {
        let env: Envelope = serde_json::from_str(
            r#"{"type": "rpc.get_realtime_update", "id": "c1", "ts": 5, "payload": null}"#,
        )
        .unwrap();
        assert_eq!(env.message_type, GET_REALTIME_UPDATE);
        assert!(env.payload.is_null());

        let text = serde_json::to_string(&env).unwrap();
        assert!(text.contains(r#""type":"rpc.get_realtime_update""#));
    }
}
