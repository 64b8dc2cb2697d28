use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub bind_addr: String,
    pub data_dir: String,
    /// Route activated at startup when the event log has no route change yet.
    pub initial_route: String,
    pub admin_password: Option<String>,
    #[serde(default = "default_allow_participation")]
    pub allow_participation: bool,
    #[serde(default = "default_signature_window_ms")]
    pub signature_window_ms: i64,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

/// Tunables of the position tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub on_route_tolerance_m: f64,
    /// A previous fix older than this contributes no speed signal.
    pub max_compute_age_ms: i64,
    /// Pace used for ETAs while nobody on the route is moving.
    pub default_speed_kmh: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            on_route_tolerance_m: 50.0,
            max_compute_age_ms: 60_000,
            default_speed_kmh: 12.0,
        }
    }
}

impl TrackingConfig {
    pub fn default_speed_mps(&self) -> f64 {
        self.default_speed_kmh / 3.6
    }
}

fn default_allow_participation() -> bool {
    true
}

fn default_signature_window_ms() -> i64 {
    10_000
}

pub fn load_config<T: for<'de> Deserialize<'de>>(path: &str) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    Ok(config)
}
