use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Matches the radius `geo` uses for haversine so local and great-circle
/// distances agree.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn distance_to(&self, other: &LatLon) -> f64 {
        Haversine::distance(
            Point::new(self.lon, self.lat),
            Point::new(other.lon, other.lat),
        )
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RouteError {
    #[error("route {0:?} needs at least two nodes")]
    TooFewNodes(String),
    #[error("route name must not be empty")]
    EmptyName,
}

/// Result of snapping a raw point onto a route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedLocation {
    /// Meters from the start of the route.
    pub linear_position: f64,
    /// Meters between the raw point and the polyline.
    pub distance: f64,
}

#[derive(Debug, Clone)]
pub struct Route {
    name: String,
    nodes: Vec<LatLon>,
    /// `offsets[i]` is the distance from the start to `nodes[i]`.
    offsets: Vec<f64>,
}

impl Route {
    pub fn new(name: impl Into<String>, nodes: Vec<LatLon>) -> Result<Self, RouteError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RouteError::EmptyName);
        }
        if nodes.len() < 2 {
            return Err(RouteError::TooFewNodes(name));
        }
        let mut offsets = Vec::with_capacity(nodes.len());
        let mut total = 0.0;
        offsets.push(total);
        for pair in nodes.windows(2) {
            total += pair[0].distance_to(&pair[1]);
            offsets.push(total);
        }
        Ok(Self {
            name,
            nodes,
            offsets,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[LatLon] {
        &self.nodes
    }

    pub fn length(&self) -> f64 {
        self.offsets.last().copied().unwrap_or(0.0)
    }

    /// Closest point of every segment, in route order.
    pub fn candidates(&self, point: LatLon) -> Vec<ProjectedLocation> {
        (0..self.nodes.len() - 1)
            .map(|i| self.project_on_segment(i, point))
            .collect()
    }

    /// Closest point on the whole polyline.
    pub fn project(&self, point: LatLon) -> ProjectedLocation {
        self.candidates(point)
            .into_iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
            .unwrap_or(ProjectedLocation {
                linear_position: 0.0,
                distance: f64::INFINITY,
            })
    }

    fn project_on_segment(&self, index: usize, point: LatLon) -> ProjectedLocation {
        let a = self.nodes[index];
        let b = self.nodes[index + 1];
        let segment_length = self.offsets[index + 1] - self.offsets[index];

        // Equirectangular frame centred on `a`; segments are short enough.
        let ky = EARTH_RADIUS_M.to_radians();
        let kx = ky * a.lat.to_radians().cos();
        let (bx, by) = ((b.lon - a.lon) * kx, (b.lat - a.lat) * ky);
        let (px, py) = ((point.lon - a.lon) * kx, (point.lat - a.lat) * ky);

        let len_sq = bx * bx + by * by;
        let t = if len_sq > 0.0 {
            ((px * bx + py * by) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let (dx, dy) = (px - t * bx, py - t * by);
        ProjectedLocation {
            linear_position: self.offsets[index] + t * segment_length,
            distance: (dx * dx + dy * dy).sqrt(),
        }
    }
}
