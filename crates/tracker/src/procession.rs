use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

use cortege_common::clock::Clock;
use cortege_common::config::TrackingConfig;
use cortege_route::{LatLon, ProjectedLocation, Route};

use crate::participant::{GpsFix, Participant, ParticipantInput};

/// Live state of everybody on the active route.
///
/// Updates and route switches take the write lock; every query is answered
/// from a single read guard, so a reader never mixes two routes.
pub struct Procession {
    state: RwLock<ProcessionState>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug)]
pub struct ProcessionState {
    route: Arc<Route>,
    participants: HashMap<String, Participant>,
    config: TrackingConfig,
    next_sequence: u64,
}

impl Procession {
    pub fn new(route: Arc<Route>, config: TrackingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(ProcessionState {
                route,
                participants: HashMap::new(),
                config,
                next_sequence: 0,
            }),
            clock,
        }
    }

    /// Applies a fix and hands back a read view of the state it produced.
    /// The write guard is downgraded, so no route switch can land between the
    /// update and the caller's reads.
    pub async fn update_participant(
        &self,
        input: ParticipantInput,
    ) -> RwLockReadGuard<'_, ProcessionState> {
        let now = self.clock.now_ms();
        let mut state = self.state.write().await;
        state.apply(input, now);
        state.downgrade()
    }

    /// Swaps the route and drops every participant out of head/tail until its
    /// next fix is projected onto the new route.
    pub async fn set_route(&self, route: Arc<Route>) {
        let mut state = self.state.write().await;
        for participant in state.participants.values_mut() {
            participant.on_route = false;
            participant.linear_speed = 0.0;
            participant.position_timestamp = None;
        }
        info!(
            from = state.route.name(),
            to = route.name(),
            length = route.length(),
            "active route replaced"
        );
        state.route = route;
    }

    pub async fn route(&self) -> Arc<Route> {
        Arc::clone(&self.state.read().await.route)
    }

    /// Consistent view for assembling a whole response.
    pub async fn read(&self) -> RwLockReadGuard<'_, ProcessionState> {
        self.state.read().await
    }
}

impl ProcessionState {
    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn participant(&self, device_id: &str) -> Option<&Participant> {
        self.participants.get(device_id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn head(&self) -> Option<&Participant> {
        self.tracked().max_by(|a, b| {
            a.linear_position
                .total_cmp(&b.linear_position)
                .then(a.sequence.cmp(&b.sequence))
        })
    }

    pub fn tail(&self) -> Option<&Participant> {
        self.tracked().min_by(|a, b| {
            a.linear_position
                .total_cmp(&b.linear_position)
                .then(b.sequence.cmp(&a.sequence))
        })
    }

    pub fn participant_count(&self) -> usize {
        self.participants.values().filter(|p| p.participating).count()
    }

    pub fn participants_on_route(&self) -> usize {
        self.tracked().count()
    }

    /// Mean speed of tracked participants that are moving forward.
    pub fn average_speed(&self) -> Option<f64> {
        let (sum, count) = self
            .tracked()
            .filter(|p| p.linear_speed > 0.0)
            .fold((0.0, 0usize), |(sum, count), p| (sum + p.linear_speed, count + 1));
        (count > 0).then(|| sum / count as f64)
    }

    /// Time to cover `from..to` at the current group pace, falling back to the
    /// configured default speed. `None` when no usable pace exists.
    pub fn evaluate_travel_time_between(&self, from: f64, to: f64) -> Option<Duration> {
        if from >= to {
            return Some(Duration::ZERO);
        }
        let pace = self
            .average_speed()
            .unwrap_or_else(|| self.config.default_speed_mps());
        if !pace.is_finite() || pace <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64((to - from) / pace).ok()
    }

    fn tracked(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values().filter(|p| p.is_tracked())
    }

    fn apply(&mut self, input: ParticipantInput, now: i64) {
        let point = LatLon::new(input.latitude, input.longitude);
        let previous = self.participants.get(&input.device_id);
        let projected = self.select_projection(point, previous);
        let on_route = projected.distance <= self.config.on_route_tolerance_m;

        let (linear_position, linear_speed, position_timestamp) = if on_route {
            let speed = match previous.and_then(|p| p.position_timestamp.map(|t| (p, t))) {
                Some((_, t)) if now - t > self.config.max_compute_age_ms => {
                    debug!(device_id = %input.device_id, age_ms = now - t, "previous fix too old for speed");
                    0.0
                }
                Some((prev, t)) if now > t => {
                    (projected.linear_position - prev.linear_position) / ((now - t) as f64 / 1000.0)
                }
                Some((prev, _)) => prev.linear_speed,
                None => 0.0,
            };
            (projected.linear_position, speed, Some(now))
        } else {
            (
                previous.map_or(0.0, |p| p.linear_position),
                0.0,
                previous.and_then(|p| p.position_timestamp),
            )
        };

        if previous.is_none() {
            debug!(device_id = %input.device_id, "new participant");
        }

        self.next_sequence += 1;
        let participant = Participant {
            device_id: input.device_id.clone(),
            participating: input.participating,
            on_route,
            linear_position,
            linear_speed,
            last_known_point: GpsFix {
                latitude: input.latitude,
                longitude: input.longitude,
                accuracy: input.accuracy,
                timestamp: now,
            },
            position_timestamp,
            sequence: self.next_sequence,
        };
        self.participants.insert(input.device_id, participant);
    }

    /// On routes that pass the same place twice, prefer the candidate closest
    /// to where the participant was last seen.
    fn select_projection(&self, point: LatLon, previous: Option<&Participant>) -> ProjectedLocation {
        let nearest = self.route.project(point);
        let Some(prev_position) = previous
            .filter(|p| p.position_timestamp.is_some())
            .map(|p| p.linear_position)
        else {
            return nearest;
        };
        self.route
            .candidates(point)
            .into_iter()
            .filter(|c| c.distance <= self.config.on_route_tolerance_m)
            .min_by(|a, b| {
                (a.linear_position - prev_position)
                    .abs()
                    .total_cmp(&(b.linear_position - prev_position).abs())
            })
            .unwrap_or(nearest)
    }
}

#[cfg(test)]
mod tests {
    use cortege_common::clock::ManualClock;

    use super::*;

    const M_PER_DEG: f64 = 6_371_008.8 * std::f64::consts::PI / 180.0;
    const START_LAT: f64 = 48.0;
    const LON: f64 = 11.5;

    fn north_route(name: &str, length_m: f64) -> Arc<Route> {
        let nodes = (0..=4)
            .map(|i| LatLon::new(START_LAT + length_m * i as f64 / 4.0 / M_PER_DEG, LON))
            .collect();
        Arc::new(Route::new(name, nodes).unwrap())
    }

    fn setup(config: TrackingConfig) -> (Procession, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let procession = Procession::new(north_route("Nord - kurz", 12_605.0), config, clock.clone());
        (procession, clock)
    }

    fn fix(device_id: &str, participating: bool, meters: f64) -> ParticipantInput {
        ParticipantInput {
            device_id: device_id.to_string(),
            participating,
            latitude: START_LAT + meters / M_PER_DEG,
            longitude: LON,
            accuracy: 5.0,
        }
    }

    async fn update(procession: &Procession, input: ParticipantInput) -> Participant {
        let device_id = input.device_id.clone();
        let state = procession.update_participant(input).await;
        state.participant(&device_id).cloned().unwrap()
    }

    fn off_route(device_id: &str) -> ParticipantInput {
        ParticipantInput {
            device_id: device_id.to_string(),
            participating: true,
            latitude: START_LAT,
            longitude: LON + 0.1,
            accuracy: 5.0,
        }
    }

    #[tokio::test]
    async fn first_fix_creates_participant() {
        let (procession, _) = setup(TrackingConfig::default());
        let p = update(&procession, fix("a", true, 1_000.0)).await;
        assert!(p.on_route);
        assert!((p.linear_position - 1_000.0).abs() < 0.5);
        assert_eq!(p.linear_speed, 0.0);
        assert_eq!(p.last_known_point.timestamp, 1_000_000);
        assert_eq!(procession.read().await.len(), 1);
    }

    #[tokio::test]
    async fn speed_comes_from_previous_fix() {
        let (procession, clock) = setup(TrackingConfig::default());
        procession.update_participant(fix("a", true, 1_000.0)).await;
        clock.advance(10_000);
        let p = update(&procession, fix("a", true, 1_050.0)).await;
        assert!((p.linear_speed - 5.0).abs() < 0.1);

        clock.advance(10_000);
        let p = update(&procession, fix("a", true, 1_030.0)).await;
        assert!((p.linear_speed + 2.0).abs() < 0.1, "regressing fix gives negative speed");
        assert!((p.linear_position - 1_030.0).abs() < 0.5);
    }

    #[tokio::test]
    async fn old_fix_gives_no_speed() {
        let config = TrackingConfig {
            max_compute_age_ms: 30_000,
            ..TrackingConfig::default()
        };
        let (procession, clock) = setup(config);
        procession.update_participant(fix("a", true, 1_000.0)).await;
        clock.advance(31_000);
        let p = update(&procession, fix("a", true, 2_000.0)).await;
        assert_eq!(p.linear_speed, 0.0);
    }

    #[tokio::test]
    async fn same_timestamp_keeps_previous_speed() {
        let (procession, clock) = setup(TrackingConfig::default());
        procession.update_participant(fix("a", true, 0.0)).await;
        clock.advance(20_000);
        procession.update_participant(fix("a", true, 100.0)).await;
        let p = update(&procession, fix("a", true, 110.0)).await;
        assert!((p.linear_speed - 5.0).abs() < 0.1);
    }

    #[tokio::test]
    async fn off_route_fix_keeps_last_position() {
        let (procession, _) = setup(TrackingConfig::default());
        procession.update_participant(fix("a", true, 3_000.0)).await;
        let p = update(&procession, off_route("a")).await;
        assert!(!p.on_route);
        assert!((p.linear_position - 3_000.0).abs() < 0.5);
        assert_eq!(p.last_known_point.longitude, LON + 0.1);
    }

    #[tokio::test]
    async fn head_tail_and_counts() {
        let (procession, _) = setup(TrackingConfig::default());
        procession.update_participant(fix("a", true, 1_000.0)).await;
        procession.update_participant(fix("b", true, 4_000.0)).await;
        procession.update_participant(fix("c", true, 2_500.0)).await;
        procession.update_participant(fix("spectator", false, 9_000.0)).await;
        procession.update_participant(off_route("lost")).await;

        let state = procession.read().await;
        assert_eq!(state.head().unwrap().device_id, "b");
        assert_eq!(state.tail().unwrap().device_id, "a");
        assert_eq!(state.participant_count(), 4);
        assert_eq!(state.participants_on_route(), 3);
        assert_eq!(state.len(), 5);
        assert!(state.head().unwrap().linear_position >= state.tail().unwrap().linear_position);
    }

    #[tokio::test]
    async fn spectators_never_count() {
        let (procession, _) = setup(TrackingConfig::default());
        procession.update_participant(fix("s", false, 500.0)).await;
        let state = procession.read().await;
        assert!(state.head().is_none());
        assert!(state.tail().is_none());
        assert_eq!(state.participant_count(), 0);
        assert_eq!(state.participants_on_route(), 0);
    }

    #[tokio::test]
    async fn ties_go_to_most_recent_update() {
        let (procession, _) = setup(TrackingConfig::default());
        procession.update_participant(fix("a", true, 1_000.0)).await;
        procession.update_participant(fix("b", true, 1_000.0)).await;
        {
            let state = procession.read().await;
            assert_eq!(state.head().unwrap().device_id, "b");
            assert_eq!(state.tail().unwrap().device_id, "b");
        }
        procession.update_participant(fix("a", true, 1_000.0)).await;
        let state = procession.read().await;
        assert_eq!(state.head().unwrap().device_id, "a");
        assert_eq!(state.tail().unwrap().device_id, "a");
    }

    #[tokio::test]
    async fn travel_time_uses_group_pace_or_default() {
        let (procession, clock) = setup(TrackingConfig::default());
        {
            let state = procession.read().await;
            // 12 km/h default
            let eta = state.evaluate_travel_time_between(0.0, 12_000.0).unwrap();
            assert!((eta.as_secs_f64() - 3_600.0).abs() < 1.0);
            assert_eq!(state.evaluate_travel_time_between(13_000.0, 12_605.0), Some(Duration::ZERO));
        }

        procession.update_participant(fix("a", true, 0.0)).await;
        clock.advance(10_000);
        procession.update_participant(fix("a", true, 50.0)).await;
        let state = procession.read().await;
        assert!((state.average_speed().unwrap() - 5.0).abs() < 0.1);
        let eta = state.evaluate_travel_time_between(50.0, 1_050.0).unwrap();
        assert!((eta.as_secs_f64() - 200.0).abs() < 5.0);
    }

    #[tokio::test]
    async fn zero_default_pace_is_unknown() {
        let config = TrackingConfig {
            default_speed_kmh: 0.0,
            ..TrackingConfig::default()
        };
        let (procession, _) = setup(config);
        let state = procession.read().await;
        assert_eq!(state.evaluate_travel_time_between(0.0, 100.0), None);
        assert_eq!(state.evaluate_travel_time_between(100.0, 100.0), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn route_switch_resets_eligibility_in_one_step() {
        let (procession, _) = setup(TrackingConfig::default());
        procession.update_participant(fix("a", true, 1_000.0)).await;
        procession.set_route(north_route("Ost - lang", 16_727.0)).await;

        {
            let state = procession.read().await;
            assert_eq!(state.route().name(), "Ost - lang");
            assert!((state.route().length() - 16_727.0).abs() < 1.0);
            assert!(state.head().is_none());
            assert_eq!(state.participants_on_route(), 0);
            assert_eq!(state.participant_count(), 1);
        }

        let p = update(&procession, fix("a", true, 1_200.0)).await;
        assert!(p.on_route);
        assert_eq!(p.linear_speed, 0.0);
        assert_eq!(procession.read().await.head().unwrap().device_id, "a");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_all_land() {
        let (procession, _) = setup(TrackingConfig::default());
        let procession = Arc::new(procession);
        let mut handles = Vec::new();
        for i in 0..50 {
            let procession = Arc::clone(&procession);
            handles.push(tokio::spawn(async move {
                procession
                    .update_participant(fix(&format!("d{i}"), true, 100.0 * i as f64))
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let state = procession.read().await;
        assert_eq!(state.len(), 50);
        assert_eq!(state.participant_count(), 50);
        assert_eq!(state.head().unwrap().device_id, "d49");
        assert_eq!(state.tail().unwrap().device_id, "d0");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn update_view_never_straddles_a_route_switch() {
        let (procession, _) = setup(TrackingConfig::default());
        let procession = Arc::new(procession);
        let short = north_route("Nord - kurz", 12_605.0);
        let long = north_route("Ost - lang", 16_727.0);

        let switcher = {
            let procession = Arc::clone(&procession);
            tokio::spawn(async move {
                for i in 0..500 {
                    let route = if i % 2 == 0 { &long } else { &short };
                    procession.set_route(Arc::clone(route)).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut readers = Vec::new();
        for r in 0..4 {
            let procession = Arc::clone(&procession);
            readers.push(tokio::spawn(async move {
                let device_id = format!("r{r}");
                for i in 0..500 {
                    let meters = 5_000.0 + (i % 10) as f64;
                    let state = procession.update_participant(fix(&device_id, true, meters)).await;
                    let me = state.participant(&device_id).unwrap();
                    assert!(me.on_route);
                    assert!(state.participants_on_route() >= 1);
                    assert!(state.head().unwrap().linear_position >= me.linear_position);
                    assert!(me.linear_position <= state.route().length());
                    drop(state);
                    tokio::task::yield_now().await;
                }
            }));
        }

        switcher.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }

    #[tokio::test]
    async fn loop_route_follows_previous_position() {
        let start = LatLon::new(START_LAT, LON);
        let turn = LatLon::new(START_LAT + 1_000.0 / M_PER_DEG, LON);
        let east = LatLon::new(START_LAT + 1_000.0 / M_PER_DEG, LON + 0.02);
        let back = LatLon::new(START_LAT, LON + 0.02);
        let route = Arc::new(Route::new("loop", vec![start, turn, east, back, start]).unwrap());
        let clock = Arc::new(ManualClock::new(0));
        let procession = Procession::new(route.clone(), TrackingConfig::default(), clock);

        let at_start = ParticipantInput {
            device_id: "a".to_string(),
            participating: true,
            latitude: START_LAT,
            longitude: LON,
            accuracy: 3.0,
        };
        let p = update(&procession, at_start.clone()).await;
        assert_eq!(p.linear_position, 0.0);

        let near_finish = ParticipantInput {
            latitude: START_LAT,
            longitude: LON + 0.002,
            ..at_start.clone()
        };
        procession.update_participant(near_finish).await;
        let p = update(&procession, at_start).await;
        assert!((p.linear_position - route.length()).abs() < 1.0);
    }
}
