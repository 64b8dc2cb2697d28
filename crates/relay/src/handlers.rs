use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use cortege_protocol::{
    ActiveRouteInfo, FriendMessage, GpsInfo, MovingPoint, RealtimeUpdate, RouteNode, ServerAck,
    SetActiveRoute, UserPosition,
};
use cortege_tracker::{Participant, ParticipantInput, Procession, RouteChangeRecord};

use crate::context::AppContext;
use crate::error::RpcError;

fn procession(ctx: &AppContext) -> Result<&Arc<Procession>, RpcError> {
    ctx.procession
        .as_ref()
        .ok_or_else(|| RpcError::Internal("procession is not configured".to_string()))
}

fn millis(eta: Option<Duration>) -> Option<i64> {
    eta.map(|d| d.as_millis().min(i64::MAX as u128) as i64)
}

pub async fn get_realtime_update(
    ctx: &AppContext,
    gps: Option<GpsInfo>,
) -> Result<RealtimeUpdate, RpcError> {
    if let Some(gps) = &gps {
        if gps.device_id.is_empty() {
            return Err(RpcError::InvalidInput(format!("missing device id in {gps:?}")));
        }
    }
    let procession = procession(ctx)?;

    let state = match &gps {
        Some(gps) => {
            let participating = gps.participating && ctx.allow_participation;
            if gps.participating && !participating {
                warn!(device_id = %gps.device_id, "participation requested but not allowed, tracking as spectator");
            }
            let input = ParticipantInput {
                device_id: gps.device_id.clone(),
                participating,
                latitude: gps.latitude,
                longitude: gps.longitude,
                accuracy: gps.accuracy,
            };
            procession.update_participant(input).await
        }
        None => procession.read().await,
    };
    let route_length = state.route().length();
    let eta_from = |position: f64| millis(state.evaluate_travel_time_between(position, route_length));
    let moving_point = |p: &Participant| MovingPoint {
        position: p.linear_position as i64,
        eta: eta_from(p.linear_position),
    };

    let mut data = RealtimeUpdate {
        route_name: state.route().name().to_string(),
        route_length: route_length as i64,
        user_total: state.participant_count() as u32,
        users_on_route: state.participants_on_route() as u32,
        head: state.head().map(moving_point),
        tail: state.tail().map(moving_point),
        ..RealtimeUpdate::default()
    };

    let caller = gps.as_ref().and_then(|gps| state.participant(&gps.device_id));
    if let Some(caller) = caller {
        data.user_on_route = caller.on_route;
        data.user = Some(UserPosition {
            position: caller.linear_position as i64,
            speed: (caller.linear_speed * 3.6).round() as i64,
        });
        data.user_eta = eta_from(caller.linear_position);

        if let Some(resolver) = &ctx.relationships {
            for member in resolver.finalized_relationships(&caller.device_id) {
                let Some(friend) = state.participant(&member.friend_device_id) else {
                    continue;
                };
                let point = friend.last_known_point;
                data.friends.insert(
                    member.friend_id,
                    FriendMessage {
                        latitude: point.latitude,
                        longitude: point.longitude,
                        accuracy: point.accuracy,
                        timestamp: point.timestamp,
                        eta: eta_from(friend.linear_position),
                    },
                );
            }
        }
    }

    Ok(data)
}

pub async fn set_active_route(
    ctx: &AppContext,
    command: SetActiveRoute,
) -> Result<ServerAck, RpcError> {
    let procession = procession(ctx)?;
    let Some(password) = ctx.admin_password.as_deref() else {
        error!("route change requested but no admin password is configured");
        return Err(RpcError::Internal("admin password is not configured".to_string()));
    };

    if let Err(err) = command.verify(password, ctx.signature_window_ms, ctx.clock.as_ref()) {
        warn!("rejected route change command");
        debug!(%err, "route change verification detail");
        return Err(RpcError::InvalidCredential);
    }

    let route_name = command
        .route_name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| RpcError::InvalidInput("missing route name".to_string()))?;
    let route = ctx
        .routes
        .get(&route_name)
        .ok_or_else(|| RpcError::RouteNotFound(route_name.clone()))?;

    procession.set_route(route).await;
    info!(route = %route_name, "active route changed");

    let record = RouteChangeRecord {
        route_name: route_name.clone(),
        timestamp: ctx.clock.now_ms(),
    };
    if let Err(err) = ctx.event_log.append(record) {
        error!(%err, route = %route_name, "failed to record route change");
    }

    Ok(ServerAck {
        text: format!("active route is now {route_name}"),
    })
}

pub async fn get_active_route(ctx: &AppContext) -> Result<ActiveRouteInfo, RpcError> {
    let route = procession(ctx)?.route().await;
    Ok(ActiveRouteInfo {
        route_name: route.name().to_string(),
        route_length: route.length() as i64,
        nodes: route
            .nodes()
            .iter()
            .map(|node| RouteNode {
                latitude: node.lat,
                longitude: node.lon,
            })
            .collect(),
    })
}
