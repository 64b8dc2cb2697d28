use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, info_span, warn, Instrument};

use cortege_common::config::RelayConfig;
use cortege_common::ids::new_connection_id;
use cortege_protocol::signing::envelope;
use cortege_protocol::{
    ClientHeartbeat, Envelope, GpsInfo, ServerNotice, SetActiveRoute, CLIENT_HEARTBEAT, GET_ACTIVE_ROUTE,
    GET_REALTIME_UPDATE, SERVER_ACK, SERVER_ACTIVE_ROUTE, SERVER_ERROR, SERVER_NOTICE,
    SERVER_REALTIME_UPDATE, SET_ACTIVE_ROUTE,
};

use crate::context::AppContext;
use crate::error::RpcError;
use crate::handlers;

pub struct RelayServer {
    config: RelayConfig,
    ctx: Arc<AppContext>,
}

impl RelayServer {
    pub fn new(config: RelayConfig, ctx: AppContext) -> Self {
        Self {
            config,
            ctx: Arc::new(ctx),
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(addr = %self.config.bind_addr, "relay listening");
        serve(listener, Arc::clone(&self.ctx)).await
    }
}

pub async fn serve(listener: TcpListener, ctx: Arc<AppContext>) -> anyhow::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let conn_id = new_connection_id();
        let ctx = Arc::clone(&ctx);
        let span = info_span!("conn", id = %conn_id);
        tokio::spawn(
            async move {
                info!(%addr, "accepted");
                if let Err(err) = handle_connection(stream, ctx).await {
                    error!(%err, "connection error");
                }
                info!("closed");
            }
            .instrument(span),
        );
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    ctx: Arc<AppContext>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_write, mut ws_read) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_write.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_read.next().await {
        let msg = msg?;
        if msg.is_close() {
            break;
        }
        if !msg.is_text() {
            continue;
        }
        let env: Envelope = match serde_json::from_str(msg.to_text()?) {
            Ok(env) => env,
            Err(err) => {
                warn!(%err, "unparseable envelope");
                send_error(&tx, "", &ctx, &RpcError::InvalidInput(err.to_string()))?;
                continue;
            }
        };

        let call_id = env.id.clone();
        debug!(message_type = %env.message_type, call_id = %call_id, "call");
        match dispatch(&ctx, env).await {
            Ok((message_type, payload)) => {
                send_envelope(&tx, message_type, &call_id, &ctx, &payload)?;
            }
            Err(err) => {
                debug!(code = err.code(), call_id = %call_id, "call failed");
                send_error(&tx, &call_id, &ctx, &err)?;
            }
        }
    }

    writer.abort();
    Ok(())
}

async fn dispatch(
    ctx: &AppContext,
    env: Envelope,
) -> Result<(&'static str, serde_json::Value), RpcError> {
    match env.message_type.as_str() {
        GET_REALTIME_UPDATE => {
            let gps: Option<GpsInfo> = parse_payload(env.payload)?;
            let data = handlers::get_realtime_update(ctx, gps).await?;
            Ok((SERVER_REALTIME_UPDATE, to_value(&data)?))
        }
        SET_ACTIVE_ROUTE => {
            let command: SetActiveRoute = parse_payload(env.payload)?;
            let ack = handlers::set_active_route(ctx, command).await?;
            Ok((SERVER_ACK, to_value(&ack)?))
        }
        GET_ACTIVE_ROUTE => {
            let route = handlers::get_active_route(ctx).await?;
            Ok((SERVER_ACTIVE_ROUTE, to_value(&route)?))
        }
        CLIENT_HEARTBEAT => {
            let heartbeat: Option<ClientHeartbeat> = parse_payload(env.payload)?;
            let text = match heartbeat {
                Some(ClientHeartbeat { nonce }) if !nonce.is_empty() => format!("pong {nonce}"),
                _ => "pong".to_string(),
            };
            let notice = ServerNotice { text };
            Ok((SERVER_NOTICE, to_value(&notice)?))
        }
        other => Err(RpcError::UnknownMessage(other.to_string())),
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(payload: serde_json::Value) -> Result<T, RpcError> {
    serde_json::from_value(payload).map_err(|err| RpcError::InvalidInput(err.to_string()))
}

fn to_value<T: Serialize>(payload: &T) -> Result<serde_json::Value, RpcError> {
    serde_json::to_value(payload).map_err(|err| RpcError::Internal(err.to_string()))
}

fn send_envelope<T: Serialize>(
    tx: &mpsc::UnboundedSender<Message>,
    message_type: &str,
    call_id: &str,
    ctx: &AppContext,
    payload: &T,
) -> anyhow::Result<()> {
    let env = envelope(message_type, call_id, ctx.clock.now_ms(), payload)?;
    let text = serde_json::to_string(&env)?;
    tx.send(Message::Text(text))?;
    Ok(())
}

fn send_error(
    tx: &mpsc::UnboundedSender<Message>,
    call_id: &str,
    ctx: &AppContext,
    err: &RpcError,
) -> anyhow::Result<()> {
    send_envelope(tx, SERVER_ERROR, call_id, ctx, &err.to_wire())
}
