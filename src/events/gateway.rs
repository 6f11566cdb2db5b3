/// Progress Gateway — the WebSocket surface clients use to follow job
/// lifecycle events without polling. Internally it pattern-subscribes to the
/// broker once per process and fans matching events out to exactly the
/// sockets subscribed to that job or queue.
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use actix::{Actor, ActorContext, AsyncContext, Handler, Message, StreamHandler};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::metrics::GATEWAY_SUBSCRIBERS;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone)]
pub struct RawEvent {
    pub channel: String,
    pub payload: String,
}

/// Spawns the single process-wide subscriber that PSUBSCRIBEs `job:*:*:*`
/// and republishes every message onto an in-process broadcast channel that
/// gateway sessions tap into. Using one broker connection for all sessions
/// avoids one PSUBSCRIBE per WebSocket client.
pub fn spawn_broker_bridge(redis_url: String) -> broadcast::Sender<RawEvent> {
    let (tx, _rx) = broadcast::channel(1024);
    let sender = tx.clone();

    actix_rt::spawn(async move {
        loop {
            match run_bridge(&redis_url, &sender).await {
                Ok(()) => {}
                Err(e) => tracing::warn!(error = %e, "gateway broker bridge disconnected, retrying"),
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    });

    tx
}

async fn run_bridge(redis_url: &str, sender: &broadcast::Sender<RawEvent>) -> anyhow::Result<()> {
    let client = redis::Client::open(redis_url)?;
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.psubscribe("job:*:*:*").await?;

    let mut stream = pubsub.on_message();
    while let Some(msg) = futures::StreamExt::next(&mut stream).await {
        let channel: String = msg.get_channel_name().to_string();
        let payload: String = msg.get_payload().unwrap_or_default();
        let _ = sender.send(RawEvent { channel, payload });
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action")]
enum ClientRpc {
    #[serde(rename = "subscribe-to-job")]
    SubscribeToJob { job_id: String },
    #[serde(rename = "unsubscribe-from-job")]
    UnsubscribeFromJob { job_id: String },
    #[serde(rename = "subscribe-to-queue")]
    SubscribeToQueue { queue_name: String },
    #[serde(rename = "unsubscribe-from-queue")]
    UnsubscribeFromQueue { queue_name: String },
    #[serde(rename = "get-subscriptions")]
    GetSubscriptions,
}

#[derive(Debug, Serialize)]
struct Subscriptions<'a> {
    jobs: &'a HashSet<String>,
    queues: &'a HashSet<String>,
}

#[derive(Message)]
#[rtype(result = "()")]
struct Forward(String);

pub struct GatewaySession {
    broker: broadcast::Sender<RawEvent>,
    jobs: HashSet<String>,
    queues: HashSet<String>,
    last_heartbeat: std::time::Instant,
}

impl GatewaySession {
    pub fn new(broker: broadcast::Sender<RawEvent>) -> Self {
        Self {
            broker,
            jobs: HashSet::new(),
            queues: HashSet::new(),
            last_heartbeat: std::time::Instant::now(),
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |session, ctx| {
            if session.last_heartbeat.elapsed() > CLIENT_TIMEOUT {
                tracing::debug!("gateway session timed out, closing");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn matches(&self, channel: &str) -> bool {
        // channel shape: job:<kind>:<queue>:<jobId>
        let mut parts = channel.splitn(4, ':');
        let _ = parts.next();
        let _ = parts.next();
        let queue = parts.next().unwrap_or_default();
        let job_id = parts.next().unwrap_or_default();
        self.jobs.contains(job_id) || self.queues.contains(queue)
    }
}

impl Actor for GatewaySession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.heartbeat(ctx);
        GATEWAY_SUBSCRIBERS.inc();

        let mut receiver = self.broker.subscribe();
        let addr = ctx.address();
        actix_rt::spawn(async move {
            while let Ok(event) = receiver.recv().await {
                if addr.connected() {
                    addr.do_send(Forward(format!("{}\u{0}{}", event.channel, event.payload)));
                } else {
                    break;
                }
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        GATEWAY_SUBSCRIBERS.dec();
    }
}

impl Handler<Forward> for GatewaySession {
    type Result = ();

    fn handle(&mut self, msg: Forward, ctx: &mut Self::Context) {
        if let Some((channel, payload)) = msg.0.split_once('\u{0}') {
            if self.matches(channel) {
                ctx.text(payload.to_string());
            }
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for GatewaySession {
    fn handle(&mut self, item: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let msg = match item {
            Ok(m) => m,
            Err(_) => {
                ctx.stop();
                return;
            }
        };

        match msg {
            ws::Message::Ping(bytes) => {
                self.last_heartbeat = std::time::Instant::now();
                ctx.pong(&bytes);
            }
            ws::Message::Pong(_) => {
                self.last_heartbeat = std::time::Instant::now();
            }
            ws::Message::Text(text) => self.handle_rpc(&text, ctx),
            ws::Message::Close(reason) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl GatewaySession {
    fn handle_rpc(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let rpc: ClientRpc = match serde_json::from_str(text) {
            Ok(r) => r,
            Err(e) => {
                ctx.text(format!(r#"{{"error":"invalid rpc: {e}"}}"#));
                return;
            }
        };

        match rpc {
            ClientRpc::SubscribeToJob { job_id } => {
                self.jobs.insert(job_id);
            }
            ClientRpc::UnsubscribeFromJob { job_id } => {
                self.jobs.remove(&job_id);
            }
            ClientRpc::SubscribeToQueue { queue_name } => {
                self.queues.insert(queue_name);
            }
            ClientRpc::UnsubscribeFromQueue { queue_name } => {
                self.queues.remove(&queue_name);
            }
            ClientRpc::GetSubscriptions => {
                let payload = Subscriptions {
                    jobs: &self.jobs,
                    queues: &self.queues,
                };
                if let Ok(json) = serde_json::to_string(&payload) {
                    ctx.text(json);
                }
            }
        }
    }
}

pub type BrokerBridge = Arc<broadcast::Sender<RawEvent>>;
