/// `GET /socket.io` — WebSocket upgrade into a `GatewaySession`, the
/// client's window onto job lifecycle events.
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;

use crate::events::gateway::{BrokerBridge, GatewaySession};

pub async fn socket_io(
    req: HttpRequest,
    stream: web::Payload,
    broker: web::Data<BrokerBridge>,
) -> Result<HttpResponse, Error> {
    let sender = broker.get_ref().as_ref().clone();
    ws::start(GatewaySession::new(sender), &req, stream)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/socket.io", web::get().to(socket_io));
}
