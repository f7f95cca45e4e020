//! OCPP 1.6 WebSocket server
//!
//! Accepts charge-point connections at `ws://<host>:<port>/ocpp16/{charge_point_id}`
//! (also `/ocpp/{id}` and `/{id}`).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::application::handlers::{OcppHandler, SharedActionDispatcher};
use crate::application::session::SharedSessionRegistry;
use crate::support::shutdown::ShutdownSignal;

/// OCPP 1.6 WebSocket subprotocol
const OCPP_SUBPROTOCOL: &str = "ocpp1.6";

/// How long a closing connection may spend flushing queued frames
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Everything a connection task needs
#[derive(Clone)]
struct ConnectionContext {
    session_registry: SharedSessionRegistry,
    dispatcher: SharedActionDispatcher,
    shutdown: ShutdownSignal,
    accepting: Arc<AtomicBool>,
}

/// OCPP WebSocket Server
pub struct OcppServer {
    address: String,
    context: ConnectionContext,
}

impl OcppServer {
    pub fn new(
        address: impl Into<String>,
        session_registry: SharedSessionRegistry,
        dispatcher: SharedActionDispatcher,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            address: address.into(),
            context: ConnectionContext {
                session_registry,
                dispatcher,
                shutdown,
                accepting: Arc::new(AtomicBool::new(true)),
            },
        }
    }

    /// Pause or resume accepting new charge points.
    ///
    /// While paused, handshakes are refused with 503; live sessions keep running.
    pub fn set_accepting(&self, accepting: bool) {
        let previous = self.context.accepting.swap(accepting, Ordering::SeqCst);
        if previous != accepting {
            info!(accepting, "OCPP server accepting state changed");
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.context.accepting.load(Ordering::SeqCst)
    }

    pub fn session_registry(&self) -> &SharedSessionRegistry {
        &self.context.session_registry
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> ServerResult<()> {
        let listener = TcpListener::bind(&self.address).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> ServerResult<()> {
        let local = listener.local_addr()?;
        info!("OCPP 1.6 Central System started on ws://{}", local);
        info!(
            "   Charge points should connect to: ws://{}/ocpp16/{{charge_point_id}}",
            local
        );

        let stop = self.context.shutdown.notified().wait();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) => error!(error = %e, "Failed to accept connection"),
                    }
                }
                _ = &mut stop => {
                    info!(
                        open_sessions = self.context.session_registry.count(),
                        "WebSocket listener stopped"
                    );
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let context = self.context.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, context).await {
                warn!(peer = %addr, error = %e, "Connection error");
            }
        });
    }
}

/// Extract charge point ID from WebSocket request path.
/// Accepted: /ocpp16/{id}, /ocpp/{id} or /{id}
fn extract_charge_point_id(path: &str) -> Option<String> {
    let path = path.trim_start_matches('/');

    for prefix in ["ocpp16/", "ocpp/"] {
        if let Some(id) = path.strip_prefix(prefix) {
            let id = id.trim_matches('/');
            return (!id.is_empty() && !id.contains('/')).then(|| id.to_string());
        }
    }

    let id = path.trim_end_matches('/');
    if id.is_empty() || id.contains('/') || id == "ocpp16" || id == "ocpp" {
        return None;
    }
    Some(id.to_string())
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

fn requests_ocpp16(req: &Request) -> bool {
    req.headers()
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|p| p.trim() == OCPP_SUBPROTOCOL)
}

/// Handle a single WebSocket connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    context: ConnectionContext,
) -> ServerResult<()> {
    debug!(peer = %addr, "New TCP connection");

    let mut charge_point_id: Option<String> = None;
    let accepting = context.accepting.clone();

    let ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, mut response: Response| {
            let path = req.uri().path();

            if !accepting.load(Ordering::SeqCst) {
                warn!(peer = %addr, path, "Refusing connection, server paused");
                return Err(reject(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Central system is not accepting connections",
                ));
            }

            let Some(id) = extract_charge_point_id(path) else {
                warn!(peer = %addr, path, "Refusing connection without charge point id");
                return Err(reject(StatusCode::BAD_REQUEST, "Missing charge point id in path"));
            };

            if requests_ocpp16(req) {
                response
                    .headers_mut()
                    .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(OCPP_SUBPROTOCOL));
            } else {
                debug!(charge_point_id = id.as_str(), "Client did not request ocpp1.6");
            }

            charge_point_id = Some(id);
            Ok(response)
        },
    )
    .await?;

    let Some(charge_point_id) = charge_point_id else {
        return Ok(());
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Replies go out on this connection's own sender; the registry copy only
    // makes the connection reachable for pushed commands.
    let reply_tx = tx.clone();
    let registered = context.session_registry.register(&charge_point_id, tx);
    let connection_id = registered.connection_id;
    info!(
        charge_point_id = charge_point_id.as_str(),
        connection_id,
        peer = %addr,
        "Charge point connected"
    );

    let cp_id_send = charge_point_id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            debug!(charge_point_id = cp_id_send.as_str(), raw = msg.as_str(), "Sending frame");
            if let Err(e) = ws_sender.send(Message::Text(msg)).await {
                warn!(charge_point_id = cp_id_send.as_str(), error = %e, "Send error");
                return;
            }
        }
        let _ = ws_sender.close().await;
    });
    let mut writer_done = false;

    let handler = OcppHandler::new(charge_point_id.clone(), context.dispatcher.clone());
    let stop = context.shutdown.notified().wait();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => {
                info!(
                    charge_point_id = charge_point_id.as_str(),
                    "Connection closing due to server shutdown"
                );
                break;
            }
            _ = &mut writer => {
                writer_done = true;
                debug!(charge_point_id = charge_point_id.as_str(), connection_id, "Writer finished");
                break;
            }
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        context.session_registry.touch(&charge_point_id);
                        if let Some(reply) = handler.handle(&text).await {
                            if reply_tx.send(reply).is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        warn!(
                            charge_point_id = charge_point_id.as_str(),
                            bytes = data.len(),
                            "Binary message ignored"
                        );
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(
                            charge_point_id = charge_point_id.as_str(),
                            ?frame,
                            "Close frame received"
                        );
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(charge_point_id = charge_point_id.as_str(), error = %e, "WebSocket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    if context
        .session_registry
        .unregister(&charge_point_id, connection_id)
    {
        context
            .dispatcher
            .command_sender
            .cleanup_charge_point(&charge_point_id);
    }

    // Writer drains what is queued, then closes the socket
    drop(reply_tx);
    if !writer_done {
        let abort = writer.abort_handle();
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
            abort.abort();
        }
    }

    info!(
        charge_point_id = charge_point_id.as_str(),
        connection_id, "Charge point disconnected"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::ActionDispatcher;
    use crate::application::{create_command_sender, ChargingService, SessionRegistry};
    use crate::config::OcppSettings;
    use crate::domain::ChargingStore;
    use crate::infrastructure::InMemoryStorage;
    use crate::support::ocpp_frame::OcppFrame;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::Error as WsError;

    struct TestServer {
        server: Arc<OcppServer>,
        url: String,
        shutdown: ShutdownSignal,
    }

    async fn start_server() -> TestServer {
        let store = Arc::new(InMemoryStorage::new()) as Arc<dyn ChargingStore>;
        let registry = SessionRegistry::shared();
        let command_sender = create_command_sender(registry.clone(), Duration::from_secs(5));
        let dispatcher = Arc::new(ActionDispatcher::new(
            Arc::new(ChargingService::new(store)),
            command_sender,
            OcppSettings::default(),
        ));
        let shutdown = ShutdownSignal::new();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(OcppServer::new(
            addr.to_string(),
            registry,
            dispatcher,
            shutdown.clone(),
        ));
        let serving = server.clone();
        tokio::spawn(async move { serving.serve(listener).await });

        TestServer {
            server,
            url: format!("ws://{addr}"),
            shutdown,
        }
    }

    async fn next_text<S>(ws: &mut S) -> String
    where
        S: futures_util::Stream<Item = Result<Message, WsError>> + Unpin,
    {
        loop {
            if let Message::Text(text) = ws.next().await.unwrap().unwrap() {
                return text;
            }
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn charge_point_id_from_path() {
        assert_eq!(extract_charge_point_id("/ocpp16/CP-1"), Some("CP-1".into()));
        assert_eq!(extract_charge_point_id("/ocpp/CP-2/"), Some("CP-2".into()));
        assert_eq!(extract_charge_point_id("/CP-3"), Some("CP-3".into()));
        assert_eq!(extract_charge_point_id("/"), None);
        assert_eq!(extract_charge_point_id("/ocpp16/"), None);
        assert_eq!(extract_charge_point_id("/ocpp16"), None);
        assert_eq!(extract_charge_point_id("/a/b/c"), None);
    }

    #[tokio::test]
    async fn boot_notification_round_trip() {
        let t = start_server().await;
        let mut request = format!("{}/ocpp16/CP-9", t.url).into_client_request().unwrap();
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(OCPP_SUBPROTOCOL));

        let (mut ws, response) = connect_async(request).await.unwrap();
        assert_eq!(
            response
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .and_then(|v| v.to_str().ok()),
            Some(OCPP_SUBPROTOCOL)
        );

        ws.send(Message::Text(
            r#"[2,"boot-1","BootNotification",{"chargePointVendor":"Acme","chargePointModel":"Wallbox"}]"#
                .to_string(),
        ))
        .await
        .unwrap();

        let reply = loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => break text,
                _ => continue,
            }
        };
        match OcppFrame::parse(&reply).unwrap() {
            OcppFrame::CallResult { unique_id, payload } => {
                assert_eq!(unique_id, "boot-1");
                assert_eq!(payload["status"], "Accepted");
            }
            other => panic!("Expected CallResult, got {other:?}"),
        }

        let registry = t.server.session_registry().clone();
        assert!(registry.is_connected("CP-9"));

        // malformed frames leave the connection open
        ws.send(Message::Text("not json".to_string())).await.unwrap();
        ws.send(Message::Text(r#"[2,"hb-1","Heartbeat",{}]"#.to_string()))
            .await
            .unwrap();
        let reply = loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => break text,
                _ => continue,
            }
        };
        assert!(reply.starts_with(r#"[3,"hb-1","#));

        ws.close(None).await.unwrap();
        wait_until(|| !registry.is_connected("CP-9")).await;
    }

    #[tokio::test]
    async fn handshake_without_id_is_refused() {
        let t = start_server().await;
        match connect_async(format!("{}/", t.url)).await {
            Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::BAD_REQUEST),
            other => panic!("Expected HTTP 400, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn paused_server_refuses_new_connections() {
        let t = start_server().await;
        t.server.set_accepting(false);
        match connect_async(format!("{}/ocpp16/CP-1", t.url)).await {
            Err(WsError::Http(response)) => {
                assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE)
            }
            other => panic!("Expected HTTP 503, got {:?}", other.map(|_| ())),
        }

        t.server.set_accepting(true);
        assert!(connect_async(format!("{}/ocpp16/CP-1", t.url)).await.is_ok());
    }

    #[tokio::test]
    async fn reconnect_replaces_registry_entry_only() {
        let t = start_server().await;
        let registry = t.server.session_registry().clone();

        let (mut first, _) = connect_async(format!("{}/ocpp/CP-5", t.url)).await.unwrap();
        wait_until(|| registry.is_connected("CP-5")).await;
        let (mut second, _) = connect_async(format!("{}/ocpp/CP-5", t.url)).await.unwrap();

        // a reply proves the second session is registered
        second
            .send(Message::Text(r#"[2,"hb-new","Heartbeat",{}]"#.to_string()))
            .await
            .unwrap();
        assert!(next_text(&mut second).await.starts_with(r#"[3,"hb-new","#));
        assert_eq!(registry.count(), 1);

        // the replaced connection stays open and still answers its own calls
        first
            .send(Message::Text(r#"[2,"hb-old","Heartbeat",{}]"#.to_string()))
            .await
            .unwrap();
        assert!(next_text(&mut first).await.starts_with(r#"[3,"hb-old","#));

        // pushed frames reach only the newest connection
        let push = OcppFrame::Call {
            unique_id: "srv-1".to_string(),
            action: "TriggerMessage".to_string(),
            payload: serde_json::json!({"requestedMessage": "MeterValues"}),
        };
        registry.send("CP-5", &push).unwrap();
        assert!(next_text(&mut second).await.starts_with(r#"[2,"srv-1","TriggerMessage""#));
        assert!(
            tokio::time::timeout(Duration::from_millis(300), first.next())
                .await
                .is_err(),
            "replaced connection must not receive pushed frames"
        );

        // closing the old connection leaves the new registration in place
        first.close(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.is_connected("CP-5"));
    }

    #[tokio::test]
    async fn shutdown_unregisters_sessions() {
        let t = start_server().await;
        let registry = t.server.session_registry().clone();
        let (_ws, _) = connect_async(format!("{}/CP-7", t.url)).await.unwrap();
        wait_until(|| registry.is_connected("CP-7")).await;

        t.shutdown.trigger();
        wait_until(|| registry.count() == 0).await;
    }
}
