//! # Media Stream WebSocket Handler
//!
//! The telephony network connects to `/media-stream` once per call and keeps
//! the WebSocket open for the call's lifetime.
//!
//! ## Connection Model:
//! Each accepted upgrade becomes one `MediaStreamSocket` actor. The actor
//! suspends between frames without blocking any other call, owns exactly one
//! `CallSession`, and is the only code that touches it.
//!
//! ## Failure Handling:
//! - **Hang-up** (close frame or end of stream): the session ends quietly
//! - **Malformed frame**: logged and skipped, the call continues
//! - **Transport or encode failure**: logged, the session ends
//!
//! Nothing escapes the actor: one call's trouble never reaches another call
//! or the HTTP server.

use crate::audio::session::{CallSession, SessionAction};
use crate::error::{AppResult, AppError, SessionError};
use crate::protocol::OutboundFrame;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Actor driving one call's media stream.
pub struct MediaStreamSocket {
    /// Local id for correlating log lines before the network assigns a stream id
    connection_id: Uuid,

    /// The call's state machine
    session: CallSession,

    /// Shared counters
    app_state: web::Data<AppState>,
}

impl MediaStreamSocket {
    pub fn new(app_state: web::Data<AppState>) -> Self {
        let settings = app_state.get_config().tones.session_settings();
        Self {
            connection_id: Uuid::new_v4(),
            session: CallSession::new(settings),
            app_state,
        }
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        self.app_state.record_frame_received();

        match self.session.handle_text(text, Instant::now()) {
            Ok(SessionAction::None) => {}
            Ok(SessionAction::Send(frame)) => self.send_frame(frame, ctx),
            Ok(SessionAction::Close) => {
                ctx.close(Some(ws::CloseCode::Normal.into()));
                ctx.stop();
            }
            Err(err) => self.handle_error(err, ctx),
        }
    }

    fn send_frame(&mut self, frame: OutboundFrame, ctx: &mut ws::WebsocketContext<Self>) {
        match frame.to_json() {
            Ok(json) => {
                ctx.text(json);
                self.app_state.record_frame_sent();
            }
            Err(err) => self.handle_error(err, ctx),
        }
    }

    /// Log and count a session error, ending the session when it must end.
    fn handle_error(&mut self, err: SessionError, ctx: &mut ws::WebsocketContext<Self>) {
        self.app_state.record_session_error(&err);

        let stream_sid = self.session.stream_sid().unwrap_or("-").to_string();

        if !err.ends_session() {
            warn!(
                connection_id = %self.connection_id,
                stream_sid = %stream_sid,
                kind = err.kind(),
                "Skipping frame: {}", err
            );
            return;
        }

        if err.is_expected() {
            info!(connection_id = %self.connection_id, stream_sid = %stream_sid, "Call disconnected");
        } else {
            error!(
                connection_id = %self.connection_id,
                stream_sid = %stream_sid,
                kind = err.kind(),
                "Ending call session: {}", err
            );
        }

        self.session.terminate();
        ctx.stop();
    }
}

impl Actor for MediaStreamSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        self.app_state.call_opened();
        info!(connection_id = %self.connection_id, "Media stream connected");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.session.terminate();
        self.app_state.call_closed();

        let stats = self.session.stats();
        info!(
            connection_id = %self.connection_id,
            stream_sid = self.session.stream_sid().unwrap_or("-"),
            frames_received = stats.frames_received,
            media_frames = stats.media_frames_received,
            audio_bytes = stats.audio_bytes_received,
            inbound_peak = stats.inbound_peak,
            frames_sent = stats.frames_sent,
            heartbeats = stats.heartbeats_sent,
            malformed = stats.malformed_frames,
            "Media stream closed"
        );
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for MediaStreamSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.handle_text(&text, ctx),
            Ok(ws::Message::Binary(data)) => {
                let err = SessionError::MalformedFrame(format!("unexpected binary message of {} bytes", data.len()));
                self.handle_error(err, ctx);
            }
            Ok(ws::Message::Ping(data)) => ctx.pong(&data),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                debug!(connection_id = %self.connection_id, "Close frame received: {:?}", reason);
                ctx.close(reason);
                self.handle_error(SessionError::Disconnected, ctx);
            }
            Ok(ws::Message::Continuation(_)) => {
                let err = SessionError::MalformedFrame("unexpected continuation frame".to_string());
                self.handle_error(err, ctx);
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => self.handle_error(SessionError::Transport(err.to_string()), ctx),
        }
    }

    /// The inbound stream ended without a close frame (the peer dropped the connection).
    fn finished(&mut self, ctx: &mut Self::Context) {
        if !self.session.is_terminated() {
            self.handle_error(SessionError::Disconnected, ctx);
        } else {
            ctx.stop();
        }
    }
}

/// WebSocket upgrade handler for `/media-stream`.
pub async fn media_stream(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    debug!("Media stream upgrade requested from {:?}", req.connection_info().peer_addr());

    ws::start(MediaStreamSocket::new(app_state), &req, stream)
        .map_err(|e| AppError::BadRequest(format!("WebSocket handshake failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tone::synthesize_tone;
    use crate::config::AppConfig;
    use actix_web::{test, App, HttpServer};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;

    #[actix_web::test]
    async fn test_plain_get_is_rejected() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let app = test::init_service(App::new().app_data(state).configure(crate::configure_routes)).await;

        let req = test::TestRequest::get().uri("/media-stream").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }

    const START: &str = r#"{"event":"start","start":{"streamSid":"MZ42","callSid":"CA42"}}"#;

    type Client = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

    /// Serve the full route table on an ephemeral port.
    fn spawn_bridge(state: web::Data<AppState>) -> (std::net::SocketAddr, actix_web::dev::ServerHandle) {
        let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(crate::configure_routes))
            .workers(1)
            .bind(("127.0.0.1", 0))
            .unwrap();

        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);
        (addr, handle)
    }

    /// Connect, start a stream and return the client with the greeting payload.
    async fn start_call(addr: std::net::SocketAddr) -> (Client, Vec<u8>) {
        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{}/media-stream", addr))
            .await
            .unwrap();

        client
            .send(Message::Text(r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#.into()))
            .await
            .unwrap();
        client.send(Message::Text(START.into())).await.unwrap();

        let reply = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("greeting should arrive")
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply.into_text().unwrap()).unwrap();
        assert_eq!(value["event"], "media");
        assert_eq!(value["streamSid"], "MZ42");
        let payload = STANDARD.decode(value["media"]["payload"].as_str().unwrap()).unwrap();
        (client, payload)
    }

    async fn wait_for_no_active_calls(state: &AppState) {
        for _ in 0..100 {
            if state.get_metrics_snapshot().active_calls == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("call was never closed");
    }

    async fn stop_call(client: &mut Client) {
        client
            .send(Message::Text(r#"{"event":"stop","stop":{}}"#.into()))
            .await
            .unwrap();
        match timeout(Duration::from_secs(5), client.next()).await.unwrap() {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => {}
            Some(Ok(other)) => panic!("Unexpected frame after stop: {:?}", other),
        }
    }

    #[actix_web::test]
    async fn test_call_over_websocket() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let (addr, handle) = spawn_bridge(state.clone());

        let (mut client, greeting) = start_call(addr).await;
        assert_eq!(greeting, synthesize_tone(300, 880, 8000));

        // None of these produce audio, and none of them end the call
        for text in [
            "this is not json",
            r#"{"event":"dtmf","dtmf":{"digit":"7"}}"#,
            r#"{"event":"media","media":{"payload":"//7+"}}"#,
        ] {
            client.send(Message::Text(text.into())).await.unwrap();
        }
        assert!(
            timeout(Duration::from_millis(300), client.next()).await.is_err(),
            "no frame expected before the heartbeat is due"
        );

        stop_call(&mut client).await;
        wait_for_no_active_calls(&state).await;

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.frames_sent, 1);
        assert_eq!(metrics.malformed_frames, 1);
        assert_eq!(metrics.sessions_failed, 0);

        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn test_dropped_connection_ends_call_quietly() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let (addr, handle) = spawn_bridge(state.clone());

        let (client, _) = start_call(addr).await;
        assert_eq!(state.get_metrics_snapshot().active_calls, 1);

        // No close frame: the TCP connection just goes away
        drop(client);
        wait_for_no_active_calls(&state).await;

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.sessions_failed, 0);

        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn test_close_frame_ends_call_quietly() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let (addr, handle) = spawn_bridge(state.clone());

        let (mut client, _) = start_call(addr).await;
        client.close(None).await.unwrap();
        wait_for_no_active_calls(&state).await;

        assert_eq!(state.get_metrics_snapshot().sessions_failed, 0);

        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn test_binary_frame_is_skipped() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let (addr, handle) = spawn_bridge(state.clone());

        let (mut client, _) = start_call(addr).await;
        client.send(Message::Binary(vec![0xFF; 160].into())).await.unwrap();
        assert!(
            timeout(Duration::from_millis(300), client.next()).await.is_err(),
            "a binary frame must not close the call"
        );
        assert_eq!(state.get_metrics_snapshot().active_calls, 1);

        stop_call(&mut client).await;
        wait_for_no_active_calls(&state).await;

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.malformed_frames, 1);
        assert_eq!(metrics.sessions_failed, 0);

        handle.stop(true).await;
    }
}
