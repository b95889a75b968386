//! Inbound call webhook.
//!
//! When a call arrives the telephony network asks `/voice` what to do. The
//! answer is a small XML document telling it to open a bidirectional media
//! stream to our public WebSocket endpoint.

use crate::{error::AppError, error::AppResult, state::AppState};
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::info;

pub async fn incoming_call(req: HttpRequest, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let stream_url = state.get_config().telephony.stream_url;
    if stream_url.trim().is_empty() {
        return Err(AppError::ConfigError("No media stream URL configured".to_string()));
    }

    info!(method = %req.method(), stream_url = %stream_url, "Incoming call, directing media stream");

    Ok(HttpResponse::Ok()
        .content_type("text/xml; charset=utf-8")
        .body(stream_directive(&stream_url)))
}

/// Build the call directive that connects the call's audio to `stream_url`.
pub fn stream_directive(stream_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
    <Connect>
        <Stream url="{}" />
    </Connect>
</Response>"#,
        escape_attribute(stream_url)
    )
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{test, App};

    #[::core::prelude::v1::test]
    fn test_directive_uses_url_verbatim() {
        let xml = stream_directive("wss://calls.example.com/media-stream");
        assert!(xml.contains(r#"<Stream url="wss://calls.example.com/media-stream" />"#));
        assert!(xml.starts_with("<?xml"));
    }

    #[::core::prelude::v1::test]
    fn test_directive_escapes_query_strings() {
        let xml = stream_directive("wss://host/media-stream?a=1&b=\"2\"");
        assert!(xml.contains("wss://host/media-stream?a=1&amp;b=&quot;2&quot;"));
    }

    #[actix_web::test]
    async fn test_voice_webhook_accepts_get_and_post() {
        let mut config = AppConfig::default();
        config.telephony.stream_url = "wss://bridge.example.com/media-stream".to_string();
        let state = web::Data::new(AppState::new(config));
        let app = test::init_service(App::new().app_data(state).configure(crate::configure_routes)).await;

        for req in [
            test::TestRequest::get().uri("/voice").to_request(),
            test::TestRequest::post()
                .uri("/voice")
                .set_form([("CallSid", "CA123"), ("From", "+15550100")])
                .to_request(),
        ] {
            let resp = test::call_service(&app, req).await;
            assert!(resp.status().is_success());

            let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap().to_string();
            assert!(content_type.starts_with("text/xml"));

            let body = test::read_body(resp).await;
            let body = std::str::from_utf8(&body).unwrap();
            assert!(body.contains("wss://bridge.example.com/media-stream"));
        }
    }

    #[actix_web::test]
    async fn test_voice_webhook_without_stream_url_is_server_error() {
        let mut config = AppConfig::default();
        config.telephony.stream_url = "  ".to_string();
        let state = web::Data::new(AppState::new(config));
        let app = test::init_service(App::new().app_data(state).configure(crate::configure_routes)).await;

        let req = test::TestRequest::post().uri("/voice").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "config_error");
    }
}
