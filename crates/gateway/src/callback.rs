use {
    axum::{
        extract::{Query, State},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde::Deserialize,
    tracing::{debug, info, warn},
};

use {huddle_sessions::Error as SessionError, huddle_wecom::CallbackEnvelope};

use crate::state::AppState;

/// Query parameters WeCom attaches to every callback request. The signature
/// triplet is consumed by the fronting decryption layer; it arrives here only
/// for logging.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub msg_signature: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub echostr: Option<String>,
}

/// GET: URL verification handshake. The platform expects the echo string
/// back in the response body.
pub async fn verify(Query(query): Query<CallbackQuery>) -> Response {
    match query.echostr {
        Some(echostr) if !echostr.is_empty() => {
            info!("callback url verification succeeded");
            (StatusCode::OK, echostr).into_response()
        },
        _ => {
            warn!("callback url verification without echostr");
            (StatusCode::BAD_REQUEST, "missing echostr").into_response()
        },
    }
}

/// POST: one decrypted callback envelope per request.
///
/// Text messages are enqueued; events and media kinds are acknowledged and
/// dropped (only text is actionable). The platform requires an immediate
/// acknowledgement, so the success body is always the literal `success`;
/// the actual reply is delivered asynchronously by the pipeline.
pub async fn inbound(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> Response {
    debug!(
        signature = query.msg_signature.as_deref().unwrap_or(""),
        nonce = query.nonce.as_deref().unwrap_or(""),
        bytes = body.len(),
        "callback received"
    );

    let envelope = match CallbackEnvelope::parse(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "unparseable callback body");
            return (StatusCode::BAD_REQUEST, "invalid envelope").into_response();
        },
    };

    if envelope.is_event() {
        debug!(
            user_id = %envelope.from_user_name,
            event = envelope.event.as_deref().unwrap_or("unknown"),
            "event callback acknowledged"
        );
        return (StatusCode::OK, "success").into_response();
    }

    let user_id = envelope.from_user_name.clone();
    let Some(message) = envelope.into_message() else {
        debug!(user_id = %user_id, "non-text callback acknowledged and dropped");
        return (StatusCode::OK, "success").into_response();
    };

    info!(user_id = %user_id, message_id = %message.id, "text message received");
    match state.submit(message) {
        Ok(()) => (StatusCode::OK, "success").into_response(),
        // Transient-failure signal: the platform retries the callback later.
        Err(SessionError::CapacityExceeded { max }) => {
            warn!(user_id = %user_id, max, "rejecting message, session capacity reached");
            (StatusCode::SERVICE_UNAVAILABLE, "capacity exceeded").into_response()
        },
    }
}
