//! Inbound frame handling for an open connection.

use std::sync::Arc;

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

use seance_core::envelope::{SendMessagePayload, validate_message};
use seance_core::{Envelope, EventKind, Identity, ProtocolError, SessionId};
use seance_spirit::{Exchange, GenerationRequest};

use super::connection::Connection;
use super::context::SessionContext;
use crate::metrics::{MESSAGES_RECEIVED_TOTAL, MESSAGES_REJECTED_TOTAL};

/// Handle one text frame from `connection`.
///
/// Malformed frames and invalid questions get a unicast `error`. An accepted
/// question is echoed to the whole session as `message_received`, then
/// answered on a background task; its handle is returned.
pub fn handle_frame(
    ctx: &Arc<SessionContext>,
    connection: &Connection,
    session_id: &SessionId,
    identity: &Identity,
    text: &str,
) -> Option<JoinHandle<()>> {
    let envelope = match Envelope::from_json(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            reject(ctx, connection, &e);
            return None;
        }
    };

    match envelope.kind() {
        EventKind::SendMessage => handle_send_message(ctx, connection, session_id, identity, &envelope),
        other => {
            debug!(connection_id = %connection.id, event = %other, "ignoring unsupported event");
            None
        }
    }
}

fn handle_send_message(
    ctx: &Arc<SessionContext>,
    connection: &Connection,
    session_id: &SessionId,
    identity: &Identity,
    envelope: &Envelope,
) -> Option<JoinHandle<()>> {
    let payload: SendMessagePayload = match envelope.payload_as() {
        Ok(payload) => payload,
        Err(e) => {
            reject(ctx, connection, &e);
            return None;
        }
    };
    let question = match validate_message(&payload.message) {
        Ok(question) => question.to_owned(),
        Err(e) => {
            reject(ctx, connection, &e);
            return None;
        }
    };
    if let Some(claimed) = payload.user_name.as_deref().filter(|n| *n != identity.name) {
        debug!(claimed, name = %identity.name, "ignoring user_name that differs from handshake");
    }

    counter!(MESSAGES_RECEIVED_TOTAL).increment(1);
    let _ = ctx.broadcaster.broadcast(
        session_id,
        &Envelope::message_received(&identity.name, &question),
        None,
    );

    let request = GenerationRequest {
        session_id: session_id.clone(),
        question,
        asker: identity.name.clone(),
        history: ctx.history.recent(session_id),
    };
    let span = info_span!("spirit", session_id = %session_id, asker = %identity.name);
    Some(tokio::spawn(answer(Arc::clone(ctx), request).instrument(span)))
}

/// Generate and fan out the spirit's answer to one question.
async fn answer(ctx: Arc<SessionContext>, request: GenerationRequest) {
    let session_id = request.session_id.clone();
    let _ = ctx
        .broadcaster
        .broadcast(&session_id, &Envelope::spirit_thinking(), None);

    let result = ctx.pipeline.generate(&request).await;

    let report = ctx.broadcaster.broadcast(
        &session_id,
        &Envelope::spirit_response(&result.text, result.word_count, &result.timings),
        None,
    );
    if report.attempted == 0 {
        debug!("session emptied before the spirit answered");
        return;
    }

    if !result.fallback && ctx.registry.has_session(&session_id) {
        ctx.history.record(
            &session_id,
            Exchange {
                asker: request.asker,
                question: request.question,
                answer: result.text,
            },
        );
    }
}

fn reject(ctx: &SessionContext, connection: &Connection, err: &ProtocolError) {
    warn!(connection_id = %connection.id, code = err.code(), error = %err, "rejected frame");
    counter!(MESSAGES_REJECTED_TOTAL, "code" => err.code()).increment(1);
    let _ = ctx
        .broadcaster
        .send_to(connection, &Envelope::from_protocol_error(err));
}
