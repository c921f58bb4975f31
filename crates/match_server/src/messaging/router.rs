//! Event Router: turns a validated text frame into a coordinator call.

use crate::{connection::ConnectionId, error::ServerError, messaging::ClientMessage, security};
use match_core::protocol::IdentityPayload;
use match_core::{InboundEvent, MatchCoordinator};
use tracing::debug;

/// Routes one client frame to the coordinator.
///
/// # Arguments
///
/// * `text` - The raw frame text, already checked by the security layer
/// * `connection_id` - The connection the frame arrived on
/// * `coordinator` - The match coordinator
/// * `max_name_chars` - Display names are truncated to this many characters
///
/// # Returns
///
/// `Ok(())` once the event has been dispatched, or `ServerError::Protocol`
/// when the envelope, event name or payload is malformed. Lifecycle
/// rejections are not errors here; the coordinator answers them itself.
pub async fn route_client_message(
    text: &str,
    connection_id: ConnectionId,
    coordinator: &MatchCoordinator,
    max_name_chars: usize,
) -> Result<(), ServerError> {
    let message: ClientMessage = serde_json::from_str(text)
        .map_err(|e| ServerError::Protocol(format!("Invalid envelope: {e}")))?;

    security::input_validation::validate_event_name(&message.event)
        .map_err(|e| ServerError::Protocol(e.to_string()))?;

    let mut event = InboundEvent::parse(&message.event, message.data)
        .map_err(|e| ServerError::Protocol(e.to_string()))?;

    match &mut event {
        InboundEvent::CreateMatch(identity) => sanitize_identity(identity, max_name_chars),
        InboundEvent::JoinMatch(request) => sanitize_identity(&mut request.identity, max_name_chars),
        _ => {}
    }

    debug!(connection_id, "📨 Routing '{}'", message.event);
    coordinator.dispatch(connection_id, event).await;
    Ok(())
}

fn sanitize_identity(identity: &mut IdentityPayload, max_name_chars: usize) {
    if let Some(name) = identity.display_name.as_mut() {
        *name = security::input_validation::sanitize_display_name(name, max_name_chars);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use match_core::protocol::ServerMessage;
    use match_core::testing::recording_coordinator;
    use match_core::{MatchSettings, ShakmatyFactory};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_routes_create_match() {
        let (coordinator, outbox) =
            recording_coordinator(MatchSettings::default(), Arc::new(ShakmatyFactory));

        let frame = r#"{"event":"create-match","data":{"userId":"u1","displayName":"  Ann  "}}"#;
        route_client_message(frame, 1, &coordinator, 32).await.unwrap();

        match outbox.last_for(1) {
            Some(ServerMessage::MatchCreated(view)) => assert_eq!(view.players[0].name, "Ann"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejects_malformed_frames() {
        let (coordinator, outbox) =
            recording_coordinator(MatchSettings::default(), Arc::new(ShakmatyFactory));

        for frame in [
            r#"{"data":{}}"#,
            r#"{"event":"castle-queenside","data":{}}"#,
            r#"{"event":"chess-move","data":{"matchId":"abc"}}"#,
            r#"{"event":"bad name!","data":{}}"#,
        ] {
            let result = route_client_message(frame, 1, &coordinator, 32).await;
            assert!(matches!(result, Err(ServerError::Protocol(_))), "{frame}");
        }
        assert!(outbox.messages().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_without_data() {
        let (coordinator, outbox) =
            recording_coordinator(MatchSettings::default(), Arc::new(ShakmatyFactory));

        route_client_message(r#"{"event":"cancel_match"}"#, 4, &coordinator, 32)
            .await
            .unwrap();
        assert_eq!(outbox.events_for(4), vec!["unauthorized"]);
    }
}
