//! `join` handshake: binds a fresh connection to one gallery.

use darkroom_protocol::constants::{ERR_CODE_INTERNAL, EventType};
use darkroom_protocol::messages::{JoinReply, JoinRequest};

use crate::ws_client::{LiveError, WsClient};

/// Sends `join` and waits for the server to acknowledge it.
///
/// A client-side error reply (bad token, unknown gallery) is reported as
/// [`LiveError::JoinRejected`] so the manager can tell "try again later"
/// apart from "never going to work". Server failures stay
/// [`LiveError::Server`].
pub(crate) async fn perform_join(
    client: &WsClient,
    join: &JoinRequest,
) -> Result<JoinReply, LiveError> {
    let resp = match client.send_request(EventType::Join, Some(join)).await {
        Ok(resp) => resp,
        Err(LiveError::Server { code, message }) if code < ERR_CODE_INTERNAL => {
            return Err(LiveError::JoinRejected(message));
        }
        Err(e) => return Err(e),
    };

    if !matches!(resp.event, EventType::Joined | EventType::Reply) {
        return Err(LiveError::JoinRejected(format!(
            "unexpected reply {:?}",
            resp.event
        )));
    }

    let reply = resp
        .parse_payload::<JoinReply>()?
        .unwrap_or_else(|| JoinReply {
            group_id: join.group_id.clone(),
        });
    if reply.group_id != join.group_id {
        return Err(LiveError::JoinRejected(format!(
            "joined {} instead of {}",
            reply.group_id, join.group_id
        )));
    }
    Ok(reply)
}
