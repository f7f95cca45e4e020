//! Per-connection OCPP 1.6 message handler
//!
//! Decodes raw OCPP-J frames: calls go to the [`ActionDispatcher`], answers to
//! our own commands go to the [`CommandSender`](crate::application::commands::CommandSender).

use serde_json::Value;
use tracing::{debug, info, warn};

use super::dispatcher::SharedActionDispatcher;
use crate::support::ocpp_frame::OcppFrame;

pub struct OcppHandler {
    pub charge_point_id: String,
    dispatcher: SharedActionDispatcher,
}

impl OcppHandler {
    pub fn new(charge_point_id: impl Into<String>, dispatcher: SharedActionDispatcher) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            dispatcher,
        }
    }

    /// Handle one inbound text frame; returns the reply to write, if any.
    ///
    /// Malformed frames are logged and dropped without a reply.
    pub async fn handle(&self, text: &str) -> Option<String> {
        debug!(
            charge_point_id = self.charge_point_id.as_str(),
            raw = text,
            "Received frame"
        );

        let frame = match OcppFrame::parse(text) {
            Ok(f) => f,
            Err(e) => {
                warn!(
                    charge_point_id = self.charge_point_id.as_str(),
                    error = %e,
                    raw = text,
                    "Dropping malformed frame"
                );
                metrics::counter!("ocpp_malformed_frames_total").increment(1);
                return None;
            }
        };

        match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => Some(self.handle_call(unique_id, &action, payload).await),

            OcppFrame::CallResult { unique_id, payload } => {
                self.handle_call_result(&unique_id, payload);
                None
            }

            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                ..
            } => {
                self.handle_call_error(&unique_id, &error_code, &error_description);
                None
            }
        }
    }

    async fn handle_call(&self, unique_id: String, action: &str, payload: Value) -> String {
        info!(
            charge_point_id = self.charge_point_id.as_str(),
            action,
            message_id = unique_id.as_str(),
            "Received Call"
        );

        let response = match self
            .dispatcher
            .dispatch(&self.charge_point_id, action, payload)
            .await
        {
            Ok(payload) => OcppFrame::result(unique_id, payload),
            Err(e) => OcppFrame::error_response(unique_id, e.code, e.description),
        };
        response.serialize()
    }

    fn handle_call_result(&self, unique_id: &str, payload: Value) {
        debug!(
            charge_point_id = self.charge_point_id.as_str(),
            message_id = unique_id,
            "Received CallResult"
        );
        self.dispatcher
            .command_sender
            .handle_response(&self.charge_point_id, unique_id, payload);
    }

    fn handle_call_error(&self, unique_id: &str, error_code: &str, error_description: &str) {
        debug!(
            charge_point_id = self.charge_point_id.as_str(),
            message_id = unique_id,
            error_code,
            "Received CallError"
        );
        self.dispatcher.command_sender.handle_error(
            &self.charge_point_id,
            unique_id,
            error_code,
            error_description,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::dispatcher::tests::fixture;
    use std::sync::Arc;

    fn handler() -> OcppHandler {
        OcppHandler::new("CP-1", Arc::new(fixture().dispatcher))
    }

    #[tokio::test]
    async fn call_result_echoes_unique_id() {
        let reply = handler()
            .handle(r#"[2,"Msg-A1","Heartbeat",{}]"#)
            .await
            .unwrap();
        match OcppFrame::parse(&reply).unwrap() {
            OcppFrame::CallResult { unique_id, payload } => {
                assert_eq!(unique_id, "Msg-A1");
                assert!(payload["currentTime"].is_string());
            }
            other => panic!("Expected CallResult, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_action_gets_call_error() {
        let reply = handler()
            .handle(r#"[2,"x9","DataTransfer",{"vendorId":"v"}]"#)
            .await
            .unwrap();
        assert!(reply.starts_with(r#"[4,"x9","NotImplemented","#));
    }

    #[tokio::test]
    async fn malformed_and_answer_frames_get_no_reply() {
        let h = handler();
        assert!(h.handle("garbage").await.is_none());
        assert!(h.handle(r#"[2,"only-two"]"#).await.is_none());
        assert!(h.handle(r#"[3,"unknown-id",{}]"#).await.is_none());
        assert!(h.handle(r#"[4,"unknown-id","GenericError","",{}]"#).await.is_none());
    }
}
