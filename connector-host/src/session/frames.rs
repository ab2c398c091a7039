//! Wire frame shapes for the WebSocket control-plane protocol.

use serde::{Deserialize, Serialize};

use crate::error::WireError;

/// Every inbound frame carries at least `type`; everything else is
/// validated per-variant once the `type` tag is known.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum InboundFrame {
    Ping {
        #[serde(default)]
        request_id: Option<String>,
    },
    ListConnectors {
        #[serde(default)]
        request_id: Option<String>,
    },
    Operation {
        #[serde(default)]
        request_id: Option<String>,
        connector_id: String,
        operation: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum OutboundFrame {
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        timestamp: String,
        connectors: Vec<String>,
    },
    Connectors {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        connectors: Vec<String>,
    },
    Response {
        request_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<WireError>,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        error: WireError,
    },
    ServiceInfo {
        service: String,
        started_at: String,
        connectors: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_frame_deserializes_required_fields() {
        let raw = serde_json::json!({
            "type": "operation",
            "requestId": "r1",
            "connectorId": "inst-1",
            "operation": "get",
            "payload": {"objectClass": "User", "uid": "u1"}
        });
        let frame: InboundFrame = serde_json::from_value(raw).unwrap();
        match frame {
            InboundFrame::Operation { request_id, connector_id, operation, .. } => {
                assert_eq!(request_id.as_deref(), Some("r1"));
                assert_eq!(connector_id, "inst-1");
                assert_eq!(operation, "get");
            }
            _ => panic!("expected Operation frame"),
        }
    }

    #[test]
    fn ping_frame_without_request_id_parses() {
        let raw = serde_json::json!({"type": "ping"});
        let frame: InboundFrame = serde_json::from_value(raw).unwrap();
        assert!(matches!(frame, InboundFrame::Ping { request_id: None }));
    }

    #[test]
    fn response_frame_serializes_success_shape() {
        let frame = OutboundFrame::Response {
            request_id: "r1".to_string(),
            success: true,
            result: Some(serde_json::json!({"uid": "u1"})),
            error: None,
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "response");
        assert_eq!(value["success"], true);
        assert!(value.get("error").is_none());
    }
}
