//! Socket.IO v4 packets carried over Engine.IO v4 text frames.
//!
//! Only the websocket transport and the default namespace are spoken.
//! Binary attachments are not supported.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

/// Handshake sent by the server in the Engine.IO `open` packet.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Client → server carries the auth payload, server → client the session id.
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, data: Value },
    ConnectError(Value),
}

pub fn decode(frame: &str) -> ApiResult<EnginePacket> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or_else(|| malformed(frame))?;
    let rest = chars.as_str();
    match kind {
        '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping),
        '3' => Ok(EnginePacket::Pong),
        '4' => decode_socket(rest).map(EnginePacket::Message),
        '6' => Ok(EnginePacket::Noop),
        _ => Err(malformed(frame)),
    }
}

fn decode_socket(body: &str) -> ApiResult<SocketPacket> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or_else(|| malformed(body))?;
    let mut rest = chars.as_str();

    // Namespace prefix, e.g. "/admin,". Only "/" is joined so it is skipped.
    if rest.starts_with('/') {
        rest = rest.split_once(',').map(|(_, r)| r).unwrap_or("");
    }
    // Ack id.
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    rest = &rest[digits..];

    let payload = if rest.is_empty() { None } else { Some(serde_json::from_str::<Value>(rest)?) };

    match kind {
        '0' => Ok(SocketPacket::Connect(payload)),
        '1' => Ok(SocketPacket::Disconnect),
        '2' => {
            let Some(Value::Array(mut args)) = payload else {
                return Err(malformed(body));
            };
            if args.is_empty() {
                return Err(malformed(body));
            }
            let name = match args.remove(0) {
                Value::String(s) => s,
                _ => return Err(malformed(body)),
            };
            let data = if args.is_empty() { Value::Null } else { args.remove(0) };
            Ok(SocketPacket::Event { name, data })
        }
        '4' => Ok(SocketPacket::ConnectError(payload.unwrap_or(Value::Null))),
        _ => Err(malformed(body)),
    }
}

pub fn encode(packet: &EnginePacket) -> String {
    match packet {
        EnginePacket::Open(info) => format!("0{}", serde_json::json!({ "sid": info.sid })),
        EnginePacket::Close => "1".into(),
        EnginePacket::Ping => "2".into(),
        EnginePacket::Pong => "3".into(),
        EnginePacket::Noop => "6".into(),
        EnginePacket::Message(socket) => format!("4{}", encode_socket(socket)),
    }
}

fn encode_socket(packet: &SocketPacket) -> String {
    match packet {
        SocketPacket::Connect(None) => "0".into(),
        SocketPacket::Connect(Some(auth)) => format!("0{}", auth),
        SocketPacket::Disconnect => "1".into(),
        SocketPacket::Event { name, data } => {
            let args = if data.is_null() {
                Value::Array(vec![Value::String(name.clone())])
            } else {
                Value::Array(vec![Value::String(name.clone()), data.clone()])
            };
            format!("2{}", args)
        }
        SocketPacket::ConnectError(v) => format!("4{}", v),
    }
}

fn malformed(frame: &str) -> ApiError {
    ApiError::Transport(format!("malformed packet: {frame:.64}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_open_handshake() {
        let p = decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#)
            .unwrap();
        match p {
            EnginePacket::Open(info) => {
                assert_eq!(info.sid, "abc");
                assert_eq!(info.ping_interval, 25000);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decodes_event_with_payload() {
        let p = decode(r#"42["newMessage",{"id":"m1","conversationId":"c1"}]"#).unwrap();
        assert_eq!(
            p,
            EnginePacket::Message(SocketPacket::Event {
                name: "newMessage".into(),
                data: json!({ "id": "m1", "conversationId": "c1" }),
            })
        );
    }

    #[test]
    fn skips_namespace_and_ack_id() {
        let p = decode(r#"42/chat,17["typing:start",{"conversationId":"c1"}]"#).unwrap();
        let EnginePacket::Message(SocketPacket::Event { name, .. }) = p else {
            panic!("expected event");
        };
        assert_eq!(name, "typing:start");
    }

    #[test]
    fn encodes_connect_with_auth() {
        let frame = encode(&EnginePacket::Message(SocketPacket::Connect(Some(json!({ "token": "t" })))));
        assert_eq!(frame, r#"40{"token":"t"}"#);
    }

    #[test]
    fn encodes_event() {
        let frame = encode(&EnginePacket::Message(SocketPacket::Event {
            name: "joinConversation".into(),
            data: json!("c1"),
        }));
        assert_eq!(frame, r#"42["joinConversation","c1"]"#);
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode("").is_err());
        assert!(decode("9").is_err());
        assert!(decode("42{}").is_err());
    }

    #[test]
    fn ping_and_connect_error() {
        assert_eq!(decode("2").unwrap(), EnginePacket::Ping);
        assert_eq!(
            decode(r#"44{"message":"Authentication error"}"#).unwrap(),
            EnginePacket::Message(SocketPacket::ConnectError(json!({ "message": "Authentication error" })))
        );
    }
}
