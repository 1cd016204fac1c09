//! Wire codec
//!
//! Every message is a single-line JSON array whose first element names the
//! message type. Outgoing: `EVENT`, `REQ`, `CLOSE`. Incoming: `EVENT`,
//! `NOTICE`, `EOSE`. A text frame may carry several newline-joined messages;
//! each line is decoded independently so one bad line never poisons the rest.

use crate::core::event::{Event, Filter};
use crate::error::{RelayError, Result};
use serde_json::Value;

/// Messages sent from client to relay
#[derive(Debug, Clone)]
pub enum ClientMessage<'a> {
    /// `["EVENT", <event>]`
    Event(&'a Event),
    /// `["REQ", <subscription_id>, <filter>, <filter>, ...]`
    Req {
        subscription_id: &'a str,
        filters: &'a [Filter],
    },
    /// `["CLOSE", <subscription_id>]`
    Close { subscription_id: &'a str },
}

impl ClientMessage<'_> {
    /// Serialize to a single-line JSON array
    pub fn encode(&self) -> Result<String> {
        let value = match self {
            ClientMessage::Event(event) => {
                Value::Array(vec![Value::from("EVENT"), serde_json::to_value(event)?])
            }
            ClientMessage::Req {
                subscription_id,
                filters,
            } => {
                let mut arr = Vec::with_capacity(filters.len() + 2);
                arr.push(Value::from("REQ"));
                arr.push(Value::from(*subscription_id));
                for filter in filters.iter() {
                    arr.push(serde_json::to_value(filter)?);
                }
                Value::Array(arr)
            }
            ClientMessage::Close { subscription_id } => {
                Value::Array(vec![Value::from("CLOSE"), Value::from(*subscription_id)])
            }
        };
        Ok(value.to_string())
    }
}

/// Messages sent from relay to client
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    /// `["EVENT", <subscription_id>, <event>]`
    Event {
        subscription_id: String,
        event: Event,
    },
    /// `["NOTICE", <message>]`
    Notice { message: String },
    /// `["EOSE", <subscription_id>]`
    Eose { subscription_id: String },
}

impl RelayMessage {
    /// Decode one JSON-array message
    ///
    /// # Returns
    /// * `Ok(message)` - One of the three recognized shapes
    /// * `Err(RelayError::DecodeFailed)` - Malformed JSON, wrong shape, or an
    ///   unrecognized message type
    pub fn decode(line: &str) -> Result<Self> {
        let arr: Vec<Value> = serde_json::from_str(line)
            .map_err(|e| RelayError::DecodeFailed(format!("not a JSON array: {}", e)))?;

        let msg_type = arr
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::DecodeFailed("first element not a string".to_string()))?;

        match msg_type {
            "EVENT" => {
                let subscription_id = string_at(&arr, 1, "subscription_id")?;
                let raw_event = arr
                    .get(2)
                    .ok_or_else(|| RelayError::DecodeFailed("missing event object".to_string()))?;
                let event: Event = serde_json::from_value(raw_event.clone())
                    .map_err(|e| RelayError::DecodeFailed(format!("invalid event: {}", e)))?;
                Ok(RelayMessage::Event {
                    subscription_id,
                    event,
                })
            }
            "NOTICE" => Ok(RelayMessage::Notice {
                message: string_at(&arr, 1, "message")?,
            }),
            "EOSE" => Ok(RelayMessage::Eose {
                subscription_id: string_at(&arr, 1, "subscription_id")?,
            }),
            other => Err(RelayError::DecodeFailed(format!(
                "unknown message type: {}",
                other
            ))),
        }
    }
}

fn string_at(arr: &[Value], index: usize, field: &str) -> Result<String> {
    arr.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RelayError::DecodeFailed(format!("missing or non-string {}", field)))
}

/// Split a text frame into lines and decode each one
///
/// Blank lines are skipped. The result holds one entry per non-blank line,
/// in frame order.
pub fn decode_frame(frame: &str) -> Vec<Result<RelayMessage>> {
    frame
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(RelayMessage::decode)
        .collect()
}
