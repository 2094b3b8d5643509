use crate::domain::message::{
    ErrorPayload, Notification, RequestEnvelope, RequestId, ResponsePayload,
};
use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Client-to-server envelope: `{"Req": {"id": N, "req": {"<Tag>": {...}}}}`.
#[derive(Serialize)]
enum OutboundFrame<'a> {
    Req(&'a RequestEnvelope),
}

#[derive(Deserialize)]
enum InboundRequest {
    Req(RequestEnvelope),
}

/// Server-to-client envelopes, tagged at the top level.
#[derive(Serialize, Deserialize)]
enum ServerFrame {
    Resp {
        id: RequestId,
        resp: ResponsePayload,
    },
    Notif {
        notif: Notification,
    },
    Error {
        id: Option<RequestId>,
        err: ErrorBody,
    },
}

#[derive(Serialize, Deserialize)]
struct ErrorBody {
    text: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    Notification(Notification),
    Response {
        id: RequestId,
        payload: ResponsePayload,
    },
    Error(ErrorPayload),
    /// The frame was not valid protocol JSON; it is dropped and the stream goes on.
    DecodeFailure(String),
}

impl fmt::Display for ParsedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedMessage::Notification(Notification::Balances { balances }) => {
                write!(f, "balances:")?;
                if balances.is_empty() {
                    return write!(f, " (none)");
                }
                for (asset, amount) in balances {
                    write!(f, " {asset}={amount}")?;
                }
                Ok(())
            }
            ParsedMessage::Response { id, payload } => match payload {
                ResponsePayload::NewAddress { address } => {
                    write!(f, "#{id} NewAddress: address={address}")
                }
                ResponsePayload::GetQuote(quote) => write!(
                    f,
                    "#{id} GetQuote: quote_id={} recv_amount={} ttl={} txid={}",
                    quote.quote_id, quote.recv_amount, quote.ttl, quote.txid
                ),
                ResponsePayload::AcceptQuote { txid } => {
                    write!(f, "#{id} AcceptQuote: txid={txid}")
                }
                ResponsePayload::GetSwaps { swaps } => {
                    write!(f, "#{id} GetSwaps: {} swap(s)", swaps.len())?;
                    for swap in swaps {
                        write!(f, " [{} {:?}]", swap.txid, swap.status)?;
                    }
                    Ok(())
                }
            },
            ParsedMessage::Error(err) => match err.id {
                Some(id) => write!(f, "#{id} error [{}]: {}", err.code, err.text),
                None => write!(f, "unsolicited error [{}]: {}", err.code, err.text),
            },
            ParsedMessage::DecodeFailure(reason) => write!(f, "undecodable frame: {reason}"),
        }
    }
}

/// Serializes a request into its wire text.
pub fn encode(envelope: &RequestEnvelope) -> Result<String> {
    Ok(serde_json::to_string(&OutboundFrame::Req(envelope))?)
}

/// Classifies one inbound frame. Never fails: anything unrecognised becomes
/// `ParsedMessage::DecodeFailure`.
pub fn decode(frame: &str) -> ParsedMessage {
    match serde_json::from_str::<ServerFrame>(frame) {
        Ok(ServerFrame::Resp { id, resp }) => ParsedMessage::Response { id, payload: resp },
        Ok(ServerFrame::Notif { notif }) => ParsedMessage::Notification(notif),
        Ok(ServerFrame::Error { id, err }) => ParsedMessage::Error(ErrorPayload {
            id,
            text: err.text,
            code: err.code,
            details: err.details,
        }),
        Err(e) => ParsedMessage::DecodeFailure(e.to_string()),
    }
}

/// Parses a client request frame, as a server would.
pub fn decode_request(frame: &str) -> Result<RequestEnvelope> {
    match serde_json::from_str::<InboundRequest>(frame) {
        Ok(InboundRequest::Req(envelope)) => Ok(envelope),
        Err(e) => Err(ClientError::Decode(e.to_string())),
    }
}

pub fn encode_response(id: RequestId, payload: &ResponsePayload) -> Result<String> {
    let frame = ServerFrame::Resp {
        id,
        resp: payload.clone(),
    };
    Ok(serde_json::to_string(&frame)?)
}

pub fn encode_notification(notification: &Notification) -> Result<String> {
    let frame = ServerFrame::Notif {
        notif: notification.clone(),
    };
    Ok(serde_json::to_string(&frame)?)
}

pub fn encode_error(error: &ErrorPayload) -> Result<String> {
    let frame = ServerFrame::Error {
        id: error.id,
        err: ErrorBody {
            text: error.text.clone(),
            code: error.code.clone(),
            details: error.details.clone(),
        },
    };
    Ok(serde_json::to_string(&frame)?)
}
