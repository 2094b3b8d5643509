use super::amount::{Amount, Balance};
use super::swap::{Quote, QuoteId, Swap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Correlation id shared by a request and its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Discriminant shared by request and response payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadTag {
    NewAddress,
    GetQuote,
    AcceptQuote,
    GetSwaps,
}

impl fmt::Display for PayloadTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadTag::NewAddress => "NewAddress",
            PayloadTag::GetQuote => "GetQuote",
            PayloadTag::AcceptQuote => "AcceptQuote",
            PayloadTag::GetSwaps => "GetSwaps",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestPayload {
    NewAddress {},
    GetQuote {
        send_asset: String,
        send_amount: Amount,
        recv_asset: String,
        receive_address: String,
    },
    AcceptQuote {
        quote_id: QuoteId,
    },
    GetSwaps {},
}

impl RequestPayload {
    pub fn tag(&self) -> PayloadTag {
        match self {
            RequestPayload::NewAddress {} => PayloadTag::NewAddress,
            RequestPayload::GetQuote { .. } => PayloadTag::GetQuote,
            RequestPayload::AcceptQuote { .. } => PayloadTag::AcceptQuote,
            RequestPayload::GetSwaps {} => PayloadTag::GetSwaps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
    NewAddress {
        address: String,
    },
    GetQuote(Quote),
    AcceptQuote {
        txid: String,
    },
    GetSwaps {
        swaps: Vec<Swap>,
    },
}

impl ResponsePayload {
    pub fn tag(&self) -> PayloadTag {
        match self {
            ResponsePayload::NewAddress { .. } => PayloadTag::NewAddress,
            ResponsePayload::GetQuote(_) => PayloadTag::GetQuote,
            ResponsePayload::AcceptQuote { .. } => PayloadTag::AcceptQuote,
            ResponsePayload::GetSwaps { .. } => PayloadTag::GetSwaps,
        }
    }
}

/// A request stamped with the id allocated by the correlation registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: RequestId,
    #[serde(rename = "req")]
    pub payload: RequestPayload,
}

/// Server-reported failure. `id` is absent when the error is unsolicited.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub id: Option<RequestId>,
    pub text: String,
    pub code: String,
    pub details: Option<serde_json::Value>,
}

impl ErrorPayload {
    /// Whether the server refused to quote the requested pair or amount.
    pub fn is_quote_error(&self) -> bool {
        self.text.contains("Quote error")
    }
}

/// Latest holdings per asset name. Each notification replaces the previous snapshot.
pub type BalanceSnapshot = BTreeMap<String, Balance>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Balances,
}

/// Unsolicited state pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    Balances { balances: BalanceSnapshot },
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::Balances { .. } => NotificationKind::Balances,
        }
    }
}
