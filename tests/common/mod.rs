#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use swapwire::application::session::ClientSession;
use swapwire::config::SwapConfig;
use swapwire::domain::amount::{Amount, Balance};
use swapwire::domain::message::{BalanceSnapshot, PayloadTag, RequestPayload, ResponsePayload};
use swapwire::domain::ports::{Decision, DecisionPrompt};
use swapwire::domain::swap::{Quote, QuoteId, Swap, SwapStatus};
use swapwire::infrastructure::in_memory::{InMemoryPeer, InMemoryTransport};
use tokio::task::JoinHandle;

/// Answers prompts from a fixed script and records what was asked.
/// Once the script runs out every answer is "no".
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(answers: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            asked: Mutex::new(Vec::new()),
        })
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().clone()
    }
}

#[async_trait]
impl DecisionPrompt for ScriptedPrompt {
    async fn confirm(&self, decision: Decision<'_>) -> bool {
        let name = match decision {
            Decision::RefetchBalance => "RefetchBalance",
            Decision::AcceptQuote(_) => "AcceptQuote",
            Decision::ConfirmCancel => "ConfirmCancel",
        };
        self.asked.lock().push(name.to_string());
        self.answers.lock().pop_front().unwrap_or(false)
    }
}

/// What the fake server does in reply to one request.
pub enum Action {
    Respond(ResponsePayload),
    Reject { text: String, code: String },
    PushBalances(BalanceSnapshot),
    Disconnect(String),
}

/// Runs a fake server on `peer`. `handler` maps each request to the actions to take,
/// in order; returning no actions leaves the request unanswered.
pub fn spawn_server<F>(
    mut peer: InMemoryPeer,
    mut handler: F,
) -> (JoinHandle<InMemoryPeer>, Arc<Mutex<Vec<RequestPayload>>>)
where
    F: FnMut(&RequestPayload) -> Vec<Action> + Send + 'static,
{
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);

    let server = tokio::spawn(async move {
        while let Some(request) = peer.next_request().await {
            log.lock().push(request.payload.clone());
            for action in handler(&request.payload) {
                match action {
                    Action::Respond(payload) => peer.respond(request.id, payload).await,
                    Action::Reject { text, code } => peer.reject(request.id, &text, &code).await,
                    Action::PushBalances(balances) => peer.push_balances(balances).await,
                    Action::Disconnect(reason) => peer.disconnect(&reason).await,
                }
            }
        }
        peer
    });

    (server, seen)
}

pub fn tags(requests: &Mutex<Vec<RequestPayload>>) -> Vec<PayloadTag> {
    requests.lock().iter().map(RequestPayload::tag).collect()
}

pub fn connect() -> (Arc<ClientSession>, InMemoryPeer) {
    let (transport, events, peer) = InMemoryTransport::pair();
    (Arc::new(ClientSession::start(Box::new(transport), events)), peer)
}

pub fn snapshot(entries: &[(&str, Decimal)]) -> BalanceSnapshot {
    entries
        .iter()
        .map(|(asset, value)| (asset.to_string(), Balance::new(*value).unwrap()))
        .collect()
}

pub fn config(amount: Decimal) -> SwapConfig {
    SwapConfig {
        poll_interval: Duration::from_secs(5),
        max_poll_attempts: 10,
        request_timeout: Duration::from_secs(30),
        balance_timeout: Duration::from_secs(30),
        ..SwapConfig::new("DePix", "L-BTC", Amount::new(amount).unwrap())
    }
}

pub fn address(value: &str) -> Action {
    Action::Respond(ResponsePayload::NewAddress {
        address: value.to_string(),
    })
}

pub fn quote(id: u64, recv_amount: Decimal, txid: &str) -> Quote {
    Quote {
        quote_id: QuoteId(id),
        recv_amount: Balance::new(recv_amount).unwrap(),
        ttl: 60,
        txid: txid.to_string(),
    }
}

pub fn swaps(txid: &str, status: SwapStatus) -> Action {
    Action::Respond(ResponsePayload::GetSwaps {
        swaps: vec![Swap {
            txid: txid.to_string(),
            status,
        }],
    })
}
