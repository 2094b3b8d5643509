use super::session::{ClientSession, LinkState};
use crate::config::SwapConfig;
use crate::domain::amount::Balance;
use crate::domain::message::{BalanceSnapshot, PayloadTag, RequestPayload, ResponsePayload};
use crate::domain::ports::{Decision, PromptRef};
use crate::domain::swap::{Quote, SwapStatus, find_swap};
use crate::error::RequestError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Where a swap attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapPhase {
    Idle,
    AwaitingAddress,
    AwaitingBalance,
    QuoteRequested,
    AwaitingUserAcceptance,
    AcceptRequested,
    PollingConfirmation,
    Confirmed,
    TimedOut,
    Rejected,
    Failed,
}

impl SwapPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::TimedOut | Self::Rejected | Self::Failed
        )
    }
}

/// Why the workflow stopped without a swap being made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    InsufficientBalance,
    QuoteDeclined,
    Cancelled,
}

/// Why the workflow could not complete.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// The server refused to quote (error text contains "Quote error").
    QuoteRejected { code: String, text: String },
    Server { code: String, text: String },
    RequestTimedOut { tag: PayloadTag, timeout: Duration },
    NoBalanceUpdate(Duration),
    TransportLost(String),
    UnexpectedResponse(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::QuoteRejected { code, text } => {
                write!(f, "quote rejected by server [{code}]: {text}")
            }
            FailureReason::Server { code, text } => write!(f, "server error [{code}]: {text}"),
            FailureReason::RequestTimedOut { tag, timeout } => {
                write!(f, "no {tag} response within {timeout:?}")
            }
            FailureReason::NoBalanceUpdate(timeout) => {
                write!(f, "no balance update within {timeout:?}")
            }
            FailureReason::TransportLost(reason) => write!(f, "connection lost: {reason}"),
            FailureReason::UnexpectedResponse(detail) => write!(f, "unexpected response: {detail}"),
        }
    }
}

/// Terminal result of one swap attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SwapOutcome {
    Confirmed { txid: String },
    /// Still unconfirmed after every poll; the swap may confirm later.
    TimedOut { txid: String, attempts: u32 },
    Rejected(RejectReason),
    Failed(FailureReason),
}

impl SwapOutcome {
    pub fn phase(&self) -> SwapPhase {
        match self {
            SwapOutcome::Confirmed { .. } => SwapPhase::Confirmed,
            SwapOutcome::TimedOut { .. } => SwapPhase::TimedOut,
            SwapOutcome::Rejected(_) => SwapPhase::Rejected,
            SwapOutcome::Failed(_) => SwapPhase::Failed,
        }
    }
}

impl fmt::Display for SwapOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapOutcome::Confirmed { txid } => write!(f, "swap {txid} confirmed"),
            SwapOutcome::TimedOut { txid, attempts } => write!(
                f,
                "swap {txid} not confirmed after {attempts} attempts; check its status later"
            ),
            SwapOutcome::Rejected(RejectReason::InsufficientBalance) => {
                write!(f, "swap cancelled: insufficient balance")
            }
            SwapOutcome::Rejected(RejectReason::QuoteDeclined) => write!(f, "quote declined"),
            SwapOutcome::Rejected(RejectReason::Cancelled) => write!(f, "swap cancelled"),
            SwapOutcome::Failed(reason) => write!(f, "swap failed: {reason}"),
        }
    }
}

/// Everything one run of the workflow observed.
#[derive(Debug, Clone)]
pub struct SwapReport {
    pub outcome: SwapOutcome,
    pub receive_address: Option<String>,
    pub quote: Option<Quote>,
    pub txid: Option<String>,
    pub poll_attempts: u32,
    /// Phases in the order they were entered, starting with `Idle`.
    pub phases: Vec<SwapPhase>,
}

/// Mutable state of the attempt in progress.
struct SwapSession {
    phase: SwapPhase,
    receive_address: Option<String>,
    quote: Option<Quote>,
    txid: Option<String>,
    poll_attempts: u32,
    phases: Vec<SwapPhase>,
}

impl SwapSession {
    fn new() -> Self {
        Self {
            phase: SwapPhase::Idle,
            receive_address: None,
            quote: None,
            txid: None,
            poll_attempts: 0,
            phases: vec![SwapPhase::Idle],
        }
    }
}

/// Early exit from the workflow with its terminal outcome.
type Flow<T> = std::result::Result<T, SwapOutcome>;

/// Drives one swap: address, balance check, quote, confirmation, acceptance, polling.
///
/// Each attempt gets its own machine; several machines may share one `ClientSession`.
/// Every wait (responses, balance pushes, poll delays, prompts) also watches the
/// cancellation token and the connection state, so a cancel or disconnect ends the
/// workflow promptly without further requests.
pub struct SwapStateMachine {
    client: Arc<ClientSession>,
    prompt: PromptRef,
    config: SwapConfig,
    cancel: CancellationToken,
    state: SwapSession,
}

impl SwapStateMachine {
    pub fn new(client: Arc<ClientSession>, prompt: PromptRef, config: SwapConfig) -> Self {
        Self {
            client,
            prompt,
            config,
            cancel: CancellationToken::new(),
            state: SwapSession::new(),
        }
    }

    /// Ties cancellation to an outer token, e.g. a Ctrl-C handler.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that aborts this workflow when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> SwapPhase {
        self.state.phase
    }

    /// Runs the workflow to a terminal phase.
    pub async fn run(mut self) -> SwapReport {
        tracing::info!(
            send_asset = %self.config.send_asset,
            recv_asset = %self.config.recv_asset,
            amount = %self.config.send_amount,
            "starting swap"
        );

        let outcome = match self.drive().await {
            Ok(outcome) | Err(outcome) => outcome,
        };
        self.enter(outcome.phase());

        match &outcome {
            SwapOutcome::Confirmed { .. } => tracing::info!("{outcome}"),
            SwapOutcome::TimedOut { .. } | SwapOutcome::Rejected(_) => tracing::warn!("{outcome}"),
            SwapOutcome::Failed(_) => tracing::error!("{outcome}"),
        }

        let SwapSession {
            receive_address,
            quote,
            txid,
            poll_attempts,
            phases,
            ..
        } = self.state;

        SwapReport {
            outcome,
            receive_address,
            quote,
            txid,
            poll_attempts,
            phases,
        }
    }

    async fn drive(&mut self) -> Flow<SwapOutcome> {
        let address = self.acquire_funded_address().await?;

        let quote = self.request_quote(address).await?;
        self.state.quote = Some(quote.clone());

        self.enter(SwapPhase::AwaitingUserAcceptance);
        if !self.ask(Decision::AcceptQuote(&quote)).await? {
            return Ok(SwapOutcome::Rejected(RejectReason::QuoteDeclined));
        }

        let txid = self.accept_quote(&quote).await?;
        self.state.txid = Some(txid.clone());

        self.poll_confirmation(txid).await
    }

    /// Loops through address and balance checks until funds cover the swap amount.
    async fn acquire_funded_address(&mut self) -> Flow<String> {
        loop {
            self.enter(SwapPhase::AwaitingAddress);

            // Pushes that race ahead of the address response still count.
            let mut balances = self.client.balances();
            balances.mark_unchanged();

            let address = match self.call(RequestPayload::NewAddress {}).await? {
                ResponsePayload::NewAddress { address } => address,
                other => return Err(unexpected(PayloadTag::NewAddress, &other)),
            };
            tracing::info!(%address, "receive address");
            self.state.receive_address = Some(address.clone());

            self.enter(SwapPhase::AwaitingBalance);
            let snapshot = self.next_balances(&mut balances).await?;
            let available = snapshot
                .get(&self.config.send_asset)
                .copied()
                .unwrap_or(Balance::ZERO);

            if available.covers(self.config.send_amount) {
                tracing::info!(asset = %self.config.send_asset, %available, "balance sufficient");
                return Ok(address);
            }

            tracing::warn!(
                asset = %self.config.send_asset,
                %available,
                required = %self.config.send_amount,
                "insufficient balance"
            );
            if self.ask(Decision::RefetchBalance).await? {
                continue;
            }
            if self.ask(Decision::ConfirmCancel).await? {
                return Err(SwapOutcome::Rejected(RejectReason::InsufficientBalance));
            }
        }
    }

    async fn request_quote(&mut self, receive_address: String) -> Flow<Quote> {
        self.enter(SwapPhase::QuoteRequested);
        let payload = RequestPayload::GetQuote {
            send_asset: self.config.send_asset.clone(),
            send_amount: self.config.send_amount,
            recv_asset: self.config.recv_asset.clone(),
            receive_address,
        };

        match self.send(payload).await? {
            Ok(ResponsePayload::GetQuote(quote)) => {
                tracing::info!(
                    quote_id = %quote.quote_id,
                    recv_amount = %quote.recv_amount,
                    ttl = quote.ttl,
                    txid = %quote.txid,
                    "quote received"
                );
                Ok(quote)
            }
            Ok(other) => Err(unexpected(PayloadTag::GetQuote, &other)),
            Err(RequestError::Server(error)) if error.is_quote_error() => {
                Err(SwapOutcome::Failed(FailureReason::QuoteRejected {
                    code: error.code,
                    text: error.text,
                }))
            }
            Err(e) => Err(failure(PayloadTag::GetQuote, e)),
        }
    }

    async fn accept_quote(&mut self, quote: &Quote) -> Flow<String> {
        self.enter(SwapPhase::AcceptRequested);
        let payload = RequestPayload::AcceptQuote {
            quote_id: quote.quote_id,
        };

        match self.call(payload).await? {
            ResponsePayload::AcceptQuote { txid } => {
                tracing::info!(%txid, "quote accepted");
                Ok(txid)
            }
            other => Err(unexpected(PayloadTag::AcceptQuote, &other)),
        }
    }

    async fn poll_confirmation(&mut self, txid: String) -> Flow<SwapOutcome> {
        self.enter(SwapPhase::PollingConfirmation);
        let max_attempts = self.config.max_poll_attempts;

        for attempt in 1..=max_attempts {
            self.guarded(tokio::time::sleep(self.config.poll_interval))
                .await?;
            self.state.poll_attempts = attempt;

            match self.send(RequestPayload::GetSwaps {}).await? {
                Ok(ResponsePayload::GetSwaps { swaps }) => {
                    match find_swap(&swaps, &txid).map(|swap| swap.status) {
                        Some(SwapStatus::Confirmed) => {
                            return Ok(SwapOutcome::Confirmed { txid });
                        }
                        Some(SwapStatus::Mempool) => {
                            tracing::info!(%txid, attempt, max_attempts, "swap in mempool")
                        }
                        Some(SwapStatus::NotFound) | None => {
                            tracing::warn!(%txid, attempt, max_attempts, "swap not yet visible")
                        }
                    }
                }
                Ok(other) => return Err(unexpected(PayloadTag::GetSwaps, &other)),
                Err(RequestError::TimedOut(timeout)) => {
                    tracing::warn!(attempt, ?timeout, "GetSwaps went unanswered")
                }
                Err(e) => return Err(failure(PayloadTag::GetSwaps, e)),
            }
        }

        Ok(SwapOutcome::TimedOut {
            txid,
            attempts: max_attempts,
        })
    }

    /// Sends a request and maps any error to a failed workflow.
    async fn call(&self, payload: RequestPayload) -> Flow<ResponsePayload> {
        let tag = payload.tag();
        self.send(payload).await?.map_err(|e| failure(tag, e))
    }

    /// Sends a request; the caller decides what each error means.
    async fn send(&self, payload: RequestPayload) -> Flow<Result<ResponsePayload, RequestError>> {
        self.guarded(
            self.client
                .request_with_timeout(payload, self.config.request_timeout),
        )
        .await
    }

    async fn ask(&self, decision: Decision<'_>) -> Flow<bool> {
        self.guarded(self.prompt.confirm(decision)).await
    }

    /// Waits for a snapshot newer than the one `balances` last saw.
    async fn next_balances(
        &self,
        balances: &mut watch::Receiver<Option<BalanceSnapshot>>,
    ) -> Flow<BalanceSnapshot> {
        let timeout = self.config.balance_timeout;
        let wait = async {
            loop {
                if balances.changed().await.is_err() {
                    return None;
                }
                let snapshot = balances.borrow_and_update().clone();
                if snapshot.is_some() {
                    return snapshot;
                }
            }
        };

        match self.guarded(tokio::time::timeout(timeout, wait)).await? {
            Ok(Some(snapshot)) => Ok(snapshot),
            Ok(None) => Err(SwapOutcome::Failed(FailureReason::TransportLost(
                "session closed".to_string(),
            ))),
            Err(_) => Err(SwapOutcome::Failed(FailureReason::NoBalanceUpdate(timeout))),
        }
    }

    /// Runs `fut` unless the workflow is cancelled or the connection drops first.
    async fn guarded<F: Future>(&self, fut: F) -> Flow<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SwapOutcome::Rejected(RejectReason::Cancelled)),
            reason = link_lost(self.client.link()) => {
                Err(SwapOutcome::Failed(FailureReason::TransportLost(reason)))
            }
            output = fut => Ok(output),
        }
    }

    fn enter(&mut self, phase: SwapPhase) {
        tracing::info!(from = ?self.state.phase, to = ?phase, "swap phase");
        self.state.phase = phase;
        self.state.phases.push(phase);
    }
}

/// Resolves with the disconnect reason once the link goes down.
async fn link_lost(mut link: watch::Receiver<LinkState>) -> String {
    loop {
        let state = link.borrow_and_update().clone();
        if let LinkState::Down(reason) = state {
            return reason;
        }
        if link.changed().await.is_err() {
            return "session closed".to_string();
        }
    }
}

fn failure(tag: PayloadTag, error: RequestError) -> SwapOutcome {
    let reason = match error {
        RequestError::Server(error) => FailureReason::Server {
            code: error.code,
            text: error.text,
        },
        RequestError::TimedOut(timeout) => FailureReason::RequestTimedOut { tag, timeout },
        RequestError::Abandoned(reason) | RequestError::Send(reason) => {
            FailureReason::TransportLost(reason)
        }
        mismatch @ RequestError::TagMismatch { .. } => {
            FailureReason::UnexpectedResponse(mismatch.to_string())
        }
    };
    SwapOutcome::Failed(reason)
}

fn unexpected(expected: PayloadTag, got: &ResponsePayload) -> SwapOutcome {
    SwapOutcome::Failed(FailureReason::UnexpectedResponse(format!(
        "expected a {expected} response, got {}",
        got.tag()
    )))
}
