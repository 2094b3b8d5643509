mod common;

use common::{
    Action, ScriptedPrompt, address, config, connect, quote, snapshot, spawn_server, swaps, tags,
};
use rust_decimal_macros::dec;
use std::time::Duration;
use swapwire::application::swap::{
    FailureReason, RejectReason, SwapOutcome, SwapPhase, SwapStateMachine,
};
use swapwire::domain::message::{PayloadTag, RequestPayload, ResponsePayload};
use swapwire::domain::swap::{QuoteId, Swap, SwapStatus};

fn funded() -> Action {
    Action::PushBalances(snapshot(&[("DePix", dec!(12.5)), ("L-BTC", dec!(0))]))
}

#[tokio::test(start_paused = true)]
async fn test_swap_confirms_after_mempool() {
    let (session, peer) = connect();
    let mut polls = 0;
    let (_server, requests) = spawn_server(peer, move |request| match request {
        RequestPayload::NewAddress {} => vec![address("lq1abc"), funded()],
        RequestPayload::GetQuote { .. } => vec![Action::Respond(ResponsePayload::GetQuote(
            quote(7, dec!(0.00012345), "tx1"),
        ))],
        RequestPayload::AcceptQuote { .. } => vec![Action::Respond(ResponsePayload::AcceptQuote {
            txid: "tx1".to_string(),
        })],
        RequestPayload::GetSwaps {} => {
            polls += 1;
            let status = if polls < 2 {
                SwapStatus::Mempool
            } else {
                SwapStatus::Confirmed
            };
            vec![swaps("tx1", status)]
        }
    });

    let prompt = ScriptedPrompt::new(&[true]);
    let report = SwapStateMachine::new(session, prompt.clone(), config(dec!(1)))
        .run()
        .await;

    assert_eq!(
        report.outcome,
        SwapOutcome::Confirmed {
            txid: "tx1".to_string()
        }
    );
    assert_eq!(report.receive_address.as_deref(), Some("lq1abc"));
    assert_eq!(report.quote, Some(quote(7, dec!(0.00012345), "tx1")));
    assert_eq!(report.poll_attempts, 2);
    assert_eq!(
        report.phases,
        vec![
            SwapPhase::Idle,
            SwapPhase::AwaitingAddress,
            SwapPhase::AwaitingBalance,
            SwapPhase::QuoteRequested,
            SwapPhase::AwaitingUserAcceptance,
            SwapPhase::AcceptRequested,
            SwapPhase::PollingConfirmation,
            SwapPhase::Confirmed,
        ]
    );
    assert_eq!(prompt.asked(), vec!["AcceptQuote"]);
    assert_eq!(
        tags(&requests),
        vec![
            PayloadTag::NewAddress,
            PayloadTag::GetQuote,
            PayloadTag::AcceptQuote,
            PayloadTag::GetSwaps,
            PayloadTag::GetSwaps,
        ]
    );

    let sent = requests.lock().clone();
    assert_eq!(
        sent[1],
        RequestPayload::GetQuote {
            send_asset: "DePix".to_string(),
            send_amount: "1".parse().unwrap(),
            recv_asset: "L-BTC".to_string(),
            receive_address: "lq1abc".to_string(),
        }
    );
    assert_eq!(
        sent[2],
        RequestPayload::AcceptQuote {
            quote_id: QuoteId(7)
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_swap_times_out_after_max_attempts() {
    let (session, peer) = connect();
    let (_server, requests) = spawn_server(peer, |request| match request {
        RequestPayload::NewAddress {} => vec![address("lq1abc"), funded()],
        RequestPayload::GetQuote { .. } => {
            vec![Action::Respond(ResponsePayload::GetQuote(quote(1, dec!(0.5), "tx9")))]
        }
        RequestPayload::AcceptQuote { .. } => vec![Action::Respond(ResponsePayload::AcceptQuote {
            txid: "tx9".to_string(),
        })],
        RequestPayload::GetSwaps {} => vec![swaps("tx9", SwapStatus::Mempool)],
    });

    let started = tokio::time::Instant::now();
    let report = SwapStateMachine::new(session, ScriptedPrompt::new(&[true]), config(dec!(1)))
        .run()
        .await;

    assert_eq!(
        report.outcome,
        SwapOutcome::TimedOut {
            txid: "tx9".to_string(),
            attempts: 10
        }
    );
    assert_eq!(report.poll_attempts, 10);
    assert_eq!(report.phases.last(), Some(&SwapPhase::TimedOut));
    assert!(started.elapsed() >= Duration::from_secs(50));
    let polls = tags(&requests)
        .into_iter()
        .filter(|tag| *tag == PayloadTag::GetSwaps)
        .count();
    assert_eq!(polls, 10);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_poll_consumes_an_attempt() {
    let (session, peer) = connect();
    let mut polls = 0;
    let (_server, _requests) = spawn_server(peer, move |request| match request {
        RequestPayload::NewAddress {} => vec![address("lq1abc"), funded()],
        RequestPayload::GetQuote { .. } => {
            vec![Action::Respond(ResponsePayload::GetQuote(quote(1, dec!(0.5), "tx2")))]
        }
        RequestPayload::AcceptQuote { .. } => vec![Action::Respond(ResponsePayload::AcceptQuote {
            txid: "tx2".to_string(),
        })],
        RequestPayload::GetSwaps {} => {
            polls += 1;
            if polls == 1 {
                vec![]
            } else {
                vec![swaps("tx2", SwapStatus::Confirmed)]
            }
        }
    });

    let report = SwapStateMachine::new(session, ScriptedPrompt::new(&[true]), config(dec!(1)))
        .run()
        .await;

    assert_eq!(
        report.outcome,
        SwapOutcome::Confirmed {
            txid: "tx2".to_string()
        }
    );
    assert_eq!(report.poll_attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_insufficient_balance_cancel_sends_nothing_more() {
    let (session, mut peer) = connect();
    let prompt = ScriptedPrompt::new(&[false, true]);
    let run = tokio::spawn(
        SwapStateMachine::new(session, prompt.clone(), config(dec!(1))).run(),
    );

    let request = peer.next_request().await.unwrap();
    assert_eq!(request.payload, RequestPayload::NewAddress {});
    peer.respond(
        request.id,
        ResponsePayload::NewAddress {
            address: "lq1abc".to_string(),
        },
    )
    .await;
    // Only the other asset is funded; the send asset is short.
    peer.push_balances(snapshot(&[("L-BTC", dec!(5)), ("DePix", dec!(0.5))]))
        .await;

    let report = run.await.unwrap();
    assert_eq!(
        report.outcome,
        SwapOutcome::Rejected(RejectReason::InsufficientBalance)
    );
    assert_eq!(prompt.asked(), vec!["RefetchBalance", "ConfirmCancel"]);
    assert!(report.quote.is_none());
    assert!(peer.drain_requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_refetch_balance_requests_new_address() {
    let (session, peer) = connect();
    let mut addresses = 0;
    let (_server, requests) = spawn_server(peer, move |request| match request {
        RequestPayload::NewAddress {} => {
            addresses += 1;
            let balance = if addresses == 1 { dec!(0) } else { dec!(20) };
            vec![
                address(&format!("lq1addr{addresses}")),
                Action::PushBalances(snapshot(&[("DePix", balance)])),
            ]
        }
        RequestPayload::GetQuote { .. } => vec![Action::Reject {
            text: "Quote error: amount below minimum".to_string(),
            code: "InvalidAmount".to_string(),
        }],
        _ => vec![],
    });

    let prompt = ScriptedPrompt::new(&[true]);
    let report = SwapStateMachine::new(session, prompt.clone(), config(dec!(1)))
        .run()
        .await;

    assert_eq!(prompt.asked(), vec!["RefetchBalance"]);
    assert_eq!(report.receive_address.as_deref(), Some("lq1addr2"));
    assert_eq!(
        tags(&requests),
        vec![
            PayloadTag::NewAddress,
            PayloadTag::NewAddress,
            PayloadTag::GetQuote
        ]
    );
    assert_eq!(
        report.outcome,
        SwapOutcome::Failed(FailureReason::QuoteRejected {
            code: "InvalidAmount".to_string(),
            text: "Quote error: amount below minimum".to_string(),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_declined_quote_is_not_accepted() {
    let (session, peer) = connect();
    let (_server, requests) = spawn_server(peer, |request| match request {
        RequestPayload::NewAddress {} => vec![address("lq1abc"), funded()],
        RequestPayload::GetQuote { .. } => {
            vec![Action::Respond(ResponsePayload::GetQuote(quote(3, dec!(0.1), "tx3")))]
        }
        _ => vec![],
    });

    let prompt = ScriptedPrompt::new(&[false]);
    let report = SwapStateMachine::new(session, prompt.clone(), config(dec!(2)))
        .run()
        .await;

    assert_eq!(report.outcome, SwapOutcome::Rejected(RejectReason::QuoteDeclined));
    assert!(report.txid.is_none());
    assert_eq!(
        tags(&requests),
        vec![PayloadTag::NewAddress, PayloadTag::GetQuote]
    );
}

#[tokio::test(start_paused = true)]
async fn test_other_server_error_fails_swap() {
    let (session, peer) = connect();
    let (_server, _requests) = spawn_server(peer, |request| match request {
        RequestPayload::NewAddress {} => vec![Action::Reject {
            text: "wallet locked".to_string(),
            code: "Unavailable".to_string(),
        }],
        _ => vec![],
    });

    let report = SwapStateMachine::new(session, ScriptedPrompt::new(&[]), config(dec!(1)))
        .run()
        .await;

    assert_eq!(
        report.outcome,
        SwapOutcome::Failed(FailureReason::Server {
            code: "Unavailable".to_string(),
            text: "wallet locked".to_string(),
        })
    );
    assert_eq!(
        report.phases,
        vec![SwapPhase::Idle, SwapPhase::AwaitingAddress, SwapPhase::Failed]
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_polling_fails_swap() {
    let (session, peer) = connect();
    let (_server, _requests) = spawn_server(peer, |request| match request {
        RequestPayload::NewAddress {} => vec![address("lq1abc"), funded()],
        RequestPayload::GetQuote { .. } => {
            vec![Action::Respond(ResponsePayload::GetQuote(quote(1, dec!(0.5), "tx4")))]
        }
        RequestPayload::AcceptQuote { .. } => vec![Action::Respond(ResponsePayload::AcceptQuote {
            txid: "tx4".to_string(),
        })],
        RequestPayload::GetSwaps {} => vec![Action::Disconnect("server restart".to_string())],
    });

    let report = SwapStateMachine::new(
        session.clone(),
        ScriptedPrompt::new(&[true]),
        config(dec!(1)),
    )
    .run()
    .await;

    assert_eq!(
        report.outcome,
        SwapOutcome::Failed(FailureReason::TransportLost("server restart".to_string()))
    );
    assert_eq!(report.txid.as_deref(), Some("tx4"));
    assert_eq!(session.registry().pending_count(), 0);
    assert!(!session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_balance_pushed_before_address_response_counts() {
    let (session, peer) = connect();
    let (_server, _requests) = spawn_server(peer, |request| match request {
        RequestPayload::NewAddress {} => vec![funded(), address("lq1abc")],
        RequestPayload::GetQuote { .. } => {
            vec![Action::Respond(ResponsePayload::GetQuote(quote(1, dec!(0.5), "tx5")))]
        }
        RequestPayload::AcceptQuote { .. } => vec![Action::Respond(ResponsePayload::AcceptQuote {
            txid: "tx5".to_string(),
        })],
        RequestPayload::GetSwaps {} => vec![swaps("tx5", SwapStatus::Confirmed)],
    });

    let report = SwapStateMachine::new(session, ScriptedPrompt::new(&[true]), config(dec!(12.5)))
        .run()
        .await;

    assert_eq!(
        report.outcome,
        SwapOutcome::Confirmed {
            txid: "tx5".to_string()
        }
    );
    assert_eq!(report.poll_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_balance_update_fails_swap() {
    let (session, peer) = connect();
    let (_server, _requests) = spawn_server(peer, |request| match request {
        RequestPayload::NewAddress {} => vec![address("lq1abc")],
        _ => vec![],
    });

    let report = SwapStateMachine::new(session, ScriptedPrompt::new(&[]), config(dec!(1)))
        .run()
        .await;

    assert_eq!(
        report.outcome,
        SwapOutcome::Failed(FailureReason::NoBalanceUpdate(Duration::from_secs(30)))
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_workflow_and_clears_pending() {
    let (session, mut peer) = connect();
    let machine = SwapStateMachine::new(session.clone(), ScriptedPrompt::new(&[]), config(dec!(1)));
    let cancel = machine.cancel_token();
    let run = tokio::spawn(machine.run());

    let request = peer.next_request().await.unwrap();
    assert_eq!(request.payload, RequestPayload::NewAddress {});
    cancel.cancel();

    let report = run.await.unwrap();
    assert_eq!(report.outcome, SwapOutcome::Rejected(RejectReason::Cancelled));
    assert_eq!(session.registry().pending_count(), 0);
    assert!(peer.drain_requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_polling_stops_further_polls() {
    let (session, mut peer) = connect();
    let machine = SwapStateMachine::new(
        session.clone(),
        ScriptedPrompt::new(&[true]),
        config(dec!(1)),
    );
    let cancel = machine.cancel_token();
    let run = tokio::spawn(machine.run());

    let request = peer.next_request().await.unwrap();
    assert_eq!(request.payload, RequestPayload::NewAddress {});
    peer.respond(
        request.id,
        ResponsePayload::NewAddress {
            address: "lq1abc".to_string(),
        },
    )
    .await;
    peer.push_balances(snapshot(&[("DePix", dec!(5))])).await;

    let request = peer.next_request().await.unwrap();
    assert_eq!(request.payload.tag(), PayloadTag::GetQuote);
    peer.respond(
        request.id,
        ResponsePayload::GetQuote(quote(2, dec!(0.5), "tx6")),
    )
    .await;

    let request = peer.next_request().await.unwrap();
    assert_eq!(request.payload.tag(), PayloadTag::AcceptQuote);
    peer.respond(
        request.id,
        ResponsePayload::AcceptQuote {
            txid: "tx6".to_string(),
        },
    )
    .await;

    let request = peer.next_request().await.unwrap();
    assert_eq!(request.payload, RequestPayload::GetSwaps {});
    peer.respond(
        request.id,
        ResponsePayload::GetSwaps {
            swaps: vec![Swap {
                txid: "tx6".to_string(),
                status: SwapStatus::Mempool,
            }],
        },
    )
    .await;
    cancel.cancel();

    let report = run.await.unwrap();
    assert_eq!(report.outcome, SwapOutcome::Rejected(RejectReason::Cancelled));
    assert_eq!(report.txid.as_deref(), Some("tx6"));
    assert_eq!(report.phases.last(), Some(&SwapPhase::Rejected));

    // Well past several poll intervals: nothing else goes out.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(peer.drain_requests().is_empty());
    assert_eq!(session.registry().pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_zero_valued_quote_reaches_the_user() {
    let (session, peer) = connect();
    let (_server, requests) = spawn_server(peer, |request| match request {
        RequestPayload::NewAddress {} => vec![address("lq1abc"), funded()],
        RequestPayload::GetQuote { .. } => {
            vec![Action::Respond(ResponsePayload::GetQuote(quote(8, dec!(0), "tx8")))]
        }
        _ => vec![],
    });

    let prompt = ScriptedPrompt::new(&[false]);
    let report = SwapStateMachine::new(session, prompt.clone(), config(dec!(1)))
        .run()
        .await;

    assert_eq!(report.outcome, SwapOutcome::Rejected(RejectReason::QuoteDeclined));
    assert_eq!(report.quote, Some(quote(8, dec!(0), "tx8")));
    assert_eq!(prompt.asked(), vec!["AcceptQuote"]);
    assert_eq!(
        tags(&requests),
        vec![PayloadTag::NewAddress, PayloadTag::GetQuote]
    );
}
