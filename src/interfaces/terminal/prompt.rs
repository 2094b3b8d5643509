use crate::domain::ports::{Decision, DecisionPrompt};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::io::{Stdin, Stdout};
use tokio::sync::Mutex;

/// Asks yes/no questions on a line-oriented terminal.
///
/// Generic over the input and output streams so the same prompt drives stdin/stdout
/// in the binary and in-memory buffers in tests. End of input counts as "no".
pub struct TerminalPrompt<R, W> {
    io: Mutex<(Lines<R>, W)>,
}

impl TerminalPrompt<BufReader<Stdin>, Stdout> {
    /// Creates a prompt bound to the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> TerminalPrompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            io: Mutex::new((input.lines(), output)),
        }
    }

    /// Returns the output stream, consuming the prompt.
    pub fn into_output(self) -> W {
        self.io.into_inner().1
    }
}

#[async_trait]
impl<R, W> DecisionPrompt for TerminalPrompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn confirm(&self, decision: Decision<'_>) -> bool {
        let question = question(decision);
        let mut guard = self.io.lock().await;
        let (lines, output) = &mut *guard;

        loop {
            if output
                .write_all(format!("{question} [y/n] ").as_bytes())
                .await
                .is_err()
                || output.flush().await.is_err()
            {
                return false;
            }

            match lines.next_line().await {
                Ok(Some(line)) => match parse_answer(&line) {
                    Some(answer) => return answer,
                    None => continue,
                },
                Ok(None) | Err(_) => return false,
            }
        }
    }
}

/// Answers every question the same way (`--yes` on the command line).
#[derive(Debug, Clone, Copy)]
pub struct AutoPrompt(pub bool);

#[async_trait]
impl DecisionPrompt for AutoPrompt {
    async fn confirm(&self, decision: Decision<'_>) -> bool {
        tracing::info!("{} -> {}", question(decision), if self.0 { "yes" } else { "no" });
        self.0
    }
}

fn question(decision: Decision<'_>) -> String {
    match decision {
        Decision::RefetchBalance => {
            "Balance is insufficient. Request a new address and refetch balances?".to_string()
        }
        Decision::AcceptQuote(quote) => format!(
            "Quote {}: receive {} (ttl {}, txid {}). Accept?",
            quote.quote_id, quote.recv_amount, quote.ttl, quote.txid
        ),
        Decision::ConfirmCancel => "Cancel the swap?".to_string(),
    }
}

fn parse_answer(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}
