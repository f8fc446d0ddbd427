//! Stdin/stdout JSON bridge for the brain.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages, routes them to the
//! brain, and writes `ResponseEnvelope` and `EventEnvelope` messages as
//! newline-delimited JSON. Ability lifecycle events reach the controller
//! through this event stream.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::brain::Brain;
use crate::error::{BrainError, Result};
use crate::host::channel::dispatch;
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, broadcast};

/// Run the bridge over the process stdin/stdout.
pub async fn run_stdio_bridge(
    brain: Arc<Brain>,
    events: broadcast::Receiver<EventEnvelope>,
) -> Result<()> {
    run_bridge(
        brain,
        events,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Run the bridge until `input` closes or a `runtime.stop` command arrives.
///
/// Two concurrent tasks operate in parallel:
///
/// 1. **Reader** -- reads commands from `input`, routes each one through the
///    brain and writes the response to `output`.
/// 2. **Event forwarder** -- receives broadcast `EventEnvelope` messages and
///    writes them to `output`.
///
/// Every ability is switched off before this returns.
pub async fn run_bridge<R, W>(
    brain: Arc<Brain>,
    mut events: broadcast::Receiver<EventEnvelope>,
    input: R,
    output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(Mutex::new(BufWriter::new(output)));

    let event_writer = Arc::clone(&writer);
    let event_handle = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event_envelope) => match serde_json::to_string(&event_envelope) {
                    Ok(json) => {
                        let mut w = event_writer.lock().await;
                        if let Err(e) = write_line(&mut *w, &json).await {
                            tracing::warn!(
                                error = %e,
                                "failed to write event envelope; stopping event forwarder"
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize event envelope; skipping");
                    }
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event forwarder lagged; some events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("event broadcast channel closed; stopping event forwarder");
                    break;
                }
            }
        }
    });

    let reader_result = run_reader(&brain, input, Arc::clone(&writer)).await;

    brain.off_all();
    event_handle.abort();
    let _ = event_handle.await;

    reader_result
}

async fn run_reader<R, W>(
    brain: &Brain,
    mut reader: R,
    writer: Arc<Mutex<BufWriter<W>>>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| BrainError::Host(format!("failed to read command: {e}")))?;

        // EOF
        if bytes_read == 0 {
            tracing::info!("input closed (EOF); shutting down bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CommandEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_line = %trimmed,
                    "failed to parse command envelope"
                );
                let error_response = ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                );
                let json = serde_json::to_string(&error_response)?;
                let mut w = writer.lock().await;
                write_line(&mut *w, &json).await?;
                continue;
            }
        };

        let is_stop = envelope.command == CommandName::RuntimeStop;
        let response = dispatch(brain, &envelope);
        let json = serde_json::to_string(&response)?;

        {
            let mut w = writer.lock().await;
            write_line(&mut *w, &json).await?;
        }

        if is_stop && response.ok {
            tracing::info!("runtime.stop received; shutting down bridge");
            break;
        }
    }

    Ok(())
}

/// Write a single JSON line and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| BrainError::Host(format!("failed to write output: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| BrainError::Host(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| BrainError::Host(format!("failed to flush output: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::contract::EVENT_VERSION;

    #[test]
    fn parse_error_response_is_well_formed() {
        let resp = ResponseEnvelope::error("parse-error", "bad json");
        assert!(!resp.ok);
        assert_eq!(resp.request_id, "parse-error");
        assert_eq!(resp.v, EVENT_VERSION);
        assert!(resp.error.is_some());
    }

    #[tokio::test]
    async fn write_line_appends_newline() {
        let mut writer = BufWriter::new(Vec::new());
        write_line(&mut writer, r#"{"a":1}"#).await.expect("write in test");
        assert_eq!(writer.into_inner(), b"{\"a\":1}\n");
    }
}
