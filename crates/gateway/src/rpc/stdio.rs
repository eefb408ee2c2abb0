//! STDIO transport — newline-delimited JSON requests on stdin, one
//! response per request on stdout.
//!
//! Requests are processed sequentially, so responses leave in request
//! order. Anything that is not a JSON object line (stray logging,
//! blank lines) is skipped rather than treated as a protocol error.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use super::dispatcher::McpDispatcher;

/// Serve MCP over stdin/stdout until EOF or cancellation.
pub async fn run(
    dispatcher: Arc<McpDispatcher>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = tokio::io::stdout();

    tracing::info!("STDIO transport ready");

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            // EOF: the client hung up.
            break;
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with('{') {
            tracing::debug!(line = %trimmed, "skipping non-JSON line on stdin");
            continue;
        }

        if let Some(response) = dispatcher.dispatch_raw(trimmed.as_bytes(), &cancel).await {
            let json = serde_json::to_string(&response).map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
            })?;
            stdout.write_all(json.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    tracing::info!("STDIO transport closed");
    Ok(())
}
