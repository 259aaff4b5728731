//! Stdio transport: JSON-RPC on stdin/stdout, plus resource-change
//! notifications whenever the artifact store is written.

use agentic_capture::StoreEvent;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use crate::protocol::ProtocolHandler;
use crate::types::{resource_list_changed, McpError, McpResult, RequestId};

use super::framing;

pub struct StdioTransport {
    handler: ProtocolHandler,
}

impl StdioTransport {
    pub fn new(handler: ProtocolHandler) -> Self {
        Self { handler }
    }

    pub async fn run(&self) -> McpResult<()> {
        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();
        self.serve(reader, writer).await
    }

    /// Serves until the reader hits EOF. Requests are handled one at a time;
    /// notifications queued while a request runs are written after its response.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> McpResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut events = self.handler.session().store().subscribe();
        tracing::info!("Stdio transport started");

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.map_err(McpError::Io)? else {
                        tracing::info!("EOF on stdin, shutting down");
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.handle_line(&line, &mut writer).await?;
                }
                event = events.recv() => match event {
                    Ok(StoreEvent::Added { name }) => {
                        tracing::debug!(%name, "Announcing new artifact");
                        write(&mut writer, &resource_list_changed()).await?;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Store events lagged");
                        write(&mut writer, &resource_list_changed()).await?;
                    }
                    Err(RecvError::Closed) => {
                        events = self.handler.session().store().subscribe();
                    }
                },
            }
        }
        Ok(())
    }

    async fn handle_line<W: AsyncWrite + Unpin>(&self, line: &str, writer: &mut W) -> McpResult<()> {
        match framing::parse_message(line) {
            Ok(msg) => {
                if let Some(response) = self.handler.handle_message(msg).await {
                    write(writer, &response).await?;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable message");
                write(writer, &e.reply(RequestId::Null)).await?;
            }
        }
        Ok(())
    }
}

async fn write<W: AsyncWrite + Unpin>(writer: &mut W, value: &impl serde::Serialize) -> McpResult<()> {
    let framed = framing::frame_message(value)?;
    writer.write_all(framed.as_bytes()).await.map_err(McpError::Io)?;
    writer.flush().await.map_err(McpError::Io)
}
