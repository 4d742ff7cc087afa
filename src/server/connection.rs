//! Connection handling
//!
//! Each connection has a request loop (read, parse, dispatch) and a writer
//! task that flushes replies queued on an unbounded channel. A client
//! parked by a blocking pop releases the dispatcher and waits for whichever
//! comes first: a wake, its deadline, shutdown, or the peer going away.

use crate::blocking::{BlockHandle, BlockResult};
use crate::commands::ClientState;
use super::ConnectionLimits;
use crate::dispatch::{block_reply, BlockedWait, Dispatched, Dispatcher};
use crate::protocol::{RespEncoder, RespError, RespParser, RespValue};
use anyhow::anyhow;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How a blocked wait ended
enum Wake {
    Result(BlockResult),
    TimedOut,
    Closed,
    /// The peer kept sending past the query buffer limit
    Overflow,
}

/// Connection handler
pub struct Connection {
    reader: OwnedReadHalf,
    read_buffer: BytesMut,
    replies: mpsc::UnboundedSender<RespValue>,
    writer: Option<JoinHandle<()>>,
    client: ClientState,
    limits: ConnectionLimits,
    cancel: CancellationToken,
}

impl Connection {
    /// Split `stream` and start its writer task
    pub fn new(
        stream: TcpStream,
        client: ClientState,
        limits: ConnectionLimits,
        cancel: CancellationToken,
    ) -> Self {
        let (reader, writer) = stream.into_split();
        let (replies, queue) = mpsc::unbounded_channel();
        let client_id = client.id;
        let writer = tokio::spawn(async move {
            if let Err(e) = write_replies(writer, queue).await {
                debug!("client {} writer stopped: {}", client_id, e);
            }
        });

        Connection {
            reader,
            read_buffer: BytesMut::with_capacity(4096),
            replies,
            writer: Some(writer),
            client,
            limits,
            cancel,
        }
    }

    /// Serve requests until the peer disconnects or the server shuts down.
    ///
    /// The client is always deregistered from the dispatcher before this
    /// returns, and queued replies are flushed.
    pub async fn handle(&mut self, dispatcher: &Mutex<Dispatcher>) -> anyhow::Result<()> {
        let result = self.request_loop(dispatcher).await;

        dispatcher.lock().await.disconnect(self.client.id);

        // closing the channel lets the writer drain and exit
        let (closed, _) = mpsc::unbounded_channel();
        drop(std::mem::replace(&mut self.replies, closed));
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
        result
    }

    async fn request_loop(&mut self, dispatcher: &Mutex<Dispatcher>) -> anyhow::Result<()> {
        loop {
            // serve every complete request already buffered
            loop {
                let args = match RespParser::parse_request(&mut self.read_buffer) {
                    Ok(Some(args)) => args,
                    Ok(None) => break,
                    Err(e) => return self.reject(e),
                };
                if args.is_empty() {
                    continue;
                }

                let dispatched = dispatcher.lock().await.dispatch(&mut self.client, args);
                match dispatched {
                    Dispatched::Reply(reply) => self.send(reply)?,
                    Dispatched::Blocked(wait) => {
                        let (reply, open) = self.wait_blocked(wait, dispatcher).await;
                        if let Some(reply) = reply {
                            self.send(reply)?;
                        }
                        if !open {
                            return Ok(());
                        }
                    }
                }
            }

            // what is left is one incomplete request
            if self.overflowed() {
                return self.reject(Self::overflow_error());
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                read = self.reader.read_buf(&mut self.read_buffer) => {
                    if read? == 0 {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Wait out a blocking pop. Returns the reply to send, if any, and
    /// whether the connection is still open.
    async fn wait_blocked(
        &mut self,
        wait: BlockedWait,
        dispatcher: &Mutex<Dispatcher>,
    ) -> (Option<RespValue>, bool) {
        let BlockHandle {
            mut receiver,
            deadline,
        } = wait.handle;
        let op = wait.op;

        let expiry = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(expiry);

        let wake = loop {
            tokio::select! {
                result = &mut receiver => {
                    // a dropped sender means the coordinator already let go
                    break Wake::Result(result.unwrap_or(BlockResult::TimedOut));
                }
                _ = &mut expiry => break Wake::TimedOut,
                _ = self.cancel.cancelled() => break Wake::Closed,
                read = self.reader.read_buf(&mut self.read_buffer) => {
                    // requests sent while blocked stay buffered
                    match read {
                        Ok(0) | Err(_) => break Wake::Closed,
                        Ok(_) if self.overflowed() => break Wake::Overflow,
                        Ok(_) => continue,
                    }
                }
            }
        };

        let overflow = matches!(wake, Wake::Overflow);
        match wake {
            Wake::Result(result) => (Some(block_reply(&op, result)), true),
            Wake::TimedOut => {
                debug!("client {} blocking wait timed out", self.client.id);
                let still_blocked = dispatcher.lock().await.unblock(self.client.id);
                if still_blocked {
                    (Some(block_reply(&op, BlockResult::TimedOut)), true)
                } else {
                    let result = receiver.await.unwrap_or(BlockResult::TimedOut);
                    (Some(block_reply(&op, result)), true)
                }
            }
            Wake::Closed | Wake::Overflow => {
                let still_blocked = dispatcher.lock().await.unblock(self.client.id);
                let reply = if still_blocked {
                    None
                } else {
                    // served just before the close; hand it over if we still can
                    receiver.try_recv().ok().map(|result| block_reply(&op, result))
                };
                if overflow {
                    if let Some(reply) = reply {
                        let _ = self.send(reply);
                    }
                    let _ = self.reject(Self::overflow_error());
                    return (None, false);
                }
                (reply, false)
            }
        }
    }

    fn overflowed(&self) -> bool {
        self.read_buffer.len() > self.limits.max_query_buffer
    }

    fn overflow_error() -> RespError {
        RespError::InvalidProtocol("query buffer limit exceeded".to_string())
    }

    /// Report a protocol error to the peer before the connection closes
    fn reject(&self, e: RespError) -> anyhow::Result<()> {
        warn!("Protocol error from client {}: {}", self.client.id, e);
        self.send(RespValue::error(format!("ERR {}", e)))
    }

    fn send(&self, reply: RespValue) -> anyhow::Result<()> {
        self.replies
            .send(reply)
            .map_err(|_| anyhow!("client {} writer is gone", self.client.id))
    }
}

/// Encode and flush replies until the channel closes
async fn write_replies(
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::UnboundedReceiver<RespValue>,
) -> std::io::Result<()> {
    let mut buffer = BytesMut::with_capacity(4096);
    while let Some(reply) = queue.recv().await {
        buffer.clear();
        RespEncoder::encode_to(&mut buffer, &reply);
        while let Ok(reply) = queue.try_recv() {
            RespEncoder::encode_to(&mut buffer, &reply);
        }
        writer.write_all(&buffer).await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}
