//! Barrier side channel.
//!
//! Barrier-scheduled tasks expose a per-session local listener the worker
//! can call back into. Each call is a short-lived connection carrying a
//! single `i32` request code: the rendezvous code blocks the connection
//! until every cooperating task arrives, then answers with a fixed success
//! envelope; anything else gets a fixed error envelope. The worker may
//! call back any number of times over the command's lifetime.
//!
//! The listener is bound before any session bytes are written (no free
//! local port is fatal to the whole session) and closed when the task
//! completes.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Result, WorkerError};
use crate::protocol::envelope;
use crate::task::TaskContext;

/// Request code for the rendezvous call.
pub const BARRIER_FUNCTION: i32 = 1;

/// Reply sent when the rendezvous succeeds.
pub const BARRIER_RESULT_SUCCESS: &str = "success";

/// Reply sent for request codes this channel does not understand.
pub const NOT_RECOGNIZED: &str = "Not recognized function call from python side.";

/// How long an accepted connection may sit idle before its request code
/// arrives. Once a recognized rendezvous begins, no deadline applies: the
/// rendezvous duration is policy-defined by the coordinator.
pub(crate) const REQUEST_DEADLINE: Duration = Duration::from_secs(10);

/// Bind the session's barrier listener on an ephemeral local port.
pub(crate) async fn bind() -> Result<(TcpListener, u16)> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.map_err(|e| {
        WorkerError::ResourceSetup(format!("failed to bind barrier listener: {}", e))
    })?;
    let port = listener
        .local_addr()
        .map_err(|e| {
            WorkerError::ResourceSetup(format!("failed to read barrier listener address: {}", e))
        })?
        .port();
    Ok((listener, port))
}

/// Accept loop: one short-lived connection per worker call, until the
/// task completes. Dropping the listener on exit closes the advertised
/// port.
pub(crate) async fn serve(listener: TcpListener, ctx: Arc<TaskContext>) {
    loop {
        tokio::select! {
            _ = ctx.completed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    tokio::spawn(handle_call(stream, ctx.clone()));
                }
                Err(e) => {
                    if ctx.is_completed() {
                        // Expected at teardown: the listener is going away.
                        break;
                    }
                    tracing::debug!(error = %e, "barrier accept failed");
                }
            },
        }
    }
}

/// Serve one worker callback. Errors are scoped to this connection and
/// never affect the main data path or the accept loop.
async fn handle_call(mut stream: TcpStream, ctx: Arc<TaskContext>) {
    let code = match tokio::time::timeout(REQUEST_DEADLINE, stream.read_i32()).await {
        Ok(Ok(code)) => code,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "barrier connection dropped before request");
            return;
        }
        Err(_) => {
            tracing::debug!("barrier connection idle past request deadline");
            return;
        }
    };

    let reply = match code {
        BARRIER_FUNCTION => match ctx.barrier() {
            Some(coordinator) => match coordinator.wait().await {
                Ok(()) => BARRIER_RESULT_SUCCESS.to_string(),
                Err(message) => message,
            },
            None => "barrier is not available for this task".to_string(),
        },
        other => {
            tracing::warn!(code = other, "unrecognized barrier request");
            NOT_RECOGNIZED.to_string()
        }
    };

    if let Err(e) = envelope::write_envelope(&mut stream, reply.as_bytes()).await {
        tracing::debug!(error = %e, "failed to write barrier reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::Notify;

    use crate::task::BarrierCoordinator;

    struct GatedCoordinator {
        gate: Notify,
    }

    #[async_trait]
    impl BarrierCoordinator for GatedCoordinator {
        async fn wait(&self) -> std::result::Result<(), String> {
            self.gate.notified().await;
            Ok(())
        }
    }

    struct FailingCoordinator;

    #[async_trait]
    impl BarrierCoordinator for FailingCoordinator {
        async fn wait(&self) -> std::result::Result<(), String> {
            Err("barrier group disbanded".to_string())
        }
    }

    async fn call(port: u16, code: i32) -> bytes::Bytes {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_i32(code).await.unwrap();
        envelope::read_envelope(&mut stream).await.unwrap()
    }

    #[tokio::test]
    async fn test_barrier_call_blocks_until_release() {
        let coordinator = Arc::new(GatedCoordinator {
            gate: Notify::new(),
        });
        let ctx = Arc::new(TaskContext::with_barrier(coordinator.clone()));
        let (listener, port) = bind().await.unwrap();
        tokio::spawn(serve(listener, ctx.clone()));

        let caller = tokio::spawn(call(port, BARRIER_FUNCTION));

        // The connection must still be waiting well past any request
        // deadline concern; release it and expect the success reply.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!caller.is_finished());
        coordinator.gate.notify_waiters();

        let reply = tokio::time::timeout(Duration::from_secs(2), caller)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&reply[..], BARRIER_RESULT_SUCCESS.as_bytes());

        ctx.mark_completed();
    }

    #[tokio::test]
    async fn test_barrier_failure_message_is_reply() {
        let ctx = Arc::new(TaskContext::with_barrier(Arc::new(FailingCoordinator)));
        let (listener, port) = bind().await.unwrap();
        tokio::spawn(serve(listener, ctx.clone()));

        let reply = call(port, BARRIER_FUNCTION).await;
        assert_eq!(&reply[..], b"barrier group disbanded");

        ctx.mark_completed();
    }

    #[tokio::test]
    async fn test_unrecognized_code_gets_fixed_reply() {
        let ctx = Arc::new(TaskContext::with_barrier(Arc::new(FailingCoordinator)));
        let (listener, port) = bind().await.unwrap();
        tokio::spawn(serve(listener, ctx.clone()));

        let reply = call(port, 99).await;
        assert_eq!(&reply[..], NOT_RECOGNIZED.as_bytes());

        // A bad call must not poison the channel for later connections.
        let reply = call(port, 99).await;
        assert_eq!(&reply[..], NOT_RECOGNIZED.as_bytes());

        ctx.mark_completed();
    }

    #[tokio::test]
    async fn test_listener_closes_on_completion() {
        let ctx = Arc::new(TaskContext::with_barrier(Arc::new(FailingCoordinator)));
        let (listener, _port) = bind().await.unwrap();
        let acceptor = tokio::spawn(serve(listener, ctx.clone()));

        ctx.mark_completed();
        tokio::time::timeout(Duration::from_secs(1), acceptor)
            .await
            .expect("acceptor should stop")
            .unwrap();
    }
}
