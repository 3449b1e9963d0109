//! Completion handles over spawned request threads.
//!
//! Every remote call runs on its own detached thread (the in-process
//! stand-in for an RPC pool thread serving the request) and resolves an
//! [`RpcFuture`]. The ready-poll shape is what Expand, PullRemote and
//! Synchronize are written against.

use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Mutex;

use crate::error::{ClusterError, ClusterResult};

struct FutureInner<T> {
    receiver: Receiver<T>,
    ready: Option<T>,
}

/// A one-shot completion handle.
pub struct RpcFuture<T> {
    inner: Mutex<FutureInner<T>>,
}

impl<T: Send + 'static> RpcFuture<T> {
    /// Spawns `f` on a detached request thread and returns its handle.
    #[must_use]
    pub fn spawn(name: &str, f: impl FnOnce() -> T + Send + 'static) -> Self {
        let (sender, receiver) = std::sync::mpsc::sync_channel(1);
        // The receiver may be dropped before the response arrives (an
        // aborted query); the send error is deliberately ignored.
        let _ = std::thread::Builder::new()
            .name(format!("rpc-{name}"))
            .spawn(move || {
                let _ = sender.send(f());
            })
            .expect("failed to spawn rpc thread");
        Self { inner: Mutex::new(FutureInner { receiver, ready: None }) }
    }

    /// An already-resolved future.
    #[must_use]
    pub fn ready(value: T) -> Self {
        let (_sender, receiver) = std::sync::mpsc::sync_channel(1);
        Self { inner: Mutex::new(FutureInner { receiver, ready: Some(value) }) }
    }

    /// Whether the response has arrived.
    ///
    /// A poisoned handle reports ready so the failure surfaces at take
    /// time instead of spinning forever.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return true;
        };
        if inner.ready.is_some() {
            return true;
        }
        match inner.receiver.try_recv() {
            Ok(value) => {
                inner.ready = Some(value);
                true
            }
            Err(TryRecvError::Empty) => false,
            // A dead request thread is reported at take time.
            Err(TryRecvError::Disconnected) => true,
        }
    }

    /// Blocks until the response arrives and returns it.
    pub fn wait(self) -> ClusterResult<T> {
        let mut inner = self
            .inner
            .into_inner()
            .map_err(|_| ClusterError::LockPoisoned("rpc future".into()))?;
        if let Some(value) = inner.ready.take() {
            return Ok(value);
        }
        inner
            .receiver
            .recv()
            .map_err(|_| ClusterError::ChannelClosed("request thread died".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn resolves_after_work_completes() {
        let future = RpcFuture::spawn("test", || {
            std::thread::sleep(Duration::from_millis(10));
            42u32
        });
        assert_eq!(future.wait().unwrap(), 42);
    }

    #[test]
    fn is_ready_polls_without_consuming() {
        let future = RpcFuture::spawn("test", || 7u32);
        // Eventually ready, and still takeable afterwards.
        while !future.is_ready() {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(future.is_ready());
        assert_eq!(future.wait().unwrap(), 7);
    }

    #[test]
    fn ready_future_is_immediate() {
        let future = RpcFuture::ready(3u32);
        assert!(future.is_ready());
        assert_eq!(future.wait().unwrap(), 3);
    }
}
