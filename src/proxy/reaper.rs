//! Secondary finalizer worker
//!
//! Releasing a remote object must never block the thread that noticed the
//! object is no longer needed: drop glue and scope-exit paths cannot be
//! allowed to wait on network I/O. Finalize requests are therefore queued
//! to one dedicated background worker per connection, which drains the
//! queue and writes each frame without waiting for replies.
//!
//! Delivery is best-effort. Send failures are swallowed (there is no
//! caller to report to) and the remote side's own idle-timeout reclaim is
//! the backstop for lost messages. Shutdown does not wait for, or drain,
//! pending requests.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use log::{debug, trace};

use crate::network::ProxyTransport;

struct ReaperState {
    queue: VecDeque<Vec<u8>>,
    stopped: bool,
}

struct ReaperShared {
    state: Mutex<ReaperState>,
    wakeup: Condvar,
}

/// Background worker that sends queued finalize frames
pub struct Reaper {
    shared: Arc<ReaperShared>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Reaper {
    /// Spawn the worker against the connection's shared call transport
    ///
    /// The transport mutex is the same one guarding synchronous exchanges,
    /// so finalize frames never interleave with a request/reply pair.
    pub fn spawn(io: Arc<Mutex<Option<Box<dyn ProxyTransport>>>>) -> Self {
        let shared = Arc::new(ReaperShared {
            state: Mutex::new(ReaperState { queue: VecDeque::new(), stopped: false }),
            wakeup: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("px-reaper".to_string())
            .spawn(move || run_worker(worker_shared, io))
            .ok();
        if handle.is_none() {
            debug!("could not spawn reaper thread; finalize requests will be dropped");
        }
        Self { shared, handle }
    }

    /// Queue one encoded finalize frame; returns immediately
    pub fn enqueue(&self, frame: Vec<u8>) {
        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.stopped {
            trace!("reaper stopped; dropping finalize frame");
            return;
        }
        state.queue.push_back(frame);
        drop(state);
        self.shared.wakeup.notify_one();
    }

    /// Stop the worker without waiting for pending requests to be sent
    pub fn stop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            state.stopped = true;
        }
        self.shared.wakeup.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Number of frames waiting to be sent, for diagnostics and tests
    pub fn pending(&self) -> usize {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner()).queue.len()
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(shared: Arc<ReaperShared>, io: Arc<Mutex<Option<Box<dyn ProxyTransport>>>>) {
    loop {
        // Drain the whole queue each wakeup, then send outside the queue
        // lock so producers never wait on network I/O.
        let batch: Vec<Vec<u8>> = {
            let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            while state.queue.is_empty() && !state.stopped {
                state = shared
                    .wakeup
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner());
            }
            if state.stopped {
                return;
            }
            state.queue.drain(..).collect()
        };

        for frame in batch {
            let mut guard = io.lock().unwrap_or_else(|e| e.into_inner());
            match guard.as_mut() {
                Some(transport) => {
                    if let Err(e) = transport.write_all(&frame) {
                        // Best effort: the remote garbage collector is the
                        // backstop for a lost finalize.
                        debug!("finalize send failed (ignored): {e}");
                    }
                }
                None => trace!("transport closed; dropping finalize frame"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkResult;
    use crate::network::ShutdownHandle;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingTransport {
        sends: Arc<AtomicUsize>,
    }

    impl ProxyTransport for CountingTransport {
        fn write_all(&mut self, _buf: &[u8]) -> NetworkResult<()> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn read_exact(&mut self, _buf: &mut [u8]) -> NetworkResult<()> {
            unreachable!("reaper never reads")
        }
        fn shutdown(&mut self) -> NetworkResult<()> {
            Ok(())
        }
        fn shutdown_handle(&self) -> Option<ShutdownHandle> {
            None
        }
    }

    fn wait_for(sends: &Arc<AtomicUsize>, expected: usize) {
        for _ in 0..200 {
            if sends.load(Ordering::SeqCst) >= expected {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("worker never sent {expected} frames");
    }

    #[test]
    fn test_enqueued_frames_are_sent() {
        let sends = Arc::new(AtomicUsize::new(0));
        let io: Arc<Mutex<Option<Box<dyn ProxyTransport>>>> = Arc::new(Mutex::new(Some(
            Box::new(CountingTransport { sends: Arc::clone(&sends) }),
        )));
        let mut reaper = Reaper::spawn(io);
        reaper.enqueue(vec![1, 2, 3]);
        reaper.enqueue(vec![4, 5, 6]);
        wait_for(&sends, 2);
        reaper.stop();
    }

    #[test]
    fn test_enqueue_after_stop_is_dropped() {
        let sends = Arc::new(AtomicUsize::new(0));
        let io: Arc<Mutex<Option<Box<dyn ProxyTransport>>>> = Arc::new(Mutex::new(Some(
            Box::new(CountingTransport { sends: Arc::clone(&sends) }),
        )));
        let mut reaper = Reaper::spawn(io);
        reaper.stop();
        reaper.enqueue(vec![1]);
        assert_eq!(reaper.pending(), 0);
        assert_eq!(sends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_transport_is_tolerated() {
        let io: Arc<Mutex<Option<Box<dyn ProxyTransport>>>> = Arc::new(Mutex::new(None));
        let mut reaper = Reaper::spawn(io);
        reaper.enqueue(vec![9]);
        // give the worker a moment; nothing to assert beyond "no panic"
        thread::sleep(Duration::from_millis(20));
        reaper.stop();
    }
}
