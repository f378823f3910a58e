//! Hand-off from off-thread work back onto the main loop.
//!
//! Results land in a [`TurnQueue`] and are applied when the loop drains it at
//! the start of the next frame, so the main thread never waits on I/O.

use std::io;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

#[derive(Debug)]
pub struct TurnSender<T> {
    tx: Sender<T>,
}

impl<T> Clone for TurnSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> TurnSender<T> {
    /// Returns false when the receiving loop is gone.
    pub fn deliver(&self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }
}

#[derive(Debug)]
pub struct TurnQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Default for TurnQueue<T> {
    fn default() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }
}

impl<T> TurnQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> TurnSender<T> {
        TurnSender {
            tx: self.tx.clone(),
        }
    }

    /// Everything delivered so far, in delivery order. Never blocks.
    pub fn drain(&self) -> Vec<T> {
        let mut delivered = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(value) => delivered.push(value),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        delivered
    }
}

/// Runs `job` on a named worker thread and delivers its result as a turn.
pub fn run_off_thread<T, F>(name: &str, sender: TurnSender<T>, job: F) -> io::Result<()>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _ = sender.deliver(job());
        })
        .map(|_| ())
}
