//! Mob turn timer.
//!
//! A parallel reminder that fires when the current driver's turn is over.
//! It only surfaces a trace to the user; it never triggers a build cycle
//! and never touches the engine's state machine.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};
use tracing::{info, warn};

pub struct MobTimer {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl MobTimer {
    /// Start a timer firing every `turn_duration`. Returns `None` for a
    /// zero duration (timer disabled).
    pub fn start(turn_duration: Duration) -> Option<Self> {
        if turn_duration.is_zero() {
            return None;
        }
        info!(duration = ?turn_duration, "mob timer started");
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticker = tick(turn_duration);
        let handle = std::thread::spawn(move || loop {
            select! {
                recv(ticker) -> _ => {
                    warn!("mob turn is over, time to rotate roles");
                }
                recv(stop_rx) -> _ => return,
            }
        });
        Some(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.stop_tx.send(());
            let _ = handle.join();
            info!("mob timer stopped");
        }
    }
}

impl Drop for MobTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
