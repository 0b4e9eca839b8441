//! Periodic retransmission of a message until stopped

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{trace, warn};

/// Resends a payload on a fixed cadence.
///
/// The first attempt happens synchronously in [`ResendController::start`];
/// later attempts run on a spawned task. `max_times == 0` resends until
/// stopped. Dropping the controller stops it.
pub struct ResendController {
    stop_tx: Option<watch::Sender<bool>>,
}

impl ResendController {
    /// Send `payload` now, then every `interval`. `send` receives the attempt
    /// number starting at 1.
    pub fn start<T, F>(payload: T, interval: Duration, max_times: u32, send: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T, u32) + Send + Sync + 'static,
    {
        send(&payload, 1);
        if max_times == 1 {
            return Self { stop_tx: None };
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No runtime available, message sent once without resend");
                return Self { stop_tx: None };
            }
        };

        let (stop_tx, mut stop_rx) = watch::channel(false);
        handle.spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut times = 1u32;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        times = times.saturating_add(1);
                        send(&payload, times);
                        if max_times != 0 && times >= max_times {
                            trace!(times, "Resend finished");
                            break;
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            stop_tx: Some(stop_tx),
        }
    }

    /// Stop resending. Idempotent and non-blocking.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(true);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_tx.is_none()
    }
}

impl Drop for ResendController {
    fn drop(&mut self) {
        self.stop();
    }
}
