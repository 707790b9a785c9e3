//! Connection supervision for both transports.
//!
//! One finite-state machine per link, driven by a periodic presence check
//! and, for BLE, by push loss notifications from the session itself. A
//! failed presence check (enumeration error) is logged and treated as "no
//! change". Reconnect attempts are spaced with a linear backoff so the
//! device enumeration layer is never hammered.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::transport::{LinkEvent, Session, TransportStatus};

/// Cap on the delay between reconnect attempts.
const MAX_BACKOFF_MS: u64 = 10_000;

fn backoff(retry: u64) -> Duration {
    Duration::from_millis(MAX_BACKOFF_MS.min(250 * retry))
}

/// Supervisor state for one transport session.
pub struct Watchdog {
    retry: u64,
    next_attempt: Instant,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    pub fn new() -> Self {
        Self {
            retry: 0,
            next_attempt: Instant::now(),
        }
    }

    /// One supervision step: verify an established link, or try to bring a
    /// lost one back up once the backoff delay has elapsed. Returns the
    /// lifecycle transition performed, if any.
    pub async fn tick<S: Session + ?Sized>(&mut self, session: &mut S) -> Option<LinkEvent> {
        match session.status() {
            TransportStatus::Connected => {
                match session.present().await {
                    Ok(true) => None,
                    Ok(false) => {
                        warn!("{} endpoint vanished, closing session", session.link());
                        Some(self.mark_lost(session).await)
                    }
                    Err(e) => {
                        // Enumeration failure, not a device failure.
                        warn!("{} presence check failed (ignored): {}", session.link(), e);
                        None
                    }
                }
            }
            TransportStatus::Connecting | TransportStatus::Disconnected => {
                if Instant::now() < self.next_attempt {
                    return None;
                }
                match session.present().await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!("{} endpoint not present yet", session.link());
                        self.next_attempt = Instant::now() + backoff(self.retry.max(1));
                        return None;
                    }
                    Err(e) => {
                        warn!("{} presence check failed (ignored): {}", session.link(), e);
                        return None;
                    }
                }

                match session.open().await {
                    Ok(()) => {
                        self.retry = 0;
                        Some(LinkEvent::Connected(session.link()))
                    }
                    Err(e) => {
                        self.retry += 1;
                        let delay = backoff(self.retry);
                        warn!(
                            "{} open attempt #{} failed, retrying in {:?}: {}",
                            session.link(),
                            self.retry,
                            delay,
                            e
                        );
                        self.next_attempt = Instant::now() + delay;
                        None
                    }
                }
            }
        }
    }

    /// Push-notified loss (BLE notification stream ended, failed write).
    /// Releases the session and schedules an immediate reconnect attempt.
    pub async fn mark_lost<S: Session + ?Sized>(&mut self, session: &mut S) -> LinkEvent {
        session.close().await;
        self.retry = 0;
        self.next_attempt = Instant::now();
        LinkEvent::Disconnected(session.link())
    }
}
