//! Heartbeat ping/pong liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// What the session should do on a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Client answered since the last tick; send another ping.
    Alive,
    /// Client missed this tick but is still within the timeout.
    Missed,
    /// Client exceeded the timeout; close the connection.
    Dead,
}

/// Number of consecutive missed ticks tolerated before `timeout` elapses.
///
/// Computed as `timeout / interval`, clamped to at least 1.
pub fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    u32::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u32::MAX)
        .max(1)
}

/// Tracks consecutive missed pongs for one connection.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    missed: u32,
    max_missed: u32,
}

impl HeartbeatMonitor {
    /// Create a monitor for the given ping cadence.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            missed: 0,
            max_missed: max_missed(interval, timeout),
        }
    }

    /// Evaluate one tick, consuming the connection's alive flag.
    pub fn tick(&mut self, connection: &ClientConnection) -> Liveness {
        if connection.check_alive() {
            self.missed = 0;
            Liveness::Alive
        } else {
            self.missed += 1;
            if self.missed >= self.max_missed {
                Liveness::Dead
            } else {
                Liveness::Missed
            }
        }
    }
}

/// Run heartbeat checks for a connection until it times out or `cancel` fires.
///
/// The caller is responsible for sending pings; this loop only watches the
/// alive flag that inbound frames refresh.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check_interval = time::interval(interval);
    // first tick completes immediately
    let _ = check_interval.tick().await;
    let mut monitor = HeartbeatMonitor::new(interval, timeout);

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if monitor.tick(&connection) == Liveness::Dead {
                    return HeartbeatResult::TimedOut;
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}
