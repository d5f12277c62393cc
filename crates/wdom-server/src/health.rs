//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while serving, `"terminating"` once auto-shutdown fired.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live browser connections.
    pub connections: usize,
    /// Elements in the document tree.
    pub elements: usize,
    /// Outbound messages not yet broadcast.
    pub queued_messages: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    terminated: bool,
    connections: usize,
    elements: usize,
    queued_messages: usize,
) -> HealthResponse {
    HealthResponse {
        status: if terminated { "terminating" } else { "ok" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        elements,
        queued_messages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), false, 0, 0, 0);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn status_after_termination() {
        let resp = health_check(Instant::now(), true, 0, 0, 0);
        assert_eq!(resp.status, "terminating");
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, false, 0, 0, 0);
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let resp = health_check(Instant::now(), false, 2, 7, 3);
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 2);
        assert_eq!(parsed["elements"], 7);
        assert_eq!(parsed["queued_messages"], 3);
        assert!(parsed["uptime_secs"].is_number());
    }
}
