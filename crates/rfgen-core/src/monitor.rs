//! Telemetry poller
//!
//! A recurring background loop that polls `SYS:STAT?` through the dispatcher,
//! caches the most recent sample, and fans it out to subscribers. The loop
//! shares the physical link with on-demand commands; the dispatcher's queue
//! keeps the traffic from interleaving.
//!
//! A failed tick is logged and skipped, never fatal: a telemetry gap is
//! acceptable, a dead poller is not.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::{Dispatcher, ProtocolError};

/// Poll cadence
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Fan-out capacity; slow subscribers lag rather than block the poller
const EVENT_CAPACITY: usize = 16;

const STATUS_QUERY: &str = "SYS:STAT?";

/// One health reading, published once per poll tick and never mutated after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// When the sample was taken (controller clock)
    pub timestamp: DateTime<Utc>,
    /// Device temperature in °C
    pub temperature_c: f64,
    /// Supply voltage in V
    pub voltage_v: f64,
    /// Supply current in A
    pub current_a: f64,
    /// Verbatim status line as received
    pub raw: String,
}

impl TelemetrySample {
    /// Parse the device's `TEMP:<t>,VOLT:<v>,CURR:<c>` status line.
    ///
    /// Fields that fail to parse stay `0.0`; the raw line is always kept so
    /// nothing the device said is lost.
    pub fn parse(raw: &str) -> Self {
        let mut sample = Self {
            timestamp: Utc::now(),
            temperature_c: 0.0,
            voltage_v: 0.0,
            current_a: 0.0,
            raw: raw.to_string(),
        };
        for field in raw.split(',') {
            let Some((key, value)) = field.split_once(':') else {
                continue;
            };
            let Ok(value) = value.trim().parse::<f64>() else {
                continue;
            };
            match key.trim() {
                "TEMP" => sample.temperature_c = value,
                "VOLT" => sample.voltage_v = value,
                "CURR" => sample.current_a = value,
                _ => {}
            }
        }
        sample
    }
}

/// Background telemetry poller with a latest-sample cache.
pub struct Monitor {
    dispatcher: Dispatcher,
    latest: Arc<RwLock<Option<TelemetrySample>>>,
    events: broadcast::Sender<TelemetrySample>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl Monitor {
    /// Create a monitor over the given dispatcher. Polling does not start
    /// until [`Monitor::start`] is called.
    pub fn new(dispatcher: Dispatcher) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            dispatcher,
            latest: Arc::new(RwLock::new(None)),
            events,
            cancel: Mutex::new(None),
        }
    }

    /// Start the poll loop. Idempotent; a second call while running is a
    /// no-op. Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut guard = self.cancel.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *guard = Some(token.clone());

        let dispatcher = self.dispatcher.clone();
        let latest = Arc::clone(&self.latest);
        let events = self.events.clone();

        tokio::spawn(async move {
            debug!("telemetry poller started");
            loop {
                // Disconnected ticks issue no exchange at all; just wait out
                // the interval and re-check.
                if dispatcher.is_connected().await && !token.is_cancelled() {
                    match dispatcher.send_line(STATUS_QUERY).await {
                        Ok(reply) => {
                            let sample = TelemetrySample::parse(&reply);
                            *latest.write().unwrap() = Some(sample.clone());
                            let _ = events.send(sample);
                        }
                        Err(e) => warn!(error = %e, "telemetry tick failed"),
                    }
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                }
            }
            debug!("telemetry poller stopped");
        });
    }

    /// Stop the poll loop. No new exchange is issued once this returns; an
    /// exchange already in flight runs to completion or timeout.
    pub fn stop(&self) {
        if let Some(token) = self.cancel.lock().unwrap().take() {
            token.cancel();
        }
    }

    /// Whether the poll loop is running.
    pub fn is_running(&self) -> bool {
        self.cancel.lock().unwrap().is_some()
    }

    /// Subscribe to per-tick sample notifications. Subscribers that fall
    /// behind miss samples instead of blocking the poller.
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetrySample> {
        self.events.subscribe()
    }

    /// The most recent sample, if any tick has succeeded since connect.
    pub fn latest(&self) -> Option<TelemetrySample> {
        self.latest.read().unwrap().clone()
    }

    /// One-off status query. Unlike the poll loop, errors propagate.
    pub async fn status(&self) -> Result<String, ProtocolError> {
        self.dispatcher.send_line(STATUS_QUERY).await
    }

    /// One-off temperature reading in °C.
    pub async fn temperature(&self) -> f64 {
        self.point_query("TEMP?").await
    }

    /// One-off supply voltage reading in V.
    pub async fn voltage(&self) -> f64 {
        self.point_query("VOLT?").await
    }

    /// One-off supply current reading in A.
    pub async fn current(&self) -> f64 {
        self.point_query("CURR?").await
    }

    // 0.0 doubles as the "unavailable" marker: exchange failures and
    // unparsable replies both yield it, and callers must treat it that way.
    async fn point_query(&self, query: &str) -> f64 {
        match self.dispatcher.send_line(query).await {
            Ok(reply) => reply.trim().parse().unwrap_or(0.0),
            Err(e) => {
                warn!(query, error = %e, "point query failed");
                0.0
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_a_wellformed_status_line() {
        let sample = TelemetrySample::parse("TEMP:42.5,VOLT:5.02,CURR:0.31");
        assert_eq!(sample.temperature_c, 42.5);
        assert_eq!(sample.voltage_v, 5.02);
        assert_eq!(sample.current_a, 0.31);
        assert_eq!(sample.raw, "TEMP:42.5,VOLT:5.02,CURR:0.31");
    }

    #[test]
    fn unparsable_fields_stay_zero() {
        let sample = TelemetrySample::parse("TEMP:hot,VOLT:5.0");
        assert_eq!(sample.temperature_c, 0.0);
        assert_eq!(sample.voltage_v, 5.0);
        assert_eq!(sample.current_a, 0.0);
    }

    #[test]
    fn junk_lines_keep_the_raw_text() {
        let sample = TelemetrySample::parse("ERROR: sensor offline");
        assert_eq!(sample.temperature_c, 0.0);
        assert_eq!(sample.raw, "ERROR: sensor offline");
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let sample = TelemetrySample::parse("TEMP:30.0,FAN:2400,VOLT:4.9,CURR:0.1");
        assert_eq!(sample.temperature_c, 30.0);
        assert_eq!(sample.voltage_v, 4.9);
        assert_eq!(sample.current_a, 0.1);
    }
}
