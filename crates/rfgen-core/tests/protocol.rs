//! End-to-end protocol tests over a scripted transport.
//!
//! The mock transport records every exchange (start and end separately, so
//! serialization is observable) and replays canned replies in order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use rfgen_core::monitor::Monitor;
use rfgen_core::program::{ProgramClient, ProgramStep};
use rfgen_core::protocol::{
    Command, ConnectionState, Dispatcher, ProtocolError, Response, Transport,
};
use rfgen_core::rf::RfClient;

#[derive(Default)]
struct MockState {
    open: bool,
    log: Vec<String>,
    replies: VecDeque<Result<Response, ProtocolError>>,
    exchange_delay: Option<Duration>,
}

/// Scripted transport shared between the dispatcher's I/O thread and the
/// test body.
#[derive(Clone, Default)]
struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    fn new() -> Self {
        Self::default()
    }

    fn push_line(&self, line: &str) {
        self.state
            .lock()
            .unwrap()
            .replies
            .push_back(Ok(Response::Line(line.to_string())));
    }

    fn push_raw(&self, bytes: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .replies
            .push_back(Ok(Response::Raw(bytes)));
    }

    fn set_exchange_delay(&self, delay: Duration) {
        self.state.lock().unwrap().exchange_delay = Some(delay);
    }

    /// Commands written so far, in wire order.
    fn writes(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter_map(|entry| entry.strip_prefix("start "))
            .map(str::to_string)
            .collect()
    }

    fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }
}

impl Transport for MockTransport {
    fn state(&self) -> ConnectionState {
        if self.state.lock().unwrap().open {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    fn open(&mut self, _port_name: &str) -> bool {
        self.state.lock().unwrap().open = true;
        true
    }

    fn close(&mut self) {
        self.state.lock().unwrap().open = false;
    }

    fn exchange(&mut self, command: &Command) -> Result<Response, ProtocolError> {
        let label = match command {
            Command::Text(line) => line.clone(),
            Command::Raw(bytes) => format!("raw[{}]", bytes.len()),
        };
        let delay = {
            let mut st = self.state.lock().unwrap();
            if !st.open {
                return Err(ProtocolError::NotConnected);
            }
            st.log.push(format!("start {label}"));
            st.exchange_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let mut st = self.state.lock().unwrap();
        st.log.push(format!("end {label}"));
        st.replies
            .pop_front()
            .unwrap_or(Err(ProtocolError::Timeout))
    }
}

async fn connected_harness() -> (MockTransport, Dispatcher) {
    let mock = MockTransport::new();
    let dispatcher = Dispatcher::with_transport(Box::new(mock.clone()));
    assert!(dispatcher.connect("mock0").await);
    (mock, dispatcher)
}

#[tokio::test]
async fn add_step_truncates_fractional_hz() {
    let (mock, dispatcher) = connected_harness().await;
    mock.push_line("OK");

    let programs = ProgramClient::new(dispatcher);
    let step = ProgramStep {
        start_hz: 2_400_000_000.7,
        stop_hz: 2_450_000_000.2,
        ramp_secs: 1.0,
        dwell_secs: 0.5,
        power_dbm: 0,
    };
    programs.add_step("X", &step).await.unwrap();

    assert_eq!(
        mock.writes(),
        vec!["PROG:STEP X 2400000000 2450000000 1 0.5 0".to_string()]
    );
}

#[tokio::test]
async fn blank_names_fail_without_touching_the_wire() {
    let (mock, dispatcher) = connected_harness().await;
    let programs = ProgramClient::new(dispatcher);
    let step = ProgramStep {
        start_hz: 10e6,
        stop_hz: 20e6,
        ramp_secs: 1.0,
        dwell_secs: 1.0,
        power_dbm: 0,
    };

    for name in ["", "   ", "\t\n"] {
        assert!(matches!(
            programs.create(name).await,
            Err(ProtocolError::InvalidArgument(_))
        ));
        assert!(matches!(
            programs.delete(name).await,
            Err(ProtocolError::InvalidArgument(_))
        ));
        assert!(matches!(
            programs.save(name).await,
            Err(ProtocolError::InvalidArgument(_))
        ));
        assert!(matches!(
            programs.load(name).await,
            Err(ProtocolError::InvalidArgument(_))
        ));
        assert!(matches!(
            programs.add_step(name, &step).await,
            Err(ProtocolError::InvalidArgument(_))
        ));
        assert!(matches!(
            programs.clear_steps(name).await,
            Err(ProtocolError::InvalidArgument(_))
        ));
    }

    assert!(mock.writes().is_empty(), "no bytes may reach the wire");
}

#[tokio::test]
async fn a_silent_device_yields_timeout() {
    let (_mock, dispatcher) = connected_harness().await;
    // No scripted reply: the transport reports a timeout.
    let result = dispatcher.send_line("SYS:IDN?").await;
    assert_eq!(result, Err(ProtocolError::Timeout));
}

#[tokio::test]
async fn exchanges_on_a_closed_channel_are_rejected() {
    let mock = MockTransport::new();
    let dispatcher = Dispatcher::with_transport(Box::new(mock.clone()));
    assert!(!dispatcher.is_connected().await);

    let result = dispatcher.send_line("SYS:IDN?").await;
    assert_eq!(result, Err(ProtocolError::NotConnected));
}

#[tokio::test]
async fn disconnect_closes_the_channel() {
    let (mock, dispatcher) = connected_harness().await;
    assert!(dispatcher.is_connected().await);

    dispatcher.disconnect().await;
    assert!(!dispatcher.is_connected().await);

    mock.push_line("OK");
    let result = dispatcher.send_line("PROG:RUN").await;
    assert_eq!(result, Err(ProtocolError::NotConnected));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_exchanges_never_interleave() {
    let (mock, dispatcher) = connected_harness().await;
    mock.set_exchange_delay(Duration::from_millis(30));
    mock.push_line("OK");
    mock.push_line("OK");

    let first = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.send_line("PROG:RUN").await })
    };
    let second = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.send_line("SYS:STAT?").await })
    };
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    // The log must read start/end/start/end with matching labels: the full
    // first exchange completed before the second began.
    let log = mock.log();
    assert_eq!(log.len(), 4);
    assert_eq!(log[0].strip_prefix("start "), log[1].strip_prefix("end "));
    assert_eq!(log[2].strip_prefix("start "), log[3].strip_prefix("end "));
}

#[tokio::test]
async fn program_round_trip_succeeds() {
    let (mock, dispatcher) = connected_harness().await;
    mock.push_line("OK");
    mock.push_line("OK");
    mock.push_line("X");

    let programs = ProgramClient::new(dispatcher);
    programs.create("X").await.unwrap();
    programs
        .add_step(
            "X",
            &ProgramStep {
                start_hz: 2.4e9,
                stop_hz: 2.45e9,
                ramp_secs: 1.0,
                dwell_secs: 0.5,
                power_dbm: 3,
            },
        )
        .await
        .unwrap();
    let listing = programs.list().await.unwrap();
    assert!(listing.contains('X'));

    assert_eq!(
        mock.writes(),
        vec![
            "PROG:NEW X".to_string(),
            "PROG:STEP X 2400000000 2450000000 1 0.5 3".to_string(),
            "PROG:LIST?".to_string(),
        ]
    );
}

#[tokio::test]
async fn device_rejection_carries_the_verbatim_reply() {
    let (mock, dispatcher) = connected_harness().await;
    mock.push_line("ERR:FULL");

    let programs = ProgramClient::new(dispatcher);
    let err = programs.create("test").await.unwrap_err();
    assert_eq!(
        err,
        ProtocolError::DeviceRejected {
            operation: "create",
            reply: "ERR:FULL".to_string(),
        }
    );
}

#[tokio::test]
async fn raw_exchanges_round_trip_bytes() {
    let (mock, dispatcher) = connected_harness().await;
    mock.push_raw(vec![0xde, 0xad, 0xbe, 0xef]);

    let reply = dispatcher.send_raw(vec![0x01, 0x02]).await.unwrap();
    assert_eq!(reply, vec![0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(mock.writes(), vec!["raw[2]".to_string()]);
}

#[tokio::test]
async fn monitor_polls_and_publishes_samples() {
    let (mock, dispatcher) = connected_harness().await;
    mock.push_line("TEMP:42.5,VOLT:5.02,CURR:0.31");

    let monitor = Monitor::new(dispatcher);
    let mut events = monitor.subscribe();
    monitor.start();
    assert!(monitor.is_running());

    let sample = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no sample within the first tick")
        .unwrap();
    assert_eq!(sample.temperature_c, 42.5);
    assert_eq!(sample.voltage_v, 5.02);
    assert_eq!(sample.current_a, 0.31);
    assert_eq!(monitor.latest(), Some(sample));

    monitor.stop();
    assert!(!monitor.is_running());
}

#[tokio::test]
async fn monitor_skips_ticks_while_disconnected() {
    let mock = MockTransport::new();
    let dispatcher = Dispatcher::with_transport(Box::new(mock.clone()));

    let monitor = Monitor::new(dispatcher);
    monitor.start();
    tokio::time::sleep(Duration::from_millis(200)).await;
    monitor.stop();

    assert!(
        mock.writes().is_empty(),
        "disconnected ticks must not issue exchanges"
    );
}

#[tokio::test]
async fn stopping_the_monitor_prevents_new_exchanges() {
    let (mock, dispatcher) = connected_harness().await;
    for _ in 0..8 {
        mock.push_line("TEMP:25.0,VOLT:5.00,CURR:0.10");
    }

    let monitor = Monitor::new(dispatcher);
    monitor.start();
    // The first tick polls immediately.
    tokio::time::sleep(Duration::from_millis(200)).await;
    monitor.stop();
    let polls_at_stop = mock.writes().len();
    assert!(polls_at_stop >= 1);

    // Well past the next scheduled tick: the count must not move.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(mock.writes().len(), polls_at_stop);
}

#[tokio::test]
async fn monitor_survives_failed_ticks() {
    let (mock, dispatcher) = connected_harness().await;
    // First tick times out (no scripted reply queued for it) but the loop
    // keeps running and the point query below still works.
    let monitor = Monitor::new(dispatcher);
    monitor.start();
    tokio::time::sleep(Duration::from_millis(200)).await;
    monitor.stop();
    assert_eq!(monitor.latest(), None);

    mock.push_line("42.5");
    assert_eq!(monitor.temperature().await, 42.5);
}

#[tokio::test]
async fn point_queries_fall_back_to_zero() {
    let (mock, dispatcher) = connected_harness().await;
    let monitor = Monitor::new(dispatcher);

    mock.push_line("not-a-number");
    assert_eq!(monitor.voltage().await, 0.0);

    // No reply queued: exchange fails, same fallback.
    assert_eq!(monitor.current().await, 0.0);

    assert_eq!(
        mock.writes(),
        vec!["VOLT?".to_string(), "CURR?".to_string()]
    );
}

#[tokio::test]
async fn rf_client_gates_on_ok_and_parses_queries() {
    let (mock, dispatcher) = connected_harness().await;
    let rf = RfClient::new(dispatcher);

    mock.push_line("OK");
    rf.set_frequency(2_400_000_000).await.unwrap();

    mock.push_line("2400000000");
    assert_eq!(rf.frequency().await.unwrap(), 2_400_000_000);

    mock.push_line("ERROR: Frequency out of range");
    let err = rf.set_frequency(1).await.unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::DeviceRejected {
            operation: "set_frequency",
            ..
        }
    ));

    mock.push_line("ON");
    assert!(rf.output().await.unwrap());

    mock.push_line("garbled");
    assert!(matches!(rf.output().await, Err(ProtocolError::Parse(_))));

    mock.push_line("FrequencyGenerator,FG-1,SN123,1.0.0");
    assert_eq!(
        rf.identify().await.unwrap(),
        "FrequencyGenerator,FG-1,SN123,1.0.0"
    );

    assert_eq!(
        mock.writes(),
        vec![
            "RF:FREQ 2400000000".to_string(),
            "RF:FREQ?".to_string(),
            "RF:FREQ 1".to_string(),
            "RF:OUTPUT?".to_string(),
            "RF:OUTPUT?".to_string(),
            "SYS:IDN?".to_string(),
        ]
    );
}
