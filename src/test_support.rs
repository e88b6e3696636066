//! An in-process fake receiver speaking the binary protocol over TCP, for tests.
//!
//! Records the open/close instant of every connection and the maximum number of simultaneously
//! open connections, so tests can assert the single-connection discipline.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use crate::codes::Input;
use crate::connection_settings::{ConnectionSettings, ConnectionSettingsBuilder};
use crate::protocol::{
    encode_response, read_frame, CommandCode, Frame, FrameKind, Rc5Command, ANSWER_OK,
    QUERY_REQUEST,
};

/// Answer byte the fake uses for anything it refuses.
pub(crate) const ANSWER_REFUSED: u8 = 0x85;

#[derive(Debug)]
pub(crate) struct FakeState {
    pub power_on: bool,
    pub volume: u8,
    pub muted: bool,
    pub source: u8,
    pub direct_mode: bool,
    pub decode_2ch: u8,
    pub decode_mch: u8,
    pub audio_format: u8,
    pub sample_rate: u8,
    /// Accept connections and read requests, but never answer.
    pub silent: bool,
    pub response_delay: Duration,
    pub refused_rc5: Vec<u8>,
    pub refused_queries: Vec<u8>,

    connections: Vec<(Instant, Option<Instant>)>,
    open_connections: usize,
    max_open_connections: usize,
    echoes_sent: usize,
    requests: Vec<Frame>,
}

impl Default for FakeState {
    fn default() -> Self {
        FakeState {
            power_on: false,
            volume: 0,
            muted: false,
            source: 0x02,
            direct_mode: false,
            decode_2ch: 0x01,
            decode_mch: 0x02,
            audio_format: 0x00,
            sample_rate: 0x02,
            silent: false,
            response_delay: Duration::ZERO,
            refused_rc5: vec![],
            refused_queries: vec![],
            connections: vec![],
            open_connections: 0,
            max_open_connections: 0,
            echoes_sent: 0,
            requests: vec![],
        }
    }
}

pub(crate) struct FakeReceiver {
    port: u16,
    state: Arc<Mutex<FakeState>>,
    accept_task: JoinHandle<()>,
}

impl Drop for FakeReceiver {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

impl FakeReceiver {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(FakeState::default()));

        let accept_state = Arc::clone(&state);
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_connection(stream, Arc::clone(&accept_state)));
            }
        });

        FakeReceiver {
            port,
            state,
            accept_task,
        }
    }

    /// Fast timings suitable for tests.
    pub fn settings(&self) -> ConnectionSettings {
        test_settings(self.port)
    }

    pub fn update<F: FnOnce(&mut FakeState)>(&self, change: F) {
        change(&mut self.state.lock().unwrap());
    }

    pub fn read<T, F: FnOnce(&FakeState) -> T>(&self, inspect: F) -> T {
        inspect(&self.state.lock().unwrap())
    }

    pub fn connection_count(&self) -> usize {
        self.read(|state| state.connections.len())
    }

    pub fn max_concurrent_connections(&self) -> usize {
        self.read(|state| state.max_open_connections)
    }

    pub fn connection_windows(&self) -> Vec<(Instant, Option<Instant>)> {
        self.read(|state| state.connections.clone())
    }

    /// Every connection was closed before the next one was opened.
    pub fn connection_windows_are_disjoint(&self) -> bool {
        let mut windows = self.connection_windows();
        windows.sort_by_key(|(opened, _)| *opened);

        windows.windows(2).all(|pair| match pair[0].1 {
            Some(closed) => closed <= pair[1].0,
            None => false,
        })
    }

    pub fn echoes_sent(&self) -> usize {
        self.read(|state| state.echoes_sent)
    }

    /// RC5 function codes received, in order.
    pub fn rc5_received(&self) -> Vec<u8> {
        self.read(|state| {
            state
                .requests
                .iter()
                .filter(|frame| frame.code == CommandCode::SimulateRc5.code())
                .filter_map(|frame| frame.data.get(1).copied())
                .collect()
        })
    }

    pub fn requests(&self) -> Vec<Frame> {
        self.read(|state| state.requests.clone())
    }
}

/// Settings pointing at a local port with nothing listening on it.
pub(crate) async fn unreachable_settings() -> ConnectionSettings {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    test_settings(port)
}

fn test_settings(port: u16) -> ConnectionSettings {
    ConnectionSettingsBuilder::new("127.0.0.1")
        .with_port(port)
        .with_connect_timeout(Duration::from_millis(500))
        .with_command_timeout(Duration::from_millis(500))
        .with_echo_drain_timeout(Duration::from_millis(50))
        .with_disconnect_delay(Duration::from_millis(10))
        .with_operation_spacing(Duration::from_millis(20))
        .build()
}

async fn serve_connection(mut stream: TcpStream, state: Arc<Mutex<FakeState>>) {
    let index = {
        let mut state = state.lock().unwrap();
        state.connections.push((Instant::now(), None));
        state.open_connections += 1;
        state.max_open_connections = state.max_open_connections.max(state.open_connections);
        state.connections.len() - 1
    };

    while let Ok(request) =
        read_frame(&mut stream, FrameKind::Request, Duration::from_secs(30)).await
    {
        let (replies, delay) = {
            let mut state = state.lock().unwrap();
            state.requests.push(request.clone());

            if state.silent {
                continue;
            }

            (respond(&mut state, &request), state.response_delay)
        };

        if !delay.is_zero() {
            sleep(delay).await;
        }

        let mut write_failed = false;
        for reply in replies {
            if stream.write_all(&reply).await.is_err() {
                write_failed = true;
                break;
            }
        }

        if write_failed {
            break;
        }
    }

    let mut state = state.lock().unwrap();
    state.connections[index].1 = Some(Instant::now());
    state.open_connections -= 1;
}

fn respond(state: &mut FakeState, request: &Frame) -> Vec<Vec<u8>> {
    let zone = request.zone;
    let code = request.code;
    let ok = |data: &[u8]| encode_response(zone, code, ANSWER_OK, data);
    let refused = encode_response(zone, code, ANSWER_REFUSED, &[]);

    if code == CommandCode::SimulateRc5.code() {
        let function = request.data.get(1).copied().unwrap_or_default();

        if state.refused_rc5.contains(&function) {
            return vec![refused];
        }

        apply_rc5(state, function);
        state.echoes_sent += 1;

        // Direct response, then the unsolicited echo
        return vec![ok(&request.data), ok(&request.data)];
    }

    if request.data != [QUERY_REQUEST] {
        if code == CommandCode::Volume.code() && state.power_on {
            state.volume = request.data.first().copied().unwrap_or_default().min(99);
            return vec![ok(&[state.volume])];
        }

        return vec![refused];
    }

    let is_power_query = code == CommandCode::Power.code();
    if state.refused_queries.contains(&code) || (!state.power_on && !is_power_query) {
        return vec![refused];
    }

    let data: Vec<u8> = match code {
        0x00 => vec![state.power_on as u8],
        0x0D => vec![state.volume],
        0x0E => vec![if state.muted { 0x00 } else { 0x01 }],
        0x0F => vec![state.direct_mode as u8],
        0x10 => vec![state.decode_2ch],
        0x11 => vec![state.decode_mch],
        0x1D => vec![state.source],
        0x43 => vec![state.audio_format, 0x05],
        0x44 => vec![state.sample_rate],
        _ => return vec![refused],
    };

    vec![ok(&data)]
}

fn apply_rc5(state: &mut FakeState, function: u8) {
    if function == Rc5Command::PowerToggle.code() {
        state.power_on = !state.power_on;
        return;
    }

    if !state.power_on {
        return;
    }

    match function {
        0x10 => state.volume = (state.volume + 1).min(99),
        0x11 => state.volume = state.volume.saturating_sub(1),
        0x0D => state.muted = !state.muted,
        0x1A => state.muted = true,
        0x78 => state.muted = false,
        other => {
            let selected = Input::ALL.iter().find(|input| input.rc5_code() == other);

            if let Some(input) = selected {
                let source =
                    (0x00..=0x20).find(|code| Input::from_source_code(*code) == Some(*input));

                if let Some(source) = source {
                    state.source = source;
                }
            }
        }
    }
}
