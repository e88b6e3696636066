//! Owns one TCP connection to the receiver.
//!
//! A `Link` only exists between a successful [`Link::connect`] and its consuming
//! [`Link::disconnect`], and only the gate module can create one. Everything else only ever
//! borrows a `&mut Link` for the duration of a single gated operation.
//!
//! The Link has no retry or throttling policy. A retry inside the Link would double the time the
//! receiver's single connection slot is held, so failures are returned to the caller as values.

use std::time::Duration;

use log::{debug, error, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

use crate::connection_settings::ConnectionSettings;
use crate::error::LinkError;
use crate::protocol::{
    encode_command, encode_query, hex, read_frame, CommandCode, Frame, FrameError, FrameKind,
    Rc5Command, RC5_SYSTEM, ZONE_MAIN,
};

pub struct Link {
    stream: TcpStream,
    peer: String,
    command_timeout: Duration,
    echo_drain_timeout: Duration,
    disconnect_delay: Duration,
}

impl Link {
    /// Connect to the receiver. Any ordinary failure (refused, timeout, unresolvable host) is
    /// logged and reported as `None`.
    pub(in crate::gate) async fn connect(settings: &ConnectionSettings) -> Option<Link> {
        let peer = format!("{}:{}", settings.host, settings.port);
        debug!("Connecting to receiver at {}", &peer);

        match timeout(settings.connect_timeout, TcpStream::connect(&peer)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Could not set TCP_NODELAY for {}: {:?}", &peer, e);
                }

                debug!("Connected to receiver at {}", &peer);

                Some(Link {
                    stream,
                    peer,
                    command_timeout: settings.command_timeout,
                    echo_drain_timeout: settings.echo_drain_timeout,
                    disconnect_delay: settings.disconnect_delay,
                })
            }
            Ok(Err(e)) => {
                warn!("Could not connect to receiver at {}: {}", &peer, e);
                None
            }
            Err(_) => {
                warn!(
                    "Timed out connecting to receiver at {} after {:?}",
                    &peer, settings.connect_timeout
                );
                None
            }
        }
    }

    /// Close the socket, then wait out the disconnect delay so the receiver can free its single
    /// connection slot. Runs on every path, success or failure.
    pub(in crate::gate) async fn disconnect(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Socket shutdown for {} reported: {:?}", &self.peer, e);
        }
        drop(self.stream);

        sleep(self.disconnect_delay).await;
        debug!("Disconnected from receiver at {}", &self.peer);
    }

    /// Send a command frame and validate the receiver's answer.
    ///
    /// For simulated RC5 commands the receiver follows its direct response with an unsolicited
    /// echo frame, which is drained here so it cannot be mistaken for the next response.
    pub async fn send_command(&mut self, code: CommandCode, payload: &[u8]) -> Result<(), LinkError> {
        let request = encode_command(ZONE_MAIN, code.code(), payload);

        if let Err(e) = self.exchange(code, &request, self.command_timeout).await {
            match &e {
                LinkError::Refused { .. } => error!("{}", e),
                _ => warn!("Command {} to {} failed: {}", code, &self.peer, e),
            }

            return Err(e);
        }

        if code == CommandCode::SimulateRc5 {
            self.drain_echo().await;
        }

        Ok(())
    }

    /// Simulate an RC5 remote-control key press.
    pub async fn send_rc5(&mut self, command: Rc5Command) -> Result<(), LinkError> {
        self.send_command(CommandCode::SimulateRc5, &[RC5_SYSTEM, command.code()])
            .await
    }

    /// Query a status value. Returns the response data, or `None` on any failure.
    pub async fn send_query(&mut self, code: CommandCode, query_timeout: Duration) -> Option<Vec<u8>> {
        let request = encode_query(code);

        match self.exchange(code, &request, query_timeout).await {
            Ok(frame) => Some(frame.data),
            // Status queries are routinely refused while the receiver is in standby
            Err(LinkError::Refused { answer, .. }) => {
                debug!("Query {} refused (answer 0x{:02X})", code, answer);
                None
            }
            Err(e) => {
                debug!("Query {} failed: {}", code, e);
                None
            }
        }
    }

    /// Write one request and read frames until the matching response arrives or the deadline
    /// passes. Non-matching frames are unsolicited status pushes and are skipped.
    async fn exchange(
        &mut self,
        code: CommandCode,
        request: &[u8],
        response_timeout: Duration,
    ) -> Result<Frame, LinkError> {
        debug!("Sending to {}: {}", &self.peer, hex(request));

        self.stream
            .write_all(request)
            .await
            .map_err(|source| LinkError::Write {
                code: code.code(),
                source,
            })?;

        let deadline = Instant::now() + response_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let frame = read_frame(&mut self.stream, FrameKind::Response, remaining)
                .await
                .map_err(|source| LinkError::NoResponse {
                    code: code.code(),
                    source,
                })?;

            if frame.code != code.code() {
                debug!("Skipping unsolicited frame from {}: {}", &self.peer, &frame);
                continue;
            }

            debug!("Received from {}: {}", &self.peer, &frame);

            if !frame.is_ok() {
                return Err(LinkError::Refused {
                    code: code.code(),
                    answer: frame.answer.unwrap_or_default(),
                });
            }

            return Ok(frame);
        }
    }

    async fn drain_echo(&mut self) {
        match read_frame(&mut self.stream, FrameKind::Response, self.echo_drain_timeout).await {
            Ok(frame) => debug!("Drained echo frame from {}: {}", &self.peer, &frame),
            Err(FrameError::Timeout) => debug!("No echo frame from {}", &self.peer),
            Err(e) => debug!("Echo drain from {} failed: {}", &self.peer, e),
        }
    }
}

// ================================================================================================
// Tests
