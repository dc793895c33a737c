/// One serial output: owns the link and a single-slot mailbox, and runs
/// a dedicated worker thread that drains the mailbox and writes framed
/// bytes to the link (§4.4).
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info, info_span, warn};

use crate::codec;
use crate::config::{HardwareType, OutputConfig, Protocol};
use crate::mailbox::Mailbox;
use crate::serial_port::{self, ClearBuffer, SerialTransport};
use crate::transform;
use crate::wled::{self, PortOpener};

const MAILBOX_POLL: Duration = Duration::from_millis(100);
const SETTLE_DELAY: Duration = Duration::from_millis(100);
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// A running output: the handle the dispatcher and shutdown routine use.
pub struct OutputHandle {
    pub config: OutputConfig,
    mailbox: Arc<Mailbox>,
    connected: Arc<AtomicBool>,
    frames_sent: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl OutputHandle {
    /// Open the serial link (running WLED bring-up if tagged) and spawn
    /// the worker thread. Returns `None` if the link could not be
    /// opened; the caller logs and excludes the output (§7).
    #[must_use]
    pub fn open(config: OutputConfig, running: Arc<AtomicBool>) -> Option<Self> {
        let span = info_span!("output", port = %config.port);
        let _enter = span.enter();

        let transport = match open_transport(&config) {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "failed to open output");
                return None;
            }
        };

        info!(
            protocol = ?config.protocol,
            baud = config.baud_rate,
            channel = config.opc_channel,
            led_count = config.led_count,
            "output opened"
        );

        let mailbox = Arc::new(Mailbox::new());
        let connected = Arc::new(AtomicBool::new(true));
        let frames_sent = Arc::new(AtomicU64::new(0));

        let thread = {
            let mailbox = Arc::clone(&mailbox);
            let connected = Arc::clone(&connected);
            let frames_sent = Arc::clone(&frames_sent);
            let worker_config = config.clone();
            let spawned = thread::Builder::new()
                .name(format!("output-{}", worker_config.port))
                .spawn(move || {
                    worker_loop(worker_config, transport, mailbox, connected, frames_sent, running);
                });

            match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    error!(error = %e, "failed to spawn output worker thread");
                    return None;
                }
            }
        };

        Some(Self {
            config,
            mailbox,
            connected,
            frames_sent,
            thread: Some(thread),
        })
    }

    /// Non-blocking enqueue (§4.4). A no-op once the link has
    /// disconnected; the payload is simply dropped without counting,
    /// since there is no longer a worker to observe it.
    pub fn submit(&self, payload: Vec<u8>) {
        self.mailbox.submit(payload);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn drops(&self) -> u64 {
        self.mailbox.drops()
    }

    /// Join the worker thread with a bounded wait. The caller is
    /// responsible for submitting a final blank frame first (§3's
    /// shutdown lifecycle); this call does not itself block past the
    /// worker's own mailbox timeout.
    pub fn close(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn open_transport(config: &OutputConfig) -> std::io::Result<Box<dyn SerialTransport>> {
    match config.hardware_type {
        Some(HardwareType::Wled) => {
            let mut opener = RealPortOpener {
                port: config.port.clone(),
            };
            let sleep = |d: std::time::Duration| std::thread::sleep(d);
            let brought_up = wled::bring_up(
                &mut opener,
                config.baud_rate,
                config.handshake_baud_rate,
                &sleep,
            )?;
            Ok(brought_up.transport)
        }
        None => {
            let mut transport =
                serial_port::open_real(&config.port, config.baud_rate, WRITE_TIMEOUT)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            std::thread::sleep(SETTLE_DELAY);
            transport.clear(ClearBuffer::All)?;
            Ok(transport)
        }
    }
}

struct RealPortOpener {
    port: String,
}

impl PortOpener for RealPortOpener {
    fn open(
        &mut self,
        baud: u32,
        timeout: Duration,
    ) -> std::io::Result<Box<dyn SerialTransport>> {
        serial_port::open_real(&self.port, baud, timeout)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    config: OutputConfig,
    transport: Box<dyn SerialTransport>,
    mailbox: Arc<Mailbox>,
    connected: Arc<AtomicBool>,
    frames_sent: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
) {
    // Hold the transport behind an Option so a write failure can drop
    // it permanently without unwinding the loop (§7: "mark output
    // disconnected, keep process alive").
    let mut transport = Some(transport);

    while running.load(Ordering::Relaxed) {
        let Some(payload) = mailbox.recv_timeout(MAILBOX_POLL) else {
            continue;
        };

        let Some(link) = transport.as_mut() else {
            // Disconnected: drain and discard, as §4.4 specifies.
            continue;
        };

        match send_payload(&config, link.as_mut(), &payload) {
            Some(Ok(())) => {
                frames_sent.fetch_add(1, Ordering::Relaxed);
            }
            Some(Err(e)) => {
                warn!(port = %config.port, error = %e, "serial write failed, marking output disconnected");
                connected.store(false, Ordering::Relaxed);
                transport = None;
            }
            None => {
                // Empty slice (e.g. opc_offset past the end of a short
                // record): nothing to send, not a malformed one-pixel frame.
            }
        }
    }
}

/// Transform, encode, and write one payload. Returns `None` without
/// touching the link when there is nothing to encode (an empty slice),
/// `Some(Err(_))` if the write itself fails.
fn send_payload(
    config: &OutputConfig,
    link: &mut dyn SerialTransport,
    payload: &[u8],
) -> Option<std::io::Result<()>> {
    let transformed = transform::transform(payload, config.pixel_format);
    let frame = encode_frame(&transformed, config.protocol, config.pixel_format.stride())?;
    Some(write_frame(link, &frame))
}

fn encode_frame(payload: &[u8], protocol: Protocol, stride: usize) -> Option<Vec<u8>> {
    match protocol {
        Protocol::Adalight => codec::adalight_frame(payload, stride),
        Protocol::Awa => codec::awa_frame(payload, stride),
    }
}

fn write_frame(link: &mut dyn SerialTransport, frame: &[u8]) -> std::io::Result<()> {
    link.write_all(frame)?;
    link.flush()
}

/// A zero-filled payload sized for `led_count` RGB pixels, used by the
/// shutdown routine to blank a strip before closing it (§3).
#[must_use]
pub fn blank_payload(led_count: usize) -> Vec<u8> {
    vec![0u8; led_count * 3]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use crate::serial_port::mock::MockSerialPort;

    #[test]
    fn encode_frame_dispatches_by_protocol() {
        let payload = [1u8, 2, 3];
        let ada = encode_frame(&payload, Protocol::Adalight, 3).unwrap();
        assert_eq!(&ada[0..3], &[0x41, 0x64, 0x61]);

        let awa = encode_frame(&payload, Protocol::Awa, 3).unwrap();
        assert_eq!(&awa[0..3], &[0x41, 0x77, 0x61]);
    }

    #[test]
    fn encode_frame_is_none_for_empty_payload() {
        assert!(encode_frame(&[], Protocol::Adalight, 3).is_none());
        assert!(encode_frame(&[], Protocol::Awa, 3).is_none());
    }

    #[test]
    fn send_payload_skips_the_link_when_dispatcher_slice_is_empty() {
        // An empty slice (the shape dispatch.rs produces when an
        // output's opc_offset lands past the end of a short OPC record)
        // must never reach the link as a falsely-non-empty frame.
        let config = OutputConfig {
            port: "mock".into(),
            protocol: Protocol::Adalight,
            baud_rate: 115_200,
            handshake_baud_rate: None,
            hardware_type: None,
            opc_channel: 0,
            opc_offset: 0,
            led_count: 10,
            pixel_format: crate::config::PixelFormat::Grb,
        };

        let mut mock = MockSerialPort::new();
        let result = send_payload(&config, &mut mock, &[]);

        assert!(result.is_none());
        assert!(mock.written.is_empty());
    }

    #[test]
    fn write_frame_issues_a_single_write_then_flush() {
        let mut mock = MockSerialPort::new();
        write_frame(&mut mock, &[1, 2, 3]).unwrap();
        assert_eq!(mock.written, vec![1, 2, 3]);
    }

    #[test]
    fn write_frame_propagates_failure() {
        let mut mock = MockSerialPort::new();
        mock.fail_next_write = true;
        assert!(write_frame(&mut mock, &[1, 2, 3]).is_err());
    }

    #[test]
    fn blank_payload_is_zero_filled_rgb() {
        let blank = blank_payload(4);
        assert_eq!(blank, vec![0u8; 12]);
    }
}
