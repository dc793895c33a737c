/// WLED bring-up: probe a WLED controller's JSON/Adalight serial input to
/// find the baud it currently answers at, command it to switch to the
/// configured data baud, then reopen at that baud.
///
/// Modeled as an explicit linear state machine (`Probe -> Switch -> Reopen
/// -> Ready`, or `Failed`) rather than a retry loop, so each transition can
/// be driven in isolation against a serial transport stub (§9).
use std::io;
use std::time::Duration;

use tracing::{debug, warn};

use crate::serial_port::{ClearBuffer, SerialTransport};

/// All baud rates a WLED controller can be commanded to switch to,
/// in probe priority order (after the configured bauds).
pub const WLED_BAUD_TABLE: &[u32] = &[
    115_200, 230_400, 460_800, 500_000, 576_000, 921_600, 1_000_000, 1_500_000, 2_000_000,
];

/// Map a target data baud to its single-byte WLED switch command.
#[must_use]
pub fn baud_command_byte(baud: u32) -> Option<u8> {
    match baud {
        115_200 => Some(0xB0),
        230_400 => Some(0xB1),
        460_800 => Some(0xB2),
        500_000 => Some(0xB3),
        576_000 => Some(0xB4),
        921_600 => Some(0xB5),
        1_000_000 => Some(0xB6),
        1_500_000 => Some(0xB7),
        2_000_000 => Some(0xB8),
        _ => None,
    }
}

/// Ordered list of bauds to probe: configured data baud, configured
/// handshake baud (if distinct), then the full standard table, skipping
/// duplicates.
#[must_use]
pub fn candidate_bauds(baud_rate: u32, handshake_baud_rate: Option<u32>) -> Vec<u32> {
    let mut candidates = vec![baud_rate];
    if let Some(handshake) = handshake_baud_rate {
        if handshake != baud_rate {
            candidates.push(handshake);
        }
    }
    for &baud in WLED_BAUD_TABLE {
        if !candidates.contains(&baud) {
            candidates.push(baud);
        }
    }
    candidates
}

/// Opens a serial transport at a given baud. Abstracted so bring-up can
/// be tested without real hardware: the real implementation opens a new
/// `serialport::SerialPort`; the test implementation hands out a
/// pre-scripted `MockSerialPort` per baud.
pub trait PortOpener {
    /// # Errors
    /// Returns an I/O error if the port cannot be opened at `baud`.
    fn open(&mut self, baud: u32, timeout: Duration) -> io::Result<Box<dyn SerialTransport>>;
}

/// Injected delay so tests can run the state machine without sleeping
/// for real. Production callers pass `std::thread::sleep`.
pub type Sleeper<'a> = &'a dyn Fn(Duration);

/// Outcome of a successful bring-up: the open, ready-to-send transport.
pub struct BroughtUp {
    pub transport: Box<dyn SerialTransport>,
    pub detected_baud: u32,
}

/// Run the full `Probe -> Switch -> Reopen -> Ready` sequence.
///
/// # Errors
/// Returns an I/O error if no candidate baud responds to the probe, or
/// if `baud_rate` has no WLED switch command and a switch is required.
pub fn bring_up(
    opener: &mut dyn PortOpener,
    baud_rate: u32,
    handshake_baud_rate: Option<u32>,
    sleep: Sleeper<'_>,
) -> io::Result<BroughtUp> {
    let detected_baud = probe(opener, baud_rate, handshake_baud_rate, sleep)?;

    if detected_baud != baud_rate {
        switch(opener, detected_baud, baud_rate, sleep)?;
    }

    let transport = reopen(opener, baud_rate, sleep)?;
    Ok(BroughtUp {
        transport,
        detected_baud,
    })
}

/// Probe state: try each candidate baud until one answers `'v'` with a
/// non-empty response.
fn probe(
    opener: &mut dyn PortOpener,
    baud_rate: u32,
    handshake_baud_rate: Option<u32>,
    sleep: Sleeper<'_>,
) -> io::Result<u32> {
    for baud in candidate_bauds(baud_rate, handshake_baud_rate) {
        debug!(baud, "WLED probe: trying baud");
        match try_handshake(opener, baud, sleep) {
            Ok(true) => {
                debug!(baud, "WLED probe: got a response");
                return Ok(baud);
            }
            Ok(false) => {
                debug!(baud, "WLED probe: no response");
                sleep(Duration::from_millis(200));
            }
            Err(e) => {
                warn!(baud, error = %e, "WLED probe: open failed");
                sleep(Duration::from_millis(200));
            }
        }
    }
    Err(io::Error::new(
        io::ErrorKind::TimedOut,
        "no WLED response across any candidate baud",
    ))
}

fn try_handshake(opener: &mut dyn PortOpener, baud: u32, sleep: Sleeper<'_>) -> io::Result<bool> {
    let mut transport = opener.open(baud, Duration::from_millis(500))?;
    sleep(Duration::from_millis(150));
    transport.clear(ClearBuffer::All)?;

    transport.write_all(b"v")?;
    transport.flush()?;
    sleep(Duration::from_millis(200));

    let waiting = transport.bytes_to_read()?;
    if waiting == 0 {
        return Ok(false);
    }

    let mut buf = vec![0u8; waiting as usize];
    let n = transport.read(&mut buf)?;
    Ok(n > 0)
}

/// Switch state: at `detected_baud`, send the one-byte command that
/// moves the controller's data input to `target_baud`.
fn switch(
    opener: &mut dyn PortOpener,
    detected_baud: u32,
    target_baud: u32,
    sleep: Sleeper<'_>,
) -> io::Result<()> {
    let command = baud_command_byte(target_baud).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported WLED baud rate: {target_baud}"),
        )
    })?;

    let mut transport = opener.open(detected_baud, Duration::from_millis(500))?;
    transport.clear(ClearBuffer::All)?;
    transport.write_all(&[command])?;
    transport.flush()?;
    sleep(Duration::from_millis(200));

    // Draining any acknowledgement is best-effort; WLED's reply format
    // on baud switch isn't part of the contract.
    if let Ok(waiting) = transport.bytes_to_read() {
        if waiting > 0 {
            let mut buf = vec![0u8; waiting as usize];
            let _ = transport.read(&mut buf);
        }
    }

    Ok(())
}

/// Reopen state: open at the final data baud and settle.
fn reopen(
    opener: &mut dyn PortOpener,
    baud_rate: u32,
    sleep: Sleeper<'_>,
) -> io::Result<Box<dyn SerialTransport>> {
    let mut transport = opener.open(baud_rate, Duration::from_secs(1))?;
    sleep(Duration::from_millis(100));
    transport.clear(ClearBuffer::All)?;
    Ok(transport)
}
