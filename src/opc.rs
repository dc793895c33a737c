/// OPC (Open Pixel Control) TCP ingress: a one-client-at-a-time
/// listener, a per-connection reassembly buffer, and the record parser
/// (§4.6).
use std::io::{self, ErrorKind, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Socket, Type};
use tracing::{info, info_span, warn};

use crate::dispatch::Dispatcher;

const RECV_BUFFER_SIZE: usize = 16_384;
const ACCEPT_POLL: Duration = Duration::from_millis(200);
const DRAIN_IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Bind `host:port` with `SO_REUSEADDR` and a backlog of 1 (§4.6).
///
/// # Errors
/// Returns an I/O error if the address can't be bound.
pub fn bind(host: &str, port: u16) -> io::Result<TcpListener> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| io::Error::new(ErrorKind::InvalidInput, format!("bad listen address: {e}")))?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1)?;
    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

/// Accept-and-handle loop: one client at a time, polling `accept` so
/// shutdown is observable (§4.6, §5).
pub fn run(listener: &TcpListener, dispatcher: Arc<Dispatcher>, running: Arc<AtomicBool>) {
    info!("OPC server listening");

    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let span = info_span!("opc_connection", %peer);
                let _enter = span.enter();
                info!("client connected");
                handle_connection(stream, peer, &dispatcher, &running);
                info!("client disconnected");
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                warn!(error = %e, "accept error");
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn handle_connection(
    mut stream: TcpStream,
    _peer: SocketAddr,
    dispatcher: &Arc<Dispatcher>,
    running: &Arc<AtomicBool>,
) {
    if stream.set_nonblocking(true).is_err() {
        return;
    }

    let mut buffer = Vec::new();
    let mut read_buf = [0u8; RECV_BUFFER_SIZE];

    while running.load(Ordering::Relaxed) {
        loop {
            match stream.read(&mut read_buf) {
                Ok(0) => return, // peer closed
                Ok(n) => buffer.extend_from_slice(&read_buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(_) => return,
            }
        }

        let consumed = drain_records(&buffer, dispatcher);
        if consumed > 0 {
            buffer.drain(0..consumed);
        }

        std::thread::sleep(DRAIN_IDLE_SLEEP);
    }
}

/// Parse as many complete records as `buffer` holds, dispatching
/// `command == 0` ones. Returns the number of bytes consumed so the
/// caller can drain the front of its buffer (§4.6).
fn drain_records(buffer: &[u8], dispatcher: &Arc<Dispatcher>) -> usize {
    let mut offset = 0;
    while let Some((channel, command, payload, record_len)) = parse_record(&buffer[offset..]) {
        if command == 0 {
            dispatcher.dispatch(channel, payload);
            dispatcher.record_received();
        }
        offset += record_len;
    }
    offset
}

/// Parse a single OPC record from the front of `buf`.
///
/// Returns `(channel, command, payload, total_bytes_consumed)`, or
/// `None` if `buf` doesn't yet hold a complete record — left in the
/// buffer until more bytes arrive (§4.6).
fn parse_record(buf: &[u8]) -> Option<(u8, u8, &[u8], usize)> {
    if buf.len() < 4 {
        return None;
    }
    let channel = buf[0];
    let command = buf[1];
    let length = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    let total = 4 + length;
    if buf.len() < total {
        return None;
    }
    Some((channel, command, &buf[4..total], total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_record() {
        let buf = [0x00, 0x00, 0x00, 0x03, 0xFF, 0x00, 0x00];
        let (channel, command, payload, total) = parse_record(&buf).unwrap();
        assert_eq!(channel, 0);
        assert_eq!(command, 0);
        assert_eq!(payload, &[0xFF, 0x00, 0x00]);
        assert_eq!(total, 7);
    }

    #[test]
    fn waits_for_more_bytes_on_short_record() {
        let buf = [0x00, 0x00, 0x00, 0x03, 0xFF]; // claims 3 bytes, has 1
        assert!(parse_record(&buf).is_none());
    }

    #[test]
    fn waits_on_partial_header() {
        let buf = [0x00, 0x00, 0x00];
        assert!(parse_record(&buf).is_none());
    }

    #[test]
    fn zero_length_payload_is_a_complete_record() {
        let buf = [0x01, 0x02, 0x00, 0x00];
        let (channel, command, payload, total) = parse_record(&buf).unwrap();
        assert_eq!((channel, command), (1, 2));
        assert!(payload.is_empty());
        assert_eq!(total, 4);
    }

    #[test]
    fn unknown_command_is_still_consumed() {
        let buf = [0x00, 0xFF, 0x00, 0x02, 0xAA, 0xBB, 0x99];
        let (_, command, payload, total) = parse_record(&buf).unwrap();
        assert_eq!(command, 0xFF);
        assert_eq!(payload, &[0xAA, 0xBB]);
        assert_eq!(total, 6);
    }

    #[test]
    fn drain_consumes_multiple_back_to_back_records() {
        let outputs = Vec::new();
        let dispatcher = Arc::new(Dispatcher::new(outputs));
        let mut buf = Vec::new();
        buf.extend_from_slice(&[0x00, 0x00, 0x00, 0x03, 1, 2, 3]);
        buf.extend_from_slice(&[0x00, 0x00, 0x00, 0x02, 4, 5]);
        buf.extend_from_slice(&[0x00, 0x00, 0x00, 0x05]); // incomplete trailing record

        let consumed = drain_records(&buf, &dispatcher);
        assert_eq!(consumed, 7 + 6);
        let (received, _) = dispatcher.take_counters();
        assert_eq!(received, 2);
    }
}
