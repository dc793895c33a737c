/// Abstraction over a serial link, so the worker (`output.rs`) and the
/// WLED bring-up state machine (`wled.rs`) can be driven in tests by an
/// in-memory stub instead of real hardware.
use std::io;
use std::time::Duration;

/// What to discard when clearing a port's buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearBuffer {
    Input,
    Output,
    All,
}

/// Everything the bridge needs from a serial link.
///
/// Implemented for the real `serialport::SerialPort` behind
/// `RealSerialPort`, and by an in-memory fake in tests.
pub trait SerialTransport: Send {
    /// Write the full buffer; never a partial write (§4.4's "exactly one
    /// write call per rendered frame" guarantee starts here).
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    fn clear(&mut self, what: ClearBuffer) -> io::Result<()>;

    /// Bytes currently buffered and ready to read, without blocking.
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Read up to `buf.len()` bytes without blocking past the port's
    /// configured read timeout.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Open a real serial port at `baud`, with a fixed write/read timeout.
///
/// # Errors
///
/// Returns `serialport::Error` if the OS cannot open the device.
pub fn open_real(port: &str, baud: u32, timeout: Duration) -> serialport::Result<Box<dyn SerialTransport>> {
    let port = serialport::new(port, baud).timeout(timeout).open()?;
    Ok(Box::new(RealSerialPort { port }))
}

struct RealSerialPort {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport for RealSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.port.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    fn clear(&mut self, what: ClearBuffer) -> io::Result<()> {
        let direction = match what {
            ClearBuffer::Input => serialport::ClearBuffer::Input,
            ClearBuffer::Output => serialport::ClearBuffer::Output,
            ClearBuffer::All => serialport::ClearBuffer::All,
        };
        self.port
            .clear(direction)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}
