//! The link stream type.

use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::Result;
use crate::loopback::LoopbackEndpoint;

/// A connected duplex byte stream — implements Read + Write.
///
/// This is the fundamental I/O type the session and responder operate on.
/// Backends: an in-memory loopback pair (tests, in-process simulation) and,
/// behind the `serial` feature, a real serial port. Which physical device
/// to open, and at what baud rate, is configuration owned by the caller;
/// the core only requires the stream itself.
pub struct LinkStream {
    inner: LinkStreamInner,
}

enum LinkStreamInner {
    Loopback(LoopbackEndpoint),
    #[cfg(feature = "serial")]
    Serial(Box<dyn serialport::SerialPort>),
}

impl LinkStream {
    /// Create a connected in-memory pair.
    pub fn loopback_pair() -> (LinkStream, LinkStream) {
        let (a, b) = LoopbackEndpoint::pair();
        (
            LinkStream {
                inner: LinkStreamInner::Loopback(a),
            },
            LinkStream {
                inner: LinkStreamInner::Loopback(b),
            },
        )
    }

    /// Open a serial device at the given baud rate.
    #[cfg(feature = "serial")]
    pub fn open_serial(path: &str, baud_rate: u32) -> Result<LinkStream> {
        let port = serialport::new(path, baud_rate)
            .timeout(DEFAULT_SERIAL_TIMEOUT)
            .open()
            .map_err(|source| crate::TransportError::Open {
                path: path.to_string(),
                source,
            })?;
        tracing::debug!(path, baud_rate, "opened serial port");
        Ok(LinkStream {
            inner: LinkStreamInner::Serial(port),
        })
    }

    /// Duplicate the stream handle (reader/writer split).
    pub fn try_clone(&self) -> Result<LinkStream> {
        match &self.inner {
            LinkStreamInner::Loopback(endpoint) => Ok(LinkStream {
                inner: LinkStreamInner::Loopback(endpoint.clone()),
            }),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => {
                let cloned = port.try_clone().map_err(io::Error::from)?;
                Ok(LinkStream {
                    inner: LinkStreamInner::Serial(cloned),
                })
            }
        }
    }

    /// Set the timeout applied to blocking reads.
    ///
    /// Serial ports have no notion of an infinite timeout; `None` maps to
    /// an effectively unbounded one.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            LinkStreamInner::Loopback(endpoint) => {
                endpoint.set_read_timeout(timeout);
                Ok(())
            }
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => {
                let timeout = timeout.unwrap_or(Duration::from_secs(86_400));
                port.set_timeout(timeout).map_err(io::Error::from)?;
                Ok(())
            }
        }
    }

    /// Discard any received-but-unread bytes.
    pub fn clear_input(&self) -> Result<()> {
        match &self.inner {
            LinkStreamInner::Loopback(endpoint) => {
                endpoint.clear_input();
                Ok(())
            }
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => {
                port.clear(serialport::ClearBuffer::Input)
                    .map_err(io::Error::from)?;
                Ok(())
            }
        }
    }

    /// Discard any written-but-untransmitted bytes.
    pub fn clear_output(&self) -> Result<()> {
        match &self.inner {
            // Loopback writes land in the peer's buffer immediately.
            LinkStreamInner::Loopback(_) => Ok(()),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => {
                port.clear(serialport::ClearBuffer::Output)
                    .map_err(io::Error::from)?;
                Ok(())
            }
        }
    }
}

#[cfg(feature = "serial")]
const DEFAULT_SERIAL_TIMEOUT: Duration = Duration::from_millis(250);

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Loopback(endpoint) => endpoint.read(buf),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => port.read(buf),
        }
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Loopback(endpoint) => endpoint.write(buf),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => port.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.inner {
            LinkStreamInner::Loopback(endpoint) => endpoint.flush(),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => port.flush(),
        }
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            LinkStreamInner::Loopback(_) => f
                .debug_struct("LinkStream")
                .field("type", &"loopback")
                .finish(),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(_) => f
                .debug_struct("LinkStream")
                .field("type", &"serial")
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn loopback_pair_roundtrip() {
        let (mut a, mut b) = LinkStream::loopback_pair();
        a.write_all(b"PING|46#").unwrap();
        a.flush().unwrap();

        let mut buf = [0u8; 16];
        let n = b.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"PING|46#");
    }

    #[test]
    fn split_halves_share_the_endpoint() {
        let (a, mut b) = LinkStream::loopback_pair();
        let mut reader = a.try_clone().unwrap();
        let mut writer = a;

        writer.write_all(b"out").unwrap();
        let mut buf = [0u8; 8];
        let n = b.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"out");

        b.write_all(b"in").unwrap();
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"in");
    }

    #[test]
    fn read_timeout_applies() {
        let (mut a, _b) = LinkStream::loopback_pair();
        a.set_read_timeout(Some(Duration::from_millis(10))).unwrap();
        let err = a.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn clear_input_discards_stale_reply() {
        let (mut a, mut b) = LinkStream::loopback_pair();
        b.write_all(b"ACK|LATE#").unwrap();
        a.clear_input().unwrap();
        a.set_read_timeout(Some(Duration::from_millis(10))).unwrap();
        assert_eq!(a.read(&mut [0u8; 16]).unwrap_err().kind(), ErrorKind::TimedOut);
    }
}
