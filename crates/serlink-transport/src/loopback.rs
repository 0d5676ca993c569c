//! In-memory duplex link.
//!
//! A pair of connected endpoints backed by condvar-guarded ring buffers.
//! Reads honor the configured timeout the way a serial port does
//! (`ErrorKind::TimedOut` when nothing arrives); writes are instantaneous.
//! Used by tests and by in-process device simulation.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct PipeState {
    buf: VecDeque<u8>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Pipe {
    state: Mutex<PipeState>,
    readable: Condvar,
}

impl Pipe {
    fn write(&self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "peer endpoint closed"));
        }
        state.buf.extend(data);
        self.readable.notify_all();
        Ok(data.len())
    }

    fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if !state.buf.is_empty() {
                let n = state.buf.len().min(buf.len());
                for (slot, byte) in buf.iter_mut().zip(state.buf.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            if state.closed {
                return Ok(0);
            }
            match timeout {
                Some(timeout) => {
                    let (guard, wait) = self
                        .readable
                        .wait_timeout(state, timeout)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                    if wait.timed_out() && state.buf.is_empty() && !state.closed {
                        return Err(io::Error::from(ErrorKind::TimedOut));
                    }
                }
                None => {
                    state = self
                        .readable
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.buf.clear();
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.closed = true;
        self.readable.notify_all();
    }
}

/// Closes both directions once the last clone of an endpoint is dropped,
/// so a blocked peer read unblocks with EOF.
#[derive(Debug)]
struct CloseOnDrop {
    rx: Arc<Pipe>,
    tx: Arc<Pipe>,
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.rx.close();
        self.tx.close();
    }
}

/// One side of an in-memory duplex link.
///
/// Clones share the underlying buffers and the read timeout, mirroring a
/// duplicated file descriptor.
#[derive(Debug, Clone)]
pub(crate) struct LoopbackEndpoint {
    rx: Arc<Pipe>,
    tx: Arc<Pipe>,
    read_timeout: Arc<Mutex<Option<Duration>>>,
    _closer: Arc<CloseOnDrop>,
}

impl LoopbackEndpoint {
    /// Create a connected pair of endpoints.
    pub(crate) fn pair() -> (LoopbackEndpoint, LoopbackEndpoint) {
        let a_to_b = Arc::new(Pipe::default());
        let b_to_a = Arc::new(Pipe::default());
        let a = LoopbackEndpoint {
            rx: Arc::clone(&b_to_a),
            tx: Arc::clone(&a_to_b),
            read_timeout: Arc::new(Mutex::new(None)),
            _closer: Arc::new(CloseOnDrop {
                rx: Arc::clone(&b_to_a),
                tx: Arc::clone(&a_to_b),
            }),
        };
        let b = LoopbackEndpoint {
            rx: a_to_b,
            tx: b_to_a,
            read_timeout: Arc::new(Mutex::new(None)),
            _closer: Arc::new(CloseOnDrop {
                rx: Arc::clone(&a.tx),
                tx: Arc::clone(&a.rx),
            }),
        };
        (a, b)
    }

    pub(crate) fn set_read_timeout(&self, timeout: Option<Duration>) {
        *self
            .read_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = timeout;
    }

    pub(crate) fn clear_input(&self) {
        self.rx.clear();
    }
}

impl Read for LoopbackEndpoint {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = *self
            .read_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.rx.read(buf, timeout)
    }
}

impl Write for LoopbackEndpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn bytes_cross_the_pair_both_ways() {
        let (mut a, mut b) = LoopbackEndpoint::pair();
        a.write_all(b"ping").unwrap();
        b.write_all(b"pong").unwrap();

        let mut buf = [0u8; 8];
        let n = b.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
        let n = a.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[test]
    fn read_times_out_when_idle() {
        let (mut a, _b) = LoopbackEndpoint::pair();
        a.set_read_timeout(Some(Duration::from_millis(20)));

        let start = Instant::now();
        let err = a.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn read_unblocks_on_concurrent_write() {
        let (mut a, mut b) = LoopbackEndpoint::pair();
        a.set_read_timeout(Some(Duration::from_secs(5)));

        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            b.write_all(b"x").unwrap();
            b // keep the endpoint alive until the write is observed
        });

        let mut buf = [0u8; 1];
        let n = a.read(&mut buf).unwrap();
        assert_eq!(n, 1);
        assert_eq!(buf[0], b'x');
        let _ = writer.join().unwrap();
    }

    #[test]
    fn dropping_peer_yields_eof() {
        let (mut a, b) = LoopbackEndpoint::pair();
        drop(b);
        let n = a.read(&mut [0u8; 4]).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn buffered_bytes_survive_peer_drop_until_drained() {
        let (mut a, mut b) = LoopbackEndpoint::pair();
        b.write_all(b"last words").unwrap();
        drop(b);

        let mut buf = [0u8; 16];
        let n = a.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"last words");
        assert_eq!(a.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn clear_input_discards_pending_bytes() {
        let (mut a, mut b) = LoopbackEndpoint::pair();
        b.write_all(b"stale").unwrap();
        a.clear_input();
        a.set_read_timeout(Some(Duration::from_millis(10)));
        assert_eq!(a.read(&mut [0u8; 8]).unwrap_err().kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn clones_share_buffers_and_timeout() {
        let (a, mut b) = LoopbackEndpoint::pair();
        let mut a2 = a.clone();
        a.set_read_timeout(Some(Duration::from_millis(10)));

        b.write_all(b"shared").unwrap();
        let mut buf = [0u8; 8];
        let n = a2.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"shared");
        // Timeout set through the original applies to the clone.
        assert_eq!(
            a2.read(&mut buf).unwrap_err().kind(),
            ErrorKind::TimedOut
        );
    }
}
