use std::{
    io::{self, Read},
    time::{Duration, Instant},
};

use log::{debug, trace};

use crate::protocol::{frame::START_MARKER, is_frame_start, Frame, FRAME_LEN};

use super::LinkError;

const READ_CHUNK: usize = 32;

/// Assembles aligned frames out of an arbitrary byte stream.
///
/// Bytes are accumulated across short reads. Whenever the window does not
/// begin with the frame markers, exactly one byte is dropped and the
/// window is re-examined, so a misaligned stream recovers within one frame.
pub struct FrameAssembler<R> {
    inner: R,
    window: Vec<u8>,
    skipped: u64,
}

impl<R: Read> FrameAssembler<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            window: Vec::with_capacity(FRAME_LEN * 2),
            skipped: 0,
        }
    }

    /// Total bytes discarded while resynchronizing.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn read_frame(&mut self, timeout: Duration) -> Result<Frame, LinkError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(frame) = self.take_frame() {
                return Ok(frame);
            }

            if Instant::now() >= deadline {
                return Err(LinkError::Timeout(timeout));
            }

            match self.inner.read(&mut chunk) {
                Ok(0) => {
                    return Err(LinkError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "sensor stream closed",
                    )))
                }
                Ok(n) => {
                    trace!("read {n} bytes from sensor");
                    self.window.extend_from_slice(&chunk[..n]);
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(err) => return Err(LinkError::Io(err)),
            }
        }
    }

    fn take_frame(&mut self) -> Option<Frame> {
        let before = self.skipped;
        while !self.window_is_aligned() {
            self.window.remove(0);
            self.skipped += 1;
        }
        if self.skipped > before {
            debug!(
                "resynchronized sensor stream, dropped {} byte(s)",
                self.skipped - before
            );
        }

        if self.window.len() < FRAME_LEN {
            return None;
        }

        let mut frame = [0u8; FRAME_LEN];
        frame.copy_from_slice(&self.window[..FRAME_LEN]);
        self.window.drain(..FRAME_LEN);
        Some(frame)
    }

    // An empty window, a lone start marker, or a window starting with both
    // markers can still become a frame.
    fn window_is_aligned(&self) -> bool {
        match self.window.as_slice() {
            [] => true,
            [first] => *first == START_MARKER,
            [first, second, ..] => is_frame_start(*first, *second),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::protocol::frame::encode;

    /// Serves pre-recorded read results, then reports timeouts forever.
    struct ScriptedPort {
        reads: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedPort {
        fn new(reads: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                reads: reads.into(),
            }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    assert!(bytes.len() <= buf.len());
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(err)) => Err(err),
                None => {
                    std::thread::sleep(Duration::from_millis(1));
                    Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
                }
            }
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(50);

    #[test]
    fn accumulates_partial_reads() {
        let frame = encode(45, 90);
        let port = ScriptedPort::new(vec![
            Ok(frame[..3].to_vec()),
            Err(io::Error::new(io::ErrorKind::TimedOut, "slow")),
            Ok(frame[3..7].to_vec()),
            Ok(frame[7..].to_vec()),
        ]);
        let mut assembler = FrameAssembler::new(port);
        assert_eq!(assembler.read_frame(TIMEOUT).unwrap(), frame);
        assert_eq!(assembler.skipped_bytes(), 0);
    }

    #[test]
    fn drops_one_byte_at_a_time_until_aligned() {
        let frame = encode(123, 456);
        // Tail of a previous frame, then a stray 0xAA that is not a start.
        let mut stream = vec![0x11, 0x22, 0xAB, 0xAA, 0x00];
        stream.extend_from_slice(&frame);
        let mut assembler = FrameAssembler::new(ScriptedPort::new(vec![Ok(stream)]));

        assert_eq!(assembler.read_frame(TIMEOUT).unwrap(), frame);
        assert_eq!(assembler.skipped_bytes(), 5);
    }

    #[test]
    fn does_not_lose_a_frame_that_starts_mid_block() {
        let first = encode(10, 20);
        let second = encode(30, 40);
        let mut stream = vec![0xC0, 0x01, 0x02];
        stream.extend_from_slice(&first);
        stream.extend_from_slice(&second);
        let mut assembler = FrameAssembler::new(ScriptedPort::new(vec![Ok(stream)]));

        assert_eq!(assembler.read_frame(TIMEOUT).unwrap(), first);
        assert_eq!(assembler.read_frame(TIMEOUT).unwrap(), second);
        assert_eq!(assembler.skipped_bytes(), 3);
    }

    #[test]
    fn times_out_without_a_full_frame() {
        let frame = encode(1, 2);
        let port = ScriptedPort::new(vec![Ok(frame[..6].to_vec())]);
        let mut assembler = FrameAssembler::new(port);

        assert!(matches!(
            assembler.read_frame(TIMEOUT),
            Err(LinkError::Timeout(_))
        ));

        // The partial frame is kept for the next attempt.
        assembler.get_mut().reads.push_back(Ok(frame[6..].to_vec()));
        assert_eq!(assembler.read_frame(TIMEOUT).unwrap(), frame);
    }

    #[test]
    fn end_of_stream_is_an_io_error() {
        let mut assembler = FrameAssembler::new(ScriptedPort::new(vec![Ok(Vec::new())]));
        match assembler.read_frame(TIMEOUT) {
            Err(LinkError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[test]
    fn hard_port_errors_are_io_errors() {
        let port = ScriptedPort::new(vec![Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "device removed",
        ))]);
        let mut assembler = FrameAssembler::new(port);
        assert!(matches!(assembler.read_frame(TIMEOUT), Err(LinkError::Io(_))));
    }
}
