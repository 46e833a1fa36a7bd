//! Framed, blocking I/O over a raw pipe descriptor.
//!
//! There is no framing beyond length prefixes: every string is preceded by
//! its length as a 4-byte native-endian `i32`, and every request on the wire
//! begins with its tag as the same kind of integer. Both ends of a pipe pair
//! come from the same `fork()`, so there is no endianness boundary to cross
//! and no reason to pay for a portable wire format here.

use std::os::unix::io::RawFd;

use crate::status::WireStatus;

/// One end of an anonymous pipe, closed exactly once when dropped.
///
/// Wrapping the raw descriptor in a type with a `Drop` impl keeps the close
/// dance correct across the many early-return paths a framed read or write
/// can take, the same way this codebase wraps other raw OS resources instead
/// of threading `close()` calls through every error branch by hand.
#[derive(Debug)]
pub struct PipeEnd {
    fd: RawFd,
}

impl PipeEnd {
    /// Takes ownership of an already-open descriptor. The caller must not
    /// close `fd` itself; `PipeEnd` now owns it.
    #[must_use]
    pub const fn from_raw_fd(fd: RawFd) -> Self {
        Self { fd }
    }

    #[must_use]
    pub const fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    /// Writes exactly `buf.len()` bytes. A short write is reported as
    /// [`WireStatus::WriteErr`], never as a partial success.
    pub fn write_bytes(&mut self, buf: &[u8]) -> WireStatus {
        let mut written = 0usize;
        while written < buf.len() {
            let remaining = &buf[written..];
            let n = unsafe {
                libc::write(
                    self.fd,
                    remaining.as_ptr().cast(),
                    remaining.len(),
                )
            };
            if n < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return WireStatus::WriteErr;
            }
            if n == 0 {
                return WireStatus::WriteErr;
            }
            written += n as usize;
        }
        WireStatus::Success
    }

    pub fn write_int(&mut self, value: i32) -> WireStatus {
        self.write_bytes(&value.to_ne_bytes())
    }

    /// Writes the length prefix followed by the raw bytes. Callers that also
    /// need to signal "no value" encode the length as `0` and skip calling
    /// this at all; the wire protocol treats an absent length-0 payload as
    /// having no following bytes.
    pub fn write_string(&mut self, bytes: &[u8]) -> WireStatus {
        self.write_bytes(bytes)
    }

    /// Reads exactly `n` bytes, looping across short reads. Returns
    /// [`WireStatus::ReadEof`] only if the peer closed before any byte of
    /// this call was read; any other premature close is
    /// [`WireStatus::ReadErr`], matching the "short reads mid-frame are
    /// errors" rule in the framing contract.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> WireStatus {
        let mut total = 0usize;
        while total < buf.len() {
            let remaining = &mut buf[total..];
            let n = unsafe {
                libc::read(
                    self.fd,
                    remaining.as_mut_ptr().cast(),
                    remaining.len(),
                )
            };
            if n < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return WireStatus::ReadErr;
            }
            if n == 0 {
                return if total == 0 {
                    WireStatus::ReadEof
                } else {
                    WireStatus::ReadErr
                };
            }
            total += n as usize;
        }
        WireStatus::Success
    }

    pub fn read_int(&mut self) -> Result<i32, WireStatus> {
        let mut raw = [0u8; 4];
        match self.read_bytes(&mut raw) {
            WireStatus::Success => Ok(i32::from_ne_bytes(raw)),
            status => Err(status),
        }
    }

    /// Reads exactly `n` bytes into a freshly allocated buffer. The caller
    /// gets a plain `Vec<u8>`; unlike the original C API this never needs a
    /// separate "allocate n+1 and null-terminate" step because Rust strings
    /// and byte buffers already carry their own length.
    pub fn read_string(&mut self, n: usize) -> Result<Vec<u8>, WireStatus> {
        let mut buf = vec![0u8; n];
        match self.read_bytes(&mut buf) {
            WireStatus::Success => Ok(buf),
            status => Err(status),
        }
    }
}

impl Drop for PipeEnd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// Creates an anonymous pipe, returning `(read_end, write_end)`.
///
/// # Errors
///
/// Returns the raw `errno` from `pipe(2)` on failure.
pub fn anonymous_pipe() -> Result<(PipeEnd, PipeEnd), i32> {
    let mut fds = [0 as RawFd; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(unsafe { *libc::__errno_location() });
    }
    Ok((PipeEnd::from_raw_fd(fds[0]), PipeEnd::from_raw_fd(fds[1])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_an_int() {
        let (mut read_end, mut write_end) = anonymous_pipe().expect("pipe");
        assert_eq!(write_end.write_int(42), WireStatus::Success);
        assert_eq!(read_end.read_int(), Ok(42));
    }

    #[test]
    fn round_trips_a_negative_int() {
        let (mut read_end, mut write_end) = anonymous_pipe().expect("pipe");
        assert_eq!(write_end.write_int(-7), WireStatus::Success);
        assert_eq!(read_end.read_int(), Ok(-7));
    }

    #[test]
    fn round_trips_bytes_with_explicit_length() {
        let (mut read_end, mut write_end) = anonymous_pipe().expect("pipe");
        let payload = b"hunter2";
        assert_eq!(write_end.write_int(payload.len() as i32), WireStatus::Success);
        assert_eq!(write_end.write_string(payload), WireStatus::Success);

        let len = read_end.read_int().expect("length prefix");
        let bytes = read_end.read_string(len as usize).expect("payload");
        assert_eq!(bytes, payload);
    }

    #[test]
    fn reports_clean_eof_when_peer_closes_before_any_bytes() {
        let (mut read_end, write_end) = anonymous_pipe().expect("pipe");
        drop(write_end);
        assert_eq!(read_end.read_int(), Err(WireStatus::ReadEof));
    }

    #[test]
    fn reports_read_error_on_mid_frame_close() {
        let (mut read_end, mut write_end) = anonymous_pipe().expect("pipe");
        // Write half an int, then close — the reader is left mid-frame.
        write_end.write_bytes(&[0x01, 0x02]);
        drop(write_end);
        assert_eq!(read_end.read_int(), Err(WireStatus::ReadErr));
    }
}
