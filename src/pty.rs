//! Pseudo-terminal pair for the virtual dongle and the dummy board
//!
//! The slave side is what third-party software opens as a serial device; the
//! bridge keeps the master. Both ends are switched to raw mode so bytes pass
//! through unmodified and nothing written is echoed back.

use std::ffi::CStr;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::ptr;
use std::time::{Duration, Instant};

/// Poll interval for writes that wait indefinitely
const WRITE_RETRY: Duration = Duration::from_millis(100);

/// One pseudo-terminal pair; dropping it closes both ends
#[derive(Debug)]
pub struct VirtualPort {
    master: File,
    // Held open so the slave keeps existing while nobody else has it open
    _slave: OwnedFd,
    path: PathBuf,
}

impl VirtualPort {
    pub fn open() -> io::Result<Self> {
        let mut master_fd: libc::c_int = -1;
        let mut slave_fd: libc::c_int = -1;

        let rc = unsafe {
            libc::openpty(
                &mut master_fd,
                &mut slave_fd,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        // Owned from here on so every early return closes them
        let master = unsafe { OwnedFd::from_raw_fd(master_fd) };
        let slave = unsafe { OwnedFd::from_raw_fd(slave_fd) };

        make_raw(&slave)?;
        // Writes must never wedge a sink whose reader went away
        set_nonblocking(&master)?;
        let path = slave_path(&slave)?;

        Ok(Self {
            master: File::from(master),
            _slave: slave,
            path,
        })
    }

    /// Device path a reader should open, e.g. `/dev/pts/4`
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until the master has bytes to read.
    ///
    /// Returns `false` when the timeout elapses first.
    pub fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        self.poll(libc::POLLIN, timeout)
    }

    /// Read whatever the master holds; `Ok(0)` when nothing is pending.
    ///
    /// Call after [`wait_readable`](Self::wait_readable) to avoid spinning.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match (&self.master).read(buf) {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            other => other,
        }
    }

    /// Write all of `bytes`, waiting as long as the reader needs
    pub fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        self.write_until(bytes, None).map(|_| ())
    }

    /// Write all of `bytes` unless the reader stops draining the terminal.
    ///
    /// Returns `false` when `timeout` elapsed with bytes still unwritten. A
    /// packet interrupted this way may reach the reader truncated.
    pub fn write_within(&self, bytes: &[u8], timeout: Duration) -> io::Result<bool> {
        let written = self.write_until(bytes, Some(Instant::now() + timeout))?;
        Ok(written == bytes.len())
    }

    fn write_until(&self, bytes: &[u8], deadline: Option<Instant>) -> io::Result<usize> {
        let mut written = 0;

        while written < bytes.len() {
            match (&self.master).write(&bytes[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let wait = match deadline {
                        Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                        None => WRITE_RETRY,
                    };
                    if wait.is_zero() || (!self.poll(libc::POLLOUT, wait)? && deadline.is_some()) {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    fn poll(&self, events: libc::c_short, timeout: Duration) -> io::Result<bool> {
        let mut fds = libc::pollfd {
            fd: self.master.as_raw_fd(),
            events,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        let rc = unsafe { libc::poll(&mut fds, 1, millis) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        Ok(rc > 0 && fds.revents & events != 0)
    }
}

fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn make_raw(fd: &OwnedFd) -> io::Result<()> {
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };

    if unsafe { libc::tcgetattr(fd.as_raw_fd(), &mut tio) } != 0 {
        return Err(io::Error::last_os_error());
    }
    unsafe { libc::cfmakeraw(&mut tio) };
    if unsafe { libc::tcsetattr(fd.as_raw_fd(), libc::TCSANOW, &tio) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn slave_path(fd: &OwnedFd) -> io::Result<PathBuf> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::ttyname_r(fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }

    let name = CStr::from_bytes_until_nul(&buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(PathBuf::from(name.to_string_lossy().into_owned()))
}
