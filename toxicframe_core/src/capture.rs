use crate::frame::FrameLayout;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Largest frame the capture loop will read; anything longer is truncated by the kernel.
const CAPTURE_BUFFER_LEN: usize = 65536;

/// Pause after the first failed read; doubles per consecutive failure.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(1);
const MAX_READ_ERROR_BACKOFF: Duration = Duration::from_millis(200);

/// A `FrameSource` yields raw link-layer frames, one per call.
///
/// Implementations must bound every `recv` with their own read timeout so the
/// capture loop can notice a stop request. A timeout is reported as `Ok(None)`,
/// not as an error.
pub trait FrameSource: Send + 'static {
    /// Reads one frame into `buf` and returns its length, or `None` when the
    /// read timed out without traffic.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

/// Sequence numbers observed by the capture loop.
///
/// The capture loop is the only writer. Trials and batch waits poll it with
/// `contains`/`count_present` and reset it with `clear` before a new probe.
#[derive(Debug, Default)]
pub struct ArrivalTable {
    seen: Mutex<HashSet<u32>>,
}

impl ArrivalTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, sequence: u32) {
        self.seen.lock().insert(sequence);
    }

    pub fn contains(&self, sequence: u32) -> bool {
        self.seen.lock().contains(&sequence)
    }

    /// Number of `sequences` already observed, taken under a single lock.
    pub fn count_present(&self, sequences: &[u32]) -> usize {
        let seen = self.seen.lock();
        sequences.iter().filter(|s| seen.contains(s)).count()
    }

    pub fn clear(&self) {
        self.seen.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Long-lived reader that owns the capture resource and feeds the
/// [`ArrivalTable`] with the sequence numbers of matching frames.
///
/// Frames with a different ethertype, or too short to carry a sequence
/// number, are ignored.
pub struct CaptureLoop {
    table: Arc<ArrivalTable>,
    stop: Arc<AtomicBool>,
    frames_seen: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureLoop {
    /// Starts the reader thread. Ownership of `source` moves into the thread.
    pub fn spawn<S: FrameSource>(
        mut source: S,
        layout: FrameLayout,
        table: Arc<ArrivalTable>,
    ) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let frames_seen = Arc::new(AtomicU64::new(0));

        let thread_table = Arc::clone(&table);
        let thread_stop = Arc::clone(&stop);
        let thread_frames = Arc::clone(&frames_seen);

        let handle = thread::Builder::new()
            .name("toxicframe-capture".to_string())
            .spawn(move || {
                let mut buf = vec![0u8; CAPTURE_BUFFER_LEN];
                let mut failures: u64 = 0;
                let mut backoff = READ_ERROR_BACKOFF;
                while !thread_stop.load(Ordering::Relaxed) {
                    match source.recv(&mut buf) {
                        Ok(received) => {
                            failures = 0;
                            backoff = READ_ERROR_BACKOFF;
                            let Some(len) = received else { continue };
                            if let Some(sequence) = layout.parse_sequence(&buf[..len]) {
                                thread_table.record(sequence);
                                thread_frames.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Err(e) => {
                            failures += 1;
                            // Warn on 1, 2, 4, 8, ... consecutive failures.
                            if failures.is_power_of_two() {
                                tracing::warn!(error = %e, failures, "capture read failed");
                            }
                            thread::sleep(backoff);
                            backoff = (backoff * 2).min(MAX_READ_ERROR_BACKOFF);
                        }
                    }
                }
                tracing::debug!("capture loop stopped");
            })?;

        Ok(Self {
            table,
            stop,
            frames_seen,
            handle: Some(handle),
        })
    }

    pub fn table(&self) -> &Arc<ArrivalTable> {
        &self.table
    }

    /// Probe frames recognised since the loop started.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen.load(Ordering::Relaxed)
    }

    /// Signals the reader thread and waits for it to exit. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(target_os = "linux")]
pub use packet_socket::PacketSocket;

#[cfg(target_os = "linux")]
mod packet_socket {
    use super::FrameSource;
    use socket2::{Domain, Protocol, SockAddr, Socket, Type};
    use std::ffi::CString;
    use std::io::{self, Read};
    use std::mem;
    use std::time::Duration;

    /// `AF_PACKET` socket bound to one interface and one ethertype.
    ///
    /// Opening it needs `CAP_NET_RAW`.
    pub struct PacketSocket {
        socket: Socket,
    }

    impl PacketSocket {
        pub fn open(interface: &str, ethertype: u16, read_timeout: Duration) -> io::Result<Self> {
            let protocol_be = ethertype.to_be();
            let socket = Socket::new(
                Domain::PACKET,
                Type::RAW,
                Some(Protocol::from(i32::from(protocol_be))),
            )?;

            let ifname = CString::new(interface).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("interface name {interface:?} contains a NUL byte"),
                )
            })?;
            // SAFETY: `ifname` is a valid NUL-terminated string for the duration of the call.
            let ifindex = unsafe { libc::if_nametoindex(ifname.as_ptr()) };
            if ifindex == 0 {
                return Err(io::Error::last_os_error());
            }

            // SAFETY: an all-zero sockaddr_storage is a valid value, and sockaddr_ll
            // fits inside it with compatible alignment.
            let address = unsafe {
                let mut storage: libc::sockaddr_storage = mem::zeroed();
                let link = &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_ll;
                (*link).sll_family = libc::AF_PACKET as libc::c_ushort;
                (*link).sll_protocol = protocol_be;
                (*link).sll_ifindex = ifindex as libc::c_int;
                SockAddr::new(
                    storage,
                    mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
                )
            };
            socket.bind(&address)?;
            socket.set_read_timeout(Some(read_timeout))?;

            Ok(Self { socket })
        }
    }

    impl FrameSource for PacketSocket {
        fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
            match self.socket.read(buf) {
                Ok(len) => Ok(Some(len)),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                    ) =>
                {
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        }
    }
}
