//! Test doubles: a synthetic oracle and an in-process loopback that drives
//! the real capture loop, oracle and batch dispatcher.

use crate::candidate::Candidate;
use crate::capture::{ArrivalTable, CaptureLoop, FrameSource};
use crate::frame::{FrameLayout, HEADER_LEN, SEQUENCE_LEN};
use crate::injector::{InjectError, Injector};
use crate::oracle::{CorrelationOracle, Oracle, OracleError, OracleSettings};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

type Outcome = dyn Fn(&[u8], usize) -> bool + Send + Sync;

/// Noise-free oracle backed by a closure. Counts every trial.
pub struct PredicateOracle {
    arrives: Box<Outcome>,
    calls: AtomicUsize,
    max_len: Option<usize>,
}

impl PredicateOracle {
    /// Candidates for which `is_toxic` holds never arrive; all others always do.
    pub fn new(is_toxic: impl Fn(&[u8]) -> bool + Send + Sync + 'static) -> Self {
        Self::with_outcomes(move |bytes, _| !is_toxic(bytes))
    }

    /// `arrives(bytes, call_index)` decides each trial; `call_index` counts
    /// from zero across the oracle's lifetime.
    pub fn with_outcomes(arrives: impl Fn(&[u8], usize) -> bool + Send + Sync + 'static) -> Self {
        Self {
            arrives: Box::new(arrives),
            calls: AtomicUsize::new(0),
            max_len: None,
        }
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Oracle for PredicateOracle {
    fn trial(&self, candidate: &Candidate, _timeout: Duration) -> Result<bool, OracleError> {
        if candidate.is_empty() {
            return Err(OracleError::EmptyCandidate);
        }
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.arrives)(candidate.as_bytes(), index))
    }

    fn max_candidate_len(&self) -> Option<usize> {
        self.max_len
    }
}

/// Frame source fed from an in-process channel.
pub struct ChannelSource {
    rx: Receiver<Vec<u8>>,
}

impl ChannelSource {
    pub fn new() -> (Self, Sender<Vec<u8>>) {
        let (tx, rx) = mpsc::channel();
        (Self { rx }, tx)
    }
}

impl FrameSource for ChannelSource {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.rx.recv_timeout(Duration::from_millis(5)) {
            Ok(frame) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok(Some(len))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(Duration::from_millis(5));
                Ok(None)
            }
        }
    }
}

/// Injector that plays the device under test: frames whose candidate
/// satisfies `is_toxic` are dropped, every other frame is delivered to the
/// capture channel.
pub struct LoopbackInjector {
    tx: Mutex<Sender<Vec<u8>>>,
    is_toxic: Box<dyn Fn(&[u8]) -> bool + Send + Sync>,
    sends: AtomicUsize,
    fail: AtomicBool,
}

impl LoopbackInjector {
    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Injector for LoopbackInjector {
    fn health(&self) -> bool {
        true
    }

    fn send_raw(&self, frame: &[u8], count: u32) -> Result<u32, InjectError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(InjectError::Transport("loopback send disabled".to_string()));
        }
        let candidate = frame.get(HEADER_LEN + SEQUENCE_LEN..).unwrap_or_default();
        if !(self.is_toxic)(candidate) {
            let _ = self.tx.lock().send(frame.to_vec());
        }
        Ok(count)
    }
}

/// Real capture loop wired to a [`LoopbackInjector`].
pub struct Loopback {
    injector: Arc<LoopbackInjector>,
    arrivals: Arc<ArrivalTable>,
    layout: FrameLayout,
    _capture: CaptureLoop,
}

impl Loopback {
    pub fn new(is_toxic: impl Fn(&[u8]) -> bool + Send + Sync + 'static) -> Self {
        let layout = FrameLayout::default();
        let (source, tx) = ChannelSource::new();
        let arrivals = Arc::new(ArrivalTable::new());
        let capture = CaptureLoop::spawn(source, layout.clone(), Arc::clone(&arrivals))
            .expect("spawn capture thread");
        let injector = Arc::new(LoopbackInjector {
            tx: Mutex::new(tx),
            is_toxic: Box::new(is_toxic),
            sends: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        });
        Self {
            injector,
            arrivals,
            layout,
            _capture: capture,
        }
    }

    pub fn injector(&self) -> &Arc<LoopbackInjector> {
        &self.injector
    }

    pub fn oracle(&self) -> CorrelationOracle<LoopbackInjector> {
        CorrelationOracle::new(
            Arc::clone(&self.injector),
            Arc::clone(&self.arrivals),
            self.layout.clone(),
            OracleSettings {
                poll_interval: Duration::from_micros(100),
                ..OracleSettings::default()
            },
        )
    }
}
