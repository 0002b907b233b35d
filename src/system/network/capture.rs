//! Throughput derived from raw captured frames.
//!
//! A capture thread classifies every frame by its source hardware address
//! and bumps one of two atomic byte counters; it never takes a lock. A
//! separate aggregator wakes once per window, swaps both counters to zero
//! and publishes rates under the sampler mutex.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CapacityProbe, InterfaceIdentity, MacAddr, TrafficState};
use crate::shutdown::spawn_periodic;
use crate::system::error::SourceResult;

/// One captured frame: on-wire length and the captured bytes.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub len: u32,
    pub data: &'a [u8],
}

/// A live capture handle.
pub trait FrameSource: Send {
    /// Wait up to the handle's read timeout for the next frame.
    /// `Ok(None)` means the timeout expired with nothing captured.
    fn next_frame(&mut self) -> SourceResult<Option<Frame<'_>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

pub fn classify(frame: &[u8], own: MacAddr) -> Direction {
    match MacAddr::source_of(frame) {
        Some(source) if source == own => Direction::Outbound,
        _ => Direction::Inbound,
    }
}

#[derive(Debug, Default)]
pub struct FrameCounters {
    sent: AtomicU64,
    received: AtomicU64,
}

impl FrameCounters {
    pub fn record(&self, direction: Direction, len: u32) {
        let counter = match direction {
            Direction::Outbound => &self.sent,
            Direction::Inbound => &self.received,
        };
        counter.fetch_add(u64::from(len), Ordering::Relaxed);
    }

    /// Read and reset both counters: `(sent, received)`.
    pub fn take(&self) -> (u64, u64) {
        (
            self.sent.swap(0, Ordering::AcqRel),
            self.received.swap(0, Ordering::AcqRel),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Uninitialized,
    Active,
    /// Capture could not be opened or stopped reading; output stays at zero.
    Degraded,
    Stopped,
}

#[derive(Debug)]
struct CaptureState {
    status: CaptureStatus,
    traffic: TrafficState,
    last_round: Instant,
}

#[derive(Debug)]
struct Shared {
    counters: FrameCounters,
    state: Mutex<CaptureState>,
}

impl Shared {
    fn publish_round(&self, now: Instant) {
        let mut state = self.state.lock();
        let elapsed = now.saturating_duration_since(state.last_round);
        if elapsed.is_zero() {
            return;
        }
        let (sent, received) = self.counters.take();
        if state.traffic.publish(sent, received, elapsed) {
            state.last_round = now;
            debug!(
                upload = state.traffic.upload_mb_s,
                download = state.traffic.download_mb_s,
                "capture round published"
            );
        }
    }
}

pub struct CaptureNetwork {
    shared: Arc<Shared>,
    token: CancellationToken,
    capture: Option<JoinHandle<()>>,
    aggregator: Option<JoinHandle<()>>,
    capacity: CapacityProbe,
    interface: Option<String>,
}

impl CaptureNetwork {
    /// Start capturing on an already opened handle.
    ///
    /// When `opened` is an error the sampler stays degraded for its whole
    /// lifetime; the failure is logged here and nowhere else.
    pub fn start(
        opened: SourceResult<(InterfaceIdentity, Box<dyn FrameSource>)>,
        window: Duration,
        capacity: CapacityProbe,
        token: CancellationToken,
    ) -> Self {
        let shared = Arc::new(Shared {
            counters: FrameCounters::default(),
            state: Mutex::new(CaptureState {
                status: CaptureStatus::Uninitialized,
                traffic: TrafficState::default(),
                last_round: Instant::now(),
            }),
        });
        let mut network = CaptureNetwork {
            shared,
            token,
            capture: None,
            aggregator: None,
            capacity,
            interface: None,
        };

        let (identity, source) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                warn!(%err, "packet capture unavailable; network rates will read zero");
                network.set_status(CaptureStatus::Degraded);
                return network;
            }
        };

        if let Err(err) = network.spawn_threads(identity.mac, source, window) {
            warn!(%err, "failed to start capture threads; network rates will read zero");
            network.token.cancel();
            network.join_threads();
            network.set_status(CaptureStatus::Degraded);
            return network;
        }

        info!(interface = %identity.name, mac = %identity.mac, "packet capture active");
        network.interface = Some(identity.name);
        network
    }

    fn spawn_threads(
        &mut self,
        own: MacAddr,
        mut source: Box<dyn FrameSource>,
        window: Duration,
    ) -> std::io::Result<()> {
        {
            let mut state = self.shared.state.lock();
            state.last_round = Instant::now();
            state.status = CaptureStatus::Active;
        }

        let shared = Arc::clone(&self.shared);
        let token = self.token.clone();
        self.capture = Some(
            thread::Builder::new()
                .name("resmon-capture".to_string())
                .spawn(move || {
                    while !token.is_cancelled() {
                        match source.next_frame() {
                            Ok(Some(frame)) => shared
                                .counters
                                .record(classify(frame.data, own), frame.len),
                            Ok(None) => {}
                            Err(err) => {
                                warn!(%err, "packet capture loop ended; rates degrade to zero");
                                shared.state.lock().status = CaptureStatus::Degraded;
                                break;
                            }
                        }
                    }
                })?,
        );

        let shared = Arc::clone(&self.shared);
        self.aggregator = Some(spawn_periodic(
            "resmon-rates",
            window,
            self.token.clone(),
            move || shared.publish_round(Instant::now()),
        )?);
        Ok(())
    }

    fn set_status(&self, status: CaptureStatus) {
        self.shared.state.lock().status = status;
    }

    fn join_threads(&mut self) {
        for handle in [self.capture.take(), self.aggregator.take()]
            .into_iter()
            .flatten()
        {
            if handle.join().is_err() {
                warn!("capture worker panicked");
            }
        }
    }

    pub fn status(&self) -> CaptureStatus {
        self.shared.state.lock().status
    }

    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    pub(super) fn traffic(&self) -> TrafficState {
        self.shared.state.lock().traffic
    }

    pub(super) fn capacity(&self) -> &CapacityProbe {
        &self.capacity
    }
}

impl Drop for CaptureNetwork {
    fn drop(&mut self) {
        self.token.cancel();
        self.join_threads();
        if self.status() == CaptureStatus::Active {
            self.set_status(CaptureStatus::Stopped);
        }
    }
}
