//! Frame analysis: buffer checkout, conversion, decode and single-flight gating

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::DynamicImage;
use tokio::runtime::Handle;
use tracing::{debug, instrument, trace, warn};

use super::pool::FrameBufferPool;
use super::result::{AnalyzeResult, Outcome};
use crate::capture::convert::{oriented_luma, rgb_to_nv21, yuv420_to_nv21};
use crate::capture::frame::{FrameMetadata, ImageFormat, PlanarImage};
use crate::detect::{DecodeAdapter, DetectedSymbol};
use crate::error::{AnalyzeError, ConvertError};

/// Receives exactly one outcome per dispatched analysis.
pub type Listener<T> = Arc<dyn Fn(Outcome<T>) + Send + Sync>;

/// Whether a submitted image entered the decode path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    Dispatched,
    Dropped,
}

/// Analyzes camera frames and still images, reporting through a listener.
pub trait Analyzer<T>: Send + Sync {
    /// Analyze a live frame. Frames arriving while a decode is in flight are
    /// dropped and produce no outcome.
    fn analyze_frame(&self, image: &PlanarImage, listener: Listener<T>) -> Submit;

    /// Analyze a still image. Always produces exactly one outcome.
    fn analyze_still(&self, image: &DynamicImage, listener: Listener<T>) -> Submit;

    /// Stop accepting work; outcomes of decodes already running are discarded.
    fn release(&self);
}

/// At most one decode in flight.
///
/// The busy flag is claimed with a compare-exchange; a bounded channel
/// signals settlement to anyone waiting for the gate.
#[derive(Debug)]
pub struct SingleFlight {
    busy: AtomicBool,
    settled_tx: flume::Sender<()>,
    settled_rx: flume::Receiver<()>,
}

impl Default for SingleFlight {
    fn default() -> Self {
        let (settled_tx, settled_rx) = flume::bounded(1);
        Self {
            busy: AtomicBool::new(false),
            settled_tx,
            settled_rx,
        }
    }
}

impl SingleFlight {
    pub fn try_acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Wait up to `timeout` for the gate to become free and claim it.
    pub fn acquire_within(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_acquire() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let _ = self.settled_rx.recv_timeout(deadline - now);
        }
    }

    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
        let _ = self.settled_tx.try_send(());
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Barcode/QR analyzer over a pluggable [`DecodeAdapter`].
///
/// Live frames and still images share the buffer pool, the adapter and the
/// single-flight gate. A still image waits (bounded) for a running live
/// decode instead of racing it.
pub struct CodeAnalyzer {
    pool: FrameBufferPool,
    adapter: Arc<DecodeAdapter>,
    gate: Arc<SingleFlight>,
    released: Arc<AtomicBool>,
    runtime: Handle,
    still_wait: Duration,
}

impl CodeAnalyzer {
    pub fn new(adapter: Arc<DecodeAdapter>, runtime: Handle) -> Self {
        Self {
            pool: FrameBufferPool::new(),
            adapter,
            gate: Arc::new(SingleFlight::default()),
            released: Arc::new(AtomicBool::new(false)),
            runtime,
            still_wait: Duration::from_millis(2000),
        }
    }

    pub fn with_still_wait(mut self, still_wait: Duration) -> Self {
        self.still_wait = still_wait;
        self
    }

    pub fn pool(&self) -> &FrameBufferPool {
        &self.pool
    }

    pub fn adapter(&self) -> &Arc<DecodeAdapter> {
        &self.adapter
    }

    pub fn is_in_flight(&self) -> bool {
        self.gate.is_busy()
    }

    /// Fill a pooled buffer and hand it to the decoder. The gate must already
    /// be held; it is released when the decode settles.
    fn dispatch<F>(&self, meta: FrameMetadata, fill: F, listener: Listener<Vec<DetectedSymbol>>)
    where
        F: FnOnce(&mut [u8]) -> Result<(), ConvertError>,
    {
        let mut buffer = self.pool.acquire(meta.width, meta.height);

        let prepared = fill(&mut buffer).and_then(|()| oriented_luma(&buffer, &meta));
        let luma = match prepared {
            Ok(luma) => luma,
            Err(e) => {
                warn!(error = %e, "frame conversion failed");
                drop(buffer);
                self.gate.release();
                metrics::counter!("codescan_decode_failure").increment(1);
                listener(Outcome::Failure(Some(AnalyzeError::Convert(e))));
                return;
            }
        };

        let adapter = self.adapter.clone();
        let gate = self.gate.clone();
        let released = self.released.clone();

        self.runtime.spawn(async move {
            let decoded = adapter.detect(luma).await;

            if released.load(Ordering::Acquire) {
                trace!("analyzer released, discarding decode outcome");
                drop(buffer);
                gate.release();
                return;
            }

            let outcome = match decoded {
                Ok(symbols) if !symbols.is_empty() => {
                    metrics::counter!("codescan_decode_success").increment(1);
                    debug!(count = symbols.len(), "symbols decoded");
                    Outcome::Success(AnalyzeResult::new(buffer, ImageFormat::Nv21, meta, symbols))
                }
                Ok(_) => {
                    metrics::counter!("codescan_decode_failure").increment(1);
                    drop(buffer);
                    Outcome::Failure(None)
                }
                Err(e) => {
                    metrics::counter!("codescan_decode_failure").increment(1);
                    debug!(error = %e, "decoder reported failure");
                    drop(buffer);
                    Outcome::Failure(Some(AnalyzeError::Decode(e)))
                }
            };

            gate.release();
            listener(outcome);
        });
    }
}

impl Analyzer<Vec<DetectedSymbol>> for CodeAnalyzer {
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn analyze_frame(&self, image: &PlanarImage, listener: Listener<Vec<DetectedSymbol>>) -> Submit {
        if self.released.load(Ordering::Acquire) {
            return Submit::Dropped;
        }
        if !self.gate.try_acquire() {
            metrics::counter!("codescan_frames_dropped").increment(1);
            trace!("decode in flight, dropping frame");
            return Submit::Dropped;
        }

        self.dispatch(image.meta, |buf| yuv420_to_nv21(image, buf), listener);
        Submit::Dispatched
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn analyze_still(&self, image: &DynamicImage, listener: Listener<Vec<DetectedSymbol>>) -> Submit {
        if self.released.load(Ordering::Acquire) || !self.gate.acquire_within(self.still_wait) {
            warn!("still image not analyzed, analyzer busy");
            listener(Outcome::Failure(Some(AnalyzeError::Busy)));
            return Submit::Dropped;
        }

        let rgb = image.to_rgb8();
        let meta = FrameMetadata::new(rgb.width(), rgb.height(), 0);
        self.dispatch(meta, |buf| rgb_to_nv21(&rgb, buf), listener);
        Submit::Dispatched
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_flight_gate() {
        let gate = SingleFlight::default();
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
        assert!(!gate.acquire_within(Duration::from_millis(5)));
        gate.release();
        assert!(gate.acquire_within(Duration::from_millis(5)));
    }

    #[test]
    fn test_waiter_wakes_on_release() {
        let gate = Arc::new(SingleFlight::default());
        assert!(gate.try_acquire());
        let releaser = {
            let gate = gate.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                gate.release();
            })
        };
        assert!(gate.acquire_within(Duration::from_secs(5)));
        releaser.join().unwrap();
    }
}
