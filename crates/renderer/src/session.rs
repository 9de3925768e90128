use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::error::{RenderError, RenderResult};
use crate::filter::FilterMode;
use crate::gpu::{FrameOrchestrator, RenderOutcome};
use crate::source::{ImageId, SourceImage};

/// Called from the decode thread after each result is queued.
pub type DecodeNotifier = Box<dyn Fn() + Send + 'static>;

struct DecodeRequest {
    generation: u64,
    path: PathBuf,
}

struct DecodeResult {
    generation: u64,
    path: PathBuf,
    image: RenderResult<SourceImage>,
}

/// What happened to a finished decode once it reached the session.
#[derive(Debug)]
pub enum LoadEvent {
    /// The image is now current.
    Loaded { generation: u64, id: ImageId },
    /// Decoding failed; the previous image stays current.
    Failed {
        generation: u64,
        path: PathBuf,
        error: RenderError,
    },
    /// A newer request was issued before this one finished.
    Superseded { generation: u64 },
}

/// Background decoder fed over a channel.
struct DecodeWorker {
    requests: Option<Sender<DecodeRequest>>,
    results: Receiver<DecodeResult>,
    handle: Option<JoinHandle<()>>,
}

impl DecodeWorker {
    fn spawn(notifier: Option<DecodeNotifier>) -> RenderResult<Self> {
        let (request_tx, request_rx) = unbounded::<DecodeRequest>();
        let (result_tx, result_rx) = unbounded();
        let handle = thread::Builder::new()
            .name("texfilter-decode".into())
            .spawn(move || {
                for request in request_rx {
                    let image = SourceImage::open(&request.path);
                    let result = DecodeResult {
                        generation: request.generation,
                        path: request.path,
                        image,
                    };
                    if result_tx.send(result).is_err() {
                        break;
                    }
                    if let Some(notify) = notifier.as_ref() {
                        notify();
                    }
                }
            })
            .map_err(|err| RenderError::Worker(format!("failed to spawn decode thread: {err}")))?;
        Ok(Self {
            requests: Some(request_tx),
            results: result_rx,
            handle: Some(handle),
        })
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// The current image and filter of one preview or export run.
///
/// Loads are asynchronous and numbered; only the newest request may become
/// current, older results are dropped when they arrive.
pub struct Session {
    image: Option<SourceImage>,
    filter: FilterMode,
    generation: u64,
    worker: Option<DecodeWorker>,
    notifier: Option<DecodeNotifier>,
}

impl Session {
    pub fn new(filter: FilterMode) -> Self {
        Self {
            image: None,
            filter,
            generation: 0,
            worker: None,
            notifier: None,
        }
    }

    /// Registers a wake-up hook for the event loop. Takes effect when the
    /// decode thread starts, i.e. before the first [`Session::load`].
    pub fn with_notifier(mut self, notifier: DecodeNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn filter(&self) -> &FilterMode {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: FilterMode) {
        tracing::debug!(%filter, "filter selected");
        self.filter = filter;
    }

    /// Generation of the most recent image request.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn image(&self) -> Option<&SourceImage> {
        self.image.as_ref()
    }

    /// The image a render would use, or [`RenderError::NoImage`].
    pub fn current_image(&self) -> RenderResult<&SourceImage> {
        self.image.as_ref().ok_or(RenderError::NoImage)
    }

    /// Makes `image` current immediately and supersedes pending loads.
    pub fn set_image(&mut self, image: SourceImage) -> u64 {
        self.generation += 1;
        tracing::debug!(id = %image.id(), generation = self.generation, "image set");
        self.image = Some(image);
        self.generation
    }

    /// Queues `path` for decoding and returns the request's generation.
    pub fn load(&mut self, path: &Path) -> RenderResult<u64> {
        if self.worker.is_none() {
            self.worker = Some(DecodeWorker::spawn(self.notifier.take())?);
        }
        self.generation += 1;
        let request = DecodeRequest {
            generation: self.generation,
            path: path.to_path_buf(),
        };
        let sent = self
            .worker
            .as_ref()
            .and_then(|worker| worker.requests.as_ref())
            .map(|requests| requests.send(request).is_ok())
            .unwrap_or(false);
        if !sent {
            return Err(RenderError::Worker("decode thread is not running".to_string()));
        }
        tracing::info!(path = %path.display(), generation = self.generation, "image load requested");
        Ok(self.generation)
    }

    /// Decodes `path` on the calling thread and makes it current.
    pub fn load_blocking(&mut self, path: &Path) -> RenderResult<ImageId> {
        let image = SourceImage::open(path)?;
        let id = image.id();
        self.set_image(image);
        Ok(id)
    }

    /// Applies every decode result that has already arrived.
    pub fn poll_loads(&mut self) -> Vec<LoadEvent> {
        let Some(worker) = self.worker.as_ref() else {
            return Vec::new();
        };
        let results: Vec<DecodeResult> = worker.results.try_iter().collect();
        results
            .into_iter()
            .map(|result| self.apply(result))
            .collect()
    }

    /// Waits up to `timeout` for the next decode result and applies it.
    pub fn wait_load(&mut self, timeout: Duration) -> Option<LoadEvent> {
        let worker = self.worker.as_ref()?;
        match worker.results.recv_timeout(timeout) {
            Ok(result) => Some(self.apply(result)),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    fn apply(&mut self, result: DecodeResult) -> LoadEvent {
        if result.generation < self.generation {
            tracing::debug!(
                path = %result.path.display(),
                generation = result.generation,
                latest = self.generation,
                "discarding superseded decode"
            );
            return LoadEvent::Superseded {
                generation: result.generation,
            };
        }
        match result.image {
            Ok(image) => {
                let id = image.id();
                self.image = Some(image);
                LoadEvent::Loaded {
                    generation: result.generation,
                    id,
                }
            }
            Err(error) => {
                tracing::warn!(path = %result.path.display(), %error, "image load failed");
                LoadEvent::Failed {
                    generation: result.generation,
                    path: result.path,
                    error,
                }
            }
        }
    }

    /// Renders the current image and filter. Without an image nothing is
    /// bound and the orchestrator is left as it was.
    pub fn render(&self, orchestrator: &mut FrameOrchestrator) -> RenderResult<RenderOutcome> {
        let image = self.current_image().inspect_err(|_| {
            tracing::warn!("render requested before any image was loaded");
        })?;
        orchestrator.render(image, &self.filter)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(FilterMode::None)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use image::{Rgba, RgbaImage};

    use super::*;

    const WAIT: Duration = Duration::from_secs(10);

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn no_image_is_rejected() {
        let session = Session::default();
        assert!(matches!(session.current_image(), Err(RenderError::NoImage)));
    }

    #[test]
    fn async_load_becomes_current() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "a.png", 3, 2);
        let wakeups = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&wakeups);
        let mut session = Session::default().with_notifier(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let generation = session.load(&path).unwrap();
        match session.wait_load(WAIT) {
            Some(LoadEvent::Loaded { generation: g, id }) => {
                assert_eq!(g, generation);
                assert_eq!(session.current_image().unwrap().id(), id);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(session.current_image().unwrap().dimensions(), (3, 2));
        assert_eq!(wakeups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn older_loads_are_superseded() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_png(dir.path(), "first.png", 4, 4);
        let second = write_png(dir.path(), "second.png", 8, 2);
        let mut session = Session::default();

        let old = session.load(&first).unwrap();
        let new = session.load(&second).unwrap();
        assert!(new > old);

        let events: Vec<LoadEvent> = (0..2).filter_map(|_| session.wait_load(WAIT)).collect();
        assert!(matches!(events[0], LoadEvent::Superseded { generation } if generation == old));
        assert!(matches!(events[1], LoadEvent::Loaded { generation, .. } if generation == new));
        assert_eq!(session.current_image().unwrap().dimensions(), (8, 2));
    }

    #[test]
    fn failed_load_keeps_previous_image() {
        let mut session = Session::default();
        let image = SourceImage::from_raw(1, 1, vec![1, 2, 3, 4]).unwrap();
        let id = image.id();
        session.set_image(image);

        session.load(Path::new("/nonexistent/missing.png")).unwrap();
        match session.wait_load(WAIT) {
            Some(LoadEvent::Failed { error, .. }) => {
                assert!(matches!(error, RenderError::ImageLoad { .. }))
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(session.current_image().unwrap().id(), id);
    }

    #[test]
    fn set_image_supersedes_pending_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "late.png", 2, 2);
        let mut session = Session::default();
        session.load(&path).unwrap();
        let direct = SourceImage::from_raw(5, 1, vec![0; 20]).unwrap();
        session.set_image(direct);

        assert!(matches!(
            session.wait_load(WAIT),
            Some(LoadEvent::Superseded { .. })
        ));
        assert_eq!(session.current_image().unwrap().dimensions(), (5, 1));
    }

    #[test]
    fn load_after_decode_thread_dies_reports_worker_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "only.png", 2, 2);
        let mut session = Session::default().with_notifier(Box::new(|| {
            panic!("notifier gave up");
        }));

        session.load(&path).unwrap();
        assert!(matches!(
            session.wait_load(WAIT),
            Some(LoadEvent::Loaded { .. })
        ));

        // The thread unwinds after queuing its first result; retry until it is gone.
        let mut outcome = session.load(&path);
        for _ in 0..200 {
            if outcome.is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
            outcome = session.load(&path);
        }
        assert!(matches!(outcome, Err(RenderError::Worker(message)) if message.contains("not running")));
    }
}
