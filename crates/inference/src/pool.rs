use crate::backend::InferenceEngine;
use crate::worker::{Worker, WorkerContext, WorkerFault};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Per-worker liveness flags, readable from the HTTP side.
pub struct Liveness {
    alive: Vec<AtomicBool>,
    restarts: AtomicU64,
}

impl Liveness {
    pub fn new(count: usize) -> Self {
        Self {
            alive: (0..count).map(|_| AtomicBool::new(false)).collect(),
            restarts: AtomicU64::new(0),
        }
    }

    pub fn alive(&self) -> usize {
        self.alive
            .iter()
            .filter(|flag| flag.load(Ordering::Acquire))
            .count()
    }

    pub fn total(&self) -> usize {
        self.alive.len()
    }

    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    pub fn set_alive(&self, id: usize, alive: bool) {
        if let Some(flag) = self.alive.get(id) {
            flag.store(alive, Ordering::Release);
        }
    }
}

/// Fixed-size set of workers, each supervised on its own thread and
/// restarted with backoff after a fault.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    ctx: WorkerContext,
    liveness: Arc<Liveness>,
}

impl WorkerPool {
    /// `factory` builds a fresh engine for worker `id`; it runs on the
    /// worker's thread at start and after every fault.
    pub fn start<E, F>(ctx: WorkerContext, factory: F) -> anyhow::Result<Self>
    where
        E: InferenceEngine,
        F: Fn(usize) -> anyhow::Result<E> + Send + Sync + 'static,
    {
        let count = ctx.config.count;
        let liveness = Arc::new(Liveness::new(count));
        let factory = Arc::new(factory);

        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let ctx = ctx.clone();
            let liveness = liveness.clone();
            let factory = factory.clone();

            let handle = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || supervise(id, ctx, liveness, factory.as_ref()))?;
            handles.push(handle);
        }

        tracing::info!(workers = count, "Worker pool started");
        Ok(Self {
            handles,
            ctx,
            liveness,
        })
    }

    pub fn liveness(&self) -> Arc<Liveness> {
        self.liveness.clone()
    }

    /// Stop every worker and wait for it. Jobs still queued are abandoned.
    pub fn shutdown(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        tracing::info!("Shutting down worker pool");
        self.ctx.shutdown.store(true, Ordering::Release);
        self.ctx.queue.close();

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Worker supervisor panicked");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn supervise<E, F>(id: usize, ctx: WorkerContext, liveness: Arc<Liveness>, factory: &F)
where
    E: InferenceEngine,
    F: Fn(usize) -> anyhow::Result<E>,
{
    let backoff = ctx.config.restart_backoff();
    let mut failures = 0u32;

    loop {
        if ctx.shutdown.load(Ordering::Acquire) {
            break;
        }

        let started = Instant::now();
        let outcome = factory(id)
            .map_err(|e| WorkerFault::Startup(format!("{:#}", e)))
            .and_then(|engine| Worker::new(id, engine, ctx.clone()))
            .and_then(|worker| {
                liveness.set_alive(id, true);
                worker.run()
            });
        liveness.set_alive(id, false);

        let fault = match outcome {
            Ok(()) => break,
            Err(fault) => fault,
        };
        if ctx.shutdown.load(Ordering::Acquire) {
            break;
        }

        // A worker that ran for a while before failing starts over
        if started.elapsed() > backoff.max_delay * 2 {
            failures = 0;
        }
        let delay = backoff.delay_for_attempt(failures);
        failures = failures.saturating_add(1);

        tracing::error!(
            worker_id = id,
            error = %fault,
            attempt = failures,
            delay_ms = delay.as_millis() as u64,
            "Worker failed, restarting"
        );
        liveness.restarts.fetch_add(1, Ordering::Relaxed);
        ctx.metrics.record_restart();

        sleep_unless_shutdown(delay, &ctx.shutdown);
    }

    tracing::info!(worker_id = id, "Worker supervisor exited");
}

fn sleep_unless_shutdown(delay: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + delay;
    while !shutdown.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(SHUTDOWN_POLL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EngineError, InferenceOutput};
    use crate::config::WorkerConfig;
    use crate::metrics::WorkerMetrics;
    use bridge::{BroadcastChannel, FrameJob, JobQueue, MemoryBroadcast, MemoryJobQueue};
    use bytes::Bytes;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;

    struct FlakyEngine {
        fail_first: bool,
    }

    impl InferenceEngine for FlakyEngine {
        fn infer(&mut self, _: &RgbImage, _: f32) -> Result<InferenceOutput, EngineError> {
            if std::mem::take(&mut self.fail_first) {
                return Err(EngineError::ResourceExhausted("device lost".into()));
            }
            Ok(InferenceOutput {
                detections: vec![],
                elapsed_ms: 1.0,
            })
        }
    }

    fn png() -> Bytes {
        let image = RgbImage::from_pixel(2, 2, Rgb([9, 9, 9]));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        Bytes::from(buffer.into_inner())
    }

    fn context(
        count: usize,
        queue: Arc<MemoryJobQueue>,
        broadcast: Arc<MemoryBroadcast>,
    ) -> WorkerContext {
        WorkerContext {
            queue,
            broadcast,
            config: WorkerConfig {
                count,
                dequeue_timeout_ms: 20,
                restart_base_delay_ms: 10,
                restart_max_delay_ms: 40,
                ..WorkerConfig::default()
            },
            shutdown: Arc::new(AtomicBool::new(false)),
            metrics: WorkerMetrics::default(),
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_all_workers_become_alive() {
        let queue = Arc::new(MemoryJobQueue::new(8));
        let broadcast = Arc::new(MemoryBroadcast::new(8));

        let mut pool = WorkerPool::start(context(3, queue, broadcast), |_| {
            Ok(FlakyEngine { fail_first: false })
        })
        .unwrap();
        let liveness = pool.liveness();

        assert!(wait_for(|| liveness.alive() == 3));
        assert_eq!(liveness.total(), 3);

        pool.shutdown();
        assert_eq!(liveness.alive(), 0);
    }

    #[test]
    fn test_faulted_worker_is_restarted() {
        let queue = Arc::new(MemoryJobQueue::new(8));
        let broadcast = Arc::new(MemoryBroadcast::new(8));
        let mut sub = broadcast.subscribe("a");

        let built = Arc::new(AtomicUsize::new(0));
        let factory = {
            let built = built.clone();
            move |_: usize| -> anyhow::Result<FlakyEngine> {
                let first = built.fetch_add(1, Ordering::SeqCst) == 0;
                Ok(FlakyEngine { fail_first: first })
            }
        };

        let mut pool =
            WorkerPool::start(context(1, queue.clone(), broadcast.clone()), factory).unwrap();
        let liveness = pool.liveness();

        queue.enqueue(FrameJob::new("a", 1, png())).unwrap();
        assert!(wait_for(|| sub.try_recv().is_some_and(|r| r.is_error())));
        assert!(wait_for(|| liveness.restarts() == 1 && liveness.alive() == 1));

        queue.enqueue(FrameJob::new("a", 2, png())).unwrap();
        assert!(wait_for(|| sub
            .try_recv()
            .is_some_and(|r| r.sequence == 2 && !r.is_error())));
        assert_eq!(built.load(Ordering::SeqCst), 2);

        pool.shutdown();
    }

    #[test]
    fn test_failing_factory_keeps_retrying() {
        let queue = Arc::new(MemoryJobQueue::new(8));
        let broadcast = Arc::new(MemoryBroadcast::new(8));

        let mut pool = WorkerPool::start(
            context(1, queue, broadcast),
            |_| -> anyhow::Result<FlakyEngine> { anyhow::bail!("model file missing") },
        )
        .unwrap();
        let liveness = pool.liveness();

        assert!(wait_for(|| liveness.restarts() >= 2));
        assert_eq!(liveness.alive(), 0);

        pool.shutdown();
    }

    #[test]
    fn test_shutdown_closes_queue_and_is_idempotent() {
        let queue = Arc::new(MemoryJobQueue::new(8));
        let broadcast = Arc::new(MemoryBroadcast::new(8));

        let mut pool = WorkerPool::start(context(2, queue.clone(), broadcast), |_| {
            Ok(FlakyEngine { fail_first: false })
        })
        .unwrap();

        pool.shutdown();
        pool.shutdown();

        assert!(queue.is_closed());
        assert!(queue.enqueue(FrameJob::new("a", 1, png())).is_err());
    }
}
