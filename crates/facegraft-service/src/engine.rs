use crate::session::PhotoPair;
use facegraft_core::{CompositeResult, SwapFailure, SwapPipeline};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Swap(#[from] SwapFailure),
    #[error("swap did not finish within {0:?}")]
    Timeout(Duration),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Message sent from async callers to the worker threads.
struct SwapRequest {
    pair: PhotoPair,
    reply: oneshot::Sender<Result<CompositeResult, SwapFailure>>,
}

/// Clone-safe handle to the engine workers.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<SwapRequest>,
}

impl EngineHandle {
    /// Run one swap within `budget`, queueing included.
    ///
    /// On timeout the call is abandoned: the worker still finishes the
    /// pipeline run but its reply is discarded.
    pub async fn swap(&self, pair: PhotoPair, budget: Duration) -> Result<CompositeResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = SwapRequest { pair, reply: reply_tx };

        let round_trip = async {
            self.tx
                .send(request)
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            reply_rx.await.map_err(|_| EngineError::ChannelClosed)
        };

        match tokio::time::timeout(budget, round_trip).await {
            Ok(reply) => Ok(reply??),
            Err(_) => {
                tracing::warn!(budget_ms = budget.as_millis() as u64, "swap abandoned after budget elapsed");
                Err(EngineError::Timeout(budget))
            }
        }
    }
}

/// Spawn `workers` OS threads sharing one request queue.
///
/// The pipeline runs synchronously on the worker threads so CPU-bound
/// swaps never block the async runtime.
pub fn spawn_engine(pipeline: Arc<SwapPipeline>, workers: usize, queue_depth: usize) -> Result<EngineHandle, EngineError> {
    let workers = workers.max(1);
    let (tx, rx) = mpsc::channel::<SwapRequest>(queue_depth.max(1));
    let rx = Arc::new(Mutex::new(rx));

    for id in 0..workers {
        let rx = Arc::clone(&rx);
        let pipeline = Arc::clone(&pipeline);
        std::thread::Builder::new()
            .name(format!("facegraft-engine-{id}"))
            .spawn(move || worker_loop(id, &rx, &pipeline))?;
    }

    tracing::info!(
        workers,
        queue_depth,
        locator = pipeline.locator().name(),
        "engine started"
    );
    Ok(EngineHandle { tx })
}

fn worker_loop(id: usize, rx: &Mutex<mpsc::Receiver<SwapRequest>>, pipeline: &SwapPipeline) {
    tracing::debug!(worker = id, "engine worker started");
    loop {
        // Only the worker holding the lock waits on the queue.
        let next = rx.lock().unwrap_or_else(|e| e.into_inner()).blocking_recv();
        let Some(SwapRequest { pair, reply }) = next else {
            break;
        };
        if reply.is_closed() {
            tracing::debug!(worker = id, "caller gone before start; skipping swap");
            continue;
        }
        let result = pipeline.run(&pair.recipient, &pair.donor);
        if reply.send(result).is_err() {
            tracing::debug!(worker = id, "caller gone; result dropped");
        }
    }
    tracing::debug!(worker = id, "engine worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegraft_core::{Face, FaceLocator, LocatorError, Region, Role, SwapConfig};
    use image::{Rgb, RgbImage};

    struct FixedLocator {
        delay: Duration,
    }

    impl FaceLocator for FixedLocator {
        fn locate(&self, image: &RgbImage) -> Result<Vec<Face>, LocatorError> {
            std::thread::sleep(self.delay);
            if image.get_pixel(0, 0).0[0] == 0 {
                return Ok(vec![]);
            }
            Ok(vec![Face::new(Region::new(5, 5, 20, 20), 1.0)])
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn engine(delay: Duration) -> EngineHandle {
        let pipeline = SwapPipeline::new(Arc::new(FixedLocator { delay }), &SwapConfig::default()).unwrap();
        spawn_engine(Arc::new(pipeline), 2, 4).unwrap()
    }

    fn pair(recipient_shade: u8) -> PhotoPair {
        PhotoPair {
            recipient: RgbImage::from_pixel(40, 40, Rgb([recipient_shade, 90, 90])),
            donor: RgbImage::from_pixel(30, 30, Rgb([200, 10, 10])),
        }
    }

    #[tokio::test]
    async fn test_swap_round_trip() {
        let handle = engine(Duration::ZERO);
        let out = handle.swap(pair(90), Duration::from_secs(10)).await.unwrap();
        assert_eq!(out.image.dimensions(), (40, 40));
        assert_eq!(out.recipient_face.region, Region::new(5, 5, 20, 20));
    }

    #[tokio::test]
    async fn test_swap_failure_is_reported() {
        let handle = engine(Duration::ZERO);
        let err = handle.swap(pair(0), Duration::from_secs(10)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Swap(SwapFailure::NoFaceDetected {
                missing: Role::Recipient
            })
        ));
    }

    #[tokio::test]
    async fn test_swap_budget_exceeded() {
        let handle = engine(Duration::from_millis(500));
        let err = handle.swap(pair(90), Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_concurrent_swaps() {
        let handle = engine(Duration::from_millis(10));
        let jobs: Vec<_> = (0..6)
            .map(|_| {
                let h = handle.clone();
                tokio::spawn(async move { h.swap(pair(90), Duration::from_secs(10)).await })
            })
            .collect();
        for job in jobs {
            assert!(job.await.unwrap().is_ok());
        }
    }
}
