use crate::backend::{EngineError, InferenceEngine, InferenceOutput, decode_frame};
use bytes::Bytes;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct Request {
    payload: Bytes,
    confidence_threshold: f32,
}

type Response = Result<InferenceOutput, EngineError>;

/// Runs an engine on a dedicated thread so callers can bound each call.
///
/// After a timeout or crash the runner is poisoned: the engine thread is
/// abandoned and every later call fails with [`EngineError::Crashed`].
pub struct EngineRunner {
    requests: Option<SyncSender<Request>>,
    responses: Receiver<Response>,
    handle: Option<JoinHandle<()>>,
    poisoned: bool,
}

impl EngineRunner {
    pub fn spawn<E: InferenceEngine>(name: String, mut engine: E) -> std::io::Result<Self> {
        let (request_tx, request_rx) = mpsc::sync_channel::<Request>(1);
        let (response_tx, response_rx) = mpsc::sync_channel::<Response>(1);

        let handle = thread::Builder::new().name(name).spawn(move || {
            for request in request_rx {
                let result = decode_frame(&request.payload)
                    .and_then(|image| engine.infer(&image, request.confidence_threshold));
                if response_tx.send(result).is_err() {
                    break;
                }
            }
        })?;

        Ok(Self {
            requests: Some(request_tx),
            responses: response_rx,
            handle: Some(handle),
            poisoned: false,
        })
    }

    /// Decode `payload` and run inference, waiting at most `timeout`.
    pub fn run(
        &mut self,
        payload: Bytes,
        confidence_threshold: f32,
        timeout: Duration,
    ) -> Result<InferenceOutput, EngineError> {
        if self.poisoned {
            return Err(EngineError::Crashed("engine thread unavailable".to_string()));
        }
        let Some(requests) = self.requests.as_ref() else {
            return Err(EngineError::Crashed("engine thread unavailable".to_string()));
        };

        let request = Request {
            payload,
            confidence_threshold,
        };
        if requests.send(request).is_err() {
            self.poisoned = true;
            return Err(EngineError::Crashed("engine thread exited".to_string()));
        }

        match self.responses.recv_timeout(timeout) {
            Ok(response) => response,
            Err(RecvTimeoutError::Timeout) => {
                self.poisoned = true;
                Err(EngineError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.poisoned = true;
                Err(EngineError::Crashed("engine thread panicked".to_string()))
            }
        }
    }
}

impl Drop for EngineRunner {
    fn drop(&mut self) {
        // Closing the request channel ends the engine loop
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            if self.poisoned {
                tracing::warn!("Abandoning unresponsive engine thread");
            } else if handle.join().is_err() {
                tracing::error!("Engine thread panicked during shutdown");
            }
        }
    }
}
