//! DecodeService - background decoding of recordings and assets
//!
//! Decoding is the only long-running operation in the system, so it runs on
//! a dedicated thread. Jobs arrive over a crossbeam channel and results go
//! back through tokio oneshot channels, which lets callers either `.await`
//! a [`PendingDecode`] or block on it with [`PendingDecode::wait`].

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread;

use crossbeam::channel::{Receiver, Sender};
use tokio::sync::oneshot;

use super::decode::{decode_bytes, DecodeError};
use super::sample_buffer::SampleBuffer;

type DecodeReply = Result<SampleBuffer, DecodeError>;

/// Cooperative cancellation flag shared between a caller and the decoder
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Commands accepted by the decode service
pub enum DecodeCommand {
    Decode {
        bytes: Vec<u8>,
        extension: Option<String>,
        cancel: CancelToken,
        reply: oneshot::Sender<DecodeReply>,
    },
    Shutdown,
}

/// A decode in flight
///
/// Resolves to the decoded buffer, `Cancelled` if its token fired before the
/// result was delivered, or `ServiceUnavailable` if the service went away.
pub struct PendingDecode {
    rx: oneshot::Receiver<DecodeReply>,
    cancel: CancelToken,
}

impl PendingDecode {
    /// A decode that has already failed
    fn failed(error: DecodeError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self {
            rx,
            cancel: CancelToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the decode resolves
    ///
    /// Must not be called from inside an async runtime; `.await` instead.
    pub fn wait(self) -> DecodeReply {
        let result = self
            .rx
            .blocking_recv()
            .unwrap_or(Err(DecodeError::ServiceUnavailable));
        Self::settle(result, &self.cancel)
    }

    /// Non-blocking check; `None` while the decode is still running
    pub fn try_take(&mut self) -> Option<DecodeReply> {
        match self.rx.try_recv() {
            Ok(result) => Some(Self::settle(result, &self.cancel)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(DecodeError::ServiceUnavailable)),
        }
    }

    /// A buffer that arrives after cancellation is discarded
    fn settle(result: DecodeReply, cancel: &CancelToken) -> DecodeReply {
        if cancel.is_cancelled() {
            return Err(DecodeError::Cancelled);
        }
        result
    }
}

impl Future for PendingDecode {
    type Output = DecodeReply;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        Pin::new(&mut this.rx).poll(cx).map(|received| {
            let result = received.unwrap_or(Err(DecodeError::ServiceUnavailable));
            Self::settle(result, &this.cancel)
        })
    }
}

/// Handle owning the decode thread
///
/// Dropping the handle asks the service to stop after its current job.
pub struct DecodeServiceHandle {
    command_tx: Sender<DecodeCommand>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl DecodeServiceHandle {
    /// Queue a decode job
    pub fn decode(&self, bytes: Vec<u8>, extension: Option<&str>) -> PendingDecode {
        let (reply, rx) = oneshot::channel();
        let cancel = CancelToken::new();

        let cmd = DecodeCommand::Decode {
            bytes,
            extension: extension.map(str::to_string),
            cancel: cancel.clone(),
            reply,
        };

        if self.command_tx.send(cmd).is_err() {
            log::warn!("Decode service is gone; rejecting decode request");
            return PendingDecode::failed(DecodeError::ServiceUnavailable);
        }

        PendingDecode { rx, cancel }
    }

    /// Check if the service thread is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for DecodeServiceHandle {
    fn drop(&mut self) {
        let _ = self.command_tx.send(DecodeCommand::Shutdown);
    }
}

/// DecodeService runs decode jobs one at a time in a background thread
pub struct DecodeService {
    command_rx: Receiver<DecodeCommand>,
}

impl DecodeService {
    /// Spawn a new DecodeService in a background thread
    pub fn spawn() -> Result<DecodeServiceHandle, DecodeError> {
        let (command_tx, command_rx) = crossbeam::channel::unbounded();

        let service = DecodeService { command_rx };

        let handle = thread::Builder::new()
            .name("decode-service".into())
            .spawn(move || service.run())
            .map_err(|e| {
                log::error!("Failed to spawn decode service thread: {}", e);
                DecodeError::ServiceUnavailable
            })?;

        Ok(DecodeServiceHandle {
            command_tx,
            thread_handle: Some(handle),
        })
    }

    fn run(self) {
        log::info!("DecodeService started");

        while let Ok(cmd) = self.command_rx.recv() {
            match cmd {
                DecodeCommand::Shutdown => {
                    log::info!("DecodeService shutting down");
                    break;
                }
                DecodeCommand::Decode {
                    bytes,
                    extension,
                    cancel,
                    reply,
                } => {
                    // Skip work nobody is waiting for
                    if cancel.is_cancelled() || reply.is_closed() {
                        let _ = reply.send(Err(DecodeError::Cancelled));
                        continue;
                    }

                    let result = decode_bytes(bytes, extension.as_deref(), &cancel);
                    match &result {
                        Ok(buffer) => log::info!(
                            "Decoded recording: {:.2}s @ {} Hz",
                            buffer.duration_seconds(),
                            buffer.sample_rate()
                        ),
                        Err(DecodeError::Cancelled) => log::debug!("Decode cancelled"),
                        Err(e) => log::warn!("Decode failed: {}", e),
                    }
                    let _ = reply.send(result);
                }
            }
        }

        log::info!("DecodeService stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::decode::wav_fixture;

    #[test]
    fn test_decode_through_service() {
        let service = DecodeService::spawn().unwrap();
        assert!(service.is_running());

        let pending = service.decode(wav_fixture(&[0.5; 2400], 2, 48000), Some("wav"));
        let buffer = pending.wait().unwrap();
        assert_eq!(buffer.len(), 1200);
    }

    #[test]
    fn test_invalid_input_through_service() {
        let service = DecodeService::spawn().unwrap();
        let pending = service.decode(vec![0u8; 64], None);
        assert!(matches!(pending.wait(), Err(DecodeError::InvalidAudio(_))));
    }

    #[test]
    fn test_cancelled_decode_yields_no_buffer() {
        let service = DecodeService::spawn().unwrap();
        let pending = service.decode(wav_fixture(&[0.1; 48000], 1, 48000), None);
        pending.cancel();
        assert_eq!(pending.wait(), Err(DecodeError::Cancelled));
    }

    #[test]
    fn test_pending_decode_is_a_future() {
        let service = DecodeService::spawn().unwrap();
        let pending = service.decode(wav_fixture(&[0.2; 480], 1, 48000), None);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let buffer = runtime.block_on(pending).unwrap();
        assert_eq!(buffer.len(), 480);
    }

    #[test]
    fn test_try_take_eventually_resolves() {
        let service = DecodeService::spawn().unwrap();
        let mut pending = service.decode(wav_fixture(&[0.2; 480], 1, 48000), None);

        let mut result = None;
        for _ in 0..500 {
            result = pending.try_take();
            if result.is_some() {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(matches!(result, Some(Ok(_))));
    }
}
