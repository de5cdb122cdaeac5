use super::actor::HostMessage;
use crate::error::TransportError;
use crate::transport::Pipe;
use statum::{machine, state};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Wraps one poll result into a mailbox message
pub type Wrap = fn(Option<Vec<u8>>) -> HostMessage;

#[state]
#[derive(Debug, Clone)]
pub enum ReaderPhase {
    Idle,
    Polling,
}

/// Polls one IN pipe and forwards every cycle to the host mailbox
#[machine]
#[derive(Debug)]
pub struct PipeReader<S: ReaderPhase> {
    name: &'static str,
    pipe: Box<dyn Pipe>,
    chunk_len: usize,
    wrap: Wrap,
    sender: mpsc::Sender<HostMessage>,
    cancel: CancellationToken,
}

impl PipeReader<Idle> {
    pub fn create(
        name: &'static str,
        pipe: Box<dyn Pipe>,
        chunk_len: usize,
        wrap: Wrap,
        sender: mpsc::Sender<HostMessage>,
        cancel: CancellationToken,
    ) -> Self {
        debug!("Creating {} reader, chunk size {}", name, chunk_len);
        Self::new(name, pipe, chunk_len, wrap, sender, cancel)
    }

    pub fn start(self) -> PipeReader<Polling> {
        info!(
            "{} reader polling every {:?}",
            self.name,
            self.pipe.poll_interval()
        );
        self.transition()
    }
}

impl PipeReader<Polling> {
    /// Read until cancelled. A vanished device cancels the whole host.
    pub async fn run(mut self) {
        let interval = self.pipe.poll_interval();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let mut buf = vec![0u8; self.chunk_len];
            let result = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.pipe.transfer(&mut buf) => result,
            };

            let data = match result {
                Ok(0) | Err(TransportError::Timeout) => None,
                Ok(len) => {
                    buf.truncate(len);
                    Some(buf)
                }
                Err(TransportError::Disconnected) => {
                    error!("{} pipe lost, stopping host", self.name);
                    self.cancel.cancel();
                    break;
                }
                Err(e) => {
                    warn!("{} transfer failed: {}", self.name, e);
                    None
                }
            };

            let sent = tokio::select! {
                _ = self.cancel.cancelled() => break,
                sent = self.sender.send((self.wrap)(data)) => sent,
            };
            if sent.is_err() {
                debug!("Host mailbox closed, {} reader exiting", self.name);
                break;
            }
        }
        info!("{} reader stopped", self.name);
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
