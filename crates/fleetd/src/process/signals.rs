//! Lifecycle requests delivered to the serving loop.

use std::io;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use super::PROCESS_TARGET;

/// What the daemon was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// Stop every worker and rediscover packages.
    Reload,
    /// Stop every worker and exit.
    Shutdown,
}

/// Source of lifecycle requests for the serving loop.
#[async_trait]
pub trait SignalSource: Send {
    /// Waits for the next request; `None` means the source is gone.
    async fn recv(&mut self) -> Option<DaemonSignal>;
}

#[async_trait]
impl SignalSource for UnboundedReceiver<DaemonSignal> {
    async fn recv(&mut self) -> Option<DaemonSignal> {
        UnboundedReceiver::recv(self).await
    }
}

/// Operating-system signals: `SIGHUP` reloads, `SIGINT` and `SIGTERM` stop.
#[cfg(unix)]
#[derive(Debug)]
pub struct SystemSignals {
    hangup: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SystemSignals {
    /// Installs the handlers. Must run inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the OS error when a handler cannot be registered.
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }
}

#[cfg(unix)]
#[async_trait]
impl SignalSource for SystemSignals {
    async fn recv(&mut self) -> Option<DaemonSignal> {
        let (name, request) = tokio::select! {
            received = self.hangup.recv() => ("SIGHUP", received.map(|()| DaemonSignal::Reload)),
            received = self.interrupt.recv() => ("SIGINT", received.map(|()| DaemonSignal::Shutdown)),
            received = self.terminate.recv() => ("SIGTERM", received.map(|()| DaemonSignal::Shutdown)),
        };
        info!(target: PROCESS_TARGET, signal = name, ?request, "signal received");
        request
    }
}

/// Ctrl-C stops the daemon; reload is not available.
#[cfg(not(unix))]
#[derive(Debug, Default)]
pub struct SystemSignals;

#[cfg(not(unix))]
impl SystemSignals {
    /// Installs the handler.
    ///
    /// # Errors
    ///
    /// Never fails on this platform.
    pub const fn install() -> io::Result<Self> {
        Ok(Self)
    }
}

#[cfg(not(unix))]
#[async_trait]
impl SignalSource for SystemSignals {
    async fn recv(&mut self) -> Option<DaemonSignal> {
        let received = tokio::signal::ctrl_c().await;
        info!(target: PROCESS_TARGET, ok = received.is_ok(), "interrupt received");
        received.ok().map(|()| DaemonSignal::Shutdown)
    }
}
