//! Signal handling for `credsink run`.
//!
//! The first SIGINT or SIGTERM only stops the input reader. Producers drain
//! the lines already queued, detach from every sink, and the last detach of
//! each sink finalizes it (final commit, file sync). A second signal while
//! that drain is running exits at once without finalizing.

use crate::error::CliError;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => f.write_str("SIGINT"),
            ShutdownSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Turns process signals into cancellation of the input reader.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    cancel_token: CancellationToken,
    shutdown_requested: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register_handlers(&self) {
        let coordinator = self.clone();

        tokio::spawn(async move {
            let Some(signal) = wait_for_signal().await else {
                return;
            };
            coordinator.request_shutdown(signal);

            if let Some(signal) = wait_for_signal().await {
                warn!(%signal, "Second signal while sinks are closing, exiting without finalizing");
                std::process::exit(ExitCode::ShutdownRequested.as_i32());
            }
        });
    }

    /// Stops the input reader. Returns `false` if shutdown was already
    /// requested.
    pub fn request_shutdown(&self, signal: ShutdownSignal) -> bool {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!(
            %signal,
            "Stopping input, producers will drain queued records and detach from every sink"
        );
        self.cancel_token.cancel();
        true
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

/// Resolves on the next SIGINT or SIGTERM. Yields `None` when neither
/// handler could be installed.
async fn wait_for_signal() -> Option<ShutdownSignal> {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "Failed to install SIGINT handler");
                false
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => stream.recv().await.is_some(),
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                false
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = async { false };

    tokio::pin!(ctrl_c, terminate);
    let (mut ctrl_c_done, mut terminate_done) = (false, false);
    while !(ctrl_c_done && terminate_done) {
        tokio::select! {
            installed = &mut ctrl_c, if !ctrl_c_done => {
                if installed {
                    return Some(ShutdownSignal::Interrupt);
                }
                ctrl_c_done = true;
            }
            installed = &mut terminate, if !terminate_done => {
                if installed {
                    return Some(ShutdownSignal::Terminate);
                }
                terminate_done = true;
            }
        }
    }
    None
}

/// Exit codes for the CLI application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    ShutdownRequested = 130, // Standard exit code for SIGINT
}

impl ExitCode {
    /// A signal wins over the command's own result: a run cut short by
    /// SIGINT exits with 130 even if every sink closed cleanly.
    pub fn from_outcome(result: &Result<(), CliError>, shutdown_requested: bool) -> Self {
        match result {
            _ if shutdown_requested => ExitCode::ShutdownRequested,
            Ok(()) => ExitCode::Success,
            Err(CliError::ShutdownRequested) => ExitCode::ShutdownRequested,
            Err(_) => ExitCode::GeneralError,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
