use anyhow::Result;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Resolves once the process receives SIGINT or SIGTERM (Ctrl+C / console close on Windows).
pub async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?; // Ctrl+C
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("shutdown: SIGTERM received"),
            _ = sigint.recv()  => tracing::info!("shutdown: SIGINT received"),
        }
        Ok(())
    }

    #[cfg(windows)]
    {
        use tokio::signal::windows::{ctrl_break, ctrl_c, ctrl_close, ctrl_shutdown};
        let mut c = ctrl_c()?;
        let mut br = ctrl_break()?;
        let mut cl = ctrl_close()?;
        let mut sh = ctrl_shutdown()?;
        tokio::select! {
            _ = c.recv()  => {},
            _ = br.recv() => {},
            _ = cl.recv() => {},
            _ = sh.recv() => {},
        }
        tracing::info!("shutdown: console signal received");
        Ok(())
    }
}

/// Spawn a task that cancels `token` when `signal` resolves.
///
/// A signal listener that fails to install is logged and also cancels the token,
/// so the process never runs without a way to stop.
pub fn cancel_on<F>(token: CancellationToken, signal: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            res = signal => {
                if let Err(e) = res {
                    tracing::error!(error = %e, "shutdown: signal listener failed");
                }
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}

/// Root cancellation token wired to the OS shutdown signals.
pub fn signal_token() -> CancellationToken {
    let token = CancellationToken::new();
    cancel_on(token.clone(), wait_for_shutdown());
    token
}
