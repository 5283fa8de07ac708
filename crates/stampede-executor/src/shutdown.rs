//! Shutdown coordination.
//!
//! [`Shutdown`] pairs a cancellation token with cleanup hooks. Anything
//! that holds an external resource (a plugin process, a child load
//! generator) registers a hook; [`Shutdown::close`] runs the hooks once, in
//! reverse registration order. A signal, or an explicit [`Shutdown::stop`],
//! cancels the token so running work can wind down first.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

type Hook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Clone)]
pub struct Shutdown {
    token: CancellationToken,
    hooks: Arc<Mutex<Vec<(String, Hook)>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            hooks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Token cancelled when shutdown is requested.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A nested collector: cancelled with this one, closed on its own.
    pub fn scope(&self) -> Shutdown {
        Self::with_token(self.token.child_token())
    }

    /// Register a cleanup hook run by [`Shutdown::close`].
    pub fn register<F, Fut>(&self, name: impl Into<String>, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: Hook = Box::new(move || hook().boxed());
        self.lock().push((name.into(), hook));
    }

    /// Request shutdown.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Run every registered hook, newest first. Hooks run at most once.
    pub async fn close(&self) {
        let hooks = std::mem::take(&mut *self.lock());
        for (name, hook) in hooks.into_iter().rev() {
            debug!(hook = %name, "Running shutdown hook");
            hook().await;
        }
    }

    /// Wait for Ctrl-C (or SIGTERM on Unix), then request shutdown.
    pub async fn wait_signal(&self) -> std::io::Result<()> {
        let signal = quit_signal().await?;
        info!(signal, "Received quit signal, stopping");
        self.stop();
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, Hook)>> {
        self.hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn quit_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn quit_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "ctrl-c")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hooks_run_once_newest_first() {
        let shutdown = Shutdown::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["driver", "sidecar"] {
            let order = Arc::clone(&order);
            shutdown.register(name, move || async move {
                order.lock().unwrap().push(name);
            });
        }

        shutdown.close().await;
        shutdown.close().await;
        assert_eq!(*order.lock().unwrap(), vec!["sidecar", "driver"]);
    }

    #[tokio::test]
    async fn test_scope_follows_parent_cancellation() {
        let shutdown = Shutdown::new();
        let scope = shutdown.scope();
        let closed = Arc::new(Mutex::new(false));

        let flag = Arc::clone(&closed);
        scope.register("child", move || async move {
            *flag.lock().unwrap() = true;
        });

        // Closing the parent does not run the scope's hooks
        shutdown.close().await;
        assert!(!*closed.lock().unwrap());

        shutdown.stop();
        assert!(scope.is_cancelled());

        scope.close().await;
        assert!(*closed.lock().unwrap());
    }

    #[test]
    fn test_scope_cancellation_stays_local() {
        let shutdown = Shutdown::new();
        let scope = shutdown.scope();
        scope.stop();
        assert!(scope.is_cancelled());
        assert!(!shutdown.is_cancelled());
    }
}
