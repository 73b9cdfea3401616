//! Process teardown guard
//!
//! Teardown hooks run at most once per process no matter how many callers
//! race into `shutdown()`. Long-running tasks watch `subscribe()` to learn
//! that shutdown has begun.

use std::sync::{Mutex, Once};
use tokio::sync::watch;

type Hook = Box<dyn FnOnce() + Send>;

pub struct Lifecycle {
    once: Once,
    hooks: Mutex<Vec<(String, Hook)>>,
    signal: watch::Sender<bool>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            once: Once::new(),
            hooks: Mutex::new(Vec::new()),
            signal,
        }
    }

    /// Register a teardown hook; hooks run in registration order
    pub fn on_shutdown(&self, name: impl Into<String>, hook: impl FnOnce() + Send + 'static) {
        if let Ok(mut hooks) = self.hooks.lock() {
            hooks.push((name.into(), Box::new(hook)));
        }
    }

    /// Receiver that flips to `true` once shutdown starts
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.signal.borrow()
    }

    /// Signal shutdown and run the hooks; returns whether this call ran them
    pub fn shutdown(&self) -> bool {
        let mut ran = false;
        self.once.call_once(|| {
            ran = true;
            self.signal.send_replace(true);
            let hooks = match self.hooks.lock() {
                Ok(mut hooks) => std::mem::take(&mut *hooks),
                Err(_) => Vec::new(),
            };
            for (name, hook) in hooks {
                tracing::info!(hook = %name, "Running shutdown hook");
                hook();
            }
            tracing::info!("Shutdown complete");
        });
        ran
    }
}
