//! The per-store worker task.
//!
//! Every [`Store`](super::Store) owns one worker draining an unbounded
//! channel. Messages are handled strictly one at a time, so operations take
//! effect in the order they were issued. Driver selection happens lazily on
//! the first message that needs a driver and is never retried.

use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{Shared, prepare_config};
use crate::config::StoreConfig;
use crate::deferred::Completer;
use crate::drivers::selector::{self, Request};
use crate::drivers::{Driver, DriverRegistry};
use crate::error::{Error, Result};

/// A queued operation. Receives the selected driver, or the selection error.
pub(super) type Job = Box<dyn FnOnce(Result<Arc<dyn Driver>>) -> BoxFuture<'static, ()> + Send>;

pub(super) enum Message {
    Op(Job),
    SetDriver {
        names: Vec<String>,
        reply: Completer<String>,
    },
    Ready {
        reply: Completer<String>,
    },
    Configure {
        config: StoreConfig,
        reply: Completer<()>,
    },
}

enum Selection {
    Pending,
    Active(Arc<dyn Driver>),
    /// Selection failures are permanent for the store.
    Failed(Error),
}

pub(super) struct Worker {
    registry: Arc<DriverRegistry>,
    shared: Arc<Shared>,
    rx: mpsc::UnboundedReceiver<Message>,
    selection: Selection,
}

impl Worker {
    pub(super) fn new(
        registry: Arc<DriverRegistry>,
        shared: Arc<Shared>,
        rx: mpsc::UnboundedReceiver<Message>,
    ) -> Self {
        Self {
            registry,
            shared,
            rx,
            selection: Selection::Pending,
        }
    }

    /// Runs until every `Store` handle is dropped and the queue is drained.
    pub(super) async fn run(mut self) {
        while let Some(message) = self.rx.recv().await {
            match message {
                Message::Op(job) => {
                    let driver = self.driver(Request::Default).await;
                    job(driver).await;
                },
                Message::Ready { reply } => {
                    let name = self
                        .driver(Request::Default)
                        .await
                        .map(|d| d.name().to_string());
                    reply.complete(name);
                },
                Message::SetDriver { names, reply } => {
                    reply.complete(self.set_driver(&names).await);
                },
                Message::Configure { config, reply } => {
                    reply.complete(self.configure(&config));
                },
            }
        }

        let config = self.shared.config.read();
        tracing::debug!(name = %config.name, store = %config.store_name, "Store worker stopped");
    }

    /// Returns the active driver, selecting one first if needed.
    async fn driver(&mut self, request: Request<'_>) -> Result<Arc<dyn Driver>> {
        match &self.selection {
            Selection::Active(driver) => return Ok(driver.clone()),
            Selection::Failed(err) => return Err(err.clone()),
            Selection::Pending => {},
        }

        let registry = self.registry.clone();
        let config = self.shared.config.read().clone();
        let names = match request {
            Request::Explicit(names) => Some(names.to_vec()),
            Request::Default => None,
        };

        let selected = tokio::task::spawn_blocking(move || {
            let request = names.as_deref().map_or(Request::Default, Request::Explicit);
            selector::select(&registry, &config, request)
        })
        .await
        .unwrap_or_else(|e| Err(e.into()));

        match selected {
            Ok(driver) => {
                *self.shared.driver.write() = Some(driver.name().to_string());
                self.selection = Selection::Active(driver.clone());
                Ok(driver)
            },
            Err(err) => {
                tracing::error!(error = %err, "Driver selection failed; store is unusable");
                self.selection = Selection::Failed(err.clone());
                Err(err)
            },
        }
    }

    async fn set_driver(&mut self, names: &[String]) -> Result<String> {
        if let Selection::Active(driver) = &self.selection {
            let active = driver.name();
            if names.iter().any(|n| n == active) {
                return Ok(active.to_string());
            }
            return Err(Error::config(format!(
                "driver '{active}' is already selected; requested {}",
                names.join(", ")
            )));
        }

        self.driver(Request::Explicit(names))
            .await
            .map(|d| d.name().to_string())
    }

    fn configure(&mut self, config: &StoreConfig) -> Result<()> {
        if !matches!(self.selection, Selection::Pending) {
            return Err(Error::config(
                "store options cannot change after the store has been used",
            ));
        }

        let config = prepare_config(config, &self.registry)?;
        tracing::debug!(name = %config.name, store = %config.store_name, "Store reconfigured");
        *self.shared.config.write() = config;
        Ok(())
    }
}
