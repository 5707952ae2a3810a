//! Receiving side of a stream session.

use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::extract::{ConversionPool, Message, MessageExtractor};
use crate::schema::{ControlHeader, DataHeader, MainHeader};
use crate::transport::FrameSource;

/// What a stop command does to the driver loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBehavior {
    /// End the session.
    #[default]
    Close,
    /// Drop the unit and keep receiving.
    DrainAndContinue,
}

/// How the handlers of one event are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// One at a time, in registration order.
    #[default]
    Sequential,
    /// All at once, joined before the next unit is consumed.
    Concurrent,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiverConfig {
    pub stop_behavior: StopBehavior,
    pub dispatch: DispatchMode,
}

type Handler<T> = Box<dyn FnMut(T) -> BoxFuture<'static, ()> + Send>;

/// Consumes multipart units from a [`FrameSource`] and dispatches typed
/// events to registered handlers.
///
/// Errors scoped to one pulse (framing, schema, codec) drop that pulse's
/// remaining frames and the loop continues; transport errors end the
/// session. After [`close`] no handler is invoked again, even for units
/// already in flight.
///
/// [`close`]: Receiver::close
pub struct Receiver<S: FrameSource> {
    source: S,
    config: ReceiverConfig,
    extractor: MessageExtractor,
    pool: ConversionPool,
    cancel: CancellationToken,
    schema_handlers: Vec<Handler<Arc<DataHeader>>>,
    header_handlers: Vec<Handler<MainHeader>>,
    message_handlers: Vec<Handler<Arc<Message>>>,
}

impl<S: FrameSource> Receiver<S> {
    /// Create a receiver with the default configuration.
    ///
    /// Spawns the conversion pool's workers, so this must be called from
    /// within a Tokio runtime.
    pub fn new(source: S) -> Self {
        Self::with_config(source, ReceiverConfig::default())
    }

    /// Create a receiver with an explicit configuration. Same runtime
    /// requirement as [`new`](Receiver::new).
    pub fn with_config(source: S, config: ReceiverConfig) -> Self {
        Self {
            source,
            config,
            extractor: MessageExtractor::new(),
            pool: ConversionPool::new(),
            cancel: CancellationToken::new(),
            schema_handlers: Vec::new(),
            header_handlers: Vec::new(),
            message_handlers: Vec::new(),
        }
    }

    /// Called once per schema revision, before any message of that revision.
    pub fn on_schema_change<F, Fut>(&mut self, mut handler: F)
    where
        F: FnMut(Arc<DataHeader>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.schema_handlers.push(Box::new(move |header| Box::pin(handler(header))));
    }

    /// Called for every parsed main header, before extraction.
    pub fn on_main_header<F, Fut>(&mut self, mut handler: F)
    where
        F: FnMut(MainHeader) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.header_handlers.push(Box::new(move |header| Box::pin(handler(header))));
    }

    /// Called with each pulse's resolved, immutable message.
    pub fn on_message<F, Fut>(&mut self, mut handler: F)
    where
        F: FnMut(Arc<Message>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.message_handlers.push(Box::new(move |message| Box::pin(handler(message))));
    }

    /// Token that ends the session when cancelled; clone it to close from
    /// another task while `run` is blocked in `recv`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the session until the peer closes, a stop command arrives (under
    /// [`StopBehavior::Close`]), the token is cancelled, or a transport error
    /// occurs.
    pub async fn run(mut self) -> Result<()> {
        let reason = loop {
            let maybe_unit = tokio::select! {
                _ = self.cancel.cancelled() => break "cancelled",
                unit = self.source.recv() => unit?,
            };
            let Some(mut unit) = maybe_unit else { break "peer closed" };

            let Some(first) = unit.next_frame() else {
                warn!("empty multipart unit");
                continue;
            };
            let main = match ControlHeader::parse(&first) {
                Ok(ControlHeader::Data(main)) => main,
                Ok(ControlHeader::Stop) => {
                    let dropped = unit.drain();
                    debug!(dropped, "stop command");
                    match self.config.stop_behavior {
                        StopBehavior::Close => break "stop command",
                        StopBehavior::DrainAndContinue => continue,
                    }
                }
                Ok(ControlHeader::Reconnect) => {
                    let dropped = unit.drain();
                    debug!(dropped, "reconnect command");
                    continue;
                }
                Err(e) => {
                    let dropped = unit.drain();
                    warn!(error = %e, dropped, "undecodable main header, pulse dropped");
                    continue;
                }
            };

            self.dispatch_headers(main.clone()).await;

            let extraction = match self.extractor.extract(main, &mut unit, &self.pool) {
                Ok(extraction) => extraction,
                Err(e) if e.is_fatal_to_pulse_only() => {
                    let dropped = unit.drain();
                    warn!(error = %e, dropped, "pulse dropped");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if let Some(schema) = extraction.schema_changed {
                self.dispatch_schema(schema).await;
            }

            let message = match extraction.message.resolve().await {
                Ok(message) => message,
                Err(e) if e.is_fatal_to_pulse_only() => {
                    warn!(error = %e, "pulse dropped during conversion");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if self.cancel.is_cancelled() {
                break "cancelled";
            }
            self.dispatch_message(Arc::new(message)).await;
        };

        info!(reason, "receiver session ended");
        self.pool.close();
        Ok(())
    }

    async fn dispatch_schema(&mut self, schema: Arc<DataHeader>) {
        match self.config.dispatch {
            DispatchMode::Sequential => {
                for handler in &mut self.schema_handlers {
                    handler(Arc::clone(&schema)).await;
                }
            }
            DispatchMode::Concurrent => {
                join_all(self.schema_handlers.iter_mut().map(|h| h(Arc::clone(&schema)))).await;
            }
        }
    }

    async fn dispatch_headers(&mut self, header: MainHeader) {
        match self.config.dispatch {
            DispatchMode::Sequential => {
                for handler in &mut self.header_handlers {
                    handler(header.clone()).await;
                }
            }
            DispatchMode::Concurrent => {
                join_all(self.header_handlers.iter_mut().map(|h| h(header.clone()))).await;
            }
        }
    }

    async fn dispatch_message(&mut self, message: Arc<Message>) {
        match self.config.dispatch {
            DispatchMode::Sequential => {
                for handler in &mut self.message_handlers {
                    handler(Arc::clone(&message)).await;
                }
            }
            DispatchMode::Concurrent => {
                join_all(self.message_handlers.iter_mut().map(|h| h(Arc::clone(&message)))).await;
            }
        }
    }
}
