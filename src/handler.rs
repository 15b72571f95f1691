//! Downstream handler abstractions.
//!
//! This module defines a Tower-compatible pipeline used to hand converted
//! [`Envelope`]s to application logic. The pipeline is built around Tower's
//! `Service` abstraction, enabling middleware composition (decoding, tracing,
//! retries, etc.) while keeping handler implementations transport-agnostic.
//!
//! ## Key components
//!
//! - [`Pipeline`]: Public-facing wrapper implementing `tower::Service`
//! - [`HandlerService`]: Adapter from a [`Handler`] to a Tower service
//! - [`Handler`]: Trait implemented by concrete message handlers
//! - [`PipelineError`]: Unified error type with tracing context

pub mod layers;

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower::Service;
use tracing_error::SpanTrace;

use crate::Envelope;

/// Generic Tower-compatible handler pipeline.
///
/// `Pipeline` is the entry point for dispatching envelopes to application
/// logic. It wraps an underlying Tower `Service` and:
///
/// - Normalizes errors into [`PipelineError`]
/// - Supports Tower middleware via layers
/// - Provides a convenience [`dispatch`](Pipeline::dispatch) API
///
/// Typically constructed from a concrete [`Handler`] implementation.
#[derive(Clone)]
pub struct Pipeline<S> {
    service: S,
}

impl<D> Pipeline<HandlerService<D>> {
    /// Create a new pipeline from a concrete handler.
    ///
    /// The handler will be wrapped in a [`HandlerService`] to make it
    /// Tower-compatible.
    pub fn new(handler: D) -> Self {
        Self {
            service: HandlerService::new(handler),
        }
    }
}

impl<S> Pipeline<S> {
    /// Apply a Tower layer to the pipeline.
    ///
    /// This enables composition with middleware such as payload decoding,
    /// timeouts, or tracing.
    pub fn layer<L>(self, layer: L) -> Pipeline<L::Service>
    where
        L: tower::Layer<S>,
    {
        Pipeline {
            service: layer.layer(self.service),
        }
    }

    /// Dispatch an [`Envelope`] through the pipeline.
    ///
    /// This is a convenience method for callers that do not need direct
    /// access to the `tower::Service` API.
    pub async fn dispatch(&mut self, envelope: Envelope) -> Result<(), PipelineError>
    where
        S: Service<Envelope> + Clone + Send + 'static,
        S::Future: Send + 'static,
        S::Error: Into<tower::BoxError>,
    {
        let mut service = self.service.clone();
        service
            .call(envelope)
            .await
            .map_err(|e| PipelineError::handler(e.into()))?;
        Ok(())
    }
}

/// Tower `Service` implementation for `Pipeline`.
///
/// Delegates readiness and request handling to the inner service while mapping
/// all errors into [`PipelineError`].
impl<S> Service<Envelope> for Pipeline<S>
where
    S: Service<Envelope> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<tower::BoxError>,
{
    type Response = ();
    type Error = PipelineError;
    type Future = Pin<Box<dyn Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service
            .poll_ready(cx)
            .map_err(|e| PipelineError::handler(e.into()))
    }

    fn call(&mut self, req: Envelope) -> Self::Future {
        let mut service = self.service.clone();

        Box::pin(async move {
            service
                .call(req)
                .await
                .map_err(|e| PipelineError::handler(e.into()))?;
            Ok(())
        })
    }
}

/// Error returned by pipeline operations.
///
/// Each error captures:
/// - The underlying error kind
/// - A tracing span backtrace for improved diagnostics
#[derive(Debug)]
pub struct PipelineError {
    context: SpanTrace,
    kind: PipelineErrorKind,
}

/// Pipeline error kinds.
#[derive(Debug)]
pub enum PipelineErrorKind {
    /// Errors originating from the handler.
    Handler(tower::BoxError),
    /// Errors related to payload decoding.
    Decode(tower::BoxError),
}

impl PipelineError {
    /// Create a handler-related pipeline error.
    pub fn handler(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: PipelineErrorKind::Handler(err),
        }
    }

    /// Create a decode-related pipeline error.
    pub fn decode(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: PipelineErrorKind::Decode(err),
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            PipelineErrorKind::Handler(err) => writeln!(f, "Handler error: {err}"),
            PipelineErrorKind::Decode(err) => writeln!(f, "Decode error: {err}"),
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            PipelineErrorKind::Handler(err) => Some(err.as_ref()),
            PipelineErrorKind::Decode(err) => Some(err.as_ref()),
        }
    }
}

/// Tower service adapter for a [`Handler`].
///
/// This type bridges the [`Handler`] trait with Tower's `Service` abstraction.
#[derive(Clone)]
pub struct HandlerService<D> {
    handler: D,
}

impl<D> HandlerService<D> {
    /// Create a new handler service from a concrete handler.
    pub fn new(handler: D) -> Self {
        Self { handler }
    }
}

/// `tower::Service` implementation delegating to a [`Handler`].
impl<D> Service<Envelope> for HandlerService<D>
where
    D: Handler + Clone + Send + 'static,
{
    type Response = ();
    type Error = tower::BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Envelope) -> Self::Future {
        let mut handler = self.handler.clone();
        Box::pin(async move {
            handler.handle(req).await.map_err(Into::into)?;
            Ok(())
        })
    }
}

/// Trait implemented by concrete message handlers.
///
/// A handler is the application logic an inbound [`Envelope`] is delivered
/// to once conversion has stripped it of provider specifics.
#[async_trait::async_trait]
pub trait Handler {
    /// Handler-specific error type.
    type Error: Into<tower::BoxError>;

    /// Handle a single envelope.
    async fn handle(&mut self, envelope: Envelope) -> Result<(), Self::Error>;
}
