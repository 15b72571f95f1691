use std::{future::Future, marker::PhantomData, pin::Pin};

use tower::{Layer, Service};

use crate::{handler::PipelineError, Envelope};

/// Tower `Service` wrapper that decodes JSON payloads.
///
/// This service deserializes an [`Envelope`]'s payload into any message type
/// `M` that implements `serde::de::DeserializeOwned` before passing it to the
/// inner service. Useful for pipelines where the handler expects structured
/// types instead of raw bytes.
pub struct JsonService<T, M> {
    inner: T,
    _msg: PhantomData<M>,
}

impl<T: Clone, M> Clone for JsonService<T, M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _msg: PhantomData,
        }
    }
}

impl<T, M> Service<Envelope> for JsonService<T, M>
where
    M: serde::de::DeserializeOwned + Send + 'static,
    T: Service<M> + Clone + Send + 'static,
    <T as Service<M>>::Error: Into<tower::BoxError>,
    T::Future: Send + 'static,
{
    type Response = T::Response;
    type Error = PipelineError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(|e| PipelineError::handler(e.into()))
    }

    fn call(&mut self, req: Envelope) -> Self::Future {
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let message: M = serde_json::from_slice(&req.payload)
                .map_err(|e| PipelineError::decode(Box::new(e)))?;

            inner
                .call(message)
                .await
                .map_err(|e| PipelineError::handler(e.into()))
        })
    }
}

/// Tower `Layer` that applies [`JsonService`] to a service stack.
///
/// Wraps an existing service over a typed message so that it can sit at the
/// end of an [`Envelope`] pipeline.
pub struct JsonLayer<M> {
    _msg: PhantomData<M>,
}

impl<M> JsonLayer<M> {
    /// Create a new JSON decode layer.
    pub fn new() -> Self {
        Self { _msg: PhantomData }
    }
}

impl<M> Default for JsonLayer<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, M> Layer<S> for JsonLayer<M> {
    type Service = JsonService<S, M>;

    fn layer(&self, service: S) -> Self::Service {
        JsonService {
            inner: service,
            _msg: PhantomData,
        }
    }
}
