//! The request client.
//!
//! [`Client`] resolves each [`Request`] against its configuration and runs
//! it through the call pipeline. Calls can be awaited, run in the background
//! with a callback, repeated on a timer, or streamed line by line.
//!
//! ## Example
//!
//! ```ignore
//! use sigil_http::{Client, OAuthCredentials, Request};
//!
//! let client = Client::builder()
//!     .authority("https://api.example.com")
//!     .version_path("1.1")
//!     .credentials(OAuthCredentials::protected_resource("ck", "cs", "t", "ts"))
//!     .build()?;
//!
//! let response = client.request(&Request::get("statuses/home.json")).await?;
//! println!("{}", response.status_code);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use sigil_core::{
    FailureKind, JsonCodec, Response, TaskOptions, TransportFailure, TypedResponse, WebMethod,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{ClientBuilder, ClientConfig};
use crate::error::ClientError;
use crate::pipeline::Call;
use crate::query::{Query, StreamEnd, StreamEvent};
use crate::request::{Request, RequestId};
use crate::task::{PeriodicTask, TaskEnd, TaskRegistry};
use crate::transport::TransportSet;

// ============================================================================
// Request Handle
// ============================================================================

/// A call running in the background.
#[derive(Debug)]
pub struct RequestHandle {
    id: RequestId,
    join: JoinHandle<()>,
    cancel: CancellationToken,
}

impl RequestHandle {
    /// Returns the request this handle runs.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Asks the call to stop.
    ///
    /// Streams end with [`StreamEnd::Cancelled`]; periodic tasks let an
    /// in-flight tick finish first. A one-shot call still delivers one
    /// response, carrying a cancellation failure.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once the call has completed.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the call to complete.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Join`] if the background task panicked.
    pub async fn wait(self) -> Result<(), ClientError> {
        Ok(self.join.await?)
    }
}

// ============================================================================
// Active Stream
// ============================================================================

/// The stream a client currently runs.
#[derive(Debug)]
struct ActiveStream {
    serial: u64,
    cancel: CancellationToken,
}

// ============================================================================
// Client
// ============================================================================

/// Runs requests against one configured endpoint.
///
/// Cloning is cheap; clones share configuration, transports, the periodic
/// task registry, and the active stream.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    transports: TransportSet,
    tasks: Arc<TaskRegistry>,
    active_stream: Arc<Mutex<Option<ActiveStream>>>,
    stream_serial: Arc<AtomicU64>,
}

impl Client {
    /// Returns a builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the HTTP transport cannot be built.
    pub fn new() -> Result<Self, ClientError> {
        ClientBuilder::new().build()
    }

    pub(crate) fn from_parts(config: ClientConfig, transports: TransportSet) -> Self {
        Self {
            config: Arc::new(config),
            transports,
            tasks: Arc::new(TaskRegistry::new()),
            active_stream: Arc::new(Mutex::new(None)),
            stream_serial: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the client's configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the periodic task registry.
    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    // ------------------------------------------------------------------------
    // One-shot Calls
    // ------------------------------------------------------------------------

    /// Runs `request` and returns the final response.
    ///
    /// Task options are ignored here; use [`begin_request`](Self::begin_request)
    /// for periodic calls.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::StreamOptionsOnPlainCall`] for a request with
    /// stream options, or any error raised before the first attempt.
    /// Transport failures and timeouts are reported on the response.
    #[instrument(skip(self, request), fields(request = %request.id()))]
    pub async fn request(&self, request: &Request) -> Result<Response, ClientError> {
        if request.stream_options.is_some() {
            return Err(ClientError::StreamOptionsOnPlainCall);
        }
        if request.task_options.is_some() {
            debug!("Ignoring task options on a one-shot call");
        }
        let mut call = Call::prepare(&self.config, &self.transports, request)?;
        call.run().await
    }

    /// Runs `request` and decodes the entity as `T`.
    ///
    /// JSON decoding is used when neither the request nor the client sets a
    /// deserializer.
    ///
    /// # Errors
    ///
    /// Same as [`request`](Self::request).
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        request: &Request,
    ) -> Result<TypedResponse<T>, ClientError> {
        let response = if request.deserializer.is_none() && self.config.deserializer.is_none() {
            let request = request.clone().with_deserializer(Arc::new(JsonCodec));
            self.request(&request).await?
        } else {
            self.request(request).await?
        };
        Ok(TypedResponse::new(response))
    }

    /// Runs `request` on a private current-thread runtime.
    ///
    /// Must not be called from inside an async context.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the runtime cannot be created, or any
    /// error [`request`](Self::request) returns.
    pub fn request_blocking(&self, request: &Request) -> Result<Response, ClientError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.request(request))
    }

    // ------------------------------------------------------------------------
    // Background Calls
    // ------------------------------------------------------------------------

    /// Runs `request` in the background, delivering responses to `on_response`.
    ///
    /// With periodic task options (on the request or the client) the call
    /// repeats and the callback fires once per tick. Otherwise it fires
    /// exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::StreamOptionsOnPlainCall`] for a request with
    /// stream options, [`ClientError::TaskAlreadyRegistered`] if the request
    /// already has a live periodic task, or any error raised while preparing
    /// a one-shot call.
    pub fn begin_request<F>(
        &self,
        request: Request,
        on_response: F,
    ) -> Result<RequestHandle, ClientError>
    where
        F: FnMut(&Request, Response) + Send + 'static,
    {
        if request.stream_options.is_some() {
            return Err(ClientError::StreamOptionsOnPlainCall);
        }

        let periodic = request
            .task_options
            .clone()
            .or_else(|| self.config.task_options.clone())
            .filter(TaskOptions::is_periodic);
        match periodic {
            Some(options) => self.begin_periodic(request, options, on_response),
            None => self.begin_once(request, on_response),
        }
    }

    fn begin_once<F>(&self, request: Request, mut on_response: F) -> Result<RequestHandle, ClientError>
    where
        F: FnMut(&Request, Response) + Send + 'static,
    {
        let mut call = Call::prepare(&self.config, &self.transports, &request)?;
        let id = request.id();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let join = tokio::spawn(async move {
            let outcome = tokio::select! {
                () = token.cancelled() => None,
                outcome = call.run() => Some(outcome),
            };
            let response = match outcome {
                Some(outcome) => outcome.unwrap_or_else(|e| {
                    warn!(request = %id, error = %e, "Background call failed");
                    failed_response(&e)
                }),
                None => {
                    debug!(request = %id, "Background call cancelled");
                    cancelled_response(call.query())
                }
            };
            on_response(&request, response);
        });

        Ok(RequestHandle { id, join, cancel })
    }

    fn begin_periodic<F>(
        &self,
        request: Request,
        options: TaskOptions,
        on_response: F,
    ) -> Result<RequestHandle, ClientError>
    where
        F: FnMut(&Request, Response) + Send + 'static,
    {
        let guard = self.tasks.register(request.id())?;
        let id = request.id();
        let cancel = guard.token().clone();
        let client = self.clone();
        info!(
            request = %id,
            interval_ms = u64::try_from(options.repeat_interval.as_millis()).unwrap_or(u64::MAX),
            repeat_times = ?options.repeat_times,
            "Starting periodic task"
        );

        let join = tokio::spawn(async move {
            let task = PeriodicTask::new(options, guard);
            let end = task
                .run(
                    &request,
                    || {
                        let client = client.clone();
                        let request = request.clone();
                        async move { client.run_tick(&request).await }
                    },
                    on_response,
                )
                .await;
            match end {
                TaskEnd::Failed(e) => warn!(request = %id, error = %e, "Periodic task failed"),
                end => debug!(request = %id, end = ?end, "Periodic task finished"),
            }
        });

        Ok(RequestHandle { id, join, cancel })
    }

    /// One tick: a fresh preparation, so the signature is fresh too.
    async fn run_tick(&self, request: &Request) -> Result<Response, ClientError> {
        let mut call = Call::prepare(&self.config, &self.transports, request)?;
        call.run().await
    }

    /// Streams `request`, delivering line batches to `on_event`.
    ///
    /// Stream options come from the request, then the client, then
    /// defaults. Starting a stream cancels the one already active on this
    /// client. The last event is always [`StreamEvent::End`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnsupportedStreamMethod`] for methods other
    /// than GET and POST, or any error raised while preparing the call.
    pub fn stream<F>(&self, request: Request, mut on_event: F) -> Result<RequestHandle, ClientError>
    where
        F: FnMut(StreamEvent) + Send + 'static,
    {
        let options = request
            .stream_options
            .clone()
            .or_else(|| self.config.stream_options.clone())
            .unwrap_or_default();
        let call = Call::prepare(&self.config, &self.transports, &request)?;
        let mut query = call.into_query();
        if !matches!(query.method, WebMethod::Get | WebMethod::Post) {
            return Err(ClientError::UnsupportedStreamMethod(query.method));
        }

        let transport = self.transports.for_query(&query);
        let cancel = CancellationToken::new();
        let serial = self.stream_serial.fetch_add(1, Ordering::Relaxed);
        let active = ActiveStream {
            serial,
            cancel: cancel.clone(),
        };
        if let Some(previous) = self
            .active_stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(active)
        {
            debug!("Cancelling previously active stream");
            previous.cancel.cancel();
        }

        let id = request.id();
        let token = cancel.clone();
        let slot = Arc::clone(&self.active_stream);
        let join = tokio::spawn(async move {
            let outcome = query
                .stream(transport, &options, &token, &mut on_event)
                .await;
            match outcome {
                Ok(end) => info!(request = %id, end = ?end, "Stream finished"),
                Err(e) => {
                    warn!(request = %id, error = %e, "Stream could not start");
                    on_event(StreamEvent::End {
                        reason: StreamEnd::Failed(TransportFailure::new(
                            FailureKind::Request,
                            e.to_string(),
                        )),
                    });
                }
            }

            // A newer stream may own the slot by now.
            let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_some_and(|active| active.serial == serial) {
                *slot = None;
            }
        });

        Ok(RequestHandle { id, join, cancel })
    }

    // ------------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------------

    /// Cancels the active stream, if any. Returns true if one was signalled.
    pub fn cancel_streaming(&self) -> bool {
        let active = self
            .active_stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        active.is_some_and(|active| {
            active.cancel.cancel();
            true
        })
    }

    /// Cancels every periodic task. Returns how many were signalled.
    pub fn cancel_periodic_tasks(&self) -> usize {
        let count = self.tasks.cancel_all();
        if count > 0 {
            info!(count, "Cancelled periodic tasks");
        }
        count
    }

    /// Returns the attempts made by the latest call of `request`.
    pub fn iteration_count(&self, request: &Request) -> u32 {
        request.retry_state().iterations()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

fn failed_response(error: &ClientError) -> Response {
    Response {
        exception: Some(TransportFailure::new(FailureKind::Request, error.to_string())),
        ..Response::default()
    }
}

/// Completes a cancelled call with whatever its query recorded so far.
fn cancelled_response(query: &Query) -> Response {
    let mut result = query.result.clone();
    result.exception = Some(TransportFailure::new(FailureKind::Request, "call cancelled"));
    Response::from_result(result)
}

// ============================================================================
// Tests
// ============================================================================
