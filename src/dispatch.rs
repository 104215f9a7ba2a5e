//! The dispatch engine: sends a request, classifies each attempt and retries.
//!
//! Each attempt moves `Pending -> Sent -> {Succeeded, TimedOut,
//! TransientFailure, TerminalFailure, Cancelled}`. Timeouts and transient
//! failures are retried until the attempt budget is spent; everything else
//! ends the dispatch. Any HTTP response, whatever its status, counts as
//! `Succeeded` here: application failures are the translator's business and
//! are never retried.

use crate::config::ConnectionSettings;
use crate::events::{ApiEvent, EventRelay, FailureKind};
use crate::request::ApiRequest;
use crate::transport::{RawResponse, Transport, TransportOutcome, TransportRequest};
use crate::Result;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// The classified result of one attempt.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// A response was received.
    Succeeded(RawResponse),
    /// The attempt exceeded the per-attempt timeout.
    TimedOut,
    /// The transport could not reach the remote end.
    TransientFailure(String),
    /// The transport rejected the request as malformed.
    TerminalFailure(String),
    /// The caller cancelled the request.
    Cancelled,
}

impl AttemptOutcome {
    /// Returns `true` if another attempt may help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AttemptOutcome::TimedOut | AttemptOutcome::TransientFailure(_)
        )
    }

    fn failure(&self) -> Option<(FailureKind, String)> {
        match self {
            AttemptOutcome::Succeeded(_) => None,
            AttemptOutcome::TimedOut => {
                Some((FailureKind::TimedOut, "attempt timed out".to_string()))
            }
            AttemptOutcome::TransientFailure(message) => {
                Some((FailureKind::ConnectionFailure, message.clone()))
            }
            AttemptOutcome::TerminalFailure(message) => {
                Some((FailureKind::InvalidRequest, message.clone()))
            }
            AttemptOutcome::Cancelled => {
                Some((FailureKind::Cancelled, "request was cancelled".to_string()))
            }
        }
    }
}

impl From<TransportOutcome> for AttemptOutcome {
    fn from(outcome: TransportOutcome) -> Self {
        match outcome {
            TransportOutcome::Completed(response) => AttemptOutcome::Succeeded(response),
            TransportOutcome::TimedOut => AttemptOutcome::TimedOut,
            TransportOutcome::TransientFailure(message) => {
                AttemptOutcome::TransientFailure(message)
            }
            TransportOutcome::TerminalFailure(message) => AttemptOutcome::TerminalFailure(message),
        }
    }
}

/// The terminal result of a dispatch.
#[derive(Debug, Clone)]
pub struct Dispatch {
    /// The outcome of the last attempt.
    pub outcome: AttemptOutcome,
    /// The number of attempts made.
    pub attempts: usize,
    /// Total time across all attempts and backoff.
    pub elapsed: Duration,
}

/// Sends [`ApiRequest`]s through a transport with retries.
pub struct DispatchEngine<'a> {
    transport: &'a dyn Transport,
    settings: &'a ConnectionSettings,
    relay: &'a EventRelay,
}

impl<'a> DispatchEngine<'a> {
    /// Creates an engine.
    pub fn new(
        transport: &'a dyn Transport,
        settings: &'a ConnectionSettings,
        relay: &'a EventRelay,
    ) -> Self {
        Self {
            transport,
            settings,
            relay,
        }
    }

    /// Dispatches a request until it succeeds, fails terminally, is cancelled,
    /// or the attempt budget is spent.
    ///
    /// # Errors
    ///
    /// Returns an error only if the request URL cannot be resolved against the
    /// base address. Transport failures are reported through the outcome.
    pub async fn dispatch(
        &self,
        request: &ApiRequest,
        cancellation: Option<&CancellationToken>,
    ) -> Result<Dispatch> {
        let started = Instant::now();
        let request_id = request.id();
        let total_attempts = self.settings.retry_attempts().total_attempts();

        let transport_request = TransportRequest {
            request_id,
            method: request.verb().clone(),
            url: request.url(self.settings.base_address())?,
            headers: request.headers().clone(),
            body: request.body().cloned(),
            timeout: self.settings.timeout(),
        };

        let mut attempt = 0;
        loop {
            if cancellation.is_some_and(CancellationToken::is_cancelled) {
                return Ok(self.finish(AttemptOutcome::Cancelled, attempt, started));
            }
            attempt += 1;

            self.relay.publish(ApiEvent::RequestSent {
                request_id,
                attempt,
            });

            tracing::debug!(
                request_id = %request_id,
                method = %transport_request.method,
                url = %transport_request.url,
                attempt = attempt,
                "Executing HTTP request"
            );

            let attempt_started = Instant::now();
            let outcome = self.attempt(&transport_request, cancellation).await;

            let Some((kind, message)) = outcome.failure() else {
                if let AttemptOutcome::Succeeded(response) = &outcome {
                    self.relay.publish(ApiEvent::ResponseReceived {
                        request_id,
                        attempt,
                        status: response.status,
                        elapsed: attempt_started.elapsed(),
                    });
                }
                return Ok(self.finish(outcome, attempt, started));
            };

            self.relay.publish(ApiEvent::AttemptFailed {
                request_id,
                attempt,
                kind,
                message: message.clone(),
            });

            tracing::warn!(
                request_id = %request_id,
                attempt = attempt,
                kind = ?kind,
                error = %message,
                "Request attempt failed"
            );

            if !outcome.is_retryable() || attempt >= total_attempts {
                return Ok(self.finish(outcome, attempt, started));
            }

            let delay = self.settings.backoff().delay_before_retry(attempt);
            self.relay.publish(ApiEvent::RetryScheduled {
                request_id,
                next_attempt: attempt + 1,
                delay,
            });

            if let Some(delay) = delay {
                tracing::info!(
                    request_id = %request_id,
                    delay_ms = delay.as_millis(),
                    attempt = attempt,
                    "Retrying request after delay"
                );

                if !self.sleep(delay, cancellation).await {
                    return Ok(self.finish(AttemptOutcome::Cancelled, attempt, started));
                }
            }
        }
    }

    /// Runs one attempt under the per-attempt timeout and the cancellation signal.
    async fn attempt(
        &self,
        request: &TransportRequest,
        cancellation: Option<&CancellationToken>,
    ) -> AttemptOutcome {
        let send = tokio::time::timeout(self.settings.timeout(), self.transport.send(request));

        let result = match cancellation {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return AttemptOutcome::Cancelled,
                    result = send => result,
                }
            }
            None => send.await,
        };

        match result {
            Ok(outcome) => outcome.into(),
            Err(_) => AttemptOutcome::TimedOut,
        }
    }

    /// Waits out a backoff delay. Returns `false` if cancelled meanwhile.
    async fn sleep(&self, delay: Duration, cancellation: Option<&CancellationToken>) -> bool {
        match cancellation {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => false,
                    _ = tokio::time::sleep(delay) => true,
                }
            }
            None => {
                tokio::time::sleep(delay).await;
                true
            }
        }
    }

    fn finish(&self, outcome: AttemptOutcome, attempts: usize, started: Instant) -> Dispatch {
        Dispatch {
            outcome,
            attempts,
            elapsed: started.elapsed(),
        }
    }
}
