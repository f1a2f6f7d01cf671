//! Tracing/logging for the API server

use std::time::Instant;

use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    HttpMessage,
};
use tracing_actix_web::{DefaultRootSpanBuilder, RootSpanBuilder};

/// Milliseconds after which a request is logged as slow.
/// Requests wait on several LLM round trips, so this is generous.
const SLOW_REQUEST_MS: u128 = 30 * 1000;

/// `DefaultRootSpanBuilder` plus request timings.
pub struct VibeRootSpanBuilder;

/// When the request started.
struct RequestStart(Instant);

impl RootSpanBuilder for VibeRootSpanBuilder {
    fn on_request_start(request: &ServiceRequest) -> tracing::Span {
        // Scoped so the mutable borrow of the extensions ends before `root_span!` reads `request`.
        {
            let mut request_extensions = request.extensions_mut();
            request_extensions.insert(RequestStart(Instant::now()));
        }

        tracing_actix_web::root_span!(
            request,
            duration_ms = tracing::field::Empty,
            duration_ns = tracing::field::Empty,
        )
    }

    fn on_request_end<B: MessageBody>(
        span: tracing::Span,
        outcome: &Result<ServiceResponse<B>, actix_web::Error>,
    ) {
        let () = outcome.as_ref().map_or((), |response| {
            if let Some(req_start) = response.request().extensions().get::<RequestStart>() {
                let elapsed = req_start.0.elapsed();
                let millis = elapsed.as_millis();
                span.record("duration_ms", millis);
                span.record("duration_ns", elapsed.as_nanos());
                if millis > SLOW_REQUEST_MS {
                    tracing::warn!(duration_ms = millis, "Slow HTTP request");
                } else {
                    tracing::debug!(duration_ms = millis, "HTTP request");
                }
            }
        });
        DefaultRootSpanBuilder::on_request_end(span, outcome);
    }
}
