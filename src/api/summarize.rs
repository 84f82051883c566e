//! Summarize endpoints

use crate::api::schemas::{Accepted, ErrorEvent};
use crate::core::bridge::BridgeError;
use crate::core::summarize::{SummarizeError, SummarizeFeature};
use crate::core::worker::InferenceOutput;
use async_stream::stream;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::Sse;
use axum::response::sse::{Event, KeepAlive};
use axum::routing::{get, post};
use axum::{Json, Router};
use di_axum::Inject;
use futures_util::Stream;
use std::convert::Infallible;

pub fn router() -> Router {
    Router::new()
        .route("/state", get(summarize_state))
        .route("/:element_id", post(summarize_element))
}

async fn summarize_state(
    Inject(feature): Inject<SummarizeFeature>,
) -> (StatusCode, Json<schemas::SummarizeState>) {
    (
        StatusCode::OK,
        Json(schemas::SummarizeState {
            busy: feature.is_busy(),
            summary: feature.summary(),
        }),
    )
}

async fn summarize_element(
    Inject(feature): Inject<SummarizeFeature>,
    Path(element_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    feature.initialize();

    if !feature.bind(&element_id).await {
        return Err((
            StatusCode::NOT_FOUND,
            format!("element '{element_id}' has no extractable text"),
        ));
    }

    let mut updates = feature.subscribe();

    let request_id = feature.trigger().map_err(|e| match e {
        SummarizeError::NotReady => (StatusCode::NOT_FOUND, e.to_string()),
        SummarizeError::Bridge(BridgeError::AlreadyBusy) => {
            (StatusCode::CONFLICT, e.to_string())
        }
        SummarizeError::Bridge(_) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    })?;

    let stream = stream! {
        yield Ok(Event::default()
            .event("accepted")
            .json_data(Accepted { request_id })
            .expect("accepted event is serializable"));

        loop {
            if updates.changed().await.is_err() {
                break;
            }

            let state = updates.borrow().clone();
            if state.busy {
                continue;
            }

            match state.last {
                // Only this trigger's exchange may be reported as complete;
                // a lingering earlier result is skipped over.
                Some(Ok(completed)) if completed.request_id != request_id => continue,
                Some(Ok(completed)) => {
                    if let InferenceOutput::Summary { summary_text } = completed.output {
                        yield Ok(Event::default()
                            .event("complete")
                            .json_data(schemas::SummaryComplete {
                                request_id: completed.request_id,
                                summary_text,
                                finished_at: completed.finished_at,
                            })
                            .expect("complete event is serializable"));
                    }
                }
                Some(Err(e)) => {
                    yield Ok(Event::default()
                        .event("error")
                        .json_data(ErrorEvent { message: e.to_string() })
                        .expect("error event is serializable"));
                }
                None => {}
            }

            break;
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub mod schemas {
    use chrono::{DateTime, Utc};
    use serde::Serialize;
    use uuid::Uuid;

    #[derive(Serialize, Debug)]
    pub struct SummarizeState {
        pub busy: bool,
        pub summary: Option<String>,
    }

    #[derive(Serialize, Debug)]
    pub struct SummaryComplete {
        pub request_id: Uuid,
        pub summary_text: String,
        pub finished_at: DateTime<Utc>,
    }
}
