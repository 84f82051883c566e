//! Sentiment endpoints

use crate::api::schemas::{Accepted, ErrorEvent};
use crate::core::bridge::BridgeError;
use crate::core::sentiment::SentimentFeature;
use crate::core::worker::InferenceOutput;
use async_stream::stream;
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
        .route("/", post(analyze))
        .route("/state", get(sentiment_state))
}

async fn sentiment_state(
    Inject(feature): Inject<SentimentFeature>,
) -> (StatusCode, Json<schemas::SentimentState>) {
    (
        StatusCode::OK,
        Json(schemas::SentimentState {
            busy: feature.is_busy(),
            analysis: feature.analysis(),
        }),
    )
}

async fn analyze(
    Inject(feature): Inject<SentimentFeature>,
    Json(request): Json<schemas::AnalyzeRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    feature.initialize();

    let mut updates = feature.subscribe();

    let request_id = feature.analyze(&request.text).map_err(|e| match e {
        BridgeError::AlreadyBusy => (StatusCode::CONFLICT, e.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
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
                    if let InferenceOutput::Sentiment { label, score } = completed.output {
                        yield Ok(Event::default()
                            .event("complete")
                            .json_data(schemas::SentimentComplete {
                                request_id: completed.request_id,
                                label,
                                score,
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
    use crate::core::sentiment::SentimentScore;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Deserialize, Debug)]
    pub struct AnalyzeRequest {
        pub text: String,
    }

    #[derive(Serialize, Debug)]
    pub struct SentimentState {
        pub busy: bool,
        pub analysis: Option<SentimentScore>,
    }

    #[derive(Serialize, Debug)]
    pub struct SentimentComplete {
        pub request_id: Uuid,
        pub label: String,
        pub score: f64,
        pub finished_at: DateTime<Utc>,
    }
}
