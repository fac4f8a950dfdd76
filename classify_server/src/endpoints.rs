//! Endpoints of HTTP server.
//!
use std::sync::Arc;

use axum::{
    body::StreamBody,
    extract::Query,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use common::{
    labels::Vocabulary,
    ranking::{rank, top_k_from_signed, Prediction, RankError},
};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;

use crate::{router::FrameRouter, BroadcastReceiver};

/// Vocabulary and default `k` used to answer prediction requests.
#[derive(Clone)]
pub struct LabelRanking {
    pub vocabulary: Arc<Vocabulary>,
    pub default_k: usize,
}

/// Search parameters available to streams.
#[derive(Debug, Deserialize)]
pub struct StreamParams {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PredictionParams {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    k: Option<i64>,
}

type ApiError = (StatusCode, String);

/// Build the HTTP application.
pub fn app(frame_router: Arc<FrameRouter>, labels: LabelRanking) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/stream", get(named_stream))
        .route("/classified_stream", get(classified_stream))
        .route("/predictions", get(predictions))
        .layer(Extension(frame_router))
        .layer(Extension(labels))
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

/// Endpoint of received image streams.
pub async fn named_stream(
    Extension(frame_router): Extension<Arc<FrameRouter>>,
    Query(params): Query<StreamParams>,
) -> impl IntoResponse {
    let name = params.name.unwrap_or_else(|| "unknown".into());
    log::info!("Stream for {} requested", &name);

    mjpeg_response(frame_router.get_broadcast_receiver(&name))
}

/// Endpoint of image streams annotated with their predictions.
pub async fn classified_stream(
    Extension(frame_router): Extension<Arc<FrameRouter>>,
    Query(params): Query<StreamParams>,
) -> impl IntoResponse {
    let name = params.name.unwrap_or_else(|| "unknown".into());
    log::info!("Classified stream for {} requested", &name);

    mjpeg_response(frame_router.get_classified_receiver(&name))
}

/// Top-k labels of the latest classified frame of a stream.
pub async fn predictions(
    Extension(frame_router): Extension<Arc<FrameRouter>>,
    Extension(labels): Extension<LabelRanking>,
    Query(params): Query<PredictionParams>,
) -> Result<Json<Vec<Prediction>>, ApiError> {
    let name = params.name.unwrap_or_else(|| "unknown".into());
    let k = match params.k {
        Some(k) => top_k_from_signed(k).map_err(bad_request)?,
        None => labels.default_k,
    };

    let scores = frame_router.latest_scores(&name).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            format!("no predictions for stream {name}"),
        )
    })?;
    let ranked = rank(&scores, labels.vocabulary.labels(), k).map_err(bad_request)?;

    Ok(Json(ranked))
}

fn bad_request(err: RankError) -> ApiError {
    (StatusCode::BAD_REQUEST, err.to_string())
}

fn mjpeg_response(rx: BroadcastReceiver) -> impl IntoResponse {
    // Set body and headers for multipart streaming
    let body = StreamBody::new(BroadcastStream::from(rx));
    let headers = [(
        header::CONTENT_TYPE,
        "multipart/x-mixed-replace; boundary=frame",
    )];

    (headers, body)
}

#[cfg(test)]
mod test {
    use axum::{
        body::{Body, HttpBody},
        http::Request,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{hashed, infer_channel, pipeline::test::vocabulary};

    fn test_app() -> Router {
        let (infer_tx, _infer_rx) = infer_channel();
        let frame_router = Arc::new(FrameRouter::new(infer_tx));
        frame_router.store_scores(hashed("cam"), vec![0.1, 0.6, 0.3].into());

        let labels = LabelRanking {
            vocabulary: vocabulary(3),
            default_k: 2,
        };
        app(frame_router, labels)
    }

    async fn fetch(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = match resp.into_body().data().await {
            Some(chunk) => String::from_utf8(chunk.unwrap().to_vec()).unwrap(),
            None => String::new(),
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_healthcheck() {
        let app = test_app();
        assert_eq!(fetch(app, "/healthcheck").await, (StatusCode::OK, "healthy".into()));
    }

    #[tokio::test]
    async fn test_predictions_default_k() {
        let app = test_app();
        let (status, body) = fetch(app, "/predictions?name=cam").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            r#"[{"label":"label_1","score":0.6},{"label":"label_2","score":0.3}]"#
        );
    }

    #[tokio::test]
    async fn test_predictions_explicit_k() {
        let app = test_app();
        let (status, body) = fetch(app, "/predictions?name=cam&k=0").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "[]");
    }

    #[tokio::test]
    async fn test_predictions_invalid_k() {
        let app = test_app();
        assert_eq!(
            fetch(app.clone(), "/predictions?name=cam&k=-1").await.0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            fetch(app, "/predictions?name=cam&k=4").await.0,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_predictions_unknown_stream() {
        let app = test_app();
        assert_eq!(
            fetch(app, "/predictions?name=nobody").await.0,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_stream_headers() {
        for uri in ["/stream?name=cam", "/classified_stream?name=cam"] {
            let resp = test_app()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(resp.status(), StatusCode::OK, "{uri}");
            assert_eq!(
                resp.headers()[header::CONTENT_TYPE],
                "multipart/x-mixed-replace; boundary=frame",
                "{uri}"
            );
        }
    }
}
