use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct PingResponse {
    pub status: String,
}

/// Liveness only, neither S3 nor Demucs are checked.
#[axum_macros::debug_handler]
pub(crate) async fn handle_ping() -> (StatusCode, Json<PingResponse>) {
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "healthy".into(),
        }),
    )
}
