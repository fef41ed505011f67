use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bail_request;
use crate::error::{RunnerError, RunnerResult};
use crate::inference::demucs::collect_stems;
use crate::inference::workspace::Workspace;
use crate::storage::ObjectLocation;
use crate::AppState;

pub(crate) const DEFAULT_SESSION_ID: &str = "default";

#[derive(Deserialize, Debug)]
pub struct InvocationRequest {
    pub input_s3_uri: Option<String>,
    pub output_s3_prefix: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct OutputFile {
    pub filename: String,
    pub s3_uri: String,
}

#[derive(Serialize, Debug)]
pub struct InvocationResponse {
    pub status: String,
    pub session_id: String,
    pub output_files: Vec<OutputFile>,
}

/// A validated request, ready to run.
#[derive(Debug)]
pub(crate) struct SeparationJob {
    pub(crate) input: ObjectLocation,
    pub(crate) input_filename: String,
    pub(crate) output_prefix: ObjectLocation,
    pub(crate) session_id: String,
}

impl SeparationJob {
    pub(crate) fn from_body(body: &[u8]) -> RunnerResult<Self> {
        let request: InvocationRequest = serde_json::from_slice(body)
            .map_err(|err| RunnerError::BadRequest(format!("Invalid request body: {err}")))?;

        let (Some(input_uri), Some(output_uri)) = (
            non_empty(request.input_s3_uri),
            non_empty(request.output_s3_prefix),
        ) else {
            bail_request!("Missing input_s3_uri or output_s3_prefix")
        };

        let input = ObjectLocation::parse(&input_uri)?;
        let input_filename = input.file_name()?.to_string();
        let output_prefix = ObjectLocation::parse(&output_uri)?;
        let session_id =
            non_empty(request.session_id).unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());

        Ok(SeparationJob {
            input,
            input_filename,
            output_prefix,
            session_id,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[axum_macros::debug_handler]
pub(crate) async fn handle_invocation(
    State(state): State<AppState>,
    body: Bytes,
) -> RunnerResult<(StatusCode, Json<InvocationResponse>)> {
    let job = SeparationJob::from_body(&body)?;
    info!(session_id = %job.session_id, "Processing {} using Demucs", job.input);

    let workspace = Workspace::create(&state.scratch_dir).await?;
    let result = run_job(&state, &job, &workspace).await;
    workspace.close().await;

    Ok((
        StatusCode::OK,
        Json(InvocationResponse {
            status: "success".into(),
            session_id: job.session_id,
            output_files: result?,
        }),
    ))
}

/// Download, separate, upload. Leaves cleanup to the caller.
#[tracing::instrument(
    level = "info",
    skip_all,
    fields(session_id = %job.session_id, workspace = %workspace.path().display())
)]
async fn run_job(
    state: &AppState,
    job: &SeparationJob,
    workspace: &Workspace,
) -> RunnerResult<Vec<OutputFile>> {
    let local_input = workspace.input_path(&job.input_filename);
    state
        .store
        .download(&job.input, &local_input)
        .await
        .map_err(RunnerError::transfer)?;

    let separated_dir = state
        .runner
        .separate(&local_input, workspace.output_dir())
        .await?;

    let stems = collect_stems(&separated_dir).await?;
    let mut output_files = Vec::with_capacity(stems.len());
    for stem in stems {
        let location = job
            .output_prefix
            .join([job.session_id.as_str(), stem.filename.as_str()]);
        state
            .store
            .upload(&stem.path, &location)
            .await
            .map_err(RunnerError::transfer)?;

        output_files.push(OutputFile {
            filename: stem.filename,
            s3_uri: location.to_string(),
        });
    }

    Ok(output_files)
}
