use axum::{
    body::Body,
    extract::{
        multipart::{Multipart, MultipartRejection},
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::response::{error_body, error_response};
use super::server::AppState;
use super::{DEFAULT_IMPORTS_LIMIT, MAX_IMPORTS_LIMIT, UPLOAD_FIELD};
use crate::export;
use crate::hierarchy::{self, ChildJoin};
use crate::ingest::{self, ImportSummary, Upload};
use crate::model::EmployeeId;

#[derive(Debug, Serialize)]
struct ImportResponse {
    message: String,
    #[serde(flatten)]
    summary: ImportSummary,
}

/// `POST /api/employees/import`
pub(crate) async fn import_employees(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            return error_body(
                StatusCode::BAD_REQUEST,
                "validation",
                &format!("Expected a multipart/form-data upload: {}", rejection.body_text()),
            )
        }
    };

    let upload = match read_upload(&mut multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => {
            return error_body(
                StatusCode::BAD_REQUEST,
                "validation",
                "Please upload a CSV file in the `file` field",
            )
        }
        Err(response) => return response,
    };

    let file_name = upload
        .file_name
        .clone()
        .unwrap_or_else(|| "upload".to_string());

    match state.importer.import(upload).await {
        Ok(summary) => (
            StatusCode::OK,
            Json(ImportResponse {
                message: format!("Uploaded the file successfully: {}", file_name),
                summary,
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// First `file` field of the form, or `None` if there isn't one.
async fn read_upload(multipart: &mut Multipart) -> Result<Option<Upload>, Response> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(err) => {
                return Err(error_body(
                    err.status(),
                    "validation",
                    &format!("Invalid multipart payload: {}", err.body_text()),
                ))
            }
        };

        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await.map_err(|err| {
            error_body(
                err.status(),
                "validation",
                &format!("Could not read the uploaded file: {}", err.body_text()),
            )
        })?;

        return Ok(Some(Upload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        }));
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListParams {
    children_only: Option<bool>,
}

/// `GET /api/employees`
pub(crate) async fn list_employees(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(query) => query,
        Err(rejection) => return bad_query(rejection),
    };

    let children_only = params
        .children_only
        .unwrap_or(state.config.list.require_children);

    match hierarchy::list_employees(&state.db, ChildJoin::from_flag(children_only)).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/employees/export`
pub(crate) async fn export_employees(State(state): State<AppState>) -> Response {
    let export = match export::export_csv(&state.db, &state.config.export).await {
        Ok(export) => export,
        Err(e) => return error_response(&e),
    };

    let mut response = Response::new(Body::from(export.body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(export.content_type),
    );
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", export.filename))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

#[derive(Debug, Deserialize)]
pub(crate) struct DepthParams {
    depth: Option<usize>,
}

/// `GET /api/employees/:id/subtree`
pub(crate) async fn employee_subtree(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    params: Result<Query<DepthParams>, QueryRejection>,
) -> Response {
    let Path(id) = match id {
        Ok(path) => path,
        Err(rejection) => return bad_path(rejection),
    };
    let Query(params) = match params {
        Ok(query) => query,
        Err(rejection) => return bad_query(rejection),
    };

    let ceiling = state.config.ingest.max_depth;
    let depth = params.depth.unwrap_or(ceiling).min(ceiling);

    match hierarchy::subtree(&state.db, EmployeeId(id), depth).await {
        Ok(tree) => (StatusCode::OK, Json(tree)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/employees/:id/chain`
pub(crate) async fn employee_chain(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Response {
    let Path(id) = match id {
        Ok(path) => path,
        Err(rejection) => return bad_path(rejection),
    };

    match hierarchy::chain_of_command(&state.db, EmployeeId(id), state.config.ingest.max_depth)
        .await
    {
        Ok(chain) => (StatusCode::OK, Json(chain)).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LimitParams {
    limit: Option<usize>,
}

/// `GET /api/imports`
pub(crate) async fn list_imports(
    State(state): State<AppState>,
    params: Result<Query<LimitParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(query) => query,
        Err(rejection) => return bad_query(rejection),
    };

    let limit = params
        .limit
        .unwrap_or(DEFAULT_IMPORTS_LIMIT)
        .clamp(1, MAX_IMPORTS_LIMIT);

    match ingest::list_imports(&state.db, limit).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `GET /health`
pub(crate) async fn health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "roster",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

fn bad_query(rejection: QueryRejection) -> Response {
    error_body(
        StatusCode::BAD_REQUEST,
        "validation",
        &format!("Invalid query parameters: {}", rejection.body_text()),
    )
}

fn bad_path(rejection: PathRejection) -> Response {
    error_body(
        StatusCode::BAD_REQUEST,
        "validation",
        &format!("Invalid employee id: {}", rejection.body_text()),
    )
}
