use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use crate::config::ServiceConfig;
use crate::data::{
    BatchRequest, BatchResult, LedgerInfo, LedgerUpdate, Room, ScopedCommitRequest, TemplateRow,
    UserScope,
};
use crate::error::SchedulerError;
use crate::solver::Scheduler;
use log::{error, info};
use std::sync::{Arc, Mutex, MutexGuard};

/// The scheduler behind one lock: generation, commit and reset never interleave.
pub type SharedScheduler = Arc<Mutex<Scheduler>>;

type ApiError = (StatusCode, String);

fn lock(state: &SharedScheduler) -> Result<MutexGuard<'_, Scheduler>, ApiError> {
    state
        .lock()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "scheduler lock poisoned".to_string()))
}

fn reject(e: SchedulerError) -> ApiError {
    if e.is_client_error() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else {
        error!("Request failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

async fn generate_handler(
    State(state): State<SharedScheduler>,
    Json(batch): Json<BatchRequest>,
) -> Result<Json<BatchResult>, ApiError> {
    lock(&state)?.generate(&batch).map(Json).map_err(reject)
}

async fn commit_handler(State(state): State<SharedScheduler>) -> Result<Json<LedgerUpdate>, ApiError> {
    Ok(Json(lock(&state)?.commit()))
}

async fn reset_handler(State(state): State<SharedScheduler>) -> Result<Json<LedgerUpdate>, ApiError> {
    Ok(Json(lock(&state)?.reset()))
}

async fn info_handler(State(state): State<SharedScheduler>) -> Result<Json<LedgerInfo>, ApiError> {
    Ok(Json(lock(&state)?.info()))
}

async fn scoped_commit_handler(
    State(state): State<SharedScheduler>,
    Json(request): Json<ScopedCommitRequest>,
) -> Result<Json<LedgerUpdate>, ApiError> {
    lock(&state)?.commit_scoped(&request).map(Json).map_err(reject)
}

async fn scoped_reset_handler(
    State(state): State<SharedScheduler>,
    Json(scope): Json<UserScope>,
) -> Result<Json<LedgerUpdate>, ApiError> {
    Ok(Json(lock(&state)?.reset_scoped(&scope)))
}

async fn import_templates_handler(
    State(state): State<SharedScheduler>,
    Path(semester): Path<String>,
    Json(rows): Json<Vec<TemplateRow>>,
) -> Result<Json<usize>, ApiError> {
    lock(&state)?.import_templates(&semester, rows).map(Json).map_err(reject)
}

async fn import_rooms_handler(
    State(state): State<SharedScheduler>,
    Json(rooms): Json<Vec<Room>>,
) -> Result<Json<usize>, ApiError> {
    lock(&state)?.import_rooms(rooms).map(Json).map_err(reject)
}

pub fn router(state: SharedScheduler) -> Router {
    Router::new()
        .route("/v1/schedule/generate", post(generate_handler))
        .route("/v1/schedule/commit", post(commit_handler))
        .route("/v1/schedule/reset", post(reset_handler))
        .route("/v1/schedule/info", get(info_handler))
        .route("/v1/schedule/scoped/commit", post(scoped_commit_handler))
        .route("/v1/schedule/scoped/reset", post(scoped_reset_handler))
        .route("/v1/templates/:semester", put(import_templates_handler))
        .route("/v1/rooms", put(import_rooms_handler))
        .with_state(state)
}

pub async fn run_server(config: &ServiceConfig, scheduler: Scheduler) -> std::io::Result<()> {
    let app = router(Arc::new(Mutex::new(scheduler)));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::generator::DEFAULT_ITERATION_CAP;
    use crate::store::{FileLedgerStore, MemoryKvStore};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    fn app() -> (Router, TempDir) {
        let dir = tempdir().unwrap();
        let scheduler = Scheduler::new(
            Arc::new(MemoryCatalog::default()),
            Arc::new(FileLedgerStore::new(dir.path())),
            Arc::new(MemoryKvStore::default()),
            DEFAULT_ITERATION_CAP,
        );
        (router(Arc::new(Mutex::new(scheduler))), dir)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ));
        (status, value)
    }

    fn template_row(day: u8, session: u8) -> Value {
        let mut weeks = vec![true; 15];
        weeks.extend([false; 3]);
        json!({
            "totalPeriodsCategory": 30,
            "dayOfWeek": day,
            "session": session,
            "startPeriod": 1,
            "periodLength": 2,
            "weekActive": weeks,
            "rowId": format!("R{}{}", day, session),
        })
    }

    #[tokio::test]
    async fn generate_commit_and_info() {
        let (app, _dir) = app();

        let rows = json!([template_row(2, 1), template_row(2, 2), template_row(3, 1)]);
        let (status, body) = call(&app, "PUT", "/v1/templates/HK1", Some(rows)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(3));

        let rooms = json!([{ "code": "A101", "capacity": 60, "building": "A", "category": "general", "note": "" }]);
        let (status, _) = call(&app, "PUT", "/v1/rooms", Some(rooms)).await;
        assert_eq!(status, StatusCode::OK);

        let batch = json!({
            "semester": "HK1",
            "subjects": [{
                "subjectCode": "MATH1",
                "subjectName": "Calculus",
                "totalHours": 30,
                "classes": 2,
                "studentsPerClass": 50,
                "cohortYear": "2023"
            }]
        });
        let (status, body) = call(&app, "POST", "/v1/schedule/generate", Some(batch)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalRows"], json!(2));
        assert_eq!(body["sessionCursor"], json!(0));
        assert_eq!(body["subjects"][0]["rows"][0]["roomCode"], json!("A101"));
        assert_eq!(body["subjects"][0]["rows"][0]["weekActive"].as_array().unwrap().len(), 18);

        let (_, info) = call(&app, "GET", "/v1/schedule/info", None).await;
        assert_eq!(info["sessionOnly"], json!(2));
        assert_eq!(info["committed"], json!(0));

        let (status, update) = call(&app, "POST", "/v1/schedule/commit", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(update, json!({ "committed": 2, "cursor": 0, "persisted": true }));

        let (_, update) = call(&app, "POST", "/v1/schedule/reset", None).await;
        assert_eq!(update["cursor"], json!(-1));
    }

    #[tokio::test]
    async fn invalid_input_is_a_bad_request() {
        let (app, _dir) = app();

        let (status, body) = call(&app, "POST", "/v1/schedule/generate", Some(json!({ "semester": "HK1", "subjects": [] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!("Subject list is empty"));

        let mut short = template_row(2, 1);
        short["weekActive"] = json!([true, false]);
        let (status, _) = call(&app, "PUT", "/v1/templates/HK1", Some(json!([short]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn scoped_endpoints() {
        let (app, _dir) = app();
        let scope = json!({ "userId": "u1", "academicYear": "2024-2025", "semester": "1" });

        let (status, update) = call(&app, "POST", "/v1/schedule/scoped/commit", Some(json!({ "scope": scope, "cursor": 5 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(update["cursor"], json!(5));

        let (status, update) = call(&app, "POST", "/v1/schedule/scoped/reset", Some(scope)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(update["cursor"], json!(-1));
    }
}
