use crate::data::{
    Allocation, AllocationId, LecturerId, PlanRequest, PlanSlot, TermId, TermPlan, Venue,
};
use crate::error::{PlanError, ServiceError, StoreError};
use crate::service::SchedulingService;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use serde_json::{Value, json};

type Rejection = (StatusCode, String);

fn reject(e: ServiceError) -> Rejection {
    let status = match &e {
        ServiceError::Plan(PlanError::Infeasible { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

// planning and SQLite calls block, keep them off the async workers
async fn blocking<T, F>(f: F) -> Result<T, Rejection>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Worker(e.to_string()))
        .and_then(|result| result)
        .map_err(reject)
}

async fn solve_handler(
    State(app): State<SchedulingService>,
    Json(input): Json<PlanRequest>,
) -> Result<Json<TermPlan>, Rejection> {
    let planner = app.planner().clone();
    blocking(move || Ok(planner.build_term_plan(&input.allocations, &input.venues)?))
        .await
        .map(Json)
}

async fn put_venues_handler(
    State(app): State<SchedulingService>,
    Json(venues): Json<Vec<Venue>>,
) -> Result<Json<Value>, Rejection> {
    blocking(move || Ok(app.store().upsert_venues(&venues)?))
        .await
        .map(|stored| Json(json!({ "stored": stored })))
}

async fn put_allocations_handler(
    State(app): State<SchedulingService>,
    Path(term_id): Path<TermId>,
    Json(allocations): Json<Vec<Allocation>>,
) -> Result<Json<Value>, Rejection> {
    blocking(move || Ok(app.store().upsert_allocations(term_id, &allocations)?))
        .await
        .map(|stored| Json(json!({ "termId": term_id, "stored": stored })))
}

async fn venues_handler(State(app): State<SchedulingService>) -> Result<Json<Vec<Venue>>, Rejection> {
    blocking(move || Ok(app.store().venues()?)).await.map(Json)
}

async fn allocations_handler(
    State(app): State<SchedulingService>,
    Path(term_id): Path<TermId>,
) -> Result<Json<Vec<Allocation>>, Rejection> {
    blocking(move || Ok(app.store().term_allocations(term_id)?))
        .await
        .map(Json)
}

async fn rebuild_handler(
    State(app): State<SchedulingService>,
    Path(term_id): Path<TermId>,
) -> Result<Json<TermPlan>, Rejection> {
    blocking(move || app.rebuild_term_slots(term_id)).await.map(Json)
}

async fn allocate_handler(
    State(app): State<SchedulingService>,
    Path(allocation_id): Path<AllocationId>,
) -> Result<Json<TermPlan>, Rejection> {
    blocking(move || app.allocate_slot(allocation_id)).await.map(Json)
}

async fn term_slots_handler(
    State(app): State<SchedulingService>,
    Path(term_id): Path<TermId>,
) -> Result<Json<Vec<PlanSlot>>, Rejection> {
    blocking(move || Ok(app.store().term_slots(term_id)?)).await.map(Json)
}

async fn lecturer_slots_handler(
    State(app): State<SchedulingService>,
    Path(lecturer_id): Path<LecturerId>,
) -> Result<Json<Vec<PlanSlot>>, Rejection> {
    blocking(move || Ok(app.store().lecturer_slots(&lecturer_id)?))
        .await
        .map(Json)
}

pub fn router(service: SchedulingService) -> Router {
    Router::new()
        .route("/v1/plan/solve", post(solve_handler))
        .route("/v1/venues", get(venues_handler).put(put_venues_handler))
        .route(
            "/v1/terms/:term_id/allocations",
            get(allocations_handler).put(put_allocations_handler),
        )
        .route("/v1/terms/:term_id/rebuild", post(rebuild_handler))
        .route("/v1/terms/:term_id/slots", get(term_slots_handler))
        .route("/v1/allocations/:allocation_id/allocate", post(allocate_handler))
        .route("/v1/lecturers/:lecturer_id/slots", get(lecturer_slots_handler))
        .with_state(service)
}

pub async fn run_server(bind: &str, service: SchedulingService) -> std::io::Result<()> {
    let app = router(service);
    let listener = tokio::net::TcpListener::bind(bind).await?;

    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await
}
