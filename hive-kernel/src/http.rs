/**
 * API DE REPORTING - Lecture seule pour les collaborateurs (PDF, notifications)
 *
 * ROUTES :
 * - GET /health                          -> "ok" (sans clé)
 * - GET /system/health                   -> état transport + compteurs pipeline
 * - GET /units                           -> dernières lectures + état pompe de chaque ruche
 * - GET /units/{id}                      -> idem pour une ruche
 * - GET /units/{id}/activations?from&to  -> historique du journal (RFC3339)
 *
 * SÉCURITÉ :
 * Header x-api-key = HIVE_API_KEY sur toutes les routes sauf /health.
 */

use crate::health::{ControllerHealth, HealthTracker};
use crate::ledger::{ActivationLedger, TimeRange};
use crate::models::{ActivationRecord, UnitSnapshot};
use crate::state::SharedBoard;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub board: SharedBoard,
    pub ledger: Arc<dyn ActivationLedger>,
    pub health: HealthTracker,
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActivationsView {
    pub unit_id: String,
    pub count: usize,
    pub total_duration_seconds: f64,
    pub activations: Vec<ActivationRecord>,
}

fn parse_bound(raw: Option<&str>) -> Result<Option<OffsetDateTime>, StatusCode> {
    raw.map(|s| OffsetDateTime::parse(s, &Rfc3339).map_err(|_| StatusCode::BAD_REQUEST))
        .transpose()
}

impl RangeParams {
    pub fn to_range(&self) -> Result<TimeRange, StatusCode> {
        Ok(TimeRange {
            from: parse_bound(self.from.as_deref())?,
            to: parse_bound(self.to.as_deref())?,
        })
    }
}

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    if req.uri().path().starts_with("/health") {
        return Ok(next.run(req).await);
    }

    let expected = std::env::var("HIVE_API_KEY").unwrap_or_default();
    if expected.is_empty() {
        warn!("HIVE_API_KEY not set - API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/units", get(get_units))
        .route("/units/{id}", get(get_unit))
        .route("/units/{id}/activations", get(get_activations))
        .with_state(app_state)
        .layer(middleware::from_fn(require_api_key))
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<ControllerHealth> {
    let units = app.board.lock().len();
    Json(app.health.get_health(units))
}

// GET /units
async fn get_units(State(app): State<AppState>) -> Json<Vec<UnitSnapshot>> {
    let mut list: Vec<UnitSnapshot> = app.board.lock().values().cloned().collect();
    list.sort_by(|a, b| a.unit_id.cmp(&b.unit_id));
    Json(list)
}

// GET /units/{id}
async fn get_unit(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UnitSnapshot>, StatusCode> {
    let board = app.board.lock();
    let Some(snap) = board.get(&id) else {
        return Err(StatusCode::NOT_FOUND);
    };
    Ok(Json(snap.clone()))
}

// GET /units/{id}/activations
async fn get_activations(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Json<ActivationsView>, StatusCode> {
    if !app.board.lock().contains_key(&id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let range = params.to_range()?;

    let ledger = app.ledger.clone();
    let unit_id = id.clone();
    let history = tokio::task::spawn_blocking(move || ledger.list_activations(&unit_id, range))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|e| {
            error!(unit = %id, "list activations failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(ActivationsView {
        unit_id: id,
        count: history.len(),
        total_duration_seconds: history.total_duration_seconds(),
        activations: history.into_iter().collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::models::{PumpState, UnitBoard};
    use crate::state::{new_state, post_snapshot};
    use time::macros::datetime;

    fn app_with_unit(unit_id: &str) -> (AppState, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new());
        let board = new_state(UnitBoard::new());
        post_snapshot(
            &board,
            UnitSnapshot {
                unit_id: unit_id.into(),
                pump: PumpState::On,
                ..UnitSnapshot::default()
            },
        );
        let app = AppState {
            board,
            ledger: ledger.clone(),
            health: HealthTracker::new(),
        };
        (app, ledger)
    }

    #[test]
    fn range_params_parse_rfc3339() {
        let params = RangeParams {
            from: Some("2025-06-01T00:00:00Z".into()),
            to: None,
        };
        let range = params.to_range().unwrap();
        assert_eq!(range.from, Some(datetime!(2025-06-01 00:00 UTC)));
        assert_eq!(range.to, None);
    }

    #[test]
    fn bad_bound_is_bad_request() {
        let params = RangeParams {
            from: Some("yesterday".into()),
            to: None,
        };
        assert_eq!(params.to_range().unwrap_err(), StatusCode::BAD_REQUEST);
        assert_eq!(RangeParams::default().to_range().unwrap(), TimeRange::all());
    }

    #[tokio::test]
    async fn unknown_unit_is_not_found() {
        let (app, _) = app_with_unit("1");
        assert!(get_unit(State(app.clone()), Path("1".into())).await.is_ok());
        let err = get_unit(State(app.clone()), Path("2".into())).await.unwrap_err();
        assert_eq!(err, StatusCode::NOT_FOUND);
        let err = get_activations(State(app), Path("2".into()), Query(RangeParams::default()))
            .await
            .unwrap_err();
        assert_eq!(err, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn activations_view_is_filtered_by_range() {
        let (app, ledger) = app_with_unit("1");
        ledger.open_activation("1", datetime!(2025-06-01 08:00 UTC), 25.0, 80.0).unwrap();
        ledger.close_open_activation("1", datetime!(2025-06-01 08:10 UTC)).unwrap();
        ledger.open_activation("1", datetime!(2025-06-02 08:00 UTC), 39.0, 80.0).unwrap();

        let params = RangeParams {
            from: None,
            to: Some("2025-06-02T00:00:00Z".into()),
        };
        let Json(view) = get_activations(State(app.clone()), Path("1".into()), Query(params))
            .await
            .unwrap();
        assert_eq!(view.count, 1);
        assert_eq!(view.total_duration_seconds, 600.0);

        let Json(all) = get_activations(State(app), Path("1".into()), Query(RangeParams::default()))
            .await
            .unwrap();
        assert_eq!(all.count, 2);
        assert!(all.activations[1].is_open());
    }

    #[tokio::test]
    async fn units_are_listed_in_id_order() {
        let (app, _) = app_with_unit("2");
        post_snapshot(
            &app.board,
            UnitSnapshot {
                unit_id: "1".into(),
                ..UnitSnapshot::default()
            },
        );
        let Json(list) = get_units(State(app.clone())).await;
        let ids: Vec<&str> = list.iter().map(|s| s.unit_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);

        let Json(health) = get_system_health(State(app)).await;
        assert_eq!(health.units_tracked, 2);
    }
}
