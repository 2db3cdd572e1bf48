//! HTTP management interface for the record table.

use std::io;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;

use crate::querylog::{QueryEvent, QueryFilter, QueryLog};
use crate::record::{RecordType, RecordValue};
use crate::stats::{Stats, StatsSnapshot};
use crate::store::{RecordStore, RecordsView};
use crate::synth;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<RecordStore>,
    pub stats: Arc<Stats>,
    pub query_log: Arc<QueryLog>,
}

/// One entry of the record table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEntry {
    #[serde(rename = "type")]
    pub rtype: RecordType,
    pub domain: String,
    pub value: RecordValue,
}

/// Identifies an entry to delete. Any `value` sent along is ignored.
#[derive(Debug, Deserialize)]
pub struct RecordKey {
    #[serde(rename = "type")]
    pub rtype: RecordType,
    pub domain: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    #[serde(rename = "type")]
    pub qtype: Option<String>,
    pub name: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(get_records).put(put_record).delete(delete_record))
        .route("/logs", get(get_logs))
        .route("/stats", get(get_stats))
        .with_state(state)
}

/// Serve the management API on an already bound listener.
pub async fn serve(listener: TcpListener, state: ApiState) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "management API listening");
    axum::serve(listener, router(state)).await
}

async fn get_records(State(state): State<ApiState>) -> Json<RecordsView> {
    Json(state.store.view())
}

async fn put_record(
    State(state): State<ApiState>,
    Json(entry): Json<RecordEntry>,
) -> Result<Json<RecordEntry>, (StatusCode, String)> {
    if let RecordValue::Literal(literal) = &entry.value {
        synth::encode(entry.rtype, literal)
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid {} value: {e}", entry.rtype)))?;
    }

    state
        .store
        .insert(entry.rtype, &entry.domain, entry.value.clone());
    info!(rtype = %entry.rtype, domain = %entry.domain, record = %entry.value, "record updated");

    Ok(Json(entry))
}

async fn delete_record(
    State(state): State<ApiState>,
    Json(key): Json<RecordKey>,
) -> Result<StatusCode, (StatusCode, String)> {
    match state.store.remove(key.rtype, &key.domain) {
        Some(_) => {
            info!(rtype = %key.rtype, domain = %key.domain, "record deleted");
            Ok(StatusCode::OK)
        }
        None => Err((
            StatusCode::NOT_FOUND,
            format!("no {} record for {}", key.rtype, key.domain),
        )),
    }
}

async fn get_logs(State(state): State<ApiState>, Query(params): Query<LogsQuery>) -> Json<Vec<QueryEvent>> {
    let filter = QueryFilter {
        qtype: params.qtype,
        name: params.name,
    };
    Json(state.query_log.query(&filter))
}

async fn get_stats(State(state): State<ApiState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}
