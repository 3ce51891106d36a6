//! REST endpoints

use crate::error::ApiError;
use crate::types::*;
use crate::ApiState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use takwire_cot::{encode, validate_coordinates, Event, Marker};
use takwire_fanout::{Channel, ConnectionHealth, FanoutStats, Message, MessageKind};
use takwire_geofence::{AlertKind, Zone};
use tracing::{info, warn};

pub fn create_rest_router(state: ApiState) -> Router {
    let metrics_path = state.metrics_path.clone();

    Router::new()
        .route("/health", get(health_check))
        // Fan-out
        .route("/api/v1/fanout/stats", get(fanout_stats))
        .route("/api/v1/fanout/connections/{id}", get(connection_health))
        .route("/api/v1/fanout/publish", post(publish_message))
        // Geofences
        .route("/api/v1/geofences", get(list_zones).post(create_zone))
        .route("/api/v1/geofences/check", post(check_position))
        .route(
            "/api/v1/geofences/{id}",
            get(get_zone).put(update_zone).delete(delete_zone),
        )
        // Markers
        .route("/api/v1/markers", post(send_marker))
        .route("/api/v1/markers/delete", post(delete_marker))
        .route(&metrics_path, get(get_metrics))
        .with_state(state)
}

// ============================================================================
// System
// ============================================================================

/// GET /health
async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        connections: state.registry.connection_count(),
        zones: state.geofence.zone_count(),
        timestamp: Utc::now(),
    })
}

/// GET /metrics - Prometheus text exposition
async fn get_metrics(State(state): State<ApiState>) -> Result<String, ApiError> {
    state
        .prometheus
        .as_ref()
        .map(|handle| handle.render())
        .ok_or_else(|| ApiError::Unavailable("Metrics recorder not installed".to_string()))
}

// ============================================================================
// Fan-out
// ============================================================================

async fn fanout_stats(State(state): State<ApiState>) -> Json<FanoutStats> {
    Json(state.registry.stats())
}

async fn connection_health(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ConnectionHealth>, ApiError> {
    state
        .registry
        .connection_health(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Connection {} not found", id)))
}

/// POST /api/v1/fanout/publish - queue a message for a channel
async fn publish_message(
    State(state): State<ApiState>,
    Json(request): Json<PublishRequest>,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    let message = Message::new(request.kind, request.data);
    if !state.publisher.publish(request.channel, message).await {
        return Err(ApiError::Unavailable("Fan-out queue is full".to_string()));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishResponse {
            queued: true,
            channel: request.channel,
        }),
    ))
}

// ============================================================================
// Geofences
// ============================================================================

async fn list_zones(
    State(state): State<ApiState>,
    Query(query): Query<ZoneListQuery>,
) -> Json<ZoneList> {
    let zones = state.geofence.zones(query.enabled_only);
    Json(ZoneList {
        total: zones.len(),
        zones,
    })
}

async fn get_zone(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Zone>, ApiError> {
    state
        .geofence
        .zone(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Zone {} not found", id)))
}

/// POST /api/v1/geofences - create a zone; the id must be new
async fn create_zone(
    State(state): State<ApiState>,
    Json(zone): Json<Zone>,
) -> Result<(StatusCode, Json<Zone>), ApiError> {
    if state.geofence.zone(&zone.id).is_some() {
        return Err(ApiError::Conflict(format!("Zone {} already exists", zone.id)));
    }

    state.geofence.upsert_zone(zone.clone())?;
    persist_zone(&state, &zone).await;
    info!(zone_id = %zone.id, kind = %zone.kind, "Zone created");

    Ok((StatusCode::CREATED, Json(zone)))
}

/// PUT /api/v1/geofences/{id} - replace a zone; the path id wins over the body
async fn update_zone(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(mut zone): Json<Zone>,
) -> Result<Json<Zone>, ApiError> {
    zone.id = id;
    let previous = state.geofence.upsert_zone(zone.clone())?;
    persist_zone(&state, &zone).await;
    info!(zone_id = %zone.id, replaced = previous.is_some(), "Zone updated");

    Ok(Json(zone))
}

async fn delete_zone(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Zone>, ApiError> {
    let removed = state.geofence.remove_zone(&id)?;

    if let Some(store) = &state.zone_store {
        if let Err(e) = store.delete(&id).await {
            warn!(zone_id = %id, error = %e, "Failed to delete zone from store");
        }
    }
    info!(zone_id = %id, "Zone deleted");

    Ok(Json(removed))
}

/// POST /api/v1/geofences/check - evaluate one position and publish any alerts
async fn check_position(
    State(state): State<ApiState>,
    Json(request): Json<CheckPositionRequest>,
) -> Result<Json<CheckPositionResponse>, ApiError> {
    validate_coordinates(request.lat, request.lon)?;

    let alerts = state
        .geofence
        .check_position(&request.entity_id, request.lat, request.lon);
    let zones = state.geofence.zones_containing(request.lat, request.lon);

    for alert in &alerts {
        let kind = match alert.kind {
            AlertKind::Entry => MessageKind::GeofenceEntry,
            AlertKind::Exit => MessageKind::GeofenceExit,
        };
        state
            .publisher
            .publish(Channel::Alerts, Message::from_payload(kind, alert))
            .await;
    }

    Ok(Json(CheckPositionResponse { alerts, zones }))
}

async fn persist_zone(state: &ApiState, zone: &Zone) {
    if let Some(store) = &state.zone_store {
        if let Err(e) = store.save(zone).await {
            warn!(zone_id = %zone.id, error = %e, "Failed to persist zone");
        }
    }
}

// ============================================================================
// Markers
// ============================================================================

/// POST /api/v1/markers - encode a marker, push it to stream clients and
/// publish it on the markers channel
async fn send_marker(
    State(state): State<ApiState>,
    Json(mut marker): Json<Marker>,
) -> Result<(StatusCode, Json<MarkerResponse>), ApiError> {
    let now = Utc::now();
    let stale_after = chrono::Duration::from_std(state.codec.stale_after())
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let event = Event::from_marker(&marker, now, stale_after)?;
    marker.timestamp.get_or_insert(now);

    let xml = encode(&event);
    let clients_reached = push_outbound(&state, &xml).await;
    let published = state
        .publisher
        .publish(
            Channel::Markers,
            Message::from_payload(MessageKind::MarkerUpdated, &marker),
        )
        .await;

    info!(uid = %event.uid, cot_type = %event.event_type, clients_reached, "Marker sent");

    Ok((
        StatusCode::CREATED,
        Json(MarkerResponse {
            marker,
            xml,
            clients_reached,
            published,
        }),
    ))
}

/// POST /api/v1/markers/delete - push a tombstone so clients drop the marker
async fn delete_marker(
    State(state): State<ApiState>,
    Json(marker): Json<Marker>,
) -> Result<Json<MarkerResponse>, ApiError> {
    let event = marker.tombstone_event(Utc::now())?;
    let xml = encode(&event);
    let clients_reached = push_outbound(&state, &xml).await;
    let published = state
        .publisher
        .publish(
            Channel::Markers,
            Message::new(MessageKind::MarkerDeleted, json!({ "id": marker.id })),
        )
        .await;

    info!(uid = %event.uid, clients_reached, "Marker deleted");

    Ok(Json(MarkerResponse {
        marker,
        xml,
        clients_reached,
        published,
    }))
}

async fn push_outbound(state: &ApiState, xml: &str) -> usize {
    match &state.outbound {
        Some(outbound) => outbound.push(Arc::from(xml)).await,
        None => 0,
    }
}
