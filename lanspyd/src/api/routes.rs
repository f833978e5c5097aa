use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use crate::config::Config;
use crate::registry::store::Observation;
use crate::registry_manager::RegistryHandle;
use shared::protocol::API_PREFIX;
use shared::types::{Client, Device, Entity, EntityKind, NetworkService, Snapshot, Status};

#[derive(Clone)]
pub struct AppState {
    pub registry: RegistryHandle,
    pub hash_rx: watch::Receiver<String>,
    pub config: Arc<Config>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub group: Ipv4Addr,
    pub port: u16,
    pub sending_period_ms: u64,
    pub delayed_check_ms: u64,
    pub sweep_interval_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<Status>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/config", get(get_config))
        .route("/clients", get(get_clients))
        .route("/network-services", get(get_network_services))
        .route("/devices", get(get_devices))
        .route("/devices/:key", get(get_device))
        .route("/snapshot", get(get_snapshot))
        .route("/snapshot/hash", get(get_hash));

    Router::new().nest(API_PREFIX, api).with_state(state)
}

async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let config = &state.config;
    Json(ConfigResponse {
        group: config.discovery.group,
        port: config.discovery.port,
        sending_period_ms: config.discovery.sending_period_ms,
        delayed_check_ms: config.scanner.delayed_check_ms,
        sweep_interval_ms: config.liveness.sweep_interval_ms,
    })
}

async fn snapshot(state: &AppState) -> Result<Snapshot, StatusCode> {
    state.registry.snapshot().await.map_err(|e| {
        tracing::error!("Failed to read registry snapshot: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn filter_status<T: Entity>(entries: BTreeMap<String, T>, status: Option<Status>) -> BTreeMap<String, T> {
    match status {
        Some(status) => entries
            .into_iter()
            .filter(|(_, e)| e.status() == status)
            .collect(),
        None => entries,
    }
}

async fn get_clients(
    State(state): State<AppState>,
    Query(params): Query<StatusQuery>,
) -> Result<Json<BTreeMap<String, Client>>, StatusCode> {
    let snapshot = snapshot(&state).await?;
    Ok(Json(filter_status(snapshot.clients, params.status)))
}

async fn get_network_services(
    State(state): State<AppState>,
    Query(params): Query<StatusQuery>,
) -> Result<Json<BTreeMap<String, NetworkService>>, StatusCode> {
    let snapshot = snapshot(&state).await?;
    Ok(Json(filter_status(snapshot.network_services, params.status)))
}

async fn get_devices(
    State(state): State<AppState>,
    Query(params): Query<StatusQuery>,
) -> Result<Json<BTreeMap<String, Device>>, StatusCode> {
    let snapshot = snapshot(&state).await?;
    Ok(Json(filter_status(snapshot.devices, params.status)))
}

async fn get_device(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Device>, StatusCode> {
    let found = state
        .registry
        .get(EntityKind::Device, key)
        .await
        .map_err(|e| {
            tracing::error!("Failed to query device: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    match found {
        Some(Observation::Device(device)) => Ok(Json(device)),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn get_snapshot(State(state): State<AppState>) -> Result<Json<Snapshot>, StatusCode> {
    snapshot(&state).await.map(Json)
}

async fn get_hash(State(state): State<AppState>) -> String {
    state.hash_rx.borrow().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::hash;
    use crate::registry::store::Store;

    async fn test_state() -> AppState {
        let (hash_tx, hash_rx) = watch::channel(hash::compute_hash(&Snapshot::default()));
        let registry = RegistryHandle::spawn(Store::new(), hash_tx);

        for name in ["Alice", "Bob"] {
            let device = Device::new(
                name.to_string(),
                "192.168.1.7:5000".to_string(),
                "08-00-27-DC-4A-9E".to_string(),
            );
            registry.upsert(Observation::Device(device)).await.unwrap();
        }

        AppState {
            registry,
            hash_rx,
            config: Arc::new(Config::default()),
        }
    }

    #[tokio::test]
    async fn test_get_devices_filters_by_status() {
        let state = test_state().await;
        state
            .registry
            .for_each_entity(|_, _, e| {
                if e.name() == "Bob" {
                    crate::registry::store::EntityAction::SetStatus(Status::Gone)
                } else {
                    crate::registry::store::EntityAction::Keep
                }
            })
            .await
            .unwrap();

        let Json(all) = get_devices(State(state.clone()), Query(StatusQuery::default()))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let Json(gone) = get_devices(
            State(state.clone()),
            Query(StatusQuery { status: Some(Status::Gone) }),
        )
        .await
        .unwrap();
        assert_eq!(gone.len(), 1);
        assert!(gone.contains_key("Bob\n08-00-27-DC-4A-9E"));
    }

    #[tokio::test]
    async fn test_get_device_not_found() {
        let state = test_state().await;

        let found = get_device(State(state.clone()), Path("Alice\n08-00-27-DC-4A-9E".to_string())).await;
        assert_eq!(found.unwrap().0.name, "Alice");

        let missing = get_device(State(state), Path("Carol".to_string())).await;
        assert_eq!(missing.unwrap_err(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_hash_tracks_registry() {
        let state = test_state().await;
        let empty = hash::compute_hash(&Snapshot::default());

        let current = get_hash(State(state.clone())).await;
        assert_ne!(current, empty);

        let Json(snapshot) = get_snapshot(State(state)).await.unwrap();
        assert_eq!(current, hash::compute_hash(&snapshot));
    }

    #[tokio::test]
    async fn test_get_config_defaults() {
        let state = test_state().await;
        let Json(config) = get_config(State(state)).await;
        assert_eq!(config.group, Ipv4Addr::new(228, 5, 6, 7));
        assert_eq!(config.port, 5000);
        assert_eq!(config.delayed_check_ms, 5000);
    }

    async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", path);
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_routes_served_under_prefix() {
        let state = test_state().await;
        let expected_hash = state.hash_rx.borrow().clone();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        let hash = http_get(addr, &format!("{}/snapshot/hash", API_PREFIX)).await;
        assert!(hash.starts_with("HTTP/1.1 200"), "{}", hash);
        assert!(hash.ends_with(&expected_hash));

        let device = http_get(addr, "/v1/devices/Alice%0A08-00-27-DC-4A-9E").await;
        assert!(device.starts_with("HTTP/1.1 200"), "{}", device);
        assert!(device.contains("\"name\":\"Alice\""));

        let unprefixed = http_get(addr, "/snapshot/hash").await;
        assert!(unprefixed.starts_with("HTTP/1.1 404"), "{}", unprefixed);
    }
}
