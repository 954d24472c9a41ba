//! Webhook HTTP surface.
//!
//! | route                                           | handler      |
//! |-------------------------------------------------|--------------|
//! | `GET  /ifttt/v1/status`                         | [`status`]   |
//! | `POST /ifttt/v1/test/setup`                     | [`test_setup`] |
//! | `POST /ifttt/v1/triggers/contract_incremented_event` | [`trigger`] |
//! | `POST /ifttt/v1/queries/contract_increment_balance`  | [`query`]   |
//! | `POST /ifttt/v1/actions/invoke_contract_increment`   | [`action`]  |
//!
//! Every route requires the `IFTTT-Service-Key` header to equal the
//! configured service key.

pub mod envelope;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::config::{ConfigError, RelayConfig};
use crate::relay::events::{EventRecord, EventStore};
use crate::relay::network::NetworkRegistry;
use crate::relay::workflow::{InvocationWorkflow, RetrievalWorkflow, TaskSupervisor};

use self::envelope::{
    ActionRequest, ActionResult, ApiError, DataResponse, QueryRequest, QueryResponse,
    TriggerRequest, SERVICE_KEY_HEADER,
};

// =============================================================================
// State
// =============================================================================

#[derive(Clone)]
pub struct AppState {
    invocation: Arc<InvocationWorkflow>,
    retrieval: Arc<RetrievalWorkflow>,
    store: Arc<EventStore>,
    service_key: Arc<str>,
    test_contract_id: Arc<str>,
    test_network: Arc<str>,
}

impl AppState {
    /// Wire the workflows over `networks` with the tuning from `config`.
    pub fn new(networks: NetworkRegistry, config: &RelayConfig) -> Self {
        let networks = Arc::new(networks);
        let store = Arc::new(EventStore::with_capacity(config.event_log_capacity));
        let invocation = InvocationWorkflow::new(
            networks.clone(),
            store.clone(),
            config.settlement.clone(),
            TaskSupervisor::new(),
        );
        let retrieval = RetrievalWorkflow::new(networks, store.clone());

        Self {
            invocation: Arc::new(invocation),
            retrieval: Arc::new(retrieval),
            store,
            service_key: Arc::from(config.service_key.as_str()),
            test_contract_id: Arc::from(config.test_contract_id.as_str()),
            test_network: Arc::from(config.test_network.as_str()),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        let networks = config.build_registry()?;
        if networks.is_empty() {
            tracing::warn!("no networks configured, every action will be rejected");
        } else {
            tracing::info!(networks = ?networks.names(), "networks ready");
        }
        if !config.is_network_configured(&config.test_network) {
            tracing::warn!(
                test_network = %config.test_network,
                "test network is not configured, endpoint test actions will be rejected"
            );
        }
        if config.service_key.is_empty() {
            tracing::warn!("IFTTT_SERVICE_KEY is empty, every request will be rejected");
        }
        Ok(Self::new(networks, config))
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        self.invocation.supervisor()
    }
}

// =============================================================================
// Router
// =============================================================================

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ifttt/v1/status", get(status))
        .route("/ifttt/v1/test/setup", post(test_setup))
        .route("/ifttt/v1/triggers/contract_incremented_event", post(trigger))
        .route("/ifttt/v1/queries/contract_increment_balance", post(query))
        .route("/ifttt/v1/actions/invoke_contract_increment", post(action))
        .route_layer(from_fn_with_state(state.clone(), require_service_key))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_service_key(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let authorized = !state.service_key.is_empty()
        && req
            .headers()
            .get(SERVICE_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|key| key == &*state.service_key);

    if !authorized {
        tracing::debug!(path = %req.uri().path(), "rejected service key");
        return ApiError::unauthorized().into_response();
    }
    next.run(req).await
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn status() -> StatusCode {
    StatusCode::OK
}

pub async fn test_setup(State(state): State<AppState>) -> Json<Value> {
    Json(setup_samples(&state.test_network, &state.test_contract_id))
}

fn setup_samples(network: &str, contract_id: &str) -> Value {
    let action = json!({
        "network": network,
        "contract_id": contract_id,
        "increment_amount": "5"
    });
    json!({
        "data": {
            "samples": {
                "actionRecordSkipping": { "invoke_contract_increment": action },
                "actions": { "invoke_contract_increment": action },
                "triggers": {
                    "contract_incremented_event": {
                        "network": network,
                        "contract_id": contract_id
                    }
                }
            }
        }
    })
}

pub async fn trigger(
    State(state): State<AppState>,
    payload: Result<Json<TriggerRequest>, JsonRejection>,
) -> Result<Json<DataResponse<Vec<EventRecord>>>, ApiError> {
    let Json(req) = payload?;
    let fields = req.trigger_fields;
    tracing::info!(network = %fields.network, contract_id = %fields.contract_id, "trigger requested");

    let data = state
        .retrieval
        .trigger(&fields.network, &fields.contract_id, req.limit)
        .inspect_err(|e| tracing::warn!(error = %e, "trigger rejected"))?;
    Ok(Json(DataResponse { data }))
}

pub async fn query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(req) = payload?;
    let fields = req.query_fields;
    tracing::info!(network = %fields.network, contract_id = %fields.contract_id, "query requested");

    let page = state
        .retrieval
        .query(
            &fields.network,
            &fields.contract_id,
            req.limit,
            req.cursor.as_deref(),
        )
        .inspect_err(|e| tracing::warn!(error = %e, "query rejected"))?;
    Ok(Json(QueryResponse {
        data: page.records,
        cursor: page.cursor,
    }))
}

pub async fn action(
    State(state): State<AppState>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Json<DataResponse<Vec<ActionResult>>>, ApiError> {
    let Json(req) = payload?;
    tracing::info!(
        network = %req.action_fields.network,
        contract_id = %req.action_fields.contract_id,
        "action received"
    );

    // The settlement handle is dropped; the background task keeps running.
    let ack = state
        .invocation
        .invoke(req.into())
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "action rejected"))?;
    Ok(Json(DataResponse {
        data: vec![ActionResult { id: ack.id }],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;

    #[tokio::test]
    async fn from_config_without_networks_starts_empty() {
        let config = RelayConfig {
            test_network: "futurenet".to_string(),
            ..RelayConfig::default()
        };
        assert!(!config.is_network_configured(&config.test_network));

        let state = AppState::from_config(&config).unwrap();
        assert!(state.store().is_empty());
        assert_eq!(&*state.test_network, "futurenet");
    }

    #[tokio::test]
    async fn from_config_rejects_bad_source_key() {
        let config = RelayConfig {
            networks: vec![NetworkConfig {
                name: "standalone".to_string(),
                rpc_url: "http://localhost:8000/soroban/rpc".to_string(),
                source_key: "not-a-seed".to_string(),
                network_passphrase: "Standalone Network ; February 2017".to_string(),
            }],
            ..RelayConfig::default()
        };
        assert!(matches!(
            AppState::from_config(&config),
            Err(ConfigError::InvalidSourceKey { network }) if network == "standalone"
        ));
    }

    #[test]
    fn samples_use_configured_values() {
        let body = setup_samples("futurenet", "00ff");
        let samples = &body["data"]["samples"];
        assert_eq!(
            samples["actions"]["invoke_contract_increment"]["network"],
            "futurenet"
        );
        assert_eq!(
            samples["actionRecordSkipping"]["invoke_contract_increment"]["increment_amount"],
            "5"
        );
        assert_eq!(
            samples["triggers"]["contract_incremented_event"]["contract_id"],
            "00ff"
        );
    }
}
