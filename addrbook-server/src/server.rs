use crate::api_error::{ApiError, FieldError};
use crate::config::Config;
use addrbook_core::{
    AddressBook, CreateEntryOutcome, DeleteEntryOutcome, Phone, PhoneValidator, ReadEntryOutcome,
    Result, UpdateEntryOutcome,
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub struct ServerState {
    pub address_book: Arc<dyn AddressBook>,
    pub phone_validator: PhoneValidator,
}

#[derive(Debug, Deserialize)]
struct CreateEntryRequest {
    phone: String,
    address: String,
}

#[derive(Debug, Deserialize)]
struct UpdateEntryRequest {
    address: String,
}

#[derive(Debug, Serialize)]
struct EntryResponse {
    phone: Phone,
    address: String,
}

pub async fn run_server(config: Config) -> Result<()> {
    let phone_validator = config.phone_validator()?;

    // The store must be reachable before the listener accepts traffic.
    let address_book = config.store_builder().build().await?;

    tracing::info!(
        "Environment: {}, store backend: {}",
        config.env,
        address_book.backend_name()
    );

    let state = Arc::new(ServerState {
        address_book: address_book.clone(),
        phone_validator,
    });

    let app = build_router(state, &config.server.root_path);
    let served = serve(&config, app).await;

    address_book.close().await;
    served
}

async fn serve(config: &Config, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    tracing::info!(
        "Server listening on {}{}",
        config.server.bind_addr,
        config.server.root_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

pub fn build_router(state: Arc<ServerState>, root_path: &str) -> Router {
    let api = Router::new()
        .route("/v1/health/", get(check_health))
        .route("/v1/health", get(check_health))
        .route("/v1/", post(create_entry))
        .route(
            "/v1/:phone",
            get(read_entry).patch(update_entry).delete(delete_entry),
        )
        .with_state(state);

    let app = if root_path.is_empty() {
        api
    } else {
        Router::new().nest(root_path, api)
    };

    app.layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", error);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("Failed to listen for SIGTERM: {}", error);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}

fn validate_path_phone(state: &ServerState, raw: &str) -> std::result::Result<Phone, FieldError> {
    state
        .phone_validator
        .validate(raw)
        .map_err(|error| FieldError::phone("path", error))
}

/// Decodes a JSON request body. A request without `Content-Type` is read as
/// JSON; any other declared media type must be `application/json` or
/// `application/*+json`.
fn decode_json_body<T: DeserializeOwned>(
    headers: &HeaderMap,
    body: &Bytes,
) -> std::result::Result<T, FieldError> {
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        let essence = content_type
            .to_str()
            .unwrap_or_default()
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        let is_json = match essence.strip_prefix("application/") {
            Some(subtype) => subtype == "json" || subtype.ends_with("+json"),
            None => false,
        };
        if !is_json {
            return Err(FieldError::body(
                "Expected request with `Content-Type: application/json`",
            ));
        }
    }

    serde_json::from_slice(body).map_err(|error| FieldError::body(error.to_string()))
}

async fn check_health(State(state): State<Arc<ServerState>>) -> StatusCode {
    if state.address_book.is_alive().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn create_entry(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<(StatusCode, Json<EntryResponse>), ApiError> {
    let request: CreateEntryRequest = decode_json_body(&headers, &body)?;
    let phone = state
        .phone_validator
        .validate(&request.phone)
        .map_err(|error| FieldError::phone("body", error))?;

    match state.address_book.create(&phone, &request.address).await? {
        CreateEntryOutcome::Created(address) => {
            tracing::debug!("Created address entry for {}", phone);
            Ok((StatusCode::CREATED, Json(EntryResponse { phone, address })))
        }
        CreateEntryOutcome::AlreadyExists => Err(ApiError::AlreadyExists),
    }
}

async fn read_entry(
    State(state): State<Arc<ServerState>>,
    Path(raw_phone): Path<String>,
) -> std::result::Result<Json<EntryResponse>, ApiError> {
    let phone = validate_path_phone(&state, &raw_phone)?;

    match state.address_book.get(&phone).await? {
        ReadEntryOutcome::Found(address) => Ok(Json(EntryResponse { phone, address })),
        ReadEntryOutcome::NotFound => Err(ApiError::NotFound),
    }
}

async fn update_entry(
    State(state): State<Arc<ServerState>>,
    Path(raw_phone): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Json<EntryResponse>, ApiError> {
    let phone = validate_path_phone(&state, &raw_phone);
    let request = decode_json_body::<UpdateEntryRequest>(&headers, &body);

    // Report every failing field at once.
    let (phone, request) = match (phone, request) {
        (Ok(phone), Ok(request)) => (phone, request),
        (phone, request) => {
            let errors = phone.err().into_iter().chain(request.err()).collect();
            return Err(ApiError::Validation(errors));
        }
    };

    match state.address_book.update(&phone, &request.address).await? {
        UpdateEntryOutcome::Updated(address) => {
            tracing::debug!("Updated address entry for {}", phone);
            Ok(Json(EntryResponse { phone, address }))
        }
        UpdateEntryOutcome::NotFound => Err(ApiError::NotFound),
    }
}

async fn delete_entry(
    State(state): State<Arc<ServerState>>,
    Path(raw_phone): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    let phone = validate_path_phone(&state, &raw_phone)?;

    match state.address_book.delete(&phone).await? {
        DeleteEntryOutcome::Deleted => {
            tracing::debug!("Deleted address entry for {}", phone);
            Ok(StatusCode::NO_CONTENT)
        }
        DeleteEntryOutcome::NotFound => Err(ApiError::NotFound),
    }
}
