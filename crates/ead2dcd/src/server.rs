//! HTTP front-end of the OAI-PMH responder.
//!
//! A single route, `GET /oai`, answers every verb. Protocol outcomes are always
//! `200 OK` with a `text/xml` body; `503` means no static repository has been built
//! yet.

use std::sync::Arc;

use axum::{
  extract::{RawQuery, State},
  http::{header, StatusCode},
  response::{IntoResponse, Response},
  routing::get,
  Router,
};
use chrono::Local;
use ead2dc::{
  database::Database,
  oai::{request_log, respond, OaiRequest, ResponderSettings, SnapshotStore},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared state of the handlers.
#[derive(Clone)]
pub struct AppState {
  /// Static repository snapshot
  pub store:    Arc<SnapshotStore>,
  /// Inclusion table and request log
  pub db:       Arc<Database>,
  /// Base URL and page size
  pub settings: Arc<ResponderSettings>,
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
  Router::new().route("/oai", get(oai)).layer(TraceLayer::new_for_http()).with_state(state)
}

/// Serves `state` on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
  info!("Serving OAI-PMH on http://{}/oai", listener.local_addr()?);
  axum::serve(listener, router(state)).with_graceful_shutdown(shutdown_signal()).await
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!("Could not listen for shutdown signal: {e}");
    std::future::pending::<()>().await;
  }
  info!("Shutting down");
}

/// `GET /oai`
///
/// The query string is parsed by hand so that repeated arguments reach the responder
/// as a `badArgument` instead of being rejected by the extractor.
async fn oai(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
  let request = OaiRequest::from_query(query.as_deref().unwrap_or_default());
  let now = Local::now();
  if let Err(e) = state.db.log_request(request_log(&request, now.naive_local())).await {
    warn!("Could not log request: {e}");
  }

  let repository = match state.store.current().await {
    Ok(repository) => repository,
    Err(e) => {
      warn!("Static repository {} unavailable: {e}", state.store.path().display());
      return (StatusCode::SERVICE_UNAVAILABLE, "The repository has not been built yet.\n").into_response();
    },
  };

  let included = match state.db.included_collections().await {
    Ok(included) => included,
    Err(e) => {
      error!("Could not read included collections: {e}");
      return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    },
  };

  match respond(&repository, &included, &request, &state.settings, now.date_naive()) {
    Ok(xml) => ([(header::CONTENT_TYPE, "text/xml")], xml).into_response(),
    Err(e) => {
      error!("Could not answer {:?}: {e}", request.verb);
      StatusCode::INTERNAL_SERVER_ERROR.into_response()
    },
  }
}
