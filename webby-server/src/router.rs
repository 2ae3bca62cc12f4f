use axum::{
    extract::{Query, Request, State},
    middleware,
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

use webby_protocol::{classify, InfoFile, Route, RouteError};

use crate::app_state::AppState;
use crate::auth::{require_basic_auth, RemoteUser};
use crate::error::WebbyError;
use crate::handlers::{files, service as rpc, tree};
use crate::repository::Repository;

#[derive(Debug, Deserialize)]
struct InfoRefsQuery {
    service: Option<String>,
}

/// Build the application: the tree endpoint under its prefix, every other
/// path through the smart HTTP dispatcher, all behind the auth gate.
pub fn app(state: Arc<AppState>) -> Router {
    let tree_routes = Router::new()
        .route("/{repo}/{revision}", get(tree::list_root))
        .route("/{repo}/{revision}/{*path}", get(tree::list_path));

    Router::new()
        .nest(&state.config.tree_prefix, tree_routes)
        .fallback(dispatch)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_basic_auth,
        ))
        .with_state(state)
}

/// Classify the request, check the capability switches, resolve the
/// repository and hand off to the matching handler.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, WebbyError> {
    let service_param = Query::<InfoRefsQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(q)| q.service);

    let route = classify(
        request.method().as_str(),
        request.uri().path(),
        service_param.as_deref(),
    )
    .map_err(|RouteError::UnsupportedService(name)| WebbyError::Forbidden(name))?
    .ok_or(WebbyError::NotFound)?;

    state.config.check_enabled(&route)?;
    let repo = Repository::resolve(&state.config.project_root, route.repo())?;

    let config = &state.config;
    match route {
        Route::HeadFile { .. } => files::text_file(&repo, &["HEAD"]).await,
        Route::InfoRefs { .. } => files::text_file(&repo, &["info", "refs"]).await,
        Route::InfoRefsService { service, .. } => rpc::advertise(config, &repo, service).await,
        Route::InfoFile {
            file: InfoFile::Packs,
            ..
        } => files::info_packs(&repo).await,
        Route::InfoFile { file, .. } => {
            files::text_file(&repo, &["objects", "info", file.file_name()]).await
        }
        Route::LooseObject { prefix, suffix, .. } => {
            files::loose_object(&repo, &prefix, &suffix).await
        }
        Route::PackFile { pack, ext, .. } => files::pack_file(&repo, &pack, ext).await,
        Route::ServiceRpc { service, .. } => {
            let user = request
                .extensions()
                .get::<RemoteUser>()
                .map(|RemoteUser(name)| name.as_str())
                .unwrap_or("-");
            info!(%service, %user, "starting stateless rpc");
            rpc::run(config, &repo, service, request).await
        }
    }
}
