use std::path::Path;

use axum::handler::HandlerWithoutStateExt;
use axum::Router;
use tower_http::services::ServeDir;

use crate::error::not_found;

pub const UPLOADS_PREFIX: &str = "/uploads";

/// Mount `/uploads` and the public directory on `router`.
///
/// The public directory is the router's fallback, so explicit routes win
/// over files of the same name. Anything neither serves gets the JSON 404.
pub fn mount_static<S>(router: Router<S>, uploads_dir: &Path, public_dir: &Path) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let uploads = ServeDir::new(uploads_dir)
        .call_fallback_on_method_not_allowed(true)
        .fallback(not_found.into_service());
    let public = ServeDir::new(public_dir)
        .call_fallback_on_method_not_allowed(true)
        .fallback(not_found.into_service());

    router
        .nest_service(UPLOADS_PREFIX, uploads)
        .fallback_service(public)
}
