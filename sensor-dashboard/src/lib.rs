use axum::Router;
use axum_embed::{FallbackBehavior, ServeEmbed};
use rust_embed::RustEmbed;

#[derive(RustEmbed, Clone)]
#[folder = "app/dist/"]
struct AppAssets;

/// Static dashboard mounted as the router's fallback, so it only answers
/// paths no other route claims.
pub fn app_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let serve_assets = ServeEmbed::<AppAssets>::with_parameters(
        Some("index.html".to_string()),
        FallbackBehavior::Ok,
        Some("index.html".to_string()),
    );

    Router::new().fallback_service(serve_assets)
}
