use axum::Router;

/// A bundle of HTTP routes mounted by the server binary.
///
/// Admin resource sets implement this so `openerpd` can nest them under
/// `/{name}` inside each site's router.
pub trait Module: Send + Sync {
    /// Module name, used for logging and route prefixes.
    fn name(&self) -> &str;

    /// Return the module's routes, to be nested under `/{name}`.
    fn routes(&self) -> Router;
}
