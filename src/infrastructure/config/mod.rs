mod app_config;
pub mod duration_serde;
mod gesture_config;
pub mod loader;
mod navigation_config;
pub mod paths;
mod resolver_config;

pub use app_config::*;
pub use gesture_config::*;
pub use navigation_config::*;
pub use resolver_config::*;

use std::sync::OnceLock;

static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();
static GESTURE_CONFIG: OnceLock<GestureConfig> = OnceLock::new();
static NAVIGATION_CONFIG: OnceLock<NavigationConfig> = OnceLock::new();
static RESOLVER_CONFIG: OnceLock<ResolverConfig> = OnceLock::new();

/// Initialize configuration system (called at startup)
pub fn init() {
    APP_CONFIG.get_or_init(|| loader::load_config("app"));
    GESTURE_CONFIG.get_or_init(|| loader::load_config("gesture"));
    NAVIGATION_CONFIG.get_or_init(|| loader::load_config("navigation"));
    RESOLVER_CONFIG.get_or_init(|| loader::load_config("resolver"));
    tracing::info!("Configuration initialized");
}

/// Get application configuration
pub fn app() -> &'static AppConfig {
    APP_CONFIG.get().expect("Config not initialized")
}

/// Get gesture configuration
pub fn gesture() -> &'static GestureConfig {
    GESTURE_CONFIG.get().expect("Config not initialized")
}

/// Get navigation configuration
pub fn navigation() -> &'static NavigationConfig {
    NAVIGATION_CONFIG.get().expect("Config not initialized")
}

/// Get resolver configuration
pub fn resolver() -> &'static ResolverConfig {
    RESOLVER_CONFIG.get().expect("Config not initialized")
}
