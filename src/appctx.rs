//! Application context detection.
//!
//! The recommendation rules and pattern detectors need to know what kind of
//! application the user is currently working in (browser, development tool,
//! communication app). Detection is abstracted behind [`AppContextProvider`]
//! so the server can run with a simulated provider while platform-specific
//! probing is swapped in at composition time.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// The application the user is currently interacting with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppContext {
    /// Stable identifier, e.g. "chrome"
    pub app_id: String,
    /// Human-readable name, e.g. "Google Chrome"
    pub name: String,
    /// Category used by recommendation triggers (browser, development, ...)
    pub category: String,
}

impl AppContext {
    pub fn new(app_id: &str, name: &str, category: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
        }
    }

    /// Placeholder context used before the first successful probe.
    pub fn unknown() -> Self {
        Self::new("unknown", "Unknown Application", "unknown")
    }
}

/// Source of the current application context, polled on a fixed cadence.
pub trait AppContextProvider: Send + Sync {
    fn current_context(&self) -> AppContext;
}

/// Applications the simulated provider cycles through.
fn demo_apps() -> Vec<AppContext> {
    vec![
        AppContext::new("chrome", "Google Chrome", "browser"),
        AppContext::new("vscode", "VS Code", "development"),
        AppContext::new("slack", "Slack", "communication"),
        AppContext::new("terminal", "Terminal", "development"),
        AppContext::new("finder", "Finder", "system"),
    ]
}

/// Provider that picks a random demo application on each poll.
///
/// Stands in for platform-specific foreground-window probing, which is out of
/// scope for the server build.
pub struct SimulatedAppProvider {
    apps: Vec<AppContext>,
}

impl SimulatedAppProvider {
    pub fn new() -> Self {
        Self { apps: demo_apps() }
    }
}

impl Default for SimulatedAppProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AppContextProvider for SimulatedAppProvider {
    fn current_context(&self) -> AppContext {
        let mut rng = rand::thread_rng();
        self.apps
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(AppContext::unknown)
    }
}

/// Deterministic provider returning a fixed context. Used in tests.
pub struct FixedAppProvider {
    context: AppContext,
}

impl FixedAppProvider {
    pub fn new(context: AppContext) -> Self {
        Self { context }
    }
}

impl AppContextProvider for FixedAppProvider {
    fn current_context(&self) -> AppContext {
        self.context.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_provider_returns_known_app() {
        let provider = SimulatedAppProvider::new();
        let ctx = provider.current_context();
        assert!(!ctx.app_id.is_empty());
        assert!(!ctx.category.is_empty());
    }

    #[test]
    fn fixed_provider_is_deterministic() {
        let provider = FixedAppProvider::new(AppContext::new("chrome", "Google Chrome", "browser"));
        assert_eq!(provider.current_context().app_id, "chrome");
        assert_eq!(provider.current_context().category, "browser");
    }
}
