//! Dispatcher configuration
//!
//! Static settings come from the command line; runtime behaviour comes
//! from the configuration categories the dispatcher owns on the core
//! service: `<name>Advanced` (logLevel, dispatcherThreads), `<name>
//! Server` (the control enable gate) and `<name>Security` (the
//! authentication policy).

use courier_core::dto::registry::Category;

/// Worker pool size used when the advanced category carries no usable value
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// The names of the configuration categories the dispatcher owns
pub struct CategoryNames {
    pub main: String,
    pub advanced: String,
    pub server: String,
    pub security: String,
}

impl CategoryNames {
    pub fn for_service(service: &str) -> Self {
        Self {
            main: service.to_string(),
            advanced: format!("{}Advanced", service),
            server: format!("{} Server", service),
            security: format!("{}Security", service),
        }
    }

    pub fn all(&self) -> [&str; 4] {
        [&self.main, &self.advanced, &self.server, &self.security]
    }
}

/// The categories created at startup, with their default items. Existing
/// operator edits are kept when these are pushed to the core.
pub fn default_categories(names: &CategoryNames) -> Vec<Category> {
    vec![
        Category::named(&names.main),
        Category::named(&names.advanced)
            .with_item("logLevel", "warning")
            .with_item("dispatcherThreads", "2"),
        Category::named(&names.server).with_item("enable", "true"),
        Category::named(&names.security).with_item("authentication", "optional"),
    ]
}

/// The worker pool size from the advanced category
pub fn worker_threads(category: &Category) -> usize {
    category
        .value("dispatcherThreads")
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_WORKER_THREADS)
}

/// The control gate from the server category
pub fn control_enabled(category: &Category) -> bool {
    category
        .value("enable")
        .map(|v| v == "true" || v == "t")
        .unwrap_or(true)
}

/// The authentication policy from the security category
pub fn auth_mandatory(category: &Category) -> bool {
    category
        .value("authentication")
        .map(|v| v == "mandatory")
        .unwrap_or(false)
}

/// Map the service log level names onto tracing filter directives
pub fn log_level_directive(level: &str) -> &'static str {
    match level {
        "error" => "error",
        "warning" => "warn",
        "info" => "info",
        "debug" => "debug",
        _ => "warn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_names() {
        let names = CategoryNames::for_service("dispatcher");
        assert_eq!(names.advanced, "dispatcherAdvanced");
        assert_eq!(names.server, "dispatcher Server");
        assert_eq!(names.security, "dispatcherSecurity");
    }

    #[test]
    fn test_worker_threads_parsing() {
        let category = Category::named("a").with_item("dispatcherThreads", "4");
        assert_eq!(worker_threads(&category), 4);

        // Zero and garbage fall back to the default
        let category = Category::named("a").with_item("dispatcherThreads", "0");
        assert_eq!(worker_threads(&category), DEFAULT_WORKER_THREADS);
        let category = Category::named("a").with_item("dispatcherThreads", "many");
        assert_eq!(worker_threads(&category), DEFAULT_WORKER_THREADS);
        assert_eq!(worker_threads(&Category::named("a")), DEFAULT_WORKER_THREADS);
    }

    #[test]
    fn test_control_enabled_parsing() {
        assert!(control_enabled(&Category::named("a").with_item("enable", "true")));
        assert!(!control_enabled(&Category::named("a").with_item("enable", "false")));
        assert!(control_enabled(&Category::named("a")));
    }

    #[test]
    fn test_auth_mandatory_parsing() {
        assert!(auth_mandatory(
            &Category::named("a").with_item("authentication", "mandatory")
        ));
        assert!(!auth_mandatory(
            &Category::named("a").with_item("authentication", "optional")
        ));
        assert!(!auth_mandatory(&Category::named("a")));
    }

    #[test]
    fn test_log_level_directive() {
        assert_eq!(log_level_directive("warning"), "warn");
        assert_eq!(log_level_directive("debug"), "debug");
        assert_eq!(log_level_directive("bogus"), "warn");
    }
}
