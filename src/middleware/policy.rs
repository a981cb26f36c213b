// Route protection policy: which paths are paid, and for whom

use super::scraper::{override_flag, BotClassifier};
use crate::config::PaymentConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClassification {
    Protected,
    Unprotected,
    /// The validation endpoint itself. Never protected, otherwise the gate
    /// would call itself forever.
    ValidationEndpoint,
}

#[derive(Debug, Clone)]
pub struct RoutePolicy {
    validation_path: String,
    protected_prefixes: Vec<String>,
    excluded_prefixes: Vec<String>,
    api_prefix: String,
}

impl RoutePolicy {
    pub fn new(
        validation_path: impl Into<String>,
        protected_prefixes: Vec<String>,
        excluded_prefixes: Vec<String>,
        api_prefix: impl Into<String>,
    ) -> Self {
        Self {
            validation_path: validation_path.into(),
            protected_prefixes,
            excluded_prefixes,
            api_prefix: api_prefix.into(),
        }
    }

    pub fn from_config(config: &PaymentConfig) -> Self {
        Self::new(
            &config.validation_path,
            config.protected_routes.clone(),
            config.excluded_paths.clone(),
            &config.api_prefix,
        )
    }

    pub fn validation_path(&self) -> &str {
        &self.validation_path
    }

    pub fn protected_prefixes(&self) -> &[String] {
        &self.protected_prefixes
    }

    pub fn classify(&self, path: &str) -> RouteClassification {
        if path.starts_with(&self.validation_path) {
            return RouteClassification::ValidationEndpoint;
        }
        if self.excluded_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return RouteClassification::Unprotected;
        }
        if self.protected_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            RouteClassification::Protected
        } else {
            RouteClassification::Unprotected
        }
    }

    pub fn is_protected_route(&self, path: &str) -> bool {
        self.classify(path) == RouteClassification::Protected
    }

    pub fn is_api_path(&self, path: &str) -> bool {
        path.starts_with(&self.api_prefix)
    }

    /// API paths are always validated; pages only when the caller is a bot.
    pub fn needs_payment_validation(
        &self,
        path: &str,
        user_agent: Option<&str>,
        query: Option<&str>,
        classifier: &BotClassifier,
    ) -> bool {
        if self.is_api_path(path) {
            return true;
        }
        classifier.is_scraper(user_agent, override_flag(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RoutePolicy {
        RoutePolicy::new(
            "/api/payment-validate",
            vec!["/blog".into(), "/api/add".into(), "/api/payment-validate".into()],
            vec!["/favicon.ico".into(), "/blog/assets".into()],
            "/api",
        )
    }

    #[test]
    fn test_validation_endpoint_is_never_protected() {
        let policy = policy();
        for path in [
            "/api/payment-validate",
            "/api/payment-validate?original_path=/blog",
            "/api/payment-validate/nested",
        ] {
            assert!(!policy.is_protected_route(path), "{} must not be protected", path);
            assert_eq!(policy.classify(path), RouteClassification::ValidationEndpoint);
        }
    }

    #[test]
    fn test_protected_prefixes() {
        let policy = policy();
        assert!(policy.is_protected_route("/blog"));
        assert!(policy.is_protected_route("/blog/first-post"));
        assert!(policy.is_protected_route("/api/add"));
        assert!(!policy.is_protected_route("/"));
        assert!(!policy.is_protected_route("/api/wallet/list"));
        assert!(!policy.is_protected_route("/about"));
    }

    #[test]
    fn test_excluded_paths_are_unprotected() {
        let policy = policy();
        assert_eq!(policy.classify("/blog/assets/logo.png"), RouteClassification::Unprotected);
        assert_eq!(policy.classify("/favicon.ico"), RouteClassification::Unprotected);
    }

    #[test]
    fn test_protected_list_is_configurable() {
        let policy = RoutePolicy::new(
            "/validate",
            vec!["/reports".into(), "/api/v2".into(), "/premium".into()],
            vec![],
            "/api",
        );
        assert_eq!(policy.protected_prefixes().len(), 3);
        assert!(policy.is_protected_route("/premium/video"));
        assert!(!policy.is_protected_route("/blog"));
        assert!(!policy.is_protected_route("/validate"));
    }

    #[test]
    fn test_api_paths_always_need_validation() {
        let policy = policy();
        let classifier = BotClassifier::builtin();
        for ua in [None, Some(""), Some("Mozilla/5.0 Firefox/128.0"), Some("GPTBot/1.0")] {
            assert!(policy.needs_payment_validation("/api/add", ua, None, &classifier));
        }
    }

    #[test]
    fn test_pages_need_validation_only_for_bots() {
        let policy = policy();
        let classifier = BotClassifier::builtin();
        let browser = Some("Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/128.0");

        assert!(!policy.needs_payment_validation("/blog", browser, None, &classifier));
        assert!(!policy.needs_payment_validation("/blog", None, Some("bot=false"), &classifier));
        assert!(policy.needs_payment_validation("/blog", Some("GPTBot/1.0"), None, &classifier));
        assert!(policy.needs_payment_validation("/blog", None, Some("bot=true"), &classifier));
        assert!(policy.needs_payment_validation("/blog", browser, Some("bot=true"), &classifier));
    }
}
