// legal-rag-core/src/config.rs
//
// Ambient configuration: typed fields, `env::var(...)` with a documented
// default, `dotenvy::dotenv()` loaded best-effort before reading.

use std::env;

use tracing::{info, warn};

use crate::router::scoring;

/// Recognized configuration. Every field maps to exactly one named env
/// var.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// `MAX_TOKENS` - default generation ceiling.
    pub max_tokens: u32,
    /// `TEMPERATURE` - generator creativity; 0.1 recommended.
    pub temperature: f32,
    /// `N_CTX` - model context window; governs budget math.
    pub n_ctx: usize,
    /// `BROAD_SEARCH_K` - default top-K for vector search.
    pub broad_search_k: usize,
    /// `SIMILARITY_THRESHOLD` - minimum cosine for candidate acceptance.
    pub similarity_threshold: f32,
    /// `USE_ROUTING` - enable/disable router (fallback: flat search).
    pub use_routing: bool,
    /// `USE_RERANKER` - enable/disable reranker.
    pub use_reranker: bool,
    /// `CONTEXT_HISTORY_LIMIT` - history turns retained in prompt.
    pub context_history_limit: usize,
    /// `high_confidence_threshold` - 0.80.
    pub high_confidence_threshold: f32,
    /// `medium_high_threshold` - 0.65.
    pub medium_high_threshold: f32,
    /// `min_confidence_threshold` - 0.50.
    pub min_confidence_threshold: f32,
    /// `VERY_HIGH_CONFIDENCE_GATE` - 0.82 (override upper bound).
    pub very_high_confidence_gate: f32,
    /// `MIN_CONTEXT_CONFIDENCE` - 0.78 (override lower bound).
    pub min_context_confidence: f32,

    /// Root directory of the on-disk corpus store (component A).
    pub corpus_root: String,
    /// Base URL of the external embedding collaborator.
    pub embedding_base_url: String,
    /// Base URL of the external generator (LLM) collaborator.
    pub generator_base_url: String,
    /// Base URL of the external cross-encoder reranker collaborator.
    pub reranker_base_url: String,
    /// Base path used to build downloadable form URLs.
    pub form_base_path: String,

    /// Per-call timeout for the generator HTTP client.
    pub generator_timeout_seconds: u64,
    /// Overall per-turn deadline; the generator call is cancelled once it
    /// elapses.
    pub turn_deadline_seconds: u64,
    /// Session idle eviction window.
    pub session_idle_minutes: u64,
}

impl RetrievalConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        let config = Self {
            max_tokens: env_u32("MAX_TOKENS", 512),
            temperature: env_f32("TEMPERATURE", 0.1),
            n_ctx: env_usize("N_CTX", 4096),
            broad_search_k: env_usize("BROAD_SEARCH_K", 20),
            similarity_threshold: env_f32("SIMILARITY_THRESHOLD", 0.3),
            use_routing: env_bool("USE_ROUTING", true),
            use_reranker: env_bool("USE_RERANKER", true),
            context_history_limit: env_usize("CONTEXT_HISTORY_LIMIT", 1),
            high_confidence_threshold: env_f32(
                "HIGH_CONFIDENCE_THRESHOLD",
                scoring::HIGH_CONFIDENCE_THRESHOLD,
            ),
            medium_high_threshold: env_f32(
                "MEDIUM_HIGH_THRESHOLD",
                scoring::MEDIUM_HIGH_THRESHOLD,
            ),
            min_confidence_threshold: env_f32(
                "MIN_CONFIDENCE_THRESHOLD",
                scoring::MIN_CONFIDENCE_THRESHOLD,
            ),
            very_high_confidence_gate: env_f32(
                "VERY_HIGH_CONFIDENCE_GATE",
                scoring::VERY_HIGH_CONFIDENCE_GATE,
            ),
            min_context_confidence: env_f32(
                "MIN_CONTEXT_CONFIDENCE",
                scoring::MIN_CONTEXT_CONFIDENCE,
            ),
            corpus_root: env::var("CORPUS_ROOT").unwrap_or_else(|_| "./corpus".to_string()),
            embedding_base_url: env::var("EMBEDDING_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8081".to_string()),
            generator_base_url: env::var("GENERATOR_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string()),
            reranker_base_url: env::var("RERANKER_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8082".to_string()),
            form_base_path: env::var("FORM_BASE_PATH")
                .unwrap_or_else(|_| "/forms".to_string()),
            generator_timeout_seconds: env_u64("GENERATOR_TIMEOUT_SECONDS", 30),
            turn_deadline_seconds: env_u64("TURN_DEADLINE_SECONDS", 45),
            session_idle_minutes: env_u64("SESSION_IDLE_MINUTES", 30),
        };

        config.print_config();
        Ok(config)
    }

    fn print_config(&self) {
        info!(
            max_tokens = self.max_tokens,
            temperature = self.temperature,
            n_ctx = self.n_ctx,
            broad_search_k = self.broad_search_k,
            use_routing = self.use_routing,
            use_reranker = self.use_reranker,
            context_history_limit = self.context_history_limit,
            "retrieval config loaded"
        );
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `std::env` is process-global; serialize config tests so they don't
    // race each other's `env::set_var`/`remove_var` calls.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all_env() {
        for key in [
            "MAX_TOKENS", "TEMPERATURE", "N_CTX", "BROAD_SEARCH_K",
            "SIMILARITY_THRESHOLD", "USE_ROUTING", "USE_RERANKER",
            "CONTEXT_HISTORY_LIMIT", "HIGH_CONFIDENCE_THRESHOLD",
            "MEDIUM_HIGH_THRESHOLD", "MIN_CONFIDENCE_THRESHOLD",
            "VERY_HIGH_CONFIDENCE_GATE", "MIN_CONTEXT_CONFIDENCE",
            "CORPUS_ROOT", "EMBEDDING_BASE_URL", "GENERATOR_BASE_URL",
            "RERANKER_BASE_URL", "FORM_BASE_PATH",
            "GENERATOR_TIMEOUT_SECONDS", "TURN_DEADLINE_SECONDS",
            "SESSION_IDLE_MINUTES",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn defaults_match_documented_values_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all_env();
        let config = RetrievalConfig::from_env().unwrap();
        assert_eq!(config.max_tokens, 512);
        assert!((config.temperature - 0.1).abs() < 1e-6);
        assert_eq!(config.n_ctx, 4096);
        assert_eq!(config.broad_search_k, 20);
        assert!(config.use_routing);
        assert!(config.use_reranker);
        assert_eq!(config.context_history_limit, 1);
    }

    #[test]
    fn confidence_thresholds_default_to_scoring_constants() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all_env();
        let config = RetrievalConfig::from_env().unwrap();
        assert_eq!(config.high_confidence_threshold, scoring::HIGH_CONFIDENCE_THRESHOLD);
        assert_eq!(config.medium_high_threshold, scoring::MEDIUM_HIGH_THRESHOLD);
        assert_eq!(config.min_confidence_threshold, scoring::MIN_CONFIDENCE_THRESHOLD);
        assert_eq!(config.very_high_confidence_gate, scoring::VERY_HIGH_CONFIDENCE_GATE);
        assert_eq!(config.min_context_confidence, scoring::MIN_CONTEXT_CONFIDENCE);
    }

    #[test]
    fn env_override_is_honored() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all_env();
        env::set_var("MAX_TOKENS", "1024");
        env::set_var("USE_RERANKER", "false");
        let config = RetrievalConfig::from_env().unwrap();
        assert_eq!(config.max_tokens, 1024);
        assert!(!config.use_reranker);
        clear_all_env();
    }

    #[test]
    fn malformed_env_value_falls_back_to_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all_env();
        env::set_var("N_CTX", "not-a-number");
        let config = RetrievalConfig::from_env().unwrap();
        assert_eq!(config.n_ctx, 4096);
        clear_all_env();
    }

    #[test]
    fn corpus_root_defaults_to_relative_path() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all_env();
        let config = RetrievalConfig::from_env().unwrap();
        assert_eq!(config.corpus_root, "./corpus");
    }

    #[test]
    fn turn_deadline_exceeds_generator_timeout_by_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all_env();
        let config = RetrievalConfig::from_env().unwrap();
        assert!(config.turn_deadline_seconds >= config.generator_timeout_seconds);
    }
}
