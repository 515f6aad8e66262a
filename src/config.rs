//! Runtime configuration
//!
//! Everything comes from the environment (a `.env` file is loaded by the
//! binaries). Malformed numbers fall back to their defaults with a warning.

use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SEARCH_LIMIT: usize = 6;
pub const DEFAULT_EXCERPT_MAX_CHARS: usize = 2000;

/// Knobs for a single turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnConfig {
    pub search_limit: usize,
    pub excerpt_max_chars: usize,
    pub search_timeout: Duration,
    pub generation_timeout: Duration,
    pub followup_timeout: Duration,
    /// Request follow-ups while the answer is still streaming
    pub parallel_followups: bool,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            search_limit: DEFAULT_SEARCH_LIMIT,
            excerpt_max_chars: DEFAULT_EXCERPT_MAX_CHARS,
            search_timeout: Duration::from_secs(30),
            generation_timeout: Duration::from_secs(120),
            followup_timeout: Duration::from_secs(30),
            parallel_followups: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub firecrawl_api_key: Option<String>,
    pub firecrawl_base_url: Option<String>,
    pub groq_api_key: Option<String>,
    pub groq_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub turn: TurnConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = TurnConfig::default();

        let port = text("PORT")
            .or_else(|| text("API_PORT"))
            .map(|v| parse_or("PORT", &v, DEFAULT_PORT))
            .unwrap_or(DEFAULT_PORT);

        let number = |key: &str, default: u64| {
            text(key)
                .map(|v| parse_or(key, &v, default))
                .unwrap_or(default)
        };

        let turn = TurnConfig {
            search_limit: number("SEARCH_LIMIT", defaults.search_limit as u64) as usize,
            excerpt_max_chars: number("EXCERPT_MAX_CHARS", defaults.excerpt_max_chars as u64)
                as usize,
            search_timeout: Duration::from_secs(number(
                "SEARCH_TIMEOUT_SECS",
                defaults.search_timeout.as_secs(),
            )),
            generation_timeout: Duration::from_secs(number(
                "GENERATION_TIMEOUT_SECS",
                defaults.generation_timeout.as_secs(),
            )),
            followup_timeout: Duration::from_secs(number(
                "FOLLOWUP_TIMEOUT_SECS",
                defaults.followup_timeout.as_secs(),
            )),
            parallel_followups: text("PARALLEL_FOLLOWUPS")
                .map(|v| parse_flag("PARALLEL_FOLLOWUPS", &v, defaults.parallel_followups))
                .unwrap_or(defaults.parallel_followups),
        };

        Self {
            port,
            firecrawl_api_key: text("FIRECRAWL_API_KEY"),
            firecrawl_base_url: text("FIRECRAWL_BASE_URL"),
            groq_api_key: text("GROQ_API_KEY"),
            groq_base_url: text("GROQ_BASE_URL"),
            llm_model: text("LLM_MODEL"),
            turn,
        }
    }

    pub fn has_search_key(&self) -> bool {
        self.firecrawl_api_key.is_some()
    }

    pub fn has_llm_key(&self) -> bool {
        self.groq_api_key.is_some()
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(key: &str, raw: &str, default: T) -> T {
    raw.parse().unwrap_or_else(|_| {
        warn!(key, value = raw, "Malformed value, using default {}", default);
        default
    })
}

fn parse_flag(key: &str, raw: &str, default: bool) -> bool {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(key, value = raw, "Malformed flag, using default {}", default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.turn, TurnConfig::default());
        assert_eq!(cfg.turn.search_limit, 6);
        assert_eq!(cfg.turn.excerpt_max_chars, 2000);
        assert!(!cfg.has_search_key());
        assert!(!cfg.has_llm_key());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("API_PORT", "9000"),
            ("FIRECRAWL_API_KEY", "fc-123"),
            ("GROQ_API_KEY", "gsk-456"),
            ("SEARCH_LIMIT", "10"),
            ("SEARCH_TIMEOUT_SECS", "5"),
            ("PARALLEL_FOLLOWUPS", "true"),
        ]);

        assert_eq!(cfg.port, 9000);
        assert!(cfg.has_search_key());
        assert!(cfg.has_llm_key());
        assert_eq!(cfg.turn.search_limit, 10);
        assert_eq!(cfg.turn.search_timeout, Duration::from_secs(5));
        assert!(cfg.turn.parallel_followups);
    }

    #[test]
    fn test_port_precedence_and_blank_keys() {
        let cfg = config(&[("PORT", "3000"), ("API_PORT", "9000"), ("GROQ_API_KEY", "  ")]);
        assert_eq!(cfg.port, 3000);
        assert!(!cfg.has_llm_key());
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let cfg = config(&[
            ("PORT", "eighty"),
            ("EXCERPT_MAX_CHARS", "-1"),
            ("PARALLEL_FOLLOWUPS", "sometimes"),
        ]);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.turn.excerpt_max_chars, DEFAULT_EXCERPT_MAX_CHARS);
        assert!(!cfg.turn.parallel_followups);
    }
}
