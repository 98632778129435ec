//! Configuration types.
//!
//! Every struct has a `Default` and a `from_env()` constructor. Parsing goes
//! through `from_lookup` so tests can supply values without touching the
//! process environment.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default instruction placed at the head of every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a caring and experienced assistant for pet owners. \
Answer questions about feeding, behavior, health, training and grooming. \
Be warm, supportive and practical. Prefer gentle words: say \"mature\" rather than \"old\". \
If a symptom sounds serious, recommend visiting a veterinarian. \
Reply in plain text without Markdown (no **, *, # and so on).";

/// Default instruction for photo analysis requests.
pub const DEFAULT_VISION_PROMPT: &str = "\
You are a caring and experienced assistant for pet owners.

When looking at photos:
- Describe the pet positively and with affection
- Pay attention to health, behavior and surroundings
- Give care advice if you notice something important
- Avoid negative words: say \"mature\" or \"wise\" rather than \"old\"
- Be empathetic and supportive

Reply in plain text without Markdown (no **, *, # and so on).";

/// Dialogue-level settings shared by onboarding and the context builder.
#[derive(Debug, Clone)]
pub struct DialogueConfig {
    /// Maximum number of non-system turns kept in history.
    pub history_window: usize,
    /// Text the user must send to leave the welcome screen.
    pub ack_token: String,
    /// Instruction that leads every conversation.
    pub system_prompt: String,
    /// Instruction used for photo analysis.
    pub vision_prompt: String,
    /// Upper bound for producing one reply, model calls included.
    pub request_timeout: Duration,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            history_window: 20,
            ack_token: "Continue".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            vision_prompt: DEFAULT_VISION_PROMPT.to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl DialogueConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            history_window: parse_or(&lookup, "PET_ASSIST_HISTORY_WINDOW", defaults.history_window)
                .max(1),
            ack_token: lookup("PET_ASSIST_ACK_TOKEN")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.ack_token),
            system_prompt: lookup("PET_ASSIST_SYSTEM_PROMPT")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.system_prompt),
            vision_prompt: defaults.vision_prompt,
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "PET_ASSIST_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
        }
    }
}

/// Settings for the AI backend router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Use server-held threads for text turns even before a thread exists.
    pub persistent_threads: bool,
    /// Delay between run status polls.
    pub poll_interval: Duration,
    /// Maximum number of run status polls before giving up.
    pub poll_max_attempts: u32,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            persistent_threads: false,
            poll_interval: Duration::from_millis(1000),
            poll_max_attempts: 30,
            max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

impl RouterConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            persistent_threads: lookup("PET_ASSIST_PERSISTENT_THREADS")
                .map(|s| parse_flag(&s))
                .unwrap_or(defaults.persistent_threads),
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "PET_ASSIST_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )),
            poll_max_attempts: parse_or(
                &lookup,
                "PET_ASSIST_POLL_MAX_ATTEMPTS",
                defaults.poll_max_attempts,
            ),
            max_tokens: parse_or(&lookup, "PET_ASSIST_MAX_TOKENS", defaults.max_tokens),
            temperature: parse_or(&lookup, "PET_ASSIST_TEMPERATURE", defaults.temperature),
        }
    }
}

/// Re-encoding settings for photos sent inline to the vision model.
#[derive(Debug, Clone, Copy)]
pub struct ImageConfig {
    /// Longest edge after downscaling, in pixels.
    pub max_edge: u32,
    /// JPEG quality, 1..=100.
    pub quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_edge: 1024,
            quality: 85,
        }
    }
}

impl ImageConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_edge: parse_or(&lookup, "PET_ASSIST_IMAGE_MAX_EDGE", defaults.max_edge).max(1),
            quality: parse_or(&lookup, "PET_ASSIST_IMAGE_QUALITY", defaults.quality).clamp(1, 100),
        }
    }
}

/// Everything the dialogue controller needs.
#[derive(Debug, Clone, Default)]
pub struct BotConfig {
    pub dialogue: DialogueConfig,
    pub router: RouterConfig,
    pub image: ImageConfig,
}

impl BotConfig {
    pub fn from_env() -> Self {
        Self {
            dialogue: DialogueConfig::from_env(),
            router: RouterConfig::from_env(),
            image: ImageConfig::from_env(),
        }
    }

    /// Reject settings the model service cannot serve.
    pub fn validate(&self, llm: &LlmConfig) -> Result<(), ConfigError> {
        if self.router.persistent_threads && llm.assistant_id.is_none() {
            return Err(ConfigError::InvalidValue {
                key: "OPENAI_ASSISTANT_ID".to_string(),
                message: "required when PET_ASSIST_PERSISTENT_THREADS is on".to_string(),
            });
        }
        Ok(())
    }
}

/// Model service connection settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
    /// Assistant used for server-held threads. Required in persistent mode.
    pub assistant_id: Option<String>,
    pub http_timeout: Duration,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;

        let base_url = lookup("OPENAI_BASE_URL")
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "OPENAI_BASE_URL".to_string(),
                message: format!("expected an http(s) URL, got '{base_url}'"),
            });
        }

        Ok(Self {
            api_key: SecretString::from(api_key),
            model: lookup("PET_ASSIST_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            base_url,
            assistant_id: lookup("OPENAI_ASSISTANT_ID").filter(|s| !s.trim().is_empty()),
            http_timeout: Duration::from_secs(parse_or(&lookup, "OPENAI_HTTP_TIMEOUT_SECS", 60)),
        })
    }
}

/// Telegram transport settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub allowed_users: Vec<String>,
}

impl TelegramConfig {
    /// Returns `None` when no bot token is configured.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let bot_token = lookup("TELEGRAM_BOT_TOKEN").filter(|s| !s.trim().is_empty())?;
        let allowed_users: Vec<String> = lookup("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Some(Self {
            bot_token,
            allowed_users,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn dialogue_defaults_when_unset() {
        let config = DialogueConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config.history_window, 20);
        assert_eq!(config.ack_token, "Continue");
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn dialogue_overrides_and_bad_values() {
        let config = DialogueConfig::from_lookup(lookup_from(&[
            ("PET_ASSIST_HISTORY_WINDOW", "0"),
            ("PET_ASSIST_ACK_TOKEN", "  go  "),
            ("PET_ASSIST_REQUEST_TIMEOUT_SECS", "not-a-number"),
        ]));
        assert_eq!(config.history_window, 1, "window is never zero");
        assert_eq!(config.ack_token, "go");
        assert_eq!(config.request_timeout, Duration::from_secs(120));
    }

    #[test]
    fn router_flags() {
        let config = RouterConfig::from_lookup(lookup_from(&[
            ("PET_ASSIST_PERSISTENT_THREADS", "yes"),
            ("PET_ASSIST_POLL_INTERVAL_MS", "250"),
            ("PET_ASSIST_POLL_MAX_ATTEMPTS", "5"),
        ]));
        assert!(config.persistent_threads);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.poll_max_attempts, 5);
        assert_eq!(config.max_tokens, 1000);
    }

    #[test]
    fn persistent_mode_requires_assistant() {
        let llm = LlmConfig::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        let mut config = BotConfig::default();
        assert!(config.validate(&llm).is_ok());

        config.router.persistent_threads = true;
        let err = config.validate(&llm).unwrap_err();
        assert!(
            matches!(&err, ConfigError::InvalidValue { key, .. } if key == "OPENAI_ASSISTANT_ID")
        );

        let llm = LlmConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_ASSISTANT_ID", "asst_1"),
        ]))
        .unwrap();
        assert!(config.validate(&llm).is_ok());
    }

    #[test]
    fn image_quality_is_clamped() {
        let config = ImageConfig::from_lookup(lookup_from(&[("PET_ASSIST_IMAGE_QUALITY", "0")]));
        assert_eq!(config.quality, 1);
        assert_eq!(config.max_edge, 1024);
    }

    #[test]
    fn llm_requires_api_key() {
        let err = LlmConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "OPENAI_API_KEY"));
    }

    #[test]
    fn llm_trims_base_url_and_reads_assistant() {
        let config = LlmConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1/"),
            ("OPENAI_ASSISTANT_ID", "asst_123"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.expose_secret(), "sk-test");
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.assistant_id.as_deref(), Some("asst_123"));
        assert_eq!(config.model, "gpt-4o");
    }

    #[test]
    fn llm_rejects_non_http_base_url() {
        let err = LlmConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "ftp://example.com"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn telegram_needs_token() {
        assert!(TelegramConfig::from_lookup(lookup_from(&[])).is_none());
        let config = TelegramConfig::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_ALLOWED_USERS", "alice, 42,,"),
        ]))
        .unwrap();
        assert_eq!(config.allowed_users, vec!["alice", "42"]);
    }
}
