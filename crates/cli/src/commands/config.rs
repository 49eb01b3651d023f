use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use handset_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_PATHS};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        Field {
            key_path: "llm.provider",
            env_keys: &["HANDSET_LLM_PROVIDER"],
            value: format!("{:?}", config.llm.provider),
        },
        Field {
            key_path: "llm.model",
            env_keys: &["HANDSET_LLM_MODEL"],
            value: config.llm.model.clone(),
        },
        Field {
            key_path: "llm.base_url",
            env_keys: &["HANDSET_LLM_BASE_URL"],
            value: config.llm.effective_base_url(),
        },
        Field { key_path: "llm.api_key", env_keys: &["HANDSET_LLM_API_KEY"], value: api_key },
        Field {
            key_path: "llm.temperature",
            env_keys: &["HANDSET_LLM_TEMPERATURE"],
            value: config.llm.temperature.to_string(),
        },
        Field {
            key_path: "llm.timeout_secs",
            env_keys: &["HANDSET_LLM_TIMEOUT_SECS"],
            value: config.llm.timeout_secs.to_string(),
        },
        Field {
            key_path: "catalog.top_k",
            env_keys: &["HANDSET_CATALOG_TOP_K"],
            value: config.catalog.top_k.to_string(),
        },
        Field {
            key_path: "agent.max_tool_rounds",
            env_keys: &["HANDSET_AGENT_MAX_TOOL_ROUNDS"],
            value: config.agent.max_tool_rounds.to_string(),
        },
        Field {
            key_path: "agent.step_timeout_secs",
            env_keys: &["HANDSET_AGENT_STEP_TIMEOUT_SECS"],
            value: config.agent.step_timeout_secs.to_string(),
        },
        Field {
            key_path: "agent.oracle_retries",
            env_keys: &["HANDSET_AGENT_ORACLE_RETRIES"],
            value: config.agent.oracle_retries.to_string(),
        },
        Field {
            key_path: "agent.parallel_tools",
            env_keys: &["HANDSET_AGENT_PARALLEL_TOOLS"],
            value: config.agent.parallel_tools.to_string(),
        },
        Field {
            key_path: "logging.level",
            env_keys: &["HANDSET_LOGGING_LEVEL", "HANDSET_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key_path: "logging.format",
            env_keys: &["HANDSET_LOGGING_FORMAT", "HANDSET_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format),
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if config_file_doc.is_some_and(|doc| contains_path(doc, key_path)) {
        let file_path = config_file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a short key prefix such as `sk-` and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token};

    #[test]
    fn redaction_keeps_only_the_prefix() {
        assert_eq!(redact_token("sk-live-abc123"), "sk-***");
        assert_eq!(redact_token("AIzaSyExample"), "<redacted>");
        assert_eq!(redact_token("   "), "<empty>");
    }

    #[test]
    fn nested_paths_are_detected_in_toml() {
        let doc = "[agent]\nmax_tool_rounds = 4\n".parse::<toml::Value>().expect("toml");
        assert!(contains_path(&doc, "agent.max_tool_rounds"));
        assert!(!contains_path(&doc, "agent.step_timeout_secs"));
        assert!(!contains_path(&doc, "llm.model"));
    }
}
