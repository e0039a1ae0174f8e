//! Configuration loading: TOML files with environment interpolation and an
//! environment-profile overlay on top of the base file.

use regex::Regex;
use shared_types::AikaConfig;
use std::env;
use std::fs;

/// Load a single TOML config file and perform simple environment
/// interpolation for occurrences of `{{VAR}}` or `${VAR}`.
pub fn load_single_config(path: &str) -> Result<AikaConfig, String> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config file: {}", e))?;

    parse_config(&content)
}

/// Parse TOML content after interpolating environment variables.
pub fn parse_config(content: &str) -> Result<AikaConfig, String> {
    let re = Regex::new(r"(\{\{|\$\{)([a-zA-Z0-9_]+)(\}\}|\})")
        .map_err(|e| format!("Failed to create regex: {}", e))?;

    let processed = re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[2];
        env::var(var_name).unwrap_or_else(|_| format!("{{{{{}}}}}", var_name))
    });

    let config: AikaConfig =
        toml::from_str(&processed).map_err(|e| format!("Failed to parse config file: {}", e))?;

    validate(&config)?;
    Ok(config)
}

/// Load configuration using an environment profile. When a
/// `config.<env>.toml` sibling exists it replaces the base file; profiles
/// are complete configurations, not partial patches.
pub fn load_app_config_with_env(base_path: &str, env_name: &str) -> Result<AikaConfig, String> {
    // Pick up a local .env before interpolating secrets like the redaction
    // salt and provider keys.
    dotenvy::dotenv().ok();

    let base = load_single_config(base_path)?;

    let env = env_name.to_lowercase();
    let overlay_path = base_path.replace(".toml", &format!(".{}.toml", env));

    match load_single_config(&overlay_path) {
        Ok(overlay) => Ok(overlay),
        Err(e) if e.contains("Failed to read config file") => Ok(base),
        Err(e) => Err(e),
    }
}

/// Reject configurations that cannot be run safely.
fn validate(config: &AikaConfig) -> Result<(), String> {
    if config.redaction_salt.trim().is_empty() || config.redaction_salt.contains("{{") {
        return Err("redaction_salt is missing or uninterpolated".to_string());
    }
    if config.max_tool_turns == 0 {
        return Err("max_tool_turns must be at least 1".to_string());
    }
    if !config.triage.is_ordered() {
        return Err("triage thresholds must preserve their ordering".to_string());
    }
    if config.sla.critical_sla_minutes > config.sla.default_sla_minutes {
        return Err("critical SLA must not be longer than the default SLA".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    const BASE: &str = r#"
redaction_salt = "{{AIKA_REDACTION_SALT}}"

[llm]
provider = "openrouter"
model_name = "test-model"
api_key = "${AIKA_LLM_KEY}"
"#;

    #[test]
    fn interpolates_both_env_syntaxes() {
        env::set_var("AIKA_REDACTION_SALT", "salt-123");
        env::set_var("AIKA_LLM_KEY", "key-456");

        let cfg = parse_config(BASE).expect("config should parse");
        assert_eq!(cfg.redaction_salt, "salt-123");
        assert_eq!(cfg.llm.api_key.as_deref(), Some("key-456"));
    }

    #[test]
    fn missing_salt_variable_is_rejected() {
        env::remove_var("AIKA_MISSING_SALT");
        let content = r#"
redaction_salt = "{{AIKA_MISSING_SALT}}"

[llm]
provider = "openrouter"
model_name = "m"
"#;
        let err = parse_config(content).unwrap_err();
        assert!(err.contains("redaction_salt"));
    }

    #[test]
    fn zero_tool_turns_is_rejected() {
        let content = r#"
redaction_salt = "s"
max_tool_turns = 0

[llm]
provider = "p"
model_name = "m"
"#;
        assert!(parse_config(content).is_err());
    }

    #[test]
    fn inverted_sla_is_rejected() {
        let content = r#"
redaction_salt = "s"

[llm]
provider = "p"
model_name = "m"

[sla]
critical_sla_minutes = 2000
default_sla_minutes = 1440
"#;
        assert!(parse_config(content).is_err());
    }

    #[test]
    fn overlay_replaces_base_when_present() {
        env::set_var("AIKA_REDACTION_SALT", "salt-123");
        env::set_var("AIKA_LLM_KEY", "key-456");

        let mut base = Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        write!(base, "{}", BASE).expect("write base");
        let base_path = base.path().to_str().unwrap().to_string();

        // No overlay present: base wins.
        let cfg = load_app_config_with_env(&base_path, "dev").expect("load");
        assert_eq!(cfg.llm.model_name, "test-model");
    }
}
