use std::env;

use attachments_core::config::{
    DEFAULT_CONCURRENCY, DEFAULT_SERVICE_URL, ENV_API_KEY, ENV_CONCURRENCY, ENV_PREFER,
    ENV_SERVICE_URL, ENV_TIMEOUT,
};
use attachments_core::{Attachments, Config, ConfigPatch, PreferMode};
use serial_test::serial;

const ALL: [&str; 5] = [ENV_API_KEY, ENV_PREFER, ENV_SERVICE_URL, ENV_TIMEOUT, ENV_CONCURRENCY];

fn clear_env() {
    for key in ALL {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn environment_layer_is_read() {
    clear_env();
    env::set_var(ENV_API_KEY, "env-key");
    env::set_var(ENV_PREFER, "service-only");
    env::set_var(ENV_SERVICE_URL, "https://service.test/api/");
    env::set_var(ENV_TIMEOUT, "5");

    let config = Config::resolve(&ConfigPatch::default(), &ConfigPatch::default());
    assert_eq!(config.api_key.as_deref(), Some("env-key"));
    assert_eq!(config.prefer, PreferMode::ServiceOnly);
    assert_eq!(config.service_url, "https://service.test/api");
    assert_eq!(config.timeout_secs, 5);
    clear_env();
}

#[test]
#[serial]
fn invalid_environment_values_fall_back_to_defaults() {
    clear_env();
    env::set_var(ENV_PREFER, "sometimes");
    env::set_var(ENV_CONCURRENCY, "lots");
    env::set_var(ENV_API_KEY, "   ");

    let config = Config::resolve(&ConfigPatch::default(), &ConfigPatch::default());
    assert_eq!(config.prefer, PreferMode::Local);
    assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
    assert!(!config.has_api_key());
    assert_eq!(config.service_url, DEFAULT_SERVICE_URL);
    clear_env();
}

#[test]
#[serial]
fn process_wide_layer_beats_environment_and_call_beats_both() {
    clear_env();
    env::set_var(ENV_API_KEY, "env-key");
    env::set_var(ENV_PREFER, "service");

    let ctx = Attachments::new();
    ctx.configure(ConfigPatch {
        api_key: Some("configured-key".into()),
        ..Default::default()
    });
    let config = ctx.resolve_config(&ConfigPatch::default());
    assert_eq!(config.api_key.as_deref(), Some("configured-key"));
    assert_eq!(config.prefer, PreferMode::Service);

    let config = ctx.resolve_config(&ConfigPatch {
        prefer: Some(PreferMode::LocalOnly),
        ..Default::default()
    });
    assert_eq!(config.prefer, PreferMode::LocalOnly);
    assert_eq!(config.api_key.as_deref(), Some("configured-key"));
    clear_env();
}

#[test]
#[serial]
fn debug_output_never_contains_the_key() {
    clear_env();
    env::set_var(ENV_API_KEY, "super-secret-value");
    let config = Config::resolve(&ConfigPatch::default(), &ConfigPatch::default());
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("super-secret-value"));
    assert!(rendered.contains("<redacted>"));
    let json = serde_json::to_string(&config).unwrap();
    assert!(!json.contains("super-secret-value"));
    clear_env();
}
