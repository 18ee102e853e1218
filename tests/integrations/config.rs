use clap::Parser;
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use ytwatch::{
    cli::Cli,
    config::{ChannelPolicy, Config, DeliveryMode},
};

/// A helper function to run a test with a temporary config file.
fn with_config_file<F>(toml_content: &str, test_fn: F)
where
    F: FnOnce(PathBuf),
{
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", toml_content).unwrap();
    test_fn(file.path().to_path_buf());
}

fn cli_for(path: &PathBuf, extra: &[&str]) -> Cli {
    let mut args = vec!["ytwatch", "--config", path.to_str().unwrap()];
    args.extend_from_slice(extra);
    Cli::try_parse_from(args).unwrap()
}

#[test]
#[serial]
fn test_load_full_valid_config() {
    let toml_content = r#"
        log_level = "debug"
        [server]
        listen_address = "127.0.0.1:9000"
        webhook_path = "/hub"
        max_body_bytes = 2048
        [hub]
        hub_url = "https://hub.example.com/subscribe"
        callback_url = "https://alerts.example.com/hub"
        secret = "s3cret"
        verify_token_prefix = "p-"
        verify_token_suffix = "-s"
        request_timeout_seconds = 3
        [checker]
        api_base_url = "https://api.example.com/youtube/v3"
        api_key = "key"
        request_timeout_seconds = 4
        [monitor]
        enabled = false
        poll_interval_seconds = 30
        [webhook]
        delivery = "immediate"
        queue_capacity = 8
        [webhook.channel_policy]
        mode = "strict"
        channel_id = "UC1"
        [directory]
        watch = true
        streamers = [{ channel_id = "UC1", name = "One" }]
        [events]
        capacity = 10
        [metrics]
        enabled = true
        listen_address = "127.0.0.1:9999"
    "#;

    with_config_file(toml_content, |path| {
        let config = Config::load(&cli_for(&path, &[])).unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.server.listen_address.port(), 9000);
        assert_eq!(config.server.webhook_path, "/hub");
        assert_eq!(config.server.max_body_bytes, 2048);
        assert_eq!(config.hub.secret.as_deref(), Some("s3cret"));
        assert!(config.hub.alerts_enabled());
        assert_eq!(config.checker.api_key, "key");
        assert!(!config.monitor.enabled);
        assert_eq!(config.monitor.poll_interval_seconds, 30);
        assert_eq!(config.webhook.delivery, DeliveryMode::Immediate);
        assert_eq!(
            config.webhook.channel_policy,
            ChannelPolicy::Strict {
                channel_id: "UC1".to_string()
            }
        );
        assert_eq!(config.directory.streamers.len(), 1);
        assert_eq!(config.events.capacity, 10);
        assert!(config.metrics.enabled);
    });
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    let cli = Cli::try_parse_from(["ytwatch", "--config", "/nonexistent/ytwatch.toml"]).unwrap();
    let config = Config::load(&cli).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
#[serial]
fn test_env_overrides_file_and_cli_overrides_env() {
    let toml_content = r#"
        [monitor]
        poll_interval_seconds = 30
        [hub]
        callback_url = "https://from-file.example.com/alerts"
    "#;

    with_config_file(toml_content, |path| {
        std::env::set_var("YTWATCH_MONITOR__POLL_INTERVAL_SECONDS", "45");
        std::env::set_var("YTWATCH_HUB__CALLBACK_URL", "https://from-env.example.com/alerts");

        let from_env = Config::load(&cli_for(&path, &[])).unwrap();
        let from_cli = Config::load(&cli_for(
            &path,
            &["--poll-interval", "5", "--queue-capacity", "7", "--listen", "127.0.0.1:8181"],
        ))
        .unwrap();

        std::env::remove_var("YTWATCH_MONITOR__POLL_INTERVAL_SECONDS");
        std::env::remove_var("YTWATCH_HUB__CALLBACK_URL");

        assert_eq!(from_env.monitor.poll_interval_seconds, 45);
        assert_eq!(from_env.hub.callback_url, "https://from-env.example.com/alerts");
        assert_eq!(from_cli.monitor.poll_interval_seconds, 5);
        assert_eq!(from_cli.webhook.queue_capacity, 7);
        assert_eq!(from_cli.server.listen_address.port(), 8181);
    });
}

#[test]
#[serial]
fn test_invalid_values_are_rejected() {
    with_config_file("[monitor]\npoll_interval_seconds = 0\n", |path| {
        assert!(Config::load(&cli_for(&path, &[])).is_err());
    });
    with_config_file("[webhook]\ndelivery = \"sometimes\"\n", |path| {
        assert!(Config::load(&cli_for(&path, &[])).is_err());
    });
}
