use clap::Parser;

use super::*;

#[test]
fn defaults_apply_when_nothing_is_configured() {
    let settings = Settings::from_raw(RawSettings::default()).expect("defaults must load");

    assert_eq!(settings.transport.api_base_url.as_str(), "https://api.prenota.example/v1");
    assert_eq!(
        settings.transport.channel_url.as_str(),
        "wss://push.prenota.example/subscribe"
    );
    assert_eq!(settings.transport.language, Locale::It);
    assert_eq!(settings.transport.request_timeout, Duration::from_secs(15));
    assert_eq!(settings.sync.entry_limit, 512);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert_eq!(settings.logging.format, LogFormat::Compact);
    assert!(settings.session.credential_path.is_none());
}

#[test]
fn raw_values_override_defaults() {
    let raw = RawSettings {
        transport: RawTransportSettings {
            api_base_url: Some("https://staging.prenota.example/api".to_string()),
            language: Some("de".to_string()),
            request_timeout_secs: Some(3),
            ..Default::default()
        },
        logging: RawLoggingSettings {
            level: Some("debug".to_string()),
            format: Some("json".to_string()),
        },
        ..Default::default()
    };

    let settings = Settings::from_raw(raw).expect("overrides must load");
    assert_eq!(settings.transport.api_base_url.host_str(), Some("staging.prenota.example"));
    assert_eq!(settings.transport.language, Locale::De);
    assert_eq!(settings.transport.request_timeout, Duration::from_secs(3));
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.logging.format, LogFormat::Json);
}

#[test]
fn cli_overrides_win_over_raw_values() {
    let raw = RawSettings {
        transport: RawTransportSettings {
            language: Some("en".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut settings = Settings::from_raw(raw).unwrap();

    let args = WatchArgs {
        api_base_url: Some("https://cli.prenota.example/v2".to_string()),
        language: Some("de".to_string()),
        ..Default::default()
    };
    settings.apply_watch_overrides(&args).unwrap();

    assert_eq!(settings.transport.api_base_url.host_str(), Some("cli.prenota.example"));
    assert_eq!(settings.transport.language, Locale::De);
}

#[test]
fn unknown_language_is_rejected() {
    let raw = RawSettings {
        transport: RawTransportSettings {
            language: Some("fr".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(matches!(Settings::from_raw(raw), Err(LoadError::UnknownLanguage(_))));
}

#[test]
fn malformed_url_is_rejected() {
    let raw = RawSettings {
        transport: RawTransportSettings {
            api_base_url: Some("not a url".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(matches!(Settings::from_raw(raw), Err(LoadError::InvalidUrl { .. })));
}

#[test]
fn unknown_log_format_is_rejected() {
    let raw = RawSettings {
        logging: RawLoggingSettings {
            format: Some("xml".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(matches!(Settings::from_raw(raw), Err(LoadError::UnknownLogFormat(_))));
}

#[test]
fn watch_subcommand_parses() {
    let cli = CliArgs::parse_from([
        "prenota",
        "watch",
        "--api-base-url",
        "https://api.prenota.example/v1",
        "--language",
        "en",
    ]);

    match cli.command {
        Some(Command::Watch(args)) => {
            assert_eq!(args.api_base_url.as_deref(), Some("https://api.prenota.example/v1"));
            assert_eq!(args.language.as_deref(), Some("en"));
        }
        other => panic!("expected watch command, got {other:?}"),
    }
}
