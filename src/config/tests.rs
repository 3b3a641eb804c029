use clap::Parser;
use serial_test::serial;

use super::*;

#[test]
fn defaults_match_shipped_configuration() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.render.canvas_width, DEFAULT_CANVAS_WIDTH);
    assert_eq!(settings.render.avatar_size, DEFAULT_AVATAR_SIZE);
    assert_eq!(settings.render.avatar_margin, DEFAULT_AVATAR_MARGIN);
    assert_eq!(settings.render.padding_x, DEFAULT_PADDING_X);
    assert_eq!(settings.render.padding_y, DEFAULT_PADDING_Y);
    assert!(!settings.render.show_amount);
    assert!(!settings.render.show_name);
    assert_eq!(settings.output.directory, PathBuf::from(DEFAULT_OUTPUT_DIR));
    assert_eq!(settings.cache.directory, PathBuf::from(DEFAULT_CACHE_DIR));
    assert_eq!(
        settings.scheduler.refresh_interval,
        Duration::from_secs(DEFAULT_REFRESH_MINUTES * 60)
    );
    assert!(settings.policy.merge_accounts);
    assert_eq!(settings.raster.jpeg_quality, DEFAULT_RASTER_QUALITY);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn artifact_directories_can_be_overridden() {
    let mut raw = RawSettings::default();
    let overrides = ArtifactOverrides {
        output_directory: Some(PathBuf::from("/srv/wall")),
        cache_directory: Some(PathBuf::from("/var/cache/wall")),
    };

    raw.apply_artifact_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.output.directory, PathBuf::from("/srv/wall"));
    assert_eq!(settings.cache.directory, PathBuf::from("/var/cache/wall"));
}

#[test]
fn github_token_without_login_is_rejected() {
    let mut raw = RawSettings::default();
    raw.sources.github.token = Some("ghp_secret".to_string());

    let err = Settings::from_raw(raw).expect_err("incomplete credentials");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "sources.github",
            ..
        }
    ));
}

#[test]
fn opencollective_slug_without_key_is_rejected() {
    let mut raw = RawSettings::default();
    raw.sources.opencollective.slug = Some("tools".to_string());

    let err = Settings::from_raw(raw).expect_err("incomplete credentials");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "sources.opencollective",
            ..
        }
    ));
}

#[test]
fn blank_credentials_count_as_absent() {
    let mut raw = RawSettings::default();
    raw.sources.afdian.user_id = Some("   ".to_string());
    raw.sources.afdian.token = Some(String::new());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.sources.afdian.user_id.is_none());
    assert!(settings.sources.afdian.token.is_none());
}

#[test]
fn zero_refresh_interval_is_rejected() {
    let mut raw = RawSettings::default();
    raw.scheduler.refresh_minutes = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero interval");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "scheduler.refresh_minutes",
            ..
        }
    ));
}

#[test]
fn out_of_range_jpeg_quality_is_rejected() {
    let mut raw = RawSettings::default();
    raw.raster.jpeg_quality = Some(0);

    let err = Settings::from_raw(raw).expect_err("quality out of range");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "raster.jpeg_quality",
            ..
        }
    ));
}

#[test]
fn zero_avatar_size_is_rejected() {
    let mut raw = RawSettings::default();
    raw.render.avatar_size = Some(0);

    let err = Settings::from_raw(raw).expect_err("degenerate avatar size");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "render.avatar_size",
            ..
        }
    ));
}

#[test]
fn forced_amounts_deserialize_from_table() {
    let mut raw = RawSettings::default();
    let mut forced = HashMap::new();
    forced.insert("octocat".to_string(), 25.0);
    raw.policy.forced_amounts = Some(forced);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.policy.forced_amounts.get("octocat"), Some(&25.0));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["mecenate"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_arguments() {
    let args = CliArgs::parse_from([
        "mecenate",
        "serve",
        "--server-host",
        "127.0.0.1",
        "--server-port",
        "9000",
        "--refresh-minutes",
        "15",
        "--output-directory",
        "/srv/wall",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("127.0.0.1"));
            assert_eq!(serve.overrides.server_port, Some(9000));
            assert_eq!(serve.overrides.refresh_minutes, Some(15));
            assert_eq!(
                serve.overrides.artifacts.output_directory,
                Some(PathBuf::from("/srv/wall"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_generate_arguments() {
    let args = CliArgs::parse_from(["mecenate", "generate", "--cache-directory", "/tmp/avatars"]);

    match args.command.expect("generate command") {
        Command::Generate(generate) => {
            assert_eq!(
                generate.overrides.cache_directory,
                Some(PathBuf::from("/tmp/avatars"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
#[serial]
fn environment_variables_override_file_defaults() {
    // SAFETY: guarded by #[serial]; no other test mutates this variable.
    unsafe {
        std::env::set_var("MECENATE_SERVER__PORT", "9123");
    }

    let cli = CliArgs::parse_from(["mecenate"]);
    let settings = load(&cli).expect("valid settings");

    unsafe {
        std::env::remove_var("MECENATE_SERVER__PORT");
    }

    assert_eq!(settings.server.addr.port(), 9123);
}
