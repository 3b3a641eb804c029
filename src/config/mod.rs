//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{collections::HashMap, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "mecenate";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_CACHE_DIR: &str = "cache";
const DEFAULT_REFRESH_MINUTES: u64 = 60;
const DEFAULT_CANVAS_WIDTH: u32 = 800;
const DEFAULT_AVATAR_SIZE: u32 = 45;
const DEFAULT_AVATAR_MARGIN: u32 = 5;
const DEFAULT_FONT_SIZE: u32 = 14;
const DEFAULT_FONT_FAMILY: &str =
    "system-ui, -apple-system, 'Segoe UI', Roboto, Ubuntu, Cantarell, 'Noto Sans', sans-serif";
const DEFAULT_BACKGROUND_COLOR: &str = "transparent";
const DEFAULT_PADDING_X: u32 = 10;
const DEFAULT_PADDING_Y: u32 = 10;
const DEFAULT_CONVERT_PATH: &str = "convert";
const DEFAULT_RASTER_QUALITY: u8 = 90;

/// Command-line arguments for the Mecenate binary.
#[derive(Debug, Parser)]
#[command(name = "mecenate", version, about = "Mecenate sponsor wall server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MECENATE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Mecenate HTTP service.
    Serve(Box<ServeArgs>),
    /// Build the sponsor artifacts once and exit.
    #[command(name = "generate")]
    Generate(GenerateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub overrides: ArtifactOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ArtifactOverrides {
    /// Override the artifact output directory.
    #[arg(long = "output-directory", value_name = "PATH")]
    pub output_directory: Option<PathBuf>,

    /// Override the avatar cache directory.
    #[arg(long = "cache-directory", value_name = "PATH")]
    pub cache_directory: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub artifacts: ArtifactOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the staleness interval in minutes.
    #[arg(long = "refresh-minutes", value_name = "MINUTES")]
    pub refresh_minutes: Option<u64>,

    /// Override the ImageMagick convert binary used for raster derivatives.
    #[arg(long = "convert-path", value_name = "PATH")]
    pub convert_path: Option<PathBuf>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub sources: SourceSettings,
    pub policy: PolicySettings,
    pub render: RenderSettings,
    pub output: OutputSettings,
    pub cache: CacheSettings,
    pub raster: RasterSettings,
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Per-platform credentials. A source participates in aggregation only when
/// its credential set is complete.
#[derive(Debug, Clone, Default)]
pub struct SourceSettings {
    pub github: GithubSettings,
    pub opencollective: OpenCollectiveSettings,
    pub patreon: PatreonSettings,
    pub afdian: AfdianSettings,
}

#[derive(Debug, Clone, Default)]
pub struct GithubSettings {
    pub token: Option<String>,
    pub login: Option<String>,
    pub include_private: bool,
    pub orgs: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OpenCollectiveSettings {
    pub slug: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PatreonSettings {
    pub access_token: Option<String>,
    pub campaign_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AfdianSettings {
    pub user_id: Option<String>,
    pub token: Option<String>,
}

/// Filter/override/merge policy knobs; login matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct PolicySettings {
    pub exclude: Vec<String>,
    pub include: Vec<String>,
    pub forced_amounts: HashMap<String, f64>,
    pub merge_accounts: bool,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            include: Vec::new(),
            forced_amounts: HashMap::new(),
            merge_accounts: true,
        }
    }
}

/// Canvas and label parameters for the sponsor wall.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub canvas_width: u32,
    pub avatar_size: u32,
    pub avatar_margin: u32,
    pub font_size: u32,
    pub font_family: String,
    pub show_amount: bool,
    pub show_name: bool,
    pub background_color: String,
    pub padding_x: u32,
    pub padding_y: u32,
    /// Avatar reference substituted when a sponsor has none or resolution
    /// fails; `None` falls back to a built-in inline placeholder.
    pub default_avatar: Option<String>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            canvas_width: DEFAULT_CANVAS_WIDTH,
            avatar_size: DEFAULT_AVATAR_SIZE,
            avatar_margin: DEFAULT_AVATAR_MARGIN,
            font_size: DEFAULT_FONT_SIZE,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            show_amount: false,
            show_name: false,
            background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
            padding_x: DEFAULT_PADDING_X,
            padding_y: DEFAULT_PADDING_Y,
            default_avatar: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RasterSettings {
    pub convert_path: PathBuf,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub refresh_interval: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Parse the CLI and load settings in one step.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("MECENATE")
            .prefix_separator("_")
            .separator("__"),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Generate(args)) => raw.apply_artifact_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    sources: RawSourceSettings,
    policy: RawPolicySettings,
    render: RawRenderSettings,
    output: RawOutputSettings,
    cache: RawCacheSettings,
    raster: RawRasterSettings,
    scheduler: RawSchedulerSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(minutes) = overrides.refresh_minutes {
            self.scheduler.refresh_minutes = Some(minutes);
        }
        if let Some(path) = overrides.convert_path.as_ref() {
            self.raster.convert_path = Some(path.clone());
        }

        self.apply_artifact_overrides(&overrides.artifacts);
    }

    fn apply_artifact_overrides(&mut self, overrides: &ArtifactOverrides) {
        if let Some(directory) = overrides.output_directory.as_ref() {
            self.output.directory = Some(directory.clone());
        }
        if let Some(directory) = overrides.cache_directory.as_ref() {
            self.cache.directory = Some(directory.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            sources,
            policy,
            render,
            output,
            cache,
            raster,
            scheduler,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let sources = build_source_settings(sources)?;
        let policy = build_policy_settings(policy);
        let render = build_render_settings(render)?;
        let output = build_output_settings(output);
        let cache = build_cache_settings(cache);
        let raster = build_raster_settings(raster)?;
        let scheduler = build_scheduler_settings(scheduler)?;

        Ok(Self {
            server,
            logging,
            sources,
            policy,
            render,
            output,
            cache,
            raster,
            scheduler,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = format!("{host}:{port}")
        .parse::<SocketAddr>()
        .map_err(|err| LoadError::invalid("server.addr", err.to_string()))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_source_settings(sources: RawSourceSettings) -> Result<SourceSettings, LoadError> {
    let github = GithubSettings {
        token: non_empty(sources.github.token),
        login: non_empty(sources.github.login),
        include_private: sources.github.include_private.unwrap_or(false),
        orgs: sources.github.orgs.unwrap_or_default(),
    };
    if github.token.is_some() && github.login.is_none() {
        return Err(LoadError::invalid(
            "sources.github",
            "token provided but login is missing",
        ));
    }

    let opencollective = OpenCollectiveSettings {
        slug: non_empty(sources.opencollective.slug),
        api_key: non_empty(sources.opencollective.api_key),
    };
    if opencollective.slug.is_some() && opencollective.api_key.is_none() {
        return Err(LoadError::invalid(
            "sources.opencollective",
            "slug provided but api key is missing",
        ));
    }

    let patreon = PatreonSettings {
        access_token: non_empty(sources.patreon.access_token),
        campaign_id: non_empty(sources.patreon.campaign_id),
    };
    if patreon.access_token.is_some() && patreon.campaign_id.is_none() {
        return Err(LoadError::invalid(
            "sources.patreon",
            "access token provided but campaign id is missing",
        ));
    }

    let afdian = AfdianSettings {
        user_id: non_empty(sources.afdian.user_id),
        token: non_empty(sources.afdian.token),
    };
    if afdian.user_id.is_some() && afdian.token.is_none() {
        return Err(LoadError::invalid(
            "sources.afdian",
            "user id provided but token is missing",
        ));
    }

    Ok(SourceSettings {
        github,
        opencollective,
        patreon,
        afdian,
    })
}

fn build_policy_settings(policy: RawPolicySettings) -> PolicySettings {
    let defaults = PolicySettings::default();
    PolicySettings {
        exclude: policy.exclude.unwrap_or_default(),
        include: policy.include.unwrap_or_default(),
        forced_amounts: policy.forced_amounts.unwrap_or_default(),
        merge_accounts: policy.merge_accounts.unwrap_or(defaults.merge_accounts),
    }
}

fn build_render_settings(raw: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let mut render = RenderSettings::default();

    if let Some(width) = raw.canvas_width {
        render.canvas_width = width;
    }
    if let Some(size) = raw.avatar_size {
        render.avatar_size = size;
    }
    if let Some(margin) = raw.avatar_margin {
        render.avatar_margin = margin;
    }
    if let Some(size) = raw.font_size {
        render.font_size = size;
    }
    if let Some(family) = raw.font_family {
        render.font_family = family;
    }
    if let Some(show) = raw.show_amount {
        render.show_amount = show;
    }
    if let Some(show) = raw.show_name {
        render.show_name = show;
    }
    if let Some(color) = raw.background_color {
        render.background_color = color;
    }
    if let Some(padding) = raw.padding_x {
        render.padding_x = padding;
    }
    if let Some(padding) = raw.padding_y {
        render.padding_y = padding;
    }
    render.default_avatar = non_empty(raw.default_avatar);

    if render.canvas_width == 0 {
        return Err(LoadError::invalid(
            "render.canvas_width",
            "must be greater than zero",
        ));
    }
    if render.avatar_size == 0 {
        return Err(LoadError::invalid(
            "render.avatar_size",
            "must be greater than zero",
        ));
    }
    if render.font_size == 0 {
        return Err(LoadError::invalid(
            "render.font_size",
            "must be greater than zero",
        ));
    }

    Ok(render)
}

fn build_output_settings(output: RawOutputSettings) -> OutputSettings {
    OutputSettings {
        directory: output
            .directory
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
    }
}

fn build_cache_settings(cache: RawCacheSettings) -> CacheSettings {
    CacheSettings {
        directory: cache
            .directory
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
    }
}

fn build_raster_settings(raster: RawRasterSettings) -> Result<RasterSettings, LoadError> {
    let convert_path = raster
        .convert_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONVERT_PATH));
    if convert_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "raster.convert_path",
            "path must not be empty",
        ));
    }

    let jpeg_quality = raster.jpeg_quality.unwrap_or(DEFAULT_RASTER_QUALITY);
    if !(1..=100).contains(&jpeg_quality) {
        return Err(LoadError::invalid(
            "raster.jpeg_quality",
            "must be between 1 and 100",
        ));
    }

    Ok(RasterSettings {
        convert_path,
        jpeg_quality,
    })
}

fn build_scheduler_settings(
    scheduler: RawSchedulerSettings,
) -> Result<SchedulerSettings, LoadError> {
    let refresh_minutes = scheduler.refresh_minutes.unwrap_or(DEFAULT_REFRESH_MINUTES);
    if refresh_minutes == 0 {
        return Err(LoadError::invalid(
            "scheduler.refresh_minutes",
            "must be greater than zero",
        ));
    }

    Ok(SchedulerSettings {
        refresh_interval: Duration::from_secs(refresh_minutes * 60),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSourceSettings {
    github: RawGithubSettings,
    opencollective: RawOpenCollectiveSettings,
    patreon: RawPatreonSettings,
    afdian: RawAfdianSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGithubSettings {
    token: Option<String>,
    login: Option<String>,
    include_private: Option<bool>,
    orgs: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOpenCollectiveSettings {
    slug: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPatreonSettings {
    access_token: Option<String>,
    campaign_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAfdianSettings {
    user_id: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPolicySettings {
    exclude: Option<Vec<String>>,
    include: Option<Vec<String>>,
    forced_amounts: Option<HashMap<String, f64>>,
    merge_accounts: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    canvas_width: Option<u32>,
    avatar_size: Option<u32>,
    avatar_margin: Option<u32>,
    font_size: Option<u32>,
    font_family: Option<String>,
    show_amount: Option<bool>,
    show_name: Option<bool>,
    background_color: Option<String>,
    padding_x: Option<u32>,
    padding_y: Option<u32>,
    default_avatar: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOutputSettings {
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRasterSettings {
    convert_path: Option<PathBuf>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSchedulerSettings {
    refresh_minutes: Option<u64>,
}

#[cfg(test)]
mod tests;
