use crate::config::settings::ConfigError;
use std::env;
use std::fmt::Display;
use std::str::FromStr;

pub enum EnvKey {
    AppEnv,
    HttpPort,
    Workers,
    DatabaseUrl,
    DatabaseMaxConnections,
    RabbitMqHost,
    RabbitMqPort,
    RabbitMqUser,
    RabbitMqPass,
    MinioUrl,
    MinioBucket,
    MinioRegion,
    MinioAccessKey,
    MinioSecretKey,
    TempDir,
    FfmpegPath,
    FfprobePath,
    DlqReplayCron,
    DlqReplayMax,
    DlqReplayBatch,
    LogFormat,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::AppEnv => "APP_ENV",
            EnvKey::HttpPort => "HTTP_PORT",
            EnvKey::Workers => "WORKERS",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::DatabaseMaxConnections => "DATABASE_MAX_CONNECTIONS",
            EnvKey::RabbitMqHost => "RABBITMQ_HOST",
            EnvKey::RabbitMqPort => "RABBITMQ_PORT",
            EnvKey::RabbitMqUser => "RABBITMQ_USER",
            EnvKey::RabbitMqPass => "RABBITMQ_PASS",
            EnvKey::MinioUrl => "MINIO_ENDPOINT",
            EnvKey::MinioBucket => "MINIO_BUCKET",
            EnvKey::MinioRegion => "MINIO_REGION",
            EnvKey::MinioAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::MinioSecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::TempDir => "TEMP_DIR",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::FfprobePath => "FFPROBE_PATH",
            EnvKey::DlqReplayCron => "DLQ_REPLAY_CRON",
            EnvKey::DlqReplayMax => "DLQ_REPLAY_MAX",
            EnvKey::DlqReplayBatch => "DLQ_REPLAY_BATCH",
            EnvKey::LogFormat => "LOG_FORMAT",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

/// Parse `key` when it is set, falling back to `default` when it is unset or
/// blank. A value that is present but does not parse is an error.
pub fn get_parsed<T>(key: EnvKey, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    parse_value(key.as_str(), get_opt(key), default)
}

fn parse_value<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        Some(val) => val.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key: name,
            reason: format!("'{}': {}", val, e),
        }),
        None => Ok(default),
    }
}
