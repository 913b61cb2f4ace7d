use super::parsing::{
    env_optional, env_or_default, is_supported_image_extension, parse_bool, parse_cors_origins,
    parse_environment, parse_string_list, parse_u16, parse_u32, parse_u64, parse_usize,
};
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, LlmSettings, ParsingSettings,
    RedisSettings, RuntimeSettings, S3Settings, SecuritySettings, ServerHost, ServerPort,
    ServerSettings, Settings, StorageSettings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("MEP_HOST", "0.0.0.0");
        let port = env_or_default("MEP_PORT", "8000");

        let environment =
            parse_environment(env_optional("MEP_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("MEP_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Mock Exam Parser");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let admin_api_token = env_or_default("ADMIN_API_TOKEN", "");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "mock_exam");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "mock_exam_db");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let llm_api_key = env_or_default("ANTHROPIC_API_KEY", "");
        let llm_base_url = env_or_default("ANTHROPIC_BASE_URL", "https://api.anthropic.com/v1");
        let llm_api_version = env_or_default("ANTHROPIC_VERSION", "2023-06-01");
        let llm_model = env_or_default("LLM_MODEL", "claude-sonnet-4-20250514");
        let llm_max_tokens =
            parse_u32("LLM_MAX_TOKENS", env_or_default("LLM_MAX_TOKENS", "64000"))?;
        let llm_request_timeout =
            parse_u64("LLM_REQUEST_TIMEOUT", env_or_default("LLM_REQUEST_TIMEOUT", "600"))?;
        let llm_stream = env_optional("LLM_STREAM").map(|value| parse_bool(&value)).unwrap_or(true);

        let chunk_size = parse_u32("PARSE_CHUNK_SIZE", env_or_default("PARSE_CHUNK_SIZE", "30"))?;
        let chunk_delay_ms =
            parse_u64("PARSE_CHUNK_DELAY_MS", env_or_default("PARSE_CHUNK_DELAY_MS", "2000"))?;
        let heartbeat_seconds = parse_u64(
            "PARSE_HEARTBEAT_SECONDS",
            env_or_default("PARSE_HEARTBEAT_SECONDS", "15"),
        )?;
        let stale_processing_minutes = parse_u64(
            "STALE_PROCESSING_MINUTES",
            env_or_default("STALE_PROCESSING_MINUTES", "5"),
        )?;
        let large_document_chars = parse_usize(
            "LARGE_DOCUMENT_CHARS",
            env_or_default("LARGE_DOCUMENT_CHARS", "60000"),
        )?;
        let parse_rate_limit_per_minute = parse_u64(
            "PARSE_RATE_LIMIT_PER_MINUTE",
            env_or_default("PARSE_RATE_LIMIT_PER_MINUTE", "10"),
        )?;

        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "50"))?;
        let allowed_image_extensions = parse_string_list(
            env_optional("ALLOWED_IMAGE_EXTENSIONS"),
            &["jpg", "jpeg", "png", "webp", "gif"],
        );

        let s3_endpoint = env_or_default("S3_ENDPOINT", "http://localhost:9000");
        let s3_access_key = env_or_default("S3_ACCESS_KEY", "");
        let s3_secret_key = env_or_default("S3_SECRET_KEY", "");
        let s3_region = env_or_default("S3_REGION", "us-east-1");
        let s3_pdf_bucket = env_or_default("S3_PDF_BUCKET", "mock-exam-pdfs");
        let s3_image_bucket = env_or_default("S3_IMAGE_BUCKET", "mock-exam-images");
        let s3_public_base_url = env_or_default("S3_PUBLIC_BASE_URL", "");
        let signed_url_expire_seconds = parse_u64(
            "SIGNED_URL_EXPIRE_SECONDS",
            env_or_default("SIGNED_URL_EXPIRE_SECONDS", "3600"),
        )?;

        let log_level = env_or_default("MEP_LOG_LEVEL", "info");
        let json = env_optional("MEP_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { admin_api_token },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            llm: LlmSettings {
                api_key: llm_api_key,
                base_url: llm_base_url,
                api_version: llm_api_version,
                model: llm_model,
                max_tokens: llm_max_tokens,
                request_timeout: llm_request_timeout,
                stream: llm_stream,
            },
            parsing: ParsingSettings {
                chunk_size,
                chunk_delay_ms,
                heartbeat_seconds,
                stale_processing_minutes,
                large_document_chars,
                parse_rate_limit_per_minute,
            },
            storage: StorageSettings { max_upload_size_mb, allowed_image_extensions },
            s3: S3Settings {
                endpoint: s3_endpoint,
                access_key: s3_access_key,
                secret_key: s3_secret_key,
                region: s3_region,
                pdf_bucket: s3_pdf_bucket,
                image_bucket: s3_image_bucket,
                public_base_url: s3_public_base_url,
                signed_url_expire_seconds,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn llm(&self) -> &LlmSettings {
        &self.llm
    }

    pub(crate) fn parsing(&self) -> &ParsingSettings {
        &self.parsing
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.allowed_image_extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ALLOWED_IMAGE_EXTENSIONS",
                value: String::from("<empty>"),
            });
        }

        for extension in &self.storage.allowed_image_extensions {
            if !is_supported_image_extension(extension) {
                return Err(ConfigError::InvalidValue {
                    field: "ALLOWED_IMAGE_EXTENSIONS",
                    value: extension.clone(),
                });
            }
        }

        if self.parsing.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "PARSE_CHUNK_SIZE",
                value: "0".to_string(),
            });
        }

        if self.parsing.heartbeat_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "PARSE_HEARTBEAT_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.s3.pdf_bucket == self.s3.image_bucket {
            return Err(ConfigError::InvalidValue {
                field: "S3_IMAGE_BUCKET",
                value: self.s3.image_bucket.clone(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.llm.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("ANTHROPIC_API_KEY"));
        }
        if self.s3.access_key.is_empty() || self.s3.secret_key.is_empty() {
            return Err(ConfigError::MissingSecret("S3_ACCESS_KEY/S3_SECRET_KEY"));
        }
        if self.security.admin_api_token.is_empty() {
            return Err(ConfigError::MissingSecret("ADMIN_API_TOKEN"));
        }

        Ok(())
    }
}
