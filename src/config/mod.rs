use std::env;
use std::path::PathBuf;

/// Runtime configuration for the report service
#[derive(Debug, Clone)]
pub struct ReportsConfig {
    /// Maximum report size in bytes (default: 50 MB)
    pub max_file_size: usize,

    /// Root directory holding the per-owner blob partitions (default: "uploads")
    pub uploads_dir: PathBuf,

    /// URL prefix under which `uploads_dir` is served (default: "/uploads")
    pub public_uploads_path: String,

    /// Allowed CORS origins (comma separated, "*" for any)
    pub allowed_origins: Vec<String>,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024, // 50 MB
            uploads_dir: PathBuf::from("uploads"),
            public_uploads_path: "/uploads".to_string(),
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl ReportsConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            uploads_dir: env::var("UPLOADS_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.uploads_dir),

            public_uploads_path: env::var("PUBLIC_UPLOADS_PATH")
                .ok()
                .map(|v| normalize_public_path(&v))
                .filter(|v| !v.is_empty())
                .unwrap_or(default.public_uploads_path),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|origins| !origins.is_empty())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Config for local development and tests: small limit, blobs under `uploads_dir`
    pub fn development(uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            uploads_dir: uploads_dir.into(),
            ..Self::default()
        }
    }

    /// Request body limit: the file itself plus room for multipart framing and text fields
    pub fn body_limit(&self) -> usize {
        self.max_file_size + 1024 * 1024
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

fn normalize_public_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
