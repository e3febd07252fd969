use std::env;

/// Runtime configuration for the analytics backend
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Maximum upload size in bytes (default: 50 MB)
    pub max_file_size: usize,

    /// Largest stored file that is parsed into a table in memory (default: 20 MB)
    pub max_parse_size: usize,

    /// JWT signing secret
    pub jwt_secret: String,

    /// Lifetime of issued tokens in minutes (default: 60)
    pub token_ttl_minutes: i64,

    /// Allowed CORS origins (comma separated, "*" for any)
    pub allowed_origins: Vec<String>,

    /// Blob store: "local" or "s3" (default: "local")
    pub storage_backend: String,

    /// Root directory of the local blob store
    pub storage_dir: String,

    /// Emails that are granted admin rights when they register
    pub admin_emails: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024, // 50 MB
            max_parse_size: 20 * 1024 * 1024, // 20 MB
            jwt_secret: "secret".to_string(),
            token_ttl_minutes: 60,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:5173".to_string(),
            ],
            storage_backend: "local".to_string(),
            storage_dir: "./data/uploads".to_string(),
            admin_emails: Vec::new(),
        }
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            max_parse_size: env::var("MAX_PARSE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_parse_size),

            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret),

            token_ttl_minutes: env::var("TOKEN_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &i64| *v > 0)
                .unwrap_or(default.token_ttl_minutes),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| parse_list(&v))
                .unwrap_or(default.allowed_origins),

            storage_backend: env::var("STORAGE_BACKEND")
                .map(|v| v.to_lowercase())
                .unwrap_or(default.storage_backend),

            storage_dir: env::var("STORAGE_DIR").unwrap_or(default.storage_dir),

            admin_emails: env::var("ADMIN_EMAILS")
                .ok()
                .map(|v| parse_list(&v.to_lowercase()))
                .unwrap_or(default.admin_emails),
        }
    }

    /// Config for local development and tests
    pub fn development() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            ..Self::default()
        }
    }

    /// Config for production: the signing secret must be provided
    pub fn production() -> anyhow::Result<Self> {
        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET must be set in production"))?;
        Ok(Self {
            jwt_secret,
            ..Self::from_env()
        })
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.admin_emails.iter().any(|e| *e == email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.max_file_size, 50 * 1024 * 1024);
        assert_eq!(config.token_ttl_minutes, 60);
        assert_eq!(config.storage_backend, "local");
        assert!(!config.allowed_origins.contains(&"*".to_string()));
    }

    #[test]
    fn test_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.allowed_origins, vec!["*".to_string()]);
        assert!(config.admin_emails.is_empty());
    }

    #[test]
    fn test_parse_list_skips_blanks() {
        assert_eq!(
            parse_list(" a@x.com, ,b@x.com "),
            vec!["a@x.com".to_string(), "b@x.com".to_string()]
        );
    }

    #[test]
    fn test_admin_email_match_is_case_insensitive() {
        let config = AppConfig {
            admin_emails: vec!["boss@x.com".to_string()],
            ..AppConfig::default()
        };
        assert!(config.is_admin_email("Boss@X.com"));
        assert!(!config.is_admin_email("jo@x.com"));
    }
}
