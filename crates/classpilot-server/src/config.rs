use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    #[serde(default)]
    pub cors: CorsConfig,
}

/// Cross-origin policy for browser front-ends. Disabled unless configured.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    /// Explicit origins; a single `*` allows any origin.
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl CorsConfig {
    pub const ANY_ORIGIN: &'static str = "*";

    pub fn allows_any_origin(&self) -> bool {
        self.allow_origins
            .iter()
            .any(|origin| origin.trim() == Self::ANY_ORIGIN)
    }

    /// Rejects combinations browsers would refuse anyway.
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if self.allow_origins.is_empty() {
            return Err("allow_origins must list at least one origin".to_string());
        }
        if self.allows_any_origin() && self.allow_origins.len() > 1 {
            return Err("`*` cannot be mixed with explicit origins".to_string());
        }
        if self.allows_any_origin() && self.allow_credentials {
            return Err("allow_credentials cannot be combined with `*` origin".to_string());
        }
        Ok(())
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allow_origins: Vec::new(),
            allow_methods: ["GET", "POST", "OPTIONS"].map(String::from).to_vec(),
            allow_headers: ["content-type", "x-request-id"].map(String::from).to_vec(),
            expose_headers: vec!["x-request-id".to_string()],
            allow_credentials: false,
            max_age_secs: 600,
        }
    }
}
