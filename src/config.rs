//! Environment configuration.
//!
//! Grounded on the teacher's `main.rs` (`dotenv::dotenv().ok()` loaded once at process start) and
//! on `original_source/backend/app/config.py`'s variable naming. Each external dependency has a
//! credential variable whose absence disables that adapter without erroring, per spec §6.

use std::collections::HashMap;
use std::env;

use anyhow::Result;

/// Process-wide configuration, loaded once and handed around as `Arc<Config>`.
#[derive(Debug, Clone)]
pub struct Config {
    pub secret_key: String,
    pub database_url: String,
    pub upload_dir: String,
    pub generated_files_dir: String,
    pub default_model: String,
    pub google_oauth_client_id: Option<String>,
    pub google_oauth_client_secret: Option<String>,

    /// Credential presence per LLM provider, keyed by provider name (`openai`, `google`, `groq`).
    pub llm_credentials: HashMap<String, String>,
    /// Credential presence per job-board provider adapter.
    pub job_provider_credentials: HashMap<String, String>,
    /// Credential presence per HR-lookup provider adapter.
    pub hr_provider_credentials: HashMap<String, String>,
}

impl Config {
    /// Load configuration from the process environment, having first loaded a `.env` file if
    /// present (a no-op in production where real env vars are already set).
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let secret_key = env::var("SECRET_KEY").unwrap_or_else(|_| "dev-secret-change-me".into());
        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "".into());
        let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".into());
        let generated_files_dir =
            env::var("GENERATED_FILES_DIR").unwrap_or_else(|_| "./generated".into());
        let default_model = env::var("DEFAULT_MODEL").unwrap_or_else(|_| "auto".into());
        let google_oauth_client_id = env::var("GOOGLE_OAUTH_CLIENT_ID").ok();
        let google_oauth_client_secret = env::var("GOOGLE_OAUTH_CLIENT_SECRET").ok();

        let llm_credentials = collect_credentials(&[
            ("openai", "OPENAI_API_KEY"),
            ("google", "GOOGLE_API_KEY"),
            ("groq", "GROQ_API_KEY"),
        ]);
        let job_provider_credentials = collect_credentials(&[
            ("linkedin", "JOB_PROVIDER_LINKEDIN_API_KEY"),
            ("indeed", "JOB_PROVIDER_INDEED_API_KEY"),
            ("remotive", "JOB_PROVIDER_REMOTIVE_API_KEY"),
        ]);
        let hr_provider_credentials = collect_credentials(&[
            ("hunter", "HR_PROVIDER_HUNTER_API_KEY"),
            ("apollo", "HR_PROVIDER_APOLLO_API_KEY"),
        ]);

        Ok(Self {
            secret_key,
            database_url,
            upload_dir,
            generated_files_dir,
            default_model,
            google_oauth_client_id,
            google_oauth_client_secret,
            llm_credentials,
            job_provider_credentials,
            hr_provider_credentials,
        })
    }

    pub fn has_llm_credential(&self, provider: &str) -> bool {
        self.llm_credentials.contains_key(provider)
    }

    pub fn has_job_provider_credential(&self, provider: &str) -> bool {
        self.job_provider_credentials.contains_key(provider)
    }

    pub fn has_hr_provider_credential(&self, provider: &str) -> bool {
        self.hr_provider_credentials.contains_key(provider)
    }
}

fn collect_credentials(vars: &[(&str, &str)]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (provider, var_name) in vars {
        if let Ok(value) = env::var(var_name) {
            if !value.is_empty() {
                map.insert((*provider).to_string(), value);
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_disable_adapters_without_erroring() {
        let creds = collect_credentials(&[("openai", "RUST_AGENCY_TEST_UNSET_VAR_XYZ")]);
        assert!(creds.is_empty());
    }

    #[test]
    fn present_credential_is_collected() {
        std::env::set_var("RUST_AGENCY_TEST_SET_VAR_XYZ", "sk-test");
        let creds = collect_credentials(&[("openai", "RUST_AGENCY_TEST_SET_VAR_XYZ")]);
        assert_eq!(creds.get("openai").map(String::as_str), Some("sk-test"));
        std::env::remove_var("RUST_AGENCY_TEST_SET_VAR_XYZ");
    }
}
