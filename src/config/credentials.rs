use crate::config::get_optional_env_var;
use crate::error::RagError;
use std::fmt;

/// Explicit key-pair credentials for running outside the container host.
#[derive(Clone)]
pub struct Credentials {
    pub account: String,
    pub user: String,
    /// PEM text with real newlines (see [`normalize_private_key`]).
    pub private_key: String,
    pub role: Option<String>,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
}

impl Credentials {
    /// Reads the `SNOWFLAKE_*` variables, loading a `.env` file first.
    pub fn from_env() -> Result<Self, RagError> {
        Self::from_lookup(get_optional_env_var)
    }

    /// Builds credentials from an arbitrary variable source.
    ///
    /// Account, user and private key are required; the rest only narrow
    /// the query context.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RagError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var_name: &str| {
            lookup(var_name).ok_or_else(|| {
                RagError::ConfigError(format!(
                    "Environment variable '{}' not found. Please set it in your .env file.",
                    var_name
                ))
            })
        };

        let account = required("SNOWFLAKE_ACCOUNT")?;
        let user = required("SNOWFLAKE_USER")?;
        let private_key = normalize_private_key(&required("SNOWFLAKE_PRIVATE_KEY")?);

        Ok(Self {
            account,
            user,
            private_key,
            role: lookup("SNOWFLAKE_ROLE"),
            warehouse: lookup("SNOWFLAKE_WAREHOUSE"),
            database: lookup("SNOWFLAKE_DATABASE"),
            schema: lookup("SNOWFLAKE_SCHEMA"),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("private_key", &"<redacted>")
            .field("role", &self.role)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Turns the literal `\n` escapes of a single-line env value into real
/// newlines so the PEM parser sees its usual layout.
pub fn normalize_private_key(raw: &str) -> String {
    let mut pem = raw.trim().replace("\\n", "\n");
    if !pem.ends_with('\n') {
        pem.push('\n');
    }
    pem
}
