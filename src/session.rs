use crate::auth::KeyPairSigner;
use crate::client::{self, build_http_client};
use crate::config::{get_optional_env_var, Credentials, Settings};
use crate::datam::{ResultSet, StatementResponse};
use crate::error::RagError;
use crate::modes::ConnectionMode;

use reqwest::{header, Client, Method, StatusCode, Url};
use serde_json::{json, Map, Value as JsonValue};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Delay between polls of a statement the SQL API is still running.
const STATEMENT_POLL_INTERVAL: Duration = Duration::from_millis(500);

const TOKEN_TYPE_HEADER: &str = "X-Snowflake-Authorization-Token-Type";

/// Default database/schema/warehouse/role sent along with every statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub warehouse: Option<String>,
    pub role: Option<String>,
}

impl QueryContext {
    /// Reads the optional `SNOWFLAKE_*` context variables.
    pub fn from_env() -> Self {
        Self {
            database: get_optional_env_var("SNOWFLAKE_DATABASE"),
            schema: get_optional_env_var("SNOWFLAKE_SCHEMA"),
            warehouse: get_optional_env_var("SNOWFLAKE_WAREHOUSE"),
            role: get_optional_env_var("SNOWFLAKE_ROLE"),
        }
    }

    fn apply_to(&self, body: &mut Map<String, JsonValue>) {
        let fields = [
            ("database", &self.database),
            ("schema", &self.schema),
            ("warehouse", &self.warehouse),
            ("role", &self.role),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                body.insert(key.to_string(), json!(value));
            }
        }
    }
}

enum Authenticator {
    /// The host rewrites this file when it rotates the token, so it is
    /// read again for every request.
    HostToken { token_path: PathBuf },
    KeyPair(KeyPairSigner),
}

impl Authenticator {
    /// Returns the bearer token and its Snowflake token type.
    fn bearer(&self) -> Result<(String, &'static str), RagError> {
        match self {
            Authenticator::HostToken { token_path } => {
                let token = read_host_token(token_path)?;
                Ok((token, "OAUTH"))
            }
            Authenticator::KeyPair(signer) => Ok((signer.sign()?, "KEYPAIR_JWT")),
        }
    }
}

/// The single authenticated handle to Snowflake, created once per process
/// and shared read-only by the search and completion adapters.
pub struct SnowflakeSession {
    http: Client,
    base_url: Url,
    auth: Authenticator,
    context: QueryContext,
    mode: ConnectionMode,
}

impl SnowflakeSession {
    /// Opens the session for `mode`, or for the mode named by
    /// `SNOWFLAKE_CONNECTION_MODE`, or the detected one.
    pub fn connect(mode: Option<ConnectionMode>, settings: &Settings) -> Result<Self, RagError> {
        let mode = match mode {
            Some(mode) => mode,
            None => match get_optional_env_var("SNOWFLAKE_CONNECTION_MODE") {
                Some(name) => name.parse()?,
                None => ConnectionMode::detect(&settings.host_token_path),
            },
        };
        log::info!("[SESSION] Opening Snowflake session in {} mode", mode);

        match mode {
            ConnectionMode::Host => Self::from_host(&settings.host_token_path),
            ConnectionMode::KeyPair => {
                let credentials = Credentials::from_env()?;
                let session = Self::from_credentials(&credentials)?;
                match get_optional_env_var("SNOWFLAKE_HOST") {
                    Some(host) => session.with_base_url(&host),
                    None => Ok(session),
                }
            }
        }
    }

    /// Adopts the session provided by the container host.
    pub fn from_host(token_path: &Path) -> Result<Self, RagError> {
        let base_url = match (
            get_optional_env_var("SNOWFLAKE_HOST"),
            get_optional_env_var("SNOWFLAKE_ACCOUNT"),
        ) {
            (Some(host), _) => normalize_host(&host),
            (None, Some(account)) => account_url(&account),
            (None, None) => {
                return Err(RagError::ConfigError(
                    "Host mode needs SNOWFLAKE_HOST or SNOWFLAKE_ACCOUNT to locate the account."
                        .to_string(),
                ))
            }
        };
        Self::with_host_token(&base_url, token_path, QueryContext::from_env())
    }

    /// Host-token session against an explicit base URL. The token file must
    /// already be readable.
    pub fn with_host_token(
            base_url: &str,
            token_path: &Path,
            context: QueryContext,
        ) -> Result<Self, RagError> {
        read_host_token(token_path)?;
        Ok(Self {
            http: build_http_client()?,
            base_url: parse_base_url(base_url)?,
            auth: Authenticator::HostToken { token_path: token_path.to_path_buf() },
            context,
            mode: ConnectionMode::Host,
        })
    }

    /// Key-pair session built from explicit credentials.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self, RagError> {
        let signer = KeyPairSigner::new(&credentials.account, &credentials.user, &credentials.private_key)?;
        log::debug!("[SESSION] Key-pair fingerprint {}", signer.fingerprint());

        Ok(Self {
            http: build_http_client()?,
            base_url: parse_base_url(&account_url(&credentials.account))?,
            auth: Authenticator::KeyPair(signer),
            context: QueryContext {
                database: credentials.database.clone(),
                schema: credentials.schema.clone(),
                warehouse: credentials.warehouse.clone(),
                role: credentials.role.clone(),
            },
            mode: ConnectionMode::KeyPair,
        })
    }

    /// Points the session at another host (private link, proxies).
    pub fn with_base_url(mut self, host: &str) -> Result<Self, RagError> {
        self.base_url = parse_base_url(&normalize_host(host))?;
        Ok(self)
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn context(&self) -> &QueryContext {
        &self.context
    }

    /// `base_url` with the given path segments appended, each one escaped.
    pub fn api_url(&self, segments: &[&str]) -> Result<Url, RagError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RagError::ConfigError(format!("'{}' cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn auth_headers(&self) -> Result<header::HeaderMap, RagError> {
        let (token, token_type) = self.auth.bearer()?;
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| RagError::AuthError(format!("Token is not a valid header value: {}", e)))?,
        );
        headers.insert(TOKEN_TYPE_HEADER, header::HeaderValue::from_static(token_type));
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// POSTs a JSON body to a REST endpoint of the account and returns the raw body.
    pub async fn post_json(&self, url: &Url, body: &JsonValue) -> Result<String, RagError> {
        let reply = client::execute_single_call(
            &self.http,
            Method::POST,
            url.as_str(),
            self.auth_headers()?,
            Some(body),
        )
        .await?;
        Ok(reply.body)
    }

    /// Runs one statement through the SQL API with positional TEXT bindings.
    ///
    /// A statement still running server-side (202) is followed through its
    /// status URL until the result is available.
    pub async fn execute_sql(&self, statement: &str, bindings: &[&str]) -> Result<ResultSet, RagError> {
        let body = self.statement_body(statement, bindings);
        let mut url = self.api_url(&["api", "v2", "statements"])?;
        url.query_pairs_mut()
            .append_pair("requestId", &Uuid::new_v4().to_string());

        log::debug!("[SESSION] Executing statement: {}", statement);
        let reply = client::execute_single_call(
            &self.http,
            Method::POST,
            url.as_str(),
            self.auth_headers()?,
            Some(&body),
        )
        .await?;

        let mut status = reply.status;
        let mut response: StatementResponse = serde_json::from_str(&reply.body)?;

        while status == StatusCode::ACCEPTED {
            let status_path = response.statement_status_url.clone().ok_or_else(|| {
                RagError::ResponseParseError(
                    "Statement accepted without a statementStatusUrl".to_string(),
                )
            })?;
            let status_url = self.base_url.join(&status_path).map_err(|e| {
                RagError::ResponseParseError(format!("Invalid statementStatusUrl '{}': {}", status_path, e))
            })?;

            tokio::time::sleep(STATEMENT_POLL_INTERVAL).await;
            let reply = client::execute_single_call(
                &self.http,
                Method::GET,
                status_url.as_str(),
                self.auth_headers()?,
                None,
            )
            .await?;
            status = reply.status;
            response = serde_json::from_str(&reply.body)?;
        }

        ResultSet::from_response(response)
    }

    fn statement_body(&self, statement: &str, bindings: &[&str]) -> JsonValue {
        let mut body = Map::new();
        body.insert("statement".to_string(), json!(statement));
        if !bindings.is_empty() {
            let bound: Map<String, JsonValue> = bindings
                .iter()
                .enumerate()
                .map(|(i, value)| ((i + 1).to_string(), json!({ "type": "TEXT", "value": value })))
                .collect();
            body.insert("bindings".to_string(), JsonValue::Object(bound));
        }
        self.context.apply_to(&mut body);
        JsonValue::Object(body)
    }
}

fn read_host_token(token_path: &Path) -> Result<String, RagError> {
    let token = fs::read_to_string(token_path).map_err(|e| {
        RagError::AuthError(format!(
            "Cannot read host session token at '{}': {}",
            token_path.display(),
            e
        ))
    })?;
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err(RagError::AuthError(format!(
            "Host session token at '{}' is empty",
            token_path.display()
        )));
    }
    Ok(token)
}

fn parse_base_url(base_url: &str) -> Result<Url, RagError> {
    Url::parse(base_url)
        .map_err(|e| RagError::ConfigError(format!("Invalid Snowflake URL '{}': {}", base_url, e)))
}

/// Public URL of an account identifier.
pub fn account_url(account: &str) -> String {
    format!(
        "https://{}.snowflakecomputing.com",
        account.trim().to_lowercase().replace('_', "-")
    )
}

/// Adds the `https://` scheme when the host is given bare.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}
