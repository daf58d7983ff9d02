use super::{CatalogError, CatalogResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Scope covering uploads and playlist edits
pub const YOUTUBE_SCOPE: &str = "https://www.googleapis.com/auth/youtube";

/// Refresh this long before the reported expiry
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Supplies bearer tokens for API calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> CatalogResult<String>;
}

/// Fixed token, e.g. from YOUTUBE_ACCESS_TOKEN
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> CatalogResult<String> {
        Ok(self.0.clone())
    }
}

/// OAuth client registration as downloaded from the Google console
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn parse(json: &str) -> CatalogResult<Self> {
        let file: ClientSecretsFile = serde_json::from_str(json)?;
        file.installed
            .or(file.web)
            .ok_or_else(|| CatalogError::Auth("client secrets contain neither 'installed' nor 'web'".to_string()))
    }

    pub async fn load(path: &Path) -> CatalogResult<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            CatalogError::Auth(format!(
                "Cannot read OAuth2 client secrets file {} (set GOOGLE_CLIENT_SECRETS to override path): {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&json)
    }

    fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or("urn:ietf:wg:oauth:2.0:oob")
    }

    /// URL the user opens to grant offline access
    pub fn authorization_url(&self) -> CatalogResult<String> {
        let url = url::Url::parse_with_params(
            &self.auth_uri,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri()),
                ("response_type", "code"),
                ("scope", YOUTUBE_SCOPE),
                ("access_type", "offline"),
                ("state", "state-token"),
            ],
        )
        .map_err(|e| CatalogError::Auth(format!("Invalid auth_uri {}: {}", self.auth_uri, e)))?;
        Ok(url.to_string())
    }
}

/// Cached OAuth token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl OAuthToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .map_or(false, |expiry| expiry - ChronoDuration::seconds(EXPIRY_MARGIN_SECS) <= now)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token(self, previous_refresh: Option<String>) -> OAuthToken {
        OAuthToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expiry: self
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        }
    }
}

/// Installed-app OAuth flow with an on-disk token cache
pub struct GoogleOAuth {
    secrets: ClientSecrets,
    cache_path: PathBuf,
    client: reqwest::Client,
    token: Mutex<OAuthToken>,
}

impl GoogleOAuth {
    /// Loads the cached token, running the interactive flow when there is none
    pub async fn authorize(secrets_path: &Path, token_file: &str) -> CatalogResult<Self> {
        let secrets = ClientSecrets::load(secrets_path).await?;
        let cache_path = token_cache_dir().await?.join(token_file);
        let client = reqwest::Client::new();

        let token = match read_cached_token(&cache_path).await {
            Some(token) => {
                debug!("🔑 Using cached OAuth token from {}", cache_path.display());
                token
            }
            None => {
                let token = token_from_web(&client, &secrets).await?;
                save_token(&cache_path, &token).await?;
                token
            }
        };

        Ok(Self {
            secrets,
            cache_path,
            client,
            token: Mutex::new(token),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> CatalogResult<OAuthToken> {
        let response = self
            .client
            .post(&self.secrets.token_uri)
            .form(&[
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CatalogError::Auth(format!("Token refresh failed {}: {}", status, text)));
        }

        let token = response
            .json::<TokenResponse>()
            .await?
            .into_token(Some(refresh_token.to_string()));
        save_token(&self.cache_path, &token).await?;
        info!("🔑 Refreshed OAuth token");
        Ok(token)
    }
}

#[async_trait]
impl TokenProvider for GoogleOAuth {
    async fn access_token(&self) -> CatalogResult<String> {
        let mut token = self.token.lock().await;
        if token.is_expired(Utc::now()) {
            let refresh_token = token
                .refresh_token
                .clone()
                .ok_or_else(|| CatalogError::Auth("OAuth token expired and has no refresh token".to_string()))?;
            *token = self.refresh(&refresh_token).await?;
        }
        Ok(token.access_token.clone())
    }
}

/// Creates and returns the credential cache directory
async fn token_cache_dir() -> CatalogResult<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CatalogError::Auth("Unable to determine user home directory".to_string()))?;
    let dir = home.join(".credentials");
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}

async fn read_cached_token(path: &Path) -> Option<OAuthToken> {
    let json = tokio::fs::read_to_string(path).await.ok()?;
    serde_json::from_str(&json).ok()
}

async fn save_token(path: &Path, token: &OAuthToken) -> CatalogResult<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(serde_json::to_string_pretty(token)?.as_bytes()).await?;
    file.flush().await?;
    debug!("💾 Saved OAuth token to {}", path.display());
    Ok(())
}

/// Asks the user to authorize in a browser and paste back the code
async fn token_from_web(client: &reqwest::Client, secrets: &ClientSecrets) -> CatalogResult<OAuthToken> {
    let mut stdout = tokio::io::stdout();
    let prompt = format!(
        "Go to the following link in your browser then type the authorization code:\n{}\nCode: ",
        secrets.authorization_url()?
    );
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await?;

    let mut code = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut code).await?;
    let code = code.trim();
    if code.is_empty() {
        return Err(CatalogError::Auth("Unable to read authorization code".to_string()));
    }

    let response = client
        .post(&secrets.token_uri)
        .form(&[
            ("code", code),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", secrets.redirect_uri()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(CatalogError::Auth(format!(
            "Unable to retrieve token from web {}: {}",
            status, text
        )));
    }

    Ok(response.json::<TokenResponse>().await?.into_token(None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SECRETS: &str = r#"{
        "installed": {
            "client_id": "abc.apps.googleusercontent.com",
            "client_secret": "s3cret",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "redirect_uris": ["http://localhost"]
        }
    }"#;

    #[test]
    fn test_parse_installed_secrets() {
        let secrets = ClientSecrets::parse(SECRETS).unwrap();
        assert_eq!(secrets.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(secrets.redirect_uri(), "http://localhost");

        let url = secrets.authorization_url().unwrap();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("client_id=abc.apps.googleusercontent.com"));
    }

    #[test]
    fn test_parse_secrets_without_client_fails() {
        assert!(matches!(ClientSecrets::parse("{}"), Err(CatalogError::Auth(_))));
    }

    #[test]
    fn test_token_expiry() {
        let now = Utc::now();
        let mut token = OAuthToken {
            access_token: "a".to_string(),
            refresh_token: Some("r".to_string()),
            expiry: None,
        };
        assert!(!token.is_expired(now));

        token.expiry = Some(now + ChronoDuration::seconds(30));
        assert!(token.is_expired(now));

        token.expiry = Some(now + ChronoDuration::hours(1));
        assert!(!token.is_expired(now));
    }

    #[test]
    fn test_refresh_keeps_previous_refresh_token() {
        let response = TokenResponse {
            access_token: "new".to_string(),
            refresh_token: None,
            expires_in: Some(3599),
        };
        let token = response.into_token(Some("keep".to_string()));
        assert_eq!(token.refresh_token.as_deref(), Some("keep"));
        assert!(token.expiry.is_some());
    }

    #[tokio::test]
    async fn test_token_cache_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("token.json");
        let token = OAuthToken {
            access_token: "a".to_string(),
            refresh_token: Some("r".to_string()),
            expiry: None,
        };

        save_token(&path, &token).await.unwrap();
        let loaded = read_cached_token(&path).await.unwrap();
        assert_eq!(loaded.access_token, "a");
        assert_eq!(loaded.refresh_token.as_deref(), Some("r"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_static_token() {
        let provider = StaticToken("abc".to_string());
        assert_eq!(provider.access_token().await.unwrap(), "abc");
    }
}
