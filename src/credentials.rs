//! Basic-auth token encoding and the persisted credential "cookie".
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::ApiResult;

/// Name of the persisted credential, kept from the browser cookie.
pub const COOKIE_NAME: &str = "mf_authdata";

pub fn encode(input: impl AsRef<[u8]>) -> String {
    STANDARD.encode(input)
}

/// Decode a standard (padded) base64 string. Characters outside the alphabet
/// are dropped with a warning before decoding.
pub fn decode(input: &str) -> ApiResult<Vec<u8>> {
    let cleaned: String = input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        .collect();
    if cleaned.len() != input.len() {
        warn!("invalid base64 characters were stripped from the input");
    }
    Ok(STANDARD.decode(cleaned)?)
}

/// `base64(username:password)`
pub fn basic_token(username: &str, password: &str) -> String {
    encode(format!("{username}:{password}"))
}

/// Split a token back into `(username, password)`.
pub fn split_token(token: &str) -> ApiResult<(String, String)> {
    let raw = decode(token)?;
    let text = String::from_utf8_lossy(&raw);
    match text.split_once(':') {
        Some((user, pass)) => Ok((user.to_string(), pass.to_string())),
        None => Ok((text.to_string(), String::new())),
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> std::io::Result<Option<String>>;
    async fn save(&self, token: &str) -> std::io::Result<()>;
    async fn clear(&self) -> std::io::Result<()>;
}

/// Keeps the token in `<data_dir>/mf_authdata` so a later run stays logged in.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(COOKIE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> std::io::Result<Option<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => {
                let token = content.trim().to_string();
                Ok((!token.is_empty()).then_some(token))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn save(&self, token: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, token).await?;
        debug!(path = %self.path.display(), "credential stored");
        Ok(())
    }

    async fn clear(&self) -> std::io::Result<()> {
        match fs::remove_file(&self.path).await {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> std::io::Result<Option<String>> {
        Ok(self.token.lock().await.clone())
    }

    async fn save(&self, token: &str) -> std::io::Result<()> {
        *self.token.lock().await = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> std::io::Result<()> {
        *self.token.lock().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn known_vectors() {
        assert_eq!(encode(""), "");
        assert_eq!(encode("f"), "Zg==");
        assert_eq!(encode("fo"), "Zm8=");
        assert_eq!(encode("foo"), "Zm9v");
        assert_eq!(basic_token("admin", "secret"), "YWRtaW46c2VjcmV0");
    }

    #[test]
    fn round_trip_arbitrary_bytes() {
        for len in 0..64usize {
            let input: Vec<u8> = (0..len).map(|i| (i * 37 + len) as u8).collect();
            assert_eq!(decode(&encode(&input)).unwrap(), input);
        }
    }

    #[test]
    fn decode_strips_foreign_characters() {
        assert_eq!(decode("Zm9v\nYmFy").unwrap(), b"foobar");
        assert!(decode("Zm9").is_err());
    }

    #[test]
    fn split_token_keeps_colons_in_password() {
        let token = basic_token("bob", "pa:ss");
        assert_eq!(
            split_token(&token).unwrap(),
            ("bob".to_string(), "pa:ss".to_string())
        );
    }

    #[tokio::test]
    async fn file_store_round_trip() {
        let td = tempdir().unwrap();
        let store = FileCredentialStore::new(td.path().join("data"));
        assert_eq!(store.load().await.unwrap(), None);
        store.save("YWRtaW46c2VjcmV0").await.unwrap();
        assert_eq!(
            store.load().await.unwrap().as_deref(),
            Some("YWRtaW46c2VjcmV0")
        );
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }
}
