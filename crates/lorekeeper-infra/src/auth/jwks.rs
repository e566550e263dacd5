//! JWKS fetch over HTTPS.
//!
//! Implements `KeySetSource` from `lorekeeper-core`. Caching and refresh
//! policy live in `KeySetCache`; this type only performs the GET.

use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;

use lorekeeper_core::auth::key_cache::{KeySetError, KeySetSource};

/// Fetches the issuer's published key set from a fixed URL.
pub struct HttpKeySetSource {
    client: reqwest::Client,
    url: String,
}

impl HttpKeySetSource {
    pub fn new(url: impl Into<String>) -> Result<Self, KeySetError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| KeySetError::Fetch(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl KeySetSource for HttpKeySetSource {
    async fn fetch(&self) -> Result<JwkSet, KeySetError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| KeySetError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeySetError::Fetch(format!("{} returned {status}", self.url)));
        }

        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| KeySetError::Malformed(e.to_string()))?;
        tracing::debug!(url = %self.url, keys = keys.keys.len(), "key set fetched");
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve one canned HTTP response on a loopback port.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/.well-known/jwks.json")
    }

    #[tokio::test]
    async fn test_fetch_parses_key_set() {
        let url = serve_once(
            "200 OK",
            r#"{"keys":[{"kty":"RSA","kid":"k1","alg":"RS256","use":"sig","n":"sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbgBHod5pcM9H95GQRV3JDXboIRROSBigeC5yjU1hGzHHyXss8UDprecbAYxknTcQkhslANGRUZmdTOQ5qTRsLAt6BTYuyvVRdhS8exSZEy_c4gs_7svlJJQ4H9_NxsiIoLwAEk7-Q3UXERGYw_75IDrGA84-lA_-Ct4eTlXHBIY2EaV7t7LjJaynVJCpkv4LKjTTAumiGUIuQhrNhZLuF_RJLqHpM2kgWFLU7-VTdL1VbC2tejvcI2BlMkEpk1BzBZI0KQB0GaDWFLN-aEAw3vRw","e":"AQAB"}]}"#,
        )
        .await;

        let source = HttpKeySetSource::new(url).unwrap();
        let keys = source.fetch().await.unwrap();
        assert_eq!(keys.keys.len(), 1);
        assert!(keys.find("k1").is_some());
    }

    #[tokio::test]
    async fn test_non_success_status_is_fetch_error() {
        let url = serve_once("503 Service Unavailable", "{}").await;
        let err = HttpKeySetSource::new(url).unwrap().fetch().await.unwrap_err();
        assert!(matches!(err, KeySetError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_invalid_body_is_malformed() {
        let url = serve_once("200 OK", r#"{"not":"a key set"}"#).await;
        let err = HttpKeySetSource::new(url).unwrap().fetch().await.unwrap_err();
        assert!(matches!(err, KeySetError::Malformed(_)));
    }
}
