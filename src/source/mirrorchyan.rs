//! MirrorChyan HTTP client
//!
//! `GET {base_url}/api/resources/{rid}/latest` answers with a
//! `{ code, msg, data }` envelope. A non-zero `code` is a business rejection
//! (expired or invalid cdk, unknown resource) and is reported as
//! [`SourceError::Api`] even when it arrives with a non-2xx status.

use super::traits::{ArtifactDownloader, DownloadedArtifact, MetadataSource, ReleaseMetadata, ResourceQuery};
use crate::config::SourceConfig;
use crate::error::{Error, Result, SourceError};
use crate::utils::{sha256_file, unique_sibling};
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<ReleaseMetadata>,
}

/// Client for the MirrorChyan resource API
#[derive(Clone, Debug)]
pub struct MirrorChyanClient {
    api: reqwest::Client,
    download: reqwest::Client,
    base_url: String,
    user_agent: String,
    timeout: Duration,
    download_timeout: Duration,
}

impl MirrorChyanClient {
    /// Build a client from configuration
    ///
    /// Metadata requests use `timeout`; artifact downloads use the longer
    /// `download_timeout`.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let api = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;
        let download = reqwest::Client::builder()
            .timeout(config.download_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api,
            download,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            timeout: config.timeout,
            download_timeout: config.download_timeout,
        })
    }

    fn latest_url(&self, rid: &str) -> String {
        format!("{}/api/resources/{}/latest", self.base_url, rid)
    }

    fn query_params(&self, query: &ResourceQuery, credential: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            (
                "current_version",
                query.current_version.clone().unwrap_or_default(),
            ),
            ("user_agent", self.user_agent.clone()),
            ("channel", query.channel.as_str().to_string()),
        ];
        if let Some(cdk) = credential.filter(|c| !c.is_empty()) {
            params.push(("cdk", cdk.to_string()));
        }
        if let Some((os, arch)) = query.variant.platform() {
            params.push(("os", os.to_string()));
            params.push(("arch", arch.to_string()));
        }
        params
    }

    async fn stream_to(&self, url: &str, dest: &Path, expected: Option<&str>) -> Result<()> {
        let timed_out = |e: reqwest::Error| {
            Error::from_request(e, format!("download of {url}"), self.download_timeout)
        };
        let mut response = self.download.get(url).send().await.map_err(timed_out)?;
        if !response.status().is_success() {
            return Err(SourceError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut hasher = Sha256::new();
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(timed_out)? {
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let actual = format!("{:x}", hasher.finalize());
        if let Some(expected) = expected
            && !expected.eq_ignore_ascii_case(&actual)
        {
            return Err(SourceError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            }
            .into());
        }

        tracing::debug!(url = %url, bytes = written, "Artifact streamed");
        Ok(())
    }
}

#[async_trait]
impl MetadataSource for MirrorChyanClient {
    async fn fetch_latest(
        &self,
        query: &ResourceQuery,
        credential: Option<&str>,
    ) -> Result<Option<ReleaseMetadata>> {
        let url = self.latest_url(&query.rid);
        let operation = format!("metadata request for {}", query.rid);
        let response = self
            .api
            .get(&url)
            .query(&self.query_params(query, credential))
            .send()
            .await
            .map_err(|e| Error::from_request(e, operation.as_str(), self.timeout))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::from_request(e, operation.as_str(), self.timeout))?;
        let envelope: Envelope = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(SourceError::HttpStatus {
                    status: status.as_u16(),
                    url,
                }
                .into());
            }
        };

        if envelope.code != 0 {
            return Err(SourceError::Api {
                code: envelope.code,
                message: envelope.msg.unwrap_or_default(),
            }
            .into());
        }

        Ok(envelope.data)
    }
}

#[async_trait]
impl ArtifactDownloader for MirrorChyanClient {
    async fn download(
        &self,
        query: &ResourceQuery,
        credential: &str,
        dest: &Path,
    ) -> Result<DownloadedArtifact> {
        let metadata = self
            .fetch_latest(query, Some(credential))
            .await?
            .unwrap_or_default();
        let Some(url) = metadata.download_url.clone().filter(|u| !u.is_empty()) else {
            return Err(SourceError::MissingDownloadUrl {
                resource_id: query.rid.clone(),
            }
            .into());
        };

        if let Some(parent) = dest.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        if let Some(expected) = metadata.sha256.as_deref()
            && tokio::fs::try_exists(dest).await.unwrap_or(false)
            && let Ok(existing) = sha256_file(dest).await
            && existing.eq_ignore_ascii_case(expected)
        {
            tracing::info!(
                rid = %query.rid,
                path = %dest.display(),
                "Staged artifact matches checksum, reusing"
            );
            return Ok(DownloadedArtifact {
                path: dest.to_path_buf(),
                metadata,
                reused: true,
            });
        }

        let part = unique_sibling(dest, "part");
        if let Err(e) = self.stream_to(&url, &part, metadata.sha256.as_deref()).await {
            let _ = tokio::fs::remove_file(&part).await;
            tracing::warn!(rid = %query.rid, error = %e, "Artifact download failed");
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&part, dest).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e.into());
        }

        tracing::info!(
            rid = %query.rid,
            version = %metadata.version_name,
            path = %dest.display(),
            "Artifact downloaded"
        );
        Ok(DownloadedArtifact {
            path: dest.to_path_buf(),
            metadata,
            reused: false,
        })
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Channel, Variant};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> MirrorChyanClient {
        MirrorChyanClient::new(&SourceConfig {
            base_url: server.uri(),
            user_agent: "mirror-watch-test".into(),
            timeout: Duration::from_secs(5),
            download_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn hex_sha256(bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }

    #[tokio::test]
    async fn fetch_latest_sends_platform_and_channel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/resources/M9A/latest"))
            .and(query_param("channel", "beta"))
            .and(query_param("os", "win"))
            .and(query_param("arch", "x64"))
            .and(query_param("user_agent", "mirror-watch-test"))
            .and(query_param_is_missing("cdk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "msg": "success",
                "data": {
                    "version_name": "v3.2.0",
                    "release_note": "### Fixes\n- one",
                    "channel": "beta"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let query = ResourceQuery::new("M9A", Variant::CrossPlatform, Channel::Beta);
        let metadata = client(&server)
            .fetch_latest(&query, None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(metadata.version_name, "v3.2.0");
        assert_eq!(metadata.download_url, None);
        assert_eq!(metadata.channel.as_deref(), Some("beta"));
    }

    #[tokio::test]
    async fn universal_variant_omits_platform() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/resources/MAA/latest"))
            .and(query_param_is_missing("os"))
            .and(query_param("cdk", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": { "version_name": "v5.0.0" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let query = ResourceQuery::new("MAA", Variant::Universal, Channel::Stable);
        let metadata = client(&server)
            .fetch_latest(&query, Some("secret"))
            .await
            .unwrap();
        assert_eq!(metadata.unwrap().version_name, "v5.0.0");
    }

    #[tokio::test]
    async fn business_code_is_reported_even_with_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "code": 7002,
                "msg": "KEY_INVALID"
            })))
            .mount(&server)
            .await;

        let query = ResourceQuery::new("MAA", Variant::Universal, Channel::Stable);
        let err = client(&server)
            .fetch_latest(&query, Some("bad"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Source(SourceError::Api { code: 7002, .. })
        ));
    }

    #[tokio::test]
    async fn success_without_data_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0 })))
            .mount(&server)
            .await;

        let query = ResourceQuery::new("MAA", Variant::Universal, Channel::Stable);
        assert!(client(&server).fetch_latest(&query, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_json_error_status_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let query = ResourceQuery::new("MAA", Variant::Universal, Channel::Stable);
        let err = client(&server).fetch_latest(&query, None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Source(SourceError::HttpStatus { status: 502, .. })
        ));
    }

    #[tokio::test]
    async fn download_verifies_checksum_and_renames() {
        let server = MockServer::start().await;
        let body = b"artifact-bytes".to_vec();
        Mock::given(method("GET"))
            .and(path("/api/resources/MAA/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": {
                    "version_name": "v5.1.0",
                    "url": format!("{}/files/MAA.zip", server.uri()),
                    "sha256": hex_sha256(&body),
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/MAA.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("staging").join("1-MAA-通用.zip");
        let query = ResourceQuery::new("MAA", Variant::Universal, Channel::Stable);
        let client = client(&server);

        let artifact = client.download(&query, "cdk", &dest).await.unwrap();
        assert!(!artifact.reused);
        assert_eq!(artifact.metadata.version_name, "v5.1.0");
        assert_eq!(std::fs::read(&dest).unwrap(), body);

        // Second call finds a matching staged file and skips the transfer.
        let again = client.download(&query, "cdk", &dest).await.unwrap();
        assert!(again.reused);

        let leftovers: Vec<_> = std::fs::read_dir(dest.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1, "no partial files left behind");
    }

    #[tokio::test]
    async fn checksum_mismatch_removes_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/resources/MAA/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": {
                    "version_name": "v5.1.0",
                    "url": format!("{}/files/MAA.zip", server.uri()),
                    "sha256": "00",
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/MAA.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tampered".to_vec()))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("MAA.zip");
        let query = ResourceQuery::new("MAA", Variant::Universal, Channel::Stable);

        let err = client(&server).download(&query, "cdk", &dest).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Source(SourceError::ChecksumMismatch { .. })
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_url_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": { "version_name": "v1" }
            })))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let query = ResourceQuery::new("R", Variant::CrossPlatform, Channel::Stable);
        let err = client(&server)
            .download(&query, "cdk", &dir.path().join("R.zip"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Source(SourceError::MissingDownloadUrl { .. })
        ));
    }
}
