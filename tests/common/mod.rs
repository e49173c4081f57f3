//! Shared harness for end-to-end tests: a mocked MirrorChyan API and a
//! mocked OneBot endpoint around a real `UpdateMonitor`.

#![allow(dead_code)]

use mirror_watch::{Config, UpdateMonitor};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Artifact bytes served by the mocked CDN
pub const ARTIFACT: &[u8] = b"artifact-bytes";

pub struct Harness {
    pub source: MockServer,
    pub onebot: MockServer,
    pub dir: TempDir,
    pub config: Config,
}

impl Harness {
    pub async fn new() -> Self {
        let source = MockServer::start().await;
        let onebot = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let mut config = Config::default();
        config.persistence.data_dir = dir.path().join("data");
        config.distribution.staging_dir = dir.path().join("staging");
        config.source.base_url = source.uri();
        config.onebot.base_url = onebot.uri();
        config.retry.max_attempts = 1;
        config.retry.initial_delay = Duration::from_millis(1);
        config.retry.jitter = false;

        Self {
            source,
            onebot,
            dir,
            config,
        }
    }

    pub async fn monitor(&self) -> UpdateMonitor {
        UpdateMonitor::new(self.config.clone()).await.unwrap()
    }

    /// Serve `version` for `rid`, downloadable from the mock CDN
    pub async fn mount_release(&self, rid: &str, version: &str, note: &str) {
        let sha256 = format!("{:x}", Sha256::digest(ARTIFACT));
        Mock::given(method("GET"))
            .and(path(format!("/api/resources/{rid}/latest")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "msg": "success",
                "data": {
                    "version_name": version,
                    "release_note": note,
                    "url": format!("{}/cdn/{rid}.zip", self.source.uri()),
                    "sha256": sha256,
                    "channel": "stable"
                }
            })))
            .mount(&self.source)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/cdn/{rid}.zip")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(ARTIFACT))
            .mount(&self.source)
            .await;
    }

    /// Answer a OneBot action with `data`
    pub async fn mount_action(&self, action: &str, data: Value) {
        Mock::given(method("POST"))
            .and(path(format!("/{action}")))
            .respond_with(ok(data))
            .mount(&self.onebot)
            .await;
    }

    /// Answer a OneBot action with `data` for the first `times` calls only
    pub async fn mount_action_times(&self, action: &str, data: Value, times: u64) {
        Mock::given(method("POST"))
            .and(path(format!("/{action}")))
            .respond_with(ok(data))
            .up_to_n_times(times)
            .mount(&self.onebot)
            .await;
    }

    /// JSON bodies of every request made for `action`, in order
    pub async fn calls(&self, action: &str) -> Vec<Value> {
        let target = format!("/{action}");
        self.onebot
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == target)
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }
}

pub fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": "ok",
        "retcode": 0,
        "data": data
    }))
}

pub fn folder(id: &str, name: &str) -> Value {
    json!({ "folder_id": id, "folder_name": name })
}

pub fn file(name: &str) -> Value {
    json!({ "file_id": format!("id-{name}"), "file_name": name, "file_size": 14 })
}
