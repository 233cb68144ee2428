//! Honeypot-side collaborators
//!
//! - [`HoneypotLogSource`] + [`LogPoller`]: raw JSON log lines emitted by the
//!   honeypot, pulled after each executed command
//! - [`HoneypotDeployment`] + [`ServiceDirectoryDeployment`]: putting an
//!   accepted configuration live

use crate::error::{DeploymentError, LogSourceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mirage_synthesis::{HoneypotConfiguration, Protocol};
use mirage_trace::HoneypotEvent;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Source of raw honeypot log lines
#[async_trait]
pub trait HoneypotLogSource: Send + Sync {
    /// Lines emitted at or after `since`
    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<Vec<String>, LogSourceError>;
}

/// Pulls new honeypot events, owning the "last polled" cursor
pub struct LogPoller {
    source: Arc<dyn HoneypotLogSource>,
    last_polled: DateTime<Utc>,
}

impl LogPoller {
    /// Start polling from now
    #[must_use]
    pub fn new(source: Arc<dyn HoneypotLogSource>) -> Self {
        Self {
            source,
            last_polled: Utc::now(),
        }
    }

    /// Start polling from a given instant
    #[inline]
    #[must_use]
    pub fn with_cursor(mut self, since: DateTime<Utc>) -> Self {
        self.last_polled = since;
        self
    }

    /// Cursor position
    #[inline]
    #[must_use]
    pub fn last_polled(&self) -> DateTime<Utc> {
        self.last_polled
    }

    /// Skip everything emitted so far
    pub fn mark(&mut self) {
        self.last_polled = Utc::now();
    }

    /// Events emitted since the last poll
    ///
    /// Unparsable lines are dropped. On source failure the cursor stays put
    /// and no events are returned.
    pub async fn poll(&mut self) -> Vec<HoneypotEvent> {
        let now = Utc::now();
        let lines = match self.source.fetch_since(self.last_polled).await {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!("Honeypot log poll failed: {}", e);
                return Vec::new();
            }
        };
        self.last_polled = now;

        lines
            .iter()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let event = HoneypotEvent::from_log_line(line);
                if event.is_none() {
                    tracing::debug!("Dropping unparsable honeypot log line: {}", line);
                }
                event
            })
            .collect()
    }
}

impl fmt::Debug for LogPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogPoller")
            .field("last_polled", &self.last_polled)
            .finish_non_exhaustive()
    }
}

/// Puts configurations live
#[async_trait]
pub trait HoneypotDeployment: Send + Sync {
    /// Replace the running configuration
    async fn deploy(&self, config: &HoneypotConfiguration) -> Result<(), DeploymentError>;
}

/// Writes one YAML service file per service into the honeypot's service directory
///
/// New files are staged first; the live `.yaml` files are only replaced once
/// every service has been written, so a failed deployment leaves the previous
/// configuration in place. Restarting the honeypot is left to the caller.
#[derive(Debug, Clone)]
pub struct ServiceDirectoryDeployment {
    dir: PathBuf,
}

impl ServiceDirectoryDeployment {
    /// Deploy into `dir`
    #[inline]
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Service directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Staging directory for one configuration
    #[must_use]
    pub fn staging_dir(&self, config: &HoneypotConfiguration) -> PathBuf {
        self.dir.join(format!(".staging-{}", config.id))
    }

    fn file_name(config: &HoneypotConfiguration, index: usize, protocol: Protocol) -> String {
        format!("service_{protocol}_{}_{index}.yaml", config.id)
    }

    async fn stage(
        staging: &Path,
        files: &[(String, String)],
    ) -> Result<(), DeploymentError> {
        tokio::fs::create_dir_all(staging).await?;
        for (name, yaml) in files {
            tokio::fs::write(staging.join(name), yaml).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), DeploymentError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "yaml") {
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl HoneypotDeployment for ServiceDirectoryDeployment {
    async fn deploy(&self, config: &HoneypotConfiguration) -> Result<(), DeploymentError> {
        let files = config
            .services
            .iter()
            .enumerate()
            .map(|(index, service)| {
                Ok((
                    Self::file_name(config, index, service.protocol()),
                    serde_yaml::to_string(service)?,
                ))
            })
            .collect::<Result<Vec<_>, DeploymentError>>()?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let staging = self.staging_dir(config);
        if let Err(e) = Self::stage(&staging, &files).await {
            tracing::warn!(
                "Staging configuration {} failed, service directory untouched: {}",
                config.id,
                e
            );
            if let Err(cleanup) = tokio::fs::remove_dir_all(&staging).await {
                tracing::debug!("Could not remove {}: {}", staging.display(), cleanup);
            }
            return Err(e);
        }

        self.clear().await?;
        for (name, _) in &files {
            let path = self.dir.join(name);
            tokio::fs::rename(staging.join(name), &path).await?;
            tracing::debug!("Service file written to {}", path.display());
        }
        tokio::fs::remove_dir(&staging).await?;

        tracing::info!(
            "Deployed configuration {} ({} services) to {}",
            config.id,
            config.services.len(),
            self.dir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Lines {
        lines: Vec<String>,
        calls: Mutex<Vec<DateTime<Utc>>>,
        fail: bool,
    }

    #[async_trait]
    impl HoneypotLogSource for Lines {
        async fn fetch_since(&self, since: DateTime<Utc>) -> Result<Vec<String>, LogSourceError> {
            self.calls.lock().push(since);
            if self.fail {
                return Err(LogSourceError("container gone".into()));
            }
            Ok(self.lines.clone())
        }
    }

    #[tokio::test]
    async fn poll_parses_events_and_advances_cursor() {
        let source = Arc::new(Lines {
            lines: vec![
                r#"{"event": {"Protocol": "SSH", "Command": "uname -a"}}"#.into(),
                "not json".into(),
                String::new(),
                r#"{"event": {"Protocol": "HTTP", "RequestURI": "/"}}"#.into(),
            ],
            calls: Mutex::new(Vec::new()),
            fail: false,
        });
        let start = Utc::now() - chrono::Duration::minutes(5);
        let mut poller = LogPoller::new(source.clone()).with_cursor(start);

        let events = poller.poll().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].ssh_command_text(), Some("uname -a"));
        assert_eq!(events[1].ssh_command_text(), None);
        assert!(poller.last_polled() > start);
        assert_eq!(source.calls.lock()[0], start);
    }

    #[tokio::test]
    async fn failed_poll_keeps_cursor() {
        let source = Arc::new(Lines {
            lines: Vec::new(),
            calls: Mutex::new(Vec::new()),
            fail: true,
        });
        let start = Utc::now() - chrono::Duration::minutes(5);
        let mut poller = LogPoller::new(source).with_cursor(start);

        assert!(poller.poll().await.is_empty());
        assert_eq!(poller.last_polled(), start);
    }

    #[tokio::test]
    async fn service_directory_replaces_previous_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("stale.yaml"), "protocol: ssh\n").await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "keep me").await.unwrap();

        let config = HoneypotConfiguration::from_value(json!({
            "id": "7f1c2a4e-0b5d-4d1e-9c1a-2f6f1b9d8e11",
            "timestamp": "2025-06-12T14:30:00Z",
            "services": [{
                "protocol": "tcp",
                "address": ":3306",
                "description": "MySQL",
                "cve_tags": [],
                "cve_description": "",
                "banner": "5.7.38",
                "deadlineTimeoutSeconds": 10
            }]
        }))
        .unwrap();

        ServiceDirectoryDeployment::new(dir.path()).deploy(&config).await.unwrap();

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        assert_eq!(
            names,
            vec![
                "notes.txt".to_string(),
                "service_tcp_7f1c2a4e-0b5d-4d1e-9c1a-2f6f1b9d8e11_0.yaml".to_string(),
            ]
        );

        let written = tokio::fs::read_to_string(
            dir.path()
                .join("service_tcp_7f1c2a4e-0b5d-4d1e-9c1a-2f6f1b9d8e11_0.yaml"),
        )
        .await
        .unwrap();
        assert!(written.contains("protocol: tcp"));
        assert!(written.contains("5.7.38"));
    }

    fn two_service_config() -> HoneypotConfiguration {
        let service = json!({
            "protocol": "tcp",
            "address": ":3306",
            "description": "MySQL",
            "cve_tags": [],
            "cve_description": "",
            "banner": "8.0.11",
            "deadlineTimeoutSeconds": 10
        });
        let mut second = service.clone();
        second["address"] = json!(":5432");
        second["description"] = json!("PostgreSQL");
        HoneypotConfiguration::from_value(json!({
            "id": "3c9d0e1f-2a3b-4c5d-8e6f-7a8b9c0d1e2f",
            "timestamp": "2025-06-13T09:00:00Z",
            "services": [service, second]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn failed_write_keeps_live_service_files() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir
            .path()
            .join("service_tcp_7f1c2a4e-0b5d-4d1e-9c1a-2f6f1b9d8e11_0.yaml");
        tokio::fs::write(&live, "protocol: tcp\n").await.unwrap();

        let deployment = ServiceDirectoryDeployment::new(dir.path());
        let config = two_service_config();
        let staging = deployment.staging_dir(&config);
        // A directory where the second service file should go makes that write fail
        tokio::fs::create_dir_all(staging.join(format!("service_tcp_{}_1.yaml", config.id)))
            .await
            .unwrap();

        let err = deployment.deploy(&config).await.unwrap_err();
        assert!(matches!(err, DeploymentError::Io(_)));

        assert_eq!(tokio::fs::read_to_string(&live).await.unwrap(), "protocol: tcp\n");
        assert!(!dir
            .path()
            .join(format!("service_tcp_{}_0.yaml", config.id))
            .exists());
        assert!(!staging.exists());

        // Once the obstacle is gone the same deployment goes through
        deployment.deploy(&config).await.unwrap();
        assert!(!live.exists());
        assert!(dir
            .path()
            .join(format!("service_tcp_{}_1.yaml", config.id))
            .exists());
        assert!(!staging.exists());
    }
}
