//! Bot health monitor with restart policy.
//!
//! Probes each target on an interval after a startup grace period. A
//! target failing `max_failures` consecutive probes triggers a restart:
//! the configured command first, then container restarts over the local
//! docker control socket. The failure counter resets after any restart
//! attempt.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use log::{info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::HealthSettings;

/// Health-check target with its restart policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotHealthTarget {
    pub name: String,
    pub url: String,
    pub restart_containers: Vec<String>,
}

impl BotHealthTarget {
    pub fn endpoint_label(&self) -> String {
        format!("http:{}", self.url)
    }
}

/// Extract the host (no port) and path from an http(s) URL.
fn split_url(url: &str) -> (String, String) {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url);
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    let host = authority.split(':').next().unwrap_or("").to_string();
    (host, path.to_string())
}

/// Build one target from a URL and the shared container list.
pub fn build_target(url: &str, restart_containers: &[String]) -> BotHealthTarget {
    let (host, path) = split_url(url);
    let mut name = if host.is_empty() {
        url.to_string()
    } else {
        host.clone()
    };
    if !path.is_empty() && path != "/" {
        name.push_str(&path);
    }

    let containers = if restart_containers.is_empty() {
        if host.is_empty() {
            Vec::new()
        } else {
            vec![host]
        }
    } else if !host.is_empty() && restart_containers.contains(&host) {
        vec![host]
    } else {
        restart_containers.to_vec()
    };

    BotHealthTarget {
        name,
        url: url.to_string(),
        restart_containers: containers,
    }
}

/// Handle to a running monitor; dropping it leaves the task running, use
/// [`MonitorHandle::stop`] for a clean shutdown.
pub struct MonitorHandle {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal shutdown and wait for in-flight probes to drain.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
        info!("Bot health monitor stopped");
    }
}

/// Periodic health prober with self-healing restarts.
pub struct BotHealthMonitor {
    settings: HealthSettings,
    targets: Vec<BotHealthTarget>,
    http: reqwest::Client,
    failures: Mutex<HashMap<String, u32>>,
}

impl BotHealthMonitor {
    pub fn new(settings: HealthSettings) -> Self {
        let targets: Vec<BotHealthTarget> = settings
            .urls
            .iter()
            .map(|url| build_target(url, &settings.restart_containers))
            .collect();
        let failures = targets.iter().map(|t| (t.name.clone(), 0)).collect();
        Self {
            http: reqwest::Client::new(),
            targets,
            failures: Mutex::new(failures),
            settings,
        }
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled && !self.targets.is_empty()
    }

    pub fn targets(&self) -> &[BotHealthTarget] {
        &self.targets
    }

    /// Spawn the monitor loop. Returns None when disabled.
    pub fn spawn(self) -> Option<MonitorHandle> {
        if !self.enabled() {
            info!("Bot health monitor disabled (BOT_HEALTH_ENABLED=false or no target)");
            return None;
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        info!(
            "Bot health monitor started targets={:?} interval={}s failures={}",
            self.targets
                .iter()
                .map(BotHealthTarget::endpoint_label)
                .collect::<Vec<_>>(),
            self.settings.interval_secs,
            self.settings.max_failures
        );
        let handle = tokio::spawn(self.run(stop_rx));
        Some(MonitorHandle {
            stop: stop_tx,
            handle,
        })
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        let sleep_or_stop = |secs: u64, stop: &mut watch::Receiver<bool>| {
            let mut stop = stop.clone();
            async move {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(secs)) => false,
                    _ = stop.changed() => true,
                }
            }
        };

        if self.settings.startup_grace_secs > 0 {
            info!(
                "BOT_HEALTH_GRACE_WAIT seconds={}",
                self.settings.startup_grace_secs
            );
            if sleep_or_stop(self.settings.startup_grace_secs, &mut stop).await {
                return;
            }
        }

        loop {
            for target in &self.targets {
                if *stop.borrow() {
                    return;
                }
                let healthy = self.ping(target).await;
                if self.note_probe(&target.name, healthy) {
                    self.restart(target).await;
                }
            }
            if sleep_or_stop(self.settings.interval_secs, &mut stop).await {
                return;
            }
        }
    }

    /// Record a probe result. Returns true when the consecutive-failure
    /// threshold is reached; the counter resets at that point.
    fn note_probe(&self, name: &str, healthy: bool) -> bool {
        let mut failures = self.failures.lock().expect("failure map lock poisoned");
        let counter = failures.entry(name.to_string()).or_insert(0);
        if healthy {
            *counter = 0;
            return false;
        }
        *counter += 1;
        warn!(
            "BOT_HEALTH_FAIL consecutive={} threshold={} target={}",
            counter, self.settings.max_failures, name
        );
        if *counter >= self.settings.max_failures {
            *counter = 0;
            return true;
        }
        false
    }

    async fn ping(&self, target: &BotHealthTarget) -> bool {
        let response = self
            .http
            .get(&target.url)
            .timeout(Duration::from_secs_f64(self.settings.timeout_secs))
            .send()
            .await;
        match response {
            Ok(resp) => {
                let status = resp.status().as_u16();
                (200..300).contains(&status)
            }
            Err(e) => {
                warn!("BOT_HEALTH_HTTP_FAIL url={} err={}", target.url, e);
                false
            }
        }
    }

    async fn restart(&self, target: &BotHealthTarget) {
        warn!(
            "BOT_RESTART_TRIGGER threshold={} target={}",
            self.settings.max_failures,
            target.endpoint_label()
        );

        if self.settings.restart_cmd.is_empty() {
            if !self.restart_containers(&target.restart_containers).await {
                warn!(
                    "BOT_RESTART_SKIP reason=command_missing target={}",
                    target.endpoint_label()
                );
            }
            return;
        }

        let first = &self.settings.restart_cmd[0];
        let first_path = Path::new(first);
        if first_path.is_absolute() && !first_path.exists() {
            warn!(
                "BOT_RESTART_SKIP reason=command_not_found cmd={} target={}",
                self.settings.restart_cmd.join(" "),
                target.endpoint_label()
            );
            return;
        }

        let status = tokio::process::Command::new(first)
            .args(&self.settings.restart_cmd[1..])
            .status()
            .await;
        match status {
            Ok(code) if code.success() => {
                info!(
                    "BOT_RESTART_CMD_OK cmd={} target={}",
                    self.settings.restart_cmd.join(" "),
                    target.endpoint_label()
                );
            }
            Ok(code) => {
                warn!(
                    "BOT_RESTART_CMD_FAIL cmd={} exit={:?} target={}",
                    self.settings.restart_cmd.join(" "),
                    code.code(),
                    target.endpoint_label()
                );
                self.restart_containers(&target.restart_containers).await;
            }
            Err(e) => {
                warn!(
                    "BOT_RESTART_CMD_FAIL cmd={} err={} target={}",
                    self.settings.restart_cmd.join(" "),
                    e,
                    target.endpoint_label()
                );
                self.restart_containers(&target.restart_containers).await;
            }
        }
    }

    /// Restart containers by POSTing to the local docker control socket.
    /// Returns whether any restart succeeded.
    async fn restart_containers(&self, containers: &[String]) -> bool {
        if containers.is_empty() {
            return false;
        }
        let socket = Path::new(&self.settings.docker_socket);
        if !socket.exists() {
            warn!(
                "BOT_RESTART_SKIP reason=docker_socket_missing socket={}",
                self.settings.docker_socket
            );
            return false;
        }

        let mut restarted = false;
        for container in containers {
            match docker_restart(socket, container).await {
                Ok(status) if (200..300).contains(&status) => {
                    restarted = true;
                    info!("BOT_RESTART_DOCKER_OK container={}", container);
                }
                Ok(status) => {
                    warn!(
                        "BOT_RESTART_DOCKER_FAIL container={} status={}",
                        container, status
                    );
                }
                Err(e) => {
                    warn!(
                        "BOT_RESTART_DOCKER_FAIL container={} err={}",
                        container, e
                    );
                }
            }
        }
        restarted
    }
}

/// Minimal HTTP/1.1 POST over the docker unix socket; returns the response
/// status code.
async fn docker_restart(socket: &Path, container: &str) -> std::io::Result<u16> {
    let mut stream = tokio::net::UnixStream::connect(socket).await?;
    let request = format!(
        "POST /containers/{}/restart HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        container
    );
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    let head = String::from_utf8_lossy(&response);
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "bad docker response")
        })?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(urls: Vec<&str>, max_failures: u32) -> HealthSettings {
        HealthSettings {
            enabled: true,
            urls: urls.into_iter().map(str::to_string).collect(),
            max_failures,
            ..HealthSettings::default()
        }
    }

    #[test]
    fn test_build_target_name_includes_path() {
        let target = build_target("http://bot-a:8080/health/ready", &[]);
        assert_eq!(target.name, "bot-a/health/ready");
        assert_eq!(target.restart_containers, vec!["bot-a"]);
        assert_eq!(target.endpoint_label(), "http:http://bot-a:8080/health/ready");
    }

    #[test]
    fn test_build_target_bare_host() {
        let target = build_target("http://bot-b:9000", &[]);
        assert_eq!(target.name, "bot-b");
        assert_eq!(target.restart_containers, vec!["bot-b"]);
    }

    #[test]
    fn test_build_target_container_list_overrides() {
        let containers = vec!["other-1".to_string(), "other-2".to_string()];
        let target = build_target("http://bot-c/health", &containers);
        assert_eq!(target.restart_containers, containers);
    }

    #[test]
    fn test_build_target_derived_container_preferred_when_listed() {
        let containers = vec!["bot-d".to_string(), "other".to_string()];
        let target = build_target("http://bot-d/health", &containers);
        assert_eq!(target.restart_containers, vec!["bot-d"]);
    }

    #[test]
    fn test_note_probe_threshold_and_reset() {
        let monitor = BotHealthMonitor::new(settings(vec!["http://bot/health"], 3));
        let name = monitor.targets()[0].name.clone();

        assert!(!monitor.note_probe(&name, false));
        assert!(!monitor.note_probe(&name, false));
        // A success wipes the streak before it reaches the threshold.
        assert!(!monitor.note_probe(&name, true));
        assert!(!monitor.note_probe(&name, false));
        assert!(!monitor.note_probe(&name, false));
        assert!(monitor.note_probe(&name, false));
        // Counter was reset by the restart trigger.
        assert!(!monitor.note_probe(&name, false));
    }

    #[test]
    fn test_success_resets_counter() {
        let monitor = BotHealthMonitor::new(settings(vec!["http://bot/health"], 2));
        let name = monitor.targets()[0].name.clone();
        assert!(!monitor.note_probe(&name, false));
        assert!(!monitor.note_probe(&name, true));
        assert!(!monitor.note_probe(&name, false));
        assert!(monitor.note_probe(&name, false));
    }

    #[test]
    fn test_disabled_monitor_does_not_spawn() {
        let mut s = settings(vec![], 3);
        s.enabled = true;
        let monitor = BotHealthMonitor::new(s);
        assert!(!monitor.enabled());
    }
}
