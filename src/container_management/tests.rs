//! Mock runtime shared by the container and recording tests, plus the image
//! manager's startup scenarios.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::container_management::runtime::ContainerRuntime;
use crate::container_management::types::{ContainerSummary, WorkerSpec};
use crate::error_handling::types::ContainerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullBehaviour {
    Succeeds,
    /// The pull reports an error but the image shows up locally anyway.
    FailsButImageAppears,
    Fails,
}

/// In-memory [`ContainerRuntime`] recording every call it receives.
pub struct MockRuntime {
    pub daemon_up: AtomicBool,
    pub fail_run: AtomicBool,
    /// Runs succeed until this many workers are started, then fail.
    pub runs_before_failure: Mutex<Option<usize>>,
    pub pull_behaviour: Mutex<PullBehaviour>,
    pub images: Mutex<HashSet<String>>,
    pub containers: Mutex<Vec<ContainerSummary>>,
    pub started: Mutex<Vec<WorkerSpec>>,
    pub stopped: Mutex<Vec<String>>,
    pub removed: Mutex<Vec<String>>,
    pub pull_calls: AtomicUsize,
    pub pings: AtomicUsize,
    pub stop_delay: Mutex<Duration>,
    pub execs: Mutex<Vec<(String, Vec<String>)>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        MockRuntime {
            daemon_up: AtomicBool::new(true),
            fail_run: AtomicBool::new(false),
            runs_before_failure: Mutex::new(None),
            pull_behaviour: Mutex::new(PullBehaviour::Succeeds),
            images: Mutex::new(HashSet::new()),
            containers: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            pull_calls: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
            stop_delay: Mutex::new(Duration::ZERO),
            execs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_image(self, image: &str) -> Self {
        self.images.lock().unwrap().insert(image.to_string());
        self
    }

    pub fn with_container(self, id: &str, image: &str) -> Self {
        self.containers.lock().unwrap().push(ContainerSummary {
            id: id.to_string(),
            image: image.to_string(),
            name: format!("name-{}", id),
        });
        self
    }

    pub fn started_names(&self) -> Vec<String> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    fn check_daemon(&self) -> Result<(), ContainerError> {
        if self.daemon_up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ContainerError::RuntimeNotAvailable(
                "Cannot connect to the Docker daemon".to_string(),
            ))
        }
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn ping(&self) -> Result<(), ContainerError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.check_daemon()
    }

    async fn image_exists(&self, image: &str) -> Result<bool, ContainerError> {
        self.check_daemon()?;
        Ok(self.images.lock().unwrap().contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<(), ContainerError> {
        self.check_daemon()?;
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        let behaviour = *self.pull_behaviour.lock().unwrap();
        match behaviour {
            PullBehaviour::Succeeds => {
                self.images.lock().unwrap().insert(image.to_string());
                Ok(())
            }
            PullBehaviour::FailsButImageAppears => {
                self.images.lock().unwrap().insert(image.to_string());
                Err(ContainerError::ImagePullFailed("interrupted".to_string()))
            }
            PullBehaviour::Fails => {
                Err(ContainerError::ImagePullFailed("manifest unknown".to_string()))
            }
        }
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, ContainerError> {
        self.check_daemon()?;
        Ok(self.containers.lock().unwrap().clone())
    }

    async fn remove_container(
        &self,
        container_id: &str,
        _force: bool,
    ) -> Result<(), ContainerError> {
        self.check_daemon()?;
        self.containers
            .lock()
            .unwrap()
            .retain(|c| c.id != container_id);
        self.removed.lock().unwrap().push(container_id.to_string());
        Ok(())
    }

    async fn run_container(&self, spec: &WorkerSpec) -> Result<String, ContainerError> {
        self.check_daemon()?;
        let mut started = self.started.lock().unwrap();
        let exhausted = self
            .runs_before_failure
            .lock()
            .unwrap()
            .is_some_and(|limit| started.len() >= limit);
        if exhausted || self.fail_run.load(Ordering::SeqCst) {
            return Err(ContainerError::CommandFailed("run failed".to_string()));
        }
        started.push(spec.clone());
        Ok(format!("cid-{}", spec.name))
    }

    async fn stop_container(&self, container_id: &str) -> Result<(), ContainerError> {
        self.check_daemon()?;
        let delay = *self.stop_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.stopped.lock().unwrap().push(container_id.to_string());
        Ok(())
    }

    async fn exec_in_container(
        &self,
        container_id: &str,
        command: &[String],
    ) -> Result<String, ContainerError> {
        self.check_daemon()?;
        self.execs
            .lock()
            .unwrap()
            .push((container_id.to_string(), command.to_vec()));
        Ok(String::new())
    }
}

mod image_manager_tests {
    use super::*;
    use crate::configuration::{Config, RuntimeMode};
    use crate::container_management::RuntimeImageManager;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    const IMAGE: &str = "sessrec/recording-worker:2.9.0";

    fn config() -> Config {
        Config::new("/tmp/sessrec-recordings", "2.9.0")
    }

    #[tokio::test]
    async fn present_image_is_not_pulled() {
        let runtime = Arc::new(MockRuntime::new().with_image(IMAGE));
        let manager = RuntimeImageManager::new(runtime.clone(), &config());

        assert_ok!(manager.ensure_image().await);
        assert_eq!(runtime.pings.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.pull_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn absent_image_is_pulled() {
        let runtime = Arc::new(MockRuntime::new());
        let manager = RuntimeImageManager::new(runtime.clone(), &config());

        assert_ok!(manager.ensure_image().await);
        assert_eq!(runtime.pull_calls.load(Ordering::SeqCst), 1);
        assert!(runtime.images.lock().unwrap().contains(IMAGE));
    }

    #[tokio::test]
    async fn failed_pull_falls_back_to_local_presence() {
        let runtime = Arc::new(MockRuntime::new());
        *runtime.pull_behaviour.lock().unwrap() = PullBehaviour::FailsButImageAppears;
        let manager = RuntimeImageManager::new(runtime.clone(), &config());

        assert_ok!(manager.ensure_image().await);
    }

    #[tokio::test]
    async fn failed_pull_without_local_image_is_fatal() {
        let runtime = Arc::new(MockRuntime::new());
        *runtime.pull_behaviour.lock().unwrap() = PullBehaviour::Fails;
        let manager = RuntimeImageManager::new(runtime.clone(), &config());

        match manager.ensure_image().await {
            Err(ContainerError::ImagePullFailed(msg)) => assert!(msg.contains("manifest")),
            other => panic!("Expected ImagePullFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_daemon_gets_host_diagnostic() {
        let runtime = Arc::new(MockRuntime::new());
        runtime.daemon_up.store(false, Ordering::SeqCst);
        let manager = RuntimeImageManager::new(runtime.clone(), &config());

        match manager.ensure_image().await {
            Err(ContainerError::RuntimeNotAvailable(msg)) => {
                assert!(msg.contains("Docker installation is required"))
            }
            other => panic!("Expected RuntimeNotAvailable, got {:?}", other),
        }
        assert_eq!(runtime.pings.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.pull_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_daemon_gets_containerized_diagnostic() {
        let runtime = Arc::new(MockRuntime::new());
        runtime.daemon_up.store(false, Ordering::SeqCst);
        let mut config = config();
        config.runtime_mode = RuntimeMode::Containerized;
        let manager = RuntimeImageManager::new(runtime, &config);

        match manager.initialize().await {
            Err(ContainerError::RuntimeNotAvailable(msg)) => {
                assert!(msg.contains("/var/run/docker.sock"));
                assert!(msg.contains("/tmp/sessrec-recordings"));
            }
            other => panic!("Expected RuntimeNotAvailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn only_worker_containers_are_removed_on_startup() {
        let runtime = Arc::new(
            MockRuntime::new()
                .with_image(IMAGE)
                .with_container("stale-1", IMAGE)
                .with_container("stale-2", "sessrec/recording-worker:2.8.0")
                .with_container("web", "nginx:latest"),
        );
        let manager = RuntimeImageManager::new(runtime.clone(), &config());

        let removed = manager.initialize().await.unwrap();
        assert_eq!(removed, 2);
        let remaining = runtime.containers.lock().unwrap().clone();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "web");
    }

    #[tokio::test]
    async fn cleanup_failure_is_fatal() {
        let runtime = Arc::new(MockRuntime::new().with_image(IMAGE));
        let manager = RuntimeImageManager::new(runtime.clone(), &config());
        assert_ok!(manager.ensure_image().await);

        runtime.daemon_up.store(false, Ordering::SeqCst);
        assert_err!(manager.remove_stray_containers().await);
    }
}
