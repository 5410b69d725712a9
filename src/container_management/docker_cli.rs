use async_trait::async_trait;
use log::{debug, error, info};
use std::process::{Output, Stdio};
use tokio::process::Command;

use crate::container_management::runtime::ContainerRuntime;
use crate::container_management::types::{ContainerSummary, WorkerSpec};
use crate::error_handling::types::ContainerError;

const DAEMON_UNREACHABLE_MARKERS: [&str; 3] = [
    "Cannot connect to the Docker daemon",
    "Is the docker daemon running",
    "permission denied while trying to connect",
];

const MISSING_IMAGE_MARKERS: [&str; 4] = [
    "No such image",
    "No such object",
    "manifest unknown",
    "not found",
];

/// [`ContainerRuntime`] backed by the `docker` command line client.
///
/// Every call spawns one `docker` process and classifies failures from its
/// exit status and stderr.
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Uses another docker-compatible binary (e.g. `podman`).
    pub fn with_binary(binary: &str) -> Self {
        info!("Initializing container runtime client using `{}`", binary);
        DockerCli {
            binary: binary.to_string(),
        }
    }

    async fn exec(&self, args: &[String]) -> Result<Output, ContainerError> {
        debug!("Running {} {}", self.binary, args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    error!("Container runtime binary `{}` not found", self.binary);
                    ContainerError::RuntimeNotAvailable(format!(
                        "`{}` binary not found in PATH",
                        self.binary
                    ))
                } else {
                    ContainerError::IoError(e)
                }
            })
    }

    /// Runs a command and maps a non-zero exit to an error classified from stderr.
    async fn exec_checked(&self, args: &[String]) -> Result<String, ContainerError> {
        let output = self.exec(args).await?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!(
            "{} {} failed ({}): {}",
            self.binary,
            args.first().map(String::as_str).unwrap_or_default(),
            output.status,
            stderr
        );
        Err(classify_failure(&stderr))
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_failure(stderr: &str) -> ContainerError {
    if DAEMON_UNREACHABLE_MARKERS.iter().any(|m| stderr.contains(m)) {
        ContainerError::RuntimeNotAvailable(stderr.to_string())
    } else if MISSING_IMAGE_MARKERS.iter().any(|m| stderr.contains(m)) {
        ContainerError::ImageNotFound(stderr.to_string())
    } else {
        ContainerError::CommandFailed(stderr.to_string())
    }
}

/// Parses `docker ps --format '{{.ID}}\t{{.Image}}\t{{.Names}}'` output.
fn parse_container_listing(stdout: &str) -> Vec<ContainerSummary> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let id = parts.next()?.trim();
            let image = parts.next()?.trim();
            let name = parts.next().unwrap_or_default().trim();
            if id.is_empty() {
                return None;
            }
            Some(ContainerSummary {
                id: id.to_string(),
                image: image.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}

fn run_args(spec: &WorkerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    for (host, container) in &spec.binds {
        args.push("-v".to_string());
        args.push(format!("{}:{}", host.display(), container));
    }
    args.push(spec.image.clone());
    args
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn ping(&self) -> Result<(), ContainerError> {
        let version = self
            .exec_checked(&strings(&["version", "--format", "{{.Server.Version}}"]))
            .await
            .map_err(|e| match e {
                ContainerError::RuntimeNotAvailable(msg) => ContainerError::RuntimeNotAvailable(msg),
                other => ContainerError::RuntimeNotAvailable(other.to_string()),
            })?;
        debug!("Container daemon version {}", version);
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, ContainerError> {
        match self
            .exec_checked(&strings(&["image", "inspect", "--format", "{{.Id}}", image]))
            .await
        {
            Ok(_) => Ok(true),
            Err(ContainerError::ImageNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), ContainerError> {
        match self.exec_checked(&strings(&["pull", image])).await {
            Ok(_) => Ok(()),
            Err(ContainerError::CommandFailed(msg)) => Err(ContainerError::ImagePullFailed(msg)),
            Err(e) => Err(e),
        }
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, ContainerError> {
        let stdout = self
            .exec_checked(&strings(&[
                "ps",
                "-a",
                "--no-trunc",
                "--format",
                "{{.ID}}\t{{.Image}}\t{{.Names}}",
            ]))
            .await?;
        Ok(parse_container_listing(&stdout))
    }

    async fn remove_container(
        &self,
        container_id: &str,
        force: bool,
    ) -> Result<(), ContainerError> {
        let mut args = strings(&["rm"]);
        if force {
            args.push("-f".to_string());
        }
        args.push(container_id.to_string());
        self.exec_checked(&args).await.map(|_| ())
    }

    async fn run_container(&self, spec: &WorkerSpec) -> Result<String, ContainerError> {
        let container_id = self.exec_checked(&run_args(spec)).await?;
        info!("Started worker container {} ({})", spec.name, container_id);
        Ok(container_id)
    }

    async fn stop_container(&self, container_id: &str) -> Result<(), ContainerError> {
        self.exec_checked(&strings(&["stop", container_id]))
            .await
            .map(|_| ())
    }

    async fn exec_in_container(
        &self,
        container_id: &str,
        command: &[String],
    ) -> Result<String, ContainerError> {
        let mut args = strings(&["exec", container_id]);
        args.extend(command.iter().cloned());
        self.exec_checked(&args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn listing_is_parsed_line_by_line() {
        let stdout = "abc123\tsessrec/recording-worker:2.9.0\trecording_ses\n\
                      def456\tnginx:latest\tweb\n\
                      \n";
        let listing = parse_container_listing(stdout);
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].id, "abc123");
        assert_eq!(listing[0].image, "sessrec/recording-worker:2.9.0");
        assert_eq!(listing[1].name, "web");
    }

    #[test]
    fn stderr_is_classified() {
        assert!(matches!(
            classify_failure("Cannot connect to the Docker daemon at unix:///var/run/docker.sock."),
            ContainerError::RuntimeNotAvailable(_)
        ));
        assert!(matches!(
            classify_failure("Error: No such image: sessrec/recording-worker:1"),
            ContainerError::ImageNotFound(_)
        ));
        assert!(matches!(
            classify_failure("conflict: name already in use"),
            ContainerError::CommandFailed(_)
        ));
    }

    #[test]
    fn run_arguments_carry_env_and_binds() {
        let spec = WorkerSpec::new("recording_abc", "img:1")
            .with_env("VIDEO_ID", "abc")
            .with_bind(PathBuf::from("/rec"), "/recordings");
        let args = run_args(&spec);
        assert_eq!(
            args,
            vec![
                "run", "-d", "--name", "recording_abc", "-e", "VIDEO_ID=abc", "-v",
                "/rec:/recordings", "img:1"
            ]
        );
    }

    #[tokio::test]
    async fn missing_binary_is_runtime_not_available() {
        let cli = DockerCli::with_binary("sessrec-no-such-runtime-binary");
        match cli.ping().await {
            Err(ContainerError::RuntimeNotAvailable(msg)) => assert!(msg.contains("not found")),
            other => panic!("Expected RuntimeNotAvailable, got {:?}", other),
        }
        assert!(matches!(
            cli.image_exists("img:1").await,
            Err(ContainerError::RuntimeNotAvailable(_))
        ));
    }
}
