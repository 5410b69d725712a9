use serde::Deserialize;

/// How this process reaches the container daemon.
///
/// Only affects the diagnostics printed when the daemon cannot be reached.
#[derive(Debug, Default, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    /// The daemon runs on the same host as this process.
    #[default]
    Host,
    /// This process itself runs inside a container and talks to the host daemon
    /// through a mounted socket.
    Containerized,
}
