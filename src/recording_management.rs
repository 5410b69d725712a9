//! Recording management subsystem.
//!
//! [`RecordingManager`] drives the whole recording lifecycle. It is built from:
//! - [`RecordingRegistry`]: live recordings indexed by id and by session
//! - [`AutoStopScheduler`]: per-session timers stopping recordings nobody publishes to
//! - [`RecordingServices`]: the composed and individual worker strategies
//!
//! Example (non-running):
//! ```ignore
//! use std::sync::Arc;
//! use sessrec::configuration::Config;
//! use sessrec::container_management::DockerCli;
//! use sessrec::recording::RecordingProperties;
//! use sessrec::recording_management::RecordingManager;
//!
//! let config = Config::new("/opt/recordings", "2.9.0");
//! let manager = Arc::new(RecordingManager::with_runtime(config, Arc::new(DockerCli::new()), sessions));
//! manager.initialize().await?;
//! let recording = manager.start_recording(session, RecordingProperties::default()).await?;
//! manager.stop_recording(None, &recording.id, "recordingStoppedByServer").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod auto_stop;
pub mod composed;
pub mod individual;
pub mod recording_manager;
pub mod registry;
pub mod service;

pub use auto_stop::AutoStopScheduler;
pub use composed::ComposedRecordingService;
pub use individual::IndividualRecordingService;
pub use recording_manager::{RecordingManager, RECORDING_INTERRUPTED, RECORDING_START_FAILED};
pub use registry::RecordingRegistry;
pub use service::{RecordingService, RecordingServices};
