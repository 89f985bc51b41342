//! Process-scoped chat session: the selected device, the loaded pipeline and
//! the optional transcript.

pub mod transcript;

pub use transcript::{Role, Transcript, TranscriptEntry};

use crate::config::BackendConfig;
use crate::device::{self, AcceleratorProbe, Device, DevicePolicy};
use crate::pipelines::{self, Pipeline, PipelineError};
use crate::presets::ChatProfile;
use std::io::Write;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("startup failed: {0}")]
    Startup(#[source] PipelineError),
    #[error(transparent)]
    Generation(PipelineError),
    #[error("{backend} returned no generated sequences")]
    EmptyResult { backend: String },
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PipelineError> for SessionError {
    fn from(err: PipelineError) -> Self {
        if err.is_startup() {
            Self::Startup(err)
        } else {
            Self::Generation(err)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    Terminated,
    /// A generation error ended the session.
    Failed,
}

pub struct Session {
    device: Device,
    pipeline: Box<dyn Pipeline>,
    profile: ChatProfile,
    transcript: Option<Transcript>,
    state: SessionState,
}

impl Session {
    /// Select the device, report it on `out`, then load the backend once.
    pub async fn initialize<W: Write>(
        profile: ChatProfile,
        policy: DevicePolicy,
        probe: &dyn AcceleratorProbe,
        backend: &str,
        backend_config: &BackendConfig,
        out: &mut W,
    ) -> Result<Self, SessionError> {
        Self::initialize_with(profile, policy, probe, out, |profile, device| {
            pipelines::create_pipeline(
                backend,
                &profile.model,
                profile.task,
                device,
                backend_config,
            )
        })
        .await
    }

    /// Like [`Session::initialize`] with a caller-supplied loader.
    pub async fn initialize_with<W, F>(
        profile: ChatProfile,
        policy: DevicePolicy,
        probe: &dyn AcceleratorProbe,
        out: &mut W,
        load: F,
    ) -> Result<Self, SessionError>
    where
        W: Write,
        F: FnOnce(&ChatProfile, Device) -> Result<Box<dyn Pipeline>, PipelineError>,
    {
        let device = device::select_device(policy, probe);
        writeln!(out, "Using device: {device}")?;
        if profile.device_gap {
            writeln!(out)?;
        }
        out.flush()?;

        let pipeline = load(&profile, device).map_err(SessionError::Startup)?;
        pipeline.warmup().await.map_err(SessionError::Startup)?;

        tracing::info!(
            backend = pipeline.name(),
            model = pipeline.model(),
            task = %pipeline.task(),
            device = %device,
            device_index = device.device_index(),
            "pipeline ready"
        );

        Ok(Self::new(device, pipeline, profile))
    }

    /// Wrap an already loaded pipeline.
    pub fn new(device: Device, pipeline: Box<dyn Pipeline>, profile: ChatProfile) -> Self {
        let transcript = profile.history.then(Transcript::new);
        Self {
            device,
            pipeline,
            profile,
            transcript,
            state: SessionState::Ready,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn profile(&self) -> &ChatProfile {
        &self.profile
    }

    pub fn pipeline(&self) -> &dyn Pipeline {
        self.pipeline.as_ref()
    }

    pub fn transcript(&self) -> Option<&Transcript> {
        self.transcript.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn terminate(&mut self) {
        self.state = SessionState::Terminated;
    }

    pub(crate) fn fail(&mut self) {
        self.state = SessionState::Failed;
    }

    /// Run one generation with the profile's options and keep the first sequence.
    pub async fn generate(&self, input: &str) -> Result<String, SessionError> {
        let sequences = self
            .pipeline
            .generate(input, &self.profile.options)
            .await
            .map_err(SessionError::Generation)?;

        sequences
            .into_iter()
            .next()
            .map(|s| s.generated_text)
            .ok_or_else(|| SessionError::EmptyResult {
                backend: self.pipeline.name().to_string(),
            })
    }

    /// Record a finished turn when the transcript is enabled.
    pub(crate) fn record_turn(&mut self, input: &str, reply: &str) {
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.record_turn(input, reply);
        }
    }
}
