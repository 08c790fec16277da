//! Speech recognition contract
//!
//! Capture and the concrete recognition service live outside the engine. The
//! engine defines what a recorded clip looks like, what it needs back from a
//! transcriber, and how the configured provider is chosen.

use std::time::Duration;

use async_trait::async_trait;
use sdk::errors::EngineError;
use tracing::info;

use crate::config::AsrProviderConfig;
use crate::secrets::mask_secret;

/// Capture sample rate in Hz
pub const SAMPLE_RATE: u32 = 16_000;

/// Capture channel count
pub const CHANNELS: u16 = 1;

/// Recorded speech: 16 kHz mono signed 16-bit PCM
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Wall time the recording took
    pub duration: Duration,
}

impl AudioClip {
    pub fn new(samples: Vec<i16>, duration: Duration) -> Self {
        Self {
            samples,
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            duration,
        }
    }

    /// Clip whose duration is derived from the sample count
    pub fn from_samples(samples: Vec<i16>) -> Self {
        let secs = samples.len() as f64 / (SAMPLE_RATE as f64 * CHANNELS as f64);
        Self::new(samples, Duration::from_secs_f64(secs))
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Little-endian PCM bytes, the usual upload format
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Speech-to-text service
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Transcribe `clip`, returning the text and the time the service took.
    ///
    /// Transport failures and unexpected responses are `RemoteCall` errors.
    async fn transcribe(&self, clip: &AudioClip) -> Result<(String, Duration), EngineError>;
}

/// Stand-in for a configured provider whose transport is not part of this build
#[derive(Debug, Clone)]
pub struct UnavailableTranscriber {
    provider: String,
}

impl UnavailableTranscriber {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

#[async_trait]
impl Transcriber for UnavailableTranscriber {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn transcribe(&self, _clip: &AudioClip) -> Result<(String, Duration), EngineError> {
        Err(EngineError::RemoteCall(format!(
            "no transport for ASR provider '{}'",
            self.provider
        )))
    }
}

/// Pick the provider with the highest priority; ties go to the first listed
pub fn select_provider(providers: &[AsrProviderConfig]) -> Result<&AsrProviderConfig, EngineError> {
    let mut best: Option<&AsrProviderConfig> = None;
    for provider in providers {
        match best {
            Some(current) if current.priority >= provider.priority => {}
            _ => best = Some(provider),
        }
    }
    best.ok_or_else(|| EngineError::Config("no [[asr]] provider configured".to_string()))
}

/// Log the chosen provider with every credential-looking value masked
pub fn log_provider(provider: &AsrProviderConfig) {
    info!(
        "Speech service: {} (priority {})",
        provider.name, provider.priority
    );
    for (key, value) in &provider.settings {
        let shown = match value.as_str() {
            Some(text) if is_credential(key) => mask_secret(text),
            Some(text) => text.to_string(),
            None => value.to_string(),
        };
        info!("-{}: {}", key, shown);
    }
}

fn is_credential(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("key") || key.contains("secret") || key.contains("token")
}
