//! Live Assistant Library Crate
//!
//! A console assistant on top of one shared live session. Every enabled
//! feature mounts its own tool on the session; the binary in `bin/` is a thin
//! wrapper that wires stdin and the console to it.

pub mod config;
pub mod console;
pub mod features;

use config::{Config, ReplyMode};
use features::{Feature, FeatureKind, combined_instruction};
use gemini_live::types::GenerationConfig;
use gemini_live::{Endpoint, LiveConfig, LiveSession};
use secrecy::ExposeSecret;
use tracing::info;

/// The session plus the features mounted on it.
pub struct Assistant {
    pub session: LiveSession,
    features: Vec<Box<dyn Feature>>,
}

impl Assistant {
    /// Configures `session` for `kinds` and mounts each feature.
    pub fn mount(
        session: LiveSession,
        model: &str,
        reply_mode: ReplyMode,
        voice_name: Option<String>,
        kinds: &[FeatureKind],
    ) -> Self {
        let features: Vec<Box<dyn Feature>> = kinds.iter().map(|kind| kind.build()).collect();

        let generation_config = match reply_mode {
            ReplyMode::Audio => GenerationConfig::audio(voice_name),
            ReplyMode::Text => GenerationConfig::text(),
        };
        let _ = session.set_config(
            LiveConfig::new(model)
                .with_system_instruction(combined_instruction(&features))
                .with_generation_config(generation_config),
        );
        for feature in &features {
            let _ = feature.mount(&session);
        }
        info!(features = ?kinds, "Assistant ready");

        Self { session, features }
    }

    pub fn features(&self) -> impl Iterator<Item = FeatureKind> + '_ {
        self.features.iter().map(|f| f.kind())
    }

    /// Unmounts every feature, leaving the session itself untouched.
    pub fn unmount_all(&self) {
        for feature in &self.features {
            feature.unmount(&self.session);
        }
    }
}

pub fn endpoint(config: &Config) -> Endpoint {
    Endpoint::new(config.endpoint.clone()).with_api_key(config.api_key.expose_secret())
}
