//! Decoder and encoder selection policy.

use crate::asset::AssetInfo;
use crate::backend::Backend;
use crate::capability::{Capability, CodecClass, CodecId, DecoderCandidate, EncoderCandidate};
use crate::error::{NegotiationError, TranscodeError};
use reel_core::{FrameRate, Timebase};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Upper bound on decoder worker threads.
pub const MAX_DECODER_THREADS: usize = 16;

/// Decoders a backend offers for one codec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderInventory {
    /// Every candidate, in the backend's preference order
    pub candidates: Vec<DecoderCandidate>,
    /// What the platform would pick on its own
    pub default: Option<DecoderCandidate>,
}

/// How the chosen decoder is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Copied from the stream
    pub time_base: Timebase,
    /// Estimated display rate
    pub frame_rate: FrameRate,
    pub threads: usize,
    /// Decode several frames in parallel
    pub frame_threading: bool,
}

/// The negotiated decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderChoice {
    pub candidate: DecoderCandidate,
    pub config: DecoderConfig,
}

/// Chooses a decoder for a stream.
pub struct DecoderNegotiator;

impl DecoderNegotiator {
    /// Apply the hardware/software policy for the asset's codec.
    ///
    /// VP9 takes a hardware decoder when one exists; AV1 never does and
    /// prefers the precise software decoder; everything else gets the
    /// platform default.
    pub fn select(
        asset: &AssetInfo,
        inventory: &DecoderInventory,
    ) -> Result<DecoderChoice, NegotiationError> {
        let codec = &asset.codec;
        let candidate = match codec.class() {
            CodecClass::HardwarePreferred => inventory
                .candidates
                .iter()
                .find(|c| c.capability.is_hardware())
                .or(inventory.default.as_ref()),
            CodecClass::HardwareExcluded => {
                let software = || {
                    inventory
                        .candidates
                        .iter()
                        .chain(inventory.default.iter())
                        .filter(|c| !c.capability.is_hardware())
                };
                software()
                    .find(|c| matches!(c.capability, Capability::SoftwarePrecise(_)))
                    .or_else(|| {
                        software().find(|c| matches!(c.capability, Capability::SoftwareGeneric(_)))
                    })
            }
            CodecClass::PlatformDefault => inventory.default.as_ref(),
        }
        .cloned()
        .ok_or_else(|| NegotiationError::NoDecoderAvailable(codec.clone()))?;

        info!("Using decoder: {}", candidate.display_name());
        Ok(DecoderChoice {
            candidate,
            config: DecoderConfig {
                time_base: asset.time_base,
                frame_rate: asset.frame_rate(),
                threads: num_cpus::get().clamp(1, MAX_DECODER_THREADS),
                frame_threading: true,
            },
        })
    }
}

/// Resolve the encoder for a run.
///
/// A named encoder must exist; there is no silent fallback, so a request for
/// a missing hardware encoder fails. Without a name the backend's default
/// HEVC encoder is used.
pub fn select_encoder<B: Backend>(
    backend: &B,
    name: Option<&str>,
) -> Result<EncoderCandidate, TranscodeError> {
    let candidate = match name {
        Some(name) => backend
            .find_encoder(name)
            .ok_or_else(|| TranscodeError::EncoderInit(format!("encoder {} not found", name)))?,
        None => backend.default_encoder(&CodecId::Hevc).ok_or_else(|| {
            TranscodeError::EncoderInit("no HEVC encoder available".to_string())
        })?,
    };
    info!(
        "Using encoder: {} ({})",
        candidate.name,
        if candidate.capability.is_hardware() {
            "hardware"
        } else {
            "software"
        }
    );
    Ok(candidate)
}
