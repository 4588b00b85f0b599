//! Public media handle: open an asset once, render it many times.

use crate::asset::{AssetProbe, MediaAsset};
use crate::backend::{Backend, FrameDecoder, MediaSource, SidecarBackend, SourceUnit};
use crate::error::{OpenError, StageError, TranscodeError};
use crate::negotiate::{DecoderChoice, DecoderNegotiator};
use crate::pipeline::{TranscodePipeline, TranscodeSummary};
use crate::request::{RenditionProfile, TranscodeRequest};
use crate::scope::Scoped;
use reel_core::DecodedFrame;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Resources held while the handle is open. The decoder is declared
/// before the source so it is released first.
struct OpenState<B: Backend> {
    decoder: Option<Scoped<B::Decoder>>,
    source: Scoped<B::Source>,
    asset: MediaAsset,
    choice: Option<DecoderChoice>,
    /// The source was read by an earlier call
    dirty: bool,
    /// End of stream was sent to the decoder by `decode_next`
    drained: bool,
}

/// An opened asset with a lazily negotiated decoder shared by every
/// rendition and by `decode_next`.
pub struct MediaHandle<B: Backend = SidecarBackend> {
    backend: B,
    state: Option<OpenState<B>>,
}

impl MediaHandle<SidecarBackend> {
    /// Open `path` with the system FFmpeg. `None` when the asset cannot be
    /// opened or has no video.
    pub fn open(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        match Self::open_with(SidecarBackend::new(), path) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }
}

impl<B: Backend> MediaHandle<B> {
    pub fn open_with(backend: B, path: impl AsRef<Path>) -> Result<Self, OpenError> {
        let asset = AssetProbe::open(&backend, path.as_ref())?;
        let source = backend.open_source(asset.info())?;
        Ok(Self {
            state: Some(OpenState {
                decoder: None,
                source: Scoped::new(source),
                asset,
                choice: None,
                dirty: false,
                drained: false,
            }),
            backend,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub fn asset(&self) -> Option<&MediaAsset> {
        self.state.as_ref().map(|s| &s.asset)
    }

    /// Container duration in seconds; 0 when closed.
    pub fn duration(&self) -> f64 {
        self.asset().map_or(0.0, MediaAsset::duration)
    }

    pub fn width(&self) -> u32 {
        self.asset().map_or(0, MediaAsset::width)
    }

    pub fn height(&self) -> u32 {
        self.asset().map_or(0, MediaAsset::height)
    }

    /// Canonical codec name; "unknown" when closed.
    pub fn codec_name(&self) -> &str {
        self.asset().map_or("unknown", MediaAsset::codec_name)
    }

    /// The negotiated decoder, once one was needed.
    pub fn decoder_choice(&self) -> Option<&DecoderChoice> {
        self.state.as_ref().and_then(|s| s.choice.as_ref())
    }

    /// Release the decoder and the source. Later calls fail with `Closed`.
    pub fn close(&mut self) {
        self.state = None;
    }

    fn ensure_decoder(&mut self) -> Result<(), TranscodeError> {
        let state = self.state.as_mut().ok_or(TranscodeError::Closed)?;
        if state.decoder.is_some() {
            return Ok(());
        }
        let inventory = self.backend.decoder_inventory(state.asset.codec());
        let choice = DecoderNegotiator::select(state.asset.info(), &inventory)?;
        let decoder = self
            .backend
            .open_decoder(&mut state.source, &choice)
            .map_err(|e| TranscodeError::DecoderInit(e.to_string()))?;
        state.decoder = Some(Scoped::new(decoder));
        state.choice = Some(choice);
        Ok(())
    }

    /// Run an arbitrary request.
    pub fn transcode(
        &mut self,
        request: &TranscodeRequest,
        progress: Option<&mut dyn FnMut(f64)>,
    ) -> Result<TranscodeSummary, TranscodeError> {
        self.ensure_decoder()?;
        let state = self.state.as_mut().ok_or(TranscodeError::Closed)?;
        let OpenState {
            decoder,
            source,
            asset,
            dirty,
            drained,
            ..
        } = state;
        let decoder = decoder
            .as_mut()
            .ok_or_else(|| TranscodeError::DecoderInit("decoder not open".into()))?;

        let result = TranscodePipeline::<B>::new(&self.backend, asset.info(), source, decoder)
            .with_dirty_source(*dirty)
            .run(request, progress);
        *dirty = true;
        *drained = false;
        result
    }

    /// Fast rendition on the hardware encoder.
    pub fn prepare(
        &mut self,
        output: impl Into<PathBuf>,
        start: f64,
        end: f64,
        progress: Option<&mut dyn FnMut(f64)>,
    ) -> Result<TranscodeSummary, TranscodeError> {
        let request = RenditionProfile::prepare().request(output, start, end);
        self.transcode(&request, progress)
    }

    /// Quality rendition; HDR sources are tone-mapped automatically.
    pub fn export(
        &mut self,
        output: impl Into<PathBuf>,
        start: f64,
        end: f64,
        progress: Option<&mut dyn FnMut(f64)>,
    ) -> Result<TranscodeSummary, TranscodeError> {
        let request = RenditionProfile::export().request(output, start, end);
        self.transcode(&request, progress)
    }

    pub fn export_ext(
        &mut self,
        output: impl Into<PathBuf>,
        start: f64,
        end: f64,
        tonemap: bool,
        ten_bit: bool,
        progress: Option<&mut dyn FnMut(f64)>,
    ) -> Result<TranscodeSummary, TranscodeError> {
        let request = RenditionProfile::export_ext(tonemap, ten_bit).request(output, start, end);
        self.transcode(&request, progress)
    }

    /// Pull the next decoded frame from the shared decoder.
    ///
    /// `None` at end of stream (after buffered frames were drained), when
    /// the decoder cannot be opened, or when the handle is closed.
    pub fn decode_next(&mut self) -> Option<DecodedFrame> {
        if let Err(e) = self.ensure_decoder() {
            if !matches!(e, TranscodeError::Closed) {
                warn!("{}", e);
            }
            return None;
        }
        let state = self.state.as_mut()?;
        let decoder = state.decoder.as_mut()?;
        state.dirty = true;

        loop {
            match decoder.receive() {
                Ok(Some(frame)) => return Some(frame),
                Ok(None) => {}
                Err(e) => warn!("Skipping frame: {}", e),
            }
            if state.drained {
                return None;
            }
            match state.source.read() {
                Ok(Some(SourceUnit::Video(packet))) => {
                    if let Err(e) = decoder.send(Some(packet)) {
                        warn!("Skipping unit: {}", e);
                    }
                }
                Ok(Some(SourceUnit::Other { .. })) => {}
                Ok(None) => {
                    if let Err(e) = decoder.send(None) {
                        warn!("{}", e);
                    }
                    state.drained = true;
                }
                Err(e @ StageError::MidStreamDecode(_)) => warn!("Skipping unit: {}", e),
                Err(e) => {
                    warn!("{}", e);
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::SyntheticAsset;
    use crate::backend::MemoryBackend;
    use crate::capability::CodecId;
    use reel_core::{FrameLayout, FrameRate, PixelFormat};

    fn backend() -> MemoryBackend {
        MemoryBackend::new().with_asset(
            "clip.mov",
            SyntheticAsset::new(
                CodecId::Vp9,
                FrameLayout::new(PixelFormat::Yuv420P, 32, 18),
                FrameRate::FPS_30,
                1.0,
            ),
        )
    }

    #[test]
    fn test_accessors_and_close() {
        let mut handle = MediaHandle::open_with(backend(), "clip.mov").unwrap();
        assert!(handle.is_open());
        assert_eq!((handle.width(), handle.height()), (32, 18));
        assert_eq!(handle.codec_name(), "vp9");
        assert!((handle.duration() - 1.0).abs() < 1e-9);

        handle.close();
        assert!(!handle.is_open());
        assert_eq!(handle.width(), 0);
        assert_eq!(handle.duration(), 0.0);
        assert_eq!(handle.codec_name(), "unknown");
        assert!(handle.decode_next().is_none());
    }

    #[test]
    fn test_decoder_negotiated_lazily_once() {
        let mut handle = MediaHandle::open_with(backend(), "clip.mov").unwrap();
        assert!(handle.decoder_choice().is_none());
        assert!(handle.decode_next().is_some());
        let first = handle.decoder_choice().cloned();
        assert!(handle.decode_next().is_some());
        assert_eq!(handle.decoder_choice().cloned(), first);
        assert_eq!(handle.backend().ledger().acquired_kinds(), vec!["source", "decoder"]);
    }

    #[test]
    fn test_close_releases_decoder_before_source() {
        let mut handle = MediaHandle::open_with(backend(), "clip.mov").unwrap();
        let ledger = handle.backend().ledger();
        handle.decode_next();
        handle.close();
        assert_eq!(ledger.released_kinds(), vec!["decoder", "source"]);
        assert_eq!(ledger.outstanding(), 0);
    }
}
