//! Muxer process: copies the encoder's NUT stream into the output container.
//!
//! Units arrive as raw chunks of that stream, so their timestamps are
//! sequence numbers and are ignored here; the copied NUT packets keep their
//! own.

use super::pipe::Sidecar;
use crate::backend::{EncodedUnit, OutputMuxer, OutputProfile, OutputStream};
use crate::error::StageError;
use crate::scope::Release;
use reel_core::Timebase;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct SidecarMuxer {
    path: PathBuf,
    profile: OutputProfile,
    process: Option<Sidecar>,
    bytes_written: u64,
}

impl SidecarMuxer {
    /// Check `path` is writable; ffmpeg overwrites it once the header is
    /// written.
    pub(crate) fn create(path: &Path, profile: &OutputProfile) -> Result<Self, StageError> {
        File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            profile: profile.clone(),
            process: None,
            bytes_written: 0,
        })
    }

    fn process(&mut self) -> Result<&mut Sidecar, StageError> {
        self.process
            .as_mut()
            .ok_or_else(|| StageError::Unavailable("muxer header not written".into()))
    }
}

pub(crate) fn muxer_args(path: &Path, profile: &OutputProfile) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-nostats".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "nut".into(),
        "-i".into(),
        "pipe:0".into(),
        "-map".into(),
        "0:v".into(),
        "-c".into(),
        "copy".into(),
        "-tag:v".into(),
        profile.codec_tag.clone(),
    ];
    if profile.timescale > 0 {
        args.extend(["-video_track_timescale".into(), profile.timescale.to_string()]);
    }
    args.extend([
        "-f".into(),
        profile.container.clone(),
        "-y".into(),
        path.to_string_lossy().into_owned(),
    ]);
    args
}

impl OutputMuxer for SidecarMuxer {
    fn write_header(&mut self, stream: &OutputStream) -> Result<Timebase, StageError> {
        let args = muxer_args(&self.path, &self.profile);
        self.process = Some(Sidecar::spawn("muxer", &args, None, None)?);
        debug!(
            "Muxing {} {}x{} into {}",
            stream.codec,
            stream.layout.width,
            stream.layout.height,
            self.path.display()
        );
        Ok(self.profile.stream_time_base(stream.encoder_time_base))
    }

    fn write_unit(&mut self, unit: EncodedUnit) -> Result<(), StageError> {
        let len = unit.data.len() as u64;
        self.process()?.write(&unit.data)?;
        self.bytes_written += len;
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), StageError> {
        self.process()?.finish()?;
        self.process = None;
        debug!("Wrote {} bytes to {}", self.bytes_written, self.path.display());
        Ok(())
    }
}

impl Release for SidecarMuxer {
    fn kind(&self) -> &'static str {
        "muxer"
    }

    fn release(&mut self) {
        if let Some(mut process) = self.process.take() {
            process.kill();
        }
    }
}
