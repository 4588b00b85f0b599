//! Decoding reader process and its decoder adapter.
//!
//! ffmpeg decodes the selected stream and writes raw pictures to stdout;
//! a `showinfo` filter reports each picture's timestamp and type on
//! stderr. The source hands out whole pictures, so the decoder stage only
//! unpacks them.

use super::pipe::{Chunking, Sidecar};
use crate::asset::AssetInfo;
use crate::backend::{FrameDecoder, MediaSource, SourceUnit};
use crate::error::StageError;
use crate::negotiate::DecoderChoice;
use crate::scope::Release;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use reel_core::{DecodedFrame, FrameBuffer, PictureType};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

/// How long to wait for the timestamp line of a picture.
const SHOWINFO_TIMEOUT: Duration = Duration::from_secs(5);

/// One decoded picture in packed `rawvideo` form.
#[derive(Debug, Clone)]
pub struct RawPicture {
    pub data: Vec<u8>,
    pub pts: Option<i64>,
    pub key: bool,
    pub picture_type: PictureType,
}

/// Fields of a `showinfo` line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShowInfo {
    pub pts_time: Option<f64>,
    pub key: bool,
    pub picture_type: PictureType,
}

/// Parse the per-picture line printed by the `showinfo` filter.
pub fn parse_showinfo(line: &str) -> Option<ShowInfo> {
    if !line.contains("showinfo") || !line.contains(" n:") {
        return None;
    }
    let field = |key: &str| {
        line.find(key)
            .and_then(|i| line[i + key.len()..].split_whitespace().next())
    };
    let pts_time = field("pts_time:")?;
    Some(ShowInfo {
        pts_time: pts_time.parse().ok(),
        key: field("iskey:") == Some("1"),
        picture_type: match field(" type:") {
            Some("I") => PictureType::I,
            Some("P") => PictureType::P,
            Some("B") => PictureType::B,
            _ => PictureType::None,
        },
    })
}

pub struct SidecarSource {
    info: AssetInfo,
    decoder_args: Vec<String>,
    start_ts: i64,
    process: Option<Sidecar>,
    lines: Option<Receiver<String>>,
    finished: bool,
}

impl SidecarSource {
    pub(crate) fn new(info: AssetInfo) -> Self {
        Self {
            info,
            decoder_args: Vec::new(),
            start_ts: 0,
            process: None,
            lines: None,
            finished: false,
        }
    }

    pub fn info(&self) -> &AssetInfo {
        &self.info
    }

    /// Use the negotiated decoder from the next read on.
    pub(crate) fn configure(&mut self, choice: &DecoderChoice) {
        let mut args = match &choice.candidate.hwaccel {
            Some(method) => vec!["-hwaccel".to_string(), method.clone()],
            None => vec!["-c:v".to_string(), choice.candidate.name.clone()],
        };
        args.extend([
            "-threads".to_string(),
            choice.config.threads.to_string(),
            "-thread_type".to_string(),
            if choice.config.frame_threading {
                "frame"
            } else {
                "slice"
            }
            .to_string(),
        ]);
        self.decoder_args = args;
        self.stop();
    }

    fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-nostdin", "-nostats", "-loglevel", "info"]
            .into_iter()
            .map(String::from)
            .collect();
        args.extend(self.decoder_args.iter().cloned());
        if self.start_ts > 0 {
            let seconds = self.info.time_base.seconds(self.start_ts);
            args.extend([
                "-ss".to_string(),
                format!("{:.6}", seconds),
                "-noaccurate_seek".to_string(),
            ]);
        }
        args.extend([
            "-copyts".to_string(),
            "-i".to_string(),
            self.info.path.to_string_lossy().into_owned(),
            "-map".to_string(),
            format!("0:{}", self.info.stream_index),
            "-vf".to_string(),
            "showinfo".to_string(),
            "-fps_mode".to_string(),
            "passthrough".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            self.info.pixel_format.ffmpeg_name().to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }

    fn start(&mut self) -> Result<(), StageError> {
        let layout = self.info.layout();
        let size = layout.format.packed_size(layout.width, layout.height);
        let (tx, rx) = unbounded();
        let mut process = Sidecar::spawn(
            "reader",
            &self.args(),
            Some(Chunking::Fixed(size)),
            Some(tx),
        )?;
        process.close_input();
        self.process = Some(process);
        self.lines = Some(rx);
        Ok(())
    }

    fn stop(&mut self) {
        self.process = None;
        self.lines = None;
    }

    fn next_showinfo(&self) -> Option<ShowInfo> {
        let lines = self.lines.as_ref()?;
        loop {
            match lines.recv_timeout(SHOWINFO_TIMEOUT) {
                Ok(line) => {
                    if let Some(info) = parse_showinfo(&line) {
                        return Some(info);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("No timestamp reported for picture");
                    return None;
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

impl MediaSource for SidecarSource {
    type Packet = RawPicture;

    fn read(&mut self) -> Result<Option<SourceUnit<RawPicture>>, StageError> {
        if self.finished {
            return Ok(None);
        }
        if self.process.is_none() {
            self.start()?;
        }
        let chunk = self.process.as_ref().and_then(Sidecar::recv);
        let Some(data) = chunk else {
            if let Some(mut process) = self.process.take() {
                if let Err(e) = process.finish() {
                    warn!("Reader ended early: {}", e);
                }
            }
            self.lines = None;
            self.finished = true;
            return Ok(None);
        };

        let info = self.next_showinfo();
        Ok(Some(SourceUnit::Video(RawPicture {
            data,
            pts: info
                .and_then(|i| i.pts_time)
                .map(|t| self.info.time_base.from_seconds(t)),
            key: info.is_some_and(|i| i.key),
            picture_type: info.map_or(PictureType::None, |i| i.picture_type),
        })))
    }

    fn seek(&mut self, ts: i64) -> Result<(), StageError> {
        debug!("Reader seek to {}", ts);
        self.stop();
        self.start_ts = ts.max(0);
        self.finished = false;
        Ok(())
    }

    fn suspend(&mut self) {
        if self.process.is_some() {
            debug!("Reader stopped");
        }
        self.stop();
        self.finished = false;
    }
}

impl Release for SidecarSource {
    fn kind(&self) -> &'static str {
        "source"
    }

    fn release(&mut self) {
        self.stop();
    }
}

/// Unpacks pictures produced by the reader.
pub struct SidecarDecoder {
    info: AssetInfo,
    queue: VecDeque<RawPicture>,
}

impl SidecarDecoder {
    pub(crate) fn new(info: AssetInfo) -> Self {
        Self {
            info,
            queue: VecDeque::new(),
        }
    }
}

impl FrameDecoder for SidecarDecoder {
    type Packet = RawPicture;

    fn send(&mut self, packet: Option<RawPicture>) -> Result<(), StageError> {
        if let Some(picture) = packet {
            self.queue.push_back(picture);
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<DecodedFrame>, StageError> {
        let Some(picture) = self.queue.pop_front() else {
            return Ok(None);
        };
        let buffer = FrameBuffer::from_packed(self.info.layout(), &picture.data)
            .map_err(|e| StageError::MidStreamDecode(e.to_string()))?;
        let mut frame = DecodedFrame::new(buffer, picture.pts, self.info.time_base);
        frame.key_frame = picture.key;
        frame.picture_type = picture.picture_type;
        frame.color = self.info.color;
        Ok(Some(frame))
    }

    fn flush(&mut self) {
        self.queue.clear();
    }
}

impl Release for SidecarDecoder {
    fn kind(&self) -> &'static str {
        "decoder"
    }

    fn release(&mut self) {
        self.queue.clear();
    }
}
