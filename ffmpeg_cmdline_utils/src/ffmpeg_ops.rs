use std::{
    ffi::OsStr,
    fmt,
    io::Read,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread::JoinHandle,
    time::{Duration, Instant},
};

#[cfg(target_family = "windows")]
use std::os::windows::process::CommandExt;

use image::GrayImage;
use wait_timeout::ChildExt;
use FfmpegError::*;

use crate::*;

const FFPROBE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CUT_TIMEOUT_SECS: u64 = 600;

/// The external programs this crate drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegTool {
    Ffprobe,
    Ffmpeg,
}

impl FfmpegTool {
    fn as_os_str(&self) -> &'static OsStr {
        match self {
            Self::Ffprobe => OsStr::new("ffprobe"),
            Self::Ffmpeg => OsStr::new("ffmpeg"),
        }
    }
}

impl fmt::Display for FfmpegTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_os_str().to_string_lossy())
    }
}

/// Raw grayscale frames streamed from the stdout of a running ffmpeg process.
#[derive(Debug)]
pub struct FfmpegFrameIter {
    width: u32,
    height: u32,
    child: Child,
    num_frames: u32,
    frames_read: u32,
    deadline: Instant,
    finished: bool,
}

impl FfmpegFrameIter {
    pub fn frame_dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self) -> Option<GrayImage> {
        let frame_len = usize::try_from(self.width)
            .ok()?
            .checked_mul(usize::try_from(self.height).ok()?)?;
        let mut raw_buf = vec![0u8; frame_len];

        let stdout = self.child.stdout.as_mut()?;
        let mut buf_head = 0;
        while buf_head < raw_buf.len() {
            if Instant::now() > self.deadline {
                return None;
            }

            match stdout.read(&mut raw_buf[buf_head..]) {
                //something went wrong, or no more data can be read
                Err(_) | Ok(0) => return None,
                Ok(bytes_read) => buf_head += bytes_read,
            }
        }

        GrayImage::from_raw(self.width, self.height, raw_buf)
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            let _kill_error = self.child.kill();
            let _wait_error = self.child.wait();
        }
    }
}

impl Iterator for FfmpegFrameIter {
    type Item = GrayImage;

    fn next(&mut self) -> Option<GrayImage> {
        let read_enough_frames = self.frames_read >= self.num_frames;
        let exceeded_timeout = Instant::now() > self.deadline;
        if self.finished || read_enough_frames || exceeded_timeout {
            self.finish();
            return None;
        }

        match self.read_frame() {
            Some(frame) => {
                self.frames_read += 1;
                Some(frame)
            }
            None => {
                self.finish();
                None
            }
        }
    }
}

// reap the child here so that abandoned iterators never leave zombie ffmpeg processes
impl Drop for FfmpegFrameIter {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Builds an ffmpeg invocation that returns `num_frames` evenly spaced grayscale frames
/// from a window of a video.
#[derive(Clone, Debug)]
pub struct FrameSamplerBuilder {
    src_path: PathBuf,
    num_frames: u32,
    window: Option<(Duration, Duration)>,
    scale: Option<(u32, u32)>,
    multithreaded: bool,
    timeout_secs: Option<u64>,
}

impl FrameSamplerBuilder {
    pub fn new(src_path: impl AsRef<Path>, num_frames: u32) -> Self {
        Self {
            src_path: src_path.as_ref().to_path_buf(),
            num_frames,
            window: None,
            scale: None,
            multithreaded: false,
            timeout_secs: None,
        }
    }

    pub fn src_path(&self) -> &Path {
        &self.src_path
    }

    /// Only sample from `start .. start + span`. Without a window the whole video is
    /// sampled, which costs an extra ffprobe call.
    pub fn window(&mut self, start: Duration, span: Duration) -> &mut Self {
        self.window = Some((start, span));
        self
    }

    /// Resize every frame to exactly `width` x `height`. Without a scale the native
    /// resolution is used, which costs an extra ffprobe call.
    pub fn scale(&mut self, width: u32, height: u32) -> &mut Self {
        self.scale = Some((width, height));
        self
    }

    pub fn multithreaded(&mut self, val: bool) -> &mut Self {
        self.multithreaded = val;
        self
    }

    pub fn timeout_secs(&mut self, timeout_secs: u64) -> &mut Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn spawn_gray(&self) -> Result<FfmpegFrameIter, FfmpegError> {
        let probed = if self.window.is_none() || self.scale.is_none() {
            Some(VideoInfo::new(&self.src_path)?)
        } else {
            None
        };

        let (start, span) = self.window.unwrap_or_else(|| {
            let duration = probed.as_ref().map(VideoInfo::duration).unwrap_or_default();
            (Duration::ZERO, duration)
        });

        let (width, height) = self
            .scale
            .or_else(|| probed.as_ref().map(VideoInfo::resolution))
            .unwrap_or((0, 0));
        if width == 0 || height == 0 {
            return Err(InvalidResolution);
        }

        let fps = sampling_fps(self.num_frames, span);
        let filter_string = match self.scale {
            Some((w, h)) => format!("fps={fps:.6},scale={w}:{h}:flags=area"),
            None => format!("fps={fps:.6}"),
        };
        let start_string = format!("{:.3}", start.as_secs_f64());
        let span_string = format!("{:.3}", span.as_secs_f64());
        let num_frames_string = self.num_frames.to_string();

        #[rustfmt::skip]
        let mut args = vec![
            OsStr::new("-hide_banner"),
            OsStr::new("-loglevel"), OsStr::new("error"),
            OsStr::new("-nostats"),
        ];

        if !self.multithreaded {
            args.extend([OsStr::new("-threads"), OsStr::new("1")]);
        }

        #[rustfmt::skip]
        args.extend([
            OsStr::new("-ss"),       OsStr::new(&start_string),
            OsStr::new("-t"),        OsStr::new(&span_string),
            OsStr::new("-i"),        self.src_path.as_os_str(),
            OsStr::new("-an"),
            OsStr::new("-vf"),       OsStr::new(&filter_string),
            OsStr::new("-frames:v"), OsStr::new(&num_frames_string),
            OsStr::new("-pix_fmt"),  OsStr::new("gray"),
            OsStr::new("-f"),        OsStr::new("rawvideo"),
            OsStr::new("-"),
        ]);

        let child = spawn_ffmpeg_command(FfmpegTool::Ffmpeg, &args, Stdio::null())?;

        Ok(FfmpegFrameIter {
            width,
            height,
            child,
            num_frames: self.num_frames,
            frames_read: 0,
            // (u32::MAX rather than u64::MAX so that the addition cannot overflow)
            deadline: Instant::now()
                + Duration::from_secs(self.timeout_secs.unwrap_or(u64::from(u32::MAX))),
            finished: false,
        })
    }
}

// The fps filter rounds its output timestamps, so sampling at exactly num_frames / span
// sometimes yields one frame too few. Pretend the window is slightly shorter and let
// -frames:v truncate the surplus.
fn sampling_fps(num_frames: u32, span: Duration) -> f64 {
    let adjusted_span = (span.as_secs_f64() * 0.9).max(0.1);
    f64::from(num_frames) / adjusted_span
}

/// How [`cut_segment`] re-encodes its output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentEncoding {
    pub video_codec: String,
    pub crf: u8,
    pub keep_audio: bool,
    pub timeout_secs: u64,
}

impl Default for SegmentEncoding {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            crf: 23,
            keep_audio: false,
            timeout_secs: DEFAULT_CUT_TIMEOUT_SECS,
        }
    }
}

/// Re-encode `start .. start + duration` of `src_path` into `dst_path`, overwriting it if
/// it already exists. Re-encoding (rather than stream copy) makes the cut frame-accurate.
pub fn cut_segment(
    src_path: impl AsRef<Path>,
    dst_path: impl AsRef<Path>,
    start: Duration,
    duration: Duration,
    encoding: &SegmentEncoding,
) -> Result<(), FfmpegError> {
    let start_string = format!("{:.3}", start.as_secs_f64());
    let duration_string = format!("{:.3}", duration.as_secs_f64());
    let crf_string = encoding.crf.to_string();

    #[rustfmt::skip]
    let mut args = vec![
        OsStr::new("-hide_banner"),
        OsStr::new("-loglevel"), OsStr::new("error"),
        OsStr::new("-nostats"),
        OsStr::new("-y"),
        OsStr::new("-ss"),       OsStr::new(&start_string),
        OsStr::new("-i"),        src_path.as_ref().as_os_str(),
        OsStr::new("-t"),        OsStr::new(&duration_string),
        OsStr::new("-map"),      OsStr::new("0:v:0"),
        OsStr::new("-c:v"),      OsStr::new(&encoding.video_codec),
        OsStr::new("-crf"),      OsStr::new(&crf_string),
        OsStr::new("-pix_fmt"),  OsStr::new("yuv420p"),
    ];

    if encoding.keep_audio {
        #[rustfmt::skip]
        args.extend([
            OsStr::new("-map"), OsStr::new("0:a:0?"),
            OsStr::new("-c:a"), OsStr::new("aac"),
        ]);
    } else {
        args.push(OsStr::new("-an"));
    }

    #[rustfmt::skip]
    args.extend([
        OsStr::new("-movflags"), OsStr::new("+faststart"),
        dst_path.as_ref().as_os_str(),
    ]);

    run_ffmpeg_command(
        FfmpegTool::Ffmpeg,
        &args,
        Duration::from_secs(encoding.timeout_secs),
    )?;

    Ok(())
}

/// The raw json printed by `ffprobe -show_format -show_streams`.
pub fn get_video_stats<P: AsRef<Path>>(src_path: P) -> Result<String, FfmpegError> {
    #[rustfmt::skip]
    let args = &[
        OsStr::new("-v"),            OsStr::new("quiet"),
        OsStr::new("-show_format"),
        OsStr::new("-show_streams"),
        OsStr::new("-print_format"), OsStr::new("json"),
        src_path.as_ref().as_os_str(),
    ];

    let stdout = run_ffmpeg_command(
        FfmpegTool::Ffprobe,
        args,
        Duration::from_secs(FFPROBE_TIMEOUT_SECS),
    )?;

    String::from_utf8(stdout).map_err(|_| Utf8Conversion)
}

/// Check that ffprobe and ffmpeg can both be executed. The error names the first tool
/// that could not be found.
pub fn check_ffmpeg_tools() -> Result<(), FfmpegError> {
    for tool in [FfmpegTool::Ffprobe, FfmpegTool::Ffmpeg] {
        run_ffmpeg_command(
            tool,
            &[OsStr::new("-version")],
            Duration::from_secs(FFPROBE_TIMEOUT_SECS),
        )?;
    }

    Ok(())
}

fn spawn_ffmpeg_command(
    tool: FfmpegTool,
    args: &[&OsStr],
    stderr_cfg: Stdio,
) -> Result<Child, FfmpegError> {
    let mut command = Command::new(tool.as_os_str());
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(stderr_cfg);

    //do not spawn a command window on windows
    #[cfg(target_family = "windows")]
    command.creation_flags(winapi::um::winbase::CREATE_NO_WINDOW);

    command.spawn().map_err(|e| match e.kind() {
        // by far the most likely cause is that the tool is not installed.
        std::io::ErrorKind::NotFound => ToolNotFound(tool),
        _ => Io(tool, format!("{:?}", e.kind())),
    })
}

fn run_ffmpeg_command(
    tool: FfmpegTool,
    args: &[&OsStr],
    timeout: Duration,
) -> Result<Vec<u8>, FfmpegError> {
    fn truncate_ffmpeg_err_msg(tool: FfmpegTool, stderr: &[u8]) -> FfmpegError {
        //ffmpeg sometimes creates very long error messages.
        let text = String::from_utf8_lossy(stderr);
        FfmpegInternal(tool, text.trim().chars().take(500).collect())
    }

    let mut child = spawn_ffmpeg_command(tool, args, Stdio::piped())?;

    // both pipes are drained concurrently so the child never stalls on a full pipe
    let stdout_reader = child.stdout.take().map(drain_in_background);
    let stderr_reader = child.stderr.take().map(drain_in_background);

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _kill_error = child.kill();
            let _wait_error = child.wait();
            return Err(TimedOut(tool, timeout.as_secs()));
        }
        Err(e) => {
            let _kill_error = child.kill();
            let _wait_error = child.wait();
            return Err(Io(tool, format!("{:?}", e.kind())));
        }
    };

    let stdout = join_drained(stdout_reader);
    let stderr = join_drained(stderr_reader);

    if status.success() {
        Ok(stdout)
    } else {
        Err(truncate_ffmpeg_err_msg(tool, &stderr))
    }
}

fn drain_in_background<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut acc = vec![];
        let _read_error = pipe.read_to_end(&mut acc);
        acc
    })
}

fn join_drained(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sampling_fps_oversamples_the_window() {
        // ten frames over ten seconds must ask for more than one frame per second
        let fps = sampling_fps(10, Duration::from_secs(10));
        assert!(fps > 1.0);
        assert!(fps * 10.0 >= 10.0);
    }

    #[test]
    fn test_sampling_fps_handles_empty_window() {
        let fps = sampling_fps(16, Duration::ZERO);
        assert!(fps.is_finite());
        assert!(fps > 0.0);
    }

    #[test]
    fn test_tool_names() {
        assert_eq!(FfmpegTool::Ffmpeg.to_string(), "ffmpeg");
        assert_eq!(FfmpegTool::Ffprobe.to_string(), "ffprobe");
        assert!(ToolNotFound(FfmpegTool::Ffprobe).is_tool_missing());
        assert!(!TimedOut(FfmpegTool::Ffmpeg, 3).is_tool_missing());
    }
}
