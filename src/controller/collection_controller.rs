use log::{debug, info, trace, warn};
#[cfg(feature = "parallel_fingerprinting")]
use rayon::prelude::*;

use super::{ControllerState, RunOutcome, RunState};
use crate::{
    definitions::{DCT_SIZE, FINGERPRINT_FRAME_SIZE},
    CandidateVideo, ClipSegmenter, CollectorCfg, DatasetIndexer, DedupVerdict, DurationFilter,
    Error, Fingerprint, FrameRequest, MediaBackend, MediaError, PerceptualHashIndex,
    RawVideoFile, RejectionReason, RunReport, SegmentedClip, SourceError, SourceProvider,
    WatermarkDetector,
};

/// The per-video processing stages, and the media backend they run on.
pub struct PipelineStages {
    pub duration_filter: DurationFilter,
    /// None disables the watermark check.
    pub watermark_detector: Option<WatermarkDetector>,
    pub segmenter: ClipSegmenter,
    pub media: Box<dyn MediaBackend>,
    pub retain_raw_videos: bool,
}

impl PipelineStages {
    pub fn from_cfg(cfg: &CollectorCfg, media: Box<dyn MediaBackend>) -> Self {
        let processing = &cfg.processing;
        Self {
            duration_filter: DurationFilter::new(processing.min_clip_duration),
            watermark_detector: processing.detect_watermarks.then(|| {
                WatermarkDetector::new(
                    processing.watermark_threshold,
                    processing.watermark_sample_frames,
                )
            }),
            segmenter: ClipSegmenter::new(
                processing.clip_duration,
                cfg.paths.raw_videos_dir.join("clips"),
            ),
            media,
            retain_raw_videos: processing.retain_raw_videos,
        }
    }
}

/// Drives sources through the pipeline until the target count is reached or there is
/// nothing left to search.
///
/// Sources are tried in order, and for each source every keyword in order. Candidates are
/// pulled from a search one at a time, and each is carried through download, filtering,
/// segmentation, deduplication and indexing before the next is pulled. The stop condition
/// is only checked between candidates, so the clips of the video being processed when the
/// target is reached are all kept.
pub struct CollectionController {
    keywords: Vec<String>,
    stages: PipelineStages,
    index: PerceptualHashIndex,
    indexer: DatasetIndexer,
    run_state: RunState,
    state: ControllerState,
    report: RunReport,
}

impl CollectionController {
    /// The clips already in the dataset count toward `target_count`.
    pub fn new(
        keywords: Vec<String>,
        target_count: usize,
        stages: PipelineStages,
        index: PerceptualHashIndex,
        indexer: DatasetIndexer,
    ) -> Self {
        let seeded_count = indexer.record_count();
        let clip_duration = stages.segmenter.clip_duration();
        Self {
            keywords,
            stages,
            index,
            indexer,
            run_state: RunState::new(target_count, seeded_count),
            state: ControllerState::Searching,
            report: RunReport::new(target_count, seeded_count, clip_duration),
        }
    }

    /// Start counting from `seeded_count` instead of the number of indexed clips.
    pub fn with_seeded_count(mut self, seeded_count: usize) -> Self {
        let target_count = self.run_state.target_count;
        self.run_state = RunState::new(target_count, seeded_count);
        self.report = RunReport::new(target_count, seeded_count, self.report.clip_duration);
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn run_state(&self) -> &RunState {
        &self.run_state
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn indexer(&self) -> &DatasetIndexer {
        &self.indexer
    }

    pub fn dedup_index(&self) -> &PerceptualHashIndex {
        &self.index
    }

    fn transition(&mut self, next: ControllerState) {
        if self.state != next {
            trace!(target: "controller", "{} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn finish(&mut self, outcome: RunOutcome) -> RunReport {
        self.transition(outcome.into());
        self.report.outcome = Some(outcome);
        info!(
            target: "controller",
            "run finished {}: {} clips collected ({} this run), target {}",
            self.state,
            self.run_state.accepted_count(),
            self.report.accepted_this_run,
            self.run_state.target_count
        );
        self.report.clone()
    }

    /// Collect until the target is reached (`Done`) or every source has run out of
    /// candidates for every keyword (`Exhausted`). Only a missing tool or a failure to
    /// write the dataset or hash store ends the run early.
    pub fn run(&mut self, sources: &[Box<dyn SourceProvider>]) -> Result<RunReport, Error> {
        if self.run_state.target_reached() {
            return Ok(self.finish(RunOutcome::Done));
        }

        let keywords = self.keywords.clone();
        for source in sources {
            for keyword in &keywords {
                if self.run_state.is_exhausted(source.name(), keyword) {
                    continue;
                }

                self.transition(ControllerState::Searching);
                info!(target: "controller", "searching {} for {keyword:?}", source.name());

                let candidates = match source.search(keyword) {
                    Ok(candidates) => candidates,
                    Err(e) => {
                        self.source_failed(source.name(), keyword, e)?;
                        continue;
                    }
                };

                for candidate in candidates {
                    let candidate = match candidate {
                        Ok(candidate) => candidate,
                        Err(e) => {
                            self.source_failed(source.name(), keyword, e)?;
                            break;
                        }
                    };

                    let cursor = self.run_state.advance_cursor(keyword);
                    debug!(
                        target: "controller",
                        "{keyword:?} candidate {cursor}: {} {}", candidate.source_name, candidate.id
                    );
                    self.process_candidate(source.as_ref(), &candidate, keyword)?;

                    if self.run_state.target_reached() {
                        return Ok(self.finish(RunOutcome::Done));
                    }
                    self.transition(ControllerState::Searching);
                }

                self.run_state.mark_exhausted(source.name(), keyword);
            }
        }

        Ok(self.finish(RunOutcome::Exhausted))
    }

    fn source_failed(
        &mut self,
        source_name: &str,
        keyword: &str,
        e: SourceError,
    ) -> Result<(), Error> {
        let reason = match e {
            SourceError::ToolMissing(msg) => return Err(Error::FatalEnvironment(msg)),
            SourceError::Unavailable(reason) | SourceError::Download(reason) => reason,
        };

        let e = Error::SourceUnavailable {
            source_name: source_name.to_string(),
            keyword: keyword.to_string(),
            reason,
        };
        warn!(target: "controller", "{e}");
        self.report.failures.source_unavailable += 1;
        self.run_state.mark_exhausted(source_name, keyword);
        Ok(())
    }

    fn process_candidate(
        &mut self,
        source: &dyn SourceProvider,
        candidate: &CandidateVideo,
        keyword: &str,
    ) -> Result<(), Error> {
        self.transition(ControllerState::Downloading);

        let raw = match source.download(candidate) {
            Ok(raw) => raw,
            Err(SourceError::ToolMissing(msg)) => return Err(Error::FatalEnvironment(msg)),
            Err(SourceError::Download(reason) | SourceError::Unavailable(reason)) => {
                let e = Error::DownloadFailure {
                    candidate_id: candidate.id.clone(),
                    reason,
                };
                warn!(target: "controller", "{e}");
                self.report.failures.download += 1;
                return Ok(());
            }
        };
        self.report.videos_downloaded += 1;

        let result = self.process_video(candidate, &raw, keyword);
        self.discard_raw(&raw);
        result
    }

    fn process_video(
        &mut self,
        candidate: &CandidateVideo,
        raw: &RawVideoFile,
        keyword: &str,
    ) -> Result<(), Error> {
        self.transition(ControllerState::Filtering);

        if !self.stages.duration_filter.accepts(raw) {
            info!(
                target: "controller",
                "{}: too short ({:.1}s)", candidate.id, raw.actual_duration
            );
            self.report.record_rejection(RejectionReason::Duration);
            return Ok(());
        }

        if let Some(detector) = self.stages.watermark_detector {
            match detector.inspect(self.stages.media.as_ref(), raw) {
                Ok(confidence) if detector.is_rejected(confidence) => {
                    info!(
                        target: "controller",
                        "{}: watermarked (confidence {confidence})", candidate.id
                    );
                    self.report.record_rejection(RejectionReason::Watermark);
                    return Ok(());
                }
                Ok(_) => (),
                Err(e) => return self.processing_failed(raw, e),
            }
        }

        self.transition(ControllerState::Segmenting);
        let (clips, cut_error) = self.stages.segmenter.segment(self.stages.media.as_ref(), raw);
        if let Some(e) = cut_error {
            // the clips cut before the failure carry on through the pipeline
            if let Err(fatal) = self.processing_failed(raw, e) {
                discard_clips(&clips);
                return Err(fatal);
            }
        }

        self.transition(ControllerState::Deduping);
        let fingerprints = self.fingerprint_clips(&clips);

        for (idx, (clip, fingerprint)) in clips.iter().zip(fingerprints).enumerate() {
            let fingerprint = match fingerprint {
                Ok(fingerprint) => fingerprint,
                Err(e) => {
                    discard_clips(&clips[idx..]);
                    return self.processing_failed(raw, e);
                }
            };

            if let Err(e) = self.dedup_and_index(clip, fingerprint, candidate, keyword) {
                discard_clips(&clips[idx..]);
                return Err(e);
            }
        }

        Ok(())
    }

    fn dedup_and_index(
        &mut self,
        clip: &SegmentedClip,
        fingerprint: Fingerprint,
        candidate: &CandidateVideo,
        keyword: &str,
    ) -> Result<(), Error> {
        match self.index.test_and_insert(fingerprint)? {
            DedupVerdict::Duplicate { distance } => {
                debug!(
                    target: "controller",
                    "{} clip {}: duplicate (distance {distance})", candidate.id, clip.sequence_index
                );
                self.report.record_rejection(RejectionReason::Duplicate);
                discard_clips(std::slice::from_ref(clip));
            }
            DedupVerdict::Accepted => {
                self.transition(ControllerState::Indexing);
                let accepted = self.indexer.accept(clip, candidate, keyword, fingerprint)?;
                self.run_state.record_accepted();
                self.report.record_accepted(keyword);
                info!(
                    target: "controller",
                    "accepted {} ({}/{})",
                    accepted.file_path.display(),
                    self.run_state.accepted_count(),
                    self.run_state.target_count
                );
                self.transition(ControllerState::Deduping);
            }
        }
        Ok(())
    }

    fn fingerprint_request(&self) -> FrameRequest {
        FrameRequest {
            start: 0.0,
            span: self.stages.segmenter.clip_duration(),
            count: DCT_SIZE,
            width: FINGERPRINT_FRAME_SIZE,
            height: FINGERPRINT_FRAME_SIZE,
        }
    }

    // Fingerprints come back in clip order.
    fn fingerprint_clips(&self, clips: &[SegmentedClip]) -> Vec<Result<Fingerprint, MediaError>> {
        let request = self.fingerprint_request();
        let media = self.stages.media.as_ref();

        #[cfg(feature = "parallel_fingerprinting")]
        let it = clips.par_iter();
        #[cfg(not(feature = "parallel_fingerprinting"))]
        let it = clips.iter();

        it.map(|clip| fingerprint_clip(media, clip, &request))
            .collect()
    }

    fn processing_failed(&mut self, raw: &RawVideoFile, e: MediaError) -> Result<(), Error> {
        let reason = match e {
            MediaError::ToolMissing(msg) => return Err(Error::FatalEnvironment(msg)),
            MediaError::Failed(reason) => reason,
        };

        let e = Error::ProcessingFailure {
            video_id: raw.candidate_id.clone(),
            reason,
        };
        warn!(target: "controller", "{e}");
        self.report.failures.processing += 1;
        Ok(())
    }

    fn discard_raw(&self, raw: &RawVideoFile) {
        if self.stages.retain_raw_videos {
            return;
        }
        if let Err(e) = std::fs::remove_file(&raw.file_path) {
            warn!(
                target: "controller",
                "failed to delete {}: {e}", raw.file_path.display()
            );
        }
    }
}

fn fingerprint_clip(
    media: &dyn MediaBackend,
    clip: &SegmentedClip,
    request: &FrameRequest,
) -> Result<Fingerprint, MediaError> {
    let frames = media.sample_frames(&clip.file_path, request)?;
    Fingerprint::from_frames(&frames).map_err(|e| {
        MediaError::Failed(format!("fingerprinting {}: {e}", clip.file_path.display()))
    })
}

fn discard_clips(clips: &[SegmentedClip]) {
    for clip in clips {
        if let Err(e) = std::fs::remove_file(&clip.file_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    target: "controller",
                    "failed to delete {}: {e}", clip.file_path.display()
                );
            }
        }
    }
}
