use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use clip_collector::*;
use image::{GrayImage, Luma};
use itertools::Itertools;
use rand::prelude::*;
use tempfile::TempDir;

#[derive(Clone, Copy, Debug)]
struct MockVideo {
    id: &'static str,
    duration: f64,
    /// Videos with the same seed have the same picture content.
    seed: u64,
    watermarked: bool,
}

fn video(id: &'static str, duration: f64, seed: u64) -> MockVideo {
    MockVideo {
        id,
        duration,
        seed,
        watermarked: false,
    }
}

/// A source whose "downloads" are small text files describing the video, which
/// [`MockMedia`] knows how to turn into frames.
struct MockProvider {
    raw_dir: PathBuf,
    videos: HashMap<String, Vec<MockVideo>>,
    failing_downloads: HashSet<&'static str>,
    failing_searches: HashSet<String>,
}

impl MockProvider {
    fn new(raw_dir: &Path) -> Self {
        Self {
            raw_dir: raw_dir.to_path_buf(),
            videos: HashMap::new(),
            failing_downloads: HashSet::new(),
            failing_searches: HashSet::new(),
        }
    }

    fn with_videos(mut self, keyword: &str, videos: Vec<MockVideo>) -> Self {
        self.videos.insert(keyword.to_string(), videos);
        self
    }

    fn find(&self, id: &str) -> Option<MockVideo> {
        self.videos.values().flatten().find(|v| v.id == id).copied()
    }
}

impl SourceProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn search(&self, keyword: &str) -> Result<SearchResults<'_>, SourceError> {
        if self.failing_searches.contains(keyword) {
            return Err(SourceError::Unavailable("quota exceeded".to_string()));
        }

        let videos = self.videos.get(keyword).cloned().unwrap_or_default();
        Ok(Box::new(videos.into_iter().map(|v| {
            Ok(CandidateVideo {
                id: v.id.to_string(),
                source_name: "mock".to_string(),
                url: format!("mock://{}", v.id),
                declared_duration: Some(v.duration),
            })
        })))
    }

    fn download(&self, candidate: &CandidateVideo) -> Result<RawVideoFile, SourceError> {
        if self.failing_downloads.contains(candidate.id.as_str()) {
            return Err(SourceError::Download("HTTP 403".to_string()));
        }

        let v = self
            .find(&candidate.id)
            .ok_or_else(|| SourceError::Download("unknown video".to_string()))?;

        std::fs::create_dir_all(&self.raw_dir).unwrap();
        let file_path = self.raw_dir.join(format!("mock_{}.mp4", v.id));
        std::fs::write(&file_path, format!("raw|{}|{}", v.seed, v.watermarked)).unwrap();

        Ok(RawVideoFile {
            candidate_id: v.id.to_string(),
            file_path,
            actual_duration: v.duration,
        })
    }
}

/// Stands in for ffmpeg. Raw videos decode to a picture flashing between dark and light,
/// with a static logo in one corner if watermarked. Clips decode to noise determined by
/// the video's seed and the clip's start offset.
#[derive(Default)]
struct MockMedia {
    tool_missing: bool,
    /// (video seed, clip start offset) whose cut fails after writing a partial file.
    failing_cut: Option<(u64, f64)>,
    /// (video seed, clip start offset) whose clip can't be decoded.
    failing_sample: Option<(u64, f64)>,
}

impl MockMedia {
    fn missing_tools() -> Self {
        Self {
            tool_missing: true,
            ..Self::default()
        }
    }
}

fn flashing_frames(request: &FrameRequest, watermarked: bool) -> Vec<GrayImage> {
    let (w, h) = (request.width, request.height);
    (0..request.count)
        .map(|i| {
            let mut frame = GrayImage::from_pixel(w, h, Luma([if i % 2 == 0 { 40 } else { 210 }]));
            if watermarked {
                for y in (h * 7 / 10)..h {
                    for x in (w * 7 / 10)..w {
                        let on = ((x / 4) + (y / 4)) % 2 == 0;
                        frame.put_pixel(x, y, Luma([if on { 255 } else { 0 }]));
                    }
                }
            }
            frame
        })
        .collect()
}

fn noise_frames(request: &FrameRequest, seed: u64, start: f64) -> Vec<GrayImage> {
    let mut rng = StdRng::seed_from_u64(seed * 10_000 + (start * 10.0) as u64);
    (0..request.count)
        .map(|_| GrayImage::from_fn(request.width, request.height, |_, _| Luma([rng.gen()])))
        .collect()
}

impl MediaBackend for MockMedia {
    fn sample_frames(
        &self,
        path: &Path,
        request: &FrameRequest,
    ) -> Result<Vec<GrayImage>, MediaError> {
        if self.tool_missing {
            return Err(MediaError::ToolMissing("ffmpeg not found".to_string()));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| MediaError::Failed(e.to_string()))?;
        match contents.split('|').collect::<Vec<_>>()[..] {
            ["raw", _seed, watermarked] => Ok(flashing_frames(request, watermarked == "true")),
            ["clip", seed, start] => {
                let (seed, start) = (seed.parse::<u64>().unwrap(), start.parse::<f64>().unwrap());
                if self.failing_sample == Some((seed, start)) {
                    let msg = "invalid data found when processing input";
                    return Err(MediaError::Failed(msg.to_string()));
                }
                Ok(noise_frames(request, seed, start))
            }
            _ => Err(MediaError::Failed(format!("unreadable {}", path.display()))),
        }
    }

    fn cut_clip(&self, src: &Path, dst: &Path, start: f64, _duration: f64) -> Result<(), MediaError> {
        if self.tool_missing {
            return Err(MediaError::ToolMissing("ffmpeg not found".to_string()));
        }

        let contents = std::fs::read_to_string(src).map_err(|e| MediaError::Failed(e.to_string()))?;
        let seed = contents.split('|').nth(1).unwrap();
        if self.failing_cut == Some((seed.parse::<u64>().unwrap(), start)) {
            std::fs::write(dst, b"partial").unwrap();
            return Err(MediaError::Failed("ffmpeg exited with status 1".to_string()));
        }
        std::fs::write(dst, format!("clip|{seed}|{start}")).unwrap();
        Ok(())
    }
}

struct Fixture {
    _dir: TempDir,
    cfg: CollectorCfg,
}

impl Fixture {
    fn new(keywords: &[&str], target_clip_count: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let mut cfg = CollectorCfg::default();
        cfg.keywords = keywords.iter().map(|k| k.to_string()).collect();
        cfg.target_clip_count = target_clip_count;
        cfg.paths.raw_videos_dir = root.join("raw_videos");
        cfg.paths.dataset_dir = root.join("dataset");
        cfg.paths.hashes_file = root.join("meta").join("hashes.txt");
        cfg.paths.index_file = root.join("meta").join("index.jsonl");

        Self { _dir: dir, cfg }
    }

    fn provider(&self) -> MockProvider {
        MockProvider::new(&self.cfg.paths.raw_videos_dir)
    }

    fn controller(&self, media: MockMedia) -> CollectionController {
        let stages = PipelineStages::from_cfg(&self.cfg, Box::new(media));
        let store = FileHashStore::new(&self.cfg.paths.hashes_file);
        let index =
            PerceptualHashIndex::load(Box::new(store), self.cfg.dedup.hamming_threshold).unwrap();
        let indexer =
            DatasetIndexer::open(&self.cfg.paths.dataset_dir, &self.cfg.paths.index_file).unwrap();

        CollectionController::new(
            self.cfg.keywords.clone(),
            self.cfg.target_clip_count,
            stages,
            index,
            indexer,
        )
    }

    fn index_rows(&self) -> Vec<DatasetRecord> {
        std::fs::read_to_string(&self.cfg.paths.index_file)
            .unwrap_or_default()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn hash_lines(&self) -> usize {
        std::fs::read_to_string(&self.cfg.paths.hashes_file)
            .unwrap_or_default()
            .lines()
            .count()
    }

    fn leftover_work_files(&self) -> usize {
        walkdir::WalkDir::new(&self.cfg.paths.raw_videos_dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .count()
    }
}

fn run(controller: &mut CollectionController, provider: MockProvider) -> RunReport {
    let sources: Vec<Box<dyn SourceProvider>> = vec![Box::new(provider)];
    controller.run(&sources).unwrap()
}

#[test]
fn test_twelve_second_video_yields_two_clips() {
    let fixture = Fixture::new(&["city at night"], 2);
    let provider = fixture
        .provider()
        .with_videos("city at night", vec![video("v1", 12.0, 1)]);

    let mut controller = fixture.controller(MockMedia::default());
    let report = run(&mut controller, provider);

    assert_eq!(report.outcome, Some(RunOutcome::Done));
    assert_eq!(controller.state(), ControllerState::Done);
    assert_eq!(report.accepted_this_run, 2);

    let rows = fixture.index_rows();
    assert_eq!(
        rows.iter().map(|r| (r.sequence_index, r.start_offset, r.duration)).collect::<Vec<_>>(),
        vec![(0, 0.0, 5.0), (1, 5.0, 5.0)]
    );
    for row in &rows {
        assert_eq!(row.keyword, "city at night");
        assert_eq!(row.source_name, "mock");
        assert_eq!(row.source_video_id, "v1");
        assert!(fixture.cfg.paths.dataset_dir.join(&row.clip_path).is_file());
    }
    assert_eq!(
        rows[1].clip_path,
        Path::new("city_at_night").join("mock_v1_001.mp4")
    );
    assert_eq!(fixture.hash_lines(), 2);

    // raw video and work clips are all gone
    assert_eq!(fixture.leftover_work_files(), 0);
}

#[test]
fn test_short_video_is_rejected_and_sources_run_dry() {
    let fixture = Fixture::new(&["rain"], 3);
    let provider = fixture.provider().with_videos("rain", vec![video("short", 2.0, 1)]);

    let mut controller = fixture.controller(MockMedia::default());
    let report = run(&mut controller, provider);

    assert_eq!(report.outcome, Some(RunOutcome::Exhausted));
    assert_eq!(controller.state(), ControllerState::Exhausted);
    assert_eq!(report.rejections(RejectionReason::Duration), 1);
    assert_eq!(report.accepted_total(), 0);
    assert_eq!(report.shortfall(), 3);
    assert!(fixture.index_rows().is_empty());
    assert_eq!(fixture.leftover_work_files(), 0);
}

#[test]
fn test_same_content_from_two_videos_is_collected_once() {
    let fixture = Fixture::new(&["rain"], 5);
    let provider = fixture.provider().with_videos(
        "rain",
        vec![video("original", 6.0, 7), video("reupload", 6.0, 7)],
    );

    let mut controller = fixture.controller(MockMedia::default());
    let report = run(&mut controller, provider);

    assert_eq!(report.outcome, Some(RunOutcome::Exhausted));
    assert_eq!(report.accepted_this_run, 1);
    assert_eq!(report.rejections(RejectionReason::Duplicate), 1);

    let rows = fixture.index_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].source_video_id, "original");
    assert_eq!(fixture.hash_lines(), 1);
    assert_eq!(fixture.leftover_work_files(), 0);
}

#[test]
fn test_watermarked_video_is_never_cut() {
    let fixture = Fixture::new(&["rain"], 5);
    let provider = fixture.provider().with_videos(
        "rain",
        vec![MockVideo {
            watermarked: true,
            ..video("branded", 20.0, 3)
        }],
    );

    let mut controller = fixture.controller(MockMedia::default());
    let report = run(&mut controller, provider);

    assert_eq!(report.rejections(RejectionReason::Watermark), 1);
    assert_eq!(report.accepted_total(), 0);
    assert!(fixture.index_rows().is_empty());
    assert_eq!(fixture.leftover_work_files(), 0);
}

#[test]
fn test_watermark_check_can_be_disabled() {
    let mut fixture = Fixture::new(&["rain"], 5);
    fixture.cfg.processing.detect_watermarks = false;
    let provider = fixture.provider().with_videos(
        "rain",
        vec![MockVideo {
            watermarked: true,
            ..video("branded", 10.0, 3)
        }],
    );

    let mut controller = fixture.controller(MockMedia::default());
    let report = run(&mut controller, provider);

    assert_eq!(report.rejections(RejectionReason::Watermark), 0);
    assert_eq!(report.accepted_this_run, 2);
}

#[test]
fn test_batch_overshoots_target_without_another_download() {
    let fixture = Fixture::new(&["rain"], 1);
    let provider = fixture
        .provider()
        .with_videos("rain", vec![video("first", 12.0, 1), video("second", 12.0, 2)]);

    let mut controller = fixture.controller(MockMedia::default());
    let sources: Vec<Box<dyn SourceProvider>> = vec![Box::new(provider)];
    let report = controller.run(&sources).unwrap();

    assert_eq!(report.outcome, Some(RunOutcome::Done));
    assert_eq!(report.accepted_this_run, 2);
    assert_eq!(report.videos_downloaded, 1);
    assert_eq!(controller.run_state().accepted_count(), 2);
    assert!(fixture.index_rows().iter().all(|r| r.source_video_id == "first"));
}

#[test]
fn test_existing_dataset_counts_toward_target() {
    let fixture = Fixture::new(&["rain"], 2);
    let provider = fixture.provider().with_videos("rain", vec![video("v1", 12.0, 1)]);
    let mut controller = fixture.controller(MockMedia::default());
    run(&mut controller, provider);
    drop(controller);

    // second run: the target is already met, so nothing is searched
    let provider = fixture.provider().with_videos("rain", vec![video("v2", 12.0, 2)]);
    let mut controller = fixture.controller(MockMedia::default());
    assert_eq!(controller.run_state().accepted_count(), 2);

    let sources: Vec<Box<dyn SourceProvider>> = vec![Box::new(provider)];
    let report = controller.run(&sources).unwrap();

    assert_eq!(report.outcome, Some(RunOutcome::Done));
    assert_eq!(report.accepted_this_run, 0);
    assert_eq!(report.seeded_count, 2);
    assert_eq!(report.videos_downloaded, 0);
    assert_eq!(fixture.index_rows().len(), 2);
}

#[test]
fn test_fresh_count_ignores_existing_dataset() {
    let fixture = Fixture::new(&["rain"], 2);
    let provider = fixture.provider().with_videos("rain", vec![video("v1", 12.0, 1)]);
    let mut controller = fixture.controller(MockMedia::default());
    run(&mut controller, provider);
    drop(controller);

    let provider = fixture
        .provider()
        .with_videos("rain", vec![video("v1", 12.0, 1), video("v2", 12.0, 2)]);
    let mut controller = fixture.controller(MockMedia::default()).with_seeded_count(0);
    let report = run(&mut controller, provider);

    // v1 is recognised from the persisted hashes, v2 is new
    assert_eq!(report.outcome, Some(RunOutcome::Done));
    assert_eq!(report.rejections(RejectionReason::Duplicate), 2);
    assert_eq!(report.accepted_this_run, 2);
    assert_eq!(fixture.index_rows().len(), 4);
    assert_eq!(fixture.hash_lines(), 4);
}

#[test]
fn test_failed_download_is_skipped() {
    let fixture = Fixture::new(&["rain"], 2);
    let mut provider = fixture
        .provider()
        .with_videos("rain", vec![video("private", 12.0, 1), video("public", 12.0, 2)]);
    provider.failing_downloads.insert("private");

    let mut controller = fixture.controller(MockMedia::default());
    let sources: Vec<Box<dyn SourceProvider>> = vec![Box::new(provider)];
    let report = controller.run(&sources).unwrap();

    assert_eq!(report.outcome, Some(RunOutcome::Done));
    assert_eq!(report.failures.download, 1);
    assert_eq!(report.videos_downloaded, 1);
    assert!(fixture.index_rows().iter().all(|r| r.source_video_id == "public"));
}

#[test]
fn test_failed_search_skips_only_that_keyword() {
    let fixture = Fixture::new(&["broken", "rain"], 10);
    let mut provider = fixture
        .provider()
        .with_videos("broken", vec![video("never", 12.0, 1)])
        .with_videos("rain", vec![video("v1", 12.0, 2)]);
    provider.failing_searches.insert("broken".to_string());

    let mut controller = fixture.controller(MockMedia::default());
    let sources: Vec<Box<dyn SourceProvider>> = vec![Box::new(provider)];
    let report = controller.run(&sources).unwrap();

    assert_eq!(report.outcome, Some(RunOutcome::Exhausted));
    assert_eq!(report.failures.source_unavailable, 1);
    assert_eq!(report.accepted_this_run, 2);
    assert!(controller.run_state().is_exhausted("mock", "broken"));
    assert!(controller.run_state().is_exhausted("mock", "rain"));
    assert_eq!(report.per_keyword.get("broken"), None);
    assert_eq!(report.per_keyword["rain"], 2);
}

#[test]
fn test_sources_and_keywords_run_in_order() {
    let fixture = Fixture::new(&["rain", "desert"], 3);
    let provider = fixture
        .provider()
        .with_videos("rain", vec![video("r1", 6.0, 1), video("r2", 6.0, 2)])
        .with_videos("desert", vec![video("d1", 6.0, 3), video("d2", 6.0, 4)]);

    let mut controller = fixture.controller(MockMedia::default());
    let report = run(&mut controller, provider);

    assert_eq!(report.outcome, Some(RunOutcome::Done));
    assert_eq!(
        fixture.index_rows().iter().map(|r| r.source_video_id.as_str()).collect::<Vec<_>>(),
        vec!["r1", "r2", "d1"]
    );
    assert_eq!(controller.run_state().cursor("desert"), 1);
}

#[test]
fn test_failed_cut_keeps_earlier_clips_and_moves_on() {
    let fixture = Fixture::new(&["rain"], 100);
    let provider = fixture
        .provider()
        .with_videos("rain", vec![video("broken", 20.0, 1), video("next", 12.0, 2)]);

    // the third cut of "broken" fails
    let media = MockMedia {
        failing_cut: Some((1, 10.0)),
        ..MockMedia::default()
    };
    let mut controller = fixture.controller(media);
    let report = run(&mut controller, provider);

    assert_eq!(report.outcome, Some(RunOutcome::Exhausted));
    assert_eq!(report.failures.processing, 1);
    assert_eq!(report.videos_downloaded, 2);
    assert_eq!(report.accepted_this_run, 4);
    assert_eq!(
        fixture
            .index_rows()
            .iter()
            .map(|r| (r.source_video_id.as_str(), r.sequence_index))
            .collect::<Vec<_>>(),
        vec![("broken", 0), ("broken", 1), ("next", 0), ("next", 1)]
    );
    assert_eq!(fixture.hash_lines(), 4);
    assert_eq!(fixture.leftover_work_files(), 0);
}

#[test]
fn test_unreadable_clip_discards_rest_of_video() {
    let fixture = Fixture::new(&["rain"], 100);
    let provider = fixture
        .provider()
        .with_videos("rain", vec![video("broken", 20.0, 1), video("next", 12.0, 2)]);

    // clip 1 of "broken" can't be fingerprinted, so clips 1..4 are dropped
    let media = MockMedia {
        failing_sample: Some((1, 5.0)),
        ..MockMedia::default()
    };
    let mut controller = fixture.controller(media);
    let report = run(&mut controller, provider);

    assert_eq!(report.outcome, Some(RunOutcome::Exhausted));
    assert_eq!(report.failures.processing, 1);
    assert_eq!(report.accepted_this_run, 3);
    assert_eq!(report.rejections(RejectionReason::Duplicate), 0);
    assert_eq!(
        fixture
            .index_rows()
            .iter()
            .map(|r| (r.source_video_id.as_str(), r.sequence_index))
            .collect::<Vec<_>>(),
        vec![("broken", 0), ("next", 0), ("next", 1)]
    );
    assert_eq!(fixture.hash_lines(), 3);
    assert_eq!(fixture.leftover_work_files(), 0);
}

#[test]
fn test_missing_media_tool_is_fatal() {
    let fixture = Fixture::new(&["rain"], 2);
    let provider = fixture.provider().with_videos("rain", vec![video("v1", 12.0, 1)]);

    let mut controller = fixture.controller(MockMedia::missing_tools());
    let sources: Vec<Box<dyn SourceProvider>> = vec![Box::new(provider)];
    let err = controller.run(&sources).unwrap_err();

    assert!(matches!(err, Error::FatalEnvironment(_)));
    assert!(err.is_fatal());
    assert!(fixture.index_rows().is_empty());
}

#[test]
fn test_accepted_clips_are_never_near_duplicates() {
    let fixture = Fixture::new(&["rain"], 100);
    let videos = vec![
        video("a", 15.0, 1),
        video("b", 15.0, 2),
        video("a-copy", 15.0, 1),
        video("c", 9.0, 3),
        video("b-copy", 10.0, 2),
    ];
    let provider = fixture.provider().with_videos("rain", videos);

    let mut controller = fixture.controller(MockMedia::default());
    let report = run(&mut controller, provider);

    let rows = fixture.index_rows();
    assert_eq!(rows.len(), 3 + 3 + 1);
    assert_eq!(report.rejections(RejectionReason::Duplicate), 3 + 2);

    let threshold = fixture.cfg.dedup.hamming_threshold;
    for (x, y) in rows.iter().tuple_combinations() {
        assert!(x.fingerprint.hamming_distance(&y.fingerprint) >= threshold);
    }
}
