mod duration_filter;
mod segmenter;
mod watermark;

pub use duration_filter::DurationFilter;
pub use segmenter::ClipSegmenter;
pub use watermark::WatermarkDetector;
