use std::{
    fs::File,
    path::{Path, PathBuf},
    time::Duration,
};

use ffmpeg_cmdline_utils::VideoInfo;
use log::{debug, warn};
use reqwest::blocking::Client;
use serde_json::Value;

use super::{file_stem_for, SearchResults, SourceError, SourceProvider};
use crate::{CandidateVideo, RapidApiCfg, RawVideoFile, ScraperCfg};

const SOURCE_NAME: &str = "tiktok";
const DEFAULT_API_HOST: &str = "tiktok-video-no-watermark2.p.rapidapi.com";
const RESULTS_PER_REQUEST: usize = 20;
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

/// Searches TikTok through a RapidAPI search endpoint and downloads the watermark-free
/// stream URLs it returns.
pub struct TikTokSource {
    client: Option<Client>,
    api_key: String,
    api_host: String,
    limit_per_keyword: usize,
    max_video_duration: f64,
    raw_videos_dir: PathBuf,
}

impl TikTokSource {
    pub fn new(api: &RapidApiCfg, scraper: &ScraperCfg, raw_videos_dir: impl AsRef<Path>) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(scraper.download_timeout_secs))
            .build();

        let client = match client {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(target: "tiktok", "cannot create http client: {e}");
                None
            }
        };

        Self {
            client,
            api_key: api.key.trim().to_string(),
            api_host: api
                .host
                .clone()
                .unwrap_or_else(|| DEFAULT_API_HOST.to_string()),
            limit_per_keyword: scraper.download_limit_per_keyword,
            max_video_duration: scraper.max_video_duration,
            raw_videos_dir: raw_videos_dir.as_ref().to_path_buf(),
        }
    }

    fn client(&self) -> Result<&Client, SourceError> {
        self.client
            .as_ref()
            .ok_or_else(|| SourceError::Unavailable("no http client".to_string()))
    }

    fn fetch_search_page(&self, keyword: &str) -> Result<Value, SourceError> {
        let url = format!("https://{}/feed/search", self.api_host);
        let count = RESULTS_PER_REQUEST.to_string();

        let response = self
            .client()?
            .get(url)
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", &self.api_host)
            .query(&[("keywords", keyword), ("count", count.as_str()), ("cursor", "0")])
            .send()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Unavailable(format!(
                "search request failed with status {status}"
            )));
        }

        response
            .json::<Value>()
            .map_err(|e| SourceError::Unavailable(format!("unparseable search response: {e}")))
    }
}

impl SourceProvider for TikTokSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn search(&self, keyword: &str) -> Result<SearchResults<'_>, SourceError> {
        if self.api_key.is_empty() {
            return Err(SourceError::Unavailable(
                "no RapidAPI key configured".to_string(),
            ));
        }

        let page = self.fetch_search_page(keyword)?;
        let items = search_items(&page);
        debug!(target: "tiktok", "{keyword:?}: {} results", items.len());

        let max_duration = self.max_video_duration;
        let candidates = items
            .into_iter()
            .filter_map(move |item| candidate_from_item(item, max_duration))
            .take(self.limit_per_keyword)
            .map(Ok);

        Ok(Box::new(candidates))
    }

    fn download(&self, candidate: &CandidateVideo) -> Result<RawVideoFile, SourceError> {
        std::fs::create_dir_all(&self.raw_videos_dir).map_err(|e| {
            SourceError::Download(format!(
                "cannot create {}: {e}",
                self.raw_videos_dir.display()
            ))
        })?;

        let dst = self
            .raw_videos_dir
            .join(format!("{}.mp4", file_stem_for(SOURCE_NAME, &candidate.id)));

        let already_present = std::fs::metadata(&dst).is_ok_and(|m| m.len() > 0);
        if already_present {
            debug!(target: "tiktok", "reusing {}", dst.display());
        } else if let Err(e) = self.fetch_to_file(&candidate.url, &dst) {
            let _ = std::fs::remove_file(&dst);
            return Err(e);
        }

        match VideoInfo::new(&dst) {
            Ok(info) => Ok(RawVideoFile {
                candidate_id: candidate.id.clone(),
                file_path: dst,
                actual_duration: info.duration().as_secs_f64(),
            }),
            Err(e) => {
                let _ = std::fs::remove_file(&dst);
                if e.is_tool_missing() {
                    Err(SourceError::ToolMissing(e.to_string()))
                } else {
                    Err(SourceError::Download(format!("downloaded file is unreadable: {e}")))
                }
            }
        }
    }
}

impl TikTokSource {
    fn fetch_to_file(&self, url: &str, dst: &Path) -> Result<(), SourceError> {
        let mut response = self.client()?.get(url).send().map_err(download_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Download(format!(
                "download failed with status {status}"
            )));
        }

        let mut file = File::create(dst).map_err(download_err)?;
        response.copy_to(&mut file).map_err(download_err)?;
        file.sync_all().map_err(download_err)?;
        Ok(())
    }
}

fn download_err(e: impl std::fmt::Display) -> SourceError {
    SourceError::Download(e.to_string())
}

// The search endpoint has answered with both `{"data": [...]}` and `{"data": {"videos": [...]}}`.
fn search_items(page: &Value) -> Vec<Value> {
    let data = &page["data"];
    let items = data
        .as_array()
        .or_else(|| data["videos"].as_array())
        .cloned()
        .unwrap_or_default();
    items.into_iter().filter(|item| item.is_object()).collect()
}

fn candidate_from_item(item: Value, max_duration: f64) -> Option<CandidateVideo> {
    let id = match (&item["video_id"], &item["id"]) {
        (Value::String(id), _) | (_, Value::String(id)) => id.clone(),
        (Value::Number(id), _) | (_, Value::Number(id)) => id.to_string(),
        _ => return None,
    };

    let url = item["play"].as_str().filter(|url| !url.is_empty())?;

    let duration = item["duration"].as_f64().unwrap_or(0.0);
    if !(duration > 0.0 && duration <= max_duration) {
        return None;
    }

    Some(CandidateVideo {
        id,
        source_name: SOURCE_NAME.to_string(),
        url: url.to_string(),
        declared_duration: Some(duration),
    })
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn candidates(page: Value, max_duration: f64) -> Vec<CandidateVideo> {
        search_items(&page)
            .into_iter()
            .filter_map(|item| candidate_from_item(item, max_duration))
            .collect()
    }

    #[test]
    fn test_search_results_are_filtered() {
        let page = json!({
            "code": 0,
            "data": [
                {"video_id": "7301", "play": "https://cdn.example/7301.mp4", "duration": 14},
                {"video_id": "7302", "play": "https://cdn.example/7302.mp4", "duration": 0},
                {"video_id": "7303", "play": "https://cdn.example/7303.mp4", "duration": 900},
                {"video_id": "7304", "duration": 10},
                {"id": 7305, "play": "https://cdn.example/7305.mp4", "duration": 30.5},
                null
            ]
        });

        let found = candidates(page, 60.0);
        assert_eq!(
            found.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["7301", "7305"]
        );
        assert_eq!(found[0].url, "https://cdn.example/7301.mp4");
        assert_eq!(found[1].declared_duration, Some(30.5));
    }

    #[test]
    fn test_nested_video_list() {
        let page = json!({"data": {"videos": [
            {"video_id": "a", "play": "https://cdn.example/a.mp4", "duration": 5}
        ]}});
        assert_eq!(candidates(page, 60.0).len(), 1);
    }

    #[test]
    fn test_empty_responses() {
        assert!(candidates(json!({}), 60.0).is_empty());
        assert!(candidates(json!({"data": null}), 60.0).is_empty());
        assert!(candidates(json!({"data": []}), 60.0).is_empty());
    }

    #[test]
    fn test_missing_key_makes_source_unavailable() {
        let source = TikTokSource::new(
            &RapidApiCfg::default(),
            &ScraperCfg::default(),
            "raw_videos",
        );
        assert!(matches!(
            source.search("rain").err(),
            Some(SourceError::Unavailable(_))
        ));
    }
}
