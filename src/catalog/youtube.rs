use super::oauth::TokenProvider;
use super::{CatalogError, CatalogResult, RemoteCatalog, UploadRequest};
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/youtube/v3";
const PAGE_SIZE: &str = "50";
const RECORDING_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Per-upload settings that do not come from the video plan
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub category_id: String,
    pub privacy_status: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemsPage {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    snippet: PlaylistItemSnippet,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemSnippet {
    title: String,
}

#[derive(Debug, Deserialize)]
struct InsertedVideo {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoResource<'a> {
    snippet: VideoSnippet<'a>,
    status: VideoStatus<'a>,
    recording_details: RecordingDetails,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet<'a> {
    title: &'a str,
    description: &'a str,
    category_id: &'a str,
    tags: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatus<'a> {
    privacy_status: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordingDetails {
    recording_date: String,
}

/// YouTube Data API v3 catalog: playlists are collections, videos are items
pub struct YoutubeCatalog {
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    settings: UploadSettings,
}

impl YoutubeCatalog {
    pub fn new(tokens: Arc<dyn TokenProvider>, settings: UploadSettings) -> CatalogResult<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            tokens,
            settings,
        })
    }

    async fn check(response: reqwest::Response) -> CatalogResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(CatalogError::Api { status, body })
    }

    fn video_resource<'a>(&'a self, request: &'a UploadRequest) -> VideoResource<'a> {
        VideoResource {
            snippet: VideoSnippet {
                title: &request.title,
                description: &request.description,
                category_id: &self.settings.category_id,
                tags: &self.settings.tags,
            },
            status: VideoStatus {
                privacy_status: &self.settings.privacy_status,
            },
            recording_details: RecordingDetails {
                recording_date: request.recorded_at.format(RECORDING_DATE_FORMAT).to_string(),
            },
        }
    }
}

#[async_trait]
impl RemoteCatalog for YoutubeCatalog {
    async fn list_existing_titles(&self, collection_id: &str) -> CatalogResult<HashSet<String>> {
        let mut titles = HashSet::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("part", "snippet"),
                ("playlistId", collection_id),
                ("maxResults", PAGE_SIZE),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let response = self
                .client
                .get(format!("{}/playlistItems", API_BASE))
                .bearer_auth(self.tokens.access_token().await?)
                .query(&query)
                .send()
                .await?;
            let page: PlaylistItemsPage = Self::check(response).await?.json().await?;

            titles.extend(page.items.into_iter().map(|item| item.snippet.title));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("📋 Playlist {} holds {} videos", collection_id, titles.len());
        Ok(titles)
    }

    async fn upload(&self, request: &UploadRequest) -> CatalogResult<String> {
        let file = tokio::fs::File::open(&request.path).await?;
        let length = file.metadata().await?.len();

        // Resumable upload: open a session, then send the bytes to it
        let session = self
            .client
            .post(format!("{}/videos", UPLOAD_BASE))
            .bearer_auth(self.tokens.access_token().await?)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status,recordingDetails")])
            .header("X-Upload-Content-Type", "video/*")
            .header("X-Upload-Content-Length", length.to_string())
            .json(&self.video_resource(request))
            .send()
            .await?;
        let session = Self::check(session).await?;
        let location = session
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| CatalogError::Response("upload session has no Location header".to_string()))?
            .to_string();

        info!("📤 Uploading {} ({} bytes)", request.path.display(), length);
        let response = self
            .client
            .put(location)
            .bearer_auth(self.tokens.access_token().await?)
            .header(CONTENT_TYPE, "video/*")
            .header(CONTENT_LENGTH, length)
            .body(reqwest::Body::from(file))
            .send()
            .await?;
        let video: InsertedVideo = Self::check(response).await?.json().await?;

        info!("✅ Upload successful! https://youtu.be/{}", video.id);
        Ok(video.id)
    }

    async fn attach_to_collection(&self, collection_id: &str, remote_id: &str) -> CatalogResult<()> {
        let body = json!({
            "snippet": {
                "playlistId": collection_id,
                "resourceId": { "kind": "youtube#video", "videoId": remote_id },
            }
        });

        let response = self
            .client
            .post(format!("{}/playlistItems", API_BASE))
            .bearer_auth(self.tokens.access_token().await?)
            .query(&[("part", "snippet")])
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;

        debug!("📎 Added {} to playlist {}", remote_id, collection_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::oauth::StaticToken;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn catalog() -> YoutubeCatalog {
        YoutubeCatalog::new(
            Arc::new(StaticToken("token".to_string())),
            UploadSettings {
                category_id: "19".to_string(),
                privacy_status: "private".to_string(),
                tags: vec!["GoPro".to_string()],
            },
        )
        .unwrap()
    }

    #[test]
    fn test_video_resource_json() {
        let catalog = catalog();
        let request = UploadRequest {
            path: PathBuf::from("/out/[Trip] Day 1.mp4"),
            title: "[Trip] Day 1".to_string(),
            description: "0:00:00 | GH010001.MP4".to_string(),
            recorded_at: Utc.with_ymd_and_hms(2023, 7, 1, 10, 0, 0).unwrap(),
        };

        let value = serde_json::to_value(catalog.video_resource(&request)).unwrap();
        assert_eq!(value["snippet"]["title"], "[Trip] Day 1");
        assert_eq!(value["snippet"]["categoryId"], "19");
        assert_eq!(value["snippet"]["tags"][0], "GoPro");
        assert_eq!(value["status"]["privacyStatus"], "private");
        assert_eq!(value["recordingDetails"]["recordingDate"], "2023-07-01T10:00:00.000Z");
    }

    #[test]
    fn test_parse_playlist_page() {
        let json = r#"{
            "nextPageToken": "CDIQAA",
            "items": [
                {"snippet": {"title": "[Trip] Day 1", "position": 0}},
                {"snippet": {"title": "[Trip] Day 2 pt 1", "position": 1}}
            ]
        }"#;
        let page: PlaylistItemsPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[1].snippet.title, "[Trip] Day 2 pt 1");
        assert_eq!(page.next_page_token.as_deref(), Some("CDIQAA"));

        let last: PlaylistItemsPage = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert!(last.next_page_token.is_none());
    }
}
