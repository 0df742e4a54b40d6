//! Builders for server responses and video settings.

#![allow(dead_code)]

use serde_json::json;

use vupload::job::{Privacy, VideoSettings};
use vupload::transport::{ClientError, Outcome};

pub const UPLOAD_LINK: &str = "https://upload.example.com/u/1001?ticket=abc";
pub const COMPLETE_URI: &str = "/users/42/uploads/1001";

pub fn create_response() -> Outcome {
    create_response_with(UPLOAD_LINK, COMPLETE_URI)
}

pub fn create_response_with(upload_link: &str, complete_uri: &str) -> Outcome {
    Outcome::new(201).with_json(&json!({
        "uri": "/users/42/tickets/1001",
        "upload_link_secure": upload_link,
        "complete_uri": complete_uri
    }))
}

pub fn upload_ok() -> Outcome {
    Outcome::new(200)
}

pub fn activate_response(location: &str) -> Outcome {
    Outcome::new(201).with_location(location)
}

pub fn video_response(uri: &str, name: &str) -> Outcome {
    Outcome::new(200).with_json(&json!({
        "uri": uri,
        "name": name,
        "link": format!("https://vimeo.example.com{}", uri),
        "privacy": { "view": "nobody" }
    }))
}

pub fn connection_lost() -> Outcome {
    Outcome::client_failure(ClientError::new("connection reset by peer"))
}

/// Builder for `VideoSettings`.
#[derive(Default)]
pub struct SettingsBuilder {
    settings: VideoSettings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: &str) -> Self {
        self.settings.title = Some(title.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.settings.description = Some(description.to_string());
        self
    }

    pub fn privacy(mut self, privacy: Privacy) -> Self {
        self.settings.privacy = Some(privacy);
        self
    }

    pub fn build(self) -> VideoSettings {
        self.settings
    }
}
