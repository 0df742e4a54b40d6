use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Endpoints returned by the Create phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResult {
    /// Where the file bytes are sent (`upload_link_secure`).
    pub upload_uri: String,
    /// Where the upload is activated (`complete_uri`).
    pub activation_uri: String,
}

/// Canonical address of the activated video (the `Location` header).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateResult {
    pub video_uri: String,
}

/// Who may view the published video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Anybody,
    Nobody,
    Contacts,
    Password,
    Unlisted,
    Disable,
}

/// Metadata applied to the video once it is activated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<Privacy>,
}

impl VideoSettings {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.privacy.is_none()
    }

    /// Request body in the shape the video API expects.
    pub fn to_request_body(&self) -> Value {
        let mut body = Map::new();
        if let Some(title) = &self.title {
            body.insert("name".to_string(), Value::String(title.clone()));
        }
        if let Some(description) = &self.description {
            body.insert(
                "description".to_string(),
                Value::String(description.clone()),
            );
        }
        if let Some(privacy) = self.privacy {
            let mut view = Map::new();
            view.insert("view".to_string(), serde_json::to_value(privacy).unwrap_or(Value::Null));
            body.insert("privacy".to_string(), Value::Object(view));
        }
        Value::Object(body)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoPrivacy {
    #[serde(default)]
    pub view: Option<String>,
}

/// Video object returned by the Settings phase. Only `uri` is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub privacy: Option<VideoPrivacy>,
}
