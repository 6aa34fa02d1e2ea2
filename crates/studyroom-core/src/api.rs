use std::future::Future;

use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::ClientConfig;
use crate::errors::StudyRoomError;
use crate::session::RoomId;

/// Media token lifetime requested when rejoining a room.
pub const REJOIN_TOKEN_EXPIRY_SECS: u64 = 3600;

/// Image attached to a multipart request.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    fn into_part(self) -> Result<Part, StudyRoomError> {
        Part::bytes(self.bytes)
            .file_name(self.file_name)
            .mime_str(&self.mime_type)
            .map_err(|e| StudyRoomError::Http(format!("invalid mime type: {e}")))
    }
}

/// Room creation form.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub title: String,
    pub description: Option<String>,
    pub max_participants: u32,
    pub password: Option<String>,
    pub thumbnail: Option<ImageUpload>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewRoomRequest<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    max_participants: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRoom {
    #[serde(alias = "id")]
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejoinRequest {
    pub can_publish: bool,
    pub can_subscribe: bool,
    pub token_expiry_seconds: u64,
}

impl Default for RejoinRequest {
    fn default() -> Self {
        Self {
            can_publish: true,
            can_subscribe: true,
            token_expiry_seconds: REJOIN_TOKEN_EXPIRY_SECS,
        }
    }
}

/// Media-session credentials returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomAccess {
    pub token: String,
    #[serde(default, alias = "livekitUrl")]
    pub server_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartFocus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFocus {
    pub focus_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusAnalysis {
    pub focused: bool,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Thin client for the study-room REST backend.
///
/// One request per call: no retries, no idempotency keys. Every call takes an
/// optional cancellation token; cancelling drops the in-flight request and
/// resolves the call with [`StudyRoomError::Cancelled`].
#[derive(Clone)]
pub struct StudyRoomApi {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
}

impl StudyRoomApi {
    pub fn new(config: &ClientConfig) -> Result<Self, StudyRoomError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            access_token: config.access_token.clone(),
        })
    }

    pub fn set_access_token(&mut self, token: Option<String>) {
        self.access_token = token;
    }

    pub async fn create_room(
        &self,
        room: NewRoom,
        cancel: Option<&CancellationToken>,
    ) -> Result<CreatedRoom, StudyRoomError> {
        let request = serde_json::to_vec(&NewRoomRequest {
            title: &room.title,
            description: room.description.as_deref(),
            max_participants: room.max_participants,
            password: room.password.as_deref(),
        })
        .map_err(|e| StudyRoomError::Http(format!("encode room request: {e}")))?;

        let mut form = Form::new().part(
            "request",
            Part::bytes(request)
                .mime_str("application/json")
                .map_err(|e| StudyRoomError::Http(e.to_string()))?,
        );
        if let Some(thumbnail) = room.thumbnail {
            form = form.part("thumbnail", thumbnail.into_part()?);
        }

        let req = self.request(Method::POST, "study-rooms")?.multipart(form);
        let created: CreatedRoom = self.send_json(req, cancel).await?;
        tracing::info!("created study room {}", created.room_id);
        Ok(created)
    }

    pub async fn delete_room(
        &self,
        room_id: RoomId,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), StudyRoomError> {
        let req = self.request(Method::DELETE, &format!("study-rooms/{room_id}"))?;
        self.send(req, cancel).await?;
        tracing::info!("deleted study room {room_id}");
        Ok(())
    }

    pub async fn leave_room(
        &self,
        room_id: RoomId,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), StudyRoomError> {
        let req = self.request(Method::POST, &format!("study-rooms/{room_id}/leave"))?;
        self.send(req, cancel).await?;
        Ok(())
    }

    pub async fn rejoin_room(
        &self,
        room_id: RoomId,
        cancel: Option<&CancellationToken>,
    ) -> Result<RoomAccess, StudyRoomError> {
        let req = self
            .request(Method::POST, &format!("study-rooms/{room_id}/rejoin"))?
            .json(&RejoinRequest::default());
        self.send_json(req, cancel).await
    }

    pub async fn start_focus_time(
        &self,
        user_id: u64,
        body: &StartFocus,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), StudyRoomError> {
        let req = self
            .request(Method::POST, &format!("study-times/{user_id}"))?
            .json(body);
        self.send(req, cancel).await?;
        Ok(())
    }

    pub async fn update_focus_time(
        &self,
        user_id: u64,
        body: &UpdateFocus,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), StudyRoomError> {
        let req = self
            .request(Method::PATCH, &format!("study-times/{user_id}"))?
            .json(body);
        self.send(req, cancel).await?;
        Ok(())
    }

    pub async fn upload_focus_record(
        &self,
        image: ImageUpload,
        cancel: Option<&CancellationToken>,
    ) -> Result<FocusAnalysis, StudyRoomError> {
        let form = Form::new().part("image", image.into_part()?);
        let req = self.request(Method::POST, "ai/focus-records")?.multipart(form);
        self.send_json(req, cancel).await
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, StudyRoomError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| StudyRoomError::InvalidUrl(format!("{path}: {e}")))?;
        let req = self.client.request(method, url);
        Ok(match &self.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        })
    }

    async fn send(
        &self,
        req: RequestBuilder,
        cancel: Option<&CancellationToken>,
    ) -> Result<Response, StudyRoomError> {
        cancellable(cancel, async move {
            let resp = req.send().await?;
            check_status(resp).await
        })
        .await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, StudyRoomError> {
        cancellable(cancel, async move {
            let resp = check_status(req.send().await?).await?;
            resp.json::<T>()
                .await
                .map_err(|e| StudyRoomError::Http(format!("invalid response body: {e}")))
        })
        .await
    }
}

async fn check_status(resp: Response) -> Result<Response, StudyRoomError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().clone();
    let message = resp.text().await.unwrap_or_default();
    tracing::warn!("backend request {url} returned {status}");
    Err(StudyRoomError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Race `fut` against `cancel`. A token that is already cancelled wins.
async fn cancellable<T>(
    cancel: Option<&CancellationToken>,
    fut: impl Future<Output = Result<T, StudyRoomError>>,
) -> Result<T, StudyRoomError> {
    let Some(cancel) = cancel else {
        return fut.await;
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!("request cancelled by caller");
            Err(StudyRoomError::Cancelled)
        }
        result = fut => result,
    }
}
