use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::HuddleError;
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub host_id: String,
    pub max_participants: u32,
    pub created_at: DateTime<Utc>,
}

/// Returned by register and login.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_participants: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RoomEnvelope {
    room: Room,
}

#[derive(Debug, Deserialize)]
struct JoinAck {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for the account and room directory service.
///
/// Each instance carries its own bearer token; construct one per account.
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl DirectoryClient {
    /// `base_url` is the API root, e.g. `https://rooms.example.com/api`.
    pub fn new(base_url: &str) -> Result<Self, HuddleError> {
        let parsed = url::Url::parse(base_url.trim())
            .map_err(|e| HuddleError::Http(format!("invalid base url '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(HuddleError::Http(format!(
                "unsupported scheme '{}' in base url",
                parsed.scheme()
            )));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, HuddleError> {
        Self::new(&settings.api_base_url)
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub async fn register(&mut self, req: &RegisterRequest) -> Result<AuthResponse, HuddleError> {
        let resp: AuthResponse = self.request(Method::POST, "/auth/register", Some(req)).await?;
        tracing::info!("registered as {}", resp.user.username);
        self.set_token(resp.token.clone());
        Ok(resp)
    }

    pub async fn login(&mut self, req: &LoginRequest) -> Result<AuthResponse, HuddleError> {
        let resp: AuthResponse = self.request(Method::POST, "/auth/login", Some(req)).await?;
        tracing::info!("logged in as {}", resp.user.username);
        self.set_token(resp.token.clone());
        Ok(resp)
    }

    pub async fn create_room(&self, req: &CreateRoomRequest) -> Result<Room, HuddleError> {
        let env: RoomEnvelope = self.request(Method::POST, "/rooms", Some(req)).await?;
        Ok(env.room)
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Room, HuddleError> {
        let path = room_path(room_id, "");
        let env: RoomEnvelope = self.request::<(), _>(Method::GET, &path, None).await?;
        Ok(env.room)
    }

    /// Register membership with the directory. Returns the server's message.
    pub async fn join_room(&self, room_id: &str) -> Result<String, HuddleError> {
        let path = room_path(room_id, "/join");
        let ack: JoinAck = self.request::<(), _>(Method::POST, &path, None).await?;
        Ok(ack.message)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, HuddleError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path);
        tracing::debug!("directory request: {method} {url}");

        let mut builder = self.http.request(method, &url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| HuddleError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &text));
        }

        resp.json::<T>()
            .await
            .map_err(|e| HuddleError::Http(format!("invalid response from {url}: {e}")))
    }
}

fn room_path(room_id: &str, suffix: &str) -> String {
    format!("/rooms/{}{suffix}", urlencoding::encode(room_id.trim()))
}

/// Map a non-2xx response to an error, preferring the body's `error` field.
fn status_error(status: u16, body: &str) -> HuddleError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| format!("HTTP {status}"));
    match status {
        401 | 403 => HuddleError::AuthenticationFailed(message),
        _ => HuddleError::Directory { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_and_path() {
        let client = DirectoryClient::new("http://localhost:3000/api/").unwrap();
        assert_eq!(client.endpoint("/auth/login"), "http://localhost:3000/api/auth/login");
    }

    #[test]
    fn rejects_invalid_base_urls() {
        assert!(DirectoryClient::new("not a url").is_err());
        assert!(DirectoryClient::new("ftp://example.com").is_err());
        assert!(DirectoryClient::new("").is_err());
    }

    #[test]
    fn room_ids_are_percent_encoded() {
        assert_eq!(room_path("abc", ""), "/rooms/abc");
        assert_eq!(room_path("a b/c", "/join"), "/rooms/a%20b%2Fc/join");
    }

    #[test]
    fn token_lifecycle() {
        let mut client = DirectoryClient::from_settings(&Settings::default()).unwrap();
        assert!(!client.is_authenticated());
        client.set_token("t0k3n".into());
        assert_eq!(client.token(), Some("t0k3n"));
        client.clear_token();
        assert!(client.token().is_none());
    }

    #[test]
    fn error_bodies_map_to_taxonomy() {
        assert_eq!(
            status_error(401, r#"{"error":"Invalid credentials"}"#),
            HuddleError::AuthenticationFailed("Invalid credentials".into())
        );
        assert_eq!(
            status_error(404, r#"{"error":"Room not found"}"#),
            HuddleError::Directory { status: 404, message: "Room not found".into() }
        );
        assert_eq!(
            status_error(502, "<html>bad gateway</html>"),
            HuddleError::Directory { status: 502, message: "HTTP 502".into() }
        );
    }

    #[test]
    fn decodes_room_envelope() {
        let env: RoomEnvelope = serde_json::from_str(
            r#"{"room": {
                "id": "r1", "name": "Standup", "hostId": "u1",
                "maxParticipants": 10, "createdAt": "2024-05-01T10:00:00.000Z"
            }}"#,
        )
        .unwrap();
        assert_eq!(env.room.id, "r1");
        assert_eq!(env.room.description, None);
        assert_eq!(env.room.max_participants, 10);
    }

    #[test]
    fn request_bodies_use_camel_case() {
        let body = serde_json::to_value(RegisterRequest {
            email: "a@example.com".into(),
            username: "alice".into(),
            password: "secret".into(),
            display_name: Some("Alice".into()),
        })
        .unwrap();
        assert_eq!(body["displayName"], "Alice");

        let body = serde_json::to_value(CreateRoomRequest {
            name: "Standup".into(),
            description: None,
            max_participants: Some(8),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"name": "Standup", "maxParticipants": 8}));
    }
}
