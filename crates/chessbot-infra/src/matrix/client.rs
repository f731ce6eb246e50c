//! MatrixClient -- concrete [`Transport`] over the Matrix client-server API.
//!
//! Each method is a single HTTP request. Retries, encryption and ordering are
//! handled above this layer by the delivery pipeline.
//!
//! The access token is held as a [`SecretString`] and only exposed when the
//! `Authorization` header is built.

use std::time::Duration;

use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::RwLock;

use chessbot_core::transport::Transport;
use chessbot_types::error::TransportError;
use chessbot_types::ids::{ContentUri, EventId, RoomId, UserId};

use super::types::{
    EventIdResponse, LoginRequest, LoginResponse, SyncResponse, UploadResponse, UserIdentifier,
};

const CLIENT_PREFIX: [&str; 3] = ["_matrix", "client", "v3"];
const MEDIA_PREFIX: [&str; 3] = ["_matrix", "media", "v3"];

/// Extra time the HTTP client waits beyond the sync long-poll timeout.
const REQUEST_GRACE: Duration = Duration::from_secs(30);

struct LoginSession {
    access_token: SecretString,
}

/// Matrix homeserver client.
///
/// Created logged out; [`MatrixClient::login`] must succeed before any other
/// call, otherwise they fail with [`TransportError::NotLoggedIn`].
pub struct MatrixClient {
    http: reqwest::Client,
    homeserver: Url,
    session: RwLock<Option<LoginSession>>,
}

impl MatrixClient {
    /// Create a client for `homeserver`. `sync_timeout` bounds the long-poll.
    pub fn new(homeserver: &str, sync_timeout: Duration) -> Result<Self, TransportError> {
        let homeserver = Url::parse(homeserver)
            .map_err(|e| TransportError::Http(format!("invalid homeserver url '{homeserver}': {e}")))?;
        if homeserver.cannot_be_a_base() {
            return Err(TransportError::Http(format!(
                "homeserver url '{homeserver}' cannot carry a path"
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(sync_timeout + REQUEST_GRACE)
            .user_agent(concat!("chessbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Http(format!("failed to create http client: {e}")))?;

        Ok(Self {
            http,
            homeserver,
            session: RwLock::new(None),
        })
    }

    /// Password login. Stores the access token and returns the device id.
    ///
    /// Passing the `device_id` of an earlier login keeps that device;
    /// otherwise the homeserver creates a new one.
    pub async fn login(
        &self,
        user_id: &UserId,
        password: &SecretString,
        device_id: Option<&str>,
        device_display_name: &str,
    ) -> Result<String, TransportError> {
        let localpart = user_id
            .localpart()
            .ok_or_else(|| TransportError::Http(format!("invalid user id '{user_id}'")))?;

        let body = LoginRequest {
            login_type: "m.login.password",
            identifier: UserIdentifier {
                id_type: "m.id.user",
                user: localpart,
            },
            password: password.expose_secret(),
            device_id,
            initial_device_display_name: device_display_name,
        };

        let url = self.endpoint(&CLIENT_PREFIX, &["login"])?;
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;
        let login: LoginResponse = read_json(response).await?;

        if &login.user_id != user_id {
            tracing::warn!(expected = %user_id, actual = %login.user_id, "homeserver returned a different user id");
        }

        if device_id.is_some_and(|requested| requested != login.device_id) {
            tracing::warn!(granted = %login.device_id, "homeserver assigned a new device");
        }

        *self.session.write().await = Some(LoginSession {
            access_token: SecretString::from(login.access_token),
        });
        Ok(login.device_id)
    }

    /// One `/sync` long-poll.
    pub async fn sync(&self, since: Option<&str>, timeout: Duration) -> Result<SyncResponse, TransportError> {
        let mut url = self.endpoint(&CLIENT_PREFIX, &["sync"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("timeout", &timeout.as_millis().to_string());
            if let Some(since) = since {
                query.append_pair("since", since);
            }
        }

        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization().await?)
            .send()
            .await
            .map_err(http_error)?;
        read_json(response).await
    }

    /// Build `{homeserver}/{prefix..}/{segments..}`, percent-encoding each segment.
    fn endpoint(&self, prefix: &[&str], segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.homeserver.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::Http("homeserver url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(prefix)
            .extend(segments);
        Ok(url)
    }

    /// Send a typed client-server request, as produced by the Olm machine.
    #[cfg(feature = "e2ee")]
    pub async fn send_request<R>(&self, request: R) -> Result<R::IncomingResponse, TransportError>
    where
        R: ruma::api::OutgoingRequest,
    {
        use ruma::api::{IncomingResponse, MatrixVersion, SendAccessToken};

        let http_request = {
            let session = self.session.read().await;
            let session = session.as_ref().ok_or(TransportError::NotLoggedIn)?;
            request
                .try_into_http_request::<Vec<u8>>(
                    self.homeserver.as_str().trim_end_matches('/'),
                    SendAccessToken::IfRequired(session.access_token.expose_secret()),
                    &[MatrixVersion::V1_1],
                )
                .map_err(|e| TransportError::Http(format!("failed to build request: {e}")))?
        };
        let http_request = reqwest::Request::try_from(http_request).map_err(http_error)?;

        let response = self.http.execute(http_request).await.map_err(http_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(http_error)?;
        let http_response = http::Response::builder()
            .status(status)
            .body(body.to_vec())
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        R::IncomingResponse::try_from_http_response(http_response).map_err(|e| {
            if status.is_success() {
                TransportError::Decode(e.to_string())
            } else {
                TransportError::Status {
                    status: status.as_u16(),
                    body: e.to_string(),
                }
            }
        })
    }

    async fn authorization(&self) -> Result<String, TransportError> {
        let session = self.session.read().await;
        let session = session.as_ref().ok_or(TransportError::NotLoggedIn)?;
        Ok(format!("Bearer {}", session.access_token.expose_secret()))
    }

    async fn put_json<T: DeserializeOwned>(&self, url: Url, body: &Value) -> Result<T, TransportError> {
        let response = self
            .http
            .put(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization().await?)
            .json(body)
            .send()
            .await
            .map_err(http_error)?;
        read_json(response).await
    }

    async fn post_json(&self, url: Url, body: &Value) -> Result<Value, TransportError> {
        let response = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization().await?)
            .json(body)
            .send()
            .await
            .map_err(http_error)?;
        read_json(response).await
    }
}

fn http_error(error: reqwest::Error) -> TransportError {
    TransportError::Http(error.to_string())
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TransportError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::Status {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|e| TransportError::Decode(e.to_string()))
}

// ---------------------------------------------------------------------------
// Transport implementation
// ---------------------------------------------------------------------------

impl Transport for MatrixClient {
    async fn join_room(&self, room_id: &RoomId) -> Result<(), TransportError> {
        let url = self.endpoint(&CLIENT_PREFIX, &["join", room_id.as_str()])?;
        self.post_json(url, &json!({})).await.map(|_| ())
    }

    async fn send_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        txn_id: &str,
        content: &Value,
    ) -> Result<EventId, TransportError> {
        let url = self.endpoint(
            &CLIENT_PREFIX,
            &["rooms", room_id.as_str(), "send", event_type, txn_id],
        )?;
        let response: EventIdResponse = self.put_json(url, content).await?;
        Ok(response.event_id)
    }

    async fn upload_media(
        &self,
        bytes: &[u8],
        mimetype: &str,
        file_name: &str,
    ) -> Result<ContentUri, TransportError> {
        let mut url = self.endpoint(&MEDIA_PREFIX, &["upload"])?;
        url.query_pairs_mut().append_pair("filename", file_name);

        let response = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization().await?)
            .header(reqwest::header::CONTENT_TYPE, mimetype)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(http_error)?;
        let upload: UploadResponse = read_json(response).await?;
        Ok(upload.content_uri)
    }

    async fn redact(&self, room_id: &RoomId, event_id: &EventId, txn_id: &str) -> Result<(), TransportError> {
        let url = self.endpoint(
            &CLIENT_PREFIX,
            &["rooms", room_id.as_str(), "redact", event_id.as_str(), txn_id],
        )?;
        let _: EventIdResponse = self.put_json(url, &json!({})).await?;
        Ok(())
    }

    async fn mark_read(&self, room_id: &RoomId, event_id: &EventId) -> Result<(), TransportError> {
        let url = self.endpoint(
            &CLIENT_PREFIX,
            &["rooms", room_id.as_str(), "receipt", "m.read", event_id.as_str()],
        )?;
        self.post_json(url, &json!({})).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
