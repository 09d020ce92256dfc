//! Mattermost REST API v4 implementation of [`ChatHost`].

use super::{ChatHost, HostUser, Post};
use crate::error::BridgeError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct Channel {
    id: String,
}

/// Calls the chat server on behalf of the bot account.
pub struct RestChatHost {
    http_client: Client,
    base_url: String,
    access_token: String,
    timeout: Option<Duration>,
}

impl RestChatHost {
    pub fn new(http_client: Client, base_url: String, access_token: String) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
            timeout: None,
        }
    }

    /// Deadline applied to every chat server request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v4{}", self.base_url, path)
    }

    fn bounded(&self, request: RequestBuilder) -> RequestBuilder {
        match self.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    async fn fetch_user(&self, username: &str) -> Result<HostUser> {
        let url = self.url(&format!("/users/username/{}", urlencoding::encode(username)));
        let response = self
            .bounded(self.http_client.get(url))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("Failed to send user lookup request")?;

        check_response_status(&response)?;
        response
            .json::<HostUser>()
            .await
            .context("Failed to parse user response")
    }

    async fn fetch_direct_channel(&self, user_id: &str, other_user_id: &str) -> Result<String> {
        let response = self
            .bounded(self.http_client.post(self.url("/channels/direct")))
            .bearer_auth(&self.access_token)
            .json(&[user_id, other_user_id])
            .send()
            .await
            .context("Failed to send direct channel request")?;

        check_response_status(&response)?;
        let channel: Channel = response
            .json()
            .await
            .context("Failed to parse channel response")?;
        Ok(channel.id)
    }

    async fn send_post(&self, post: &Post) -> Result<()> {
        let response = self
            .bounded(self.http_client.post(self.url("/posts")))
            .bearer_auth(&self.access_token)
            .json(post)
            .send()
            .await
            .context("Failed to send create post request")?;

        check_response_status(&response)
    }
}

fn check_response_status(response: &reqwest::Response) -> Result<()> {
    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("Chat server returned {}", status));
    }
    Ok(())
}

#[async_trait]
impl ChatHost for RestChatHost {
    async fn get_user_by_username(&self, username: &str) -> Result<HostUser, BridgeError> {
        self.fetch_user(username)
            .await
            .map_err(|e| BridgeError::HostError(format!("{:#}", e)))
    }

    async fn get_direct_channel(
        &self,
        user_id: &str,
        other_user_id: &str,
    ) -> Result<String, BridgeError> {
        self.fetch_direct_channel(user_id, other_user_id)
            .await
            .map_err(|e| BridgeError::HostError(format!("{:#}", e)))
    }

    async fn create_post(&self, post: &Post) -> Result<(), BridgeError> {
        self.send_post(post)
            .await
            .map_err(|e| BridgeError::HostError(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn test_get_user_by_username() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v4/users/username/outlook")
            .match_header("authorization", "Bearer bot-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"bot1","username":"outlook","email":"bot@localhost"}"#)
            .create_async()
            .await;

        let host = RestChatHost::new(Client::new(), server.url(), "bot-token".to_string());
        let user = host.get_user_by_username("outlook").await.unwrap();

        assert_eq!(user.id, "bot1");
        assert_eq!(user.username, "outlook");
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v4/users/username/ghost")
            .with_status(404)
            .create_async()
            .await;

        let host = RestChatHost::new(Client::new(), server.url(), "t".to_string());
        assert!(matches!(
            host.get_user_by_username("ghost").await,
            Err(BridgeError::HostError(_))
        ));
    }

    #[tokio::test]
    async fn test_direct_channel_and_post() {
        let mut server = Server::new_async().await;
        let channel = server
            .mock("POST", "/api/v4/channels/direct")
            .match_body(Matcher::Json(serde_json::json!(["U1", "bot1"])))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"dm1","type":"D"}"#)
            .create_async()
            .await;
        let post = server
            .mock("POST", "/api/v4/posts")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "user_id": "bot1",
                "channel_id": "dm1",
                "type": "custom_outlook_welcome"
            })))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        let host = RestChatHost::new(Client::new(), server.url(), "t".to_string());
        let channel_id = host.get_direct_channel("U1", "bot1").await.unwrap();
        assert_eq!(channel_id, "dm1");

        host.create_post(&Post {
            user_id: "bot1".to_string(),
            channel_id,
            message: "hello".to_string(),
            post_type: "custom_outlook_welcome".to_string(),
        })
        .await
        .unwrap();

        channel.assert_async().await;
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_unresponsive_server_times_out() {
        // Accepts connections and never writes a response
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let host = RestChatHost::new(Client::new(), format!("http://{}", addr), "t".to_string())
            .timeout(Duration::from_millis(200));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            host.get_direct_channel("U1", "bot1"),
        )
        .await
        .expect("host call should give up on its own deadline");

        assert!(matches!(result, Err(BridgeError::HostError(_))));
    }
}
