//! Chat host collaborator.
//!
//! The bridge needs three things from the chat platform: resolve a user by
//! username, open the direct channel between two users, and create a post.
//! [`ChatHost`] is that seam; [`RestChatHost`] talks to the Mattermost REST
//! API v4.

mod notifier;
mod rest;

pub use notifier::{welcome_message, Notifier, WELCOME_POST_TYPE};
pub use rest::RestChatHost;

use crate::error::BridgeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct HostUser {
    pub id: String,
    pub username: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Post {
    pub user_id: String,
    pub channel_id: String,
    pub message: String,
    #[serde(rename = "type")]
    pub post_type: String,
}

#[async_trait]
pub trait ChatHost: Send + Sync {
    async fn get_user_by_username(&self, username: &str) -> Result<HostUser, BridgeError>;

    /// Id of the direct-message channel between the two users.
    async fn get_direct_channel(&self, user_id: &str, other_user_id: &str)
        -> Result<String, BridgeError>;

    async fn create_post(&self, post: &Post) -> Result<(), BridgeError>;
}
