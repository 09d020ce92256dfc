use super::{ChatHost, Post};
use crate::error::BridgeError;
use crate::oauth::Identity;
use std::sync::Arc;
use tracing::error;

pub const WELCOME_POST_TYPE: &str = "custom_outlook_welcome";

/// Welcome text sent after a successful connect
pub fn welcome_message(identity: &Identity) -> String {
    format!(
        "### Welcome to the Outlook plugin!\n\
         Here is some info to prove we got you logged in\n\
         Email: {} \n\
         Name: {} \n",
        identity.email, identity.display_name
    )
}

/// Posts bot direct messages to users.
#[derive(Clone)]
pub struct Notifier {
    host: Arc<dyn ChatHost>,
    bot_user_id: String,
}

impl Notifier {
    pub fn new(host: Arc<dyn ChatHost>, bot_user_id: String) -> Self {
        Self { host, bot_user_id }
    }

    /// Post `message` in the DM channel between the bot and `user_id`.
    pub async fn create_bot_dm_post(
        &self,
        user_id: &str,
        message: String,
        post_type: &str,
    ) -> Result<(), BridgeError> {
        let channel_id = self
            .host
            .get_direct_channel(user_id, &self.bot_user_id)
            .await
            .map_err(|e| {
                error!(user_id = %user_id, error = %e, "Couldn't get bot's DM channel");
                e
            })?;

        let post = Post {
            user_id: self.bot_user_id.clone(),
            channel_id,
            message,
            post_type: post_type.to_string(),
        };

        self.host.create_post(&post).await.map_err(|e| {
            error!(user_id = %user_id, error = %e, "Failed to create bot DM post");
            e
        })
    }

    pub async fn send_welcome(
        &self,
        user_id: &str,
        identity: &Identity,
    ) -> Result<(), BridgeError> {
        self.create_bot_dm_post(user_id, welcome_message(identity), WELCOME_POST_TYPE)
            .await
    }
}
