// HTTP surface served to the chat server

pub mod oauth;

pub use oauth::{create_oauth_router, OAuthAppState, USER_ID_HEADER};
