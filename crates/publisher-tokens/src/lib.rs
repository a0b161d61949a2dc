//! OAuth2 token manager (C1): hands out a currently valid upstream access
//! token for a user, refreshing through the OAuth2 token endpoint when the
//! cached token is absent or within the skew window of expiring.

mod client;
mod manager;

pub use client::{OAuthClient, OAuthRefreshFailure, RefreshedTokens, ReqwestOAuthClient};
pub use manager::{TokenManager, REFRESH_TOKEN_LIFETIME_DAYS, SKEW_WINDOW};
