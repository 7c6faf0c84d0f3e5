use std::sync::Arc;

use async_trait::async_trait;
use reqwest::RequestBuilder;

use crate::error::Result;
use crate::models::ContainerImage;

/// Decorates every registry request before it is sent.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        image: &ContainerImage,
        request: RequestBuilder,
    ) -> Result<RequestBuilder>;
}

/// No credentials; requests go out unchanged.
pub struct Anonymous;

#[async_trait]
impl Authenticator for Anonymous {
    async fn authenticate(
        &self,
        _image: &ContainerImage,
        request: RequestBuilder,
    ) -> Result<RequestBuilder> {
        Ok(request)
    }
}

pub struct BasicAuth {
    pub username: String,
    pub password: Option<String>,
}

#[async_trait]
impl Authenticator for BasicAuth {
    async fn authenticate(
        &self,
        _image: &ContainerImage,
        request: RequestBuilder,
    ) -> Result<RequestBuilder> {
        Ok(request.basic_auth(&self.username, self.password.as_ref()))
    }
}

/// Pre-issued bearer token.
pub struct BearerToken(pub String);

#[async_trait]
impl Authenticator for BearerToken {
    async fn authenticate(
        &self,
        _image: &ContainerImage,
        request: RequestBuilder,
    ) -> Result<RequestBuilder> {
        Ok(request.bearer_auth(&self.0))
    }
}

/// Pick an authenticator from optional static credentials. A token wins
/// over a username.
pub fn from_credentials(
    username: Option<&str>,
    password: Option<&str>,
    token: Option<&str>,
) -> Arc<dyn Authenticator> {
    match (token, username) {
        (Some(token), _) => Arc::new(BearerToken(token.to_string())),
        (None, Some(username)) => Arc::new(BasicAuth {
            username: username.to_string(),
            password: password.map(str::to_string),
        }),
        (None, None) => Arc::new(Anonymous),
    }
}
