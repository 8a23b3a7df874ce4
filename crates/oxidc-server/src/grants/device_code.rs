//! Device authorization grant (RFC 8628 3.4-3.5)
//!
//! The device polls the token endpoint with its `device_code` while the
//! user approves the paired `user_code` elsewhere. Poll pacing is
//! enforced through `last_polled_at`: polling faster than `interval`
//! earns `slow_down`.

use async_trait::async_trait;

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Request;
use oxidc_core::{Client, DeviceStatus};

use crate::registry::GRANT_DEVICE_CODE;

use super::{GrantContext, GrantHandler, IssueSpec, TokenResponse, check_client_usage, issue_tokens};

/// Device code polling exchange.
#[derive(Debug, Default)]
pub struct DeviceCodeGrant;

#[async_trait]
impl GrantHandler for DeviceCodeGrant {
    fn name(&self) -> &'static str {
        GRANT_DEVICE_CODE
    }

    async fn grant(
        &self,
        request: &Request,
        client: &Client,
        cx: &GrantContext<'_>,
    ) -> OAuthResult<TokenResponse> {
        check_client_usage(client, self.name())?;
        let device_code = request.form_params().require("device_code")?;

        let Some(mut authorization) = cx.stores.device_codes.by_device_code(device_code).await?
        else {
            return Err(OAuthError::invalid_grant(
                "The provided device code is invalid.",
            ));
        };
        if authorization.client_id != client.client_id {
            return Err(OAuthError::invalid_grant(
                "The provided device code is invalid.",
            ));
        }

        if cx.now >= authorization.expires_at {
            return Err(OAuthError::expired_token(
                "The device code has expired.",
            ));
        }

        // Pacing: at most one poll per interval.
        let too_fast = authorization
            .last_polled_at
            .is_some_and(|last| (cx.now - last).num_seconds() < authorization.interval as i64);
        authorization.last_polled_at = Some(cx.now);
        cx.stores.device_codes.update(authorization.clone()).await?;
        if too_fast {
            return Err(OAuthError::slow_down(
                "Polling faster than the advertised interval.",
            ));
        }

        match authorization.status.clone() {
            DeviceStatus::Pending => Err(OAuthError::authorization_pending(
                "The end user has not yet completed the authorization.",
            )),
            DeviceStatus::Denied => Err(OAuthError::access_denied(
                "The end user denied the authorization request.",
            )),
            DeviceStatus::Consumed => Err(OAuthError::invalid_grant(
                "The provided device code has already been used.",
            )),
            DeviceStatus::Authorized { user_id, login_id } => {
                authorization.status = DeviceStatus::Consumed;
                cx.stores.device_codes.update(authorization.clone()).await?;

                let login = match login_id {
                    Some(id) => cx.stores.logins.get(&id).await?,
                    None => None,
                };
                issue_tokens(
                    cx,
                    IssueSpec {
                        client,
                        user_id: Some(user_id),
                        scopes: authorization.scopes.clone(),
                        code: None,
                        chain: None,
                        login: login.as_ref(),
                        nonce: None,
                        claims: None,
                        include_refresh: true,
                        existing_refresh: None,
                    },
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestProvider;
    use chrono::{Duration, Utc};
    use oxidc_core::{DeviceAuthorization, ScopeSet};

    async fn seed_device(
        provider: &TestProvider,
        status: DeviceStatus,
        last_polled_at: Option<chrono::DateTime<Utc>>,
    ) -> DeviceAuthorization {
        let authorization = DeviceAuthorization {
            device_code: "dev-code-1".into(),
            user_code: "BCDF-GHJK".into(),
            client_id: "device-app".into(),
            scopes: ScopeSet::parse("openid").unwrap(),
            interval: 5,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::minutes(10),
            last_polled_at,
            status,
        };
        provider
            .stores()
            .device_codes
            .put(authorization.clone())
            .await
            .unwrap();
        authorization
    }

    async fn device_client(provider: &TestProvider) -> Client {
        let mut client = Client::public("device-app", vec![])
            .with_grant_types([GRANT_DEVICE_CODE, "refresh_token"])
            .with_scopes(ScopeSet::parse("openid").unwrap());
        client.id_token_signed_response_alg = Some("HS256".into());
        provider.stores().clients.put(client.clone()).await.unwrap();
        client
    }

    fn poll() -> Request {
        Request::post("/oauth/token")
            .with_form("grant_type", GRANT_DEVICE_CODE)
            .with_form("device_code", "dev-code-1")
    }

    #[tokio::test]
    async fn pending_then_authorized_then_consumed() {
        let provider = TestProvider::with_defaults().await;
        let client = device_client(&provider).await;
        seed_device(&provider, DeviceStatus::Pending, None).await;
        let cx = provider.grant_context();

        let err = DeviceCodeGrant.grant(&poll(), &client, &cx).await.unwrap_err();
        assert_eq!(err.code.as_str(), "authorization_pending");

        // approve out of band, backdating the poll clock past the interval
        let mut authorization = provider
            .stores()
            .device_codes
            .by_device_code("dev-code-1")
            .await
            .unwrap()
            .unwrap();
        authorization.status = DeviceStatus::Authorized {
            user_id: "user-1".into(),
            login_id: Some("login-1".into()),
        };
        authorization.last_polled_at = Some(Utc::now() - Duration::seconds(10));
        provider.stores().device_codes.update(authorization).await.unwrap();

        let response = DeviceCodeGrant.grant(&poll(), &client, &cx).await.unwrap();
        assert!(response.id_token.is_some());

        // the code is single-use
        let mut authorization = provider
            .stores()
            .device_codes
            .by_device_code("dev-code-1")
            .await
            .unwrap()
            .unwrap();
        authorization.last_polled_at = Some(Utc::now() - Duration::seconds(10));
        provider.stores().device_codes.update(authorization).await.unwrap();
        let err = DeviceCodeGrant.grant(&poll(), &client, &cx).await.unwrap_err();
        assert_eq!(err.code.as_str(), "invalid_grant");
    }

    #[tokio::test]
    async fn fast_polling_earns_slow_down() {
        let provider = TestProvider::with_defaults().await;
        let client = device_client(&provider).await;
        seed_device(&provider, DeviceStatus::Pending, Some(Utc::now())).await;

        let err = DeviceCodeGrant
            .grant(&poll(), &client, &provider.grant_context())
            .await
            .unwrap_err();
        assert_eq!(err.code.as_str(), "slow_down");
    }

    #[tokio::test]
    async fn expired_device_code() {
        let provider = TestProvider::with_defaults().await;
        let client = device_client(&provider).await;
        let mut authorization = seed_device(&provider, DeviceStatus::Pending, None).await;
        authorization.expires_at = Utc::now() - Duration::seconds(1);
        provider.stores().device_codes.update(authorization).await.unwrap();

        let err = DeviceCodeGrant
            .grant(&poll(), &client, &provider.grant_context())
            .await
            .unwrap_err();
        assert_eq!(err.code.as_str(), "expired_token");
    }

    #[tokio::test]
    async fn denial_is_access_denied() {
        let provider = TestProvider::with_defaults().await;
        let client = device_client(&provider).await;
        seed_device(&provider, DeviceStatus::Denied, None).await;

        let err = DeviceCodeGrant
            .grant(&poll(), &client, &provider.grant_context())
            .await
            .unwrap_err();
        assert_eq!(err.code.as_str(), "access_denied");
    }
}
