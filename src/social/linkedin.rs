//! LinkedIn client.
//!
//! OAuth 2.0 authorization code flow, OpenID userinfo, organization lookup,
//! page statistics and UGC post publishing.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::social::{send, send_json, with_retry, RetryPolicy, HTTP_CLIENT};

pub const AUTHORIZATION_URL: &str = "https://www.linkedin.com/oauth/v2/authorization";
pub const TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
pub const SCOPES: &[&str] = &[
    "openid",
    "profile",
    "email",
    "r_liteprofile",
    "w_member_social",
    "r_organization_admin",
];

const API_VERSION: &str = "202311";
const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";
const ORGANIZATION_URN_PREFIX: &str = "urn:li:organization:";
const PERSON_URN_PREFIX: &str = "urn:li:person:";
const ASSET_URN_PREFIX: &str = "urn:li:digitalmediaAsset:";

/// Token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// An organization the user administers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub urn: String,
    pub id: String,
    pub name: String,
    pub logo_url: Option<String>,
    pub platform: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Raw follower and page statistics; each half is `None` when its call failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageInsights {
    pub followers: Option<Value>,
    pub views: Option<Value>,
}

/// Organization details after logo resolution.
#[derive(Debug, Clone)]
pub struct OrganizationDetails {
    pub urn: String,
    pub id: Option<String>,
    pub localized_name: Option<String>,
    pub logo_url: Option<String>,
}

/// LinkedIn REST client.
#[derive(Clone)]
pub struct LinkedInClient {
    http: reqwest::Client,
    api_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    retry: RetryPolicy,
}

impl LinkedInClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: HTTP_CLIENT.clone(),
            api_url: config.li_api_url.clone(),
            client_id: config.li_client_id.clone(),
            client_secret: config.li_client_secret.clone(),
            redirect_uri: config.li_redirect_uri.clone(),
            retry: RetryPolicy::from_config(),
        }
    }

    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builds the consent screen URL for the given CSRF state.
    pub fn authorization_url(&self, state: &str) -> AppResult<String> {
        if self.client_id.is_empty() || self.redirect_uri.is_empty() {
            return Err(AppError::Internal(
                "LinkedIn OAuth is not configured".to_string(),
            ));
        }

        let url = Url::parse_with_params(
            AUTHORIZATION_URL,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("state", state),
                ("scope", &SCOPES.join(" ")),
            ],
        )
        .map_err(|e| AppError::Internal(format!("Invalid authorization URL: {e}")))?;

        Ok(url.into())
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> AppResult<TokenResponse> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = send(self.http.post(TOKEN_URL).form(&form)).await?;
        let token = response.json::<TokenResponse>().await?;
        Ok(token)
    }

    /// Fetches the OpenID profile. The returned object always carries `id == sub`.
    pub async fn user_info(&self, access_token: &str) -> AppResult<Value> {
        let url = format!("{}/userinfo", self.api_url);
        let data = with_retry("linkedin_userinfo", self.retry, || {
            send_json(self.http.get(&url).bearer_auth(access_token))
        })
        .await?;

        normalize_user_info(data)
    }

    /// Lists organizations the token holder administers.
    ///
    /// Organizations whose details cannot be fetched are skipped.
    pub async fn organizations(&self, access_token: &str) -> AppResult<Vec<Account>> {
        let url = format!("{}/organizationAcls", self.api_url);
        let params = [
            ("q", "roleAssignee"),
            ("role", "ADMINISTRATOR"),
            ("state", "APPROVED"),
            ("count", "50"),
        ];

        let acl_data = with_retry("linkedin_organization_acls", self.retry, || {
            send_json(self.restli_get(&url, access_token).query(&params))
        })
        .await?
        .unwrap_or(Value::Null);

        let urns = admin_organization_urns(&acl_data);
        tracing::info!(count = urns.len(), "Found administered LinkedIn organizations");

        let mut accounts = Vec::with_capacity(urns.len());
        for urn in urns {
            match self.organization_details(&urn, access_token).await {
                Ok(details) => accounts.push(account_from_details(details)),
                Err(e) => {
                    tracing::warn!(urn = %urn, error = %e, "Skipping organization without details");
                }
            }
        }
        Ok(accounts)
    }

    /// Fetches name and logo of an organization.
    pub async fn organization_details(
        &self,
        org_urn: &str,
        access_token: &str,
    ) -> AppResult<OrganizationDetails> {
        let numeric_id = organization_numeric_id(org_urn)?;
        let url = format!("{}/organizations/{numeric_id}", self.api_url);

        let details = with_retry("linkedin_organization_details", self.retry, || {
            send_json(
                self.versioned_get(&url, access_token)
                    .query(&[("fields", "id,localizedName,logoV2")]),
            )
        })
        .await?
        .ok_or_else(|| AppError::Internal(format!("Empty details for {org_urn}")))?;

        let logo_url = match logo_asset_urn(&details) {
            Some(asset_urn) => match self.asset_url(&asset_urn, access_token).await {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(urn = %org_urn, error = %e, "Could not resolve logo");
                    None
                }
            },
            None => None,
        };

        Ok(OrganizationDetails {
            urn: org_urn.to_string(),
            id: details.get("id").map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            localized_name: details
                .get("localizedName")
                .and_then(Value::as_str)
                .map(str::to_string),
            logo_url,
        })
    }

    /// Resolves a digital media asset URN to a download URL.
    pub async fn asset_url(&self, asset_urn: &str, access_token: &str) -> AppResult<Option<String>> {
        if !asset_urn.starts_with(ASSET_URN_PREFIX) {
            return Err(AppError::BadRequest(format!(
                "Invalid asset URN: {asset_urn}"
            )));
        }

        let encoded: String = url::form_urlencoded::byte_serialize(asset_urn.as_bytes()).collect();
        let url = format!("{}/digitalmediaAssets/{encoded}", self.api_url);

        let data = with_retry("linkedin_asset", self.retry, || {
            send_json(self.versioned_get(&url, access_token))
        })
        .await?;

        Ok(data.as_ref().and_then(extract_download_url))
    }

    /// Fetches follower and page statistics for an organization.
    ///
    /// The time window is accepted for the caller's bookkeeping; the lifetime
    /// statistics endpoints are queried without it.
    pub async fn page_insights(
        &self,
        org_urn: &str,
        access_token: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> AppResult<PageInsights> {
        organization_numeric_id(org_urn)?;
        tracing::debug!(urn = %org_urn, start_ms, end_ms, "Fetching LinkedIn page insights");

        let followers_url = format!("{}/organizationalEntityFollowerStatistics", self.api_url);
        let followers = with_retry("linkedin_follower_statistics", self.retry, || {
            send_json(
                self.restli_get(&followers_url, access_token)
                    .query(&[("q", "organizationalEntity"), ("organizationalEntity", org_urn)]),
            )
        })
        .await
        .unwrap_or_else(|e| {
            tracing::error!(urn = %org_urn, error = %e, "Follower statistics unavailable");
            None
        });

        let views_url = format!("{}/organizationPageStatistics", self.api_url);
        let views = with_retry("linkedin_page_statistics", self.retry, || {
            send_json(
                self.restli_get(&views_url, access_token)
                    .query(&[("q", "organization"), ("organization", org_urn)]),
            )
        })
        .await
        .unwrap_or_else(|e| {
            tracing::error!(urn = %org_urn, error = %e, "Page statistics unavailable");
            None
        });

        Ok(PageInsights { followers, views })
    }

    /// Publishes a post as the token holder, returning the post URN.
    pub async fn publish(
        &self,
        target_urn: &str,
        access_token: &str,
        text: &str,
        link_url: Option<&str>,
    ) -> AppResult<String> {
        let user_info = self.user_info(access_token).await?;
        let sub = user_info
            .get("sub")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Internal("LinkedIn user id missing".to_string()))?;
        let author = format!("{PERSON_URN_PREFIX}{sub}");

        let body = ugc_post_body(&author, target_urn, text, link_url)?;
        let url = format!("{}/ugcPosts", self.api_url);

        let response = with_retry("linkedin_publish", self.retry, || {
            send(Self::with_restli_headers(self.http.post(&url), access_token).json(&body))
        })
        .await?;

        let status = response.status();
        let post_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match post_id {
            Some(id) if status == reqwest::StatusCode::CREATED => {
                tracing::info!(post_id = %id, target = %target_urn, "Published LinkedIn post");
                Ok(id)
            }
            _ => Err(AppError::Upstream {
                status: status.as_u16(),
                body: "Post accepted without an x-restli-id header".to_string(),
            }),
        }
    }

    fn versioned_get(&self, url: &str, access_token: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .bearer_auth(access_token)
            .header("LinkedIn-Version", API_VERSION)
    }

    fn restli_get(&self, url: &str, access_token: &str) -> reqwest::RequestBuilder {
        Self::with_restli_headers(self.http.get(url), access_token)
    }

    fn with_restli_headers(
        builder: reqwest::RequestBuilder,
        access_token: &str,
    ) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(access_token)
            .header("LinkedIn-Version", API_VERSION)
            .header("X-Restli-Protocol-Version", RESTLI_PROTOCOL_VERSION)
    }
}

/// Requires `sub` and mirrors it into `id`.
pub fn normalize_user_info(data: Option<Value>) -> AppResult<Value> {
    let mut info = match data {
        Some(Value::Object(map)) => map,
        _ => {
            return Err(AppError::Internal(
                "LinkedIn userinfo response is not an object".to_string(),
            ))
        }
    };

    let sub = info
        .get("sub")
        .cloned()
        .filter(|v| !v.is_null())
        .ok_or_else(|| AppError::Internal("LinkedIn userinfo response has no 'sub'".to_string()))?;
    info.insert("id".to_string(), sub);

    Ok(Value::Object(info))
}

/// URNs of ACL entries with an approved administrator role.
pub fn admin_organization_urns(acl_data: &Value) -> Vec<String> {
    acl_data
        .get("elements")
        .and_then(Value::as_array)
        .map(|elements| {
            elements
                .iter()
                .filter(|e| {
                    e.get("role").and_then(Value::as_str) == Some("ADMINISTRATOR")
                        && e.get("state").and_then(Value::as_str) == Some("APPROVED")
                })
                .filter_map(|e| e.get("organization").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Validates an organization URN and returns its numeric id.
pub fn organization_numeric_id(urn: &str) -> AppResult<&str> {
    let id = urn
        .strip_prefix(ORGANIZATION_URN_PREFIX)
        .ok_or_else(|| AppError::BadRequest(format!("Expected an organization URN, got '{urn}'")))?;

    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest(format!(
            "Organization id in '{urn}' is not numeric"
        )));
    }
    Ok(id)
}

fn logo_asset_urn(details: &Value) -> Option<String> {
    let logo = details.get("logoV2")?;
    logo.get("original")
        .or_else(|| logo.get("cropped"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Picks a download URL out of a digital media asset response.
pub fn extract_download_url(asset: &Value) -> Option<String> {
    for key in ["downloadUrl", "privateDownloadUrl"] {
        if let Some(url) = asset.get(key).and_then(Value::as_str) {
            return Some(url.to_string());
        }
    }

    let identifiers = asset
        .get("elements")?
        .get(0)?
        .get("identifiers")?
        .as_array()?;

    identifiers
        .iter()
        .find(|i| i.get("identifierType").and_then(Value::as_str) == Some("DOWNLOAD_URL"))
        .or_else(|| identifiers.iter().find(|i| i.get("identifier").is_some()))
        .and_then(|i| i.get("identifier"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn account_from_details(details: OrganizationDetails) -> Account {
    let id = details.id.unwrap_or_else(|| {
        details
            .urn
            .rsplit(':')
            .next()
            .unwrap_or_default()
            .to_string()
    });
    let name = details
        .localized_name
        .unwrap_or_else(|| format!("Org {id}"));

    Account {
        urn: details.urn,
        id,
        name,
        logo_url: details.logo_url,
        platform: "LinkedIn".to_string(),
        kind: "organization".to_string(),
    }
}

/// Builds a UGC post body for `target_urn`, authored by `author_urn`.
pub fn ugc_post_body(
    author_urn: &str,
    target_urn: &str,
    text: &str,
    link_url: Option<&str>,
) -> AppResult<Value> {
    let mut share_content = json!({
        "shareCommentary": { "text": text },
        "shareMediaCategory": "NONE",
    });
    if let Some(link) = link_url.filter(|l| !l.is_empty()) {
        share_content["shareMediaCategory"] = json!("ARTICLE");
        share_content["media"] = json!([{ "status": "READY", "originalUrl": link }]);
    }

    let mut body = json!({
        "author": author_urn,
        "lifecycleState": "PUBLISHED",
        "specificContent": { "com.linkedin.ugc.ShareContent": share_content },
        "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" },
    });

    if target_urn.starts_with(ORGANIZATION_URN_PREFIX) {
        body["containerEntity"] = json!(target_urn);
    } else if target_urn.starts_with(PERSON_URN_PREFIX) {
        if target_urn != author_urn {
            return Err(AppError::BadRequest(
                "Posting to another member's profile is not supported".to_string(),
            ));
        }
    } else {
        return Err(AppError::BadRequest(format!(
            "Invalid LinkedIn target URN '{target_urn}'"
        )));
    }

    Ok(body)
}
