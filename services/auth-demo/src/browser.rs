//! Simulated browser
//!
//! Drives the server the way a user agent would: keeps cookies, does not
//! follow redirects on its own, and stands in for the identity provider by
//! bouncing the authorize URL straight back to the callback with a fixed
//! code and the `state` it was given.

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::header::LOCATION;
use tracing::info;
use url::Url;

pub struct BrowserSession {
    client: reqwest::Client,
    base_url: Url,
}

/// Status observed at one step of the scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: &'static str,
    pub status: u16,
}

#[derive(Debug, Default)]
pub struct ScenarioReport {
    pub steps: Vec<Step>,
    /// Status `/me` returned while the token was live
    pub me_status: u16,
    pub me_body: String,
}

impl ScenarioReport {
    fn record(&mut self, name: &'static str, status: StatusCode) {
        info!(step = name, status = status.as_u16(), "browser step");
        self.steps.push(Step {
            name,
            status: status.as_u16(),
        });
    }
}

impl BrowserSession {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid base URL {base_url}"))?;
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("building browser client")?;
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("joining {path} onto {}", self.base_url))
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        self.client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url}"))
    }

    pub async fn login(&self, username: &str) -> Result<StatusCode> {
        let mut url = self.url("/login")?;
        url.query_pairs_mut().append_pair("username", username);
        Ok(self.get(url).await?.status())
    }

    /// Hit `/azureLogin` and return where the server redirected us.
    pub async fn start_azure_login(&self) -> Result<(StatusCode, Option<Url>)> {
        let response = self.get(self.url("/azureLogin")?).await?;
        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(Url::parse)
            .transpose()
            .context("authorize redirect is not a URL")?;
        Ok((status, location))
    }

    /// Play the identity provider: echo `state` back to the redirect URI's
    /// path on this server, with `code` attached.
    pub fn provider_redirect(&self, authorize_url: &Url, code: &str) -> Result<Url> {
        let param = |name: &str| {
            authorize_url
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };
        let state = param("state").context("authorize URL has no state")?;
        let redirect_uri = param("redirect_uri").context("authorize URL has no redirect_uri")?;
        let redirect_uri = Url::parse(&redirect_uri).context("redirect_uri is not a URL")?;

        let mut callback = self.url(redirect_uri.path())?;
        callback
            .query_pairs_mut()
            .append_pair("code", code)
            .append_pair("state", &state);
        Ok(callback)
    }

    pub async fn follow(&self, url: Url) -> Result<StatusCode> {
        Ok(self.get(url).await?.status())
    }

    pub async fn me(&self) -> Result<(StatusCode, String)> {
        let response = self.get(self.url("/me")?).await?;
        let status = response.status();
        let body = response.text().await.context("reading /me body")?;
        Ok((status, body))
    }

    pub async fn logout(&self) -> Result<StatusCode> {
        Ok(self.get(self.url("/logout")?).await?.status())
    }
}

/// login → azureLogin → provider bounce → callback → /me → logout → /me.
///
/// Fails as soon as a step deviates from the expected flow.
pub async fn run_scenario(base_url: &str, username: &str, code: &str) -> Result<ScenarioReport> {
    let browser = BrowserSession::new(base_url)?;
    let mut report = ScenarioReport::default();

    let status = browser.login(username).await?;
    report.record("login", status);
    if status != StatusCode::OK {
        bail!("login as {username} returned {status}");
    }

    let (status, location) = browser.start_azure_login().await?;
    report.record("azure_login", status);
    let authorize_url = match location {
        Some(url) if status.is_redirection() => url,
        _ => bail!("/azureLogin did not redirect (status {status})"),
    };

    let callback = browser.provider_redirect(&authorize_url, code)?;
    let status = browser.follow(callback).await?;
    report.record("callback", status);
    if !status.is_redirection() {
        bail!("callback was not accepted (status {status})");
    }

    let (status, body) = browser.me().await?;
    report.record("me", status);
    if status == StatusCode::UNAUTHORIZED {
        bail!("/me refused the freshly issued token: {body}");
    }
    report.me_status = status.as_u16();
    report.me_body = body;

    let status = browser.logout().await?;
    report.record("logout", status);
    if status != StatusCode::OK {
        bail!("logout returned {status}");
    }

    let (status, _) = browser.me().await?;
    report.record("me_after_logout", status);
    if status != StatusCode::UNAUTHORIZED {
        bail!("/me still answered {status} after logout");
    }

    Ok(report)
}
