//! Minimal W3C WebDriver wire-protocol client, sized to what the capture
//! script needs. Talks JSON over HTTP to a locally running chromedriver.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};

use crate::driver::{ElementHandle, Key, Locator, PageDriver};

// W3C element identifier key used in wire payloads.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Deserialize)]
struct WireResponse {
    value: Value,
}

pub struct WebDriverClient {
    http: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl WebDriverClient {
    /// Creates a browser session against a chromedriver at `base_url`
    /// (e.g. `http://127.0.0.1:9515`).
    pub async fn connect(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::new();
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": ["--window-size=1920,1080", "--log-level=3"],
                        "excludeSwitches": ["enable-automation"]
                    }
                }
            }
        });

        let base_url = base_url.trim_end_matches('/').to_string();
        let response = http
            .post(format!("{base_url}/session"))
            .json(&capabilities)
            .send()
            .await
            .with_context(|| format!("could not reach WebDriver at {base_url}"))?;

        let body: WireResponse = check(response).await?;
        let session_id = body.value["sessionId"]
            .as_str()
            .ok_or_else(|| anyhow!("WebDriver session response missing sessionId"))?
            .to_string();

        info!("WebDriver session {session_id} created");
        Ok(Self {
            http,
            base_url,
            session_id,
        })
    }

    /// Deletes the browser session. Safe to call on shutdown paths; a
    /// failure here is logged by the caller, not retried.
    pub async fn quit(&self) -> Result<()> {
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        let response = self
            .http
            .delete(url)
            .send()
            .await
            .context("failed to send session delete")?;
        check(response).await?;
        info!("WebDriver session {} closed", self.session_id);
        Ok(())
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/session/{}{path}", self.base_url, self.session_id)
    }

    async fn command(&self, path: &str, body: Value) -> Result<Value> {
        let response = self
            .http
            .post(self.session_url(path))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("WebDriver command {path} failed to send"))?;
        Ok(check(response).await?.value)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let response = self
            .http
            .get(self.session_url(path))
            .send()
            .await
            .with_context(|| format!("WebDriver query {path} failed to send"))?;
        Ok(check(response).await?.value)
    }

    async fn find_element(&self, locator: &Locator) -> Result<ElementHandle> {
        let (using, value) = match locator {
            Locator::Css(sel) => ("css selector", sel.as_str()),
            Locator::XPath(expr) => ("xpath", expr.as_str()),
        };
        let found = self
            .command("/element", json!({ "using": using, "value": value }))
            .await?;
        let id = found[ELEMENT_KEY]
            .as_str()
            .ok_or_else(|| anyhow!("element response missing {ELEMENT_KEY} for {locator}"))?;
        Ok(ElementHandle(id.to_string()))
    }

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool> {
        let value = self.get(&format!("/element/{}/enabled", element.0)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn poll_element(
        &self,
        locator: &Locator,
        timeout: Duration,
        require_enabled: bool,
    ) -> Result<ElementHandle> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.find_element(locator).await {
                Ok(handle) => {
                    if !require_enabled || self.is_enabled(&handle).await.unwrap_or(false) {
                        return Ok(handle);
                    }
                }
                Err(err) => {
                    if Instant::now() >= deadline {
                        return Err(err.context(format!("timed out waiting for {locator}")));
                    }
                }
            }
            if Instant::now() >= deadline {
                bail!("timed out waiting for {locator}");
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PageDriver for WebDriverClient {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.command("/url", json!({ "url": url })).await?;
        Ok(())
    }

    async fn wait_until_clickable(&self, locator: &Locator, timeout: Duration)
        -> Result<ElementHandle> {
        self.poll_element(locator, timeout, true).await
    }

    async fn wait_until_present(&self, locator: &Locator, timeout: Duration)
        -> Result<ElementHandle> {
        self.poll_element(locator, timeout, false).await
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        self.command(&format!("/element/{}/click", element.0), json!({}))
            .await?;
        Ok(())
    }

    async fn drag_by(&self, element: &ElementHandle, dx: i32, dy: i32) -> Result<()> {
        let actions = json!({
            "actions": [{
                "type": "pointer",
                "id": "mouse",
                "parameters": { "pointerType": "mouse" },
                "actions": [
                    { "type": "pointerMove", "duration": 100,
                      "origin": { (ELEMENT_KEY): element.0.as_str() }, "x": 0, "y": 0 },
                    { "type": "pointerDown", "button": 0 },
                    { "type": "pointerMove", "duration": 250,
                      "origin": "pointer", "x": dx, "y": dy },
                    { "type": "pointerUp", "button": 0 }
                ]
            }]
        });
        self.command("/actions", actions).await?;
        Ok(())
    }

    async fn run_script(&self, js: &str, element: &ElementHandle) -> Result<()> {
        self.command(
            "/execute/sync",
            json!({ "script": js, "args": [{ (ELEMENT_KEY): element.0.as_str() }] }),
        )
        .await?;
        Ok(())
    }

    async fn send_key(&self, key: Key) -> Result<()> {
        let code = match key {
            Key::Escape => "\u{e00c}",
        };
        let actions = json!({
            "actions": [{
                "type": "key",
                "id": "keyboard",
                "actions": [
                    { "type": "keyDown", "value": code },
                    { "type": "keyUp", "value": code }
                ]
            }]
        });
        self.command("/actions", actions).await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let value = self.get("/screenshot").await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| anyhow!("screenshot response was not a string"))?;
        BASE64
            .decode(encoded)
            .context("screenshot payload was not valid base64")
    }
}

async fn check(response: reqwest::Response) -> Result<WireResponse> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<WireResponse>(&body)
            .ok()
            .and_then(|wire| wire.value["message"].as_str().map(str::to_string))
            .unwrap_or(body);
        if status.is_server_error() {
            warn!("WebDriver server error {status}: {message}");
        }
        bail!("WebDriver request failed with {status}: {message}");
    }
    response
        .json::<WireResponse>()
        .await
        .context("WebDriver response was not valid JSON")
}
