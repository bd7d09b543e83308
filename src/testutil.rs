//! Shared test doubles for the capture and monitor tests.

use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use image::{ImageFormat, RgbImage};

use crate::driver::{ElementHandle, Key, Locator, PageDriver};

pub fn encode_png(img: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// In-memory `PageDriver` that serves a fixed screenshot and can be told to
/// fail the drag or to pretend specific locators do not exist.
pub struct FakePageDriver {
    screenshot_png: Vec<u8>,
    fail_drag: bool,
    missing_elements: Vec<String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakePageDriver {
    pub fn new(screenshot_png: Vec<u8>) -> Self {
        Self {
            screenshot_png,
            fail_drag: false,
            missing_elements: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_failing_drag(mut self) -> Self {
        self.fail_drag = true;
        self
    }

    pub fn with_missing_element(mut self, locator: &str) -> Self {
        self.missing_elements.push(locator.to_string());
        self
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn lookup(&self, locator: &Locator) -> Result<ElementHandle> {
        let raw = match locator {
            Locator::Css(sel) => sel,
            Locator::XPath(expr) => expr,
        };
        if self.missing_elements.iter().any(|missing| missing == raw) {
            bail!("no such element: {locator}");
        }
        Ok(ElementHandle(format!("fake-{raw}")))
    }
}

#[async_trait]
impl PageDriver for FakePageDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.record(&format!("navigate {url}"));
        Ok(())
    }

    async fn wait_until_clickable(
        &self,
        locator: &Locator,
        _timeout: Duration,
    ) -> Result<ElementHandle> {
        self.record(&format!("wait_clickable {locator}"));
        self.lookup(locator)
    }

    async fn wait_until_present(
        &self,
        locator: &Locator,
        _timeout: Duration,
    ) -> Result<ElementHandle> {
        self.record(&format!("wait_present {locator}"));
        self.lookup(locator)
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        self.record(&format!("click {}", element.0));
        Ok(())
    }

    async fn drag_by(&self, element: &ElementHandle, dx: i32, dy: i32) -> Result<()> {
        self.record(&format!("drag {} by ({dx}, {dy})", element.0));
        if self.fail_drag {
            bail!("element not interactable");
        }
        Ok(())
    }

    async fn run_script(&self, _js: &str, element: &ElementHandle) -> Result<()> {
        self.record(&format!("script on {}", element.0));
        Ok(())
    }

    async fn send_key(&self, _key: Key) -> Result<()> {
        self.record("send_key");
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.record("screenshot");
        Ok(self.screenshot_png.clone())
    }
}
