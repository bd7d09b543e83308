use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Element lookup strategy on the remote page.
#[derive(Debug, Clone)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(sel) => write!(f, "css `{sel}`"),
            Locator::XPath(expr) => write!(f, "xpath `{expr}`"),
        }
    }
}

/// Opaque reference to an element previously located on the page.
#[derive(Debug, Clone)]
pub struct ElementHandle(pub String);

/// Keyboard keys the capture script needs to send.
#[derive(Debug, Clone, Copy)]
pub enum Key {
    Escape,
}

/// Capability surface of the external browser collaborator.
///
/// The capture script is written purely against this trait; the production
/// implementation speaks the WebDriver wire protocol, and tests substitute
/// an in-memory fake.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Polls for an element that is present and interactable, up to `timeout`.
    async fn wait_until_clickable(&self, locator: &Locator, timeout: Duration)
        -> Result<ElementHandle>;

    /// Polls for an element to exist in the DOM, up to `timeout`.
    async fn wait_until_present(&self, locator: &Locator, timeout: Duration)
        -> Result<ElementHandle>;

    async fn click(&self, element: &ElementHandle) -> Result<()>;

    /// Pointer drag starting on `element`, moving by (dx, dy) pixels.
    async fn drag_by(&self, element: &ElementHandle, dx: i32, dy: i32) -> Result<()>;

    /// Runs a JavaScript snippet with `element` bound as `arguments[0]`.
    async fn run_script(&self, js: &str, element: &ElementHandle) -> Result<()>;

    async fn send_key(&self, key: Key) -> Result<()>;

    /// Full-frame screenshot as PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>>;
}
