pub mod gaia;
pub mod marionette;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_MARIONETTE_PORT: u16 = 2828;

/// WebDriver element reference key.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unable to connect to {address}: {message}")]
    Connect { address: String, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer closed the stream before a complete packet arrived.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// Something accepted the connection but did not greet like a
    /// remote automation server.
    #[error("bad handshake: {0}")]
    Handshake(String),

    #[error("script error ({status}): {message}")]
    Script { status: String, message: String },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Timeout(_))
    }

    /// Errors seen while the remote end is still coming up.
    pub fn is_reconnectable(&self) -> bool {
        matches!(
            self,
            SessionError::Connect { .. }
                | SessionError::Io(_)
                | SessionError::Disconnected(_)
                | SessionError::Handshake(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Context {
    Chrome,
    Content,
}

impl Context {
    pub fn as_str(&self) -> &'static str {
        match self {
            Context::Chrome => "chrome",
            Context::Content => "content",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn to_json(&self) -> Value {
        serde_json::json!({ ELEMENT_KEY: self.0 })
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        value
            .get(ELEMENT_KEY)
            .or_else(|| value.get("ELEMENT"))
            .and_then(Value::as_str)
            .map(|id| ElementRef(id.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator<'a> {
    Css(&'a str),
    Id(&'a str),
}

impl<'a> Locator<'a> {
    pub fn strategy(&self) -> &'static str {
        "css selector"
    }

    /// Ids are resolved as `#id` selectors.
    pub fn selector(&self) -> String {
        match self {
            Locator::Css(value) => value.to_string(),
            Locator::Id(value) => format!("#{value}"),
        }
    }
}

/// One step of a touch pointer action sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerStep {
    MoveToElement(ElementRef),
    MoveBy { x: i64, y: i64 },
    Down,
    Pause(Duration),
    Up,
}

impl PointerStep {
    pub fn to_json(&self) -> Value {
        match self {
            PointerStep::MoveToElement(element) => serde_json::json!({
                "type": "pointerMove",
                "origin": element.to_json(),
                "x": 0,
                "y": 0,
                "duration": 0,
            }),
            PointerStep::MoveBy { x, y } => serde_json::json!({
                "type": "pointerMove",
                "origin": "pointer",
                "x": x,
                "y": y,
                "duration": 0,
            }),
            PointerStep::Down => serde_json::json!({ "type": "pointerDown", "button": 0 }),
            PointerStep::Pause(duration) => {
                serde_json::json!({ "type": "pause", "duration": duration.as_millis() as u64 })
            }
            PointerStep::Up => serde_json::json!({ "type": "pointerUp", "button": 0 }),
        }
    }
}

/// A connected remote automation session. Exclusively owned by whoever is
/// driving the device; no two callers use it at once.
pub trait RemoteSession {
    fn execute(&mut self, script: &str, args: Vec<Value>) -> Result<Value, SessionError>;

    /// Runs a script that completes by calling its last argument. Fails with
    /// [`SessionError::Timeout`] once the script timeout elapses.
    fn execute_async(&mut self, script: &str, args: Vec<Value>) -> Result<Value, SessionError>;

    fn set_context(&mut self, context: Context) -> Result<(), SessionError>;

    /// `None` switches back to the top-level browsing context.
    fn switch_to_frame(&mut self, frame: Option<&ElementRef>) -> Result<(), SessionError>;

    fn set_script_timeout(&mut self, timeout: Duration) -> Result<(), SessionError>;

    fn set_search_timeout(&mut self, timeout: Duration) -> Result<(), SessionError>;

    fn find_element(&mut self, locator: Locator<'_>) -> Result<ElementRef, SessionError>;

    fn perform_touch_actions(&mut self, steps: &[PointerStep]) -> Result<(), SessionError>;

    /// Drops the current connection and opens a fresh session, retrying until
    /// `timeout` while the remote end is coming back up.
    fn restart(&mut self, timeout: Duration) -> Result<(), SessionError>;
}

/// Splits a `host:port` string. A bare host gets the default port.
pub fn parse_address(address: &str) -> Option<(String, u16)> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rsplit_once(':') {
        Some((host, port)) => {
            let host = host.trim();
            if host.is_empty() || host.contains(':') {
                return None;
            }
            let port = port.trim().parse::<u16>().ok().filter(|p| *p != 0)?;
            Some((host.to_string(), port))
        }
        None => Some((trimmed.to_string(), DEFAULT_MARIONETTE_PORT)),
    }
}
