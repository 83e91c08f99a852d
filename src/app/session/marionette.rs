use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::app::session::{
    parse_address, Context, ElementRef, Locator, PointerStep, RemoteSession, SessionError,
};
use crate::app::wait::{Wait, WaitError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Slack added on top of the script timeout before a socket read gives up.
const READ_SLACK: Duration = Duration::from_secs(30);
const MAX_PACKET_LEN: usize = 64 * 1024 * 1024;

/// Remote automation client speaking length-prefixed JSON packets
/// (`<len>:<json>`) with `[0, id, command, params]` requests and
/// `[1, id, error, result]` responses.
pub struct MarionetteClient {
    address: String,
    host: String,
    port: u16,
    connection: Option<Connection>,
    next_id: u64,
    script_timeout: Duration,
    search_timeout: Duration,
    context: Context,
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl MarionetteClient {
    pub fn new(address: &str) -> Result<Self, SessionError> {
        let (host, port) = parse_address(address).ok_or_else(|| SessionError::Connect {
            address: address.to_string(),
            message: "expected host:port".to_string(),
        })?;
        Ok(Self {
            address: format!("{host}:{port}"),
            host,
            port,
            connection: None,
            next_id: 0,
            script_timeout: Duration::from_secs(60),
            search_timeout: Duration::ZERO,
            context: Context::Content,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connects and starts a new session.
    pub fn start_session(&mut self) -> Result<(), SessionError> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|err| self.connect_error(err.to_string()))?
            .next()
            .ok_or_else(|| self.connect_error("address did not resolve".to_string()))?;
        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .map_err(|err| self.connect_error(err.to_string()))?;
        stream.set_nodelay(true)?;
        // A forwarded port accepts at once even when nothing is listening
        // behind it, so the greeting gets a short read timeout of its own.
        stream.set_read_timeout(Some(CONNECT_TIMEOUT))?;
        let writer = stream.try_clone()?;
        let mut connection = Connection {
            reader: BufReader::new(stream),
            writer,
        };

        let hello = read_packet(&mut connection.reader).map_err(|err| match err {
            SessionError::Protocol(message) => SessionError::Handshake(message),
            other => other,
        })?;
        debug!(address = %self.address, hello = %hello, "remote handshake");
        if hello.get("marionetteProtocol").is_none() && hello.get("applicationType").is_none() {
            return Err(SessionError::Handshake(format!(
                "unexpected greeting from {}: {hello}",
                self.address
            )));
        }
        connection
            .writer
            .set_read_timeout(Some(self.script_timeout + READ_SLACK))?;
        self.connection = Some(connection);
        self.next_id = 0;

        self.send("WebDriver:NewSession", serde_json::json!({}))?;
        self.set_timeouts()?;
        self.context = Context::Content;
        info!(address = %self.address, "remote session started");
        Ok(())
    }

    pub fn close(&mut self) {
        if self.connection.is_some() {
            let _ = self.send("WebDriver:DeleteSession", serde_json::json!({}));
        }
        self.connection = None;
    }

    fn connect_error(&self, message: String) -> SessionError {
        SessionError::Connect {
            address: self.address.clone(),
            message,
        }
    }

    fn send(&mut self, command: &str, params: Value) -> Result<Value, SessionError> {
        self.next_id += 1;
        let id = self.next_id;
        let request = serde_json::json!([0, id, command, params]);
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| SessionError::Protocol("session is not connected".to_string()))?;
        write_packet(&mut connection.writer, &request)?;

        // Responses to earlier, abandoned requests can still be in flight.
        loop {
            let response = match read_packet(&mut connection.reader) {
                Ok(value) => value,
                Err(SessionError::Io(err))
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    return Err(SessionError::Timeout(format!(
                        "no response to {command} from {}",
                        self.address
                    )));
                }
                Err(err) => return Err(err),
            };
            match parse_response(&response)? {
                (response_id, _) if response_id != id => {
                    debug!(expected = id, received = response_id, "discarding stale response");
                }
                (_, outcome) => return outcome,
            }
        }
    }

    fn set_timeouts(&mut self) -> Result<(), SessionError> {
        let script_ms = self.script_timeout.as_millis() as u64;
        let search_ms = self.search_timeout.as_millis() as u64;
        self.send(
            "WebDriver:SetTimeouts",
            serde_json::json!({ "script": script_ms, "implicit": search_ms }),
        )?;
        if let Some(connection) = self.connection.as_ref() {
            connection
                .writer
                .set_read_timeout(Some(self.script_timeout + READ_SLACK))?;
        }
        Ok(())
    }
}

impl Drop for MarionetteClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl RemoteSession for MarionetteClient {
    fn execute(&mut self, script: &str, args: Vec<Value>) -> Result<Value, SessionError> {
        let result = self.send(
            "WebDriver:ExecuteScript",
            serde_json::json!({ "script": script, "args": args, "newSandbox": true }),
        )?;
        Ok(unwrap_value(result))
    }

    fn execute_async(&mut self, script: &str, args: Vec<Value>) -> Result<Value, SessionError> {
        let result = self.send(
            "WebDriver:ExecuteAsyncScript",
            serde_json::json!({ "script": script, "args": args, "newSandbox": true }),
        )?;
        Ok(unwrap_value(result))
    }

    fn set_context(&mut self, context: Context) -> Result<(), SessionError> {
        self.send(
            "Marionette:SetContext",
            serde_json::json!({ "value": context.as_str() }),
        )?;
        self.context = context;
        Ok(())
    }

    fn switch_to_frame(&mut self, frame: Option<&ElementRef>) -> Result<(), SessionError> {
        let params = match frame {
            Some(element) => serde_json::json!({ "element": element.0, "focus": true }),
            None => serde_json::json!({ "focus": true }),
        };
        self.send("WebDriver:SwitchToFrame", params)?;
        Ok(())
    }

    fn set_script_timeout(&mut self, timeout: Duration) -> Result<(), SessionError> {
        self.script_timeout = timeout;
        self.set_timeouts()
    }

    fn set_search_timeout(&mut self, timeout: Duration) -> Result<(), SessionError> {
        self.search_timeout = timeout;
        self.set_timeouts()
    }

    fn find_element(&mut self, locator: Locator<'_>) -> Result<ElementRef, SessionError> {
        let selector = locator.selector();
        let result = self.send(
            "WebDriver:FindElement",
            serde_json::json!({ "using": locator.strategy(), "value": selector }),
        )?;
        ElementRef::from_json(&unwrap_value(result))
            .ok_or_else(|| SessionError::NoSuchElement(selector))
    }

    fn perform_touch_actions(&mut self, steps: &[PointerStep]) -> Result<(), SessionError> {
        let actions = steps.iter().map(PointerStep::to_json).collect::<Vec<_>>();
        self.send(
            "WebDriver:PerformActions",
            serde_json::json!({
                "actions": [{
                    "type": "pointer",
                    "id": "finger1",
                    "parameters": { "pointerType": "touch" },
                    "actions": actions,
                }]
            }),
        )?;
        self.send("WebDriver:ReleaseActions", serde_json::json!({}))?;
        Ok(())
    }

    fn restart(&mut self, timeout: Duration) -> Result<(), SessionError> {
        self.connection = None;
        let context = self.context;
        let wait = Wait::new(timeout)
            .poll_interval(Duration::from_secs(1))
            .ignoring(SessionError::is_reconnectable);
        let message = format!("remote session at {} did not come back", self.address);
        wait.until(&message, || self.start_session().map(Some))
            .map_err(|err| match err {
                WaitError::Timeout { message, last_error } => SessionError::Timeout(match last_error {
                    Some(last) => format!("{message}: {last}"),
                    None => message,
                }),
                WaitError::Aborted(err) => err,
            })?;
        self.set_timeouts()?;
        if context != Context::Content {
            self.set_context(context)?;
        }
        Ok(())
    }
}

fn write_packet(writer: &mut impl Write, value: &Value) -> Result<(), SessionError> {
    let body = serde_json::to_string(value)
        .map_err(|err| SessionError::Protocol(format!("failed to encode request: {err}")))?;
    writer.write_all(format!("{}:{}", body.len(), body).as_bytes())?;
    writer.flush()?;
    Ok(())
}

fn read_packet(reader: &mut impl BufRead) -> Result<Value, SessionError> {
    let mut prefix = Vec::new();
    let read = reader.read_until(b':', &mut prefix)?;
    if read == 0 {
        return Err(SessionError::Disconnected("connection closed by remote end".to_string()));
    }
    if prefix.last() != Some(&b':') {
        return Err(SessionError::Protocol("truncated packet header".to_string()));
    }
    prefix.pop();
    let len = std::str::from_utf8(&prefix)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .ok_or_else(|| {
            SessionError::Protocol(format!(
                "invalid packet length '{}'",
                String::from_utf8_lossy(&prefix)
            ))
        })?;
    if len > MAX_PACKET_LEN {
        return Err(SessionError::Protocol(format!("packet of {len} bytes exceeds limit")));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    serde_json::from_slice(&body)
        .map_err(|err| SessionError::Protocol(format!("invalid packet body: {err}")))
}

/// Splits a response into its message id and either the result or the
/// remote error.
fn parse_response(response: &Value) -> Result<(u64, Result<Value, SessionError>), SessionError> {
    let items = response
        .as_array()
        .filter(|items| items.len() == 4)
        .ok_or_else(|| SessionError::Protocol(format!("malformed response: {response}")))?;
    if items[0].as_u64() != Some(1) {
        return Err(SessionError::Protocol(format!("expected a response, got {response}")));
    }
    let id = items[1]
        .as_u64()
        .ok_or_else(|| SessionError::Protocol(format!("response without id: {response}")))?;
    if items[2].is_null() {
        return Ok((id, Ok(items[3].clone())));
    }
    Ok((id, Err(map_remote_error(&items[2]))))
}

fn map_remote_error(error: &Value) -> SessionError {
    let status = error
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match status.as_str() {
        "timeout" | "script timeout" => SessionError::Timeout(message),
        "no such element" => SessionError::NoSuchElement(message),
        _ => SessionError::Script { status, message },
    }
}

fn unwrap_value(result: Value) -> Value {
    match result {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("value") => {
            map.remove("value").unwrap_or(Value::Null)
        }
        other => other,
    }
}
