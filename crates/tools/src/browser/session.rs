//! Browser session management.
//!
//! One lazily-started Chrome session per process. Every operation is
//! submitted as a message to a single actor task that owns the driver; the
//! actor handles one command at a time, which serializes all access to the
//! shared session and keeps the async driver behind one dedicated execution
//! context for the lifetime of the process. `status()` reads a shared
//! snapshot and never touches the driver.

use base64::Engine;
use clawbot_core::config::BrowserConfig;
use clawbot_core::{Error, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::process::{Child, Command as ProcessCommand};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::cdp::{self, CdpClient};
use crate::safe_truncate;

/// Visible-text cap for `extract_text`.
const TEXT_CAP: usize = 5000;
/// Link list cap for `links`.
const LINKS_CAP: usize = 20;
/// Result cap for `search_google`.
const SEARCH_RESULTS_CAP: usize = 5;
/// Quiescence bound for a submitted search.
const SEARCH_SETTLE_SECS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Down,
    Up,
    Top,
    Bottom,
}

impl ScrollDirection {
    /// Unknown directions are rejected rather than silently accepted.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "down" => Some(Self::Down),
            "up" => Some(Self::Up),
            "top" => Some(Self::Top),
            "bottom" => Some(Self::Bottom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Down => "down",
            Self::Up => "up",
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }
}

/// Non-blocking view of the session, readable at any time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStatus {
    pub running: bool,
    pub current_url: Option<String>,
    pub history_count: usize,
}

#[derive(Debug, Clone, Serialize)]
struct HistoryEntry {
    url: String,
    title: String,
    time: String,
}

type Reply = oneshot::Sender<Result<Value>>;

enum Command {
    Open { url: String, reply: Reply },
    Screenshot { full_page: bool, reply: Reply },
    ExtractText { reply: Reply },
    Click { selector: String, reply: Reply },
    TypeText { selector: String, text: String, reply: Reply },
    Scroll { direction: ScrollDirection, amount: i64, reply: Reply },
    Links { reply: Reply },
    SearchGoogle { query: String, reply: Reply },
    Close { reply: Reply },
}

/// Cloneable handle to the process-wide browser session.
///
/// Constructing a handle spawns the session's dedicated thread and runtime;
/// the browser itself is not launched until the first operation needs it.
#[derive(Clone)]
pub struct BrowserHandle {
    tx: mpsc::Sender<Command>,
    status: Arc<RwLock<SessionStatus>>,
}

impl BrowserHandle {
    pub fn new(config: BrowserConfig, screenshots_dir: PathBuf, user_data_dir: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel(32);
        let status = Arc::new(RwLock::new(SessionStatus::default()));

        let actor = SessionActor {
            driver: None,
            current_url: None,
            history: Vec::new(),
            status: status.clone(),
            config,
            screenshots_dir,
            user_data_dir,
        };

        // One dedicated execution context per process: the actor lives on its
        // own thread with a single-threaded runtime, and every operation is
        // routed to it through the command channel.
        let spawned = std::thread::Builder::new()
            .name("browser-session".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!(error = %e, "Failed to build browser session runtime");
                        return;
                    }
                };
                rt.block_on(actor.run(rx));
            });
        if let Err(e) = spawned {
            error!(error = %e, "Failed to spawn browser session thread");
        }

        Self { tx, status }
    }

    async fn call<F>(&self, make: F) -> Result<Value>
    where
        F: FnOnce(Reply) -> Command,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| Error::Browser("browser session is unavailable".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::Browser("browser session dropped the request".to_string()))?
    }

    /// Navigate to a URL, lazily starting the browser. Bare domains get an
    /// https scheme prefixed.
    pub async fn open(&self, url: &str) -> Result<Value> {
        let url = url.to_string();
        self.call(|reply| Command::Open { url, reply }).await
    }

    /// Capture the current page to a timestamped PNG. Fails when the session
    /// is not running.
    pub async fn screenshot(&self, full_page: bool) -> Result<Value> {
        self.call(|reply| Command::Screenshot { full_page, reply })
            .await
    }

    /// Visible text of the current page, capped.
    pub async fn extract_text(&self) -> Result<Value> {
        self.call(|reply| Command::ExtractText { reply }).await
    }

    /// Click the first element matching a CSS selector and wait for the page
    /// to settle.
    pub async fn click(&self, selector: &str) -> Result<Value> {
        let selector = selector.to_string();
        self.call(|reply| Command::Click { selector, reply }).await
    }

    /// Fill a form field.
    pub async fn type_text(&self, selector: &str, text: &str) -> Result<Value> {
        let selector = selector.to_string();
        let text = text.to_string();
        self.call(|reply| Command::TypeText {
            selector,
            text,
            reply,
        })
        .await
    }

    pub async fn scroll(&self, direction: ScrollDirection, amount: i64) -> Result<Value> {
        self.call(|reply| Command::Scroll {
            direction,
            amount,
            reply,
        })
        .await
    }

    /// Anchor elements with visible text, capped to the first 20.
    pub async fn links(&self) -> Result<Value> {
        self.call(|reply| Command::Links { reply }).await
    }

    /// Google search: navigate, submit the query, scrape structured results.
    /// Selector misses degrade to an empty result list, not a failure.
    pub async fn search_google(&self, query: &str) -> Result<Value> {
        let query = query.to_string();
        self.call(|reply| Command::SearchGoogle { query, reply })
            .await
    }

    /// Tear down the driver and clear session state. Idempotent.
    pub async fn close(&self) -> Result<Value> {
        self.call(|reply| Command::Close { reply }).await
    }

    /// Pure read of the session snapshot; never blocks on the driver.
    pub fn status(&self) -> SessionStatus {
        self.status
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

struct Driver {
    process: Child,
    cdp: CdpClient,
}

struct SessionActor {
    driver: Option<Driver>,
    current_url: Option<String>,
    history: Vec<HistoryEntry>,
    status: Arc<RwLock<SessionStatus>>,
    config: BrowserConfig,
    screenshots_dir: PathBuf,
    user_data_dir: PathBuf,
}

/// Embed a Rust string as a JavaScript string literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Prefix a scheme onto bare domains.
pub fn normalize_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        debug!("Browser session task started");
        self.publish_status();

        while let Some(command) = rx.recv().await {
            match command {
                Command::Open { url, reply } => {
                    let result = self.open(&url).await;
                    self.finish(reply, result).await;
                }
                Command::Screenshot { full_page, reply } => {
                    let result = self.screenshot(full_page).await;
                    self.finish(reply, result).await;
                }
                Command::ExtractText { reply } => {
                    let result = self.extract_text().await;
                    self.finish(reply, result).await;
                }
                Command::Click { selector, reply } => {
                    let result = self.click(&selector).await;
                    self.finish(reply, result).await;
                }
                Command::TypeText {
                    selector,
                    text,
                    reply,
                } => {
                    let result = self.type_text(&selector, &text).await;
                    self.finish(reply, result).await;
                }
                Command::Scroll {
                    direction,
                    amount,
                    reply,
                } => {
                    let result = self.scroll(direction, amount).await;
                    self.finish(reply, result).await;
                }
                Command::Links { reply } => {
                    let result = self.links().await;
                    self.finish(reply, result).await;
                }
                Command::SearchGoogle { query, reply } => {
                    let result = self.search_google(&query).await;
                    self.finish(reply, result).await;
                }
                Command::Close { reply } => {
                    let result = self.close().await;
                    self.finish(reply, result).await;
                }
            }
        }

        // All handles dropped; take the browser down with us.
        self.teardown().await;
        debug!("Browser session task stopped");
    }

    /// Post-command bookkeeping: detect a dead driver so the next call
    /// relaunches instead of failing forever, refresh the snapshot, reply.
    async fn finish(&mut self, reply: Reply, result: Result<Value>) {
        let dead = match &mut self.driver {
            Some(driver) => {
                driver.cdp.is_closed() || matches!(driver.process.try_wait(), Ok(Some(_)))
            }
            None => false,
        };
        if dead {
            warn!("Browser driver died; session will restart on next use");
            self.teardown().await;
        }
        self.publish_status();
        let _ = reply.send(result);
    }

    fn publish_status(&self) {
        if let Ok(mut status) = self.status.write() {
            status.running = self.driver.is_some();
            status.current_url = self.current_url.clone();
            status.history_count = self.history.len();
        }
    }

    /// Launch Chrome and connect CDP if not already running. A driver that
    /// died since the last command is torn down and relaunched here.
    async fn ensure_driver(&mut self) -> Result<()> {
        if let Some(driver) = &mut self.driver {
            let dead =
                driver.cdp.is_closed() || matches!(driver.process.try_wait(), Ok(Some(_)));
            if !dead {
                return Ok(());
            }
            warn!("Browser driver is gone, relaunching");
            self.teardown().await;
        }

        let binary = cdp::find_chrome_binary().ok_or_else(|| {
            Error::Browser("Chrome not found. Install google-chrome or chromium.".to_string())
        })?;
        std::fs::create_dir_all(&self.user_data_dir)?;

        let port = cdp::find_free_port().await.map_err(Error::Browser)?;
        let args = cdp::build_chrome_args(port, &self.user_data_dir, self.config.headless);

        info!(port, headless = self.config.headless, "Launching browser");
        let process = ProcessCommand::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Browser(format!("Failed to launch {}: {}", binary, e)))?;

        cdp::wait_for_cdp_ready(port, 15).await.map_err(Error::Browser)?;
        let ws_url = cdp::get_page_ws_url(port).await.map_err(Error::Browser)?;
        let client = CdpClient::connect(&ws_url).await.map_err(Error::Browser)?;
        for domain in ["Page", "Runtime", "DOM"] {
            client.enable_domain(domain).await.map_err(Error::Browser)?;
        }

        self.driver = Some(Driver {
            process,
            cdp: client,
        });
        Ok(())
    }

    fn cdp(&self) -> Result<&CdpClient> {
        self.driver
            .as_ref()
            .map(|d| &d.cdp)
            .ok_or_else(|| Error::Browser("browser is not running".to_string()))
    }

    /// Evaluate JavaScript and return its value.
    async fn eval(&self, expression: &str) -> Result<Value> {
        let result = self
            .cdp()?
            .evaluate_js(expression)
            .await
            .map_err(Error::Browser)?;
        if let Some(exc) = result.get("exceptionDetails") {
            let text = exc
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|v| v.as_str())
                .or_else(|| exc.get("text").and_then(|v| v.as_str()))
                .unwrap_or("JavaScript exception");
            return Err(Error::Browser(format!("Script failed: {}", text)));
        }
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn eval_string(&self, expression: &str) -> Result<String> {
        Ok(self
            .eval(expression)
            .await?
            .as_str()
            .unwrap_or("")
            .to_string())
    }

    /// Network-idle approximation: give the action a moment to kick off, then
    /// poll readyState until the document settles or the bound expires.
    async fn wait_for_quiescence(&self, timeout: Duration) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(state) = self.eval_string("document.readyState").await {
                if state == "complete" {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "Page did not settle within {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn open(&mut self, raw_url: &str) -> Result<Value> {
        let url = normalize_url(raw_url);
        self.ensure_driver().await?;
        let nav_timeout = Duration::from_secs(self.config.nav_timeout_secs);

        let cdp = self.cdp()?;
        let mut load_events = cdp.subscribe_event("Page.loadEventFired").await;
        let nav = cdp.navigate(&url).await.map_err(Error::Browser)?;
        if let Some(err_text) = nav.get("errorText").and_then(|v| v.as_str()) {
            if !err_text.is_empty() {
                return Err(Error::Browser(format!("Navigation failed: {}", err_text)));
            }
        }
        if tokio::time::timeout(nav_timeout, load_events.recv())
            .await
            .is_err()
        {
            return Err(Error::Timeout(format!(
                "Navigation to {} timed out after {}s",
                url,
                self.config.nav_timeout_secs
            )));
        }

        let title = self.eval_string("document.title").await.unwrap_or_default();
        let final_url = self
            .eval_string("window.location.href")
            .await
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| url.clone());

        self.current_url = Some(final_url.clone());
        self.history.push(HistoryEntry {
            url: final_url.clone(),
            title: title.clone(),
            time: chrono::Utc::now().to_rfc3339(),
        });
        debug!(url = %final_url, "Navigation complete");

        Ok(json!({"url": final_url, "title": title}))
    }

    async fn screenshot(&mut self, full_page: bool) -> Result<Value> {
        // Unlike the other operations, a screenshot never lazy-starts: there
        // is nothing to capture on a session that was never opened.
        let cdp = self
            .driver
            .as_ref()
            .map(|d| &d.cdp)
            .ok_or_else(|| Error::Browser("browser is not running".to_string()))?;

        let data = cdp.screenshot(full_page).await.map_err(Error::Browser)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data.as_bytes())
            .map_err(|e| Error::Browser(format!("Invalid screenshot data: {}", e)))?;

        std::fs::create_dir_all(&self.screenshots_dir)?;
        let filename = format!(
            "screenshot_{}.png",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = self.screenshots_dir.join(filename);
        std::fs::write(&path, bytes)?;

        Ok(json!({
            "path": path.display().to_string(),
            "url": self.current_url,
        }))
    }

    async fn extract_text(&mut self) -> Result<Value> {
        self.ensure_driver().await?;
        let text = self
            .eval_string("document.body ? document.body.innerText : ''")
            .await?;
        let title = self.eval_string("document.title").await.unwrap_or_default();
        Ok(json!({
            "text": safe_truncate(&text, TEXT_CAP),
            "title": title,
            "url": self.current_url,
        }))
    }

    async fn click(&mut self, selector: &str) -> Result<Value> {
        self.ensure_driver().await?;
        let js = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; el.click(); return true; }})()",
            sel = js_str(selector)
        );
        let found = self.eval(&js).await?.as_bool().unwrap_or(false);
        if !found {
            return Err(Error::NotFound(format!(
                "No element matches selector: {}",
                selector
            )));
        }

        self.wait_for_quiescence(Duration::from_secs(self.config.interact_timeout_secs))
            .await?;

        let title = self.eval_string("document.title").await.unwrap_or_default();
        let url = self
            .eval_string("window.location.href")
            .await
            .unwrap_or_default();
        if !url.is_empty() {
            self.current_url = Some(url.clone());
        }
        Ok(json!({"url": url, "title": title}))
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> Result<Value> {
        self.ensure_driver().await?;
        let js = format!(
            r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return false;
  el.focus();
  const proto = el instanceof HTMLTextAreaElement
    ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
  const desc = Object.getOwnPropertyDescriptor(proto, 'value');
  if (desc && desc.set) {{ desc.set.call(el, {text}); }} else {{ el.value = {text}; }}
  el.dispatchEvent(new Event('input', {{bubbles: true}}));
  el.dispatchEvent(new Event('change', {{bubbles: true}}));
  return true;
}})()"#,
            sel = js_str(selector),
            text = js_str(text)
        );
        let found = self.eval(&js).await?.as_bool().unwrap_or(false);
        if !found {
            return Err(Error::NotFound(format!(
                "No element matches selector: {}",
                selector
            )));
        }
        Ok(json!({"selector": selector}))
    }

    async fn scroll(&mut self, direction: ScrollDirection, amount: i64) -> Result<Value> {
        self.ensure_driver().await?;
        let js = match direction {
            ScrollDirection::Down => format!("window.scrollBy(0, {})", amount),
            ScrollDirection::Up => format!("window.scrollBy(0, -{})", amount),
            ScrollDirection::Top => "window.scrollTo(0, 0)".to_string(),
            ScrollDirection::Bottom => {
                "window.scrollTo(0, document.body.scrollHeight)".to_string()
            }
        };
        self.eval(&js).await?;
        Ok(json!({"direction": direction.as_str()}))
    }

    async fn links(&mut self) -> Result<Value> {
        self.ensure_driver().await?;
        let js = format!(
            r#"(() => {{
  const links = [];
  document.querySelectorAll('a[href]').forEach(a => {{
    if (a.href && a.innerText.trim()) {{
      links.push({{ text: a.innerText.trim().substring(0, 100), href: a.href }});
    }}
  }});
  return links.slice(0, {cap});
}})()"#,
            cap = LINKS_CAP
        );
        let value = self.eval(&js).await?;
        let links = if value.is_array() { value } else { json!([]) };
        Ok(json!({"links": links}))
    }

    async fn search_google(&mut self, query: &str) -> Result<Value> {
        self.open("https://www.google.com").await?;

        let fill_js = format!(
            r#"(() => {{
  const box = document.querySelector('textarea[name="q"], input[name="q"]');
  if (!box) return false;
  box.focus();
  const proto = box instanceof HTMLTextAreaElement
    ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
  const desc = Object.getOwnPropertyDescriptor(proto, 'value');
  if (desc && desc.set) {{ desc.set.call(box, {q}); }} else {{ box.value = {q}; }}
  box.dispatchEvent(new Event('input', {{bubbles: true}}));
  return true;
}})()"#,
            q = js_str(query)
        );
        let filled = self.eval(&fill_js).await?.as_bool().unwrap_or(false);
        if !filled {
            return Err(Error::Browser("Search box not found".to_string()));
        }

        self.cdp()?.press_key("Enter").await.map_err(Error::Browser)?;
        self.wait_for_quiescence(Duration::from_secs(SEARCH_SETTLE_SECS))
            .await?;

        // Result-container markup shifts under us regularly; an empty list is
        // the graceful outcome, not an error.
        let results_js = format!(
            r#"(() => {{
  const results = [];
  document.querySelectorAll('div.g').forEach(div => {{
    const title = div.querySelector('h3');
    const link = div.querySelector('a');
    const snippet = div.querySelector('div[data-sncf], div.VwiC3b');
    if (title && link) {{
      results.push({{
        title: title.innerText,
        url: link.href,
        snippet: snippet ? snippet.innerText.substring(0, 200) : ''
      }});
    }}
  }});
  return results.slice(0, {cap});
}})()"#,
            cap = SEARCH_RESULTS_CAP
        );
        let value = self.eval(&results_js).await.unwrap_or(json!([]));
        let results = if value.is_array() { value } else { json!([]) };

        let url = self
            .eval_string("window.location.href")
            .await
            .unwrap_or_default();
        if !url.is_empty() {
            self.current_url = Some(url.clone());
        }

        Ok(json!({"query": query, "results": results, "url": url}))
    }

    async fn close(&mut self) -> Result<Value> {
        self.teardown().await;
        self.current_url = None;
        self.history.clear();
        Ok(json!({"status": "closed"}))
    }

    async fn teardown(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            let _ = driver.cdp.send_command("Browser.close", json!({})).await;
            let _ = driver.process.kill().await;
        }
    }
}
