use anyhow::{Context, Error, Result};
use async_trait::async_trait;
use chromiumoxide::{
    Browser, BrowserConfig, Page, cdp::js_protocol::runtime::EvaluateParams,
    page::ScreenshotParams,
};
use futures::StreamExt;
use std::{fmt::Display, fs, future::Future, path::Path, path::PathBuf, time::Duration};
use tokio::{task::JoinHandle, time};
use tracing::{info, warn};

use crate::{
    constants::{MAX_WAIT_TIME, NAVIGATION_ATTEMPTS},
    error::AutomationError,
    login::{LoginPage, PageSnapshot, watched_selectors},
};

/// How Chrome is started
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub user_data_dir: PathBuf,
    pub executable: Option<PathBuf>,
    pub headed: bool,
}

/// A running Chrome instance and its CDP event loop
pub struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromeSession {
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        fs::create_dir_all(&options.user_data_dir).with_context(|| {
            format!(
                "Failed to create Chrome profile directory {}",
                options.user_data_dir.display()
            )
        })?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&options.user_data_dir)
            .no_sandbox()
            .window_size(1280, 900)
            .args(vec![
                "--no-first-run",
                "--no-default-browser-check",
                "--disable-dev-shm-usage",
                "--disable-blink-features=AutomationControlled", // Prevent detection of automation
            ]);
        if options.headed {
            builder = builder.with_head();
        }
        if let Some(executable) = &options.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(Error::msg)?;

        info!(
            "Launching Chrome ({}) with profile {}",
            if options.headed { "headed" } else { "headless" },
            options.user_data_dir.display()
        );

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch Chrome")?;

        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        info!("Browser session created successfully");
        Ok(Self { browser, handler })
    }

    /// Open a tab on `url`, retrying slow or failed loads
    pub async fn open(&self, url: &str) -> Result<ChromePage> {
        let page = self.browser.new_page("about:blank").await?;

        with_retries(NAVIGATION_ATTEMPTS, MAX_WAIT_TIME, || page.goto(url)).await?;
        info!("Navigated to URL: {}", url);

        Ok(ChromePage { page })
    }

    pub async fn close(mut self) {
        info!("Closing browser session...");
        self.browser.close().await.ok();
        self.browser.wait().await.ok();
        self.handler.abort();
        info!("Browser session closed.");
    }
}

/// Run `op` up to `attempts` times, bounding each try by `timeout`
pub async fn with_retries<F, Fut, T, E>(
    attempts: u32,
    timeout: Duration,
    mut op: F,
) -> Result<T, AutomationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut reason = String::from("no attempt made");

    for attempt in 1..=attempts {
        match time::timeout(timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => reason = e.to_string(),
            Err(_) => reason = format!("page load timed out after {}s", timeout.as_secs()),
        }
        warn!("Navigation attempt {}/{} failed: {}", attempt, attempts, reason);
    }

    Err(AutomationError::Navigation { attempts, reason })
}

pub struct ChromePage {
    page: Page,
}

impl ChromePage {
    pub async fn screenshot(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .context("Failed to capture screenshot")?;
        Ok(())
    }

    async fn run_script(&self, script: String) -> Result<serde_json::Value> {
        let mut params = EvaluateParams::new(script);
        params.return_by_value = Some(true);
        params.await_promise = Some(true);

        let result = self.page.evaluate_expression(params).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl LoginPage for ChromePage {
    async fn snapshot(&self) -> Result<PageSnapshot> {
        let value = self.run_script(snapshot_script(&watched_selectors())).await?;
        serde_json::from_value(value).context("Unexpected page snapshot")
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.page
            .find_element(selector)
            .await
            .with_context(|| format!("Element {selector} not found"))?
            .click()
            .await
            .with_context(|| format!("Failed to click {selector}"))?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        self.run_script(clear_script(selector)).await?;
        self.page
            .find_element(selector)
            .await
            .with_context(|| format!("Input {selector} not found"))?
            .click()
            .await?
            .type_str(text)
            .await
            .with_context(|| format!("Failed to type into {selector}"))?;
        Ok(())
    }

    async fn text(&self, selector: &str) -> Result<Option<String>> {
        match self.page.find_element(selector).await {
            Ok(element) => Ok(element.inner_text().await?),
            Err(_) => Ok(None),
        }
    }
}

/// Expression reporting title, URL, body text and each selector's state
fn snapshot_script(selectors: &[String]) -> String {
    let selectors = serde_json::to_string(selectors).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
  const elements = {{}};
  for (const selector of {selectors}) {{
    const el = document.querySelector(selector);
    elements[selector] = el ? {{
      visible: !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length),
      enabled: !el.disabled
    }} : null;
  }}
  return {{
    title: document.title || "",
    url: location.href,
    text: document.body ? document.body.innerText.slice(0, 4000) : "",
    elements
  }};
}})()"#
    )
}

fn clear_script(selector: &str) -> String {
    let selector = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(() => {{
  const el = document.querySelector({selector});
  if (el) {{ el.focus(); el.value = ""; }}
  return null;
}})()"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_snapshot_script_embeds_selectors_as_json() {
        let script = snapshot_script(&[
            "#i0116".to_string(),
            "button[data-id='awsccc-cb-btn-continue']".to_string(),
        ]);

        assert!(script.contains(r##"["#i0116","button[data-id='awsccc-cb-btn-continue']"]"##));
        assert!(script.starts_with("(() => {"));
        assert!(script.trim_end().ends_with("})()"));
    }

    #[test]
    fn test_clear_script_escapes_selector() {
        let script = clear_script(r#"[data-testid="x"]"#);
        assert!(script.contains(r#"document.querySelector("[data-testid=\"x\"]")"#));
    }

    #[tokio::test]
    async fn test_with_retries_succeeds_after_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let value = with_retries(3, Duration::from_secs(1), || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 { Err("connection reset") } else { Ok(n) }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retries_gives_up() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let err = with_retries(2, Duration::from_secs(1), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("net::ERR_NAME_NOT_RESOLVED")
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match err {
            AutomationError::Navigation { attempts, reason } => {
                assert_eq!(attempts, 2);
                assert!(reason.contains("ERR_NAME_NOT_RESOLVED"));
            }
            other => panic!("Expected Navigation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_with_retries_times_out_slow_attempts() {
        let err = with_retries(2, Duration::from_millis(10), || async {
            time::sleep(Duration::from_secs(60)).await;
            Ok::<(), &str>(())
        })
        .await
        .unwrap_err();

        assert!(err.to_string().contains("timed out"));
    }
}
