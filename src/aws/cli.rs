use anyhow::{Context, Result, anyhow, bail, ensure};
use regex::Regex;
use std::{
    process::{ExitStatus, Stdio},
    sync::{Arc, LazyLock, Mutex},
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    task::JoinHandle,
    time,
};
use tracing::{debug, info};
use url::Url;

/// How long the CLI gets to print its verification URL
const URL_TIMEOUT: Duration = Duration::from_secs(30);

/// How long stderr gets to flush after the CLI is killed
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

static PKCE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://oidc\.[a-z0-9-]+\.amazonaws\.com/authorize\?\S+")
        .expect("valid PKCE URL pattern")
});

static DEVICE_URL_WITH_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"https://(?:device\.sso\.[a-z0-9-]+\.amazonaws\.com/\?user_code=|[A-Za-z0-9-]+\.awsapps\.com/start/#/device\?user_code=)\w+-\w+",
    )
    .expect("valid device URL pattern")
});

static BARE_DEVICE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"https://(?:device\.sso\.[a-z0-9-]+\.amazonaws\.com/?|[A-Za-z0-9-]+\.awsapps\.com/start/#/device)",
    )
    .expect("valid bare device URL pattern")
});

static USER_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{4}-[A-Z0-9]{4}$").expect("valid user code pattern"));

/// Recognizes the verification URL in `aws sso login --no-browser` output
#[derive(Debug, Default)]
pub struct UrlScanner {
    bare_url: Option<String>,
}

impl UrlScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one output line; returns the URL once it is complete
    pub fn feed(&mut self, line: &str) -> Option<String> {
        let line = line.trim();

        if let Some(m) = PKCE_URL.find(line) {
            return Some(m.as_str().to_string());
        }

        if let Some(m) = DEVICE_URL_WITH_CODE.find(line) {
            return Some(m.as_str().to_string());
        }

        if let Some(m) = BARE_DEVICE_URL.find(line) {
            self.bare_url.get_or_insert_with(|| m.as_str().to_string());
            return None;
        }

        if USER_CODE.is_match(line) {
            if let Some(bare) = &self.bare_url {
                return Some(with_user_code(bare, line));
            }
        }

        None
    }

    /// URL to fall back on when the output ends before a code shows up
    pub fn finish(self) -> Option<String> {
        self.bare_url
    }
}

/// The browser only ever gets an https URL on an AWS sign-in host
fn check_login_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw).with_context(|| format!("AWS CLI printed an invalid URL: {raw}"))?;
    let host = url.host_str().unwrap_or_default();
    ensure!(
        url.scheme() == "https"
            && (host.ends_with(".amazonaws.com") || host.ends_with(".awsapps.com")),
        "Refusing to open unexpected login URL {raw}"
    );
    Ok(())
}

fn with_user_code(bare: &str, code: &str) -> String {
    if bare.contains("awsapps.com") {
        format!("{bare}?user_code={code}")
    } else {
        format!("{}/?user_code={code}", bare.trim_end_matches('/'))
    }
}

/// A running `aws sso login` process waiting for the browser side to finish
pub struct SsoLogin {
    pub url: String,
    child: Child,
    stderr: Arc<Mutex<Vec<String>>>,
    drains: Vec<JoinHandle<()>>,
}

impl SsoLogin {
    /// Spawn the AWS CLI and wait for its verification URL
    pub async fn start(profile: &str, use_device_code: bool) -> Result<Self> {
        info!(
            "Executing 'aws sso login --no-browser' with profile '{}'",
            profile
        );

        let mut command = Command::new("aws");
        command.args(["sso", "login", "--profile", profile, "--no-browser"]);
        if use_device_code {
            command.arg("--use-device-code");
        }

        Self::spawn(command, URL_TIMEOUT).await
    }

    async fn spawn(mut command: Command, url_timeout: Duration) -> Result<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .context("Failed to run the AWS CLI. Is `aws` (v2) installed and on PATH?")?;

        let stdout = child.stdout.take().context("AWS CLI stdout not captured")?;
        let stderr = child.stderr.take().context("AWS CLI stderr not captured")?;

        let stderr_lines = Arc::new(Mutex::new(Vec::new()));
        let stderr_drain = tokio::spawn(collect_lines(stderr, Arc::clone(&stderr_lines)));

        let mut lines = BufReader::new(stdout).lines();
        let mut scanner = UrlScanner::new();
        let scan = async {
            while let Some(line) = lines.next_line().await? {
                debug!("aws: {}", line.trim_end());
                if let Some(url) = scanner.feed(&line) {
                    return Ok::<_, std::io::Error>(Some(url));
                }
            }
            Ok(None)
        };

        let found = match time::timeout(url_timeout, scan).await {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                child.kill().await.ok();
                return Err(e).context("Failed to read AWS CLI output");
            }
            Err(_) => {
                debug!("No complete SSO URL after {}s", url_timeout.as_secs());
                None
            }
        };

        // A bare device URL is still usable when no code line follows it.
        let Some(url) = found.or_else(|| scanner.finish()) else {
            child.kill().await.ok();
            time::timeout(DRAIN_TIMEOUT, stderr_drain).await.ok();
            bail!(
                "SSO URL not found in AWS CLI output{}",
                format_stderr(&stderr_lines)
            );
        };

        if let Err(e) = check_login_url(&url) {
            child.kill().await.ok();
            return Err(e);
        }
        info!("Found SSO URL: {}", url);

        let stdout_drain = tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("aws: {}", line.trim_end());
            }
        });

        Ok(Self {
            url,
            child,
            stderr: stderr_lines,
            drains: vec![stdout_drain, stderr_drain],
        })
    }

    /// Wait for the CLI to exit after approval
    pub async fn wait(mut self, timeout: Duration) -> Result<()> {
        info!("Waiting for 'aws sso login' process to complete...");

        let status = match time::timeout(timeout, self.child.wait()).await {
            Ok(status) => status.context("Failed to wait for the AWS CLI")?,
            Err(_) => {
                self.child.kill().await.ok();
                bail!(
                    "AWS CLI did not finish within {}s{}",
                    timeout.as_secs(),
                    format_stderr(&self.stderr)
                );
            }
        };

        for drain in self.drains.drain(..) {
            time::timeout(DRAIN_TIMEOUT, drain).await.ok();
        }

        check_status(status, &self.stderr)
    }
}

fn check_status(status: ExitStatus, stderr: &Mutex<Vec<String>>) -> Result<()> {
    if status.success() {
        info!("AWS SSO login process completed successfully.");
        return Ok(());
    }

    Err(anyhow!(
        "aws sso login exited with {}{}",
        status,
        format_stderr(stderr)
    ))
}

async fn collect_lines<R>(reader: R, sink: Arc<Mutex<Vec<String>>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("aws stderr: {}", line.trim_end());
        if let Ok(mut sink) = sink.lock() {
            sink.push(line);
        }
    }
}

fn format_stderr(stderr: &Mutex<Vec<String>>) -> String {
    let lines = stderr.lock().map(|l| l.join("\n")).unwrap_or_default();
    let trimmed = lines.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// Installed AWS CLI version, e.g. `2.15.0`
pub async fn aws_cli_version() -> Result<String> {
    let output = Command::new("aws")
        .arg("--version")
        .output()
        .await
        .context("Failed to run `aws --version`")?;

    // AWS CLI v1 prints its version on stderr.
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    parse_aws_cli_version(&text).context("Unrecognized `aws --version` output")
}

pub fn parse_aws_cli_version(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .find_map(|word| word.strip_prefix("aws-cli/"))
        .map(str::to_string)
}
