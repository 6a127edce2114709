use anyhow::{Result, bail};
use clap::Args;
use std::{
    env,
    path::{Path, PathBuf},
};
use tokio::process::Command;
use tracing::debug;

use crate::{aws::cli, config, constants, secrets::SecretStore};

/// Chrome binaries probed when no executable is configured
const CHROME_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
];

#[derive(Debug, Clone, Args)]
pub struct DoctorCommand {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
}

#[derive(Debug)]
struct Check {
    name: &'static str,
    status: Status,
    detail: String,
}

impl DoctorCommand {
    pub async fn execute(self, profile: &str) -> Result<()> {
        let settings = match constants::get_aws_config_path() {
            Some(path) => config::load_settings_from(&path, profile)?,
            None => config::Settings::defaults()?,
        };

        let checks = vec![
            check_aws_cli().await,
            check_chrome(settings.chrome_executable.as_deref()).await,
            check_keyring(),
        ];

        for check in &checks {
            let tag = match check.status {
                Status::Ok => "ok",
                Status::Warn => "warn",
                Status::Fail => "FAIL",
            };
            println!("[{tag:>4}] {:<8} {}", check.name, check.detail);
        }

        let failed = checks.iter().filter(|c| c.status == Status::Fail).count();
        if failed > 0 {
            bail!("{failed} check(s) failed");
        }
        Ok(())
    }
}

async fn check_aws_cli() -> Check {
    let (status, detail) = match cli::aws_cli_version().await {
        Ok(version) => assess_aws_cli_version(&version),
        Err(e) => (Status::Fail, format!("{e:#}")),
    };
    Check {
        name: "aws",
        status,
        detail,
    }
}

fn assess_aws_cli_version(version: &str) -> (Status, String) {
    if version.starts_with("1.") {
        (
            Status::Warn,
            format!("AWS CLI {version} has no `sso login --no-browser`; install AWS CLI v2"),
        )
    } else {
        (Status::Ok, format!("AWS CLI {version}"))
    }
}

async fn check_chrome(configured: Option<&Path>) -> Check {
    for candidate in chrome_candidates(configured) {
        debug!("Probing Chrome at {}", candidate.display());
        let Ok(output) = Command::new(&candidate).arg("--version").output().await else {
            continue;
        };
        let text = String::from_utf8_lossy(&output.stdout);
        if let Some(version) = parse_chrome_version(&text) {
            return Check {
                name: "chrome",
                status: Status::Ok,
                detail: format!("{version} ({})", candidate.display()),
            };
        }
    }

    Check {
        name: "chrome",
        status: Status::Fail,
        detail: "Chrome or Chromium not found. Set CHROME or configure an executable.".to_string(),
    }
}

fn chrome_candidates(configured: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = configured.map(Path::to_path_buf).into_iter().collect();
    if let Ok(path) = env::var("CHROME") {
        candidates.push(PathBuf::from(path));
    }
    candidates.extend(CHROME_CANDIDATES.iter().map(PathBuf::from));
    candidates
}

/// `Google Chrome 120.0.6099.109` -> `120.0.6099.109`
fn parse_chrome_version(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .find(|word| {
            word.contains('.') && word.split('.').all(|part| part.parse::<u32>().is_ok())
        })
        .map(str::to_string)
}

fn check_keyring() -> Check {
    let (status, detail) = if SecretStore::keyring().is_available() {
        (Status::Ok, "OS keyring is reachable".to_string())
    } else {
        (
            Status::Fail,
            "OS keyring is not available; secrets cannot be stored".to_string(),
        )
    };
    Check {
        name: "keyring",
        status,
        detail,
    }
}
