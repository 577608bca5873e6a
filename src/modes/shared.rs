use anyhow::{Context, Result, anyhow};
use reqwest::Client as HttpClient;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::classifier::Region;
use crate::dedup;
use crate::feed::{self, AlertSource, FileFeed, HttpFeed};
use crate::notify::{self, GreenApiNotifier, Notifier, TelegramNotifier};
use crate::poller::{Backoff, PollerCfg};
use crate::taxonomy;

/// Environment accessor; `std::env::var` in production, a map in tests.
pub(super) type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

pub(super) fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum FeedLocation {
    Http(String),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub(super) struct RelayCfg {
    pub feed: FeedLocation,
    pub fetch_timeout: Duration,
    pub poller: PollerCfg,
    pub region: Region,
    pub include_test_alerts: bool,
    pub dedup_capacity: usize,
    pub taxonomy_path: PathBuf,
    pub taxonomy_url: String,
    pub taxonomy_timeout: Duration,
}

impl RelayCfg {
    pub fn build_source(&self) -> Result<Arc<dyn AlertSource>> {
        Ok(match &self.feed {
            FeedLocation::Http(url) => Arc::new(
                HttpFeed::new(url.clone(), self.fetch_timeout)
                    .context("failed to build feed HTTP client")?,
            ),
            FeedLocation::File(path) => Arc::new(FileFeed::new(path.clone())),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum NotifyCfg {
    WhatsApp {
        api_url: String,
        instance: String,
        token: String,
        number: String,
    },
    Telegram {
        token: String,
        chat_id: String,
    },
}

impl NotifyCfg {
    pub fn build(&self, http: HttpClient) -> Arc<dyn Notifier> {
        match self {
            Self::WhatsApp {
                api_url,
                instance,
                token,
                number,
            } => Arc::new(GreenApiNotifier::new(
                http,
                api_url.clone(),
                instance.clone(),
                token.clone(),
                number,
            )),
            Self::Telegram { token, chat_id } => Arc::new(TelegramNotifier::new(
                http,
                notify::TELEGRAM_API_URL,
                token.clone(),
                chat_id.clone(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub(super) struct ReplayCfg {
    pub input_path: String,
    pub step: Duration,
    pub broadcast: bool,
}

pub(super) fn must_env(env: Lookup, key: &str) -> Result<String> {
    env(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("Missing env var {key}"))
}

pub(super) fn parse_bool_env(env: Lookup, key: &str, default: bool) -> bool {
    env(key)
        .map(|v| {
            let v = v.trim();
            v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
        })
        .unwrap_or(default)
}

fn parse_u64_env(env: Lookup, key: &str, default: u64) -> u64 {
    env(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

/// Feed, cadence, filtering and taxonomy settings. Nothing here is mandatory.
///
/// | Env var               | Default                      |
/// |-----------------------|------------------------------|
/// | `REGION`              | `*`                          |
/// | `DEBUG_MODE`          | `false`                      |
/// | `FEED_URL`            | public feed                  |
/// | `DEBUG_FEED_URL`      | `http://localhost/alerts.json` |
/// | `FEED_FILE`           | unset                        |
/// | `INCLUDE_TEST_ALERTS` | `true`                       |
/// | `POLL_INTERVAL_MS`    | `1000`                       |
/// | `FETCH_TIMEOUT_MS`    | `5000`                       |
/// | `BACKOFF_BASE_MS`     | `1000`                       |
/// | `BACKOFF_MAX_MS`      | `30000`                      |
/// | `DEDUP_CAPACITY`      | `1000`                       |
/// | `TAXONOMY_PATH`       | `lamas.json`                 |
/// | `TAXONOMY_URL`        | upstream `lamas.json`        |
/// | `TAXONOMY_TIMEOUT_MS` | `15000`                      |
pub(super) fn load_relay_cfg(env: Lookup) -> RelayCfg {
    let feed = if let Some(path) = env("FEED_FILE").filter(|p| !p.trim().is_empty()) {
        FeedLocation::File(PathBuf::from(path.trim()))
    } else if parse_bool_env(env, "DEBUG_MODE", false) {
        FeedLocation::Http(
            env("DEBUG_FEED_URL").unwrap_or_else(|| feed::DEFAULT_DEBUG_FEED_URL.into()),
        )
    } else {
        FeedLocation::Http(env("FEED_URL").unwrap_or_else(|| feed::DEFAULT_FEED_URL.into()))
    };

    let poll_ms = parse_u64_env(env, "POLL_INTERVAL_MS", 1000).max(1);
    let base_ms = parse_u64_env(env, "BACKOFF_BASE_MS", 1000).max(1);
    let max_ms = parse_u64_env(env, "BACKOFF_MAX_MS", 30_000).max(base_ms);

    RelayCfg {
        feed,
        fetch_timeout: Duration::from_millis(parse_u64_env(env, "FETCH_TIMEOUT_MS", 5000)),
        poller: PollerCfg {
            poll_interval: Duration::from_millis(poll_ms),
            backoff: Backoff::new(Duration::from_millis(base_ms), Duration::from_millis(max_ms)),
        },
        region: Region::parse(&env("REGION").unwrap_or_else(|| "*".into())),
        include_test_alerts: parse_bool_env(env, "INCLUDE_TEST_ALERTS", true),
        dedup_capacity: parse_u64_env(env, "DEDUP_CAPACITY", dedup::DEFAULT_CAPACITY as u64)
            as usize,
        taxonomy_path: PathBuf::from(
            env("TAXONOMY_PATH").unwrap_or_else(|| taxonomy::DEFAULT_PATH.into()),
        ),
        taxonomy_url: env("TAXONOMY_URL").unwrap_or_else(|| taxonomy::DEFAULT_URL.into()),
        taxonomy_timeout: Duration::from_millis(
            parse_u64_env(env, "TAXONOMY_TIMEOUT_MS", taxonomy::DEFAULT_TIMEOUT.as_millis() as u64)
                .max(1),
        ),
    }
}

/// Delivery channel credentials. Missing credentials are fatal.
///
/// | `NOTIFY_CHANNEL` | Required env vars                                        |
/// |------------------|----------------------------------------------------------|
/// | `whatsapp`       | `GREEN_API_INSTANCE`, `GREEN_API_TOKEN`, `WHATSAPP_NUMBER` |
/// | `telegram`       | `BOT_TOKEN`, `BOT_CHAT_ID`                               |
pub(super) fn load_notify_cfg(env: Lookup) -> Result<NotifyCfg> {
    let channel = env("NOTIFY_CHANNEL").unwrap_or_else(|| "whatsapp".into());
    match channel.trim().to_lowercase().as_str() {
        "whatsapp" | "green_api" | "greenapi" => Ok(NotifyCfg::WhatsApp {
            api_url: env("GREEN_API_URL").unwrap_or_else(|| notify::GREEN_API_DEFAULT_URL.into()),
            instance: must_env(env, "GREEN_API_INSTANCE")?,
            token: must_env(env, "GREEN_API_TOKEN")?,
            number: must_env(env, "WHATSAPP_NUMBER")?,
        }),
        "telegram" => Ok(NotifyCfg::Telegram {
            token: must_env(env, "BOT_TOKEN")?,
            chat_id: must_env(env, "BOT_CHAT_ID")?,
        }),
        other => Err(anyhow!("Unknown NOTIFY_CHANNEL {other:?}")),
    }
}

pub(super) fn load_replay_cfg(env: Lookup) -> Result<ReplayCfg> {
    Ok(ReplayCfg {
        input_path: must_env(env, "REPLAY_INPUT_PATH")?,
        step: Duration::from_millis(parse_u64_env(env, "REPLAY_STEP_MS", 0)),
        broadcast: parse_bool_env(env, "REPLAY_BROADCAST", false),
    })
}

/// One raw snapshot per line; blank lines are skipped.
pub(super) fn load_snapshots(path: &str) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("failed to open replay file {path}"))?;
    let reader = BufReader::new(file);

    let mut snapshots = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        snapshots.push(line);
    }
    Ok(snapshots)
}
