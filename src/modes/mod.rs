//! Entry points selected by `RUN_MODE`.
//!
//! | `RUN_MODE`       | Behaviour                                                   |
//! |------------------|-------------------------------------------------------------|
//! | `live` (default) | poll the feed and deliver alerts through `NOTIFY_CHANNEL`   |
//! | `replay`         | push recorded snapshots from `REPLAY_INPUT_PATH` through the pipeline |
//!
//! An unrecognised value is reported and treated as `live`.

mod live;
mod replay;
mod shared;

use anyhow::Result;
use tracing::{info, warn};

use shared::{Lookup, process_env};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Live,
    Replay,
}

impl RunMode {
    fn select(env: Lookup) -> Self {
        let Some(raw) = env("RUN_MODE") else {
            return Self::Live;
        };
        match raw.trim().to_lowercase().as_str() {
            "" | "live" | "relay" => Self::Live,
            "replay" => Self::Replay,
            other => {
                warn!("Unknown RUN_MODE {other:?}; relaying live alerts");
                Self::Live
            }
        }
    }
}

pub async fn run_from_env() -> Result<()> {
    let mode = RunMode::select(&process_env);
    info!("Starting in {mode:?} mode");
    match mode {
        RunMode::Live => live::run().await,
        RunMode::Replay => replay::run().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode_for(value: Option<&str>) -> RunMode {
        let value = value.map(str::to_owned);
        RunMode::select(&move |key: &str| (key == "RUN_MODE").then(|| value.clone()).flatten())
    }

    #[test]
    fn live_unless_replay_is_asked_for() {
        assert_eq!(mode_for(None), RunMode::Live);
        assert_eq!(mode_for(Some("")), RunMode::Live);
        assert_eq!(mode_for(Some("live")), RunMode::Live);
        assert_eq!(mode_for(Some(" Replay ")), RunMode::Replay);
    }

    #[test]
    fn unknown_mode_falls_back_to_live() {
        assert_eq!(mode_for(Some("dump_today")), RunMode::Live);
    }
}
