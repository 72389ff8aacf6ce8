//! Log Playback
//!
//! Replays an LSF log into the scheduler as if the messages were arriving from
//! the network. Each source system keeps its own clock: its first message is
//! delivered when playback starts, and every later one at its offset from that
//! first message, divided by the playback speed.
//!
//! Only the subscribed types (plus `LoggingControl`) are read from the log
//! unless a wildcard handler wants everything.

use crate::messages::{Inbound, Origin};
use crate::transport::{Feed, Listener};
use codec::{unix_timestamp, Announce, EntityInfo, EntityList, LoggingControl, Message, PayloadKind};
use lsf::{IndexMode, LsfReader};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackOptions {
    /// 1.0 is real time, 2.0 twice as fast; zero or negative means no delay
    pub speed: f64,
    /// Shift timestamps so the log appears to be happening now
    pub restamp: bool,
    /// Skip messages logged before this time, except the discovery ones
    pub start_time: Option<f64>,
    /// Stop the scheduler once the log is exhausted
    pub stop_at_end: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            restamp: true,
            start_time: None,
            stop_at_end: false,
        }
    }
}

/// Messages still delivered before the start time so the registry is primed
fn primes_registry(msg: &Message) -> bool {
    msg.is::<Announce>() || msg.is::<EntityList>() || msg.is::<EntityInfo>()
}

#[derive(Debug)]
pub struct Playback {
    reader: LsfReader,
    options: PlaybackOptions,
}

impl Playback {
    /// Open a log, building its index if needed
    pub fn open(path: impl AsRef<Path>, options: PlaybackOptions) -> lsf::Result<Self> {
        let reader = LsfReader::open_with(path, IndexMode::Build)?;
        Ok(Self::from_reader(reader, options))
    }

    pub fn from_reader(reader: LsfReader, options: PlaybackOptions) -> Self {
        Self { reader, options }
    }

    pub fn into_listener(self) -> Listener {
        let name = format!("playback:{}", self.reader.path().display());
        Listener::new(name, move |feed| tokio::spawn(self.run(feed)))
    }

    async fn run(self, mut feed: Feed) {
        let Self { mut reader, options } = self;
        let types: Option<Vec<u16>> = feed.wanted().map(|wanted| {
            let mut types = wanted.to_vec();
            if !types.contains(&LoggingControl::TYPE_ID) {
                types.push(LoggingControl::TYPE_ID);
            }
            types
        });

        let path = reader.path().to_path_buf();
        let loaded = tokio::task::spawn_blocking(move || reader.read_all(types.as_deref())).await;
        let messages = match loaded {
            Ok(Ok(messages)) => messages,
            Ok(Err(e)) => {
                error!(path = %path.display(), error = %e, "Unable to read playback log");
                feed.finish(options.stop_at_end).await;
                return;
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Playback reader failed");
                feed.finish(options.stop_at_end).await;
                return;
            }
        };
        info!(path = %path.display(), messages = messages.len(), speed = options.speed, "Playback started");

        let t0 = Instant::now();
        let t0_wall = unix_timestamp();
        let mut first_seen: HashMap<u16, f64> = HashMap::new();
        let mut delivered = 0usize;

        for mut msg in messages {
            let logged = msg.timestamp();
            let first = *first_seen.entry(msg.src()).or_insert(logged);
            let offset = (logged - first).max(0.0);

            if options.restamp {
                msg.header.timestamp = t0_wall + offset;
            }

            if let Some(start) = options.start_time {
                if logged < start {
                    if primes_registry(&msg) && !feed.send(Inbound::new(msg, Origin::Playback)).await {
                        return;
                    }
                    continue;
                }
            }

            if options.speed > 0.0 {
                let due = t0 + Duration::from_secs_f64(offset / options.speed);
                tokio::select! {
                    biased;
                    _ = feed.stopped() => {
                        debug!(delivered, "Playback interrupted");
                        return;
                    }
                    _ = sleep_until(due) => {}
                }
            } else if feed.is_stopping() {
                return;
            }

            if !feed.send(Inbound::new(msg, Origin::Playback)).await {
                return;
            }
            delivered += 1;
        }

        info!(path = %path.display(), delivered, "Playback finished");
        feed.finish(options.stop_at_end).await;
    }
}
