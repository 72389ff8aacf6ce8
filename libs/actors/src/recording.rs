//! Session Recording
//!
//! Writes the traffic of one run into
//! `<root>/<system>/<YYYYMMDD>/<HHMMSS>/Data.lsf`, opened with a
//! `LoggingControl` STARTED record and closed with STOPPED. Both carry the
//! session name `YYYYMMDD/HHMMSS`.

use chrono::{Local, NaiveDateTime};
use codec::{LoggingControl, LoggingControlOp, Message};
use lsf::{LsfError, LsfWriter};
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of a session log inside its directory
pub const SESSION_FILE: &str = "Data.lsf";

#[derive(Debug)]
pub struct SessionRecorder {
    writer: LsfWriter,
    path: PathBuf,
    name: String,
    address: u16,
}

/// Session name (`YYYYMMDD/HHMMSS`) and log path for a start time
pub fn session_path(root: &Path, system: &str, at: NaiveDateTime) -> (String, PathBuf) {
    let date = at.format("%Y%m%d").to_string();
    let time = at.format("%H%M%S").to_string();
    let path = root.join(system).join(&date).join(&time).join(SESSION_FILE);
    (format!("{}/{}", date, time), path)
}

impl SessionRecorder {
    /// Open a session starting now (local time)
    pub fn start(root: &Path, system: &str, address: u16) -> lsf::Result<Self> {
        Self::start_at(root, system, address, Local::now().naive_local())
    }

    pub fn start_at(root: &Path, system: &str, address: u16, at: NaiveDateTime) -> lsf::Result<Self> {
        let (name, path) = session_path(root, system, at);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| LsfError::io(format!("creating {}", dir.display()), e))?;
        }

        let mut recorder = Self {
            writer: LsfWriter::create(&path)?,
            path,
            name,
            address,
        };
        recorder.control(LoggingControlOp::Started)?;
        info!(path = %recorder.path.display(), session = %recorder.name, "Recording session");
        Ok(recorder)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn records(&self) -> u64 {
        self.writer.records()
    }

    pub fn record(&mut self, msg: &Message) -> lsf::Result<()> {
        self.writer.write_message(msg)
    }

    fn control(&mut self, op: LoggingControlOp) -> lsf::Result<()> {
        let mut msg = Message::new(LoggingControl {
            op,
            name: self.name.clone(),
        });
        msg.header.src = self.address;
        msg.set_timestamp_now();
        self.writer.write_message(&msg)
    }

    /// Write STOPPED, flush, and return the log path
    pub fn stop(mut self) -> lsf::Result<PathBuf> {
        self.control(LoggingControlOp::Stopped)?;
        let records = self.writer.records();
        self.writer.finish()?;
        info!(path = %self.path.display(), records, "Session log closed");
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use codec::Heartbeat;
    use lsf::LsfReader;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .and_then(|d| d.and_hms_opt(9, 5, 1))
            .unwrap()
    }

    #[test]
    fn test_session_layout() {
        let (name, path) = session_path(Path::new("/logs"), "ccu-rust", at());
        assert_eq!(name, "20240307/090501");
        assert_eq!(path, Path::new("/logs/ccu-rust/20240307/090501/Data.lsf"));
    }

    #[test]
    fn test_bracketed_by_logging_control() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = SessionRecorder::start_at(dir.path(), "ccu-rust", 0x3334, at()).unwrap();
        let mut hb = Message::new(Heartbeat);
        hb.header.src = 0x16;
        recorder.record(&hb).unwrap();
        let path = recorder.stop().unwrap();

        let messages = LsfReader::open(&path).unwrap().read_all(None).unwrap();
        assert_eq!(messages.len(), 3);

        let ops: Vec<LoggingControlOp> = messages
            .iter()
            .filter_map(|m| m.get::<LoggingControl>())
            .map(|lc| lc.op)
            .collect();
        assert_eq!(ops, vec![LoggingControlOp::Started, LoggingControlOp::Stopped]);
        assert_eq!(messages[0].src(), 0x3334);
        assert_eq!(messages[0].get::<LoggingControl>().unwrap().name, "20240307/090501");
        assert!(messages[1].is::<Heartbeat>());
    }
}
