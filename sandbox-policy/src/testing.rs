//! In-memory audit sink for tests in this and the dependent crates

use serde_json::Value;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Writer that keeps every NDJSON line for inspection after an
/// [`AuditLog`](crate::AuditLog) takes ownership of a clone
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Every record written so far, parsed
    pub fn records(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    pub fn decisions(&self) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|r| r["type"] == "decision")
            .collect()
    }

    /// The `msg` of each info record
    pub fn messages(&self) -> Vec<String> {
        self.records()
            .iter()
            .filter(|r| r["type"] == "info")
            .map(|r| r["msg"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
