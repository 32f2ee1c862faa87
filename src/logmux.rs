use std::collections::HashMap;
use std::sync::Arc;

use gantry_bus::{Bus, Event};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Per-job ring buffer depth, in lines. Past this, the oldest lines are
/// dropped; a client that asks for an offset older than what remains
/// gets whatever is left rather than an error, same trade-off the bus
/// itself makes with `Event::Lag`.
const RING_CAPACITY: usize = 4096;

struct JobLog {
    lines: std::collections::VecDeque<String>,
    /// Offset of `lines[0]`; `base + lines.len()` is the next offset a
    /// fresh append will take.
    base: u64,
}

impl JobLog {
    fn new() -> Self {
        Self { lines: std::collections::VecDeque::new(), base: 0 }
    }

    fn push(&mut self, line: String) {
        if self.lines.len() == RING_CAPACITY {
            self.lines.pop_front();
            self.base += 1;
        }
        self.lines.push_back(line);
    }

    fn next_offset(&self) -> u64 {
        self.base + self.lines.len() as u64
    }

    /// Lines strictly after `from_offset`, plus the offset to resume
    /// from next time. A `from_offset` older than `self.base` returns
    /// everything still buffered rather than erroring.
    fn tail(&self, from_offset: u64) -> (Vec<String>, u64) {
        let start = from_offset.saturating_sub(self.base).min(self.lines.len() as u64) as usize;
        let lines = self.lines.iter().skip(start).cloned().collect();
        (lines, self.next_offset())
    }
}

/// Buffers each job's log lines in a bounded ring, keyed by line
/// offset, so a client that reconnects mid-stream can resume
/// exactly where it left off instead of re-reading from zero or
/// duplicating lines already seen. Subscribes to the bus itself rather
/// than making every subscriber maintain its own offset bookkeeping.
pub struct LogMultiplexer {
    jobs: Mutex<HashMap<Uuid, JobLog>>,
}

impl LogMultiplexer {
    /// Spawn a background task that drains the bus into per-job ring
    /// buffers for the lifetime of the process.
    pub fn spawn(bus: Bus) -> Arc<Self> {
        let this = Arc::new(Self { jobs: Mutex::new(HashMap::new()) });
        let worker = this.clone();
        tokio::spawn(async move {
            let mut sub = bus.subscribe();
            while let Some(event) = sub.recv().await {
                worker.handle(event).await;
            }
        });
        this
    }

    async fn handle(&self, event: Event) {
        match event {
            Event::LogAppend { job_id, line } => {
                let mut jobs = self.jobs.lock().await;
                jobs.entry(job_id).or_insert_with(JobLog::new).push(line);
            }
            Event::LogClose { job_id, .. } => {
                let mut jobs = self.jobs.lock().await;
                if jobs.remove(&job_id).is_some() {
                    debug!(job_id = %job_id, "log multiplexer dropped ring buffer for closed job");
                }
            }
            Event::Lag { skipped } => {
                debug!(skipped, "log multiplexer missed events, buffered lines may have gaps");
            }
            _ => {}
        }
    }

    /// Lines appended after `from_offset`, and the offset to pass on
    /// the next call. A job with no buffered lines (never started, or
    /// already closed and swept) returns an empty tail at offset 0.
    pub async fn tail(&self, job_id: Uuid, from_offset: u64) -> (Vec<String>, u64) {
        let jobs = self.jobs.lock().await;
        match jobs.get(&job_id) {
            Some(log) => log.tail(from_offset),
            None => (Vec::new(), from_offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resumed_tail_does_not_duplicate_lines() {
        let bus = Bus::new();
        let mux = LogMultiplexer::spawn(bus.clone());
        let job_id = Uuid::new_v4();

        bus.publish(Event::LogAppend { job_id, line: "one".into() });
        bus.publish(Event::LogAppend { job_id, line: "two".into() });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let (first, offset) = mux.tail(job_id, 0).await;
        assert_eq!(first, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(offset, 2);

        bus.publish(Event::LogAppend { job_id, line: "three".into() });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let (second, offset) = mux.tail(job_id, offset).await;
        assert_eq!(second, vec!["three".to_string()]);
        assert_eq!(offset, 3);
    }

    #[tokio::test]
    async fn log_close_drops_the_ring_buffer() {
        let bus = Bus::new();
        let mux = LogMultiplexer::spawn(bus.clone());
        let job_id = Uuid::new_v4();

        bus.publish(Event::LogAppend { job_id, line: "one".into() });
        bus.publish(Event::LogClose { job_id, status: gantry_types::Status::Success });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let (lines, offset) = mux.tail(job_id, 0).await;
        assert!(lines.is_empty());
        assert_eq!(offset, 0);
    }
}
