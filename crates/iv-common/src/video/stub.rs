//! In-process provider that records calls and can be told to fail.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{VideoError, VideoProvider};

#[derive(Debug, Default)]
pub struct StubVideoProvider {
    pub fail_dispatch: AtomicBool,
    pub fail_recording: AtomicBool,
    pub fail_stop: AtomicBool,
    pub fail_delete: AtomicBool,
    sequence: AtomicU64,
    calls: Mutex<Vec<String>>,
}

impl StubVideoProvider {
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<(), VideoError> {
        if flag.load(Ordering::SeqCst) {
            return Err(VideoError::Api {
                status: 503,
                body: format!("{what} unavailable"),
            });
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl VideoProvider for StubVideoProvider {
    async fn create_room(&self, room: &str, _empty_timeout_sec: u32) -> Result<(), VideoError> {
        self.record(format!("create_room:{room}"));
        Ok(())
    }

    async fn delete_room(&self, room: &str) -> Result<(), VideoError> {
        self.record(format!("delete_room:{room}"));
        Self::check(&self.fail_delete, "delete_room")
    }

    async fn dispatch_agent(
        &self,
        room: &str,
        agent_name: &str,
        _metadata: &str,
    ) -> Result<String, VideoError> {
        self.record(format!("dispatch_agent:{room}:{agent_name}"));
        Self::check(&self.fail_dispatch, "dispatch")?;
        Ok(self.next_id("AD"))
    }

    async fn start_recording(&self, room: &str, object_key: &str) -> Result<String, VideoError> {
        self.record(format!("start_recording:{room}:{object_key}"));
        Self::check(&self.fail_recording, "egress")?;
        Ok(self.next_id("EG"))
    }

    async fn stop_recording(&self, egress_id: &str) -> Result<(), VideoError> {
        self.record(format!("stop_recording:{egress_id}"));
        Self::check(&self.fail_stop, "stop_egress")
    }
}
