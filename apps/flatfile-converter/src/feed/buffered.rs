//! Read-ahead wrapper that decodes one channel on a background thread.
//!
//! # Architecture
//!
//! ```text
//! ChannelReader ──(worker thread)──> bounded queue ──> BufferedChannel::next
//!       ▲                                                     │
//!       └──────────── synchronous steal when queue empty ─────┘
//! ```
//!
//! Locks are always taken reader first, then queue. The worker pushes while
//! still holding the reader lock, so a consumer that holds the reader lock
//! and sees an empty queue has received every event decoded so far.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::reader::{ChannelReader, ReaderStats};
use crate::domain::MarketEvent;
use crate::error::{ConvertError, Result};

/// Default queue capacity per channel.
pub const DEFAULT_BUFFER_MAX: usize = 10_000;

struct Shared {
    name: String,
    buffer_max: usize,
    reader: Mutex<ChannelReader>,
    queue: Mutex<VecDeque<MarketEvent>>,
    room: Condvar,
    completed: AtomicBool,
    cancelled: AtomicBool,
    failure: Mutex<Option<ConvertError>>,
    high_water: AtomicUsize,
}

impl Shared {
    fn complete(&self) {
        self.completed.store(true, Ordering::Release);
        let _queue = self.queue.lock();
        self.room.notify_all();
    }

    fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn channel_error(&self, err: &ConvertError) -> ConvertError {
        ConvertError::Channel {
            channel: self.name.clone(),
            message: err.to_string(),
        }
    }
}

/// One channel decoded ahead into a bounded queue.
///
/// Single consumer: reading takes `&mut self` and the type is not `Clone`.
/// Dropping the channel stops the worker and waits for it to exit.
pub struct BufferedChannel {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for BufferedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedChannel")
            .field("name", &self.shared.name)
            .field("buffer_max", &self.shared.buffer_max)
            .field("queued", &self.queued())
            .field("completed", &self.shared.is_completed())
            .finish()
    }
}

impl BufferedChannel {
    /// Start decoding `reader` on a dedicated thread.
    ///
    /// A `buffer_max` of zero is treated as one.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn spawn(reader: ChannelReader, buffer_max: usize) -> Result<Self> {
        let name = reader.name().to_string();
        let shared = Arc::new(Shared {
            name: name.clone(),
            buffer_max: buffer_max.max(1),
            reader: Mutex::new(reader),
            queue: Mutex::new(VecDeque::with_capacity(buffer_max.clamp(1, 1024))),
            room: Condvar::new(),
            completed: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            failure: Mutex::new(None),
            high_water: AtomicUsize::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(format!("channel-{name}"))
            .spawn(move || produce(&worker_shared))
            .map_err(|e| ConvertError::Channel {
                channel: name,
                message: format!("failed to spawn worker: {e}"),
            })?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Channel name (input file name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether another event (or a pending error) may still be returned.
    #[must_use]
    pub fn has_more(&self) -> bool {
        !self.shared.is_completed()
            || !self.shared.queue.lock().is_empty()
            || self.shared.failure.lock().is_some()
    }

    /// Events currently waiting in the queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Largest queue length observed so far.
    #[must_use]
    pub fn high_water_mark(&self) -> usize {
        self.shared.high_water.load(Ordering::Relaxed)
    }

    /// Configured queue capacity.
    #[must_use]
    pub fn buffer_max(&self) -> usize {
        self.shared.buffer_max
    }

    /// Line counters of the wrapped reader.
    #[must_use]
    pub fn stats(&self) -> ReaderStats {
        self.shared.reader.lock().stats()
    }

    /// Take the next event in file order.
    ///
    /// Returns `Ok(None)` once the channel is exhausted. A worker failure is
    /// returned once, after every event decoded before it.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Channel`] if decoding the channel failed.
    pub fn next_event(&mut self) -> Result<Option<MarketEvent>> {
        let shared = &*self.shared;
        loop {
            if let Some(event) = self.pop() {
                return Ok(Some(event));
            }

            if shared.is_completed() {
                // The worker may have pushed between the pop and the flag.
                if let Some(event) = self.pop() {
                    return Ok(Some(event));
                }
                return shared.failure.lock().take().map_or(Ok(None), Err);
            }

            // Queue empty and the worker still running: decode directly.
            let mut reader = shared.reader.lock();
            if let Some(event) = self.pop() {
                return Ok(Some(event));
            }
            if shared.is_completed() {
                continue;
            }

            match reader.next_event() {
                Ok(Some(event)) => return Ok(Some(event)),
                Ok(None) => {
                    drop(reader);
                    shared.complete();
                }
                Err(err) => {
                    drop(reader);
                    warn!(channel = %shared.name, error = %err, "Channel read failed");
                    shared.complete();
                    return Err(shared.channel_error(&err));
                }
            }
        }
    }

    fn pop(&self) -> Option<MarketEvent> {
        let mut queue = self.shared.queue.lock();
        let event = queue.pop_front()?;
        self.shared.room.notify_one();
        Some(event)
    }
}

impl Iterator for BufferedChannel {
    type Item = Result<MarketEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

impl Drop for BufferedChannel {
    fn drop(&mut self) {
        self.shared.cancelled.store(true, Ordering::Release);
        {
            let _queue = self.shared.queue.lock();
            self.shared.room.notify_all();
        }
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!(channel = %self.shared.name, "Channel worker panicked");
        }
    }
}

/// Worker loop: decode ahead until exhausted, failed, or cancelled.
fn produce(shared: &Shared) {
    debug!(channel = %shared.name, buffer_max = shared.buffer_max, "Channel worker started");
    let mut produced: u64 = 0;

    loop {
        {
            let mut queue = shared.queue.lock();
            while queue.len() >= shared.buffer_max
                && !shared.is_cancelled()
                && !shared.is_completed()
            {
                shared.room.wait(&mut queue);
            }
        }
        if shared.is_cancelled() || shared.is_completed() {
            break;
        }

        let mut reader = shared.reader.lock();
        // A consumer steal may have reached the end while we waited.
        if shared.is_completed() {
            break;
        }

        match reader.next_event() {
            Ok(Some(event)) => {
                let mut queue = shared.queue.lock();
                queue.push_back(event);
                shared.high_water.fetch_max(queue.len(), Ordering::Relaxed);
                produced += 1;
            }
            Ok(None) => {
                drop(reader);
                shared.complete();
                break;
            }
            Err(err) => {
                drop(reader);
                warn!(channel = %shared.name, error = %err, "Channel read failed");
                *shared.failure.lock() = Some(shared.channel_error(&err));
                shared.complete();
                break;
            }
        }
    }

    debug!(
        channel = %shared.name,
        produced,
        cancelled = shared.is_cancelled(),
        "Channel worker stopped"
    );
}

#[cfg(test)]
mod tests {
    use std::io::{self, BufRead, Cursor, Read};

    use chrono::NaiveDate;

    use super::*;
    use crate::domain::DEFAULT_MARKET;
    use crate::feed::parser::RecordParser;

    fn parser() -> RecordParser {
        RecordParser::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), DEFAULT_MARKET)
    }

    fn lines(count: usize) -> String {
        (0..count)
            .map(|i| {
                let secs = 34_200 + i;
                format!(
                    "{:02}:{:02}:{:02}.000,TRADE,SPY,C,20240119,4750000,{},1,CBOE,,{i}\n",
                    secs / 3600,
                    (secs / 60) % 60,
                    secs % 60,
                    10_000 + i
                )
            })
            .collect()
    }

    fn channel(count: usize, buffer_max: usize) -> BufferedChannel {
        let reader = ChannelReader::from_reader("mem", Cursor::new(lines(count)), parser());
        BufferedChannel::spawn(reader, buffer_max).unwrap()
    }

    #[test]
    fn test_preserves_file_order() {
        let mut channel = channel(500, 8);
        let events: Vec<_> = channel.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(events.len(), 500);
        assert!(events.windows(2).all(|w| w[0].time < w[1].time));
        assert!(!channel.has_more());
        assert!(channel.high_water_mark() <= 8);
    }

    #[test]
    fn test_empty_channel() {
        let mut channel = channel(0, 4);
        assert!(channel.next_event().unwrap().is_none());
        assert!(!channel.has_more());
    }

    #[test]
    fn test_queue_fills_to_capacity_without_consumer() {
        let channel = channel(100, 5);
        // Wait for the worker to fill the queue.
        for _ in 0..200 {
            if channel.queued() == 5 {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(channel.queued(), 5);
        assert_eq!(channel.high_water_mark(), 5);
    }

    #[test]
    fn test_drop_stops_blocked_worker() {
        let channel = channel(10_000, 2);
        thread::sleep(std::time::Duration::from_millis(10));
        // Worker is parked on a full queue; drop must wake and join it.
        drop(channel);
    }

    /// Yields some lines, then fails.
    struct FailingSource {
        inner: Cursor<String>,
    }

    impl Read for FailingSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl BufRead for FailingSource {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            let buf = self.inner.fill_buf()?;
            if buf.is_empty() {
                return Err(io::Error::other("disk vanished"));
            }
            Ok(buf)
        }

        fn consume(&mut self, amt: usize) {
            self.inner.consume(amt);
        }
    }

    #[test]
    fn test_failure_reported_after_queued_events() {
        let source = FailingSource {
            inner: Cursor::new(lines(3)),
        };
        let reader = ChannelReader::from_reader("failing", source, parser());
        let mut channel = BufferedChannel::spawn(reader, 16).unwrap();

        for _ in 0..3 {
            assert!(channel.next_event().unwrap().is_some());
        }
        let err = channel.next_event().unwrap_err();
        assert!(matches!(err, ConvertError::Channel { ref channel, .. } if channel == "failing"));
        assert!(channel.next_event().unwrap().is_none());
    }

    #[test]
    fn test_stats_visible_through_channel() {
        let mut channel = channel(20, 4);
        while channel.next_event().unwrap().is_some() {}
        assert_eq!(channel.stats().accepted, 20);
        assert_eq!(channel.name(), "mem");
        assert_eq!(channel.buffer_max(), 4);
    }
}
