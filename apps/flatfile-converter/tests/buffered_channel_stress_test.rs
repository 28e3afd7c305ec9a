//! Backpressure stress test for buffered channels.
//!
//! A consumer with randomized pacing drains channels of several capacities
//! while the queue depth is sampled. The depth must never exceed the
//! configured capacity and every event must arrive exactly once, in order.

// Allow unwrap in tests - tests should panic on unexpected errors
#![allow(clippy::unwrap_used)]

use std::io::Cursor;
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use test_case::test_case;

use flatfile_converter::domain::DEFAULT_MARKET;
use flatfile_converter::feed::{BufferedChannel, ChannelReader, RecordParser};

const EVENTS: u32 = 5_000;

fn channel_text() -> String {
    (0..EVENTS)
        .map(|i| {
            let millis = 34_200_000 + i * 7;
            format!(
                "{:02}:{:02}:{:02}.{:03},BID,SPY,C,20240119,4750000,{},{},CBOE,,{i}\n",
                millis / 3_600_000,
                (millis / 60_000) % 60,
                (millis / 1000) % 60,
                millis % 1000,
                10_000 + i,
                i
            )
        })
        .collect()
}

fn spawn(buffer_max: usize) -> BufferedChannel {
    let parser = RecordParser::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), DEFAULT_MARKET);
    let reader = ChannelReader::from_reader("stress", Cursor::new(channel_text()), parser);
    BufferedChannel::spawn(reader, buffer_max).unwrap()
}

#[test_case(1, 11 ; "capacity one")]
#[test_case(4, 23 ; "capacity four")]
#[test_case(64, 37 ; "capacity sixty four")]
fn test_queue_never_exceeds_capacity(buffer_max: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut channel = spawn(buffer_max);
    let mut received = 0_u64;

    while let Some(event) = channel.next_event().unwrap() {
        // Sizes were written as the line index.
        assert_eq!(event.size, received);
        received += 1;

        assert!(channel.queued() <= buffer_max);

        match rng.random_range(0..100) {
            // Slow consumer: let the producer fill up.
            0..=4 => thread::sleep(Duration::from_micros(rng.random_range(50..500))),
            5..=19 => thread::yield_now(),
            _ => {}
        }
    }

    assert_eq!(received, u64::from(EVENTS));
    assert!(channel.high_water_mark() <= buffer_max);
    assert!(!channel.has_more());
    assert_eq!(channel.stats().accepted, u64::from(EVENTS));
}

#[test]
fn test_drop_mid_stream_joins_worker() {
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..20 {
        let mut channel = spawn(rng.random_range(1..16));
        let take = rng.random_range(0..200);
        for _ in 0..take {
            channel.next_event().unwrap();
        }
        drop(channel);
    }
}
