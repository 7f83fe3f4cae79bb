use bridge::{
    BroadcastChannel, DetectionResult, FrameJob, JobQueue, MemoryBroadcast, MemoryJobQueue,
};
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Several consumers draining one queue must see every job exactly once.
#[test]
fn test_competing_consumers_share_jobs_without_duplicates() {
    let queue = Arc::new(MemoryJobQueue::new(1024));
    let total = 500u64;

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(job) = queue.dequeue(Duration::from_millis(100)) {
                    seen.push((job.session_id, job.sequence));
                }
                seen
            })
        })
        .collect();

    for sequence in 1..=total {
        let session = if sequence % 2 == 0 { "even" } else { "odd" };
        queue
            .enqueue(FrameJob::new(session, sequence, Bytes::from_static(b"x")))
            .unwrap();
    }

    let mut all = Vec::new();
    for consumer in consumers {
        all.extend(consumer.join().unwrap());
    }

    let unique: HashSet<_> = all.iter().cloned().collect();
    assert_eq!(all.len(), total as usize, "Every job delivered");
    assert_eq!(unique.len(), all.len(), "No job delivered twice");
    assert_eq!(queue.depth(), 0);
}

/// Results published from worker threads reach only the subscribed session.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_results_published_from_threads_reach_subscriber() {
    let channel = Arc::new(MemoryBroadcast::new(64));
    let mut sub_a = channel.subscribe("a");
    let mut sub_b = channel.subscribe("b");

    let publishers: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|session| {
            let channel = channel.clone();
            thread::spawn(move || {
                for sequence in 1..=10 {
                    let job = FrameJob::new(session, sequence, Bytes::new());
                    channel.publish(session, DetectionResult::success(&job, vec![], 1.0));
                }
            })
        })
        .collect();

    for publisher in publishers {
        publisher.join().unwrap();
    }

    for expected in 1..=10 {
        let a = sub_a.recv().await.unwrap();
        let b = sub_b.recv().await.unwrap();
        assert_eq!((a.session_id.as_str(), a.sequence), ("a", expected));
        assert_eq!((b.session_id.as_str(), b.sequence), ("b", expected));
    }
}
