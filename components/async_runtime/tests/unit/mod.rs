//! Ordering guarantees across the queue types.

use async_runtime::{EventLoop, Job};
use core_types::Value;

#[test]
fn test_interleaved_enqueue_preserves_per_queue_fifo() {
    let mut el = EventLoop::new();
    for i in 0..5 {
        el.enqueue_microtask(Job::Call {
            func: Value::Number(i as f64),
            args: vec![],
        });
        el.enqueue_host_job(Job::Call {
            func: Value::Number((100 + i) as f64),
            args: vec![],
        });
    }
    let mut seen = Vec::new();
    while let Some(Job::Call { func, .. }) = el.next_microtask() {
        seen.push(func.as_number().unwrap());
    }
    assert_eq!(seen, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    let mut host = Vec::new();
    while let Some(Job::Call { func, .. }) = el.next_host_job() {
        host.push(func.as_number().unwrap());
    }
    assert_eq!(host, vec![100.0, 101.0, 102.0, 103.0, 104.0]);
}
