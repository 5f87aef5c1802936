//! Black-box end-to-end scenarios spanning the task runtime and the
//! readiness-based I/O layer together, each driven purely through public
//! API — no crate internals.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use taskrt::io::{Event, EventType, Poller, Reader, Tag, Timer, Writer};
use taskrt::io::{ClockKind, PipePair};
use taskrt::task::{InlineRunner, PoolRunner, RuntimeConfig, Task, TaskRunner, ThreadPool};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
}

#[test]
fn in_order_chain_on_four_worker_pool() {
    init_tracing();
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let pool = Arc::new(ThreadPool::new(RuntimeConfig::with_workers(4)));
    let runner = PoolRunner::new(Arc::clone(&pool));

    let words = ["Be", "sure", "to", "drink", "your", "Ovaltine!"];
    let mut task: Task<()> = Task::from_fn({
        let log = Arc::clone(&log);
        move || {
            log.lock().unwrap().push(words[0]);
            Ok(())
        }
    });
    for word in &words[1..] {
        let log = Arc::clone(&log);
        let word = *word;
        task = task.then(move |_ctx| {
            log.lock().unwrap().push(word);
            Ok(())
        });
    }

    task.run(&runner).wait();
    assert_eq!(*log.lock().unwrap(), words.to_vec());
    pool.stop();
}

#[test]
fn task_run_ten_times_in_succession_leaves_counter_at_ten() {
    let counter = Arc::new(AtomicUsize::new(0));
    let runner = InlineRunner::new();
    let task: Task<()> = Task::from_fn({
        let counter = Arc::clone(&counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    for _ in 0..10 {
        task.run(&runner).wait();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 10);
}

#[test]
fn failing_first_step_skips_the_rest_and_surfaces_the_error() {
    let counter = Arc::new(AtomicUsize::new(0));
    let runner = InlineRunner::new();
    let task: Task<()> = Task::from_fn(|| Err("boom".into())).then({
        let counter = Arc::clone(&counter);
        move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    task.run(&runner).wait();
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(task.promise().release_failure().to_string(), "boom");
}

#[test]
fn delay_separates_two_records_by_at_least_one_millisecond() {
    let runner = InlineRunner::new();
    let t0 = Arc::new(Mutex::new(None));
    let t1 = Arc::new(Mutex::new(None));

    let task: Task<()> = Task::from_fn({
        let t0 = Arc::clone(&t0);
        move || {
            *t0.lock().unwrap() = Some(Instant::now());
            Ok(())
        }
    })
    .then_task(runner.delay(Duration::from_millis(1)))
    .then({
        let t1 = Arc::clone(&t1);
        move |_ctx| {
            *t1.lock().unwrap() = Some(Instant::now());
            Ok(())
        }
    });

    task.run(&runner).wait();
    let elapsed = t1.lock().unwrap().unwrap() - t0.lock().unwrap().unwrap();
    assert!(elapsed >= Duration::from_millis(1));
}

#[test]
fn multiplexer_reports_readiness_after_a_pipe_write() {
    let poller = Poller::open().unwrap();
    let mut pair = PipePair::open().unwrap();
    let read_fd = pair.input().unwrap().as_raw_fd().unwrap();
    poller.add(read_fd, EventType::READABLE).unwrap();

    pair.output().unwrap().write(b"Hello").unwrap();

    let mut events = [Event { fd: -1, events: EventType::empty(), tag: Tag::from_u64(0) }; 4];
    let n = poller.poll(&mut events, Some(Duration::ZERO)).unwrap();

    assert_eq!(n, 1);
    assert_eq!(events[0].fd, read_fd);
    assert!(events[0].events.contains(EventType::READABLE));
}

#[test]
fn timer_armed_for_ten_millis_fires_within_a_twenty_millis_poll() {
    let mut timer = Timer::open(ClockKind::Monotonic).unwrap();
    let armed_at = Instant::now();
    timer.set_time(Duration::from_millis(10), Duration::ZERO).unwrap();

    let poller = Poller::open().unwrap();
    poller.add(timer.as_raw_fd().unwrap(), EventType::READABLE).unwrap();

    let mut events = [Event { fd: -1, events: EventType::empty(), tag: Tag::from_u64(0) }; 1];
    let n = poller.poll(&mut events, Some(Duration::from_millis(20))).unwrap();

    assert_eq!(n, 1);
    assert!(armed_at.elapsed() >= Duration::from_millis(10));
    assert!(timer.read_expirations().unwrap() >= 1);
}

#[test]
fn fifo_fairness_with_two_producers_and_one_consumer() {
    const N: usize = 10_000;
    let q = Arc::new(taskrt::queue::Queue::new());

    let producers: Vec<_> = (0..2)
        .map(|producer_id| {
            let q = Arc::clone(&q);
            std::thread::spawn(move || {
                for i in 0..N {
                    q.push_back((producer_id, i));
                }
            })
        })
        .collect();

    let mut popped = Vec::with_capacity(N * 2);
    let consumer = std::thread::spawn({
        let q = Arc::clone(&q);
        move || {
            let mut c = q.consumer();
            while popped.len() < N * 2 {
                if let Some(v) = c.pop() {
                    popped.push(v);
                }
            }
            popped
        }
    });

    for p in producers {
        p.join().unwrap();
    }
    let popped = consumer.join().unwrap();

    for producer_id in 0..2 {
        let seq: Vec<_> = popped.iter().filter(|(p, _)| *p == producer_id).map(|(_, i)| *i).collect();
        assert_eq!(seq, (0..N).collect::<Vec<_>>());
    }
}
