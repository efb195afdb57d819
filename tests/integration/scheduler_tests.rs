// MIT License
//
// Copyright (c) 2025 Ronan LE MEILLAT for SCTG Development
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Scheduler behaviour seen from the outside: isolation between jobs,
//! prompt and repeatable shutdown, bounded runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::bail;
use bioreactor::peripherals::{Bioreactor, Direction, PeltierState, Peripherals};
use bioreactor::scheduler::{Job, Period, RunFor, Scheduler};
use bioreactor::thermal::{SimulatedPlant, ThermalSystem};
use parking_lot::Mutex;

fn counter() -> Arc<AtomicU64> {
    Arc::new(AtomicU64::new(0))
}

fn counting_job(name: &str, period: Period, run_for: RunFor, count: &Arc<AtomicU64>) -> Job {
    let count = count.clone();
    Job::new(name, period, run_for, move |_| {
        count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

#[test]
fn failing_jobs_do_not_starve_siblings() {
    let healthy = counter();
    let failing = counter();
    let panicking = counter();

    let scheduler = Scheduler::new();
    let every = Period::Every(Duration::from_millis(20));
    let jobs = vec![
        counting_job("healthy", every, RunFor::Indefinitely, &healthy),
        {
            let failing = failing.clone();
            Job::new("failing", every, RunFor::Indefinitely, move |_| {
                failing.fetch_add(1, Ordering::SeqCst);
                bail!("sensor bus unplugged")
            })
        },
        {
            let panicking = panicking.clone();
            Job::new("panicking", every, RunFor::Indefinitely, move |_| {
                panicking.fetch_add(1, Ordering::SeqCst);
                panic!("driver blew up");
            })
        },
    ];
    scheduler.run(jobs).unwrap();
    thread::sleep(Duration::from_millis(500));
    let report = scheduler.stop(Duration::from_secs(2));

    assert!(report.is_clean());
    assert_eq!(report.joined.len(), 3);
    // ~25 ticks each in the window; leave room for a slow CI box.
    assert!(healthy.load(Ordering::SeqCst) >= 10);
    assert!(failing.load(Ordering::SeqCst) >= 10);
    assert!(panicking.load(Ordering::SeqCst) >= 10);
}

#[test]
fn stop_twice_is_harmless() {
    let ticks = counter();
    let hooks = counter();

    let scheduler = Scheduler::new();
    {
        let hooks = hooks.clone();
        scheduler.on_shutdown(move || {
            hooks.fetch_add(1, Ordering::SeqCst);
        });
    }
    scheduler
        .run(vec![counting_job(
            "ticker",
            Period::Every(Duration::from_millis(10)),
            RunFor::Indefinitely,
            &ticks,
        )])
        .unwrap();
    thread::sleep(Duration::from_millis(50));

    let first = scheduler.stop(Duration::from_secs(2));
    assert_eq!(first.joined, vec!["ticker".to_string()]);
    assert!(!scheduler.is_running());

    let after_first = ticks.load(Ordering::SeqCst);
    let second = scheduler.stop(Duration::from_secs(2));
    assert!(second.is_clean());
    assert!(second.joined.is_empty());
    assert_eq!(hooks.load(Ordering::SeqCst), 1);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(ticks.load(Ordering::SeqCst), after_first);
}

#[test]
fn concurrent_stops_run_hooks_once() {
    let hooks = counter();
    let scheduler = Arc::new(Scheduler::new());
    {
        let hooks = hooks.clone();
        scheduler.on_shutdown(move || {
            hooks.fetch_add(1, Ordering::SeqCst);
        });
    }
    scheduler
        .run(vec![counting_job(
            "ticker",
            Period::Every(Duration::from_millis(5)),
            RunFor::Indefinitely,
            &counter(),
        )])
        .unwrap();

    let stoppers: Vec<_> = (0..4)
        .map(|_| {
            let scheduler = scheduler.clone();
            thread::spawn(move || scheduler.stop(Duration::from_secs(2)))
        })
        .collect();
    for stopper in stoppers {
        assert!(stopper.join().unwrap().is_clean());
    }
    assert_eq!(hooks.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.active_jobs(), 0);
}

#[test]
fn stop_does_not_wait_out_long_periods() {
    let scheduler = Scheduler::new();
    scheduler
        .run(vec![counting_job(
            "hourly",
            Period::Every(Duration::from_secs(3600)),
            RunFor::Indefinitely,
            &counter(),
        )])
        .unwrap();
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    let report = scheduler.stop(Duration::from_secs(5));
    assert!(report.is_clean());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn bounded_job_ends_on_its_own() {
    let ticks = counter();
    let scheduler = Scheduler::new();
    scheduler
        .run(vec![counting_job(
            "burst",
            Period::Every(Duration::from_millis(10)),
            RunFor::For(Duration::from_millis(100)),
            &ticks,
        )])
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while scheduler.is_running() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(!scheduler.is_running());
    let n = ticks.load(Ordering::SeqCst);
    assert!((2..=12).contains(&n), "unexpected tick count {n}");
    assert!(scheduler.stop(Duration::from_secs(1)).is_clean());
}

#[test]
fn continuous_job_runs_back_to_back() {
    let ticks = counter();
    let scheduler = Scheduler::new();
    scheduler
        .run(vec![counting_job(
            "spin",
            Period::Continuous,
            RunFor::For(Duration::from_millis(50)),
            &ticks,
        )])
        .unwrap();
    thread::sleep(Duration::from_millis(150));
    scheduler.stop(Duration::from_secs(1));
    assert!(ticks.load(Ordering::SeqCst) > 100);
}

#[test]
fn context_counts_invocations() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let scheduler = Scheduler::new();
    {
        let seen = seen.clone();
        scheduler
            .run(vec![Job::new(
                "ctx",
                Period::Every(Duration::from_millis(10)),
                RunFor::For(Duration::from_millis(45)),
                move |ctx| {
                    seen.lock().push((ctx.invocation, ctx.elapsed));
                    Ok(())
                },
            )])
            .unwrap();
    }
    thread::sleep(Duration::from_millis(150));
    scheduler.stop(Duration::from_secs(1));

    let seen = seen.lock();
    assert!(seen.len() >= 2);
    for (i, (invocation, _)) in seen.iter().enumerate() {
        assert_eq!(*invocation, i as u64 + 1);
    }
    assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1));
}

#[test]
fn dropping_the_scheduler_stops_jobs() {
    let ticks = counter();
    let hooks = counter();
    {
        let scheduler = Scheduler::new();
        let hooks = hooks.clone();
        scheduler.on_shutdown(move || {
            hooks.fetch_add(1, Ordering::SeqCst);
        });
        scheduler
            .run(vec![counting_job(
                "ticker",
                Period::Every(Duration::from_millis(5)),
                RunFor::Indefinitely,
                &ticks,
            )])
            .unwrap();
        thread::sleep(Duration::from_millis(30));
    }
    assert_eq!(hooks.load(Ordering::SeqCst), 1);
    let after_drop = ticks.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(ticks.load(Ordering::SeqCst), after_drop);
}

#[test]
fn stop_lets_the_current_invocation_finish() {
    let finished = Arc::new(AtomicBool::new(false));
    let scheduler = Scheduler::new();
    {
        let finished = finished.clone();
        scheduler
            .run(vec![Job::new(
                "slow",
                Period::Every(Duration::from_secs(3600)),
                RunFor::Indefinitely,
                move |_| {
                    thread::sleep(Duration::from_millis(150));
                    finished.store(true, Ordering::SeqCst);
                    Ok(())
                },
            )])
            .unwrap();
    }
    thread::sleep(Duration::from_millis(30));

    let report = scheduler.stop(Duration::from_secs(2));
    assert!(finished.load(Ordering::SeqCst));
    assert!(report.is_clean());
    assert_eq!(report.joined, vec!["slow".to_string()]);
}

#[test]
fn straggler_cannot_restart_peltier_after_teardown() {
    let plant = SimulatedPlant::new(ThermalSystem::bench_vessel(21.0));
    let reactor = Arc::new(
        Bioreactor::builder()
            .temperature_probes(Ok(plant.probes()))
            .peltier(Ok(plant.peltier_driver()))
            .build(),
    );
    let scheduler = Scheduler::new();
    {
        let reactor = reactor.clone();
        scheduler.on_shutdown(move || reactor.shutdown());
    }
    let accepted = Arc::new(Mutex::new(None));
    {
        let reactor = reactor.clone();
        let accepted = accepted.clone();
        scheduler
            .run(vec![Job::new(
                "slow_pid",
                Period::Every(Duration::from_secs(3600)),
                RunFor::Indefinitely,
                move |_| {
                    thread::sleep(Duration::from_millis(300));
                    *accepted.lock() = Some(reactor.set_peltier(60.0, Direction::Heat)?);
                    Ok(())
                },
            )])
            .unwrap();
    }
    thread::sleep(Duration::from_millis(30));

    let first = scheduler.stop(Duration::from_millis(50));
    assert_eq!(first.still_running, vec!["slow_pid".to_string()]);
    assert!(reactor.is_shut_down());

    let second = scheduler.stop(Duration::from_secs(2));
    assert_eq!(second.joined, vec!["slow_pid".to_string()]);
    assert_eq!(*accepted.lock(), Some(false));
    assert_eq!(reactor.peltier_state(), PeltierState::Off);
    assert_eq!(plant.peltier(), PeltierState::Off);
}
