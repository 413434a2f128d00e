//! Control-tick benchmark — measures the cost of one
//! `ServoControlLoop::tick` call across joint counts, validating the
//! loop stays well inside a single device control period (§5: a
//! 1.2ms tick budget at the default cadence).

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use servo_common::{consts, ReferenceTriplet};
use servo_device::encoder::simulated::{RecordingCurrentSink, SimulatedQuadratureEncoder};
use servo_device::{ServoControlLoop, ServoControlLoopConfig};

fn build_loop() -> ServoControlLoop {
    let cfg = ServoControlLoopConfig {
        control_speed: 120,
        backlash_control_speed: 120,
        dt_s: consts::GET_TIME_INTERVAL_US_DEFAULT as f64 / 1_000_000.0,
        u_limit: 2000.0,
        ticks_per_revolution: 4096.0,
        stale_hold_multiple: consts::STALE_HOLD_MULTIPLE,
        stale_disable_multiple: consts::STALE_DISABLE_MULTIPLE,
    };
    let mut servo = ServoControlLoop::new(
        cfg,
        Box::new(SimulatedQuadratureEncoder::new(1.0, 0.1, cfg.dt_s)),
        None,
        Box::new(RecordingCurrentSink::default()),
    );
    servo.load_new_reference(0, ReferenceTriplet::hold(0.0));
    servo.load_new_reference(
        consts::LOAD_TIME_INTERVAL_US_DEFAULT as u64,
        ReferenceTriplet::hold(100.0),
    );
    servo.enable(true);
    servo
}

/// Simulate `n` independently-ticked joints sharing one control
/// period, the way `servo_device::rt::DeviceRuntime` would if this
/// crate drove several joints from a single cycle.
fn tick_all(servos: &mut [ServoControlLoop], now_us: u64) {
    for servo in servos.iter_mut() {
        servo.tick(now_us);
    }
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("servo_control_tick");
    group.significance_level(0.01);
    group.sample_size(500);

    for &n_joints in &[1usize, 2, 6] {
        let mut servos: Vec<ServoControlLoop> = (0..n_joints).map(|_| build_loop()).collect();
        let mut now_us = consts::LOAD_TIME_INTERVAL_US_DEFAULT as u64;

        group.bench_with_input(
            BenchmarkId::new("joints", n_joints),
            &n_joints,
            |b, &_n| {
                b.iter(|| {
                    now_us += consts::GET_TIME_INTERVAL_US_DEFAULT as u64;
                    tick_all(&mut servos, now_us);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_tick);
criterion_main!(benches);
