//! Integration tests for the acquisition pacing engine: sample budgets,
//! limits, drift bounds, decimation and the stop conditions.

mod common;

use common::{sim_device, CollectSink};
use labhal::capability::{CapabilityModel, ConfigValue, Scope};
use labhal::device::{Channel, ChannelGroup, ChannelKind, PatternContext};
use labhal::session::StepDirective;
use labhal::{ConfigKey, DeviceInstance, HalError};

#[tokio::test]
async fn time_limit_delivers_the_exact_sample_count() {
    // 1000 Hz with a 250 ms time limit must deliver exactly 250 samples
    // and reach Idle on the tick where the 250th sample goes out.
    let mut device = sim_device(8, 1).await;
    device
        .config_set(ConfigKey::SampleRate, Scope::Device, ConfigValue::UInt(1_000))
        .unwrap();
    device
        .config_set(ConfigKey::LimitTime, Scope::Device, ConfigValue::UInt(250_000))
        .unwrap();

    let mut sink = CollectSink::default();
    device.start_acquisition(0, &mut sink).unwrap();

    let mut final_tick = None;
    for tick in 1..=10u64 {
        let now = tick * 50_000;
        let directive = device.acquisition_step(now, &mut sink).unwrap();
        if directive == StepDirective::Stop {
            final_tick = Some(tick);
            break;
        }
    }

    assert_eq!(final_tick, Some(5), "must stop on the 250 ms tick");
    assert!(!device.is_acquiring());
    assert_eq!(sink.logic_samples, 250);
    assert_eq!(sink.analog_samples[&8], 250);
    assert_eq!(sink.began, 1);
    assert_eq!(sink.ended, 1);
}

#[tokio::test]
async fn sample_limit_is_never_exceeded() {
    let mut device = sim_device(8, 1).await;
    device
        .config_set(ConfigKey::SampleRate, Scope::Device, ConfigValue::UInt(100_000))
        .unwrap();
    device
        .config_set(ConfigKey::LimitSamples, Scope::Device, ConfigValue::UInt(777))
        .unwrap();

    let mut sink = CollectSink::default();
    device.start_acquisition(0, &mut sink).unwrap();

    // One tick a whole second in: far more time elapsed than the limit
    // covers. The budget must clamp to the limit.
    let directive = device.acquisition_step(1_000_000, &mut sink).unwrap();
    assert_eq!(directive, StepDirective::Stop);
    assert_eq!(sink.logic_samples, 777);
    assert_eq!(sink.analog_samples[&8], 777);
    assert!(!device.is_acquiring());
}

#[tokio::test]
async fn zero_elapsed_step_changes_nothing() {
    let mut device = sim_device(8, 1).await;
    device
        .config_set(ConfigKey::SampleRate, Scope::Device, ConfigValue::UInt(1_000))
        .unwrap();

    let mut sink = CollectSink::default();
    device.start_acquisition(5_000, &mut sink).unwrap();

    let directive = device.acquisition_step(5_000, &mut sink).unwrap();
    assert_eq!(directive, StepDirective::Continue);
    assert_eq!(sink.frames, 0);
    let clock = device.session_clock().unwrap();
    assert_eq!(clock.samples_sent(), 0);
    assert_eq!(clock.accounted_us(), 0);
}

#[tokio::test]
async fn accounted_time_never_drifts_beyond_one_period() {
    // 100 Hz: one period is 10 ms. Awkward tick times force the ceiling
    // division to emit samples "early"; the floor re-accounting must keep
    // the books within one period of real time and the totals exact.
    let mut device = sim_device(8, 0).await;
    device
        .config_set(ConfigKey::SampleRate, Scope::Device, ConfigValue::UInt(100))
        .unwrap();

    let mut sink = CollectSink::default();
    device.start_acquisition(0, &mut sink).unwrap();

    let period_us = 10_000u64;
    for now in [7_919u64, 15_013, 23_456, 40_000, 50_000] {
        let directive = device.acquisition_step(now, &mut sink).unwrap();
        assert_eq!(directive, StepDirective::Continue);

        let clock = device.session_clock().unwrap();
        assert!(
            clock.accounted_us() <= now + period_us,
            "accounted {} µs at elapsed {} µs drifts past one period",
            clock.accounted_us(),
            now
        );
        let owed = (now * 100).div_ceil(1_000_000);
        assert_eq!(clock.samples_sent(), owed, "budget wrong at {now} µs");
    }

    // The last tick landed on a period boundary, so the caught-up total is
    // exactly elapsed * rate / 1e6, and a repeat tick owes nothing more.
    assert_eq!(sink.logic_samples, 5);
    device.acquisition_step(50_000, &mut sink).unwrap();
    assert_eq!(sink.logic_samples, 5);
}

#[tokio::test]
async fn exceeded_time_limit_drains_the_owed_window() {
    // First tick long after the limit expired: the engine sends the whole
    // still-owed window rather than cutting off at zero.
    let mut device = sim_device(8, 0).await;
    device
        .config_set(ConfigKey::SampleRate, Scope::Device, ConfigValue::UInt(1_000))
        .unwrap();
    device
        .config_set(ConfigKey::LimitTime, Scope::Device, ConfigValue::UInt(100_000))
        .unwrap();

    let mut sink = CollectSink::default();
    device.start_acquisition(0, &mut sink).unwrap();
    let directive = device.acquisition_step(250_000, &mut sink).unwrap();

    assert_eq!(directive, StepDirective::Stop);
    assert_eq!(sink.logic_samples, 100);
}

#[tokio::test]
async fn zero_sample_rate_stops_immediately() {
    // A rate of zero can never come in through config_set (the domain
    // forbids it), but the engine must still refuse to loop on it.
    let channels = vec![
        Channel {
            index: 0,
            kind: ChannelKind::Logic,
            name: "D0".into(),
            enabled: true,
        },
        Channel {
            index: 1,
            kind: ChannelKind::Logic,
            name: "D1".into(),
            enabled: true,
        },
    ];
    let groups = vec![ChannelGroup {
        name: "Logic".into(),
        channels: vec![0, 1],
    }];
    let ctx = PatternContext::new(2, 0, 0);
    let mut device = DeviceInstance::new(
        "zero",
        "zero-rate fixture",
        channels,
        groups,
        CapabilityModel::new(),
        ctx,
        None,
    );
    device.open().await.unwrap();

    let mut sink = CollectSink::default();
    device.start_acquisition(0, &mut sink).unwrap();
    let directive = device.acquisition_step(1_000, &mut sink).unwrap();

    assert_eq!(directive, StepDirective::Stop);
    assert_eq!(sink.frames, 0);
    assert!(!device.is_acquiring());
    assert_eq!(sink.ended, 1);
}

#[tokio::test]
async fn no_enabled_channels_stops_immediately() {
    let mut device = sim_device(8, 4).await;
    for index in 0..12 {
        device.set_channel_enabled(index, false).unwrap();
    }

    let mut sink = CollectSink::default();
    device.start_acquisition(0, &mut sink).unwrap();
    let directive = device.acquisition_step(1_000, &mut sink).unwrap();

    assert_eq!(directive, StepDirective::Stop);
    assert_eq!(sink.frames, 0);
    assert!(!device.is_acquiring());
}

#[tokio::test]
async fn averaging_everything_emits_one_value_at_stop() {
    // Window 0: fold every sample, emit once when the session stops. The
    // square pattern starts with five samples at -amplitude, so four
    // samples of -16 fold to -8, -12, -14, -15.
    let mut device = sim_device(0, 1).await;
    device
        .config_set(ConfigKey::SampleRate, Scope::Device, ConfigValue::UInt(1_000))
        .unwrap();
    device
        .config_set(ConfigKey::LimitSamples, Scope::Device, ConfigValue::UInt(4))
        .unwrap();
    device
        .config_set(ConfigKey::Averaging, Scope::Device, ConfigValue::Bool(true))
        .unwrap();
    device
        .config_set(ConfigKey::AvgSamples, Scope::Device, ConfigValue::UInt(0))
        .unwrap();
    device
        .config_set(ConfigKey::Amplitude, Scope::Group("A0"), ConfigValue::Float(16.0))
        .unwrap();

    let mut sink = CollectSink::default();
    device.start_acquisition(0, &mut sink).unwrap();
    let directive = device.acquisition_step(10_000, &mut sink).unwrap();

    assert_eq!(directive, StepDirective::Stop);
    assert_eq!(sink.analog_values[&0], vec![-15.0]);
    assert_eq!(sink.analog_samples[&0], 1);
}

#[tokio::test]
async fn averaging_window_emits_every_n_samples() {
    let mut device = sim_device(0, 1).await;
    device
        .config_set(ConfigKey::SampleRate, Scope::Device, ConfigValue::UInt(1_000))
        .unwrap();
    device
        .config_set(ConfigKey::LimitSamples, Scope::Device, ConfigValue::UInt(4))
        .unwrap();
    device
        .config_set(ConfigKey::Averaging, Scope::Device, ConfigValue::Bool(true))
        .unwrap();
    device
        .config_set(ConfigKey::AvgSamples, Scope::Device, ConfigValue::UInt(2))
        .unwrap();
    device
        .config_set(ConfigKey::Amplitude, Scope::Group("A0"), ConfigValue::Float(16.0))
        .unwrap();

    let mut sink = CollectSink::default();
    device.start_acquisition(0, &mut sink).unwrap();
    device.acquisition_step(10_000, &mut sink).unwrap();

    // Two full windows over four -16 samples, each folding to -12; the
    // accumulator is empty at stop so nothing more is flushed.
    assert_eq!(sink.analog_values[&0], vec![-12.0, -12.0]);
}

#[tokio::test]
async fn partial_window_is_flushed_at_stop() {
    let mut device = sim_device(0, 1).await;
    device
        .config_set(ConfigKey::SampleRate, Scope::Device, ConfigValue::UInt(1_000))
        .unwrap();
    device
        .config_set(ConfigKey::LimitSamples, Scope::Device, ConfigValue::UInt(4))
        .unwrap();
    device
        .config_set(ConfigKey::Averaging, Scope::Device, ConfigValue::Bool(true))
        .unwrap();
    device
        .config_set(ConfigKey::AvgSamples, Scope::Device, ConfigValue::UInt(3))
        .unwrap();
    device
        .config_set(ConfigKey::Amplitude, Scope::Group("A0"), ConfigValue::Float(16.0))
        .unwrap();

    let mut sink = CollectSink::default();
    device.start_acquisition(0, &mut sink).unwrap();
    device.acquisition_step(10_000, &mut sink).unwrap();

    // Three samples fill the window (-14); the fourth is left pending and
    // flushed on stop (-8).
    assert_eq!(sink.analog_values[&0], vec![-14.0, -8.0]);
}

#[tokio::test]
async fn sessions_can_restart_with_fresh_counters() {
    let mut device = sim_device(8, 0).await;
    device
        .config_set(ConfigKey::SampleRate, Scope::Device, ConfigValue::UInt(1_000))
        .unwrap();
    device
        .config_set(ConfigKey::LimitSamples, Scope::Device, ConfigValue::UInt(10))
        .unwrap();

    let mut sink = CollectSink::default();
    device.start_acquisition(0, &mut sink).unwrap();
    assert!(device.start_acquisition(0, &mut sink).is_err(), "double start");
    device.acquisition_step(1_000_000, &mut sink).unwrap();
    assert!(!device.is_acquiring());

    device.start_acquisition(0, &mut sink).unwrap();
    let clock = device.session_clock().unwrap();
    assert_eq!(clock.samples_sent(), 0);
    assert_eq!(clock.accounted_us(), 0);
    device.acquisition_step(1_000_000, &mut sink).unwrap();

    assert_eq!(sink.logic_samples, 20);
    assert_eq!(sink.began, 2);
    assert_eq!(sink.ended, 2);
}

#[tokio::test]
async fn starting_a_closed_device_fails() {
    let mut device = sim_device(8, 0).await;
    device.close().await.unwrap();

    let mut sink = CollectSink::default();
    let err = device.start_acquisition(0, &mut sink).unwrap_err();
    assert!(matches!(err, HalError::DeviceClosed));
    assert_eq!(sink.began, 0);
}
