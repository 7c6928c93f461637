use super::*;
use crate::decode::decoder::DecoderInfo;
use crate::runtime::capture::CaptureStateCell;
use crate::runtime::engine::{EngineLock, InstanceId};
use crate::runtime::mock::{MockEngine, proto};
use crate::runtime::segment::{Logic, LogicSegment, LogicSignal};
use std::time::{Duration, Instant};

fn plain_info() -> Arc<DecoderInfo> {
    Arc::new(
        DecoderInfo::new("plain", "Plain")
            .with_channel("data", "Data", "Data line")
            .with_annotation("bit", "Bit"),
    )
}

fn spi_info() -> Arc<DecoderInfo> {
    Arc::new(
        DecoderInfo::new("spi", "SPI")
            .with_channel("clk", "CLK", "Clock")
            .with_optional_channel("mosi", "MOSI", "Master out, slave in")
            .with_annotation("mosi-data", "MOSI data")
            .with_annotation("miso-data", "MISO data")
            .with_annotation("warning", "Warning")
            .with_annotation_row("mosi-data", "MOSI data", &[0])
            .with_annotation_row("miso-data", "MISO data", &[1]),
    )
}

fn logic_with(samples: usize, samplerate: f64) -> (Arc<Logic>, Arc<LogicSegment>) {
    let segment = Arc::new(LogicSegment::from_data(1, samplerate, vec![0; samples]).unwrap());
    let logic = Arc::new(Logic::new(8));
    logic.push_segment(segment.clone());
    (logic, segment)
}

fn stopped() -> Arc<CaptureStateCell> {
    Arc::new(CaptureStateCell::new(CaptureState::Stopped))
}

/// Stack with a private engine lock so tests do not contend on the global one
fn stack_for(capture: Arc<CaptureStateCell>, engine: &MockEngine) -> DecoderStack {
    DecoderStack::new(capture, Arc::new(engine.clone())).with_engine_lock(EngineLock::new())
}

fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_single_decoder_default_row() {
    let (logic, _) = logic_with(8, 1.0);
    let engine = MockEngine::new().with_events(vec![proto("plain", 2, 4, 0)]);
    let stack = stack_for(stopped(), &engine)
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::new("D0", 0, logic)));

    stack.begin_decode();
    stack.wait();

    assert_eq!(stack.error_message(), "");
    assert_eq!(stack.samples_decoded(), 8);

    let rows = stack.get_visible_rows();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_default());

    let annotations = stack.get_annotation_subset(&rows[0], 0, 8);
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].start_sample(), 2);
    assert_eq!(annotations[0].end_sample(), 4);
    assert_eq!(annotations[0].format(), 0);
    assert_eq!(stack.max_sample_count(), 4);
}

#[test]
fn test_missing_channels_fail_fast() {
    let engine = MockEngine::new();
    let stack = stack_for(stopped(), &engine).with_decoder(Decoder::new(spi_info()));
    let events = stack.subscribe();

    stack.begin_decode();

    assert!(!stack.is_running());
    assert_eq!(
        stack.error_message(),
        "One or more required channels have not been specified"
    );
    assert_eq!(engine.sessions(), 0);
    assert_eq!(
        events.try_recv().unwrap(),
        DecodeEvent::Error("One or more required channels have not been specified".to_string())
    );
}

#[test]
fn test_no_data_source_stays_idle() {
    let engine = MockEngine::new();
    let stack = stack_for(stopped(), &engine).with_decoder(
        Decoder::new(plain_info()).with_channel("data", LogicSignal::detached("D0", 0)),
    );

    stack.begin_decode();
    stack.wait();

    assert!(!stack.is_running());
    assert_eq!(stack.error_message(), "");
    assert_eq!(engine.sessions(), 0);
    assert_eq!(stack.samples_decoded(), 0);
}

#[test]
fn test_empty_logic_is_not_a_data_source() {
    let logic = Arc::new(Logic::new(8));
    let engine = MockEngine::new();
    let stack = stack_for(stopped(), &engine)
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::new("D0", 0, logic)));

    stack.begin_decode();
    stack.wait();

    assert_eq!(engine.sessions(), 0);
    assert_eq!(stack.error_message(), "");
}

#[test]
fn test_instance_failure_aborts_before_feeding() {
    let (logic, _) = logic_with(8, 1.0);
    let engine = MockEngine::new().rejecting("plain");
    let stack = stack_for(stopped(), &engine)
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::new("D0", 0, logic)));

    stack.begin_decode();
    stack.wait();

    assert!(
        stack
            .error_message()
            .starts_with("Failed to create decoder instance"),
        "unexpected error: {}",
        stack.error_message()
    );
    assert!(engine.chunks().is_empty());
    assert_eq!(stack.samples_decoded(), 0);
}

#[test]
fn test_submission_failure_keeps_partial_results() {
    let (logic, _) = logic_with(8, 1.0);
    let engine = MockEngine::new()
        .with_events(vec![proto("plain", 0, 1, 0), proto("plain", 5, 6, 0)])
        .failing_send_at(4);
    let stack = stack_for(stopped(), &engine)
        .with_config(DecodeConfig::new().with_chunk_bytes(2))
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::new("D0", 0, logic)));

    stack.begin_decode();
    stack.wait();

    assert!(stack.error_message().starts_with("Decoder reported an error"));
    assert_eq!(engine.chunks(), vec![(0, 2), (2, 4)]);
    assert_eq!(stack.samples_decoded(), 4);

    let rows = stack.get_visible_rows();
    let annotations = stack.get_annotation_subset(&rows[0], 0, 8);
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].start_sample(), 0);
}

#[test]
fn test_data_is_fed_in_chunks() {
    let (logic, _) = logic_with(10, 1000.0);
    let engine = MockEngine::new();
    let stack = stack_for(stopped(), &engine)
        .with_config(DecodeConfig::new().with_chunk_bytes(4))
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::new("D0", 0, logic)));

    stack.begin_decode();
    stack.wait();

    assert_eq!(engine.chunks(), vec![(0, 4), (4, 8), (8, 10)]);
    assert_eq!(engine.samplerate(), Some(1000));
    assert_eq!(stack.samples_decoded(), 10);
}

#[test]
fn test_decoders_are_stacked_in_order() {
    let (logic, _) = logic_with(4, 0.0);
    let engine = MockEngine::new();
    let stack = stack_for(stopped(), &engine)
        .with_decoder(Decoder::new(spi_info()).with_channel("clk", LogicSignal::new("D0", 0, logic)))
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::detached("D1", 1)));

    stack.begin_decode();
    stack.wait();

    assert_eq!(engine.stacked(), vec![(InstanceId::new(0), InstanceId::new(1))]);
    assert_eq!(stack.samplerate(), 1.0);
    assert_eq!(engine.samplerate(), Some(1));
}

#[test]
fn test_data_source_is_first_decoder_with_data() {
    let (first, _) = logic_with(4, 10.0);
    let (second, _) = logic_with(6, 20.0);
    let engine = MockEngine::new();
    let stack = stack_for(stopped(), &engine)
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::detached("D0", 0)))
        .with_decoder(Decoder::new(spi_info()).with_channel("clk", LogicSignal::new("D1", 1, first)))
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::new("D2", 2, second)));

    stack.begin_decode();
    stack.wait();

    assert_eq!(stack.samplerate(), 10.0);
    assert_eq!(stack.samples_decoded(), 4);
}

#[test]
fn test_decode_while_capturing() {
    let capture = Arc::new(CaptureStateCell::new(CaptureState::Running));
    let (logic, segment) = logic_with(4, 1.0);
    let engine = MockEngine::new().with_events(vec![proto("plain", 1, 2, 0), proto("plain", 6, 7, 0)]);
    let stack = stack_for(capture.clone(), &engine)
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::new("D0", 0, logic)));

    stack.begin_decode();
    wait_until("first batch", || stack.samples_decoded() == 4);
    assert!(stack.is_running(), "worker must wait for more data");

    segment.append_payload(&[0; 4]).unwrap();
    stack.on_data_received();
    wait_until("second batch", || stack.samples_decoded() == 8);
    assert!(stack.is_running());

    stack.on_frame_ended();
    stack.wait();

    assert_eq!(stack.error_message(), "");
    let rows = stack.get_visible_rows();
    assert_eq!(stack.get_annotation_subset(&rows[0], 0, 8).len(), 2);
}

#[test]
fn test_capture_stop_ends_the_run() {
    let capture = Arc::new(CaptureStateCell::new(CaptureState::Running));
    let (logic, _) = logic_with(4, 1.0);
    let engine = MockEngine::new();
    let stack = stack_for(capture.clone(), &engine)
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::new("D0", 0, logic)));

    stack.begin_decode();
    wait_until("first batch", || stack.samples_decoded() == 4);

    capture.set(CaptureState::Stopped);
    stack.on_data_received();
    stack.wait();

    assert!(!stack.is_running());
    assert_eq!(stack.samples_decoded(), 4);
}

#[test]
fn test_restart_cancels_running_worker() {
    let capture = Arc::new(CaptureStateCell::new(CaptureState::Running));
    let (logic, _) = logic_with(64, 1.0);
    let engine = MockEngine::new().with_send_delay(Duration::from_millis(2));
    let stack = stack_for(capture, &engine)
        .with_config(DecodeConfig::new().with_chunk_bytes(1))
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::new("D0", 0, logic)));

    stack.begin_decode();
    wait_until("decode progress", || stack.samples_decoded() > 0);

    stack.begin_decode();
    assert!(stack.samples_decoded() < 64, "restart must reset progress");
    wait_until("second run", || stack.samples_decoded() == 64);

    assert_eq!(engine.sessions(), 2);
    assert_eq!(engine.max_active(), 1);

    drop(stack);
    assert_eq!(engine.max_active(), 1);
}

#[test]
fn test_restart_during_wait_leaves_one_worker() {
    let capture = Arc::new(CaptureStateCell::new(CaptureState::Running));
    let (logic, segment) = logic_with(4, 1.0);
    let engine = MockEngine::new();
    let stack = stack_for(capture, &engine)
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::new("D0", 0, logic)));

    stack.begin_decode();
    wait_until("first run", || stack.samples_decoded() == 4);

    thread::scope(|s| {
        let waiter = s.spawn(|| stack.wait());
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished(), "live capture keeps the worker waiting");

        stack.begin_decode();
        waiter.join().unwrap();
    });

    assert!(stack.is_running(), "restarted worker stays in place");
    wait_until("second run", || stack.samples_decoded() == 4);
    assert_eq!(engine.sessions(), 2);
    assert_eq!(engine.max_active(), 1);

    segment.append_payload(&[0; 4]).unwrap();
    stack.on_data_received();
    wait_until("second batch", || stack.samples_decoded() == 8);

    stack.on_frame_ended();
    stack.wait();

    assert!(!stack.is_running());
    assert_eq!(engine.chunks(), vec![(0, 4), (0, 4), (4, 8)]);
    assert_eq!(engine.max_active(), 1);
}

#[test]
fn test_wait_returns_when_idle() {
    let engine = MockEngine::new();
    let stack = stack_for(stopped(), &engine).with_decoder(Decoder::new(plain_info()));
    stack.wait();
    stack.begin_decode();
    stack.wait();
    assert!(!stack.is_running());
}

#[test]
fn test_on_new_frame_restarts_decode() {
    let (logic, _) = logic_with(8, 1.0);
    let engine = MockEngine::new().with_events(vec![proto("plain", 3, 4, 0)]);
    let stack = stack_for(stopped(), &engine)
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::new("D0", 0, logic)));

    stack.begin_decode();
    stack.wait();
    stack.on_new_frame();
    stack.wait();

    assert_eq!(engine.sessions(), 2);
    let rows = stack.get_visible_rows();
    assert_eq!(stack.get_annotation_subset(&rows[0], 0, 8).len(), 1, "rows are reset per run");
}

#[test]
fn test_notify_period() {
    let (logic, _) = logic_with(8, 1.0);
    let events = (0..5).map(|i| proto("plain", i, i + 1, 0)).collect();
    let engine = MockEngine::new().with_events(events);
    let stack = stack_for(stopped(), &engine)
        .with_config(DecodeConfig::new().with_notify_period(2))
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::new("D0", 0, logic)));
    let receiver = stack.subscribe();

    stack.begin_decode();
    stack.wait();

    let events: Vec<_> = receiver.try_iter().collect();
    let new_annotations = events
        .iter()
        .filter(|e| **e == DecodeEvent::NewAnnotations)
        .count();
    // annotations 0, 2 and 4 plus the final flush
    assert_eq!(new_annotations, 4);
    assert_eq!(events.last(), Some(&DecodeEvent::Finished));
}

#[test]
fn test_mapped_rows_and_default_row_visibility() {
    let (logic, _) = logic_with(8, 1.0);
    let engine = MockEngine::new().with_events(vec![proto("spi", 0, 2, 0), proto("spi", 2, 4, 1)]);
    let stack = stack_for(stopped(), &engine)
        .with_decoder(Decoder::new(spi_info()).with_channel("clk", LogicSignal::new("D0", 0, logic)));

    stack.begin_decode();
    stack.wait();

    let rows = stack.get_visible_rows();
    let titles: Vec<_> = rows.iter().map(Row::title).collect();
    assert_eq!(titles, vec!["SPI: MOSI data", "SPI: MISO data"]);
    assert_eq!(stack.get_annotation_subset(&rows[0], 0, 8)[0].start_sample(), 0);
    assert_eq!(stack.get_annotation_subset(&rows[1], 0, 8)[0].start_sample(), 2);
}

#[test]
fn test_unmapped_class_shows_default_row() {
    let (logic, _) = logic_with(8, 1.0);
    let engine = MockEngine::new().with_events(vec![
        proto("spi", 0, 2, 2),
        proto("spi", 2, 4, 0),
        proto("spi", 4, 6, 2),
    ]);
    let stack = stack_for(stopped(), &engine)
        .with_decoder(Decoder::new(spi_info()).with_channel("clk", LogicSignal::new("D0", 0, logic)));

    stack.begin_decode();
    stack.wait();

    let rows = stack.get_visible_rows();
    assert_eq!(rows.len(), 3);
    assert!(rows[2].is_default());
    assert_eq!(stack.get_annotation_subset(&rows[2], 0, 8).len(), 2);

    let output = lock(&stack.shared.output);
    assert_eq!(output.unmapped["spi"], HashSet::from([2]));
}

#[test]
fn test_hidden_decoder_has_no_visible_rows() {
    let (logic, _) = logic_with(8, 1.0);
    let engine = MockEngine::new().with_events(vec![proto("plain", 2, 4, 0)]);
    let mut stack = stack_for(stopped(), &engine)
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::new("D0", 0, logic)));
    stack.decoder_mut(0).unwrap().show(false);

    stack.begin_decode();
    stack.wait();

    assert!(stack.get_visible_rows().is_empty());
    assert_eq!(stack.max_sample_count(), 4, "hidden decoders are still decoded");
}

#[test]
fn test_annotation_subset_window() {
    let (logic, _) = logic_with(16, 1.0);
    let events = vec![
        proto("plain", 0, 4, 0),
        proto("plain", 4, 8, 0),
        proto("plain", 8, 12, 0),
    ];
    let engine = MockEngine::new().with_events(events);
    let stack = stack_for(stopped(), &engine)
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::new("D0", 0, logic)));

    stack.begin_decode();
    stack.wait();

    let row = &stack.get_visible_rows()[0];
    let starts: Vec<_> = stack
        .get_annotation_subset(row, 4, 9)
        .iter()
        .map(Annotation::start_sample)
        .collect();
    assert_eq!(starts, vec![4, 8]);

    let unknown = Row::new(spi_info());
    assert!(stack.get_annotation_subset(&unknown, 0, 16).is_empty());
}

#[test]
fn test_clear_is_idempotent() {
    let (logic, _) = logic_with(8, 1.0);
    let engine = MockEngine::new().with_events(vec![proto("plain", 2, 4, 0)]);
    let stack = stack_for(stopped(), &engine)
        .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::new("D0", 0, logic)));
    stack.begin_decode();
    stack.wait();

    stack.clear();
    let once = (stack.samples_decoded(), stack.max_sample_count(), stack.error_message());
    stack.clear();
    let twice = (stack.samples_decoded(), stack.max_sample_count(), stack.error_message());

    assert_eq!(once, (0, 0, String::new()));
    assert_eq!(once, twice);
}

#[test]
fn test_error_is_cleared_by_next_run() {
    let (logic, _) = logic_with(8, 1.0);
    let engine = MockEngine::new();
    let mut stack = stack_for(stopped(), &engine).with_decoder(Decoder::new(plain_info()));

    stack.begin_decode();
    assert!(!stack.error_message().is_empty());

    stack
        .decoder_mut(0)
        .unwrap()
        .set_channel("data", LogicSignal::new("D0", 0, logic));
    stack.begin_decode();
    stack.wait();
    assert_eq!(stack.error_message(), "");
}

#[test]
fn test_first_error_is_latched() {
    let shared = Shared::new(stopped());
    shared.set_error(StackError::MissingChannels);
    shared.set_error(StackError::Submission(crate::runtime::errors::EngineError::NotStarted));

    assert!(matches!(
        lock(&shared.output).error,
        Some(StackError::MissingChannels)
    ));
}

#[test]
fn test_shared_engine_lock_serialises_stacks() {
    let engine = MockEngine::new().with_send_delay(Duration::from_millis(1));
    let engine_lock = EngineLock::new();

    let stacks: Vec<_> = (0..2)
        .map(|_| {
            let (logic, _) = logic_with(16, 1.0);
            DecoderStack::new(stopped(), Arc::new(engine.clone()))
                .with_engine_lock(engine_lock.clone())
                .with_config(DecodeConfig::new().with_chunk_bytes(2))
                .with_decoder(Decoder::new(plain_info()).with_channel("data", LogicSignal::new("D0", 0, logic)))
        })
        .collect();

    for stack in &stacks {
        stack.begin_decode();
    }
    for stack in &stacks {
        stack.wait();
        assert_eq!(stack.samples_decoded(), 16);
    }

    assert_eq!(engine.sessions(), 2);
    assert_eq!(engine.max_active(), 1);
}

#[test]
fn test_wait_state_running_capture_has_more_work() {
    let mut state = WaitState {
        interrupted: false,
        frame_complete: false,
        samples_decoded: 5,
        sample_count: 5,
        capture: CaptureState::Running,
    };
    assert_eq!(state.next_sample_count(), Some(5));
    assert!(state.should_wait());

    state.capture = CaptureState::Stopped;
    assert_eq!(state.next_sample_count(), None);
    assert!(!state.should_wait());
}

#[test]
fn test_wait_state_transitions() {
    let base = WaitState {
        interrupted: false,
        frame_complete: false,
        samples_decoded: 5,
        sample_count: 9,
        capture: CaptureState::Running,
    };
    assert!(!base.should_wait());
    assert_eq!(base.next_sample_count(), Some(9));

    let interrupted = WaitState {
        interrupted: true,
        ..base
    };
    assert!(!interrupted.should_wait());
    assert_eq!(interrupted.next_sample_count(), None);

    let complete = WaitState {
        frame_complete: true,
        samples_decoded: 9,
        ..base
    };
    assert!(!complete.should_wait());
    assert_eq!(complete.next_sample_count(), None);

    let stopped_behind = WaitState {
        capture: CaptureState::Stopped,
        ..base
    };
    assert_eq!(stopped_behind.next_sample_count(), Some(9));
}

#[test]
fn test_wait_for_data_wakes_on_frame_end() {
    let shared = Arc::new(Shared::new(Arc::new(CaptureStateCell::new(CaptureState::Running))));
    {
        let mut input = lock(&shared.input);
        input.sample_count = 5;
    }

    let waiter = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || shared.wait_for_data(5))
    };

    thread::sleep(Duration::from_millis(20));
    assert!(!waiter.is_finished());

    lock(&shared.input).frame_complete = true;
    shared.input_cond.notify_one();

    assert_eq!(waiter.join().unwrap(), None);
}

#[test]
fn test_interrupt_wakes_waiter() {
    let shared = Arc::new(Shared::new(Arc::new(CaptureStateCell::new(CaptureState::Running))));

    let waiter = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || shared.wait_for_data(0))
    };

    thread::sleep(Duration::from_millis(20));
    shared.interrupt();

    assert_eq!(waiter.join().unwrap(), None);
}

#[test]
#[should_panic(expected = "out of range")]
fn test_remove_out_of_range() {
    let engine = MockEngine::new();
    let mut stack = stack_for(stopped(), &engine).with_decoder(Decoder::new(plain_info()));
    stack.remove(1);
}

#[test]
fn test_remove_decoder() {
    let engine = MockEngine::new();
    let mut stack = stack_for(stopped(), &engine)
        .with_decoder(Decoder::new(spi_info()))
        .with_decoder(Decoder::new(plain_info()));

    let removed = stack.remove(0);
    assert_eq!(removed.info().id, "spi");
    assert_eq!(stack.stack().len(), 1);
}

#[test]
#[should_panic(expected = "does not belong to any row")]
fn test_annotation_from_unknown_decoder() {
    let shared = Shared::new(stopped());
    shared.on_annotation(proto("uart", 0, 1, 0));
}

#[test]
fn test_native_spi_decode() {
    use crate::runtime::native::NativeEngine;

    // clk on bit 0, mosi on bit 1, mode 0, two samples per clock phase
    let mut units = vec![0u8, 0];
    for word in [0xA5u8, 0x0F] {
        for i in (0..8).rev() {
            let mosi = ((word >> i) & 1) << 1;
            units.extend([mosi, mosi, mosi | 1, mosi | 1]);
        }
    }
    units.extend([0, 0]);

    let segment = Arc::new(LogicSegment::from_data(1, 1_000_000.0, units).unwrap());
    let logic = Arc::new(Logic::new(2));
    logic.push_segment(segment);

    let engine = NativeEngine::with_builtin_decoders();
    let info = engine.decoder_info("spi").unwrap();
    let stack = DecoderStack::new(stopped(), Arc::new(engine))
        .with_engine_lock(EngineLock::new())
        .with_config(DecodeConfig::new().with_chunk_bytes(5))
        .with_decoder(
            Decoder::new(info)
                .with_channel("clk", LogicSignal::new("CLK", 0, Arc::clone(&logic)))
                .with_channel("mosi", LogicSignal::new("MOSI", 1, logic)),
        );

    stack.begin_decode();
    stack.wait();

    assert_eq!(stack.error_message(), "");
    assert_eq!(stack.samples_decoded(), 68);
    assert_eq!(stack.samplerate(), 1_000_000.0);

    let rows = stack.get_visible_rows();
    let titles: Vec<_> = rows.iter().map(Row::title).collect();
    assert_eq!(titles, vec!["SPI: MOSI data", "SPI: MISO data", "SPI: Warnings"]);

    let words: Vec<_> = stack
        .get_annotation_subset(&rows[0], 0, 68)
        .iter()
        .map(|a| (a.start_sample(), a.end_sample(), a.texts()[0].clone()))
        .collect();
    assert_eq!(
        words,
        vec![(4, 33, "A5".to_string()), (36, 65, "0F".to_string())]
    );
    assert!(stack.get_annotation_subset(&rows[1], 0, 68).is_empty());
}

#[test]
fn test_native_engine_rejects_bad_options() {
    use crate::runtime::native::NativeEngine;

    let (logic, _) = logic_with(8, 1.0);
    let engine = NativeEngine::with_builtin_decoders();
    let info = engine.decoder_info("spi").unwrap();
    let stack = DecoderStack::new(stopped(), Arc::new(engine))
        .with_engine_lock(EngineLock::new())
        .with_decoder(
            Decoder::new(info)
                .with_channel("clk", LogicSignal::new("CLK", 0, Arc::clone(&logic)))
                .with_channel("mosi", LogicSignal::new("MOSI", 1, logic))
                .with_option("wordsize", 64i64),
        );

    stack.begin_decode();
    stack.wait();

    assert!(stack.error_message().starts_with("Failed to create decoder instance"));
    assert!(stack.error_message().contains("wordsize"));
}
