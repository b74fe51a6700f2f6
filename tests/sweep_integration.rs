//! End-to-end sweep scenarios over the simulated endpoints.
//!
//! These cover the whole loop the bench procedure relies on: the reference
//! ladder, retry recovery and exhaustion, cancellation, and the safe
//! shutdown sequence on every exit path.

#[cfg(feature = "storage_csv")]
use inverter_cal::data::CsvExporter;
use inverter_cal::hardware::mock::{MockSensor, MockSupply};
use inverter_cal::sweep::{AbortReason, SweepController, SweepMode, SweepSettings, SweepState};
use std::sync::Arc;
use std::time::Duration;

/// Sweep settings with millisecond pacing so scenarios run fast.
fn fast_settings(mode: SweepMode, start: f64, increment: f64, limit: f64) -> SweepSettings {
    SweepSettings {
        mode,
        start_value: start,
        increment,
        limit,
        stabilizing_constant: 0.2,
        max_retry_attempts: 3,
        settle_delay: Duration::from_millis(1),
        thermal_delay: Duration::from_millis(1),
        ..SweepSettings::default()
    }
}

#[tokio::test]
async fn ramp_sweep_records_reference_ladder_and_shuts_down() {
    let supply = Arc::new(MockSupply::new());
    let sensor = Arc::new(MockSensor::new(3));
    let (mut controller, _handle) = SweepController::new(
        supply.clone(),
        sensor.clone(),
        fast_settings(SweepMode::RampUp, 0.0, 1.0, 3.0),
    );

    let report = controller.run().await.unwrap();

    assert_eq!(report.state, SweepState::Complete);
    assert_eq!(report.steps_completed, 4);
    assert!(report.abort_reason.is_none());

    let references: Vec<f64> = controller
        .samples()
        .voltage_samples()
        .iter()
        .map(|s| s.reference)
        .collect();
    assert_eq!(references, vec![0.0, 1.0, 2.0, 3.0]);
    for sample in controller.samples().voltage_samples() {
        assert_eq!(sample.measured.len(), 3);
    }

    // Output enabled once for the whole run, disabled once on shutdown.
    assert_eq!(supply.relay_toggle_count(), 2);
    assert!(!supply.is_output_on().await);
    assert!(!supply.is_open().await);
    assert_eq!(supply.commanded_voltage().await, 0.0);

    let commands = supply.issued_commands().await;
    assert_eq!(
        &commands[commands.len() - 4..],
        &["VOLT 0", "CURR 0", "OUTP OFF", "CLOSE"]
    );
}

#[tokio::test]
async fn empty_sequence_completes_without_touching_the_output() {
    let supply = Arc::new(MockSupply::new());
    let sensor = Arc::new(MockSensor::new(2));
    let (mut controller, _handle) = SweepController::new(
        supply.clone(),
        sensor.clone(),
        fast_settings(SweepMode::RampUp, 5.0, 1.0, 0.0),
    );

    let report = controller.run().await.unwrap();

    assert_eq!(report.state, SweepState::Complete);
    assert_eq!(report.steps_completed, 0);
    assert_eq!(controller.samples().voltage_row_count(), 0);
    assert_eq!(sensor.fetch_count(), 0);

    // No step ever enabled the output, so shutdown found it already off.
    assert_eq!(supply.relay_toggle_count(), 0);
    let commands = supply.issued_commands().await;
    assert_eq!(&commands[..], &["VOLT 0", "CURR 0", "CLOSE"]);
}

#[tokio::test]
async fn sensor_failure_aborts_and_keeps_recorded_samples() {
    let supply = Arc::new(MockSupply::new());
    let sensor = Arc::new(MockSensor::new(3));
    sensor.fail_from_fetch(2);

    let (mut controller, _handle) = SweepController::new(
        supply.clone(),
        sensor.clone(),
        fast_settings(SweepMode::RampUp, 0.0, 1.0, 3.0),
    );

    let report = controller.run().await.unwrap();

    assert_eq!(report.state, SweepState::Aborted);
    assert_eq!(report.steps_completed, 2);
    assert!(matches!(
        report.abort_reason,
        Some(AbortReason::RetriesExhausted {
            ref operation,
            attempts: 3,
            ..
        }) if operation == "calibration step"
    ));

    // Both successful steps survive the abort.
    let references: Vec<f64> = controller
        .samples()
        .voltage_samples()
        .iter()
        .map(|s| s.reference)
        .collect();
    assert_eq!(references, vec![0.0, 1.0]);

    // Two good fetches plus three failed attempts on the third step.
    assert_eq!(sensor.fetch_count(), 5);

    // The supply was still made safe.
    assert!(!supply.is_output_on().await);
    assert!(!supply.is_open().await);
    let commands = supply.issued_commands().await;
    assert_eq!(commands.last().map(String::as_str), Some("CLOSE"));
}

#[tokio::test]
async fn flaky_sensor_recovers_within_retry_budget() {
    let supply = Arc::new(MockSupply::new());
    let sensor = Arc::new(MockSensor::new(2));
    sensor.fail_next_fetches(2);

    let (mut controller, _handle) = SweepController::new(
        supply.clone(),
        sensor.clone(),
        fast_settings(SweepMode::RampUp, 0.0, 1.0, 3.0),
    );

    let report = controller.run().await.unwrap();

    assert_eq!(report.state, SweepState::Complete);
    assert_eq!(report.steps_completed, 4);

    // First step burned two failed attempts before its success.
    assert_eq!(sensor.fetch_count(), 6);
}

#[tokio::test]
async fn supply_connect_retries_then_recovers() {
    let supply = Arc::new(MockSupply::new());
    supply.fail_next_opens(2);
    let sensor = Arc::new(MockSensor::new(1));

    let (mut controller, _handle) = SweepController::new(
        supply.clone(),
        sensor.clone(),
        fast_settings(SweepMode::RampUp, 0.0, 1.0, 1.0),
    );

    let report = controller.run().await.unwrap();
    assert_eq!(report.state, SweepState::Complete);
    assert_eq!(report.steps_completed, 2);
}

#[tokio::test]
async fn supply_connect_exhaustion_aborts_before_any_step() {
    let supply = Arc::new(MockSupply::new());
    supply.fail_next_opens(3);
    let sensor = Arc::new(MockSensor::new(1));

    let (mut controller, _handle) = SweepController::new(
        supply.clone(),
        sensor.clone(),
        fast_settings(SweepMode::RampUp, 0.0, 1.0, 1.0),
    );

    let report = controller.run().await.unwrap();

    assert_eq!(report.state, SweepState::Aborted);
    assert_eq!(report.steps_completed, 0);
    assert!(matches!(
        report.abort_reason,
        Some(AbortReason::RetriesExhausted {
            ref operation,
            attempts: 3,
            ..
        }) if operation == "supply connect"
    ));
    assert_eq!(controller.samples().voltage_row_count(), 0);
    assert_eq!(sensor.fetch_count(), 0);
}

#[tokio::test]
async fn cancelled_triangle_stops_between_steps_and_shuts_down() {
    let supply = Arc::new(MockSupply::new());
    let sensor = Arc::new(MockSensor::new(2));
    let (mut controller, handle) = SweepController::new(
        supply.clone(),
        sensor.clone(),
        fast_settings(SweepMode::Triangle, 0.0, 1.0, 2.0),
    );

    let task = tokio::spawn(async move {
        let report = controller.run().await;
        (report, controller)
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();

    let (report, controller) = task.await.unwrap();
    let report = report.unwrap();

    assert_eq!(report.state, SweepState::Aborted);
    assert_eq!(report.abort_reason, Some(AbortReason::Cancelled));
    assert!(report.steps_completed > 0);
    assert_eq!(
        controller.samples().voltage_row_count() as u64,
        report.steps_completed
    );

    // A cancelled wave still leaves the bench safe.
    assert!(!supply.is_output_on().await);
    assert!(!supply.is_open().await);

    // Every recorded reference stayed inside the wave's band.
    for sample in controller.samples().voltage_samples() {
        assert!((0.0..=2.0).contains(&sample.reference));
    }
}

#[tokio::test]
async fn mapped_sweep_fills_the_current_table() {
    let supply = Arc::new(MockSupply::new());
    let sensor = Arc::new(MockSensor::with_level(2, 5.0));
    let (mut controller, _handle) = SweepController::new(
        supply.clone(),
        sensor.clone(),
        SweepSettings {
            stabilizing_constant: 10.0,
            ..fast_settings(SweepMode::Mapped, 0.0, 0.5, 10.0)
        },
    );

    let report = controller.run().await.unwrap();

    assert_eq!(report.state, SweepState::Complete);
    assert_eq!(report.steps_completed, 21);
    assert_eq!(controller.samples().current_row_count(), 21);
    assert_eq!(controller.samples().voltage_row_count(), 0);

    // References are the desired currents, not the mapped voltages.
    let last = controller.samples().current_samples().last().unwrap();
    assert_eq!(last.reference, 10.0);

    // The final mapped setpoint was zeroed by shutdown, so check the log:
    // the last pre-shutdown voltage command carries the 100/27 mapping.
    let commands = supply.issued_commands().await;
    assert!(commands.contains(&"VOLT 37.037".to_string()));
    assert_eq!(supply.commanded_current().await, 0.0);
}

#[cfg(feature = "storage_csv")]
#[tokio::test]
async fn exported_tables_carry_channel_headers() {
    let supply = Arc::new(MockSupply::new());
    let sensor = Arc::new(MockSensor::new(3));
    let (mut controller, _handle) = SweepController::new(
        supply.clone(),
        sensor.clone(),
        fast_settings(SweepMode::RampUp, 0.0, 1.0, 3.0),
    );
    controller.run().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let exporter = CsvExporter::new(dir.path());
    let (voltages_path, _) = exporter.export(controller.samples(), 3).unwrap();

    let content = std::fs::read_to_string(voltages_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(
        lines[0],
        "PSU Reference Voltage,Inverter 1 Voltage(V),Inverter 2 Voltage(V),Inverter 3 Voltage(V)"
    );
    assert_eq!(lines.len(), 5);
    assert!(lines[1].starts_with("0,"));
    assert!(lines[4].starts_with("3,"));
}
