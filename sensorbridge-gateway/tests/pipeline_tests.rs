// SensorBridge Gateway - Integration Tests
//
// End-to-end tests running real transport readers against in-memory and
// simulated devices. The tests are organized into categories:
// 1. Lifecycle
// 2. UART end-to-end
// 3. SPI and I2C end-to-end
// 4. Backpressure and sinks
// 5. Queries

use parking_lot::Mutex;
use sensorbridge::{
    Frame, I2cReader, I2cSettings, Interface, MemorySerialPort, Reading, SpiReader, SpiSettings,
    UartReader, UartSettings,
};
use sensorbridge_gateway::{
    AlertKind, Gateway, GatewayConfig, GatewayError, GatewayState, Pipeline, QueueEntry,
    ALERT_CATEGORY,
};
use sensorbridge_testdata::{
    Fault, FaultConfig, FrameGenerator, NodeProfile, SimulatedI2cBus, SimulatedSerialPort,
    SimulatedSpiBus,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn fast_uart() -> UartSettings {
    UartSettings {
        poll_interval: Duration::from_millis(1),
        ..Default::default()
    }
}

fn alert_sink(gateway: &Gateway) -> Arc<Mutex<Vec<(String, String, AlertKind)>>> {
    let alerts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&alerts);
    gateway.on_alert(move |category, text, alert| {
        sink.lock()
            .push((category.to_string(), text.to_string(), alert.kind));
    });
    alerts
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[test]
fn test_start_before_initialize_rejected() {
    let mut gateway = Gateway::new(GatewayConfig::default()).unwrap();
    assert!(matches!(gateway.start(), Err(GatewayError::NotInitialized)));
    assert_eq!(gateway.state(), GatewayState::Created);
}

#[test]
fn test_stop_is_idempotent_and_stops_readers() {
    let port = MemorySerialPort::new();
    let mut gateway = Gateway::new(GatewayConfig::default()).unwrap();
    gateway
        .add_reader(UartReader::with_settings(port, fast_uart()))
        .unwrap();
    gateway.initialize().unwrap();
    gateway.start().unwrap();
    assert!(gateway.status().interfaces[0].active);

    gateway.stop();
    gateway.stop();
    assert_eq!(gateway.state(), GatewayState::Stopped);
    let status = gateway.status();
    assert_eq!(status.state, GatewayState::Stopped);
    assert!(!status.interfaces[0].active);
}

#[test]
fn test_stop_without_start() {
    let mut gateway = Gateway::new(GatewayConfig::default()).unwrap();
    gateway.initialize().unwrap();
    gateway.stop();
    assert_eq!(gateway.state(), GatewayState::Stopped);
}

// ============================================================================
// UART End-to-End Tests
// ============================================================================

#[test]
fn test_uart_threshold_alerts_end_to_end() {
    let port = MemorySerialPort::new();
    let config = GatewayConfig {
        temp_alert_low: 18.0,
        temp_alert_high: 28.0,
        worker_thread_count: 1,
        ..Default::default()
    };
    let mut gateway = Gateway::new(config).unwrap();
    gateway
        .add_reader(UartReader::with_settings(port.clone(), fast_uart()))
        .unwrap();
    let alerts = alert_sink(&gateway);
    gateway.initialize().unwrap();
    gateway.start().unwrap();

    for t in [15.0, 31.0, 22.0] {
        port.push_bytes(&Frame::new(1, t, 50.0, 3.3).to_bytes());
    }
    assert!(wait_for(Duration::from_secs(5), || {
        gateway.status().processed == 3
    }));
    gateway.stop();

    let alerts = alerts.lock();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].0, ALERT_CATEGORY);
    assert_eq!(alerts[0].1, "sensor_1: Temperature too low: 15.00°C");
    assert_eq!(alerts[0].2, AlertKind::TemperatureLow);
    assert_eq!(alerts[1].2, AlertKind::TemperatureHigh);

    let stats = gateway.sensor_statistics("sensor_1").unwrap();
    assert_eq!(stats.valid_packets, 3);
    assert_eq!(stats.min_temperature, 15.0);
    assert_eq!(stats.max_temperature, 31.0);
}

#[test]
fn test_uart_simulated_stream_with_faults() {
    let generator = FrameGenerator::new(17)
        .with_node(NodeProfile::indoor(101))
        .with_node(
            NodeProfile::indoor(102)
                .with_fault(FaultConfig::new(Fault::CorruptChecksum, 10).with_duration(5))
                .with_fault(FaultConfig::new(Fault::SpuriousSync, 0))
                .with_fault(
                    FaultConfig::new(Fault::OutOfRangeTemperature { celsius: 140.0 }, 20)
                        .with_duration(3),
                ),
        );
    let port = SimulatedSerialPort::new(generator).with_frame_limit(100);

    let mut gateway = Gateway::new(GatewayConfig::default()).unwrap();
    gateway
        .add_reader(UartReader::with_settings(port.clone(), fast_uart()))
        .unwrap();
    gateway.initialize().unwrap();
    gateway.start().unwrap();

    assert!(wait_for(Duration::from_secs(10), || {
        port.is_exhausted() && gateway.status().processed == 95
    }));
    gateway.stop();

    let status = gateway.status();
    assert_eq!(status.interfaces[0].checksum_failures, 5);
    assert_eq!(status.interfaces[0].invalid, 3);
    assert_eq!(status.invalid, 3);

    let healthy = gateway.sensor_statistics("sensor_101").unwrap();
    assert_eq!(healthy.total_packets, 50);
    assert_eq!(healthy.error_packets, 0);

    let faulty = gateway.sensor_statistics("sensor_102").unwrap();
    assert_eq!(faulty.total_packets, 45);
    assert_eq!(faulty.error_packets, 3);
    assert_eq!(faulty.valid_packets, 42);
}

#[test]
fn test_rising_trend_reaches_edge_results() {
    let generator = FrameGenerator::new(1).with_node(NodeProfile::heating(7, 20.0, 0.8));
    let port = SimulatedSerialPort::new(generator).with_frame_limit(10);

    let mut gateway = Gateway::new(GatewayConfig {
        worker_thread_count: 1,
        temp_alert_high: 40.0,
        ..Default::default()
    })
    .unwrap();
    gateway
        .add_reader(UartReader::with_settings(port, fast_uart()))
        .unwrap();
    gateway.initialize().unwrap();
    gateway.start().unwrap();

    assert!(wait_for(Duration::from_secs(5), || {
        gateway.status().processed == 10
    }));
    gateway.stop();

    let results = gateway.recent_edge_results(10);
    assert_eq!(results.len(), 6);
    let last = results.last().unwrap();
    assert_eq!(last.sensor_id, "sensor_7");
    assert!((last.slope().unwrap() - 0.8).abs() < 1e-6);
    assert_eq!(last.alerts, vec!["Rising temperature trend detected"]);
}

// ============================================================================
// SPI and I2C End-to-End Tests
// ============================================================================

#[test]
fn test_spi_and_i2c_readers_feed_one_pipeline() {
    let spi = SimulatedSpiBus::new(FrameGenerator::new(3).with_node(NodeProfile::new(4242)))
        .with_frame_limit(4);
    let i2c = SimulatedI2cBus::new(1, 3)
        .with_device(0x76, NodeProfile::new(0))
        .with_device(0x44, NodeProfile::new(0));

    let mut gateway = Gateway::new(GatewayConfig::default()).unwrap();
    gateway
        .add_reader(SpiReader::with_settings(
            spi,
            SpiSettings {
                poll_interval: Duration::from_millis(2),
                ..Default::default()
            },
        ))
        .unwrap();
    gateway
        .add_reader(I2cReader::with_settings(
            i2c.clone(),
            I2cSettings {
                addresses: vec![0x76, 0x44],
                poll_interval: Duration::from_millis(2),
            },
        ))
        .unwrap();
    gateway.initialize().unwrap();
    gateway.start().unwrap();

    assert!(wait_for(Duration::from_secs(5), || {
        let stats = gateway.all_statistics();
        stats.get("spi_sensor_4242").map_or(0, |s| s.valid_packets) == 4
            && stats.get("i2c_118").map_or(0, |s| s.valid_packets) >= 2
            && stats.get("i2c_68").map_or(0, |s| s.valid_packets) >= 2
    }));
    gateway.stop();

    let status = gateway.status();
    let names: Vec<&str> = status.interfaces.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["SPI", "I2C"]);
    assert!(i2c.reads(0x76) >= 2);
}

// ============================================================================
// Backpressure and Sink Tests
// ============================================================================

#[test]
fn test_queue_overflow_drops_newest() {
    let pipeline = Pipeline::new(&GatewayConfig {
        max_queue_size: 5,
        ..Default::default()
    });
    for i in 0..8 {
        let reading = Reading::new(format!("s{}", i), Interface::Uart, 20.0, 40.0, 3.3);
        pipeline.ingest(reading);
    }
    let stats = pipeline.queue.stats();
    assert_eq!(stats.depth, 5);
    assert_eq!(stats.dropped, 3);

    let first: Vec<QueueEntry> = (0..5).filter_map(|_| pipeline.queue.pop()).collect();
    let ids: Vec<&str> = first.iter().map(|e| e.sensor_id()).collect();
    assert_eq!(ids, vec!["s0", "s1", "s2", "s3", "s4"]);
}

#[test]
fn test_mqtt_and_websocket_payloads() {
    let mut gateway = Gateway::new(GatewayConfig {
        gateway_id: "gw-lab".to_string(),
        mqtt_base_topic: "lab".to_string(),
        ..Default::default()
    })
    .unwrap();
    let published = Arc::new(Mutex::new(Vec::new()));
    let pushed = Arc::new(Mutex::new(Vec::new()));
    {
        let published = Arc::clone(&published);
        gateway.on_mqtt(move |topic, payload| {
            published.lock().push((topic.to_string(), payload.to_string()));
            Ok(())
        });
        let pushed = Arc::clone(&pushed);
        gateway.on_websocket(move |payload| {
            pushed.lock().push(payload.to_string());
            Ok(())
        });
    }
    gateway.initialize().unwrap();
    gateway.start().unwrap();

    assert!(gateway.ingest(Reading::new("sensor_5", Interface::Uart, 21.0, 40.0, 3.3)));
    // Aggregates must not interleave with the live reading on either sink
    assert!(wait_for(Duration::from_secs(5), || {
        published.lock().len() == 1 && pushed.lock().len() == 1
    }));
    assert_eq!(gateway.trigger_aggregation(), 1);
    gateway.stop();

    let published = published.lock();
    assert_eq!(published[0].0, "lab/sensors/sensor_5/data");
    let reading: serde_json::Value = serde_json::from_str(&published[0].1).unwrap();
    assert_eq!(reading["gateway_id"], "gw-lab");
    assert_eq!(reading["interface"], "UART");

    assert_eq!(published[1].0, "lab/sensors/sensor_5/aggregated");
    let aggregate: serde_json::Value = serde_json::from_str(&published[1].1).unwrap();
    assert_eq!(aggregate["type"], "aggregated_data");
    assert_eq!(aggregate["sample_count"], 1);

    let pushed = pushed.lock();
    let ws: serde_json::Value = serde_json::from_str(&pushed[0]).unwrap();
    assert_eq!(ws["type"], "sensor_data");
    assert_eq!(pushed.len(), 2);
}

#[test]
fn test_thermal_callback_sees_valid_readings() {
    let mut gateway = Gateway::new(GatewayConfig::default()).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        gateway.on_thermal(move |id, temperature, _humidity| {
            seen.lock().push((id.to_string(), temperature));
        });
    }
    gateway.initialize().unwrap();
    gateway.start().unwrap();

    gateway.ingest(Reading::new("a", Interface::Spi, 30.0, 40.0, 3.3));
    gateway.ingest(Reading::new("b", Interface::Spi, 300.0, 40.0, 3.3));
    gateway.stop();

    assert_eq!(*seen.lock(), vec![("a".to_string(), 30.0)]);
}

// ============================================================================
// Query Tests
// ============================================================================

#[test]
fn test_trigger_aggregation_and_clear() {
    let mut gateway = Gateway::new(GatewayConfig::default()).unwrap();
    gateway.initialize().unwrap();
    gateway.start().unwrap();

    for id in ["s1", "s2", "s3"] {
        gateway.ingest(Reading::new(id, Interface::Uart, 22.0, 40.0, 3.3));
    }
    assert!(wait_for(Duration::from_secs(5), || {
        gateway.status().processed == 3
    }));
    assert_eq!(gateway.trigger_aggregation(), 3);
    assert_eq!(gateway.status().aggregates_sent, 3);

    gateway.clear_sensors();
    assert!(gateway.all_statistics().is_empty());
    assert_eq!(gateway.trigger_aggregation(), 0);
    gateway.stop();
}

#[test]
fn test_handle_queries_from_another_thread() {
    let mut gateway = Gateway::new(GatewayConfig::with_gateway_id("gw-remote")).unwrap();
    gateway.initialize().unwrap();
    gateway.start().unwrap();
    gateway.ingest(Reading::new("s1", Interface::I2c, 22.0, 40.0, 3.3));

    let handle = gateway.handle();
    let known = thread::spawn(move || {
        wait_for(Duration::from_secs(5), || handle.sensor_statistics("s1").is_some());
        (handle.status().gateway_id, handle.all_statistics().len())
    })
    .join()
    .unwrap();
    gateway.stop();

    assert_eq!(known, ("gw-remote".to_string(), 1));
}
