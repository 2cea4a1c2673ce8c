// SensorBridge Gateway - Basic Example
//
// This example feeds hand-built UART frames through a gateway and prints
// what the pipeline makes of them.

use sensorbridge::{Frame, MemorySerialPort, UartReader, UartSettings};
use sensorbridge_gateway::{Gateway, GatewayConfig, Preset};
use std::thread;
use std::time::{Duration, Instant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== SensorBridge Gateway Basic Example ===\n");

    // Home preset: alerts below 15 C and above 30 C
    let config = GatewayConfig::preset(Preset::Home, "example_gateway");
    println!(
        "Gateway {} with thresholds {:.1}..{:.1} C",
        config.gateway_id, config.temp_alert_low, config.temp_alert_high
    );

    let port = MemorySerialPort::new();
    let mut gateway = Gateway::new(config)?;
    gateway.add_reader(UartReader::with_settings(
        port.clone(),
        UartSettings {
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        },
    ))?;

    gateway.on_mqtt(|topic, payload| {
        println!("  MQTT  {} {}", topic, payload);
        Ok(())
    });
    gateway.on_alert(|category, text, _alert| {
        println!("  ALERT [{}] {}", category, text);
    });

    gateway.initialize()?;
    gateway.start()?;

    println!("\n--- Sending frames ---");
    let temperatures = [21.0, 22.5, 33.0, 12.0, 22.0, 22.4, 22.9, 23.5];
    for (i, t) in temperatures.iter().enumerate() {
        let mut bytes = Frame::new(7, *t, 48.0, 3.3).to_bytes().to_vec();
        if i == 4 {
            // Corrupted checksum; the decoder drops this frame
            bytes[13] ^= 0xFF;
        }
        port.push_bytes(&bytes);
    }

    let deadline = Instant::now() + Duration::from_secs(2);
    while gateway.status().processed < 7 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }

    println!("\n--- Statistics ---");
    for (sensor_id, stats) in gateway.all_statistics() {
        println!(
            "  {}: {} valid, min {:.2} C, max {:.2} C, avg {:.2} C",
            sensor_id,
            stats.valid_packets,
            stats.min_temperature,
            stats.max_temperature,
            stats.avg_temperature
        );
    }

    println!("\n--- Edge analytics ---");
    for result in gateway.recent_edge_results(3) {
        println!(
            "  {} slope {:.3} C/reading {:?}",
            result.sensor_id,
            result.slope().unwrap_or_default(),
            result.alerts
        );
    }

    println!("\n--- Manual aggregation ---");
    let sent = gateway.trigger_aggregation();
    println!("  {} aggregate(s) forwarded", sent);

    gateway.stop();
    println!("\n{}", gateway.status().summary());
    println!("\n=== Example completed successfully ===");
    Ok(())
}
