use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Format used for the `Timestamp` column.
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// One timestamped set of sensor measurements, as stored in the CSV
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Reading {
    pub timestamp: String,
    pub temperature: f64,
    pub pressure: f64,
    pub gas: f64,
    pub humidity: f64,
    pub dew_point: Option<f64>,
}

impl Reading {
    /// Stamps a payload with the given capture time.
    /// Any clock the device may report is ignored.
    pub fn from_payload(payload: SensorPayload, captured_at: DateTime<Local>) -> Self {
        let dew_point = payload
            .dew_point
            .or_else(|| dew_point(payload.temperature, payload.humidity));

        Self {
            timestamp: captured_at.format(TIMESTAMP_FORMAT).to_string(),
            temperature: payload.temperature,
            pressure: payload.pressure,
            gas: payload.gas,
            humidity: payload.humidity,
            dew_point,
        }
    }

    pub fn value(&self, quantity: Quantity) -> f64 {
        match quantity {
            Quantity::Temperature => self.temperature,
            Quantity::Pressure => self.pressure,
            Quantity::Gas => self.gas,
            Quantity::Humidity => self.humidity,
        }
    }
}

/// JSON body served by the sensor device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SensorPayload {
    pub temperature: f64,
    pub pressure: f64,
    pub gas: f64,
    pub humidity: f64,
    #[serde(default)]
    pub dew_point: Option<f64>,
}

/// Quantity plotted on the chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quantity {
    #[default]
    Temperature,
    Pressure,
    Gas,
    Humidity,
}

impl Quantity {
    pub const ALL: [Quantity; 4] = [
        Quantity::Temperature,
        Quantity::Pressure,
        Quantity::Gas,
        Quantity::Humidity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Quantity::Temperature => "Temperature",
            Quantity::Pressure => "Pressure",
            Quantity::Gas => "Gas",
            Quantity::Humidity => "Humidity",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Quantity::Temperature => "°C",
            Quantity::Pressure => "hPa",
            Quantity::Gas => "ppm",
            Quantity::Humidity => "%",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Magnus approximation, valid roughly from -45 °C to 60 °C.
/// Undefined at zero humidity.
pub fn dew_point(temperature: f64, humidity: f64) -> Option<f64> {
    const A: f64 = 17.62;
    const B: f64 = 243.12;

    if humidity <= 0.0 {
        return None;
    }
    let gamma = (humidity / 100.0).ln() + (A * temperature) / (B + temperature);
    Some(B * gamma / (A - gamma))
}

/// REST API response wrapper
#[derive(Debug, Serialize)]
pub struct ReadingsResponse {
    pub data: Vec<Reading>,
    pub total: usize,
    pub latest: Option<Reading>,
    pub last_error: Option<String>,
    pub last_poll: Option<String>,
}
