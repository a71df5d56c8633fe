use crate::errors::{Error, Result};
use crate::model::SensorPayload;

const HUMIDITY_MIN: f64 = 0.0;
const HUMIDITY_MAX: f64 = 100.0;

/// Validates a sensor payload before it becomes a reading
pub fn validate(payload: &SensorPayload) -> Result<()> {
    let fields = [
        ("Temperature", payload.temperature),
        ("Pressure", payload.pressure),
        ("Gas", payload.gas),
        ("Humidity", payload.humidity),
    ];
    for (name, value) in fields {
        if !value.is_finite() {
            return Err(Error::Validation(format!("{} is not a finite number", name)));
        }
    }

    if let Some(dp) = payload.dew_point {
        if !dp.is_finite() {
            return Err(Error::Validation("DewPoint is not a finite number".to_string()));
        }
    }

    // Validate humidity
    if payload.humidity < HUMIDITY_MIN || payload.humidity > HUMIDITY_MAX {
        return Err(Error::Validation(format!(
            "Humidity {} out of range [{}, {}]",
            payload.humidity, HUMIDITY_MIN, HUMIDITY_MAX
        )));
    }

    if payload.pressure < 0.0 {
        return Err(Error::Validation(format!(
            "Pressure {} is negative",
            payload.pressure
        )));
    }

    if payload.gas < 0.0 {
        return Err(Error::Validation(format!("Gas {} is negative", payload.gas)));
    }

    Ok(())
}
