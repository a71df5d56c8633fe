use rand::Rng;
use serde::{Deserialize, Serialize};

/// JSON body the ESP32 sketch serves
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Telemetry {
    pub temperature: f64,
    pub pressure: f64,
    pub gas: f64,
    pub humidity: f64,
    pub dew_point: f64,
}

/// Slow random walk standing in for a BME680 on a desk
#[derive(Debug, Clone)]
pub struct Bme680 {
    temperature: f64,
    pressure: f64,
    gas: f64,
    humidity: f64,
}

impl Default for Bme680 {
    fn default() -> Self {
        Self {
            temperature: 22.0,
            pressure: 1013.25,
            gas: 120.0,
            humidity: 50.0,
        }
    }
}

impl Bme680 {
    pub fn sample(&mut self, rng: &mut impl Rng) -> Telemetry {
        self.temperature = (self.temperature + rng.gen_range(-0.3..0.3)).clamp(15.0, 35.0);
        self.pressure = (self.pressure + rng.gen_range(-0.5..0.5)).clamp(980.0, 1040.0);
        self.humidity = (self.humidity + rng.gen_range(-1.0..1.0)).clamp(20.0, 90.0);

        self.gas = if rng.gen_bool(0.02) {
            rng.gen_range(300.0..600.0) // 2% spikes
        } else {
            (self.gas + rng.gen_range(-5.0..5.0)).clamp(50.0, 250.0)
        };

        Telemetry {
            temperature: self.temperature,
            pressure: self.pressure,
            gas: self.gas,
            humidity: self.humidity,
            dew_point: dew_point(self.temperature, self.humidity),
        }
    }
}

/// Magnus approximation
fn dew_point(temperature: f64, humidity: f64) -> f64 {
    const A: f64 = 17.62;
    const B: f64 = 243.12;
    let gamma = (humidity / 100.0).ln() + (A * temperature) / (B + temperature);
    B * gamma / (A - gamma)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_walk_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut sensor = Bme680::default();

        for _ in 0..10_000 {
            let t = sensor.sample(&mut rng);
            assert!((15.0..=35.0).contains(&t.temperature));
            assert!((980.0..=1040.0).contains(&t.pressure));
            assert!((20.0..=90.0).contains(&t.humidity));
            assert!(t.gas >= 50.0 && t.gas < 600.0);
            assert!(t.dew_point <= t.temperature);
        }
    }

    #[test]
    fn test_payload_field_names() {
        let mut rng = StdRng::seed_from_u64(1);
        let json = serde_json::to_value(Bme680::default().sample(&mut rng)).unwrap();
        for key in ["Temperature", "Pressure", "Gas", "Humidity", "DewPoint"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
