//! Derived values computed from the raw sensor fields
//!
//! Each derived field is filled only when its inputs are present; otherwise
//! it is left as it was. Running the enrichment twice yields the same result.

use contracts::Measurement;

/// Magnus formula coefficients
const MAGNUS_A: f64 = 17.67;
const MAGNUS_B: f64 = 243.5;
/// Saturation vapor pressure at 0 °C (Pa)
const VAPOR_PRESSURE_ZERO: f64 = 611.2;

/// Equilibrium (saturation) vapor pressure over water, in Pa
pub fn equilibrium_vapor_pressure(temperature: f64) -> f64 {
    VAPOR_PRESSURE_ZERO * (MAGNUS_A * temperature / (MAGNUS_B + temperature)).exp()
}

/// Absolute humidity in g/m³
pub fn absolute_humidity(temperature: f64, humidity: f64) -> f64 {
    equilibrium_vapor_pressure(temperature) * humidity * 0.021674 / (273.15 + temperature)
}

/// Dew point in °C; `None` when relative humidity is not positive
pub fn dew_point(temperature: f64, humidity: f64) -> Option<f64> {
    if humidity <= 0.0 {
        return None;
    }
    let v = (humidity / 100.0 * equilibrium_vapor_pressure(temperature) / VAPOR_PRESSURE_ZERO).ln();
    Some(-MAGNUS_B * v / (v - MAGNUS_A))
}

/// Moist air density in kg/m³ (pressure in Pa)
pub fn air_density(temperature: f64, humidity: f64, pressure: f64) -> f64 {
    1.2929 * 273.15 / (temperature + 273.15)
        * (pressure - 0.3783 * humidity / 100.0 * equilibrium_vapor_pressure(temperature))
        / 101_300.0
}

/// Magnitude of the acceleration vector
pub fn acceleration_total(x: f64, y: f64, z: f64) -> f64 {
    (x * x + y * y + z * z).sqrt()
}

/// Angle between the acceleration vector and one axis, in degrees
pub fn acceleration_angle(axis: f64, total: f64) -> Option<f64> {
    if total == 0.0 {
        return None;
    }
    Some((axis / total).clamp(-1.0, 1.0).acos().to_degrees())
}

/// Fill every derived field that can be computed from the raw fields
pub fn calculate_extended_values(m: &mut Measurement) {
    if let (Some(x), Some(y), Some(z)) = (m.acceleration_x, m.acceleration_y, m.acceleration_z) {
        let total = acceleration_total(x, y, z);
        m.acceleration_total = Some(total);
        if let Some(angle) = acceleration_angle(x, total) {
            m.acceleration_angle_from_x = Some(angle);
        }
        if let Some(angle) = acceleration_angle(y, total) {
            m.acceleration_angle_from_y = Some(angle);
        }
        if let Some(angle) = acceleration_angle(z, total) {
            m.acceleration_angle_from_z = Some(angle);
        }
    }

    let Some(t) = m.temperature else {
        return;
    };
    m.equilibrium_vapor_pressure = Some(equilibrium_vapor_pressure(t));

    let Some(h) = m.humidity else {
        return;
    };
    m.absolute_humidity = Some(absolute_humidity(t, h));
    if let Some(dew) = dew_point(t, h) {
        m.dew_point = Some(dew);
    }

    if let Some(p) = m.pressure {
        m.air_density = Some(air_density(t, h, p));
    }
}
