//! Measurement - one sensor observation
//!
//! Produced by sources, enriched and named by the processor, cloned once per sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DeviceId;

/// One timestamped observation from a single device.
///
/// Every numeric field is optional; which ones are present depends on the
/// source and the sensor's data format. Absent fields are omitted from the
/// JSON encoding, so a serialized measurement contains exactly the populated
/// fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    /// Hardware address of the sensor
    pub mac: DeviceId,

    /// Observation time (unix seconds on the wire)
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,

    /// Display name from the configured tag-name table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_format: Option<u8>,

    // ===== Raw fields =====
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration_z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_voltage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_power: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement_counter: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_sequence_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm1p0: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm2p5: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm4p0: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm10p0: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voc_index: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nox_index: Option<f64>,

    // ===== Derived fields (processor enrichment) =====
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dew_point: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equilibrium_vapor_pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_density: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration_angle_from_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration_angle_from_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration_angle_from_z: Option<f64>,
}

impl Measurement {
    /// Create an empty measurement for a device
    pub fn new(mac: impl Into<DeviceId>, timestamp: DateTime<Utc>) -> Self {
        Self {
            mac: mac.into(),
            timestamp,
            ..Default::default()
        }
    }

    /// Value of a numeric field, if present
    pub fn value(&self, field: MeasurementField) -> Option<f64> {
        use MeasurementField as F;
        match field {
            F::Temperature => self.temperature,
            F::Humidity => self.humidity,
            F::Pressure => self.pressure,
            F::AccelerationX => self.acceleration_x,
            F::AccelerationY => self.acceleration_y,
            F::AccelerationZ => self.acceleration_z,
            F::BatteryVoltage => self.battery_voltage,
            F::TxPower => self.tx_power.map(f64::from),
            F::Rssi => self.rssi.map(f64::from),
            F::MovementCounter => self.movement_counter.map(f64::from),
            F::MeasurementSequenceNumber => self.measurement_sequence_number.map(f64::from),
            F::Pm1p0 => self.pm1p0,
            F::Pm2p5 => self.pm2p5,
            F::Pm4p0 => self.pm4p0,
            F::Pm10p0 => self.pm10p0,
            F::Co2 => self.co2,
            F::VocIndex => self.voc_index,
            F::NoxIndex => self.nox_index,
            F::AccelerationTotal => self.acceleration_total,
            F::AbsoluteHumidity => self.absolute_humidity,
            F::DewPoint => self.dew_point,
            F::EquilibriumVaporPressure => self.equilibrium_vapor_pressure,
            F::AirDensity => self.air_density,
            F::AccelerationAngleFromX => self.acceleration_angle_from_x,
            F::AccelerationAngleFromY => self.acceleration_angle_from_y,
            F::AccelerationAngleFromZ => self.acceleration_angle_from_z,
        }
    }

    /// Populated numeric fields, in declaration order
    pub fn fields(&self) -> Vec<(MeasurementField, f64)> {
        MeasurementField::ALL
            .iter()
            .filter_map(|field| self.value(*field).map(|v| (*field, v)))
            .collect()
    }
}

/// Numeric measurement field with its presentation metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementField {
    Temperature,
    Humidity,
    Pressure,
    AccelerationX,
    AccelerationY,
    AccelerationZ,
    BatteryVoltage,
    TxPower,
    Rssi,
    MovementCounter,
    MeasurementSequenceNumber,
    Pm1p0,
    Pm2p5,
    Pm4p0,
    Pm10p0,
    Co2,
    VocIndex,
    NoxIndex,
    AccelerationTotal,
    AbsoluteHumidity,
    DewPoint,
    EquilibriumVaporPressure,
    AirDensity,
    AccelerationAngleFromX,
    AccelerationAngleFromY,
    AccelerationAngleFromZ,
}

impl MeasurementField {
    pub const ALL: [MeasurementField; 26] = [
        Self::Temperature,
        Self::Humidity,
        Self::Pressure,
        Self::AccelerationX,
        Self::AccelerationY,
        Self::AccelerationZ,
        Self::BatteryVoltage,
        Self::TxPower,
        Self::Rssi,
        Self::MovementCounter,
        Self::MeasurementSequenceNumber,
        Self::Pm1p0,
        Self::Pm2p5,
        Self::Pm4p0,
        Self::Pm10p0,
        Self::Co2,
        Self::VocIndex,
        Self::NoxIndex,
        Self::AccelerationTotal,
        Self::AbsoluteHumidity,
        Self::DewPoint,
        Self::EquilibriumVaporPressure,
        Self::AirDensity,
        Self::AccelerationAngleFromX,
        Self::AccelerationAngleFromY,
        Self::AccelerationAngleFromZ,
    ];

    /// JSON key of this field (matches the serde encoding of `Measurement`)
    pub fn key(self) -> &'static str {
        self.meta().0
    }

    /// Human-readable label
    pub fn label(self) -> &'static str {
        self.meta().1
    }

    /// Unit of measurement, if the field has one
    pub fn unit(self) -> Option<&'static str> {
        self.meta().2
    }

    /// Home Assistant sensor device class, if one applies
    pub fn device_class(self) -> Option<&'static str> {
        self.meta().3
    }

    /// Prometheus gauge name
    pub fn metric_name(self) -> &'static str {
        self.meta().4
    }

    fn meta(
        self,
    ) -> (
        &'static str,
        &'static str,
        Option<&'static str>,
        Option<&'static str>,
        &'static str,
    ) {
        use MeasurementField as F;
        match self {
            F::Temperature => (
                "temperature",
                "Temperature",
                Some("°C"),
                Some("temperature"),
                "ruuvi_temperature_celsius",
            ),
            F::Humidity => (
                "humidity",
                "Humidity",
                Some("%"),
                Some("humidity"),
                "ruuvi_humidity_percent",
            ),
            F::Pressure => (
                "pressure",
                "Pressure",
                Some("Pa"),
                Some("pressure"),
                "ruuvi_pressure_pascals",
            ),
            F::AccelerationX => (
                "accelerationX",
                "Acceleration X",
                Some("G"),
                None,
                "ruuvi_acceleration_x_g",
            ),
            F::AccelerationY => (
                "accelerationY",
                "Acceleration Y",
                Some("G"),
                None,
                "ruuvi_acceleration_y_g",
            ),
            F::AccelerationZ => (
                "accelerationZ",
                "Acceleration Z",
                Some("G"),
                None,
                "ruuvi_acceleration_z_g",
            ),
            F::BatteryVoltage => (
                "batteryVoltage",
                "Battery voltage",
                Some("V"),
                Some("voltage"),
                "ruuvi_battery_volts",
            ),
            F::TxPower => (
                "txPower",
                "TX power",
                Some("dBm"),
                Some("signal_strength"),
                "ruuvi_tx_power_dbm",
            ),
            F::Rssi => (
                "rssi",
                "Signal strength",
                Some("dBm"),
                Some("signal_strength"),
                "ruuvi_rssi_dbm",
            ),
            F::MovementCounter => (
                "movementCounter",
                "Movement counter",
                None,
                None,
                "ruuvi_movement_count",
            ),
            F::MeasurementSequenceNumber => (
                "measurementSequenceNumber",
                "Measurement sequence number",
                None,
                None,
                "ruuvi_measurement_sequence_number",
            ),
            F::Pm1p0 => (
                "pm1p0",
                "PM1.0",
                Some("µg/m³"),
                Some("pm1"),
                "ruuvi_pm1p0_ugm3",
            ),
            F::Pm2p5 => (
                "pm2p5",
                "PM2.5",
                Some("µg/m³"),
                Some("pm25"),
                "ruuvi_pm2p5_ugm3",
            ),
            F::Pm4p0 => ("pm4p0", "PM4.0", Some("µg/m³"), None, "ruuvi_pm4p0_ugm3"),
            F::Pm10p0 => (
                "pm10p0",
                "PM10",
                Some("µg/m³"),
                Some("pm10"),
                "ruuvi_pm10p0_ugm3",
            ),
            F::Co2 => (
                "co2",
                "CO2",
                Some("ppm"),
                Some("carbon_dioxide"),
                "ruuvi_co2_ppm",
            ),
            F::VocIndex => ("vocIndex", "VOC index", None, None, "ruuvi_voc_index"),
            F::NoxIndex => ("noxIndex", "NOx index", None, None, "ruuvi_nox_index"),
            F::AccelerationTotal => (
                "accelerationTotal",
                "Acceleration total",
                Some("G"),
                None,
                "ruuvi_acceleration_total_g",
            ),
            F::AbsoluteHumidity => (
                "absoluteHumidity",
                "Absolute humidity",
                Some("g/m³"),
                None,
                "ruuvi_absolute_humidity_gm3",
            ),
            F::DewPoint => (
                "dewPoint",
                "Dew point",
                Some("°C"),
                Some("temperature"),
                "ruuvi_dew_point_celsius",
            ),
            F::EquilibriumVaporPressure => (
                "equilibriumVaporPressure",
                "Equilibrium vapor pressure",
                Some("Pa"),
                Some("pressure"),
                "ruuvi_equilibrium_vapor_pressure_pascals",
            ),
            F::AirDensity => (
                "airDensity",
                "Air density",
                Some("kg/m³"),
                None,
                "ruuvi_air_density_kgm3",
            ),
            F::AccelerationAngleFromX => (
                "accelerationAngleFromX",
                "Acceleration angle from X",
                Some("°"),
                None,
                "ruuvi_acceleration_angle_from_x_degrees",
            ),
            F::AccelerationAngleFromY => (
                "accelerationAngleFromY",
                "Acceleration angle from Y",
                Some("°"),
                None,
                "ruuvi_acceleration_angle_from_y_degrees",
            ),
            F::AccelerationAngleFromZ => (
                "accelerationAngleFromZ",
                "Acceleration angle from Z",
                Some("°"),
                None,
                "ruuvi_acceleration_angle_from_z_degrees",
            ),
        }
    }
}
