//! Weather lookup tools backed by the open-meteo forecast API.
//!
//! `get_weather` reports the current temperature in celsius and
//! `get_wind_speed` the current wind speed in km/h, both for a pair of
//! coordinates. They double as realistic registry fixtures.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::tools::{
    ParamType, ParameterSchema, RegistryError, Tool, ToolError, ToolRegistry, ToolSpec,
};

const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

fn coordinate_schema() -> ParameterSchema {
    ParameterSchema::new()
        .required("latitude", ParamType::Number)
        .required("longitude", ParamType::Number)
        .strict(true)
}

fn coordinate(args: &Map<String, Value>, name: &str) -> Result<f64, ToolError> {
    args.get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| ToolError::Failed(format!("missing numeric {name}")))
}

/// Fetch the `current` block of the forecast for the given coordinates.
async fn fetch_current(args: &Map<String, Value>) -> Result<Value, ToolError> {
    let latitude = coordinate(args, "latitude")?;
    let longitude = coordinate(args, "longitude")?;
    let url = format!(
        "{FORECAST_URL}?latitude={latitude}&longitude={longitude}&current=temperature_2m,wind_speed_10m"
    );

    let body: Value = reqwest::get(&url)
        .await?
        .error_for_status()?
        .json()
        .await?;

    body.get("current")
        .cloned()
        .ok_or_else(|| ToolError::Failed("forecast response missing current block".into()))
}

fn current_field(current: &Value, field: &str) -> Result<Value, ToolError> {
    current
        .get(field)
        .cloned()
        .ok_or_else(|| ToolError::Failed(format!("forecast response missing {field}")))
}

/// Current temperature lookup.
pub struct GetWeather;

impl GetWeather {
    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "get_weather",
            "Get current temperature for provided coordinates in celsius.",
            coordinate_schema(),
        )
    }
}

#[async_trait]
impl Tool for GetWeather {
    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let current = fetch_current(&args).await?;
        current_field(&current, "temperature_2m")
    }
}

/// Current wind speed lookup.
pub struct GetWindSpeed;

impl GetWindSpeed {
    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "get_wind_speed",
            "Get current wind speed for provided coordinates in km/h.",
            coordinate_schema(),
        )
    }
}

#[async_trait]
impl Tool for GetWindSpeed {
    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let current = fetch_current(&args).await?;
        current_field(&current, "wind_speed_10m")
    }
}

/// Register both weather tools.
pub fn register_weather_tools(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(GetWeather::spec(), Box::new(GetWeather))?;
    registry.register(GetWindSpeed::spec(), Box::new(GetWindSpeed))?;
    Ok(())
}
