use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use toolchat_core::tool::{Error as ToolError, Tool, ToolResult};

use super::{WebToolsConfig, request_error};

/// Input of [`WeatherTool`].
#[derive(Deserialize, JsonSchema)]
pub struct WeatherParameters {
    #[schemars(description = "A city or place name, e.g. \"Lisbon\".")]
    location: String,
}

/// A tool that reports current weather conditions from Open-Meteo.
pub struct WeatherTool {
    config: WebToolsConfig,
    parameter_schema: Value,
}

impl WeatherTool {
    /// Creates a new weather tool.
    #[inline]
    pub fn new(config: WebToolsConfig) -> Self {
        Self {
            config,
            parameter_schema: schema_for!(WeatherParameters).to_value(),
        }
    }
}

impl Tool for WeatherTool {
    type Input = WeatherParameters;

    fn name(&self) -> &str {
        "weather"
    }

    fn description(&self) -> &str {
        "Gets the current weather for a place: conditions, temperature, \
humidity and wind."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: WeatherParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let config = self.config.clone();
        async move {
            let location = input.location.trim();
            if location.is_empty() {
                return Err(ToolError::invalid_input()
                    .with_reason("the location must not be empty"));
            }
            let place = geocode(&config, location).await?;
            let forecast = current_conditions(&config, &place).await?;
            Ok(format_report(&place, &forecast))
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<Place>,
}

#[derive(Debug, Deserialize)]
struct Place {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    admin1: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

impl Place {
    fn display_name(&self) -> String {
        let mut parts = vec![self.name.as_str()];
        parts.extend(self.admin1.as_deref().filter(|a| *a != self.name));
        parts.extend(self.country.as_deref());
        parts.join(", ")
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: Current,
    #[serde(default)]
    current_units: Units,
}

#[derive(Debug, Deserialize)]
struct Current {
    temperature_2m: f64,
    apparent_temperature: f64,
    relative_humidity_2m: f64,
    wind_speed_10m: f64,
    weather_code: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Units {
    temperature_2m: String,
    wind_speed_10m: String,
}

impl Default for Units {
    fn default() -> Self {
        Self {
            temperature_2m: "°C".to_owned(),
            wind_speed_10m: "km/h".to_owned(),
        }
    }
}

async fn geocode(config: &WebToolsConfig, location: &str) -> Result<Place, ToolError> {
    let resp: GeocodingResponse = config
        .client
        .get(format!("{}/search", config.geocoding_endpoint))
        .query(&[
            ("name", location),
            ("count", "1"),
            ("language", "en"),
            ("format", "json"),
        ])
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
        .map_err(request_error)?
        .json()
        .await
        .map_err(request_error)?;
    resp.results.into_iter().next().ok_or_else(|| {
        ToolError::execution_error()
            .with_reason(format!("no place called \"{location}\" was found"))
    })
}

async fn current_conditions(
    config: &WebToolsConfig,
    place: &Place,
) -> Result<ForecastResponse, ToolError> {
    config
        .client
        .get(format!("{}/forecast", config.forecast_endpoint))
        .query(&[
            ("latitude", place.latitude.to_string()),
            ("longitude", place.longitude.to_string()),
            (
                "current",
                "temperature_2m,apparent_temperature,relative_humidity_2m,\
wind_speed_10m,weather_code"
                    .to_owned(),
            ),
        ])
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
        .map_err(request_error)?
        .json()
        .await
        .map_err(request_error)
}

fn format_report(place: &Place, forecast: &ForecastResponse) -> String {
    let current = &forecast.current;
    let units = &forecast.current_units;
    format!(
        "Current weather in {}:\n\
- Conditions: {}\n\
- Temperature: {}{} (feels like {}{})\n\
- Humidity: {}%\n\
- Wind: {} {}",
        place.display_name(),
        describe_weather_code(current.weather_code),
        current.temperature_2m,
        units.temperature_2m,
        current.apparent_temperature,
        units.temperature_2m,
        current.relative_humidity_2m,
        current.wind_speed_10m,
        units.wind_speed_10m,
    )
}

/// Renders a WMO weather interpretation code.
fn describe_weather_code(code: u32) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51 | 53 | 55 => "Drizzle",
        56 | 57 => "Freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 | 67 => "Freezing rain",
        71 => "Slight snowfall",
        73 => "Moderate snowfall",
        75 => "Heavy snowfall",
        77 => "Snow grains",
        80..=82 => "Rain showers",
        85 | 86 => "Snow showers",
        95 => "Thunderstorm",
        96 | 99 => "Thunderstorm with hail",
        _ => "Unknown conditions",
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn tool_for(server: &MockServer) -> WeatherTool {
        let mut config = WebToolsConfig::with_client(reqwest::Client::new());
        config.geocoding_endpoint = server.url("/geo");
        config.forecast_endpoint = server.url("/wx");
        WeatherTool::new(config)
    }

    #[tokio::test]
    async fn test_weather_report() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/geo/search")
                    .query_param("name", "Lisbon");
                then.status(200).json_body(json!({
                    "results": [{
                        "name": "Lisbon",
                        "latitude": 38.72,
                        "longitude": -9.13,
                        "admin1": "Lisbon",
                        "country": "Portugal"
                    }]
                }));
            })
            .await;
        let forecast = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/wx/forecast")
                    .query_param("latitude", "38.72")
                    .query_param("longitude", "-9.13");
                then.status(200).json_body(json!({
                    "current_units": {
                        "temperature_2m": "°C",
                        "wind_speed_10m": "km/h"
                    },
                    "current": {
                        "time": "2024-06-01T12:00",
                        "temperature_2m": 21.5,
                        "apparent_temperature": 20.9,
                        "relative_humidity_2m": 64,
                        "wind_speed_10m": 14.2,
                        "weather_code": 2
                    }
                }));
            })
            .await;

        let output = tool_for(&server)
            .execute(WeatherParameters {
                location: "Lisbon".to_owned(),
            })
            .await
            .unwrap();

        forecast.assert_async().await;
        assert_eq!(
            output,
            "Current weather in Lisbon, Portugal:\n\
- Conditions: Partly cloudy\n\
- Temperature: 21.5°C (feels like 20.9°C)\n\
- Humidity: 64%\n\
- Wind: 14.2 km/h"
        );
    }

    #[tokio::test]
    async fn test_unknown_location() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/geo/search");
                then.status(200).json_body(json!({ "generationtime_ms": 0.5 }));
            })
            .await;

        let err = tool_for(&server)
            .execute(WeatherParameters {
                location: "Atlantis".to_owned(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), toolchat_core::tool::ErrorKind::ExecutionError);
        assert!(err.reason().contains("Atlantis"));
    }

    #[test]
    fn test_describe_weather_code() {
        assert_eq!(describe_weather_code(0), "Clear sky");
        assert_eq!(describe_weather_code(81), "Rain showers");
        assert_eq!(describe_weather_code(1234), "Unknown conditions");
    }
}
