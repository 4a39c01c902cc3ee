//! `get_current_weather` — deterministic mock weather.
//!
//! No weather service is called; readings are derived from the location
//! name so the same question always gets the same answer. Useful for
//! exercising the tool loop end to end without network access.

use async_trait::async_trait;
use counsel_core::{Tool, ToolError};
use serde::Serialize;
use serde_json::{Value, json};

pub struct CurrentWeatherTool;

#[async_trait]
impl Tool for CurrentWeatherTool {
    fn name(&self) -> &str {
        "get_current_weather"
    }

    fn description(&self) -> &str {
        "Provide the current weather for a given location when asked by a user"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city and state that the user mentions, e.g. San Francisco, CA"
                },
                "unit": {
                    "type": "string",
                    "description": "The temperature units to use. Use celsius unless the user asks otherwise.",
                    "enum": ["celsius", "fahrenheit"]
                }
            },
            "required": ["location"]
        })
    }

    fn reentrant(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let location = arguments["location"]
            .as_str()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments {
                tool_name: self.name().into(),
                reason: "'location' must be a non-empty string".into(),
            })?;
        let unit = arguments["unit"].as_str().unwrap_or("celsius");

        let report = mock_report(location, unit);
        serde_json::to_value(&report).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })
    }
}

#[derive(Serialize)]
struct WeatherReport {
    location: String,
    temperature: String,
    unit: String,
    forecast: Vec<&'static str>,
}

const CONDITIONS: [&str; 8] = [
    "sunny",
    "partly cloudy",
    "cloudy",
    "rainy",
    "windy",
    "foggy",
    "stormy",
    "snowy",
];

fn mock_report(location: &str, unit: &str) -> WeatherReport {
    let hash: u32 = location
        .to_lowercase()
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));

    let celsius = (hash % 35) as i32 - 5;
    let temperature = if unit == "fahrenheit" {
        celsius * 9 / 5 + 32
    } else {
        celsius
    };

    let first = (hash as usize / 7) % CONDITIONS.len();
    let second = (first + 1 + (hash as usize / 3) % (CONDITIONS.len() - 1)) % CONDITIONS.len();

    WeatherReport {
        location: location.to_string(),
        temperature: temperature.to_string(),
        unit: unit.to_string(),
        forecast: vec![CONDITIONS[first], CONDITIONS[second]],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_original_report_shape() {
        let out = CurrentWeatherTool
            .execute(json!({"location": "San Francisco, CA", "unit": "celsius"}))
            .await
            .unwrap();

        assert_eq!(out["location"], "San Francisco, CA");
        assert_eq!(out["unit"], "celsius");
        assert!(out["temperature"].is_string());
        assert_eq!(out["forecast"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unit_defaults_to_celsius() {
        let out = CurrentWeatherTool
            .execute(json!({"location": "Oslo"}))
            .await
            .unwrap();
        assert_eq!(out["unit"], "celsius");
    }

    #[tokio::test]
    async fn deterministic_results() {
        let a = CurrentWeatherTool.execute(json!({"location": "London"})).await.unwrap();
        let b = CurrentWeatherTool.execute(json!({"location": "london"})).await.unwrap();
        assert_eq!(a["temperature"], b["temperature"]);
        assert_eq!(a["forecast"], b["forecast"]);
    }

    #[test]
    fn fahrenheit_conversion() {
        let c = mock_report("Lisbon", "celsius");
        let f = mock_report("Lisbon", "fahrenheit");
        let c: i32 = c.temperature.parse().unwrap();
        let f: i32 = f.temperature.parse().unwrap();
        assert_eq!(f, c * 9 / 5 + 32);
    }

    #[test]
    fn forecast_has_two_distinct_conditions() {
        for city in ["Tokyo", "Lima", "Cairo", "Reykjavik"] {
            let r = mock_report(city, "celsius");
            assert_ne!(r.forecast[0], r.forecast[1], "{city}");
        }
    }

    #[tokio::test]
    async fn blank_location_is_rejected() {
        let err = CurrentWeatherTool
            .execute(json!({"location": "  "}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
