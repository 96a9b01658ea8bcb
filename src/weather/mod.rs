//! Weather - 공원 실황/예보 조회
//!
//! weatherapi.com 기반 날씨 제공자와 포르투갈어 응답 포매터.
//! 공원 좌표는 고정입니다 (Parque Nacional da Tijuca).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// 공원 중심 좌표
const PARK_LATITUDE: f64 = -22.9517;
const PARK_LONGITUDE: f64 = -43.2644;

const API_BASE_URL: &str = "https://api.weatherapi.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// 예보 최대 일수 (무료 플랜 한도)
const MAX_FORECAST_DAYS: u8 = 3;

// ============================================================================
// Types
// ============================================================================

/// 현재 기상 실황
#[derive(Debug, Clone)]
pub struct CurrentConditions {
    /// 기온 (섭씨)
    pub temp_c: f64,
    /// 체감 온도 (섭씨)
    pub feels_like_c: f64,
    /// 상태 설명 (포르투갈어)
    pub condition: String,
    /// 습도 (%)
    pub humidity: u8,
    /// 풍속 (km/h)
    pub wind_kph: f64,
}

/// 일일 예보
#[derive(Debug, Clone)]
pub struct DayForecast {
    /// 날짜 (YYYY-MM-DD)
    pub date: String,
    pub min_temp_c: f64,
    pub max_temp_c: f64,
    /// 상태 설명 (포르투갈어)
    pub condition: String,
    /// 강수 확률 (%)
    pub chance_of_rain: u8,
}

// ============================================================================
// Provider trait
// ============================================================================

/// 날씨 제공자
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// 현재 실황
    async fn current(&self) -> Result<CurrentConditions>;

    /// 일일 예보 (days는 1..=3으로 클램프)
    async fn forecast(&self, days: u8) -> Result<Vec<DayForecast>>;
}

// ============================================================================
// WeatherApi
// ============================================================================

/// weatherapi.com 클라이언트
pub struct WeatherApi {
    client: reqwest::Client,
    api_key: String,
}

impl WeatherApi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    /// WEATHER_API_KEY 환경 변수로 생성
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("WEATHER_API_KEY")
            .context("WEATHER_API_KEY environment variable not set")?;
        Ok(Self::new(api_key))
    }

    fn location_param() -> String {
        format!("{},{}", PARK_LATITUDE, PARK_LONGITUDE)
    }
}

#[async_trait]
impl WeatherProvider for WeatherApi {
    async fn current(&self) -> Result<CurrentConditions> {
        let url = format!("{}/current.json", API_BASE_URL);
        let response = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", &Self::location_param()),
                ("lang", "pt"),
            ])
            .send()
            .await
            .context("Weather API request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Weather API returned status {}", response.status());
        }

        let body: CurrentResponse = response
            .json()
            .await
            .context("Failed to parse weather response")?;

        Ok(CurrentConditions {
            temp_c: body.current.temp_c,
            feels_like_c: body.current.feelslike_c,
            condition: body.current.condition.text,
            humidity: body.current.humidity,
            wind_kph: body.current.wind_kph,
        })
    }

    async fn forecast(&self, days: u8) -> Result<Vec<DayForecast>> {
        let days = days.clamp(1, MAX_FORECAST_DAYS);
        let url = format!("{}/forecast.json", API_BASE_URL);
        let response = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", &Self::location_param()),
                ("days", &days.to_string()),
                ("lang", "pt"),
            ])
            .send()
            .await
            .context("Weather API request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Weather API returned status {}", response.status());
        }

        let body: ForecastResponse = response
            .json()
            .await
            .context("Failed to parse forecast response")?;

        Ok(body
            .forecast
            .forecastday
            .into_iter()
            .map(|fd| DayForecast {
                date: fd.date,
                min_temp_c: fd.day.mintemp_c,
                max_temp_c: fd.day.maxtemp_c,
                condition: fd.day.condition.text,
                chance_of_rain: fd.day.daily_chance_of_rain,
            })
            .collect())
    }
}

// ============================================================================
// API response schemas
// ============================================================================

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    current: ApiCurrent,
}

#[derive(Debug, Deserialize)]
struct ApiCurrent {
    temp_c: f64,
    feelslike_c: f64,
    condition: ApiCondition,
    humidity: u8,
    wind_kph: f64,
}

#[derive(Debug, Deserialize)]
struct ApiCondition {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    forecast: ApiForecast,
}

#[derive(Debug, Deserialize)]
struct ApiForecast {
    forecastday: Vec<ApiForecastDay>,
}

#[derive(Debug, Deserialize)]
struct ApiForecastDay {
    date: String,
    day: ApiDay,
}

#[derive(Debug, Deserialize)]
struct ApiDay {
    mintemp_c: f64,
    maxtemp_c: f64,
    condition: ApiCondition,
    daily_chance_of_rain: u8,
}

// ============================================================================
// Formatting
// ============================================================================

/// 현재 실황 포맷 (포르투갈어)
pub fn format_current(c: &CurrentConditions) -> String {
    format!(
        "Agora no Parque Nacional da Tijuca: {}, {:.0}°C (sensação de {:.0}°C). \
         Umidade: {}%. Vento: {:.0} km/h.",
        c.condition, c.temp_c, c.feels_like_c, c.humidity, c.wind_kph
    )
}

/// 일일 예보 포맷 (포르투갈어)
///
/// 강수 확률에 따라 조언 문구가 달라집니다.
pub fn format_day(label: &str, d: &DayForecast) -> String {
    let rain_advice = if d.chance_of_rain >= 70 {
        format!(
            " Alta chance de chuva ({}%) - leve guarda-chuva e evite trilhas escorregadias!",
            d.chance_of_rain
        )
    } else if d.chance_of_rain >= 40 {
        format!(" Pode chover ({}% de chance), leve uma capa por precaução.", d.chance_of_rain)
    } else {
        format!(" Baixa chance de chuva ({}%).", d.chance_of_rain)
    };

    format!(
        "{} ({}): {}, mínima de {:.0}°C e máxima de {:.0}°C.{}",
        label, d.date, d.condition, d.min_temp_c, d.max_temp_c, rain_advice
    )
}

// ============================================================================
// Router
// ============================================================================

/// 날씨 질문 라우팅
///
/// 질문의 시간 표현에 따라 실황/예보 중 무엇을 조회할지 결정합니다.
/// 제공자 오류는 그대로 전파되며, 사용자용 메시지 변환은
/// 파이프라인 경계에서 이루어집니다.
pub async fn answer_weather(provider: &dyn WeatherProvider, question: &str) -> Result<String> {
    let q = question.to_lowercase();

    let wants_day_after = q.contains("depois de amanhã") || q.contains("depois de amanha");
    let wants_tomorrow = q.contains("amanhã") || q.contains("amanha");
    let wants_today = q.contains("hoje");
    let wants_outlook = q.contains("previsão")
        || q.contains("previsao")
        || q.contains("próximos dias")
        || q.contains("proximos dias");
    // 날짜 표현 없이 비/날씨만 묻는 질문은 당일 예보로
    let wants_rain = q.contains("chover") || q.contains("chuva") || q.contains("tempo");

    if wants_day_after {
        let forecast = provider.forecast(3).await?;
        let day = forecast
            .get(2)
            .context("Forecast did not include day after tomorrow")?;
        return Ok(format_day("Depois de amanhã", day));
    }

    if wants_tomorrow {
        let forecast = provider.forecast(2).await?;
        let day = forecast.get(1).context("Forecast did not include tomorrow")?;
        return Ok(format_day("Amanhã", day));
    }

    if wants_today {
        let forecast = provider.forecast(1).await?;
        let day = forecast.first().context("Forecast was empty")?;
        return Ok(format_day("Hoje", day));
    }

    if wants_outlook {
        let forecast = provider.forecast(3).await?;
        return Ok(format!(
            "Previsão para o Parque Nacional da Tijuca:\n{}",
            format_outlook(&forecast)
        ));
    }

    if wants_rain {
        let forecast = provider.forecast(1).await?;
        let day = forecast.first().context("Forecast was empty")?;
        return Ok(format_day("Hoje", day));
    }

    // 기본: 현재 실황 + 3일 예보
    let current = provider.current().await?;
    let forecast = provider.forecast(3).await?;
    Ok(format!(
        "{}\n\nPrevisão para os próximos dias:\n{}",
        format_current(&current),
        format_outlook(&forecast)
    ))
}

fn format_outlook(forecast: &[DayForecast]) -> String {
    let labels = ["Hoje", "Amanhã", "Depois de amanhã"];
    forecast
        .iter()
        .zip(labels.iter())
        .map(|(d, label)| format_day(label, d))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct StubWeather;

    #[async_trait]
    impl WeatherProvider for StubWeather {
        async fn current(&self) -> Result<CurrentConditions> {
            Ok(CurrentConditions {
                temp_c: 25.0,
                feels_like_c: 27.0,
                condition: "Parcialmente nublado".to_string(),
                humidity: 70,
                wind_kph: 12.0,
            })
        }

        async fn forecast(&self, days: u8) -> Result<Vec<DayForecast>> {
            let days = days.clamp(1, 3);
            Ok((0..days)
                .map(|i| DayForecast {
                    date: format!("2026-08-{:02}", 30 + i),
                    min_temp_c: 18.0 + i as f64,
                    max_temp_c: 28.0 + i as f64,
                    condition: "Sol com nuvens".to_string(),
                    chance_of_rain: 30 * (i + 1),
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_today_question_uses_forecast() {
        let answer = answer_weather(&StubWeather, "Vai chover hoje?").await.unwrap();
        assert!(answer.starts_with("Hoje"));
        assert!(answer.contains("18°C"));
        assert!(answer.contains("28°C"));
    }

    #[tokio::test]
    async fn test_tomorrow_question() {
        let answer = answer_weather(&StubWeather, "Como estará o tempo amanhã?")
            .await
            .unwrap();
        assert!(answer.starts_with("Amanhã"));
        // 강수 확률 60% -> 경고 문구
        assert!(answer.contains("60%"));
    }

    #[tokio::test]
    async fn test_day_after_tomorrow_takes_precedence() {
        let answer = answer_weather(&StubWeather, "E depois de amanhã?").await.unwrap();
        assert!(answer.starts_with("Depois de amanhã"));
        assert!(answer.contains("90%"));
    }

    #[tokio::test]
    async fn test_bare_rain_question_uses_today_forecast() {
        // 날짜 표현 없이 비만 물어도 당일 예보로 라우팅
        let answer = answer_weather(&StubWeather, "Vai chover?").await.unwrap();
        assert!(answer.starts_with("Hoje"));
        assert!(answer.contains("30%"));
    }

    #[tokio::test]
    async fn test_no_keyword_combines_current_and_outlook() {
        let answer = answer_weather(&StubWeather, "Como está o clima agora?")
            .await
            .unwrap();
        assert!(answer.starts_with("Agora no Parque"));
        assert!(answer.contains("25°C"));
        assert!(answer.contains("Previsão para os próximos dias"));
        assert!(answer.contains("Depois de amanhã"));
    }

    #[tokio::test]
    async fn test_outlook_lists_three_days() {
        let answer = answer_weather(&StubWeather, "Qual a previsão para os próximos dias?")
            .await
            .unwrap();
        assert!(answer.contains("Hoje"));
        assert!(answer.contains("Amanhã"));
        assert!(answer.contains("Depois de amanhã"));
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        struct FailingWeather;

        #[async_trait]
        impl WeatherProvider for FailingWeather {
            async fn current(&self) -> Result<CurrentConditions> {
                anyhow::bail!("connection refused")
            }

            async fn forecast(&self, _days: u8) -> Result<Vec<DayForecast>> {
                anyhow::bail!("connection refused")
            }
        }

        let result = answer_weather(&FailingWeather, "clima agora").await;
        assert!(result.is_err());
    }
}
