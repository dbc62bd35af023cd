use std::path::Path;
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;

use super::{PredictError, Predictions, Predictor};
use crate::sanitize::{redact_path, redact_url};

/// Sends the video to an external scoring service.
///
/// Every failure mode (missing file, transport error, non-200, malformed
/// body) is logged and reported as `Ok(None)`.
pub struct RemotePredictor {
    client: Client,
    endpoint: String,
}

impl RemotePredictor {
    /// `timeout` of `None` waits indefinitely.
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self, PredictError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PredictError::Client(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn multipart(video: &Path) -> Result<Form, String> {
        let mime = mime_guess::from_path(video).first_or_octet_stream();
        let part = Part::file(video)
            .map_err(|e| format!("Failed to open {}: {}", redact_path(video), e))?
            .mime_str(mime.essence_str())
            .map_err(|e| format!("Invalid content type: {}", e))?;
        Ok(Form::new().part("file", part))
    }
}

/// Extracts a non-empty `predictions` object of numeric scores.
fn parse_predictions(body: &str) -> Result<Predictions, String> {
    let data: serde_json::Value =
        serde_json::from_str(body).map_err(|e| format!("Failed to decode JSON response: {}", e))?;
    let raw = data
        .get("predictions")
        .and_then(|p| p.as_object())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| "response missing 'predictions'".to_string())?;

    raw.iter()
        .map(|(name, value)| {
            value
                .as_f64()
                .map(|score| (name.clone(), score))
                .ok_or_else(|| format!("non-numeric score for '{}'", name))
        })
        .collect()
}

impl Predictor for RemotePredictor {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn predict(&self, video: &Path) -> Result<Option<Predictions>, PredictError> {
        if !video.is_file() {
            log::error!("Video file not found at {}", redact_path(video));
            return Ok(None);
        }

        let form = match Self::multipart(video) {
            Ok(form) => form,
            Err(e) => {
                log::error!("{}", e);
                return Ok(None);
            }
        };

        log::info!(
            "Sending request to prediction endpoint: {}",
            redact_url(&self.endpoint)
        );
        let response = match self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()
        {
            Ok(response) => response,
            Err(e) => {
                log::error!("Request to prediction endpoint failed: {}", e.without_url());
                return Ok(None);
            }
        };

        let status = response.status();
        let body = match response.text() {
            Ok(body) => body,
            Err(e) => {
                log::error!("Failed to read prediction response: {}", e.without_url());
                return Ok(None);
            }
        };

        if status != StatusCode::OK {
            log::error!("Prediction endpoint request failed ({}): {}", status, body);
            return Ok(None);
        }

        match parse_predictions(&body) {
            Ok(predictions) => {
                log::info!("Prediction successful for {}", redact_path(video));
                Ok(Some(predictions))
            }
            Err(e) => {
                log::error!("{}", e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tokio::runtime::Runtime;
    use wiremock::matchers::{header, header_regex, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn video_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        file.write_all(b"0123456789").unwrap();
        file
    }

    fn serve(rt: &Runtime, template: ResponseTemplate) -> MockServer {
        let server = rt.block_on(MockServer::start());
        rt.block_on(
            Mock::given(method("POST"))
                .and(path("/predict"))
                .respond_with(template)
                .mount(&server),
        );
        server
    }

    #[test]
    fn test_parse_predictions() {
        let parsed = parse_predictions(r#"{"predictions": {"ethanol": 91.5, "cocaine": 8}}"#)
            .unwrap();
        assert_eq!(parsed["ethanol"], 91.5);
        assert_eq!(parsed["cocaine"], 8.0);

        assert!(parse_predictions(r#"{"predictions": {}}"#).is_err());
        assert!(parse_predictions(r#"{"result": 1}"#).is_err());
        assert!(parse_predictions(r#"{"predictions": {"ethanol": "high"}}"#).is_err());
        assert!(parse_predictions("not json").is_err());
    }

    #[test]
    fn test_successful_prediction_sends_multipart() {
        let rt = Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        rt.block_on(
            Mock::given(method("POST"))
                .and(path("/predict"))
                .and(header("accept", "application/json"))
                .and(header_regex("content-type", "^multipart/form-data"))
                .respond_with(|req: &Request| {
                    let body = String::from_utf8_lossy(&req.body);
                    assert!(body.contains("name=\"file\""));
                    assert!(body.contains("0123456789"));
                    ResponseTemplate::new(200)
                        .set_body_json(json!({"predictions": {"morphine": 88.0, "ethanol": 12.0}}))
                })
                .expect(1)
                .mount(&server),
        );

        let video = video_file();
        let predictor = RemotePredictor::new(format!("{}/predict", server.uri()), None).unwrap();
        let predictions = predictor.predict(video.path()).unwrap().unwrap();

        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions["morphine"], 88.0);
        rt.block_on(server.verify());
    }

    #[test]
    fn test_server_error_is_none() {
        let rt = Runtime::new().unwrap();
        let server = serve(&rt, ResponseTemplate::new(500).set_body_string("boom"));
        let video = video_file();

        let predictor = RemotePredictor::new(format!("{}/predict", server.uri()), None).unwrap();
        assert!(predictor.predict(video.path()).unwrap().is_none());
    }

    #[test]
    fn test_missing_predictions_is_none() {
        let rt = Runtime::new().unwrap();
        let server = serve(
            &rt,
            ResponseTemplate::new(200).set_body_json(json!({"predictions": {}})),
        );
        let video = video_file();

        let predictor = RemotePredictor::new(format!("{}/predict", server.uri()), None).unwrap();
        assert!(predictor.predict(video.path()).unwrap().is_none());
    }

    #[test]
    fn test_malformed_json_is_none() {
        let rt = Runtime::new().unwrap();
        let server = serve(&rt, ResponseTemplate::new(200).set_body_string("{oops"));
        let video = video_file();

        let predictor = RemotePredictor::new(format!("{}/predict", server.uri()), None).unwrap();
        assert!(predictor.predict(video.path()).unwrap().is_none());
    }

    #[test]
    fn test_missing_file_is_none_without_request() {
        let rt = Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        rt.block_on(
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200))
                .expect(0)
                .mount(&server),
        );

        let predictor = RemotePredictor::new(format!("{}/predict", server.uri()), None).unwrap();
        assert!(predictor
            .predict(Path::new("/nonexistent/clip.mp4"))
            .unwrap()
            .is_none());
        rt.block_on(server.verify());
    }

    #[test]
    fn test_unreachable_endpoint_is_none() {
        let video = video_file();
        let predictor =
            RemotePredictor::new("http://127.0.0.1:1/predict", Some(Duration::from_secs(2)))
                .unwrap();
        assert!(predictor.predict(video.path()).unwrap().is_none());
    }

    #[test]
    fn test_timeout_is_none() {
        let rt = Runtime::new().unwrap();
        let server = serve(
            &rt,
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(3))
                .set_body_json(json!({"predictions": {"ethanol": 100.0}})),
        );
        let video = video_file();

        let predictor = RemotePredictor::new(
            format!("{}/predict", server.uri()),
            Some(Duration::from_millis(200)),
        )
        .unwrap();
        assert!(predictor.predict(video.path()).unwrap().is_none());
    }
}
