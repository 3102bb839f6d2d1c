//! Classifier capabilities backed by HTTP inference services.
//!
//! Both endpoints take a JPEG body. The content detector answers with a list
//! of `{class|label, score, box}` (bare or under `detections`), the person
//! detector with `{bounding_boxes: [[x, y, w, h], ...]}`.

use crate::domain::detection::{BoundingBox, PersonBoxes, RawDetection};
use crate::error::ClassifierError;
use crate::ports::detector::{BodyClassifier, Detector};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::runtime::Handle;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const JPEG_QUALITY: u8 = 90;

/// JSON-over-HTTP client usable from the blocking scan worker.
///
/// Requests run on the async runtime captured at construction; the calling
/// thread blocks on them, so this must not be used from an async task.
#[derive(Clone, Debug)]
struct InferenceClient {
    url: String,
    client: Client,
    runtime: Handle,
}

impl InferenceClient {
    fn new(url: impl Into<String>) -> Result<Self, ClassifierError> {
        let runtime = Handle::try_current().map_err(|_| ClassifierError::NoRuntime)?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            url: url.into(),
            client,
            runtime,
        })
    }

    fn post_frame<T: DeserializeOwned>(&self, frame: &RgbImage) -> Result<T, ClassifierError> {
        let body = encode_jpeg(frame)?;
        self.runtime.block_on(async {
            let response = self
                .client
                .post(&self.url)
                .header(CONTENT_TYPE, "image/jpeg")
                .body(body)
                .send()
                .await?
                .error_for_status()?;
            Ok::<T, ClassifierError>(response.json::<T>().await?)
        })
    }
}

fn encode_jpeg(frame: &RgbImage) -> Result<Vec<u8>, ClassifierError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY).encode_image(frame)?;
    Ok(buffer)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DetectResponse {
    Bare(Vec<RawDetection>),
    Wrapped { detections: Vec<RawDetection> },
}

impl From<DetectResponse> for Vec<RawDetection> {
    fn from(response: DetectResponse) -> Self {
        match response {
            DetectResponse::Bare(detections) => detections,
            DetectResponse::Wrapped { detections } => detections,
        }
    }
}

#[derive(Deserialize)]
struct PersonResponse {
    #[serde(default, alias = "boxes")]
    bounding_boxes: Vec<BoundingBox>,
}

impl From<PersonResponse> for PersonBoxes {
    fn from(response: PersonResponse) -> Self {
        PersonBoxes::new(response.bounding_boxes)
    }
}

pub struct HttpDetector {
    inner: InferenceClient,
}

impl HttpDetector {
    pub fn new(url: impl Into<String>) -> Result<Self, ClassifierError> {
        Ok(Self {
            inner: InferenceClient::new(url)?,
        })
    }
}

impl Detector for HttpDetector {
    fn detect(&self, frame: &RgbImage) -> Result<Vec<RawDetection>, ClassifierError> {
        let response: DetectResponse = self.inner.post_frame(frame)?;
        Ok(response.into())
    }

    fn name(&self) -> &'static str {
        "http-detector"
    }
}

pub struct HttpBodyClassifier {
    inner: InferenceClient,
    name: &'static str,
}

impl HttpBodyClassifier {
    pub fn new(url: impl Into<String>, name: &'static str) -> Result<Self, ClassifierError> {
        Ok(Self {
            inner: InferenceClient::new(url)?,
            name,
        })
    }
}

impl BodyClassifier for HttpBodyClassifier {
    fn classify_body(&self, frame: &RgbImage) -> Result<PersonBoxes, ClassifierError> {
        let response: PersonResponse = self.inner.post_frame(frame)?;
        Ok(response.into())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Stand-in when no content classifier is configured: every frame is clean.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpDetector;

impl Detector for NoOpDetector {
    fn detect(&self, _frame: &RgbImage) -> Result<Vec<RawDetection>, ClassifierError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
