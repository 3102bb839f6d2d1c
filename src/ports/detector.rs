use crate::domain::detection::{PersonBoxes, RawDetection};
use crate::error::ClassifierError;
use image::RgbImage;

/// Content classifier run on every sampled frame.
#[cfg_attr(test, mockall::automock)]
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> Result<Vec<RawDetection>, ClassifierError>;

    /// Name for logging.
    fn name(&self) -> &'static str;
}

/// Person classifier used to grade framing of frames with hits.
#[cfg_attr(test, mockall::automock)]
pub trait BodyClassifier: Send + Sync {
    fn classify_body(&self, frame: &RgbImage) -> Result<PersonBoxes, ClassifierError>;

    fn name(&self) -> &'static str;
}

/// Result of asking a capability about one frame: a value, or an explicit
/// marker that no answer could be had.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Available(T),
    Unavailable(String),
}

impl<T> Outcome<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Outcome::Available(_))
    }

    pub fn unwrap_or(self, default: T) -> T {
        match self {
            Outcome::Available(value) => value,
            Outcome::Unavailable(_) => default,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Available(value) => Outcome::Available(f(value)),
            Outcome::Unavailable(reason) => Outcome::Unavailable(reason),
        }
    }
}

impl<T> From<Result<T, ClassifierError>> for Outcome<T> {
    fn from(result: Result<T, ClassifierError>) -> Self {
        match result {
            Ok(value) => Outcome::Available(value),
            Err(e) => Outcome::Unavailable(e.to_string()),
        }
    }
}

/// Body classifiers in rank order. The first one that answers wins; an empty
/// chain, or one where nobody answers, is `Unavailable`.
#[derive(Default)]
pub struct ClassifierChain {
    ranked: Vec<Box<dyn BodyClassifier>>,
}

impl ClassifierChain {
    pub fn new(ranked: Vec<Box<dyn BodyClassifier>>) -> Self {
        Self { ranked }
    }

    pub fn push(&mut self, classifier: Box<dyn BodyClassifier>) {
        self.ranked.push(classifier);
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.ranked.iter().map(|c| c.name()).collect()
    }

    pub fn classify(&self, frame: &RgbImage) -> Outcome<PersonBoxes> {
        let mut reasons = Vec::new();
        for classifier in &self.ranked {
            match classifier.classify_body(frame) {
                Ok(boxes) => return Outcome::Available(boxes),
                Err(e) => {
                    tracing::debug!("{} unavailable: {}", classifier.name(), e);
                    reasons.push(format!("{}: {}", classifier.name(), e));
                }
            }
        }
        if reasons.is_empty() {
            Outcome::Unavailable("no body classifier configured".to_string())
        } else {
            Outcome::Unavailable(reasons.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing(name: &'static str) -> MockBodyClassifier {
        let mut mock = MockBodyClassifier::new();
        mock.expect_classify_body()
            .returning(|_| Err(ClassifierError::Other("offline".to_string())));
        mock.expect_name().return_const(name);
        mock
    }

    fn answering(name: &'static str, boxes: usize) -> MockBodyClassifier {
        let mut mock = MockBodyClassifier::new();
        mock.expect_classify_body()
            .returning(move |_| Ok(PersonBoxes::new(vec![[0.0, 0.0, 10.0, 10.0]; boxes])));
        mock.expect_name().return_const(name);
        mock
    }

    #[test]
    fn test_empty_chain_is_unavailable() {
        let chain = ClassifierChain::default();
        assert!(!chain.classify(&RgbImage::new(2, 2)).is_available());
    }

    #[test]
    fn test_first_answer_wins() {
        let mut second = MockBodyClassifier::new();
        second.expect_classify_body().never();
        second.expect_name().return_const("second");

        let chain = ClassifierChain::new(vec![Box::new(answering("first", 2)), Box::new(second)]);
        let outcome = chain.classify(&RgbImage::new(2, 2));
        assert_eq!(outcome.unwrap_or(PersonBoxes::default()).count, 2);
    }

    #[test]
    fn test_falls_through_to_lower_rank() {
        let chain = ClassifierChain::new(vec![
            Box::new(failing("primary")),
            Box::new(answering("secondary", 1)),
        ]);
        let outcome = chain.classify(&RgbImage::new(2, 2));
        assert!(outcome.is_available());
        assert_eq!(outcome.unwrap_or(PersonBoxes::default()).count, 1);
    }

    #[test]
    fn test_all_failing_is_unavailable_with_reasons() {
        let chain = ClassifierChain::new(vec![Box::new(failing("a")), Box::new(failing("b"))]);
        match chain.classify(&RgbImage::new(2, 2)) {
            Outcome::Unavailable(reason) => {
                assert!(reason.contains("a: offline"));
                assert!(reason.contains("b: offline"));
            }
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_outcome_from_result() {
        let ok = Outcome::from(Ok::<u8, ClassifierError>(3));
        assert_eq!(ok, Outcome::Available(3));
        let err = Outcome::from(Err::<u8, _>(ClassifierError::Other("x".to_string())));
        assert_eq!(err.clone().unwrap_or(9), 9);
        assert_eq!(err.map(|v| v + 1), Outcome::Unavailable("x".to_string()));
    }
}
