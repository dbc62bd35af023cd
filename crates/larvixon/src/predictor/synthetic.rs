use std::path::Path;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{PredictError, Predictions, Predictor};

/// Predictor that fabricates plausible scores without a model.
///
/// One substance is picked as dominant with a confidence in [70, 95]; the
/// remainder is split across the others in proportion to random weights,
/// so every prediction sums to 100.
pub struct SyntheticPredictor {
    substances: Vec<String>,
    rng: Mutex<StdRng>,
}

impl SyntheticPredictor {
    pub fn new(substances: Vec<String>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            substances,
            rng: Mutex::new(rng),
        }
    }

    fn generate(&self, rng: &mut StdRng) -> Predictions {
        let mut predictions = Predictions::with_capacity(self.substances.len());
        if self.substances.is_empty() {
            return predictions;
        }

        let dominant_index = rng.gen_range(0..self.substances.len());
        if self.substances.len() == 1 {
            predictions.insert(self.substances[0].clone(), 100.0);
            return predictions;
        }

        let confidence: f64 = rng.gen_range(70.0..=95.0);
        let remaining = 100.0 - confidence;

        let others: Vec<&String> = self
            .substances
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != dominant_index)
            .map(|(_, s)| s)
            .collect();
        let weights: Vec<f64> = others.iter().map(|_| rng.gen::<f64>()).collect();
        let total: f64 = weights.iter().sum();

        for (substance, weight) in others.iter().zip(&weights) {
            let share = if total > 0.0 {
                weight / total * remaining
            } else {
                remaining / others.len() as f64
            };
            predictions.insert((*substance).clone(), share);
        }
        predictions.insert(self.substances[dominant_index].clone(), confidence);

        predictions
    }
}

impl Predictor for SyntheticPredictor {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn predict(&self, video: &Path) -> Result<Option<Predictions>, PredictError> {
        if video.as_os_str().is_empty() {
            return Ok(Some(Predictions::new()));
        }
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| PredictError::Failed("random source lock poisoned".to_string()))?;
        Ok(Some(self.generate(&mut rng)))
    }
}
