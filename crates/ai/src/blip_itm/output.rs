use anyhow::{anyhow, bail};
use ndarray::ArrayViewD;

/// Shape of the matching head output of an exported ITM model.
///
/// The contract is fixed when the scorer is configured, never probed at runtime.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
pub enum ItmOutputContract {
    /// `[batch, 2]` logits ordered `[no_match, match]`.
    #[default]
    LogitPair,
    /// `[batch, 1]` match probability.
    Probability,
    /// `[batch, seq, hidden]` hidden states, mean mapped through a sigmoid.
    HiddenState,
}

impl ItmOutputContract {
    pub fn output_name(self) -> &'static str {
        match self {
            Self::LogitPair => "itm_score",
            Self::Probability => "match_probability",
            Self::HiddenState => "last_hidden_state",
        }
    }

    /// Match probability of the first item in the batch.
    pub fn extract(self, output: ArrayViewD<f32>) -> anyhow::Result<f32> {
        if output.is_empty() {
            bail!("empty {} output", self);
        }

        let probability = match self {
            Self::LogitPair => {
                let last_dim = output
                    .shape()
                    .last()
                    .copied()
                    .ok_or(anyhow!("scalar output for logit pair"))?;
                if last_dim != 2 {
                    bail!("expected 2 logits, got last dimension {}", last_dim);
                }
                let mut logits = output.iter();
                let (no_match, is_match) = match (logits.next(), logits.next()) {
                    (Some(a), Some(b)) => (*a, *b),
                    _ => bail!("logit pair output too short"),
                };
                softmax_pair(no_match, is_match)
            }
            Self::Probability => output.iter().next().copied().unwrap_or_default(),
            Self::HiddenState => {
                let mean = output.mean().ok_or(anyhow!("empty hidden state"))?;
                sigmoid(mean)
            }
        };

        if probability.is_nan() {
            bail!("match probability is NaN");
        }

        Ok(probability.clamp(0.0, 1.0))
    }
}

fn softmax_pair(no_match: f32, is_match: f32) -> f32 {
    // 2-class softmax reduces to a sigmoid of the logit difference
    sigmoid(is_match - no_match)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{arr2, Array3};
    use std::str::FromStr;

    #[test]
    fn test_logit_pair() {
        let output = arr2(&[[0.0f32, 0.0]]).into_dyn();
        let p = ItmOutputContract::LogitPair.extract(output.view()).unwrap();
        assert!((p - 0.5).abs() < 1e-6);

        let output = arr2(&[[-2.0f32, 3.0]]).into_dyn();
        let p = ItmOutputContract::LogitPair.extract(output.view()).unwrap();
        let expected = 3.0f32.exp() / ((-2.0f32).exp() + 3.0f32.exp());
        assert!((p - expected).abs() < 1e-6);
    }

    #[test]
    fn test_logit_pair_wrong_shape() {
        let output = arr2(&[[0.1f32, 0.2, 0.7]]).into_dyn();
        assert!(ItmOutputContract::LogitPair.extract(output.view()).is_err());
    }

    #[test]
    fn test_probability_clamped() {
        let output = arr2(&[[1.3f32]]).into_dyn();
        let p = ItmOutputContract::Probability.extract(output.view()).unwrap();
        assert_eq!(p, 1.0);

        let output = arr2(&[[0.42f32]]).into_dyn();
        let p = ItmOutputContract::Probability.extract(output.view()).unwrap();
        assert!((p - 0.42).abs() < 1e-6);
    }

    #[test]
    fn test_hidden_state() {
        let output = Array3::<f32>::zeros((1, 4, 8)).into_dyn();
        let p = ItmOutputContract::HiddenState.extract(output.view()).unwrap();
        assert!((p - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_output() {
        let output = Array3::<f32>::zeros((1, 0, 8)).into_dyn();
        assert!(ItmOutputContract::HiddenState.extract(output.view()).is_err());
    }

    #[test]
    fn test_parse_contract() {
        assert_eq!(
            ItmOutputContract::from_str("logit-pair").unwrap(),
            ItmOutputContract::LogitPair
        );
        assert_eq!(
            ItmOutputContract::from_str("hidden-state").unwrap(),
            ItmOutputContract::HiddenState
        );
        assert!(ItmOutputContract::from_str("logits").is_err());
    }
}
