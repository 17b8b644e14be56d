// Autoencoder network
// encoder d -> 4 -> 2, decoder 2 -> 4 -> d
// ReLU on every hidden layer (the latent code included), sigmoid on the reconstruction

use logguard_core::FeatureMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub const HIDDEN_DIM: usize = 4;
pub const LATENT_DIM: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Sigmoid,
}

impl Activation {
    pub fn apply(self, z: f64) -> f64 {
        match self {
            Activation::Relu => z.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-z).exp()),
        }
    }

    // derivative expressed through the activated output
    fn derivative(self, out: f64) -> f64 {
        match self {
            Activation::Relu => {
                if out > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Sigmoid => out * (1.0 - out),
        }
    }
}

/// Fully connected layer. `weights` is row-major `outputs x inputs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    pub inputs: usize,
    pub outputs: usize,
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
    pub activation: Activation,
}

impl Dense {
    /// Uniform init in `±1/sqrt(inputs)` for weights and bias.
    pub fn init(inputs: usize, outputs: usize, activation: Activation, rng: &mut impl Rng) -> Self {
        let bound = 1.0 / (inputs as f64).sqrt();
        let weights = (0..inputs * outputs)
            .map(|_| rng.gen_range(-bound..bound))
            .collect();
        let bias = (0..outputs).map(|_| rng.gen_range(-bound..bound)).collect();
        Self {
            inputs,
            outputs,
            weights,
            bias,
            activation,
        }
    }

    pub fn forward(&self, input: &[f64]) -> Vec<f64> {
        (0..self.outputs)
            .map(|o| {
                let row = &self.weights[o * self.inputs..(o + 1) * self.inputs];
                let z = row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + self.bias[o];
                self.activation.apply(z)
            })
            .collect()
    }

    fn is_finite(&self) -> bool {
        self.weights.iter().chain(&self.bias).all(|v| v.is_finite())
    }
}

// expected (inputs, outputs, activation) for each layer given the feature width
fn topology(input_dim: usize) -> [(usize, usize, Activation); 4] {
    [
        (input_dim, HIDDEN_DIM, Activation::Relu),
        (HIDDEN_DIM, LATENT_DIM, Activation::Relu),
        (LATENT_DIM, HIDDEN_DIM, Activation::Relu),
        (HIDDEN_DIM, input_dim, Activation::Sigmoid),
    ]
}

/// Gradient buffers, one entry per parameter tensor in `Autoencoder::parameters_mut` order.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub tensors: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Autoencoder {
    layers: Vec<Dense>,
}

impl Autoencoder {
    pub fn new(input_dim: usize, rng: &mut impl Rng) -> Self {
        let layers = topology(input_dim)
            .into_iter()
            .map(|(i, o, act)| Dense::init(i, o, act, rng))
            .collect();
        Self { layers }
    }

    pub fn seeded(input_dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new(input_dim, &mut rng)
    }

    /// Rebuild from stored layers, checking the fixed topology.
    pub fn from_layers(layers: Vec<Dense>) -> Result<Self, String> {
        let input_dim = layers.first().map(|l| l.inputs).unwrap_or(0);
        if input_dim == 0 {
            return Err("model has no input features".to_string());
        }
        if layers.len() != 4 {
            return Err(format!("expected 4 layers, found {}", layers.len()));
        }

        for (idx, (layer, (inputs, outputs, activation))) in
            layers.iter().zip(topology(input_dim)).enumerate()
        {
            if layer.inputs != inputs || layer.outputs != outputs {
                return Err(format!(
                    "layer {} is {}x{}, expected {}x{}",
                    idx, layer.inputs, layer.outputs, inputs, outputs
                ));
            }
            if layer.activation != activation {
                return Err(format!(
                    "layer {} uses {:?}, expected {:?}",
                    idx, layer.activation, activation
                ));
            }
            if layer.weights.len() != inputs * outputs || layer.bias.len() != outputs {
                return Err(format!("layer {} has wrong parameter count", idx));
            }
            if !layer.is_finite() {
                return Err(format!("layer {} contains non-finite values", idx));
            }
        }
        Ok(Self { layers })
    }

    pub fn input_dim(&self) -> usize {
        self.layers[0].inputs
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.weights.len() + l.bias.len()).sum()
    }

    pub fn is_finite(&self) -> bool {
        self.layers.iter().all(Dense::is_finite)
    }

    /// weights and bias of every layer, in layer order
    pub fn parameters_mut(&mut self) -> Vec<&mut [f64]> {
        let mut params = Vec::with_capacity(self.layers.len() * 2);
        for layer in &mut self.layers {
            params.push(layer.weights.as_mut_slice());
            params.push(layer.bias.as_mut_slice());
        }
        params
    }

    pub fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.layers
            .iter()
            .fold(input.to_vec(), |acc, layer| layer.forward(&acc))
    }

    /// Latent code (output of the encoder half).
    pub fn encode(&self, input: &[f64]) -> Vec<f64> {
        self.layers[..2]
            .iter()
            .fold(input.to_vec(), |acc, layer| layer.forward(&acc))
    }

    pub fn reconstruct(&self, matrix: &FeatureMatrix) -> FeatureMatrix {
        let rows: Vec<Vec<f64>> = matrix.iter_rows().map(|row| self.forward(row)).collect();
        if rows.is_empty() {
            return FeatureMatrix::empty(matrix.cols());
        }
        FeatureMatrix::from_rows(matrix.cols(), &rows)
    }

    /// Per-row mean squared error between input and reconstruction.
    pub fn reconstruction_errors(&self, matrix: &FeatureMatrix) -> Vec<f64> {
        matrix
            .iter_rows()
            .map(|row| {
                let out = self.forward(row);
                let sum: f64 = row.iter().zip(&out).map(|(x, y)| (y - x) * (y - x)).sum();
                sum / row.len() as f64
            })
            .collect()
    }

    /// Mean squared error over all `n * d` elements and its gradient.
    pub fn loss_and_gradients(&self, matrix: &FeatureMatrix) -> (f64, Gradients) {
        let mut grads = Gradients {
            tensors: self
                .layers
                .iter()
                .flat_map(|l| [vec![0.0; l.weights.len()], vec![0.0; l.bias.len()]])
                .collect(),
        };
        let total = (matrix.rows() * matrix.cols()) as f64;
        if total == 0.0 {
            return (0.0, grads);
        }

        let mut loss_sum = 0.0;
        for row in matrix.iter_rows() {
            // activations per layer boundary, acts[0] is the input
            let mut acts: Vec<Vec<f64>> = Vec::with_capacity(self.layers.len() + 1);
            acts.push(row.to_vec());
            for layer in &self.layers {
                let next = layer.forward(&acts[acts.len() - 1]);
                acts.push(next);
            }

            let output = &acts[self.layers.len()];
            let last = &self.layers[self.layers.len() - 1];
            let mut delta: Vec<f64> = output
                .iter()
                .zip(row)
                .map(|(y, x)| {
                    loss_sum += (y - x) * (y - x);
                    2.0 * (y - x) / total * last.activation.derivative(*y)
                })
                .collect();

            for l in (0..self.layers.len()).rev() {
                let layer = &self.layers[l];
                let input = &acts[l];
                {
                    let (gw, gb) = grads.tensors.split_at_mut(2 * l + 1);
                    let gw = &mut gw[2 * l];
                    let gb = &mut gb[0];
                    for (o, d) in delta.iter().enumerate() {
                        gb[o] += d;
                        for (i, x) in input.iter().enumerate() {
                            gw[o * layer.inputs + i] += d * x;
                        }
                    }
                }
                if l == 0 {
                    break;
                }

                let prev_activation = self.layers[l - 1].activation;
                delta = (0..layer.inputs)
                    .map(|i| {
                        let upstream: f64 = delta
                            .iter()
                            .enumerate()
                            .map(|(o, d)| layer.weights[o * layer.inputs + i] * d)
                            .sum();
                        upstream * prev_activation.derivative(input[i])
                    })
                    .collect();
            }
        }

        (loss_sum / total, grads)
    }
}
