// Adam optimizer (fixed learning rate)

use crate::autoencoder::Gradients;

#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    step: i32,
    m: Vec<Vec<f64>>,
    v: Vec<Vec<f64>>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    pub fn steps_taken(&self) -> i32 {
        self.step
    }

    /// Apply one update. `params` and `grads` must list tensors in the same order.
    pub fn step(&mut self, params: &mut [&mut [f64]], grads: &Gradients) {
        if self.m.is_empty() {
            self.m = grads.tensors.iter().map(|g| vec![0.0; g.len()]).collect();
            self.v = self.m.clone();
        }
        self.step += 1;
        let bias1 = 1.0 - self.beta1.powi(self.step);
        let bias2 = 1.0 - self.beta2.powi(self.step);

        for (t, (param, grad)) in params.iter_mut().zip(&grads.tensors).enumerate() {
            let (m, v) = (&mut self.m[t], &mut self.v[t]);
            for k in 0..param.len() {
                let g = grad[k];
                m[k] = self.beta1 * m[k] + (1.0 - self.beta1) * g;
                v[k] = self.beta2 * v[k] + (1.0 - self.beta2) * g * g;
                let m_hat = m[k] / bias1;
                let v_hat = v[k] / bias2;
                param[k] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let mut adam = Adam::new(0.01);
        let mut weights = vec![1.0, -1.0];
        let grads = Gradients {
            tensors: vec![vec![0.5, -3.0]],
        };
        adam.step(&mut [weights.as_mut_slice()], &grads);

        // bias-corrected first step is ~lr * sign(g)
        assert!((weights[0] - 0.99).abs() < 1e-6);
        assert!((weights[1] + 0.99).abs() < 1e-6);
        assert_eq!(adam.steps_taken(), 1);
    }

    #[test]
    fn test_zero_gradient_leaves_params() {
        let mut adam = Adam::new(0.01);
        let mut weights = vec![0.3];
        let grads = Gradients {
            tensors: vec![vec![0.0]],
        };
        adam.step(&mut [weights.as_mut_slice()], &grads);
        assert_eq!(weights[0], 0.3);
    }
}
