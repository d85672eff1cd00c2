//! Stacked GRU sequence regressor.
//!
//! Each window is fed one scaled close per time step through `layers` GRU
//! layers; the last hidden state of the top layer goes through a linear head.
//! Dropout is applied to the output of every recurrent layer during training
//! (inverted dropout, so inference needs no rescaling). Training minimises
//! mean-squared error with Adam; per-sample gradients inside a mini-batch are
//! computed in parallel with rayon.

use super::predictor::{SequenceRegressor, check_window, validate_training_batch};
use crate::domain::errors::ForecastError;
use crate::domain::forecasting::windowing::Window;
use ndarray::{Array, Array1, Array2, Dimension, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

const UPDATE: usize = 0;
const RESET: usize = 1;
const CANDIDATE: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GruConfig {
    pub lookback: usize,
    pub hidden_units: usize,
    pub layers: usize,
    pub dropout: f64,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub seed: u64,
    /// Global gradient-norm ceiling per update
    pub gradient_clip: f64,
}

impl Default for GruConfig {
    fn default() -> Self {
        Self {
            lookback: 60,
            hidden_units: 32,
            layers: 3,
            dropout: 0.2,
            learning_rate: 0.001,
            epochs: 25,
            batch_size: 32,
            seed: 42,
            gradient_clip: 1.0,
        }
    }
}

/// One recurrent layer. Index 0/1/2 of each array is the update/reset/candidate gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GruLayer {
    w: [Array2<f64>; 3],
    u: [Array2<f64>; 3],
    b: [Array1<f64>; 3],
}

struct StepCache {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    z: Array1<f64>,
    r: Array1<f64>,
    n: Array1<f64>,
}

impl GruLayer {
    fn new(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self {
        let limit = (1.0 / hidden_size as f64).sqrt();
        let mut matrix = |rows: usize, cols: usize| {
            Array2::from_shape_fn((rows, cols), |_| rng.random_range(-limit..limit))
        };
        let w = [
            matrix(hidden_size, input_size),
            matrix(hidden_size, input_size),
            matrix(hidden_size, input_size),
        ];
        let u = [
            matrix(hidden_size, hidden_size),
            matrix(hidden_size, hidden_size),
            matrix(hidden_size, hidden_size),
        ];
        let b = [
            Array1::zeros(hidden_size),
            Array1::zeros(hidden_size),
            Array1::zeros(hidden_size),
        ];
        Self { w, u, b }
    }

    fn zeros_like(&self) -> Self {
        Self {
            w: self.w.clone().map(|m| Array2::zeros(m.raw_dim())),
            u: self.u.clone().map(|m| Array2::zeros(m.raw_dim())),
            b: self.b.clone().map(|v| Array1::zeros(v.raw_dim())),
        }
    }

    fn hidden_size(&self) -> usize {
        self.b[UPDATE].len()
    }

    fn step(&self, x: &Array1<f64>, h_prev: &Array1<f64>) -> StepCache {
        let z = sigmoid(self.w[UPDATE].dot(x) + self.u[UPDATE].dot(h_prev) + &self.b[UPDATE]);
        let r = sigmoid(self.w[RESET].dot(x) + self.u[RESET].dot(h_prev) + &self.b[RESET]);
        let rh = &r * h_prev;
        let n = (self.w[CANDIDATE].dot(x) + self.u[CANDIDATE].dot(&rh) + &self.b[CANDIDATE])
            .mapv(f64::tanh);
        StepCache {
            x: x.clone(),
            h_prev: h_prev.clone(),
            z,
            r,
            n,
        }
    }

    /// h' = (1 - z) * n + z * h
    fn output(cache: &StepCache) -> Array1<f64> {
        cache.z.mapv(|z| 1.0 - z) * &cache.n + &cache.z * &cache.h_prev
    }

    fn forward(&self, inputs: &[Array1<f64>]) -> (Vec<Array1<f64>>, Vec<StepCache>) {
        let mut h = Array1::zeros(self.hidden_size());
        let mut outputs = Vec::with_capacity(inputs.len());
        let mut caches = Vec::with_capacity(inputs.len());
        for x in inputs {
            let cache = self.step(x, &h);
            h = Self::output(&cache);
            outputs.push(h.clone());
            caches.push(cache);
        }
        (outputs, caches)
    }

    /// Backpropagation through time. Accumulates into `grads` and returns the
    /// gradient with respect to each input step.
    fn backward(
        &self,
        caches: &[StepCache],
        d_outputs: &[Array1<f64>],
        grads: &mut GruLayer,
    ) -> Vec<Array1<f64>> {
        let mut d_inputs = vec![Array1::zeros(0); caches.len()];
        let mut dh_next = Array1::zeros(self.hidden_size());

        for t in (0..caches.len()).rev() {
            let c = &caches[t];
            let dh = &d_outputs[t] + &dh_next;

            let dn = &dh * &c.z.mapv(|z| 1.0 - z);
            let dz = &dh * &(&c.h_prev - &c.n);
            let mut dh_prev = &dh * &c.z;

            let da_n = dn * c.n.mapv(|n| 1.0 - n * n);
            let rh = &c.r * &c.h_prev;
            let d_rh = self.u[CANDIDATE].t().dot(&da_n);
            let dr = &d_rh * &c.h_prev;
            dh_prev += &(&d_rh * &c.r);

            let da_r = dr * c.r.mapv(|r| r * (1.0 - r));
            let da_z = dz * c.z.mapv(|z| z * (1.0 - z));

            accumulate_outer(&mut grads.w[CANDIDATE], &da_n, &c.x);
            accumulate_outer(&mut grads.u[CANDIDATE], &da_n, &rh);
            grads.b[CANDIDATE] += &da_n;

            for (gate, da) in [(UPDATE, &da_z), (RESET, &da_r)] {
                accumulate_outer(&mut grads.w[gate], da, &c.x);
                accumulate_outer(&mut grads.u[gate], da, &c.h_prev);
                grads.b[gate] += da;
                dh_prev += &self.u[gate].t().dot(da);
            }

            d_inputs[t] = self.w[UPDATE].t().dot(&da_z)
                + self.w[RESET].t().dot(&da_r)
                + self.w[CANDIDATE].t().dot(&da_n);
            dh_next = dh_prev;
        }

        d_inputs
    }

    fn for_each_param(&mut self, other: &GruLayer, mut f: impl FnMut(&mut f64, f64)) {
        for gate in 0..3 {
            Zip::from(&mut self.w[gate])
                .and(&other.w[gate])
                .for_each(|p, &g| f(p, g));
            Zip::from(&mut self.u[gate])
                .and(&other.u[gate])
                .for_each(|p, &g| f(p, g));
            Zip::from(&mut self.b[gate])
                .and(&other.b[gate])
                .for_each(|p, &g| f(p, g));
        }
    }

    fn squared_norm(&self) -> f64 {
        (0..3)
            .map(|g| {
                self.w[g].mapv(|v| v * v).sum()
                    + self.u[g].mapv(|v| v * v).sum()
                    + self.b[g].mapv(|v| v * v).sum()
            })
            .sum()
    }
}

/// Parameter-shaped accumulator: gradients, and Adam's moment estimates.
#[derive(Clone)]
struct Gradients {
    layers: Vec<GruLayer>,
    head_w: Array1<f64>,
    head_b: f64,
    loss: f64,
}

impl Gradients {
    fn zeros(model: &GruRegressor) -> Self {
        Self {
            layers: model.layers.iter().map(GruLayer::zeros_like).collect(),
            head_w: Array1::zeros(model.head_w.raw_dim()),
            head_b: 0.0,
            loss: 0.0,
        }
    }

    fn merge(mut self, other: Gradients) -> Gradients {
        for (mine, theirs) in self.layers.iter_mut().zip(other.layers.iter()) {
            mine.for_each_param(theirs, |p, g| *p += g);
        }
        self.head_w += &other.head_w;
        self.head_b += other.head_b;
        self.loss += other.loss;
        self
    }

    fn scale(&mut self, factor: f64) {
        for layer in &mut self.layers {
            for gate in 0..3 {
                layer.w[gate] *= factor;
                layer.u[gate] *= factor;
                layer.b[gate] *= factor;
            }
        }
        self.head_w *= factor;
        self.head_b *= factor;
    }

    fn norm(&self) -> f64 {
        let layers: f64 = self.layers.iter().map(GruLayer::squared_norm).sum();
        (layers + self.head_w.mapv(|v| v * v).sum() + self.head_b * self.head_b).sqrt()
    }
}

struct AdamState {
    m: Gradients,
    v: Gradients,
    step: i32,
}

struct AdamStep {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    bias1: f64,
    bias2: f64,
}

impl AdamStep {
    fn new(learning_rate: f64, step: i32) -> Self {
        let beta1: f64 = 0.9;
        let beta2: f64 = 0.999;
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon: 1e-8,
            bias1: 1.0 - beta1.powi(step),
            bias2: 1.0 - beta2.powi(step),
        }
    }

    fn update(&self, param: &mut f64, grad: f64, m: &mut f64, v: &mut f64) {
        *m = self.beta1 * *m + (1.0 - self.beta1) * grad;
        *v = self.beta2 * *v + (1.0 - self.beta2) * grad * grad;
        let m_hat = *m / self.bias1;
        let v_hat = *v / self.bias2;
        *param -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
    }

    fn update_array<D: Dimension>(
        &self,
        param: &mut Array<f64, D>,
        grad: &Array<f64, D>,
        m: &mut Array<f64, D>,
        v: &mut Array<f64, D>,
    ) {
        Zip::from(param)
            .and(grad)
            .and(m)
            .and(v)
            .for_each(|p, &g, m, v| self.update(p, g, m, v));
    }
}

/// Dropout multipliers for one sample: one vector per recurrent layer.
type DropoutMasks = Vec<Array1<f64>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GruRegressor {
    config: GruConfig,
    layers: Vec<GruLayer>,
    head_w: Array1<f64>,
    head_b: f64,
    trained: bool,
    #[serde(skip)]
    loss_history: Vec<f64>,
}

impl GruRegressor {
    pub fn new(config: GruConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let hidden = config.hidden_units.max(1);
        let layer_count = config.layers.max(1);

        let mut layers = Vec::with_capacity(layer_count);
        layers.push(GruLayer::new(1, hidden, &mut rng));
        for _ in 1..layer_count {
            layers.push(GruLayer::new(hidden, hidden, &mut rng));
        }

        let limit = (1.0 / hidden as f64).sqrt();
        let head_w = Array1::from_shape_fn(hidden, |_| rng.random_range(-limit..limit));

        Self {
            config,
            layers,
            head_w,
            head_b: 0.0,
            trained: false,
            loss_history: Vec::new(),
        }
    }

    pub fn config(&self) -> &GruConfig {
        &self.config
    }

    /// Mean training MSE per epoch, oldest first. Not persisted.
    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    fn to_sequence(window: &Window) -> Vec<Array1<f64>> {
        window
            .values()
            .iter()
            .map(|&v| Array1::from_elem(1, v))
            .collect()
    }

    fn forward(&self, inputs: &[Array1<f64>]) -> f64 {
        let mut seq = inputs.to_vec();
        for layer in &self.layers {
            seq = layer.forward(&seq).0;
        }
        let last = seq.last().cloned().unwrap_or_else(|| Array1::zeros(self.head_w.len()));
        self.head_w.dot(&last) + self.head_b
    }

    fn unit_masks(&self) -> DropoutMasks {
        self.layers
            .iter()
            .map(|l| Array1::ones(l.hidden_size()))
            .collect()
    }

    fn sample_masks(&self, rng: &mut StdRng) -> DropoutMasks {
        let p = self.config.dropout;
        if p <= 0.0 {
            return self.unit_masks();
        }
        let keep = 1.0 - p;
        self.layers
            .iter()
            .map(|l| {
                Array1::from_shape_fn(l.hidden_size(), |_| {
                    if rng.random::<f64>() < keep { 1.0 / keep } else { 0.0 }
                })
            })
            .collect()
    }

    /// Squared error of one sample and its gradient with respect to every parameter.
    fn sample_gradients(&self, inputs: &[Array1<f64>], target: f64, masks: &DropoutMasks) -> Gradients {
        let mut grads = Gradients::zeros(self);

        let mut layer_caches: Vec<Vec<StepCache>> = Vec::with_capacity(self.layers.len());
        let mut seq = inputs.to_vec();
        for (layer, mask) in self.layers.iter().zip(masks.iter()) {
            let (outputs, caches) = layer.forward(&seq);
            layer_caches.push(caches);
            seq = outputs.into_iter().map(|h| h * mask).collect();
        }

        let steps = inputs.len();
        let Some(top) = seq.last() else {
            return grads;
        };
        let prediction = self.head_w.dot(top) + self.head_b;
        let err = prediction - target;
        let d_pred = 2.0 * err;

        grads.loss = err * err;
        grads.head_w = top * d_pred;
        grads.head_b = d_pred;

        let mut d_outputs: Vec<Array1<f64>> = vec![Array1::zeros(self.head_w.len()); steps];
        d_outputs[steps - 1] = &self.head_w * d_pred;

        for idx in (0..self.layers.len()).rev() {
            let d_masked: Vec<Array1<f64>> = d_outputs.iter().map(|d| d * &masks[idx]).collect();
            let d_inputs =
                self.layers[idx].backward(&layer_caches[idx], &d_masked, &mut grads.layers[idx]);
            d_outputs = d_inputs;
        }

        grads
    }

    fn apply_adam(&mut self, grads: &Gradients, state: &mut AdamState) {
        state.step += 1;
        let step = AdamStep::new(self.config.learning_rate, state.step);

        for ((layer, g), (m, v)) in self
            .layers
            .iter_mut()
            .zip(grads.layers.iter())
            .zip(state.m.layers.iter_mut().zip(state.v.layers.iter_mut()))
        {
            for gate in 0..3 {
                step.update_array(&mut layer.w[gate], &g.w[gate], &mut m.w[gate], &mut v.w[gate]);
                step.update_array(&mut layer.u[gate], &g.u[gate], &mut m.u[gate], &mut v.u[gate]);
                step.update_array(&mut layer.b[gate], &g.b[gate], &mut m.b[gate], &mut v.b[gate]);
            }
        }
        step.update_array(&mut self.head_w, &grads.head_w, &mut state.m.head_w, &mut state.v.head_w);
        step.update(&mut self.head_b, grads.head_b, &mut state.m.head_b, &mut state.v.head_b);
    }
}

impl SequenceRegressor for GruRegressor {
    fn fit(&mut self, windows: &[Window], targets: &[f64]) -> Result<(), ForecastError> {
        validate_training_batch(windows, targets, self.config.lookback)?;

        let sequences: Vec<Vec<Array1<f64>>> = windows.iter().map(Self::to_sequence).collect();
        let n = sequences.len();
        let batch_size = self.config.batch_size.clamp(1, n);

        // Fresh seeded stream for shuffling and dropout, separate from initialisation.
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(1));
        let mut order: Vec<usize> = (0..n).collect();
        let mut adam = AdamState {
            m: Gradients::zeros(self),
            v: Gradients::zeros(self),
            step: 0,
        };
        self.loss_history.clear();

        for epoch in 0..self.config.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                let masks: Vec<DropoutMasks> = batch.iter().map(|_| self.sample_masks(&mut rng)).collect();

                let model = &*self;
                let mut grads = batch
                    .par_iter()
                    .zip(masks.par_iter())
                    .map(|(&i, mask)| model.sample_gradients(&sequences[i], targets[i], mask))
                    .reduce(|| Gradients::zeros(model), Gradients::merge);

                epoch_loss += grads.loss;
                grads.scale(1.0 / batch.len() as f64);

                let norm = grads.norm();
                if !norm.is_finite() {
                    return Err(ForecastError::Training {
                        reason: format!("gradient diverged in epoch {}", epoch + 1),
                    });
                }
                if norm > self.config.gradient_clip {
                    grads.scale(self.config.gradient_clip / norm);
                }

                self.apply_adam(&grads, &mut adam);
            }

            let mean_loss = epoch_loss / n as f64;
            debug!(
                "GruRegressor: epoch {}/{} mse={:.6}",
                epoch + 1,
                self.config.epochs,
                mean_loss
            );
            self.loss_history.push(mean_loss);
        }

        self.trained = true;
        Ok(())
    }

    fn predict(&self, window: &Window) -> Result<f64, ForecastError> {
        if !self.trained {
            return Err(ForecastError::ModelNotTrained);
        }
        check_window(window, self.config.lookback)?;
        Ok(self.forward(&Self::to_sequence(window)))
    }

    fn validate(&self) -> Result<(), String> {
        let hidden = self.config.hidden_units.max(1);
        let expected_layers = self.config.layers.max(1);
        if self.layers.len() != expected_layers {
            return Err(format!(
                "{} recurrent layers, config says {}",
                self.layers.len(),
                expected_layers
            ));
        }
        for (idx, layer) in self.layers.iter().enumerate() {
            let input = if idx == 0 { 1 } else { hidden };
            for gate in 0..3 {
                if layer.w[gate].dim() != (hidden, input)
                    || layer.u[gate].dim() != (hidden, hidden)
                    || layer.b[gate].len() != hidden
                {
                    return Err(format!("layer {} gate {} has the wrong shape", idx, gate));
                }
            }
        }
        if self.head_w.len() != hidden {
            return Err(format!(
                "output head has {} weights for {} hidden units",
                self.head_w.len(),
                hidden
            ));
        }
        if !self.head_b.is_finite() {
            return Err("output bias is not finite".to_string());
        }
        Ok(())
    }

    fn lookback(&self) -> usize {
        self.config.lookback
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn name(&self) -> &str {
        "GRU Sequence Regressor"
    }

    fn training_loss(&self) -> Option<f64> {
        self.loss_history.last().copied()
    }
}

fn sigmoid(x: Array1<f64>) -> Array1<f64> {
    x.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

fn accumulate_outer(target: &mut Array2<f64>, column: &Array1<f64>, row: &Array1<f64>) {
    Zip::indexed(target).for_each(|(i, j), t| *t += column[i] * row[j]);
}
