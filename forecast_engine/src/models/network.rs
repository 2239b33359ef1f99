//! Stacked LSTM regressor and its training loop
//!
//! Layout: LSTM (all timesteps) → dropout → LSTM (last timestep) → dropout →
//! dense → dense(1). Gates follow the input, forget, cell, output order. Weights
//! start Glorot-uniform with the forget-gate bias at one, and are trained on
//! mean squared error with Adam. Gradients come from backpropagation through
//! time over the whole window.

use crate::config::LstmConfig;
use crate::error::{ForecastError, Result};
use forecast_math::Windows;
use ndarray::{s, Array, Array1, Array2, Dimension, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn glorot_uniform<R: Rng + ?Sized>(
    shape: (usize, usize),
    fan_in: usize,
    fan_out: usize,
    rng: &mut R,
) -> Array2<f64> {
    let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
    let dist = Uniform::new_inclusive(-limit, limit);
    Array2::from_shape_fn(shape, |_| dist.sample(&mut *rng))
}

/// `target += a ⊗ b`
fn add_outer(target: &mut Array2<f64>, a: &Array1<f64>, b: &Array1<f64>) {
    for (mut row, &scale) in target.outer_iter_mut().zip(a.iter()) {
        if scale != 0.0 {
            row.scaled_add(scale, b);
        }
    }
}

fn all_finite<D: Dimension>(values: &Array<f64, D>) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// Cached activations of one LSTM timestep
#[derive(Debug, Clone)]
struct LstmStep {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    c: Array1<f64>,
    h: Array1<f64>,
}

/// Single LSTM layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmLayer {
    /// Input kernel, `4 * units` by `input_dim`
    w: Array2<f64>,
    /// Recurrent kernel, `4 * units` by `units`
    u: Array2<f64>,
    b: Array1<f64>,
}

impl LstmLayer {
    fn new<R: Rng + ?Sized>(input_dim: usize, units: usize, rng: &mut R) -> Self {
        let w = glorot_uniform((4 * units, input_dim), input_dim, 4 * units, rng);
        let u = glorot_uniform((4 * units, units), units, 4 * units, rng);
        let mut b: Array1<f64> = Array1::zeros(4 * units);
        b.slice_mut(s![units..2 * units]).fill(1.0);
        Self { w, u, b }
    }

    fn zeros_like(&self) -> Self {
        Self {
            w: Array2::zeros(self.w.raw_dim()),
            u: Array2::zeros(self.u.raw_dim()),
            b: Array1::zeros(self.b.raw_dim()),
        }
    }

    pub fn units(&self) -> usize {
        self.u.ncols()
    }

    pub fn input_dim(&self) -> usize {
        self.w.ncols()
    }

    fn check_shape(&self, input_dim: usize, units: usize) -> std::result::Result<(), String> {
        let gates = 4 * units;
        if self.w.dim() != (gates, input_dim)
            || self.u.dim() != (gates, units)
            || self.b.len() != gates
        {
            return Err(format!(
                "LSTM layer shapes {:?}/{:?}/{} do not match {} inputs and {} units",
                self.w.dim(),
                self.u.dim(),
                self.b.len(),
                input_dim,
                units
            ));
        }
        if !(all_finite(&self.w) && all_finite(&self.u) && all_finite(&self.b)) {
            return Err("LSTM layer holds a non-finite weight".to_string());
        }
        Ok(())
    }

    fn step(&self, x: &Array1<f64>, h_prev: &Array1<f64>, c_prev: &Array1<f64>) -> LstmStep {
        let n = self.units();
        let z = self.w.dot(x) + self.u.dot(h_prev) + &self.b;

        let i = z.slice(s![..n]).mapv(sigmoid);
        let f = z.slice(s![n..2 * n]).mapv(sigmoid);
        let g = z.slice(s![2 * n..3 * n]).mapv(f64::tanh);
        let o = z.slice(s![3 * n..]).mapv(sigmoid);
        let c = &f * c_prev + &i * &g;
        let h = &o * &c.mapv(f64::tanh);

        LstmStep {
            x: x.clone(),
            h_prev: h_prev.clone(),
            c_prev: c_prev.clone(),
            i,
            f,
            g,
            o,
            c,
            h,
        }
    }

    fn forward(&self, inputs: &[Array1<f64>]) -> Vec<LstmStep> {
        let mut h = Array1::zeros(self.units());
        let mut c = Array1::zeros(self.units());
        let mut steps = Vec::with_capacity(inputs.len());

        for x in inputs {
            let step = self.step(x, &h, &c);
            h = step.h.clone();
            c = step.c.clone();
            steps.push(step);
        }

        steps
    }

    /// Backpropagate through time
    ///
    /// `dh_out[t]` is the gradient flowing into the hidden state at `t` from
    /// the layer above. Returns the gradient with respect to each input.
    fn backward(
        &self,
        steps: &[LstmStep],
        dh_out: &[Array1<f64>],
        grads: &mut LstmLayer,
    ) -> Vec<Array1<f64>> {
        let n = self.units();
        let mut dh_next: Array1<f64> = Array1::zeros(n);
        let mut dc_next: Array1<f64> = Array1::zeros(n);
        let mut dx: Vec<Array1<f64>> = vec![Array1::zeros(self.input_dim()); steps.len()];

        for t in (0..steps.len()).rev() {
            let st = &steps[t];
            let dh = &dh_out[t] + &dh_next;
            let tanh_c = st.c.mapv(f64::tanh);

            let d_o = &dh * &tanh_c;
            let dc = &dh * &st.o * &tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;
            let d_i = &dc * &st.g;
            let d_g = &dc * &st.i;
            let d_f = &dc * &st.c_prev;
            dc_next = &dc * &st.f;

            let mut dz: Array1<f64> = Array1::zeros(4 * n);
            dz.slice_mut(s![..n])
                .assign(&(d_i * st.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![n..2 * n])
                .assign(&(d_f * st.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![2 * n..3 * n])
                .assign(&(d_g * st.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![3 * n..])
                .assign(&(d_o * st.o.mapv(|v| v * (1.0 - v))));

            add_outer(&mut grads.w, &dz, &st.x);
            add_outer(&mut grads.u, &dz, &st.h_prev);
            grads.b += &dz;

            dx[t] = self.w.t().dot(&dz);
            dh_next = self.u.t().dot(&dz);
        }

        dx
    }

    fn adam_update(&mut self, grads: &Self, m: &mut Self, v: &mut Self, step: &AdamStep) {
        step.apply(&mut self.w, &grads.w, &mut m.w, &mut v.w);
        step.apply(&mut self.u, &grads.u, &mut m.u, &mut v.u);
        step.apply(&mut self.b, &grads.b, &mut m.b, &mut v.b);
    }
}

/// Fully connected layer with a linear activation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// `outputs` by `inputs`
    w: Array2<f64>,
    b: Array1<f64>,
}

impl DenseLayer {
    fn new<R: Rng + ?Sized>(inputs: usize, outputs: usize, rng: &mut R) -> Self {
        Self {
            w: glorot_uniform((outputs, inputs), inputs, outputs, rng),
            b: Array1::zeros(outputs),
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            w: Array2::zeros(self.w.raw_dim()),
            b: Array1::zeros(self.b.raw_dim()),
        }
    }

    fn check_shape(&self, inputs: usize, outputs: usize) -> std::result::Result<(), String> {
        if self.w.dim() != (outputs, inputs) || self.b.len() != outputs {
            return Err(format!(
                "dense layer shape {:?} does not match {} inputs and {} outputs",
                self.w.dim(),
                inputs,
                outputs
            ));
        }
        if !(all_finite(&self.w) && all_finite(&self.b)) {
            return Err("dense layer holds a non-finite weight".to_string());
        }
        Ok(())
    }

    fn forward(&self, x: &Array1<f64>) -> Array1<f64> {
        self.w.dot(x) + &self.b
    }

    fn backward(&self, x: &Array1<f64>, dy: &Array1<f64>, grads: &mut DenseLayer) -> Array1<f64> {
        add_outer(&mut grads.w, dy, x);
        grads.b += dy;
        self.w.t().dot(dy)
    }

    fn adam_update(&mut self, grads: &Self, m: &mut Self, v: &mut Self, step: &AdamStep) {
        step.apply(&mut self.w, &grads.w, &mut m.w, &mut v.w);
        step.apply(&mut self.b, &grads.b, &mut m.b, &mut v.b);
    }
}

/// Activations kept from a training forward pass
struct Trace {
    steps1: Vec<LstmStep>,
    masks1: Vec<Array1<f64>>,
    steps2: Vec<LstmStep>,
    mask2: Array1<f64>,
    dense1_in: Array1<f64>,
    dense1_out: Array1<f64>,
}

/// Two stacked LSTM layers followed by two dense layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmNetwork {
    lstm1: LstmLayer,
    lstm2: LstmLayer,
    dense1: DenseLayer,
    dense2: DenseLayer,
}

impl LstmNetwork {
    /// Freshly initialised network
    pub fn new<R: Rng + ?Sized>(hidden_units: usize, dense_units: usize, rng: &mut R) -> Self {
        Self {
            lstm1: LstmLayer::new(1, hidden_units, rng),
            lstm2: LstmLayer::new(hidden_units, hidden_units, rng),
            dense1: DenseLayer::new(hidden_units, dense_units, rng),
            dense2: DenseLayer::new(dense_units, 1, rng),
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            lstm1: self.lstm1.zeros_like(),
            lstm2: self.lstm2.zeros_like(),
            dense1: self.dense1.zeros_like(),
            dense2: self.dense2.zeros_like(),
        }
    }

    pub fn hidden_units(&self) -> usize {
        self.lstm1.units()
    }

    pub fn dense_units(&self) -> usize {
        self.dense1.b.len()
    }

    /// Check layer shapes chain together and every weight is finite
    pub fn validate(&self, hidden_units: usize, dense_units: usize) -> std::result::Result<(), String> {
        self.lstm1.check_shape(1, hidden_units)?;
        self.lstm2.check_shape(hidden_units, hidden_units)?;
        self.dense1.check_shape(hidden_units, dense_units)?;
        self.dense2.check_shape(dense_units, 1)
    }

    fn inputs(window: &[f64]) -> Vec<Array1<f64>> {
        window.iter().map(|&v| Array1::from_elem(1, v)).collect()
    }

    /// Predict the value following a scaled window
    pub fn predict(&self, window: &[f64]) -> f64 {
        let seq: Vec<Array1<f64>> = self
            .lstm1
            .forward(&Self::inputs(window))
            .into_iter()
            .map(|step| step.h)
            .collect();

        let last = self
            .lstm2
            .forward(&seq)
            .pop()
            .map(|step| step.h)
            .unwrap_or_else(|| Array1::zeros(self.lstm2.units()));

        let hidden = self.dense1.forward(&last);
        self.dense2.forward(&hidden).sum()
    }

    fn dropout_mask<R: Rng + ?Sized>(len: usize, rate: f64, rng: &mut R) -> Array1<f64> {
        if rate <= 0.0 {
            return Array1::ones(len);
        }
        let keep = 1.0 / (1.0 - rate);
        Array1::from_shape_fn(len, |_| if rng.gen::<f64>() >= rate { keep } else { 0.0 })
    }

    fn forward_train<R: Rng + ?Sized>(&self, window: &[f64], dropout: f64, rng: &mut R) -> (f64, Trace) {
        let steps1 = self.lstm1.forward(&Self::inputs(window));
        let masks1: Vec<Array1<f64>> = steps1
            .iter()
            .map(|_| Self::dropout_mask(self.lstm1.units(), dropout, &mut *rng))
            .collect();
        let seq: Vec<Array1<f64>> = steps1
            .iter()
            .zip(masks1.iter())
            .map(|(step, mask)| &step.h * mask)
            .collect();

        let steps2 = self.lstm2.forward(&seq);
        let mask2 = Self::dropout_mask(self.lstm2.units(), dropout, rng);
        let dense1_in = match steps2.last() {
            Some(step) => &step.h * &mask2,
            None => Array1::zeros(self.lstm2.units()),
        };
        let dense1_out = self.dense1.forward(&dense1_in);
        let prediction = self.dense2.forward(&dense1_out).sum();

        (
            prediction,
            Trace {
                steps1,
                masks1,
                steps2,
                mask2,
                dense1_in,
                dense1_out,
            },
        )
    }

    fn backward(&self, trace: &Trace, d_prediction: f64, grads: &mut LstmNetwork) {
        let d_out = Array1::from_elem(1, d_prediction);
        let d_hidden = self
            .dense2
            .backward(&trace.dense1_out, &d_out, &mut grads.dense2);
        let d_last = self
            .dense1
            .backward(&trace.dense1_in, &d_hidden, &mut grads.dense1);

        // Only the final timestep of the second layer feeds the dense head
        let n2 = self.lstm2.units();
        let mut dh2: Vec<Array1<f64>> = vec![Array1::zeros(n2); trace.steps2.len()];
        if let Some(last) = dh2.last_mut() {
            *last = d_last * &trace.mask2;
        }
        let d_seq = self.lstm2.backward(&trace.steps2, &dh2, &mut grads.lstm2);

        let dh1: Vec<Array1<f64>> = d_seq
            .iter()
            .zip(trace.masks1.iter())
            .map(|(d, mask)| d * mask)
            .collect();
        self.lstm1.backward(&trace.steps1, &dh1, &mut grads.lstm1);
    }

    fn adam_update(&mut self, grads: &Self, m: &mut Self, v: &mut Self, step: &AdamStep) {
        self.lstm1.adam_update(&grads.lstm1, &mut m.lstm1, &mut v.lstm1, step);
        self.lstm2.adam_update(&grads.lstm2, &mut m.lstm2, &mut v.lstm2, step);
        self.dense1.adam_update(&grads.dense1, &mut m.dense1, &mut v.dense1, step);
        self.dense2.adam_update(&grads.dense2, &mut m.dense2, &mut v.dense2, step);
    }

    fn mean_squared_error(&self, windows: &Windows) -> f64 {
        let total: f64 = windows
            .iter()
            .map(|(input, label)| {
                let err = self.predict(input) - label;
                err * err
            })
            .sum();
        total / windows.len() as f64
    }
}

/// Bias-corrected learning rate for one Adam iteration
struct AdamStep {
    lr_t: f64,
}

impl AdamStep {
    fn new(learning_rate: f64, t: i32) -> Self {
        let correction = (1.0 - ADAM_BETA2.powi(t)).sqrt() / (1.0 - ADAM_BETA1.powi(t));
        Self {
            lr_t: learning_rate * correction,
        }
    }

    fn apply<D: Dimension>(
        &self,
        param: &mut Array<f64, D>,
        grad: &Array<f64, D>,
        m: &mut Array<f64, D>,
        v: &mut Array<f64, D>,
    ) {
        let lr_t = self.lr_t;
        Zip::from(param)
            .and(grad)
            .and(m)
            .and(v)
            .for_each(|p, &g, m, v| {
                *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
                *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
                *p -= lr_t * *m / (v.sqrt() + ADAM_EPSILON);
            });
    }
}

/// Losses reported at the end of training
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingReport {
    pub epochs: usize,
    pub train_windows: usize,
    pub train_loss: f64,
    /// Present when a validation split was held back
    pub validation_loss: Option<f64>,
}

/// Initialise and fit a network on scaled windows
///
/// The last `validation_split` share of the windows is held back, never
/// shuffled and only used for the logged validation loss. At least one
/// window is always kept for training.
pub fn train_network(windows: &Windows, config: &LstmConfig) -> Result<(LstmNetwork, TrainingReport)> {
    if windows.is_empty() {
        return Err(ForecastError::InvalidInput(
            "LSTM training needs at least one window".to_string(),
        ));
    }

    let total = windows.len();
    let validation = ((total as f64 * config.validation_split).floor() as usize).min(total - 1);
    let (train, held_back) = windows.split_at(total - validation);

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut network = LstmNetwork::new(config.hidden_units, config.dense_units, &mut rng);
    let mut m = network.zeros_like();
    let mut v = network.zeros_like();
    let mut order: Vec<usize> = (0..train.len()).collect();
    let mut iteration: i32 = 0;
    let mut train_loss = f64::NAN;
    let mut validation_loss = None;

    for epoch in 1..=config.epochs {
        order.shuffle(&mut rng);
        let mut epoch_loss = 0.0;

        for batch in order.chunks(config.batch_size) {
            let mut grads = network.zeros_like();
            let scale = 2.0 / batch.len() as f64;

            for &idx in batch {
                let (prediction, trace) =
                    network.forward_train(&train.inputs[idx], config.dropout, &mut rng);
                let err = prediction - train.labels[idx];
                epoch_loss += err * err;
                network.backward(&trace, scale * err, &mut grads);
            }

            iteration = iteration.saturating_add(1);
            network.adam_update(&grads, &mut m, &mut v, &AdamStep::new(config.learning_rate, iteration));
        }

        train_loss = epoch_loss / train.len() as f64;
        if !train_loss.is_finite() {
            return Err(ForecastError::TrainingFailure(format!(
                "loss became non-finite at epoch {}",
                epoch
            )));
        }

        validation_loss = (!held_back.is_empty()).then(|| network.mean_squared_error(&held_back));
        debug!(epoch, loss = train_loss, val_loss = ?validation_loss, "LSTM epoch finished");
    }

    info!(
        epochs = config.epochs,
        windows = train.len(),
        loss = train_loss,
        val_loss = ?validation_loss,
        "LSTM training finished"
    );

    Ok((
        network,
        TrainingReport {
            epochs: config.epochs,
            train_windows: train.len(),
            train_loss,
            validation_loss,
        },
    ))
}
