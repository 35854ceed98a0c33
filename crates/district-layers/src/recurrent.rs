//! Gated recurrent units over padded `[batch, time, features]` sequences.
//!
//! [`Gru`] is a single recurrent layer with separate input and hidden gate
//! matrices. Each forward pass takes per-row sequence lengths: timesteps at
//! or beyond a row's length leave that row's hidden state unchanged, so the
//! final hidden state is the state after the row's last real timestep.
//! [`GruStack`] chains several layers with dropout between them.

use crate::dropout::Dropout;
use crate::error::{LayerError, LayerResult};
use crate::layer::Layer;
use crate::tensor::Tensor;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// A single GRU layer.
///
/// The forward pass computes:
/// - r_t = sigmoid(x_t W_rx + h_{t-1} W_rh + b_r)  (reset gate)
/// - z_t = sigmoid(x_t W_zx + h_{t-1} W_zh + b_z)  (update gate)
/// - n_t = tanh(x_t W_hx + (r_t * h_{t-1}) W_hh + b_h)  (candidate state)
/// - h_t = (1 - z_t) * h_{t-1} + z_t * n_t
///
/// # Example
///
/// ```
/// use district_layers::recurrent::Gru;
/// use district_layers::tensor::Tensor;
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// let gru = Gru::new(6, 16, &mut StdRng::seed_from_u64(0));
/// let input = Tensor::zeros(&[4, 10, 6]);
/// let (outputs, last) = gru.forward_sequence(&input, &[10, 10, 7, 3]).unwrap();
/// assert_eq!(outputs.shape(), &[4, 10, 16]);
/// assert_eq!(last.shape(), &[4, 16]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gru {
    /// Input dimension
    input_dim: usize,
    /// Hidden dimension
    hidden_dim: usize,
    /// Reset gate weights for input
    w_r_x: Tensor,
    /// Reset gate weights for hidden state
    w_r_h: Tensor,
    /// Reset gate bias
    b_r: Tensor,
    /// Update gate weights for input
    w_z_x: Tensor,
    /// Update gate weights for hidden state
    w_z_h: Tensor,
    /// Update gate bias
    b_z: Tensor,
    /// Candidate hidden state weights for input
    w_h_x: Tensor,
    /// Candidate hidden state weights for hidden state
    w_h_h: Tensor,
    /// Candidate hidden state bias
    b_h: Tensor,
    /// Gradients in [`Gru::parameters`] order
    #[serde(skip)]
    grads: Option<Vec<Tensor>>,
    #[serde(skip)]
    cache: Option<GruCache>,
}

/// Values recorded by a training pass for backpropagation through time.
#[derive(Debug, Clone)]
struct GruCache {
    inputs: Tensor,
    /// mask[t][b] is 1.0 when timestep t is real for row b
    mask: Vec<Vec<f32>>,
    /// h_0 ..= h_T
    hidden_states: Vec<Tensor>,
    reset_gates: Vec<Tensor>,
    update_gates: Vec<Tensor>,
    candidates: Vec<Tensor>,
}

struct StepOutput {
    hidden: Tensor,
    reset: Tensor,
    update: Tensor,
    candidate: Tensor,
}

impl Gru {
    /// Creates a GRU layer with every weight drawn from
    /// `U(-1/sqrt(hidden), 1/sqrt(hidden))`.
    ///
    /// # Arguments
    ///
    /// * `input_dim` - Dimension of the input features
    /// * `hidden_dim` - Dimension of the hidden state
    /// * `rng` - Generator used for initialization
    pub fn new<R: Rng + ?Sized>(input_dim: usize, hidden_dim: usize, rng: &mut R) -> Self {
        let k = 1.0 / (hidden_dim.max(1) as f32).sqrt();
        let mut init = |shape: &[usize]| Tensor::rand_uniform(shape, -k, k, rng);
        Self {
            input_dim,
            hidden_dim,
            w_r_x: init(&[input_dim, hidden_dim]),
            w_r_h: init(&[hidden_dim, hidden_dim]),
            b_r: init(&[hidden_dim]),
            w_z_x: init(&[input_dim, hidden_dim]),
            w_z_h: init(&[hidden_dim, hidden_dim]),
            b_z: init(&[hidden_dim]),
            w_h_x: init(&[input_dim, hidden_dim]),
            w_h_h: init(&[hidden_dim, hidden_dim]),
            b_h: init(&[hidden_dim]),
            grads: None,
            cache: None,
        }
    }

    /// Returns the input dimension.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Returns the hidden dimension.
    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    fn validate(&self, input: &Tensor, lengths: &[usize]) -> LayerResult<(usize, usize)> {
        if input.ndim() != 3 {
            return Err(LayerError::ForwardError {
                message: format!("Gru expects 3D input, got {}D", input.ndim()),
            });
        }
        if input.shape()[2] != self.input_dim {
            return Err(LayerError::InvalidInputDimension {
                expected: self.input_dim,
                actual: input.shape()[2],
            });
        }
        let (batch, time) = (input.shape()[0], input.shape()[1]);
        if lengths.len() != batch {
            return Err(LayerError::ShapeMismatch {
                expected: vec![batch],
                actual: vec![lengths.len()],
            });
        }
        Ok((batch, time))
    }

    fn step(&self, x: &Tensor, h: &Tensor, mask: &[f32]) -> StepOutput {
        let reset = x
            .matmul(&self.w_r_x)
            .add(&h.matmul(&self.w_r_h))
            .add(&self.b_r)
            .sigmoid();
        let update = x
            .matmul(&self.w_z_x)
            .add(&h.matmul(&self.w_z_h))
            .add(&self.b_z)
            .sigmoid();
        let candidate = x
            .matmul(&self.w_h_x)
            .add(&reset.mul(h).matmul(&self.w_h_h))
            .add(&self.b_h)
            .tanh();

        let mut hidden = h.clone();
        let hd = self.hidden_dim;
        for (b, &m) in mask.iter().enumerate() {
            if m == 0.0 {
                continue;
            }
            for j in 0..hd {
                let idx = b * hd + j;
                let z = update.data()[idx];
                hidden.data_mut()[idx] = (1.0 - z) * h.data()[idx] + z * candidate.data()[idx];
            }
        }
        StepOutput {
            hidden,
            reset,
            update,
            candidate,
        }
    }

    fn run(
        &self,
        input: &Tensor,
        lengths: &[usize],
        mut cache: Option<&mut GruCache>,
    ) -> LayerResult<(Tensor, Tensor)> {
        let (batch, time) = self.validate(input, lengths)?;
        let mut h = Tensor::zeros(&[batch, self.hidden_dim]);
        let mut outputs = Tensor::zeros(&[batch, time, self.hidden_dim]);
        if let Some(c) = cache.as_deref_mut() {
            c.hidden_states.push(h.clone());
        }
        for t in 0..time {
            let mask: Vec<f32> = lengths
                .iter()
                .map(|&len| if t < len { 1.0 } else { 0.0 })
                .collect();
            let x = input.time_step(t);
            let step = self.step(&x, &h, &mask);
            outputs.set_time_step(t, &step.hidden);
            h = step.hidden;
            if let Some(c) = cache.as_deref_mut() {
                c.mask.push(mask);
                c.hidden_states.push(h.clone());
                c.reset_gates.push(step.reset);
                c.update_gates.push(step.update);
                c.candidates.push(step.candidate);
            }
        }
        Ok((outputs, h))
    }

    /// Runs the layer over a padded batch.
    ///
    /// # Arguments
    ///
    /// * `input` - Tensor of shape `[batch, time, input_dim]`
    /// * `lengths` - Real length of each row; later timesteps are padding
    ///
    /// # Returns
    ///
    /// All hidden states `[batch, time, hidden_dim]` and the final hidden
    /// state `[batch, hidden_dim]`.
    pub fn forward_sequence(&self, input: &Tensor, lengths: &[usize]) -> LayerResult<(Tensor, Tensor)> {
        self.run(input, lengths, None)
    }

    /// Like [`Gru::forward_sequence`], caching activations for
    /// [`Gru::backward_sequence`].
    pub fn forward_sequence_train(
        &mut self,
        input: &Tensor,
        lengths: &[usize],
    ) -> LayerResult<(Tensor, Tensor)> {
        let mut cache = GruCache {
            inputs: input.clone(),
            mask: Vec::new(),
            hidden_states: Vec::new(),
            reset_gates: Vec::new(),
            update_gates: Vec::new(),
            candidates: Vec::new(),
        };
        let result = self.run(input, lengths, Some(&mut cache))?;
        self.cache = Some(cache);
        Ok(result)
    }

    /// Backpropagation through time.
    ///
    /// Either gradient may be omitted. `d_outputs` is the gradient with
    /// respect to every hidden state `[batch, time, hidden]`, `d_final` the
    /// gradient with respect to the final state `[batch, hidden]`. Returns
    /// the gradient with respect to the input sequence.
    pub fn backward_sequence(
        &mut self,
        d_outputs: Option<&Tensor>,
        d_final: Option<&Tensor>,
    ) -> LayerResult<Tensor> {
        let cache = self.cache.as_ref().ok_or(LayerError::NotInitialized)?;
        let (batch, time) = (cache.inputs.shape()[0], cache.inputs.shape()[1]);
        let hd = self.hidden_dim;

        let mut g_w_r_x = Tensor::zeros(self.w_r_x.shape());
        let mut g_w_r_h = Tensor::zeros(self.w_r_h.shape());
        let mut g_b_r = Tensor::zeros(self.b_r.shape());
        let mut g_w_z_x = Tensor::zeros(self.w_z_x.shape());
        let mut g_w_z_h = Tensor::zeros(self.w_z_h.shape());
        let mut g_b_z = Tensor::zeros(self.b_z.shape());
        let mut g_w_h_x = Tensor::zeros(self.w_h_x.shape());
        let mut g_w_h_h = Tensor::zeros(self.w_h_h.shape());
        let mut g_b_h = Tensor::zeros(self.b_h.shape());

        let mut dx = Tensor::zeros(&[batch, time, self.input_dim]);
        let mut dh = match d_final {
            Some(g) => g.clone(),
            None => Tensor::zeros(&[batch, hd]),
        };

        for t in (0..time).rev() {
            if let Some(g) = d_outputs {
                dh.add_assign(&g.time_step(t));
            }
            let x = cache.inputs.time_step(t);
            let h_prev = &cache.hidden_states[t];
            let r = &cache.reset_gates[t];
            let z = &cache.update_gates[t];
            let n = &cache.candidates[t];
            let mask = &cache.mask[t];

            // Split the incoming gradient into the part that went through the
            // cell and the part carried past padded timesteps.
            let mut dh_cell = dh.clone();
            let mut dh_carry = Tensor::zeros(&[batch, hd]);
            for (b, &m) in mask.iter().enumerate() {
                if m == 0.0 {
                    dh_carry.row_mut(b).copy_from_slice(dh.row(b));
                    dh_cell.row_mut(b).iter_mut().for_each(|v| *v = 0.0);
                }
            }

            let dn = dh_cell.mul(z);
            let dz = dh_cell.mul(&n.sub(h_prev));
            let mut dh_prev = dh_cell.mul(&z.map(|v| 1.0 - v));

            let da_n = dn.mul(&n.map(|v| 1.0 - v * v));
            let rh = r.mul(h_prev);
            g_w_h_x.add_assign(&x.transpose().matmul(&da_n));
            g_w_h_h.add_assign(&rh.transpose().matmul(&da_n));
            g_b_h.add_assign(&da_n.sum_rows());

            let d_rh = da_n.matmul(&self.w_h_h.transpose());
            let dr = d_rh.mul(h_prev);
            dh_prev.add_assign(&d_rh.mul(r));

            let da_z = dz.mul(&z.map(|v| v * (1.0 - v)));
            let da_r = dr.mul(&r.map(|v| v * (1.0 - v)));

            g_w_z_x.add_assign(&x.transpose().matmul(&da_z));
            g_w_z_h.add_assign(&h_prev.transpose().matmul(&da_z));
            g_b_z.add_assign(&da_z.sum_rows());
            g_w_r_x.add_assign(&x.transpose().matmul(&da_r));
            g_w_r_h.add_assign(&h_prev.transpose().matmul(&da_r));
            g_b_r.add_assign(&da_r.sum_rows());

            let dx_t = da_r
                .matmul(&self.w_r_x.transpose())
                .add(&da_z.matmul(&self.w_z_x.transpose()))
                .add(&da_n.matmul(&self.w_h_x.transpose()));
            dx.set_time_step(t, &dx_t);

            dh_prev.add_assign(&da_z.matmul(&self.w_z_h.transpose()));
            dh_prev.add_assign(&da_r.matmul(&self.w_r_h.transpose()));
            dh_prev.add_assign(&dh_carry);
            dh = dh_prev;
        }

        self.grads = Some(vec![
            g_w_r_x, g_w_r_h, g_b_r, g_w_z_x, g_w_z_h, g_b_z, g_w_h_x, g_w_h_h, g_b_h,
        ]);
        Ok(dx)
    }

    fn full_lengths(input: &Tensor) -> Vec<usize> {
        let (batch, time) = match input.shape() {
            [b, t, _] => (*b, *t),
            _ => (0, 0),
        };
        vec![time; batch]
    }
}

/// Treats every row as full length and returns all hidden states.
impl Layer for Gru {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        let lengths = Self::full_lengths(input);
        Ok(self.forward_sequence(input, &lengths)?.0)
    }

    fn forward_train(&mut self, input: &Tensor, _rng: &mut dyn RngCore) -> LayerResult<Tensor> {
        let lengths = Self::full_lengths(input);
        Ok(self.forward_sequence_train(input, &lengths)?.0)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        self.backward_sequence(Some(grad), None)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![
            &self.w_r_x,
            &self.w_r_h,
            &self.b_r,
            &self.w_z_x,
            &self.w_z_h,
            &self.b_z,
            &self.w_h_x,
            &self.w_h_h,
            &self.b_h,
        ]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![
            &mut self.w_r_x,
            &mut self.w_r_h,
            &mut self.b_r,
            &mut self.w_z_x,
            &mut self.w_z_h,
            &mut self.b_z,
            &mut self.w_h_x,
            &mut self.w_h_h,
            &mut self.b_h,
        ]
    }

    fn gradients(&self) -> Vec<Tensor> {
        match &self.grads {
            Some(grads) => grads.clone(),
            None => self
                .parameters()
                .into_iter()
                .map(|p| Tensor::zeros(p.shape()))
                .collect(),
        }
    }

    fn name(&self) -> &str {
        "Gru"
    }
}

/// Several [`Gru`] layers with dropout applied to the hidden states passed
/// from one layer to the next.
///
/// Deserialization rejects a stack without layers or with a dropout count
/// other than one per layer boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "GruStackState")]
pub struct GruStack {
    layers: Vec<Gru>,
    dropouts: Vec<Dropout>,
}

#[derive(Deserialize)]
struct GruStackState {
    layers: Vec<Gru>,
    dropouts: Vec<Dropout>,
}

impl TryFrom<GruStackState> for GruStack {
    type Error = LayerError;

    fn try_from(state: GruStackState) -> LayerResult<Self> {
        let boundaries = state.layers.len().checked_sub(1).ok_or_else(|| LayerError::ConfigError {
            message: "GruStack needs at least one layer".to_string(),
        })?;
        if state.dropouts.len() != boundaries {
            return Err(LayerError::ConfigError {
                message: format!(
                    "GruStack with {} layers needs {boundaries} dropouts, found {}",
                    state.layers.len(),
                    state.dropouts.len()
                ),
            });
        }
        Ok(Self {
            layers: state.layers,
            dropouts: state.dropouts,
        })
    }
}

impl GruStack {
    /// Creates `num_layers` stacked GRU layers.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::ConfigError`] for zero layers or an invalid
    /// dropout rate.
    pub fn new<R: Rng + ?Sized>(
        input_dim: usize,
        hidden_dim: usize,
        num_layers: usize,
        dropout: f32,
        rng: &mut R,
    ) -> LayerResult<Self> {
        if num_layers == 0 {
            return Err(LayerError::ConfigError {
                message: "GruStack needs at least one layer".to_string(),
            });
        }
        let mut layers = Vec::with_capacity(num_layers);
        let mut dropouts = Vec::with_capacity(num_layers - 1);
        for i in 0..num_layers {
            let in_dim = if i == 0 { input_dim } else { hidden_dim };
            layers.push(Gru::new(in_dim, hidden_dim, rng));
            if i + 1 < num_layers {
                dropouts.push(Dropout::new(dropout)?);
            }
        }
        Ok(Self { layers, dropouts })
    }

    /// Returns the hidden dimension of the top layer.
    pub fn hidden_dim(&self) -> usize {
        self.layers.last().map(Gru::hidden_dim).unwrap_or(0)
    }

    /// Returns the number of stacked layers.
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Deterministic pass returning the top layer's final hidden state.
    pub fn forward_sequence(&self, input: &Tensor, lengths: &[usize]) -> LayerResult<Tensor> {
        let mut x = input.clone();
        let mut last = Tensor::zeros(&[0]);
        for layer in &self.layers {
            let (outputs, h) = layer.forward_sequence(&x, lengths)?;
            x = outputs;
            last = h;
        }
        Ok(last)
    }

    /// Pass with inter-layer dropout sampled from `rng`.
    pub fn forward_sequence_stochastic(
        &self,
        input: &Tensor,
        lengths: &[usize],
        rng: &mut dyn RngCore,
    ) -> LayerResult<Tensor> {
        let mut x = input.clone();
        let mut last = Tensor::zeros(&[0]);
        for (i, layer) in self.layers.iter().enumerate() {
            let (outputs, h) = layer.forward_sequence(&x, lengths)?;
            last = h;
            x = match self.dropouts.get(i) {
                Some(dropout) => dropout.forward_stochastic(&outputs, rng)?,
                None => outputs,
            };
        }
        Ok(last)
    }

    /// Training pass caching every layer for [`GruStack::backward_sequence`].
    pub fn forward_sequence_train(
        &mut self,
        input: &Tensor,
        lengths: &[usize],
        rng: &mut dyn RngCore,
    ) -> LayerResult<Tensor> {
        let mut x = input.clone();
        let mut last = Tensor::zeros(&[0]);
        for (i, layer) in self.layers.iter_mut().enumerate() {
            let (outputs, h) = layer.forward_sequence_train(&x, lengths)?;
            last = h;
            x = match self.dropouts.get_mut(i) {
                Some(dropout) => dropout.forward_train(&outputs, rng)?,
                None => outputs,
            };
        }
        Ok(last)
    }

    /// Backpropagates the gradient of the top layer's final hidden state.
    pub fn backward_sequence(&mut self, d_final: &Tensor) -> LayerResult<Tensor> {
        let (top, below) = self.layers.split_last_mut().ok_or_else(|| LayerError::ConfigError {
            message: "GruStack has no layers".to_string(),
        })?;
        let mut d_input = top.backward_sequence(None, Some(d_final))?;
        for (layer, dropout) in below.iter_mut().zip(self.dropouts.iter_mut()).rev() {
            let d_outputs = dropout.backward(&d_input)?;
            d_input = layer.backward_sequence(Some(&d_outputs), None)?;
        }
        Ok(d_input)
    }

    /// Parameters of every layer, bottom to top.
    pub fn parameters(&self) -> Vec<&Tensor> {
        self.layers.iter().flat_map(|l| l.parameters()).collect()
    }

    /// Mutable parameters of every layer, bottom to top.
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.layers
            .iter_mut()
            .flat_map(|l| l.parameters_mut())
            .collect()
    }

    /// Gradients aligned with [`GruStack::parameters`].
    pub fn gradients(&self) -> Vec<Tensor> {
        self.layers.iter().flat_map(|l| l.gradients()).collect()
    }
}
