use crate::error::{NetError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Type alias for a reference-counted, interior-mutable tensor.
///
/// `Rc<RefCell<RawTensor>>` lets a layer, its state dict and a freeze call all
/// refer to the same parameter while still allowing in-place updates.
/// Single-threaded only.
pub type Tensor = Rc<RefCell<RawTensor>>;

/// Upper bound on elements a single op may allocate.
pub const MAX_ELEMENTS: usize = 100_000_000;

// ===== RAW TENSOR STRUCTURE =====

/// The core tensor structure
///
/// Fields:
/// - `data`: flat Vec<f32> of values (row-major order)
/// - `shape`: dimensions, e.g. [batch, channels, depth, height, width]
/// - `requires_grad`: whether the tensor participates in training;
///   parameters flip this on freeze/unfreeze
#[derive(Clone)]
pub struct RawTensor {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
    pub requires_grad: bool,
}

impl std::fmt::Debug for RawTensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("requires_grad", &self.requires_grad)
            .finish()
    }
}

// ===== GRADIENT MODE =====

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
    static RNG: RefCell<StdRng> = RefCell::new(StdRng::from_os_rng());
}

/// Whether op outputs currently inherit `requires_grad` from their inputs.
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

struct GradModeGuard {
    previous: bool,
}

impl Drop for GradModeGuard {
    fn drop(&mut self) {
        GRAD_ENABLED.with(|g| g.set(self.previous));
    }
}

/// Run `f` with gradient tracking disabled on this thread.
///
/// The previous mode is restored afterwards, also when `f` unwinds.
pub fn no_grad<R>(f: impl FnOnce() -> R) -> R {
    let previous = GRAD_ENABLED.with(|g| g.replace(false));
    let _guard = GradModeGuard { previous };
    f()
}

// ===== RANDOMNESS =====

/// Reseed the thread-local generator used for init and dropout masks.
pub fn manual_seed(seed: u64) {
    RNG.with(|rng| *rng.borrow_mut() = StdRng::seed_from_u64(seed));
}

pub fn with_rng<R>(f: impl FnOnce(&mut StdRng) -> R) -> R {
    RNG.with(|rng| f(&mut rng.borrow_mut()))
}

// ===== TENSOR CONSTRUCTORS =====
impl RawTensor {
    /// Create a new tensor from data and shape
    ///
    /// # Panics
    /// Panics if data.len() != shape.product(). Use [`RawTensor::try_new`] for
    /// data that did not originate in this crate.
    pub fn new(data: Vec<f32>, shape: &[usize], requires_grad: bool) -> Tensor {
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "Data length must match shape"
        );
        Rc::new(RefCell::new(RawTensor {
            data,
            shape: shape.to_vec(),
            requires_grad,
        }))
    }

    pub fn try_new(data: Vec<f32>, shape: &[usize], requires_grad: bool) -> Result<Tensor> {
        let elements: usize = shape.iter().product();
        if elements != data.len() {
            return Err(NetError::ShapeDataMismatch {
                shape: shape.to_vec(),
                elements,
                len: data.len(),
            });
        }
        Ok(Self::new(data, shape, requires_grad))
    }

    pub fn zeros(shape: &[usize]) -> Tensor {
        let size = shape.iter().product();
        Self::new(vec![0.0; size], shape, false)
    }

    pub fn ones(shape: &[usize]) -> Tensor {
        let size = shape.iter().product();
        Self::new(vec![1.0; size], shape, false)
    }

    /// Like [`RawTensor::ones`], but fails instead of allocating more than
    /// [`MAX_ELEMENTS`] values.
    pub fn try_ones(shape: &[usize]) -> Result<Tensor> {
        let size = Self::check_alloc(shape)?;
        Ok(Self::new(vec![1.0; size], shape, false))
    }

    /// Create a tensor with values from standard normal distribution N(0, 1)
    pub fn randn(shape: &[usize]) -> Tensor {
        let size = shape.iter().product();
        let data: Vec<f32> =
            with_rng(|rng| (0..size).map(|_| rng.sample(StandardNormal)).collect());
        Self::new(data, shape, false)
    }

    /// Uniform samples in [-bound, bound)
    pub fn uniform(shape: &[usize], bound: f32) -> Tensor {
        let size = shape.iter().product();
        let data: Vec<f32> = if bound > 0.0 {
            with_rng(|rng| (0..size).map(|_| rng.random_range(-bound..bound)).collect())
        } else {
            vec![0.0; size]
        };
        Self::new(data, shape, false)
    }

    /// Xavier uniform initialization for a `[fan_in, fan_out]` matrix
    ///
    /// limit = sqrt(6 / (fan_in + fan_out))
    pub fn xavier_uniform(shape: &[usize]) -> Tensor {
        let fan_in = shape.first().copied().unwrap_or(1);
        let fan_out = shape.get(1).copied().unwrap_or(1);
        let limit = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
        Self::uniform(shape, limit)
    }

    /// He-style uniform initialization for convolution weights shaped
    /// `[out_channels, in_channels, *kernel]`: bound = 1 / sqrt(fan_in).
    pub fn kaiming_uniform(shape: &[usize]) -> Tensor {
        let fan_in: usize = shape.iter().skip(1).product();
        let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
        Self::uniform(shape, bound)
    }

    /// Whether an op consuming `inputs` should produce a tracked output.
    pub(crate) fn track(inputs: &[&Tensor]) -> bool {
        is_grad_enabled() && inputs.iter().any(|t| t.borrow().requires_grad)
    }

    pub(crate) fn check_alloc(shape: &[usize]) -> Result<usize> {
        let size = shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .filter(|&s| s <= MAX_ELEMENTS)
            .ok_or_else(|| {
                NetError::InvalidParameter(format!(
                    "shape {shape:?} exceeds {MAX_ELEMENTS} elements"
                ))
            })?;
        Ok(size)
    }
}

// ===== TENSOR OPS TRAIT =====

/// Method-style access to the tensor operations on [`Tensor`].
pub trait TensorOps {
    fn shape(&self) -> Vec<usize>;
    fn numel(&self) -> usize;
    fn to_vec(&self) -> Vec<f32>;

    // Unary ops
    fn relu(&self) -> Tensor;
    fn sigmoid(&self) -> Tensor;
    fn tanh(&self) -> Tensor;
    fn softmax(&self) -> Tensor;

    // Movement ops
    fn reshape(&self, new_shape: &[usize]) -> Result<Tensor>;
    fn pad(&self, padding: &[(usize, usize)]) -> Result<Tensor>;
    fn unsqueeze(&self, axis: usize) -> Result<Tensor>;
    fn flatten_batch(&self) -> Result<Tensor>;

    // Matmul
    fn linear(&self, weight: &Tensor, bias: Option<&Tensor>) -> Result<Tensor>;

    fn argmax_last(&self) -> Vec<usize>;
}

impl TensorOps for Tensor {
    fn shape(&self) -> Vec<usize> {
        self.borrow().shape.clone()
    }
    fn numel(&self) -> usize {
        self.borrow().data.len()
    }
    fn to_vec(&self) -> Vec<f32> {
        self.borrow().data.clone()
    }

    fn relu(&self) -> Tensor {
        RawTensor::relu(self)
    }
    fn sigmoid(&self) -> Tensor {
        RawTensor::sigmoid(self)
    }
    fn tanh(&self) -> Tensor {
        RawTensor::tanh(self)
    }
    fn softmax(&self) -> Tensor {
        RawTensor::softmax(self)
    }

    fn reshape(&self, new_shape: &[usize]) -> Result<Tensor> {
        RawTensor::reshape(self, new_shape)
    }
    fn pad(&self, padding: &[(usize, usize)]) -> Result<Tensor> {
        RawTensor::pad(self, padding)
    }
    fn unsqueeze(&self, axis: usize) -> Result<Tensor> {
        RawTensor::unsqueeze(self, axis)
    }
    fn flatten_batch(&self) -> Result<Tensor> {
        RawTensor::flatten_batch(self)
    }

    fn linear(&self, weight: &Tensor, bias: Option<&Tensor>) -> Result<Tensor> {
        RawTensor::linear(self, weight, bias)
    }

    fn argmax_last(&self) -> Vec<usize> {
        RawTensor::argmax_last(self)
    }
}

// ===== PUBLIC API EXPORTS =====

pub fn zeros(shape: &[usize]) -> Tensor {
    RawTensor::zeros(shape)
}

pub fn ones(shape: &[usize]) -> Tensor {
    RawTensor::ones(shape)
}

pub fn randn(shape: &[usize]) -> Tensor {
    RawTensor::randn(shape)
}

/// Concatenate tensors along `axis`; all other axes must agree.
pub fn cat(tensors: &[Tensor], axis: usize) -> Result<Tensor> {
    RawTensor::cat(tensors, axis)
}
