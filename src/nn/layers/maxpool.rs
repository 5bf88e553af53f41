use crate::error::Result;
use crate::nn::Module;
use crate::ops::ConvGeometry;
use crate::tensor::{RawTensor, Tensor};

/// Max pooling over 1, 2 or 3 spatial axes
///
/// Accepts tensors shaped (batch, channels, *spatial) and downsamples each
/// window to its maximum value, like `PyTorch`'s `nn.MaxPool{1,2,3}d`.
pub struct MaxPoolNd {
    geometry: ConvGeometry,
}

impl MaxPoolNd {
    /// Window equal to its stride, as used by conv units
    pub fn new(kernel: &[usize]) -> Result<Self> {
        Self::with_params(kernel, kernel, &vec![0; kernel.len()])
    }

    /// Arbitrary kernel/stride/padding constructor
    pub fn with_params(kernel: &[usize], stride: &[usize], padding: &[usize]) -> Result<Self> {
        Ok(Self {
            geometry: ConvGeometry::new(kernel.to_vec(), stride.to_vec(), padding.to_vec())?,
        })
    }
}

impl Module for MaxPoolNd {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        RawTensor::max_pool_nd(x, &self.geometry)
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::MaxPoolNd;
    use crate::nn::Module;
    use crate::tensor::{RawTensor, TensorOps};

    #[test]
    fn test_maxpool2d_forward_shape() {
        let pool = MaxPoolNd::new(&[2, 2]).unwrap();
        let x = RawTensor::randn(&[1, 3, 32, 32]);
        let y = pool.forward(&x).unwrap();
        assert_eq!(y.shape(), vec![1, 3, 16, 16]);
    }

    #[test]
    fn test_maxpool1d_floor_division() {
        let pool = MaxPoolNd::new(&[2]).unwrap();
        let x = RawTensor::new(vec![1.0, 5.0, 2.0, 3.0, 9.0], &[1, 1, 5], false);
        let y = pool.forward(&x).unwrap();
        assert_eq!(y.to_vec(), vec![5.0, 3.0]);
    }

    #[test]
    fn test_maxpool3d_window_larger_than_input() {
        let pool = MaxPoolNd::new(&[4, 4, 4]).unwrap();
        assert!(pool.forward(&RawTensor::ones(&[1, 1, 3, 8, 8])).is_err());
    }
}
