use crate::error::{NetError, Result};
use crate::io::{StateDict, TensorData};
use crate::nn::Module;
use crate::ops::ConvGeometry;
use crate::tensor::{RawTensor, Tensor};

/// Convolution over 1, 2 or 3 spatial axes
///
/// The arity comes from the kernel: a kernel of length 2 gives a 2D
/// convolution over (B, C, H, W) input.
pub struct ConvNd {
    weight: Tensor,       // [out_channels, in_channels, *kernel]
    bias: Option<Tensor>, // [out_channels]
    geometry: ConvGeometry,
}

impl ConvNd {
    pub fn new(
        in_ch: usize,
        out_ch: usize,
        kernel: &[usize],
        stride: &[usize],
        padding: &[usize],
        use_bias: bool,
    ) -> Result<Self> {
        let geometry = ConvGeometry::new(kernel.to_vec(), stride.to_vec(), padding.to_vec())?;
        if in_ch == 0 || out_ch == 0 {
            return Err(NetError::InvalidParameter(format!(
                "convolution channels must be positive, got {in_ch} -> {out_ch}"
            )));
        }
        let mut w_shape = vec![out_ch, in_ch];
        w_shape.extend_from_slice(kernel);
        RawTensor::check_alloc(&w_shape)?;
        let w = RawTensor::kaiming_uniform(&w_shape);
        w.borrow_mut().requires_grad = true;
        let b = if use_bias {
            let fan_in: usize = in_ch * kernel.iter().product::<usize>();
            let b = RawTensor::uniform(&[out_ch], 1.0 / (fan_in as f32).sqrt());
            b.borrow_mut().requires_grad = true;
            Some(b)
        } else {
            None
        };
        Ok(ConvNd {
            weight: w,
            bias: b,
            geometry,
        })
    }

    pub fn conv_dim(&self) -> usize {
        self.geometry.rank()
    }

    pub fn geometry(&self) -> &ConvGeometry {
        &self.geometry
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }
}

impl Module for ConvNd {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        RawTensor::conv_nd(x, &self.weight, self.bias.as_ref(), &self.geometry)
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut p = vec![self.weight.clone()];
        if let Some(ref b) = self.bias {
            p.push(b.clone());
        }
        p
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        state.insert("weight".to_string(), TensorData::from_tensor(&self.weight));
        if let Some(b) = &self.bias {
            state.insert("bias".to_string(), TensorData::from_tensor(b));
        }
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) {
        if let Some(w) = state.get("weight") {
            w.copy_into(&self.weight);
        }
        if let (Some(b), Some(bias)) = (state.get("bias"), &self.bias) {
            b.copy_into(bias);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorOps;

    #[test]
    fn test_conv2d_forward_shape() {
        // Input: (1, 3, 32, 32), Conv: 16 filters, 3x3, stride=1, pad=1
        let conv = ConvNd::new(3, 16, &[3, 3], &[1, 1], &[1, 1], true).unwrap();
        let x = RawTensor::randn(&[1, 3, 32, 32]);
        let y = conv.forward(&x).unwrap();
        assert_eq!(y.shape(), vec![1, 16, 32, 32]);
    }

    #[test]
    fn test_conv1d_and_conv3d_arity() {
        let c1 = ConvNd::new(1, 4, &[5], &[2], &[0], true).unwrap();
        assert_eq!(c1.conv_dim(), 1);
        let y = c1.forward(&RawTensor::ones(&[2, 1, 28])).unwrap();
        assert_eq!(y.shape(), vec![2, 4, 12]);

        let c3 = ConvNd::new(1, 2, &[3, 3, 3], &[1, 1, 1], &[1, 1, 1], false).unwrap();
        assert_eq!(c3.parameters().len(), 1);
        let y = c3.forward(&RawTensor::ones(&[1, 1, 4, 4, 4])).unwrap();
        assert_eq!(y.shape(), vec![1, 2, 4, 4, 4]);
    }

    #[test]
    fn test_rank_mismatch_is_error() {
        let conv = ConvNd::new(1, 1, &[3, 3], &[1, 1], &[0, 0], true).unwrap();
        assert!(conv.forward(&RawTensor::ones(&[1, 1, 9])).is_err());
    }

    #[test]
    fn test_parameters_require_grad() {
        let conv = ConvNd::new(2, 3, &[3, 3], &[1, 1], &[0, 0], true).unwrap();
        let params = conv.parameters();
        assert_eq!(params.len(), 2);
        assert!(params.iter().all(|p| p.borrow().requires_grad));
        assert_eq!(params[0].shape(), vec![3, 2, 3, 3]);
    }
}
