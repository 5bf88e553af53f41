use crate::{RawTensor, Tensor};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Relu,
    Sigmoid,
    Tanh,
}

impl UnaryOp {
    fn apply(self, x: f32) -> f32 {
        match self {
            UnaryOp::Relu => x.max(0.0),
            UnaryOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryOp::Tanh => x.tanh(),
        }
    }
}

// ===== UNARY OPERATIONS =====
impl RawTensor {
    pub fn unary_op(self_t: &Tensor, op: UnaryOp) -> Tensor {
        let req_grad = Self::track(&[self_t]);
        let s = self_t.borrow();
        let data = s.data.iter().map(|&x| op.apply(x)).collect();
        Self::new(data, &s.shape, req_grad)
    }

    pub fn relu(self_t: &Tensor) -> Tensor {
        Self::unary_op(self_t, UnaryOp::Relu)
    }
    pub fn sigmoid(self_t: &Tensor) -> Tensor {
        Self::unary_op(self_t, UnaryOp::Sigmoid)
    }
    pub fn tanh(self_t: &Tensor) -> Tensor {
        Self::unary_op(self_t, UnaryOp::Tanh)
    }

    /// Numerically stable softmax over the last axis
    pub fn softmax(self_t: &Tensor) -> Tensor {
        let req_grad = Self::track(&[self_t]);
        let s = self_t.borrow();
        let width = s.shape.last().copied().unwrap_or(1).max(1);
        let mut data = s.data.clone();
        for row in data.chunks_mut(width) {
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0;
            for v in row.iter_mut() {
                *v = (*v - max).exp();
                sum += *v;
            }
            for v in row.iter_mut() {
                *v /= sum;
            }
        }
        Self::new(data, &s.shape, req_grad)
    }

    /// Index of the largest value in each row of the last axis
    pub fn argmax_last(self_t: &Tensor) -> Vec<usize> {
        let s = self_t.borrow();
        let width = s.shape.last().copied().unwrap_or(1).max(1);
        s.data
            .chunks(width)
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                        if v > best.1 { (i, v) } else { best }
                    })
                    .0
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::tensor::{RawTensor, TensorOps};

    #[test]
    fn test_relu_clamps_negatives() {
        let x = RawTensor::new(vec![-1.0, 0.0, 2.5], &[3], false);
        assert_eq!(x.relu().to_vec(), vec![0.0, 0.0, 2.5]);
    }

    #[test]
    fn test_sigmoid_midpoint() {
        let x = RawTensor::zeros(&[2]);
        assert_eq!(x.sigmoid().to_vec(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let x = RawTensor::new(vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0], &[2, 3], false);
        let y = x.softmax().to_vec();
        assert!((y[0..3].iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!((y[3] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_argmax_last() {
        let x = RawTensor::new(vec![0.1, 0.7, 0.2, 0.9, 0.0, 0.1], &[2, 3], false);
        assert_eq!(x.argmax_last(), vec![1, 0]);
    }
}
