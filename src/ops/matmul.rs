use crate::error::{NetError, Result};
use crate::{RawTensor, Tensor};

impl RawTensor {
    /// Affine map `x @ weight + bias`
    ///
    /// `x` is (batch, in_features), `weight` is (in_features, out_features) and
    /// `bias` is (out_features).
    pub fn linear(x: &Tensor, weight: &Tensor, bias: Option<&Tensor>) -> Result<Tensor> {
        let xs = x.borrow();
        let ws = weight.borrow();
        let (batch, in_features) = match xs.shape.as_slice() {
            &[b, f] => (b, f),
            other => {
                return Err(NetError::OpError(format!(
                    "linear expects (batch, features) input, got {other:?}"
                )));
            }
        };
        let (w_in, out_features) = match ws.shape.as_slice() {
            &[i, o] => (i, o),
            other => {
                return Err(NetError::OpError(format!(
                    "linear weight must be 2D, got {other:?}"
                )));
            }
        };
        if w_in != in_features {
            return Err(NetError::OpError(format!(
                "linear expects {w_in} input features, got {in_features}"
            )));
        }

        let mut out = vec![0.0; batch * out_features];
        for b in 0..batch {
            let row = &xs.data[b * in_features..(b + 1) * in_features];
            let out_row = &mut out[b * out_features..(b + 1) * out_features];
            for (k, &xv) in row.iter().enumerate() {
                if xv == 0.0 {
                    continue;
                }
                let w_row = &ws.data[k * out_features..(k + 1) * out_features];
                for (o, &wv) in out_row.iter_mut().zip(w_row) {
                    *o += xv * wv;
                }
            }
        }

        let mut tracked = vec![x, weight];
        if let Some(b) = bias {
            let bs = b.borrow();
            if bs.data.len() != out_features {
                return Err(NetError::OpError(format!(
                    "bias has {} entries for {out_features} outputs",
                    bs.data.len()
                )));
            }
            for out_row in out.chunks_mut(out_features.max(1)) {
                for (o, &bv) in out_row.iter_mut().zip(&bs.data) {
                    *o += bv;
                }
            }
            tracked.push(b);
        }

        drop(xs);
        drop(ws);
        let req_grad = Self::track(&tracked);
        Ok(Self::new(out, &[batch, out_features], req_grad))
    }
}

#[cfg(test)]
mod tests {
    use crate::tensor::{RawTensor, TensorOps};

    #[test]
    fn test_linear_values() {
        let x = RawTensor::new(vec![1.0, 2.0], &[1, 2], false);
        let w = RawTensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], &[2, 3], false);
        let b = RawTensor::new(vec![0.5, 0.5, 0.5], &[3], false);
        let y = x.linear(&w, Some(&b)).unwrap();
        assert_eq!(y.shape(), vec![1, 3]);
        assert_eq!(y.to_vec(), vec![3.5, 2.5, 2.5]);
    }

    #[test]
    fn test_linear_feature_mismatch() {
        let x = RawTensor::ones(&[1, 3]);
        let w = RawTensor::ones(&[2, 3]);
        assert!(x.linear(&w, None).is_err());
    }
}
