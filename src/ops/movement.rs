use crate::error::{NetError, Result};
use crate::ops::compute_strides;
use crate::{RawTensor, Tensor};

// ===== MOVEMENT OPERATIONS =====
impl RawTensor {
    /// Reshape tensor to new shape (same number of elements)
    pub fn reshape(self_t: &Tensor, new_shape: &[usize]) -> Result<Tensor> {
        let s = self_t.borrow();
        let new_size: usize = new_shape.iter().product();
        if s.data.len() != new_size {
            return Err(NetError::OpError(format!(
                "cannot reshape {:?} into {:?}",
                s.shape, new_shape
            )));
        }
        let req_grad = Self::track(&[self_t]);
        Ok(Self::new(s.data.clone(), new_shape, req_grad))
    }

    /// Insert a size-1 axis at `axis` (0..=rank)
    pub fn unsqueeze(self_t: &Tensor, axis: usize) -> Result<Tensor> {
        let mut shape = self_t.borrow().shape.clone();
        if axis > shape.len() {
            return Err(NetError::OpError(format!(
                "cannot insert axis {axis} into rank-{} tensor",
                shape.len()
            )));
        }
        shape.insert(axis, 1);
        Self::reshape(self_t, &shape)
    }

    /// Collapse everything after the batch axis: (B, D1, D2, ...) -> (B, D1 * D2 * ...)
    pub fn flatten_batch(self_t: &Tensor) -> Result<Tensor> {
        let shape = self_t.borrow().shape.clone();
        match shape.split_first() {
            Some((&batch, rest)) if !rest.is_empty() => {
                Self::reshape(self_t, &[batch, rest.iter().product()])
            }
            _ => Ok(self_t.clone()),
        }
    }

    /// Pad tensor with zeros
    ///
    /// # Arguments
    /// * `padding` - For each dimension, (`left_pad`, `right_pad`)
    pub fn pad(self_t: &Tensor, padding: &[(usize, usize)]) -> Result<Tensor> {
        let s = self_t.borrow();
        let old_shape = &s.shape;
        if padding.len() != old_shape.len() {
            return Err(NetError::OpError(format!(
                "padding has {} entries for rank-{} tensor",
                padding.len(),
                old_shape.len()
            )));
        }
        if padding.iter().all(|&(l, r)| l == 0 && r == 0) {
            let req_grad = Self::track(&[self_t]);
            return Ok(Self::new(s.data.clone(), old_shape, req_grad));
        }

        let new_shape: Vec<usize> = old_shape
            .iter()
            .zip(padding)
            .map(|(d, (l, r))| d + l + r)
            .collect();
        let new_size = Self::check_alloc(&new_shape)?;

        let mut result = vec![0.0; new_size];
        let old_strides = compute_strides(old_shape);
        let new_strides = compute_strides(&new_shape);

        #[allow(clippy::too_many_arguments)]
        fn pad_recursive(
            result: &mut [f32],
            data: &[f32],
            dim: usize,
            old_shape: &[usize],
            padding: &[(usize, usize)],
            old_offset: usize,
            new_offset: usize,
            old_strides: &[usize],
            new_strides: &[usize],
        ) {
            if dim == old_shape.len() {
                result[new_offset] = data[old_offset];
                return;
            }

            for i in 0..old_shape[dim] {
                let new_i = i + padding[dim].0;
                pad_recursive(
                    result,
                    data,
                    dim + 1,
                    old_shape,
                    padding,
                    old_offset + i * old_strides[dim],
                    new_offset + new_i * new_strides[dim],
                    old_strides,
                    new_strides,
                );
            }
        }

        if !s.data.is_empty() {
            pad_recursive(
                &mut result,
                &s.data,
                0,
                old_shape,
                padding,
                0,
                0,
                &old_strides,
                &new_strides,
            );
        }

        let req_grad = Self::track(&[self_t]);
        Ok(Self::new(result, &new_shape, req_grad))
    }

    /// Concatenate along `axis`; every other axis must match.
    pub fn cat(tensors: &[Tensor], axis: usize) -> Result<Tensor> {
        let first = tensors
            .first()
            .ok_or_else(|| NetError::OpError("cannot concatenate zero tensors".into()))?;
        let base = first.borrow().shape.clone();
        if axis >= base.len() {
            return Err(NetError::OpError(format!(
                "concat axis {axis} out of bounds for shape {base:?}"
            )));
        }

        let mut axis_total = 0;
        for t in tensors {
            let shape = &t.borrow().shape;
            let compatible = shape.len() == base.len()
                && shape
                    .iter()
                    .zip(&base)
                    .enumerate()
                    .all(|(i, (a, b))| i == axis || a == b);
            if !compatible {
                return Err(NetError::OpError(format!(
                    "cannot concatenate {shape:?} with {base:?} along axis {axis}"
                )));
            }
            axis_total += shape[axis];
        }

        let mut out_shape = base.clone();
        out_shape[axis] = axis_total;
        let out_size = Self::check_alloc(&out_shape)?;

        // Rows before the axis are interleaved; each tensor contributes one
        // contiguous block of `shape[axis] * inner` values per outer index.
        let outer: usize = base[..axis].iter().product();
        let inner: usize = base[axis + 1..].iter().product();
        let mut data = Vec::with_capacity(out_size);
        for o in 0..outer {
            for t in tensors {
                let t = t.borrow();
                let block = t.shape[axis] * inner;
                data.extend_from_slice(&t.data[o * block..(o + 1) * block]);
            }
        }

        let refs: Vec<&Tensor> = tensors.iter().collect();
        let req_grad = Self::track(&refs);
        Ok(Self::new(data, &out_shape, req_grad))
    }
}
