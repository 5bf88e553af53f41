// Operation implementations, grouped the way they are dispatched from `TensorOps`
pub mod conv;
pub mod matmul;
pub mod movement;
pub mod unary;

pub use conv::ConvGeometry;
pub use unary::UnaryOp;

/// Compute memory strides for row-major layout
///
/// For shape [3, 4, 5], strides are [20, 5, 1]
pub fn compute_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}
