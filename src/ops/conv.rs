use crate::error::{NetError, Result};
use crate::{RawTensor, Tensor};

/// Kernel, stride and zero padding of a sliding-window op, one entry per
/// spatial axis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvGeometry {
    pub kernel: Vec<usize>,
    pub stride: Vec<usize>,
    pub padding: Vec<usize>,
}

impl ConvGeometry {
    pub fn new(kernel: Vec<usize>, stride: Vec<usize>, padding: Vec<usize>) -> Result<Self> {
        let rank = kernel.len();
        if !(1..=3).contains(&rank) {
            return Err(NetError::InvalidParameter(format!(
                "only 1D, 2D and 3D windows are supported, got kernel {kernel:?}"
            )));
        }
        if stride.len() != rank || padding.len() != rank {
            return Err(NetError::InvalidParameter(format!(
                "kernel {kernel:?}, stride {stride:?} and padding {padding:?} disagree on rank"
            )));
        }
        if kernel.contains(&0) || stride.contains(&0) {
            return Err(NetError::InvalidParameter(format!(
                "kernel {kernel:?} and stride {stride:?} must be positive"
            )));
        }
        Ok(Self {
            kernel,
            stride,
            padding,
        })
    }

    pub fn rank(&self) -> usize {
        self.kernel.len()
    }

    /// Output spatial extent for a given input extent
    ///
    /// out = (in + 2 * pad - kernel) / stride + 1, per axis
    pub fn output_spatial(&self, input: &[usize]) -> Result<Vec<usize>> {
        if input.len() != self.rank() {
            return Err(NetError::OpError(format!(
                "{}D window applied to spatial shape {input:?}",
                self.rank()
            )));
        }
        input
            .iter()
            .zip(&self.kernel)
            .zip(&self.stride)
            .zip(&self.padding)
            .map(|(((&i, &k), &s), &p)| {
                let padded = i + 2 * p;
                if padded < k {
                    Err(NetError::OpError(format!(
                        "kernel {:?} larger than padded input {input:?}",
                        self.kernel
                    )))
                } else {
                    Ok((padded - k) / s + 1)
                }
            })
            .collect()
    }

    /// The same geometry lifted to three spatial axes by prepending unit axes.
    fn lifted(&self) -> ([usize; 3], [usize; 3]) {
        let mut kernel = [1; 3];
        let mut stride = [1; 3];
        let offset = 3 - self.rank();
        kernel[offset..].copy_from_slice(&self.kernel);
        stride[offset..].copy_from_slice(&self.stride);
        (kernel, stride)
    }
}

/// Pad the spatial axes of a (B, C, *spatial) tensor and lift it to 3 spatial
/// axes. Returns the padded data with its lifted spatial extent.
fn lift_input(x: &Tensor, geom: &ConvGeometry) -> Result<(Vec<f32>, usize, usize, [usize; 3])> {
    let shape = x.borrow().shape.clone();
    if shape.len() != geom.rank() + 2 {
        return Err(NetError::OpError(format!(
            "{}D window expects (B, C, {}spatial) input, got {shape:?}",
            geom.rank(),
            geom.rank()
        )));
    }
    let mut padding = vec![(0, 0), (0, 0)];
    padding.extend(geom.padding.iter().map(|&p| (p, p)));
    let padded = RawTensor::pad(x, &padding)?;
    let p = padded.borrow();

    let mut spatial = [1; 3];
    let offset = 3 - geom.rank();
    spatial[offset..].copy_from_slice(&p.shape[2..]);
    Ok((p.data.clone(), p.shape[0], p.shape[1], spatial))
}

fn lifted_out(out_spatial: &[usize]) -> [usize; 3] {
    let mut out = [1; 3];
    out[3 - out_spatial.len()..].copy_from_slice(out_spatial);
    out
}

impl RawTensor {
    /// Direct N-d convolution (N = 1, 2, 3)
    ///
    /// `x` is (B, C_in, *spatial), `weight` is (C_out, C_in, *kernel) and the
    /// result is (B, C_out, *out_spatial).
    pub fn conv_nd(
        x: &Tensor,
        weight: &Tensor,
        bias: Option<&Tensor>,
        geom: &ConvGeometry,
    ) -> Result<Tensor> {
        let in_spatial = x.borrow().shape.get(2..).unwrap_or_default().to_vec();
        let out_spatial = geom.output_spatial(&in_spatial)?;
        let (w_data, out_ch, w_in_ch) = {
            let w = weight.borrow();
            (w.data.clone(), w.shape[0], w.shape[1])
        };

        let (data, batch, in_ch, [pd, ph, pw]) = lift_input(x, geom)?;
        if in_ch != w_in_ch {
            return Err(NetError::OpError(format!(
                "convolution expects {w_in_ch} input channels, got {in_ch}"
            )));
        }
        let ([kd, kh, kw], [sd, sh, sw]) = geom.lifted();
        let [od, oh, ow] = lifted_out(&out_spatial);
        let bias_data = bias.map(|b| b.borrow().data.clone());

        let mut out_shape = vec![batch, out_ch];
        out_shape.extend(&out_spatial);
        let mut out = vec![0.0; Self::check_alloc(&out_shape)?];
        let in_plane = pd * ph * pw;
        let k_plane = kd * kh * kw;
        let o_plane = od * oh * ow;

        for b in 0..batch {
            for o in 0..out_ch {
                let start = bias_data
                    .as_ref()
                    .and_then(|bd| bd.get(o).copied())
                    .unwrap_or(0.0);
                for z in 0..od {
                    for y in 0..oh {
                        for xo in 0..ow {
                            let mut acc = start;
                            for c in 0..in_ch {
                                let in_base = (b * in_ch + c) * in_plane;
                                let w_base = (o * in_ch + c) * k_plane;
                                for dz in 0..kd {
                                    for dy in 0..kh {
                                        for dx in 0..kw {
                                            let iz = z * sd + dz;
                                            let iy = y * sh + dy;
                                            let ix = xo * sw + dx;
                                            let in_idx = in_base + (iz * ph + iy) * pw + ix;
                                            let w_idx = w_base + (dz * kh + dy) * kw + dx;
                                            acc += data[in_idx] * w_data[w_idx];
                                        }
                                    }
                                }
                            }
                            out[(b * out_ch + o) * o_plane + (z * oh + y) * ow + xo] = acc;
                        }
                    }
                }
            }
        }

        let mut tracked = vec![x, weight];
        if let Some(b) = bias {
            tracked.push(b);
        }
        let req_grad = Self::track(&tracked);
        Ok(Self::new(out, &out_shape, req_grad))
    }

    /// Max pooling over the spatial axes of a (B, C, *spatial) tensor
    pub fn max_pool_nd(x: &Tensor, geom: &ConvGeometry) -> Result<Tensor> {
        let in_spatial = x.borrow().shape.get(2..).unwrap_or_default().to_vec();
        let out_spatial = geom.output_spatial(&in_spatial)?;
        // Padded cells never win, matching -inf padding semantics.
        let (data, batch, channels, [pd, ph, pw]) = {
            let unpadded = ConvGeometry {
                padding: vec![0; geom.rank()],
                ..geom.clone()
            };
            lift_input(x, &unpadded)?
        };
        let pads = {
            let mut p = [0; 3];
            p[3 - geom.rank()..].copy_from_slice(&geom.padding);
            p
        };
        let ([kd, kh, kw], [sd, sh, sw]) = geom.lifted();
        let [od, oh, ow] = lifted_out(&out_spatial);

        let mut out_shape = vec![batch, channels];
        out_shape.extend(&out_spatial);
        let mut out = vec![0.0; Self::check_alloc(&out_shape)?];
        let in_plane = pd * ph * pw;
        let o_plane = od * oh * ow;

        for bc in 0..batch * channels {
            for z in 0..od {
                for y in 0..oh {
                    for xo in 0..ow {
                        let mut max_val = f32::NEG_INFINITY;
                        for dz in 0..kd {
                            for dy in 0..kh {
                                for dx in 0..kw {
                                    let (Some(iz), Some(iy), Some(ix)) = (
                                        (z * sd + dz).checked_sub(pads[0]),
                                        (y * sh + dy).checked_sub(pads[1]),
                                        (xo * sw + dx).checked_sub(pads[2]),
                                    ) else {
                                        continue;
                                    };
                                    if iz < pd && iy < ph && ix < pw {
                                        let v = data[bc * in_plane + (iz * ph + iy) * pw + ix];
                                        max_val = max_val.max(v);
                                    }
                                }
                            }
                        }
                        out[bc * o_plane + (z * oh + y) * ow + xo] = max_val;
                    }
                }
            }
        }

        let req_grad = Self::track(&[x]);
        Ok(Self::new(out, &out_shape, req_grad))
    }
}
