//! Spatial Pooling

use ndarray::{s, Array4};

use crate::error::{ConvNetError, Result};

/// Pooling over the two spatial axes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    /// Average over the full spatial extent to 1x1
    GlobalAverage,
    /// Average with a square window, stride equal to the window
    Average { kernel: usize },
    /// Max with a square window; padded cells never win. Padding may not
    /// exceed `kernel / 2`.
    Max {
        kernel: usize,
        stride: usize,
        padding: usize,
    },
}

impl Pool {
    pub fn forward(&self, x: &Array4<f32>) -> Result<Array4<f32>> {
        match *self {
            Pool::GlobalAverage => Self::global_average(x),
            Pool::Average { kernel } => Self::average(x, kernel),
            Pool::Max {
                kernel,
                stride,
                padding,
            } => Self::max(x, kernel, stride, padding),
        }
    }

    fn global_average(x: &Array4<f32>) -> Result<Array4<f32>> {
        let (batch, channels, height, width) = x.dim();
        if height == 0 || width == 0 {
            return Err(ConvNetError::shape("global_avg_pool", "non-empty spatial extent", "0"));
        }
        let area = (height * width) as f32;
        Ok(Array4::from_shape_fn((batch, channels, 1, 1), |(b, c, _, _)| {
            x.slice(s![b, c, .., ..]).sum() / area
        }))
    }

    fn average(x: &Array4<f32>, kernel: usize) -> Result<Array4<f32>> {
        let (batch, channels, height, width) = x.dim();
        if kernel == 0 || height < kernel || width < kernel {
            return Err(ConvNetError::shape(
                "avg_pool",
                format!("spatial size >= {}", kernel),
                format!("{}x{}", height, width),
            ));
        }
        let out_h = (height - kernel) / kernel + 1;
        let out_w = (width - kernel) / kernel + 1;
        let area = (kernel * kernel) as f32;
        Ok(Array4::from_shape_fn((batch, channels, out_h, out_w), |(b, c, oy, ox)| {
            let y0 = oy * kernel;
            let x0 = ox * kernel;
            x.slice(s![b, c, y0..y0 + kernel, x0..x0 + kernel]).sum() / area
        }))
    }

    fn max(x: &Array4<f32>, kernel: usize, stride: usize, padding: usize) -> Result<Array4<f32>> {
        let (batch, channels, height, width) = x.dim();
        // Wider padding would leave windows that cover no input cell
        if padding > kernel / 2 {
            return Err(ConvNetError::config(format!(
                "max_pool padding {} exceeds half the kernel size {}",
                padding, kernel
            )));
        }
        if kernel == 0 || stride == 0 || height + 2 * padding < kernel || width + 2 * padding < kernel {
            return Err(ConvNetError::shape(
                "max_pool",
                format!("padded spatial size >= {}", kernel),
                format!("{}x{} with padding {}", height, width, padding),
            ));
        }
        let out_h = (height + 2 * padding - kernel) / stride + 1;
        let out_w = (width + 2 * padding - kernel) / stride + 1;
        let pad = padding as isize;
        Ok(Array4::from_shape_fn((batch, channels, out_h, out_w), |(b, c, oy, ox)| {
            let mut best = f32::NEG_INFINITY;
            for ky in 0..kernel {
                let iy = (oy * stride + ky) as isize - pad;
                if iy < 0 || iy >= height as isize {
                    continue;
                }
                for kx in 0..kernel {
                    let ix = (ox * stride + kx) as isize - pad;
                    if ix >= 0 && ix < width as isize {
                        best = best.max(x[[b, c, iy as usize, ix as usize]]);
                    }
                }
            }
            best
        }))
    }
}
