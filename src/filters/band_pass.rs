use crate::error::{CtwError, Result};
use crate::filters::filter::{Filter, FilterConfig};
use crate::math_tools::count_undefined;
use ndarray::{Array1, ArrayView1};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Digital Butterworth band-pass applied forward and backward (zero phase).
///
/// The design follows the analog prototype route: Butterworth low-pass poles, low-pass to
/// band-pass transformation on prewarped edges, then the bilinear transform.
#[derive(Debug, Clone)]
pub struct ButterworthBandPass {
    /// Lower edge normalized to the Nyquist frequency.
    pub low: f64,
    /// Upper edge normalized to the Nyquist frequency.
    pub high: f64,
    pub order: usize,
    b: Array1<f64>,
    a: Array1<f64>,
}

impl ButterworthBandPass {
    /// Designs the filter from cutoffs and sampling rate given in the same unit (cycles/day).
    ///
    /// Normalized cutoffs `cutoff / (0.5 * sampling_rate)` must satisfy `0 < low < high < 1` and
    /// the order must be at least 1, otherwise [`CtwError::InvalidCutoff`] is returned.
    pub fn design(lowcut: f64, highcut: f64, sampling_rate: f64, order: usize) -> Result<Self> {
        let nyquist = 0.5 * sampling_rate;
        let low = lowcut / nyquist;
        let high = highcut / nyquist;
        let in_range = low > 0.0 && low < high && high < 1.0;
        if order == 0 || !in_range {
            return Err(CtwError::InvalidCutoff { low, high, order });
        }

        // Prewarp with an internal sampling rate of 2, as the bilinear step below assumes.
        let warp = |wn: f64| 4.0 * (PI * wn / 2.0).tan();
        let (w_low, w_high) = (warp(low), warp(high));
        let bandwidth = w_high - w_low;
        let center = (w_low * w_high).sqrt();

        let n = order as i64;
        let prototype: Vec<Complex64> = (0..n)
            .map(|i| -Complex64::from_polar(1.0, PI * (2 * i - n + 1) as f64 / (2 * n) as f64))
            .collect();

        let mut analog_poles = Vec::with_capacity(2 * order);
        for p in &prototype {
            let p_lp = *p * bandwidth / 2.0;
            let offset = (p_lp * p_lp - center * center).sqrt();
            analog_poles.push(p_lp + offset);
            analog_poles.push(p_lp - offset);
        }

        let fs2 = Complex64::new(4.0, 0.0);
        let poles: Vec<Complex64> = analog_poles
            .iter()
            .map(|p| (fs2 + *p) / (fs2 - *p))
            .collect();
        // Analog zeros at the origin map to +1, the degree difference adds zeros at -1.
        let zeros: Vec<Complex64> = std::iter::repeat(Complex64::new(1.0, 0.0))
            .take(order)
            .chain(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(order))
            .collect();

        let numerator = fs2.powu(order as u32);
        let denominator: Complex64 = analog_poles.iter().map(|p| fs2 - *p).product();
        let gain = bandwidth.powi(order as i32) * (numerator / denominator).re;

        let b = poly(&zeros).mapv(|c| c * gain);
        let a = poly(&poles);
        Ok(ButterworthBandPass {
            low,
            high,
            order,
            b,
            a,
        })
    }

    /// Numerator coefficients, highest power of `z` first.
    pub fn b(&self) -> ArrayView1<f64> {
        self.b.view()
    }

    /// Denominator coefficients, normalized so that `a[0] == 1`.
    pub fn a(&self) -> ArrayView1<f64> {
        self.a.view()
    }

    /// Magnitude response at the normalized angular frequency `omega` (radians per sample).
    pub fn gain(&self, omega: f64) -> f64 {
        let z_inv = Complex64::from_polar(1.0, -omega);
        let eval = |coefficients: &Array1<f64>| {
            coefficients
                .iter()
                .rev()
                .fold(Complex64::new(0.0, 0.0), |acc, c| acc * z_inv + *c)
        };
        (eval(&self.b) / eval(&self.a)).norm()
    }

    /// Single forward pass in transposed direct form II starting from `state`.
    fn lfilter(&self, input: &[f64], mut state: Vec<f64>) -> Vec<f64> {
        let n_state = state.len();
        let mut output = Vec::with_capacity(input.len());
        for &x in input {
            let y = self.b[0] * x + state.first().copied().unwrap_or(0.0);
            for i in 0..n_state {
                let next = if i + 1 < n_state { state[i + 1] } else { 0.0 };
                state[i] = self.b[i + 1] * x - self.a[i + 1] * y + next;
            }
            output.push(y);
        }
        output
    }

    /// Filter state matching the steady-state response to a unit step.
    fn steady_state(&self) -> Vec<f64> {
        let n_state = self.a.len() - 1;
        let y_ss = self.b.sum() / self.a.sum();
        let mut state = vec![0.0; n_state];
        let mut carry = 0.0;
        for i in (0..n_state).rev() {
            carry += self.b[i + 1] - self.a[i + 1] * y_ss;
            state[i] = carry;
        }
        state
    }

    /// Zero-phase filtering: odd extension at both ends, forward and backward passes.
    ///
    /// The extension is `3 * max(len(a), len(b))` samples, shortened to `len - 1` for series
    /// too short to carry it.
    pub fn filtfilt(&self, sequence: ArrayView1<f64>) -> Array1<f64> {
        let len = sequence.len();
        if len == 0 {
            return Array1::zeros(0);
        }
        let pad = (3 * self.a.len().max(self.b.len())).min(len - 1);
        let (first, last) = (sequence[0], sequence[len - 1]);

        let mut extended = Vec::with_capacity(len + 2 * pad);
        extended.extend((1..=pad).rev().map(|i| 2.0 * first - sequence[i]));
        extended.extend(sequence.iter().copied());
        extended.extend((1..=pad).map(|i| 2.0 * last - sequence[len - 1 - i]));

        let zi = self.steady_state();
        let x0 = extended[0];
        let mut forward = self.lfilter(&extended, zi.iter().map(|z| z * x0).collect());

        forward.reverse();
        let y0 = forward[0];
        let mut backward = self.lfilter(&forward, zi.iter().map(|z| z * y0).collect());
        backward.reverse();

        Array1::from_vec(backward[pad..pad + len].to_vec())
    }
}

/// Monic polynomial with the given roots, highest power first, real part kept.
fn poly(roots: &[Complex64]) -> Array1<f64> {
    let mut coefficients = vec![Complex64::new(1.0, 0.0)];
    for root in roots {
        coefficients.push(Complex64::new(0.0, 0.0));
        for i in (1..coefficients.len()).rev() {
            let previous = coefficients[i - 1];
            coefficients[i] -= *root * previous;
        }
    }
    coefficients.iter().map(|c| c.re).collect()
}

impl Filter for ButterworthBandPass {
    fn config(&self) -> FilterConfig {
        FilterConfig {
            name: "Butterworth Band Pass".to_string(),
            description: format!(
                "order {} zero-phase band-pass, normalized band [{:.4}, {:.4}]",
                self.order, self.low, self.high
            ),
        }
    }

    fn filter(&self, sequence: ArrayView1<f64>) -> Result<Array1<f64>> {
        let undefined = count_undefined(sequence);
        if undefined > 0 {
            return Err(CtwError::UndefinedSamples(undefined));
        }
        Ok(self.filtfilt(sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn reference() -> ButterworthBandPass {
        ButterworthBandPass::design(0.035, 0.15, 1.0, 5).unwrap()
    }

    #[test]
    fn first_order_coefficients() {
        let filter = ButterworthBandPass::design(0.1, 0.2, 1.0, 1).unwrap();
        let b = [0.245_237_275_252_786, 0.0, -0.245_237_275_252_786];
        let a = [1.0, -0.932_938_034_670_520, 0.509_525_449_494_429];
        for (got, want) in filter.b().iter().zip(b) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-8);
        }
        for (got, want) in filter.a().iter().zip(a) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-8);
        }
    }

    #[test]
    fn response_matches_butterworth_shape() {
        let filter = reference();
        let (low, high) = (filter.low, filter.high);
        let center = 2.0 * ((PI * low / 2.0).tan() * (PI * high / 2.0).tan()).sqrt().atan();

        assert_eq!(filter.a().len(), 11);
        assert_abs_diff_eq!(filter.gain(center), 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(filter.gain(PI * low), 0.5_f64.sqrt(), epsilon = 1e-6);
        assert_abs_diff_eq!(filter.gain(PI * high), 0.5_f64.sqrt(), epsilon = 1e-6);
        assert!(filter.gain(0.0) < 1e-10);
        assert!(filter.gain(PI) < 1e-10);
    }

    #[test]
    fn invalid_cutoffs_are_rejected() {
        let cases = [
            (0.15, 0.035, 1.0, 5),
            (0.1, 0.1, 1.0, 5),
            (0.0, 0.2, 1.0, 5),
            (0.1, 0.5, 1.0, 5),
            (0.1, 0.2, 1.0, 0),
        ];
        for (low, high, fs, order) in cases {
            assert!(matches!(
                ButterworthBandPass::design(low, high, fs, order),
                Err(CtwError::InvalidCutoff { .. })
            ));
        }
    }

    #[test]
    fn zeros_stay_zero_and_length_is_preserved() {
        let filter = reference();
        for len in [0, 1, 2, 5, 33, 90] {
            let output = filter.filter(Array1::zeros(len).view()).unwrap();
            assert_eq!(output.len(), len);
            assert!(output.iter().all(|v| *v == 0.0));
        }
    }

    #[test]
    fn center_frequency_passes_unchanged() {
        let filter = reference();
        let (low, high) = (filter.low, filter.high);
        let center = 2.0 * ((PI * low / 2.0).tan() * (PI * high / 2.0).tan()).sqrt().atan();
        let signal = Array1::from_shape_fn(600, |n| (center * n as f64).sin());

        let output = filter.filter(signal.view()).unwrap();
        for n in 250..350 {
            assert_abs_diff_eq!(output[n], signal[n], epsilon = 1e-3);
        }
    }

    #[test]
    fn constant_offset_is_removed() {
        let filter = reference();
        let output = filter.filter(Array1::from_elem(200, 3.0).view()).unwrap();
        for value in output.iter() {
            assert_abs_diff_eq!(*value, 0.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn undefined_samples_are_refused() {
        let result = reference().filter(array![1.0, f64::NAN, 2.0].view());
        assert!(matches!(result, Err(CtwError::UndefinedSamples(1))));
    }

    #[test]
    fn filtering_is_deterministic() {
        let filter = reference();
        let signal = Array1::from_shape_fn(90, |n| ((n * 7919) % 101) as f64 / 50.0 - 1.0);
        let first = filter.filter(signal.view()).unwrap();
        let second = filter.filter(signal.view()).unwrap();
        assert!(first
            .iter()
            .zip(second.iter())
            .all(|(x, y)| x.to_bits() == y.to_bits()));
    }
}
