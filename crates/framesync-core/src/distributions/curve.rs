// SPDX-License-Identifier: Apache-2.0
//! Integer-valued curve fit through up to four prior samples (Lagrange
//! extrapolation via Cramer's rule, evaluated with integer arithmetic).

/// A rational linear predictor over up to four previous samples, built once
/// by [`CurvePredictor::from_matrix`] and evaluated many times by `call`.
///
/// The five canonical predictors (`zero`, `constant`, `linear`, `quadratic`,
/// `cubic`) fit a degree-`(n-1)` polynomial through `n` timestamps and
/// extrapolate it to `t = 0` (the current frame), expressed as the
/// coefficients and shared denominator of a 4x4 linear system solved by
/// cofactor expansion so every predictor call is pure integer math.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurvePredictor {
    c0: i64,
    c1: i64,
    c2: i64,
    c3: i64,
    denom: i64,
}

impl Default for CurvePredictor {
    fn default() -> Self {
        Self::zero()
    }
}

impl CurvePredictor {
    /// The always-zero predictor, used when no prior sample exists.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            c0: 0,
            c1: 0,
            c2: 0,
            c3: 0,
            denom: 1,
        }
    }

    /// Builds a predictor from the 4x4 system `matrix`, solving for the
    /// coefficient row via cofactor expansion along the first column.
    #[must_use]
    #[allow(clippy::many_single_char_names)]
    pub fn from_matrix(m: [[i64; 4]; 4]) -> Self {
        let c0 = m[1][1] * m[2][2] * m[3][3] + m[3][1] * m[1][2] * m[2][3]
            + m[2][1] * m[3][2] * m[1][3]
            - m[1][1] * m[3][2] * m[2][3]
            - m[2][1] * m[1][2] * m[3][3]
            - m[3][1] * m[2][2] * m[1][3];
        let c1 = m[0][1] * m[3][2] * m[2][3] + m[2][1] * m[0][2] * m[3][3]
            + m[3][1] * m[2][2] * m[0][3]
            - m[3][1] * m[0][2] * m[2][3]
            - m[2][1] * m[3][2] * m[0][3]
            - m[0][1] * m[2][2] * m[3][3];
        let c2 = m[0][1] * m[1][2] * m[3][3] + m[3][1] * m[0][2] * m[1][3]
            + m[1][1] * m[3][2] * m[0][3]
            - m[0][1] * m[3][2] * m[1][3]
            - m[1][1] * m[0][2] * m[3][3]
            - m[3][1] * m[1][2] * m[0][3];
        let c3 = m[0][1] * m[2][2] * m[1][3] + m[1][1] * m[0][2] * m[2][3]
            + m[2][1] * m[1][2] * m[0][3]
            - m[0][1] * m[1][2] * m[2][3]
            - m[2][1] * m[0][2] * m[1][3]
            - m[1][1] * m[2][2] * m[0][3];
        let denom = m[0][0]
            * (m[1][1] * m[2][2] * m[3][3] + m[3][1] * m[1][2] * m[2][3]
                + m[2][1] * m[3][2] * m[1][3]
                - m[1][1] * m[3][2] * m[2][3]
                - m[2][1] * m[1][2] * m[3][3]
                - m[3][1] * m[2][2] * m[1][3])
            + m[0][1]
                * (m[1][2] * m[3][3] * m[2][0] + m[2][2] * m[1][3] * m[3][0]
                    + m[3][2] * m[2][3] * m[1][0]
                    - m[1][2] * m[2][3] * m[3][0]
                    - m[3][2] * m[1][3] * m[2][0]
                    - m[2][2] * m[3][3] * m[1][0])
            + m[0][2]
                * (m[1][3] * m[2][0] * m[3][1] + m[3][3] * m[1][0] * m[2][1]
                    + m[2][3] * m[3][0] * m[1][1]
                    - m[1][3] * m[3][0] * m[2][1]
                    - m[2][3] * m[1][0] * m[3][1]
                    - m[3][3] * m[2][0] * m[1][1])
            + m[0][3]
                * (m[1][0] * m[3][1] * m[2][2] + m[2][0] * m[1][1] * m[3][2]
                    + m[3][0] * m[2][1] * m[1][2]
                    - m[1][0] * m[2][1] * m[3][2]
                    - m[3][0] * m[1][1] * m[2][2]
                    - m[2][0] * m[3][1] * m[1][2]);
        Self { c0, c1, c2, c3, denom }
    }

    /// The constant predictor: always returns the single most recent sample.
    #[must_use]
    pub fn constant() -> Self {
        Self::from_matrix([[1, 0, 0, 0], [0, 1, 0, 0], [0, 0, 1, 0], [0, 0, 0, 1]])
    }

    /// Fits a line through samples taken at `t0, t1` and extrapolates to `t = 0`.
    #[must_use]
    pub fn linear(t0: i64, t1: i64) -> Self {
        Self::from_matrix([[1, t0, 0, 0], [1, t1, 0, 0], [0, 0, 1, 0], [0, 0, 0, 1]])
    }

    /// Fits a parabola through samples at `t0, t1, t2` and extrapolates to `t = 0`.
    #[must_use]
    pub fn quadratic(t0: i64, t1: i64, t2: i64) -> Self {
        Self::from_matrix([
            [1, t0, t0 * t0, 0],
            [1, t1, t1 * t1, 0],
            [1, t2, t2 * t2, 0],
            [0, 0, 0, 1],
        ])
    }

    /// Fits a cubic through samples at `t0, t1, t2, t3` and extrapolates to `t = 0`.
    #[must_use]
    pub fn cubic(t0: i64, t1: i64, t2: i64, t3: i64) -> Self {
        Self::from_matrix([
            [1, t0, t0 * t0, t0 * t0 * t0],
            [1, t1, t1 * t1, t1 * t1 * t1],
            [1, t2, t2 * t2, t2 * t2 * t2],
            [1, t3, t3 * t3, t3 * t3 * t3],
        ])
    }

    /// Evaluates the predictor against up to four previous samples, most
    /// recent first; unused slots must be zero, matching the zero-padded
    /// rows the constructors use for unused degrees of freedom.
    #[must_use]
    pub fn call(&self, samples: [i32; 4]) -> i32 {
        let [s0, s1, s2, s3] = samples.map(i64::from);
        let value = (self.c0 * s0 + self.c1 * s1 + self.c2 * s2 + self.c3 * s3) / self.denom;
        #[allow(clippy::cast_possible_truncation)]
        {
            value as i32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_predictor_always_predicts_zero() {
        let p = CurvePredictor::zero();
        assert_eq!(p.call([7, -3, 100, -100]), 0);
    }

    #[test]
    fn constant_predictor_echoes_last_sample() {
        let p = CurvePredictor::constant();
        assert_eq!(p.call([42, 1, 2, 3]), 42);
    }

    #[test]
    fn linear_predictor_extrapolates_a_line() {
        // samples taken at t=-2 (value 10) and t=-1 (value 12); slope is 2/step.
        let p = CurvePredictor::linear(-1, -2);
        assert_eq!(p.call([12, 10, 0, 0]), 14);
    }

    #[test]
    fn quadratic_predictor_extrapolates_a_parabola() {
        // f(t) = t*t, samples at t = -1, -2, -3 => values 1, 4, 9; f(0) = 0.
        let p = CurvePredictor::quadratic(-1, -2, -3);
        assert_eq!(p.call([1, 4, 9, 0]), 0);
    }

    #[test]
    fn cubic_predictor_extrapolates_a_cubic() {
        // f(t) = t*t*t, samples at t=-1,-2,-3,-4 => -1,-8,-27,-64; f(0)=0.
        let p = CurvePredictor::cubic(-1, -2, -3, -4);
        assert_eq!(p.call([-1, -8, -27, -64]), 0);
    }
}
