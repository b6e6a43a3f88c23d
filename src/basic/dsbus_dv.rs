use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

/// Partial derivatives of bus power injections with respect to voltage
/// magnitudes and angles.
///
/// # Returns
///
/// A tuple `(dS_dVm, dS_dVa)`.
///
/// # Notes
///
/// This method is from MatPower:
///  R. D. Zimmerman, "AC Power Flows, Generalized OPF Costs and
///  their Derivatives using Complex Matrix Notation", MATPOWER
///  Technical Note 2, February 2010.
#[allow(non_snake_case)]
pub fn dSbus_dV(
    Ybus: &DMatrix<Complex64>,
    v: &DVector<Complex64>,
) -> (DMatrix<Complex64>, DMatrix<Complex64>) {
    let ibus = Ybus * v;
    let v_norm = v.map(|x| if x.norm() > 0.0 { x / x.norm() } else { Complex64::new(1.0, 0.0) });
    let diagV = DMatrix::from_diagonal(v);
    let diagIbus = DMatrix::from_diagonal(&ibus);
    let diagVnorm = DMatrix::from_diagonal(&v_norm);

    let dS_dVm = &diagV * (Ybus * &diagVnorm).conjugate() + diagIbus.conjugate() * &diagVnorm;
    let dS_dVa = (&diagV * (diagIbus - Ybus * &diagV).conjugate()) * Complex64::i();
    (dS_dVm, dS_dVa)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivatives_match_finite_difference() {
        let y = DMatrix::from_row_slice(
            2,
            2,
            &[
                Complex64::new(1.0, -5.0),
                Complex64::new(-1.0, 5.0),
                Complex64::new(-1.0, 5.0),
                Complex64::new(1.0, -5.0),
            ],
        );
        let v = DVector::from_vec(vec![
            Complex64::from_polar(1.0, 0.0),
            Complex64::from_polar(0.97, -0.1),
        ]);
        let s = |v: &DVector<Complex64>| v.component_mul(&(&y * v).conjugate());
        let (_dvm, dva) = dSbus_dV(&y, &v);

        let h = 1e-7;
        let mut vp = v.clone();
        vp[1] = Complex64::from_polar(0.97, -0.1 + h);
        let fd = (s(&vp) - s(&v)) / Complex64::new(h, 0.0);
        for i in 0..2 {
            assert!((fd[i] - dva[(i, 1)]).norm() < 1e-5, "row {i}");
        }
    }
}
