use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use tracing::trace;

use super::dsbus_dv::dSbus_dV;
use crate::error::PowerFlowError;

/// Solves the AC power flow equations with the Newton-Raphson method in polar coordinates.
///
/// `pv` and `pq` hold bus positions; every other bus is treated as a slack bus and keeps
/// its initial voltage. `tolerance` is the infinity norm of the mismatch in per unit.
///
/// Returns the converged voltages and the number of iterations used.
#[allow(non_snake_case)]
pub fn newton_pf(
    Ybus: &DMatrix<Complex64>,
    Sbus: &DVector<Complex64>,
    v_init: &DVector<Complex64>,
    pv: &[usize],
    pq: &[usize],
    tolerance: f64,
    max_iter: usize,
) -> Result<(DVector<Complex64>, usize), PowerFlowError> {
    let pvpq: Vec<usize> = pv.iter().chain(pq).copied().collect();
    let n_pvpq = pvpq.len();

    let mut v = v_init.clone();
    let mut v_m = v.map(|e| e.norm());
    let mut v_a = v.map(|e| e.arg());

    let mut F = mismatch(Ybus, Sbus, &v, &pvpq, pq);
    let mut norm = F.amax();
    if norm < tolerance {
        return Ok((v, 0));
    }

    for iteration in 1..=max_iter {
        let (dS_dVm, dS_dVa) = dSbus_dV(Ybus, &v);
        let J = build_jacobian(&dS_dVm, &dS_dVa, &pvpq, pq);

        let dx = J.lu().solve(&F).ok_or(PowerFlowError::Singular { iteration })?;

        for (k, &bus) in pvpq.iter().enumerate() {
            v_a[bus] -= dx[k];
        }
        for (k, &bus) in pq.iter().enumerate() {
            v_m[bus] -= dx[n_pvpq + k];
        }
        v = v_m.zip_map(&v_a, |m, a| Complex64::from_polar(m, a));

        F = mismatch(Ybus, Sbus, &v, &pvpq, pq);
        norm = F.amax();
        trace!(iteration, mismatch = norm, "newton step");
        if norm < tolerance {
            return Ok((v, iteration));
        }
    }
    Err(PowerFlowError::DidNotConverge {
        iterations: max_iter,
        mismatch: norm,
    })
}

/// Stacks `[P mismatch at pv+pq; Q mismatch at pq]`.
fn mismatch(
    ybus: &DMatrix<Complex64>,
    sbus: &DVector<Complex64>,
    v: &DVector<Complex64>,
    pvpq: &[usize],
    pq: &[usize],
) -> DVector<f64> {
    let mis = v.component_mul(&(ybus * v).conjugate()) - sbus;
    let p = pvpq.iter().map(|&i| mis[i].re);
    let q = pq.iter().map(|&i| mis[i].im);
    DVector::from_iterator(pvpq.len() + pq.len(), p.chain(q))
}

#[allow(non_snake_case)]
fn build_jacobian(
    ds_dvm: &DMatrix<Complex64>,
    ds_dva: &DMatrix<Complex64>,
    pvpq: &[usize],
    pq: &[usize],
) -> DMatrix<f64> {
    let block = |m: &DMatrix<Complex64>, rows: &[usize], cols: &[usize], real: bool| {
        DMatrix::from_fn(rows.len(), cols.len(), |r, c| {
            let x = m[(rows[r], cols[c])];
            if real { x.re } else { x.im }
        })
    };
    let J11 = block(ds_dva, pvpq, pvpq, true);
    let J12 = block(ds_dvm, pvpq, pq, true);
    let J21 = block(ds_dva, pq, pvpq, false);
    let J22 = block(ds_dvm, pq, pq, false);

    let (n1, n2) = (pvpq.len(), pq.len());
    let mut J = DMatrix::zeros(n1 + n2, n1 + n2);
    J.view_mut((0, 0), (n1, n1)).copy_from(&J11);
    J.view_mut((0, n1), (n1, n2)).copy_from(&J12);
    J.view_mut((n1, 0), (n2, n1)).copy_from(&J21);
    J.view_mut((n1, n1), (n2, n2)).copy_from(&J22);
    J
}
