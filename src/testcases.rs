//! Small networks used by the demo, the tests and the docs.

use crate::basic::system::PowerFlowOptions;
use crate::error::Result;
use crate::io::pypsa::*;

/// A 20 kV bus feeding two 0.4 kV buses through a transformer and a cable.
///
/// The low voltage end carries a 100 kW load and a 200 kW / 70 kvar static generator.
pub fn build_pypsa_test_net() -> SourceNetwork {
    let mut net = SourceNetwork::new();
    net.buses.push(Bus::new("MV bus", 20.0).with_v_mag_pu_set(1.02));
    net.buses.push(Bus::new("LV1 bus", 0.4));
    net.buses.push(Bus::new("LV2 bus", 0.4));
    net.transformers
        .push(Transformer::new("trafo", "MV bus", "LV1 bus").with_type("0.4 MVA 20/0.4 kV"));
    net.lines
        .push(Line::new("LV cable", "LV1 bus", "LV2 bus").with_type("NAYY 4x50 SE", 0.1));
    net.generators
        .push(Generator::new("External Grid", "MV bus", "Slack"));
    net.loads.push(Load::new("LV load", "LV2 bus", 0.1, 0.0).with_sign(-1.0));
    net.loads
        .push(Load::new("static gen", "LV2 bus", 0.2, 0.07).with_sign(1.0));
    net
}

/// [`build_pypsa_test_net`] with dependent values filled in and a solved power flow.
pub fn create_pypsa_test_net(options: &PowerFlowOptions) -> Result<SourceNetwork> {
    let mut net = build_pypsa_test_net();
    net.calculate_dependent_values()?;
    net.pf(options)?;
    Ok(net)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConvertError, VerifyError};
    use crate::io::pandapower::{load_pandapower_json, runpp, save_pandapower_json};
    use crate::verify::{Tolerance, check_results_equal};

    #[test]
    fn test_solved_test_net() {
        let net = create_pypsa_test_net(&PowerFlowOptions::default()).unwrap();
        let res = net.buses_t.as_ref().unwrap();
        assert!((res.v_mag_pu["MV bus"] - 1.02).abs() < 1e-12);
        // the 150 degree vector group shows up on the low voltage side
        let va = res.v_ang["LV2 bus"].to_degrees();
        assert!(va < -149.0 && va > -151.0, "angle {va}");
        // the static generator exports into the grid and lifts the far end
        assert!(res.v_mag_pu["LV2 bus"] > res.v_mag_pu["LV1 bus"]);
    }

    #[test]
    fn test_converted_net_matches_source() {
        let options = PowerFlowOptions::default();
        let pnet = create_pypsa_test_net(&options).unwrap();
        let mut net = from_pypsa(&pnet).unwrap();

        assert_eq!(net.bus.len(), 3);
        assert_eq!(net.line.len(), 1);
        assert_eq!(net.trafo.len(), 1);
        assert_eq!(net.ext_grid.len(), 1);
        assert_eq!(net.ext_grid[0].vm_pu, 1.02);
        assert_eq!(net.load.len(), 1);
        assert_eq!(net.sgen.len(), 1);
        assert_eq!(net.load[0].p_mw, 0.1);
        assert_eq!(net.sgen[0].q_mvar, 0.07);

        runpp(&mut net, &options).unwrap();
        check_results_equal(&pnet, &net, &Tolerance::default()).unwrap();
    }

    #[test]
    fn test_mismatch_with_tight_tolerance() {
        let options = PowerFlowOptions::default();
        let pnet = create_pypsa_test_net(&options).unwrap();
        let mut net = from_pypsa(&pnet).unwrap();
        runpp(&mut net, &options).unwrap();
        // nudge the target so it can no longer agree
        net.res_bus[2].vm_pu += 1e-3;
        let err = check_results_equal(&pnet, &net, &Tolerance::default()).unwrap_err();
        assert!(matches!(err, VerifyError::ResultMismatch { ref bus, .. } if bus == "LV2 bus"));
    }

    #[test]
    fn test_unsolved_target() {
        let pnet = create_pypsa_test_net(&PowerFlowOptions::default()).unwrap();
        let net = from_pypsa(&pnet).unwrap();
        assert!(matches!(
            check_results_equal(&pnet, &net, &Tolerance::default()),
            Err(VerifyError::MissingResults(_))
        ));
    }

    #[test]
    fn test_untyped_transformer_is_skipped() {
        let mut pnet = build_pypsa_test_net();
        pnet.transformers
            .push(Transformer::new("spare", "MV bus", "LV2 bus").with_impedance(0.01, 0.05, 0.4));
        pnet.calculate_dependent_values().unwrap();
        let net = from_pypsa(&pnet).unwrap();
        assert_eq!(net.trafo.len(), 1);
        assert_eq!(net.trafo[0].name.as_deref(), Some("trafo"));
    }

    #[test]
    fn test_missing_reference_aborts() {
        let mut pnet = build_pypsa_test_net();
        pnet.loads.push(Load::new("lost", "nowhere", 0.01, 0.0));
        pnet.calculate_dependent_values().unwrap();
        let err = from_pypsa(&pnet).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::MissingReference { element: "load", ref bus, .. } if bus == "nowhere"
        ));
    }

    #[test]
    fn test_duplicate_bus_aborts() {
        let mut pnet = build_pypsa_test_net();
        pnet.buses.push(Bus::new("LV1 bus", 0.4));
        let err = from_pypsa(&pnet).unwrap_err();
        assert!(matches!(err, ConvertError::DuplicateBus(ref name) if name == "LV1 bus"));
    }

    #[test]
    fn test_converted_net_survives_json() {
        let options = PowerFlowOptions::default();
        let pnet = create_pypsa_test_net(&options).unwrap();
        let mut net = from_pypsa(&pnet).unwrap();
        runpp(&mut net, &options).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.json");
        save_pandapower_json(&net, &path).unwrap();
        let mut back = load_pandapower_json(&path).unwrap();
        assert_eq!(back.bus.len(), net.bus.len());
        assert_eq!(back.trafo[0].shift_degree, net.trafo[0].shift_degree);

        back.clear_results();
        runpp(&mut back, &options).unwrap();
        check_results_equal(&pnet, &back, &Tolerance::default()).unwrap();
    }
}
