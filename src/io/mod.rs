pub mod pandapower;
pub mod pypsa;
