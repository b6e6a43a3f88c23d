pub(crate) mod dsbus_dv;
pub(crate) mod newtonpf;
pub mod system;
