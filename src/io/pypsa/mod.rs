pub mod converter;
pub mod csv_io;
pub mod lookup;
pub mod network;
pub mod powerflow;
pub mod std_types;

pub use converter::from_pypsa;
#[cfg(feature = "zip")]
pub use csv_io::load_csv_zip;
pub use csv_io::{load_csv_folder, save_csv_folder};
pub use lookup::BusLookup;
pub use network::*;
