pub mod create;
pub mod file_io;
pub mod network_converter;
pub mod res_display;
pub mod results;
pub mod std_types;

pub use create::*;
pub use file_io::*;
pub use res_display::res_bus_table;
pub use results::runpp;
