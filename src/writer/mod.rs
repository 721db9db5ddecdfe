pub mod plclib;
pub mod pll;

use crate::model::Library;
use crate::options::Options;

/// Serializes a library into one output format.
pub trait Writer {
    fn write(&self, lib: &Library, options: &Options) -> anyhow::Result<String>;
    fn file_extension(&self) -> &str;
}

/// Create a writer for the given output extension.
pub fn create_writer(ext: &str) -> anyhow::Result<Box<dyn Writer>> {
    match ext {
        "plclib" => Ok(Box::new(plclib::PlclibWriter)),
        "pll" => Ok(Box::new(pll::PllWriter)),
        _ => anyhow::bail!("Unknown output format: {}", ext),
    }
}
