//! Machine configuration.

/// ROM images are always 16K on this machine.
pub(crate) const ROM_SIZE: usize = 0x4000;

/// Configuration for creating a CPC instance.
///
/// The OS and BASIC ROMs are required; AMSDOS (and with it the disk
/// drive) is optional. `disk` holds a raw DSK image for drive A.
pub struct CpcConfig {
    pub os_rom: Vec<u8>,
    pub basic_rom: Vec<u8>,
    pub amsdos_rom: Option<Vec<u8>>,
    pub disk: Option<Vec<u8>>,
}

impl CpcConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        check_rom("os", &self.os_rom)?;
        check_rom("basic", &self.basic_rom)?;
        if let Some(rom) = &self.amsdos_rom {
            check_rom("amsdos", rom)?;
        }
        Ok(())
    }
}

fn check_rom(name: &str, rom: &[u8]) -> Result<(), String> {
    if rom.len() == ROM_SIZE {
        Ok(())
    } else {
        Err(format!(
            "{name} ROM is {} bytes, expected {ROM_SIZE}",
            rom.len()
        ))
    }
}
