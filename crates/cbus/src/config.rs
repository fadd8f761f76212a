/// Seed used when no per-installation value is supplied.
pub const DEFAULT_DEVICE_SEED: u16 = 0x1D2C;
/// Default device limit per bus family.
pub const DEFAULT_MAX_DEVICES: usize = 16;
/// Default number of ROM codes returned by a 1-Wire scan.
pub const DEFAULT_SCAN_LIMIT: usize = 8;

/// Startup configuration of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CbusConfig {
    /// Per-installation seed for the 1-Wire identifier discriminator.
    pub device_seed: u16,
    /// Attached devices allowed per bus family before `NoMemory`.
    pub max_devices: usize,
    /// Upper bound on ROM codes reported by a 1-Wire scan.
    pub scan_limit: usize,
}

impl CbusConfig {
    pub const fn new() -> Self {
        Self {
            device_seed: DEFAULT_DEVICE_SEED,
            max_devices: DEFAULT_MAX_DEVICES,
            scan_limit: DEFAULT_SCAN_LIMIT,
        }
    }

    pub const fn with_seed(mut self, device_seed: u16) -> Self {
        self.device_seed = device_seed;
        self
    }

    /// Derive the seed from the factory MAC address (bytes 4 and 5,
    /// little endian), which is unique per chip.
    pub const fn with_seed_from_mac(self, mac: [u8; 6]) -> Self {
        self.with_seed(u16::from_le_bytes([mac[4], mac[5]]))
    }

    pub const fn with_max_devices(mut self, max_devices: usize) -> Self {
        self.max_devices = max_devices;
        self
    }

    pub const fn with_scan_limit(mut self, scan_limit: usize) -> Self {
        self.scan_limit = scan_limit;
        self
    }
}

impl Default for CbusConfig {
    fn default() -> Self {
        Self::new()
    }
}
