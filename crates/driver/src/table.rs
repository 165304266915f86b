//! Driver id table
//!
//! Which vendor/product pairs this driver claims when the bus announces
//! them. The default table carries the Visoly linker the driver exists
//! for; operators can widen it from the daemon config.

/// Visoly vendor id.
pub const VISOLY_VENDOR_ID: u16 = 0x5655;

/// Product id the linker enumerates with once its controller firmware has
/// been uploaded by an external loader. This is the id the driver binds.
pub const FLASH_ADVANCE_PRODUCT_ID: u16 = 0x4144;

/// Product id of a factory-fresh linker before the firmware upload. Not in
/// the default table; the device is not usable as a linker in this state.
pub const FLASH_ADVANCE_BARE_PRODUCT_ID: u16 = 0x4149;

/// One id-table entry. `None` on either side is a wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFilter {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

impl DeviceFilter {
    /// Entry matching exactly one vendor/product pair.
    pub fn exact(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id: Some(vendor_id),
            product_id: Some(product_id),
        }
    }

    /// Parse a filter pattern of the form `0xVID:0xPID`, where either side
    /// may be `*`.
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let parts: Vec<&str> = pattern.split(':').collect();
        if parts.len() != 2 {
            return Err(format!(
                "invalid filter '{}', expected VID:PID (e.g. '0x5655:0x4144' or '0x5655:*')",
                pattern
            ));
        }

        let vendor_id = Self::parse_id(parts[0], "VID")?;
        let product_id = Self::parse_id(parts[1], "PID")?;

        Ok(Self {
            vendor_id,
            product_id,
        })
    }

    fn parse_id(id: &str, name: &str) -> Result<Option<u16>, String> {
        if id == "*" {
            return Ok(None);
        }

        let hex = id
            .strip_prefix("0x")
            .or_else(|| id.strip_prefix("0X"))
            .ok_or_else(|| format!("invalid {} '{}', must start with '0x'", name, id))?;

        if hex.is_empty() || hex.len() > 4 {
            return Err(format!(
                "invalid {} '{}', hex part must be 1-4 digits",
                name, id
            ));
        }

        u16::from_str_radix(hex, 16)
            .map(Some)
            .map_err(|_| format!("invalid {} '{}', not a valid hex number", name, id))
    }

    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id.is_none_or(|v| v == vendor_id)
            && self.product_id.is_none_or(|p| p == product_id)
    }
}

impl std::fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.vendor_id {
            Some(v) => write!(f, "{:#06x}:", v)?,
            None => write!(f, "*:")?,
        }
        match self.product_id {
            Some(p) => write!(f, "{:#06x}", p),
            None => write!(f, "*"),
        }
    }
}

/// The driver's id table, checked on every attach announcement.
///
/// An empty table matches nothing: a driver with no ids claims no devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTable {
    entries: Vec<DeviceFilter>,
}

impl DeviceTable {
    pub fn new(entries: Vec<DeviceFilter>) -> Self {
        Self { entries }
    }

    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.matches(vendor_id, product_id))
    }

    pub fn entries(&self) -> &[DeviceFilter] {
        &self.entries
    }
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new(vec![DeviceFilter::exact(
            VISOLY_VENDOR_ID,
            FLASH_ADVANCE_PRODUCT_ID,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_matches_linker_only() {
        let table = DeviceTable::default();

        assert!(table.matches(VISOLY_VENDOR_ID, FLASH_ADVANCE_PRODUCT_ID));
        assert!(!table.matches(VISOLY_VENDOR_ID, FLASH_ADVANCE_BARE_PRODUCT_ID));
        assert!(!table.matches(0x046d, 0xc52b));
    }

    #[test]
    fn test_empty_table_matches_nothing() {
        let table = DeviceTable::new(Vec::new());
        assert!(!table.matches(VISOLY_VENDOR_ID, FLASH_ADVANCE_PRODUCT_ID));
    }

    #[test]
    fn test_parse_exact_and_wildcard() {
        let exact = DeviceFilter::parse("0x5655:0x4144").unwrap();
        assert!(exact.matches(0x5655, 0x4144));
        assert!(!exact.matches(0x5655, 0x4149));

        let wild_pid = DeviceFilter::parse("0x5655:*").unwrap();
        assert!(wild_pid.matches(0x5655, 0x4144));
        assert!(wild_pid.matches(0x5655, 0x4149));
        assert!(!wild_pid.matches(0x5656, 0x4144));

        let wild_both = DeviceFilter::parse("*:*").unwrap();
        assert!(wild_both.matches(0x0000, 0xffff));
    }

    #[test]
    fn test_parse_rejects_malformed_patterns() {
        assert!(DeviceFilter::parse("5655:4144").is_err());
        assert!(DeviceFilter::parse("0x5655").is_err());
        assert!(DeviceFilter::parse("0x5655:0x4144:0x0001").is_err());
        assert!(DeviceFilter::parse("0xGHIJ:0x4144").is_err());
        assert!(DeviceFilter::parse("0x56550:0x4144").is_err());
        assert!(DeviceFilter::parse("0x:0x4144").is_err());
    }

    #[test]
    fn test_filter_display_round_trips() {
        for pattern in ["0x5655:0x4144", "0x5655:*", "*:*"] {
            let filter = DeviceFilter::parse(pattern).unwrap();
            assert_eq!(DeviceFilter::parse(&filter.to_string()).unwrap(), filter);
        }
    }
}
