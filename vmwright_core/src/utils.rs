use crate::objects::ControllerCategory;

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

// Error Handling
use vmwright_error::LibError;

static DEVICE_NODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z]+)\((\d+):(\d+)\)\s*$").unwrap());
static SIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+\.?\d*)([a-zA-Z]+)$").unwrap());

/// Reference from a device to the controller slot it attaches to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct DeviceNode {
    pub category: ControllerCategory,
    pub bus_number: u32,
    pub unit_number: u32,
}
impl fmt::Display for DeviceNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}({}:{})",
            self.category.to_string().to_uppercase(),
            self.bus_number,
            self.unit_number
        )
    }
}

/*
* Parse a device node like "SCSI(0:1)" or "sata(1:0)".
* The category is case insensitive.
*/
pub fn parse_device_node(device_node: &str) -> Result<DeviceNode, LibError> {
    let err = || {
        LibError::builder()
            .msg(&format!(
                "Unable to parse device node: {}. \
                Expected format is <controller_type>(<bus_number>:<unit_number>)",
                device_node
            ))
            .help("Valid device nodes look like SCSI(0:1), SATA(0:0), IDE(1:0) or NVME(0:2)")
            .build()
    };
    let captures = DEVICE_NODE.captures(device_node).ok_or_else(err)?;
    let category = ControllerCategory::from_str(&captures[1].to_lowercase()).map_err(|_| err())?;
    let bus_number = captures[2].parse::<u32>().map_err(|_| err())?;
    let unit_number = captures[3].parse::<u32>().map_err(|_| err())?;
    Ok(DeviceNode {
        category,
        bus_number,
        unit_number,
    })
}

/// Convert a size like "100gb" to kilobytes, using 1024 based units.
pub fn format_size_str_as_kb(size: &str) -> Result<u64, LibError> {
    if size.is_empty() {
        return Err(LibError::builder()
            .msg("Size string cannot be empty")
            .help("Use a positive number followed by a unit, like 100gb")
            .build());
    }
    let captures = SIZE.captures(size).ok_or_else(|| {
        LibError::builder()
            .msg(&format!(
                "Invalid disk size format: '{}'. \
                Format should a positive number followed by a unit abbreviation, like '100gb'.",
                size
            ))
            .help("Supported units: tb, gb, mb, kb")
            .build()
    })?;
    let exponent = match captures[2].to_lowercase().as_str() {
        "tb" => 3,
        "gb" => 2,
        "mb" => 1,
        "kb" => 0,
        unit => {
            return Err(LibError::builder()
                .msg(&format!(
                    "Unsupported size unit: '{}'. Supported units: [tb, gb, mb, kb]",
                    unit
                ))
                .help("Supported units: tb, gb, mb, kb")
                .build())
        }
    };
    let value: f64 = captures[1].parse().map_err(|_| {
        LibError::builder()
            .msg(&format!("Invalid disk size format: '{}'.", size))
            .help("Use a positive number followed by a unit, like 100gb")
            .build()
    })?;
    Ok((value * 1024_f64.powi(exponent)) as u64)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_scsi_node() -> miette::Result<()> {
        let node = parse_device_node("SCSI(0:1)")?;
        assert_eq!(node.category, ControllerCategory::Scsi);
        assert_eq!(node.bus_number, 0);
        assert_eq!(node.unit_number, 1);
        assert_eq!(node.to_string(), "SCSI(0:1)");
        Ok(())
    }

    #[test]
    fn parse_lowercase_node() -> miette::Result<()> {
        let node = parse_device_node("nvme(1:3)")?;
        assert_eq!(node.category, ControllerCategory::Nvme);
        assert_eq!((node.bus_number, node.unit_number), (1, 3));
        Ok(())
    }

    #[test]
    fn reject_malformed_nodes() {
        for node in ["SCSI", "SCSI(0)", "SCSI(a:1)", "FLOPPY(0:0)", ""] {
            let err = parse_device_node(node).unwrap_err();
            assert!(err.message.starts_with("Unable to parse device node"));
        }
    }

    #[test]
    fn sizes_to_kb() -> miette::Result<()> {
        assert_eq!(format_size_str_as_kb("100gb")?, 104857600);
        assert_eq!(format_size_str_as_kb("1tb")?, 1073741824);
        assert_eq!(format_size_str_as_kb("1MB")?, 1024);
        assert_eq!(format_size_str_as_kb("1kb")?, 1);
        assert_eq!(format_size_str_as_kb("1.5gb")?, 1572864);
        Ok(())
    }

    #[test]
    fn reject_bad_sizes() {
        assert!(format_size_str_as_kb("").is_err());
        assert!(format_size_str_as_kb("gb").is_err());
        assert!(format_size_str_as_kb("10pb").is_err());
        assert!(format_size_str_as_kb("-1gb").is_err());
    }
}
